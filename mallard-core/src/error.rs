//! Failure taxonomy for middleware chains.

use thiserror::Error;

/// Boxed error source used by the transparent variants.
pub type BoxError = Box<dyn std::error::Error + Send + Sync>;

/// Error type shared by every middleware in a chain.
///
/// The taxonomy distinguishes failures by which layer introduced them:
/// anything the underlying exchanger raised and no middleware transformed is
/// [`Upstream`](ExchangeError::Upstream); the offline wrapper and the
/// body-error interpreter are the only layers that deliberately replace a
/// result with a failure.
#[derive(Debug, Error)]
pub enum ExchangeError {
    /// Failure raised by the underlying exchanger, untransformed.
    #[error(transparent)]
    Upstream(BoxError),

    /// The inner exchange failed while the network was reported unavailable.
    #[error("network unavailable")]
    NetworkUnavailable {
        /// The original exchanger failure.
        #[source]
        source: Box<ExchangeError>,
    },

    /// A non-success response whose body matched a caller's error predicate.
    #[error(transparent)]
    Interpreted(BoxError),

    /// A cache directive header carried a value that could not be parsed.
    ///
    /// Directive headers are written by the integration layer, so a malformed
    /// value is a caller bug rather than a runtime condition.
    #[error("malformed cache directive {header}: {value:?}")]
    Directive {
        /// Name of the offending directive header.
        header: &'static str,
        /// The raw value that failed to parse.
        value: String,
    },

    /// A token provider operation failed in a way that must reach the caller.
    ///
    /// Refresh failures never surface through this variant; the reference
    /// provider swallows them so the session-expired path stays unambiguous.
    #[error(transparent)]
    Token(BoxError),

    /// The request's cancellation token tripped at a suspension point.
    #[error("exchange cancelled")]
    Cancelled,
}

impl ExchangeError {
    /// Wraps an arbitrary exchanger failure as [`ExchangeError::Upstream`].
    pub fn upstream<E: Into<BoxError>>(error: E) -> Self {
        ExchangeError::Upstream(error.into())
    }

    /// Wraps a token provider failure as [`ExchangeError::Token`].
    pub fn token<E: Into<BoxError>>(error: E) -> Self {
        ExchangeError::Token(error.into())
    }
}
