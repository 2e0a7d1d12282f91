//! Token capability surface and provider contract.
//!
//! The authentication middleware is polymorphic over the concrete token
//! type: it only needs the two observables on [`AccessToken`] plus the
//! access-token string for de-duplication. Everything else about a token
//! (expiry, scopes, refresh material) belongs to the provider behind the
//! [`TokenProvider`] seam.

use async_trait::async_trait;
use bytes::Bytes;
use http::Request;
use tokio_util::sync::CancellationToken;

use crate::error::ExchangeError;

/// Minimal capability surface of an authentication token.
///
/// Token equality, wherever the middleware needs it, is equality of the
/// access-token strings; no other observable participates.
pub trait AccessToken: Clone + Send + Sync + 'static {
    /// The bearer credential, if the token currently carries one.
    ///
    /// An empty string is treated the same as an absent value.
    fn access_token(&self) -> Option<&str>;

    /// Whether a refresh attempt could plausibly succeed for this token.
    fn can_be_refreshed(&self) -> bool;
}

/// Provider of tokens for one identity realm.
///
/// A provider instance is expected to live for the whole process and be
/// shared (via `Arc`) by every middleware handler that talks to the same
/// identity provider; sharing is what makes the single-flight refresh and
/// the at-most-once session-expired notification global.
#[async_trait]
pub trait TokenProvider: Send + Sync {
    /// Concrete token type handed out by this provider.
    type Token: AccessToken;

    /// Returns the currently-known token, if any.
    async fn get_token(
        &self,
        request: &Request<Bytes>,
        cancel: &CancellationToken,
    ) -> Result<Option<Self::Token>, ExchangeError>;

    /// Attempts to obtain a fresh token, given the one observed to fail.
    ///
    /// Returning `Ok(None)` means no refresh is possible and the session is
    /// gone. Implementations should not surface transient refresh failures
    /// as errors; see the reference provider for the expected swallowing
    /// behavior.
    async fn refresh_token(
        &self,
        request: &Request<Bytes>,
        unauthorized: &Self::Token,
        cancel: &CancellationToken,
    ) -> Result<Option<Self::Token>, ExchangeError>;

    /// Informs higher layers that the user session is gone.
    ///
    /// Must be idempotent per distinct access-token value.
    async fn notify_session_expired(
        &self,
        request: &Request<Bytes>,
        expired: &Self::Token,
        cancel: &CancellationToken,
    ) -> Result<(), ExchangeError>;
}

#[async_trait]
impl<P> TokenProvider for std::sync::Arc<P>
where
    P: TokenProvider + ?Sized,
{
    type Token = P::Token;

    async fn get_token(
        &self,
        request: &Request<Bytes>,
        cancel: &CancellationToken,
    ) -> Result<Option<Self::Token>, ExchangeError> {
        self.as_ref().get_token(request, cancel).await
    }

    async fn refresh_token(
        &self,
        request: &Request<Bytes>,
        unauthorized: &Self::Token,
        cancel: &CancellationToken,
    ) -> Result<Option<Self::Token>, ExchangeError> {
        self.as_ref().refresh_token(request, unauthorized, cancel).await
    }

    async fn notify_session_expired(
        &self,
        request: &Request<Bytes>,
        expired: &Self::Token,
        cancel: &CancellationToken,
    ) -> Result<(), ExchangeError> {
        self.as_ref()
            .notify_session_expired(request, expired, cancel)
            .await
    }
}
