//! Composable HTTP client middleware.
//!
//! Each middleware in this crate wraps an inner [`Exchanger`] and is itself
//! an exchanger, so chains compose by nesting. Requests flow outward toward
//! the network; responses and failures flow back toward the caller.
//!
//! ```text
//! FailureReporter
//!   └─ AuthMiddleware        token attachment, single-flight refresh, retry
//!        └─ CacheMiddleware  directive-driven read/write of a keyed store
//!             └─ NetworkGuard
//!                  └─ client adapter
//! ```
//!
//! # Middlewares
//!
//! - [`CacheMiddleware`] — per-request caching driven by the
//!   `X-Mallard-SimpleCache-*` directive headers; see [`cache`].
//! - [`AuthMiddleware`] — bearer token injection, unauthorized detection,
//!   refresh + single retry, session-expired notification; see [`auth`].
//! - [`NetworkGuard`] — wraps exchanger failures in a typed no-network
//!   failure when an availability probe reports offline.
//! - [`FailureReporter`] — publishes every failure bubbling through the
//!   layer to a shared [`FailureSink`], then re-propagates it.
//! - [`ErrorInterpreter`] — turns non-success responses whose deserialised
//!   body matches a caller predicate into typed failures.

#![warn(missing_docs)]

/// Authentication token middleware and the reference token provider.
pub mod auth;

/// Cache middleware: directive parsing, decision logic, stock key providers.
pub mod cache;

/// Body-error interpretation for non-success responses.
pub mod interpret;

/// Offline detection wrapper.
pub mod network;

/// Failure-sink reporting.
pub mod report;

/// Marker type for unset builder fields.
pub struct NotSet;

pub use auth::{AuthMiddleware, SharedTokenProvider, TokenSource};
pub use cache::{CacheDirectives, CacheMiddleware};
pub use interpret::ErrorInterpreter;
pub use network::{NetworkGuard, NetworkMonitor};
pub use report::{FailureReporter, FailureSink, SubscriptionId};

pub use mallard_core::{
    AccessToken, CacheKey, ExchangeError, ExchangeResult, Exchanger, KeyProvider, TokenProvider,
};
