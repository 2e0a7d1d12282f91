//! Authentication token middleware.
//!
//! [`AuthMiddleware`] attaches bearer tokens to outgoing requests, detects
//! unauthorized responses, drives a single refresh-and-retry cycle, and
//! surfaces session-expired events idempotently. Token acquisition lives
//! behind the [`TokenProvider`](mallard_core::TokenProvider) seam;
//! [`SharedTokenProvider`] is the reference implementation that serialises
//! refreshes across every handler sharing it.

mod middleware;
pub mod predicates;
mod provider;

pub use middleware::{AuthMiddleware, AuthMiddlewareBuilder};
pub use predicates::{
    HasAuthorizationHeader, StatusUnauthorized, TokenRequirement, UnauthorizedPredicate,
};
pub use provider::{SharedTokenProvider, TokenSource};
