//! Cache middleware.
//!
//! Caching is opted into per request through directive headers (see
//! [`directives`]); the middleware consumes them, consults the backend
//! according to the precedence rules, and strips the directives so they
//! never reach the network.

pub mod directives;
pub mod keys;
mod middleware;

pub use directives::CacheDirectives;
pub use keys::{HashedAuthorizationKey, UriKey};
pub use middleware::{CacheMiddleware, CacheMiddlewareBuilder};
