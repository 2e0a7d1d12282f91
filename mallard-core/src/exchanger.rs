//! The request/response exchange contract.
//!
//! An [`Exchanger`] is anything that can take an outbound HTTP request and
//! yield a response or a failure. The bottom of a chain adapts an actual
//! HTTP client; every middleware above it wraps an inner exchanger and
//! implements the trait itself, so a chain is built by nesting:
//!
//! ```text
//! AuthMiddleware → CacheMiddleware → … → client adapter → network
//! ```
//!
//! Requests flow outward, responses and failures flow back inward.

use std::sync::Arc;

use async_trait::async_trait;
use bytes::Bytes;
use http::{Request, Response};
use tokio_util::sync::CancellationToken;

use crate::error::ExchangeError;

/// Result of a single exchange.
pub type ExchangeResult = Result<Response<Bytes>, ExchangeError>;

/// One-shot request → response contract.
///
/// Bodies are materialised [`Bytes`] on both sides, so requests can be
/// cheaply re-sent (the auth middleware retries once after a token refresh)
/// and response payloads can be stored by the cache middleware while the
/// caller still observes the same bytes.
///
/// Cancellation is cooperative: implementations may observe `cancel` at any
/// suspension point and bail out with [`ExchangeError::Cancelled`].
#[async_trait]
pub trait Exchanger: Send + Sync {
    /// Performs the exchange.
    async fn exchange(
        &self,
        request: Request<Bytes>,
        cancel: &CancellationToken,
    ) -> ExchangeResult;
}

#[async_trait]
impl<T> Exchanger for Arc<T>
where
    T: Exchanger + ?Sized,
{
    async fn exchange(
        &self,
        request: Request<Bytes>,
        cancel: &CancellationToken,
    ) -> ExchangeResult {
        self.as_ref().exchange(request, cancel).await
    }
}

#[async_trait]
impl<T> Exchanger for Box<T>
where
    T: Exchanger + ?Sized,
{
    async fn exchange(
        &self,
        request: Request<Bytes>,
        cancel: &CancellationToken,
    ) -> ExchangeResult {
        self.as_ref().exchange(request, cancel).await
    }
}

#[async_trait]
impl<T> Exchanger for &T
where
    T: Exchanger + ?Sized,
{
    async fn exchange(
        &self,
        request: Request<Bytes>,
        cancel: &CancellationToken,
    ) -> ExchangeResult {
        (*self).exchange(request, cancel).await
    }
}
