//! Cache backend contract.
//!
//! A backend is a keyed bytes store with per-entry time-to-live. The cache
//! middleware never interprets payloads; it stores the response body it saw
//! and serves the same bytes back on a hit.
//!
//! Implementations must be safe to share across concurrent requests. Writes
//! must be visible to subsequent reads; no ordering is required between
//! concurrent writes to the same key (last writer wins).

#![warn(missing_docs)]

use std::time::Duration;

use async_trait::async_trait;
use bytes::Bytes;
use mallard_core::CacheKey;
use thiserror::Error;
use tokio_util::sync::CancellationToken;

/// Error type for backend operations.
#[derive(Debug, Error)]
pub enum BackendError {
    /// Internal backend error, state or computation error.
    #[error(transparent)]
    Internal(Box<dyn std::error::Error + Send + Sync>),

    /// Errors occurring during communication with remote backends.
    #[error(transparent)]
    Connection(Box<dyn std::error::Error + Send + Sync>),
}

/// Result alias for backend operations.
pub type BackendResult<T> = Result<T, BackendError>;

/// Keyed bytes store with per-entry TTL.
///
/// # Cancellation
///
/// Every operation takes the request's cancellation token. A tripped token
/// turns `add` into a no-op and `try_get` into a miss, so a request cancelled
/// mid-write cannot poison the store and a cancelled read never fabricates
/// work for the caller.
#[async_trait]
pub trait CacheBackend: Send + Sync {
    /// Stores `payload` under `key`, expiring `ttl` from now.
    ///
    /// A later `add` for the same key replaces the entry and its expiry.
    async fn add(
        &self,
        key: &CacheKey,
        payload: Bytes,
        ttl: Duration,
        cancel: &CancellationToken,
    ) -> BackendResult<()>;

    /// Looks up `key`, returning the payload of a live entry.
    ///
    /// An entry is live while its expiry lies strictly in the future;
    /// expired entries are treated as absent.
    async fn try_get(
        &self,
        key: &CacheKey,
        cancel: &CancellationToken,
    ) -> BackendResult<Option<Bytes>>;

    /// Removes every entry.
    async fn clear(&self, cancel: &CancellationToken) -> BackendResult<()>;
}

#[async_trait]
impl<B> CacheBackend for std::sync::Arc<B>
where
    B: CacheBackend + ?Sized,
{
    async fn add(
        &self,
        key: &CacheKey,
        payload: Bytes,
        ttl: Duration,
        cancel: &CancellationToken,
    ) -> BackendResult<()> {
        self.as_ref().add(key, payload, ttl, cancel).await
    }

    async fn try_get(
        &self,
        key: &CacheKey,
        cancel: &CancellationToken,
    ) -> BackendResult<Option<Bytes>> {
        self.as_ref().try_get(key, cancel).await
    }

    async fn clear(&self, cancel: &CancellationToken) -> BackendResult<()> {
        self.as_ref().clear(cancel).await
    }
}
