//! The cache middleware and its builder.

use std::sync::Arc;
use std::time::Duration;

use async_trait::async_trait;
use bytes::Bytes;
use http::{Method, Request, Response};
use mallard_backend::CacheBackend;
use mallard_core::{CacheKey, ExchangeResult, Exchanger, KeyProvider};
use tokio_util::sync::CancellationToken;
use tracing::{debug, warn};

use super::directives::CacheDirectives;
use super::keys::UriKey;
use crate::NotSet;

/// Exchanger middleware serving GET requests from a keyed bytes store.
///
/// Behavior is driven entirely by the request's directive headers (see
/// [`directives`](crate::cache::directives)), which are consumed here and
/// never forwarded:
///
/// 1. Non-GET requests pass through untouched.
/// 2. `Disable` wins over everything; the request is forwarded (stripped)
///    with no cache interaction.
/// 3. A request is cacheable iff it carries a `TTL` directive. Cacheable
///    requests read the store first unless `ForceRefresh` is set, and
///    populate it from any 2xx response.
///
/// A hit is served as a synthetic response: status 200 and the stored bytes
/// as the body. The original status line, headers and content-type are not
/// reconstructed; callers that need richer replay must use a different
/// cache.
///
/// Backend failures degrade rather than fail the exchange: a failed read is
/// a miss, a failed write is logged and the network response is returned
/// regardless.
pub struct CacheMiddleware<B, K, E> {
    backend: Arc<B>,
    keys: K,
    inner: E,
}

impl CacheMiddleware<NotSet, UriKey, NotSet> {
    /// Creates a new builder.
    ///
    /// [`backend()`](CacheMiddlewareBuilder::backend) and
    /// [`upstream()`](CacheMiddlewareBuilder::upstream) must be called
    /// before [`build()`](CacheMiddlewareBuilder::build); the key provider
    /// defaults to [`UriKey`].
    pub fn builder() -> CacheMiddlewareBuilder<NotSet, UriKey, NotSet> {
        CacheMiddlewareBuilder::new()
    }
}

impl<B, K, E> CacheMiddleware<B, K, E>
where
    B: CacheBackend,
    K: KeyProvider,
    E: Exchanger,
{
    /// Creates the middleware from explicit components.
    ///
    /// Prefer [`CacheMiddleware::builder()`].
    pub fn new(backend: Arc<B>, keys: K, inner: E) -> Self {
        Self {
            backend,
            keys,
            inner,
        }
    }

    async fn exchange_and_store(
        &self,
        request: Request<Bytes>,
        key: &CacheKey,
        ttl: Duration,
        cancel: &CancellationToken,
    ) -> ExchangeResult {
        let response = self.inner.exchange(request, cancel).await?;

        // A cancellation observed after the exchange means the caller is
        // gone; storing now could persist a payload nobody validated.
        if response.status().is_success() && !cancel.is_cancelled() {
            let payload = response.body().clone();
            if let Err(error) = self.backend.add(key, payload, ttl, cancel).await {
                warn!(key = %key, %error, "cache store failed");
            }
        }
        Ok(response)
    }
}

/// A cache hit rendered as a response: status 200, stored bytes as body.
fn cached_response(payload: Bytes) -> Response<Bytes> {
    Response::new(payload)
}

#[async_trait]
impl<B, K, E> Exchanger for CacheMiddleware<B, K, E>
where
    B: CacheBackend + 'static,
    K: KeyProvider + 'static,
    E: Exchanger,
{
    async fn exchange(
        &self,
        mut request: Request<Bytes>,
        cancel: &CancellationToken,
    ) -> ExchangeResult {
        if *request.method() != Method::GET {
            return self.inner.exchange(request, cancel).await;
        }

        let directives = CacheDirectives::strip(&mut request)?;
        if directives.disable {
            debug!(uri = %request.uri(), "cache disabled for request");
            return self.inner.exchange(request, cancel).await;
        }
        let Some(ttl) = directives.ttl else {
            return self.inner.exchange(request, cancel).await;
        };

        let key = self.keys.key(&request);
        if !directives.force_refresh {
            match self.backend.try_get(&key, cancel).await {
                Ok(Some(payload)) => {
                    debug!(key = %key, "cache hit");
                    return Ok(cached_response(payload));
                }
                Ok(None) => debug!(key = %key, "cache miss"),
                Err(error) => warn!(key = %key, %error, "cache read failed"),
            }
        }

        self.exchange_and_store(request, &key, ttl, cancel).await
    }
}

/// Builder for [`CacheMiddleware`].
pub struct CacheMiddlewareBuilder<B, K, E> {
    backend: B,
    keys: K,
    inner: E,
}

impl CacheMiddlewareBuilder<NotSet, UriKey, NotSet> {
    /// Creates a new builder. Equivalent to [`CacheMiddleware::builder()`].
    pub fn new() -> Self {
        Self {
            backend: NotSet,
            keys: UriKey::new(),
            inner: NotSet,
        }
    }
}

impl Default for CacheMiddlewareBuilder<NotSet, UriKey, NotSet> {
    fn default() -> Self {
        Self::new()
    }
}

impl<B, K, E> CacheMiddlewareBuilder<B, K, E> {
    /// Sets the cache backend.
    pub fn backend<NB>(self, backend: NB) -> CacheMiddlewareBuilder<Arc<NB>, K, E>
    where
        NB: CacheBackend,
    {
        CacheMiddlewareBuilder {
            backend: Arc::new(backend),
            keys: self.keys,
            inner: self.inner,
        }
    }

    /// Sets the key provider. Defaults to [`UriKey`].
    pub fn key_provider<NK>(self, keys: NK) -> CacheMiddlewareBuilder<B, NK, E>
    where
        NK: KeyProvider,
    {
        CacheMiddlewareBuilder {
            backend: self.backend,
            keys,
            inner: self.inner,
        }
    }

    /// Sets the inner exchanger the middleware forwards to.
    pub fn upstream<NE>(self, inner: NE) -> CacheMiddlewareBuilder<B, K, NE>
    where
        NE: Exchanger,
    {
        CacheMiddlewareBuilder {
            backend: self.backend,
            keys: self.keys,
            inner,
        }
    }
}

impl<B, K, E> CacheMiddlewareBuilder<Arc<B>, K, E>
where
    B: CacheBackend,
    K: KeyProvider,
    E: Exchanger,
{
    /// Builds the cache middleware.
    pub fn build(self) -> CacheMiddleware<B, K, E> {
        CacheMiddleware {
            backend: self.backend,
            keys: self.keys,
            inner: self.inner,
        }
    }
}
