//! Test doubles shared by the integration tests.

use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::{Arc, Mutex as StdMutex, MutexGuard};
use std::time::Duration;

use async_trait::async_trait;
use bytes::Bytes;
use http::{Request, Response};
use mallard_backend::{BackendResult, CacheBackend};
use mallard_core::{AccessToken, CacheKey, ExchangeError, ExchangeResult, Exchanger};
use tokio::sync::Mutex;
use tokio_util::sync::CancellationToken;

/// Scripted exchanger recording every request it sees.
pub struct MockExchanger {
    responder: Box<dyn Fn(&Request<Bytes>) -> ExchangeResult + Send + Sync>,
    exchange_count: AtomicUsize,
    requests: StdMutex<Vec<Request<Bytes>>>,
}

impl MockExchanger {
    /// Creates an exchanger answering with the given responder.
    pub fn new(
        responder: impl Fn(&Request<Bytes>) -> ExchangeResult + Send + Sync + 'static,
    ) -> Self {
        Self {
            responder: Box::new(responder),
            exchange_count: AtomicUsize::new(0),
            requests: StdMutex::new(Vec::new()),
        }
    }

    /// Creates an exchanger that always answers with a fixed status and body.
    pub fn always(status: u16, body: &'static str) -> Self {
        Self::new(move |_| {
            Ok(Response::builder()
                .status(status)
                .body(Bytes::from_static(body.as_bytes()))
                .unwrap())
        })
    }

    /// Number of exchanges performed.
    pub fn exchange_count(&self) -> usize {
        self.exchange_count.load(Ordering::SeqCst)
    }

    /// The requests seen so far, in order.
    pub fn recorded(&self) -> MutexGuard<'_, Vec<Request<Bytes>>> {
        self.requests.lock().unwrap()
    }
}

fn clone_request(request: &Request<Bytes>) -> Request<Bytes> {
    let mut cloned = Request::new(request.body().clone());
    *cloned.method_mut() = request.method().clone();
    *cloned.uri_mut() = request.uri().clone();
    *cloned.version_mut() = request.version();
    *cloned.headers_mut() = request.headers().clone();
    cloned
}

#[async_trait]
impl Exchanger for MockExchanger {
    async fn exchange(
        &self,
        request: Request<Bytes>,
        _cancel: &CancellationToken,
    ) -> ExchangeResult {
        self.exchange_count.fetch_add(1, Ordering::SeqCst);
        let response = (self.responder)(&request);
        self.requests.lock().unwrap().push(clone_request(&request));
        response
    }
}

/// Operation counters for [`CountingBackend`].
#[derive(Debug, Default)]
pub struct BackendCounters {
    add_count: AtomicUsize,
    try_get_count: AtomicUsize,
    clear_count: AtomicUsize,
    last_ttl: StdMutex<Option<Duration>>,
}

impl BackendCounters {
    /// Number of `add` calls.
    pub fn add_count(&self) -> usize {
        self.add_count.load(Ordering::SeqCst)
    }

    /// Number of `try_get` calls.
    pub fn try_get_count(&self) -> usize {
        self.try_get_count.load(Ordering::SeqCst)
    }

    /// Number of `clear` calls.
    pub fn clear_count(&self) -> usize {
        self.clear_count.load(Ordering::SeqCst)
    }

    /// TTL passed to the most recent `add`.
    pub fn last_ttl(&self) -> Option<Duration> {
        *self.last_ttl.lock().unwrap()
    }
}

/// Backend wrapper counting operations on the way through.
#[derive(Clone)]
pub struct CountingBackend<B> {
    inner: B,
    /// Shared counters; clones observe the same counts.
    pub counters: Arc<BackendCounters>,
}

impl<B> CountingBackend<B>
where
    B: CacheBackend,
{
    /// Wraps a backend.
    pub fn new(inner: B) -> Self {
        Self {
            inner,
            counters: Arc::new(BackendCounters::default()),
        }
    }
}

#[async_trait]
impl<B> CacheBackend for CountingBackend<B>
where
    B: CacheBackend,
{
    async fn add(
        &self,
        key: &CacheKey,
        payload: Bytes,
        ttl: Duration,
        cancel: &CancellationToken,
    ) -> BackendResult<()> {
        self.counters.add_count.fetch_add(1, Ordering::SeqCst);
        *self.counters.last_ttl.lock().unwrap() = Some(ttl);
        self.inner.add(key, payload, ttl, cancel).await
    }

    async fn try_get(
        &self,
        key: &CacheKey,
        cancel: &CancellationToken,
    ) -> BackendResult<Option<Bytes>> {
        self.counters.try_get_count.fetch_add(1, Ordering::SeqCst);
        self.inner.try_get(key, cancel).await
    }

    async fn clear(&self, cancel: &CancellationToken) -> BackendResult<()> {
        self.counters.clear_count.fetch_add(1, Ordering::SeqCst);
        self.inner.clear(cancel).await
    }
}

/// Token double exposing exactly the two observables the middleware needs.
#[derive(Clone, Debug, Eq, PartialEq)]
pub struct TestToken {
    /// The access credential, if any.
    pub access: Option<String>,
    /// Whether refreshing could succeed.
    pub refreshable: bool,
}

impl TestToken {
    /// A refreshable token with the given access value.
    pub fn refreshable(access: &str) -> Self {
        Self {
            access: Some(access.to_owned()),
            refreshable: true,
        }
    }

    /// A token that cannot be refreshed.
    pub fn unrefreshable(access: &str) -> Self {
        Self {
            access: Some(access.to_owned()),
            refreshable: false,
        }
    }
}

impl AccessToken for TestToken {
    fn access_token(&self) -> Option<&str> {
        self.access.as_deref()
    }

    fn can_be_refreshed(&self) -> bool {
        self.refreshable
    }
}

type RefreshFn =
    Box<dyn Fn(&TestToken) -> Result<Option<TestToken>, ExchangeError> + Send + Sync>;

/// Scripted token source with counters.
///
/// A successful scripted refresh replaces the current token, mirroring a
/// real source whose refresh rotates its stored credentials.
pub struct TestTokenSource {
    current: Mutex<Option<TestToken>>,
    refresh: RefreshFn,
    refresh_delay: Option<Duration>,
    get_count: AtomicUsize,
    refresh_count: AtomicUsize,
    expired: StdMutex<Vec<String>>,
}

impl TestTokenSource {
    /// Creates a source holding `current`, whose refresh always fails over
    /// to "session gone" until scripted otherwise.
    pub fn new(current: Option<TestToken>) -> Self {
        Self {
            current: Mutex::new(current),
            refresh: Box::new(|_| Ok(None)),
            refresh_delay: None,
            get_count: AtomicUsize::new(0),
            refresh_count: AtomicUsize::new(0),
            expired: StdMutex::new(Vec::new()),
        }
    }

    /// Scripts the refresh outcome.
    pub fn with_refresh(
        mut self,
        refresh: impl Fn(&TestToken) -> Result<Option<TestToken>, ExchangeError>
        + Send
        + Sync
        + 'static,
    ) -> Self {
        self.refresh = Box::new(refresh);
        self
    }

    /// Makes every refresh take this long, for single-flight tests.
    pub fn with_refresh_delay(mut self, delay: Duration) -> Self {
        self.refresh_delay = Some(delay);
        self
    }

    /// Number of `current_token` reads.
    pub fn get_count(&self) -> usize {
        self.get_count.load(Ordering::SeqCst)
    }

    /// Number of refresh attempts actually executed.
    pub fn refresh_count(&self) -> usize {
        self.refresh_count.load(Ordering::SeqCst)
    }

    /// Access values for which the session-expired hook fired, in order.
    pub fn expired(&self) -> Vec<String> {
        self.expired.lock().unwrap().clone()
    }
}

#[async_trait]
impl mallard::TokenSource for TestTokenSource {
    type Token = TestToken;

    async fn current_token(&self) -> Result<Option<TestToken>, ExchangeError> {
        self.get_count.fetch_add(1, Ordering::SeqCst);
        Ok(self.current.lock().await.clone())
    }

    async fn refresh(&self, unauthorized: &TestToken) -> Result<Option<TestToken>, ExchangeError> {
        self.refresh_count.fetch_add(1, Ordering::SeqCst);
        if let Some(delay) = self.refresh_delay {
            tokio::time::sleep(delay).await;
        }
        let refreshed = (self.refresh)(unauthorized)?;
        if let Some(token) = &refreshed {
            *self.current.lock().await = Some(token.clone());
        }
        Ok(refreshed)
    }

    async fn session_expired(&self, expired: &TestToken) {
        self.expired
            .lock()
            .unwrap()
            .push(expired.access.clone().unwrap_or_default());
    }
}
