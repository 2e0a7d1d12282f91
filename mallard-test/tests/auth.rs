//! Integration tests for the auth middleware and the shared token provider.

use std::sync::Arc;
use std::time::Duration;

use async_trait::async_trait;
use bytes::Bytes;
use http::header::AUTHORIZATION;
use http::{Request, Response};
use mallard::{AuthMiddleware, ExchangeError, Exchanger, SharedTokenProvider};
use mallard_core::TokenProvider;
use mallard_test::{MockExchanger, TestToken, TestTokenSource};
use tokio_util::sync::CancellationToken;

fn tagged_request() -> Request<Bytes> {
    Request::builder()
        .uri("http://api.example.com/items")
        .header(AUTHORIZATION, "Bearer placeholder")
        .body(Bytes::new())
        .unwrap()
}

fn authorization_parameter(request: &Request<Bytes>) -> Option<String> {
    request
        .headers()
        .get(AUTHORIZATION)
        .and_then(|value| value.to_str().ok())
        .and_then(|value| value.split_whitespace().nth(1))
        .map(str::to_owned)
}

/// Responds 200 only when the Authorization parameter matches.
fn accept_only(valid: &'static str) -> MockExchanger {
    MockExchanger::new(move |request| {
        let status = match authorization_parameter(request) {
            Some(parameter) if parameter == valid => 200,
            _ => 401,
        };
        Ok(Response::builder()
            .status(status)
            .body(Bytes::new())
            .unwrap())
    })
}

fn auth_middleware(
    source: TestTokenSource,
    inner: Arc<MockExchanger>,
) -> (
    AuthMiddleware<SharedTokenProvider<TestTokenSource>, Arc<MockExchanger>>,
    Arc<SharedTokenProvider<TestTokenSource>>,
) {
    let provider = Arc::new(SharedTokenProvider::new(source));
    let middleware = AuthMiddleware::builder()
        .provider(provider.clone())
        .upstream(inner)
        .build();
    (middleware, provider)
}

#[tokio::test]
async fn authorized_request_passes_on_first_exchange() {
    let inner = Arc::new(accept_only("A1"));
    let source = TestTokenSource::new(Some(TestToken::unrefreshable("A1")));
    let (auth, provider) = auth_middleware(source, inner.clone());

    let response = auth
        .exchange(tagged_request(), &CancellationToken::new())
        .await
        .unwrap();

    assert_eq!(response.status().as_u16(), 200);
    assert_eq!(inner.exchange_count(), 1);
    let recorded = inner.recorded();
    assert_eq!(
        authorization_parameter(&recorded[0]).as_deref(),
        Some("A1")
    );
    drop(recorded);
    assert_eq!(provider.source().refresh_count(), 0);
    assert!(provider.source().expired().is_empty());
}

#[tokio::test]
async fn refresh_and_retry_succeeds() {
    let inner = Arc::new(accept_only("A2"));
    let source = TestTokenSource::new(Some(TestToken::refreshable("A1")))
        .with_refresh(|_| Ok(Some(TestToken::refreshable("A2"))));
    let (auth, provider) = auth_middleware(source, inner.clone());

    let response = auth
        .exchange(tagged_request(), &CancellationToken::new())
        .await
        .unwrap();

    assert_eq!(response.status().as_u16(), 200);
    assert_eq!(inner.exchange_count(), 2);
    let recorded = inner.recorded();
    assert_eq!(
        authorization_parameter(&recorded[0]).as_deref(),
        Some("A1")
    );
    assert_eq!(
        authorization_parameter(&recorded[1]).as_deref(),
        Some("A2")
    );
    drop(recorded);
    assert!(provider.source().expired().is_empty());
}

#[tokio::test]
async fn unrefreshable_token_expires_the_session() {
    let inner = Arc::new(accept_only("other"));
    let source = TestTokenSource::new(Some(TestToken::unrefreshable("A1")));
    let (auth, provider) = auth_middleware(source, inner.clone());

    let response = auth
        .exchange(tagged_request(), &CancellationToken::new())
        .await
        .unwrap();

    assert_eq!(response.status().as_u16(), 401);
    assert_eq!(inner.exchange_count(), 1);
    assert_eq!(provider.source().refresh_count(), 0);
    assert_eq!(provider.source().expired(), vec!["A1".to_owned()]);
}

#[tokio::test]
async fn refresh_returning_absent_expires_the_session() {
    let inner = Arc::new(accept_only("other"));
    let source =
        TestTokenSource::new(Some(TestToken::refreshable("A1"))).with_refresh(|_| Ok(None));
    let (auth, provider) = auth_middleware(source, inner.clone());

    let response = auth
        .exchange(tagged_request(), &CancellationToken::new())
        .await
        .unwrap();

    assert_eq!(response.status().as_u16(), 401);
    assert_eq!(inner.exchange_count(), 1);
    assert_eq!(provider.source().refresh_count(), 1);
    assert_eq!(provider.source().expired(), vec!["A1".to_owned()]);
}

#[tokio::test]
async fn failing_refresh_is_swallowed_and_expires_the_session() {
    let inner = Arc::new(accept_only("other"));
    let source = TestTokenSource::new(Some(TestToken::refreshable("A1")))
        .with_refresh(|_| Err(ExchangeError::upstream("identity provider down")));
    let (auth, provider) = auth_middleware(source, inner.clone());

    let response = auth
        .exchange(tagged_request(), &CancellationToken::new())
        .await
        .unwrap();

    assert_eq!(response.status().as_u16(), 401);
    assert_eq!(provider.source().expired(), vec!["A1".to_owned()]);
}

/// A provider whose refresh raises instead of swallowing, as a custom
/// (non-reference) implementation is permitted to do.
struct ThrowingProvider {
    token: TestToken,
}

#[async_trait]
impl TokenProvider for ThrowingProvider {
    type Token = TestToken;

    async fn get_token(
        &self,
        _request: &Request<Bytes>,
        _cancel: &CancellationToken,
    ) -> Result<Option<TestToken>, ExchangeError> {
        Ok(Some(self.token.clone()))
    }

    async fn refresh_token(
        &self,
        _request: &Request<Bytes>,
        _unauthorized: &TestToken,
        _cancel: &CancellationToken,
    ) -> Result<Option<TestToken>, ExchangeError> {
        Err(ExchangeError::token("refresh endpoint exploded"))
    }

    async fn notify_session_expired(
        &self,
        _request: &Request<Bytes>,
        _expired: &TestToken,
        _cancel: &CancellationToken,
    ) -> Result<(), ExchangeError> {
        Ok(())
    }
}

#[tokio::test]
async fn throwing_custom_provider_is_treated_as_session_expired() {
    let inner = Arc::new(accept_only("other"));
    let provider = Arc::new(ThrowingProvider {
        token: TestToken::refreshable("A1"),
    });
    let auth = AuthMiddleware::builder()
        .provider(provider)
        .upstream(inner.clone())
        .build();

    let response = auth
        .exchange(tagged_request(), &CancellationToken::new())
        .await
        .unwrap();

    // The refresh failure is swallowed; the caller sees the original 401.
    assert_eq!(response.status().as_u16(), 401);
    assert_eq!(inner.exchange_count(), 1);
}

#[tokio::test]
async fn concurrent_unauthorized_requests_refresh_once() {
    let inner = Arc::new(accept_only("A2"));
    let source = TestTokenSource::new(Some(TestToken::refreshable("A1")))
        .with_refresh(|_| Ok(Some(TestToken::refreshable("A2"))))
        .with_refresh_delay(Duration::from_millis(50));
    let (auth, provider) = auth_middleware(source, inner.clone());
    let auth = Arc::new(auth);

    let mut tasks = Vec::new();
    for _ in 0..8 {
        let auth = auth.clone();
        tasks.push(tokio::spawn(async move {
            auth.exchange(tagged_request(), &CancellationToken::new())
                .await
        }));
    }

    for task in tasks {
        let response = task.await.unwrap().unwrap();
        assert_eq!(response.status().as_u16(), 200);
    }

    assert_eq!(provider.source().refresh_count(), 1);
    assert!(provider.source().expired().is_empty());
}

#[tokio::test]
async fn session_expired_fires_once_per_token_value() {
    let inner = Arc::new(accept_only("other"));
    let source = TestTokenSource::new(Some(TestToken::unrefreshable("A1")));
    let (auth, provider) = auth_middleware(source, inner.clone());

    let cancel = CancellationToken::new();
    for _ in 0..3 {
        let response = auth.exchange(tagged_request(), &cancel).await.unwrap();
        assert_eq!(response.status().as_u16(), 401);
    }

    assert_eq!(provider.source().expired(), vec!["A1".to_owned()]);
}

#[tokio::test]
async fn session_expired_dedup_spans_handlers_sharing_the_provider() {
    let source = TestTokenSource::new(Some(TestToken::unrefreshable("A1")));
    let provider = Arc::new(SharedTokenProvider::new(source));
    let cancel = CancellationToken::new();

    let first = AuthMiddleware::builder()
        .provider(provider.clone())
        .upstream(Arc::new(accept_only("other")))
        .build();
    let second = AuthMiddleware::builder()
        .provider(provider.clone())
        .upstream(Arc::new(accept_only("other")))
        .build();

    first.exchange(tagged_request(), &cancel).await.unwrap();
    second.exchange(tagged_request(), &cancel).await.unwrap();

    assert_eq!(provider.source().expired(), vec!["A1".to_owned()]);
}

#[tokio::test]
async fn absent_token_removes_the_authorization_header() {
    let inner = Arc::new(MockExchanger::always(200, "ok"));
    let source = TestTokenSource::new(None);
    let (auth, _provider) = auth_middleware(source, inner.clone());

    auth.exchange(tagged_request(), &CancellationToken::new())
        .await
        .unwrap();

    let recorded = inner.recorded();
    assert!(recorded[0].headers().get(AUTHORIZATION).is_none());
}

#[tokio::test]
async fn untagged_requests_bypass_the_provider() {
    let inner = Arc::new(MockExchanger::always(200, "ok"));
    let source = TestTokenSource::new(Some(TestToken::refreshable("A1")));
    let (auth, provider) = auth_middleware(source, inner.clone());

    let request = Request::builder()
        .uri("http://api.example.com/public")
        .body(Bytes::new())
        .unwrap();
    auth.exchange(request, &CancellationToken::new())
        .await
        .unwrap();

    assert_eq!(provider.source().get_count(), 0);
    let recorded = inner.recorded();
    assert!(recorded[0].headers().get(AUTHORIZATION).is_none());
}

#[tokio::test]
async fn attachment_preserves_the_caller_scheme() {
    let inner = Arc::new(MockExchanger::always(200, "ok"));
    let source = TestTokenSource::new(Some(TestToken::unrefreshable("A1")));
    let (auth, _provider) = auth_middleware(source, inner.clone());

    let request = Request::builder()
        .uri("http://api.example.com/items")
        .header(AUTHORIZATION, "Token placeholder")
        .body(Bytes::new())
        .unwrap();
    auth.exchange(request, &CancellationToken::new())
        .await
        .unwrap();

    let recorded = inner.recorded();
    assert_eq!(
        recorded[0]
            .headers()
            .get(AUTHORIZATION)
            .unwrap()
            .to_str()
            .unwrap(),
        "Token A1"
    );
}

#[tokio::test]
async fn refreshed_token_rejected_again_expires_the_session() {
    // Upstream accepts nothing, so even the refreshed token gets a 401.
    let inner = Arc::new(accept_only("never"));
    let source = TestTokenSource::new(Some(TestToken::refreshable("A1")))
        .with_refresh(|_| Ok(Some(TestToken::refreshable("A2"))));
    let (auth, provider) = auth_middleware(source, inner.clone());

    let response = auth
        .exchange(tagged_request(), &CancellationToken::new())
        .await
        .unwrap();

    assert_eq!(response.status().as_u16(), 401);
    assert_eq!(inner.exchange_count(), 2);
    assert_eq!(provider.source().expired(), vec!["A2".to_owned()]);
}

#[tokio::test]
async fn upstream_failure_propagates_without_auth_side_effects() {
    let inner = Arc::new(MockExchanger::new(|_| {
        Err(ExchangeError::upstream("connection reset"))
    }));
    let source = TestTokenSource::new(Some(TestToken::refreshable("A1")));
    let (auth, provider) = auth_middleware(source, inner.clone());

    let error = auth
        .exchange(tagged_request(), &CancellationToken::new())
        .await
        .unwrap_err();

    assert!(matches!(error, ExchangeError::Upstream(_)));
    assert_eq!(provider.source().refresh_count(), 0);
    assert!(provider.source().expired().is_empty());
}
