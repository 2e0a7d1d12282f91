//! The auth middleware and its builder.

use std::sync::Arc;

use async_trait::async_trait;
use bytes::Bytes;
use http::header::{AUTHORIZATION, HeaderValue};
use http::Request;
use mallard_core::{AccessToken, ExchangeError, ExchangeResult, Exchanger, TokenProvider};
use tokio::sync::Mutex;
use tokio_util::sync::CancellationToken;
use tracing::{debug, warn};

use super::predicates::{
    HasAuthorizationHeader, StatusUnauthorized, TokenRequirement, UnauthorizedPredicate,
};
use crate::NotSet;

/// Exchanger middleware that manages the Authorization header.
///
/// Per request, the middleware:
///
/// 1. Asks its [`TokenRequirement`] whether the request wants a token
///    (default: it carries an Authorization header). Requests that don't
///    are forwarded untouched.
/// 2. Fetches the current token and rewrites the Authorization parameter,
///    preserving whatever scheme the caller put on the request. An absent
///    token removes the header.
/// 3. Forwards the request. A response matching the
///    [`UnauthorizedPredicate`] (default: status 401) triggers at most one
///    refresh through the provider and one retry with the refreshed token.
/// 4. When no usable token can be obtained (the token cannot be refreshed,
///    or the refresh yields nothing), the 401 response is returned as-is
///    and the session-expired notification fires, at most once per distinct
///    token value.
///
/// The middleware keeps a handler-local copy of the last expired access
/// token as a fallback de-duplication; the authoritative guard lives in the
/// shared provider. Configure one provider per identity realm and share it
/// across handlers.
pub struct AuthMiddleware<P, E> {
    provider: Arc<P>,
    inner: E,
    unauthorized: Box<dyn UnauthorizedPredicate>,
    requirement: Box<dyn TokenRequirement>,
    last_expired_access_token: Mutex<Option<String>>,
}

impl AuthMiddleware<NotSet, NotSet> {
    /// Creates a new builder.
    ///
    /// [`provider()`](AuthMiddlewareBuilder::provider) and
    /// [`upstream()`](AuthMiddlewareBuilder::upstream) must be called before
    /// [`build()`](AuthMiddlewareBuilder::build).
    pub fn builder() -> AuthMiddlewareBuilder<NotSet, NotSet> {
        AuthMiddlewareBuilder::new()
    }
}

impl<P, E> AuthMiddleware<P, E>
where
    P: TokenProvider,
    E: Exchanger,
{
    /// Notifies session expiry through the provider, at most once per
    /// distinct access-token value observed by this handler.
    async fn notify_expired_once(
        &self,
        request: &Request<Bytes>,
        token: &P::Token,
        cancel: &CancellationToken,
    ) -> Result<(), ExchangeError> {
        let access = token.access_token().unwrap_or_default();
        let mut last = self.last_expired_access_token.lock().await;
        if last.as_deref() == Some(access) {
            return Ok(());
        }
        self.provider
            .notify_session_expired(request, token, cancel)
            .await?;
        *last = Some(access.to_owned());
        Ok(())
    }
}

/// Deep-copies a request; bodies are `Bytes`, so this is cheap.
fn clone_request(request: &Request<Bytes>) -> Request<Bytes> {
    let mut cloned = Request::new(request.body().clone());
    *cloned.method_mut() = request.method().clone();
    *cloned.uri_mut() = request.uri().clone();
    *cloned.version_mut() = request.version();
    *cloned.headers_mut() = request.headers().clone();
    cloned
}

/// Rewrites the Authorization parameter with the token's access value,
/// preserving the scheme already on the request. An absent or empty access
/// value removes the header entirely.
fn apply_token<T: AccessToken>(
    mut request: Request<Bytes>,
    token: Option<&T>,
) -> Result<Request<Bytes>, ExchangeError> {
    let access = token
        .and_then(|token| token.access_token())
        .filter(|access| !access.is_empty());
    match access {
        Some(access) => {
            let scheme = request
                .headers()
                .get(AUTHORIZATION)
                .and_then(|value| value.to_str().ok())
                .and_then(|value| value.split_whitespace().next())
                .unwrap_or("Bearer")
                .to_owned();
            let value = HeaderValue::from_str(&format!("{scheme} {access}"))
                .map_err(ExchangeError::token)?;
            request.headers_mut().insert(AUTHORIZATION, value);
        }
        None => {
            request.headers_mut().remove(AUTHORIZATION);
        }
    }
    Ok(request)
}

#[async_trait]
impl<P, E> Exchanger for AuthMiddleware<P, E>
where
    P: TokenProvider + 'static,
    E: Exchanger,
{
    async fn exchange(
        &self,
        request: Request<Bytes>,
        cancel: &CancellationToken,
    ) -> ExchangeResult {
        if !self.requirement.requires_token(&request) {
            return self.inner.exchange(request, cancel).await;
        }

        let token = self.provider.get_token(&request, cancel).await?;
        let outgoing = apply_token(request, token.as_ref())?;
        let sent = clone_request(&outgoing);
        let response = self.inner.exchange(outgoing, cancel).await?;

        if !self.unauthorized.is_unauthorized(&sent, &response) {
            return Ok(response);
        }

        // Unauthorized. Without a token there is no session to expire and
        // nothing to refresh.
        let Some(token) = token else {
            return Ok(response);
        };

        if !token.can_be_refreshed() {
            debug!("unauthorized response for unrefreshable token");
            self.notify_expired_once(&sent, &token, cancel).await?;
            return Ok(response);
        }

        let refreshed = match self.provider.refresh_token(&sent, &token, cancel).await {
            Ok(refreshed) => refreshed,
            Err(ExchangeError::Cancelled) => return Err(ExchangeError::Cancelled),
            Err(error) => {
                warn!(%error, "token refresh failed");
                None
            }
        };
        let Some(refreshed) = refreshed else {
            self.notify_expired_once(&sent, &token, cancel).await?;
            return Ok(response);
        };

        let retry = apply_token(sent, Some(&refreshed))?;
        let retried = clone_request(&retry);
        let retry_response = self.inner.exchange(retry, cancel).await?;

        if self.unauthorized.is_unauthorized(&retried, &retry_response) {
            debug!("refreshed token rejected; session expired");
            self.notify_expired_once(&retried, &refreshed, cancel)
                .await?;
        }
        Ok(retry_response)
    }
}

/// Builder for [`AuthMiddleware`].
pub struct AuthMiddlewareBuilder<P, E> {
    provider: P,
    inner: E,
    unauthorized: Box<dyn UnauthorizedPredicate>,
    requirement: Box<dyn TokenRequirement>,
}

impl AuthMiddlewareBuilder<NotSet, NotSet> {
    /// Creates a new builder. Equivalent to [`AuthMiddleware::builder()`].
    pub fn new() -> Self {
        Self {
            provider: NotSet,
            inner: NotSet,
            unauthorized: Box::new(StatusUnauthorized),
            requirement: Box::new(HasAuthorizationHeader),
        }
    }
}

impl Default for AuthMiddlewareBuilder<NotSet, NotSet> {
    fn default() -> Self {
        Self::new()
    }
}

impl<P, E> AuthMiddlewareBuilder<P, E> {
    /// Sets the token provider, shared with other handlers via `Arc`.
    pub fn provider<NP>(self, provider: Arc<NP>) -> AuthMiddlewareBuilder<Arc<NP>, E>
    where
        NP: TokenProvider,
    {
        AuthMiddlewareBuilder {
            provider,
            inner: self.inner,
            unauthorized: self.unauthorized,
            requirement: self.requirement,
        }
    }

    /// Sets the inner exchanger the middleware forwards to.
    pub fn upstream<NE>(self, inner: NE) -> AuthMiddlewareBuilder<P, NE>
    where
        NE: Exchanger,
    {
        AuthMiddlewareBuilder {
            provider: self.provider,
            inner,
            unauthorized: self.unauthorized,
            requirement: self.requirement,
        }
    }

    /// Overrides unauthorized detection. Defaults to [`StatusUnauthorized`].
    pub fn unauthorized_predicate(
        mut self,
        predicate: impl UnauthorizedPredicate + 'static,
    ) -> Self {
        self.unauthorized = Box::new(predicate);
        self
    }

    /// Overrides the include-token decision. Defaults to
    /// [`HasAuthorizationHeader`].
    pub fn token_requirement(mut self, requirement: impl TokenRequirement + 'static) -> Self {
        self.requirement = Box::new(requirement);
        self
    }
}

impl<P, E> AuthMiddlewareBuilder<Arc<P>, E>
where
    P: TokenProvider,
    E: Exchanger,
{
    /// Builds the auth middleware.
    pub fn build(self) -> AuthMiddleware<P, E> {
        AuthMiddleware {
            provider: self.provider,
            inner: self.inner,
            unauthorized: self.unauthorized,
            requirement: self.requirement,
            last_expired_access_token: Mutex::new(None),
        }
    }
}
