//! Reference token provider with single-flight refresh.

use async_trait::async_trait;
use bytes::Bytes;
use http::Request;
use mallard_core::{AccessToken, ExchangeError, TokenProvider};
use tokio::sync::Mutex;
use tokio_util::sync::CancellationToken;
use tracing::{debug, warn};

/// The identity-provider-specific half of token management.
///
/// A source knows how to read the current token, perform an actual refresh,
/// and deliver a session-expired event to the application. It does not need
/// to worry about concurrency: [`SharedTokenProvider`] serialises refreshes
/// and de-duplicates expiry notifications before the source ever runs.
#[async_trait]
pub trait TokenSource: Send + Sync {
    /// Concrete token type.
    type Token: AccessToken;

    /// Returns the currently-known token, if any.
    async fn current_token(&self) -> Result<Option<Self::Token>, ExchangeError>;

    /// Performs the refresh for a token observed to fail.
    ///
    /// A successful refresh must also become the source's current token, so
    /// that concurrent waiters re-reading [`current_token`](Self::current_token)
    /// observe it. Returning `Ok(None)` means the session cannot be
    /// recovered. Errors are swallowed by the provider (logged, mapped to
    /// `None`).
    async fn refresh(&self, unauthorized: &Self::Token)
    -> Result<Option<Self::Token>, ExchangeError>;

    /// Application hook invoked at most once per distinct expired token.
    async fn session_expired(&self, expired: &Self::Token);
}

/// Process-wide token provider enforcing single-flight refresh and
/// at-most-once session-expired notification.
///
/// Create one provider per identity realm, wrap it in an `Arc`, and hand it
/// to every [`AuthMiddleware`](crate::AuthMiddleware) addressing that realm.
/// The guarantees only hold across handlers that actually share the
/// instance.
///
/// # Refresh protocol
///
/// `refresh_token` acquires a binary semaphore before doing any work, so at
/// most one refresh runs at any instant. Waiters that acquire it afterwards
/// re-read the current token first: if its access value already differs from
/// the one they saw fail, a parallel refresh has won and they return it
/// without touching the network. Once the critical section begins, the
/// refresh runs to completion even if the caller cancels; only the waiting
/// phase observes cancellation.
pub struct SharedTokenProvider<S> {
    source: S,
    // Binary semaphore serialising refresh attempts.
    refresh_gate: Mutex<()>,
    last_expired_access_token: Mutex<Option<String>>,
}

impl<S> SharedTokenProvider<S> {
    /// Creates a provider over the given source.
    pub fn new(source: S) -> Self {
        Self {
            source,
            refresh_gate: Mutex::new(()),
            last_expired_access_token: Mutex::new(None),
        }
    }

    /// The underlying source.
    pub fn source(&self) -> &S {
        &self.source
    }
}

impl<S: TokenSource> SharedTokenProvider<S> {
    /// The refresh critical section. Runs with the gate held and must not
    /// observe the caller's cancellation token.
    async fn refresh_exclusive(
        &self,
        unauthorized: &S::Token,
    ) -> Result<Option<S::Token>, ExchangeError> {
        let Some(current) = self.source.current_token().await? else {
            return Ok(None);
        };
        if current.access_token() != unauthorized.access_token() {
            debug!("token already refreshed by a concurrent request");
            return Ok(Some(current));
        }
        if !current.can_be_refreshed() {
            return Ok(None);
        }
        self.source.refresh(&current).await
    }
}

#[async_trait]
impl<S> TokenProvider for SharedTokenProvider<S>
where
    S: TokenSource + 'static,
{
    type Token = S::Token;

    async fn get_token(
        &self,
        _request: &Request<Bytes>,
        _cancel: &CancellationToken,
    ) -> Result<Option<Self::Token>, ExchangeError> {
        self.source.current_token().await
    }

    async fn refresh_token(
        &self,
        _request: &Request<Bytes>,
        unauthorized: &Self::Token,
        cancel: &CancellationToken,
    ) -> Result<Option<Self::Token>, ExchangeError> {
        let _gate = tokio::select! {
            guard = self.refresh_gate.lock() => guard,
            _ = cancel.cancelled() => return Err(ExchangeError::Cancelled),
        };
        // Inside the critical section the caller's cancellation is ignored:
        // aborting a half-finished refresh would leave inconsistent state
        // for every waiter behind the gate.
        match self.refresh_exclusive(unauthorized).await {
            Ok(refreshed) => Ok(refreshed),
            Err(error) => {
                warn!(%error, "token refresh failed");
                Ok(None)
            }
        }
    }

    async fn notify_session_expired(
        &self,
        _request: &Request<Bytes>,
        expired: &Self::Token,
        _cancel: &CancellationToken,
    ) -> Result<(), ExchangeError> {
        let access = expired.access_token().unwrap_or_default().to_owned();
        let mut last = self.last_expired_access_token.lock().await;
        if last.as_deref() == Some(access.as_str()) {
            return Ok(());
        }
        *last = Some(access);
        self.source.session_expired(expired).await;
        Ok(())
    }
}
