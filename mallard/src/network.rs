//! Offline detection wrapper.

use async_trait::async_trait;
use bytes::Bytes;
use http::Request;
use mallard_core::{ExchangeError, ExchangeResult, Exchanger};
use tokio_util::sync::CancellationToken;
use tracing::warn;

/// Answers "is the network reachable right now?".
///
/// Implemented for closures, so platform connectivity APIs plug in without
/// a named type.
pub trait NetworkMonitor: Send + Sync {
    /// Returns `true` while the device has network connectivity.
    fn is_available(&self) -> bool;
}

impl<F> NetworkMonitor for F
where
    F: Fn() -> bool + Send + Sync,
{
    fn is_available(&self) -> bool {
        (self)()
    }
}

/// Exchanger middleware that types out offline failures.
///
/// When the inner exchange fails *and* the monitor reports the network as
/// unavailable, the original failure is wrapped in
/// [`ExchangeError::NetworkUnavailable`] so callers can distinguish "you are
/// offline" from server-side trouble. Every other outcome passes through
/// unchanged.
pub struct NetworkGuard<M, E> {
    monitor: M,
    inner: E,
}

impl<M, E> NetworkGuard<M, E>
where
    M: NetworkMonitor,
    E: Exchanger,
{
    /// Creates the guard around an inner exchanger.
    pub fn new(monitor: M, inner: E) -> Self {
        Self { monitor, inner }
    }
}

#[async_trait]
impl<M, E> Exchanger for NetworkGuard<M, E>
where
    M: NetworkMonitor,
    E: Exchanger,
{
    async fn exchange(
        &self,
        request: Request<Bytes>,
        cancel: &CancellationToken,
    ) -> ExchangeResult {
        match self.inner.exchange(request, cancel).await {
            Ok(response) => Ok(response),
            Err(error) if !self.monitor.is_available() => {
                warn!(%error, "exchange failed while offline");
                Err(ExchangeError::NetworkUnavailable {
                    source: Box::new(error),
                })
            }
            Err(error) => Err(error),
        }
    }
}
