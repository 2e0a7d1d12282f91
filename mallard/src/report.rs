//! Failure-sink reporting.
//!
//! A [`FailureSink`] is a process-wide observer list for failures raised
//! anywhere in a middleware chain. [`FailureReporter`] is the middleware
//! that feeds it: every failure bubbling through the layer is published to
//! the sink, then re-propagated unchanged.

use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::{Arc, PoisonError, RwLock};

use async_trait::async_trait;
use bytes::Bytes;
use http::Request;
use mallard_core::{ExchangeError, ExchangeResult, Exchanger};
use tokio_util::sync::CancellationToken;
use tracing::debug;

type FailureHandler = Arc<dyn Fn(&ExchangeError) + Send + Sync>;

/// Handle returned by [`FailureSink::subscribe`], used to unsubscribe.
#[derive(Clone, Copy, Debug, Eq, PartialEq)]
pub struct SubscriptionId(u64);

/// Shared observer list for reported failures.
///
/// Publication is a synchronous fan-out over the handlers registered at
/// that moment. Handlers must not panic; a handler that needs to do real
/// work should hand the failure off to its own channel.
///
/// Cloning is cheap — clones share the same handler list.
#[derive(Clone, Default)]
pub struct FailureSink {
    handlers: Arc<RwLock<Vec<(SubscriptionId, FailureHandler)>>>,
    next_id: Arc<AtomicU64>,
}

impl FailureSink {
    /// Creates an empty sink.
    pub fn new() -> Self {
        Self::default()
    }

    /// Registers a handler; returns the id to [`unsubscribe`](Self::unsubscribe) with.
    pub fn subscribe(
        &self,
        handler: impl Fn(&ExchangeError) + Send + Sync + 'static,
    ) -> SubscriptionId {
        let id = SubscriptionId(self.next_id.fetch_add(1, Ordering::Relaxed));
        self.handlers
            .write()
            .unwrap_or_else(PoisonError::into_inner)
            .push((id, Arc::new(handler)));
        id
    }

    /// Removes a handler. Returns `false` when the id was already gone.
    pub fn unsubscribe(&self, id: SubscriptionId) -> bool {
        let mut handlers = self
            .handlers
            .write()
            .unwrap_or_else(PoisonError::into_inner);
        let before = handlers.len();
        handlers.retain(|(registered, _)| *registered != id);
        handlers.len() != before
    }

    /// Fans the failure out to every registered handler, synchronously.
    pub fn publish(&self, error: &ExchangeError) {
        // Snapshot under the read lock so a handler may subscribe or
        // unsubscribe without deadlocking.
        let handlers: Vec<FailureHandler> = self
            .handlers
            .read()
            .unwrap_or_else(PoisonError::into_inner)
            .iter()
            .map(|(_, handler)| handler.clone())
            .collect();
        debug!(count = handlers.len(), "publishing failure to sink");
        for handler in handlers {
            handler(error);
        }
    }
}

/// Exchanger middleware publishing failures to a [`FailureSink`].
pub struct FailureReporter<E> {
    sink: FailureSink,
    inner: E,
}

impl<E> FailureReporter<E>
where
    E: Exchanger,
{
    /// Creates the reporter around an inner exchanger.
    pub fn new(sink: FailureSink, inner: E) -> Self {
        Self { sink, inner }
    }
}

#[async_trait]
impl<E> Exchanger for FailureReporter<E>
where
    E: Exchanger,
{
    async fn exchange(
        &self,
        request: Request<Bytes>,
        cancel: &CancellationToken,
    ) -> ExchangeResult {
        match self.inner.exchange(request, cancel).await {
            Ok(response) => Ok(response),
            Err(error) => {
                self.sink.publish(&error);
                Err(error)
            }
        }
    }
}
