//! Body-error interpretation.
//!
//! Some services report domain failures inside the body of a non-success
//! response. [`ErrorInterpreter`] deserialises such bodies into a
//! caller-declared shape, applies a caller predicate, and raises a
//! caller-constructed failure when it matches, turning an HTTP-level
//! response into a typed error the application can handle.

use std::marker::PhantomData;

use async_trait::async_trait;
use bytes::Bytes;
use http::Request;
use mallard_core::error::BoxError;
use mallard_core::{ExchangeError, ExchangeResult, Exchanger};
use serde::de::DeserializeOwned;
use tokio_util::sync::CancellationToken;
use tracing::debug;

/// Exchanger middleware converting matching error bodies into failures.
///
/// On a non-2xx response the body is deserialised into `T` (JSON). When it
/// parses and the predicate holds, the exchange fails with
/// [`ExchangeError::Interpreted`] wrapping whatever the constructor built
/// from the shape. A body that does not parse, or that the predicate
/// rejects, leaves the response untouched.
pub struct ErrorInterpreter<T, E> {
    inner: E,
    predicate: Box<dyn Fn(&T) -> bool + Send + Sync>,
    construct: Box<dyn Fn(T) -> BoxError + Send + Sync>,
    _shape: PhantomData<fn() -> T>,
}

impl<T, E> ErrorInterpreter<T, E>
where
    T: DeserializeOwned + Send,
    E: Exchanger,
{
    /// Creates the interpreter around an inner exchanger.
    ///
    /// `predicate` decides whether the deserialised shape represents a
    /// failure; `construct` builds the error to raise from it.
    pub fn new(
        inner: E,
        predicate: impl Fn(&T) -> bool + Send + Sync + 'static,
        construct: impl Fn(T) -> BoxError + Send + Sync + 'static,
    ) -> Self {
        Self {
            inner,
            predicate: Box::new(predicate),
            construct: Box::new(construct),
            _shape: PhantomData,
        }
    }
}

#[async_trait]
impl<T, E> Exchanger for ErrorInterpreter<T, E>
where
    T: DeserializeOwned + Send,
    E: Exchanger,
{
    async fn exchange(
        &self,
        request: Request<Bytes>,
        cancel: &CancellationToken,
    ) -> ExchangeResult {
        let response = self.inner.exchange(request, cancel).await?;
        if response.status().is_success() {
            return Ok(response);
        }
        match serde_json::from_slice::<T>(response.body()) {
            Ok(shape) if (self.predicate)(&shape) => {
                debug!(status = %response.status(), "error body matched; raising typed failure");
                Err(ExchangeError::Interpreted((self.construct)(shape)))
            }
            _ => Ok(response),
        }
    }
}
