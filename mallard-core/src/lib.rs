//! Core contracts for the mallard HTTP client middleware suite.
//!
//! This crate defines the small set of traits every middleware is built on:
//!
//! - [`Exchanger`] — the one-shot request → response contract. Every
//!   middleware consumes an inner exchanger and implements the trait itself,
//!   so chains compose by nesting.
//! - [`KeyProvider`] and [`CacheKey`] — derivation of stable cache keys
//!   from outbound requests.
//! - [`AccessToken`] and [`TokenProvider`] — the capability surface the
//!   authentication middleware needs from a token and its provider.
//! - [`ExchangeError`] — the failure taxonomy shared across the chain.
//!
//! The crate is protocol-model thin by design: requests and responses are
//! the [`http`] crate's types carrying materialised [`bytes::Bytes`] bodies,
//! and cancellation is a [`tokio_util::sync::CancellationToken`] observed
//! cooperatively at suspension points.

#![warn(missing_docs)]

pub mod error;
pub mod exchanger;
pub mod key;
pub mod token;

pub use error::ExchangeError;
pub use exchanger::{ExchangeResult, Exchanger};
pub use key::{CacheKey, KeyProvider};
pub use token::{AccessToken, TokenProvider};
