//! Cache key derivation.

use std::fmt;

use bytes::Bytes;
use http::Request;

/// A stable string identifying a cached entry.
///
/// Keys are derived from outbound requests by a [`KeyProvider`]; the backend
/// treats them as opaque.
#[derive(Clone, Debug, Eq, PartialEq, Hash)]
pub struct CacheKey(String);

impl CacheKey {
    /// Creates a key from any string-like value.
    pub fn new(key: impl Into<String>) -> Self {
        CacheKey(key.into())
    }

    /// Returns the key as a string slice.
    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl fmt::Display for CacheKey {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

impl From<String> for CacheKey {
    fn from(key: String) -> Self {
        CacheKey(key)
    }
}

impl From<&str> for CacheKey {
    fn from(key: &str) -> Self {
        CacheKey(key.to_owned())
    }
}

impl AsRef<str> for CacheKey {
    fn as_ref(&self) -> &str {
        &self.0
    }
}

/// Derives a [`CacheKey`] from an outbound request.
///
/// Implementations must be deterministic: the same request observables must
/// always produce the same key, or cached entries become unreachable.
pub trait KeyProvider: Send + Sync {
    /// Computes the key for this request.
    fn key(&self, request: &Request<Bytes>) -> CacheKey;
}

impl<F> KeyProvider for F
where
    F: Fn(&Request<Bytes>) -> CacheKey + Send + Sync,
{
    fn key(&self, request: &Request<Bytes>) -> CacheKey {
        (self)(request)
    }
}
