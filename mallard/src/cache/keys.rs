//! Stock cache key providers.

use bytes::Bytes;
use http::Request;
use http::header::AUTHORIZATION;
use mallard_core::{CacheKey, KeyProvider};
use sha2::{Digest, Sha256};

/// Keys entries by the serialised request URI.
///
/// Suitable when every caller sharing the backend sees the same data for
/// the same URI.
#[derive(Clone, Copy, Debug, Default)]
pub struct UriKey;

impl UriKey {
    /// Creates the provider.
    pub fn new() -> Self {
        UriKey
    }
}

impl KeyProvider for UriKey {
    fn key(&self, request: &Request<Bytes>) -> CacheKey {
        CacheKey::new(request.uri().to_string())
    }
}

/// Keys entries by URI plus a hash of the caller's credential.
///
/// The uppercase hex SHA-256 of the Authorization header's parameter (the
/// part after the scheme) is appended to the URI, so two users hitting the
/// same endpoint with different credentials never share an entry. The
/// credential itself never appears in the key. Requests without an
/// Authorization parameter fall back to the plain URI.
#[derive(Clone, Copy, Debug, Default)]
pub struct HashedAuthorizationKey;

impl HashedAuthorizationKey {
    /// Creates the provider.
    pub fn new() -> Self {
        HashedAuthorizationKey
    }
}

impl KeyProvider for HashedAuthorizationKey {
    fn key(&self, request: &Request<Bytes>) -> CacheKey {
        let uri = request.uri().to_string();
        match authorization_parameter(request) {
            Some(parameter) => {
                let digest = Sha256::digest(parameter.as_bytes());
                CacheKey::new(format!("{uri}{}", hex::encode_upper(digest)))
            }
            None => CacheKey::new(uri),
        }
    }
}

/// The second whitespace-delimited component of the Authorization header,
/// if present and non-empty.
fn authorization_parameter(request: &Request<Bytes>) -> Option<&str> {
    request
        .headers()
        .get(AUTHORIZATION)
        .and_then(|value| value.to_str().ok())
        .and_then(|value| {
            let mut components = value.split_whitespace();
            components.next()?;
            components.next()
        })
        .filter(|parameter| !parameter.is_empty())
}
