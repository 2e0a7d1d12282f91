//! Pluggable decision points of the auth middleware.
//!
//! Both predicates accept closures, so ad-hoc overrides do not require a
//! named type:
//!
//! ```
//! use bytes::Bytes;
//! use http::{Request, Response};
//!
//! let teapot_is_unauthorized =
//!     |_request: &Request<Bytes>, response: &Response<Bytes>| {
//!         response.status().as_u16() == 418
//!     };
//! # let _ = &teapot_is_unauthorized;
//! ```

use bytes::Bytes;
use http::header::AUTHORIZATION;
use http::{Request, Response, StatusCode};

/// Decides whether a response means the attached token was rejected.
pub trait UnauthorizedPredicate: Send + Sync {
    /// Returns `true` when `response` is an authorization failure for the
    /// request as it was sent.
    fn is_unauthorized(&self, request: &Request<Bytes>, response: &Response<Bytes>) -> bool;
}

impl<F> UnauthorizedPredicate for F
where
    F: Fn(&Request<Bytes>, &Response<Bytes>) -> bool + Send + Sync,
{
    fn is_unauthorized(&self, request: &Request<Bytes>, response: &Response<Bytes>) -> bool {
        (self)(request, response)
    }
}

/// Default unauthorized detection: HTTP 401.
#[derive(Clone, Copy, Debug, Default)]
pub struct StatusUnauthorized;

impl UnauthorizedPredicate for StatusUnauthorized {
    fn is_unauthorized(&self, _request: &Request<Bytes>, response: &Response<Bytes>) -> bool {
        response.status() == StatusCode::UNAUTHORIZED
    }
}

/// Decides whether an outgoing request wants a token attached.
pub trait TokenRequirement: Send + Sync {
    /// Returns `true` when the middleware should manage this request's
    /// Authorization header.
    fn requires_token(&self, request: &Request<Bytes>) -> bool;
}

impl<F> TokenRequirement for F
where
    F: Fn(&Request<Bytes>) -> bool + Send + Sync,
{
    fn requires_token(&self, request: &Request<Bytes>) -> bool {
        (self)(request)
    }
}

/// Default opt-in: the request carries any Authorization header.
///
/// Callers tag a request as wanting a token by putting an Authorization
/// header on it, typically with the scheme and a placeholder parameter;
/// the middleware overwrites the parameter with the live credential.
#[derive(Clone, Copy, Debug, Default)]
pub struct HasAuthorizationHeader;

impl TokenRequirement for HasAuthorizationHeader {
    fn requires_token(&self, request: &Request<Bytes>) -> bool {
        request.headers().contains_key(AUTHORIZATION)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn request(authorization: Option<&str>) -> Request<Bytes> {
        let mut builder = Request::builder().uri("http://example.com/");
        if let Some(value) = authorization {
            builder = builder.header(AUTHORIZATION, value);
        }
        builder.body(Bytes::new()).unwrap()
    }

    fn response(status: u16) -> Response<Bytes> {
        Response::builder()
            .status(status)
            .body(Bytes::new())
            .unwrap()
    }

    #[test]
    fn status_predicate_matches_401_only() {
        let predicate = StatusUnauthorized;
        assert!(predicate.is_unauthorized(&request(None), &response(401)));
        assert!(!predicate.is_unauthorized(&request(None), &response(403)));
        assert!(!predicate.is_unauthorized(&request(None), &response(200)));
    }

    #[test]
    fn header_requirement_follows_the_header() {
        let requirement = HasAuthorizationHeader;
        assert!(requirement.requires_token(&request(Some("Bearer "))));
        assert!(!requirement.requires_token(&request(None)));
    }

    #[test]
    fn closures_are_predicates() {
        let predicate =
            |_: &Request<Bytes>, response: &Response<Bytes>| response.status().as_u16() == 403;
        assert!(predicate.is_unauthorized(&request(None), &response(403)));

        let requirement = |request: &Request<Bytes>| request.uri().path().starts_with("/api");
        assert!(!requirement.requires_token(&request(None)));
    }
}
