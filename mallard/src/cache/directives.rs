//! Request-scoped cache directive headers.
//!
//! Directives ride on the outbound request and are consumed by
//! [`CacheMiddleware`](crate::CacheMiddleware) before the request is
//! forwarded. Each directive may appear multiple times; the **last** value
//! wins, so an integration layer can set a global default and individual
//! call sites can override it by appending.

use bytes::Bytes;
use http::Request;
use http::header::{HeaderName, HeaderValue};
use mallard_core::ExchangeError;
use std::time::Duration;

/// Declares the entry cacheable and specifies its lifetime in seconds.
pub const TTL: HeaderName = HeaderName::from_static("x-mallard-simplecache-ttl");

/// Skip the cache read but still populate the store on success.
pub const FORCE_REFRESH: HeaderName =
    HeaderName::from_static("x-mallard-simplecache-forcerefresh");

/// Bypass the cache entirely. Takes precedence over the other directives.
pub const DISABLE: HeaderName = HeaderName::from_static("x-mallard-simplecache-disable");

/// Parsed cache directives for a single request.
#[derive(Clone, Debug, Default, Eq, PartialEq)]
pub struct CacheDirectives {
    /// Bypass the cache entirely.
    pub disable: bool,
    /// Skip the read path; the write path still applies when cacheable.
    pub force_refresh: bool,
    /// Entry lifetime. Presence is what makes the request cacheable.
    pub ttl: Option<Duration>,
}

impl CacheDirectives {
    /// Reads the directive headers from `request` and removes all of them.
    ///
    /// Removal covers every occurrence of each header, so the directives can
    /// never leak to the network. `Disable=true` wins before the other
    /// directives are even parsed, so a disabled request bypasses the cache
    /// no matter what the remaining values carry. A value that does get
    /// parsed and fails is reported as [`ExchangeError::Directive`];
    /// directives are written by integration code, so this indicates a
    /// caller bug.
    pub fn strip(request: &mut Request<Bytes>) -> Result<Self, ExchangeError> {
        let disable = last_value(request, &DISABLE)
            .map(|value| parse_bool(&DISABLE, &value))
            .transpose()?
            .unwrap_or(false);
        if disable {
            strip_all(request);
            return Ok(CacheDirectives {
                disable: true,
                force_refresh: false,
                ttl: None,
            });
        }

        let force_refresh = last_value(request, &FORCE_REFRESH)
            .map(|value| parse_bool(&FORCE_REFRESH, &value))
            .transpose()?
            .unwrap_or(false);
        let ttl = last_value(request, &TTL)
            .map(|value| parse_seconds(&TTL, &value))
            .transpose()?;

        strip_all(request);
        Ok(CacheDirectives {
            disable: false,
            force_refresh,
            ttl,
        })
    }

    /// Whether the request declared itself cacheable.
    pub fn cacheable(&self) -> bool {
        self.ttl.is_some()
    }
}

fn last_value(request: &Request<Bytes>, header: &HeaderName) -> Option<HeaderValue> {
    request.headers().get_all(header).iter().last().cloned()
}

fn strip_all(request: &mut Request<Bytes>) {
    let headers = request.headers_mut();
    headers.remove(&TTL);
    headers.remove(&FORCE_REFRESH);
    headers.remove(&DISABLE);
}

fn directive_error(header: &HeaderName, value: &HeaderValue) -> ExchangeError {
    let name = if *header == TTL {
        "X-Mallard-SimpleCache-TTL"
    } else if *header == FORCE_REFRESH {
        "X-Mallard-SimpleCache-ForceRefresh"
    } else {
        "X-Mallard-SimpleCache-Disable"
    };
    ExchangeError::Directive {
        header: name,
        value: String::from_utf8_lossy(value.as_bytes()).into_owned(),
    }
}

fn parse_seconds(header: &HeaderName, value: &HeaderValue) -> Result<Duration, ExchangeError> {
    value
        .to_str()
        .ok()
        .and_then(|raw| raw.trim().parse::<u64>().ok())
        .map(Duration::from_secs)
        .ok_or_else(|| directive_error(header, value))
}

fn parse_bool(header: &HeaderName, value: &HeaderValue) -> Result<bool, ExchangeError> {
    match value.to_str().map(str::trim) {
        Ok(raw) if raw.eq_ignore_ascii_case("true") => Ok(true),
        Ok(raw) if raw.eq_ignore_ascii_case("false") => Ok(false),
        _ => Err(directive_error(header, value)),
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn get_request() -> Request<Bytes> {
        Request::builder()
            .method(http::Method::GET)
            .uri("http://example.com/resource")
            .body(Bytes::new())
            .unwrap()
    }

    #[test]
    fn absent_directives_parse_to_defaults() {
        let mut request = get_request();
        let directives = CacheDirectives::strip(&mut request).unwrap();
        assert_eq!(directives, CacheDirectives::default());
        assert!(!directives.cacheable());
    }

    #[test]
    fn ttl_makes_the_request_cacheable() {
        let mut request = get_request();
        request
            .headers_mut()
            .insert(TTL, HeaderValue::from_static("300"));

        let directives = CacheDirectives::strip(&mut request).unwrap();
        assert_eq!(directives.ttl, Some(Duration::from_secs(300)));
        assert!(directives.cacheable());
        assert!(request.headers().get(&TTL).is_none());
    }

    #[test]
    fn last_value_wins_for_repeated_directives() {
        let mut request = get_request();
        request
            .headers_mut()
            .append(TTL, HeaderValue::from_static("300"));
        request
            .headers_mut()
            .append(TTL, HeaderValue::from_static("600"));

        let directives = CacheDirectives::strip(&mut request).unwrap();
        assert_eq!(directives.ttl, Some(Duration::from_secs(600)));
    }

    #[test]
    fn booleans_are_case_insensitive() {
        let mut request = get_request();
        request
            .headers_mut()
            .insert(FORCE_REFRESH, HeaderValue::from_static("True"));
        request
            .headers_mut()
            .insert(DISABLE, HeaderValue::from_static("FALSE"));

        let directives = CacheDirectives::strip(&mut request).unwrap();
        assert!(directives.force_refresh);
        assert!(!directives.disable);
    }

    #[test]
    fn malformed_ttl_is_rejected() {
        let mut request = get_request();
        request
            .headers_mut()
            .insert(TTL, HeaderValue::from_static("soon"));

        let error = CacheDirectives::strip(&mut request).unwrap_err();
        assert!(matches!(error, ExchangeError::Directive { .. }));
    }

    #[test]
    fn malformed_bool_is_rejected() {
        let mut request = get_request();
        request
            .headers_mut()
            .insert(DISABLE, HeaderValue::from_static("yes"));

        let error = CacheDirectives::strip(&mut request).unwrap_err();
        assert!(matches!(error, ExchangeError::Directive { .. }));
    }

    #[test]
    fn disable_wins_before_other_directives_are_parsed() {
        let mut request = get_request();
        request
            .headers_mut()
            .insert(DISABLE, HeaderValue::from_static("true"));
        request
            .headers_mut()
            .insert(TTL, HeaderValue::from_static("soon"));
        request
            .headers_mut()
            .insert(FORCE_REFRESH, HeaderValue::from_static("maybe"));

        // The malformed values are irrelevant once the cache is disabled.
        let directives = CacheDirectives::strip(&mut request).unwrap();
        assert!(directives.disable);
        assert!(!directives.force_refresh);
        assert_eq!(directives.ttl, None);
        assert!(request.headers().get(&TTL).is_none());
        assert!(request.headers().get(&FORCE_REFRESH).is_none());
        assert!(request.headers().get(&DISABLE).is_none());
    }

    #[test]
    fn all_occurrences_are_stripped() {
        let mut request = get_request();
        request
            .headers_mut()
            .append(TTL, HeaderValue::from_static("300"));
        request
            .headers_mut()
            .append(TTL, HeaderValue::from_static("600"));
        request
            .headers_mut()
            .append(DISABLE, HeaderValue::from_static("true"));

        CacheDirectives::strip(&mut request).unwrap();
        assert!(request.headers().get_all(&TTL).iter().next().is_none());
        assert!(request.headers().get(&DISABLE).is_none());
    }
}
