//! Emission of stored custom headers onto responses.
//!
//! Records carry user-supplied headers, including a CORS group that is
//! filtered against the request's `Origin` and method.

use std::collections::BTreeMap;

use axum::http::header::{HeaderName, HeaderValue};
use axum::http::{HeaderMap, Method};
use tracing::debug;

pub const ALLOW_HEADERS: &str = "access-control-allow-headers";
pub const ALLOW_ORIGIN: &str = "access-control-allow-origin";
pub const EXPOSE_HEADERS: &str = "access-control-expose-headers";
pub const MAX_AGE: &str = "access-control-max-age";
pub const ALLOW_METHODS: &str = "access-control-allow-methods";

/// CORS headers a record may store.
pub const CORS_RESPONSE_HEADERS: [&str; 5] =
    [ALLOW_HEADERS, ALLOW_ORIGIN, EXPOSE_HEADERS, MAX_AGE, ALLOW_METHODS];

fn is_cors(name: &str) -> bool {
    CORS_RESPONSE_HEADERS.iter().any(|h| h.eq_ignore_ascii_case(name))
}

fn list_contains(list: &str, wanted: &str) -> bool {
    list.split(',').map(str::trim).any(|v| v == wanted)
}

/// Apply `stored` headers to `response`.
///
/// Without an `origin` every stored header is emitted as-is.  With one,
/// a stored allowed-origin list that rejects the origin, or an
/// allowed-methods list that rejects the method, removes the CORS group
/// from the response.  Allowed methods are emitted on their own match;
/// allowed headers and max-age also need a matching stored origin.
/// `access-control-expose-headers` is never suppressed.
pub fn apply_custom_headers(
    stored: &BTreeMap<String, String>,
    origin: Option<&str>,
    method: &Method,
    response: &mut HeaderMap,
) {
    let Some(origin) = origin else {
        for (name, value) in stored {
            insert(response, name, value);
        }
        return;
    };

    // `None` when no allowed origins are stored.
    let origin_ok = stored
        .iter()
        .find(|(name, _)| name.eq_ignore_ascii_case(ALLOW_ORIGIN))
        .map(|(_, allowed)| list_contains(allowed, origin) || list_contains(allowed, "*"));
    let methods_ok = stored
        .iter()
        .find(|(name, _)| name.eq_ignore_ascii_case(ALLOW_METHODS))
        .map_or(true, |(_, allowed)| list_contains(allowed, method.as_str()));
    let suppress = origin_ok == Some(false) || !methods_ok;

    for (name, value) in stored {
        let lower = name.to_ascii_lowercase();
        if !is_cors(&lower) {
            insert(response, name, value);
            continue;
        }
        match lower.as_str() {
            EXPOSE_HEADERS => insert(response, name, value),
            _ if suppress => {}
            ALLOW_ORIGIN => insert(response, name, origin),
            ALLOW_METHODS => insert(response, name, value),
            _ if origin_ok == Some(true) => insert(response, name, value),
            _ => {}
        }
    }

    if suppress {
        debug!(origin, method = %method, "cors check failed; suppressing cors headers");
        for name in [ALLOW_HEADERS, ALLOW_ORIGIN, MAX_AGE, ALLOW_METHODS] {
            response.remove(name);
        }
    }
}

fn insert(response: &mut HeaderMap, name: &str, value: &str) {
    match (
        HeaderName::from_bytes(name.as_bytes()),
        HeaderValue::from_str(value),
    ) {
        (Ok(name), Ok(value)) => {
            response.insert(name, value);
        }
        _ => debug!(name, "skipping stored header that is not valid http"),
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn stored(pairs: &[(&str, &str)]) -> BTreeMap<String, String> {
        pairs
            .iter()
            .map(|(k, v)| (k.to_string(), v.to_string()))
            .collect()
    }

    #[test]
    fn test_no_origin_emits_everything() {
        let s = stored(&[
            (ALLOW_ORIGIN, "https://b.example"),
            ("m-color", "blue"),
            ("Cache-Control", "no-cache"),
        ]);
        let mut resp = HeaderMap::new();
        apply_custom_headers(&s, None, &Method::GET, &mut resp);
        assert_eq!(resp[ALLOW_ORIGIN], "https://b.example");
        assert_eq!(resp["m-color"], "blue");
        assert_eq!(resp["cache-control"], "no-cache");
    }

    #[test]
    fn test_mismatched_origin_suppresses_group() {
        let s = stored(&[
            (ALLOW_ORIGIN, "https://b.example"),
            (ALLOW_HEADERS, "x-custom"),
            (MAX_AGE, "600"),
            (EXPOSE_HEADERS, "etag"),
            ("m-color", "blue"),
        ]);
        let mut resp = HeaderMap::new();
        resp.insert(ALLOW_ORIGIN, HeaderValue::from_static("stale"));
        apply_custom_headers(&s, Some("https://a.example"), &Method::GET, &mut resp);
        assert!(resp.get(ALLOW_ORIGIN).is_none());
        assert!(resp.get(ALLOW_HEADERS).is_none());
        assert!(resp.get(MAX_AGE).is_none());
        assert_eq!(resp[EXPOSE_HEADERS], "etag");
        assert_eq!(resp["m-color"], "blue");
    }

    #[test]
    fn test_wildcard_origin_echoes_request_origin() {
        let s = stored(&[(ALLOW_ORIGIN, "*"), (MAX_AGE, "600")]);
        let mut resp = HeaderMap::new();
        apply_custom_headers(&s, Some("https://a.example"), &Method::GET, &mut resp);
        assert_eq!(resp[ALLOW_ORIGIN], "https://a.example");
        assert_eq!(resp[MAX_AGE], "600");
    }

    #[test]
    fn test_origin_list_match() {
        let s = stored(&[(ALLOW_ORIGIN, "https://b.example, https://a.example")]);
        let mut resp = HeaderMap::new();
        apply_custom_headers(&s, Some("https://a.example"), &Method::HEAD, &mut resp);
        assert_eq!(resp[ALLOW_ORIGIN], "https://a.example");
    }

    #[test]
    fn test_method_not_allowed_suppresses_group() {
        let s = stored(&[(ALLOW_ORIGIN, "*"), (ALLOW_METHODS, "GET, HEAD")]);
        let mut resp = HeaderMap::new();
        apply_custom_headers(&s, Some("https://a.example"), &Method::PUT, &mut resp);
        assert!(resp.get(ALLOW_ORIGIN).is_none());
        assert!(resp.get(ALLOW_METHODS).is_none());

        let mut resp = HeaderMap::new();
        apply_custom_headers(&s, Some("https://a.example"), &Method::GET, &mut resp);
        assert_eq!(resp[ALLOW_METHODS], "GET, HEAD");
    }

    #[test]
    fn test_allow_methods_without_stored_origin() {
        let s = stored(&[(ALLOW_METHODS, "GET, HEAD"), (MAX_AGE, "600")]);
        let mut resp = HeaderMap::new();
        apply_custom_headers(&s, Some("https://a.example"), &Method::GET, &mut resp);
        assert_eq!(resp[ALLOW_METHODS], "GET, HEAD");
        assert!(resp.get(MAX_AGE).is_none());
        assert!(resp.get(ALLOW_ORIGIN).is_none());

        let mut resp = HeaderMap::new();
        apply_custom_headers(&s, Some("https://a.example"), &Method::PUT, &mut resp);
        assert!(resp.get(ALLOW_METHODS).is_none());
    }

    #[test]
    fn test_invalid_stored_header_skipped() {
        let s = stored(&[("bad header", "x"), ("m-ok", "y")]);
        let mut resp = HeaderMap::new();
        apply_custom_headers(&s, None, &Method::GET, &mut resp);
        assert_eq!(resp.len(), 1);
        assert_eq!(resp["m-ok"], "y");
    }
}
