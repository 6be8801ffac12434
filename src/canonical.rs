//! Canonical identity of content URLs.
//!
//! Two URLs that point at the same piece of content (differing only in scheme,
//! host case, default port, fragment, trailing slash or tracking parameters)
//! map to the same canonical form and therefore the same hash.

use sha2::{Digest, Sha256};
use url::form_urlencoded;
use url::Url;

/// Query parameters that never change which content a URL points at.
const TRACKING_PARAMS: &[&str] = &[
    "fbclid", "gclid", "gclsrc", "dclid", "msclkid", "mc_cid", "mc_eid", "igshid", "ref_src",
    "_hsenc", "_hsmi", "mkt_tok",
];

/// Normalize a URL to its canonical form.
///
/// Non-HTTP or unparseable input is returned trimmed but otherwise unchanged.
#[must_use]
pub fn canonical_url(url: &str) -> String {
    let trimmed = url.trim();
    let Ok(mut normalized) = Url::parse(trimmed) else {
        return trimmed.to_string();
    };

    if normalized.scheme() != "http" && normalized.scheme() != "https" {
        return trimmed.to_string();
    }

    if normalized.scheme() == "http" {
        let _ = normalized.set_scheme("https");
    }

    // The url crate already lowercases hosts, but be explicit for IDN edge cases
    if let Some(host) = normalized.host_str() {
        let lower_host = host.to_lowercase();
        if host != lower_host {
            let _ = normalized.set_host(Some(&lower_host));
        }
    }

    if normalized.port() == Some(443) || normalized.port() == Some(80) {
        let _ = normalized.set_port(None);
    }

    let kept: Vec<(String, String)> = normalized
        .query_pairs()
        .filter(|(key, _)| !is_tracking_param(key))
        .map(|(k, v)| (k.into_owned(), v.into_owned()))
        .collect();

    if kept.is_empty() {
        normalized.set_query(None);
    } else {
        let query = form_urlencoded::Serializer::new(String::new())
            .extend_pairs(kept)
            .finish();
        normalized.set_query(Some(&query));
    }

    normalized.set_fragment(None);

    let path = normalized.path().to_string();
    if path.ends_with('/') && path.len() > 1 {
        normalized.set_path(path.trim_end_matches('/'));
    }

    normalized.to_string()
}

/// SHA-256 of a canonical URL, hex encoded.
#[must_use]
pub fn url_hash(canonical: &str) -> String {
    hex::encode(Sha256::digest(canonical.as_bytes()))
}

/// Whether `url` is an absolute http(s) URL.
#[must_use]
pub fn is_http_url(url: &str) -> bool {
    Url::parse(url.trim())
        .map(|u| matches!(u.scheme(), "http" | "https") && u.host_str().is_some())
        .unwrap_or(false)
}

fn is_tracking_param(key: &str) -> bool {
    let lower = key.to_lowercase();
    lower.starts_with("utm_") || TRACKING_PARAMS.contains(&lower.as_str())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_force_https() {
        assert_eq!(
            canonical_url("http://example.com/path"),
            "https://example.com/path"
        );
    }

    #[test]
    fn test_lowercase_host() {
        assert_eq!(
            canonical_url("https://EXAMPLE.COM/Path"),
            "https://example.com/Path"
        );
    }

    #[test]
    fn test_remove_tracking_params() {
        assert_eq!(
            canonical_url("https://example.com/path?utm_source=feed&id=123&fbclid=abc"),
            "https://example.com/path?id=123"
        );
        assert_eq!(
            canonical_url("https://example.com/path?utm_source=test&utm_medium=web"),
            "https://example.com/path"
        );
    }

    #[test]
    fn test_remove_fragment_and_trailing_slash() {
        assert_eq!(
            canonical_url("https://example.com/blog/post/#comments"),
            "https://example.com/blog/post"
        );
        assert_eq!(canonical_url("https://example.com/"), "https://example.com/");
    }

    #[test]
    fn test_remove_default_port() {
        assert_eq!(
            canonical_url("https://example.com:443/a"),
            "https://example.com/a"
        );
    }

    #[test]
    fn test_non_http_passthrough() {
        assert_eq!(canonical_url("  mailto:a@b.c "), "mailto:a@b.c");
        assert_eq!(canonical_url("not a url"), "not a url");
    }

    #[test]
    fn test_hash_is_stable() {
        let a = url_hash(&canonical_url("http://example.com/a/"));
        let b = url_hash(&canonical_url("https://example.com/a"));
        assert_eq!(a, b);
        assert_eq!(a.len(), 64);
    }

    #[test]
    fn test_is_http_url() {
        assert!(is_http_url("https://example.com/a"));
        assert!(is_http_url("http://example.com"));
        assert!(!is_http_url("ftp://example.com/file"));
        assert!(!is_http_url("tag:example.com,2024:1"));
        assert!(!is_http_url(""));
    }
}
