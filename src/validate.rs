//! URL normalization and validation.

use crate::{Error, Result};
use url::{ParseError, Url};

const DEFAULT_SCHEME: &str = "http";

/// Normalizes a raw URL string and checks that it is usable for a request.
///
/// A missing scheme defaults to `http`. The result always has a non-empty
/// scheme and host, and feeding the serialized result back in yields the same
/// URL.
///
/// # Errors
///
/// - [`Error::InvalidHost`] if the URL has no authority
/// - [`Error::InvalidUrl`] if the string cannot be parsed at all
///
/// # Examples
///
/// ```
/// use httpchain::validate::validate;
///
/// let url = validate("example.com/path").unwrap();
/// assert_eq!(url.as_str(), "http://example.com/path");
///
/// assert!(matches!(validate("http://"), Err(httpchain::Error::InvalidHost)));
/// ```
pub fn validate(raw: &str) -> Result<Url> {
    let candidate = if has_scheme(raw) {
        raw.to_string()
    } else {
        format!(
            "{}://{}",
            DEFAULT_SCHEME,
            raw.trim_start().trim_start_matches("//")
        )
    };

    let url = Url::parse(&candidate).map_err(|e| match e {
        ParseError::EmptyHost => Error::InvalidHost,
        _ => Error::InvalidUrl,
    })?;

    match url.host_str() {
        Some(host) if !host.is_empty() => {}
        _ => return Err(Error::InvalidHost),
    }

    if url.as_str().is_empty() {
        return Err(Error::InvalidUrl);
    }

    Ok(url)
}

/// `true` when a `scheme://` marker starts the URL, before any path, query
/// or fragment. A `://` inside a query parameter does not count.
fn has_scheme(raw: &str) -> bool {
    raw.find("://")
        .is_some_and(|end| !raw[..end].contains(['/', '?', '#']))
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_scheme_defaults_to_http() {
        let url = validate("example.com/path").unwrap();
        assert_eq!(url.scheme(), "http");
        assert_eq!(url.host_str(), Some("example.com"));
        assert_eq!(url.as_str(), "http://example.com/path");
    }

    #[test]
    fn test_protocol_relative() {
        let url = validate("//example.com/a?b=c").unwrap();
        assert_eq!(url.as_str(), "http://example.com/a?b=c");
    }

    #[test]
    fn test_explicit_scheme_is_kept() {
        let url = validate("https://example.com:8443/x").unwrap();
        assert_eq!(url.scheme(), "https");
        assert_eq!(url.port(), Some(8443));
    }

    #[test]
    fn test_host_with_port_and_no_scheme() {
        let url = validate("localhost:8080/health").unwrap();
        assert_eq!(url.as_str(), "http://localhost:8080/health");
    }

    #[test]
    fn test_nested_url_in_query_without_scheme() {
        let url = validate("example.com/login?next=http://example.com/home").unwrap();
        assert_eq!(url.as_str(), "http://example.com/login?next=http://example.com/home");
        assert_eq!(url.host_str(), Some("example.com"));

        let url = validate("example.com/r/https://other.org").unwrap();
        assert_eq!(url.as_str(), "http://example.com/r/https://other.org");
    }

    #[test]
    fn test_scheme_marker_detection() {
        assert!(has_scheme("https://example.com/?next=http://x"));
        assert!(!has_scheme("example.com?next=http://x"));
        assert!(!has_scheme("example.com#http://x"));
        assert!(!has_scheme("//example.com/a"));
        assert!(!has_scheme("localhost:8080/health"));
    }

    #[test]
    fn test_missing_host() {
        assert!(matches!(validate(""), Err(Error::InvalidHost)));
        assert!(matches!(validate("http://"), Err(Error::InvalidHost)));
        assert!(matches!(validate("http://:80/path"), Err(Error::InvalidHost)));
    }

    #[test]
    fn test_unparseable() {
        assert!(matches!(validate("http://exa mple.com"), Err(Error::InvalidUrl)));
        assert!(matches!(validate("http://[::1/"), Err(Error::InvalidUrl)));
    }

    #[test]
    fn test_idempotent() {
        for raw in ["example.com", "https://a.b/c?d#e", "127.0.0.1:3000/x"] {
            let once = validate(raw).unwrap();
            let twice = validate(once.as_str()).unwrap();
            assert_eq!(once, twice);
        }
    }
}
