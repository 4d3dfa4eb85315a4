//! The response a chain ends up holding.
//!
//! Bodies are buffered once the exchange completes, which is what allows the
//! cache writer to keep its own copy while the caller reads theirs. Reading
//! drains the caller's copy: a second decoder on the same response sees an
//! empty body, the same way a consumed stream would behave.

use crate::cache::CacheEntry;
use bytes::{Buf, Bytes};
use http::{HeaderMap, StatusCode, Version};
use std::io::{self, BufRead, Read};
use std::time::{Duration, SystemTime};
use url::Url;

/// A buffered response body that is consumed by reading.
///
/// `Body` implements [`Read`] and [`BufRead`], so it can be handed to any
/// reader-based API.
#[derive(Debug, Clone, Default)]
pub struct Body {
    remaining: Bytes,
}

impl Body {
    pub(crate) fn new(bytes: Bytes) -> Self {
        Self { remaining: bytes }
    }

    /// Bytes not yet read.
    pub fn len(&self) -> usize {
        self.remaining.len()
    }

    /// Returns `true` once everything has been read.
    pub fn is_empty(&self) -> bool {
        self.remaining.is_empty()
    }

    /// A second handle on the unread bytes. Does not advance this body.
    pub(crate) fn snapshot(&self) -> Bytes {
        self.remaining.clone()
    }

    /// Takes everything not yet read, leaving the body drained.
    pub fn take_bytes(&mut self) -> Bytes {
        std::mem::take(&mut self.remaining)
    }
}

impl Read for Body {
    fn read(&mut self, buf: &mut [u8]) -> io::Result<usize> {
        let n = buf.len().min(self.remaining.len());
        self.remaining.copy_to_slice(&mut buf[..n]);
        Ok(n)
    }
}

impl BufRead for Body {
    fn fill_buf(&mut self) -> io::Result<&[u8]> {
        Ok(&self.remaining)
    }

    fn consume(&mut self, amt: usize) {
        self.remaining.advance(amt.min(self.remaining.len()));
    }
}

/// The outcome of an exchange, from the network or from the cache.
///
/// # Examples
///
/// ```no_run
/// # async fn example() {
/// let mut client = httpchain::get("https://api.example.com/users/1").send().await;
/// let (response, errors) = client.response().await;
///
/// if let Some(response) = response {
///     println!("Status: {}", response.status);
///     println!("Took {:?} over {} redirects", response.latency, response.redirects);
///     println!("Content-Type: {:?}", response.header("content-type"));
/// }
/// assert!(errors.is_empty());
/// # }
/// ```
#[derive(Debug)]
pub struct Response {
    /// The HTTP status code of the final response.
    pub status: StatusCode,

    /// The response headers.
    ///
    /// After gzip decoding, `Content-Encoding` and `Content-Length` are
    /// removed since they no longer describe the body.
    pub headers: HeaderMap,

    /// The URL the final response came from (differs from the request URL
    /// after redirects).
    pub url: Url,

    /// The HTTP version of the final response.
    pub version: Version,

    /// Time from dispatch until the body was buffered, across all hops.
    pub latency: Duration,

    /// Redirect hops followed to reach this response.
    pub redirects: usize,

    /// `true` when served from the response cache without a network call.
    pub from_cache: bool,

    /// When the response was received (or originally captured, for cache hits).
    pub received_at: SystemTime,

    pub(crate) body: Body,
}

impl Response {
    pub(crate) fn from_cache(entry: &CacheEntry) -> Self {
        Self {
            status: entry.status,
            headers: entry.headers.clone(),
            url: entry.url.clone(),
            version: entry.version,
            latency: Duration::ZERO,
            redirects: entry.redirects,
            from_cache: true,
            received_at: entry.captured_at,
            body: Body::new(entry.body.clone()),
        }
    }

    /// Returns a header value by name, if present and valid UTF-8.
    pub fn header(&self, name: &str) -> Option<&str> {
        self.headers.get(name)?.to_str().ok()
    }

    /// The unread part of the body.
    pub fn body(&self) -> &Body {
        &self.body
    }

    /// Mutable access to the unread part of the body.
    pub fn body_mut(&mut self) -> &mut Body {
        &mut self.body
    }

    /// Takes the body reader, leaving an empty one behind.
    pub fn take_body(&mut self) -> Body {
        std::mem::take(&mut self.body)
    }

    /// Reads everything left into a string, lossily.
    pub fn text(&mut self) -> String {
        String::from_utf8_lossy(&self.body.take_bytes()).into_owned()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_body_reads_then_drains() {
        let mut body = Body::new(Bytes::from_static(b"hello world"));
        let mut first = [0u8; 5];
        body.read_exact(&mut first).unwrap();
        assert_eq!(&first, b"hello");
        assert_eq!(body.len(), 6);

        let mut rest = String::new();
        body.read_to_string(&mut rest).unwrap();
        assert_eq!(rest, " world");
        assert!(body.is_empty());
        assert_eq!(body.read(&mut first).unwrap(), 0);
    }

    #[test]
    fn test_body_buf_read_lines() {
        let body = Body::new(Bytes::from_static(b"a\nb\n"));
        let lines: Vec<String> = body.lines().map(|l| l.unwrap()).collect();
        assert_eq!(lines, vec!["a", "b"]);
    }

    #[test]
    fn test_from_cache_marks_response() {
        let entry = CacheEntry {
            status: StatusCode::CREATED,
            headers: HeaderMap::new(),
            url: Url::parse("http://example.com/").unwrap(),
            version: Version::HTTP_2,
            body: Bytes::from_static(b"cached"),
            redirects: 1,
            captured_at: SystemTime::UNIX_EPOCH,
        };

        let mut response = Response::from_cache(&entry);
        assert!(response.from_cache);
        assert_eq!(response.redirects, 1);
        assert_eq!(response.version, Version::HTTP_2);
        assert_eq!(response.text(), "cached");
        assert!(response.body().is_empty());
        // the entry keeps its own copy
        assert_eq!(entry.body, Bytes::from_static(b"cached"));
    }
}
