//! Response cache keyed by request identity.
//!
//! The cache stores fully buffered response snapshots. Writes happen from a
//! background task spawned by the executor while the caller may already be
//! reading its own copy of the body, so the store is shared through an
//! internally synchronized `moka` cache.

use bytes::Bytes;
use http::{HeaderMap, Method, StatusCode, Version};
use moka::sync::Cache;
use parking_lot::RwLock;
use std::sync::Arc;
use std::time::{Duration, SystemTime};
use url::Url;

/// The identity a response is cached under: method plus normalized URL.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct CacheKey {
    /// The request method.
    pub method: Method,
    /// The normalized request URL, as sent.
    pub url: String,
}

impl CacheKey {
    /// Builds the identity of a finalized request.
    pub fn new(method: &Method, url: &Url) -> Self {
        Self {
            method: method.clone(),
            url: url.as_str().to_string(),
        }
    }

    pub(crate) fn of(request: &reqwest::Request) -> Self {
        Self::new(request.method(), request.url())
    }
}

/// A captured response.
///
/// The body is stored already decompressed, exactly as the caller of the
/// original exchange saw it.
#[derive(Debug, Clone)]
pub struct CacheEntry {
    /// The status of the final response.
    pub status: StatusCode,
    /// The response headers.
    pub headers: HeaderMap,
    /// The URL the final response was received from.
    pub url: Url,
    /// The HTTP version the final response was received with.
    pub version: Version,
    /// The buffered body.
    pub body: Bytes,
    /// Number of redirect hops that led to this response.
    pub redirects: usize,
    /// When the snapshot was taken.
    pub captured_at: SystemTime,
}

/// Eviction settings for a [`ResponseCache`].
///
/// Both limits are off by default: entries live until
/// [`ResponseCache::clear`] is called.
///
/// # Examples
///
/// ```
/// use httpchain::cache::CacheConfig;
/// use std::time::Duration;
///
/// let config = CacheConfig::builder()
///     .max_capacity(512)
///     .time_to_live(Duration::from_secs(60))
///     .build();
/// assert_eq!(config.max_capacity, Some(512));
/// ```
#[derive(Debug, Clone, Default)]
pub struct CacheConfig {
    /// Maximum number of entries kept.
    pub max_capacity: Option<u64>,
    /// How long an entry stays valid after it was stored.
    pub time_to_live: Option<Duration>,
}

impl CacheConfig {
    /// Creates a new builder for cache settings.
    pub fn builder() -> CacheConfigBuilder {
        CacheConfigBuilder::default()
    }
}

/// Builder for `CacheConfig`.
#[derive(Default)]
pub struct CacheConfigBuilder {
    max_capacity: Option<u64>,
    time_to_live: Option<Duration>,
}

impl CacheConfigBuilder {
    /// Sets the maximum number of entries.
    pub fn max_capacity(mut self, max_capacity: u64) -> Self {
        self.max_capacity = Some(max_capacity);
        self
    }

    /// Sets the time-to-live of each entry.
    pub fn time_to_live(mut self, ttl: Duration) -> Self {
        self.time_to_live = Some(ttl);
        self
    }

    /// Builds the `CacheConfig`.
    pub fn build(self) -> CacheConfig {
        CacheConfig {
            max_capacity: self.max_capacity,
            time_to_live: self.time_to_live,
        }
    }
}

/// A thread-safe store of captured responses.
///
/// Cloning is cheap and clones share the same entries, which lets several
/// clients use one cache through [`Client::with_cache`](crate::Client::with_cache).
///
/// Every [`clear`](ResponseCache::clear) starts a new generation. Background
/// writes scheduled before a clear are dropped instead of resurrecting stale
/// responses.
#[derive(Clone)]
pub struct ResponseCache {
    entries: Cache<CacheKey, Arc<CacheEntry>>,
    generation: Arc<RwLock<u64>>,
}

impl ResponseCache {
    /// Creates an unbounded cache.
    pub fn new() -> Self {
        Self::with_config(&CacheConfig::default())
    }

    /// Creates a cache from eviction settings.
    pub fn with_config(config: &CacheConfig) -> Self {
        let mut builder = Cache::builder();

        if let Some(capacity) = config.max_capacity {
            builder = builder.max_capacity(capacity);
        }

        if let Some(ttl) = config.time_to_live {
            builder = builder.time_to_live(ttl);
        }

        Self {
            entries: builder.build(),
            generation: Arc::new(RwLock::new(0)),
        }
    }

    /// Looks up a snapshot. Never touches the network or transport state.
    pub fn get(&self, key: &CacheKey) -> Option<Arc<CacheEntry>> {
        let entry = self.entries.get(key);
        tracing::trace!(
            method = %key.method,
            url = %key.url,
            hit = entry.is_some(),
            "Cache lookup"
        );
        entry
    }

    /// Stores a snapshot, replacing any previous one for the same identity.
    pub fn set(&self, key: CacheKey, entry: CacheEntry) {
        self.entries.insert(key, Arc::new(entry));
    }

    /// The current generation, to be handed to [`ResponseCache::set_if_current`].
    pub(crate) fn generation(&self) -> u64 {
        *self.generation.read()
    }

    /// Stores a snapshot unless the cache was cleared since `generation`.
    pub(crate) fn set_if_current(
        &self,
        generation: u64,
        key: CacheKey,
        entry: CacheEntry,
    ) -> bool {
        let current = self.generation.read();
        if *current != generation {
            return false;
        }
        self.entries.insert(key, Arc::new(entry));
        true
    }

    /// Returns `true` if a snapshot is stored for `key`.
    pub fn contains(&self, key: &CacheKey) -> bool {
        self.entries.contains_key(key)
    }

    /// Removes every entry.
    pub fn clear(&self) {
        let mut generation = self.generation.write();
        *generation += 1;
        self.entries.invalidate_all();
    }
}

impl Default for ResponseCache {
    fn default() -> Self {
        Self::new()
    }
}

impl std::fmt::Debug for ResponseCache {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("ResponseCache")
            .field("entries", &self.entries.entry_count())
            .finish()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn entry(body: &'static str) -> CacheEntry {
        CacheEntry {
            status: StatusCode::OK,
            headers: HeaderMap::new(),
            url: Url::parse("http://example.com/a").unwrap(),
            version: Version::HTTP_11,
            body: Bytes::from_static(body.as_bytes()),
            redirects: 0,
            captured_at: SystemTime::now(),
        }
    }

    fn key(method: Method, url: &str) -> CacheKey {
        CacheKey::new(&method, &Url::parse(url).unwrap())
    }

    #[test]
    fn test_set_then_get() {
        let cache = ResponseCache::new();
        let k = key(Method::GET, "http://example.com/a");

        assert!(cache.get(&k).is_none());
        cache.set(k.clone(), entry("hello"));

        let hit = cache.get(&k).unwrap();
        assert_eq!(hit.body, Bytes::from_static(b"hello"));
        assert!(cache.contains(&k));
    }

    #[test]
    fn test_identity_includes_method() {
        let cache = ResponseCache::new();
        cache.set(key(Method::GET, "http://example.com/a"), entry("get"));

        assert!(cache.get(&key(Method::POST, "http://example.com/a")).is_none());
        assert!(cache.get(&key(Method::GET, "http://example.com/b")).is_none());
    }

    #[test]
    fn test_set_replaces() {
        let cache = ResponseCache::new();
        let k = key(Method::GET, "http://example.com/a");
        cache.set(k.clone(), entry("one"));
        cache.set(k.clone(), entry("two"));
        assert_eq!(cache.get(&k).unwrap().body, Bytes::from_static(b"two"));
    }

    #[test]
    fn test_clear_removes_everything() {
        let cache = ResponseCache::new();
        let a = key(Method::GET, "http://example.com/a");
        let b = key(Method::GET, "http://example.com/b");
        cache.set(a.clone(), entry("a"));
        cache.set(b.clone(), entry("b"));

        cache.clear();

        assert!(cache.get(&a).is_none());
        assert!(cache.get(&b).is_none());
    }

    #[test]
    fn test_write_scheduled_before_clear_is_dropped() {
        let cache = ResponseCache::new();
        let k = key(Method::GET, "http://example.com/a");

        let generation = cache.generation();
        cache.clear();

        assert!(!cache.set_if_current(generation, k.clone(), entry("stale")));
        assert!(cache.get(&k).is_none());

        assert!(cache.set_if_current(cache.generation(), k.clone(), entry("fresh")));
        assert_eq!(cache.get(&k).unwrap().body, Bytes::from_static(b"fresh"));
    }

    #[test]
    fn test_clones_share_entries() {
        let cache = ResponseCache::new();
        let shared = cache.clone();
        let k = key(Method::GET, "http://example.com/a");

        shared.set(k.clone(), entry("shared"));
        assert!(cache.contains(&k));
    }

    #[test]
    fn test_concurrent_writers() {
        let cache = ResponseCache::new();
        let handles: Vec<_> = (0..8)
            .map(|i| {
                let cache = cache.clone();
                std::thread::spawn(move || {
                    let k = key(Method::GET, &format!("http://example.com/{}", i));
                    cache.set(k, entry("x"));
                })
            })
            .collect();

        for handle in handles {
            handle.join().unwrap();
        }

        for i in 0..8 {
            assert!(cache.contains(&key(Method::GET, &format!("http://example.com/{}", i))));
        }
    }

    #[test]
    fn test_ttl_expires_entries() {
        let cache = ResponseCache::with_config(
            &CacheConfig::builder()
                .time_to_live(Duration::from_millis(20))
                .build(),
        );
        let k = key(Method::GET, "http://example.com/a");
        cache.set(k.clone(), entry("short-lived"));
        std::thread::sleep(Duration::from_millis(60));
        assert!(cache.get(&k).is_none());
    }
}
