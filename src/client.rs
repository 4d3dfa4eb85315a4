//! The fluent request chain.
//!
//! The [`Client`] type is the main entry point. Configuration calls consume
//! the client and hand it back, terminal calls ([`Client::send`] and the
//! decoders) run the exchange, and every failure along the way is recorded
//! instead of interrupting the chain.

use crate::{
    cache::{CacheConfig, ResponseCache},
    request::{BasicAuth, RequestDescriptor},
    response::Response,
    transport::{self, TlsConfig, Transport, TransportConfig},
    Error, Result,
};
use bytes::Bytes;
use http::Method;
use reqwest::cookie::Jar;
use serde::Serialize;
use std::collections::HashMap;
use std::io::Read;
use std::sync::Arc;
use std::time::Duration;
use tokio::task::JoinHandle;

/// Hop bound used by [`Client::enable_redirect`].
pub const DEFAULT_MAX_REDIRECTS: usize = 2;

/// How 3xx responses are handled.
///
/// Following is off by default. `300 Multiple Choices` is never followed.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct RedirectPolicy {
    /// Whether redirects are followed at all.
    pub enabled: bool,
    /// Maximum number of hops before giving up with
    /// [`Error::TooManyRedirection`].
    pub max_hops: usize,
}

impl RedirectPolicy {
    pub(crate) fn follows(&self) -> bool {
        self.enabled && self.max_hops > 0
    }
}

/// Where the current exchange stands.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ExchangeState {
    /// The descriptor has been edited since the last exchange.
    Unsent,
    /// The descriptor has been finalized into a transport request.
    Ready,
    /// A response is available, from the network or the cache.
    Completed,
    /// The exchange failed before any response was received.
    Failed,
}

/// A fluent HTTP request chain.
///
/// A client owns one request descriptor, the transport settings, the last
/// response and the list of every error recorded so far. It is used by one
/// task at a time: all configuration calls take the client by value, so a
/// request can never be edited while it is in flight.
///
/// # Examples
///
/// ```no_run
/// use httpchain::Client;
/// use serde::Deserialize;
///
/// #[derive(Debug, Default, Deserialize)]
/// struct User {
///     id: u64,
///     name: String,
/// }
///
/// # async fn example() {
/// let mut user = User::default();
///
/// let client = Client::new()
///     .get("https://api.example.com/users/123")
///     .set_header("Accept", ["application/json"])
///     .set_basic_auth("user", "password")
///     .enable_redirect()
///     .enable_cache()
///     .send()
///     .await
///     .json(&mut user)
///     .await;
///
/// if client.errors().is_empty() {
///     println!("User: {}", user.name);
/// }
/// # }
/// ```
#[derive(Debug)]
pub struct Client {
    pub(crate) transport_config: TransportConfig,
    pub(crate) transport: Option<Transport>,
    pub(crate) descriptor: RequestDescriptor,
    pub(crate) prepared: Option<reqwest::Request>,
    pub(crate) state: ExchangeState,
    pub(crate) redirect: RedirectPolicy,
    pub(crate) cache: Option<ResponseCache>,
    pub(crate) pending_cache_write: Option<JoinHandle<()>>,
    pub(crate) response: Option<Response>,
    pub(crate) errors: Vec<Error>,
}

impl Client {
    /// Creates a client with fresh state and its own transport.
    ///
    /// The transport is built lazily on the first request.
    pub fn new() -> Self {
        Self::with_transport(TransportConfig::default(), None)
    }

    /// Creates a client with fresh request state over the process-wide
    /// transport.
    ///
    /// The shared transport (and its connection pool) is built exactly once.
    /// Every call returns an independent client, so concurrent callers never
    /// see each other's requests, responses or errors. Changing a transport
    /// setting on the returned client gives it a private transport and leaves
    /// the shared one untouched.
    pub fn shared() -> Self {
        match transport::shared() {
            Ok((config, transport)) => Self::with_transport(config.clone(), Some(transport.clone())),
            Err(e) => {
                let mut client = Self::new();
                client.record(e);
                client
            }
        }
    }

    fn with_transport(config: TransportConfig, transport: Option<Transport>) -> Self {
        Self {
            transport_config: config,
            transport,
            descriptor: RequestDescriptor::default(),
            prepared: None,
            state: ExchangeState::Unsent,
            redirect: RedirectPolicy::default(),
            cache: None,
            pending_cache_write: None,
            response: None,
            errors: Vec::new(),
        }
    }

    pub(crate) fn record(&mut self, error: Error) {
        tracing::warn!(error = %error, "Request chain step failed");
        self.errors.push(error);
    }

    /// Starts a new descriptor revision. A request that was already
    /// finalized or sent is never mutated.
    fn touch(&mut self) -> &mut RequestDescriptor {
        self.prepared = None;
        self.state = ExchangeState::Unsent;
        &mut self.descriptor
    }

    fn edit(mut self, f: impl FnOnce(&mut RequestDescriptor) -> Result<()>) -> Self {
        if let Err(e) = f(self.touch()) {
            self.record(e);
        }
        self
    }

    fn configure_transport(mut self, f: impl FnOnce(&mut TransportConfig) -> Result<()>) -> Self {
        match f(&mut self.transport_config) {
            Ok(()) => {
                self.transport = None;
                self.touch();
            }
            Err(e) => self.record(e),
        }
        self
    }

    /// Sets the method from its name. Extension methods are accepted.
    pub fn set_method(self, method: impl AsRef<str>) -> Self {
        match Method::from_bytes(method.as_ref().as_bytes()) {
            Ok(method) => self.edit(|d| {
                d.method = method;
                Ok(())
            }),
            Err(e) => {
                let mut client = self;
                client.record(Error::ConfigurationError(format!("Invalid method: {}", e)));
                client
            }
        }
    }

    fn method_and_url(self, method: Method, url: impl Into<String>) -> Self {
        let url = url.into();
        self.edit(|d| {
            d.method = method;
            d.url = url;
            Ok(())
        })
    }

    /// Sets the method to GET and the URL.
    pub fn get(self, url: impl Into<String>) -> Self {
        self.method_and_url(Method::GET, url)
    }

    /// Sets the method to POST and the URL.
    pub fn post(self, url: impl Into<String>) -> Self {
        self.method_and_url(Method::POST, url)
    }

    /// Sets the method to PUT and the URL.
    pub fn put(self, url: impl Into<String>) -> Self {
        self.method_and_url(Method::PUT, url)
    }

    /// Sets the method to PATCH and the URL.
    pub fn patch(self, url: impl Into<String>) -> Self {
        self.method_and_url(Method::PATCH, url)
    }

    /// Sets the method to DELETE and the URL.
    pub fn delete(self, url: impl Into<String>) -> Self {
        self.method_and_url(Method::DELETE, url)
    }

    /// Sets the method to HEAD and the URL.
    pub fn head(self, url: impl Into<String>) -> Self {
        self.method_and_url(Method::HEAD, url)
    }

    /// Sets the URL, keeping the method.
    ///
    /// The URL is only validated when the request is finalized.
    pub fn set_url(self, url: impl Into<String>) -> Self {
        let url = url.into();
        self.edit(|d| {
            d.url = url;
            Ok(())
        })
    }

    /// Replaces every value of a header.
    pub fn set_header<I, V>(self, name: &str, values: I) -> Self
    where
        I: IntoIterator<Item = V>,
        V: AsRef<str>,
    {
        self.edit(|d| d.set_header(name, values))
    }

    /// Replaces the whole header map.
    ///
    /// Invalid entries are recorded and skipped.
    pub fn set_headers(mut self, headers: HashMap<String, Vec<String>>) -> Self {
        self.touch().headers.clear();
        self.add_headers(headers)
    }

    /// Appends values to a header.
    pub fn add_header<I, V>(self, name: &str, values: I) -> Self
    where
        I: IntoIterator<Item = V>,
        V: AsRef<str>,
    {
        self.edit(|d| d.add_header(name, values))
    }

    /// Appends every entry of `headers`.
    pub fn add_headers(self, headers: HashMap<String, Vec<String>>) -> Self {
        headers
            .into_iter()
            .fold(self, |client, (name, values)| client.add_header(&name, values))
    }

    /// Sets `Content-Type`.
    pub fn set_content_type(self, content_type: &str) -> Self {
        self.edit(|d| d.set_content_type(content_type))
    }

    /// Sets `User-Agent`.
    pub fn set_user_agent(self, agent: &str) -> Self {
        self.edit(|d| d.set_user_agent(agent))
    }

    /// Replaces the `Cookie` header with a raw cookie string.
    pub fn set_cookie_string(self, cookie: &str) -> Self {
        self.edit(|d| d.set_cookie_string(cookie))
    }

    /// Appends one `name=value` cookie to the request.
    pub fn set_cookie(self, name: &str, value: &str) -> Self {
        self.edit(|d| d.append_cookie(name, value))
    }

    /// Appends several cookies to the request.
    pub fn set_cookies<I, N, V>(self, cookies: I) -> Self
    where
        I: IntoIterator<Item = (N, V)>,
        N: AsRef<str>,
        V: AsRef<str>,
    {
        cookies.into_iter().fold(self, |client, (name, value)| {
            client.set_cookie(name.as_ref(), value.as_ref())
        })
    }

    /// Uses `jar` as the cookie store for every exchange, redirect hops
    /// included.
    pub fn set_cookie_jar(self, jar: Arc<Jar>) -> Self {
        self.configure_transport(|t| {
            t.cookie_jar = jar;
            Ok(())
        })
    }

    /// Sets the body, replacing any previous one.
    pub fn set_body(self, body: impl Into<Bytes>) -> Self {
        let body = body.into();
        self.edit(|d| {
            d.body = Some(body);
            Ok(())
        })
    }

    /// Sets the body from a string.
    pub fn set_body_string(self, body: impl Into<String>) -> Self {
        let body: String = body.into();
        self.set_body(body)
    }

    /// Sets the body from raw bytes.
    pub fn set_body_bytes(self, body: impl Into<Vec<u8>>) -> Self {
        let body: Vec<u8> = body.into();
        self.set_body(body)
    }

    /// Reads `reader` to the end and uses its contents as the body.
    ///
    /// The contents are buffered so the body can be replayed on redirect
    /// hops. A read failure is recorded and the previous body is kept.
    pub fn set_body_reader(self, mut reader: impl Read) -> Self {
        let mut buf = Vec::new();
        match reader.read_to_end(&mut buf) {
            Ok(_) => self.set_body(buf),
            Err(e) => {
                let mut client = self;
                client.record(Error::Body(e));
                client
            }
        }
    }

    /// Serializes `body` as JSON and sets `Content-Type: application/json`.
    pub fn set_json_body<T: Serialize + ?Sized>(self, body: &T) -> Self {
        match serde_json::to_vec(body) {
            Ok(json) => self
                .set_body(json)
                .set_content_type("application/json"),
            Err(e) => {
                let mut client = self;
                client.record(Error::SerializationFailed(e.to_string()));
                client
            }
        }
    }

    /// Stores basic-auth credentials, attached when the request is finalized.
    pub fn set_basic_auth(self, user: impl Into<String>, pass: impl Into<String>) -> Self {
        let auth = BasicAuth {
            user: user.into(),
            pass: pass.into(),
        };
        self.edit(|d| {
            d.basic_auth = Some(auth);
            Ok(())
        })
    }

    /// Sets the `Authorization` header to `token` as given.
    pub fn set_auth_token(self, token: &str) -> Self {
        self.edit(|d| d.set_auth_token(token))
    }

    /// Follows redirects with the default hop bound of
    /// [`DEFAULT_MAX_REDIRECTS`].
    pub fn enable_redirect(mut self) -> Self {
        self.redirect = RedirectPolicy {
            enabled: true,
            max_hops: DEFAULT_MAX_REDIRECTS,
        };
        self
    }

    /// Follows redirects, at most `count` hops.
    pub fn set_redirect_count(mut self, count: usize) -> Self {
        self.redirect = RedirectPolicy {
            enabled: true,
            max_hops: count,
        };
        self
    }

    /// Bounds both connection setup and the whole round trip by `timeout`.
    pub fn set_timeout(self, timeout: Duration) -> Self {
        self.configure_transport(|t| {
            t.connect_timeout = Some(timeout);
            t.timeout = Some(timeout);
            Ok(())
        })
    }

    /// Routes traffic through a proxy. The URI is validated like request
    /// URLs; a bad URI is recorded and the previous setting kept.
    pub fn set_proxy(self, uri: &str) -> Self {
        self.configure_transport(|t| t.set_proxy(uri))
    }

    /// Replaces the TLS settings.
    pub fn set_tls_config(self, tls: TlsConfig) -> Self {
        self.configure_transport(|t| {
            t.tls = tls;
            Ok(())
        })
    }

    /// Caches responses in a new, unbounded cache.
    pub fn enable_cache(self) -> Self {
        self.with_cache(ResponseCache::new())
    }

    /// Caches responses in a new cache with eviction settings.
    pub fn enable_cache_with(self, config: &CacheConfig) -> Self {
        self.with_cache(ResponseCache::with_config(config))
    }

    /// Caches responses in an existing cache, possibly shared with other
    /// clients.
    pub fn with_cache(mut self, cache: ResponseCache) -> Self {
        self.cache = Some(cache);
        self
    }

    /// Clears the cache. Does nothing when caching is off.
    pub fn reset_cache(self) -> Self {
        if let Some(cache) = &self.cache {
            cache.clear();
            tracing::debug!("Response cache cleared");
        }
        self
    }

    /// Discards this client and returns a brand-new one.
    pub fn reset_client(self) -> Self {
        Self::new()
    }

    /// The redirect policy in effect.
    pub fn redirect_policy(&self) -> RedirectPolicy {
        self.redirect
    }

    /// The transport settings in effect.
    pub fn transport_config(&self) -> &TransportConfig {
        &self.transport_config
    }

    /// The request as configured so far.
    pub fn descriptor(&self) -> &RequestDescriptor {
        &self.descriptor
    }

    /// The cache in use, if caching is on.
    pub fn cache(&self) -> Option<&ResponseCache> {
        self.cache.as_ref()
    }

    /// Where the current exchange stands.
    pub fn state(&self) -> ExchangeState {
        self.state
    }

    /// Every error recorded so far, oldest first.
    pub fn errors(&self) -> &[Error] {
        &self.errors
    }

    /// The finalized request, finalizing it first if needed.
    ///
    /// Returns `None` when finalization failed; the reason is in the errors.
    pub fn request(&mut self) -> (Option<&reqwest::Request>, &[Error]) {
        self.prepare();
        (self.prepared.as_ref(), &self.errors)
    }

    /// Builds the transport if a setting changed since the last build.
    pub(crate) fn ensure_transport(&mut self) -> Option<Transport> {
        if self.transport.is_none() {
            match self.transport_config.build() {
                Ok(transport) => self.transport = Some(transport),
                Err(e) => self.record(e),
            }
        }
        self.transport.clone()
    }

    /// Finalizes the descriptor. Returns `false` if that failed.
    pub(crate) fn prepare(&mut self) -> bool {
        if self.prepared.is_some() {
            return true;
        }

        let Some(transport) = self.ensure_transport() else {
            return false;
        };

        match self.descriptor.finalize(transport.http()) {
            Ok(request) => {
                tracing::debug!(
                    method = %request.method(),
                    url = %request.url(),
                    "Request finalized"
                );
                self.prepared = Some(request);
                if self.state == ExchangeState::Unsent {
                    self.state = ExchangeState::Ready;
                }
                true
            }
            Err(e) => {
                self.record(e);
                false
            }
        }
    }

    /// Drains the response body and returns every recorded error.
    pub fn close(mut self) -> Vec<Error> {
        if let Some(response) = self.response.as_mut() {
            let drained = response.take_body().len();
            tracing::trace!(bytes = drained, "Drained response body on close");
        }
        self.errors
    }
}

impl Default for Client {
    fn default() -> Self {
        Self::new()
    }
}
