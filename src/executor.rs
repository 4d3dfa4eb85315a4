//! Request execution: cache lookup, round trip, redirects, gzip and the
//! background cache write.

use crate::{
    cache::{CacheEntry, CacheKey},
    client::{Client, ExchangeState, RedirectPolicy},
    response::{Body, Response},
    transport::Transport,
    Error,
};
use bytes::Bytes;
use flate2::read::GzDecoder;
use http::header::{
    AUTHORIZATION, CONTENT_ENCODING, CONTENT_LENGTH, COOKIE, LOCATION, PROXY_AUTHORIZATION,
};
use http::{HeaderMap, StatusCode};
use std::io::Read;
use std::time::{Instant, SystemTime};
use tokio_util::sync::CancellationToken;

/// What one call produced: maybe a response, and the errors met on the way.
struct Outcome {
    response: Option<Response>,
    errors: Vec<Error>,
}

impl Outcome {
    fn failed(error: Error) -> Self {
        Self {
            response: None,
            errors: vec![error],
        }
    }
}

impl Client {
    /// Finalizes and performs the exchange.
    ///
    /// # Examples
    ///
    /// ```no_run
    /// # async fn example() {
    /// let client = httpchain::get("example.com/path")
    ///     .enable_redirect()
    ///     .send()
    ///     .await;
    ///
    /// for error in client.errors() {
    ///     eprintln!("{}", error);
    /// }
    /// # }
    /// ```
    pub async fn send(mut self) -> Self {
        self.execute(None).await;
        self
    }

    /// Like [`Client::send`], but cancelling `token` aborts the in-flight
    /// round trip and records [`Error::Cancelled`].
    ///
    /// A cache write already scheduled by an earlier call is not affected.
    pub async fn send_with_cancel(mut self, token: CancellationToken) -> Self {
        self.execute(Some(token)).await;
        self
    }

    pub(crate) async fn execute(&mut self, cancel: Option<CancellationToken>) {
        self.response = None;

        if !self.prepare() {
            self.state = ExchangeState::Failed;
            return;
        }

        let finalized = self
            .prepared
            .as_ref()
            .map(|prepared| (CacheKey::of(prepared), prepared.try_clone()));
        let (Some(transport), Some((key, request))) = (self.transport.clone(), finalized) else {
            self.state = ExchangeState::Failed;
            return;
        };

        if let Some(cache) = self.cache.clone() {
            // Our own previous write must be visible before we look up.
            if let Some(pending) = self.pending_cache_write.take() {
                if let Err(e) = pending.await {
                    tracing::warn!(error = %e, "Background cache write did not complete");
                }
            }

            if let Some(entry) = cache.get(&key) {
                tracing::debug!(method = %key.method, url = %key.url, "Serving response from cache");
                self.response = Some(Response::from_cache(&entry));
                self.state = ExchangeState::Completed;
                return;
            }
        }

        let Some(request) = request else {
            self.record(Error::ConfigurationError(
                "request body cannot be replayed".to_string(),
            ));
            self.state = ExchangeState::Failed;
            return;
        };

        tracing::debug!(
            method = %request.method(),
            url = %request.url(),
            "Executing HTTP request"
        );

        let policy = self.redirect;
        let outcome = match cancel {
            Some(token) => tokio::select! {
                biased;
                _ = token.cancelled() => Outcome::failed(Error::Cancelled),
                outcome = exchange(&transport, policy, request) => outcome,
            },
            None => exchange(&transport, policy, request).await,
        };

        let succeeded = outcome.errors.is_empty();
        for error in outcome.errors {
            self.record(error);
        }

        let Some(response) = outcome.response else {
            self.state = ExchangeState::Failed;
            return;
        };

        if succeeded && !is_error_status(response.status) {
            if let Some(cache) = self.cache.clone() {
                let entry = CacheEntry {
                    status: response.status,
                    headers: response.headers.clone(),
                    url: response.url.clone(),
                    version: response.version,
                    body: response.body().snapshot(),
                    redirects: response.redirects,
                    captured_at: response.received_at,
                };
                let generation = cache.generation();
                self.pending_cache_write = Some(tokio::spawn(async move {
                    let (method, url) = (key.method.clone(), key.url.clone());
                    if cache.set_if_current(generation, key, entry) {
                        tracing::debug!(method = %method, url = %url, "Stored response in cache");
                    } else {
                        tracing::debug!(method = %method, url = %url, "Cache cleared before write, snapshot dropped");
                    }
                }));
            }
        }

        self.response = Some(response);
        self.state = ExchangeState::Completed;
    }
}

/// One round trip plus redirect resolution, body buffering and decoding.
async fn exchange(transport: &Transport, policy: RedirectPolicy, request: reqwest::Request) -> Outcome {
    let start = Instant::now();
    let template = request.try_clone();

    let response = match transport.round_trip(request).await {
        Ok(response) => response,
        Err(e) => return Outcome::failed(e),
    };

    let mut errors = Vec::new();

    let (response, redirects) = match (&template, policy.follows() && is_followable(response.status())) {
        (Some(template), true) => {
            let (response, redirects, error) =
                follow_redirects(transport, policy.max_hops, template, response).await;
            errors.extend(error);
            (response, redirects)
        }
        _ => (response, 0),
    };

    let status = response.status();
    let version = response.version();
    let url = response.url().clone();
    let mut headers = response.headers().clone();

    let raw = match response.bytes().await {
        Ok(bytes) => bytes,
        Err(e) => {
            errors.push(Error::from_transport(e));
            Bytes::new()
        }
    };

    let body = match decode_gzip(&mut headers, raw) {
        Ok(body) => body,
        Err((raw, e)) => {
            errors.push(Error::Decompression(e));
            raw
        }
    };

    let latency = start.elapsed();

    tracing::info!(
        status = status.as_u16(),
        latency_ms = latency.as_millis() as u64,
        redirects = redirects,
        "Received HTTP response"
    );

    Outcome {
        response: Some(Response {
            status,
            headers,
            url,
            version,
            latency,
            redirects,
            from_cache: false,
            received_at: SystemTime::now(),
            body: Body::new(body),
        }),
        errors,
    }
}

/// 3xx other than `300 Multiple Choices`.
fn is_followable(status: StatusCode) -> bool {
    status.is_redirection() && status != StatusCode::MULTIPLE_CHOICES
}

fn is_error_status(status: StatusCode) -> bool {
    status.is_client_error() || status.is_server_error()
}

/// Follows `Location` headers until a non-redirect status, an error, or the
/// hop bound.
///
/// Every hop sends a fresh clone of `template` straight to the transport, so
/// the cache and the builder are never re-entered. The last response received
/// is always returned, alongside the error that stopped the chain, if any.
async fn follow_redirects(
    transport: &Transport,
    max_hops: usize,
    template: &reqwest::Request,
    mut response: reqwest::Response,
) -> (reqwest::Response, usize, Option<Error>) {
    let mut hops = 0;

    while is_followable(response.status()) {
        if hops >= max_hops {
            tracing::warn!(hops = hops, max_hops = max_hops, "Redirect bound reached");
            return (response, hops, Some(Error::TooManyRedirection { max: max_hops }));
        }

        let next_url = match location(&response) {
            Some(url) => url,
            None => return (response, hops, Some(Error::InvalidRedirectLocation)),
        };

        let Some(mut next) = template.try_clone() else {
            return (
                response,
                hops,
                Some(Error::ConfigurationError(
                    "request body cannot be replayed".to_string(),
                )),
            );
        };
        if next_url.origin() != response.url().origin() {
            strip_credentials(next.headers_mut());
        }
        *next.url_mut() = next_url;

        tracing::debug!(
            status = response.status().as_u16(),
            location = %next.url(),
            hop = hops + 1,
            "Following redirect"
        );

        response = match transport.round_trip(next).await {
            Ok(next_response) => next_response,
            Err(e) => return (response, hops, Some(e)),
        };
        hops += 1;

        let status = response.status();
        if is_error_status(status) {
            tracing::warn!(status = status.as_u16(), hops = hops, "Redirect ended on an error status");
            return (response, hops, Some(Error::HttpStatus { status }));
        }
    }

    (response, hops, None)
}

/// Drops headers that must not leak to another origin.
fn strip_credentials(headers: &mut HeaderMap) {
    for name in [AUTHORIZATION, COOKIE, PROXY_AUTHORIZATION] {
        if headers.remove(&name).is_some() {
            tracing::debug!(header = %name, "Dropping header on cross-origin redirect");
        }
    }
}

/// Resolves `Location` against the URL of the response that carried it.
fn location(response: &reqwest::Response) -> Option<url::Url> {
    let raw = response.headers().get(LOCATION)?.to_str().ok()?.trim();
    if raw.is_empty() {
        return None;
    }
    response.url().join(raw).ok()
}

/// Decompresses a `Content-Encoding: gzip` body.
///
/// On success the encoding headers are dropped. On failure the raw bytes are
/// handed back untouched together with the error.
fn decode_gzip(headers: &mut HeaderMap, body: Bytes) -> Result<Bytes, (Bytes, std::io::Error)> {
    let is_gzip = headers
        .get(CONTENT_ENCODING)
        .and_then(|v| v.to_str().ok())
        .is_some_and(|v| v.trim().eq_ignore_ascii_case("gzip"));

    if !is_gzip {
        return Ok(body);
    }

    let mut decoded = Vec::with_capacity(body.len() * 2);
    match GzDecoder::new(&body[..]).read_to_end(&mut decoded) {
        Ok(_) => {
            headers.remove(CONTENT_ENCODING);
            headers.remove(CONTENT_LENGTH);
            Ok(Bytes::from(decoded))
        }
        Err(e) => Err((body, e)),
    }
}
