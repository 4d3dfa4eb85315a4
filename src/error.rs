//! Error types recorded by a request chain.
//!
//! A chain never aborts on the first failure. Every step that can fail pushes
//! one of these errors onto the client's error list and hands the client back,
//! so the full history of a chain can be inspected at the end with
//! [`Client::errors`](crate::Client::errors).

use http::StatusCode;
use std::fmt;

/// The body format a decoder was asked to produce.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum DecodeFormat {
    /// `serde_json` decoding.
    Json,
    /// `quick-xml` decoding.
    Xml,
}

impl fmt::Display for DecodeFormat {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            DecodeFormat::Json => f.write_str("JSON"),
            DecodeFormat::Xml => f.write_str("XML"),
        }
    }
}

/// The error type accumulated by a [`Client`](crate::Client).
///
/// # Examples
///
/// ```no_run
/// use httpchain::Error;
///
/// # async fn example() {
/// let client = httpchain::get("http://").send().await;
///
/// for error in client.errors() {
///     match error {
///         Error::InvalidHost => eprintln!("no host in URL"),
///         Error::HttpStatus { status } => eprintln!("redirect ended on {}", status),
///         other => eprintln!("other error: {}", other),
///     }
/// }
/// # }
/// ```
#[derive(thiserror::Error, Debug)]
pub enum Error {
    /// The URL could not be parsed, or normalized to an empty string.
    #[error("Invalid URL")]
    InvalidUrl,

    /// The URL parsed but has no host.
    #[error("Invalid Host Request")]
    InvalidHost,

    /// A redirect response carried no usable `Location` header.
    #[error("Invalid Redirect Location")]
    InvalidRedirectLocation,

    /// The redirect chain was longer than the configured hop bound.
    ///
    /// The last response received is still kept on the client.
    #[error("Too many redirects (limit {max})")]
    TooManyRedirection {
        /// The configured hop bound
        max: usize,
    },

    /// A redirect hop ended on a 4xx or 5xx status.
    #[error("{}", status.canonical_reason().unwrap_or("Unknown Status"))]
    HttpStatus {
        /// The status of the final hop
        status: StatusCode,
    },

    /// A network-level error occurred (connection failed, DNS lookup failed, etc.).
    #[error("Network error: {0}")]
    Network(#[from] reqwest::Error),

    /// The request timed out.
    #[error("Request timed out")]
    Timeout,

    /// The request was cancelled through its cancellation token.
    #[error("Request cancelled")]
    Cancelled,

    /// A decoder was called but the chain has no response to read from.
    #[error("No response available")]
    NoResponse,

    /// The response body could not be read.
    #[error("Failed to read response body: {0}")]
    Body(#[source] std::io::Error),

    /// A `Content-Encoding: gzip` body could not be decompressed.
    ///
    /// The raw, still-compressed bytes remain readable on the response.
    #[error("Failed to decompress gzip body: {0}")]
    Decompression(#[source] std::io::Error),

    /// Failed to deserialize the response body into the expected type.
    ///
    /// The raw body is preserved for debugging.
    #[error("Failed to deserialize {format} response (status {status}): {serde_error}")]
    DeserializationFailed {
        /// Which decoder failed
        format: DecodeFormat,
        /// The raw response body that failed to deserialize
        raw_response: String,
        /// The decoder's error message
        serde_error: String,
        /// The HTTP status code
        status: StatusCode,
    },

    /// Failed to serialize a request body.
    #[error("Failed to serialize request: {0}")]
    SerializationFailed(String),

    /// Invalid configuration was provided (header names, methods, TLS material...).
    #[error("Configuration error: {0}")]
    ConfigurationError(String),
}

impl Error {
    /// Returns the HTTP status code if this error has one.
    ///
    /// ```
    /// use httpchain::Error;
    /// use http::StatusCode;
    ///
    /// let err = Error::HttpStatus { status: StatusCode::NOT_FOUND };
    /// assert_eq!(err.status(), Some(StatusCode::NOT_FOUND));
    /// assert_eq!(err.to_string(), "Not Found");
    /// assert_eq!(Error::InvalidHost.status(), None);
    /// ```
    pub fn status(&self) -> Option<StatusCode> {
        match self {
            Error::HttpStatus { status } => Some(*status),
            Error::DeserializationFailed { status, .. } => Some(*status),
            Error::Network(e) => e.status(),
            _ => None,
        }
    }

    /// Returns the raw response body if this error has one.
    pub fn raw_response(&self) -> Option<&str> {
        match self {
            Error::DeserializationFailed { raw_response, .. } => Some(raw_response),
            _ => None,
        }
    }

    /// Maps a transport error, folding timeouts into [`Error::Timeout`].
    pub(crate) fn from_transport(error: reqwest::Error) -> Self {
        if error.is_timeout() {
            Error::Timeout
        } else {
            Error::Network(error)
        }
    }
}

/// A specialized `Result` type for the fallible building blocks of a chain.
pub type Result<T> = std::result::Result<T, Error>;
