//! # httpchain - fluent HTTP request chains
//!
//! httpchain wraps `reqwest` in a single mutable builder: configure the
//! method, URL, headers, body and auth, send, then decode the response as
//! JSON, XML or raw bytes. Redirects are followed manually with a hop bound,
//! gzip bodies are decompressed, responses can be cached, and every failure is
//! accumulated on the client instead of breaking the chain.
//!
//! ## Quick Start
//!
//! ```no_run
//! use serde::Deserialize;
//!
//! #[derive(Debug, Default, Deserialize)]
//! struct Post {
//!     id: u64,
//!     title: String,
//! }
//!
//! #[tokio::main]
//! async fn main() {
//!     let mut post = Post::default();
//!
//!     let client = httpchain::get("jsonplaceholder.typicode.com/posts/1")
//!         .set_user_agent("httpchain-demo/0.1")
//!         .enable_redirect()
//!         .send()
//!         .await
//!         .json(&mut post)
//!         .await;
//!
//!     for error in client.errors() {
//!         eprintln!("error: {}", error);
//!     }
//!     println!("{}: {}", post.id, post.title);
//! }
//! ```
//!
//! ## Error Handling
//!
//! No step returns early. Invalid URLs, transport failures, redirect
//! problems and decode failures are appended to the client's error list in
//! the order they happen:
//!
//! ```no_run
//! use httpchain::{Client, Error};
//!
//! # async fn example() {
//! let mut value = serde_json::Value::Null;
//! let client = Client::new()
//!     .get("http://")             // no host: recorded at send time
//!     .send()
//!     .await
//!     .json(&mut value)           // nothing to decode: recorded too
//!     .await;
//!
//! assert!(matches!(client.errors(), [Error::InvalidHost, Error::NoResponse]));
//! # }
//! ```
//!
//! ## Caching
//!
//! With [`Client::enable_cache`], a successful response is snapshotted by a
//! background task and later calls with the same method and URL are served
//! without touching the network.
//!
//! ## Shared transport
//!
//! [`Client::shared`] returns an isolated client that reuses a process-wide
//! connection pool, built once on first use.

mod client;
mod decode;
mod error;
mod executor;

pub mod cache;
pub mod request;
pub mod response;
pub mod transport;
pub mod validate;

pub use cache::{CacheConfig, ResponseCache};
pub use client::{Client, ExchangeState, RedirectPolicy, DEFAULT_MAX_REDIRECTS};
pub use error::{DecodeFormat, Error, Result};
pub use response::{Body, Response};
pub use tokio_util::sync::CancellationToken;
pub use transport::{TlsConfig, TransportConfig};

/// Starts a GET chain on a new client.
pub fn get(url: impl Into<String>) -> Client {
    Client::new().get(url)
}

/// Starts a POST chain on a new client.
pub fn post(url: impl Into<String>) -> Client {
    Client::new().post(url)
}

/// Starts a PUT chain on a new client.
pub fn put(url: impl Into<String>) -> Client {
    Client::new().put(url)
}

/// Starts a PATCH chain on a new client.
pub fn patch(url: impl Into<String>) -> Client {
    Client::new().patch(url)
}

/// Starts a DELETE chain on a new client.
pub fn delete(url: impl Into<String>) -> Client {
    Client::new().delete(url)
}

/// Starts a HEAD chain on a new client.
pub fn head(url: impl Into<String>) -> Client {
    Client::new().head(url)
}
