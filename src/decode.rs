//! Response decoders.
//!
//! Every decoder runs the exchange first if the current descriptor has not
//! been sent yet, and records failures instead of returning them.

use crate::{
    client::{Client, ExchangeState},
    error::DecodeFormat,
    response::{Body, Response},
    Error,
};
use bytes::Bytes;
use http::StatusCode;
use serde::de::DeserializeOwned;

impl Client {
    async fn ensure_sent(&mut self) {
        if matches!(self.state, ExchangeState::Unsent | ExchangeState::Ready) {
            self.execute(None).await;
        }
    }

    /// Drains the response body, or records [`Error::NoResponse`].
    fn drain_body(&mut self) -> Option<(StatusCode, Bytes)> {
        match self.response.as_mut() {
            Some(response) => Some((response.status, response.body.take_bytes())),
            None => {
                self.record(Error::NoResponse);
                None
            }
        }
    }

    fn decode_into<T>(
        mut self,
        format: DecodeFormat,
        dest: &mut T,
        decode: impl FnOnce(&[u8]) -> std::result::Result<T, String>,
    ) -> Self {
        let Some((status, bytes)) = self.drain_body() else {
            return self;
        };

        match decode(&bytes) {
            Ok(value) => *dest = value,
            Err(serde_error) => {
                let raw_response = String::from_utf8_lossy(&bytes).into_owned();
                tracing::error!(
                    format = %format,
                    error = %serde_error,
                    raw_response = %raw_response,
                    "Failed to deserialize response"
                );
                self.record(Error::DeserializationFailed {
                    format,
                    raw_response,
                    serde_error,
                    status,
                });
            }
        }
        self
    }

    /// Decodes the body as JSON into `dest`.
    ///
    /// `dest` is only written when decoding succeeds. The body is consumed.
    ///
    /// # Examples
    ///
    /// ```no_run
    /// # async fn example() {
    /// let mut body = serde_json::Value::Null;
    /// let client = httpchain::get("https://api.example.com/items")
    ///     .json(&mut body)
    ///     .await;
    /// assert!(client.errors().is_empty());
    /// # }
    /// ```
    pub async fn json<T: DeserializeOwned>(mut self, dest: &mut T) -> Self {
        self.ensure_sent().await;
        self.decode_into(DecodeFormat::Json, dest, |bytes| {
            serde_json::from_slice(bytes).map_err(|e| e.to_string())
        })
    }

    /// Decodes the body as XML into `dest`.
    ///
    /// `dest` is only written when decoding succeeds. The body is consumed.
    pub async fn xml<T: DeserializeOwned>(mut self, dest: &mut T) -> Self {
        self.ensure_sent().await;
        self.decode_into(DecodeFormat::Xml, dest, |bytes| {
            quick_xml::de::from_reader(bytes).map_err(|e| e.to_string())
        })
    }

    /// Reads the rest of the body into memory.
    ///
    /// Returns an empty buffer when there is no response.
    pub async fn byte_body(&mut self) -> (Bytes, &[Error]) {
        self.ensure_sent().await;
        let bytes = self.drain_body().map(|(_, bytes)| bytes).unwrap_or_default();
        (bytes, &self.errors)
    }

    /// Hands over the body as a reader.
    pub async fn raw_body(&mut self) -> (Option<Body>, &[Error]) {
        self.ensure_sent().await;
        let body = match self.response.as_mut() {
            Some(response) => Some(response.take_body()),
            None => {
                self.record(Error::NoResponse);
                None
            }
        };
        (body, &self.errors)
    }

    /// The response of the current exchange, running it first if needed.
    pub async fn response(&mut self) -> (Option<&Response>, &[Error]) {
        self.ensure_sent().await;
        (self.response.as_ref(), &self.errors)
    }

    /// Like [`Client::response`], but takes ownership of the response and
    /// the errors.
    pub async fn into_response(mut self) -> (Option<Response>, Vec<Error>) {
        self.ensure_sent().await;
        (self.response.take(), std::mem::take(&mut self.errors))
    }
}
