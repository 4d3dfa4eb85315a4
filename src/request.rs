//! The request descriptor accumulated by the builder chain.

use crate::{validate::validate, Error, Result};
use bytes::Bytes;
use http::header::{AUTHORIZATION, CONTENT_TYPE, COOKIE, USER_AGENT};
use http::{HeaderMap, HeaderName, HeaderValue, Method};

/// Credentials injected as an `Authorization: Basic ...` header when the
/// request is finalized.
#[derive(Clone, PartialEq, Eq)]
pub struct BasicAuth {
    /// The user name.
    pub user: String,
    /// The password.
    pub pass: String,
}

impl std::fmt::Debug for BasicAuth {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("BasicAuth")
            .field("user", &self.user)
            .field("pass", &"<redacted>")
            .finish()
    }
}

/// Everything the builder knows about the next request.
///
/// The descriptor is plain data. It only becomes a transport request in
/// [`RequestDescriptor::finalize`], which is where the URL is validated and
/// credentials are attached.
#[derive(Debug, Clone)]
pub struct RequestDescriptor {
    /// The HTTP method (GET, POST, etc.).
    pub method: Method,

    /// The raw URL as given by the caller.
    pub url: String,

    /// Request headers. Names are case-insensitive and keep every value.
    pub headers: HeaderMap,

    /// The request body.
    pub body: Option<Bytes>,

    /// Basic-auth credentials.
    pub basic_auth: Option<BasicAuth>,
}

impl RequestDescriptor {
    /// Creates a new descriptor with the given method and URL.
    pub fn new(method: Method, url: impl Into<String>) -> Self {
        Self {
            method,
            url: url.into(),
            headers: HeaderMap::new(),
            body: None,
            basic_auth: None,
        }
    }

    /// Replaces every value of a header.
    ///
    /// # Errors
    ///
    /// Returns an error if the header name or a value is invalid. The
    /// descriptor is left untouched in that case.
    pub fn set_header<I, V>(&mut self, name: &str, values: I) -> Result<()>
    where
        I: IntoIterator<Item = V>,
        V: AsRef<str>,
    {
        let name = header_name(name)?;
        let values = values
            .into_iter()
            .map(|v| header_value(v.as_ref()))
            .collect::<Result<Vec<_>>>()?;

        self.headers.remove(&name);
        for value in values {
            self.headers.append(name.clone(), value);
        }
        Ok(())
    }

    /// Appends values to a header, keeping the existing ones.
    ///
    /// # Errors
    ///
    /// Returns an error if the header name or a value is invalid.
    pub fn add_header<I, V>(&mut self, name: &str, values: I) -> Result<()>
    where
        I: IntoIterator<Item = V>,
        V: AsRef<str>,
    {
        let name = header_name(name)?;
        let values = values
            .into_iter()
            .map(|v| header_value(v.as_ref()))
            .collect::<Result<Vec<_>>>()?;

        for value in values {
            self.headers.append(name.clone(), value);
        }
        Ok(())
    }

    /// Sets `Content-Type`.
    pub fn set_content_type(&mut self, content_type: &str) -> Result<()> {
        self.headers
            .insert(CONTENT_TYPE, header_value(content_type)?);
        Ok(())
    }

    /// Sets `User-Agent`.
    pub fn set_user_agent(&mut self, agent: &str) -> Result<()> {
        self.headers.insert(USER_AGENT, header_value(agent)?);
        Ok(())
    }

    /// Sets `Authorization` to `token`, verbatim.
    pub fn set_auth_token(&mut self, token: &str) -> Result<()> {
        let mut value = header_value(token)?;
        value.set_sensitive(true);
        self.headers.insert(AUTHORIZATION, value);
        Ok(())
    }

    /// Replaces the `Cookie` header with a raw cookie string.
    pub fn set_cookie_string(&mut self, cookie: &str) -> Result<()> {
        self.headers.insert(COOKIE, header_value(cookie)?);
        Ok(())
    }

    /// Appends a `name=value` pair to the `Cookie` header.
    pub fn append_cookie(&mut self, name: &str, value: &str) -> Result<()> {
        let pair = format!("{}={}", name, value);
        let cookie = match self.headers.get(COOKIE).map(|v| v.to_str()) {
            Some(Ok(existing)) if !existing.is_empty() => format!("{}; {}", existing, pair),
            _ => pair,
        };
        self.headers.insert(COOKIE, header_value(&cookie)?);
        Ok(())
    }

    /// Turns the descriptor into a request ready for the transport.
    ///
    /// # Errors
    ///
    /// - [`Error::InvalidUrl`] / [`Error::InvalidHost`] from URL validation
    /// - [`Error::Network`] if the transport rejects the request parts
    pub fn finalize(&self, http: &reqwest::Client) -> Result<reqwest::Request> {
        let url = validate(&self.url)?;

        let mut builder = http
            .request(self.method.clone(), url)
            .headers(self.headers.clone());

        if let Some(body) = &self.body {
            builder = builder.body(body.clone());
        }

        if let Some(auth) = &self.basic_auth {
            builder = builder.basic_auth(&auth.user, Some(&auth.pass));
        }

        Ok(builder.build()?)
    }
}

impl Default for RequestDescriptor {
    fn default() -> Self {
        Self::new(Method::GET, "")
    }
}

fn header_name(name: &str) -> Result<HeaderName> {
    HeaderName::try_from(name)
        .map_err(|e| Error::ConfigurationError(format!("Invalid header name: {}", e)))
}

fn header_value(value: &str) -> Result<HeaderValue> {
    HeaderValue::try_from(value)
        .map_err(|e| Error::ConfigurationError(format!("Invalid header value: {}", e)))
}

#[cfg(test)]
mod tests {
    use super::*;

    fn values(d: &RequestDescriptor, name: &str) -> Vec<String> {
        d.headers
            .get_all(name)
            .iter()
            .map(|v| v.to_str().unwrap().to_string())
            .collect()
    }

    #[test]
    fn test_set_header_last_write_wins() {
        let mut d = RequestDescriptor::default();
        d.set_header("X-Tag", ["a", "b"]).unwrap();
        d.set_header("x-tag", ["c"]).unwrap();
        assert_eq!(values(&d, "X-TAG"), vec!["c"]);
    }

    #[test]
    fn test_add_header_appends() {
        let mut d = RequestDescriptor::default();
        d.add_header("Accept", ["text/html"]).unwrap();
        d.add_header("accept", ["application/json", "text/xml"]).unwrap();
        assert_eq!(
            values(&d, "accept"),
            vec!["text/html", "application/json", "text/xml"]
        );
    }

    #[test]
    fn test_invalid_header_leaves_descriptor_untouched() {
        let mut d = RequestDescriptor::default();
        d.set_header("X-Tag", ["keep"]).unwrap();

        let err = d.set_header("X-Tag", ["ok", "bad\nvalue"]).unwrap_err();
        assert!(matches!(err, Error::ConfigurationError(_)));
        assert_eq!(values(&d, "x-tag"), vec!["keep"]);

        assert!(d.add_header("bad header", ["v"]).is_err());
    }

    #[test]
    fn test_cookies_append() {
        let mut d = RequestDescriptor::default();
        d.append_cookie("a", "1").unwrap();
        d.append_cookie("b", "2").unwrap();
        assert_eq!(values(&d, "cookie"), vec!["a=1; b=2"]);

        d.set_cookie_string("session=xyz").unwrap();
        assert_eq!(values(&d, "cookie"), vec!["session=xyz"]);
    }

    #[test]
    fn test_finalize_normalizes_url_and_attaches_auth() {
        let mut d = RequestDescriptor::new(Method::POST, "example.com/path");
        d.body = Some(Bytes::from_static(b"payload"));
        d.basic_auth = Some(BasicAuth {
            user: "user".to_string(),
            pass: "pass".to_string(),
        });
        d.set_content_type("text/plain").unwrap();

        let request = d.finalize(&reqwest::Client::new()).unwrap();

        assert_eq!(request.method(), Method::POST);
        assert_eq!(request.url().as_str(), "http://example.com/path");
        assert_eq!(request.headers()["content-type"], "text/plain");
        assert_eq!(
            request.headers()[AUTHORIZATION],
            "Basic dXNlcjpwYXNz"
        );
        assert_eq!(
            request.body().and_then(|b| b.as_bytes()),
            Some(&b"payload"[..])
        );
    }

    #[test]
    fn test_finalize_rejects_missing_host() {
        let d = RequestDescriptor::new(Method::GET, "http://");
        assert!(matches!(
            d.finalize(&reqwest::Client::new()),
            Err(Error::InvalidHost)
        ));
    }

    #[test]
    fn test_basic_auth_debug_redacts_password() {
        let auth = BasicAuth {
            user: "me".to_string(),
            pass: "secret".to_string(),
        };
        assert!(!format!("{:?}", auth).contains("secret"));
    }
}
