//! Transport configuration and the `reqwest` client built from it.
//!
//! A [`Transport`] is immutable once built. Clients that change their
//! transport settings get a freshly built one instead of mutating a transport
//! another client may be using.

use crate::{validate::validate, Error, Result};
use once_cell::sync::OnceCell;
use reqwest::cookie::Jar;
use reqwest::redirect;
use std::sync::Arc;
use std::time::Duration;

const MAX_IDLE_PER_HOST: usize = 32;

/// TLS settings passed through to the transport.
///
/// # Examples
///
/// ```
/// use httpchain::transport::TlsConfig;
///
/// let tls = TlsConfig {
///     accept_invalid_certs: true,
///     ..Default::default()
/// };
/// assert!(tls.root_certificates_pem.is_empty());
/// ```
#[derive(Debug, Clone, Default)]
pub struct TlsConfig {
    /// Skip certificate verification.
    pub accept_invalid_certs: bool,

    /// Additional trusted roots, PEM encoded.
    pub root_certificates_pem: Vec<Vec<u8>>,

    /// Lowest TLS version to negotiate.
    pub min_version: Option<reqwest::tls::Version>,
}

/// Everything that shapes the underlying `reqwest::Client`.
#[derive(Debug, Clone)]
pub struct TransportConfig {
    /// Overall deadline for a round trip.
    pub timeout: Option<Duration>,

    /// Deadline for establishing a connection.
    pub connect_timeout: Option<Duration>,

    /// Proxy all traffic through this URL.
    pub proxy: Option<url::Url>,

    /// TLS settings.
    pub tls: TlsConfig,

    /// Idle connections kept per host.
    pub pool_max_idle_per_host: usize,

    /// Cookie store shared with the transport.
    pub cookie_jar: Arc<Jar>,
}

impl Default for TransportConfig {
    fn default() -> Self {
        Self {
            timeout: None,
            connect_timeout: None,
            proxy: None,
            tls: TlsConfig::default(),
            pool_max_idle_per_host: MAX_IDLE_PER_HOST,
            cookie_jar: Arc::new(Jar::default()),
        }
    }
}

impl TransportConfig {
    /// Sets a proxy from a raw URI, validated like request URLs.
    ///
    /// # Errors
    ///
    /// Returns [`Error::InvalidUrl`] or [`Error::InvalidHost`] if the URI is
    /// unusable; the previous proxy setting is kept.
    pub fn set_proxy(&mut self, uri: &str) -> Result<()> {
        self.proxy = Some(validate(uri)?);
        Ok(())
    }

    /// Builds the transport.
    ///
    /// Redirects are never followed by `reqwest` itself; the executor does it.
    ///
    /// # Errors
    ///
    /// Returns an error if the TLS material or proxy is rejected.
    pub fn build(&self) -> Result<Transport> {
        let mut builder = reqwest::Client::builder()
            .redirect(redirect::Policy::none())
            .cookie_provider(self.cookie_jar.clone())
            .pool_max_idle_per_host(self.pool_max_idle_per_host)
            .danger_accept_invalid_certs(self.tls.accept_invalid_certs);

        if let Some(timeout) = self.timeout {
            builder = builder.timeout(timeout);
        }

        if let Some(timeout) = self.connect_timeout {
            builder = builder.connect_timeout(timeout);
        }

        if let Some(proxy) = &self.proxy {
            let proxy = reqwest::Proxy::all(proxy.as_str())
                .map_err(|e| Error::ConfigurationError(format!("Invalid proxy: {}", e)))?;
            builder = builder.proxy(proxy);
        }

        for pem in &self.tls.root_certificates_pem {
            let cert = reqwest::Certificate::from_pem(pem).map_err(|e| {
                Error::ConfigurationError(format!("Invalid root certificate: {}", e))
            })?;
            builder = builder.add_root_certificate(cert);
        }

        if let Some(version) = self.tls.min_version {
            builder = builder.min_tls_version(version);
        }

        let http = builder.build().map_err(|e| {
            Error::ConfigurationError(format!("Failed to build HTTP client: {}", e))
        })?;

        tracing::debug!(
            timeout_ms = self.timeout.map(|t| t.as_millis() as u64),
            proxy = self.proxy.as_ref().map(|p| p.as_str()),
            accept_invalid_certs = self.tls.accept_invalid_certs,
            "Built HTTP transport"
        );

        Ok(Transport { http })
    }
}

/// A built, immutable transport.
///
/// Cloning is cheap; clones share the connection pool.
#[derive(Debug, Clone)]
pub struct Transport {
    http: reqwest::Client,
}

impl Transport {
    /// The underlying client.
    pub fn http(&self) -> &reqwest::Client {
        &self.http
    }

    /// Performs exactly one round trip. No redirect following, no cache.
    pub(crate) async fn round_trip(&self, request: reqwest::Request) -> Result<reqwest::Response> {
        self.http
            .execute(request)
            .await
            .map_err(Error::from_transport)
    }
}

static SHARED: OnceCell<(TransportConfig, Transport)> = OnceCell::new();

/// The process-wide transport and the configuration it was built from.
///
/// Built exactly once, on first use, from [`TransportConfig::default`].
pub(crate) fn shared() -> Result<&'static (TransportConfig, Transport)> {
    SHARED.get_or_try_init(|| {
        let config = TransportConfig::default();
        let transport = config.build()?;
        Ok((config, transport))
    })
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_default_config_builds() {
        let config = TransportConfig::default();
        assert_eq!(config.pool_max_idle_per_host, MAX_IDLE_PER_HOST);
        assert!(config.build().is_ok());
    }

    #[test]
    fn test_set_proxy_validates() {
        let mut config = TransportConfig::default();
        config.set_proxy("proxy.local:3128").unwrap();
        assert_eq!(
            config.proxy.as_ref().map(|p| p.as_str()),
            Some("http://proxy.local:3128/")
        );

        assert!(matches!(config.set_proxy("http://"), Err(Error::InvalidHost)));
        assert!(config.proxy.is_some());
    }

    #[test]
    fn test_shared_transport_is_built_once() {
        let first = shared().unwrap() as *const _;
        let second = shared().unwrap() as *const _;
        assert_eq!(first, second);
    }
}
