//! HTTP client - configuration.

use std::{collections::BTreeMap, path::Path, str::FromStr, time::Duration};

use reqwest::{
    header::{HeaderMap, HeaderName, HeaderValue},
    ClientBuilder, Identity,
};
use reqwest_middleware::ClientWithMiddleware;
use serde::{Deserialize, Serialize};
use tokio::fs;
use tracing::warn;

use crate::http_client::{errors::HttpClientError, middleware::wrap_client};

/// Product token sent in `User-Agent` header.
const PRODUCT: &str = concat!(env!("CARGO_PKG_NAME"), "/", env!("CARGO_PKG_VERSION"));

/// Configuration of an HTTP client used to reach PhantomDB REST API.
#[derive(Clone, Debug, Deserialize, PartialEq, Serialize)]
#[non_exhaustive]
pub struct HttpClientConfig {
    /// Path to PEM-formatted file containing a private key and at least one client certificate.
    #[serde(
        default,
        skip_serializing_if = "Option::is_none",
        alias = "client_key",
        alias = "identity"
    )]
    pub client_cert: Option<Box<Path>>,
    /// Timeout for the connect phase of a request.
    ///
    /// Default is `None`.
    #[serde(
        default,
        skip_serializing_if = "Option::is_none",
        with = "humantime_serde"
    )]
    pub connect_timeout: Option<Duration>,
    /// Timeout for each read operation, reset after every successful read.
    ///
    /// Default is no timeout.
    #[serde(
        default,
        skip_serializing_if = "Option::is_none",
        with = "humantime_serde"
    )]
    pub read_timeout: Option<Duration>,
    /// Total request timeout, from connecting until the response body has finished.
    ///
    /// Default is no timeout.
    #[serde(
        default,
        skip_serializing_if = "Option::is_none",
        alias = "timeout",
        with = "humantime_serde"
    )]
    pub request_timeout: Option<Duration>,
    /// How long idle keep-alive sockets are kept open.
    ///
    /// Default is 90 seconds.
    #[serde(
        default = "HttpClientConfig::default_socket_idle_timeout",
        skip_serializing_if = "Option::is_none",
        alias = "pool_idle_timeout",
        with = "humantime_serde"
    )]
    pub socket_idle_timeout: Option<Duration>,
    /// Maximum number of idle keep-alive sockets per host.
    #[serde(
        default = "HttpClientConfig::default_max_idle_sockets",
        alias = "pool_max_idle_per_host"
    )]
    pub max_idle_sockets: usize,
    /// Emit `TRACE` level logs for every read and write on a socket.
    #[serde(default)]
    pub verbose: bool,
    /// Headers added to every request.
    ///
    /// Invalid header names or values are skipped with a warning.
    #[serde(default, skip_serializing_if = "BTreeMap::is_empty", alias = "headers")]
    pub extra_headers: BTreeMap<String, String>,
    /// Redirect policy.
    ///
    /// Default will follow redirects up to a maximum of 10.
    #[serde(default)]
    pub redirect: HttpClientRedirectPolicy,
    /// Set `Referer` header automatically when following redirects.
    ///
    /// Default is `true`.
    #[serde(default = "crate::util::default_true")]
    pub referer: bool,
    /// TCP-level configuration.
    #[serde(default)]
    pub tcp: HttpClientTcpConfig,
    /// Short application name, prepended to `User-Agent` header.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub app_name: Option<String>,
}

impl Default for HttpClientConfig {
    fn default() -> Self {
        Self {
            client_cert: None,
            connect_timeout: None,
            read_timeout: None,
            request_timeout: None,
            socket_idle_timeout: Self::default_socket_idle_timeout(),
            max_idle_sockets: Self::default_max_idle_sockets(),
            verbose: false,
            extra_headers: BTreeMap::new(),
            redirect: HttpClientRedirectPolicy::default(),
            referer: true,
            tcp: HttpClientTcpConfig::default(),
            app_name: None,
        }
    }
}

impl HttpClientConfig {
    /// Default value for [`Self::socket_idle_timeout`].
    #[must_use]
    #[inline]
    #[allow(clippy::unnecessary_wraps)]
    fn default_socket_idle_timeout() -> Option<Duration> {
        Some(Duration::from_secs(90))
    }

    /// Default value for [`Self::max_idle_sockets`].
    #[must_use]
    #[inline]
    fn default_max_idle_sockets() -> usize {
        usize::MAX
    }

    /// Set short application name.
    ///
    /// Whitespace is not allowed, as this value is used in `User-Agent` header.
    #[must_use]
    pub fn with_app_name(mut self, app_name: impl ToString) -> Self {
        self.app_name = Some(app_name.to_string());
        self
    }

    /// Set total request timeout.
    #[must_use]
    pub fn with_request_timeout(mut self, timeout: Duration) -> Self {
        self.request_timeout = Some(timeout);
        self
    }

    /// Add a header to send with every request.
    #[must_use]
    pub fn with_header(mut self, name: impl ToString, value: impl ToString) -> Self {
        self.extra_headers
            .insert(name.to_string(), value.to_string());
        self
    }

    /// Build a value for `User-Agent` header.
    fn user_agent(&self) -> Option<HeaderValue> {
        match &self.app_name {
            Some(app_name) => HeaderValue::from_str(&[app_name.as_str(), PRODUCT].join(" ")).ok(),
            None => Some(HeaderValue::from_static(PRODUCT)),
        }
    }

    /// Collect configured extra headers, skipping invalid ones.
    fn default_headers(&self) -> HeaderMap {
        self.extra_headers
            .iter()
            .filter_map(|(name, value)| {
                match (HeaderName::from_str(name), HeaderValue::from_str(value)) {
                    (Ok(name), Ok(value)) => Some((name, value)),
                    _ => {
                        warn!(header = name.as_str(), "skipping invalid extra header");
                        None
                    }
                }
            })
            .collect()
    }

    /// Create [`reqwest::ClientBuilder`] from configuration.
    ///
    /// # Errors
    ///
    /// Returns `Err` if TLS identity file could not be loaded.
    pub async fn to_client_builder(&self) -> Result<ClientBuilder, HttpClientError> {
        let mut builder = ClientBuilder::new()
            .use_rustls_tls()
            .min_tls_version(reqwest::tls::Version::TLS_1_2)
            .connection_verbose(self.verbose)
            .pool_idle_timeout(self.socket_idle_timeout)
            .pool_max_idle_per_host(self.max_idle_sockets)
            .redirect(self.redirect.into())
            .referer(self.referer)
            .tcp_nodelay(self.tcp.nodelay)
            .tcp_keepalive(self.tcp.keepalive)
            .default_headers(self.default_headers());
        if let Some(client_cert) = &self.client_cert {
            builder = builder.identity(load_identity(client_cert).await?);
        }
        if let Some(connect_timeout) = self.connect_timeout {
            builder = builder.connect_timeout(connect_timeout);
        }
        if let Some(read_timeout) = self.read_timeout {
            builder = builder.read_timeout(read_timeout);
        }
        if let Some(request_timeout) = self.request_timeout {
            builder = builder.timeout(request_timeout);
        }
        if let Some(user_agent) = self.user_agent() {
            builder = builder.user_agent(user_agent);
        }
        Ok(builder)
    }

    /// Build configured HTTP client with tracing middleware attached.
    ///
    /// # Errors
    ///
    /// Returns `Err` if:
    /// * Unable to load TLS identity file from filesystem.
    /// * TLS subsystem cannot be initialized.
    pub async fn to_client(&self) -> Result<ClientWithMiddleware, HttpClientError> {
        let client = self.to_client_builder().await?.build()?;
        Ok(wrap_client(client))
    }
}

/// TCP-level configuration.
#[derive(Clone, Debug, Deserialize, PartialEq, Serialize)]
#[non_exhaustive]
pub struct HttpClientTcpConfig {
    /// Set `TCP_NODELAY` on sockets.
    ///
    /// Default is `true`.
    #[serde(default = "crate::util::default_true")]
    pub nodelay: bool,
    /// Set `SO_KEEPALIVE` on sockets with the supplied duration.
    ///
    /// If `None`, the option will not be set.
    #[serde(
        default,
        skip_serializing_if = "Option::is_none",
        with = "humantime_serde"
    )]
    pub keepalive: Option<Duration>,
}

impl Default for HttpClientTcpConfig {
    fn default() -> Self {
        Self {
            nodelay: true,
            keepalive: None,
        }
    }
}

/// HTTP redirect policy.
#[derive(Clone, Copy, Debug, Deserialize, PartialEq, Serialize)]
#[serde(rename_all = "snake_case")]
#[non_exhaustive]
pub enum HttpClientRedirectPolicy {
    /// No redirects will be followed.
    None,
    /// Redirects will be followed up to a preconfigured limit.
    Limited(usize),
}

impl Default for HttpClientRedirectPolicy {
    fn default() -> Self {
        Self::Limited(10)
    }
}

impl From<HttpClientRedirectPolicy> for reqwest::redirect::Policy {
    fn from(value: HttpClientRedirectPolicy) -> Self {
        match value {
            HttpClientRedirectPolicy::None => Self::none(),
            HttpClientRedirectPolicy::Limited(limit) => Self::limited(limit),
        }
    }
}

/// Load client X.509 identity from a local PEM file.
async fn load_identity(pem_file: &Path) -> Result<Identity, HttpClientError> {
    let pem = fs::read(pem_file)
        .await
        .map_err(HttpClientError::identity_load)?;
    Identity::from_pem(&pem).map_err(Into::into)
}

#[cfg(test)]
mod tests {
    use serde_json::{from_str, json, to_value};

    use super::*;

    #[test]
    fn defaults() {
        let config: HttpClientConfig = from_str("{}").unwrap();
        assert_eq!(config, HttpClientConfig::default());
        assert_eq!(config.socket_idle_timeout, Some(Duration::from_secs(90)));
        assert_eq!(config.redirect, HttpClientRedirectPolicy::Limited(10));
        assert!(config.referer);
        assert!(config.tcp.nodelay);
    }

    #[test]
    fn deserialize_aliases() {
        let config: HttpClientConfig = from_str(
            r#"{
                "timeout": "5s",
                "pool_idle_timeout": "30s",
                "headers": {"x-tenant": "acme"},
                "redirect": "none",
                "tcp": {"keepalive": "1m"}
            }"#,
        )
        .unwrap();
        assert_eq!(config.request_timeout, Some(Duration::from_secs(5)));
        assert_eq!(config.socket_idle_timeout, Some(Duration::from_secs(30)));
        assert_eq!(config.extra_headers["x-tenant"], "acme");
        assert_eq!(config.redirect, HttpClientRedirectPolicy::None);
        assert_eq!(config.tcp.keepalive, Some(Duration::from_secs(60)));
    }

    #[test]
    fn serialize_redirect_limit() {
        let value = to_value(HttpClientRedirectPolicy::Limited(3)).unwrap();
        assert_eq!(value, json!({"limited": 3}));
    }

    #[test]
    fn user_agent() {
        let config = HttpClientConfig::default();
        assert_eq!(config.user_agent().unwrap(), PRODUCT);
        let config = config.with_app_name("reports");
        let user_agent = config.user_agent().unwrap();
        assert_eq!(user_agent.to_str().unwrap(), format!("reports {PRODUCT}"));
    }

    #[test]
    fn invalid_headers_skipped() {
        let headers = HttpClientConfig::default()
            .with_header("x-tenant", "acme")
            .with_header("bad header", "value")
            .default_headers();
        assert_eq!(headers.len(), 1);
        assert_eq!(headers["x-tenant"], "acme");
    }

    #[tokio::test]
    async fn build_client() {
        let config = HttpClientConfig::default().with_request_timeout(Duration::from_secs(1));
        assert!(config.to_client().await.is_ok());
    }

    #[tokio::test]
    async fn missing_identity() {
        let config = HttpClientConfig {
            client_cert: Some(Path::new("/nonexistent/client.pem").into()),
            ..HttpClientConfig::default()
        };
        let err = config.to_client().await.unwrap_err();
        assert!(matches!(err, HttpClientError::IdentityLoad(_)));
    }
}
