//! Client and service configuration structures.

use std::{fmt, marker::PhantomData};

use phantomdb_pool::PoolConfig;
use serde::{Deserialize, Serialize};
use thiserror::Error;

use crate::{http_client::HttpClientConfig, logging::LoggingConfig};

/// PhantomDB client configuration.
///
/// Pool settings are flattened, so a flat document like
/// `{"base_url": "http://db:8080", "max_connections": 4}` is accepted.
#[derive(Clone, Debug, Deserialize, PartialEq, Serialize)]
#[non_exhaustive]
pub struct PhantomDbConfig {
    /// Base URL of PhantomDB REST API.
    ///
    /// Default is `http://localhost:8080`.
    #[serde(default = "PhantomDbConfig::default_base_url", alias = "url")]
    pub base_url: String,
    /// HTTP client configuration.
    #[serde(default)]
    pub http: HttpClientConfig,
    /// Connection pool configuration.
    #[serde(flatten)]
    pub pool: PoolConfig,
}

impl Default for PhantomDbConfig {
    fn default() -> Self {
        Self {
            base_url: Self::default_base_url(),
            http: HttpClientConfig::default(),
            pool: PoolConfig::default(),
        }
    }
}

impl PhantomDbConfig {
    /// Default value for [`Self::base_url`].
    #[must_use]
    #[inline]
    fn default_base_url() -> String {
        "http://localhost:8080".into()
    }

    /// Create configuration for a server at `base_url`, with default settings otherwise.
    #[must_use]
    pub fn new(base_url: impl ToString) -> Self {
        Self {
            base_url: base_url.to_string(),
            ..Self::default()
        }
    }

    /// Replace HTTP client configuration.
    #[must_use]
    pub fn with_http(mut self, http: HttpClientConfig) -> Self {
        self.http = http;
        self
    }

    /// Replace pool configuration.
    #[must_use]
    pub fn with_pool(mut self, pool: PoolConfig) -> Self {
        self.pool = pool;
        self
    }
}

/// Root container for configuration of a service using PhantomDB.
#[derive(Clone, Debug, Default, Deserialize, PartialEq, Serialize)]
#[non_exhaustive]
pub struct ServiceConfig<C = ()>
where
    C: Clone + fmt::Debug + PartialEq,
{
    /// PhantomDB client configuration.
    #[serde(default, alias = "phantomdb")]
    pub client: PhantomDbConfig,
    /// Logging configuration.
    #[serde(default)]
    pub logging: LoggingConfig,
    /// Service-specific configuration.
    #[serde(flatten)]
    pub service: C,
}

impl<C> ServiceConfig<C>
where
    C: Clone + fmt::Debug + PartialEq,
{
    /// Create builder for service configuration.
    pub fn builder() -> ServiceConfigBuilder<C> {
        ServiceConfigBuilder::new()
    }
}

/// Configuration loading error.
#[derive(Debug, Error)]
#[non_exhaustive]
pub enum ConfigError {
    /// Configuration source could not be read or deserialized.
    #[error(transparent)]
    Config(#[from] config::ConfigError),
}

/// Builder for service configuration.
#[must_use]
pub struct ServiceConfigBuilder<C>
where
    C: Clone + fmt::Debug + PartialEq,
{
    builder: config::ConfigBuilder<config::builder::DefaultState>,
    _type: PhantomData<C>,
}

impl<C> ServiceConfigBuilder<C>
where
    C: Clone + fmt::Debug + PartialEq,
{
    /// Alternative method to construct a service configuration builder.
    pub fn new() -> Self {
        Self {
            builder: config::Config::builder(),
            _type: PhantomData,
        }
    }
}

impl<C> Default for ServiceConfigBuilder<C>
where
    C: Clone + fmt::Debug + PartialEq,
{
    fn default() -> Self {
        Self::new()
    }
}

impl<C> ServiceConfigBuilder<C>
where
    C: Clone + fmt::Debug + PartialEq + for<'de> Deserialize<'de>,
{
    /// Load configuration from all added sources, later sources overriding earlier ones.
    ///
    /// # Errors
    ///
    /// Returns `Err` if some source could not be loaded, or the result could not be deserialized.
    pub fn build(self) -> Result<ServiceConfig<C>, ConfigError> {
        self.builder.build()?.try_deserialize().map_err(Into::into)
    }

    /// Add a custom object implementing [`Source`] trait as a source of service configuration.
    ///
    /// [`Source`]: config::Source
    pub fn with_source<T>(mut self, source: T) -> Self
    where
        T: config::Source + Send + Sync + 'static,
    {
        self.builder = self.builder.add_source(source);
        self
    }

    /// Add file as a source of service configuration.
    ///
    /// File format is guessed from its extension.
    pub fn with_file(self, name: impl AsRef<str>) -> Self {
        self.with_source(config::File::with_name(name.as_ref()))
    }

    /// Add environment variables as a source of service configuration.
    ///
    /// Nested keys are separated with double underscores, e.g. `APP_CLIENT__MAX_CONNECTIONS`
    /// for prefix `APP`.
    pub fn with_env(self, prefix: impl AsRef<str>) -> Self {
        self.with_source(
            config::Environment::with_prefix(prefix.as_ref())
                .prefix_separator("_")
                .separator("__")
                .try_parsing(true),
        )
    }
}
