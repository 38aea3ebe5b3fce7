#![doc = include_str!("../README.md")]
#![forbid(unsafe_code)]
#![deny(elided_lifetimes_in_paths, unreachable_pub)]
#![warn(
    missing_docs,
    clippy::doc_link_with_quotes,
    clippy::doc_markdown,
    clippy::missing_errors_doc
)]

mod client;
mod config;
mod http_client;
mod logging;
mod manager;
mod pool;
mod util;

pub use phantomdb_pool::{Error, ManageConnection, PoolConfig, PoolStatus, Pooled};

pub use self::{
    client::{ClientError, PhantomDb},
    config::{ConfigError, PhantomDbConfig, ServiceConfig, ServiceConfigBuilder},
    http_client::{
        HttpClientConfig, HttpClientError, HttpClientRedirectPolicy, HttpClientTcpConfig,
    },
    logging::{
        LogRotation, LoggingBufferConfig, LoggingConfig, LoggingDestination,
        LoggingDirectoryConfig, LoggingError, LoggingFormat, LoggingLevel, LoggingPrintingConfig,
        LoggingRegistry, LoggingSubscriberConfig,
    },
    manager::PhantomDbManager,
    pool::{connect, create_pool, create_pool_with_config, PhantomDbPool},
};
