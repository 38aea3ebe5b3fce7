//! Instrumented HTTP client used by PhantomDB handles.
//!
//! Uses [`reqwest`] internally.

mod config;
mod errors;
mod middleware;

pub use self::{
    config::{HttpClientConfig, HttpClientRedirectPolicy, HttpClientTcpConfig},
    errors::HttpClientError,
};
