//! Logging configuration via [`tracing`] crate.

use std::{collections::BTreeMap, fs, io, path::PathBuf};

use serde::{Deserialize, Serialize};
use thiserror::Error;
use tracing_appender::{
    non_blocking::{NonBlockingBuilder, WorkerGuard},
    rolling::{RollingFileAppender, Rotation},
};
use tracing_subscriber::{
    filter::{LevelFilter, Targets},
    fmt::{self, writer::BoxMakeWriter},
    layer::{Layer, Layered, SubscriberExt},
    registry::{LookupSpan, Registry},
    util::{SubscriberInitExt, TryInitError},
};

/// Subscriber built from [`LoggingConfig`].
pub type LoggingRegistry = Layered<Vec<Box<dyn Layer<Registry> + Send + Sync>>, Registry>;

/// Error type used in logging configuration.
#[derive(Debug, Error)]
#[non_exhaustive]
pub enum LoggingError {
    /// Log destination I/O error.
    #[error("Log destination I/O error: {0}")]
    Io(#[from] io::Error),
    /// Error while initializing log directory writer.
    #[error("Error while initializing log directory writer: {0}")]
    Directory(#[from] tracing_appender::rolling::InitError),
    /// Global default subscriber is already installed.
    #[error("Unable to install global subscriber: {0}")]
    Init(#[from] TryInitError),
}

/// Logging configuration.
///
/// Empty configuration produces no output at all.
#[derive(Clone, Debug, Default, Deserialize, PartialEq, Serialize)]
#[non_exhaustive]
pub struct LoggingConfig {
    /// List of subscribers defined in configuration.
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub subscribers: Vec<LoggingSubscriberConfig>,
}

impl LoggingConfig {
    /// Configuration with a single subscriber, pretty printing everything to stdout.
    #[must_use]
    pub fn default_for_dev() -> Self {
        Self {
            subscribers: vec![LoggingSubscriberConfig::default_for_dev()],
        }
    }

    /// Create registry subscriber from configuration.
    ///
    /// Returned guards flush buffered log lines when dropped, and must be kept alive for as long
    /// as logging is needed.
    ///
    /// # Errors
    ///
    /// Returns `Err` if any of the log destinations cannot be opened.
    pub fn make_registry(&self) -> Result<(LoggingRegistry, Vec<WorkerGuard>), LoggingError> {
        let mut layers = Vec::with_capacity(self.subscribers.len());
        let mut guards = Vec::with_capacity(self.subscribers.len());
        for sub_cfg in &self.subscribers {
            let (layer, guard) = sub_cfg.make_layer()?;
            layers.push(layer);
            guards.push(guard);
        }
        Ok((Registry::default().with(layers), guards))
    }

    /// Install configured subscribers as a global default.
    ///
    /// # Errors
    ///
    /// Returns `Err` if any of the log destinations cannot be opened, or a global subscriber was
    /// already installed.
    pub fn init(&self) -> Result<Vec<WorkerGuard>, LoggingError> {
        let (registry, guards) = self.make_registry()?;
        registry.try_init()?;
        Ok(guards)
    }
}

/// Individual logging subscriber configuration.
#[derive(Clone, Debug, Default, Deserialize, PartialEq, Serialize)]
#[non_exhaustive]
pub struct LoggingSubscriberConfig {
    /// Overall format for logging output.
    #[serde(default, flatten)]
    pub format: LoggingFormat,
    /// Minimum severity level to include in output.
    #[serde(default)]
    pub level: LoggingLevel,
    /// Custom minimum severity levels for event targets.
    ///
    /// Use `phantomdb_pool` target to tune pool events separately.
    #[serde(default, skip_serializing_if = "BTreeMap::is_empty")]
    pub targets: BTreeMap<String, LoggingLevel>,
    /// Use ANSI escape sequences for output colors and formatting.
    #[serde(default)]
    pub color: bool,
    /// Additional event metadata to include in output.
    #[serde(default)]
    pub print: LoggingPrintingConfig,
    /// Write buffer configuration.
    #[serde(default)]
    pub buffer: LoggingBufferConfig,
    /// Log destination configuration.
    #[serde(default)]
    pub output: LoggingDestination,
}

impl LoggingSubscriberConfig {
    /// Logging subscriber template for use in development.
    #[must_use]
    pub fn default_for_dev() -> Self {
        Self {
            format: LoggingFormat::Pretty,
            level: LoggingLevel::Trace,
            color: true,
            print: LoggingPrintingConfig {
                target: true,
                file: true,
                line_number: true,
                ..LoggingPrintingConfig::default()
            },
            ..Self::default()
        }
    }

    /// Make [`tracing_subscriber::Layer`] from subscriber configuration.
    ///
    /// # Errors
    ///
    /// Returns `Err` if log destination cannot be opened.
    pub fn make_layer<S>(
        &self,
    ) -> Result<(Box<dyn Layer<S> + Send + Sync>, WorkerGuard), LoggingError>
    where
        S: tracing::Subscriber + for<'a> LookupSpan<'a>,
    {
        let (writer, guard) = self.output.make_writer(self.buffer.make_builder())?;
        let layer = fmt::layer()
            .with_writer(writer)
            .with_ansi(self.color)
            .with_target(self.print.target)
            .with_file(self.print.file)
            .with_line_number(self.print.line_number)
            .with_level(self.print.level)
            .with_thread_names(self.print.thread_name);
        let layer = match self.format {
            LoggingFormat::Full => layer.boxed(),
            LoggingFormat::Compact => layer.compact().boxed(),
            LoggingFormat::Pretty => layer.pretty().boxed(),
            LoggingFormat::Json {
                flatten_metadata,
                current_span,
            } => layer
                .json()
                .flatten_event(flatten_metadata)
                .with_current_span(current_span)
                .with_span_list(false)
                .boxed(),
        };
        let default_level = LevelFilter::from(self.level);
        let layer = if self.targets.is_empty() {
            layer.with_filter(default_level).boxed()
        } else {
            let targets = Targets::new()
                .with_targets(
                    self.targets
                        .iter()
                        .map(|(target, level)| (target.clone(), LevelFilter::from(*level))),
                )
                .with_default(default_level);
            layer.with_filter(targets).boxed()
        };
        Ok((layer, guard))
    }
}

/// Format for logging output.
#[derive(Clone, Copy, Debug, Default, Deserialize, PartialEq, Serialize)]
#[non_exhaustive]
#[serde(rename_all = "lowercase", tag = "format")]
pub enum LoggingFormat {
    /// Format which prints span context before log message.
    ///
    /// See [`tracing_subscriber::fmt::format::Full`].
    #[default]
    Full,
    /// More compact format, span names are hidden.
    ///
    /// See [`tracing_subscriber::fmt::format::Compact`].
    Compact,
    /// Verbose multiline format, useful when developing.
    ///
    /// See [`tracing_subscriber::fmt::format::Pretty`].
    Pretty,
    /// Newline-delimited JSON objects.
    ///
    /// See [`tracing_subscriber::fmt::format::Json`].
    Json {
        /// Put event fields at the top level of an object.
        #[serde(default)]
        flatten_metadata: bool,
        /// Add current span to an object.
        #[serde(default)]
        current_span: bool,
    },
}

/// Minimum event severity for log output.
#[derive(Clone, Copy, Debug, Default, Deserialize, PartialEq, Serialize)]
#[serde(rename_all = "UPPERCASE")]
pub enum LoggingLevel {
    /// Disable logging altogether.
    #[serde(alias = "off")]
    Off,
    /// Write "error" level only.
    #[serde(alias = "error")]
    Error,
    /// Write "warn" and more severe levels.
    #[serde(alias = "warn", alias = "warning")]
    Warn,
    /// Write "info" and more severe levels.
    #[serde(alias = "info")]
    #[default]
    Info,
    /// Write "debug" and more severe levels.
    #[serde(alias = "debug")]
    Debug,
    /// Write everything.
    #[serde(alias = "trace")]
    Trace,
}

impl From<LoggingLevel> for LevelFilter {
    fn from(value: LoggingLevel) -> Self {
        match value {
            LoggingLevel::Off => LevelFilter::OFF,
            LoggingLevel::Error => LevelFilter::ERROR,
            LoggingLevel::Warn => LevelFilter::WARN,
            LoggingLevel::Info => LevelFilter::INFO,
            LoggingLevel::Debug => LevelFilter::DEBUG,
            LoggingLevel::Trace => LevelFilter::TRACE,
        }
    }
}

/// Additional event metadata to include in output.
#[derive(Clone, Debug, Deserialize, PartialEq, Serialize)]
#[non_exhaustive]
#[allow(clippy::struct_excessive_bools)]
pub struct LoggingPrintingConfig {
    /// Print event target.
    #[serde(default)]
    pub target: bool,
    /// Print source file path.
    #[serde(default)]
    pub file: bool,
    /// Print source line number.
    #[serde(default)]
    pub line_number: bool,
    /// Print severity level.
    #[serde(default = "crate::util::default_true")]
    pub level: bool,
    /// Print thread name.
    #[serde(default)]
    pub thread_name: bool,
}

impl Default for LoggingPrintingConfig {
    fn default() -> Self {
        Self {
            target: false,
            file: false,
            line_number: false,
            level: true,
            thread_name: false,
        }
    }
}

/// Configuration for a non-blocking writer.
#[derive(Clone, Debug, Deserialize, PartialEq, Serialize)]
#[non_exhaustive]
pub struct LoggingBufferConfig {
    /// Maximum buffered lines to store.
    #[serde(default = "LoggingBufferConfig::default_lines")]
    pub lines: usize,
    /// Drop lines that do not fit into the buffer, instead of blocking.
    #[serde(default = "crate::util::default_true")]
    pub lossy: bool,
}

impl Default for LoggingBufferConfig {
    fn default() -> Self {
        Self {
            lines: Self::default_lines(),
            lossy: true,
        }
    }
}

impl LoggingBufferConfig {
    /// Default value for [`Self::lines`].
    #[must_use]
    #[inline]
    fn default_lines() -> usize {
        128_000
    }

    /// Construct a builder for non-blocking writer.
    #[must_use]
    pub fn make_builder(&self) -> NonBlockingBuilder {
        NonBlockingBuilder::default()
            .buffered_lines_limit(self.lines)
            .lossy(self.lossy)
    }
}

/// Logging output destination configuration.
#[derive(Clone, Debug, Default, Deserialize, PartialEq, Serialize)]
#[non_exhaustive]
#[serde(rename_all = "lowercase", tag = "type")]
pub enum LoggingDestination {
    /// Output to standard output.
    #[default]
    StdOut,
    /// Output to standard error.
    StdErr,
    /// Append to a single file.
    File {
        /// Path to file.
        path: PathBuf,
    },
    /// Output to files in a directory with optional rotation.
    #[serde(alias = "dir")]
    Directory(LoggingDirectoryConfig),
}

impl LoggingDestination {
    /// Make non-blocking writer for this destination.
    ///
    /// # Errors
    ///
    /// Returns `Err` if file or directory cannot be opened.
    pub fn make_writer(
        &self,
        buf_builder: NonBlockingBuilder,
    ) -> Result<(BoxMakeWriter, WorkerGuard), LoggingError> {
        let (writer, guard) = match self {
            Self::StdOut => buf_builder.finish(io::stdout()),
            Self::StdErr => buf_builder.finish(io::stderr()),
            Self::File { path } => {
                let file = fs::OpenOptions::new()
                    .append(true)
                    .create(true)
                    .open(path)?;
                buf_builder.finish(file)
            }
            Self::Directory(dir_cfg) => buf_builder.finish(dir_cfg.make_appender()?),
        };
        Ok((BoxMakeWriter::new(writer), guard))
    }
}

/// Configuration of directory output.
#[derive(Clone, Debug, Deserialize, PartialEq, Serialize)]
#[non_exhaustive]
pub struct LoggingDirectoryConfig {
    /// Path to directory.
    #[serde(default = "LoggingDirectoryConfig::default_path")]
    pub path: PathBuf,
    /// Log rotation period.
    #[serde(default)]
    pub rotate: LogRotation,
    /// File name prefix.
    #[serde(default = "LoggingDirectoryConfig::default_prefix")]
    pub prefix: String,
    /// Maximum amount of files to keep in directory.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub max_files: Option<usize>,
}

impl Default for LoggingDirectoryConfig {
    fn default() -> Self {
        Self {
            path: Self::default_path(),
            rotate: LogRotation::default(),
            prefix: Self::default_prefix(),
            max_files: None,
        }
    }
}

impl LoggingDirectoryConfig {
    /// Default value for [`Self::path`].
    #[must_use]
    #[inline]
    fn default_path() -> PathBuf {
        PathBuf::from(".")
    }

    /// Default value for [`Self::prefix`].
    #[must_use]
    #[inline]
    fn default_prefix() -> String {
        env!("CARGO_PKG_NAME").into()
    }

    /// Build rotating file appender.
    fn make_appender(&self) -> Result<RollingFileAppender, LoggingError> {
        let mut builder = RollingFileAppender::builder()
            .rotation(self.rotate.into())
            .filename_prefix(&self.prefix)
            .filename_suffix("log");
        if let Some(max_files) = self.max_files {
            builder = builder.max_log_files(max_files);
        }
        Ok(builder.build(&self.path)?)
    }
}

/// Log rotation period.
#[derive(Clone, Copy, Debug, Default, Deserialize, PartialEq, Serialize)]
#[non_exhaustive]
#[serde(rename_all = "lowercase")]
pub enum LogRotation {
    /// Rotate logs once every hour.
    Hourly,
    /// Rotate logs once every day.
    #[default]
    Daily,
    /// Never rotate logs.
    Never,
}

impl From<LogRotation> for Rotation {
    fn from(value: LogRotation) -> Self {
        match value {
            LogRotation::Hourly => Rotation::HOURLY,
            LogRotation::Daily => Rotation::DAILY,
            LogRotation::Never => Rotation::NEVER,
        }
    }
}
