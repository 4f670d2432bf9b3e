//! # QNet Logging
//!
//! Structured logging for the simulator, built on `tracing`.
//!
//! # Features
//!
//! - **Pretty or JSONL console output**
//! - **JSONL file output** with optional daily/hourly rotation via
//!   tracing-appender
//! - **Node context injection**: spans opened while a [`NodeContextGuard`] is
//!   active carry the node name and simulated time
//!
//! # Quick Start
//!
//! ```ignore
//! use qnet_logging::{LogConfig, SubscriberBuilder};
//!
//! let _guard = SubscriberBuilder::new()
//!     .with_config(LogConfig::development())
//!     .init()?;
//! ```
//!
//! `RUST_LOG` takes precedence over the configured default level, e.g.
//! `RUST_LOG=qnet_proactive=trace,info`.

pub mod config;
pub mod context;
pub mod layers;

pub use config::{ConsoleConfig, FileConfig, JsonlConfig, LogConfig, RotationStrategy};
pub use context::{NodeContextData, NodeContextGuard};
pub use layers::{NodeContextExtension, NodeContextLayer};

use std::fs::{self, File};

use thiserror::Error;
use tracing::Subscriber;
use tracing_appender::non_blocking::{NonBlocking, WorkerGuard};
use tracing_appender::rolling::{RollingFileAppender, Rotation};
use tracing_subscriber::layer::{Layer, SubscriberExt};
use tracing_subscriber::registry::LookupSpan;
use tracing_subscriber::util::{SubscriberInitExt, TryInitError};
use tracing_subscriber::{EnvFilter, Registry};

/// Errors raised while installing the subscriber
#[derive(Debug, Error)]
pub enum LoggingError {
    #[error("Invalid log filter: {0}")]
    Filter(#[from] tracing_subscriber::filter::ParseError),

    #[error("Failed to open log file: {0}")]
    Io(#[from] std::io::Error),

    #[error("Global subscriber already set: {0}")]
    Init(#[from] TryInitError),
}

/// Result type for logging setup
pub type LoggingResult<T> = Result<T, LoggingError>;

type BoxedLayer = Box<dyn Layer<Registry> + Send + Sync>;

/// Builder for configuring and installing the global subscriber
#[derive(Debug, Default)]
pub struct SubscriberBuilder {
    config: LogConfig,
}

impl SubscriberBuilder {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with_config(mut self, config: LogConfig) -> Self {
        self.config = config;
        self
    }

    /// Set the default log level
    pub fn with_level(mut self, level: impl Into<String>) -> Self {
        self.config.default_level = level.into();
        self
    }

    pub fn with_console(mut self, enabled: bool) -> Self {
        self.config.console.enabled = enabled;
        self
    }

    pub fn with_file_output(mut self, config: FileConfig) -> Self {
        self.config.file = Some(config);
        self
    }

    pub fn config(&self) -> &LogConfig {
        &self.config
    }

    /// Install the subscriber globally
    ///
    /// The returned guard flushes file output when dropped and must be kept
    /// alive for as long as logs should be written.
    pub fn init(self) -> LoggingResult<Option<WorkerGuard>> {
        let filter = match EnvFilter::try_from_default_env() {
            Ok(filter) => filter,
            Err(_) => EnvFilter::try_new(&self.config.default_level)?,
        };

        let mut layers: Vec<BoxedLayer> = vec![NodeContextLayer::new().boxed()];
        if self.config.console.enabled {
            layers.push(console_layer(&self.config));
        }
        let mut guard = None;
        if let Some(file) = &self.config.file {
            let (writer, worker) = file_writer(file)?;
            layers.push(jsonl_layer(&self.config.jsonl).with_writer(writer).boxed());
            guard = Some(worker);
        }

        tracing_subscriber::registry().with(layers).with(filter).try_init()?;
        Ok(guard)
    }
}

fn console_layer(config: &LogConfig) -> BoxedLayer {
    if config.console.pretty {
        tracing_subscriber::fmt::layer().with_ansi(config.console.ansi).with_target(true).boxed()
    } else {
        jsonl_layer(&config.jsonl).boxed()
    }
}

/// JSONL formatting layer writing to stdout; use `with_writer` to redirect
pub fn jsonl_layer<S>(
    config: &JsonlConfig,
) -> tracing_subscriber::fmt::Layer<
    S,
    tracing_subscriber::fmt::format::JsonFields,
    tracing_subscriber::fmt::format::Format<tracing_subscriber::fmt::format::Json>,
>
where
    S: Subscriber + for<'lookup> LookupSpan<'lookup>,
{
    tracing_subscriber::fmt::layer()
        .json()
        .with_current_span(true)
        .with_span_list(config.include_spans)
        .flatten_event(config.flatten_events)
        .with_file(config.include_location)
        .with_line_number(config.include_location)
}

/// Writer for file output; `Never` truncates a single file per run
fn file_writer(config: &FileConfig) -> LoggingResult<(NonBlocking, WorkerGuard)> {
    fs::create_dir_all(&config.directory)?;
    let rotation = match config.rotation {
        RotationStrategy::Never => {
            let file = File::create(config.directory.join(format!("{}.log", config.prefix)))?;
            return Ok(tracing_appender::non_blocking(file));
        }
        RotationStrategy::Daily => Rotation::DAILY,
        RotationStrategy::Hourly => Rotation::HOURLY,
    };
    let appender = RollingFileAppender::new(rotation, &config.directory, &config.prefix);
    Ok(tracing_appender::non_blocking(appender))
}

/// Quiet console logging for tests; repeated calls are ignored
pub fn init_testing() {
    let _ = SubscriberBuilder::new().with_config(LogConfig::testing()).init();
}
