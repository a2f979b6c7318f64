//! Structured logging for relaymesh nodes
//!
//! Every crate logs through `tracing` with structured fields (`node`,
//! `worker`, `target`, `fingerprint`). This crate installs the subscriber
//! that renders those events: JSON lines or pretty output on the console,
//! and optionally JSONL files rotated by `tracing-appender`.
//!
//! ```ignore
//! use relaymesh_logging::{FileConfig, LogConfig, MeshSubscriberBuilder};
//!
//! // Pretty console plus rotated JSONL files for node "B"
//! let _guard = MeshSubscriberBuilder::new()
//!     .with_config(LogConfig::development())
//!     .with_file_output(FileConfig::in_dir("logs"))
//!     .for_node("B")
//!     .init();
//! ```
//!
//! `RUST_LOG` always overrides the configured level.

pub mod config;

pub use config::{ConsoleFormat, FileConfig, JsonFields, LogConfig, LogRotation};

use std::fs::{self, File};

use thiserror::Error;
use tracing_appender::non_blocking::{NonBlocking, WorkerGuard};
use tracing_appender::rolling::{RollingFileAppender, Rotation};
use tracing_subscriber::fmt::MakeWriter;
use tracing_subscriber::{EnvFilter, Layer, Registry, layer::SubscriberExt, util::SubscriberInitExt};

type BoxedLayer = Box<dyn Layer<Registry> + Send + Sync>;

/// Errors installing the subscriber
#[derive(Debug, Error)]
pub enum LoggingError {
    #[error("Cannot prepare log file: {0}")]
    File(#[from] std::io::Error),

    #[error("Cannot create rolling appender: {0}")]
    Appender(String),

    #[error("Global subscriber already installed: {0}")]
    AlreadyInitialized(String),
}

/// Builds and installs the process-wide subscriber
///
/// Starts from [`LogConfig::default`]: JSON lines on stdout at `info`.
#[derive(Debug, Clone, Default)]
pub struct MeshSubscriberBuilder {
    config: LogConfig,
}

impl MeshSubscriberBuilder {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with_config(mut self, config: LogConfig) -> Self {
        self.config = config;
        self
    }

    /// Filter directive used when `RUST_LOG` is unset
    pub fn with_level(mut self, level: impl Into<String>) -> Self {
        self.config.level = level.into();
        self
    }

    pub fn with_console(mut self, format: ConsoleFormat) -> Self {
        self.config.console = format;
        self
    }

    /// Pretty colored console when `pretty`, JSON lines otherwise
    pub fn with_pretty_console(mut self, pretty: bool) -> Self {
        self.config.console = if pretty {
            ConsoleFormat::Pretty
        } else {
            ConsoleFormat::Json
        };
        self.config.ansi = pretty;
        self
    }

    pub fn with_file_output(mut self, file: FileConfig) -> Self {
        self.config.file = Some(file);
        self
    }

    /// Name log files after `node`; apply after [`with_file_output`](Self::with_file_output)
    pub fn for_node(mut self, node: &str) -> Self {
        self.config = self.config.for_node(node);
        self
    }

    pub fn config(&self) -> &LogConfig {
        &self.config
    }

    /// Install the subscriber
    ///
    /// Keep the returned guard alive for the life of the program; dropping
    /// it flushes and closes the file sink.
    ///
    /// # Errors
    ///
    /// The log directory or file cannot be created, or a global subscriber
    /// is already installed.
    pub fn try_init(self) -> Result<Option<WorkerGuard>, LoggingError> {
        let filter = EnvFilter::try_from_default_env()
            .unwrap_or_else(|_| EnvFilter::new(&self.config.level));
        let fields = self.config.fields;

        let mut layers: Vec<BoxedLayer> = Vec::new();
        match self.config.console {
            ConsoleFormat::Off => {}
            ConsoleFormat::Json => layers.push(json_layer(fields, std::io::stdout)),
            ConsoleFormat::Pretty => layers.push(
                tracing_subscriber::fmt::layer()
                    .with_ansi(self.config.ansi)
                    .with_target(true)
                    .boxed(),
            ),
        }

        let guard = match &self.config.file {
            Some(file) => {
                let (writer, guard) = file_writer(file)?;
                layers.push(json_layer(fields, writer));
                Some(guard)
            }
            None => None,
        };

        tracing_subscriber::registry()
            .with(layers)
            .with(filter)
            .try_init()
            .map_err(|e| LoggingError::AlreadyInitialized(e.to_string()))?;

        Ok(guard)
    }

    /// [`try_init`](Self::try_init), reporting failure on stderr
    pub fn init(self) -> Option<WorkerGuard> {
        self.try_init().unwrap_or_else(|e| {
            eprintln!("relaymesh: logging disabled: {}", e);
            None
        })
    }
}

fn json_layer<W>(fields: JsonFields, writer: W) -> BoxedLayer
where
    W: for<'w> MakeWriter<'w> + Send + Sync + 'static,
{
    tracing_subscriber::fmt::layer()
        .json()
        .flatten_event(true)
        .with_current_span(fields.spans)
        .with_span_list(fields.spans)
        .with_thread_ids(fields.thread)
        .with_thread_names(fields.thread)
        .with_file(fields.source)
        .with_line_number(fields.source)
        .with_writer(writer)
        .boxed()
}

fn file_writer(file: &FileConfig) -> Result<(NonBlocking, WorkerGuard), LoggingError> {
    fs::create_dir_all(&file.directory)?;

    let rotation = match file.rotation {
        LogRotation::Daily => Rotation::DAILY,
        LogRotation::Hourly => Rotation::HOURLY,
        LogRotation::Never => {
            let path = file.directory.join(format!("{}.jsonl", file.prefix));
            return Ok(tracing_appender::non_blocking(File::create(path)?));
        }
    };

    let mut appender = RollingFileAppender::builder()
        .rotation(rotation)
        .filename_prefix(file.prefix.as_str())
        .filename_suffix("jsonl");
    if let Some(keep) = file.keep {
        appender = appender.max_log_files(keep);
    }
    let appender = appender
        .build(&file.directory)
        .map_err(|e| LoggingError::Appender(e.to_string()))?;

    Ok(tracing_appender::non_blocking(appender))
}

/// JSON lines on stdout at `info`
pub fn init_default() {
    MeshSubscriberBuilder::new().init();
}

/// Pretty console at `debug`
pub fn init_development() {
    MeshSubscriberBuilder::new()
        .with_config(LogConfig::development())
        .init();
}

/// For tests; later calls are no-ops
pub fn init_testing() {
    let _ = MeshSubscriberBuilder::new()
        .with_config(LogConfig::testing())
        .try_init();
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_builder_defaults_to_json_console() {
        let builder = MeshSubscriberBuilder::new();
        assert_eq!(builder.config().level, "info");
        assert_eq!(builder.config().console, ConsoleFormat::Json);
    }

    #[test]
    fn test_builder_overrides() {
        let builder = MeshSubscriberBuilder::new()
            .with_level("trace")
            .with_pretty_console(true);
        assert_eq!(builder.config().level, "trace");
        assert_eq!(builder.config().console, ConsoleFormat::Pretty);
        assert!(builder.config().ansi);

        let builder = builder.with_console(ConsoleFormat::Off);
        assert_eq!(builder.config().console, ConsoleFormat::Off);
    }

    #[test]
    fn test_node_prefix_needs_file_output_first() {
        let builder = MeshSubscriberBuilder::new()
            .with_file_output(FileConfig::in_dir("logs"))
            .for_node("C");
        assert_eq!(
            builder.config().file.as_ref().map(|f| f.prefix.as_str()),
            Some("relaymesh-C")
        );
    }

    #[test]
    fn test_single_file_is_truncated_at_start() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("nested").join("relaymesh-A.jsonl");
        let file = FileConfig {
            directory: dir.path().join("nested"),
            prefix: "relaymesh-A".into(),
            rotation: LogRotation::Never,
            keep: None,
        };

        fs::create_dir_all(path.parent().unwrap()).unwrap();
        fs::write(&path, "stale\n").unwrap();

        let (_writer, _guard) = file_writer(&file).unwrap();
        assert_eq!(fs::read_to_string(&path).unwrap(), "");
    }

    #[test]
    fn test_rolling_writer_creates_directory() {
        let dir = tempfile::tempdir().unwrap();
        let file = FileConfig::in_dir(dir.path().join("rolling"));

        let (_writer, _guard) = file_writer(&file).unwrap();
        assert!(dir.path().join("rolling").is_dir());
    }

    #[test]
    fn test_init_testing_is_repeatable() {
        init_testing();
        init_testing();
        tracing::warn!(node = "A", "still logging");
    }
}
