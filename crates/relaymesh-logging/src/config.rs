//! Logging configuration
//!
//! A [`LogConfig`] says where events go (console, files, both) and how JSON
//! lines are shaped. It is plain data so it can be loaded from a file
//! alongside the routing document.

use std::path::PathBuf;

use serde::{Deserialize, Serialize};

/// How events are rendered on stdout
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum ConsoleFormat {
    /// Nothing on stdout
    Off,
    /// One JSON object per line
    #[default]
    Json,
    /// Human-readable multi-field lines
    Pretty,
}

/// Subscriber configuration for one process
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct LogConfig {
    /// Filter directive used when `RUST_LOG` is unset
    pub level: String,
    pub console: ConsoleFormat,
    /// Colorize pretty console output
    pub ansi: bool,
    /// Optional JSONL file sink
    pub file: Option<FileConfig>,
    pub fields: JsonFields,
}

impl Default for LogConfig {
    fn default() -> Self {
        Self {
            level: "info".to_string(),
            console: ConsoleFormat::Json,
            ansi: false,
            file: None,
            fields: JsonFields::default(),
        }
    }
}

impl LogConfig {
    /// Pretty, colored console at debug level
    pub fn development() -> Self {
        Self {
            level: "debug".to_string(),
            console: ConsoleFormat::Pretty,
            ansi: true,
            ..Self::default()
        }
    }

    /// Daily-rotated JSONL files under `log_dir`, console off
    pub fn production(log_dir: PathBuf) -> Self {
        Self {
            console: ConsoleFormat::Off,
            file: Some(FileConfig::in_dir(log_dir)),
            ..Self::default()
        }
    }

    /// Warnings only, plain JSON on stdout
    pub fn testing() -> Self {
        Self {
            level: "warn".to_string(),
            ..Self::default()
        }
    }

    /// Prefix file names with the node name so nodes can share a directory
    pub fn for_node(mut self, node: &str) -> Self {
        if let Some(file) = self.file.as_mut() {
            file.prefix = format!("relaymesh-{}", node);
        }
        self
    }
}

/// JSONL file sink
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct FileConfig {
    pub directory: PathBuf,
    /// File name stem; rotated files get a date suffix
    pub prefix: String,
    #[serde(default)]
    pub rotation: LogRotation,
    /// Rotated files to keep (None keeps all)
    #[serde(default)]
    pub keep: Option<usize>,
}

impl FileConfig {
    /// Defaults, writing under `directory`
    pub fn in_dir(directory: impl Into<PathBuf>) -> Self {
        Self {
            directory: directory.into(),
            ..Self::default()
        }
    }
}

impl Default for FileConfig {
    fn default() -> Self {
        Self {
            directory: PathBuf::from("logs"),
            prefix: "relaymesh".to_string(),
            rotation: LogRotation::Daily,
            keep: Some(7),
        }
    }
}

/// When a file sink starts a new file
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum LogRotation {
    #[default]
    Daily,
    Hourly,
    /// One `<prefix>.jsonl`, truncated at startup
    Never,
}

/// Extra fields attached to each JSON line
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct JsonFields {
    /// Enclosing spans (worker, hop) with their fields
    pub spans: bool,
    /// Thread id and name
    pub thread: bool,
    /// Source file and line
    pub source: bool,
}

impl Default for JsonFields {
    fn default() -> Self {
        Self {
            spans: true,
            thread: false,
            source: false,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_presets() {
        let default = LogConfig::default();
        assert_eq!(default.level, "info");
        assert_eq!(default.console, ConsoleFormat::Json);
        assert!(default.file.is_none());

        let dev = LogConfig::development();
        assert_eq!(dev.console, ConsoleFormat::Pretty);
        assert!(dev.ansi);

        let prod = LogConfig::production(PathBuf::from("/var/log/relaymesh"));
        assert_eq!(prod.console, ConsoleFormat::Off);
        let file = prod.file.unwrap();
        assert_eq!(file.directory, PathBuf::from("/var/log/relaymesh"));
        assert_eq!(file.rotation, LogRotation::Daily);
        assert_eq!(file.keep, Some(7));
    }

    #[test]
    fn test_per_node_prefix() {
        let config = LogConfig::production(PathBuf::from("logs")).for_node("B");
        assert_eq!(config.file.unwrap().prefix, "relaymesh-B");

        assert!(LogConfig::testing().for_node("B").file.is_none());
    }

    #[test]
    fn test_partial_json_uses_defaults() {
        let json = r#"{
            "level": "relaymesh_routing=trace,info",
            "console": "pretty",
            "file": { "directory": "out", "prefix": "n", "rotation": "hourly" },
            "fields": { "source": true }
        }"#;
        let config: LogConfig = serde_json::from_str(json).unwrap();

        assert_eq!(config.console, ConsoleFormat::Pretty);
        assert!(!config.ansi);
        let file = config.file.unwrap();
        assert_eq!(file.rotation, LogRotation::Hourly);
        assert_eq!(file.keep, None);
        assert!(config.fields.spans);
        assert!(config.fields.source);
    }
}
