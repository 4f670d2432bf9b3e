//! Configuration types for the logging system

use std::path::PathBuf;

use serde::{Deserialize, Serialize};

/// Main logging configuration
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct LogConfig {
    /// Default log level (overridden by RUST_LOG)
    pub default_level: String,

    /// Console output configuration
    pub console: ConsoleConfig,

    /// File output configuration
    pub file: Option<FileConfig>,

    /// JSONL output configuration, shared by console and file
    pub jsonl: JsonlConfig,
}

impl Default for LogConfig {
    fn default() -> Self {
        Self {
            default_level: "info".to_string(),
            console: ConsoleConfig::default(),
            file: None,
            jsonl: JsonlConfig::default(),
        }
    }
}

impl LogConfig {
    /// Verbose human-readable console output
    pub fn development() -> Self {
        Self {
            default_level: "debug".to_string(),
            console: ConsoleConfig { enabled: true, pretty: true, ansi: true },
            ..Default::default()
        }
    }

    /// Protocol traces to a JSONL file, warnings on the console
    pub fn trace_to_file(log_dir: PathBuf) -> Self {
        Self {
            default_level: "debug".to_string(),
            console: ConsoleConfig { enabled: false, pretty: false, ansi: false },
            file: Some(FileConfig { directory: log_dir, ..FileConfig::default() }),
            jsonl: JsonlConfig::default(),
        }
    }

    /// Minimal output for tests
    pub fn testing() -> Self {
        Self {
            default_level: "warn".to_string(),
            console: ConsoleConfig { enabled: true, pretty: true, ansi: false },
            ..Default::default()
        }
    }
}

/// Console output configuration
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct ConsoleConfig {
    pub enabled: bool,
    /// Human-readable instead of JSONL
    pub pretty: bool,
    pub ansi: bool,
}

impl Default for ConsoleConfig {
    fn default() -> Self {
        Self { enabled: true, pretty: true, ansi: true }
    }
}

/// File output configuration
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct FileConfig {
    pub directory: PathBuf,
    /// File name prefix
    pub prefix: String,
    pub rotation: RotationStrategy,
}

impl Default for FileConfig {
    fn default() -> Self {
        Self { directory: PathBuf::from("./logs"), prefix: "qnet-sim".to_string(), rotation: RotationStrategy::Never }
    }
}

/// File rotation strategy
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, Default)]
#[serde(rename_all = "snake_case")]
pub enum RotationStrategy {
    Daily,
    Hourly,
    /// One file per run, truncated at start
    #[default]
    Never,
}

/// JSONL formatting configuration
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct JsonlConfig {
    /// Flatten event fields to root level
    pub flatten_events: bool,
    /// Include the span list in events
    pub include_spans: bool,
    /// Include file/line information
    pub include_location: bool,
}

impl Default for JsonlConfig {
    fn default() -> Self {
        Self { flatten_events: true, include_spans: true, include_location: false }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_presets() {
        assert_eq!(LogConfig::default().default_level, "info");
        assert!(LogConfig::development().console.pretty);
        let file = LogConfig::trace_to_file(PathBuf::from("/tmp/qnet"));
        assert!(!file.console.enabled);
        assert_eq!(file.file.unwrap().directory, PathBuf::from("/tmp/qnet"));
        assert_eq!(LogConfig::testing().default_level, "warn");
    }

    #[test]
    fn test_partial_json() {
        let config: LogConfig =
            serde_json::from_str(r#"{"default_level": "trace", "file": {"rotation": "hourly"}}"#).unwrap();
        assert_eq!(config.default_level, "trace");
        assert!(config.console.enabled);
        let file = config.file.unwrap();
        assert_eq!(file.rotation, RotationStrategy::Hourly);
        assert_eq!(file.prefix, "qnet-sim");
    }
}
