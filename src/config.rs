//! Configuration loading from TOML files and environment variables.

use anyhow::{Context, Result};
use serde::{Deserialize, Serialize};
use std::path::{Path, PathBuf};
use std::time::Duration;
use tracing::warn;

use crate::alert::AlertMessages;
use crate::timeout::TimeoutSettings;

const LOG_LEVELS: [&str; 5] = ["trace", "debug", "info", "warn", "error"];

/// Root configuration structure.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct Config {
    #[serde(default)]
    pub timeout: TimeoutConfig,
    #[serde(default)]
    pub alerts: AlertConfig,
    #[serde(default)]
    pub logging: LoggingConfig,
}

/// Idle timeout thresholds.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct TimeoutConfig {
    /// Idle seconds before the session closes (0 = wait until set at runtime).
    #[serde(default = "default_total_seconds")]
    pub total_seconds: u64,
    /// Seconds before the close at which the warning fires.
    #[serde(default = "default_warning_seconds")]
    pub warning_seconds: u64,
}

impl Default for TimeoutConfig {
    fn default() -> Self {
        Self {
            total_seconds: default_total_seconds(),
            warning_seconds: default_warning_seconds(),
        }
    }
}

impl TimeoutConfig {
    pub fn total(&self) -> Duration {
        Duration::from_secs(self.total_seconds)
    }

    pub fn warning(&self) -> Duration {
        Duration::from_secs(self.warning_seconds)
    }

    /// Shared runtime settings seeded from this configuration.
    pub fn settings(&self) -> TimeoutSettings {
        TimeoutSettings::new(self.total(), self.warning())
    }
}

/// Alert texts.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct AlertConfig {
    #[serde(default = "default_warning_message")]
    pub warning_message: String,
    #[serde(default = "default_closed_message")]
    pub closed_message: String,
}

impl Default for AlertConfig {
    fn default() -> Self {
        Self {
            warning_message: default_warning_message(),
            closed_message: default_closed_message(),
        }
    }
}

impl AlertConfig {
    pub fn messages(&self) -> AlertMessages {
        AlertMessages {
            warning: self.warning_message.clone(),
            closed: self.closed_message.clone(),
        }
    }
}

/// Logging configuration.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct LoggingConfig {
    /// Data directory for the session event log.
    #[serde(default = "default_data_dir")]
    pub data_dir: PathBuf,
    /// Log level (trace, debug, info, warn, error).
    #[serde(default = "default_log_level")]
    pub level: String,
    /// Write session events as JSONL under `<data_dir>/logs`.
    #[serde(default = "default_event_log")]
    pub event_log: bool,
}

impl Default for LoggingConfig {
    fn default() -> Self {
        Self {
            data_dir: default_data_dir(),
            level: default_log_level(),
            event_log: default_event_log(),
        }
    }
}

impl LoggingConfig {
    /// Returns the logs directory path.
    pub fn logs_dir(&self) -> PathBuf {
        self.data_dir.join("logs")
    }
}

fn default_total_seconds() -> u64 {
    120
}

fn default_warning_seconds() -> u64 {
    60
}

fn default_warning_message() -> String {
    AlertMessages::default().warning
}

fn default_closed_message() -> String {
    AlertMessages::default().closed
}

fn default_data_dir() -> PathBuf {
    dirs::home_dir()
        .map(|h| h.join(".idlewatch"))
        .unwrap_or_else(|| PathBuf::from(".idlewatch"))
}

fn default_log_level() -> String {
    "info".to_string()
}

fn default_event_log() -> bool {
    true
}

impl Config {
    /// Load configuration from a TOML file.
    pub fn from_file(path: impl AsRef<Path>) -> Result<Self> {
        let content = std::fs::read_to_string(path.as_ref())
            .with_context(|| format!("Failed to read config file: {:?}", path.as_ref()))?;
        let config: Config =
            toml::from_str(&content).with_context(|| "Failed to parse config file")?;
        Ok(config)
    }

    /// Load configuration with environment variable overrides.
    pub fn load(config_path: Option<&Path>) -> Result<Self> {
        let mut config = if let Some(path) = config_path {
            Self::from_file(path)?
        } else {
            let default_paths = [
                PathBuf::from("config/default.toml"),
                dirs::config_dir()
                    .map(|d| d.join("idlewatch/config.toml"))
                    .unwrap_or_default(),
            ];

            let mut loaded = None;
            for path in &default_paths {
                if path.is_file() {
                    loaded = Some(Self::from_file(path)?);
                    break;
                }
            }
            loaded.unwrap_or_default()
        };

        config.apply_overrides(|key| std::env::var(key).ok());
        config.logging.data_dir = expand_tilde(&config.logging.data_dir);

        Ok(config)
    }

    /// Apply `IDLEWATCH_*` overrides looked up through `lookup`.
    ///
    /// Values that fail to parse are ignored.
    fn apply_overrides(&mut self, lookup: impl Fn(&str) -> Option<String>) {
        if let Some(v) = lookup("IDLEWATCH_TOTAL_TIMEOUT").and_then(|v| v.parse().ok()) {
            self.timeout.total_seconds = v;
        }
        if let Some(v) = lookup("IDLEWATCH_WARNING_TIMEOUT").and_then(|v| v.parse().ok()) {
            self.timeout.warning_seconds = v;
        }
        if let Some(v) = lookup("IDLEWATCH_EVENT_LOG").and_then(|v| v.parse().ok()) {
            self.logging.event_log = v;
        }
        if let Some(val) = lookup("IDLEWATCH_DATA_DIR") {
            self.logging.data_dir = PathBuf::from(val);
        }
        if let Some(val) = lookup("IDLEWATCH_LOG_LEVEL") {
            self.logging.level = val;
        }
    }

    /// Validate configuration values.
    pub fn validate(&self) -> Result<()> {
        if self.alerts.warning_message.trim().is_empty() {
            anyhow::bail!("Warning message cannot be empty");
        }
        if self.alerts.closed_message.trim().is_empty() {
            anyhow::bail!("Closed message cannot be empty");
        }
        if !LOG_LEVELS.contains(&self.logging.level.to_ascii_lowercase().as_str()) {
            anyhow::bail!(
                "Unknown log level {:?}; expected one of {}",
                self.logging.level,
                LOG_LEVELS.join(", ")
            );
        }
        let timeout = &self.timeout;
        if timeout.total_seconds > 0 && timeout.warning_seconds > timeout.total_seconds {
            warn!(
                "Warning lead ({}s) exceeds total timeout ({}s); no warning will be shown",
                timeout.warning_seconds, timeout.total_seconds
            );
        }
        Ok(())
    }
}

/// Expand ~ to home directory.
fn expand_tilde(path: &Path) -> PathBuf {
    if let Ok(rest) = path.strip_prefix("~") {
        if let Some(home) = dirs::home_dir() {
            return home.join(rest);
        }
    }
    path.to_path_buf()
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::collections::HashMap;
    use std::io::Write;
    use tokio_test::{assert_err, assert_ok};

    #[test]
    fn defaults_match_reference_values() {
        let config = Config::default();
        assert_eq!(config.timeout.total(), Duration::from_secs(120));
        assert_eq!(config.timeout.warning(), Duration::from_secs(60));
        assert_eq!(config.alerts.messages(), AlertMessages::default());
        assert!(config.logging.event_log);
        assert_ok!(config.validate());
    }

    #[test]
    fn partial_file_keeps_defaults() {
        let mut file = tempfile::NamedTempFile::new().unwrap();
        writeln!(
            file,
            r#"
[timeout]
total_seconds = 10
warning_seconds = 4

[alerts]
closed_message = "Logged out"
"#
        )
        .unwrap();

        let config = assert_ok!(Config::from_file(file.path()));
        assert_eq!(config.timeout.total_seconds, 10);
        assert_eq!(config.timeout.warning_seconds, 4);
        assert_eq!(config.alerts.closed_message, "Logged out");
        assert_eq!(config.alerts.warning_message, "Session is about to close");
        assert_eq!(config.logging.level, "info");

        let settings = config.timeout.settings();
        assert_eq!(settings.thresholds().warning_at_ms(), Some(6_000));
    }

    #[test]
    fn load_reads_explicit_path() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("idlewatch.toml");
        std::fs::write(&path, "[logging]\nlevel = \"debug\"\nevent_log = false\n").unwrap();

        let config = assert_ok!(Config::load(Some(path.as_path())));
        assert_eq!(config.logging.level, "debug");
        assert!(!config.logging.event_log);
    }

    #[test]
    fn malformed_file_is_an_error() {
        let mut file = tempfile::NamedTempFile::new().unwrap();
        writeln!(file, "[timeout]\ntotal_seconds = \"soon\"").unwrap();
        assert_err!(Config::from_file(file.path()));
    }

    #[test]
    fn missing_file_is_an_error() {
        let dir = tempfile::tempdir().unwrap();
        assert_err!(Config::from_file(dir.path().join("absent.toml")));
    }

    #[test]
    fn overrides_replace_file_values() {
        let vars: HashMap<&str, &str> = [
            ("IDLEWATCH_TOTAL_TIMEOUT", "30"),
            ("IDLEWATCH_WARNING_TIMEOUT", "not-a-number"),
            ("IDLEWATCH_DATA_DIR", "/tmp/idle"),
            ("IDLEWATCH_LOG_LEVEL", "warn"),
            ("IDLEWATCH_EVENT_LOG", "false"),
        ]
        .into_iter()
        .collect();

        let mut config = Config::default();
        config.apply_overrides(|key| vars.get(key).map(|v| v.to_string()));

        assert_eq!(config.timeout.total_seconds, 30);
        assert_eq!(config.timeout.warning_seconds, 60);
        assert_eq!(config.logging.data_dir, PathBuf::from("/tmp/idle"));
        assert_eq!(config.logging.level, "warn");
        assert!(!config.logging.event_log);
    }

    #[test]
    fn zero_total_timeout_is_valid() {
        let mut config = Config::default();
        config.timeout.total_seconds = 0;
        assert_ok!(config.validate());
    }

    #[test]
    fn warning_longer_than_total_is_allowed() {
        let mut config = Config::default();
        config.timeout.total_seconds = 30;
        config.timeout.warning_seconds = 90;
        assert_ok!(config.validate());
    }

    #[test]
    fn rejects_empty_messages_and_unknown_levels() {
        let mut config = Config::default();
        config.alerts.closed_message = "  ".into();
        assert_err!(config.validate());

        let mut config = Config::default();
        config.logging.level = "chatty".into();
        assert_err!(config.validate());
    }

    #[test]
    fn tilde_expands_to_home() {
        if let Some(home) = dirs::home_dir() {
            assert_eq!(expand_tilde(Path::new("~/.idlewatch")), home.join(".idlewatch"));
        }
        assert_eq!(expand_tilde(Path::new("/var/idle")), PathBuf::from("/var/idle"));
    }
}
