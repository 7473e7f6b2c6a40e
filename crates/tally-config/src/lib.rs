//! # tally-config
//!
//! Configuration management for word-tally.
//!
//! Loads configuration from:
//! 1. `~/.tally/config.toml` (global)
//! 2. `.tally/config.toml` (project-local, overrides global key by key)
//! 3. Environment variables (highest priority)

pub mod logging;
pub mod path;

use once_cell::sync::Lazy;
use serde::{Deserialize, Serialize};
use std::path::{Path, PathBuf};
use std::sync::RwLock;
use std::time::Duration;
use tally_core::ScanOptions;
use tracing::debug;

/// Default daemon socket path
pub const DEFAULT_SOCKET_PATH: &str = "/tmp/tally.sock";

/// Global config instance
static CONFIG: Lazy<RwLock<Config>> = Lazy::new(|| RwLock::new(Config::load().unwrap_or_default()));

/// Get global config (read-only)
pub fn config() -> std::sync::RwLockReadGuard<'static, Config> {
    CONFIG.read().unwrap_or_else(|poisoned| poisoned.into_inner())
}

/// Reload config from disk
pub fn reload() -> Result<(), ConfigError> {
    let new_config = Config::load()?;
    *CONFIG.write().unwrap_or_else(|poisoned| poisoned.into_inner()) = new_config;
    Ok(())
}

#[derive(Debug, thiserror::Error)]
pub enum ConfigError {
    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),
    #[error("TOML parse error: {0}")]
    Toml(#[from] toml::de::Error),
}

/// Main configuration structure
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(default)]
pub struct Config {
    pub scan: ScanConfig,
    pub daemon: DaemonConfig,
    pub log: LogConfig,
}

impl Config {
    /// Load config from standard locations
    pub fn load() -> Result<Self, ConfigError> {
        let global = Self::global_config_path();
        let project = Self::project_config_path();
        let mut config = Self::load_from(global.as_deref(), Some(&project))?;
        config.apply_env_overrides();
        Ok(config)
    }

    /// Load and merge the given files without consulting the environment
    ///
    /// Missing files are skipped. Keys set in `project` replace the same
    /// keys from `global`; everything else is inherited.
    pub fn load_from(global: Option<&Path>, project: Option<&Path>) -> Result<Self, ConfigError> {
        let mut merged = toml::Table::new();

        for path in [global, project].into_iter().flatten() {
            if path.exists() {
                debug!("Loading config from {:?}", path);
                let contents = std::fs::read_to_string(path)?;
                let table: toml::Table = toml::from_str(&contents)?;
                merge_tables(&mut merged, table);
            }
        }

        Ok(Config::deserialize(toml::Value::Table(merged))?)
    }

    /// Global config path: ~/.tally/config.toml
    pub fn global_config_path() -> Option<PathBuf> {
        dirs::home_dir().map(|h| h.join(".tally/config.toml"))
    }

    /// Project config path: .tally/config.toml
    pub fn project_config_path() -> PathBuf {
        PathBuf::from(".tally/config.toml")
    }

    /// Apply environment variable overrides
    fn apply_env_overrides(&mut self) {
        if let Ok(threads) = std::env::var("TALLY_THREADS") {
            if let Ok(n) = threads.parse() {
                self.scan.threads = Some(n);
            }
        }
        if let Ok(secs) = std::env::var("TALLY_DEADLINE_SECS") {
            if let Ok(n) = secs.parse() {
                self.scan.deadline_secs = Some(n);
            }
        }
        if let Ok(socket) = std::env::var("TALLY_SOCKET") {
            self.daemon.socket = PathBuf::from(socket);
        }
    }

    /// Traversal options for the core
    pub fn to_scan_options(&self) -> ScanOptions {
        ScanOptions {
            threads: self.scan.threads,
            text_extension: self.scan.text_extension.clone(),
            archive_extension: self.scan.archive_extension.clone(),
            follow_symlinks: self.scan.follow_symlinks,
            max_archive_depth: self.scan.max_archive_depth,
            deadline: self.scan.deadline_secs.map(Duration::from_secs),
            concurrent_roots: self.scan.concurrent_roots,
        }
    }

    /// Generate default config TOML string
    pub fn default_toml() -> String {
        toml::to_string_pretty(&Config::default()).unwrap_or_default()
    }
}

/// Recursive merge: tables merge key by key, other values are replaced
fn merge_tables(base: &mut toml::Table, overlay: toml::Table) {
    for (key, value) in overlay {
        match (base.get_mut(&key), value) {
            (Some(toml::Value::Table(existing)), toml::Value::Table(incoming)) => {
                merge_tables(existing, incoming);
            }
            (_, value) => {
                base.insert(key, value);
            }
        }
    }
}

/// Traversal configuration
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct ScanConfig {
    /// Number of worker threads (None = auto)
    pub threads: Option<usize>,
    /// Extension of documents whose words are counted
    pub text_extension: String,
    /// Extension of archives expanded during traversal
    pub archive_extension: String,
    /// Follow symlinked directories and files
    pub follow_symlinks: bool,
    /// Deepest archive-in-archive nesting that is expanded
    pub max_archive_depth: usize,
    /// Stop scheduling new directories after this many seconds
    pub deadline_secs: Option<u64>,
    /// Traverse the roots of one request concurrently
    pub concurrent_roots: bool,
}

impl Default for ScanConfig {
    fn default() -> Self {
        let options = ScanOptions::default();
        Self {
            threads: options.threads,
            text_extension: options.text_extension,
            archive_extension: options.archive_extension,
            follow_symlinks: options.follow_symlinks,
            max_archive_depth: options.max_archive_depth,
            deadline_secs: None,
            concurrent_roots: options.concurrent_roots,
        }
    }
}

/// Daemon configuration
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct DaemonConfig {
    /// Unix socket path
    pub socket: PathBuf,
}

impl Default for DaemonConfig {
    fn default() -> Self {
        Self {
            socket: PathBuf::from(DEFAULT_SOCKET_PATH),
        }
    }
}

/// Logging configuration
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct LogConfig {
    /// Default level when TALLY_LOG / RUST_LOG are unset
    pub level: String,
}

impl Default for LogConfig {
    fn default() -> Self {
        Self {
            level: "warn".to_string(),
        }
    }
}

impl LogConfig {
    pub fn log_level(&self) -> logging::LogLevel {
        self.level.parse().unwrap_or(logging::LogLevel::Warn)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_default_config() {
        let config = Config::default();
        assert_eq!(config.scan.text_extension, "txt");
        assert_eq!(config.scan.archive_extension, "zip");
        assert_eq!(config.daemon.socket, PathBuf::from(DEFAULT_SOCKET_PATH));
    }

    #[test]
    fn test_default_toml_generation() {
        let toml_str = Config::default_toml();
        assert!(toml_str.contains("[scan]"));
        assert!(toml_str.contains("[daemon]"));
        assert!(toml_str.contains("[log]"));
        assert!(toml_str.contains("text_extension = \"txt\""));
    }

    #[test]
    fn test_toml_roundtrip() {
        let config = Config::default();
        let toml_str = toml::to_string(&config).unwrap();
        let parsed: Config = toml::from_str(&toml_str).unwrap();
        assert_eq!(config.scan.max_archive_depth, parsed.scan.max_archive_depth);
        assert_eq!(config.daemon.socket, parsed.daemon.socket);
    }

    #[test]
    fn test_scan_options_mapping() {
        let mut config = Config::default();
        config.scan.threads = Some(3);
        config.scan.deadline_secs = Some(30);
        config.scan.text_extension = "md".to_string();

        let options = config.to_scan_options();
        assert_eq!(options.threads, Some(3));
        assert_eq!(options.deadline, Some(Duration::from_secs(30)));
        assert_eq!(options.text_extension, "md");
    }

    #[test]
    fn test_merge_tables_is_key_by_key() {
        let mut base: toml::Table = toml::from_str("[scan]\nthreads = 2\ntext_extension = \"md\"").unwrap();
        let overlay: toml::Table = toml::from_str("[scan]\nthreads = 8").unwrap();
        merge_tables(&mut base, overlay);

        let config = Config::deserialize(toml::Value::Table(base)).unwrap();
        assert_eq!(config.scan.threads, Some(8));
        assert_eq!(config.scan.text_extension, "md");
    }

    #[test]
    fn test_log_level_parsing() {
        let mut log = LogConfig::default();
        assert_eq!(log.log_level(), logging::LogLevel::Warn);
        log.level = "DEBUG".to_string();
        assert_eq!(log.log_level(), logging::LogLevel::Debug);
        log.level = "chatty".to_string();
        assert_eq!(log.log_level(), logging::LogLevel::Warn);
    }
}
