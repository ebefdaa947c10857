//! Configuration loading
//!
//! Configuration is read from `~/.config/cpfm/config.toml` (or `--config`).
//! Every key is optional; a missing file means defaults.
//!
//! ```toml
//! [store]
//! path = "/var/lib/cpfm/cpfm.db"
//!
//! [cache]
//! backend = "sqlite"          # memory | sqlite | disabled
//! insight_ttl_secs = 1800
//!
//! [scan]
//! batch_size = 2500
//! max_rows = 200000           # 0 = unlimited
//! ```

use crate::error::{CoreError, Result};
use serde::Deserialize;
use std::path::{Path, PathBuf};
use std::time::Duration;

/// Top-level configuration
#[derive(Debug, Clone, Default, Deserialize)]
pub struct CoreConfig {
    #[serde(default)]
    pub store: StoreConfig,

    #[serde(default)]
    pub cache: CacheConfig,

    #[serde(default)]
    pub scan: ScanConfig,

    #[serde(default)]
    pub report: ReportConfig,

    #[serde(default)]
    pub logging: LoggingConfig,
}

/// Row store location
#[derive(Debug, Clone, Deserialize)]
pub struct StoreConfig {
    #[serde(default = "default_store_path")]
    pub path: PathBuf,
}

impl Default for StoreConfig {
    fn default() -> Self {
        Self {
            path: default_store_path(),
        }
    }
}

/// Cache backend selection
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum CacheBackend {
    /// Process-local moka cache
    #[default]
    Memory,
    /// SQLite file shared across invocations
    Sqlite,
    /// Always recompute
    Disabled,
}

/// Cache behaviour
#[derive(Debug, Clone, Deserialize)]
pub struct CacheConfig {
    #[serde(default)]
    pub backend: CacheBackend,

    /// Directory for the SQLite cache file
    #[serde(default = "default_cache_dir")]
    pub dir: PathBuf,

    /// TTL of cached insight record sets
    #[serde(default = "default_insight_ttl_secs")]
    pub insight_ttl_secs: u64,

    /// TTL of the plugin name catalogue
    #[serde(default = "default_plugin_names_ttl_secs")]
    pub plugin_names_ttl_secs: u64,

    /// Upper bound on entries held by the memory backend
    #[serde(default = "default_max_entries")]
    pub max_entries: u64,

    /// At most one recompute per cache key at a time
    #[serde(default = "default_true")]
    pub single_flight: bool,

    /// Drop affected entries when new telemetry is written
    #[serde(default = "default_true")]
    pub invalidate_on_write: bool,
}

impl Default for CacheConfig {
    fn default() -> Self {
        Self {
            backend: CacheBackend::default(),
            dir: default_cache_dir(),
            insight_ttl_secs: default_insight_ttl_secs(),
            plugin_names_ttl_secs: default_plugin_names_ttl_secs(),
            max_entries: default_max_entries(),
            single_flight: true,
            invalidate_on_write: true,
        }
    }
}

impl CacheConfig {
    pub fn insight_ttl(&self) -> Duration {
        Duration::from_secs(self.insight_ttl_secs)
    }

    pub fn plugin_names_ttl(&self) -> Duration {
        Duration::from_secs(self.plugin_names_ttl_secs)
    }
}

/// Batched scan limits
#[derive(Debug, Clone, Copy, Deserialize)]
pub struct ScanConfig {
    #[serde(default = "default_batch_size")]
    pub batch_size: usize,

    /// Safety cap on rows read per scan; 0 disables the cap
    #[serde(default = "default_max_rows")]
    pub max_rows: usize,
}

impl Default for ScanConfig {
    fn default() -> Self {
        Self {
            batch_size: default_batch_size(),
            max_rows: default_max_rows(),
        }
    }
}

impl ScanConfig {
    pub fn row_cap(&self) -> Option<usize> {
        (self.max_rows > 0).then_some(self.max_rows)
    }
}

/// Report shaping defaults
#[derive(Debug, Clone, Copy, Deserialize)]
pub struct ReportConfig {
    /// Rows in the top-plugins table when the request gives no limit
    #[serde(default = "default_top_limit")]
    pub top_limit: usize,

    /// Days shown in the daily installation chart
    #[serde(default = "default_chart_days")]
    pub chart_days: usize,
}

impl Default for ReportConfig {
    fn default() -> Self {
        Self {
            top_limit: default_top_limit(),
            chart_days: default_chart_days(),
        }
    }
}

/// Logging configuration
#[derive(Debug, Clone, Deserialize)]
pub struct LoggingConfig {
    /// Log level (trace, debug, info, warn, error); `RUST_LOG` wins
    #[serde(default = "default_log_level")]
    pub level: String,

    /// Emit JSON lines instead of human-readable output
    #[serde(default)]
    pub json: bool,
}

impl Default for LoggingConfig {
    fn default() -> Self {
        Self {
            level: default_log_level(),
            json: false,
        }
    }
}

fn default_true() -> bool {
    true
}

fn default_store_path() -> PathBuf {
    CoreConfig::data_dir().join("cpfm.db")
}

fn default_cache_dir() -> PathBuf {
    dirs::cache_dir()
        .unwrap_or_else(|| PathBuf::from("."))
        .join("cpfm")
}

fn default_insight_ttl_secs() -> u64 {
    30 * 60
}

fn default_plugin_names_ttl_secs() -> u64 {
    60 * 60
}

fn default_max_entries() -> u64 {
    64
}

fn default_batch_size() -> usize {
    2_500
}

fn default_max_rows() -> usize {
    200_000
}

fn default_top_limit() -> usize {
    5
}

fn default_chart_days() -> usize {
    30
}

fn default_log_level() -> String {
    "info".to_string()
}

impl CoreConfig {
    /// `~/.config/cpfm`
    pub fn config_dir() -> PathBuf {
        dirs::config_dir()
            .unwrap_or_else(|| PathBuf::from("."))
            .join("cpfm")
    }

    /// `~/.local/share/cpfm`
    pub fn data_dir() -> PathBuf {
        dirs::data_dir()
            .unwrap_or_else(|| PathBuf::from("."))
            .join("cpfm")
    }

    pub fn default_path() -> PathBuf {
        Self::config_dir().join("config.toml")
    }

    /// Load from `path`, falling back to defaults when the file is absent
    pub fn load(path: &Path) -> Result<Self> {
        if !path.exists() {
            tracing::debug!(path = %path.display(), "No config file, using defaults");
            return Ok(Self::default());
        }

        let content = std::fs::read_to_string(path).map_err(|source| CoreError::ConfigRead {
            path: path.to_path_buf(),
            source,
        })?;

        let config = Self::from_toml(&content).map_err(|e| match e {
            ParseFailure::Toml(source) => CoreError::ConfigParse {
                path: path.to_path_buf(),
                source,
            },
            ParseFailure::Invalid(err) => err,
        })?;

        tracing::debug!(path = %path.display(), "Config loaded");
        Ok(config)
    }

    fn from_toml(content: &str) -> std::result::Result<Self, ParseFailure> {
        let config: Self = toml::from_str(content).map_err(ParseFailure::Toml)?;
        config.validate().map_err(ParseFailure::Invalid)?;
        Ok(config)
    }

    /// Reject values the engine cannot run with
    pub fn validate(&self) -> Result<()> {
        if self.scan.batch_size == 0 {
            return Err(CoreError::InvalidConfig {
                message: "scan.batch_size must be greater than 0".to_string(),
            });
        }
        Ok(())
    }
}

enum ParseFailure {
    Toml(toml::de::Error),
    Invalid(CoreError),
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::io::Write;
    use tempfile::NamedTempFile;

    #[test]
    fn test_defaults() {
        let config = CoreConfig::default();
        assert_eq!(config.scan.batch_size, 2_500);
        assert_eq!(config.scan.row_cap(), Some(200_000));
        assert_eq!(config.cache.insight_ttl(), Duration::from_secs(1800));
        assert_eq!(config.cache.plugin_names_ttl(), Duration::from_secs(3600));
        assert_eq!(config.cache.backend, CacheBackend::Memory);
        assert!(config.cache.single_flight);
        assert_eq!(config.report.top_limit, 5);
    }

    #[test]
    fn test_partial_file_keeps_defaults() {
        let mut file = NamedTempFile::new().unwrap();
        writeln!(
            file,
            r#"
            [cache]
            backend = "disabled"

            [scan]
            max_rows = 0
            "#
        )
        .unwrap();

        let config = CoreConfig::load(file.path()).unwrap();
        assert_eq!(config.cache.backend, CacheBackend::Disabled);
        assert_eq!(config.cache.insight_ttl_secs, 1800);
        assert_eq!(config.scan.row_cap(), None);
        assert_eq!(config.scan.batch_size, 2_500);
    }

    #[test]
    fn test_missing_file_is_default() {
        let config = CoreConfig::load(Path::new("/nonexistent/cpfm/config.toml")).unwrap();
        assert_eq!(config.logging.level, "info");
    }

    #[test]
    fn test_zero_batch_size_rejected() {
        let mut file = NamedTempFile::new().unwrap();
        writeln!(file, "[scan]\nbatch_size = 0").unwrap();

        let result = CoreConfig::load(file.path());
        assert!(matches!(result, Err(CoreError::InvalidConfig { .. })));
    }

    #[test]
    fn test_malformed_toml() {
        let mut file = NamedTempFile::new().unwrap();
        writeln!(file, "[scan\nbatch_size = ").unwrap();

        let result = CoreConfig::load(file.path());
        assert!(matches!(result, Err(CoreError::ConfigParse { .. })));
    }
}
