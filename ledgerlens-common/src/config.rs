//! Configuration loading and resolution
//!
//! Bootstrap configuration lives in a single TOML file. Every field carries a
//! built-in default, so a missing file (or a file with only some sections)
//! still produces a usable configuration.
//!
//! # Resolution Priority
//! 1. Command-line argument (highest priority)
//! 2. `LEDGERLENS_CONFIG` environment variable
//! 3. Platform config directory: `<config_dir>/ledgerlens/<module>.toml`
//! 4. Built-in defaults (fallback)

use crate::{Error, Result};
use serde::{Deserialize, Serialize};
use std::path::{Path, PathBuf};
use std::time::Duration;
use tracing::{info, warn};

/// Environment variable naming an explicit config file
pub const CONFIG_ENV_VAR: &str = "LEDGERLENS_CONFIG";

/// Bootstrap configuration loaded from TOML
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct TomlConfig {
    #[serde(default)]
    pub logging: LoggingConfig,
    #[serde(default)]
    pub database: DatabaseConfig,
    #[serde(default)]
    pub cache: CacheConfig,
    #[serde(default)]
    pub rate_limit: RateLimitConfig,
    #[serde(default)]
    pub retry: RetryConfig,
    #[serde(default)]
    pub pipeline: PipelineConfig,
    #[serde(default)]
    pub reasoning: ReasoningConfig,
}

/// Logging configuration
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct LoggingConfig {
    /// Log level or filter directive (trace, debug, info, warn, error)
    #[serde(default = "default_log_level")]
    pub level: String,

    /// Log file path (logs to stderr if not specified)
    #[serde(default)]
    pub file: Option<PathBuf>,
}

impl Default for LoggingConfig {
    fn default() -> Self {
        Self {
            level: default_log_level(),
            file: None,
        }
    }
}

/// Reference data database location
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct DatabaseConfig {
    /// SQLite database path; platform data dir when absent
    #[serde(default)]
    pub path: Option<PathBuf>,
}

impl DatabaseConfig {
    /// Configured path, or `<data_local_dir>/ledgerlens/ledgerlens.db`
    pub fn resolved_path(&self) -> PathBuf {
        self.path.clone().unwrap_or_else(default_database_path)
    }
}

/// Reference data cache settings
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct CacheConfig {
    /// Snapshot time-to-live in seconds
    #[serde(default = "default_cache_ttl_secs")]
    pub ttl_secs: u64,
}

impl Default for CacheConfig {
    fn default() -> Self {
        Self {
            ttl_secs: default_cache_ttl_secs(),
        }
    }
}

impl CacheConfig {
    pub fn ttl(&self) -> Duration {
        Duration::from_secs(self.ttl_secs)
    }
}

/// Process-wide token bucket for reasoning-service calls
///
/// When `capacity` is not set it is derived from the service's published
/// limit scaled by `headroom`, leaving room for latency jitter.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct RateLimitConfig {
    /// Published service limit per refill interval
    #[serde(default = "default_nominal_limit")]
    pub nominal_limit: u32,

    /// Fraction of the nominal limit actually used (0.0-1.0]
    #[serde(default = "default_headroom")]
    pub headroom: f64,

    /// Explicit bucket capacity (overrides nominal_limit * headroom)
    #[serde(default)]
    pub capacity: Option<u32>,

    /// Tokens added per refill interval (defaults to capacity)
    #[serde(default)]
    pub refill_tokens: Option<u32>,

    /// Refill interval in milliseconds
    #[serde(default = "default_refill_interval_ms")]
    pub refill_interval_ms: u64,
}

impl Default for RateLimitConfig {
    fn default() -> Self {
        Self {
            nominal_limit: default_nominal_limit(),
            headroom: default_headroom(),
            capacity: None,
            refill_tokens: None,
            refill_interval_ms: default_refill_interval_ms(),
        }
    }
}

impl RateLimitConfig {
    /// Bucket capacity, never below 1
    pub fn effective_capacity(&self) -> u32 {
        match self.capacity {
            Some(capacity) => capacity.max(1),
            None => {
                let headroom = self.headroom.clamp(0.0, 1.0);
                ((self.nominal_limit as f64 * headroom).floor() as u32).max(1)
            }
        }
    }

    /// Tokens restored per interval, never below 1
    pub fn effective_refill_tokens(&self) -> u32 {
        self.refill_tokens
            .unwrap_or_else(|| self.effective_capacity())
            .max(1)
    }

    pub fn refill_interval(&self) -> Duration {
        Duration::from_millis(self.refill_interval_ms.max(1))
    }
}

/// Retry policy for reasoning-service calls
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct RetryConfig {
    #[serde(default = "default_max_attempts")]
    pub max_attempts: u32,
    #[serde(default = "default_initial_delay_ms")]
    pub initial_delay_ms: u64,
    #[serde(default = "default_max_delay_ms")]
    pub max_delay_ms: u64,
}

impl Default for RetryConfig {
    fn default() -> Self {
        Self {
            max_attempts: default_max_attempts(),
            initial_delay_ms: default_initial_delay_ms(),
            max_delay_ms: default_max_delay_ms(),
        }
    }
}

/// Orchestrator thresholds and limits
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct PipelineConfig {
    /// Wall-clock budget for one analysis request
    #[serde(default = "default_deadline_secs")]
    pub deadline_secs: u64,

    /// Concurrent OCR calls per request
    #[serde(default = "default_ocr_workers")]
    pub ocr_workers: usize,

    /// Per-image extraction confidence floor (0-100)
    #[serde(default = "default_min_extraction_confidence")]
    pub min_extraction_confidence: f64,

    /// Template confidence required for template-only mode (0-100)
    #[serde(default = "default_template_threshold")]
    pub template_threshold: f64,

    /// Name similarity required to accept a counterparty (0-100)
    #[serde(default = "default_party_threshold")]
    pub party_threshold: f64,

    /// Largest accepted image payload in bytes
    #[serde(default = "default_max_image_bytes")]
    pub max_image_bytes: usize,

    /// Use an expired snapshot when the backing store is unreachable
    #[serde(default)]
    pub allow_stale_reference_data: bool,

    /// Template factor credited to free-analysis results (0-100)
    #[serde(default)]
    pub reference_driven_baseline: Option<f64>,
}

impl Default for PipelineConfig {
    fn default() -> Self {
        Self {
            deadline_secs: default_deadline_secs(),
            ocr_workers: default_ocr_workers(),
            min_extraction_confidence: default_min_extraction_confidence(),
            template_threshold: default_template_threshold(),
            party_threshold: default_party_threshold(),
            max_image_bytes: default_max_image_bytes(),
            allow_stale_reference_data: false,
            reference_driven_baseline: None,
        }
    }
}

/// Reasoning service endpoint
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ReasoningConfig {
    #[serde(default = "default_reasoning_endpoint")]
    pub endpoint: String,

    /// API key (the LEDGERLENS_REASONING_API_KEY env var takes priority)
    #[serde(default)]
    pub api_key: Option<String>,

    #[serde(default = "default_request_timeout_secs")]
    pub request_timeout_secs: u64,

    #[serde(default = "default_connect_timeout_secs")]
    pub connect_timeout_secs: u64,
}

impl Default for ReasoningConfig {
    fn default() -> Self {
        Self {
            endpoint: default_reasoning_endpoint(),
            api_key: None,
            request_timeout_secs: default_request_timeout_secs(),
            connect_timeout_secs: default_connect_timeout_secs(),
        }
    }
}

fn default_log_level() -> String {
    "info".to_string()
}

fn default_cache_ttl_secs() -> u64 {
    300
}

fn default_nominal_limit() -> u32 {
    60
}

fn default_headroom() -> f64 {
    0.8
}

fn default_refill_interval_ms() -> u64 {
    60_000
}

fn default_max_attempts() -> u32 {
    3
}

fn default_initial_delay_ms() -> u64 {
    1_000
}

fn default_max_delay_ms() -> u64 {
    30_000
}

fn default_deadline_secs() -> u64 {
    300
}

fn default_ocr_workers() -> usize {
    3
}

fn default_min_extraction_confidence() -> f64 {
    70.0
}

fn default_template_threshold() -> f64 {
    85.0
}

fn default_party_threshold() -> f64 {
    70.0
}

fn default_max_image_bytes() -> usize {
    20 * 1024 * 1024
}

fn default_reasoning_endpoint() -> String {
    "http://127.0.0.1:8089".to_string()
}

fn default_request_timeout_secs() -> u64 {
    120
}

fn default_connect_timeout_secs() -> u64 {
    10
}

/// Resolves which config file a module should read
pub struct ConfigResolver {
    module_name: String,
    cli_path: Option<PathBuf>,
}

impl ConfigResolver {
    pub fn new(module_name: &str) -> Self {
        Self {
            module_name: module_name.to_string(),
            cli_path: None,
        }
    }

    /// Explicit path from the command line (highest priority)
    pub fn with_cli_path(mut self, path: Option<PathBuf>) -> Self {
        self.cli_path = path;
        self
    }

    /// Pick the config path by priority; None means built-in defaults
    pub fn resolve_path(&self) -> Option<PathBuf> {
        if let Some(path) = &self.cli_path {
            return Some(path.clone());
        }

        if let Ok(path) = std::env::var(CONFIG_ENV_VAR) {
            if !path.trim().is_empty() {
                return Some(PathBuf::from(path));
            }
        }

        default_config_path(&self.module_name).filter(|path| path.exists())
    }

    /// Load the resolved config
    ///
    /// A missing file logs a warning and falls back to defaults. A file that
    /// exists but does not parse is an error.
    pub fn load(&self) -> Result<TomlConfig> {
        match self.resolve_path() {
            Some(path) if path.exists() => {
                let config = load_toml_config(&path)?;
                info!("Loaded configuration from {}", path.display());
                Ok(config)
            }
            Some(path) => {
                warn!(
                    "Config file {} not found, using built-in defaults",
                    path.display()
                );
                Ok(TomlConfig::default())
            }
            None => {
                info!("No config file found, using built-in defaults");
                Ok(TomlConfig::default())
            }
        }
    }
}

/// Platform config path for a module: `<config_dir>/ledgerlens/<module>.toml`
pub fn default_config_path(module_name: &str) -> Option<PathBuf> {
    dirs::config_dir().map(|d| d.join("ledgerlens").join(format!("{}.toml", module_name)))
}

/// Platform default database path
pub fn default_database_path() -> PathBuf {
    dirs::data_local_dir()
        .map(|d| d.join("ledgerlens").join("ledgerlens.db"))
        .unwrap_or_else(|| PathBuf::from("./ledgerlens_data/ledgerlens.db"))
}

/// Read and parse a TOML config file
pub fn load_toml_config(path: &Path) -> Result<TomlConfig> {
    let content = std::fs::read_to_string(path)
        .map_err(|e| Error::Config(format!("Read TOML failed ({}): {}", path.display(), e)))?;
    toml::from_str(&content)
        .map_err(|e| Error::Config(format!("Parse TOML failed ({}): {}", path.display(), e)))
}

/// Write a config file atomically (temp file + rename)
pub fn write_toml_config(config: &TomlConfig, path: &Path) -> Result<()> {
    if let Some(parent) = path.parent() {
        std::fs::create_dir_all(parent)?;
    }

    let content = toml::to_string_pretty(config)
        .map_err(|e| Error::Config(format!("Serialize TOML failed: {}", e)))?;

    let temp_path = path.with_extension("toml.tmp");
    std::fs::write(&temp_path, content)?;
    std::fs::rename(&temp_path, path)?;

    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_rate_limit_capacity_uses_headroom() {
        let config = RateLimitConfig::default();
        assert_eq!(config.effective_capacity(), 48);
        assert_eq!(config.effective_refill_tokens(), 48);
    }

    #[test]
    fn test_rate_limit_explicit_capacity_wins() {
        let config = RateLimitConfig {
            capacity: Some(10),
            refill_tokens: Some(2),
            ..Default::default()
        };
        assert_eq!(config.effective_capacity(), 10);
        assert_eq!(config.effective_refill_tokens(), 2);
    }

    #[test]
    fn test_rate_limit_never_zero() {
        let config = RateLimitConfig {
            nominal_limit: 1,
            headroom: 0.1,
            ..Default::default()
        };
        assert_eq!(config.effective_capacity(), 1);
    }

    #[test]
    fn test_partial_toml_keeps_defaults() {
        let config: TomlConfig = toml::from_str(
            r#"
            [pipeline]
            ocr_workers = 5
            "#,
        )
        .unwrap();

        assert_eq!(config.pipeline.ocr_workers, 5);
        assert_eq!(config.pipeline.deadline_secs, 300);
        assert_eq!(config.cache.ttl_secs, 300);
        assert_eq!(config.retry.max_attempts, 3);
        assert_eq!(config.logging.level, "info");
    }
}
