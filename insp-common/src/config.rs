//! Configuration loading for the inspection tooling
//!
//! Bootstrap configuration is a single TOML file. Every section and field is
//! optional; anything missing falls back to a built-in default, so an absent
//! file is equivalent to an empty one.
//!
//! # Config File Priority
//!
//! 1. Command-line argument (`--config`)
//! 2. Environment variable (`INSP_CONFIG`)
//! 3. User config (`~/.config/insp/config.toml`)
//! 4. System config (`/etc/insp/config.toml`, Linux only)
//! 5. Built-in defaults
//!
//! The classifier API key is resolved separately: `INSP_CLASSIFIER_API_KEY`
//! first, then `classifier.api_key` from the TOML file.

use crate::{Error, Result};
use serde::{Deserialize, Serialize};
use std::path::{Path, PathBuf};
use std::time::Duration;
use tracing::{debug, info, warn};

/// Environment variable naming an explicit config file
pub const CONFIG_ENV_VAR: &str = "INSP_CONFIG";

/// Environment variable carrying the classifier API key
pub const API_KEY_ENV_VAR: &str = "INSP_CLASSIFIER_API_KEY";

/// Bootstrap configuration loaded from TOML
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct TomlConfig {
    /// External classification/reasoning service
    #[serde(default)]
    pub classifier: ClassifierConfig,

    /// Per-call deadlines for external calls
    #[serde(default)]
    pub timeouts: TimeoutConfig,

    /// Matching heuristics (tunable, not correctness constants)
    #[serde(default)]
    pub matching: MatchingConfig,

    /// Logging configuration
    #[serde(default)]
    pub logging: LoggingConfig,
}

/// Classifier endpoint configuration
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ClassifierConfig {
    /// OpenAI-compatible chat-completions URL
    #[serde(default = "default_endpoint")]
    pub endpoint: String,

    /// Model identifier sent with every request
    #[serde(default = "default_model")]
    pub model: String,

    /// API key (prefer the environment variable)
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub api_key: Option<String>,

    /// Upper bound on generated tokens per call
    #[serde(default = "default_max_tokens")]
    pub max_tokens: u32,

    /// Client-side rate limit
    #[serde(default = "default_requests_per_second")]
    pub requests_per_second: u32,

    /// TCP connect timeout
    #[serde(default = "default_connect_timeout_secs")]
    pub connect_timeout_secs: u64,
}

impl Default for ClassifierConfig {
    fn default() -> Self {
        Self {
            endpoint: default_endpoint(),
            model: default_model(),
            api_key: None,
            max_tokens: default_max_tokens(),
            requests_per_second: default_requests_per_second(),
            connect_timeout_secs: default_connect_timeout_secs(),
        }
    }
}

/// Per-call deadlines, in seconds
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct TimeoutConfig {
    #[serde(default = "default_analyze_secs")]
    pub analyze_secs: u64,
    #[serde(default = "default_excess_match_secs")]
    pub excess_match_secs: u64,
    #[serde(default = "default_enhanced_match_secs")]
    pub enhanced_match_secs: u64,
    #[serde(default = "default_verify_secs")]
    pub verify_secs: u64,
    #[serde(default = "default_naming_secs")]
    pub naming_secs: u64,
}

impl Default for TimeoutConfig {
    fn default() -> Self {
        Self {
            analyze_secs: default_analyze_secs(),
            excess_match_secs: default_excess_match_secs(),
            enhanced_match_secs: default_enhanced_match_secs(),
            verify_secs: default_verify_secs(),
            naming_secs: default_naming_secs(),
        }
    }
}

impl TimeoutConfig {
    pub fn analyze(&self) -> Duration {
        Duration::from_secs(self.analyze_secs)
    }

    pub fn excess_match(&self) -> Duration {
        Duration::from_secs(self.excess_match_secs)
    }

    pub fn enhanced_match(&self) -> Duration {
        Duration::from_secs(self.enhanced_match_secs)
    }

    pub fn verify(&self) -> Duration {
        Duration::from_secs(self.verify_secs)
    }

    pub fn naming(&self) -> Duration {
        Duration::from_secs(self.naming_secs)
    }
}

/// Matching heuristics
///
/// The ratio window and prefix threshold were chosen empirically. They decide
/// which matching strategy runs, never whether the output is valid.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct MatchingConfig {
    /// Lower bound of photo/note ratio treated as one-to-one
    #[serde(default = "default_numbered_ratio_min")]
    pub numbered_ratio_min: f64,

    /// Upper bound of photo/note ratio treated as one-to-one
    #[serde(default = "default_numbered_ratio_max")]
    pub numbered_ratio_max: f64,

    /// Share of sampled notes that must carry an ordinal prefix
    #[serde(default = "default_numbered_prefix_threshold")]
    pub numbered_prefix_threshold: f64,

    /// Number of leading notes inspected for ordinal prefixes
    #[serde(default = "default_prefix_sample_size")]
    pub prefix_sample_size: usize,

    /// Assignments below this confidence raise a validation warning
    #[serde(default = "default_low_confidence_threshold")]
    pub low_confidence_threshold: f64,
}

impl Default for MatchingConfig {
    fn default() -> Self {
        Self {
            numbered_ratio_min: default_numbered_ratio_min(),
            numbered_ratio_max: default_numbered_ratio_max(),
            numbered_prefix_threshold: default_numbered_prefix_threshold(),
            prefix_sample_size: default_prefix_sample_size(),
            low_confidence_threshold: default_low_confidence_threshold(),
        }
    }
}

impl MatchingConfig {
    /// Reject heuristic values that cannot select a strategy sensibly
    pub fn validate(&self) -> Result<()> {
        if !(self.numbered_ratio_min > 0.0 && self.numbered_ratio_min <= self.numbered_ratio_max) {
            return Err(Error::Config(format!(
                "matching.numbered_ratio_min ({}) must be positive and <= numbered_ratio_max ({})",
                self.numbered_ratio_min, self.numbered_ratio_max
            )));
        }
        if !(0.0..=1.0).contains(&self.numbered_prefix_threshold) {
            return Err(Error::Config(format!(
                "matching.numbered_prefix_threshold ({}) must be within 0.0..=1.0",
                self.numbered_prefix_threshold
            )));
        }
        if self.prefix_sample_size == 0 {
            return Err(Error::Config(
                "matching.prefix_sample_size must be at least 1".to_string(),
            ));
        }
        if !(0.0..=1.0).contains(&self.low_confidence_threshold) {
            return Err(Error::Config(format!(
                "matching.low_confidence_threshold ({}) must be within 0.0..=1.0",
                self.low_confidence_threshold
            )));
        }
        Ok(())
    }
}

/// Logging configuration
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct LoggingConfig {
    /// Log level (trace, debug, info, warn, error)
    #[serde(default = "default_log_level")]
    pub level: String,
}

impl Default for LoggingConfig {
    fn default() -> Self {
        Self {
            level: default_log_level(),
        }
    }
}

fn default_endpoint() -> String {
    "https://api.openai.com/v1/chat/completions".to_string()
}

fn default_model() -> String {
    "gpt-4o".to_string()
}

fn default_max_tokens() -> u32 {
    4096
}

fn default_requests_per_second() -> u32 {
    2
}

fn default_connect_timeout_secs() -> u64 {
    10
}

fn default_analyze_secs() -> u64 {
    60
}

fn default_excess_match_secs() -> u64 {
    120
}

fn default_enhanced_match_secs() -> u64 {
    180
}

fn default_verify_secs() -> u64 {
    180
}

fn default_naming_secs() -> u64 {
    90
}

fn default_numbered_ratio_min() -> f64 {
    0.8
}

fn default_numbered_ratio_max() -> f64 {
    1.5
}

fn default_numbered_prefix_threshold() -> f64 {
    0.6
}

fn default_prefix_sample_size() -> usize {
    5
}

fn default_low_confidence_threshold() -> f64 {
    0.7
}

fn default_log_level() -> String {
    "info".to_string()
}

impl TomlConfig {
    /// Parse a TOML file
    pub fn load(path: &Path) -> Result<Self> {
        let content = std::fs::read_to_string(path)?;
        let config: TomlConfig = toml::from_str(&content)
            .map_err(|e| Error::Config(format!("Parse {} failed: {}", path.display(), e)))?;
        config.matching.validate()?;
        Ok(config)
    }
}

/// Locate the config file following the documented priority order
///
/// Explicit locations (CLI, environment) are returned even if the file does
/// not exist so the caller reports the mistake; default locations are only
/// returned when present.
pub fn resolve_config_path(cli_arg: Option<&Path>, env_var_name: &str) -> Option<PathBuf> {
    // Priority 1: Command-line argument
    if let Some(path) = cli_arg {
        return Some(path.to_path_buf());
    }

    // Priority 2: Environment variable
    if let Ok(path) = std::env::var(env_var_name) {
        if !path.trim().is_empty() {
            return Some(PathBuf::from(path));
        }
    }

    // Priority 3/4: Platform config locations
    default_config_locations().into_iter().find(|p| p.exists())
}

fn default_config_locations() -> Vec<PathBuf> {
    let mut locations = Vec::new();
    if let Some(dir) = dirs::config_dir() {
        locations.push(dir.join("insp").join("config.toml"));
    }
    if cfg!(target_os = "linux") {
        locations.push(PathBuf::from("/etc/insp/config.toml"));
    }
    locations
}

/// Load configuration, falling back to built-in defaults when no file exists
pub fn load_config(cli_arg: Option<&Path>) -> Result<TomlConfig> {
    match resolve_config_path(cli_arg, CONFIG_ENV_VAR) {
        Some(path) => {
            if !path.exists() {
                return Err(Error::Config(format!(
                    "Config file not found: {}",
                    path.display()
                )));
            }
            info!("Loading configuration from {}", path.display());
            TomlConfig::load(&path)
        }
        None => {
            debug!("No config file found, using built-in defaults");
            Ok(TomlConfig::default())
        }
    }
}

/// Resolve the classifier API key
///
/// **Priority:** ENV → TOML. Returns `None` when neither source carries a
/// usable key; callers then run with every external call unavailable.
pub fn resolve_api_key(config: &TomlConfig) -> Option<String> {
    let env_key = std::env::var(API_KEY_ENV_VAR).ok().filter(|k| is_valid_key(k));
    let toml_key = config.classifier.api_key.clone().filter(|k| is_valid_key(k));

    if env_key.is_some() && toml_key.is_some() {
        warn!(
            "Classifier API key found in both {} and TOML config. Using environment (highest priority).",
            API_KEY_ENV_VAR
        );
    }

    match (env_key, toml_key) {
        (Some(key), _) => {
            info!("Classifier API key loaded from environment variable");
            Some(key)
        }
        (None, Some(key)) => {
            info!("Classifier API key loaded from TOML config");
            Some(key)
        }
        (None, None) => None,
    }
}

/// Validate API key (non-empty, non-whitespace)
pub fn is_valid_key(key: &str) -> bool {
    !key.trim().is_empty()
}

/// Write configuration atomically (temp file + rename)
///
/// On Unix the written file is restricted to the owner (0600) since it may
/// carry an API key.
pub fn write_toml_config(config: &TomlConfig, target: &Path) -> Result<()> {
    let content = toml::to_string_pretty(config)
        .map_err(|e| Error::Config(format!("Serialize TOML failed: {}", e)))?;

    if let Some(parent) = target.parent() {
        if !parent.as_os_str().is_empty() {
            std::fs::create_dir_all(parent)?;
        }
    }

    let mut temp_name = target.as_os_str().to_owned();
    temp_name.push(".tmp");
    let temp_path = PathBuf::from(temp_name);

    std::fs::write(&temp_path, content)?;

    #[cfg(unix)]
    {
        use std::os::unix::fs::PermissionsExt;
        std::fs::set_permissions(&temp_path, std::fs::Permissions::from_mode(0o600))?;
    }

    std::fs::rename(&temp_path, target)?;
    debug!("Configuration written to {}", target.display());
    Ok(())
}
