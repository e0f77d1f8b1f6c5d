//! Configuration loading
//!
//! Settings resolve in priority order:
//! 1. Command-line argument (highest priority)
//! 2. Environment variable
//! 3. TOML config file
//! 4. Compiled default (fallback)
//!
//! A missing TOML file is not an error: the service logs a warning and uses
//! defaults. Missing upstream credentials are, and are reported before any
//! model call is attempted.

use serde::{Deserialize, Serialize};
use std::fmt;
use std::path::{Path, PathBuf};
use tracing::{info, warn};

use crate::{Error, Result};

pub const ENV_CONFIG_PATH: &str = "ROLEBRIDGE_CONFIG";
pub const ENV_API_KEY: &str = "ROLEBRIDGE_API_KEY";
pub const ENV_BASE_URL: &str = "ROLEBRIDGE_BASE_URL";
pub const ENV_MODEL: &str = "ROLEBRIDGE_MODEL";
pub const ENV_AUDIT_LOG: &str = "ROLEBRIDGE_AUDIT_LOG";

/// Default HTTP port for rolebridge-server
pub const DEFAULT_PORT: u16 = 5780;
/// Default input ceiling, in characters
pub const DEFAULT_MAX_CONTENT_CHARS: usize = 5000;

/// Whole TOML file
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct TomlConfig {
    #[serde(default)]
    pub upstream: UpstreamConfig,
    #[serde(default)]
    pub server: ServerConfig,
    #[serde(default)]
    pub limits: LimitsConfig,
    #[serde(default)]
    pub logging: LoggingConfig,
}

/// Upstream model endpoint
///
/// All three fields are required before the service starts.
#[derive(Clone, Default, Serialize, Deserialize)]
pub struct UpstreamConfig {
    pub api_key: Option<String>,
    pub base_url: Option<String>,
    pub model: Option<String>,
}

impl fmt::Debug for UpstreamConfig {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("UpstreamConfig")
            .field("api_key", &self.api_key.as_ref().map(|_| "[REDACTED]"))
            .field("base_url", &self.base_url)
            .field("model", &self.model)
            .finish()
    }
}

/// Validated upstream settings
#[derive(Clone)]
pub struct UpstreamSettings {
    pub api_key: String,
    pub base_url: String,
    pub model: String,
}

impl fmt::Debug for UpstreamSettings {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("UpstreamSettings")
            .field("api_key", &"[REDACTED]")
            .field("base_url", &self.base_url)
            .field("model", &self.model)
            .finish()
    }
}

impl UpstreamConfig {
    /// Override fields from the environment
    pub fn with_env_overrides(mut self) -> Self {
        if let Some(value) = env_value(ENV_API_KEY) {
            self.api_key = Some(value);
        }
        if let Some(value) = env_value(ENV_BASE_URL) {
            self.base_url = Some(value);
        }
        if let Some(value) = env_value(ENV_MODEL) {
            self.model = Some(value);
        }
        self
    }

    /// Check that credential, endpoint and model are all present
    ///
    /// Reports every missing field at once.
    pub fn validate(&self) -> Result<UpstreamSettings> {
        let mut missing = Vec::new();
        let api_key = present(&self.api_key);
        let base_url = present(&self.base_url);
        let model = present(&self.model);

        if api_key.is_none() {
            missing.push(format!("api_key ({})", ENV_API_KEY));
        }
        if base_url.is_none() {
            missing.push(format!("base_url ({})", ENV_BASE_URL));
        }
        if model.is_none() {
            missing.push(format!("model ({})", ENV_MODEL));
        }

        match (api_key, base_url, model) {
            (Some(api_key), Some(base_url), Some(model)) => Ok(UpstreamSettings {
                api_key,
                base_url: base_url.trim_end_matches('/').to_string(),
                model,
            }),
            _ => Err(Error::Config(format!(
                "upstream model endpoint not configured, missing: {}",
                missing.join(", ")
            ))),
        }
    }
}

/// HTTP server settings
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ServerConfig {
    #[serde(default = "default_host")]
    pub host: String,
    #[serde(default = "default_port")]
    pub port: u16,
    /// JSON-lines audit file; audit goes to the tracing log when unset
    #[serde(default)]
    pub audit_log: Option<PathBuf>,
}

impl Default for ServerConfig {
    fn default() -> Self {
        Self {
            host: default_host(),
            port: default_port(),
            audit_log: None,
        }
    }
}

/// Input ceilings, token budgets and upstream timeouts
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct LimitsConfig {
    #[serde(default = "default_max_content_chars")]
    pub max_content_chars: usize,
    #[serde(default = "default_analysis_max_tokens")]
    pub analysis_max_tokens: u32,
    #[serde(default = "default_synthesis_max_tokens")]
    pub synthesis_max_tokens: u32,
    #[serde(default = "default_direct_max_tokens")]
    pub direct_max_tokens: u32,
    /// Wait for the first upstream response
    #[serde(default = "default_timeout_secs")]
    pub request_timeout_secs: u64,
    /// Wait between two streamed fragments
    #[serde(default = "default_timeout_secs")]
    pub idle_timeout_secs: u64,
}

impl Default for LimitsConfig {
    fn default() -> Self {
        Self {
            max_content_chars: default_max_content_chars(),
            analysis_max_tokens: default_analysis_max_tokens(),
            synthesis_max_tokens: default_synthesis_max_tokens(),
            direct_max_tokens: default_direct_max_tokens(),
            request_timeout_secs: default_timeout_secs(),
            idle_timeout_secs: default_timeout_secs(),
        }
    }
}

/// Logging configuration
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct LoggingConfig {
    /// Log level (trace, debug, info, warn, error); RUST_LOG wins when set
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

fn default_host() -> String {
    "127.0.0.1".to_string()
}

fn default_port() -> u16 {
    DEFAULT_PORT
}

fn default_max_content_chars() -> usize {
    DEFAULT_MAX_CONTENT_CHARS
}

fn default_analysis_max_tokens() -> u32 {
    2048
}

fn default_synthesis_max_tokens() -> u32 {
    4096
}

fn default_direct_max_tokens() -> u32 {
    4096
}

fn default_timeout_secs() -> u64 {
    60
}

fn default_log_level() -> String {
    "info".to_string()
}

fn env_value(name: &str) -> Option<String> {
    std::env::var(name).ok().filter(|v| !v.trim().is_empty())
}

fn present(value: &Option<String>) -> Option<String> {
    value
        .as_ref()
        .map(|v| v.trim())
        .filter(|v| !v.is_empty())
        .map(str::to_string)
}

/// Platform config file location: `<config_dir>/rolebridge/config.toml`
pub fn default_config_path() -> Option<PathBuf> {
    dirs::config_dir().map(|d| d.join("rolebridge").join("config.toml"))
}

/// Pick the config file path: CLI argument, then environment, then platform default
pub fn resolve_config_path(cli_arg: Option<&Path>) -> Option<PathBuf> {
    if let Some(path) = cli_arg {
        return Some(path.to_path_buf());
    }
    if let Some(path) = env_value(ENV_CONFIG_PATH) {
        return Some(PathBuf::from(path));
    }
    default_config_path()
}

/// Parse a TOML config file
pub fn load_toml_config(path: &Path) -> Result<TomlConfig> {
    let content = std::fs::read_to_string(path)
        .map_err(|e| Error::Config(format!("Read {} failed: {}", path.display(), e)))?;
    toml::from_str(&content)
        .map_err(|e| Error::Config(format!("Parse {} failed: {}", path.display(), e)))
}

/// Load configuration with graceful degradation
///
/// An explicitly named file (CLI or environment) must exist and parse; the
/// platform default file may be absent. Environment overrides are applied
/// on top of whatever was loaded.
pub fn load_config(cli_arg: Option<&Path>) -> Result<TomlConfig> {
    let explicit = cli_arg.is_some() || env_value(ENV_CONFIG_PATH).is_some();

    let mut config = match resolve_config_path(cli_arg) {
        Some(path) if path.exists() => {
            info!("Loading configuration from {}", path.display());
            load_toml_config(&path)?
        }
        Some(path) if explicit => {
            return Err(Error::Config(format!(
                "Config file not found: {}",
                path.display()
            )));
        }
        Some(path) => {
            warn!(
                "Config file {} not found, using defaults and environment",
                path.display()
            );
            TomlConfig::default()
        }
        None => {
            warn!("Could not determine config directory, using defaults and environment");
            TomlConfig::default()
        }
    };

    config.upstream = config.upstream.with_env_overrides();
    if let Some(path) = env_value(ENV_AUDIT_LOG) {
        config.server.audit_log = Some(PathBuf::from(path));
    }

    Ok(config)
}
