//! Configuration Module
//!
//! Provides TOML-based configuration for the gateway with support for:
//! - Logging (explicit level object, no module-global verbosity state)
//! - Ingest parameters (organization scope, payload limits)
//! - Extraction defaults
//! - Environment variable overrides (TELEGATE_* prefix)

use std::path::Path;

use config::{Environment, File, FileFormat};
use regex::Regex;
use serde::Deserialize;
use tracing::Level;

use crate::extract::DEFAULT_PATTERN;
use crate::gateway::GatewayConfig;
use crate::store::OrganizationId;


/// Substitute environment variables in a string.
/// Supports `${VAR}` and `${VAR:-default}` syntax.
fn substitute_env_vars(content: &str) -> String {
    let re = Regex::new(r"\$\{([^}:]+)(?::-([^}]*))?\}").unwrap();
    re.replace_all(content, |caps: &regex::Captures| {
        let var_name = &caps[1];
        let default = caps.get(2).map(|m| m.as_str()).unwrap_or("");
        std::env::var(var_name).unwrap_or_else(|_| default.to_string())
    })
    .to_string()
}

/// Configuration error types
#[derive(Debug)]
pub enum ConfigError {
    /// IO error reading config file
    Io(std::io::Error),
    /// TOML parsing error
    Parse(toml::de::Error),
    /// Config crate error
    Config(config::ConfigError),
    /// Validation error
    Validation(String),
}

impl std::fmt::Display for ConfigError {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            ConfigError::Io(e) => write!(f, "IO error: {}", e),
            ConfigError::Parse(e) => write!(f, "Parse error: {}", e),
            ConfigError::Config(e) => write!(f, "Config error: {}", e),
            ConfigError::Validation(msg) => write!(f, "Validation error: {}", msg),
        }
    }
}

impl std::error::Error for ConfigError {}

impl From<std::io::Error> for ConfigError {
    fn from(e: std::io::Error) -> Self {
        ConfigError::Io(e)
    }
}

impl From<toml::de::Error> for ConfigError {
    fn from(e: toml::de::Error) -> Self {
        ConfigError::Parse(e)
    }
}

impl From<config::ConfigError> for ConfigError {
    fn from(e: config::ConfigError) -> Self {
        ConfigError::Config(e)
    }
}

/// Root configuration structure
#[derive(Debug, Clone, Deserialize, Default)]
#[serde(default)]
pub struct Config {
    /// Logging configuration
    pub log: LogConfig,
    /// Ingest configuration
    pub ingest: IngestConfig,
    /// Payload extraction configuration
    pub extraction: ExtractionConfig,
}

/// Logging configuration
#[derive(Debug, Clone, Deserialize)]
#[serde(default)]
pub struct LogConfig {
    /// Log level: error, warn, info, debug, trace
    #[serde(default = "default_log_level")]
    pub level: String,
}

fn default_log_level() -> String {
    "info".to_string()
}

impl Default for LogConfig {
    fn default() -> Self {
        Self {
            level: default_log_level(),
        }
    }
}

/// Ingest configuration
#[derive(Debug, Clone, Deserialize)]
#[serde(default)]
pub struct IngestConfig {
    /// Organization every accepted connection publishes under
    #[serde(default)]
    pub organization_id: OrganizationId,
    /// Maximum accepted publish payload in bytes
    #[serde(default = "default_max_payload_bytes")]
    pub max_payload_bytes: usize,
}

fn default_max_payload_bytes() -> usize {
    256 * 1024
}

impl Default for IngestConfig {
    fn default() -> Self {
        Self {
            organization_id: 0,
            max_payload_bytes: default_max_payload_bytes(),
        }
    }
}

/// Payload extraction configuration
#[derive(Debug, Clone, Deserialize)]
#[serde(default)]
pub struct ExtractionConfig {
    /// Pattern for channels with none configured
    #[serde(default = "default_pattern")]
    pub default_pattern: String,
}

fn default_pattern() -> String {
    DEFAULT_PATTERN.to_string()
}

impl Default for ExtractionConfig {
    fn default() -> Self {
        Self {
            default_pattern: default_pattern(),
        }
    }
}

impl Config {
    /// Load configuration from a TOML file with environment overrides
    pub fn load(path: &Path) -> Result<Self, ConfigError> {
        let raw = std::fs::read_to_string(path)?;
        let substituted = substitute_env_vars(&raw);

        let settings = config::Config::builder()
            .add_source(File::from_str(&substituted, FileFormat::Toml))
            .add_source(Environment::with_prefix("TELEGATE").separator("__"))
            .build()?;

        let config: Config = settings.try_deserialize()?;
        config.validate()?;
        Ok(config)
    }

    /// Parse configuration from a TOML string (no environment overrides)
    pub fn from_toml_str(raw: &str) -> Result<Self, ConfigError> {
        let config: Config = toml::from_str(&substitute_env_vars(raw))?;
        config.validate()?;
        Ok(config)
    }

    fn validate(&self) -> Result<(), ConfigError> {
        parse_level(&self.log.level)?;
        if self.extraction.default_pattern.is_empty() {
            return Err(ConfigError::Validation(
                "extraction.default_pattern cannot be empty".to_string(),
            ));
        }
        if self.ingest.max_payload_bytes == 0 {
            return Err(ConfigError::Validation(
                "ingest.max_payload_bytes cannot be zero".to_string(),
            ));
        }
        Ok(())
    }

    /// Map onto the gateway's runtime configuration
    pub fn gateway_config(&self) -> GatewayConfig {
        GatewayConfig {
            organization_id: self.ingest.organization_id,
            max_payload_bytes: self.ingest.max_payload_bytes,
            default_pattern: self.extraction.default_pattern.clone(),
        }
    }
}

fn parse_level(level: &str) -> Result<Level, ConfigError> {
    match level.to_lowercase().as_str() {
        "error" => Ok(Level::ERROR),
        "warn" => Ok(Level::WARN),
        "info" => Ok(Level::INFO),
        "debug" => Ok(Level::DEBUG),
        "trace" => Ok(Level::TRACE),
        other => Err(ConfigError::Validation(format!(
            "unknown log level: {}",
            other
        ))),
    }
}

/// Install the global tracing subscriber from configuration.
///
/// Call once at process start; verbosity lives here instead of in a
/// module-wide mutable variable.
pub fn init_tracing(log: &LogConfig) -> Result<(), ConfigError> {
    let level = parse_level(&log.level)?;
    let subscriber = tracing_subscriber::FmtSubscriber::builder()
        .with_max_level(level)
        .with_target(false)
        .with_thread_ids(true)
        .compact()
        .finish();
    tracing::subscriber::set_global_default(subscriber)
        .map_err(|e| ConfigError::Validation(e.to_string()))
}
