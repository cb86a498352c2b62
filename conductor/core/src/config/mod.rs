//! TOML Configuration File Support
//!
//! Centralized configuration loading for the chat front end, supporting a
//! TOML configuration file at `~/.config/neura/conductor.toml`.
//!
//! # Configuration Priority
//!
//! Configuration values are loaded with the following priority (highest first):
//! 1. CLI arguments (applied by the caller through [`ConfigOverrides`])
//! 2. Environment variables
//! 3. TOML configuration file
//! 4. Default values
//!
//! # Example Configuration
//!
//! ```toml
//! [transport]
//! base_url = "https://openrouter.ai/api/v1"
//! api_key_env = "OPENROUTER_API_KEY"
//! connect_timeout_secs = 10
//!
//! [model]
//! default = "Neura Code"
//! temperature = 0.4
//! max_tokens = 4096
//!
//! [stream]
//! event_prefix = "data:"
//! done_sentinel = "[DONE]"
//! delta_paths = ["/choices/0/delta/content", "/delta"]
//!
//! [conversation]
//! error_text = "**Error**: Sorry, I encountered an error. Please try again."
//! max_context_messages = 0
//! ```

use std::path::PathBuf;
use std::time::Duration;

use serde::{Deserialize, Serialize};
use thiserror::Error;

use crate::backend::{resolve_model, TransportSettings};
use crate::conductor::ConductorConfig;

/// Environment variable holding the API key unless configured otherwise
pub const DEFAULT_API_KEY_ENV: &str = "OPENROUTER_API_KEY";

// =============================================================================
// Error Types
// =============================================================================

/// Errors that can occur when loading configuration
#[derive(Debug, Error)]
pub enum ConfigError {
    /// Failed to read config file
    #[error("Failed to read config file at {path}: {source}")]
    ReadError {
        /// The path that was attempted
        path: PathBuf,
        /// The underlying IO error
        source: std::io::Error,
    },

    /// Failed to parse TOML
    #[error("Failed to parse TOML config: {0}")]
    ParseError(#[from] toml::de::Error),

    /// Invalid configuration value
    #[error("Invalid configuration: {0}")]
    ValidationError(String),
}

// =============================================================================
// Configuration Source Tracking
// =============================================================================

/// Tracks where a configuration value came from
#[derive(Clone, Copy, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub enum ConfigSource {
    /// Value from command-line argument
    Cli,
    /// Value from environment variable
    Env,
    /// Value from TOML configuration file
    File,
    /// Default value
    Default,
}

impl std::fmt::Display for ConfigSource {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::Cli => write!(f, "CLI"),
            Self::Env => write!(f, "environment"),
            Self::File => write!(f, "config file"),
            Self::Default => write!(f, "default"),
        }
    }
}

// =============================================================================
// TOML Configuration Structures
// =============================================================================

/// Transport section of the TOML configuration
#[derive(Clone, Debug, Default, Serialize, Deserialize)]
#[serde(default)]
pub struct TransportToml {
    /// API base URL
    pub base_url: Option<String>,

    /// API key (prefer `api_key_env`)
    pub api_key: Option<String>,

    /// Name of the environment variable holding the API key
    pub api_key_env: Option<String>,

    /// Connection timeout in seconds
    pub connect_timeout_secs: Option<u64>,
}

/// Model section of the TOML configuration
#[derive(Clone, Debug, Default, Serialize, Deserialize)]
#[serde(default)]
pub struct ModelToml {
    /// Model identifier or catalog display name
    pub default: Option<String>,

    /// Sampling temperature
    pub temperature: Option<f32>,

    /// Maximum tokens per reply
    pub max_tokens: Option<u32>,
}

/// Stream framing section of the TOML configuration
#[derive(Clone, Debug, Default, Serialize, Deserialize)]
#[serde(default)]
pub struct StreamToml {
    /// Prefix of payload lines
    pub event_prefix: Option<String>,

    /// Payload ending the stream
    pub done_sentinel: Option<String>,

    /// JSON pointers to the incremental text
    pub delta_paths: Option<Vec<String>>,
}

/// Conversation section of the TOML configuration
#[derive(Clone, Debug, Default, Serialize, Deserialize)]
#[serde(default)]
pub struct ConversationToml {
    /// Text of the message replacing a failed reply
    pub error_text: Option<String>,

    /// Prior messages sent as context (0 = all)
    pub max_context_messages: Option<usize>,
}

/// Top-level TOML configuration structure
#[derive(Clone, Debug, Default, Serialize, Deserialize)]
#[serde(default)]
pub struct NeuraToml {
    /// Transport configuration section
    pub transport: TransportToml,

    /// Model configuration section
    pub model: ModelToml,

    /// Stream framing configuration section
    pub stream: StreamToml,

    /// Conversation configuration section
    pub conversation: ConversationToml,
}

// =============================================================================
// Main Configuration Struct
// =============================================================================

/// Resolved configuration for one chat session
///
/// Use [`load_config`] to load configuration with proper priority handling.
#[derive(Clone, Debug)]
pub struct NeuraConfig {
    /// Transport connection settings
    pub transport: TransportSettings,

    /// Environment variable the API key was looked up in
    pub api_key_env: String,

    /// Conductor settings
    pub conductor: ConductorConfig,

    /// Path to the config file that was loaded (if any)
    pub config_file_path: Option<PathBuf>,

    /// Source of configuration values
    source: ConfigSource,
}

impl Default for NeuraConfig {
    fn default() -> Self {
        Self {
            transport: TransportSettings::default(),
            api_key_env: DEFAULT_API_KEY_ENV.to_string(),
            conductor: ConductorConfig::default(),
            config_file_path: None,
            source: ConfigSource::Default,
        }
    }
}

impl NeuraConfig {
    /// Create a new configuration with default values
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Get the primary source of this configuration
    #[must_use]
    pub fn source(&self) -> ConfigSource {
        self.source
    }

    /// Set the configuration source
    pub fn set_source(&mut self, source: ConfigSource) {
        self.source = source;
    }

    /// Check that the values can drive a session
    ///
    /// # Errors
    ///
    /// Returns [`ConfigError::ValidationError`] naming the first bad value.
    pub fn validate(&self) -> Result<(), ConfigError> {
        let conductor = &self.conductor;
        let invalid = |msg: String| -> Result<(), ConfigError> {
            Err(ConfigError::ValidationError(msg))
        };

        if conductor.model.trim().is_empty() {
            return invalid("model must not be empty".to_string());
        }
        if !(0.0..=2.0).contains(&conductor.temperature) {
            return invalid(format!(
                "temperature {} is outside 0.0..=2.0",
                conductor.temperature
            ));
        }
        if conductor.max_tokens == 0 {
            return invalid("max_tokens must be positive".to_string());
        }
        if conductor.error_text.trim().is_empty() {
            return invalid("error_text must not be empty".to_string());
        }

        let stream = &conductor.extractor;
        if stream.event_prefix.is_empty() {
            return invalid("event_prefix must not be empty".to_string());
        }
        if stream.done_sentinel.is_empty() {
            return invalid("done_sentinel must not be empty".to_string());
        }
        if stream.delta_paths.is_empty() {
            return invalid("delta_paths must name at least one JSON pointer".to_string());
        }
        if let Some(path) = stream.delta_paths.iter().find(|p| !p.starts_with('/')) {
            return invalid(format!("delta path {path:?} is not a JSON pointer"));
        }

        if !self.transport.base_url.starts_with("http://")
            && !self.transport.base_url.starts_with("https://")
        {
            return invalid(format!(
                "base_url {:?} must be an http(s) URL",
                self.transport.base_url
            ));
        }

        Ok(())
    }
}

// =============================================================================
// Configuration Loading
// =============================================================================

/// Get the default configuration file path
///
/// Returns `$XDG_CONFIG_HOME/neura/conductor.toml` or
/// `~/.config/neura/conductor.toml` if `XDG_CONFIG_HOME` is not set.
#[must_use]
pub fn default_config_path() -> Option<PathBuf> {
    dirs::config_dir().map(|p| p.join("neura").join("conductor.toml"))
}

/// Load configuration from all sources with proper priority
///
/// # Errors
///
/// Returns an error if the config file exists but cannot be parsed.
/// A missing config file is not an error (defaults are used).
pub fn load_config() -> Result<NeuraConfig, ConfigError> {
    load_config_from_path(default_config_path())
}

/// Load configuration from a specific path and the process environment
///
/// # Errors
///
/// Returns an error if the specified config file cannot be read or parsed.
pub fn load_config_from_path(path: Option<PathBuf>) -> Result<NeuraConfig, ConfigError> {
    load_config_with_env(path, |key| std::env::var(key).ok())
}

/// Load configuration, reading environment variables through `env`
///
/// # Errors
///
/// Returns an error if the specified config file cannot be read or parsed.
pub fn load_config_with_env<F>(path: Option<PathBuf>, env: F) -> Result<NeuraConfig, ConfigError>
where
    F: Fn(&str) -> Option<String>,
{
    // Start with defaults
    let mut config = NeuraConfig::default();

    // Try to load from file
    if let Some(ref config_path) = path {
        if config_path.exists() {
            let toml_content =
                std::fs::read_to_string(config_path).map_err(|e| ConfigError::ReadError {
                    path: config_path.clone(),
                    source: e,
                })?;

            let toml_config: NeuraToml = toml::from_str(&toml_content)?;
            apply_toml_config(&mut config, &toml_config);
            config.config_file_path = Some(config_path.clone());
            config.source = ConfigSource::File;

            tracing::info!(
                path = %config_path.display(),
                "Loaded configuration from file"
            );
        } else {
            tracing::debug!(
                path = %config_path.display(),
                "Config file not found, using defaults"
            );
        }
    }

    // Apply environment variables (overrides file values)
    apply_env_config(&mut config, env);

    config.validate()?;
    Ok(config)
}

/// Apply TOML configuration values to the config struct
fn apply_toml_config(config: &mut NeuraConfig, toml: &NeuraToml) {
    // Transport settings
    if let Some(ref url) = toml.transport.base_url {
        config.transport.base_url = url.clone();
    }
    if toml.transport.api_key.is_some() {
        config.transport.api_key = toml.transport.api_key.clone();
    }
    if let Some(ref name) = toml.transport.api_key_env {
        config.api_key_env = name.clone();
    }
    if let Some(secs) = toml.transport.connect_timeout_secs {
        config.transport.connect_timeout = Duration::from_secs(secs);
    }

    // Model settings
    if let Some(ref model) = toml.model.default {
        config.conductor.model = resolve_model(model);
    }
    if let Some(temperature) = toml.model.temperature {
        config.conductor.temperature = temperature;
    }
    if let Some(max_tokens) = toml.model.max_tokens {
        config.conductor.max_tokens = max_tokens;
    }

    // Stream framing
    let extractor = &mut config.conductor.extractor;
    if let Some(ref prefix) = toml.stream.event_prefix {
        extractor.event_prefix = prefix.clone();
    }
    if let Some(ref sentinel) = toml.stream.done_sentinel {
        extractor.done_sentinel = sentinel.clone();
    }
    if let Some(ref paths) = toml.stream.delta_paths {
        extractor.delta_paths = paths.clone();
    }

    // Conversation settings
    if let Some(ref text) = toml.conversation.error_text {
        config.conductor.error_text = text.clone();
    }
    if let Some(max) = toml.conversation.max_context_messages {
        config.conductor.max_context_messages = max;
    }
}

/// Apply environment variable overrides to the config
fn apply_env_config<F>(config: &mut NeuraConfig, env: F)
where
    F: Fn(&str) -> Option<String>,
{
    if let Some(key) = env(&config.api_key_env).filter(|k| !k.trim().is_empty()) {
        config.transport.api_key = Some(key.trim().to_string());
        config.source = ConfigSource::Env;
    }
    if let Some(url) = env("NEURA_BASE_URL") {
        config.transport.base_url = url;
        config.source = ConfigSource::Env;
    }
    if let Some(timeout) = env("NEURA_CONNECT_TIMEOUT_SECS") {
        if let Ok(secs) = timeout.parse::<u64>() {
            config.transport.connect_timeout = Duration::from_secs(secs);
            config.source = ConfigSource::Env;
        }
    }

    if let Some(model) = env("NEURA_MODEL") {
        config.conductor.model = resolve_model(&model);
        config.source = ConfigSource::Env;
    }
    if let Some(temperature) = env("NEURA_TEMPERATURE") {
        if let Ok(t) = temperature.parse::<f32>() {
            config.conductor.temperature = t;
            config.source = ConfigSource::Env;
        }
    }
    if let Some(max_tokens) = env("NEURA_MAX_TOKENS") {
        if let Ok(n) = max_tokens.parse::<u32>() {
            config.conductor.max_tokens = n;
            config.source = ConfigSource::Env;
        }
    }
    if let Some(max) = env("NEURA_MAX_CONTEXT") {
        if let Ok(n) = max.parse::<usize>() {
            config.conductor.max_context_messages = n;
            config.source = ConfigSource::Env;
        }
    }
    if let Some(text) = env("NEURA_ERROR_TEXT") {
        config.conductor.error_text = text;
        config.source = ConfigSource::Env;
    }
}

// =============================================================================
// CLI Override Support
// =============================================================================

/// Builder for applying CLI overrides to configuration
///
/// Use this after [`load_config`] to apply command-line argument overrides.
#[derive(Clone, Debug, Default)]
pub struct ConfigOverrides {
    /// Model override (identifier or display name)
    pub model: Option<String>,

    /// API key override
    pub api_key: Option<String>,

    /// Base URL override
    pub base_url: Option<String>,

    /// Temperature override
    pub temperature: Option<f32>,

    /// Max tokens override
    pub max_tokens: Option<u32>,
}

impl ConfigOverrides {
    /// Create a new empty set of overrides
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Set model override
    #[must_use]
    pub fn with_model(mut self, model: String) -> Self {
        self.model = Some(model);
        self
    }

    /// Set API key override
    #[must_use]
    pub fn with_api_key(mut self, key: String) -> Self {
        self.api_key = Some(key);
        self
    }

    /// Set base URL override
    #[must_use]
    pub fn with_base_url(mut self, url: String) -> Self {
        self.base_url = Some(url);
        self
    }

    /// Set temperature override
    #[must_use]
    pub fn with_temperature(mut self, temperature: f32) -> Self {
        self.temperature = Some(temperature);
        self
    }

    /// Set max tokens override
    #[must_use]
    pub fn with_max_tokens(mut self, max_tokens: u32) -> Self {
        self.max_tokens = Some(max_tokens);
        self
    }

    /// Whether any override is set
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.model.is_none()
            && self.api_key.is_none()
            && self.base_url.is_none()
            && self.temperature.is_none()
            && self.max_tokens.is_none()
    }

    /// Apply overrides to a configuration
    pub fn apply(&self, config: &mut NeuraConfig) {
        if !self.is_empty() {
            config.source = ConfigSource::Cli;
        }

        if let Some(ref model) = self.model {
            config.conductor.model = resolve_model(model);
        }
        if let Some(ref key) = self.api_key {
            config.transport.api_key = Some(key.clone());
        }
        if let Some(ref url) = self.base_url {
            config.transport.base_url = url.clone();
        }
        if let Some(temperature) = self.temperature {
            config.conductor.temperature = temperature;
        }
        if let Some(max_tokens) = self.max_tokens {
            config.conductor.max_tokens = max_tokens;
        }
    }
}

// =============================================================================
// Tests
// =============================================================================
