//! TOML Configuration File Support
//!
//! Configuration for the runtime and the HTTP edge, read from
//! `$XDG_CONFIG_HOME/spool/spool.toml` (typically `~/.config/spool/spool.toml`).
//!
//! # Configuration Priority
//!
//! Values are resolved with the following priority (highest first):
//! 1. CLI arguments, applied by the caller through [`ConfigOverrides`]
//! 2. Environment variables (`SPOOL_LISTEN`, `SPOOL_STATIC_DIR`, `SPOOL_ACTION_PARAM`)
//! 3. TOML configuration file
//! 4. Default values
//!
//! # Example Configuration
//!
//! ```toml
//! [server]
//! listen = "0.0.0.0:8080"
//! static_dir = "public"
//!
//! [render]
//! action_param = "_action"
//! doctype = true
//! ```

use std::net::SocketAddr;
use std::path::PathBuf;

use serde::{Deserialize, Serialize};
use thiserror::Error;

use crate::actions::DEFAULT_ACTION_PARAM;
use crate::response::RenderOptions;

/// Default listen address
pub const DEFAULT_LISTEN: &str = "127.0.0.1:3000";

/// Default directory for static files
pub const DEFAULT_STATIC_DIR: &str = "public";

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

/// Where the configuration was last changed from
#[derive(Clone, Copy, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub enum ConfigSource {
    /// Command-line argument
    Cli,
    /// Environment variable
    Env,
    /// TOML configuration file
    File,
    /// Built-in default
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
// TOML Structures
// =============================================================================

/// `[server]` section
#[derive(Clone, Debug, Default, Serialize, Deserialize)]
#[serde(default)]
pub struct ServerToml {
    /// Socket address to bind
    pub listen: Option<String>,
    /// Directory served for paths that match no page
    pub static_dir: Option<String>,
}

/// `[render]` section
#[derive(Clone, Debug, Default, Serialize, Deserialize)]
#[serde(default)]
pub struct RenderToml {
    /// Query parameter that selects a server action
    pub action_param: Option<String>,
    /// Emit `<!DOCTYPE html>` before HTML bodies
    pub doctype: Option<bool>,
}

/// Root of `spool.toml`
#[derive(Clone, Debug, Default, Serialize, Deserialize)]
#[serde(default)]
pub struct SpoolToml {
    /// Server settings
    pub server: ServerToml,
    /// Render settings
    pub render: RenderToml,
}

// =============================================================================
// Resolved Configuration
// =============================================================================

/// Fully resolved configuration
#[derive(Clone, Debug)]
pub struct SpoolConfig {
    /// Socket address to bind
    pub listen: SocketAddr,
    /// Directory served for paths that match no page
    pub static_dir: PathBuf,
    /// Query parameter that selects a server action
    pub action_param: String,
    /// Emit `<!DOCTYPE html>` before HTML bodies
    pub doctype: bool,
    /// Path of the file that was loaded, if any
    pub config_file_path: Option<PathBuf>,
    source: ConfigSource,
}

impl Default for SpoolConfig {
    fn default() -> Self {
        Self {
            listen: SocketAddr::from(([127, 0, 0, 1], 3000)),
            static_dir: PathBuf::from(DEFAULT_STATIC_DIR),
            action_param: DEFAULT_ACTION_PARAM.to_string(),
            doctype: true,
            config_file_path: None,
            source: ConfigSource::Default,
        }
    }
}

impl SpoolConfig {
    /// Configuration with default values
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Where the configuration was last changed from
    #[must_use]
    pub fn source(&self) -> ConfigSource {
        self.source
    }

    /// Set the configuration source
    pub fn set_source(&mut self, source: ConfigSource) {
        self.source = source;
    }

    /// Options handed to the response driver
    #[must_use]
    pub fn render_options(&self) -> RenderOptions {
        RenderOptions {
            doctype: self.doctype,
        }
    }

    /// Check cross-field constraints
    ///
    /// # Errors
    ///
    /// Returns [`ConfigError::ValidationError`] for an unusable action parameter.
    pub fn validate(&self) -> Result<(), ConfigError> {
        if self.action_param.is_empty()
            || !self
                .action_param
                .chars()
                .all(|c| c.is_ascii_alphanumeric() || c == '_' || c == '-')
        {
            return Err(ConfigError::ValidationError(format!(
                "action_param {:?} must match [A-Za-z0-9_-]+",
                self.action_param
            )));
        }
        Ok(())
    }
}

// =============================================================================
// Configuration Loading
// =============================================================================

/// Default configuration file path
///
/// Returns `$XDG_CONFIG_HOME/spool/spool.toml` or `~/.config/spool/spool.toml`.
#[must_use]
pub fn default_config_path() -> Option<PathBuf> {
    dirs::config_dir().map(|p| p.join("spool").join("spool.toml"))
}

/// Load configuration from a file, then the environment
///
/// Pass [`default_config_path`] for the XDG location.
///
/// # Errors
///
/// Returns an error if the config file exists but cannot be read, parsed,
/// or validated. A missing file is not an error.
pub fn load_config_from_path(path: Option<PathBuf>) -> Result<SpoolConfig, ConfigError> {
    load_config_with_env(path, |name| std::env::var(name).ok())
}

/// Load configuration reading environment variables through `env`
///
/// # Errors
///
/// Returns an error if the file cannot be read, parsed, or validated.
pub fn load_config_with_env<E>(path: Option<PathBuf>, env: E) -> Result<SpoolConfig, ConfigError>
where
    E: Fn(&str) -> Option<String>,
{
    let mut config = SpoolConfig::default();

    if let Some(ref config_path) = path {
        if config_path.exists() {
            let toml_content =
                std::fs::read_to_string(config_path).map_err(|e| ConfigError::ReadError {
                    path: config_path.clone(),
                    source: e,
                })?;

            let toml_config: SpoolToml = toml::from_str(&toml_content)?;
            apply_toml_config(&mut config, &toml_config)?;
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

    apply_env_config(&mut config, env)?;
    config.validate()?;
    Ok(config)
}

fn parse_listen(value: &str) -> Result<SocketAddr, ConfigError> {
    value
        .parse()
        .map_err(|_| ConfigError::ValidationError(format!("invalid listen address {value:?}")))
}

fn apply_toml_config(config: &mut SpoolConfig, toml: &SpoolToml) -> Result<(), ConfigError> {
    if let Some(ref listen) = toml.server.listen {
        config.listen = parse_listen(listen)?;
    }
    if let Some(ref dir) = toml.server.static_dir {
        config.static_dir = PathBuf::from(dir);
    }
    if let Some(ref param) = toml.render.action_param {
        config.action_param = param.clone();
    }
    if let Some(doctype) = toml.render.doctype {
        config.doctype = doctype;
    }
    Ok(())
}

fn apply_env_config<E>(config: &mut SpoolConfig, env: E) -> Result<(), ConfigError>
where
    E: Fn(&str) -> Option<String>,
{
    if let Some(listen) = env("SPOOL_LISTEN") {
        config.listen = parse_listen(&listen)?;
        config.source = ConfigSource::Env;
    }
    if let Some(dir) = env("SPOOL_STATIC_DIR") {
        config.static_dir = PathBuf::from(dir);
        config.source = ConfigSource::Env;
    }
    if let Some(param) = env("SPOOL_ACTION_PARAM") {
        config.action_param = param;
        config.source = ConfigSource::Env;
    }
    Ok(())
}

// =============================================================================
// CLI Override Support
// =============================================================================

/// Command-line overrides applied after [`load_config_from_path`]
#[derive(Clone, Debug, Default)]
pub struct ConfigOverrides {
    /// Listen address override
    pub listen: Option<SocketAddr>,
    /// Static directory override
    pub static_dir: Option<PathBuf>,
    /// Action parameter override
    pub action_param: Option<String>,
}

impl ConfigOverrides {
    /// Empty set of overrides
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Set listen address override
    #[must_use]
    pub fn with_listen(mut self, listen: SocketAddr) -> Self {
        self.listen = Some(listen);
        self
    }

    /// Set static directory override
    #[must_use]
    pub fn with_static_dir(mut self, dir: PathBuf) -> Self {
        self.static_dir = Some(dir);
        self
    }

    /// Set action parameter override
    #[must_use]
    pub fn with_action_param(mut self, param: String) -> Self {
        self.action_param = Some(param);
        self
    }

    /// Apply overrides to a configuration
    ///
    /// # Errors
    ///
    /// Returns a validation error if the result is unusable.
    pub fn apply(&self, config: &mut SpoolConfig) -> Result<(), ConfigError> {
        if self.listen.is_some() || self.static_dir.is_some() || self.action_param.is_some() {
            config.source = ConfigSource::Cli;
        }
        if let Some(listen) = self.listen {
            config.listen = listen;
        }
        if let Some(ref dir) = self.static_dir {
            config.static_dir = dir.clone();
        }
        if let Some(ref param) = self.action_param {
            config.action_param = param.clone();
        }
        config.validate()
    }
}
