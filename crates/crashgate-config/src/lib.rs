//! # crashgate-config
//!
//! Configuration management for crashgate.
//!
//! Loads configuration from:
//! 1. `~/.crashgate/config.toml` (global)
//! 2. `.crashgate/config.toml` (project-local, overrides global key by key)
//! 3. Environment variables (highest priority)

use once_cell::sync::Lazy;
use serde::{Deserialize, Serialize};
use std::path::{Path, PathBuf};
use std::sync::{PoisonError, RwLock};
use tracing::debug;

pub mod logging;
pub mod testing;

/// Project-local config path, relative to the working directory
pub const PROJECT_CONFIG_PATH: &str = ".crashgate/config.toml";

/// Set in the environment of viewer processes spawned by a command surface
pub const VIEWER_ENV: &str = "CRASHGATE_VIEWER_PROCESS";

/// Global config instance
static CONFIG: Lazy<RwLock<Config>> = Lazy::new(|| RwLock::new(Config::load().unwrap_or_default()));

/// Get global config (read-only)
pub fn config() -> std::sync::RwLockReadGuard<'static, Config> {
    CONFIG.read().unwrap_or_else(PoisonError::into_inner)
}

/// Reload config from disk
pub fn reload() -> Result<(), ConfigError> {
    let new_config = Config::load()?;
    *CONFIG.write().unwrap_or_else(PoisonError::into_inner) = new_config;
    Ok(())
}

#[derive(Debug, thiserror::Error)]
pub enum ConfigError {
    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),
    #[error("TOML parse error: {0}")]
    Toml(#[from] toml::de::Error),
    #[error("TOML render error: {0}")]
    TomlRender(#[from] toml::ser::Error),
}

/// Main configuration structure
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct Config {
    pub controller: ControllerConfig,
    pub dialog: DialogConfig,
    pub presentation: PresentationConfig,
    pub termination: TerminationConfig,
    pub logging: LoggingConfig,
}

impl Config {
    /// Load config from standard locations
    pub fn load() -> Result<Self, ConfigError> {
        Self::load_with(
            Self::global_config_path().as_deref(),
            Path::new(PROJECT_CONFIG_PATH),
        )
    }

    /// Load config from an explicit global/project pair, then apply env overrides.
    /// Missing files are skipped.
    pub fn load_with(global: Option<&Path>, project: &Path) -> Result<Self, ConfigError> {
        let mut merged = toml::Table::new();

        if let Some(global_path) = global {
            if global_path.exists() {
                debug!("Loading global config from {:?}", global_path);
                merge_tables(&mut merged, Self::read_table(global_path)?);
            }
        }

        if project.exists() {
            debug!("Loading project config from {:?}", project);
            merge_tables(&mut merged, Self::read_table(project)?);
        }

        let mut config: Config = toml::Value::Table(merged).try_into()?;
        config.apply_env_overrides();

        Ok(config)
    }

    /// Load a single file with env overrides applied, ignoring the standard locations
    pub fn load_from(path: &Path) -> Result<Self, ConfigError> {
        let mut config = Self::read(path)?;
        config.apply_env_overrides();
        Ok(config)
    }

    fn read(path: &Path) -> Result<Self, ConfigError> {
        let contents = std::fs::read_to_string(path)?;
        Ok(toml::from_str(&contents)?)
    }

    fn read_table(path: &Path) -> Result<toml::Table, ConfigError> {
        let contents = std::fs::read_to_string(path)?;
        Ok(toml::from_str(&contents)?)
    }

    /// Global config path: ~/.crashgate/config.toml
    pub fn global_config_path() -> Option<PathBuf> {
        dirs::home_dir().map(|h| h.join(".crashgate/config.toml"))
    }

    /// Apply environment variable overrides
    fn apply_env_overrides(&mut self) {
        if let Ok(mode) = std::env::var("CRASHGATE_MODE") {
            self.controller.mode = mode;
        }
        if let Ok(pass) = std::env::var("CRASHGATE_PASS_TO_PRIOR") {
            if let Some(flag) = parse_flag(&pass) {
                self.controller.pass_to_prior = flag;
            }
        }
        if let Ok(viewer) = std::env::var("CRASHGATE_VIEWER") {
            self.presentation.viewer = viewer.split_whitespace().map(String::from).collect();
        }
        if let Ok(strategy) = std::env::var("CRASHGATE_TERMINATION") {
            self.termination.strategy = strategy;
        }
    }

    /// Generate default config TOML string
    pub fn default_toml() -> Result<String, ConfigError> {
        Ok(toml::to_string_pretty(&Config::default())?)
    }
}

/// Overlay `overlay` onto `base`. Nested tables merge key by key; any other
/// value, arrays included, replaces what was there.
fn merge_tables(base: &mut toml::Table, overlay: toml::Table) {
    for (key, value) in overlay {
        match value {
            toml::Value::Table(nested) => match base.get_mut(&key) {
                Some(toml::Value::Table(existing)) => merge_tables(existing, nested),
                _ => {
                    base.insert(key, toml::Value::Table(nested));
                }
            },
            value => {
                base.insert(key, value);
            }
        }
    }
}

fn parse_flag(value: &str) -> Option<bool> {
    match value.trim().to_ascii_lowercase().as_str() {
        "1" | "true" | "yes" | "on" => Some(true),
        "0" | "false" | "no" | "off" => Some(false),
        _ => None,
    }
}

/// Crash controller behavior
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct ControllerConfig {
    /// Presentation mode: log-page or dialog-url
    pub mode: String,
    /// Chain to the previously installed panic hook after presenting
    pub pass_to_prior: bool,
    /// Chain to the previously installed panic hook unconditionally
    pub force_pass_to_prior: bool,
    /// Extra highlight keys, appended after the package id
    pub highlight_keys: Vec<String>,
}

impl Default for ControllerConfig {
    fn default() -> Self {
        Self {
            mode: "log-page".to_string(),
            pass_to_prior: false,
            force_pass_to_prior: false,
            highlight_keys: Vec::new(),
        }
    }
}

/// Dialog shown in dialog-url mode
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct DialogConfig {
    pub title: Option<String>,
    /// Literal message text
    pub message: Option<String>,
    /// Message resource id, resolved through the host. Ignored when `message` is set.
    pub message_resource: Option<String>,
    /// URL the dialog offers to open
    pub url: Option<String>,
}

/// Presentation surface selection
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct PresentationConfig {
    /// External viewer command. Empty means render to stderr.
    pub viewer: Vec<String>,
}

/// How the process image is ended
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct TerminationConfig {
    /// kill (SIGKILL self) or abort
    pub strategy: String,
}

impl Default for TerminationConfig {
    fn default() -> Self {
        Self {
            strategy: "kill".to_string(),
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct LoggingConfig {
    pub level: String,
}

impl Default for LoggingConfig {
    fn default() -> Self {
        Self {
            level: "warn".to_string(),
        }
    }
}
