//! Structured logging utilities for crashgate components.
//!
//! Provides consistent logging with component prefixes and structured fields.
//!
//! # Usage
//!
//! ```ignore
//! use crashgate_config::log_controller_warn;
//!
//! log_controller_warn!(
//!     "Presentation failed",
//!     error = tracing::field::display(&err)
//! );
//! ```

use std::str::FromStr;

/// Component identifiers for log filtering
pub struct Component;

impl Component {
    pub const CONTROLLER: &'static str = "CONTROLLER";
    pub const SURFACE: &'static str = "SURFACE";
    pub const CLI: &'static str = "CLI";
}

/// Log levels for runtime configuration
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum LogLevel {
    Error,
    Warn,
    Info,
    Debug,
    Trace,
}

impl LogLevel {
    fn as_filter(self) -> &'static str {
        match self {
            LogLevel::Error => "error",
            LogLevel::Warn => "warn",
            LogLevel::Info => "info",
            LogLevel::Debug => "debug",
            LogLevel::Trace => "trace",
        }
    }
}

impl FromStr for LogLevel {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim().to_ascii_lowercase().as_str() {
            "error" => Ok(LogLevel::Error),
            "warn" | "warning" => Ok(LogLevel::Warn),
            "info" => Ok(LogLevel::Info),
            "debug" => Ok(LogLevel::Debug),
            "trace" => Ok(LogLevel::Trace),
            other => Err(format!("unknown log level: {other}")),
        }
    }
}

// === CONTROLLER logging macros ===

#[macro_export]
macro_rules! log_controller_error {
    ($msg:literal $(, $key:ident = $value:expr)* $(,)?) => {
        tracing::error!(component = $crate::logging::Component::CONTROLLER, $($key = $value,)* $msg)
    };
}

#[macro_export]
macro_rules! log_controller_warn {
    ($msg:literal $(, $key:ident = $value:expr)* $(,)?) => {
        tracing::warn!(component = $crate::logging::Component::CONTROLLER, $($key = $value,)* $msg)
    };
}

#[macro_export]
macro_rules! log_controller_info {
    ($msg:literal $(, $key:ident = $value:expr)* $(,)?) => {
        tracing::info!(component = $crate::logging::Component::CONTROLLER, $($key = $value,)* $msg)
    };
}

#[macro_export]
macro_rules! log_controller_debug {
    ($msg:literal $(, $key:ident = $value:expr)* $(,)?) => {
        tracing::debug!(component = $crate::logging::Component::CONTROLLER, $($key = $value,)* $msg)
    };
}

// === SURFACE logging macros ===

#[macro_export]
macro_rules! log_surface_warn {
    ($msg:literal $(, $key:ident = $value:expr)* $(,)?) => {
        tracing::warn!(component = $crate::logging::Component::SURFACE, $($key = $value,)* $msg)
    };
}

#[macro_export]
macro_rules! log_surface_debug {
    ($msg:literal $(, $key:ident = $value:expr)* $(,)?) => {
        tracing::debug!(component = $crate::logging::Component::SURFACE, $($key = $value,)* $msg)
    };
}

// === CLI logging macros ===

#[macro_export]
macro_rules! log_cli_info {
    ($msg:literal $(, $key:ident = $value:expr)* $(,)?) => {
        tracing::info!(component = $crate::logging::Component::CLI, $($key = $value,)* $msg)
    };
}

#[macro_export]
macro_rules! log_cli_debug {
    ($msg:literal $(, $key:ident = $value:expr)* $(,)?) => {
        tracing::debug!(component = $crate::logging::Component::CLI, $($key = $value,)* $msg)
    };
}

/// Initialize logging with the given level filter.
/// `CRASHGATE_LOG` wins over `RUST_LOG`, which wins over `level`.
/// Call this once at application startup.
pub fn init_logging(level: LogLevel) {
    use tracing_subscriber::EnvFilter;

    let env_filter = EnvFilter::try_from_env("CRASHGATE_LOG")
        .or_else(|_| EnvFilter::try_from_default_env())
        .unwrap_or_else(|_| EnvFilter::new(level.as_filter()));

    tracing_subscriber::fmt()
        .with_env_filter(env_filter)
        .with_writer(std::io::stderr)
        .with_target(false)
        .init();
}
