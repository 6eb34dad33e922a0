//! # crashgate-core
//!
//! Process-wide panic interception.
//!
//! A [`CrashController`] installs itself as the std panic hook, lets the first
//! panic on any thread through a single-fire latch, runs the host's
//! [`Interceptor`] around its own handling, hands a [`Payload`] to a
//! presentation surface, optionally chains to the hook it replaced, and then
//! kills the process image.
//!
//! ```ignore
//! let host = Arc::new(ProcessHost::from_config("my_app", "1.2.0 (42)", &config));
//! let controller = CrashController::builder(host)
//!     .apply_config(&config)
//!     .highlight_keys(["worker"])
//!     .build_global()?;
//! controller.install(&StdPanicRegistry)?;
//! ```

use thiserror::Error;

pub mod controller;
pub mod fault;
pub mod host;
pub mod interceptor;
pub mod mode;
pub mod payload;
pub mod platform;
pub mod surface;
pub mod terminate;
pub mod testing;

pub use controller::{
    CrashController, CrashControllerBuilder, DialogMessage, HandlingReport, Installed,
};
pub use fault::Fault;
pub use host::HostEnvironment;
pub use interceptor::{FnInterceptor, Interceptor, Verdict};
pub use mode::PresentationMode;
pub use payload::{trim_trace_lines, DialogPayload, LogPagePayload, Payload};
pub use platform::{FaultHandler, HookRegistry, StdPanicRegistry};
pub use surface::{CommandSurface, PresentationSurface, ProcessHost, TerminalSurface};
pub use terminate::{ProcessTerminator, TerminationStrategy, Terminator};

#[derive(Error, Debug)]
pub enum CrashError {
    /// Package or version metadata could not be read from the host
    #[error("host metadata unavailable: {0}")]
    Metadata(String),

    #[error("invalid configuration: {0}")]
    InvalidConfig(String),

    #[error("a global crash controller is already initialized")]
    AlreadyInitialized,

    #[error("presentation surface failed: {0}")]
    Surface(String),

    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),

    #[error("JSON error: {0}")]
    Json(#[from] serde_json::Error),
}

pub type Result<T> = std::result::Result<T, CrashError>;
