//! Ending the process image once a fault has been handled.

use std::fmt;
use std::str::FromStr;

use crate::CrashError;

/// The terminal action of the controller. Production implementations never
/// return; test doubles record the call and return.
pub trait Terminator: Send + Sync {
    fn terminate(&self);
}

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub enum TerminationStrategy {
    /// SIGKILL the current process, falling back to abort
    #[default]
    Kill,
    /// `std::process::abort`, which lets a core dump be written
    Abort,
}

impl fmt::Display for TerminationStrategy {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            TerminationStrategy::Kill => f.write_str("kill"),
            TerminationStrategy::Abort => f.write_str("abort"),
        }
    }
}

impl FromStr for TerminationStrategy {
    type Err = CrashError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim().to_ascii_lowercase().as_str() {
            "kill" => Ok(TerminationStrategy::Kill),
            "abort" => Ok(TerminationStrategy::Abort),
            other => Err(CrashError::InvalidConfig(format!(
                "unknown termination strategy: {other}"
            ))),
        }
    }
}

/// Kills the process image directly. Exit handlers, destructors and
/// unwinding never run.
#[derive(Debug, Clone, Copy, Default)]
pub struct ProcessTerminator {
    strategy: TerminationStrategy,
}

impl ProcessTerminator {
    pub fn new(strategy: TerminationStrategy) -> Self {
        Self { strategy }
    }

    pub fn strategy(&self) -> TerminationStrategy {
        self.strategy
    }
}

impl Terminator for ProcessTerminator {
    fn terminate(&self) {
        if self.strategy == TerminationStrategy::Kill {
            #[cfg(unix)]
            {
                use nix::sys::signal::{kill, Signal};
                use nix::unistd::Pid;
                let _ = kill(Pid::this(), Signal::SIGKILL);
            }
        }
        // SIGKILL delivery is asynchronous; never fall through to the caller
        std::process::abort();
    }
}
