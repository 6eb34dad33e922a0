use std::fmt;
use std::str::FromStr;

use serde::{Deserialize, Serialize};

use crate::CrashError;

/// Which presentation surface a crash is routed to
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "kebab-case")]
pub enum PresentationMode {
    /// Full crash log with highlighted lines
    #[default]
    LogPage,
    /// Short message offering a URL (e.g. a patched build)
    DialogUrl,
}

impl PresentationMode {
    pub fn as_str(self) -> &'static str {
        match self {
            PresentationMode::LogPage => "log-page",
            PresentationMode::DialogUrl => "dialog-url",
        }
    }
}

impl fmt::Display for PresentationMode {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for PresentationMode {
    type Err = CrashError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim().to_ascii_lowercase().replace('_', "-").as_str() {
            "log-page" | "log" => Ok(PresentationMode::LogPage),
            "dialog-url" | "dialog" => Ok(PresentationMode::DialogUrl),
            other => Err(CrashError::InvalidConfig(format!(
                "unknown presentation mode: {other}"
            ))),
        }
    }
}
