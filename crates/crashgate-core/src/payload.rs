//! Payloads handed to presentation surfaces.

use std::fs::File;
use std::io::{BufReader, BufWriter, Write};
use std::path::Path;

use serde::{Deserialize, Serialize};

use crate::mode::PresentationMode;
use crate::Result;

/// Everything a log page needs to render a crash
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct LogPagePayload {
    /// Substrings that mark a line worth emphasizing. The package id comes first.
    pub highlight_keys: Vec<String>,
    pub application_name: String,
    /// `raw_trace` split into lines, each trimmed
    pub crash_log_lines: Vec<String>,
    pub raw_trace: String,
    #[serde(default)]
    pub version: String,
}

/// A short notice that points the user at a URL
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct DialogPayload {
    pub application_name: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub title: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub message: Option<String>,
    pub url: String,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "kind", rename_all = "snake_case")]
pub enum Payload {
    LogPage(LogPagePayload),
    DialogUrl(DialogPayload),
}

impl Payload {
    pub fn mode(&self) -> PresentationMode {
        match self {
            Payload::LogPage(_) => PresentationMode::LogPage,
            Payload::DialogUrl(_) => PresentationMode::DialogUrl,
        }
    }

    pub fn application_name(&self) -> &str {
        match self {
            Payload::LogPage(p) => &p.application_name,
            Payload::DialogUrl(p) => &p.application_name,
        }
    }

    /// Load a payload from a JSON file
    pub fn load<P: AsRef<Path>>(path: P) -> Result<Self> {
        let file = File::open(path)?;
        let payload = serde_json::from_reader(BufReader::new(file))?;
        Ok(payload)
    }

    /// Save the payload to a JSON file
    pub fn save<P: AsRef<Path>>(&self, path: P) -> Result<()> {
        let mut writer = BufWriter::new(File::create(path)?);
        serde_json::to_writer_pretty(&mut writer, self)?;
        writer.flush()?;
        Ok(())
    }
}

/// Split a trace on line breaks and trim each line, so indentation from
/// nested frames does not get in the way of highlight matching. Trailing
/// empty segments are dropped, however many line breaks end the trace.
pub fn trim_trace_lines(raw: &str) -> Vec<String> {
    let mut segments: Vec<&str> = raw.split('\n').collect();
    while segments.last().is_some_and(|segment| segment.is_empty()) {
        segments.pop();
    }
    segments
        .into_iter()
        .map(|line| line.trim().to_string())
        .collect()
}
