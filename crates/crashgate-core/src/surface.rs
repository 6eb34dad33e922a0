//! Stock presentation surfaces and the host that drives them.

use std::collections::HashMap;
use std::io::{self, Write};
use std::path::PathBuf;
use std::process::{Command, Stdio};

use crashgate_config::{log_surface_debug, log_surface_warn, Config, VIEWER_ENV};

use crate::host::HostEnvironment;
use crate::payload::Payload;
use crate::{CrashError, Result};

/// Something that can show a payload to a person
pub trait PresentationSurface: Send + Sync {
    fn present(&self, payload: &Payload) -> Result<()>;
}

/// Marker placed in front of highlighted log lines
const HIGHLIGHT: &str = ">>";

/// Renders payloads as plain text on stderr
#[derive(Debug, Clone, Copy, Default)]
pub struct TerminalSurface;

impl TerminalSurface {
    /// Write a human-readable rendering of `payload` to `out`.
    pub fn render(payload: &Payload, out: &mut dyn Write) -> io::Result<()> {
        match payload {
            Payload::LogPage(page) => {
                if page.version.is_empty() {
                    writeln!(out, "==== {} crashed ====", page.application_name)?;
                } else {
                    writeln!(
                        out,
                        "==== {} {} crashed ====",
                        page.application_name, page.version
                    )?;
                }
                for line in &page.crash_log_lines {
                    let highlighted = page
                        .highlight_keys
                        .iter()
                        .any(|key| !key.is_empty() && line.contains(key.as_str()));
                    if highlighted {
                        writeln!(out, "{HIGHLIGHT} {line}")?;
                    } else {
                        writeln!(out, "   {line}")?;
                    }
                }
            }
            Payload::DialogUrl(dialog) => {
                let title = dialog
                    .title
                    .as_deref()
                    .unwrap_or(dialog.application_name.as_str());
                writeln!(out, "==== {title} ====")?;
                if let Some(message) = &dialog.message {
                    writeln!(out, "{message}")?;
                }
                writeln!(out, "Open: {}", dialog.url)?;
            }
        }
        out.flush()
    }
}

impl PresentationSurface for TerminalSurface {
    fn present(&self, payload: &Payload) -> Result<()> {
        let stderr = io::stderr();
        let mut lock = stderr.lock();
        Self::render(payload, &mut lock)?;
        Ok(())
    }
}

/// Writes the payload to a JSON file and spawns an external viewer with the
/// file path as its last argument. The viewer is not waited on.
#[derive(Debug, Clone)]
pub struct CommandSurface {
    program: String,
    args: Vec<String>,
    payload_dir: Option<PathBuf>,
}

impl CommandSurface {
    pub fn new(program: impl Into<String>) -> Self {
        Self {
            program: program.into(),
            args: Vec::new(),
            payload_dir: None,
        }
    }

    /// Build from an argv-style command line; `None` if it is empty
    pub fn from_argv(argv: &[String]) -> Option<Self> {
        let (program, args) = argv.split_first()?;
        Some(Self::new(program.clone()).args(args.iter().cloned()))
    }

    pub fn args<I, S>(mut self, args: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        self.args.extend(args.into_iter().map(Into::into));
        self
    }

    /// Directory for payload files; the system temp dir otherwise
    pub fn payload_dir(mut self, dir: impl Into<PathBuf>) -> Self {
        self.payload_dir = Some(dir.into());
        self
    }

    fn write_payload(&self, payload: &Payload) -> Result<PathBuf> {
        let mut builder = tempfile::Builder::new();
        builder.prefix("crashgate-").suffix(".json");
        let file = match &self.payload_dir {
            Some(dir) => builder.tempfile_in(dir)?,
            None => builder.tempfile()?,
        };
        // The viewer outlives this process, so the file must too
        let (_, path) = file.keep().map_err(|e| e.error)?;
        payload.save(&path)?;
        Ok(path)
    }
}

impl PresentationSurface for CommandSurface {
    fn present(&self, payload: &Payload) -> Result<()> {
        let path = self.write_payload(payload)?;
        let child = Command::new(&self.program)
            .args(&self.args)
            .arg(&path)
            .env(VIEWER_ENV, "1")
            .stdin(Stdio::null())
            .spawn()
            .map_err(|e| CrashError::Surface(format!("failed to spawn {}: {e}", self.program)))?;

        log_surface_debug!(
            "Spawned crash viewer",
            pid = child.id(),
            payload = tracing::field::display(path.display())
        );
        Ok(())
    }
}

/// [`HostEnvironment`] for an ordinary process: metadata given up front and
/// one surface for every payload.
pub struct ProcessHost {
    package_id: String,
    label: Option<String>,
    version: String,
    resources: HashMap<String, String>,
    surface: Box<dyn PresentationSurface>,
}

impl ProcessHost {
    pub fn new(package_id: impl Into<String>, version: impl Into<String>) -> Self {
        Self {
            package_id: package_id.into(),
            label: None,
            version: version.into(),
            resources: HashMap::new(),
            surface: Box::new(TerminalSurface),
        }
    }

    /// Terminal surface unless the config names a viewer command
    pub fn from_config(
        package_id: impl Into<String>,
        version: impl Into<String>,
        config: &Config,
    ) -> Self {
        let host = Self::new(package_id, version);
        match CommandSurface::from_argv(&config.presentation.viewer) {
            Some(surface) => host.with_surface(surface),
            None => host,
        }
    }

    pub fn with_label(mut self, label: impl Into<String>) -> Self {
        self.label = Some(label.into());
        self
    }

    pub fn with_resource(mut self, id: impl Into<String>, text: impl Into<String>) -> Self {
        self.resources.insert(id.into(), text.into());
        self
    }

    pub fn with_surface(mut self, surface: impl PresentationSurface + 'static) -> Self {
        self.surface = Box::new(surface);
        self
    }
}

impl HostEnvironment for ProcessHost {
    fn package_id(&self) -> &str {
        &self.package_id
    }

    fn application_label(&self) -> Result<String> {
        self.label
            .clone()
            .ok_or_else(|| CrashError::Metadata("no display label configured".to_string()))
    }

    fn version(&self) -> Result<String> {
        if self.version.is_empty() {
            return Err(CrashError::Metadata(format!(
                "no version for {}",
                self.package_id
            )));
        }
        Ok(self.version.clone())
    }

    fn resolve_string(&self, id: &str) -> Option<String> {
        self.resources.get(id).cloned()
    }

    /// Viewers spawned by [`CommandSurface`] must not install a controller
    fn controller_running(&self) -> bool {
        std::env::var_os(VIEWER_ENV).is_some()
    }

    fn launch(&self, payload: Payload) -> Result<()> {
        self.surface.present(&payload).inspect_err(|e| {
            log_surface_warn!("Surface failed", error = tracing::field::display(e));
        })
    }
}
