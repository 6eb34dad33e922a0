//! The host application, as seen from the controller.

use crate::payload::Payload;
use crate::{CrashError, Result};

/// Metadata and presentation access supplied by the host.
pub trait HostEnvironment: Send + Sync {
    /// Dotted package identifier, e.g. `com.example.app`. Always the first
    /// highlight key.
    fn package_id(&self) -> &str;

    /// Display label for the application.
    fn application_label(&self) -> Result<String>;

    /// Version string, e.g. `1.4.2 (57)`. Failing here fails controller setup.
    fn version(&self) -> Result<String>;

    /// Look up a string resource by id (dialog messages given by resource id).
    fn resolve_string(&self, id: &str) -> Option<String> {
        let _ = id;
        None
    }

    /// True when a controller is already active for this process, in which
    /// case installation is skipped.
    fn controller_running(&self) -> bool {
        false
    }

    /// Hand a payload to the matching presentation surface. Fire-and-forget:
    /// returning `Ok` means the surface was launched, not that it finished.
    fn launch(&self, payload: Payload) -> Result<()>;
}

/// Last dot-separated segment of a package id
pub fn fallback_label(package_id: &str) -> String {
    package_id
        .rsplit('.')
        .find(|segment| !segment.is_empty())
        .unwrap_or(package_id)
        .to_string()
}

/// The host's label, or the package-id fallback when the lookup fails
pub(crate) fn resolve_label(host: &dyn HostEnvironment) -> String {
    match host.application_label() {
        Ok(label) if !label.trim().is_empty() => label,
        Ok(_) | Err(_) => fallback_label(host.package_id()),
    }
}

pub(crate) fn resolve_version(host: &dyn HostEnvironment) -> Result<String> {
    let version = host.version()?;
    if version.trim().is_empty() {
        return Err(CrashError::Metadata(format!(
            "empty version for {}",
            host.package_id()
        )));
    }
    Ok(version)
}
