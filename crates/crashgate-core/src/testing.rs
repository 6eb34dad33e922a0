//! Recording doubles for the controller's seams.
//!
//! None of these end the process, so tests can drive the full handling
//! protocol and then inspect what each collaborator saw.
//!
//! # Usage
//!
//! ```ignore
//! use crashgate_core::testing::{CountingTerminator, RecordingHost};
//!
//! let host = Arc::new(RecordingHost::new("com.example.app"));
//! let terminator = Arc::new(CountingTerminator::new());
//! let controller = CrashController::builder(host.clone())
//!     .terminator(terminator.clone())
//!     .build()?;
//! controller.handle(&Fault::new("boom"));
//! assert_eq!(host.launches().len(), 1);
//! assert_eq!(terminator.count(), 1);
//! ```

use std::collections::HashMap;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::{Arc, Mutex, MutexGuard, PoisonError};

use crate::controller::CrashController;
use crate::fault::Fault;
use crate::host::HostEnvironment;
use crate::interceptor::{Interceptor, Verdict};
use crate::payload::Payload;
use crate::platform::{FaultHandler, HookRegistry};
use crate::terminate::Terminator;
use crate::{CrashError, Result};

fn lock<T>(mutex: &Mutex<T>) -> MutexGuard<'_, T> {
    mutex.lock().unwrap_or_else(PoisonError::into_inner)
}

/// How [`RecordingHost::launch`] should misbehave
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub enum LaunchFailure {
    #[default]
    None,
    /// Return `CrashError::Surface`
    Error,
    /// Panic inside launch
    Panic,
}

/// Host double that records every launched payload
pub struct RecordingHost {
    package_id: String,
    label: Option<String>,
    version: Option<String>,
    resources: HashMap<String, String>,
    running: bool,
    failure: LaunchFailure,
    launches: Mutex<Vec<Payload>>,
}

impl RecordingHost {
    pub fn new(package_id: impl Into<String>) -> Self {
        Self {
            package_id: package_id.into(),
            label: None,
            version: Some("1.0.0 (1)".to_string()),
            resources: HashMap::new(),
            running: false,
            failure: LaunchFailure::None,
            launches: Mutex::new(Vec::new()),
        }
    }

    pub fn with_label(mut self, label: impl Into<String>) -> Self {
        self.label = Some(label.into());
        self
    }

    pub fn without_version(mut self) -> Self {
        self.version = None;
        self
    }

    pub fn with_resource(mut self, id: impl Into<String>, text: impl Into<String>) -> Self {
        self.resources.insert(id.into(), text.into());
        self
    }

    /// Report a controller as already running
    pub fn running(mut self) -> Self {
        self.running = true;
        self
    }

    pub fn failing(mut self, failure: LaunchFailure) -> Self {
        self.failure = failure;
        self
    }

    pub fn launches(&self) -> Vec<Payload> {
        lock(&self.launches).clone()
    }
}

impl HostEnvironment for RecordingHost {
    fn package_id(&self) -> &str {
        &self.package_id
    }

    fn application_label(&self) -> Result<String> {
        self.label
            .clone()
            .ok_or_else(|| CrashError::Metadata("no application label".to_string()))
    }

    fn version(&self) -> Result<String> {
        self.version
            .clone()
            .ok_or_else(|| CrashError::Metadata(format!("no package info for {}", self.package_id)))
    }

    fn resolve_string(&self, id: &str) -> Option<String> {
        self.resources.get(id).cloned()
    }

    fn controller_running(&self) -> bool {
        self.running
    }

    fn launch(&self, payload: Payload) -> Result<()> {
        match self.failure {
            LaunchFailure::None => {
                lock(&self.launches).push(payload);
                Ok(())
            }
            LaunchFailure::Error => Err(CrashError::Surface("surface unavailable".to_string())),
            LaunchFailure::Panic => panic!("surface exploded"),
        }
    }
}

/// Terminator double that counts calls and returns
#[derive(Debug, Default)]
pub struct CountingTerminator {
    calls: AtomicUsize,
}

impl CountingTerminator {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn count(&self) -> usize {
        self.calls.load(Ordering::SeqCst)
    }
}

impl Terminator for CountingTerminator {
    fn terminate(&self) {
        self.calls.fetch_add(1, Ordering::SeqCst);
    }
}

/// Prior-handler double that records the messages it was given
#[derive(Debug, Default)]
pub struct RecordingHandler {
    messages: Mutex<Vec<String>>,
}

impl RecordingHandler {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn count(&self) -> usize {
        lock(&self.messages).len()
    }

    pub fn messages(&self) -> Vec<String> {
        lock(&self.messages).clone()
    }
}

impl FaultHandler for RecordingHandler {
    fn handle_fault(&self, fault: &Fault<'_>) {
        lock(&self.messages).push(fault.message().to_string());
    }
}

/// Interceptor double with fixed verdicts
#[derive(Debug, Default)]
pub struct ScriptedInterceptor {
    before: Verdict,
    after: Verdict,
    panic_before: bool,
    before_calls: AtomicUsize,
    after_calls: Mutex<Vec<bool>>,
}

impl ScriptedInterceptor {
    pub fn new(before: Verdict, after: Verdict) -> Self {
        Self {
            before,
            after,
            ..Self::default()
        }
    }

    /// An interceptor whose before hook panics
    pub fn panicking() -> Self {
        Self {
            panic_before: true,
            ..Self::default()
        }
    }

    pub fn before_calls(&self) -> usize {
        self.before_calls.load(Ordering::SeqCst)
    }

    /// The `presented` flag of every after-hook call
    pub fn after_calls(&self) -> Vec<bool> {
        lock(&self.after_calls).clone()
    }
}

impl Interceptor for ScriptedInterceptor {
    fn on_before(&self, _fault: &Fault<'_>) -> Verdict {
        self.before_calls.fetch_add(1, Ordering::SeqCst);
        if self.panic_before {
            panic!("interceptor failed");
        }
        self.before
    }

    fn on_after(&self, _fault: &Fault<'_>, presented: bool) -> Verdict {
        lock(&self.after_calls).push(presented);
        self.after
    }
}

/// In-memory registry standing in for the std panic hook
#[derive(Default)]
pub struct FakeRegistry {
    previous: Mutex<Option<Arc<dyn FaultHandler>>>,
    current: Mutex<Option<Arc<CrashController>>>,
    installs: AtomicUsize,
}

impl FakeRegistry {
    pub fn new() -> Self {
        Self::default()
    }

    /// A registry that starts out with `handler` registered
    pub fn with_previous(handler: Arc<dyn FaultHandler>) -> Self {
        Self {
            previous: Mutex::new(Some(handler)),
            ..Self::default()
        }
    }

    pub fn installs(&self) -> usize {
        self.installs.load(Ordering::SeqCst)
    }

    pub fn current(&self) -> Option<Arc<CrashController>> {
        lock(&self.current).clone()
    }

    /// Simulate another party registering `handler` over the current one
    pub fn displace(&self, handler: Arc<dyn FaultHandler>) {
        *lock(&self.current) = None;
        *lock(&self.previous) = Some(handler);
    }
}

impl HookRegistry for FakeRegistry {
    fn is_current(&self, controller: &Arc<CrashController>) -> bool {
        lock(&self.current)
            .as_ref()
            .is_some_and(|current| Arc::ptr_eq(current, controller))
    }

    fn capture_previous(&self) -> Option<Arc<dyn FaultHandler>> {
        lock(&self.previous).take()
    }

    fn install(&self, controller: Arc<CrashController>) {
        self.installs.fetch_add(1, Ordering::SeqCst);
        *lock(&self.current) = Some(controller);
    }
}
