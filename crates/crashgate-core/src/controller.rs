//! The crash controller: single-fire latch, interceptor protocol, mode
//! dispatch, chaining and termination.

use std::panic::{catch_unwind, AssertUnwindSafe, PanicHookInfo};
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::{Arc, Mutex, MutexGuard, OnceLock, PoisonError};
use std::thread;

use crashgate_config::{
    log_controller_debug, log_controller_error, log_controller_info, log_controller_warn, Config,
};

use crate::fault::Fault;
use crate::host::{self, HostEnvironment};
use crate::interceptor::{Interceptor, Verdict};
use crate::mode::PresentationMode;
use crate::payload::{trim_trace_lines, DialogPayload, LogPagePayload, Payload};
use crate::platform::{FaultHandler, HookRegistry};
use crate::terminate::{ProcessTerminator, TerminationStrategy, Terminator};
use crate::{CrashError, Result};

/// The process-wide controller slot filled by [`CrashControllerBuilder::build_global`]
static GLOBAL: OnceLock<Arc<CrashController>> = OnceLock::new();

/// Name of the thread that runs interceptor and presentation calls
const HELPER_THREAD: &str = "crashgate-handler";

fn lock<T>(mutex: &Mutex<T>) -> MutexGuard<'_, T> {
    mutex.lock().unwrap_or_else(PoisonError::into_inner)
}

/// Outcome of [`CrashController::install`]
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Installed {
    /// Became the default handler; any previous handler was captured. Also
    /// returned when a controller that was displaced by another hook
    /// reinstalls itself, in which case that hook becomes the prior handler.
    Installed,
    /// This controller is still the default handler
    AlreadyCurrent,
    /// The host reported a running controller; nothing was touched
    Skipped,
}

/// What happened while handling the one fault that got through the latch.
/// Only observable when the terminator returns, i.e. under test.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct HandlingReport {
    pub before: Verdict,
    /// `None` when the before hook claimed the fault
    pub presented: Option<bool>,
    pub after: Option<Verdict>,
    pub chained: bool,
}

/// Dialog message, either literal text or a host resource id
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum DialogMessage {
    Literal(String),
    Resource(String),
}

impl DialogMessage {
    pub fn literal(text: impl Into<String>) -> Self {
        DialogMessage::Literal(text.into())
    }

    pub fn resource(id: impl Into<String>) -> Self {
        DialogMessage::Resource(id.into())
    }
}

#[derive(Debug, Clone, Default)]
struct DialogSettings {
    title: Option<String>,
    message: Option<String>,
    url: Option<String>,
}

pub struct CrashController {
    host: Arc<dyn HostEnvironment>,
    interceptor: Option<Arc<dyn Interceptor>>,
    terminator: Arc<dyn Terminator>,
    prior: Mutex<Option<Arc<dyn FaultHandler>>>,
    /// Set once `install` has registered this controller
    installed: AtomicBool,
    crashing: AtomicBool,
    pass_to_prior: bool,
    force_pass_to_prior: bool,
    mode: PresentationMode,
    highlight_keys: Vec<String>,
    application_label: String,
    version: String,
    dialog: DialogSettings,
}

impl CrashController {
    pub fn builder(host: Arc<dyn HostEnvironment>) -> CrashControllerBuilder {
        CrashControllerBuilder::new(host)
    }

    /// The controller created by `build_global`, if any
    pub fn global() -> Option<Arc<CrashController>> {
        GLOBAL.get().cloned()
    }

    /// Register as the default fault handler, capturing the one it replaces.
    pub fn install(self: &Arc<Self>, registry: &dyn HookRegistry) -> Result<Installed> {
        if self.host.controller_running() {
            log_controller_info!("Controller already running, skipping install");
            return Ok(Installed::Skipped);
        }

        // Held across the check and the swap so racing installs serialize
        let mut prior = lock(&self.prior);
        if registry.is_current(self) {
            return Ok(Installed::AlreadyCurrent);
        }
        let displaced = self.installed.load(Ordering::Acquire);
        if prior.is_some() && !displaced {
            return Err(CrashError::InvalidConfig(
                "a prior handler is already set; compose with handler() instead".to_string(),
            ));
        }

        *prior = registry.capture_previous();
        registry.install(Arc::clone(self));
        self.installed.store(true, Ordering::Release);

        log_controller_info!(
            "Installed crash controller",
            package = self.package_id(),
            mode = self.mode.as_str(),
            chains = prior.is_some(),
            reinstalled = displaced
        );
        Ok(Installed::Installed)
    }

    /// The controller as a handler object, for hosts composing their own chain.
    /// Leaves the global hook untouched.
    pub fn handler(self: &Arc<Self>) -> Arc<dyn FaultHandler> {
        Arc::clone(self) as Arc<dyn FaultHandler>
    }

    /// Entry point for the std panic hook
    pub fn handle_panic(&self, info: &PanicHookInfo<'_>) {
        // Skip the backtrace capture for faults the latch will drop anyway
        if self.crashing.load(Ordering::Acquire) {
            return;
        }
        let fault = Fault::from_panic(info);
        self.handle(&fault);
    }

    /// Run the handling protocol for `fault`.
    ///
    /// Returns `None` without side effects if another fault already got
    /// through. Otherwise terminates; the report is only returned when the
    /// terminator returns.
    pub fn handle(&self, fault: &Fault<'_>) -> Option<HandlingReport> {
        if self.crashing.swap(true, Ordering::SeqCst) {
            log_controller_debug!(
                "Dropping fault raised after the first",
                thread = fault.thread_name()
            );
            return None;
        }

        log_controller_error!(
            "Unhandled fault",
            thread = fault.thread_name(),
            message = fault.message(),
            location = fault.location().unwrap_or("<unknown>")
        );

        let mut report = HandlingReport {
            before: self.ask(fault, |i, fault| i.on_before(fault)),
            presented: None,
            after: None,
            chained: false,
        };

        if report.before != Verdict::StopAll {
            let presented = self.present(fault);
            report.presented = Some(presented);

            let after = self.ask(fault, move |i, fault| i.on_after(fault, presented));
            report.after = Some(after);

            if !report.before.blocks_chaining()
                && !after.blocks_chaining()
                && self.should_chain(presented)
            {
                report.chained = self.chain(fault);
            }
        }

        self.terminator.terminate();
        Some(report)
    }

    pub fn is_crashing(&self) -> bool {
        self.crashing.load(Ordering::Acquire)
    }

    pub fn mode(&self) -> PresentationMode {
        self.mode
    }

    /// Package id first, then host-supplied keys in the order given
    pub fn highlight_keys(&self) -> &[String] {
        &self.highlight_keys
    }

    pub fn package_id(&self) -> &str {
        self.host.package_id()
    }

    pub fn application_label(&self) -> &str {
        &self.application_label
    }

    pub fn version(&self) -> &str {
        &self.version
    }

    pub fn has_prior(&self) -> bool {
        lock(&self.prior).is_some()
    }

    /// Payload for the configured mode
    pub fn build_payload(&self, fault: &Fault<'_>) -> Result<Payload> {
        match self.mode {
            PresentationMode::LogPage => {
                let raw_trace = fault.raw_trace();
                Ok(Payload::LogPage(LogPagePayload {
                    highlight_keys: self.highlight_keys.clone(),
                    application_name: self.application_label.clone(),
                    crash_log_lines: trim_trace_lines(&raw_trace),
                    raw_trace,
                    version: self.version.clone(),
                }))
            }
            PresentationMode::DialogUrl => {
                let url = self.dialog.url.clone().ok_or_else(|| {
                    CrashError::InvalidConfig("dialog-url mode without a URL".to_string())
                })?;
                Ok(Payload::DialogUrl(DialogPayload {
                    application_name: self.application_label.clone(),
                    title: self.dialog.title.clone(),
                    message: self.dialog.message.clone(),
                    url,
                }))
            }
        }
    }

    /// Run `call` on a helper thread and wait for it. A panic there unwinds
    /// normally even while this thread is inside the panic hook, where a
    /// second panic would abort the process. `None` if `call` panicked.
    fn isolated<T, F>(&self, fault: &Fault<'_>, call: F) -> Option<T>
    where
        T: Send,
        F: FnOnce(&Fault<'_>) -> T + Send,
    {
        let detached = fault.detach();
        let mut call = Some(call);

        let spawned = thread::scope(|scope| {
            thread::Builder::new()
                .name(HELPER_THREAD.to_string())
                .spawn_scoped(scope, || call.take().map(|call| call(&detached.attach())))
                .map(|handle| handle.join())
        });

        match spawned {
            Ok(Ok(outcome)) => outcome,
            Ok(Err(_)) => None,
            Err(e) => {
                log_controller_warn!(
                    "No helper thread, running inline",
                    error = tracing::field::display(&e)
                );
                let call = call.take()?;
                catch_unwind(AssertUnwindSafe(|| call(fault))).ok()
            }
        }
    }

    fn ask<F>(&self, fault: &Fault<'_>, call: F) -> Verdict
    where
        F: FnOnce(&dyn Interceptor, &Fault<'_>) -> Verdict + Send,
    {
        let Some(interceptor) = &self.interceptor else {
            return Verdict::Continue;
        };
        self.isolated(fault, |fault| call(interceptor.as_ref(), fault))
            .unwrap_or_else(|| {
                log_controller_warn!("Interceptor panicked, continuing");
                Verdict::Continue
            })
    }

    /// Build and launch the payload. Errors and panics both count as failure.
    fn present(&self, fault: &Fault<'_>) -> bool {
        let attempt = self.isolated(fault, |fault| -> Result<()> {
            let payload = self.build_payload(fault)?;
            self.host.launch(payload)
        });
        match attempt {
            Some(Ok(())) => true,
            Some(Err(e)) => {
                log_controller_warn!(
                    "Presentation failed",
                    mode = self.mode.as_str(),
                    error = tracing::field::display(&e)
                );
                false
            }
            None => {
                log_controller_warn!("Presentation panicked", mode = self.mode.as_str());
                false
            }
        }
    }

    fn should_chain(&self, presented: bool) -> bool {
        self.pass_to_prior || self.force_pass_to_prior || !presented
    }

    /// Runs on the faulting thread, since a std hook needs the original
    /// hook info.
    fn chain(&self, fault: &Fault<'_>) -> bool {
        let Some(prior) = lock(&self.prior).clone() else {
            return false;
        };
        if catch_unwind(AssertUnwindSafe(|| prior.handle_fault(fault))).is_err() {
            log_controller_warn!("Prior handler panicked");
        }
        true
    }
}

impl FaultHandler for CrashController {
    fn handle_fault(&self, fault: &Fault<'_>) {
        self.handle(fault);
    }
}

/// Collects controller settings; everything is validated in [`build`](Self::build).
pub struct CrashControllerBuilder {
    host: Arc<dyn HostEnvironment>,
    interceptor: Option<Arc<dyn Interceptor>>,
    terminator: Option<Arc<dyn Terminator>>,
    prior: Option<Arc<dyn FaultHandler>>,
    pass_to_prior: bool,
    force_pass_to_prior: bool,
    mode: PresentationMode,
    mode_name: Option<String>,
    termination: TerminationStrategy,
    termination_name: Option<String>,
    extra_keys: Vec<String>,
    dialog_title: Option<String>,
    dialog_message: Option<DialogMessage>,
    dialog_url: Option<String>,
}

impl CrashControllerBuilder {
    pub fn new(host: Arc<dyn HostEnvironment>) -> Self {
        Self {
            host,
            interceptor: None,
            terminator: None,
            prior: None,
            pass_to_prior: false,
            force_pass_to_prior: false,
            mode: PresentationMode::default(),
            mode_name: None,
            termination: TerminationStrategy::default(),
            termination_name: None,
            extra_keys: Vec::new(),
            dialog_title: None,
            dialog_message: None,
            dialog_url: None,
        }
    }

    /// Take controller, dialog and termination settings from a loaded config.
    /// Setters called afterwards win.
    pub fn apply_config(mut self, config: &Config) -> Self {
        self.mode_name = Some(config.controller.mode.clone());
        self.pass_to_prior = config.controller.pass_to_prior;
        self.force_pass_to_prior = config.controller.force_pass_to_prior;
        self.extra_keys
            .extend(config.controller.highlight_keys.iter().cloned());
        self.termination_name = Some(config.termination.strategy.clone());

        if let Some(title) = &config.dialog.title {
            self.dialog_title = Some(title.clone());
        }
        match (&config.dialog.message, &config.dialog.message_resource) {
            (Some(text), _) => self.dialog_message = Some(DialogMessage::literal(text.clone())),
            (None, Some(id)) => self.dialog_message = Some(DialogMessage::resource(id.clone())),
            (None, None) => {}
        }
        if let Some(url) = &config.dialog.url {
            self.dialog_url = Some(url.clone());
        }
        self
    }

    pub fn pass_to_prior(mut self, pass: bool) -> Self {
        self.pass_to_prior = pass;
        self
    }

    pub fn force_pass_to_prior(mut self, force: bool) -> Self {
        self.force_pass_to_prior = force;
        self
    }

    pub fn interceptor(mut self, interceptor: Arc<dyn Interceptor>) -> Self {
        self.interceptor = Some(interceptor);
        self
    }

    pub fn mode(mut self, mode: PresentationMode) -> Self {
        self.mode = mode;
        self.mode_name = None;
        self
    }

    pub fn termination(mut self, strategy: TerminationStrategy) -> Self {
        self.termination = strategy;
        self.termination_name = None;
        self
    }

    /// Replace the process terminator, e.g. with a recording double
    pub fn terminator(mut self, terminator: Arc<dyn Terminator>) -> Self {
        self.terminator = Some(terminator);
        self
    }

    /// Chain to `handler` instead of capturing one at install time
    pub fn with_prior(mut self, handler: Arc<dyn FaultHandler>) -> Self {
        self.prior = Some(handler);
        self
    }

    pub fn dialog_title(mut self, title: impl Into<String>) -> Self {
        self.dialog_title = Some(title.into());
        self
    }

    pub fn dialog_message(mut self, message: DialogMessage) -> Self {
        self.dialog_message = Some(message);
        self
    }

    pub fn dialog_url(mut self, url: impl Into<String>) -> Self {
        self.dialog_url = Some(url.into());
        self
    }

    /// Append highlight keys after the package id. Duplicates are kept.
    pub fn highlight_keys<I, S>(mut self, keys: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        self.extra_keys.extend(keys.into_iter().map(Into::into));
        self
    }

    /// Validate and construct an unregistered controller.
    pub fn build(self) -> Result<Arc<CrashController>> {
        let host = self.host;

        let version = host::resolve_version(host.as_ref())?;
        let application_label = host::resolve_label(host.as_ref());

        let mode = match &self.mode_name {
            Some(name) => name.parse()?,
            None => self.mode,
        };
        let termination = match &self.termination_name {
            Some(name) => name.parse()?,
            None => self.termination,
        };

        let message = match self.dialog_message {
            Some(DialogMessage::Literal(text)) => Some(text),
            Some(DialogMessage::Resource(id)) => {
                Some(host.resolve_string(&id).ok_or_else(|| {
                    CrashError::InvalidConfig(format!("unknown dialog message resource: {id}"))
                })?)
            }
            None => None,
        };
        if mode == PresentationMode::DialogUrl && self.dialog_url.is_none() {
            return Err(CrashError::InvalidConfig(
                "dialog-url mode requires a dialog URL".to_string(),
            ));
        }

        let mut highlight_keys = Vec::with_capacity(self.extra_keys.len() + 1);
        highlight_keys.push(host.package_id().to_string());
        highlight_keys.extend(self.extra_keys);

        let terminator = self
            .terminator
            .unwrap_or_else(|| Arc::new(ProcessTerminator::new(termination)));

        Ok(Arc::new(CrashController {
            host,
            interceptor: self.interceptor,
            terminator,
            prior: Mutex::new(self.prior),
            installed: AtomicBool::new(false),
            crashing: AtomicBool::new(false),
            pass_to_prior: self.pass_to_prior,
            force_pass_to_prior: self.force_pass_to_prior,
            mode,
            highlight_keys,
            application_label,
            version,
            dialog: DialogSettings {
                title: self.dialog_title,
                message,
                url: self.dialog_url,
            },
        }))
    }

    /// Like [`build`](Self::build), but also claims the process-wide slot.
    /// A second call in the same process fails with `AlreadyInitialized`.
    pub fn build_global(self) -> Result<Arc<CrashController>> {
        if GLOBAL.get().is_some() {
            return Err(CrashError::AlreadyInitialized);
        }
        let controller = self.build()?;
        GLOBAL
            .set(Arc::clone(&controller))
            .map_err(|_| CrashError::AlreadyInitialized)?;
        Ok(controller)
    }
}
