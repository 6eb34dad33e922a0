//! Registration with the process-wide panic hook.

use std::panic::{self, PanicHookInfo};
use std::ptr;
use std::sync::atomic::{AtomicPtr, AtomicUsize, Ordering};
use std::sync::Arc;

use crate::controller::CrashController;
use crate::fault::Fault;

/// Anything a fault can be forwarded to: the hook the controller replaced,
/// a host's own chain, or the controller itself.
pub trait FaultHandler: Send + Sync {
    fn handle_fault(&self, fault: &Fault<'_>);
}

/// Hook type returned by `std::panic::take_hook`
pub type StdHook = Box<dyn Fn(&PanicHookInfo<'_>) + Sync + Send + 'static>;

/// A std panic hook captured as a chainable handler
pub struct StdHookHandler {
    hook: StdHook,
}

impl StdHookHandler {
    pub fn new(hook: StdHook) -> Self {
        Self { hook }
    }
}

impl FaultHandler for StdHookHandler {
    fn handle_fault(&self, fault: &Fault<'_>) {
        match fault.panic_info() {
            Some(info) => (self.hook)(info),
            // A std hook can only consume real hook info
            None => eprint!("{}", fault.raw_trace()),
        }
    }
}

/// Where the controller registers itself as the default fault handler.
pub trait HookRegistry {
    /// Whether `controller` is already the registered default handler
    fn is_current(&self, controller: &Arc<CrashController>) -> bool;

    /// Take whatever handler is currently registered
    fn capture_previous(&self) -> Option<Arc<dyn FaultHandler>>;

    /// Make `controller` the default handler
    fn install(&self, controller: Arc<CrashController>);
}

/// Last controller installed through [`StdPanicRegistry`]. Compared, never dereferenced.
static CURRENT: AtomicPtr<CrashController> = AtomicPtr::new(ptr::null_mut());

/// Address of the boxed hook that [`StdPanicRegistry`] last installed
static INSTALLED_HOOK: AtomicUsize = AtomicUsize::new(0);

fn hook_addr(hook: &StdHook) -> usize {
    let data: *const _ = &**hook;
    data.cast::<()>() as usize
}

/// Registry backed by `std::panic::{take_hook, set_hook}`.
///
/// Must not be used from a panicking thread, since `take_hook` panics there.
pub struct StdPanicRegistry;

impl HookRegistry for StdPanicRegistry {
    /// True only while the std hook is still the one installed for
    /// `controller`. A later `set_hook` by anyone else makes this false.
    fn is_current(&self, controller: &Arc<CrashController>) -> bool {
        if !ptr::eq(CURRENT.load(Ordering::Acquire), Arc::as_ptr(controller)) {
            return false;
        }
        // Peek at the registered hook and put it straight back
        let hook = panic::take_hook();
        let current = hook_addr(&hook) == INSTALLED_HOOK.load(Ordering::Acquire);
        panic::set_hook(hook);
        current
    }

    fn capture_previous(&self) -> Option<Arc<dyn FaultHandler>> {
        Some(Arc::new(StdHookHandler::new(panic::take_hook())))
    }

    fn install(&self, controller: Arc<CrashController>) {
        CURRENT.store(Arc::as_ptr(&controller).cast_mut(), Ordering::Release);
        let hook: StdHook = Box::new(move |info| controller.handle_panic(info));
        INSTALLED_HOOK.store(hook_addr(&hook), Ordering::Release);
        panic::set_hook(hook);
    }
}
