//! The record of a single intercepted panic.

use std::backtrace::Backtrace;
use std::panic::PanicHookInfo;
use std::thread::{self, Thread};

/// One fault, as seen by the controller. Built on the faulting thread,
/// consumed once, never retained.
#[derive(Debug, Clone)]
pub struct Fault<'a> {
    thread: Thread,
    message: String,
    location: Option<String>,
    backtrace: String,
    panic_info: Option<&'a PanicHookInfo<'a>>,
}

impl<'a> Fault<'a> {
    /// Capture the current thread, the panic payload and a forced backtrace.
    pub fn from_panic(info: &'a PanicHookInfo<'a>) -> Self {
        // Capture before anything else allocates on this path
        let backtrace = Backtrace::force_capture().to_string();

        let payload = info.payload();
        let message = if let Some(s) = payload.downcast_ref::<&str>() {
            (*s).to_string()
        } else if let Some(s) = payload.downcast_ref::<String>() {
            s.clone()
        } else {
            "Box<dyn Any>".to_string()
        };

        let location = info
            .location()
            .map(|loc| format!("{}:{}:{}", loc.file(), loc.line(), loc.column()));

        Self {
            thread: thread::current(),
            message,
            location,
            backtrace,
            panic_info: Some(info),
        }
    }
}

impl Fault<'static> {
    /// A fault that did not come from the panic runtime, attributed to the
    /// current thread. Used by hosts that feed faults in by hand.
    pub fn new(message: impl Into<String>) -> Self {
        Self {
            thread: thread::current(),
            message: message.into(),
            location: None,
            backtrace: String::new(),
            panic_info: None,
        }
    }
}

impl<'a> Fault<'a> {
    pub fn with_location(mut self, location: impl Into<String>) -> Self {
        self.location = Some(location.into());
        self
    }

    pub fn with_backtrace(mut self, backtrace: impl Into<String>) -> Self {
        self.backtrace = backtrace.into();
        self
    }

    pub fn on_thread(mut self, thread: Thread) -> Self {
        self.thread = thread;
        self
    }

    pub fn thread(&self) -> &Thread {
        &self.thread
    }

    pub fn thread_name(&self) -> &str {
        self.thread.name().unwrap_or("<unnamed>")
    }

    pub fn message(&self) -> &str {
        &self.message
    }

    pub fn location(&self) -> Option<&str> {
        self.location.as_deref()
    }

    pub fn backtrace(&self) -> &str {
        &self.backtrace
    }

    /// The std hook info, present only for faults raised by the panic runtime
    /// and only on the thread that raised them.
    pub fn panic_info(&self) -> Option<&'a PanicHookInfo<'a>> {
        self.panic_info
    }

    /// Full trace text in the std panic message layout.
    pub fn raw_trace(&self) -> String {
        let mut out = match &self.location {
            Some(loc) => format!("thread '{}' panicked at {}:\n", self.thread_name(), loc),
            None => format!("thread '{}' panicked:\n", self.thread_name()),
        };
        out.push_str(&self.message);
        out.push('\n');
        if !self.backtrace.is_empty() {
            out.push_str("stack backtrace:\n");
            out.push_str(&self.backtrace);
            if !self.backtrace.ends_with('\n') {
                out.push('\n');
            }
        }
        out
    }

    /// Everything but the hook info, so the fault can cross to another thread
    pub(crate) fn detach(&self) -> DetachedFault {
        DetachedFault {
            thread: self.thread.clone(),
            message: self.message.clone(),
            location: self.location.clone(),
            backtrace: self.backtrace.clone(),
        }
    }
}

/// Owned, `Send` copy of a [`Fault`] without its hook info
#[derive(Debug, Clone)]
pub(crate) struct DetachedFault {
    thread: Thread,
    message: String,
    location: Option<String>,
    backtrace: String,
}

impl DetachedFault {
    pub(crate) fn attach(&self) -> Fault<'static> {
        Fault {
            thread: self.thread.clone(),
            message: self.message.clone(),
            location: self.location.clone(),
            backtrace: self.backtrace.clone(),
            panic_info: None,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_synthetic_fault_uses_current_thread() {
        let handle = thread::Builder::new()
            .name("worker-7".to_string())
            .spawn(|| Fault::new("boom").thread_name().to_string())
            .unwrap();
        assert_eq!(handle.join().unwrap(), "worker-7");
    }

    #[test]
    fn test_raw_trace_layout() {
        let fault = Fault::new("index out of bounds")
            .with_location("src/main.rs:10:5")
            .with_backtrace("   0: app::main\n             at src/main.rs:10:5");
        let fault = fault.on_thread(thread::current());
        let trace = fault.raw_trace();

        assert!(trace.contains("panicked at src/main.rs:10:5:\n"));
        assert!(trace.contains("index out of bounds\nstack backtrace:\n"));
        assert!(trace.ends_with("at src/main.rs:10:5\n"));
        assert!(fault.panic_info().is_none());
    }

    #[test]
    fn test_raw_trace_without_backtrace() {
        let trace = Fault::new("boom").raw_trace();
        assert!(trace.ends_with("panicked:\nboom\n"));
        assert!(!trace.contains("stack backtrace"));
    }

    #[test]
    fn test_detached_fault_keeps_faulting_thread() {
        let fault = thread::Builder::new()
            .name("origin".to_string())
            .spawn(|| Fault::new("boom").with_location("src/lib.rs:1:1").detach())
            .unwrap()
            .join()
            .unwrap()
            .attach();

        assert_eq!(fault.thread_name(), "origin");
        assert_eq!(fault.message(), "boom");
        assert_eq!(fault.location(), Some("src/lib.rs:1:1"));
        assert!(fault.panic_info().is_none());
    }
}
