//! Host-supplied hooks around the controller's own handling.

use crate::fault::Fault;

/// What an interceptor wants the controller to do next.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub enum Verdict {
    /// Carry on with default handling
    #[default]
    Continue,
    /// Present as usual, but never chain to the prior handler
    StopChaining,
    /// The interceptor owns this fault. Skip everything left and terminate.
    StopAll,
}

impl Verdict {
    /// Whether chaining to the prior handler is ruled out
    pub fn blocks_chaining(self) -> bool {
        !matches!(self, Verdict::Continue)
    }
}

impl From<bool> for Verdict {
    fn from(handled: bool) -> Self {
        if handled {
            Verdict::StopAll
        } else {
            Verdict::Continue
        }
    }
}

/// Extension point invoked while the faulting thread waits.
///
/// Hooks run on a short-lived helper thread, so the fault they see carries no
/// [`panic_info`](Fault::panic_info). Both default to [`Verdict::Continue`].
/// A hook that panics is treated as if it returned `Continue`.
pub trait Interceptor: Send + Sync {
    /// Called before any presentation. `StopAll` skips presentation, the
    /// after hook and chaining.
    fn on_before(&self, fault: &Fault<'_>) -> Verdict {
        let _ = fault;
        Verdict::Continue
    }

    /// Called once presentation finished; `presented` is false if it failed.
    /// Anything but `Continue` suppresses chaining.
    fn on_after(&self, fault: &Fault<'_>, presented: bool) -> Verdict {
        let _ = (fault, presented);
        Verdict::Continue
    }
}

/// Interceptor built from a pair of closures
pub struct FnInterceptor<B, A> {
    before: B,
    after: A,
}

impl<B, A> FnInterceptor<B, A>
where
    B: Fn(&Fault<'_>) -> Verdict + Send + Sync,
    A: Fn(&Fault<'_>, bool) -> Verdict + Send + Sync,
{
    pub fn new(before: B, after: A) -> Self {
        Self { before, after }
    }
}

impl<B, A> Interceptor for FnInterceptor<B, A>
where
    B: Fn(&Fault<'_>) -> Verdict + Send + Sync,
    A: Fn(&Fault<'_>, bool) -> Verdict + Send + Sync,
{
    fn on_before(&self, fault: &Fault<'_>) -> Verdict {
        (self.before)(fault)
    }

    fn on_after(&self, fault: &Fault<'_>, presented: bool) -> Verdict {
        (self.after)(fault, presented)
    }
}
