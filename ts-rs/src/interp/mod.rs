//! Tree-walking interpreter.
//!
//! An [`Interpreter`] borrows a resolved [`Module`](crate::def::Module) and
//! runs units against it.  Each live invocation owns a [`UnitState`] with an
//! explicit frame stack; units that leave actions behind stay on the active
//! list and are driven by action signals until their actions run out.
//!
//! Execution advances one statement at a time.  A [`Controller`] can take
//! over stepping, and an [`AbortSignal`] halts everything at the next
//! statement boundary.

mod action;
mod eval;
mod module;
mod unit;
mod value;

use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::{Arc, Mutex, PoisonError};

use crate::def::Location;

pub use action::{ActionKey, ActionSignal, SignalHub};
pub use module::Interpreter;
pub use unit::{Frame, UnitState, UnitView, VariableValue};
pub use value::Value;

// ── Exceptions ────────────────────────────────────────────────────────────────

/// Runtime exception raised by a unit.
#[derive(Debug, Clone, Copy, PartialEq, Eq, thiserror::Error)]
pub enum Exception {
    #[error("Out of memory")]
    OutOfMemory,
    #[error("Divide by zero")]
    DivideByZero,
    #[error("Failure in ffi plugin")]
    Ffi,
    #[error("Instructed to halt")]
    Halt,
}

#[derive(Debug, Clone, PartialEq, thiserror::Error)]
pub enum InterpretError {
    #[error("exception in '{unit}' at line {location}: {exception}")]
    Exception { unit: String, location: Location, exception: Exception },
    #[error("ffi group '{group}' failed to start: {message}")]
    BeginGroup { group: String, message: String },
    #[error("module has no main unit")]
    NoMainUnit,
    #[error("unit '{0}' is not resolved")]
    Unresolved(String),
    #[error("'{unit}' takes {expected} arguments, {given} given")]
    Arguments { unit: String, given: usize, expected: usize },
}

impl InterpretError {
    pub fn exception(&self) -> Option<Exception> {
        match self {
            InterpretError::Exception { exception, .. } => Some(*exception),
            _ => None,
        }
    }
}

/// An exception on its way up the invocation chain.  The controller has
/// already been told about it.
#[derive(Debug, Clone, PartialEq)]
pub(crate) struct Fault {
    pub exception: Exception,
    pub unit: String,
    pub location: Location,
}

impl From<Fault> for InterpretError {
    fn from(f: Fault) -> Self {
        InterpretError::Exception { unit: f.unit, location: f.location, exception: f.exception }
    }
}

// ── Controller ────────────────────────────────────────────────────────────────

/// How a unit advances.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum ExecutionMode {
    #[default]
    Run,
    /// Ask the controller before each statement; step over calls.
    Step,
    /// Ask the controller before each statement, also inside called units.
    StepInto,
    Halt,
}

impl ExecutionMode {
    /// Mode a unit invoked from a unit in this mode starts in.
    pub fn for_callee(self) -> ExecutionMode {
        match self {
            ExecutionMode::Run | ExecutionMode::Step => ExecutionMode::Run,
            other => other,
        }
    }
}

/// External stepping control, e.g. an interactive debugger.
pub trait Controller {
    /// Called before each statement of a unit whose mode is not `Run`.
    /// Returning `Halt` raises `HALT` in the unit.
    fn step(&mut self, view: &UnitView<'_>) -> ExecutionMode;

    /// Called once for every exception a unit raises.
    fn exception(&mut self, _view: &UnitView<'_>, _exception: Exception) {}
}

// ── Abort signal ──────────────────────────────────────────────────────────────

#[derive(Default)]
struct AbortInner {
    flag: AtomicBool,
    hub: Mutex<Option<SignalHub>>,
}

/// Thread-safe request to halt every running unit.
#[derive(Clone, Default)]
pub struct AbortSignal {
    inner: Arc<AbortInner>,
}

impl AbortSignal {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn signal(&self) {
        self.inner.flag.store(true, Ordering::SeqCst);
        let hub = self.inner.hub.lock().unwrap_or_else(PoisonError::into_inner);
        if let Some(hub) = hub.as_ref() {
            hub.wake();
        }
    }

    pub fn clear(&self) {
        self.inner.flag.store(false, Ordering::SeqCst);
    }

    pub fn is_signalled(&self) -> bool {
        self.inner.flag.load(Ordering::SeqCst)
    }

    /// Wake `hub` whenever the signal fires.
    pub(crate) fn attach(&self, hub: &SignalHub) {
        *self.inner.hub.lock().unwrap_or_else(PoisonError::into_inner) = Some(hub.clone());
        if self.is_signalled() {
            hub.wake();
        }
    }
}

impl std::fmt::Debug for AbortSignal {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("AbortSignal").field("signalled", &self.is_signalled()).finish()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn callee_modes() {
        assert_eq!(ExecutionMode::Run.for_callee(), ExecutionMode::Run);
        assert_eq!(ExecutionMode::Step.for_callee(), ExecutionMode::Run);
        assert_eq!(ExecutionMode::StepInto.for_callee(), ExecutionMode::StepInto);
        assert_eq!(ExecutionMode::Halt.for_callee(), ExecutionMode::Halt);
    }

    #[test]
    fn abort_signal_is_shared_between_clones() {
        let a = AbortSignal::new();
        let b = a.clone();
        b.signal();
        assert!(a.is_signalled());
        a.clear();
        assert!(!b.is_signalled());
    }

    #[test]
    fn exception_texts() {
        assert_eq!(Exception::DivideByZero.to_string(), "Divide by zero");
        assert_eq!(Exception::Halt.to_string(), "Instructed to halt");
    }
}
