//! Foreign function interface: how native functions and action controllers
//! are described, registered and called.
//!
//! A host library hands the module one or more [`FfiGroup`]s.  Each group
//! lists its [`FunctionDefinition`]s and may carry [`GroupHooks`] that build
//! the group's private state before the program runs.  Every call receives an
//! [`Invocation`] giving access to that state and to the host through
//! [`ExecIf`].

use std::any::Any;
use std::collections::BTreeMap;
use std::fmt;
use std::sync::Arc;

use crate::def::{Location, PrimitiveType};
use crate::interp::{ActionSignal, Value};

/// Maximum number of declared arguments of one FFI function.
pub const MAX_FFI_ARGUMENTS: usize = 128;

/// Error raised by an FFI implementation.  The interpreter turns it into an
/// `FFI` exception on the calling unit.
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
#[error("{message}")]
pub struct FfiError {
    pub message: String,
}

impl FfiError {
    pub fn new(message: impl Into<String>) -> Self {
        FfiError { message: message.into() }
    }
}

// ── Host interface ────────────────────────────────────────────────────────────

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Severity {
    Message,
    Warning,
    Error,
}

impl fmt::Display for Severity {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(match self {
            Severity::Message => "message",
            Severity::Warning => "warning",
            Severity::Error => "error",
        })
    }
}

/// Callbacks from FFI code into the embedding host.
pub trait ExecIf: Send + Sync {
    fn alert(&self, severity: Severity, text: &str);

    fn set_exception_text(&self, text: &str);

    /// Line sink for `print`.
    fn output(&self, text: &str) {
        self.alert(Severity::Message, text);
    }
}

/// An `ExecIf` that forwards everything to `tracing`.
#[derive(Debug, Default, Clone, Copy)]
pub struct TracingExecIf;

impl ExecIf for TracingExecIf {
    fn alert(&self, severity: Severity, text: &str) {
        match severity {
            Severity::Message => tracing::info!(target: "ts::ffi", "{text}"),
            Severity::Warning | Severity::Error => tracing::warn!(target: "ts::ffi", %severity, "{text}"),
        }
    }

    fn set_exception_text(&self, text: &str) {
        tracing::warn!(target: "ts::ffi", "exception: {text}");
    }

    fn output(&self, text: &str) {
        println!("{text}");
    }
}

// ── Calling convention ────────────────────────────────────────────────────────

/// Private state of an FFI group, created by [`GroupHooks::begin`].
pub type GroupData = Box<dyn Any + Send>;

/// Per-trigger state owned by an action controller between requests.
pub type ActionData = Option<Box<dyn Any + Send>>;

/// Everything an FFI call can see besides its arguments.
pub struct Invocation<'a> {
    pub execif: &'a dyn ExecIf,
    /// Wakes the action this trigger belongs to; `None` for plain calls.
    pub signal: Option<ActionSignal>,
    pub unit_invocation_id: u64,
    pub unit_name: &'a str,
    pub unit_location: Location,
    pub group_data: &'a mut (dyn Any + Send),
}

impl Invocation<'_> {
    /// Downcast the group state to the type the group's `begin` produced.
    pub fn group<T: Any>(&mut self) -> Result<&mut T, FfiError> {
        self.group_data
            .downcast_mut::<T>()
            .ok_or_else(|| FfiError::new("group state has an unexpected type"))
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ActionRequest {
    Init,
    Running,
    Update,
    Query,
    Stop,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ActionState {
    Pending,
    Triggered,
    Finished,
}

pub type FfiFunction =
    Arc<dyn Fn(&mut Invocation<'_>, &[Value]) -> Result<Option<Value>, FfiError> + Send + Sync>;

pub type ActionController = Arc<
    dyn Fn(&mut Invocation<'_>, ActionRequest, &[Value], &mut ActionData) -> Result<ActionState, FfiError>
        + Send
        + Sync,
>;

#[derive(Clone)]
pub enum FunctionKind {
    Function(FfiFunction),
    ActionController(ActionController),
}

impl fmt::Debug for FunctionKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            FunctionKind::Function(_) => f.write_str("Function"),
            FunctionKind::ActionController(_) => f.write_str("ActionController"),
        }
    }
}

#[derive(Debug, Clone)]
pub struct FunctionDefinition {
    pub name: String,
    pub documentation: String,
    pub kind: FunctionKind,
    pub output: PrimitiveType,
    pub arguments: Vec<PrimitiveType>,
}

impl FunctionDefinition {
    pub fn function<F>(name: &str, arguments: &[PrimitiveType], output: PrimitiveType, f: F) -> Self
    where
        F: Fn(&mut Invocation<'_>, &[Value]) -> Result<Option<Value>, FfiError> + Send + Sync + 'static,
    {
        FunctionDefinition {
            name: name.to_owned(),
            documentation: String::new(),
            kind: FunctionKind::Function(Arc::new(f)),
            output,
            arguments: arguments.to_vec(),
        }
    }

    pub fn action<F>(name: &str, arguments: &[PrimitiveType], f: F) -> Self
    where
        F: Fn(&mut Invocation<'_>, ActionRequest, &[Value], &mut ActionData) -> Result<ActionState, FfiError>
            + Send
            + Sync
            + 'static,
    {
        FunctionDefinition {
            name: name.to_owned(),
            documentation: String::new(),
            kind: FunctionKind::ActionController(Arc::new(f)),
            output: PrimitiveType::Void,
            arguments: arguments.to_vec(),
        }
    }

    pub fn with_doc(mut self, documentation: &str) -> Self {
        self.documentation = documentation.to_owned();
        self
    }

    pub fn is_action_controller(&self) -> bool {
        matches!(self.kind, FunctionKind::ActionController(_))
    }

    /// Reason this definition cannot be registered, if any.
    pub fn validate(&self) -> Result<(), String> {
        if self.arguments.len() > MAX_FFI_ARGUMENTS {
            return Err(format!(
                "{} arguments declared, at most {MAX_FFI_ARGUMENTS} allowed",
                self.arguments.len()
            ));
        }
        if self.is_action_controller() && self.output != PrimitiveType::Void {
            return Err("action controllers cannot have an output".into());
        }
        if self.output == PrimitiveType::Delayed {
            return Err("output type must be known".into());
        }
        if let Some(index) = self.arguments.iter().position(|t| !t.is_concrete()) {
            return Err(format!("argument {index} has type '{}'", self.arguments[index]));
        }
        Ok(())
    }
}

// ── Groups ────────────────────────────────────────────────────────────────────

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum GroupState {
    /// The interpreter is about to block waiting for action signals.
    Sleeping,
    /// The interpreter woke up and is running script code again.
    Running,
}

/// String-keyed plugin configuration, set with `Module::set_ffi_variable`.
pub type FfiVariables = BTreeMap<String, String>;

/// Lifecycle hooks of an FFI group.
pub trait GroupHooks: Send + Sync {
    fn begin(&self, variables: &FfiVariables) -> Result<GroupData, FfiError>;

    fn state(&self, _data: &mut GroupData, _state: GroupState) {}

    fn end(&self, _data: GroupData) {}
}

/// A table of FFI functions registered together.
#[derive(Clone)]
pub struct FfiGroup {
    pub name: String,
    pub functions: Vec<FunctionDefinition>,
    pub hooks: Option<Arc<dyn GroupHooks>>,
}

impl FfiGroup {
    pub fn new(name: &str, functions: Vec<FunctionDefinition>) -> Self {
        FfiGroup { name: name.to_owned(), functions, hooks: None }
    }

    pub fn with_hooks(mut self, hooks: Arc<dyn GroupHooks>) -> Self {
        self.hooks = Some(hooks);
        self
    }
}

impl fmt::Debug for FfiGroup {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("FfiGroup")
            .field("name", &self.name)
            .field("functions", &self.functions)
            .field("hooks", &self.hooks.is_some())
            .finish()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn noop(_: &mut Invocation<'_>, _: &[Value]) -> Result<Option<Value>, FfiError> {
        Ok(None)
    }

    #[test]
    fn validate_rejects_too_many_arguments() {
        let def = FunctionDefinition::function(
            "wide",
            &vec![PrimitiveType::Int; MAX_FFI_ARGUMENTS + 1],
            PrimitiveType::Void,
            noop,
        );
        assert!(def.validate().is_err());
        let def = FunctionDefinition::function(
            "wide",
            &vec![PrimitiveType::Int; MAX_FFI_ARGUMENTS],
            PrimitiveType::Void,
            noop,
        );
        assert!(def.validate().is_ok());
    }

    #[test]
    fn validate_rejects_void_argument() {
        let def = FunctionDefinition::function("f", &[PrimitiveType::Void], PrimitiveType::Int, noop);
        assert_eq!(def.validate(), Err("argument 0 has type 'void'".to_string()));
    }

    #[test]
    fn validate_rejects_action_with_output() {
        let mut def = FunctionDefinition::action("a", &[], |_, _, _, _| Ok(ActionState::Pending));
        assert!(def.validate().is_ok());
        def.output = PrimitiveType::Int;
        assert!(def.validate().is_err());
    }

    #[test]
    fn invocation_downcasts_group_state() {
        let mut state: u32 = 7;
        let mut inv = Invocation {
            execif: &TracingExecIf,
            signal: None,
            unit_invocation_id: 1,
            unit_name: "u",
            unit_location: 1,
            group_data: &mut state,
        };
        assert_eq!(*inv.group::<u32>().unwrap(), 7);
        assert!(inv.group::<String>().is_err());
    }
}
