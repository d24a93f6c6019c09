//! Standard FFI library.
//!
//! Each submodule builds one [`FfiGroup`]; [`register`] adds all of them to a
//! module.  Groups that keep state do so in their group data, started when
//! the program first needs them.

pub mod host;
pub mod math;
pub mod notify;
pub mod text;
pub mod time;

use tokio::runtime::Handle;

use crate::def::{GroupId, Module};
use crate::error::Result;
use crate::ffi::FfiError;
use crate::interp::Value;

pub use host::{HostBridge, HostMessage, HostSink};

/// How the standard groups reach their host.
#[derive(Clone, Default)]
pub struct StdlibOptions {
    /// Route `print` and alerts through a host task instead of the caller's
    /// `ExecIf`.
    pub bridge: Option<HostBridge>,
    /// Runtime driving the timers.  Without one the `time` group uses the
    /// ambient runtime, or starts its own.
    pub runtime: Option<Handle>,
}

/// Register every standard group.
pub fn register(module: &mut Module, options: StdlibOptions) -> Result<Vec<GroupId>> {
    let groups = [
        notify::group(options.bridge),
        math::group(),
        time::group(options.runtime),
        text::group(),
    ];
    groups.into_iter().map(|group| module.add_ffi_group(group)).collect()
}

// ── Argument accessors ────────────────────────────────────────────────────────

fn arg<'a>(args: &'a [Value], idx: usize, name: &str) -> Result<&'a Value, FfiError> {
    args.get(idx).ok_or_else(|| FfiError::new(format!("{name}: argument {idx} missing")))
}

fn get_str(args: &[Value], idx: usize, name: &str) -> Result<String, FfiError> {
    arg(args, idx, name).map(|v| v.clone().into_string())
}

fn get_int(args: &[Value], idx: usize, name: &str) -> Result<i64, FfiError> {
    arg(args, idx, name).map(Value::as_int)
}

fn get_real(args: &[Value], idx: usize, name: &str) -> Result<f64, FfiError> {
    arg(args, idx, name).map(Value::as_real)
}

fn get_bool(args: &[Value], idx: usize, name: &str) -> Result<bool, FfiError> {
    arg(args, idx, name).map(Value::as_bool)
}

#[cfg(test)]
pub(crate) mod testing {
    use crate::ffi::{FfiError, FfiGroup, FunctionKind, Invocation, TracingExecIf};
    use crate::interp::Value;

    /// Call function `name` of `group` whose declared arguments are `types`.
    pub fn call(
        group: &FfiGroup,
        name: &str,
        types: &[crate::def::PrimitiveType],
        args: &[Value],
        state: &mut (dyn std::any::Any + Send),
    ) -> Result<Option<Value>, FfiError> {
        let def = group
            .functions
            .iter()
            .find(|d| d.name == name && d.arguments == types)
            .expect("no such function");
        let FunctionKind::Function(f) = &def.kind else { panic!("{name} is an action") };
        let mut inv = Invocation {
            execif: &TracingExecIf,
            signal: None,
            unit_invocation_id: 1,
            unit_name: "test",
            unit_location: 1,
            group_data: state,
        };
        f(&mut inv, args)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn registers_all_groups() {
        let mut module = Module::new();
        let ids = register(&mut module, StdlibOptions::default()).unwrap();
        assert_eq!(ids.len(), 4);
        let names: Vec<&str> = module.groups().iter().map(|g| g.name.as_str()).collect();
        assert_eq!(names, ["notify", "math", "time", "text"]);
    }

    #[test]
    fn accessors_report_missing_arguments() {
        let err = get_int(&[], 1, "f").unwrap_err();
        assert_eq!(err.message, "f: argument 1 missing");
        assert_eq!(get_str(&[Value::Int(3)], 0, "f").unwrap(), "3");
        assert!(get_bool(&[Value::Bool(true)], 0, "f").unwrap());
        assert_eq!(get_real(&[Value::Int(2)], 0, "f").unwrap(), 2.0);
    }
}
