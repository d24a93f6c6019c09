//! `notify` group: `print` and `message`.

use crate::def::PrimitiveType::{String as Str, Void};
use crate::ffi::{FfiGroup, FunctionDefinition, Severity};

use super::host::{HostBridge, HostMessage};
use super::get_str;

/// With a bridge, `print` goes to the bridge's sink; otherwise to the
/// interpreter's `ExecIf`.
pub fn group(bridge: Option<HostBridge>) -> FfiGroup {
    let print = FunctionDefinition::function("print", &[Str], Void, move |inv, args| {
        let text = get_str(args, 0, "print")?;
        match &bridge {
            Some(bridge) => bridge.send(HostMessage::Output(text))?,
            None => inv.execif.output(&text),
        }
        Ok(None)
    })
    .with_doc("Write a line of output.");

    let message = FunctionDefinition::function("message", &[Str], Void, |inv, args| {
        inv.execif.alert(Severity::Message, &get_str(args, 0, "message")?);
        Ok(None)
    })
    .with_doc("Raise a message alert.");

    FfiGroup::new("notify", vec![print, message])
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::{Arc, Mutex};

    use crate::ffi::{ExecIf, FunctionKind, Invocation};
    use crate::interp::Value;

    #[derive(Default)]
    struct Capture(Mutex<Vec<String>>);

    impl ExecIf for Capture {
        fn alert(&self, severity: Severity, text: &str) {
            self.0.lock().unwrap().push(format!("{severity}: {text}"));
        }
        fn set_exception_text(&self, _text: &str) {}
        fn output(&self, text: &str) {
            self.0.lock().unwrap().push(text.to_owned());
        }
    }

    fn run(group: &FfiGroup, name: &str, execif: &dyn ExecIf, text: &str) {
        let def = group.functions.iter().find(|d| d.name == name).unwrap();
        let FunctionKind::Function(f) = &def.kind else { unreachable!() };
        let mut inv = Invocation {
            execif,
            signal: None,
            unit_invocation_id: 1,
            unit_name: "t",
            unit_location: 1,
            group_data: &mut (),
        };
        f(&mut inv, &[Value::Str(text.into())]).unwrap();
    }

    #[test]
    fn print_and_message_use_execif() {
        let capture = Capture::default();
        let group = group(None);
        run(&group, "print", &capture, "hello");
        run(&group, "message", &capture, "note");
        assert_eq!(*capture.0.lock().unwrap(), ["hello", "message: note"]);
    }

    #[test]
    fn print_goes_through_bridge() {
        let rt = tokio::runtime::Builder::new_multi_thread().worker_threads(1).build().unwrap();
        let seen = Arc::new(Mutex::new(Vec::new()));
        let sink = {
            let seen = Arc::clone(&seen);
            move |m: HostMessage| seen.lock().unwrap().push(m)
        };
        let (bridge, task) = HostBridge::spawn(rt.handle(), sink);
        let capture = Capture::default();
        let group = group(Some(bridge));
        run(&group, "print", &capture, "bridged");
        drop(group);
        rt.block_on(task).unwrap();
        assert!(capture.0.lock().unwrap().is_empty());
        assert_eq!(*seen.lock().unwrap(), [HostMessage::Output("bridged".into())]);
    }
}
