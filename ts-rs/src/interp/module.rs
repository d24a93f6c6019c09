//! Module-wide interpreter state: FFI group data, the active unit list and the
//! action wait loop.

use std::sync::Arc;

use crate::compile::MODULE_MAIN;
use crate::def::{GroupId, Module, ObjectId, ObjectList};
use crate::ffi::{ExecIf, FfiError, GroupData, GroupState};

use super::action::{ActionKey, ActionOutcome, SignalHub};
use super::unit::{UnitState, UnitView};
use super::{AbortSignal, Controller, Exception, ExecutionMode, Fault, InterpretError, Value};

/// Started FFI groups, indexed by [`GroupId`].
#[derive(Default)]
pub(crate) struct GroupTable {
    slots: Vec<Option<GroupData>>,
}

impl GroupTable {
    /// Data of group `id`, starting the group if it has not been started.
    pub(crate) fn data(&mut self, module: &Module, id: GroupId) -> Result<&mut GroupData, FfiError> {
        let index = id.0 as usize;
        if self.slots.len() <= index {
            self.slots.resize_with(index + 1, || None);
        }
        let slot = &mut self.slots[index];
        if slot.is_none() {
            let record = module
                .group(id)
                .ok_or_else(|| FfiError::new(format!("unknown ffi group #{}", id.0)))?;
            let data = match &record.hooks {
                Some(hooks) => hooks.begin(module.ffi_variables())?,
                None => Box::new(()),
            };
            tracing::debug!(group = %record.name, "ffi group started");
            *slot = Some(data);
        }
        slot.as_mut().ok_or_else(|| FfiError::new("ffi group data unavailable"))
    }

    fn for_each_started(&mut self, module: &Module, mut f: impl FnMut(&crate::def::module::FfiGroupRecord, &mut GroupData)) {
        for (index, slot) in self.slots.iter_mut().enumerate() {
            if let (Some(data), Some(record)) = (slot.as_mut(), module.group(GroupId(index as u32))) {
                f(record, data);
            }
        }
    }
}

/// Runs units of a resolved module.
pub struct Interpreter<'m> {
    pub(crate) module: &'m Module,
    pub(crate) execif: Arc<dyn ExecIf>,
    pub(crate) controller: Option<Box<dyn Controller + 'm>>,
    pub(crate) abort: AbortSignal,
    pub(crate) hub: SignalHub,
    pub(crate) groups: GroupTable,
    active: Vec<UnitState<'m>>,
    next_invocation: u64,
    /// First exception raised by a unit after its invocation returned.
    late_fault: Option<Fault>,
}

impl<'m> Interpreter<'m> {
    pub fn new(module: &'m Module, execif: Arc<dyn ExecIf>) -> Self {
        let hub = SignalHub::new();
        let abort = AbortSignal::new();
        abort.attach(&hub);
        Interpreter {
            module,
            execif,
            controller: None,
            abort,
            hub,
            groups: GroupTable::default(),
            active: Vec::new(),
            next_invocation: 1,
            late_fault: None,
        }
    }

    pub fn with_controller(mut self, controller: Box<dyn Controller + 'm>) -> Self {
        self.controller = Some(controller);
        self
    }

    /// Use `abort` instead of the interpreter's own signal.
    pub fn with_abort_signal(mut self, abort: AbortSignal) -> Self {
        abort.attach(&self.hub);
        self.abort = abort;
        self
    }

    pub fn abort_signal(&self) -> AbortSignal {
        self.abort.clone()
    }

    pub fn module(&self) -> &'m Module {
        self.module
    }

    /// Number of units with actions still in play.
    pub fn active_units(&self) -> usize {
        self.active.len()
    }

    pub(crate) fn next_invocation_id(&mut self) -> u64 {
        let id = self.next_invocation;
        self.next_invocation += 1;
        id
    }

    /// Record an exception on `st` and tell the controller about it.
    pub(crate) fn raise(&mut self, st: &UnitState<'m>, exception: Exception) -> Fault {
        tracing::warn!(unit = %st.unit.name, line = st.location, "{exception}");
        if let Some(controller) = self.controller.as_mut() {
            controller.exception(&UnitView::new(st), exception);
        }
        Fault { exception, unit: st.unit.name.clone(), location: st.location }
    }

    // ── Groups ────────────────────────────────────────────────────────────────

    /// Start every referenced FFI group.
    pub fn begin_groups(&mut self) -> Result<(), InterpretError> {
        let module = self.module;
        for record in module.referenced_groups() {
            self.groups.data(module, record.id).map_err(|e| InterpretError::BeginGroup {
                group: record.name.clone(),
                message: e.message,
            })?;
        }
        Ok(())
    }

    /// End every started group.
    pub fn end_groups(&mut self) {
        let module = self.module;
        for (index, slot) in self.groups.slots.iter_mut().enumerate() {
            let Some(data) = slot.take() else { continue };
            if let Some(record) = module.group(GroupId(index as u32)) {
                tracing::debug!(group = %record.name, "ffi group ended");
                if let Some(hooks) = &record.hooks {
                    hooks.end(data);
                }
            }
        }
    }

    fn set_group_state(&mut self, state: GroupState) {
        let module = self.module;
        self.groups.for_each_started(module, |record, data| {
            if let Some(hooks) = &record.hooks {
                hooks.state(data, state);
            }
        });
    }

    // ── Running ───────────────────────────────────────────────────────────────

    /// Mode a top-level invocation starts in.
    fn initial_mode(&self) -> ExecutionMode {
        if self.controller.is_some() {
            ExecutionMode::StepInto
        } else {
            ExecutionMode::Run
        }
    }

    /// Invoke a resolved unit.  A unit that leaves actions behind stays
    /// active; drive it with [`Interpreter::run_actions`].
    pub fn invoke(&mut self, id: ObjectId, arguments: &[Value]) -> Result<Option<Value>, InterpretError> {
        let module = self.module;
        let object = module.object(id).ok_or(InterpretError::NoMainUnit)?;
        if object.list != ObjectList::ReferencedUnits {
            return Err(InterpretError::Unresolved(object.name.clone()));
        }
        let parameters = object.parameter_types();
        if parameters.len() != arguments.len() {
            return Err(InterpretError::Arguments {
                unit: object.name.clone(),
                given: arguments.len(),
                expected: parameters.len(),
            });
        }
        let arguments: Vec<Value> =
            arguments.iter().zip(parameters).map(|(v, &ty)| v.clone().convert(ty)).collect();
        let mode = self.initial_mode();
        Ok(self.invoke_unit(id, arguments, mode)?)
    }

    /// Keep a unit with pending actions on the active list.
    pub(crate) fn activate(&mut self, st: UnitState<'m>) {
        tracing::debug!(unit = %st.unit.name, invocation = st.invocation_id, "unit active");
        self.active.push(st);
    }

    /// Wait for action signals and evaluate actions until no unit is active.
    ///
    /// A unit that raises an exception is stopped; the others keep running.
    /// The first such exception is returned once everything has stopped.
    pub fn run_actions(&mut self) -> Result<(), InterpretError> {
        while !self.active.is_empty() {
            self.set_group_state(GroupState::Sleeping);
            let keys = self.hub.wait();
            self.set_group_state(GroupState::Running);

            if self.abort.is_signalled() {
                self.halt_all();
                break;
            }
            for key in keys {
                self.deliver(key);
            }
        }
        match self.late_fault.take() {
            Some(fault) => Err(fault.into()),
            None => Ok(()),
        }
    }

    fn deliver(&mut self, key: ActionKey) {
        let Some(position) = self.active.iter().position(|s| s.invocation_id == key.invocation) else {
            return;
        };
        let mut st = self.active.swap_remove(position);
        match self.evaluate_action(&mut st, key.action) {
            Ok(ActionOutcome::Continue) => self.active.push(st),
            Ok(ActionOutcome::Stopped) => self.stop_actions(&mut st),
            Err(fault) => {
                self.stop_actions(&mut st);
                self.late_fault.get_or_insert(fault);
            }
        }
    }

    fn halt_all(&mut self) {
        for mut st in std::mem::take(&mut self.active) {
            let fault = self.raise(&st, Exception::Halt);
            self.stop_actions(&mut st);
            self.late_fault.get_or_insert(fault);
        }
    }

    /// Run `_module_main`: start the referenced groups, invoke the unit, run
    /// its actions to completion and end the groups.
    pub fn interpret_module(&mut self) -> Result<Option<Value>, InterpretError> {
        let id = self.module.find_unit(MODULE_MAIN, &[]).ok_or(InterpretError::NoMainUnit)?;
        self.begin_groups()?;
        let result = self.invoke(id, &[]).and_then(|output| {
            self.run_actions()?;
            Ok(output)
        });
        if result.is_err() {
            self.stop_all();
        }
        self.end_groups();
        result
    }

    /// Stop every active unit without raising anything.
    fn stop_all(&mut self) {
        for mut st in std::mem::take(&mut self.active) {
            self.stop_actions(&mut st);
        }
    }
}

impl Drop for Interpreter<'_> {
    fn drop(&mut self) {
        self.stop_all();
        self.end_groups();
    }
}
