//! Action signalling and evaluation.
//!
//! Triggers wake their action through an [`ActionSignal`], from any thread.
//! Signals collect in a [`SignalHub`]; the interpreter's wait loop drains the
//! hub and evaluates each signalled action by querying its triggers.

use std::collections::VecDeque;
use std::sync::{Arc, Condvar, Mutex, PoisonError};

use crate::def::{Action, FunctionCall, ObjectKind};
use crate::ffi::{ActionData, ActionRequest, ActionState, FunctionKind, Invocation};

use super::module::Interpreter;
use super::unit::{Flow, Frame, UnitState};
use super::{Exception, Fault, Value};

/// Identifies one action of one live unit invocation.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct ActionKey {
    pub invocation: u64,
    pub action: usize,
}

#[derive(Default)]
struct HubQueue {
    keys: VecDeque<ActionKey>,
    woken: bool,
}

#[derive(Default)]
struct HubShared {
    queue: Mutex<HubQueue>,
    ready: Condvar,
}

/// Queue of signalled actions shared between triggers and the interpreter.
#[derive(Clone, Default)]
pub struct SignalHub {
    shared: Arc<HubShared>,
}

impl SignalHub {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn push(&self, key: ActionKey) {
        let mut queue = self.shared.queue.lock().unwrap_or_else(PoisonError::into_inner);
        queue.keys.push_back(key);
        self.shared.ready.notify_all();
    }

    /// Release a waiter without signalling any action.
    pub fn wake(&self) {
        let mut queue = self.shared.queue.lock().unwrap_or_else(PoisonError::into_inner);
        queue.woken = true;
        self.shared.ready.notify_all();
    }

    /// Block until an action is signalled or the hub is woken, then drain it.
    pub fn wait(&self) -> Vec<ActionKey> {
        let queue = self.shared.queue.lock().unwrap_or_else(PoisonError::into_inner);
        let mut queue = self
            .shared
            .ready
            .wait_while(queue, |q| q.keys.is_empty() && !q.woken)
            .unwrap_or_else(PoisonError::into_inner);
        queue.woken = false;
        queue.keys.drain(..).collect()
    }

    /// Drain without blocking.
    pub fn take(&self) -> Vec<ActionKey> {
        let mut queue = self.shared.queue.lock().unwrap_or_else(PoisonError::into_inner);
        queue.keys.drain(..).collect()
    }
}

/// Handle a trigger uses to wake its action.
#[derive(Clone)]
pub struct ActionSignal {
    hub: SignalHub,
    key: ActionKey,
}

impl ActionSignal {
    pub fn new(hub: SignalHub, key: ActionKey) -> Self {
        ActionSignal { hub, key }
    }

    pub fn key(&self) -> ActionKey {
        self.key
    }

    pub fn signal(&self) {
        tracing::trace!(invocation = self.key.invocation, action = self.key.action, "action signalled");
        self.hub.push(self.key);
    }
}

impl std::fmt::Debug for ActionSignal {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_tuple("ActionSignal").field(&self.key).finish()
    }
}

// ── Per-invocation action state ───────────────────────────────────────────────

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub(crate) enum ActionStatus {
    /// Waiting for a signal.
    Pending,
    /// Being queried or running its block.
    Busy,
    Removed,
}

pub(crate) struct ActionInstance {
    pub status: ActionStatus,
    /// A signal arrived while the action was busy.
    pub remembered: bool,
    /// Controller state, one per trigger.
    pub triggers: Vec<ActionData>,
}

/// What a unit should do after one of its actions was evaluated.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub(crate) enum ActionOutcome {
    Continue,
    /// The unit has stopped: its last action was removed or it ran `finish`.
    Stopped,
}

// ── Evaluation ────────────────────────────────────────────────────────────────

impl<'m> Interpreter<'m> {
    /// Put every action of a freshly run unit into the pending set and send
    /// `INIT` to its triggers.
    pub(crate) fn init_actions(&mut self, st: &mut UnitState<'m>) -> Result<(), Fault> {
        let unit = st.unit;
        for (index, action) in unit.actions.iter().enumerate() {
            st.actions.push(ActionInstance {
                status: ActionStatus::Pending,
                remembered: false,
                triggers: action.triggers.iter().map(|_| None).collect(),
            });
            st.location = action.location;
            self.send_all(st, index, action, ActionRequest::Init)?;
            tracing::debug!(unit = %unit.name, action = index, "action initialised");
        }
        Ok(())
    }

    /// Evaluate a signalled action of `st`.
    pub(crate) fn evaluate_action(&mut self, st: &mut UnitState<'m>, index: usize) -> Result<ActionOutcome, Fault> {
        let unit = st.unit;
        let Some(action) = unit.actions.get(index) else {
            return Ok(ActionOutcome::Continue);
        };
        match st.actions[index].status {
            ActionStatus::Pending => {}
            ActionStatus::Busy => {
                st.actions[index].remembered = true;
                return Ok(ActionOutcome::Continue);
            }
            ActionStatus::Removed => return Ok(ActionOutcome::Continue),
        }
        st.actions[index].status = ActionStatus::Busy;
        st.location = action.location;

        let states = self.send_all(st, index, action, ActionRequest::Query)?;
        if states.iter().all(|s| *s == ActionState::Finished) {
            st.actions[index].status = ActionStatus::Removed;
            tracing::debug!(unit = %unit.name, action = index, "action finished");
            if st.actions.iter().all(|a| a.status == ActionStatus::Removed) {
                return Ok(ActionOutcome::Stopped);
            }
            return Ok(ActionOutcome::Continue);
        }

        if states.iter().any(|s| *s == ActionState::Triggered) {
            tracing::debug!(unit = %unit.name, action = index, "action triggered");
            self.send_all(st, index, action, ActionRequest::Running)?;
            st.frames.push(Frame::new(&action.block));
            let flow = self.exec_statements(st, &action.block.statements);
            st.frames.truncate(1);
            if flow? == Flow::Finish {
                st.finished = true;
                return Ok(ActionOutcome::Stopped);
            }
            st.location = action.location;
            self.send_all(st, index, action, ActionRequest::Update)?;
        }

        let instance = &mut st.actions[index];
        instance.status = ActionStatus::Pending;
        if std::mem::take(&mut instance.remembered) {
            self.hub.push(ActionKey { invocation: st.invocation_id, action: index });
        }
        Ok(ActionOutcome::Continue)
    }

    /// Send `STOP` to the triggers of every action still in play.
    pub(crate) fn stop_actions(&mut self, st: &mut UnitState<'m>) {
        let unit = st.unit;
        for (index, action) in unit.actions.iter().enumerate() {
            if st.actions.get(index).map_or(true, |a| a.status == ActionStatus::Removed) {
                continue;
            }
            if let Err(fault) = self.send_all(st, index, action, ActionRequest::Stop) {
                tracing::warn!(unit = %fault.unit, "stopping action failed: {}", fault.exception);
            }
            st.actions[index].status = ActionStatus::Removed;
        }
        tracing::debug!(unit = %unit.name, invocation = st.invocation_id, "unit stopped");
    }

    /// Send `request` to each trigger of an action, evaluating trigger
    /// arguments for the requests that carry them.
    fn send_all(
        &mut self,
        st: &mut UnitState<'m>,
        index: usize,
        action: &'m Action,
        request: ActionRequest,
    ) -> Result<Vec<ActionState>, Fault> {
        let mut states = Vec::with_capacity(action.triggers.len());
        for (slot, trigger) in action.triggers.iter().enumerate() {
            let arguments = match request {
                ActionRequest::Init | ActionRequest::Update => self.eval_arguments(st, trigger)?,
                _ => Vec::new(),
            };
            let mut data = std::mem::take(&mut st.actions[index].triggers[slot]);
            let state = self.send_request(st, index, trigger, request, &arguments, &mut data);
            st.actions[index].triggers[slot] = data;
            states.push(state?);
        }
        Ok(states)
    }

    fn send_request(
        &mut self,
        st: &UnitState<'m>,
        index: usize,
        trigger: &'m FunctionCall,
        request: ActionRequest,
        arguments: &[Value],
        data: &mut ActionData,
    ) -> Result<ActionState, Fault> {
        let Some(binding) = trigger.binding() else {
            return Err(self.raise(st, Exception::Ffi));
        };
        let module = self.module;
        let Some(ObjectKind::Ffi(ffi)) = module.object(binding.object).map(|o| &o.kind) else {
            return Err(self.raise(st, Exception::Ffi));
        };
        let FunctionKind::ActionController(controller) = &ffi.definition.kind else {
            return Err(self.raise(st, Exception::Ffi));
        };
        let controller = controller.clone();
        let group = ffi.group;
        tracing::trace!(trigger = %trigger.name, ?request, "action request");

        let signal = super::ActionSignal::new(
            self.hub.clone(),
            ActionKey { invocation: st.invocation_id, action: index },
        );
        let result = match self.groups.data(module, group) {
            Ok(group_data) => {
                let mut invocation = Invocation {
                    execif: &*self.execif,
                    signal: Some(signal),
                    unit_invocation_id: st.invocation_id,
                    unit_name: &st.unit.name,
                    unit_location: st.location,
                    group_data: &mut **group_data,
                };
                controller(&mut invocation, request, arguments, data)
            }
            Err(e) => Err(e),
        };
        result.map_err(|e| {
            self.execif.set_exception_text(&e.message);
            self.raise(st, Exception::Ffi)
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn hub_drains_in_order() {
        let hub = SignalHub::new();
        let a = ActionSignal::new(hub.clone(), ActionKey { invocation: 1, action: 0 });
        let b = ActionSignal::new(hub.clone(), ActionKey { invocation: 2, action: 1 });
        b.signal();
        a.signal();
        assert_eq!(hub.wait(), vec![b.key(), a.key()]);
        assert!(hub.take().is_empty());
    }

    #[test]
    fn signal_from_another_thread_wakes_waiter() {
        let hub = SignalHub::new();
        let signal = ActionSignal::new(hub.clone(), ActionKey { invocation: 7, action: 0 });
        let t = std::thread::spawn(move || signal.signal());
        let keys = hub.wait();
        t.join().unwrap();
        assert_eq!(keys, vec![ActionKey { invocation: 7, action: 0 }]);
    }

    #[test]
    fn wake_releases_empty_wait() {
        let hub = SignalHub::new();
        hub.wake();
        assert!(hub.wait().is_empty());
    }
}
