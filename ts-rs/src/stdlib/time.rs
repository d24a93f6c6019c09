//! `time` group: a clock, a blocking delay and the `timer`/`ptimer` triggers.
//!
//! Timers are tokio tasks that sleep and then signal their action.  The
//! group uses the runtime it was given, the ambient one, or a small runtime
//! of its own that lives as long as the group.

use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use std::time::{Duration, Instant};

use tokio::runtime::{Builder, Handle, Runtime};
use tokio::task::JoinHandle;

use crate::def::PrimitiveType::{Real, Void};
use crate::ffi::{
    ActionData, ActionRequest, ActionState, FfiError, FfiGroup, FfiVariables, FunctionDefinition,
    GroupData, GroupHooks, Invocation,
};
use crate::interp::Value;

use super::get_real;

enum TimerRuntime {
    Shared(Handle),
    Owned(Runtime),
}

impl TimerRuntime {
    fn handle(&self) -> &Handle {
        match self {
            TimerRuntime::Shared(handle) => handle,
            TimerRuntime::Owned(runtime) => runtime.handle(),
        }
    }
}

pub struct TimeState {
    start: Instant,
    runtime: TimerRuntime,
}

impl TimeState {
    fn new(runtime: Option<Handle>) -> Result<Self, FfiError> {
        let runtime = match runtime.or_else(|| Handle::try_current().ok()) {
            Some(handle) => TimerRuntime::Shared(handle),
            None => TimerRuntime::Owned(
                Builder::new_multi_thread()
                    .worker_threads(1)
                    .thread_name("ts-timer")
                    .enable_time()
                    .build()
                    .map_err(|e| FfiError::new(format!("cannot start timer runtime: {e}")))?,
            ),
        };
        Ok(TimeState { start: Instant::now(), runtime })
    }
}

struct TimeHooks {
    runtime: Option<Handle>,
}

impl GroupHooks for TimeHooks {
    fn begin(&self, _variables: &FfiVariables) -> Result<GroupData, FfiError> {
        Ok(Box::new(TimeState::new(self.runtime.clone())?))
    }

    fn end(&self, data: GroupData) {
        if let Ok(state) = data.downcast::<TimeState>() {
            if let TimerRuntime::Owned(runtime) = state.runtime {
                runtime.shutdown_background();
            }
        }
    }
}

pub fn group(runtime: Option<Handle>) -> FfiGroup {
    FfiGroup::new(
        "time",
        vec![
            FunctionDefinition::function("time", &[], Real, |inv, _| {
                let state = inv.group::<TimeState>()?;
                Ok(Some(Value::Real(state.start.elapsed().as_secs_f64())))
            })
            .with_doc("Seconds since the program started."),
            FunctionDefinition::function("delay", &[Real], Void, |_, args| {
                std::thread::sleep(period(args, "delay")?);
                Ok(None)
            })
            .with_doc("Block for the given number of milliseconds."),
            FunctionDefinition::action("timer", &[Real], |inv, request, args, data| {
                control(inv, request, args, data, false)
            })
            .with_doc("Trigger once after the given number of milliseconds."),
            FunctionDefinition::action("ptimer", &[Real], |inv, request, args, data| {
                control(inv, request, args, data, true)
            })
            .with_doc("Trigger every given number of milliseconds."),
        ],
    )
    .with_hooks(Arc::new(TimeHooks { runtime }))
}

fn period(args: &[Value], name: &str) -> Result<Duration, FfiError> {
    let ms = get_real(args, 0, name)?;
    let ms = if ms.is_finite() { ms.max(0.0) } else { 0.0 };
    Ok(Duration::from_secs_f64(ms / 1000.0))
}

// ── Timer triggers ────────────────────────────────────────────────────────────

struct Timer {
    fired: Arc<AtomicBool>,
    task: Option<JoinHandle<()>>,
    /// A one-shot timer that has run its action.
    done: bool,
}

impl Timer {
    fn start(inv: &mut Invocation<'_>, after: Duration) -> Result<Self, FfiError> {
        let mut timer = Timer { fired: Arc::new(AtomicBool::new(false)), task: None, done: false };
        timer.restart(inv, after)?;
        Ok(timer)
    }

    fn restart(&mut self, inv: &mut Invocation<'_>, after: Duration) -> Result<(), FfiError> {
        let signal = inv.signal.clone().ok_or_else(|| FfiError::new("timer used outside an action"))?;
        let handle = inv.group::<TimeState>()?.runtime.handle().clone();
        self.cancel();
        self.fired.store(false, Ordering::SeqCst);
        let fired = Arc::clone(&self.fired);
        self.task = Some(handle.spawn(async move {
            tokio::time::sleep(after).await;
            fired.store(true, Ordering::SeqCst);
            signal.signal();
        }));
        Ok(())
    }

    fn cancel(&mut self) {
        if let Some(task) = self.task.take() {
            task.abort();
        }
    }
}

impl Drop for Timer {
    fn drop(&mut self) {
        self.cancel();
    }
}

fn timer_of(data: &mut ActionData) -> Result<&mut Timer, FfiError> {
    data.as_mut()
        .and_then(|d| d.downcast_mut::<Timer>())
        .ok_or_else(|| FfiError::new("timer was not initialised"))
}

fn control(
    inv: &mut Invocation<'_>,
    request: ActionRequest,
    args: &[Value],
    data: &mut ActionData,
    periodic: bool,
) -> Result<ActionState, FfiError> {
    let name = if periodic { "ptimer" } else { "timer" };
    match request {
        ActionRequest::Init => {
            let timer = Timer::start(inv, period(args, name)?)?;
            *data = Some(Box::new(timer));
            Ok(ActionState::Pending)
        }
        ActionRequest::Query => {
            let timer = timer_of(data)?;
            Ok(if timer.done {
                ActionState::Finished
            } else if timer.fired.load(Ordering::SeqCst) {
                ActionState::Triggered
            } else {
                ActionState::Pending
            })
        }
        ActionRequest::Running => {
            let timer = timer_of(data)?;
            if timer.fired.swap(false, Ordering::SeqCst) && !periodic {
                timer.done = true;
                // Wake the action once more so it can see it is finished.
                if let Some(signal) = &inv.signal {
                    signal.signal();
                }
            }
            Ok(ActionState::Pending)
        }
        ActionRequest::Update => {
            if periodic {
                let after = period(args, name)?;
                timer_of(data)?.restart(inv, after)?;
            }
            Ok(ActionState::Pending)
        }
        ActionRequest::Stop => {
            *data = None;
            Ok(ActionState::Finished)
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::ffi::{FunctionKind, TracingExecIf};
    use crate::interp::{ActionKey, ActionSignal, SignalHub};

    const KEY: ActionKey = ActionKey { invocation: 1, action: 0 };

    fn send(
        state: &mut TimeState,
        hub: &SignalHub,
        name: &str,
        request: ActionRequest,
        ms: f64,
        data: &mut ActionData,
    ) -> ActionState {
        let group = group(None);
        let def = group.functions.iter().find(|d| d.name == name).unwrap();
        let FunctionKind::ActionController(f) = &def.kind else { unreachable!() };
        let mut inv = Invocation {
            execif: &TracingExecIf,
            signal: Some(ActionSignal::new(hub.clone(), KEY)),
            unit_invocation_id: 1,
            unit_name: "t",
            unit_location: 1,
            group_data: state,
        };
        f(&mut inv, request, &[Value::Real(ms)], data).unwrap()
    }

    #[test]
    fn one_shot_timer_fires_then_finishes() {
        let mut state = TimeState::new(None).unwrap();
        let hub = SignalHub::new();
        let mut data: ActionData = None;

        assert_eq!(send(&mut state, &hub, "timer", ActionRequest::Init, 5.0, &mut data), ActionState::Pending);
        assert_eq!(hub.wait(), vec![KEY]);
        assert_eq!(send(&mut state, &hub, "timer", ActionRequest::Query, 0.0, &mut data), ActionState::Triggered);
        send(&mut state, &hub, "timer", ActionRequest::Running, 0.0, &mut data);
        assert_eq!(hub.take(), vec![KEY]);
        assert_eq!(send(&mut state, &hub, "timer", ActionRequest::Query, 0.0, &mut data), ActionState::Finished);
    }

    #[test]
    fn periodic_timer_restarts_on_update() {
        let mut state = TimeState::new(None).unwrap();
        let hub = SignalHub::new();
        let mut data: ActionData = None;

        send(&mut state, &hub, "ptimer", ActionRequest::Init, 5.0, &mut data);
        for _ in 0..3 {
            assert_eq!(hub.wait(), vec![KEY]);
            assert_eq!(send(&mut state, &hub, "ptimer", ActionRequest::Query, 0.0, &mut data), ActionState::Triggered);
            send(&mut state, &hub, "ptimer", ActionRequest::Running, 0.0, &mut data);
            assert_eq!(send(&mut state, &hub, "ptimer", ActionRequest::Query, 0.0, &mut data), ActionState::Pending);
            send(&mut state, &hub, "ptimer", ActionRequest::Update, 5.0, &mut data);
        }
        send(&mut state, &hub, "ptimer", ActionRequest::Stop, 0.0, &mut data);
        assert!(data.is_none());
    }

    #[test]
    fn clock_advances() {
        let group = group(None);
        let mut state = TimeState::new(None).unwrap();
        std::thread::sleep(Duration::from_millis(2));
        let t = crate::stdlib::testing::call(&group, "time", &[], &[], &mut state).unwrap().unwrap();
        assert!(t.as_real() > 0.0);
    }

    #[test]
    fn negative_period_is_zero() {
        assert_eq!(period(&[Value::Real(-5.0)], "delay").unwrap(), Duration::ZERO);
        assert_eq!(period(&[Value::Real(250.0)], "delay").unwrap(), Duration::from_millis(250));
    }
}
