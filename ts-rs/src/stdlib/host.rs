//! Host bridge: a fixed task that owns the host's output.
//!
//! Script code may run on any thread, but the host sink lives on one task.
//! FFI calls send a [`HostMessage`] over a bounded channel and block until
//! the task acknowledges it, so output stays ordered and the caller knows it
//! was delivered.

use tokio::runtime::Handle;
use tokio::sync::{mpsc, oneshot};
use tokio::task::JoinHandle;

use crate::ffi::{ExecIf, FfiError, Severity};

/// Pending requests the bridge accepts before senders block.
const BRIDGE_CAPACITY: usize = 64;

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum HostMessage {
    Output(String),
    Alert(Severity, String),
    ExceptionText(String),
}

/// Receiver of host messages, run on the bridge task.
pub trait HostSink: Send + 'static {
    fn deliver(&mut self, message: HostMessage);
}

impl<F: FnMut(HostMessage) + Send + 'static> HostSink for F {
    fn deliver(&mut self, message: HostMessage) {
        self(message)
    }
}

struct Request {
    message: HostMessage,
    reply: oneshot::Sender<()>,
}

/// Sending half of the bridge.  Cheap to clone.
#[derive(Clone, Debug)]
pub struct HostBridge {
    tx: mpsc::Sender<Request>,
}

impl HostBridge {
    /// Start the bridge task on `handle`.  The task ends once every
    /// `HostBridge` clone is dropped.
    pub fn spawn(handle: &Handle, mut sink: impl HostSink) -> (Self, JoinHandle<()>) {
        let (tx, mut rx) = mpsc::channel::<Request>(BRIDGE_CAPACITY);
        let task = handle.spawn(async move {
            while let Some(request) = rx.recv().await {
                sink.deliver(request.message);
                // The sender may have given up waiting.
                let _ = request.reply.send(());
            }
            tracing::debug!("host bridge closed");
        });
        (HostBridge { tx }, task)
    }

    /// Deliver `message` and wait for the host to take it.  Must not be
    /// called from inside an async task.
    pub fn send(&self, message: HostMessage) -> Result<(), FfiError> {
        let (reply, done) = oneshot::channel();
        self.tx
            .blocking_send(Request { message, reply })
            .map_err(|_| FfiError::new("host bridge is closed"))?;
        done.blocking_recv().map_err(|_| FfiError::new("host bridge dropped the request"))
    }
}

impl ExecIf for HostBridge {
    fn alert(&self, severity: Severity, text: &str) {
        if let Err(e) = self.send(HostMessage::Alert(severity, text.to_owned())) {
            tracing::warn!("{e}: {text}");
        }
    }

    fn set_exception_text(&self, text: &str) {
        if let Err(e) = self.send(HostMessage::ExceptionText(text.to_owned())) {
            tracing::warn!("{e}: {text}");
        }
    }

    fn output(&self, text: &str) {
        if let Err(e) = self.send(HostMessage::Output(text.to_owned())) {
            tracing::warn!("{e}: {text}");
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::{Arc, Mutex};

    #[test]
    fn messages_arrive_in_order() {
        let rt = tokio::runtime::Builder::new_multi_thread().worker_threads(1).build().unwrap();
        let seen = Arc::new(Mutex::new(Vec::new()));
        let sink = {
            let seen = Arc::clone(&seen);
            move |m: HostMessage| seen.lock().unwrap().push(m)
        };
        let (bridge, task) = HostBridge::spawn(rt.handle(), sink);

        let worker = {
            let bridge = bridge.clone();
            std::thread::spawn(move || {
                bridge.output("one");
                bridge.alert(Severity::Warning, "two");
            })
        };
        worker.join().unwrap();
        bridge.set_exception_text("three");
        drop(bridge);
        rt.block_on(task).unwrap();

        assert_eq!(
            *seen.lock().unwrap(),
            vec![
                HostMessage::Output("one".into()),
                HostMessage::Alert(Severity::Warning, "two".into()),
                HostMessage::ExceptionText("three".into()),
            ]
        );
    }

    #[test]
    fn send_after_close_fails() {
        let rt = tokio::runtime::Builder::new_multi_thread().worker_threads(1).build().unwrap();
        let (bridge, task) = HostBridge::spawn(rt.handle(), |_: HostMessage| {});
        task.abort();
        let _ = rt.block_on(task);
        assert!(bridge.send(HostMessage::Output("late".into())).is_err());
    }
}
