//! Control surface (component C8).
//!
//! Stop/suspend/resume signalling plus the two observer hooks. Per §5,
//! control operations may be invoked from a thread other than the
//! executor's: they only touch an atomic state flag and a `Condvar`-backed
//! park/unpark pair, never node state or the variable store.

use std::sync::atomic::{AtomicU8, Ordering};
use std::sync::{Condvar, Mutex};

/// The executor's run state.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ExecutorState {
    Stopped,
    Running,
    Suspended,
}

impl ExecutorState {
    fn from_tag(tag: u8) -> Self {
        match tag {
            1 => Self::Running,
            2 => Self::Suspended,
            _ => Self::Stopped,
        }
    }

    fn tag(self) -> u8 {
        match self {
            Self::Stopped => 0,
            Self::Running => 1,
            Self::Suspended => 2,
        }
    }
}

type NodeObserver = Box<dyn FnMut(&str, bool) + Send>;
type TaskStopObserver = Box<dyn FnMut(&str, &str) + Send>;

/// The cooperative stop/suspend/resume signal, shared between the executor
/// thread and any external controller thread.
///
/// `state` uses `Ordering::Acquire`/`Release` on every access so the
/// executor is guaranteed to observe the latest value before deciding its
/// next transition, per §5's acquire/release requirement.
pub struct Control {
    state: AtomicU8,
    park: Mutex<()>,
    condvar: Condvar,
    node_observer: Mutex<Option<NodeObserver>>,
    task_stop_observer: Mutex<Option<TaskStopObserver>>,
}

impl std::fmt::Debug for Control {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Control").field("state", &self.state()).finish_non_exhaustive()
    }
}

impl Default for Control {
    fn default() -> Self {
        Self::new()
    }
}

impl Control {
    #[must_use]
    pub fn new() -> Self {
        Self {
            state: AtomicU8::new(ExecutorState::Stopped.tag()),
            park: Mutex::new(()),
            condvar: Condvar::new(),
            node_observer: Mutex::new(None),
            task_stop_observer: Mutex::new(None),
        }
    }

    #[must_use]
    pub fn state(&self) -> ExecutorState {
        ExecutorState::from_tag(self.state.load(Ordering::Acquire))
    }

    fn set_state(&self, state: ExecutorState) {
        self.state.store(state.tag(), Ordering::Release);
    }

    /// Marks the executor `Running`. Called by `Executor::run` on entry.
    pub(crate) fn start(&self) {
        self.set_state(ExecutorState::Running);
    }

    /// Sets `Stopped` and wakes the parked handle, if any. Idempotent:
    /// repeated calls are safe and leave the state `Stopped`.
    pub fn stop(&self) {
        self.set_state(ExecutorState::Stopped);
        let _guard = self.park.lock().unwrap();
        self.condvar.notify_all();
    }

    /// `Running → Suspended`; no-op from any other state.
    pub fn suspend(&self) {
        let _ = self.state.compare_exchange(
            ExecutorState::Running.tag(),
            ExecutorState::Suspended.tag(),
            Ordering::AcqRel,
            Ordering::Acquire,
        );
    }

    /// `Suspended → Running` and wakes the parked handle.
    pub fn resume(&self) {
        let changed = self
            .state
            .compare_exchange(
                ExecutorState::Suspended.tag(),
                ExecutorState::Running.tag(),
                Ordering::AcqRel,
                Ordering::Acquire,
            )
            .is_ok();
        if changed {
            let _guard = self.park.lock().unwrap();
            self.condvar.notify_all();
        }
    }

    /// Parks the calling (executor) thread until the state is no longer
    /// `Suspended`. Used at the single cooperative yield point in
    /// `Executor::step` (§4.7(9)) and inside the poll-wait loop (§4.7(7c)).
    pub(crate) fn park_while_suspended(&self) {
        let guard = self.park.lock().unwrap();
        let _unused = self
            .condvar
            .wait_while(guard, |()| self.state() == ExecutorState::Suspended)
            .unwrap();
    }

    /// Registers the node-event observer, invoked after every action with
    /// `(node_name, success)`. Replaces any previously registered observer.
    pub fn set_node_observer(&self, observer: impl FnMut(&str, bool) + Send + 'static) {
        *self.node_observer.lock().unwrap() = Some(Box::new(observer));
    }

    /// Registers the task-stop observer, invoked by stop paths (including
    /// `StopTask`) with `(node_name, reason)`.
    pub fn set_task_stop_observer(&self, observer: impl FnMut(&str, &str) + Send + 'static) {
        *self.task_stop_observer.lock().unwrap() = Some(Box::new(observer));
    }

    pub(crate) fn notify_node_event(&self, node_name: &str, success: bool) {
        if let Some(observer) = self.node_observer.lock().unwrap().as_mut() {
            observer(node_name, success);
        }
    }

    pub(crate) fn notify_task_stop(&self, node_name: &str, reason: &str) {
        if let Some(observer) = self.task_stop_observer.lock().unwrap().as_mut() {
            observer(node_name, reason);
        }
    }

    /// Stops the executor and fires `on_task_stop`, the path used by the
    /// `StopTask` action and by an explicit external stop request that
    /// wants the same observer notification.
    pub fn request_stop(&self, node_name: &str, reason: &str) {
        self.notify_task_stop(node_name, reason);
        self.stop();
    }
}
