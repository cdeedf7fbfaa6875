//! Background worker gating.
//!
//! Each worker (buffer flush, check sweep) loops on a `WorkerGate`: wait for
//! the interval timeout, an early signal, or a stop request. The gate keeps
//! intervals cancelable, which is what makes `shutdown()` a prompt barrier
//! instead of a wait for the next tick.

use std::sync::{Condvar, Mutex};
use std::time::Duration;

struct GateState {
    stop: bool,
    signaled: bool,
}

/// A cancelable interval wait shared between a worker and its owner.
pub struct WorkerGate {
    state: Mutex<GateState>,
    condvar: Condvar,
}

impl WorkerGate {
    pub fn new() -> Self {
        Self {
            state: Mutex::new(GateState {
                stop: false,
                signaled: false,
            }),
            condvar: Condvar::new(),
        }
    }

    /// Wake the worker before its interval elapses (e.g. buffer threshold).
    pub fn signal(&self) {
        let mut state = self.state.lock().expect("worker gate lock poisoned");
        state.signaled = true;
        self.condvar.notify_all();
    }

    /// Request shutdown and wake the worker.
    pub fn stop(&self) {
        let mut state = self.state.lock().expect("worker gate lock poisoned");
        state.stop = true;
        self.condvar.notify_all();
    }

    /// Block until `timeout` elapses, a signal arrives, or stop is requested.
    ///
    /// Returns `true` when the worker should run another iteration and
    /// `false` when it should exit.
    pub fn wait(&self, timeout: Duration) -> bool {
        let mut state = self.state.lock().expect("worker gate lock poisoned");

        if !state.stop && !state.signaled {
            let (guard, _timeout_result) = self
                .condvar
                .wait_timeout(state, timeout)
                .expect("worker gate lock poisoned");
            state = guard;
        }

        state.signaled = false;
        !state.stop
    }
}

impl Default for WorkerGate {
    fn default() -> Self {
        Self::new()
    }
}

#[cfg(test)]
mod tests {
    use std::sync::Arc;
    use std::time::Duration;

    use super::WorkerGate;

    /// A signal wakes the waiter before the timeout and keeps it running.
    #[test]
    fn test_signal_wakes_early() {
        let gate = Arc::new(WorkerGate::new());
        let waiter = Arc::clone(&gate);

        let handle = std::thread::spawn(move || waiter.wait(Duration::from_secs(30)));
        std::thread::sleep(Duration::from_millis(20));
        gate.signal();

        assert!(handle.join().unwrap(), "signal must keep the worker running");
    }

    /// Stop wakes the waiter and tells it to exit.
    #[test]
    fn test_stop_ends_wait() {
        let gate = Arc::new(WorkerGate::new());
        let waiter = Arc::clone(&gate);

        let handle = std::thread::spawn(move || waiter.wait(Duration::from_secs(30)));
        std::thread::sleep(Duration::from_millis(20));
        gate.stop();

        assert!(!handle.join().unwrap(), "stop must end the worker loop");
    }

    /// The timeout elapses into a normal iteration.
    #[test]
    fn test_timeout_runs_iteration() {
        let gate = WorkerGate::new();
        assert!(gate.wait(Duration::from_millis(10)));
    }
}
