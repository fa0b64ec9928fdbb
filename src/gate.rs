//! Pause gate shared between the operator and the speaker loop.
//!
//! The speaker waits on the gate before every delivery. Waiting parks the
//! thread on a condition variable, so a paused speaker costs no CPU and wakes
//! as soon as the gate is resumed.

use parking_lot::{Condvar, Mutex};
use std::sync::Arc;
use std::time::{Duration, Instant};

/// The two states of the gate.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum GateState {
    Running,
    Paused,
}

#[derive(Debug)]
struct GateInner {
    state: Mutex<GateState>,
    changed: Condvar,
}

/// Shared running/paused switch. Clones observe the same state.
#[derive(Debug, Clone)]
pub struct PauseGate {
    inner: Arc<GateInner>,
}

impl PauseGate {
    /// Create a new gate in the [`GateState::Running`] state.
    #[must_use]
    pub fn new() -> Self {
        Self {
            inner: Arc::new(GateInner {
                state: Mutex::new(GateState::Running),
                changed: Condvar::new(),
            }),
        }
    }

    /// Pause delivery. Pausing an already paused gate is a no-op.
    pub fn pause(&self) {
        self.set(GateState::Paused);
    }

    /// Resume delivery and wake any waiting speaker.
    pub fn resume(&self) {
        self.set(GateState::Running);
    }

    /// Flip the gate and return the new state.
    pub fn toggle(&self) -> GateState {
        let mut state = self.inner.state.lock();
        *state = match *state {
            GateState::Running => GateState::Paused,
            GateState::Paused => GateState::Running,
        };
        let new_state = *state;
        drop(state);

        if new_state == GateState::Running {
            self.inner.changed.notify_all();
        }
        tracing::debug!(state = ?new_state, "Pause gate toggled");
        new_state
    }

    #[must_use]
    pub fn state(&self) -> GateState {
        *self.inner.state.lock()
    }

    #[must_use]
    pub fn is_paused(&self) -> bool {
        self.state() == GateState::Paused
    }

    /// Block until the gate is running or `timeout` elapses.
    ///
    /// Returns `true` if the gate is running, `false` if it was still paused
    /// when the timeout ran out.
    pub fn await_running(&self, timeout: Duration) -> bool {
        let deadline = Instant::now() + timeout;
        let mut state = self.inner.state.lock();
        while *state == GateState::Paused {
            if self.inner.changed.wait_until(&mut state, deadline).timed_out() {
                return *state == GateState::Running;
            }
        }
        true
    }

    fn set(&self, new_state: GateState) {
        let mut state = self.inner.state.lock();
        if *state == new_state {
            return;
        }
        *state = new_state;
        drop(state);

        if new_state == GateState::Running {
            self.inner.changed.notify_all();
        }
        tracing::debug!(state = ?new_state, "Pause gate changed");
    }
}

impl Default for PauseGate {
    fn default() -> Self {
        Self::new()
    }
}
