//! One-shot shutdown signal shared by every component.
//!
//! The first component to raise the signal records why the run is ending.
//! Later calls are ignored, so the recorded reason (and the exit code derived
//! from it) always describes the event that actually started the shutdown.

use parking_lot::{Condvar, Mutex};
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use std::time::{Duration, Instant};

/// Why the run is ending.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ShutdownReason {
    /// The operator pressed `q`.
    OperatorQuit,
    /// SIGINT or SIGTERM.
    Interrupted,
    /// The chat feed finished on its own.
    StreamEnded,
    /// The chat connection failed.
    IngestionFailed,
    /// The speech engine could not be set up.
    SpeechUnavailable,
}

impl ShutdownReason {
    /// Process exit code for a run that ended for this reason.
    pub fn exit_code(self) -> i32 {
        match self {
            ShutdownReason::OperatorQuit
            | ShutdownReason::Interrupted
            | ShutdownReason::StreamEnded => 0,
            ShutdownReason::IngestionFailed | ShutdownReason::SpeechUnavailable => 1,
        }
    }
}

#[derive(Debug, Default)]
struct SignalInner {
    raised: AtomicBool,
    reason: Mutex<Option<ShutdownReason>>,
    notify: Condvar,
}

/// Monotonic NotSet -> Set flag. Clones observe the same flag.
#[derive(Debug, Clone, Default)]
pub struct ShutdownSignal {
    inner: Arc<SignalInner>,
}

impl ShutdownSignal {
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Raise the signal. Returns `true` if this call was the one that set it.
    pub fn raise(&self, reason: ShutdownReason) -> bool {
        let mut current = self.inner.reason.lock();
        if current.is_some() {
            return false;
        }
        *current = Some(reason);
        self.inner.raised.store(true, Ordering::SeqCst);
        drop(current);

        self.inner.notify.notify_all();
        tracing::info!(?reason, "Shutdown requested");
        true
    }

    /// Lock-free check used by the loops on every iteration.
    #[must_use]
    pub fn is_raised(&self) -> bool {
        self.inner.raised.load(Ordering::SeqCst)
    }

    #[must_use]
    pub fn reason(&self) -> Option<ShutdownReason> {
        *self.inner.reason.lock()
    }

    /// Block until the signal is raised or `timeout` elapses.
    /// Returns whether the signal is raised.
    pub fn wait_timeout(&self, timeout: Duration) -> bool {
        let deadline = Instant::now() + timeout;
        let mut reason = self.inner.reason.lock();
        while reason.is_none() {
            if self.inner.notify.wait_until(&mut reason, deadline).timed_out() {
                return reason.is_some();
            }
        }
        true
    }
}
