//! Owns the shared pipeline state, runs both loops on their own threads and
//! handles operator input on the calling thread.
//!
//! The three threads only talk through the queue, the pause gate and the
//! shutdown signal. Shutdown is cooperative: once it is raised, each loop
//! notices within one poll interval. Loops that are still running after the
//! grace period are abandoned and die with the process.

use crate::channel::BoundedMessageChannel;
use crate::chat_source::ChatSource;
use crate::config::Config;
use crate::constants::polling::{LOOP_POLL_INTERVAL, OPERATOR_POLL_INTERVAL};
use crate::constants::shutdown::{FORCED_EXIT_CODE, GRACE_PERIOD};
use crate::delivery::{DeliveryLoop, DeliveryReport};
use crate::error::IngestionError;
use crate::gate::{GateState, PauseGate};
use crate::ingestion::{IngestionLoop, IngestionReport};
use crate::operator::{KeyAction, OperatorCommand, OperatorInput};
use crate::shutdown::{ShutdownReason, ShutdownSignal};
use crate::speech::SpeechSink;
use crossbeam_channel::{unbounded, Sender};
use std::io;
use std::sync::Arc;
use std::thread;
use std::time::{Duration, Instant};

/// Final state of a run.
#[derive(Debug, Default)]
pub struct RunSummary {
    pub reason: Option<ShutdownReason>,
    /// `None` if the chat reader was abandoned after the grace period
    pub ingestion: Option<IngestionReport>,
    /// `None` if the speaker was abandoned after the grace period
    pub delivery: Option<DeliveryReport>,
}

impl RunSummary {
    pub fn exit_code(&self) -> i32 {
        self.reason.map_or(0, ShutdownReason::exit_code)
    }

    /// The chat failure that ended the run, if any.
    pub fn ingestion_failure(&self) -> Option<&IngestionError> {
        self.ingestion.as_ref().and_then(|report| report.failure.as_ref())
    }
}

enum LoopExit {
    Ingestion(IngestionReport),
    Delivery(DeliveryReport),
}

/// Raises shutdown if the owning thread unwinds, so a crashed loop cannot
/// leave the rest of the pipeline running.
struct PanicGuard {
    shutdown: ShutdownSignal,
    reason: ShutdownReason,
}

impl Drop for PanicGuard {
    fn drop(&mut self) {
        if thread::panicking() {
            tracing::error!(reason = ?self.reason, "Pipeline thread panicked");
            self.shutdown.raise(self.reason);
        }
    }
}

pub struct Orchestrator {
    config: Arc<Config>,
    channel: BoundedMessageChannel,
    gate: PauseGate,
    shutdown: ShutdownSignal,
    poll_interval: Duration,
    grace_period: Duration,
}

impl Orchestrator {
    pub fn new(config: Config) -> Self {
        let channel = BoundedMessageChannel::new(config.queue_capacity());
        Orchestrator {
            config: Arc::new(config),
            channel,
            gate: PauseGate::new(),
            shutdown: ShutdownSignal::new(),
            poll_interval: LOOP_POLL_INTERVAL,
            grace_period: GRACE_PERIOD,
        }
    }

    /// Override the loop poll interval and shutdown grace period.
    pub fn with_timing(mut self, poll_interval: Duration, grace_period: Duration) -> Self {
        self.poll_interval = poll_interval;
        self.grace_period = grace_period;
        self
    }

    pub fn shutdown_signal(&self) -> ShutdownSignal {
        self.shutdown.clone()
    }

    pub fn pause_gate(&self) -> PauseGate {
        self.gate.clone()
    }

    /// Start both loops, serve operator input until shutdown, then wait for
    /// the loops within the grace period.
    pub fn run<C, S, I>(self, mut source: C, mut sink: S, input: &mut I) -> io::Result<RunSummary>
    where
        C: ChatSource + 'static,
        S: SpeechSink + 'static,
        I: OperatorInput + ?Sized,
    {
        let (done_tx, done_rx) = unbounded();
        let interrupter = source.interrupter();

        let delivery = DeliveryLoop::new(
            Arc::clone(&self.config),
            self.channel.clone(),
            self.gate.clone(),
            self.shutdown.clone(),
            self.poll_interval,
        );
        self.spawn_loop("tts-speaker", ShutdownReason::SpeechUnavailable, &done_tx, move || {
            LoopExit::Delivery(delivery.run(&mut sink))
        })?;

        let ingestion = IngestionLoop::new(
            Arc::clone(&self.config),
            self.channel.clone(),
            self.shutdown.clone(),
        );
        let spawned = self.spawn_loop("chat-reader", ShutdownReason::IngestionFailed, &done_tx, move || {
            LoopExit::Ingestion(ingestion.run(&mut source))
        });
        if let Err(err) = spawned {
            self.shutdown.raise(ShutdownReason::IngestionFailed);
            return Err(err);
        }
        drop(done_tx);

        self.serve_operator(input);

        if let Some(interrupt) = interrupter {
            interrupt();
        }

        let mut summary = RunSummary::default();
        let deadline = Instant::now() + self.grace_period;
        while summary.ingestion.is_none() || summary.delivery.is_none() {
            match done_rx.recv_deadline(deadline) {
                Ok(LoopExit::Ingestion(report)) => summary.ingestion = Some(report),
                Ok(LoopExit::Delivery(report)) => summary.delivery = Some(report),
                Err(_) => {
                    tracing::warn!(
                        chat_reader_stopped = summary.ingestion.is_some(),
                        speaker_stopped = summary.delivery.is_some(),
                        grace_period_ms = self.grace_period.as_millis() as u64,
                        "Threads did not stop in time, abandoning them"
                    );
                    break;
                }
            }
        }

        summary.reason = self.shutdown.reason();
        Ok(summary)
    }

    fn spawn_loop<F>(
        &self,
        name: &str,
        panic_reason: ShutdownReason,
        done: &Sender<LoopExit>,
        body: F,
    ) -> io::Result<()>
    where
        F: FnOnce() -> LoopExit + Send + 'static,
    {
        let done = done.clone();
        let guard = PanicGuard {
            shutdown: self.shutdown.clone(),
            reason: panic_reason,
        };
        thread::Builder::new().name(name.to_string()).spawn(move || {
            let _guard = guard;
            tracing::debug!(thread = ?thread::current().name(), "Thread started");
            let exit = body();
            let _ = done.send(exit);
        })?;
        Ok(())
    }

    fn serve_operator<I: OperatorInput + ?Sized>(&self, input: &mut I) {
        let mut input_available = true;
        while !self.shutdown.is_raised() {
            if !input_available {
                self.shutdown.wait_timeout(OPERATOR_POLL_INTERVAL);
                continue;
            }
            match input.next_key(OPERATOR_POLL_INTERVAL) {
                Ok(Some(key)) => self.handle_key(key),
                Ok(None) => {}
                Err(err) => {
                    tracing::warn!(error = %err, "Keyboard input unavailable, use Ctrl+C to quit");
                    input_available = false;
                }
            }
        }
    }

    fn handle_key(&self, key: char) {
        match KeyAction::from_key(key) {
            KeyAction::Command(OperatorCommand::TogglePause) => match self.gate.toggle() {
                GateState::Paused => println!("⏸  PAUSED"),
                GateState::Running => println!("▶  RESUMED"),
            },
            KeyAction::Command(OperatorCommand::Quit) => {
                println!("Quitting...");
                self.shutdown.raise(ShutdownReason::OperatorQuit);
            }
            KeyAction::Ignore => {}
            KeyAction::Unknown(other) => {
                println!("Unknown command: {}", other);
                println!("Use 'p' to pause/resume or 'q' to quit");
            }
        }
    }
}

/// Route SIGINT/SIGTERM into the shutdown signal. A signal arriving while a
/// shutdown is already under way exits the process immediately.
pub fn install_signal_handlers(shutdown: ShutdownSignal) -> Result<(), ctrlc::Error> {
    ctrlc::set_handler(move || {
        if shutdown.raise(ShutdownReason::Interrupted) {
            println!("\n\nShutting down...");
        } else {
            eprintln!("Forced exit");
            std::process::exit(FORCED_EXIT_CODE);
        }
    })
}
