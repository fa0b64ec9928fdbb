//! Speaker loop (consumer side of the pipeline).

use crate::channel::BoundedMessageChannel;
use crate::config::Config;
use crate::gate::PauseGate;
use crate::shutdown::{ShutdownReason, ShutdownSignal};
use crate::speech::{SpeechSession, SpeechSink};
use crate::utterance::Utterance;
use std::sync::Arc;
use std::time::Duration;

/// What the speaker did before it stopped.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct DeliveryReport {
    /// Utterances handed to the speech engine
    pub delivered: u64,
    /// Utterances the speech engine refused
    pub failed: u64,
    /// Utterances still waiting when shutdown arrived
    pub discarded: u64,
}

/// Waits on the pause gate, pulls from the queue and speaks.
pub struct DeliveryLoop {
    config: Arc<Config>,
    channel: BoundedMessageChannel,
    gate: PauseGate,
    shutdown: ShutdownSignal,
    poll_interval: Duration,
}

impl DeliveryLoop {
    pub fn new(
        config: Arc<Config>,
        channel: BoundedMessageChannel,
        gate: PauseGate,
        shutdown: ShutdownSignal,
        poll_interval: Duration,
    ) -> Self {
        DeliveryLoop {
            config,
            channel,
            gate,
            shutdown,
            poll_interval,
        }
    }

    /// Run until shutdown is raised. The sink is closed before this returns.
    pub fn run<S: SpeechSink + ?Sized>(&self, sink: &mut S) -> DeliveryReport {
        let mut report = DeliveryReport::default();
        let mut session = SpeechSession::new(sink);

        let settings = self.config.speech_settings();
        if let Err(err) = session.configure(&settings) {
            tracing::error!(error = %err, "Failed to initialize speech dispatcher");
            self.shutdown.raise(ShutdownReason::SpeechUnavailable);
            report.discarded = self.channel.drain() as u64;
            return report;
        }
        tracing::info!(
            module = settings.voice.module_name(),
            priority = settings.priority.as_ssip(),
            "Speech dispatcher initialized"
        );

        // Taken from the queue but not yet spoken because the gate closed
        let mut held: Option<Utterance> = None;

        while !self.shutdown.is_raised() {
            if !self.gate.await_running(self.poll_interval) {
                continue;
            }

            let utterance = match held.take() {
                Some(utterance) => utterance,
                None => match self.channel.take(self.poll_interval) {
                    Some(utterance) => utterance,
                    None => continue,
                },
            };

            if self.shutdown.is_raised() || self.gate.is_paused() {
                held = Some(utterance);
                continue;
            }

            match session.speak(utterance.text(), settings.priority) {
                Ok(()) => {
                    report.delivered += 1;
                    println!("{}", utterance.text());
                }
                Err(err) => {
                    report.failed += 1;
                    tracing::warn!(error = %err, "Error speaking message");
                }
            }
        }

        report.discarded = self.channel.drain() as u64 + u64::from(held.is_some());
        tracing::info!(
            delivered = report.delivered,
            failed = report.failed,
            discarded = report.discarded,
            "Speaker stopped"
        );
        report
    }
}
