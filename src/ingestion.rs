//! Chat reader loop (producer side of the pipeline).

use crate::channel::BoundedMessageChannel;
use crate::chat_source::{ChatConnection, ChatSource};
use crate::config::Config;
use crate::error::IngestionError;
use crate::shutdown::{ShutdownReason, ShutdownSignal};
use std::sync::Arc;

/// What the chat reader did before it stopped.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct IngestionReport {
    /// Events read from the source
    pub received: u64,
    /// Utterances accepted into the queue
    pub accepted: u64,
    /// Utterances dropped because the queue was full
    pub dropped: u64,
    /// Events that produced no utterance
    pub skipped: u64,
    /// Fatal connection failure, if that is what ended the loop
    pub failure: Option<IngestionError>,
}

/// Reads chat events, normalises them and offers them to the queue.
pub struct IngestionLoop {
    config: Arc<Config>,
    channel: BoundedMessageChannel,
    shutdown: ShutdownSignal,
}

impl IngestionLoop {
    pub fn new(config: Arc<Config>, channel: BoundedMessageChannel, shutdown: ShutdownSignal) -> Self {
        IngestionLoop {
            config,
            channel,
            shutdown,
        }
    }

    /// Run until the stream ends, fails, or shutdown is raised.
    ///
    /// Failures and natural end of stream both raise the shutdown signal. The
    /// source is closed before this returns on every path.
    pub fn run<S: ChatSource + ?Sized>(&self, source: &mut S) -> IngestionReport {
        let mut report = IngestionReport::default();
        tracing::info!(url = %self.config.url(), "Connecting to YouTube chat");

        let mut connection =
            match ChatConnection::open(source, self.config.url(), self.config.cookies_path()) {
                Ok(connection) => connection,
                Err(err) => {
                    self.fail(&mut report, err);
                    return report;
                }
            };

        let format = self.config.message_format();
        let offer_timeout = self.config.offer_timeout();

        loop {
            if self.shutdown.is_raised() {
                break;
            }

            let event = match connection.next_event() {
                Ok(Some(event)) => event,
                Ok(None) => {
                    if !self.shutdown.is_raised() {
                        tracing::info!("Chat stream ended");
                        self.shutdown.raise(ShutdownReason::StreamEnded);
                    }
                    break;
                }
                Err(err) => {
                    if self.shutdown.is_raised() {
                        tracing::debug!(error = %err, "Chat feed stopped during shutdown");
                    } else {
                        self.fail(&mut report, err);
                    }
                    break;
                }
            };
            report.received += 1;

            // The source is externally driven, so check once per event as well
            if self.shutdown.is_raised() {
                break;
            }

            let Some(utterance) = format.utterance_for(&event) else {
                report.skipped += 1;
                continue;
            };

            if self.channel.offer(utterance, offer_timeout) {
                report.accepted += 1;
                if report.accepted == 1 {
                    tracing::info!("Receiving messages... (first message received)");
                }
            } else {
                report.dropped += 1;
                tracing::debug!(
                    capacity = self.channel.capacity(),
                    "Message queue full, dropping newest message"
                );
            }
        }
        drop(connection);

        if report.accepted == 0 && report.failure.is_none() {
            tracing::warn!("No messages received. The chat might be very quiet or disabled.");
        }
        tracing::info!(
            received = report.received,
            accepted = report.accepted,
            dropped = report.dropped,
            skipped = report.skipped,
            "Chat reader stopped"
        );
        report
    }

    fn fail(&self, report: &mut IngestionReport, err: IngestionError) {
        tracing::error!(error = %err, "Chat reader stopped due to error");
        report.failure = Some(err);
        self.shutdown.raise(ShutdownReason::IngestionFailed);
    }
}
