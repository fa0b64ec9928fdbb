//! Error types for configuration, chat ingestion and speech delivery.
//!
//! Only [`ConfigError`] and [`IngestionError`] ever reach the operator and end
//! the process. Queue and gate timeouts are plain control flow and have no
//! error type at all.

use crate::constants::channel::MAX_QUEUE_CAPACITY;
use crate::constants::polling::LOOP_POLL_INTERVAL;
use std::io;
use std::path::PathBuf;

/// Invalid run parameters. Always raised before any thread starts.
#[derive(Debug, thiserror::Error)]
pub enum ConfigError {
    #[error(
        "Invalid YouTube URL: {0}\nExpected format: https://www.youtube.com/watch?v=VIDEO_ID"
    )]
    InvalidUrl(String),

    #[error("Speech rate must be between -100 and 100 (got {0})")]
    RateOutOfRange(i32),

    #[error("Speech volume must be between 0 and 100 (got {0})")]
    VolumeOutOfRange(i32),

    #[error("Speech pitch must be between -100 and 100 (got {0})")]
    PitchOutOfRange(i32),

    #[error("Max message length must be positive")]
    MaxMessageLength,

    #[error("Queue max size must be between 1 and {}", MAX_QUEUE_CAPACITY)]
    QueueCapacity,

    #[error(
        "Offer timeout must be at most {} ms (got {0})",
        LOOP_POLL_INTERVAL.as_millis()
    )]
    OfferTimeout(u64),

    #[error("Language code cannot be empty")]
    EmptyLanguage,

    #[error("Chat feed command cannot be empty")]
    EmptyChatCommand,

    #[error("Failed to read settings file {}: {source}", path.display())]
    SettingsRead {
        path: PathBuf,
        #[source]
        source: io::Error,
    },

    #[error("Failed to parse settings file {}: {source}", path.display())]
    SettingsParse {
        path: PathBuf,
        #[source]
        source: serde_yaml::Error,
    },
}

/// Fatal failure of the chat connection. Ends the run with a non-zero exit code.
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum IngestionError {
    /// Video page could not be parsed and no cookies were supplied.
    #[error("Unable to parse video data (likely YouTube's cookie consent page)")]
    ConsentPage,

    /// Video page could not be parsed even though cookies were supplied.
    #[error("Unable to parse video data (the stream is probably not live)")]
    StreamNotLive,

    /// The video exists but has no chat to read.
    #[error("This stream does not have chat available")]
    ChatUnavailable,

    /// Anything else: network errors, a crashed feed process, bad URLs.
    #[error("Error connecting to chat: {0}")]
    Connection(String),
}

impl IngestionError {
    /// Classify a failure message reported by the chat feed.
    pub fn classify(message: &str, cookies_provided: bool) -> Self {
        let lowered = message.to_lowercase();
        if lowered.contains("unable to parse") {
            if cookies_provided {
                IngestionError::StreamNotLive
            } else {
                IngestionError::ConsentPage
            }
        } else if lowered.contains("no messages") || lowered.contains("chat") {
            IngestionError::ChatUnavailable
        } else {
            IngestionError::Connection(message.trim().to_string())
        }
    }

    /// Actionable advice printed under the error message.
    pub fn guidance(&self) -> &'static str {
        match self {
            IngestionError::ConsentPage => {
                "This is often caused by YouTube's cookie consent page.\n\
                 Solution: export cookies from your browser and use --cookies\n\
                 \n\
                 Steps to fix:\n\
                 \x20 1. Install a browser extension like 'Get cookies.txt LOCALLY'\n\
                 \x20 2. Visit youtube.com and accept cookies\n\
                 \x20 3. Export cookies to a file (cookies.txt)\n\
                 \x20 4. Run: yt-liveread URL --cookies cookies.txt"
            }
            IngestionError::StreamNotLive => {
                "Cookie file was provided but parsing still failed.\n\
                 Possible reasons:\n\
                 \x20 - The stream might not be live yet (check if it's 'upcoming')\n\
                 \x20 - The stream might have ended\n\
                 \x20 - Chat might be disabled for this stream\n\
                 \x20 - The cookies might be expired or invalid\n\
                 \n\
                 Tip: make sure you're using a currently LIVE stream with chat enabled"
            }
            IngestionError::ChatUnavailable => {
                "\x20 - Chat might be disabled by the streamer\n\
                 \x20 - The video might not be a livestream"
            }
            IngestionError::Connection(_) => {
                "Please check that the URL is correct and the stream is live"
            }
        }
    }
}

/// Failure talking to the speech engine.
#[derive(Debug, thiserror::Error)]
pub enum SpeechError {
    #[error("Speech dispatcher I/O error: {0}")]
    Io(#[from] io::Error),

    #[error("Speech dispatcher rejected `{command}`: {code} {message}")]
    Rejected {
        command: String,
        code: u16,
        message: String,
    },

    #[error("Malformed reply from speech dispatcher: {0}")]
    Protocol(String),

    #[error("Speech client is already closed")]
    Closed,
}
