/// Application-wide constants for the chat reader, speech delivery and shutdown handling

pub mod channel {
    /// Default number of utterances buffered between the chat reader and the speaker
    pub const DEFAULT_QUEUE_CAPACITY: usize = 50;

    /// Default time the chat reader waits for room in a full queue before
    /// dropping the newest message
    pub const DEFAULT_OFFER_TIMEOUT_MS: u64 = 100;

    /// Largest queue the chat reader may be configured with
    pub const MAX_QUEUE_CAPACITY: usize = 10_000;
}

pub mod polling {
    use std::time::Duration;

    /// Upper bound on how long a loop blocks on the pause gate or the queue
    /// before re-checking the shutdown signal
    pub const LOOP_POLL_INTERVAL: Duration = Duration::from_millis(250);

    /// How long the control loop waits for an operator key per iteration
    pub const OPERATOR_POLL_INTERVAL: Duration = Duration::from_millis(200);
}

pub mod shutdown {
    use std::time::Duration;

    /// How long the orchestrator waits for both loops after shutdown is raised
    pub const GRACE_PERIOD: Duration = Duration::from_secs(2);

    /// Exit code used when a second interrupt forces the process down
    pub const FORCED_EXIT_CODE: i32 = 130;
}

pub mod text {
    /// Replaces every URL in a chat message
    pub const LINK_PLACEHOLDER: &str = "[link]";

    /// Default number of characters of message body that get spoken
    pub const DEFAULT_MAX_MESSAGE_LENGTH: usize = 200;

    /// Author name used when the chat event carries none
    pub const UNKNOWN_AUTHOR: &str = "Unknown";
}

pub mod speech {
    use std::time::Duration;

    /// Application component of the SSIP client name
    pub const CLIENT_NAME: &str = "yt-liveread";

    /// Socket read/write timeout for a single SSIP exchange
    pub const RESPONSE_TIMEOUT: Duration = Duration::from_secs(5);

    /// Time allowed for an autospawned speech-dispatcher to create its socket
    pub const SPAWN_SETTLE_TIME: Duration = Duration::from_millis(500);
}
