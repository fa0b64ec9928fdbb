//! Chat event sources for the chat reader loop.
//!
//! [`CommandChatSource`] runs a chat feed process that prints one JSON record
//! per line in the chat-downloader message schema. Besides chat messages the
//! feed may print `{"status": "connected"}` once the chat is open and
//! `{"error": "...", "kind": "..."}` when it gives up.

use crate::error::IngestionError;
use crate::utterance::{ChatEventKind, RawChatEvent};
use parking_lot::Mutex;
use serde::Deserialize;
use std::io::{BufRead, BufReader};
use std::path::Path;
use std::process::{Child, ChildStdout, Command, Stdio};
use std::sync::Arc;

/// Unblocks a `next_event` call that is waiting on external I/O.
pub type Interrupter = Box<dyn Fn() + Send + Sync>;

/// A lazy, non-restartable stream of chat events.
pub trait ChatSource: Send {
    /// Open the chat for `url`. The cookie file is passed through untouched.
    fn connect(&mut self, url: &str, cookies: Option<&Path>) -> Result<(), IngestionError>;

    /// Block until the next event. `Ok(None)` means the stream ended.
    fn next_event(&mut self) -> Result<Option<RawChatEvent>, IngestionError>;

    /// Release the connection. Must be idempotent.
    fn close(&mut self);

    /// Handle that makes a blocked `next_event` return during shutdown.
    fn interrupter(&self) -> Option<Interrupter> {
        None
    }
}

/// An open chat connection. Closing is tied to drop, so the source is
/// released exactly once on every exit path of the reader.
pub struct ChatConnection<'a, S: ChatSource + ?Sized> {
    source: &'a mut S,
}

impl<'a, S: ChatSource + ?Sized> ChatConnection<'a, S> {
    pub fn open(source: &'a mut S, url: &str, cookies: Option<&Path>) -> Result<Self, IngestionError> {
        let connection = ChatConnection { source };
        connection.source.connect(url, cookies)?;
        Ok(connection)
    }

    pub fn next_event(&mut self) -> Result<Option<RawChatEvent>, IngestionError> {
        self.source.next_event()
    }
}

impl<S: ChatSource + ?Sized> Drop for ChatConnection<'_, S> {
    fn drop(&mut self) {
        self.source.close();
        tracing::debug!("Chat connection closed");
    }
}

/// Program used when no feed command is configured: a thin bridge over the
/// `chat_downloader` package that prints every message as a JSON line.
pub const DEFAULT_FEED_PROGRAM: &str = "python3";

const FEED_BRIDGE: &str = r#"
import json, sys
from chat_downloader import ChatDownloader

def emit(record):
    sys.stdout.write(json.dumps(record, default=str) + "\n")
    sys.stdout.flush()

try:
    options = {"cookies": sys.argv[2]} if len(sys.argv) > 2 else {}
    chat = ChatDownloader(**options).get_chat(sys.argv[1], message_groups=["messages", "superchat"])
    emit({"status": "connected"})
    for message in chat:
        emit(message)
except KeyboardInterrupt:
    pass
except BrokenPipeError:
    pass
except Exception as error:
    emit({"error": str(error), "kind": type(error).__name__})
    sys.exit(1)
"#;

/// One line of feed output.
#[derive(Debug, Deserialize)]
#[serde(untagged)]
enum FeedRecord {
    Failure {
        error: String,
        #[serde(default)]
        kind: Option<String>,
    },
    Status {
        status: String,
    },
    Message(FeedMessage),
}

#[derive(Debug, Deserialize)]
struct FeedMessage {
    #[serde(default)]
    message_type: String,
    #[serde(default)]
    author: Option<FeedAuthor>,
    #[serde(default)]
    message: Option<String>,
}

#[derive(Debug, Deserialize)]
struct FeedAuthor {
    #[serde(default)]
    name: Option<String>,
}

/// Parsed feed line, before failure classification.
#[derive(Debug, PartialEq)]
enum FeedLine {
    Event(RawChatEvent),
    Connected,
    Failed { message: String, kind: Option<String> },
    Ignored,
}

fn parse_feed_line(line: &str) -> FeedLine {
    let line = line.trim();
    if line.is_empty() {
        return FeedLine::Ignored;
    }
    match serde_json::from_str::<FeedRecord>(line) {
        Ok(FeedRecord::Failure { error, kind }) => FeedLine::Failed {
            message: error,
            kind,
        },
        Ok(FeedRecord::Status { status }) if status == "connected" => FeedLine::Connected,
        Ok(FeedRecord::Status { .. }) => FeedLine::Ignored,
        Ok(FeedRecord::Message(message)) => FeedLine::Event(RawChatEvent {
            kind: ChatEventKind::from_tag(&message.message_type),
            author: message.author.and_then(|author| author.name).unwrap_or_default(),
            body: message.message.unwrap_or_default(),
        }),
        Err(err) => {
            tracing::debug!(error = %err, "Skipping unparsable chat feed line");
            FeedLine::Ignored
        }
    }
}

/// Chat source backed by a feed process.
pub struct CommandChatSource {
    command: Vec<String>,
    child: Arc<Mutex<Option<Child>>>,
    stdout: Option<BufReader<ChildStdout>>,
    cookies_provided: bool,
}

impl CommandChatSource {
    /// Use the built-in `chat_downloader` bridge.
    pub fn new() -> Self {
        Self::with_command(vec![
            DEFAULT_FEED_PROGRAM.to_string(),
            "-u".to_string(),
            "-c".to_string(),
            FEED_BRIDGE.to_string(),
        ])
    }

    /// Use a custom feed. The URL and, if given, the cookie path are appended
    /// as the last arguments.
    pub fn with_command(command: Vec<String>) -> Self {
        CommandChatSource {
            command,
            child: Arc::new(Mutex::new(None)),
            stdout: None,
            cookies_provided: false,
        }
    }

    fn finish(&mut self) -> Result<Option<RawChatEvent>, IngestionError> {
        self.stdout = None;
        // Reap outside the lock so the interrupter never waits on us
        let Some(mut child) = self.child.lock().take() else {
            return Ok(None);
        };
        let status = child
            .wait()
            .map_err(|err| IngestionError::Connection(err.to_string()))?;
        if status.success() {
            Ok(None)
        } else {
            Err(IngestionError::Connection(format!(
                "chat feed exited with {}",
                status
            )))
        }
    }
}

impl Default for CommandChatSource {
    fn default() -> Self {
        Self::new()
    }
}

impl ChatSource for CommandChatSource {
    fn connect(&mut self, url: &str, cookies: Option<&Path>) -> Result<(), IngestionError> {
        let (program, args) = self
            .command
            .split_first()
            .ok_or_else(|| IngestionError::Connection("chat feed command is empty".to_string()))?;

        let mut command = Command::new(program);
        command.args(args).arg(url);
        if let Some(cookies) = cookies {
            tracing::info!(path = %cookies.display(), "Using cookies");
            command.arg(cookies);
        }
        self.cookies_provided = cookies.is_some();

        let mut child = command
            .stdin(Stdio::null())
            .stdout(Stdio::piped())
            .stderr(Stdio::inherit())
            .spawn()
            .map_err(|err| {
                IngestionError::Connection(format!("failed to start chat feed `{}`: {}", program, err))
            })?;

        self.stdout = child.stdout.take().map(BufReader::new);
        *self.child.lock() = Some(child);
        tracing::debug!(program = %program, "Chat feed started");
        Ok(())
    }

    fn next_event(&mut self) -> Result<Option<RawChatEvent>, IngestionError> {
        loop {
            let Some(stdout) = self.stdout.as_mut() else {
                return Ok(None);
            };

            let mut line = String::new();
            let read = stdout
                .read_line(&mut line)
                .map_err(|err| IngestionError::Connection(err.to_string()))?;
            if read == 0 {
                return self.finish();
            }

            match parse_feed_line(&line) {
                FeedLine::Event(event) => return Ok(Some(event)),
                FeedLine::Connected => tracing::info!("Connected to YouTube chat successfully"),
                FeedLine::Failed { message, kind } => {
                    tracing::debug!(kind = ?kind, %message, "Chat feed reported a failure");
                    return Err(IngestionError::classify(&message, self.cookies_provided));
                }
                FeedLine::Ignored => {}
            }
        }
    }

    fn close(&mut self) {
        self.stdout = None;
        let child = self.child.lock().take();
        if let Some(mut child) = child {
            // Already exited is fine; kill only fails for a reaped process
            let _ = child.kill();
            let _ = child.wait();
        }
    }

    fn interrupter(&self) -> Option<Interrupter> {
        let child = Arc::clone(&self.child);
        Some(Box::new(move || {
            if let Some(child) = child.lock().as_mut() {
                let _ = child.kill();
            }
        }))
    }
}
