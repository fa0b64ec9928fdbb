//! Speech sink abstraction used by the speaker loop.

use crate::config::VoiceModule;
use crate::error::SpeechError;

/// Speech-dispatcher message priority.
///
/// Chat is read at [`Priority::Text`] so assistive technology speaking at a
/// higher priority can interrupt it.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Priority {
    Important,
    Message,
    Text,
    Notification,
    Progress,
}

impl Priority {
    pub fn as_ssip(self) -> &'static str {
        match self {
            Priority::Important => "important",
            Priority::Message => "message",
            Priority::Text => "text",
            Priority::Notification => "notification",
            Priority::Progress => "progress",
        }
    }
}

/// Voice parameters applied once when the sink is set up.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SpeechSettings {
    pub voice: VoiceModule,
    pub rate: i32,
    pub pitch: i32,
    pub volume: i32,
    pub language: String,
    pub priority: Priority,
}

/// Something that turns text into audio.
pub trait SpeechSink: Send {
    /// Apply voice parameters. Called once before the first `speak`.
    fn configure(&mut self, settings: &SpeechSettings) -> Result<(), SpeechError>;

    /// Queue `text` for playback. Returns once the engine has accepted it,
    /// without waiting for the audio to finish.
    fn speak(&mut self, text: &str, priority: Priority) -> Result<(), SpeechError>;

    /// Release the client. Must be idempotent and should let already queued
    /// audio finish.
    fn close(&mut self);
}

impl<S: SpeechSink + ?Sized> SpeechSink for Box<S> {
    fn configure(&mut self, settings: &SpeechSettings) -> Result<(), SpeechError> {
        (**self).configure(settings)
    }

    fn speak(&mut self, text: &str, priority: Priority) -> Result<(), SpeechError> {
        (**self).speak(text, priority)
    }

    fn close(&mut self) {
        (**self).close()
    }
}

/// Scoped use of a sink: the sink is closed when the session is dropped,
/// whichever way the speaker loop exits.
pub struct SpeechSession<'a, S: SpeechSink + ?Sized> {
    sink: &'a mut S,
}

impl<'a, S: SpeechSink + ?Sized> SpeechSession<'a, S> {
    pub fn new(sink: &'a mut S) -> Self {
        SpeechSession { sink }
    }

    pub fn configure(&mut self, settings: &SpeechSettings) -> Result<(), SpeechError> {
        self.sink.configure(settings)
    }

    pub fn speak(&mut self, text: &str, priority: Priority) -> Result<(), SpeechError> {
        self.sink.speak(text, priority)
    }
}

impl<S: SpeechSink + ?Sized> Drop for SpeechSession<'_, S> {
    fn drop(&mut self) {
        self.sink.close();
        tracing::debug!("Speech client released");
    }
}
