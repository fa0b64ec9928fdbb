use crate::constants::channel::{DEFAULT_OFFER_TIMEOUT_MS, DEFAULT_QUEUE_CAPACITY, MAX_QUEUE_CAPACITY};
use crate::constants::polling::LOOP_POLL_INTERVAL;
use crate::constants::text::DEFAULT_MAX_MESSAGE_LENGTH;
use crate::error::ConfigError;
use crate::speech::{Priority, SpeechSettings};
use crate::utterance::MessageFormat;
use once_cell::sync::Lazy;
use regex::Regex;
use serde::{Deserialize, Serialize};
use std::fs;
use std::num::NonZeroUsize;
use std::path::{Path, PathBuf};
use std::time::Duration;

static YOUTUBE_URL_PATTERNS: Lazy<[Regex; 3]> = Lazy::new(|| {
    [
        Regex::new(r"^https?://(www\.)?youtube\.com/watch\?v=[\w-]+").expect("valid pattern"),
        Regex::new(r"^https?://youtu\.be/[\w-]+").expect("valid pattern"),
        Regex::new(r"^https?://(www\.)?youtube\.com/live/[\w-]+").expect("valid pattern"),
    ]
});

/// Speech-dispatcher output module.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, clap::ValueEnum)]
#[serde(rename_all = "kebab-case")]
pub enum VoiceModule {
    EspeakNg,
    Pico,
    Festival,
}

impl VoiceModule {
    /// Module name as speech-dispatcher knows it.
    pub fn module_name(self) -> &'static str {
        match self {
            VoiceModule::EspeakNg => "espeak-ng",
            VoiceModule::Pico => "pico",
            VoiceModule::Festival => "festival",
        }
    }
}

/// Optional settings file contents. Every field falls back to a default.
#[derive(Debug, Serialize, Deserialize, Clone, Default)]
pub struct Settings {
    #[serde(default)]
    pub speech: SpeechDefaults,
    #[serde(default)]
    pub chat: ChatDefaults,
}

#[derive(Debug, Serialize, Deserialize, Clone)]
pub struct SpeechDefaults {
    #[serde(default = "default_voice")]
    pub voice: VoiceModule,
    #[serde(default)]
    pub rate: i32,
    #[serde(default = "default_volume")]
    pub volume: i32,
    #[serde(default)]
    pub pitch: i32,
    #[serde(default = "default_language")]
    pub language: String,
}

fn default_voice() -> VoiceModule {
    VoiceModule::EspeakNg
}

fn default_volume() -> i32 {
    100
}

fn default_language() -> String {
    "en".to_string()
}

impl Default for SpeechDefaults {
    fn default() -> Self {
        SpeechDefaults {
            voice: default_voice(),
            rate: 0,
            volume: default_volume(),
            pitch: 0,
            language: default_language(),
        }
    }
}

#[derive(Debug, Serialize, Deserialize, Clone)]
pub struct ChatDefaults {
    #[serde(default = "default_max_message_length")]
    pub max_message_length: usize,
    #[serde(default = "default_include_username")]
    pub include_username: bool,
    #[serde(default = "default_queue_size")]
    pub queue_size: usize,
    #[serde(default = "default_offer_timeout_ms")]
    pub offer_timeout_ms: u64,
    #[serde(default)]
    pub cookies: Option<PathBuf>,
    /// Replaces the built-in chat feed command (program followed by arguments).
    #[serde(default)]
    pub command: Option<Vec<String>>,
}

fn default_max_message_length() -> usize {
    DEFAULT_MAX_MESSAGE_LENGTH
}

fn default_include_username() -> bool {
    true
}

fn default_queue_size() -> usize {
    DEFAULT_QUEUE_CAPACITY
}

fn default_offer_timeout_ms() -> u64 {
    DEFAULT_OFFER_TIMEOUT_MS
}

impl Default for ChatDefaults {
    fn default() -> Self {
        ChatDefaults {
            max_message_length: default_max_message_length(),
            include_username: default_include_username(),
            queue_size: default_queue_size(),
            offer_timeout_ms: default_offer_timeout_ms(),
            cookies: None,
            command: None,
        }
    }
}

impl Settings {
    pub fn config_dir() -> Option<PathBuf> {
        dirs::home_dir().map(|home| home.join(".yt-liveread"))
    }

    pub fn config_path() -> Option<PathBuf> {
        Self::config_dir().map(|dir| dir.join("settings.yaml"))
    }

    /// Load settings from `explicit` if given (it must exist), otherwise from
    /// the default location if a file is there, otherwise use defaults.
    pub fn load(explicit: Option<&Path>) -> Result<Self, ConfigError> {
        match explicit {
            Some(path) => Self::load_from(path),
            None => match Self::config_path() {
                Some(path) if path.exists() => Self::load_from(&path),
                _ => Ok(Settings::default()),
            },
        }
    }

    pub fn load_from(path: &Path) -> Result<Self, ConfigError> {
        let contents = fs::read_to_string(path).map_err(|source| ConfigError::SettingsRead {
            path: path.to_path_buf(),
            source,
        })?;
        let settings: Settings =
            serde_yaml::from_str(&contents).map_err(|source| ConfigError::SettingsParse {
                path: path.to_path_buf(),
                source,
            })?;
        tracing::debug!(path = %path.display(), "Loaded settings file");
        Ok(settings)
    }
}

/// Validated, immutable run parameters.
#[derive(Debug, Clone)]
pub struct Config {
    url: String,
    voice: VoiceModule,
    rate: i32,
    volume: i32,
    pitch: i32,
    language: String,
    max_message_length: usize,
    include_username: bool,
    queue_capacity: NonZeroUsize,
    offer_timeout: Duration,
    cookies_path: Option<PathBuf>,
    chat_command: Option<Vec<String>>,
}

impl Config {
    /// Start a builder seeded with built-in defaults.
    pub fn builder(url: impl Into<String>) -> ConfigBuilder {
        ConfigBuilder::from_settings(url, Settings::default())
    }

    pub fn url(&self) -> &str {
        &self.url
    }

    pub fn voice(&self) -> VoiceModule {
        self.voice
    }

    pub fn rate(&self) -> i32 {
        self.rate
    }

    pub fn volume(&self) -> i32 {
        self.volume
    }

    pub fn pitch(&self) -> i32 {
        self.pitch
    }

    pub fn language(&self) -> &str {
        &self.language
    }

    pub fn max_message_length(&self) -> usize {
        self.max_message_length
    }

    pub fn include_username(&self) -> bool {
        self.include_username
    }

    pub fn queue_capacity(&self) -> NonZeroUsize {
        self.queue_capacity
    }

    pub fn offer_timeout(&self) -> Duration {
        self.offer_timeout
    }

    pub fn cookies_path(&self) -> Option<&Path> {
        self.cookies_path.as_deref()
    }

    pub fn chat_command(&self) -> Option<&[String]> {
        self.chat_command.as_deref()
    }

    pub fn message_format(&self) -> MessageFormat {
        MessageFormat {
            max_length: self.max_message_length,
            include_username: self.include_username,
        }
    }

    /// Speech parameters. Chat is read at low priority so screen readers can interrupt it.
    pub fn speech_settings(&self) -> SpeechSettings {
        SpeechSettings {
            voice: self.voice,
            rate: self.rate,
            pitch: self.pitch,
            volume: self.volume,
            language: self.language.clone(),
            priority: Priority::Text,
        }
    }
}

/// Collects run parameters from settings and CLI flags, then validates them.
#[derive(Debug, Clone)]
pub struct ConfigBuilder {
    url: String,
    voice: VoiceModule,
    rate: i32,
    volume: i32,
    pitch: i32,
    language: String,
    max_message_length: usize,
    include_username: bool,
    queue_size: usize,
    offer_timeout_ms: u64,
    cookies_path: Option<PathBuf>,
    chat_command: Option<Vec<String>>,
}

impl ConfigBuilder {
    pub fn from_settings(url: impl Into<String>, settings: Settings) -> Self {
        ConfigBuilder {
            url: url.into(),
            voice: settings.speech.voice,
            rate: settings.speech.rate,
            volume: settings.speech.volume,
            pitch: settings.speech.pitch,
            language: settings.speech.language,
            max_message_length: settings.chat.max_message_length,
            include_username: settings.chat.include_username,
            queue_size: settings.chat.queue_size,
            offer_timeout_ms: settings.chat.offer_timeout_ms,
            cookies_path: settings.chat.cookies,
            chat_command: settings.chat.command,
        }
    }

    pub fn voice(mut self, voice: VoiceModule) -> Self {
        self.voice = voice;
        self
    }

    pub fn rate(mut self, rate: i32) -> Self {
        self.rate = rate;
        self
    }

    pub fn volume(mut self, volume: i32) -> Self {
        self.volume = volume;
        self
    }

    pub fn pitch(mut self, pitch: i32) -> Self {
        self.pitch = pitch;
        self
    }

    pub fn language(mut self, language: impl Into<String>) -> Self {
        self.language = language.into();
        self
    }

    pub fn max_message_length(mut self, max_message_length: usize) -> Self {
        self.max_message_length = max_message_length;
        self
    }

    pub fn include_username(mut self, include_username: bool) -> Self {
        self.include_username = include_username;
        self
    }

    pub fn queue_size(mut self, queue_size: usize) -> Self {
        self.queue_size = queue_size;
        self
    }

    pub fn offer_timeout_ms(mut self, offer_timeout_ms: u64) -> Self {
        self.offer_timeout_ms = offer_timeout_ms;
        self
    }

    pub fn cookies_path(mut self, cookies_path: impl Into<PathBuf>) -> Self {
        self.cookies_path = Some(cookies_path.into());
        self
    }

    pub fn chat_command(mut self, command: Vec<String>) -> Self {
        self.chat_command = Some(command);
        self
    }

    /// Validate every field and freeze the configuration.
    pub fn build(self) -> Result<Config, ConfigError> {
        validate_youtube_url(&self.url)?;

        if !(-100..=100).contains(&self.rate) {
            return Err(ConfigError::RateOutOfRange(self.rate));
        }
        if !(0..=100).contains(&self.volume) {
            return Err(ConfigError::VolumeOutOfRange(self.volume));
        }
        if !(-100..=100).contains(&self.pitch) {
            return Err(ConfigError::PitchOutOfRange(self.pitch));
        }
        if self.max_message_length == 0 {
            return Err(ConfigError::MaxMessageLength);
        }
        if self.queue_size > MAX_QUEUE_CAPACITY {
            return Err(ConfigError::QueueCapacity);
        }
        let queue_capacity = NonZeroUsize::new(self.queue_size).ok_or(ConfigError::QueueCapacity)?;
        // The reader must notice shutdown within one poll interval even when blocked on a full queue
        let offer_timeout = Duration::from_millis(self.offer_timeout_ms);
        if offer_timeout > LOOP_POLL_INTERVAL {
            return Err(ConfigError::OfferTimeout(self.offer_timeout_ms));
        }
        let language = self.language.trim().to_string();
        if language.is_empty() {
            return Err(ConfigError::EmptyLanguage);
        }
        if let Some(command) = &self.chat_command {
            if command.first().map_or(true, |program| program.trim().is_empty()) {
                return Err(ConfigError::EmptyChatCommand);
            }
        }

        Ok(Config {
            url: self.url,
            voice: self.voice,
            rate: self.rate,
            volume: self.volume,
            pitch: self.pitch,
            language,
            max_message_length: self.max_message_length,
            include_username: self.include_username,
            queue_capacity,
            offer_timeout,
            cookies_path: self.cookies_path,
            chat_command: self.chat_command,
        })
    }
}

/// Accept the watch, short-link and live URL forms.
pub fn validate_youtube_url(url: &str) -> Result<(), ConfigError> {
    if YOUTUBE_URL_PATTERNS.iter().any(|pattern| pattern.is_match(url)) {
        Ok(())
    } else {
        Err(ConfigError::InvalidUrl(url.to_string()))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    const URL: &str = "https://www.youtube.com/watch?v=abc123";

    #[test]
    fn test_defaults_are_valid() {
        let config = Config::builder(URL).build().unwrap();
        assert_eq!(config.voice(), VoiceModule::EspeakNg);
        assert_eq!(config.rate(), 0);
        assert_eq!(config.volume(), 100);
        assert_eq!(config.pitch(), 0);
        assert_eq!(config.language(), "en");
        assert_eq!(config.max_message_length(), 200);
        assert!(config.include_username());
        assert_eq!(config.queue_capacity().get(), 50);
        assert_eq!(config.offer_timeout(), Duration::from_millis(100));
        assert_eq!(config.cookies_path(), None);
    }

    #[test]
    fn test_url_forms() {
        assert!(validate_youtube_url("https://youtube.com/watch?v=x-y_z").is_ok());
        assert!(validate_youtube_url("http://youtu.be/abc").is_ok());
        assert!(validate_youtube_url("https://www.youtube.com/live/abc").is_ok());
        assert!(matches!(
            validate_youtube_url("https://vimeo.com/123"),
            Err(ConfigError::InvalidUrl(_))
        ));
        assert!(validate_youtube_url("").is_err());
    }

    #[test]
    fn test_range_validation() {
        assert!(matches!(
            Config::builder(URL).rate(101).build(),
            Err(ConfigError::RateOutOfRange(101))
        ));
        assert!(matches!(
            Config::builder(URL).volume(-1).build(),
            Err(ConfigError::VolumeOutOfRange(-1))
        ));
        assert!(matches!(
            Config::builder(URL).pitch(-101).build(),
            Err(ConfigError::PitchOutOfRange(-101))
        ));
        assert!(Config::builder(URL).rate(-100).pitch(100).volume(0).build().is_ok());
    }

    #[test]
    fn test_positive_sizes_required() {
        assert!(matches!(
            Config::builder(URL).max_message_length(0).build(),
            Err(ConfigError::MaxMessageLength)
        ));
        assert!(matches!(
            Config::builder(URL).queue_size(0).build(),
            Err(ConfigError::QueueCapacity)
        ));
    }

    #[test]
    fn test_queue_size_upper_bound() {
        assert!(matches!(
            Config::builder(URL).queue_size(usize::MAX).build(),
            Err(ConfigError::QueueCapacity)
        ));
        assert!(matches!(
            Config::builder(URL).queue_size(MAX_QUEUE_CAPACITY + 1).build(),
            Err(ConfigError::QueueCapacity)
        ));
        let config = Config::builder(URL).queue_size(MAX_QUEUE_CAPACITY).build().unwrap();
        assert_eq!(config.queue_capacity().get(), MAX_QUEUE_CAPACITY);
    }

    #[test]
    fn test_offer_timeout_cannot_outlast_poll_interval() {
        assert!(matches!(
            Config::builder(URL).offer_timeout_ms(u64::MAX).build(),
            Err(ConfigError::OfferTimeout(u64::MAX))
        ));
        assert!(matches!(
            Config::builder(URL).offer_timeout_ms(3_600_000).build(),
            Err(ConfigError::OfferTimeout(3_600_000))
        ));

        let limit = LOOP_POLL_INTERVAL.as_millis() as u64;
        let config = Config::builder(URL).offer_timeout_ms(limit).build().unwrap();
        assert_eq!(config.offer_timeout(), LOOP_POLL_INTERVAL);
        assert!(Config::builder(URL).offer_timeout_ms(limit + 1).build().is_err());
    }

    #[test]
    fn test_language_and_command_must_be_present() {
        assert!(matches!(
            Config::builder(URL).language("  ").build(),
            Err(ConfigError::EmptyLanguage)
        ));
        assert!(matches!(
            Config::builder(URL).chat_command(Vec::new()).build(),
            Err(ConfigError::EmptyChatCommand)
        ));
    }

    #[test]
    fn test_settings_yaml_partial_fields() {
        let yaml = "speech:\n  voice: pico\n  rate: -20\nchat:\n  queue_size: 5\n";
        let settings: Settings = serde_yaml::from_str(yaml).unwrap();
        assert_eq!(settings.speech.voice, VoiceModule::Pico);
        assert_eq!(settings.speech.rate, -20);
        assert_eq!(settings.speech.volume, 100);
        assert_eq!(settings.chat.queue_size, 5);
        assert_eq!(settings.chat.max_message_length, 200);

        let config = ConfigBuilder::from_settings(URL, settings).build().unwrap();
        assert_eq!(config.voice().module_name(), "pico");
        assert_eq!(config.queue_capacity().get(), 5);
    }

    #[test]
    fn test_speech_settings_use_text_priority() {
        let config = Config::builder(URL).rate(15).language("de").build().unwrap();
        let speech = config.speech_settings();
        assert_eq!(speech.priority, Priority::Text);
        assert_eq!(speech.rate, 15);
        assert_eq!(speech.language, "de");
    }
}
