use anyhow::{Context, Result};
use clap::Parser;
use std::path::PathBuf;
use std::process::ExitCode;
use tracing_subscriber::EnvFilter;
use yt_liveread::chat_source::CommandChatSource;
use yt_liveread::config::{ConfigBuilder, Settings, VoiceModule};
use yt_liveread::orchestrator::{install_signal_handlers, Orchestrator};
use yt_liveread::operator::TerminalInput;
use yt_liveread::ssip::SsipClient;

// Speech goes through speech-dispatcher's Unix socket
#[cfg(not(unix))]
compile_error!("yt-liveread requires a Unix platform with speech-dispatcher");

/// Exit code for invalid command-line or settings input
const CONFIG_ERROR_EXIT_CODE: u8 = 2;

#[derive(Parser)]
#[command(name = "yt-liveread")]
#[command(about = "Read YouTube live chat messages aloud using text-to-speech", long_about = None)]
#[command(after_help = "Examples:
  yt-liveread \"https://www.youtube.com/watch?v=VIDEO_ID\"
  yt-liveread URL --voice pico --rate 10
  yt-liveread URL --no-username --max-length 150

Controls (while running):
  p - Pause/Resume speech
  q - Quit application")]
struct Cli {
    /// YouTube live stream URL
    url: String,

    /// TTS voice engine [default: espeak-ng]
    #[arg(long, value_enum)]
    voice: Option<VoiceModule>,

    /// Speech rate from -100 (slow) to 100 (fast) [default: 0]
    #[arg(long, allow_hyphen_values = true)]
    rate: Option<i32>,

    /// Volume from 0 to 100 [default: 100]
    #[arg(long)]
    volume: Option<i32>,

    /// Voice pitch from -100 (low) to 100 (high) [default: 0]
    #[arg(long, allow_hyphen_values = true)]
    pitch: Option<i32>,

    /// Maximum message length to speak [default: 200]
    #[arg(long)]
    max_length: Option<usize>,

    /// Skip reading usernames, only read message text
    #[arg(long)]
    no_username: bool,

    /// TTS language code [default: en]
    #[arg(long)]
    language: Option<String>,

    /// Maximum message queue size [default: 50]
    #[arg(long)]
    queue_size: Option<usize>,

    /// Path to cookies file (Netscape format) to bypass YouTube consent page
    #[arg(long)]
    cookies: Option<PathBuf>,

    /// Settings file to use instead of ~/.yt-liveread/settings.yaml
    #[arg(long)]
    config: Option<PathBuf>,
}

impl Cli {
    /// Apply command-line flags on top of the settings file.
    fn into_builder(self, settings: Settings) -> ConfigBuilder {
        let mut builder = ConfigBuilder::from_settings(self.url, settings);
        if let Some(voice) = self.voice {
            builder = builder.voice(voice);
        }
        if let Some(rate) = self.rate {
            builder = builder.rate(rate);
        }
        if let Some(volume) = self.volume {
            builder = builder.volume(volume);
        }
        if let Some(pitch) = self.pitch {
            builder = builder.pitch(pitch);
        }
        if let Some(max_length) = self.max_length {
            builder = builder.max_message_length(max_length);
        }
        if self.no_username {
            builder = builder.include_username(false);
        }
        if let Some(language) = self.language {
            builder = builder.language(language);
        }
        if let Some(queue_size) = self.queue_size {
            builder = builder.queue_size(queue_size);
        }
        if let Some(cookies) = self.cookies {
            builder = builder.cookies_path(cookies);
        }
        builder
    }
}

fn main() -> ExitCode {
    tracing_subscriber::fmt()
        .with_env_filter(
            EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("yt_liveread=info")),
        )
        .with_writer(std::io::stderr)
        .init();

    let cli = Cli::parse();

    let config = match Settings::load(cli.config.as_deref())
        .and_then(|settings| cli.into_builder(settings).build())
    {
        Ok(config) => config,
        Err(e) => {
            eprintln!("Configuration error: {}", e);
            return ExitCode::from(CONFIG_ERROR_EXIT_CODE);
        }
    };

    match run_app(config) {
        Ok(code) => ExitCode::from(u8::try_from(code).unwrap_or(1)),
        Err(e) => {
            eprintln!("Error: {:#}", e);
            ExitCode::FAILURE
        }
    }
}

fn run_app(config: yt_liveread::config::Config) -> Result<i32> {
    println!();
    println!("YouTube Live Chat TTS Reader");
    println!("{}", "=".repeat(50));
    println!("Stream: {}", config.url());
    println!("Voice: {}", config.voice().module_name());
    println!("{}", "=".repeat(50));

    let sink = match SsipClient::connect() {
        Ok(sink) => sink,
        Err(e) => {
            eprintln!("Failed to initialize Speech Dispatcher: {}", e);
            eprintln!("Make sure speech-dispatcher is installed and running:");
            eprintln!("  sudo apt install speech-dispatcher");
            eprintln!("  systemctl --user status speech-dispatcher");
            return Ok(1);
        }
    };

    let source = match config.chat_command() {
        Some(command) => CommandChatSource::with_command(command.to_vec()),
        None => CommandChatSource::new(),
    };

    let orchestrator = Orchestrator::new(config);
    install_signal_handlers(orchestrator.shutdown_signal())
        .context("Failed to install signal handler")?;

    println!();
    println!("Controls:");
    println!("  p - Pause/Resume");
    println!("  q - Quit");
    println!("{}", "-".repeat(50));
    println!();

    let mut input = TerminalInput::new();
    let summary = orchestrator
        .run(source, sink, &mut input)
        .context("Failed to start pipeline threads")?;

    if let Some(failure) = summary.ingestion_failure() {
        eprintln!();
        eprintln!("Error: {}", failure);
        eprintln!();
        eprintln!("{}", failure.guidance());
    }

    println!("Done");
    Ok(summary.exit_code())
}
