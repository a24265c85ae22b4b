use anyhow::{Context, Result};
use clap::Parser;
use owo_colors::OwoColorize;
use tokio::sync::mpsc;
use tracing_subscriber::EnvFilter;

use voxlink::cli::{Cli, Commands};
use voxlink::config::Config;
use voxlink::conversation::{Command, LogStore, Notice, Role, run_conversation};
use voxlink::{CaptureSource, ConversationStatus};

#[tokio::main]
async fn main() -> Result<()> {
    tracing_subscriber::fmt()
        .with_env_filter(
            EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("voxlink=info")),
        )
        .with_writer(std::io::stderr)
        .init();

    let cli = Cli::parse();

    match cli.command {
        Some(Commands::Devices) => list_audio_devices(),
        None => run_command(cli).await,
    }
}

/// Merge config file, environment, and CLI flags, then run one
/// conversation until the channel closes or Ctrl-C.
async fn run_command(cli: Cli) -> Result<()> {
    let config = load_config(&cli)?;
    let session = config.to_session_config();

    let source = build_source(&cli, &config)?;
    let capture = voxlink::CaptureEngine::new(source).with_chunk_ms(config.audio.chunk_ms);

    let (notice_tx, notice_rx) = crossbeam_channel::unbounded();
    let (command_tx, command_rx) = mpsc::unbounded_channel();

    // Ctrl-C triggers the ordered teardown, same as a caller-side stop.
    let interrupt_tx = command_tx.clone();
    tokio::spawn(async move {
        if tokio::signal::ctrl_c().await.is_ok() {
            let _ = interrupt_tx.send(Command::Stop);
        }
    });

    let initial_text = cli.text.clone();
    let printer = std::thread::spawn(move || print_notices(notice_rx, command_tx, initial_text));

    println!(
        "{} voxlink {} — connecting to {}",
        "●".dimmed(),
        voxlink::version_string(),
        config.server.url
    );

    let result = run_conversation(
        &config.server.url,
        session,
        capture,
        Box::new(LogStore),
        Some(notice_tx),
        command_rx,
    )
    .await;

    let _ = printer.join();

    result.context("conversation failed")
}

/// Resolve the effective configuration for this run.
fn load_config(cli: &Cli) -> Result<Config> {
    let mut config = match &cli.config {
        Some(path) => Config::load(path)
            .with_context(|| format!("failed to load config from {}", path.display()))?,
        None => match Config::default_path() {
            Some(path) => Config::load_or_default(&path)
                .with_context(|| format!("failed to load config from {}", path.display()))?,
            None => Config::default(),
        },
    }
    .with_env_overrides();

    if let Some(server) = &cli.server {
        config.server.url = server.clone();
    }
    if let Some(device) = &cli.device {
        config.audio.device = Some(device.clone());
    }
    if let Some(voice) = &cli.voice {
        config.session.voice = voice.clone();
    }
    if let Some(language) = &cli.language {
        config.session.language = language.clone();
    }
    if let Some(prompt) = &cli.system_prompt {
        config.session.system_prompt = prompt.clone();
    }
    if cli.affective_dialog {
        config.session.affective_dialog = true;
    }
    if cli.proactive_audio {
        config.session.proactive_audio = true;
    }
    if cli.search_grounding {
        config.session.search_grounding = true;
    }

    Ok(config)
}

/// Pick the capture source: WAV file in smoke-test mode, microphone
/// otherwise.
fn build_source(cli: &Cli, config: &Config) -> Result<Box<dyn CaptureSource>> {
    if let Some(path) = &cli.wav {
        let source = voxlink::audio::wav::WavCaptureSource::open(path)
            .with_context(|| format!("failed to open {}", path.display()))?;
        return Ok(Box::new(source));
    }

    #[cfg(feature = "cpal-audio")]
    {
        voxlink::audio::cpal_io::suppress_audio_warnings();
        let source = voxlink::audio::cpal_io::CpalCaptureSource::new(config.audio.device.as_deref())
            .context("failed to open microphone")?;
        Ok(Box::new(source))
    }

    #[cfg(not(feature = "cpal-audio"))]
    {
        let _ = config;
        anyhow::bail!("built without cpal-audio; use --wav FILE")
    }
}

/// Print transcript and status updates as they arrive.
///
/// Also fires the optional `--text` turn the first time the session
/// reaches the listening state.
fn print_notices(
    notices: crossbeam_channel::Receiver<Notice>,
    commands: mpsc::UnboundedSender<Command>,
    mut initial_text: Option<String>,
) {
    for notice in notices.iter() {
        match notice {
            Notice::Status(status) => {
                println!("{} {}", "●".dimmed(), status.describe().dimmed());
                if status == ConversationStatus::Listening
                    && let Some(text) = initial_text.take()
                {
                    let _ = commands.send(Command::SendText(text));
                }
            }
            Notice::EntryFinalized(entry) => {
                let label = match entry.role {
                    Role::Caller => "you".green().to_string(),
                    Role::Model => "model".cyan().to_string(),
                    Role::Tool => "tool".yellow().to_string(),
                };
                println!("[{}] {}", label, entry.text);
            }
            Notice::EntryCreated(_) | Notice::EntryUpdated(_) => {
                // Partial entries stay quiet; the finalized line is the
                // durable record.
            }
            Notice::SessionError(message) => {
                eprintln!("{} {}", "error:".red(), message);
            }
        }
    }
}

/// List capture devices, preferred ones marked.
fn list_audio_devices() -> Result<()> {
    #[cfg(feature = "cpal-audio")]
    {
        voxlink::audio::cpal_io::suppress_audio_warnings();
        let devices = voxlink::audio::cpal_io::list_devices()?;
        if devices.is_empty() {
            println!("No audio input devices found");
        } else {
            println!("Available audio input devices:");
            for device in devices {
                println!("  {}", device);
            }
        }
        Ok(())
    }

    #[cfg(not(feature = "cpal-audio"))]
    {
        anyhow::bail!("built without cpal-audio; device listing unavailable")
    }
}
