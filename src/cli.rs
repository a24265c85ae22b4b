//! Command-line interface for voxlink
//!
//! Provides argument parsing using clap derive macros.

use clap::{Parser, Subcommand};
use std::path::PathBuf;

/// Realtime voice conversation client
#[derive(Parser, Debug)]
#[command(
    name = "voxlink",
    version,
    about = "Realtime voice conversation client for live speech models"
)]
pub struct Cli {
    /// Subcommand to execute
    #[command(subcommand)]
    pub command: Option<Commands>,

    /// Path to configuration file
    #[arg(long, global = true, value_name = "PATH")]
    pub config: Option<PathBuf>,

    /// Backend base URL (e.g. https://voice.example.com)
    #[arg(long, value_name = "URL")]
    pub server: Option<String>,

    /// Audio input device name
    #[arg(long, value_name = "DEVICE")]
    pub device: Option<String>,

    /// Voice identifier (e.g. Aoede, Puck)
    #[arg(long, value_name = "VOICE")]
    pub voice: Option<String>,

    /// Language tag (e.g. en-US, de-DE)
    #[arg(long, value_name = "LANG")]
    pub language: Option<String>,

    /// System prompt for the session
    #[arg(long, value_name = "TEXT")]
    pub system_prompt: Option<String>,

    /// Enable affective dialog
    #[arg(long)]
    pub affective_dialog: bool,

    /// Let the model speak proactively
    #[arg(long)]
    pub proactive_audio: bool,

    /// Ground answers in web search
    #[arg(long)]
    pub search_grounding: bool,

    /// Stream a WAV file instead of the microphone (smoke-test mode)
    #[arg(long, value_name = "FILE")]
    pub wav: Option<PathBuf>,

    /// Send a text turn once the session is listening
    #[arg(long, value_name = "TEXT")]
    pub text: Option<String>,
}

/// Available subcommands
#[derive(Subcommand, Debug)]
pub enum Commands {
    /// List available audio input devices
    Devices,
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn parses_bare_invocation() {
        let cli = Cli::try_parse_from(["voxlink"]).unwrap();
        assert!(cli.command.is_none());
        assert!(cli.server.is_none());
        assert!(!cli.affective_dialog);
    }

    #[test]
    fn parses_session_overrides() {
        let cli = Cli::try_parse_from([
            "voxlink",
            "--server",
            "https://voice.example.com",
            "--voice",
            "Puck",
            "--language",
            "de-DE",
            "--affective-dialog",
            "--search-grounding",
        ])
        .unwrap();

        assert_eq!(cli.server.as_deref(), Some("https://voice.example.com"));
        assert_eq!(cli.voice.as_deref(), Some("Puck"));
        assert_eq!(cli.language.as_deref(), Some("de-DE"));
        assert!(cli.affective_dialog);
        assert!(cli.search_grounding);
        assert!(!cli.proactive_audio);
    }

    #[test]
    fn parses_devices_subcommand() {
        let cli = Cli::try_parse_from(["voxlink", "devices"]).unwrap();
        assert!(matches!(cli.command, Some(Commands::Devices)));
    }

    #[test]
    fn parses_wav_mode_with_text() {
        let cli =
            Cli::try_parse_from(["voxlink", "--wav", "sample.wav", "--text", "hello"]).unwrap();
        assert_eq!(cli.wav.as_deref(), Some(std::path::Path::new("sample.wav")));
        assert_eq!(cli.text.as_deref(), Some("hello"));
    }

    #[test]
    fn rejects_unknown_flag() {
        assert!(Cli::try_parse_from(["voxlink", "--bogus"]).is_err());
    }
}
