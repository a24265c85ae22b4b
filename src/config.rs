use serde::{Deserialize, Serialize};
use std::fs;
use std::path::Path;
#[cfg(feature = "cli")]
use std::path::PathBuf;

use crate::defaults;
use crate::error::{Result, VoxlinkError};
use crate::transport::protocol::SessionConfig;

/// Root configuration structure
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Default)]
#[serde(default)]
pub struct Config {
    pub server: ServerConfig,
    pub audio: AudioConfig,
    pub session: SessionDefaults,
}

/// Backend connection configuration
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
#[serde(default)]
pub struct ServerConfig {
    /// Base URL of the conversation backend; the WebSocket endpoint is
    /// derived from it.
    pub url: String,
}

/// Audio capture configuration
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
#[serde(default)]
pub struct AudioConfig {
    pub device: Option<String>,
    pub chunk_ms: u64,
}

/// Default session parameters, overridable per run from the CLI
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
#[serde(default)]
pub struct SessionDefaults {
    pub provider: String,
    pub voice: String,
    pub language: String,
    pub system_prompt: String,
    pub affective_dialog: bool,
    pub proactive_audio: bool,
    pub search_grounding: bool,
}

impl Default for ServerConfig {
    fn default() -> Self {
        Self {
            url: defaults::DEFAULT_SERVER_URL.to_string(),
        }
    }
}

impl Default for AudioConfig {
    fn default() -> Self {
        Self {
            device: None,
            chunk_ms: defaults::CAPTURE_CHUNK_MS,
        }
    }
}

impl Default for SessionDefaults {
    fn default() -> Self {
        Self {
            provider: defaults::DEFAULT_PROVIDER.to_string(),
            voice: defaults::DEFAULT_VOICE.to_string(),
            language: defaults::DEFAULT_LANGUAGE.to_string(),
            system_prompt: String::new(),
            affective_dialog: false,
            proactive_audio: false,
            search_grounding: false,
        }
    }
}

impl Config {
    /// Load configuration from a TOML file
    ///
    /// Returns an error if the file contains invalid TOML.
    /// Missing fields will use default values.
    pub fn load(path: &Path) -> Result<Self> {
        let contents = fs::read_to_string(path)?;
        let config: Config = toml::from_str(&contents)?;
        Ok(config)
    }

    /// Load configuration from a file or return defaults if the file
    /// doesn't exist
    ///
    /// Only a missing file falls back to defaults; invalid TOML is still
    /// an error.
    pub fn load_or_default(path: &Path) -> Result<Self> {
        match Self::load(path) {
            Ok(config) => Ok(config),
            Err(VoxlinkError::Io(e)) if e.kind() == std::io::ErrorKind::NotFound => {
                Ok(Self::default())
            }
            Err(e) => Err(e),
        }
    }

    /// Apply environment variable overrides
    ///
    /// Supported environment variables:
    /// - VOXLINK_SERVER → server.url
    /// - VOXLINK_VOICE → session.voice
    /// - VOXLINK_LANGUAGE → session.language
    /// - VOXLINK_AUDIO_DEVICE → audio.device
    pub fn with_env_overrides(mut self) -> Self {
        if let Ok(url) = std::env::var("VOXLINK_SERVER")
            && !url.is_empty()
        {
            self.server.url = url;
        }

        if let Ok(voice) = std::env::var("VOXLINK_VOICE")
            && !voice.is_empty()
        {
            self.session.voice = voice;
        }

        if let Ok(language) = std::env::var("VOXLINK_LANGUAGE")
            && !language.is_empty()
        {
            self.session.language = language;
        }

        if let Ok(device) = std::env::var("VOXLINK_AUDIO_DEVICE")
            && !device.is_empty()
        {
            self.audio.device = Some(device);
        }

        self
    }

    /// Build the wire session configuration from the configured defaults.
    pub fn to_session_config(&self) -> SessionConfig {
        SessionConfig {
            provider: self.session.provider.clone(),
            voice: self.session.voice.clone(),
            language: self.session.language.clone(),
            system_prompt: self.session.system_prompt.clone(),
            affective_dialog: self.session.affective_dialog,
            proactive_audio: self.session.proactive_audio,
            search_grounding: self.session.search_grounding,
        }
    }

    /// Get the default configuration file path
    ///
    /// Returns ~/.config/voxlink/config.toml on Linux
    #[cfg(feature = "cli")]
    pub fn default_path() -> Option<PathBuf> {
        dirs::config_dir().map(|dir| dir.join("voxlink").join("config.toml"))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::io::Write;

    #[test]
    fn default_config_values() {
        let config = Config::default();
        assert_eq!(config.server.url, "http://localhost:5173");
        assert_eq!(config.audio.chunk_ms, 100);
        assert!(config.audio.device.is_none());
        assert_eq!(config.session.provider, "gemini");
        assert_eq!(config.session.voice, "Aoede");
    }

    #[test]
    fn load_parses_partial_toml_with_defaults() {
        let mut file = tempfile::NamedTempFile::new().unwrap();
        writeln!(
            file,
            r#"
[server]
url = "https://voice.example.com"

[session]
voice = "Puck"
affective_dialog = true
"#
        )
        .unwrap();

        let config = Config::load(file.path()).unwrap();
        assert_eq!(config.server.url, "https://voice.example.com");
        assert_eq!(config.session.voice, "Puck");
        assert!(config.session.affective_dialog);
        // Unspecified fields keep defaults.
        assert_eq!(config.session.language, "en-US");
        assert_eq!(config.audio.chunk_ms, 100);
    }

    #[test]
    fn load_rejects_invalid_toml() {
        let mut file = tempfile::NamedTempFile::new().unwrap();
        writeln!(file, "this is not toml at all [[[").unwrap();

        assert!(matches!(
            Config::load(file.path()),
            Err(VoxlinkError::Config(_))
        ));
    }

    #[test]
    fn load_or_default_returns_defaults_for_missing_file() {
        let config = Config::load_or_default(Path::new("/nonexistent/voxlink.toml")).unwrap();
        assert_eq!(config, Config::default());
    }

    #[test]
    fn load_or_default_propagates_parse_errors() {
        let mut file = tempfile::NamedTempFile::new().unwrap();
        writeln!(file, "not = valid = toml").unwrap();

        assert!(Config::load_or_default(file.path()).is_err());
    }

    #[test]
    fn to_session_config_maps_all_fields() {
        let mut config = Config::default();
        config.session.voice = "Kore".to_string();
        config.session.system_prompt = "be terse".to_string();
        config.session.search_grounding = true;

        let session = config.to_session_config();
        assert_eq!(session.voice, "Kore");
        assert_eq!(session.system_prompt, "be terse");
        assert!(session.search_grounding);
        assert!(!session.proactive_audio);
    }

    #[test]
    fn config_round_trips_through_toml() {
        let mut config = Config::default();
        config.audio.device = Some("pipewire".to_string());
        config.session.proactive_audio = true;

        let serialized = toml::to_string(&config).unwrap();
        let parsed: Config = toml::from_str(&serialized).unwrap();
        assert_eq!(parsed, config);
    }
}
