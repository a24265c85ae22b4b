//! Wire protocol: session configuration and control messages.
//!
//! The duplex channel carries two payload kinds. Binary payloads are
//! always raw PCM audio. Text payloads are JSON objects discriminated by a
//! `type` tag — validated here and rejected as `Protocol` errors instead
//! of assumed well-formed.

use serde::{Deserialize, Serialize};

use crate::defaults;
use crate::error::{Result, VoxlinkError};

/// Configuration sent as the first message when opening a session.
///
/// Immutable for the lifetime of a connection attempt.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "camelCase", default)]
pub struct SessionConfig {
    /// Provider key the backend routes on (e.g. "gemini").
    pub provider: String,
    /// Provider-specific voice identifier.
    pub voice: String,
    /// Language tag (e.g. "en-US").
    pub language: String,
    /// Free-text system prompt; may be empty.
    pub system_prompt: String,
    /// Enable affective dialog.
    pub affective_dialog: bool,
    /// Let the model speak proactively.
    pub proactive_audio: bool,
    /// Ground answers in web search.
    pub search_grounding: bool,
}

impl Default for SessionConfig {
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

impl SessionConfig {
    /// Serializes the config for the opening frame.
    pub fn to_json(&self) -> String {
        serde_json::to_string(self).unwrap_or_else(|_| "{}".to_string())
    }
}

/// A control message on the duplex channel.
///
/// Inbound tags: `session_started`, `error`, `tool_call`, `user`,
/// `gemini`, `turn_complete`, `interrupted`. The `text` tag is outbound
/// only (a typed text turn).
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum ControlMessage {
    /// Session is live; optionally announces the synthesis sample rate.
    SessionStarted {
        #[serde(rename = "outputSampleRate", default)]
        output_sample_rate: Option<u32>,
    },
    /// Fatal backend error.
    Error { message: String },
    /// A tool the backend invoked, reported whole.
    ToolCall {
        name: String,
        #[serde(default)]
        args: serde_json::Value,
        #[serde(default)]
        result: Option<String>,
    },
    /// Transcript delta for the caller's speech.
    #[serde(rename = "user")]
    CallerDelta { text: String },
    /// Transcript delta for the model's speech.
    #[serde(rename = "gemini")]
    ModelDelta { text: String },
    /// The model finished its turn.
    TurnComplete,
    /// The caller spoke over the model's playback.
    Interrupted,
    /// Outbound only: a typed text turn.
    Text { text: String },
}

impl ControlMessage {
    /// Parses an inbound text payload.
    ///
    /// # Errors
    /// `Protocol` on malformed JSON or an unknown tag — the caller drops
    /// the single offending message and continues.
    pub fn parse(raw: &str) -> Result<Self> {
        serde_json::from_str(raw).map_err(|e| VoxlinkError::Protocol {
            message: format!("malformed control message: {}", e),
        })
    }

    /// Serializes an outbound control message.
    pub fn to_json(&self) -> String {
        serde_json::to_string(self).unwrap_or_else(|_| "{}".to_string())
    }
}

/// Derive the WebSocket URL from a server base URL.
///
/// The scheme upgrades to the matching WebSocket variant (`http → ws`,
/// `https → wss`); a bare origin gets the `/ws` path appended. Already-ws
/// URLs pass through.
pub fn ws_url_from_http(base: &str) -> Result<String> {
    let base = base.trim().trim_end_matches('/');
    let (scheme, rest) = if let Some(rest) = base.strip_prefix("https://") {
        ("wss", rest)
    } else if let Some(rest) = base.strip_prefix("http://") {
        ("ws", rest)
    } else if let Some(rest) = base.strip_prefix("wss://") {
        ("wss", rest)
    } else if let Some(rest) = base.strip_prefix("ws://") {
        ("ws", rest)
    } else {
        return Err(VoxlinkError::InvalidUrl {
            url: base.to_string(),
        });
    };

    if rest.is_empty() {
        return Err(VoxlinkError::InvalidUrl {
            url: base.to_string(),
        });
    }

    if rest.contains('/') {
        Ok(format!("{}://{}", scheme, rest))
    } else {
        Ok(format!("{}://{}{}", scheme, rest, defaults::WS_PATH))
    }
}
