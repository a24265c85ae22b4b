//! voxlink - Realtime voice conversation client
//!
//! Bidirectional low-latency audio streaming to live speech models:
//! capture, resample, encode, stream over a duplex WebSocket, and play the
//! model's synthesized audio back gaplessly while reconciling streamed
//! transcript deltas into stable entries.

#![warn(clippy::unwrap_used)]
#![warn(clippy::expect_used)]
#![warn(clippy::let_underscore_must_use)]

pub mod audio;
#[cfg(feature = "cli")]
pub mod cli;
pub mod config;
pub mod conversation;
pub mod defaults;
pub mod error;
pub mod transport;

// Core traits (source → engine → channel → state machine)
pub use audio::capture::{CaptureEngine, CaptureSource, MockCaptureSource};
pub use audio::frame::AudioFrame;
pub use audio::playback::{OutputClock, PlaybackScheduler, PlaybackSink};
pub use conversation::{
    Command, Conversation, ConversationEvent, ConversationStatus, Notice, Role, TranscriptEntry,
    TranscriptStore, run_conversation,
};
pub use transport::channel::{ChannelEvent, TransportLink, WirePayload};
pub use transport::protocol::{ControlMessage, SessionConfig};

// Error handling
pub use error::{Result, VoxlinkError};

// Config
pub use config::Config;

/// Build version string with optional git commit hash.
///
/// Returns `"0.1.0+abc1234"` when git hash is available, `"0.1.0"` otherwise.
pub fn version_string() -> String {
    let version = env!("CARGO_PKG_VERSION");
    match option_env!("GIT_HASH") {
        Some(hash) if !hash.is_empty() => format!("{}+{}", version, hash),
        _ => version.to_string(),
    }
}
