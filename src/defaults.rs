//! Default configuration constants for voxlink.
//!
//! Shared constants used across configuration types and the audio path,
//! kept in one place to avoid drift between capture, playback, and wire
//! framing.

/// Sample rate of outbound audio on the wire, in Hz.
///
/// 16kHz is the standard rate for speech-model input and is what the
/// conversation backend expects for every binary frame we transmit.
pub const WIRE_SAMPLE_RATE: u32 = 16000;

/// Default sample rate of inbound synthesized audio, in Hz.
///
/// Used until the backend announces its actual output rate in the
/// session-started message. Gemini Live synthesizes at 24kHz.
pub const DEFAULT_OUTPUT_SAMPLE_RATE: u32 = 24000;

/// Duration of one capture chunk in milliseconds.
///
/// The capture thread drains the source at this cadence; each drained
/// chunk is resampled and encoded independently, so this is also the
/// approximate size of each outbound wire frame.
pub const CAPTURE_CHUNK_MS: u64 = 100;

/// Capacity of the capture-to-control-loop frame channel.
///
/// When the control loop falls behind, frames beyond this are dropped
/// rather than queued: stale audio is worse than lost audio.
pub const FRAME_CHANNEL_CAPACITY: usize = 32;

/// Default provider key understood by the conversation backend.
pub const DEFAULT_PROVIDER: &str = "gemini";

/// Default voice identifier for the default provider.
pub const DEFAULT_VOICE: &str = "Aoede";

/// Default language tag sent in the session configuration.
pub const DEFAULT_LANGUAGE: &str = "en-US";

/// Default base URL of the conversation backend.
pub const DEFAULT_SERVER_URL: &str = "http://localhost:5173";

/// WebSocket path appended to a bare server origin.
pub const WS_PATH: &str = "/ws";

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn wire_rate_is_speech_model_input_rate() {
        assert_eq!(WIRE_SAMPLE_RATE, 16000);
    }

    #[test]
    fn default_output_rate_matches_gemini_live() {
        assert_eq!(DEFAULT_OUTPUT_SAMPLE_RATE, 24000);
    }
}
