//! WAV file capture source.
//!
//! Feeds a conversation from a WAV file instead of a live microphone —
//! useful for protocol smoke runs and tests. Playback gets a wall-clock
//! timing domain and a null sink: scheduling stays observable, nothing is
//! rendered.

use std::io::Read;
use std::path::Path;
use std::sync::Arc;

use crate::audio::capture::{CaptureSource, CaptureStart};
use crate::audio::playback::{ClockContext, NullSink, SystemClock};
use crate::error::{Result, VoxlinkError};

/// Capture source that reads from WAV data.
///
/// Supports arbitrary sample rates and stereo downmix; samples are kept at
/// the file's native rate — the capture engine does the wire resampling.
pub struct WavCaptureSource {
    samples: Vec<f32>,
    sample_rate: u32,
    position: usize,
    chunk_size: usize,
    started: bool,
}

impl WavCaptureSource {
    /// Create from any reader.
    pub fn from_reader(reader: Box<dyn Read + Send>) -> Result<Self> {
        let mut wav_reader =
            hound::WavReader::new(reader).map_err(|e| VoxlinkError::AudioCapture {
                message: format!("Failed to parse WAV file: {}", e),
            })?;

        let spec = wav_reader.spec();
        let sample_rate = spec.sample_rate;
        let channels = spec.channels as usize;

        let raw: Vec<f32> = match spec.sample_format {
            hound::SampleFormat::Int => wav_reader
                .samples::<i16>()
                .map(|s| s.map(|v| v as f32 / 32768.0))
                .collect::<std::result::Result<Vec<_>, _>>(),
            hound::SampleFormat::Float => wav_reader
                .samples::<f32>()
                .collect::<std::result::Result<Vec<_>, _>>(),
        }
        .map_err(|e| VoxlinkError::AudioCapture {
            message: format!("Failed to read WAV samples: {}", e),
        })?;

        // Mix to mono by averaging channels.
        let samples = if channels <= 1 {
            raw
        } else {
            raw.chunks_exact(channels)
                .map(|frame| frame.iter().sum::<f32>() / channels as f32)
                .collect()
        };

        // 100ms chunks at the native rate.
        let chunk_size = (sample_rate as usize / 10).max(1);

        Ok(Self {
            samples,
            sample_rate,
            position: 0,
            chunk_size,
            started: false,
        })
    }

    /// Create from a file on disk.
    pub fn open(path: &Path) -> Result<Self> {
        let file = std::fs::File::open(path)?;
        Self::from_reader(Box::new(file))
    }

    /// Whether every sample has been drained.
    pub fn is_exhausted(&self) -> bool {
        self.position >= self.samples.len()
    }
}

impl CaptureSource for WavCaptureSource {
    fn start(&mut self) -> Result<CaptureStart> {
        self.started = true;
        Ok(CaptureStart {
            native_rate: self.sample_rate,
            clock: ClockContext {
                clock: Arc::new(SystemClock::new()),
                sink: Box::new(NullSink),
            },
        })
    }

    fn stop(&mut self) -> Result<()> {
        self.started = false;
        Ok(())
    }

    fn read_samples(&mut self) -> Result<Vec<f32>> {
        if !self.started || self.is_exhausted() {
            return Ok(Vec::new());
        }
        let end = (self.position + self.chunk_size).min(self.samples.len());
        let chunk = self.samples[self.position..end].to_vec();
        self.position = end;
        Ok(chunk)
    }
}
