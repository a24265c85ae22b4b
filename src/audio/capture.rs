//! Capture engine: microphone source to wire-format frames.
//!
//! The engine owns a [`CaptureSource`] (real device, WAV file, or mock),
//! runs it on a dedicated thread, and converts each drained chunk to the
//! wire format independently: resample to 16kHz, quantize, frame. Frames
//! are handed to the control loop through a bounded channel with exactly
//! one delivery attempt each — when the loop is slow or gone the frame is
//! dropped, never queued.

use std::sync::Arc;
use std::sync::atomic::{AtomicBool, AtomicUsize, Ordering};
use std::thread::{self, JoinHandle};
use std::time::Duration;

use tokio::sync::mpsc;

use crate::audio::codec;
use crate::audio::frame::AudioFrame;
use crate::audio::playback::{ClockContext, CollectingSink, ManualClock};
use crate::audio::resample::resample;
use crate::defaults;
use crate::error::{Result, VoxlinkError};

/// What a source yields when it starts: its native rate plus the output
/// timing domain it established.
///
/// Capture and playback must share one timing domain while both are
/// active, so the source that opens the audio device also owns creating
/// the clock the playback scheduler will attach to.
pub struct CaptureStart {
    /// Sample rate the source produces, in Hz.
    pub native_rate: u32,
    /// Output timing domain for the playback scheduler.
    pub clock: ClockContext,
}

/// Trait for capture sources.
///
/// This trait allows swapping implementations (real audio device, WAV
/// file, mock).
pub trait CaptureSource: Send {
    /// Start producing samples.
    ///
    /// # Errors
    /// `PermissionDenied` if the platform refuses microphone access,
    /// `DeviceUnavailable` if no usable device exists.
    fn start(&mut self) -> Result<CaptureStart>;

    /// Stop producing samples and release the device.
    fn stop(&mut self) -> Result<()>;

    /// Drain captured samples since the last read (native rate, mono).
    fn read_samples(&mut self) -> Result<Vec<f32>>;
}

/// How a [`MockCaptureSource`] should fail on start.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum StartFailure {
    PermissionDenied,
    DeviceUnavailable,
}

/// Mock capture source for testing.
///
/// Shared-state clone semantics: clones observe the same started flag and
/// read counter, so a test can keep a handle after the engine takes
/// ownership.
#[derive(Clone)]
pub struct MockCaptureSource {
    native_rate: u32,
    samples: Vec<f32>,
    started: Arc<AtomicBool>,
    reads: Arc<AtomicUsize>,
    fail_start: Option<StartFailure>,
    clock: ManualClock,
    sink: CollectingSink,
}

impl MockCaptureSource {
    /// Creates a mock producing 10ms of silence at 48kHz per read.
    pub fn new() -> Self {
        Self {
            native_rate: 48000,
            samples: vec![0.0; 480],
            started: Arc::new(AtomicBool::new(false)),
            reads: Arc::new(AtomicUsize::new(0)),
            fail_start: None,
            clock: ManualClock::new(),
            sink: CollectingSink::new(),
        }
    }

    /// Configure the samples returned by every read.
    pub fn with_samples(mut self, samples: Vec<f32>) -> Self {
        self.samples = samples;
        self
    }

    /// Configure the native sample rate.
    pub fn with_native_rate(mut self, rate: u32) -> Self {
        self.native_rate = rate;
        self
    }

    /// Configure the mock to fail start with `PermissionDenied`.
    pub fn with_permission_denied(mut self) -> Self {
        self.fail_start = Some(StartFailure::PermissionDenied);
        self
    }

    /// Configure the mock to fail start with `DeviceUnavailable`.
    pub fn with_device_unavailable(mut self) -> Self {
        self.fail_start = Some(StartFailure::DeviceUnavailable);
        self
    }

    /// Whether the source is currently started.
    pub fn is_started(&self) -> bool {
        self.started.load(Ordering::SeqCst)
    }

    /// Number of reads performed while started.
    pub fn read_count(&self) -> usize {
        self.reads.load(Ordering::SeqCst)
    }

    /// The manual clock handed out as the timing domain.
    pub fn clock(&self) -> ManualClock {
        self.clock.clone()
    }

    /// The collecting sink handed out as the timing domain.
    pub fn sink(&self) -> CollectingSink {
        self.sink.clone()
    }
}

impl Default for MockCaptureSource {
    fn default() -> Self {
        Self::new()
    }
}

impl CaptureSource for MockCaptureSource {
    fn start(&mut self) -> Result<CaptureStart> {
        match self.fail_start {
            Some(StartFailure::PermissionDenied) => Err(VoxlinkError::PermissionDenied {
                message: "mock denied".to_string(),
            }),
            Some(StartFailure::DeviceUnavailable) => Err(VoxlinkError::DeviceUnavailable {
                device: "mock".to_string(),
            }),
            None => {
                self.started.store(true, Ordering::SeqCst);
                Ok(CaptureStart {
                    native_rate: self.native_rate,
                    clock: ClockContext {
                        clock: Arc::new(self.clock.clone()),
                        sink: Box::new(self.sink.clone()),
                    },
                })
            }
        }
    }

    fn stop(&mut self) -> Result<()> {
        self.started.store(false, Ordering::SeqCst);
        Ok(())
    }

    fn read_samples(&mut self) -> Result<Vec<f32>> {
        if !self.started.load(Ordering::SeqCst) {
            return Ok(Vec::new());
        }
        self.reads.fetch_add(1, Ordering::SeqCst);
        Ok(self.samples.clone())
    }
}

/// Runs a capture source on its own thread and emits wire-format frames.
pub struct CaptureEngine {
    source: Option<Box<dyn CaptureSource>>,
    running: Arc<AtomicBool>,
    handle: Option<JoinHandle<Box<dyn CaptureSource>>>,
    chunk: Duration,
}

impl CaptureEngine {
    pub fn new(source: Box<dyn CaptureSource>) -> Self {
        Self {
            source: Some(source),
            running: Arc::new(AtomicBool::new(false)),
            handle: None,
            chunk: Duration::from_millis(defaults::CAPTURE_CHUNK_MS),
        }
    }

    /// Override the capture chunk cadence.
    pub fn with_chunk_ms(mut self, ms: u64) -> Self {
        self.chunk = Duration::from_millis(ms);
        self
    }

    /// Whether the capture thread is running.
    pub fn is_running(&self) -> bool {
        self.running.load(Ordering::SeqCst)
    }

    /// Acquires the source and starts the capture thread.
    ///
    /// Frames are delivered into `frame_tx` with `try_send` — one attempt
    /// per frame, silent drop on a full or closed channel.
    ///
    /// # Returns
    /// The output timing domain established by the source, for the
    /// playback scheduler to attach.
    ///
    /// # Errors
    /// Source start errors (`PermissionDenied`, `DeviceUnavailable`), or
    /// `AudioCapture` if the engine is already running.
    pub fn start(&mut self, frame_tx: mpsc::Sender<AudioFrame>) -> Result<ClockContext> {
        let Some(mut source) = self.source.take() else {
            return Err(VoxlinkError::AudioCapture {
                message: "capture already running".to_string(),
            });
        };

        let started = match source.start() {
            Ok(started) => started,
            Err(e) => {
                self.source = Some(source);
                return Err(e);
            }
        };
        let CaptureStart { native_rate, clock } = started;

        self.running.store(true, Ordering::SeqCst);
        let running = Arc::clone(&self.running);
        let chunk = self.chunk;
        self.handle = Some(thread::spawn(move || {
            run_capture(source, running, frame_tx, native_rate, chunk)
        }));

        tracing::debug!(native_rate, "capture started");
        Ok(clock)
    }

    /// Halts the capture thread and releases the device.
    ///
    /// Idempotent; a no-op when not started. No frames are delivered
    /// after this call returns.
    pub fn stop(&mut self) {
        self.running.store(false, Ordering::SeqCst);
        if let Some(handle) = self.handle.take() {
            match handle.join() {
                Ok(mut source) => {
                    if let Err(e) = source.stop() {
                        tracing::warn!("capture source stop failed: {}", e);
                    }
                    self.source = Some(source);
                }
                Err(_) => tracing::error!("capture thread panicked"),
            }
            tracing::debug!("capture stopped");
        }
    }
}

impl Drop for CaptureEngine {
    fn drop(&mut self) {
        self.stop();
    }
}

/// Capture loop body. Returns the source so the engine can restart it.
fn run_capture(
    mut source: Box<dyn CaptureSource>,
    running: Arc<AtomicBool>,
    frame_tx: mpsc::Sender<AudioFrame>,
    native_rate: u32,
    chunk: Duration,
) -> Box<dyn CaptureSource> {
    while running.load(Ordering::SeqCst) {
        match source.read_samples() {
            Ok(samples) if !samples.is_empty() => {
                // Each chunk is resampled independently; no resampler state
                // crosses chunk boundaries.
                let wire = resample(&samples, native_rate, defaults::WIRE_SAMPLE_RATE);
                let frame = AudioFrame::new(codec::quantize(&wire), defaults::WIRE_SAMPLE_RATE);
                if frame_tx.try_send(frame).is_err() {
                    tracing::trace!("frame dropped: control loop not ready");
                }
            }
            Ok(_) => {}
            Err(e) => tracing::warn!("capture read failed: {}", e),
        }
        thread::sleep(chunk);
    }
    source
}
