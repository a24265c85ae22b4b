//! Live audio I/O using CPAL (Cross-Platform Audio Library).
//!
//! One [`CpalCaptureSource`] owns both halves of the device: the input
//! stream it drains for capture and the output stream whose render clock
//! becomes the conversation's timing domain. Opening them together keeps
//! capture and playback in one timing domain, so a device switch cannot
//! split them.

use std::collections::VecDeque;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::{Arc, Mutex};
use std::time::Duration;

use cpal::traits::{DeviceTrait, HostTrait, StreamTrait};

use crate::audio::capture::{CaptureSource, CaptureStart};
use crate::audio::playback::{ClockContext, OutputClock, PlaybackSink};
use crate::audio::resample::resample;
use crate::error::{Result, VoxlinkError};

/// Run a closure with stderr temporarily redirected to /dev/null.
///
/// This suppresses noisy ALSA/JACK/PipeWire messages that CPAL triggers
/// when probing audio backends. The messages are harmless but confusing to
/// users.
///
/// # Safety
/// Uses `libc::dup`/`libc::dup2` to save and restore file descriptor 2
/// (stderr). Safe as long as no other thread is concurrently manipulating
/// fd 2.
fn with_suppressed_stderr<F, R>(f: F) -> R
where
    F: FnOnce() -> R,
{
    unsafe {
        let saved_fd = libc::dup(2);
        let devnull = libc::open(c"/dev/null".as_ptr(), libc::O_WRONLY);
        if saved_fd >= 0 && devnull >= 0 {
            libc::dup2(devnull, 2);
            libc::close(devnull);
        }

        let result = f();

        if saved_fd >= 0 {
            libc::dup2(saved_fd, 2);
            libc::close(saved_fd);
        }

        result
    }
}

/// Suppress noisy JACK/ALSA error messages during audio backend probing.
///
/// # Safety
/// Modifies environment variables; safe when called before spawning
/// threads.
pub fn suppress_audio_warnings() {
    // SAFETY: Called at startup before any threads are spawned
    unsafe {
        std::env::set_var("JACK_NO_START_SERVER", "1");
        std::env::set_var("JACK_NO_AUDIO_RESERVATION", "1");
        std::env::set_var("PIPEWIRE_DEBUG", "0");
        std::env::set_var("ALSA_DEBUG", "0");
        std::env::set_var("PW_LOG", "0");
    }
}

/// Preferred device names for GNOME/PipeWire environments.
const PREFERRED_DEVICES: &[&str] = &["pipewire", "pulse", "PulseAudio"];

/// Device name patterns to filter out (not useful for voice input).
const FILTERED_PATTERNS: &[&str] = &[
    "surround",
    "front:",
    "rear:",
    "center:",
    "side:",
    "Digital Output",
    "HDMI",
    "S/PDIF",
];

/// Check if a device name should be filtered out.
fn should_filter_device(name: &str) -> bool {
    let lower = name.to_lowercase();
    FILTERED_PATTERNS
        .iter()
        .any(|pattern| lower.contains(&pattern.to_lowercase()))
}

/// Check if a device is a preferred device.
fn is_preferred_device(name: &str) -> bool {
    let lower = name.to_lowercase();
    PREFERRED_DEVICES
        .iter()
        .any(|pref| lower.contains(&pref.to_lowercase()))
}

/// List available input devices, preferred ones marked "\[recommended\]".
///
/// # Errors
/// Returns `AudioCapture` if device enumeration fails.
pub fn list_devices() -> Result<Vec<String>> {
    let (host, devices) = with_suppressed_stderr(|| {
        let host = cpal::default_host();
        let devices = host.input_devices();
        (host, devices)
    });
    let _ = host; // keep host alive while iterating devices
    let devices = devices.map_err(|e| VoxlinkError::AudioCapture {
        message: format!("Failed to enumerate input devices: {}", e),
    })?;

    let mut device_names = Vec::new();
    for device in devices {
        if let Ok(name) = device.name() {
            if should_filter_device(&name) {
                continue;
            }
            if is_preferred_device(&name) {
                device_names.push(format!("{} [recommended]", name));
            } else {
                device_names.push(name);
            }
        }
    }

    Ok(device_names)
}

/// Get the best default input device, preferring PipeWire/PulseAudio.
///
/// This respects the desktop's audio device selection instead of raw ALSA
/// defaults.
fn get_best_default_device() -> Result<cpal::Device> {
    with_suppressed_stderr(|| {
        let host = cpal::default_host();

        if let Ok(devices) = host.input_devices() {
            for device in devices {
                if let Ok(name) = device.name()
                    && is_preferred_device(&name)
                {
                    return Ok(device);
                }
            }
        }

        host.default_input_device()
            .ok_or_else(|| VoxlinkError::DeviceUnavailable {
                device: "default".to_string(),
            })
    })
}

/// Wrapper for cpal::Stream to make it Send.
///
/// SAFETY: The stream is only accessed from one thread at a time; stream
/// methods are called synchronously behind the owning source.
struct SendableStream(cpal::Stream);

unsafe impl Send for SendableStream {}

/// One scheduled buffer in the render queue, in device-rate frames.
struct RenderItem {
    start: u64,
    samples: Vec<f32>,
}

/// Shared render queue between the scheduler-facing sink and the output
/// callback.
type RenderQueue = Arc<Mutex<VecDeque<RenderItem>>>;

/// Clock counting frames actually rendered by the output stream.
struct CpalClock {
    frames: Arc<AtomicU64>,
    sample_rate: u32,
}

impl OutputClock for CpalClock {
    fn now(&self) -> Duration {
        let frames = self.frames.load(Ordering::Relaxed);
        Duration::from_secs_f64(frames as f64 / self.sample_rate as f64)
    }
}

/// Scheduler-facing sink feeding the output stream's render queue.
struct CpalRenderSink {
    queue: RenderQueue,
    device_rate: u32,
}

impl PlaybackSink for CpalRenderSink {
    fn submit(&mut self, start: Duration, samples: Vec<f32>, sample_rate: u32) {
        let device_samples = resample(&samples, sample_rate, self.device_rate);
        let start_frame = (start.as_secs_f64() * self.device_rate as f64).round() as u64;
        if let Ok(mut queue) = self.queue.lock() {
            queue.push_back(RenderItem {
                start: start_frame,
                samples: device_samples,
            });
        }
    }

    fn cancel_all(&mut self) {
        if let Ok(mut queue) = self.queue.lock() {
            queue.clear();
        }
    }
}

/// Next sample for absolute frame `t`, dropping items that have finished.
fn sample_at(queue: &mut VecDeque<RenderItem>, t: u64) -> f32 {
    while let Some(front) = queue.front() {
        if front.start + front.samples.len() as u64 <= t {
            queue.pop_front();
        } else {
            break;
        }
    }
    match queue.front() {
        Some(front) if front.start <= t => front.samples[(t - front.start) as usize],
        _ => 0.0,
    }
}

/// Live capture + playback over the system's audio device.
///
/// Captures mono f32 at the device's native rate (channel mixing in the
/// input callback); the capture engine handles wire resampling.
pub struct CpalCaptureSource {
    device: cpal::Device,
    input_stream: Arc<Mutex<Option<SendableStream>>>,
    output_stream: Arc<Mutex<Option<SendableStream>>>,
    buffer: Arc<Mutex<Vec<f32>>>,
    native_rate: u32,
}

impl CpalCaptureSource {
    /// Create a new CPAL capture source.
    ///
    /// # Arguments
    /// * `device_name` - Optional input device name; `None` uses the best
    ///   default (prefers PipeWire/PulseAudio).
    ///
    /// # Errors
    /// `DeviceUnavailable` when the named (or any) input device is
    /// missing, `AudioCapture` when enumeration fails.
    pub fn new(device_name: Option<&str>) -> Result<Self> {
        let device = with_suppressed_stderr(|| {
            let host = cpal::default_host();

            if let Some(name) = device_name {
                let devices = host
                    .input_devices()
                    .map_err(|e| VoxlinkError::AudioCapture {
                        message: format!("Failed to enumerate devices: {}", e),
                    })?;

                for dev in devices {
                    if let Ok(dev_name) = dev.name()
                        && dev_name == name
                    {
                        return Ok(dev);
                    }
                }

                Err(VoxlinkError::DeviceUnavailable {
                    device: name.to_string(),
                })
            } else {
                get_best_default_device()
            }
        })?;

        Ok(Self {
            device,
            input_stream: Arc::new(Mutex::new(None)),
            output_stream: Arc::new(Mutex::new(None)),
            buffer: Arc::new(Mutex::new(Vec::new())),
            native_rate: 0,
        })
    }

    /// Build the input stream at the device's native config, mixing to
    /// mono in the callback.
    fn build_input_stream(&mut self) -> Result<cpal::Stream> {
        use cpal::SampleFormat;

        let default_config =
            self.device
                .default_input_config()
                .map_err(|e| VoxlinkError::AudioCapture {
                    message: format!("Failed to query default input config: {}", e),
                })?;

        let channels = default_config.channels() as usize;
        self.native_rate = default_config.sample_rate();
        let stream_config: cpal::StreamConfig = default_config.clone().into();

        let err_callback = |err| {
            tracing::warn!("audio input stream error: {}", err);
        };

        let buffer = Arc::clone(&self.buffer);
        match default_config.sample_format() {
            SampleFormat::F32 => self
                .device
                .build_input_stream(
                    &stream_config,
                    move |data: &[f32], _: &cpal::InputCallbackInfo| {
                        push_mono(&buffer, data.iter().copied(), channels);
                    },
                    err_callback,
                    None,
                )
                .map_err(|e| VoxlinkError::AudioCapture {
                    message: format!("Failed to build f32 input stream: {}", e),
                }),
            SampleFormat::I16 => self
                .device
                .build_input_stream(
                    &stream_config,
                    move |data: &[i16], _: &cpal::InputCallbackInfo| {
                        push_mono(
                            &buffer,
                            data.iter().map(|&s| s as f32 / 32768.0),
                            channels,
                        );
                    },
                    err_callback,
                    None,
                )
                .map_err(|e| VoxlinkError::AudioCapture {
                    message: format!("Failed to build i16 input stream: {}", e),
                }),
            fmt => Err(VoxlinkError::AudioCapture {
                message: format!("Unsupported native sample format: {:?}", fmt),
            }),
        }
    }

    /// Build the output stream and the timing domain it drives.
    fn build_output(&self) -> Result<(cpal::Stream, ClockContext)> {
        use cpal::SampleFormat;

        let host = cpal::default_host();
        let device =
            host.default_output_device()
                .ok_or_else(|| VoxlinkError::DeviceUnavailable {
                    device: "output".to_string(),
                })?;
        let default_config =
            device
                .default_output_config()
                .map_err(|e| VoxlinkError::AudioCapture {
                    message: format!("Failed to query default output config: {}", e),
                })?;

        let device_rate = default_config.sample_rate();
        let channels = default_config.channels() as usize;
        let stream_config: cpal::StreamConfig = default_config.clone().into();

        let queue: RenderQueue = Arc::new(Mutex::new(VecDeque::new()));
        let frames = Arc::new(AtomicU64::new(0));

        let err_callback = |err| {
            tracing::warn!("audio output stream error: {}", err);
        };

        let cb_queue = Arc::clone(&queue);
        let cb_frames = Arc::clone(&frames);
        let stream = match default_config.sample_format() {
            SampleFormat::F32 => device
                .build_output_stream(
                    &stream_config,
                    move |data: &mut [f32], _: &cpal::OutputCallbackInfo| {
                        render_into(&cb_queue, &cb_frames, channels, data, |s| s);
                    },
                    err_callback,
                    None,
                )
                .map_err(|e| VoxlinkError::AudioCapture {
                    message: format!("Failed to build f32 output stream: {}", e),
                })?,
            SampleFormat::I16 => device
                .build_output_stream(
                    &stream_config,
                    move |data: &mut [i16], _: &cpal::OutputCallbackInfo| {
                        render_into(&cb_queue, &cb_frames, channels, data, |s| {
                            (s.clamp(-1.0, 1.0) * 32767.0) as i16
                        });
                    },
                    err_callback,
                    None,
                )
                .map_err(|e| VoxlinkError::AudioCapture {
                    message: format!("Failed to build i16 output stream: {}", e),
                })?,
            fmt => {
                return Err(VoxlinkError::AudioCapture {
                    message: format!("Unsupported output sample format: {:?}", fmt),
                });
            }
        };

        let context = ClockContext {
            clock: Arc::new(CpalClock {
                frames,
                sample_rate: device_rate,
            }),
            sink: Box::new(CpalRenderSink { queue, device_rate }),
        };

        Ok((stream, context))
    }
}

/// Mix an interleaved callback buffer to mono and append to `buffer`.
fn push_mono(
    buffer: &Arc<Mutex<Vec<f32>>>,
    data: impl Iterator<Item = f32>,
    channels: usize,
) {
    let Ok(mut buf) = buffer.lock() else {
        return;
    };
    if channels <= 1 {
        buf.extend(data);
        return;
    }
    let mut acc = 0.0f32;
    let mut n = 0usize;
    for s in data {
        acc += s;
        n += 1;
        if n == channels {
            buf.push(acc / channels as f32);
            acc = 0.0;
            n = 0;
        }
    }
}

/// Fill one output callback buffer from the render queue.
fn render_into<T>(
    queue: &RenderQueue,
    frames: &Arc<AtomicU64>,
    channels: usize,
    data: &mut [T],
    convert: impl Fn(f32) -> T,
) where
    T: Copy,
{
    let frame_count = (data.len() / channels.max(1)) as u64;
    let start = frames.load(Ordering::Relaxed);
    if let Ok(mut queue) = queue.lock() {
        for (i, out_frame) in data.chunks_mut(channels.max(1)).enumerate() {
            let sample = sample_at(&mut queue, start + i as u64);
            let converted = convert(sample);
            for out in out_frame.iter_mut() {
                *out = converted;
            }
        }
    }
    frames.fetch_add(frame_count, Ordering::Relaxed);
}

impl CaptureSource for CpalCaptureSource {
    fn start(&mut self) -> Result<CaptureStart> {
        let input = self.build_input_stream()?;
        input.play().map_err(|e| VoxlinkError::AudioCapture {
            message: format!("Failed to start input stream: {}", e),
        })?;

        let (output, context) = self.build_output()?;
        output.play().map_err(|e| VoxlinkError::AudioCapture {
            message: format!("Failed to start output stream: {}", e),
        })?;

        if let Ok(mut guard) = self.input_stream.lock() {
            *guard = Some(SendableStream(input));
        }
        if let Ok(mut guard) = self.output_stream.lock() {
            *guard = Some(SendableStream(output));
        }

        Ok(CaptureStart {
            native_rate: self.native_rate,
            clock: context,
        })
    }

    fn stop(&mut self) -> Result<()> {
        if let Ok(mut guard) = self.input_stream.lock()
            && let Some(stream) = guard.take()
        {
            let _ = stream.0.pause();
        }
        if let Ok(mut guard) = self.output_stream.lock() {
            guard.take();
        }
        if let Ok(mut buf) = self.buffer.lock() {
            buf.clear();
        }
        Ok(())
    }

    fn read_samples(&mut self) -> Result<Vec<f32>> {
        let mut buffer = self.buffer.lock().map_err(|e| VoxlinkError::AudioCapture {
            message: format!("Failed to lock audio buffer: {}", e),
        })?;
        Ok(std::mem::take(&mut *buffer))
    }
}
