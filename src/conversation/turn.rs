//! Turn-taking state machine.
//!
//! `Idle → Connecting → Listening → {Idle | Error}`. One [`Conversation`]
//! owns every piece of per-connection state — status, output sample rate,
//! transcript accumulators, capture engine, playback scheduler, transport
//! link — and is the only component allowed to change conversation state.
//! All events are processed synchronously in arrival order on one logical
//! thread; the async driver in [`crate::conversation::run_conversation`]
//! funnels capture frames and channel traffic into [`handle_event`].
//!
//! [`handle_event`]: Conversation::handle_event

use tokio::sync::mpsc;

use crate::audio::capture::CaptureEngine;
use crate::audio::frame::AudioFrame;
use crate::audio::playback::PlaybackScheduler;
use crate::conversation::Notice;
use crate::conversation::store::TranscriptStore;
use crate::conversation::transcript::{Role, TranscriptEntry, TranscriptReconciler};
use crate::defaults;
use crate::error::VoxlinkError;
use crate::transport::channel::{TransportLink, WirePayload};
use crate::transport::protocol::{ControlMessage, SessionConfig};

/// Externally visible conversation status.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ConversationStatus {
    Idle,
    Connecting,
    Listening,
    Error,
}

impl ConversationStatus {
    /// Human-readable status string for the UI layer.
    pub fn describe(&self) -> &'static str {
        match self {
            ConversationStatus::Idle => "idle",
            ConversationStatus::Connecting => "connecting",
            ConversationStatus::Listening => "listening",
            ConversationStatus::Error => "error",
        }
    }
}

/// Everything that can reach the state machine, in arrival order.
#[derive(Debug)]
pub enum ConversationEvent {
    /// The transport channel finished its handshake.
    ChannelOpened,
    /// An inbound payload arrived on the channel.
    ChannelMessage(WirePayload),
    /// The channel closed cleanly.
    ChannelClosed,
    /// The channel failed.
    ChannelError(String),
    /// The capture boundary produced a wire-format frame.
    CaptureFrame(AudioFrame),
    /// The caller typed a text turn.
    TextInput(String),
}

/// One voice conversation: all mutable state, explicit and in one place.
pub struct Conversation {
    status: ConversationStatus,
    session: SessionConfig,
    output_sample_rate: u32,
    /// Set once per connection by the first session-started message.
    rate_locked: bool,
    channel_open: bool,
    link: Option<Box<dyn TransportLink>>,
    capture: CaptureEngine,
    playback: PlaybackScheduler,
    frame_tx: mpsc::Sender<AudioFrame>,
    reconciler: TranscriptReconciler,
    notices: Option<crossbeam_channel::Sender<Notice>>,
    last_error: Option<VoxlinkError>,
}

impl Conversation {
    pub fn new(
        session: SessionConfig,
        capture: CaptureEngine,
        playback: PlaybackScheduler,
        store: Box<dyn TranscriptStore>,
        notices: Option<crossbeam_channel::Sender<Notice>>,
        frame_tx: mpsc::Sender<AudioFrame>,
    ) -> Self {
        Self {
            status: ConversationStatus::Idle,
            session,
            output_sample_rate: defaults::DEFAULT_OUTPUT_SAMPLE_RATE,
            rate_locked: false,
            channel_open: false,
            link: None,
            capture,
            playback,
            frame_tx,
            reconciler: TranscriptReconciler::new(store, notices.clone()),
            notices,
            last_error: None,
        }
    }

    /// Current status.
    pub fn status(&self) -> ConversationStatus {
        self.status
    }

    /// Output sample rate in effect for this connection.
    pub fn output_sample_rate(&self) -> u32 {
        self.output_sample_rate
    }

    /// The pending transcript entry for `role`, if any.
    pub fn pending_transcript(&self, role: Role) -> Option<TranscriptEntry> {
        self.reconciler.pending(role).cloned()
    }

    /// Number of playback items scheduled and not yet finished.
    pub fn scheduled_playback(&mut self) -> usize {
        self.playback.scheduled_len()
    }

    /// Takes the error that moved the conversation to `Error`, if any.
    pub fn take_error(&mut self) -> Option<VoxlinkError> {
        self.last_error.take()
    }

    /// Adopts an opening channel: `Idle → Connecting`.
    ///
    /// The session configuration is transmitted once the channel reports
    /// open. Ignored outside `Idle`.
    pub fn begin(&mut self, link: Box<dyn TransportLink>) {
        if self.status != ConversationStatus::Idle {
            tracing::warn!(status = ?self.status, "begin ignored: conversation not idle");
            return;
        }
        self.link = Some(link);
        self.set_status(ConversationStatus::Connecting);
    }

    /// Processes one event. Strictly in arrival order, never reentrant.
    pub fn handle_event(&mut self, event: ConversationEvent) {
        match event {
            ConversationEvent::ChannelOpened => {
                self.channel_open = true;
                if self.status == ConversationStatus::Connecting
                    && let Some(link) = self.link.as_mut()
                {
                    link.send_text(self.session.to_json());
                }
            }
            ConversationEvent::ChannelMessage(WirePayload::Text(raw)) => {
                match ControlMessage::parse(&raw) {
                    Ok(message) => self.handle_control(message),
                    Err(e) => {
                        // One bad message is dropped; the conversation
                        // continues.
                        tracing::warn!("{}", e);
                    }
                }
            }
            ConversationEvent::ChannelMessage(WirePayload::Binary(bytes)) => {
                self.playback.play(&bytes, self.output_sample_rate);
            }
            ConversationEvent::CaptureFrame(frame) => {
                if self.channel_open {
                    if let Some(link) = self.link.as_mut() {
                        link.send_binary(frame.to_le_bytes());
                    }
                }
                // Not open: the frame is dropped. Capture never queues.
            }
            ConversationEvent::TextInput(text) => {
                if self.channel_open
                    && let Some(link) = self.link.as_mut()
                {
                    link.send_text(ControlMessage::Text { text }.to_json());
                }
            }
            ConversationEvent::ChannelClosed => self.on_channel_closed(),
            ConversationEvent::ChannelError(message) => self.on_channel_error(message),
        }
    }

    /// Caller-initiated disconnect. Safe from any state, including
    /// mid-`Connecting`. Teardown order: capture, playback, transcript
    /// flush, channel — so nothing is produced or scheduled once teardown
    /// begins.
    pub fn stop(&mut self) {
        self.capture.stop();
        self.playback.stop_all();
        self.playback.detach();
        self.reconciler.flush();
        if let Some(mut link) = self.link.take() {
            link.close();
        }
        self.channel_open = false;
        self.reset_output_rate();
        if self.status != ConversationStatus::Idle {
            self.reconciler.store_mut().session_ended("stopped");
        }
        self.set_status(ConversationStatus::Idle);
    }

    fn handle_control(&mut self, message: ControlMessage) {
        match message {
            ControlMessage::SessionStarted { output_sample_rate } => {
                self.on_session_started(output_sample_rate)
            }
            ControlMessage::CallerDelta { text } => self.on_delta(Role::Caller, &text),
            ControlMessage::ModelDelta { text } => self.on_delta(Role::Model, &text),
            ControlMessage::TurnComplete => {
                if self.status == ConversationStatus::Listening {
                    self.reconciler.flush();
                }
            }
            ControlMessage::Interrupted => {
                if self.status == ConversationStatus::Listening {
                    self.playback.stop_all();
                    self.reconciler.flush();
                }
            }
            ControlMessage::ToolCall { name, args, result } => {
                // Tool entries arrive whole, whatever the state.
                self.reconciler
                    .record_tool_call(&name, &args, result.as_deref());
            }
            ControlMessage::Error { message } => self.on_model_error(message),
            ControlMessage::Text { .. } => {
                tracing::warn!("dropping inbound text-turn message: outbound-only tag");
            }
        }
    }

    fn on_session_started(&mut self, output_sample_rate: Option<u32>) {
        if self.status != ConversationStatus::Connecting {
            tracing::debug!(status = ?self.status, "session_started ignored");
            return;
        }

        if !self.rate_locked {
            if let Some(rate) = output_sample_rate {
                self.output_sample_rate = rate;
            }
            self.rate_locked = true;
        }

        match self.capture.start(self.frame_tx.clone()) {
            Ok(clock) => {
                self.playback.attach(clock);
                self.reconciler.store_mut().session_started(&self.session);
                self.set_status(ConversationStatus::Listening);
            }
            Err(e) => {
                tracing::error!("capture start failed: {}", e);
                self.notify(Notice::SessionError(e.to_string()));
                self.last_error = Some(e);
                if let Some(mut link) = self.link.take() {
                    link.close();
                }
                self.channel_open = false;
                self.playback.detach();
                self.reconciler.store_mut().session_ended("capture failed");
                self.set_status(ConversationStatus::Error);
            }
        }
    }

    fn on_delta(&mut self, role: Role, text: &str) {
        if self.status != ConversationStatus::Listening {
            tracing::debug!(status = ?self.status, "transcript delta ignored");
            return;
        }
        self.reconciler.apply_delta(role, text);
    }

    fn on_model_error(&mut self, message: String) {
        tracing::error!("model error: {}", message);
        self.notify(Notice::SessionError(message.clone()));
        self.last_error = Some(VoxlinkError::Model { message });
        self.capture.stop();
        self.playback.stop_all();
        self.playback.detach();
        self.reconciler.store_mut().session_ended("model error");
        self.set_status(ConversationStatus::Error);
    }

    fn on_channel_error(&mut self, message: String) {
        tracing::error!("channel error: {}", message);
        self.notify(Notice::SessionError(message.clone()));
        self.last_error = Some(VoxlinkError::Channel { message });
        self.capture.stop();
        self.playback.stop_all();
        self.playback.detach();
        self.link = None;
        self.channel_open = false;
        self.reconciler.store_mut().session_ended("channel error");
        self.set_status(ConversationStatus::Error);
    }

    fn on_channel_closed(&mut self) {
        self.channel_open = false;
        self.link = None;
        self.reconciler.flush();
        self.capture.stop();
        self.playback.stop_all();
        self.playback.detach();
        self.reset_output_rate();
        if self.status != ConversationStatus::Idle {
            self.reconciler.store_mut().session_ended("channel closed");
        }
        self.set_status(ConversationStatus::Idle);
    }

    fn reset_output_rate(&mut self) {
        self.output_sample_rate = defaults::DEFAULT_OUTPUT_SAMPLE_RATE;
        self.rate_locked = false;
    }

    fn set_status(&mut self, status: ConversationStatus) {
        if self.status != status {
            tracing::info!(from = ?self.status, to = ?status, "conversation status");
            self.status = status;
            self.notify(Notice::Status(status));
        }
    }

    fn notify(&self, notice: Notice) {
        if let Some(tx) = &self.notices {
            let _ = tx.send(notice);
        }
    }
}
