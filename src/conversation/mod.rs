//! Conversation orchestration: turn state, transcript, persistence seam.
//!
//! The async driver here is the single place where the two event sources
//! — the capture boundary and the transport channel — meet. It funnels
//! both into [`Conversation::handle_event`] so all state mutation happens
//! in arrival order on one logical thread.

pub mod store;
pub mod transcript;
pub mod turn;

use tokio::sync::mpsc;

use crate::audio::capture::CaptureEngine;
use crate::audio::playback::PlaybackScheduler;
use crate::defaults;
use crate::error::Result;
use crate::transport::channel::{self, ChannelEvent};
use crate::transport::protocol::{SessionConfig, ws_url_from_http};

pub use store::{LogStore, MemoryStore, TranscriptStore};
pub use transcript::{Role, TranscriptEntry, TranscriptReconciler};
pub use turn::{Conversation, ConversationEvent, ConversationStatus};

/// Non-blocking notifications for the UI layer.
#[derive(Debug, Clone, PartialEq)]
pub enum Notice {
    Status(ConversationStatus),
    EntryCreated(TranscriptEntry),
    EntryUpdated(TranscriptEntry),
    EntryFinalized(TranscriptEntry),
    SessionError(String),
}

/// Caller commands into a running conversation.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Command {
    /// Send a typed text turn.
    SendText(String),
    /// Disconnect and tear down.
    Stop,
}

/// Opens a channel to `server_url` and runs one conversation to completion.
///
/// Returns when the channel closes, the caller sends [`Command::Stop`], or
/// a fatal error moves the conversation to the error state (in which case
/// that error is returned). There is no automatic reconnection — retrying
/// means calling this again.
pub async fn run_conversation(
    server_url: &str,
    session: SessionConfig,
    capture: CaptureEngine,
    store: Box<dyn TranscriptStore>,
    notices: Option<crossbeam_channel::Sender<Notice>>,
    mut commands: mpsc::UnboundedReceiver<Command>,
) -> Result<()> {
    let ws_url = ws_url_from_http(server_url)?;
    let (link, mut channel_rx) = channel::open(&ws_url).await?;

    let (frame_tx, mut frame_rx) = mpsc::channel(defaults::FRAME_CHANNEL_CAPACITY);
    let mut conv = Conversation::new(
        session,
        capture,
        PlaybackScheduler::new(),
        store,
        notices,
        frame_tx,
    );
    conv.begin(Box::new(link));

    loop {
        tokio::select! {
            event = channel_rx.recv() => match event {
                Some(ChannelEvent::Opened) => {
                    conv.handle_event(ConversationEvent::ChannelOpened);
                }
                Some(ChannelEvent::Message(payload)) => {
                    conv.handle_event(ConversationEvent::ChannelMessage(payload));
                }
                Some(ChannelEvent::Error(message)) => {
                    conv.handle_event(ConversationEvent::ChannelError(message));
                    break;
                }
                Some(ChannelEvent::Closed) | None => {
                    conv.handle_event(ConversationEvent::ChannelClosed);
                    break;
                }
            },
            Some(frame) = frame_rx.recv() => {
                conv.handle_event(ConversationEvent::CaptureFrame(frame));
            }
            command = commands.recv() => match command {
                Some(Command::SendText(text)) => {
                    conv.handle_event(ConversationEvent::TextInput(text));
                }
                Some(Command::Stop) | None => {
                    conv.stop();
                    break;
                }
            },
        }
    }

    match conv.take_error() {
        Some(error) => Err(error),
        None => Ok(()),
    }
}
