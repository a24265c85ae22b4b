//! Duplex WebSocket channel to the conversation backend.
//!
//! One connection per conversation. The channel surfaces inbound traffic
//! as [`ChannelEvent`]s on a receiver and accepts outbound traffic through
//! a [`TransportLink`] — both fire-and-forget from the control loop's
//! point of view. There is no automatic reconnection: a dropped channel
//! ends the conversation and the caller must open a new one.

use futures_util::{SinkExt, StreamExt};
use tokio::sync::mpsc;
use tokio_tungstenite::connect_async;
use tokio_tungstenite::tungstenite::Message;

use crate::error::{Result, VoxlinkError};

/// An inbound payload: binary is always audio, text is always one JSON
/// control object.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum WirePayload {
    Binary(Vec<u8>),
    Text(String),
}

/// Lifecycle and traffic events delivered to the channel's owner.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ChannelEvent {
    Opened,
    Message(WirePayload),
    Closed,
    Error(String),
}

/// Outbound half of a channel.
///
/// Sends are non-blocking and silently dropped once the connection is
/// gone — callers gate on conversation state, not on the link.
pub trait TransportLink: Send {
    fn send_binary(&mut self, bytes: Vec<u8>);
    fn send_text(&mut self, text: String);
    fn close(&mut self);
}

enum Outbound {
    Binary(Vec<u8>),
    Text(String),
    Close,
}

/// Outbound handle to a live WebSocket connection.
pub struct WsLink {
    out: mpsc::UnboundedSender<Outbound>,
}

impl TransportLink for WsLink {
    fn send_binary(&mut self, bytes: Vec<u8>) {
        if self.out.send(Outbound::Binary(bytes)).is_err() {
            tracing::trace!("binary frame dropped: writer gone");
        }
    }

    fn send_text(&mut self, text: String) {
        if self.out.send(Outbound::Text(text)).is_err() {
            tracing::trace!("text message dropped: writer gone");
        }
    }

    fn close(&mut self) {
        let _ = self.out.send(Outbound::Close);
    }
}

/// Opens the WebSocket connection for one conversation.
///
/// On success the `Opened` event is already queued on the returned
/// receiver, followed by one `Message` per inbound payload and exactly one
/// terminal `Closed` or `Error`.
///
/// # Errors
/// `Channel` when the connection cannot be established.
pub async fn open(url: &str) -> Result<(WsLink, mpsc::Receiver<ChannelEvent>)> {
    let (stream, _response) = connect_async(url)
        .await
        .map_err(|e| VoxlinkError::Channel {
            message: format!("connect to {} failed: {}", url, e),
        })?;
    tracing::debug!(url, "channel open");

    let (mut write, mut read) = stream.split();
    let (event_tx, event_rx) = mpsc::channel::<ChannelEvent>(64);
    let (out_tx, mut out_rx) = mpsc::unbounded_channel::<Outbound>();

    // Queued before any traffic so the owner sees open-before-messages.
    let _ = event_tx.try_send(ChannelEvent::Opened);

    // Writer task: drains the outbound queue until close or failure.
    tokio::spawn(async move {
        while let Some(outbound) = out_rx.recv().await {
            let result = match outbound {
                Outbound::Binary(bytes) => write.send(Message::Binary(bytes)).await,
                Outbound::Text(text) => write.send(Message::Text(text)).await,
                Outbound::Close => {
                    let _ = write.send(Message::Close(None)).await;
                    break;
                }
            };
            if let Err(e) = result {
                tracing::debug!("channel write failed: {}", e);
                break;
            }
        }
    });

    // Reader task: forwards inbound payloads, then exactly one terminal
    // event.
    tokio::spawn(async move {
        let terminal = loop {
            match read.next().await {
                Some(Ok(Message::Binary(bytes))) => {
                    if event_tx
                        .send(ChannelEvent::Message(WirePayload::Binary(bytes)))
                        .await
                        .is_err()
                    {
                        return;
                    }
                }
                Some(Ok(Message::Text(text))) => {
                    if event_tx
                        .send(ChannelEvent::Message(WirePayload::Text(text)))
                        .await
                        .is_err()
                    {
                        return;
                    }
                }
                Some(Ok(Message::Close(_))) | None => break ChannelEvent::Closed,
                Some(Ok(_)) => continue, // ping/pong/frame
                Some(Err(e)) => break ChannelEvent::Error(e.to_string()),
            }
        };
        let _ = event_tx.send(terminal).await;
    });

    Ok((WsLink { out: out_tx }, event_rx))
}

/// Transport link that records what was sent, for tests.
#[derive(Clone, Default)]
pub struct RecordingLink {
    inner: std::sync::Arc<std::sync::Mutex<RecordingLinkInner>>,
}

#[derive(Default)]
struct RecordingLinkInner {
    binary: Vec<Vec<u8>>,
    text: Vec<String>,
    closed: bool,
}

impl RecordingLink {
    pub fn new() -> Self {
        Self::default()
    }

    /// Binary frames sent so far.
    pub fn binary_frames(&self) -> Vec<Vec<u8>> {
        self.inner
            .lock()
            .map(|inner| inner.binary.clone())
            .unwrap_or_default()
    }

    /// Text messages sent so far.
    pub fn text_messages(&self) -> Vec<String> {
        self.inner
            .lock()
            .map(|inner| inner.text.clone())
            .unwrap_or_default()
    }

    /// Whether `close` was called.
    pub fn is_closed(&self) -> bool {
        self.inner.lock().map(|inner| inner.closed).unwrap_or(false)
    }
}

impl TransportLink for RecordingLink {
    fn send_binary(&mut self, bytes: Vec<u8>) {
        if let Ok(mut inner) = self.inner.lock() {
            inner.binary.push(bytes);
        }
    }

    fn send_text(&mut self, text: String) {
        if let Ok(mut inner) = self.inner.lock() {
            inner.text.push(text);
        }
    }

    fn close(&mut self) {
        if let Ok(mut inner) = self.inner.lock() {
            inner.closed = true;
        }
    }
}
