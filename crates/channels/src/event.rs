use std::sync::Arc;

use async_trait::async_trait;

use crate::Result;

// ── Inbound messages ────────────────────────────────────────────────────────

/// Media attached to an inbound message, as delivered by the messaging client.
#[derive(Clone, PartialEq, Eq)]
pub struct MediaPayload {
    /// Base64-encoded content.
    pub data: String,
    /// Declared media type, e.g. `application/pdf`.
    pub mimetype: String,
    /// Original file name, when the sender provided one.
    pub filename: Option<String>,
}

impl std::fmt::Debug for MediaPayload {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("MediaPayload")
            .field("data", &format_args!("<{} base64 chars>", self.data.len()))
            .field("mimetype", &self.mimetype)
            .field("filename", &self.filename)
            .finish()
    }
}

/// A single inbound message delivered by a channel.
///
/// Media is not shipped with the message; callers check [`has_media`] and
/// then fetch it lazily with [`download_media`].
///
/// [`has_media`]: InboundMessage::has_media
/// [`download_media`]: InboundMessage::download_media
#[async_trait]
pub trait InboundMessage: Send + Sync {
    /// Channel-scoped message identifier.
    fn id(&self) -> &str;

    /// Chat the message was posted in.
    fn chat_id(&self) -> &str;

    /// Sender identifier (phone JID for WhatsApp).
    fn sender(&self) -> &str;

    /// Whether the message carries an attachment.
    fn has_media(&self) -> bool;

    /// Fetch the attachment. `Ok(None)` means the client reported no media
    /// even though [`has_media`](InboundMessage::has_media) was set.
    async fn download_media(&self) -> Result<Option<MediaPayload>>;
}

// ── Channel events ──────────────────────────────────────────────────────────

/// Event types a handler can subscribe to.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum EventKind {
    Qr,
    Ready,
    Message,
    Disconnected,
}

impl std::fmt::Display for EventKind {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        let s = match self {
            Self::Qr => "qr",
            Self::Ready => "ready",
            Self::Message => "message",
            Self::Disconnected => "disconnected",
        };
        f.write_str(s)
    }
}

/// Events emitted by an [`EventSource`].
#[derive(Clone)]
pub enum ChannelEvent {
    /// A pairing code the operator must scan with the phone.
    Qr { account_id: String, code: String },
    /// The account is paired and connected.
    Ready {
        account_id: String,
        phone_number: Option<String>,
    },
    /// An inbound message.
    Message(Arc<dyn InboundMessage>),
    /// The connection to the messaging network dropped.
    Disconnected { account_id: String, reason: String },
}

impl ChannelEvent {
    #[must_use]
    pub fn kind(&self) -> EventKind {
        match self {
            Self::Qr { .. } => EventKind::Qr,
            Self::Ready { .. } => EventKind::Ready,
            Self::Message(_) => EventKind::Message,
            Self::Disconnected { .. } => EventKind::Disconnected,
        }
    }
}

impl std::fmt::Debug for ChannelEvent {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::Qr { account_id, .. } => f
                .debug_struct("Qr")
                .field("account_id", account_id)
                .finish_non_exhaustive(),
            Self::Ready {
                account_id,
                phone_number,
            } => f
                .debug_struct("Ready")
                .field("account_id", account_id)
                .field("phone_number", phone_number)
                .finish(),
            Self::Message(msg) => f
                .debug_struct("Message")
                .field("id", &msg.id())
                .field("sender", &msg.sender())
                .field("has_media", &msg.has_media())
                .finish(),
            Self::Disconnected { account_id, reason } => f
                .debug_struct("Disconnected")
                .field("account_id", account_id)
                .field("reason", reason)
                .finish(),
        }
    }
}

/// Receives events a source dispatches.
///
/// Handlers own their failure handling: nothing returned here can reach
/// the dispatcher, so a failing handler never stops the event loop.
#[async_trait]
pub trait ChannelEventHandler: Send + Sync {
    async fn handle(&self, event: &ChannelEvent);
}

/// A channel that produces events.
///
/// Lifecycle: constructed, subscribed to, then [`run`](EventSource::run)
/// connects and dispatches until the connection ends.
#[async_trait]
pub trait EventSource: Send {
    /// Register `handler` for every event of `kind`.
    fn subscribe(&mut self, kind: EventKind, handler: Arc<dyn ChannelEventHandler>);

    /// Connect and dispatch events until the source is exhausted.
    async fn run(&mut self) -> Result<()>;
}
