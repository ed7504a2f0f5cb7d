use std::time::Duration;

use {
    async_trait::async_trait,
    courier_channels::{InboundMessage, MediaPayload, Result},
};

use crate::sidecar::SidecarHandle;

/// An inbound WhatsApp message. Media stays on the sidecar until
/// [`download_media`](InboundMessage::download_media) asks for it.
#[derive(Clone)]
pub struct WhatsAppMessage {
    pub(crate) account_id: String,
    pub(crate) message_id: String,
    pub(crate) chat_id: String,
    pub(crate) sender_id: String,
    pub(crate) sender_name: Option<String>,
    pub(crate) has_media: bool,
    pub(crate) timestamp: Option<i64>,
    pub(crate) sidecar: SidecarHandle,
    pub(crate) media_timeout: Duration,
}

impl WhatsAppMessage {
    pub fn account_id(&self) -> &str {
        &self.account_id
    }

    pub fn sender_name(&self) -> Option<&str> {
        self.sender_name.as_deref()
    }

    /// Unix timestamp (seconds) reported by WhatsApp.
    pub fn timestamp(&self) -> Option<i64> {
        self.timestamp
    }
}

#[async_trait]
impl InboundMessage for WhatsAppMessage {
    fn id(&self) -> &str {
        &self.message_id
    }

    fn chat_id(&self) -> &str {
        &self.chat_id
    }

    fn sender(&self) -> &str {
        &self.sender_id
    }

    fn has_media(&self) -> bool {
        self.has_media
    }

    async fn download_media(&self) -> Result<Option<MediaPayload>> {
        self.sidecar
            .download_media(&self.account_id, &self.message_id, self.media_timeout)
            .await
    }
}
