use std::path::Path;

use {
    async_trait::async_trait,
    base64::{Engine, engine::general_purpose::STANDARD},
    courier_channels::{ChannelEvent, ChannelEventHandler, InboundMessage, MediaPayload},
    courier_config::CourierConfig,
    reqwest::StatusCode,
    tracing::{info, warn},
};

use crate::{
    error::{RelayError, Result},
    outcome::{RelayOutcome, SkipReason},
    staging::Stager,
    webhook::WebhookClient,
};

/// Bridges inbound messages to the webhook.
///
/// Stateless between messages: everything an operation creates on disk is
/// removed before [`handle_incoming_message`](Self::handle_incoming_message)
/// returns, unless the removal itself fails.
#[derive(Debug, Clone)]
pub struct AttachmentRelay {
    stager: Stager,
    webhook: WebhookClient,
    accepted_mime_types: Vec<String>,
}

impl AttachmentRelay {
    pub fn new(stager: Stager, webhook: WebhookClient, accepted_mime_types: Vec<String>) -> Self {
        Self {
            stager,
            webhook,
            accepted_mime_types,
        }
    }

    pub fn from_config(config: &CourierConfig) -> Result<Self> {
        Ok(Self::new(
            Stager::from_config(&config.staging),
            WebhookClient::from_config(&config.webhook)?,
            config.relay.accepted_mime_types.clone(),
        ))
    }

    pub fn stager(&self) -> &Stager {
        &self.stager
    }

    pub fn webhook(&self) -> &WebhookClient {
        &self.webhook
    }

    /// Exact match against the accepted types.
    pub fn accepts(&self, mimetype: &str) -> bool {
        self.accepted_mime_types.iter().any(|m| m == mimetype)
    }

    /// Relay one message. Never fails: the outcome is logged and returned.
    pub async fn handle_incoming_message(&self, message: &dyn InboundMessage) -> RelayOutcome {
        let outcome = self.relay(message).await;
        outcome.log();
        outcome
    }

    /// Upload an existing file without staging or deleting it.
    pub async fn forward_file(&self, path: &Path, mimetype: &str) -> Result<StatusCode> {
        let status = self.webhook.forward_file(path, mimetype).await?;
        info!(path = %path.display(), status = status.as_u16(), "file sent to webhook");
        Ok(status)
    }

    async fn relay(&self, message: &dyn InboundMessage) -> RelayOutcome {
        let message_id = message.id().to_string();

        if !message.has_media() {
            return RelayOutcome::Skipped {
                message_id,
                reason: SkipReason::NoMedia,
            };
        }

        let media = match message.download_media().await {
            Ok(Some(media)) => media,
            Ok(None) => {
                return RelayOutcome::Skipped {
                    message_id,
                    reason: SkipReason::MediaUnavailable,
                };
            },
            Err(e) => {
                return RelayOutcome::Failed {
                    message_id,
                    error: RelayError::Download(e),
                };
            },
        };

        if !self.accepts(&media.mimetype) {
            return RelayOutcome::Skipped {
                message_id,
                reason: SkipReason::UnsupportedType(media.mimetype),
            };
        }

        info!(
            message_id,
            sender = message.sender(),
            mimetype = %media.mimetype,
            "attachment received"
        );

        match self.stage_and_send(&message_id, &media).await {
            Ok((bytes, status)) => RelayOutcome::Forwarded {
                message_id,
                bytes,
                status: status.as_u16(),
            },
            Err(SendFailure::Cleanup { status, error }) => RelayOutcome::CleanupFailed {
                message_id,
                status: status.as_u16(),
                error,
            },
            Err(SendFailure::Delivery(error)) => RelayOutcome::Failed { message_id, error },
        }
    }

    async fn stage_and_send(
        &self,
        message_id: &str,
        media: &MediaPayload,
    ) -> std::result::Result<(u64, StatusCode), SendFailure> {
        let bytes = STANDARD.decode(media.data.as_bytes()).map_err(RelayError::from)?;

        let staged = self
            .stager
            .stage(message_id, &media.mimetype, media.filename.as_deref(), &bytes)
            .await?;
        let len = staged.len();

        let sent = self.webhook.forward(&staged).await;
        let removed = staged.remove().await;

        match (sent, removed) {
            (Ok(status), Ok(())) => Ok((len, status)),
            (Ok(status), Err(error)) => Err(SendFailure::Cleanup { status, error }),
            (Err(error), removed) => {
                if let Err(cleanup) = removed {
                    warn!(message_id, error = %cleanup, "staged file left behind after failed upload");
                }
                Err(SendFailure::Delivery(error))
            },
        }
    }
}

enum SendFailure {
    Delivery(RelayError),
    Cleanup { status: StatusCode, error: RelayError },
}

impl From<RelayError> for SendFailure {
    fn from(error: RelayError) -> Self {
        Self::Delivery(error)
    }
}

#[async_trait]
impl ChannelEventHandler for AttachmentRelay {
    async fn handle(&self, event: &ChannelEvent) {
        if let ChannelEvent::Message(message) = event {
            self.handle_incoming_message(message.as_ref()).await;
        }
    }
}
