//! Config schema types (webhook, staging, relay filter, WhatsApp sidecar).
use std::path::PathBuf;

use serde::{Deserialize, Serialize};

/// Webhook the relay forwards attachments to when nothing is configured.
pub const DEFAULT_WEBHOOK_URL: &str = "http://localhost:5678/webhook/whatsapp-pdf";

/// Multipart field name the workflow expects the file under.
pub const DEFAULT_FIELD_NAME: &str = "data";

/// Staging file name used with [`StagingNaming::Fixed`].
pub const DEFAULT_FIXED_NAME: &str = "whatsapp.pdf";

/// Default WebSocket port of the WhatsApp sidecar.
pub const DEFAULT_SIDECAR_PORT: u16 = 7755;

/// Root configuration.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(default)]
pub struct CourierConfig {
    pub webhook: WebhookConfig,
    pub staging: StagingConfig,
    pub relay: RelayConfig,
    pub whatsapp: WhatsAppConfig,
}

/// Downstream webhook.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct WebhookConfig {
    pub url: String,
    /// Name of the multipart part carrying the file.
    pub field_name: String,
    /// Request timeout. No timeout when unset.
    pub timeout_secs: Option<u64>,
}

impl Default for WebhookConfig {
    fn default() -> Self {
        Self {
            url: DEFAULT_WEBHOOK_URL.into(),
            field_name: DEFAULT_FIELD_NAME.into(),
            timeout_secs: None,
        }
    }
}

/// How staged files are named.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum StagingNaming {
    /// One file per message, named after the message id.
    #[default]
    PerMessage,
    /// A single well-known file name shared by every operation. Only safe
    /// while events are dispatched one at a time.
    Fixed,
}

/// Where attachments are written before upload.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct StagingConfig {
    /// Staging directory. Defaults to the working directory.
    pub dir: Option<PathBuf>,
    pub naming: StagingNaming,
    /// File name used when `naming = "fixed"`.
    pub fixed_name: String,
}

impl Default for StagingConfig {
    fn default() -> Self {
        Self {
            dir: None,
            naming: StagingNaming::default(),
            fixed_name: DEFAULT_FIXED_NAME.into(),
        }
    }
}

impl StagingConfig {
    /// Resolved staging directory.
    pub fn resolved_dir(&self) -> PathBuf {
        self.dir.clone().unwrap_or_else(|| PathBuf::from("."))
    }
}

/// Attachment filter.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct RelayConfig {
    /// Media types that are forwarded. Compared by exact string equality.
    pub accepted_mime_types: Vec<String>,
}

impl Default for RelayConfig {
    fn default() -> Self {
        Self {
            accepted_mime_types: vec!["application/pdf".into()],
        }
    }
}

/// WhatsApp Web account and sidecar settings.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct WhatsAppConfig {
    pub account_id: String,
    pub sidecar_port: u16,
    /// Directory containing the sidecar's `package.json`.
    pub sidecar_dir: Option<PathBuf>,
    /// Where the sidecar keeps its session files.
    pub auth_dir: Option<PathBuf>,
    /// Spawn and supervise the sidecar process. Disable to run it by hand.
    pub auto_start: bool,
    /// How long to wait for the sidecar to return downloaded media.
    pub media_timeout_secs: u64,
}

impl Default for WhatsAppConfig {
    fn default() -> Self {
        Self {
            account_id: "default".into(),
            sidecar_port: DEFAULT_SIDECAR_PORT,
            sidecar_dir: None,
            auth_dir: None,
            auto_start: true,
            media_timeout_secs: 60,
        }
    }
}
