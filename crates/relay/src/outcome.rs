use tracing::{debug, error, info, warn};

use crate::error::RelayError;

/// Why a message was not relayed. Skips are not failures.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum SkipReason {
    /// The message carries no attachment.
    NoMedia,
    /// The client flagged media but returned none.
    MediaUnavailable,
    /// The attachment's declared type is not accepted.
    UnsupportedType(String),
}

impl std::fmt::Display for SkipReason {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::NoMedia => f.write_str("no media"),
            Self::MediaUnavailable => f.write_str("media unavailable"),
            Self::UnsupportedType(mime) => write!(f, "unsupported media type {mime}"),
        }
    }
}

/// Result of handling one inbound message.
#[derive(Debug)]
pub enum RelayOutcome {
    Skipped {
        message_id: String,
        reason: SkipReason,
    },
    /// Delivered and the staged file was removed.
    Forwarded {
        message_id: String,
        bytes: u64,
        status: u16,
    },
    /// Delivered, but the staged file could not be removed.
    CleanupFailed {
        message_id: String,
        status: u16,
        error: RelayError,
    },
    /// Not delivered.
    Failed {
        message_id: String,
        error: RelayError,
    },
}

impl RelayOutcome {
    pub fn message_id(&self) -> &str {
        match self {
            Self::Skipped { message_id, .. }
            | Self::Forwarded { message_id, .. }
            | Self::CleanupFailed { message_id, .. }
            | Self::Failed { message_id, .. } => message_id,
        }
    }

    /// Whether the webhook accepted the attachment.
    pub fn is_delivered(&self) -> bool {
        matches!(self, Self::Forwarded { .. } | Self::CleanupFailed { .. })
    }

    pub fn is_failed(&self) -> bool {
        matches!(self, Self::Failed { .. })
    }

    pub fn error(&self) -> Option<&RelayError> {
        match self {
            Self::CleanupFailed { error, .. } | Self::Failed { error, .. } => Some(error),
            Self::Skipped { .. } | Self::Forwarded { .. } => None,
        }
    }

    /// Emit the single log line for this outcome.
    pub fn log(&self) {
        match self {
            Self::Skipped { message_id, reason } => {
                debug!(message_id, %reason, "message skipped");
            },
            Self::Forwarded {
                message_id,
                bytes,
                status,
            } => {
                info!(message_id, bytes, status, "attachment sent to webhook");
            },
            Self::CleanupFailed {
                message_id,
                status,
                error,
            } => {
                warn!(message_id, status, error = %error, "attachment sent to webhook but staged file was not removed");
            },
            Self::Failed { message_id, error } => {
                error!(message_id, error = %error, "error processing attachment");
            },
        }
    }
}
