//! Attachment relay: forwards PDF attachments from inbound messages to a
//! workflow webhook.
//!
//! For each qualifying message the relay downloads the media, decodes it,
//! stages it as a local file, posts the file as `multipart/form-data` and
//! removes the staged file. Every failure is contained in the returned
//! [`RelayOutcome`]; nothing escapes to the event dispatcher.

pub mod error;
pub mod outcome;
pub mod relay;
pub mod staging;
pub mod webhook;

pub use {
    error::{RelayError, Result},
    outcome::{RelayOutcome, SkipReason},
    relay::AttachmentRelay,
    staging::{StagedAttachment, Stager},
    webhook::WebhookClient,
};
