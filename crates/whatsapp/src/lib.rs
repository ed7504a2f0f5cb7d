//! WhatsApp Web channel for courier.
//!
//! WhatsApp Web runs in a Node.js sidecar process; this crate supervises
//! that process, speaks its WebSocket protocol and exposes the account as a
//! [`courier_channels::EventSource`].

pub mod message;
pub mod process;
pub mod sidecar;
pub mod source;
pub mod types;

pub use {
    message::WhatsAppMessage,
    process::{SidecarConfig, SidecarProcess, find_sidecar_dir, start_sidecar},
    sidecar::{DEFAULT_SIDECAR_PORT, SidecarHandle, connect, connect_with_retry},
    source::WhatsAppSource,
    types::{ConnectionState, GatewayMessage, SidecarMessage},
};
