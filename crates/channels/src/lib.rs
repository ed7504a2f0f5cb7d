//! Channel abstraction shared by event sources and handlers.
//!
//! A channel (WhatsApp Web today) is an [`EventSource`]: handlers subscribe to
//! an [`EventKind`] and the source dispatches [`ChannelEvent`]s to them one at
//! a time through a [`Dispatcher`].

pub mod dispatch;
pub mod error;
pub mod event;

pub use {
    dispatch::Dispatcher,
    error::{Error, Result},
    event::{
        ChannelEvent, ChannelEventHandler, EventKind, EventSource, InboundMessage, MediaPayload,
    },
};
