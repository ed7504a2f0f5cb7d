use std::{collections::HashMap, sync::Arc};

use tracing::trace;

use crate::event::{ChannelEvent, ChannelEventHandler, EventKind};

/// Subscription table shared by event sources.
///
/// [`dispatch`](Dispatcher::dispatch) awaits every handler for the event in
/// registration order and only returns once all of them are done, so at most
/// one event is in flight per dispatcher.
#[derive(Default)]
pub struct Dispatcher {
    handlers: HashMap<EventKind, Vec<Arc<dyn ChannelEventHandler>>>,
}

impl Dispatcher {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn subscribe(&mut self, kind: EventKind, handler: Arc<dyn ChannelEventHandler>) {
        self.handlers.entry(kind).or_default().push(handler);
    }

    /// Number of handlers registered for `kind`.
    pub fn handler_count(&self, kind: EventKind) -> usize {
        self.handlers.get(&kind).map_or(0, Vec::len)
    }

    pub async fn dispatch(&self, event: ChannelEvent) {
        let kind = event.kind();
        let Some(handlers) = self.handlers.get(&kind) else {
            trace!(%kind, "no handlers subscribed");
            return;
        };
        for handler in handlers {
            handler.handle(&event).await;
        }
    }
}
