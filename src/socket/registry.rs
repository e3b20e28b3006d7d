//! Named event handlers and the optional raw packet callback.

use std::collections::HashMap;

use tracing::debug;

use crate::socket::packet::SocketPacketType;

/// Handler invoked with the decoded payload text of a named event.
pub type EventHandler = Box<dyn FnMut(&str) + Send>;
/// Callback invoked with every inner-layer packet before named dispatch.
pub type RawPacketHandler = Box<dyn FnMut(SocketPacketType, &[u8]) + Send>;

/// Registry mapping event names to handlers.
///
/// Each name holds at most one handler; registering a name again replaces
/// the previous handler. The raw catch-all callback is stored separately and
/// survives [`EventRegistry::clear`].
#[derive(Default)]
pub struct EventRegistry {
    handlers: HashMap<String, EventHandler>,
    catch_all: Option<RawPacketHandler>,
}

impl EventRegistry {
    pub fn new() -> Self {
        Self::default()
    }

    /// Registers a handler, replacing any existing handler for the name.
    pub fn insert(&mut self, name: impl Into<String>, handler: EventHandler) {
        let name = name.into();
        if self.handlers.insert(name.clone(), handler).is_some() {
            debug!(event = "event_handler_replaced", name = %name);
        }
    }

    /// Removes the handler for a name. Unknown names are ignored.
    pub fn remove(&mut self, name: &str) {
        if self.handlers.remove(name).is_none() {
            debug!(
                event = "event_handler_unknown",
                name = %name,
                registered = self.handlers.len()
            );
        }
    }

    /// Drops every named handler. The raw catch-all is untouched.
    pub fn clear(&mut self) {
        self.handlers.clear();
    }

    /// Installs or replaces the raw catch-all callback.
    pub fn set_catch_all(&mut self, handler: RawPacketHandler) {
        self.catch_all = Some(handler);
    }

    /// Invokes the handler registered for `name` with the payload text.
    pub fn dispatch(&mut self, name: &str, body: &str) {
        match self.handlers.get_mut(name) {
            Some(handler) => handler(body),
            None => debug!(
                event = "event_handler_missing",
                name = %name,
                registered = self.handlers.len()
            ),
        }
    }

    /// Hands a raw inner-layer packet to the catch-all, if one is installed.
    pub fn notify_raw(&mut self, kind: SocketPacketType, payload: &[u8]) {
        if let Some(handler) = self.catch_all.as_mut() {
            handler(kind, payload);
        }
    }

    pub fn len(&self) -> usize {
        self.handlers.len()
    }

    pub fn is_empty(&self) -> bool {
        self.handlers.is_empty()
    }
}
