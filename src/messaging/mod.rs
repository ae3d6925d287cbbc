//! Cross-surface message transport.
//!
//! Real extensions pass messages asynchronously between surfaces through
//! the browser runtime. The harness replaces that with one reusable
//! capability: listeners register per surface, and a send invokes every
//! registered listener synchronously, returning the first listener's reply.
//!
//! This is a deliberate simplification: only one listener's result is
//! observed and delivery is synchronous. Deterministic for tests; callers
//! simulating multiple-listener protocols must be aware only the first
//! registration wins.

// ============================================================================
// Imports
// ============================================================================

use std::fmt;

use parking_lot::Mutex;
use rustc_hash::FxHashMap;
use tracing::debug;

use crate::api::{ListenerReply, Message, MessageListener};
use crate::surface::Surface;

// ============================================================================
// MessageTransport
// ============================================================================

/// Registry of inbound message listeners, keyed by surface.
///
/// One transport is shared by all contexts of a harness. Wiring a dependent
/// context installs an outbound hook that calls [`MessageTransport::send`]
/// toward [`Surface::Background`]; destroying a context clears its surface's
/// listeners.
#[derive(Default)]
pub struct MessageTransport {
    /// Registered listeners per surface, in registration order.
    listeners: Mutex<FxHashMap<Surface, Vec<MessageListener>>>,
}

// ============================================================================
// MessageTransport - Display
// ============================================================================

impl fmt::Debug for MessageTransport {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let map = self.listeners.lock();
        let mut s = f.debug_struct("MessageTransport");
        for (surface, listeners) in map.iter() {
            s.field(surface.as_str(), &listeners.len());
        }
        s.finish()
    }
}

// ============================================================================
// MessageTransport - Implementation
// ============================================================================

impl MessageTransport {
    /// Creates an empty transport.
    #[inline]
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Registers an inbound listener for `surface`.
    pub fn register_listener(&self, surface: Surface, listener: MessageListener) {
        let mut map = self.listeners.lock();
        let slot = map.entry(surface).or_default();
        slot.push(listener);
        debug!(surface = %surface, count = slot.len(), "Message listener registered");
    }

    /// Delivers `message` to every listener registered for `surface`.
    ///
    /// All listeners run, in registration order; the first listener's reply
    /// is returned. `None` if no listener is registered.
    #[must_use]
    pub fn send(&self, surface: Surface, message: &Message) -> Option<ListenerReply> {
        // Snapshot so listener bodies run without the registry locked.
        let listeners: Vec<MessageListener> =
            self.listeners.lock().get(&surface).cloned().unwrap_or_default();

        debug!(surface = %surface, count = listeners.len(), "Delivering message");

        let mut first = None;
        for listener in &listeners {
            let reply = listener(message);
            if first.is_none() {
                first = Some(reply);
            }
        }
        first
    }

    /// Number of listeners registered for `surface`.
    #[inline]
    #[must_use]
    pub fn listener_count(&self, surface: Surface) -> usize {
        self.listeners
            .lock()
            .get(&surface)
            .map_or(0, Vec::len)
    }

    /// Drops every listener registered for `surface`.
    ///
    /// Called when the surface's context is destroyed so later sends don't
    /// reach a dead context.
    pub fn clear_surface(&self, surface: Surface) {
        if self.listeners.lock().remove(&surface).is_some() {
            debug!(surface = %surface, "Message listeners cleared");
        }
    }
}

// ============================================================================
// Tests
// ============================================================================
