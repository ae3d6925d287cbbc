//! Fake extension API seam.
//!
//! Extension code talks to `browser.*` APIs; in the harness those are
//! supplied by an external fake with recordable, callable stubs. This module
//! defines the slice of that fake the harness itself depends on: per-context
//! creation, stub population, and the `runtime.sendMessage` /
//! `runtime.onMessage.addListener` pair the message bus is built from.
//!
//! The [`crate::testing`] module ships a recording implementation.

// ============================================================================
// Imports
// ============================================================================

use std::sync::Arc;

use futures_util::future::BoxFuture;

use crate::error::Result;
use crate::messaging::MessageTransport;
use crate::surface::Surface;

// ============================================================================
// Message Types
// ============================================================================

/// A cross-surface message payload.
pub type Message = serde_json::Value;

/// An inbound message listener, as registered by extension code via
/// `runtime.onMessage.addListener`.
pub type MessageListener = Arc<dyn Fn(&Message) -> ListenerReply + Send + Sync>;

/// Replacement behavior for a context's outbound `sendMessage` stub.
///
/// Installed by the harness when cross-context wiring is enabled and a
/// background context exists.
pub type OutboundHook = Arc<dyn Fn(&Message) -> Option<ListenerReply> + Send + Sync>;

// ============================================================================
// ListenerReply
// ============================================================================

/// What a message listener returned.
///
/// Delivery is synchronous, but a listener may return an awaitable the way
/// real extension listeners return promises; the caller decides whether to
/// resolve it.
pub enum ListenerReply {
    /// An immediate return value.
    Value(Message),
    /// An awaitable resolved via [`ListenerReply::resolve`].
    Deferred(BoxFuture<'static, Message>),
}

impl ListenerReply {
    /// Wraps an immediate value.
    #[inline]
    #[must_use]
    pub fn value(message: Message) -> Self {
        Self::Value(message)
    }

    /// Returns the immediate value, if this reply is not awaitable.
    #[inline]
    #[must_use]
    pub fn into_value(self) -> Option<Message> {
        match self {
            Self::Value(message) => Some(message),
            Self::Deferred(_) => None,
        }
    }

    /// Resolves the reply to its final value.
    pub async fn resolve(self) -> Message {
        match self {
            Self::Value(message) => message,
            Self::Deferred(future) => future.await,
        }
    }
}

impl std::fmt::Debug for ListenerReply {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::Value(message) => f.debug_tuple("Value").field(message).finish(),
            Self::Deferred(_) => f.debug_tuple("Deferred").finish_non_exhaustive(),
        }
    }
}

// ============================================================================
// ExtensionApiFake
// ============================================================================

/// External factory producing one fake API object per context.
pub trait ExtensionApiFake: Send + Sync {
    /// Creates a fresh fake API handle for a new context.
    fn create(&self) -> Arc<dyn ExtensionApi>;
}

// ============================================================================
// ExtensionApi
// ============================================================================

/// One context's fake extension API object.
///
/// Scripts running in the document call these through the attached
/// `browser`/`chrome` globals; the harness calls them to install message-bus
/// routing.
pub trait ExtensionApi: Send + Sync {
    /// Populates the fake's stub behaviors (the `apiFake` mode).
    ///
    /// Without this, stubs record calls but return nothing.
    fn populate_stubs(&self) -> Result<()>;

    /// Registers an inbound message listener
    /// (`runtime.onMessage.addListener`).
    fn add_message_listener(&self, listener: MessageListener);

    /// Invokes the outbound message stub (`runtime.sendMessage`).
    ///
    /// Returns the wired reply when an outbound hook is installed, `None`
    /// otherwise (the unwired stub records the call and answers nothing).
    fn send_message(&self, message: &Message) -> Option<ListenerReply>;

    /// Routes future listener registrations into `transport` under
    /// `surface`, in addition to the fake's own recording.
    fn route_inbound(&self, transport: Arc<MessageTransport>, surface: Surface);

    /// Replaces the outbound stub's behavior with `hook`.
    fn route_outbound(&self, hook: OutboundHook);
}

// ============================================================================
// Tests
// ============================================================================
