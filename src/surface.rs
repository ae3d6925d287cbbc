//! Extension surface kinds.
//!
//! A surface is one independent execution context of an extension:
//! background, popup, or sidebar. The harness holds at most one live
//! context per surface kind.

// ============================================================================
// Imports
// ============================================================================

use std::fmt;

// ============================================================================
// Surface
// ============================================================================

/// One of the extension's execution surfaces.
///
/// The variant order is the build order: background first (dependents may
/// wire messages to it), then popup, then sidebar. Teardown walks the same
/// order.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum Surface {
    /// The background page or script context.
    Background,
    /// The browser-action popup context.
    Popup,
    /// The sidebar panel context.
    Sidebar,
}

// ============================================================================
// Surface - Implementation
// ============================================================================

impl Surface {
    /// All surfaces in build order.
    pub const ALL: [Self; 3] = [Self::Background, Self::Popup, Self::Sidebar];

    /// Returns the surface name as used in logs and artifact metadata.
    #[inline]
    #[must_use]
    pub const fn as_str(self) -> &'static str {
        match self {
            Self::Background => "background",
            Self::Popup => "popup",
            Self::Sidebar => "sidebar",
        }
    }

    /// Returns `true` for surfaces that depend on the background context.
    ///
    /// Dependent surfaces get an interaction helper and are eligible for
    /// message-bus wiring toward the background.
    #[inline]
    #[must_use]
    pub const fn is_dependent(self) -> bool {
        matches!(self, Self::Popup | Self::Sidebar)
    }
}

impl fmt::Display for Surface {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

// ============================================================================
// Tests
// ============================================================================
