//! Opaque integer handles issued to the guest
//!
//! A handle is the only thing the guest ever sees of a host object. Handles are
//! allocated monotonically by the [`HandleRegistry`](crate::registry::HandleRegistry)
//! and are never reused, so a stale handle held by the guest can never alias a
//! newer object.

use std::fmt;

/// Integer identifier for a host object, as passed across the boundary.
///
/// The representation is a plain `i32` so it can travel through WebAssembly
/// `i32` parameters and results unchanged.
#[repr(transparent)]
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct Handle(i32);

impl Handle {
    /// The guest-side "nil" marker. Never issued by a registry.
    pub const NIL: Handle = Handle(-1);

    /// Wrap a raw value received from the guest
    pub const fn from_raw(raw: i32) -> Self {
        Handle(raw)
    }

    /// The raw value to hand to the guest
    pub const fn raw(self) -> i32 {
        self.0
    }

    /// Whether this is the nil marker
    pub const fn is_nil(self) -> bool {
        self.0 == Self::NIL.0
    }
}

impl From<Handle> for i32 {
    fn from(handle: Handle) -> i32 {
        handle.0
    }
}

impl fmt::Display for Handle {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        if self.is_nil() {
            write!(f, "#nil")
        } else {
            write!(f, "#{}", self.0)
        }
    }
}

/// Lifecycle position of a handle within one registry
///
/// `Unregistered -> Live -> Disposed`, with `Disposed` terminal.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum HandleState {
    /// Never issued by this registry
    Unregistered,
    /// Issued and not yet disposed
    Live,
    /// Issued and since disposed
    Disposed,
}

impl fmt::Display for HandleState {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let text = match self {
            HandleState::Unregistered => "never registered",
            HandleState::Live => "live",
            HandleState::Disposed => "already disposed",
        };
        f.write_str(text)
    }
}
