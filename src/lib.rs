//! Host-side object handles for WebAssembly guests.
//!
//! hostref lets code running in a WebAssembly guest hold references to host
//! objects (strings, byte buffers, property maps) as plain `i32` handles, and
//! exchange text with the host through its linear memory.
//!
//! # Modules
//!
//! - [`registry`] -- Maps handles to host objects. Handles are never reused.
//! - [`object`] -- The host object model and capability-checked field access.
//! - [`utf8`] -- UTF-16 to UTF-8 codec with a configurable surrogate policy.
//! - [`memory`] -- The guest memory seam and a bounds-checked linear memory.
//! - [`bridge`] -- Implements the host exports over a registry and a memory.
//! - [`imports`] -- The `js_*` import table a guest links against.
//! - [`guest`] -- Guest-side API with owning handles that dispose on drop.
//! - [`config`] -- Bridge configuration, loadable from JSON.
//!
//! # Example
//!
//! ```
//! use hostref::guest::Guest;
//!
//! let guest = Guest::new().unwrap();
//! let settings = guest.object().unwrap();
//! settings.set_field_string("title", "A€").unwrap();
//! settings.set_field_u32("width", 640).unwrap();
//!
//! let mut title = String::new();
//! settings.field("title").unwrap().to_string(&mut title).unwrap();
//! assert_eq!(title, "A€");
//! assert_eq!(settings.field_u32("width").unwrap(), 640);
//! ```

pub mod bridge;
pub mod config;
pub mod error;
pub mod guest;
pub mod handle;
pub mod imports;
pub mod memory;
pub mod object;
pub mod registry;
pub mod utf8;
pub mod value;

pub use bridge::{HostBridge, HostBridgeBuilder};
pub use config::BridgeConfig;
pub use error::{BridgeError, ErrorKind, Result};
pub use guest::{Guest, JsObject, JsObjectWeak};
pub use handle::Handle;
pub use object::HostObject;
pub use utf8::SurrogatePolicy;

/// Crate version packed as `(major << 24) + (minor << 16) + patch`
pub fn crate_version() -> u32 {
    let major = env!("CARGO_PKG_VERSION_MAJOR").parse::<u32>().unwrap_or(0);
    let minor = env!("CARGO_PKG_VERSION_MINOR").parse::<u32>().unwrap_or(0);
    let patch = env!("CARGO_PKG_VERSION_PATCH").parse::<u32>().unwrap_or(0);

    (major << 24) + (minor << 16) + patch
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_crate_version() {
        assert_eq!(crate_version(), 1 << 16);
    }
}
