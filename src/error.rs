//! Error type shared by every boundary operation
//!
//! All of these are contract violations by the caller. None of them is meant to
//! be recovered from inside the guest: the embedding runtime should turn an
//! `Err` into a trap.

use crate::handle::{Handle, HandleState};
use crate::object::ObjectKind;

/// Result alias used throughout the crate
pub type Result<T, E = BridgeError> = std::result::Result<T, E>;

/// Coarse classification of a [`BridgeError`]
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ErrorKind {
    /// Handle not live, or live but of the wrong kind for the requested view
    InvalidHandle,
    /// A field lookup found no matching property
    NoSuchField,
    /// A caller-supplied destination is smaller than the data to write
    BoundsViolation,
    /// A guest pointer or allocation fell outside linear memory
    Memory,
    /// Input text could not be converted
    Encoding,
    /// The call itself was malformed (unknown import, bad arguments, config)
    Dispatch,
}

#[derive(Debug, thiserror::Error)]
pub enum BridgeError {
    #[error("Invalid handle {handle}: {state}")]
    InvalidHandle { handle: Handle, state: HandleState },
    #[error("Handle {handle} refers to {actual}, expected {expected}")]
    WrongKind {
        handle: Handle,
        expected: ObjectKind,
        actual: ObjectKind,
    },
    #[error("No such field on {handle}: {field:?}")]
    NoSuchField { handle: Handle, field: String },
    #[error("Bounds violation: {required} bytes required, {available} available")]
    BoundsViolation { required: usize, available: usize },
    #[error("Memory error: {0}")]
    MemoryError(String),
    #[error("Malformed UTF-16: unpaired surrogate at index {index}")]
    MalformedUtf16 { index: usize },
    #[error("Argument mismatch for {import}: expected {expected}, got {actual}")]
    ArgumentMismatch {
        import: String,
        expected: String,
        actual: String,
    },
    #[error("Unknown import: {0}")]
    UnknownImport(String),
    #[error("Handle space exhausted")]
    HandleSpaceExhausted,
    #[error("Invalid configuration: {0}")]
    Config(String),
    #[error("Invalid configuration: {0}")]
    Json(#[from] serde_json::Error),
}

impl BridgeError {
    /// Classify this error
    pub fn kind(&self) -> ErrorKind {
        match self {
            BridgeError::InvalidHandle { .. } | BridgeError::WrongKind { .. } => ErrorKind::InvalidHandle,
            BridgeError::NoSuchField { .. } => ErrorKind::NoSuchField,
            BridgeError::BoundsViolation { .. } => ErrorKind::BoundsViolation,
            BridgeError::MemoryError(_) | BridgeError::HandleSpaceExhausted => ErrorKind::Memory,
            BridgeError::MalformedUtf16 { .. } => ErrorKind::Encoding,
            BridgeError::ArgumentMismatch { .. }
            | BridgeError::UnknownImport(_)
            | BridgeError::Config(_)
            | BridgeError::Json(_) => ErrorKind::Dispatch,
        }
    }
}
