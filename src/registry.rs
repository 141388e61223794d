//! Foreign handle registry
//!
//! Maps the integer handles held by the guest to the host objects they stand
//! for. The registry keeps each object alive from registration until the guest
//! disposes of its handle, and nothing else.
//!
//! Handles are issued from a registry-owned counter and never reused, so once a
//! handle is disposed every later use of it fails with `InvalidHandle` instead
//! of silently reaching some other object.

use crate::error::{BridgeError, Result};
use crate::handle::{Handle, HandleState};
use crate::object::{HostObject, JsString, ObjectKind};
use crate::utf8::{self, SurrogatePolicy};
use std::collections::HashMap;

#[derive(Debug)]
pub struct HandleRegistry {
    objects: HashMap<Handle, HostObject>,
    /// First handle ever issued
    first: i32,
    /// Next handle to issue
    next: i32,
}

impl Default for HandleRegistry {
    fn default() -> Self {
        Self::new()
    }
}

impl HandleRegistry {
    /// Create an empty registry issuing handles from 0
    pub fn new() -> Self {
        Self::starting_at(0)
    }

    /// Create an empty registry issuing handles from `first`.
    /// Negative values are clamped to 0.
    pub fn starting_at(first: i32) -> Self {
        let first = first.max(0);
        Self {
            objects: HashMap::new(),
            first,
            next: first,
        }
    }

    /// Number of live handles
    pub fn len(&self) -> usize {
        self.objects.len()
    }

    pub fn is_empty(&self) -> bool {
        self.objects.is_empty()
    }

    /// Register an object and return a fresh handle for it
    ///
    /// # Errors
    /// `HandleSpaceExhausted` once every non-negative `i32` has been issued.
    pub fn register(&mut self, object: HostObject) -> Result<Handle> {
        let id = self.next;
        self.next = id.checked_add(1).ok_or(BridgeError::HandleSpaceExhausted)?;

        let handle = Handle::from_raw(id);
        log::trace!("register {} as {}", object.kind(), handle);
        self.objects.insert(handle, object);
        Ok(handle)
    }

    /// Where `handle` is in its lifecycle
    pub fn state(&self, handle: Handle) -> HandleState {
        let raw = handle.raw();
        if raw < self.first || raw >= self.next {
            HandleState::Unregistered
        } else if self.objects.contains_key(&handle) {
            HandleState::Live
        } else {
            HandleState::Disposed
        }
    }

    pub fn contains(&self, handle: Handle) -> bool {
        self.objects.contains_key(&handle)
    }

    /// Resolve a live handle
    pub fn get(&self, handle: Handle) -> Result<&HostObject> {
        self.objects.get(&handle).ok_or_else(|| self.invalid(handle))
    }

    /// Remove `handle`, releasing the registry's reference to its object
    ///
    /// # Errors
    /// `InvalidHandle` if the handle was never issued or is already disposed.
    pub fn dispose(&mut self, handle: Handle) -> Result<HostObject> {
        match self.objects.remove(&handle) {
            Some(object) => {
                log::trace!("dispose {}", handle);
                Ok(object)
            }
            None => {
                let err = self.invalid(handle);
                log::warn!("{}", err);
                Err(err)
            }
        }
    }

    /// Live handles in issue order
    pub fn handles(&self) -> Vec<Handle> {
        let mut handles: Vec<Handle> = self.objects.keys().copied().collect();
        handles.sort_unstable();
        handles
    }

    /// Resolve a live handle that must reference a string
    pub fn string(&self, handle: Handle) -> Result<&JsString> {
        let object = self.get(handle)?;
        object.as_js_string().ok_or_else(|| wrong_kind(handle, ObjectKind::String, object))
    }

    /// Resolve a live handle that must reference a buffer
    pub fn buffer(&self, handle: Handle) -> Result<&[u8]> {
        let object = self.get(handle)?;
        object.as_bytes().ok_or_else(|| wrong_kind(handle, ObjectKind::Buffer, object))
    }

    /// UTF-8 length in bytes of the string behind `handle`
    pub fn string_byte_length(&self, handle: Handle, policy: SurrogatePolicy) -> Result<usize> {
        utf8::encoded_len(self.string(handle)?.units(), policy)
    }

    /// UTF-8 encoding of the string behind `handle`
    pub fn encode_string(&self, handle: Handle, policy: SurrogatePolicy) -> Result<Vec<u8>> {
        utf8::encode_utf8_with(self.string(handle)?.units(), policy)
    }

    /// Project the field `name` of the object behind `handle` and register it
    /// under a new handle
    ///
    /// # Errors
    /// - `InvalidHandle` if `handle` is not live
    /// - `WrongKind` if the object can't have fields (undefined, null)
    /// - `NoSuchField` if the field does not exist
    pub fn field(&mut self, handle: Handle, name: &str) -> Result<Handle> {
        let value = self.lookup(handle, name)?;
        self.register(value)
    }

    /// Whether the field `name` exists and is neither undefined nor null
    pub fn have_field(&self, handle: Handle, name: &str) -> Result<bool> {
        let object = self.fields_of(handle)?;
        Ok(!matches!(
            object.get_field(name),
            None | Some(HostObject::Undefined) | Some(HostObject::Null)
        ))
    }

    /// Numeric value of the field `name`
    ///
    /// # Errors
    /// As for [`field`](Self::field), plus `WrongKind` if the field is not a
    /// number or bool.
    pub fn field_number(&self, handle: Handle, name: &str) -> Result<f64> {
        let value = self.lookup(handle, name)?;
        value
            .as_number()
            .ok_or_else(|| wrong_kind(handle, ObjectKind::Number, &value))
    }

    /// Assign the field `name` of the object behind `handle`
    pub fn set_field(&mut self, handle: Handle, name: &str, value: HostObject) -> Result<()> {
        let object = self.get(handle)?;
        if object.set_field(name, value) {
            Ok(())
        } else {
            Err(wrong_kind(handle, ObjectKind::Object, object))
        }
    }

    fn lookup(&self, handle: Handle, name: &str) -> Result<HostObject> {
        self.fields_of(handle)?
            .get_field(name)
            .ok_or_else(|| BridgeError::NoSuchField {
                handle,
                field: name.to_string(),
            })
    }

    fn fields_of(&self, handle: Handle) -> Result<&HostObject> {
        let object = self.get(handle)?;
        if object.has_fields() {
            Ok(object)
        } else {
            Err(wrong_kind(handle, ObjectKind::Object, object))
        }
    }

    fn invalid(&self, handle: Handle) -> BridgeError {
        BridgeError::InvalidHandle {
            handle,
            state: self.state(handle),
        }
    }
}

fn wrong_kind(handle: Handle, expected: ObjectKind, actual: &HostObject) -> BridgeError {
    BridgeError::WrongKind {
        handle,
        expected,
        actual: actual.kind(),
    }
}
