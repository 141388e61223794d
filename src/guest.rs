//! Guest-side API
//!
//! [`Guest`] plays the foreign side of the boundary: it owns a [`HostBridge`]
//! and the import table, stages strings in guest memory and calls the host
//! exports with raw pointers, the same calls a compiled guest makes.
//! [`JsObject`] is an owning handle that disposes of itself on drop.
//!
//! ```ignore
//! let guest = Guest::new()?;
//! let obj = guest.object()?;
//! obj.set_field_string("title", "hello")?;
//!
//! let mut title = String::new();
//! obj.field("title")?.to_string(&mut title)?;
//! assert_eq!(title, "hello");
//! ```

use crate::bridge::HostBridge;
use crate::error::{BridgeError, Result};
use crate::handle::Handle;
use crate::imports::{create_js_imports, ImportObject};
use crate::memory::{GuestMemory, LinearMemory};
use crate::value::{Value, ValueType};
use std::cell::{Cell, Ref, RefCell, RefMut};
use std::fmt;
use std::mem;

/// Smallest scratch region ever allocated
const MIN_SCRATCH: u32 = 64;

/// Region of guest memory reused for every staged argument and copy-out
#[derive(Debug, Clone, Copy, Default)]
struct Scratch {
    ptr: u32,
    capacity: u32,
}

pub struct Guest<M: GuestMemory = LinearMemory> {
    bridge: RefCell<HostBridge<M>>,
    imports: ImportObject<M>,
    module: String,
    scratch: Cell<Scratch>,
}

impl<M: GuestMemory> fmt::Debug for Guest<M> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Guest")
            .field("module", &self.module)
            .field("scratch", &self.scratch.get())
            .finish()
    }
}

impl Guest<LinearMemory> {
    /// A guest over a default-configured bridge
    pub fn new() -> Result<Self> {
        Ok(Self::with_bridge(HostBridge::new()?))
    }
}

impl<M: GuestMemory> Guest<M> {
    /// Take ownership of `bridge` and link against its import module
    pub fn with_bridge(bridge: HostBridge<M>) -> Self {
        let module = bridge.config().import_module.clone();
        Self {
            imports: create_js_imports(&module),
            bridge: RefCell::new(bridge),
            module,
            scratch: Cell::new(Scratch::default()),
        }
    }

    pub fn bridge(&self) -> Ref<'_, HostBridge<M>> {
        self.bridge.borrow()
    }

    pub fn bridge_mut(&self) -> RefMut<'_, HostBridge<M>> {
        self.bridge.borrow_mut()
    }

    /// Call the host export `name`
    pub fn call(&self, name: &str, args: &[Value]) -> Result<Vec<Value>> {
        let mut bridge = self.bridge.borrow_mut();
        self.imports.invoke(&mut bridge, &self.module, name, args)
    }

    fn call_single(&self, name: &str, args: &[Value], typ: ValueType) -> Result<Value> {
        let results = self.call(name, args)?;
        match results.as_slice() {
            [value] if value.typ() == typ => Ok(*value),
            _ => Err(BridgeError::ArgumentMismatch {
                import: format!("{}.{} result", self.module, name),
                expected: typ.to_string(),
                actual: format!("{:?}", results),
            }),
        }
    }

    fn call_i32(&self, name: &str, args: &[Value]) -> Result<i32> {
        let value = self.call_single(name, args, ValueType::I32)?;
        Ok(value.as_i32().unwrap_or_default())
    }

    fn call_f32(&self, name: &str, args: &[Value]) -> Result<f32> {
        let value = self.call_single(name, args, ValueType::F32)?;
        Ok(value.as_f32().unwrap_or_default())
    }

    fn call_object(&self, name: &str, args: &[Value]) -> Result<JsObject<'_, M>> {
        let raw = self.call_i32(name, args)?;
        Ok(self.adopt(Handle::from_raw(raw)))
    }

    /// Make sure the scratch region holds at least `len` bytes and return its
    /// address. Growing allocates a fresh power-of-two region; the old one is
    /// abandoned.
    fn reserve(&self, len: u32) -> Result<u32> {
        let scratch = self.scratch.get();
        if len <= scratch.capacity {
            return Ok(scratch.ptr);
        }

        let capacity = len
            .checked_next_power_of_two()
            .unwrap_or(len)
            .max(MIN_SCRATCH);
        let ptr = self.bridge.borrow_mut().memory_mut().allocate(capacity)?;
        log::trace!("scratch region of {} bytes at {:#x}", capacity, ptr);
        self.scratch.set(Scratch { ptr, capacity });
        Ok(ptr)
    }

    /// Copy `parts` back to back into the scratch region and return where
    /// each one landed
    fn stage(&self, parts: &[&[u8]]) -> Result<Vec<u32>> {
        let total: usize = parts.iter().map(|part| part.len()).sum();
        let total = u32::try_from(total)
            .map_err(|_| BridgeError::MemoryError(format!("cannot stage {} bytes", total)))?;

        let mut addr = self.reserve(total)?;
        let mut bridge = self.bridge.borrow_mut();
        let mut addrs = Vec::with_capacity(parts.len());
        for part in parts {
            bridge.memory_mut().write(addr, part)?;
            addrs.push(addr);
            addr += part.len() as u32;
        }
        Ok(addrs)
    }

    /// Take ownership of a handle the host registered
    pub fn adopt(&self, handle: Handle) -> JsObject<'_, M> {
        JsObject { guest: self, handle }
    }

    /// Allocate a host string holding `string`
    pub fn string(&self, string: &str) -> Result<JsObject<'_, M>> {
        let ptrs = self.stage(&[string.as_bytes()])?;
        self.call_object("js_create_string", &[ptrs[0].into(), len_value(string.len())])
    }

    /// Allocate a host byte buffer holding a copy of `data`
    pub fn buffer(&self, data: &[u8]) -> Result<JsObject<'_, M>> {
        let ptrs = self.stage(&[data])?;
        self.call_object("js_create_buffer", &[ptrs[0].into(), len_value(data.len())])
    }

    /// Allocate an empty host object, like `{}`
    pub fn object(&self) -> Result<JsObject<'_, M>> {
        self.call_object("js_create_object", &[])
    }

    /// Copy out `len` bytes produced by `unwrap` into a scratch destination
    fn unwrap_into(&self, name: &str, handle: JsObjectWeak, len: u32) -> Result<Vec<u8>> {
        let dest = self.reserve(len)?;
        self.call(name, &[handle.into(), dest.into(), len.into()])?;
        self.bridge.borrow().memory().read(dest, len as usize)
    }
}

fn len_value(len: usize) -> Value {
    Value::I32(len as i32)
}

/// Owning reference to a host object
///
/// Disposes of its handle when dropped. A handle of `-1` is nil; operations on
/// a nil object fail with `InvalidHandle`.
pub struct JsObject<'g, M: GuestMemory = LinearMemory> {
    guest: &'g Guest<M>,
    handle: Handle,
}

impl<M: GuestMemory> fmt::Debug for JsObject<'_, M> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_tuple("JsObject").field(&self.handle).finish()
    }
}

/// Non-owning copy of a [`JsObject`]'s handle. Nothing keeps the object alive.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
#[repr(transparent)]
pub struct JsObjectWeak(Handle);

impl JsObjectWeak {
    pub fn handle(self) -> Handle {
        self.0
    }

    pub fn is_nil(self) -> bool {
        self.0.is_nil()
    }
}

impl From<JsObjectWeak> for Value {
    fn from(weak: JsObjectWeak) -> Self {
        Value::I32(weak.0.raw())
    }
}

impl<'g, M: GuestMemory> JsObject<'g, M> {
    pub fn handle(&self) -> Handle {
        self.handle
    }

    pub fn weak(&self) -> JsObjectWeak {
        JsObjectWeak(self.handle)
    }

    pub fn is_nil(&self) -> bool {
        self.handle.is_nil()
    }

    /// Give up ownership without disposing of the handle
    pub fn into_raw(self) -> Handle {
        let handle = self.handle;
        mem::forget(self);
        handle
    }

    /// Replace the contents of `buf` with this string
    ///
    /// Invalid UTF-8 produced by lenient surrogate encoding is replaced with
    /// U+FFFD.
    pub fn to_string(&self, buf: &mut String) -> Result<()> {
        let len = self.guest.call_i32("js_string_length", &[self.weak().into()])? as u32;
        let bytes = self.guest.unwrap_into("js_unwrap_to_str", self.weak(), len)?;
        buf.clear();
        buf.push_str(&String::from_utf8_lossy(&bytes));
        Ok(())
    }

    /// Replace the contents of `buf` with this buffer's bytes
    pub fn to_byte_buffer(&self, buf: &mut Vec<u8>) -> Result<()> {
        let len = self.guest.call_i32("js_buf_length", &[self.weak().into()])? as u32;
        let bytes = self.guest.unwrap_into("js_unwrap_to_buf", self.weak(), len)?;
        buf.clear();
        buf.extend_from_slice(&bytes);
        Ok(())
    }

    fn field_args(&self, name: &str) -> Result<[Value; 3]> {
        let ptrs = self.guest.stage(&[name.as_bytes()])?;
        Ok([self.weak().into(), ptrs[0].into(), len_value(name.len())])
    }

    /// Project `.name` into a new object
    pub fn field(&self, name: &str) -> Result<JsObject<'g, M>> {
        let args = self.field_args(name)?;
        self.guest.call_object("js_field", &args)
    }

    /// `.name != undefined`, so null fields count as absent
    pub fn have_field(&self, name: &str) -> Result<bool> {
        let args = self.field_args(name)?;
        Ok(self.guest.call_i32("js_have_field", &args)? != 0)
    }

    pub fn field_u32(&self, name: &str) -> Result<u32> {
        let args = self.field_args(name)?;
        Ok(self.guest.call_i32("js_field_u32", &args)? as u32)
    }

    pub fn field_f32(&self, name: &str) -> Result<f32> {
        let args = self.field_args(name)?;
        self.guest.call_f32("js_field_f32", &args)
    }

    /// `object.name = data`
    pub fn set_field_string(&self, name: &str, data: &str) -> Result<()> {
        let ptrs = self.guest.stage(&[name.as_bytes(), data.as_bytes()])?;
        self.guest.call(
            "js_set_field_string",
            &[
                self.weak().into(),
                ptrs[0].into(),
                len_value(name.len()),
                ptrs[1].into(),
                len_value(data.len()),
            ],
        )?;
        Ok(())
    }

    pub fn set_field_f32(&self, name: &str, data: f32) -> Result<()> {
        let [this, ptr, len] = self.field_args(name)?;
        self.guest.call("js_set_field_f32", &[this, ptr, len, data.into()])?;
        Ok(())
    }

    pub fn set_field_u32(&self, name: &str, data: u32) -> Result<()> {
        let [this, ptr, len] = self.field_args(name)?;
        self.guest.call("js_set_field_u32", &[this, ptr, len, data.into()])?;
        Ok(())
    }
}

impl<M: GuestMemory> Drop for JsObject<'_, M> {
    fn drop(&mut self) {
        if self.is_nil() {
            return;
        }
        if self.guest.bridge.try_borrow_mut().is_err() {
            log::error!("leaking {}: bridge is borrowed", self.handle);
            return;
        }
        if let Err(err) = self.guest.call("js_free_object", &[self.weak().into()]) {
            log::error!("failed to free {}: {}", self.handle, err);
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::error::ErrorKind;
    use crate::object::HostObject;

    #[test]
    fn test_string_round_trip() {
        let guest = Guest::new().unwrap();
        let s = guest.string("héllo").unwrap();

        let mut out = String::from("previous contents");
        s.to_string(&mut out).unwrap();
        assert_eq!(out, "héllo");
    }

    #[test]
    fn test_buffer_round_trip() {
        let guest = Guest::new().unwrap();
        let b = guest.buffer(&[0, 1, 2, 255]).unwrap();

        let mut out = vec![9; 10];
        b.to_byte_buffer(&mut out).unwrap();
        assert_eq!(out, vec![0, 1, 2, 255]);
    }

    #[test]
    fn test_drop_disposes() {
        let guest = Guest::new().unwrap();
        let handle = {
            let obj = guest.object().unwrap();
            assert!(guest.bridge().registry().contains(obj.handle()));
            obj.handle()
        };
        assert!(!guest.bridge().registry().contains(handle));
        assert!(guest.bridge().registry().is_empty());
    }

    #[test]
    fn test_into_raw_keeps_handle() {
        let guest = Guest::new().unwrap();
        let handle = guest.object().unwrap().into_raw();
        assert!(guest.bridge().registry().contains(handle));

        drop(guest.adopt(handle));
        assert!(guest.bridge().registry().is_empty());
    }

    #[test]
    fn test_fields() {
        let guest = Guest::new().unwrap();
        let obj = guest.object().unwrap();
        obj.set_field_string("title", "window").unwrap();
        obj.set_field_f32("scale", 1.5).unwrap();
        obj.set_field_u32("width", 800).unwrap();

        assert!(obj.have_field("title").unwrap());
        assert!(!obj.have_field("height").unwrap());
        assert_eq!(obj.field_f32("scale").unwrap(), 1.5);
        assert_eq!(obj.field_u32("width").unwrap(), 800);

        let mut title = String::new();
        obj.field("title").unwrap().to_string(&mut title).unwrap();
        assert_eq!(title, "window");

        let err = obj.field("height").unwrap_err();
        assert_eq!(err.kind(), ErrorKind::NoSuchField);
    }

    #[test]
    fn test_host_seeded_object() {
        let guest = Guest::new().unwrap();
        let handle = guest
            .bridge_mut()
            .register(HostObject::object_from(vec![("count", HostObject::Number(-1.0))]))
            .unwrap();

        let obj = guest.adopt(handle);
        assert_eq!(obj.field_u32("count").unwrap(), u32::MAX);
        assert_eq!(obj.weak().handle(), handle);
    }

    #[test]
    fn test_nil_object() {
        let guest = Guest::new().unwrap();
        let nil = guest.adopt(Handle::NIL);
        assert!(nil.is_nil());
        assert!(nil.weak().is_nil());

        let err = nil.have_field("x").unwrap_err();
        assert_eq!(err.kind(), ErrorKind::InvalidHandle);
    }

    #[test]
    fn test_scratch_is_reused() {
        let guest = Guest::new().unwrap();
        let obj = guest.object().unwrap();
        obj.set_field_u32("a", 1).unwrap();
        let top = guest.bridge().memory().heap_top();

        for _ in 0..100 {
            obj.set_field_u32("a", 2).unwrap();
        }
        assert_eq!(guest.bridge().memory().heap_top(), top);

        // A larger argument needs a larger region
        let long = "x".repeat(100);
        obj.set_field_string(&long, "y").unwrap();
        assert!(guest.bridge().memory().heap_top() > top);
    }

    #[test]
    fn test_drop_while_bridge_borrowed_leaks() {
        let guest = Guest::new().unwrap();
        let obj = guest.object().unwrap();
        let handle = obj.handle();
        {
            let _bridge = guest.bridge();
            drop(obj);
        }
        assert!(guest.bridge().registry().contains(handle));
    }
}
