//! Boundary-call dispatcher
//!
//! [`HostBridge`] owns a [`HandleRegistry`] and the guest memory and implements
//! each host export in terms of raw pointers and lengths, exactly as the guest
//! passes them. Strings and buffers are copied in from guest memory when an
//! object is created and copied out into a guest-supplied destination when it
//! is unwrapped. Guest memory is never retained.
//!
//! # Usage
//!
//! ```ignore
//! let mut bridge = HostBridge::builder().first_handle(1).build()?;
//! let ptr = bridge.memory_mut().allocate(5)?;
//! bridge.memory_mut().write(ptr, b"hello")?;
//!
//! let handle = bridge.create_string(ptr, 5)?;
//! assert_eq!(bridge.string_length(handle)?, 5);
//! ```

use crate::config::BridgeConfig;
use crate::error::{BridgeError, Result};
use crate::handle::Handle;
use crate::memory::{GuestMemory, LinearMemory};
use crate::object::{HostObject, JsString};
use crate::registry::HandleRegistry;
use crate::utf8::{self, SurrogatePolicy};

/// Host side of the boundary: the registry plus the memory it copies through
#[derive(Debug)]
pub struct HostBridge<M: GuestMemory = LinearMemory> {
    registry: HandleRegistry,
    memory: M,
    config: BridgeConfig,
}

impl HostBridge<LinearMemory> {
    /// Create a new builder for a bridge over its own linear memory
    pub fn builder() -> HostBridgeBuilder {
        HostBridgeBuilder::new()
    }

    /// A bridge with the default configuration
    pub fn new() -> Result<Self> {
        Self::builder().build()
    }
}

impl<M: GuestMemory> HostBridge<M> {
    /// Wrap guest memory provided by an external runtime
    pub fn with_memory(memory: M, config: BridgeConfig) -> Result<Self> {
        config.validate()?;
        Ok(Self {
            registry: HandleRegistry::starting_at(config.first_handle),
            memory,
            config,
        })
    }

    pub fn config(&self) -> &BridgeConfig {
        &self.config
    }

    pub fn registry(&self) -> &HandleRegistry {
        &self.registry
    }

    /// Host-side access to the registry, e.g. to seed objects for the guest
    pub fn registry_mut(&mut self) -> &mut HandleRegistry {
        &mut self.registry
    }

    pub fn memory(&self) -> &M {
        &self.memory
    }

    pub fn memory_mut(&mut self) -> &mut M {
        &mut self.memory
    }

    /// Register a host object and return the handle to give the guest
    pub fn register(&mut self, object: HostObject) -> Result<Handle> {
        self.registry.register(object)
    }

    fn surrogates(&self) -> SurrogatePolicy {
        self.config.surrogates
    }

    /// Fail if the guest passes in more than the configured input limit
    fn check_input_limit(&self, len: usize) -> Result<()> {
        match self.config.max_input_bytes {
            Some(limit) if len > limit as usize => Err(BridgeError::BoundsViolation {
                required: len,
                available: limit as usize,
            }),
            _ => Ok(()),
        }
    }

    /// Read exactly `len` guest bytes
    fn read_input(&self, ptr: u32, len: u32) -> Result<Vec<u8>> {
        self.check_input_limit(len as usize)?;
        self.memory.read(ptr, len as usize)
    }

    /// Read up to `max_len` bytes of UTF-8 at `ptr`, stopping at the first NUL
    ///
    /// Only the part of `[ptr, ptr + max_len)` that lies inside memory is
    /// scanned, so a terminated string near the end of memory is fine. The
    /// input limit applies to the bytes before the terminator.
    fn read_text(&self, ptr: u32, max_len: u32) -> Result<Vec<u16>> {
        let start = ptr as usize;
        let end = start.saturating_add(max_len as usize).min(self.memory.size_bytes());
        let window = if start < end {
            self.memory.read(ptr, end - start)?
        } else {
            Vec::new()
        };

        let text_len = match window.iter().position(|&b| b == 0) {
            Some(nul) => nul,
            None if window.len() == max_len as usize => window.len(),
            None => {
                return Err(BridgeError::MemoryError(format!(
                    "unterminated string at {:#x} runs past end of memory",
                    ptr
                )))
            }
        };
        self.check_input_limit(text_len)?;
        Ok(utf8::decode_utf8(&window[..text_len]))
    }

    /// Read a field name passed by the guest
    fn read_name(&self, ptr: u32, len: u32) -> Result<String> {
        Ok(String::from_utf16_lossy(&self.read_text(ptr, len)?))
    }

    /// Copy `bytes` to `dest`, refusing to truncate
    fn copy_out(&mut self, bytes: &[u8], dest: u32, max_len: u32) -> Result<()> {
        if bytes.len() > max_len as usize {
            let err = BridgeError::BoundsViolation {
                required: bytes.len(),
                available: max_len as usize,
            };
            log::warn!("refusing to truncate: {}", err);
            return Err(err);
        }
        self.memory.write(dest, bytes)
    }

    /// Read up to `max_len` bytes at `buf` as UTF-8 and register them as a
    /// string. Decoding stops at the first NUL byte.
    pub fn create_string(&mut self, buf: u32, max_len: u32) -> Result<Handle> {
        let string = JsString::from_units(self.read_text(buf, max_len)?);
        self.registry.register(HostObject::String(string))
    }

    /// Copy `len` bytes at `buf` verbatim and register them as a buffer
    pub fn create_buffer(&mut self, buf: u32, len: u32) -> Result<Handle> {
        let bytes = self.read_input(buf, len)?;
        self.registry.register(HostObject::buffer(bytes))
    }

    /// Register a new empty object
    pub fn create_object(&mut self) -> Result<Handle> {
        self.registry.register(HostObject::object())
    }

    /// UTF-8 byte length of the string behind `handle`
    pub fn string_length(&self, handle: Handle) -> Result<u32> {
        let len = self.registry.string_byte_length(handle, self.surrogates())?;
        to_u32_len(len)
    }

    /// Encode the string behind `handle` and copy it to `buf`
    ///
    /// # Errors
    /// `BoundsViolation` if the encoding is longer than `max_len`. Nothing is
    /// written in that case.
    pub fn unwrap_to_str(&mut self, handle: Handle, buf: u32, max_len: u32) -> Result<()> {
        let bytes = self.registry.encode_string(handle, self.surrogates())?;
        self.copy_out(&bytes, buf, max_len)
    }

    /// Byte length of the buffer behind `handle`
    pub fn buf_length(&self, handle: Handle) -> Result<u32> {
        to_u32_len(self.registry.buffer(handle)?.len())
    }

    /// Copy the buffer behind `handle` to `buf`
    pub fn unwrap_to_buf(&mut self, handle: Handle, buf: u32, max_len: u32) -> Result<()> {
        let bytes = self.registry.buffer(handle)?.to_vec();
        self.copy_out(&bytes, buf, max_len)
    }

    /// Project a field and register it under a new handle
    pub fn field(&mut self, handle: Handle, name: u32, len: u32) -> Result<Handle> {
        let name = self.read_name(name, len)?;
        self.registry.field(handle, &name)
    }

    /// Whether a field exists and is neither undefined nor null
    pub fn have_field(&self, handle: Handle, name: u32, len: u32) -> Result<bool> {
        let name = self.read_name(name, len)?;
        self.registry.have_field(handle, &name)
    }

    pub fn field_f32(&self, handle: Handle, name: u32, len: u32) -> Result<f32> {
        let name = self.read_name(name, len)?;
        Ok(self.registry.field_number(handle, &name)? as f32)
    }

    /// Numeric field converted with JavaScript `ToUint32` semantics
    pub fn field_u32(&self, handle: Handle, name: u32, len: u32) -> Result<u32> {
        let name = self.read_name(name, len)?;
        Ok(crate::value::to_uint32(self.registry.field_number(handle, &name)?))
    }

    pub fn set_field_string(
        &mut self,
        handle: Handle,
        name: u32,
        len: u32,
        data: u32,
        data_len: u32,
    ) -> Result<()> {
        let name = self.read_name(name, len)?;
        let units = self.read_text(data, data_len)?;
        self.registry
            .set_field(handle, &name, HostObject::String(JsString::from_units(units)))
    }

    pub fn set_field_f32(&mut self, handle: Handle, name: u32, len: u32, value: f32) -> Result<()> {
        let name = self.read_name(name, len)?;
        self.registry
            .set_field(handle, &name, HostObject::Number(f64::from(value)))
    }

    pub fn set_field_u32(&mut self, handle: Handle, name: u32, len: u32, value: u32) -> Result<()> {
        let name = self.read_name(name, len)?;
        self.registry
            .set_field(handle, &name, HostObject::Number(f64::from(value)))
    }

    /// Dispose of `handle`
    pub fn free_object(&mut self, handle: Handle) -> Result<()> {
        self.registry.dispose(handle).map(|_| ())
    }
}

fn to_u32_len(len: usize) -> Result<u32> {
    u32::try_from(len).map_err(|_| BridgeError::BoundsViolation {
        required: len,
        available: u32::MAX as usize,
    })
}

/// Builder for a [`HostBridge`] over its own [`LinearMemory`]
pub struct HostBridgeBuilder {
    config: BridgeConfig,
}

impl HostBridgeBuilder {
    /// Create a new builder with default settings
    pub fn new() -> Self {
        Self {
            config: BridgeConfig::default(),
        }
    }

    /// Start from an existing configuration
    pub fn config(mut self, config: BridgeConfig) -> Self {
        self.config = config;
        self
    }

    /// Set the first handle the registry issues
    pub fn first_handle(mut self, first: i32) -> Self {
        self.config.first_handle = first;
        self
    }

    /// Set the surrogate policy for outgoing strings
    pub fn surrogates(mut self, policy: SurrogatePolicy) -> Self {
        self.config.surrogates = policy;
        self
    }

    /// Set the import module name
    pub fn import_module(mut self, module: impl Into<String>) -> Self {
        self.config.import_module = module.into();
        self
    }

    /// Set the linear memory limits, in pages
    pub fn memory_pages(mut self, initial: u32, max: Option<u32>) -> Self {
        self.config.initial_pages = initial;
        self.config.max_pages = max;
        self
    }

    /// Cap the size of strings and buffers the guest may pass in
    pub fn max_input_bytes(mut self, limit: u32) -> Self {
        self.config.max_input_bytes = Some(limit);
        self
    }

    /// Build the bridge
    pub fn build(self) -> Result<HostBridge<LinearMemory>> {
        let memory = LinearMemory::new(self.config.initial_pages, self.config.max_pages)?;
        HostBridge::with_memory(memory, self.config)
    }
}

impl Default for HostBridgeBuilder {
    fn default() -> Self {
        Self::new()
    }
}
