//! Host functions exposed to the guest
//!
//! An [`ImportObject`] maps `(module, name)` pairs to typed host functions.
//! [`create_js_imports`] registers the full set of object-handle operations
//! under one module name (`env` by default):
//!
//! | Import                | Params                              | Result |
//! |-----------------------|-------------------------------------|--------|
//! | `js_create_string`    | buf, max_len                        | handle |
//! | `js_create_buffer`    | buf, len                            | handle |
//! | `js_create_object`    |                                     | handle |
//! | `js_free_object`      | handle                              |        |
//! | `js_string_length`    | handle                              | i32    |
//! | `js_buf_length`       | handle                              | i32    |
//! | `js_unwrap_to_str`    | handle, buf, max_len                |        |
//! | `js_unwrap_to_buf`    | handle, buf, max_len                |        |
//! | `js_field`            | handle, name, len                   | handle |
//! | `js_have_field`       | handle, name, len                   | i32    |
//! | `js_field_f32`        | handle, name, len                   | f32    |
//! | `js_field_u32`        | handle, name, len                   | i32    |
//! | `js_set_field_string` | handle, name, len, data, data_len   |        |
//! | `js_set_field_f32`    | handle, name, len, f32              |        |
//! | `js_set_field_u32`    | handle, name, len, i32              |        |
//!
//! All parameters are `i32` unless noted. Pointers and lengths are
//! reinterpreted as `u32`.

use crate::bridge::HostBridge;
use crate::error::{BridgeError, Result};
use crate::handle::Handle;
use crate::memory::GuestMemory;
use crate::value::{Value, ValueType};
use std::collections::HashMap;
use std::fmt;

/// Signature of a host function
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct FunctionType {
    pub parameters: Vec<ValueType>,
    pub return_types: Vec<ValueType>,
}

impl FunctionType {
    pub fn new(parameters: &[ValueType], return_types: &[ValueType]) -> Self {
        Self {
            parameters: parameters.to_vec(),
            return_types: return_types.to_vec(),
        }
    }
}

impl fmt::Display for FunctionType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "({})", join_types(&self.parameters))?;
        if !self.return_types.is_empty() {
            write!(f, " -> {}", join_types(&self.return_types))?;
        }
        Ok(())
    }
}

fn join_types(types: &[ValueType]) -> String {
    types.iter().map(ToString::to_string).collect::<Vec<_>>().join(", ")
}

/// Host function body. Arguments have already been checked against the
/// function's type.
pub type HostFunc<M> = fn(&mut HostBridge<M>, &[Value]) -> Result<Vec<Value>>;

/// A host function together with its signature
pub struct HostFunction<M: GuestMemory> {
    pub func_type: FunctionType,
    func: HostFunc<M>,
}

impl<M: GuestMemory> fmt::Debug for HostFunction<M> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("HostFunction").field("func_type", &self.func_type).finish()
    }
}

/// Container for the host functions a guest can import
#[derive(Debug)]
pub struct ImportObject<M: GuestMemory> {
    /// Functions mapped by (module_name, field_name)
    functions: HashMap<(String, String), HostFunction<M>>,
}

impl<M: GuestMemory> Default for ImportObject<M> {
    fn default() -> Self {
        Self::new()
    }
}

impl<M: GuestMemory> ImportObject<M> {
    /// Create a new empty import object
    pub fn new() -> Self {
        Self {
            functions: HashMap::new(),
        }
    }

    /// Add a function import
    pub fn add_function(
        &mut self,
        module: impl Into<String>,
        name: impl Into<String>,
        func_type: FunctionType,
        func: HostFunc<M>,
    ) {
        self.functions
            .insert((module.into(), name.into()), HostFunction { func_type, func });
    }

    /// Get a function import
    ///
    /// # Errors
    /// Returns `UnknownImport` error if the import doesn't exist
    pub fn get_function(&self, module: &str, name: &str) -> Result<&HostFunction<M>> {
        self.functions
            .get(&(module.to_string(), name.to_string()))
            .ok_or_else(|| BridgeError::UnknownImport(format!("{}.{}", module, name)))
    }

    pub fn len(&self) -> usize {
        self.functions.len()
    }

    pub fn is_empty(&self) -> bool {
        self.functions.is_empty()
    }

    /// All registered `(module, name)` pairs, sorted
    pub fn names(&self) -> Vec<(String, String)> {
        let mut names: Vec<_> = self.functions.keys().cloned().collect();
        names.sort();
        names
    }

    /// Service a guest call to `module.name`
    ///
    /// Arguments are checked against the import's signature before the body
    /// runs. Any error is fatal to the call and should be turned into a trap by
    /// the caller.
    pub fn invoke(
        &self,
        bridge: &mut HostBridge<M>,
        module: &str,
        name: &str,
        args: &[Value],
    ) -> Result<Vec<Value>> {
        let function = self.get_function(module, name)?;
        check_arguments(module, name, &function.func_type, args)?;

        log::debug!("{}.{}{:?}", module, name, args);
        let results = (function.func)(bridge, args).map_err(|err| {
            log::warn!("{}.{} failed: {}", module, name, err);
            err
        })?;
        debug_assert_eq!(
            results.iter().map(Value::typ).collect::<Vec<_>>(),
            function.func_type.return_types
        );
        Ok(results)
    }
}

fn check_arguments(module: &str, name: &str, func_type: &FunctionType, args: &[Value]) -> Result<()> {
    let actual: Vec<ValueType> = args.iter().map(Value::typ).collect();
    if actual != func_type.parameters {
        return Err(BridgeError::ArgumentMismatch {
            import: format!("{}.{}", module, name),
            expected: format!("({})", join_types(&func_type.parameters)),
            actual: format!("({})", join_types(&actual)),
        });
    }
    Ok(())
}

/// Create the object-handle imports under `module`
pub fn create_js_imports<M: GuestMemory>(module: &str) -> ImportObject<M> {
    use ValueType::{F32, I32};

    let mut imports = ImportObject::new();
    let mut add = |name: &str, params: &[ValueType], results: &[ValueType], func: HostFunc<M>| {
        imports.add_function(module, name, FunctionType::new(params, results), func);
    };

    add("js_create_string", &[I32, I32], &[I32], js_create_string);
    add("js_create_buffer", &[I32, I32], &[I32], js_create_buffer);
    add("js_create_object", &[], &[I32], js_create_object);
    add("js_free_object", &[I32], &[], js_free_object);
    add("js_string_length", &[I32], &[I32], js_string_length);
    add("js_buf_length", &[I32], &[I32], js_buf_length);
    add("js_unwrap_to_str", &[I32, I32, I32], &[], js_unwrap_to_str);
    add("js_unwrap_to_buf", &[I32, I32, I32], &[], js_unwrap_to_buf);
    add("js_field", &[I32, I32, I32], &[I32], js_field);
    add("js_have_field", &[I32, I32, I32], &[I32], js_have_field);
    add("js_field_f32", &[I32, I32, I32], &[F32], js_field_f32);
    add("js_field_u32", &[I32, I32, I32], &[I32], js_field_u32);
    add("js_set_field_string", &[I32, I32, I32, I32, I32], &[], js_set_field_string);
    add("js_set_field_f32", &[I32, I32, I32, F32], &[], js_set_field_f32);
    add("js_set_field_u32", &[I32, I32, I32, I32], &[], js_set_field_u32);

    imports
}

/// Extract an i32 value from function arguments at the given index.
fn extract_i32(args: &[Value], index: usize) -> Result<i32> {
    match args.get(index) {
        Some(Value::I32(v)) => Ok(*v),
        other => Err(BridgeError::ArgumentMismatch {
            import: format!("argument {}", index),
            expected: "i32".to_string(),
            actual: format!("{:?}", other),
        }),
    }
}

/// Pointers and lengths travel as i32 but are unsigned
fn extract_u32(args: &[Value], index: usize) -> Result<u32> {
    extract_i32(args, index).map(|v| v as u32)
}

fn extract_f32(args: &[Value], index: usize) -> Result<f32> {
    match args.get(index) {
        Some(Value::F32(v)) => Ok(*v),
        other => Err(BridgeError::ArgumentMismatch {
            import: format!("argument {}", index),
            expected: "f32".to_string(),
            actual: format!("{:?}", other),
        }),
    }
}

fn extract_handle(args: &[Value], index: usize) -> Result<Handle> {
    extract_i32(args, index).map(Handle::from_raw)
}

fn handle_result(handle: Handle) -> Vec<Value> {
    vec![Value::I32(handle.raw())]
}

fn js_create_string<M: GuestMemory>(bridge: &mut HostBridge<M>, args: &[Value]) -> Result<Vec<Value>> {
    let handle = bridge.create_string(extract_u32(args, 0)?, extract_u32(args, 1)?)?;
    Ok(handle_result(handle))
}

fn js_create_buffer<M: GuestMemory>(bridge: &mut HostBridge<M>, args: &[Value]) -> Result<Vec<Value>> {
    let handle = bridge.create_buffer(extract_u32(args, 0)?, extract_u32(args, 1)?)?;
    Ok(handle_result(handle))
}

fn js_create_object<M: GuestMemory>(bridge: &mut HostBridge<M>, _args: &[Value]) -> Result<Vec<Value>> {
    Ok(handle_result(bridge.create_object()?))
}

fn js_free_object<M: GuestMemory>(bridge: &mut HostBridge<M>, args: &[Value]) -> Result<Vec<Value>> {
    bridge.free_object(extract_handle(args, 0)?)?;
    Ok(vec![])
}

fn js_string_length<M: GuestMemory>(bridge: &mut HostBridge<M>, args: &[Value]) -> Result<Vec<Value>> {
    let len = bridge.string_length(extract_handle(args, 0)?)?;
    Ok(vec![Value::from(len)])
}

fn js_buf_length<M: GuestMemory>(bridge: &mut HostBridge<M>, args: &[Value]) -> Result<Vec<Value>> {
    let len = bridge.buf_length(extract_handle(args, 0)?)?;
    Ok(vec![Value::from(len)])
}

fn js_unwrap_to_str<M: GuestMemory>(bridge: &mut HostBridge<M>, args: &[Value]) -> Result<Vec<Value>> {
    bridge.unwrap_to_str(extract_handle(args, 0)?, extract_u32(args, 1)?, extract_u32(args, 2)?)?;
    Ok(vec![])
}

fn js_unwrap_to_buf<M: GuestMemory>(bridge: &mut HostBridge<M>, args: &[Value]) -> Result<Vec<Value>> {
    bridge.unwrap_to_buf(extract_handle(args, 0)?, extract_u32(args, 1)?, extract_u32(args, 2)?)?;
    Ok(vec![])
}

fn js_field<M: GuestMemory>(bridge: &mut HostBridge<M>, args: &[Value]) -> Result<Vec<Value>> {
    let handle = bridge.field(extract_handle(args, 0)?, extract_u32(args, 1)?, extract_u32(args, 2)?)?;
    Ok(handle_result(handle))
}

fn js_have_field<M: GuestMemory>(bridge: &mut HostBridge<M>, args: &[Value]) -> Result<Vec<Value>> {
    let present = bridge.have_field(extract_handle(args, 0)?, extract_u32(args, 1)?, extract_u32(args, 2)?)?;
    Ok(vec![Value::I32(present as i32)])
}

fn js_field_f32<M: GuestMemory>(bridge: &mut HostBridge<M>, args: &[Value]) -> Result<Vec<Value>> {
    let value = bridge.field_f32(extract_handle(args, 0)?, extract_u32(args, 1)?, extract_u32(args, 2)?)?;
    Ok(vec![Value::F32(value)])
}

fn js_field_u32<M: GuestMemory>(bridge: &mut HostBridge<M>, args: &[Value]) -> Result<Vec<Value>> {
    let value = bridge.field_u32(extract_handle(args, 0)?, extract_u32(args, 1)?, extract_u32(args, 2)?)?;
    Ok(vec![Value::from(value)])
}

fn js_set_field_string<M: GuestMemory>(bridge: &mut HostBridge<M>, args: &[Value]) -> Result<Vec<Value>> {
    bridge.set_field_string(
        extract_handle(args, 0)?,
        extract_u32(args, 1)?,
        extract_u32(args, 2)?,
        extract_u32(args, 3)?,
        extract_u32(args, 4)?,
    )?;
    Ok(vec![])
}

fn js_set_field_f32<M: GuestMemory>(bridge: &mut HostBridge<M>, args: &[Value]) -> Result<Vec<Value>> {
    bridge.set_field_f32(
        extract_handle(args, 0)?,
        extract_u32(args, 1)?,
        extract_u32(args, 2)?,
        extract_f32(args, 3)?,
    )?;
    Ok(vec![])
}

fn js_set_field_u32<M: GuestMemory>(bridge: &mut HostBridge<M>, args: &[Value]) -> Result<Vec<Value>> {
    bridge.set_field_u32(
        extract_handle(args, 0)?,
        extract_u32(args, 1)?,
        extract_u32(args, 2)?,
        extract_u32(args, 3)?,
    )?;
    Ok(vec![])
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::error::ErrorKind;
    use crate::memory::LinearMemory;

    fn setup() -> (HostBridge, ImportObject<LinearMemory>) {
        (HostBridge::new().unwrap(), create_js_imports("env"))
    }

    #[test]
    fn test_all_imports_registered() {
        let imports: ImportObject<LinearMemory> = create_js_imports("env");
        assert_eq!(imports.len(), 15);
        assert!(imports.get_function("env", "js_field").is_ok());
        assert!(imports.get_function("env", "js_set_field_f32").is_ok());
        assert!(matches!(
            imports.get_function("js", "js_field"),
            Err(BridgeError::UnknownImport(_))
        ));
        assert!(imports.names().iter().all(|(module, _)| module == "env"));
    }

    #[test]
    fn test_function_type_display() {
        let imports: ImportObject<LinearMemory> = create_js_imports("env");
        let set_f32 = imports.get_function("env", "js_set_field_f32").unwrap();
        assert_eq!(set_f32.func_type.to_string(), "(i32, i32, i32, f32)");
        let field = imports.get_function("env", "js_field").unwrap();
        assert_eq!(field.func_type.to_string(), "(i32, i32, i32) -> i32");
    }

    #[test]
    fn test_invoke_create_and_free() {
        let (mut bridge, imports) = setup();

        let results = imports.invoke(&mut bridge, "env", "js_create_object", &[]).unwrap();
        let handle = results[0].as_i32().unwrap();
        assert_eq!(bridge.registry().len(), 1);

        let results = imports
            .invoke(&mut bridge, "env", "js_free_object", &[Value::I32(handle)])
            .unwrap();
        assert!(results.is_empty());
        assert!(bridge.registry().is_empty());

        let err = imports
            .invoke(&mut bridge, "env", "js_free_object", &[Value::I32(handle)])
            .unwrap_err();
        assert_eq!(err.kind(), ErrorKind::InvalidHandle);
    }

    #[test]
    fn test_invoke_checks_arguments() {
        let (mut bridge, imports) = setup();

        let err = imports
            .invoke(&mut bridge, "env", "js_string_length", &[])
            .unwrap_err();
        assert!(matches!(err, BridgeError::ArgumentMismatch { .. }));

        let err = imports
            .invoke(&mut bridge, "env", "js_free_object", &[Value::F32(1.0)])
            .unwrap_err();
        assert_eq!(
            err.to_string(),
            "Argument mismatch for env.js_free_object: expected (i32), got (f32)"
        );

        let err = imports.invoke(&mut bridge, "env", "js_nope", &[]).unwrap_err();
        assert!(matches!(err, BridgeError::UnknownImport(_)));
    }

    #[test]
    fn test_invoke_string_round_trip() {
        let (mut bridge, imports) = setup();
        let ptr = bridge.memory_mut().allocate(4).unwrap();
        bridge.memory_mut().write(ptr, "A€".as_bytes()).unwrap();

        let h = imports
            .invoke(&mut bridge, "env", "js_create_string", &[Value::from(ptr), Value::I32(4)])
            .unwrap()[0];
        let len = imports.invoke(&mut bridge, "env", "js_string_length", &[h]).unwrap()[0];
        assert_eq!(len, Value::I32(4));

        let dest = bridge.memory_mut().allocate(4).unwrap();
        imports
            .invoke(&mut bridge, "env", "js_unwrap_to_str", &[h, Value::from(dest), len])
            .unwrap();
        assert_eq!(
            bridge.memory().read(dest, 4).unwrap(),
            vec![0x41, 0xE2, 0x82, 0xAC]
        );
    }

    #[test]
    fn test_custom_module_name() {
        let mut bridge = HostBridge::new().unwrap();
        let imports = create_js_imports("sapp");
        assert!(imports.invoke(&mut bridge, "sapp", "js_create_object", &[]).is_ok());
        assert!(imports.invoke(&mut bridge, "env", "js_create_object", &[]).is_err());
    }
}
