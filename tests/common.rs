//! Common test utilities shared between integration tests

#![allow(dead_code)]

use hostref::bridge::HostBridge;
use hostref::imports::{create_js_imports, ImportObject};
use hostref::memory::{GuestMemory, LinearMemory};
use hostref::value::Value;
use hostref::Result;

/// Route `log` output through the test harness
pub fn init_logging() {
    let _ = env_logger::builder().is_test(true).try_init();
}

/// A default bridge together with its import table
pub fn setup() -> (HostBridge, ImportObject<LinearMemory>) {
    init_logging();
    setup_with(HostBridge::new().expect("Failed to create bridge"))
}

pub fn setup_with(bridge: HostBridge) -> (HostBridge, ImportObject<LinearMemory>) {
    let imports = create_js_imports(&bridge.config().import_module);
    (bridge, imports)
}

/// Copy `bytes` into freshly allocated guest memory and return the
/// `(ptr, len)` argument pair pointing at them
pub fn stage(bridge: &mut HostBridge, bytes: &[u8]) -> (Value, Value) {
    let ptr = bridge
        .memory_mut()
        .allocate(bytes.len() as u32)
        .expect("Failed to allocate");
    bridge.memory_mut().write(ptr, bytes).expect("Failed to write");
    (Value::from(ptr), Value::I32(bytes.len() as i32))
}

/// Call `env.name` and return its results
pub fn call(
    bridge: &mut HostBridge,
    imports: &ImportObject<LinearMemory>,
    name: &str,
    args: &[Value],
) -> Result<Vec<Value>> {
    let module = bridge.config().import_module.clone();
    imports.invoke(bridge, &module, name, args)
}

/// Call an import that returns a single i32
pub fn call_i32(
    bridge: &mut HostBridge,
    imports: &ImportObject<LinearMemory>,
    name: &str,
    args: &[Value],
) -> Result<i32> {
    let results = call(bridge, imports, name, args)?;
    Ok(results[0].as_i32().expect("Expected an i32 result"))
}
