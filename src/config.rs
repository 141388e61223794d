//! Bridge configuration
//!
//! Settings can be built in code through [`HostBridge::builder`](crate::bridge::HostBridge::builder)
//! or loaded from JSON. Every field has a default, so `{}` is a valid config.

use crate::error::{BridgeError, Result};
use crate::utf8::SurrogatePolicy;
use serde::{Deserialize, Serialize};

/// Module name the guest imports the host functions from
pub const DEFAULT_IMPORT_MODULE: &str = "env";

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct BridgeConfig {
    /// First handle the registry issues. Must be non-negative.
    pub first_handle: i32,
    /// Treatment of unpaired surrogates when encoding strings for the guest
    pub surrogates: SurrogatePolicy,
    /// Module name of the host imports
    pub import_module: String,
    /// Initial size of the linear memory, in pages
    pub initial_pages: u32,
    /// Maximum size of the linear memory, in pages
    pub max_pages: Option<u32>,
    /// Largest string or buffer the guest may pass in, in bytes
    pub max_input_bytes: Option<u32>,
}

impl Default for BridgeConfig {
    fn default() -> Self {
        Self {
            first_handle: 0,
            surrogates: SurrogatePolicy::default(),
            import_module: DEFAULT_IMPORT_MODULE.to_string(),
            initial_pages: 1,
            max_pages: None,
            max_input_bytes: None,
        }
    }
}

impl BridgeConfig {
    /// Parse and validate a JSON config
    pub fn from_json(text: &str) -> Result<Self> {
        let config: BridgeConfig = serde_json::from_str(text)?;
        config.validate()?;
        Ok(config)
    }

    /// Check invariants serde can't express
    pub fn validate(&self) -> Result<()> {
        if self.first_handle < 0 {
            return Err(BridgeError::Config(format!(
                "first_handle must be non-negative, got {}",
                self.first_handle
            )));
        }
        if self.import_module.is_empty() {
            return Err(BridgeError::Config("import_module must not be empty".to_string()));
        }
        if let Some(max) = self.max_pages {
            if max < self.initial_pages {
                return Err(BridgeError::Config(format!(
                    "max_pages {} is below initial_pages {}",
                    max, self.initial_pages
                )));
            }
        }
        Ok(())
    }
}
