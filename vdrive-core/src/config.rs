//! Drive configuration.
//!
//! Stored as a small JSON document:
//!
//! ```json
//! { "device": 8, "writeProtect": false, "banner": "VDRIVE VIRTUAL 1541" }
//! ```

use std::path::Path;

use serde::{Deserialize, Serialize};

use crate::error::VdriveResult;

/// Default device number of the drive.
pub const DEFAULT_DEVICE: u8 = 8;

/// Default text of the power-up message (error 73).
pub const DEFAULT_BANNER: &str = "VDRIVE VIRTUAL 1541";

/// Drive configuration schema.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct DriveConfig {
    /// Device number answered on the bus
    #[serde(default = "default_device")]
    pub device: u8,
    /// Mount every image read-only
    #[serde(default)]
    pub write_protect: bool,
    /// Text of the 73 power-up message
    #[serde(default = "default_banner")]
    pub banner: String,
    /// Whether KERNAL traps are installed
    #[serde(default = "default_traps")]
    pub traps_enabled: bool,
}

fn default_device() -> u8 {
    DEFAULT_DEVICE
}

fn default_banner() -> String {
    DEFAULT_BANNER.to_string()
}

fn default_traps() -> bool {
    true
}

impl Default for DriveConfig {
    fn default() -> Self {
        Self {
            device: DEFAULT_DEVICE,
            write_protect: false,
            banner: default_banner(),
            traps_enabled: true,
        }
    }
}

impl DriveConfig {
    /// Parse configuration from a JSON string.
    pub fn from_json(json: &str) -> VdriveResult<Self> {
        Ok(serde_json::from_str(json)?)
    }

    /// Load configuration from a JSON file.
    pub fn from_path(path: impl AsRef<Path>) -> VdriveResult<Self> {
        let json = std::fs::read_to_string(path)?;
        Self::from_json(&json)
    }
}
