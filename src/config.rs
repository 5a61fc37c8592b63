//! Configuration model
//!
//! Mirrors the JSON a host application hands over per television:
//!
//! ```json
//! {
//!   "storagePath": "/var/lib/lgwebos",
//!   "devices": [{
//!     "name": "Living Room",
//!     "host": "192.168.1.20",
//!     "mac": "a8:23:fe:01:02:03",
//!     "switchInfoMenu": true,
//!     "inputs": ["com.webos.app.hdmi1", { "reference": "netflix", "name": "Netflix" }]
//!   }]
//! }
//! ```

use crate::error::{WebOsError, Result};
use serde::{Deserialize, Deserializer, Serialize};
use std::path::{Path, PathBuf};
use std::time::Duration;

/// Control port of the television's SSAP service
pub const CONTROL_PORT: u16 = 3000;

/// Top-level configuration for all managed televisions
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct PlatformConfig {
    /// Directory for pairing keys and discovered metadata
    #[serde(default)]
    pub storage_path: Option<PathBuf>,

    #[serde(default)]
    pub devices: Vec<DeviceConfig>,
}

impl PlatformConfig {
    /// Parse configuration from a JSON string
    pub fn from_json(json: &str) -> Result<Self> {
        Ok(serde_json::from_str(json)?)
    }

    /// Read configuration from a JSON file
    pub fn from_file(path: impl AsRef<Path>) -> Result<Self> {
        let text = std::fs::read_to_string(path)?;
        Self::from_json(&text)
    }

    /// Storage directory, falling back to the user's data directory
    pub fn storage_root(&self) -> Result<PathBuf> {
        if let Some(path) = &self.storage_path {
            return Ok(path.clone());
        }
        dirs::data_dir()
            .map(|dir| dir.join("lgwebosTv"))
            .ok_or_else(|| WebOsError::Config("No storage path and no user data directory".to_string()))
    }
}

/// Configuration of one television
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct DeviceConfig {
    #[serde(default)]
    pub name: String,

    pub host: String,

    /// MAC address used for Wake-on-LAN
    #[serde(default)]
    pub mac: String,

    /// Send MENU instead of INFO for the information key
    #[serde(default)]
    pub switch_info_menu: bool,

    #[serde(default, deserialize_with = "one_or_many")]
    pub inputs: Vec<InputConfig>,

    #[serde(default)]
    pub manufacturer: Option<String>,
    #[serde(default)]
    pub model_name: Option<String>,
    #[serde(default)]
    pub serial_number: Option<String>,
    #[serde(default)]
    pub firmware_revision: Option<String>,

    #[serde(default)]
    pub connection: ConnectionSettings,
}

impl DeviceConfig {
    /// Minimal configuration for a television at `host`
    pub fn new(name: impl Into<String>, host: impl Into<String>, mac: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            host: host.into(),
            mac: mac.into(),
            switch_info_menu: false,
            inputs: Vec::new(),
            manufacturer: None,
            model_name: None,
            serial_number: None,
            firmware_revision: None,
            connection: ConnectionSettings::default(),
        }
    }

    /// Check the fields the connection manager cannot work without
    pub fn validate(&self) -> Result<()> {
        if self.name.trim().is_empty() {
            return Err(WebOsError::Config("Device name missing".to_string()));
        }
        if self.host.trim().is_empty() {
            return Err(WebOsError::Config(format!("Device {} has no host", self.name)));
        }
        Ok(())
    }
}

/// A configured input, either a bare reference or a reference with a name
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(untagged)]
pub enum InputConfig {
    Reference(String),
    Named {
        reference: String,
        #[serde(default)]
        name: Option<String>,
    },
}

impl InputConfig {
    pub fn reference(&self) -> &str {
        match self {
            InputConfig::Reference(reference) => reference,
            InputConfig::Named { reference, .. } => reference,
        }
    }

    pub fn name(&self) -> Option<&str> {
        match self {
            InputConfig::Reference(_) => None,
            InputConfig::Named { name, .. } => name.as_deref(),
        }
    }
}

/// Timing of probing, reconnecting and requests
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase", default)]
pub struct ConnectionSettings {
    pub probe_interval_ms: u64,
    pub probe_timeout_ms: u64,
    pub reconnect_interval_ms: u64,
    pub request_timeout_ms: u64,
    pub keep_alive_ms: u64,
}

impl Default for ConnectionSettings {
    fn default() -> Self {
        Self {
            probe_interval_ms: 5000,
            probe_timeout_ms: 2000,
            reconnect_interval_ms: 3000,
            request_timeout_ms: 5000,
            keep_alive_ms: 10_000,
        }
    }
}

impl ConnectionSettings {
    pub fn probe_interval(&self) -> Duration {
        Duration::from_millis(self.probe_interval_ms.max(1))
    }

    pub fn probe_timeout(&self) -> Duration {
        Duration::from_millis(self.probe_timeout_ms.max(1))
    }

    pub fn reconnect_interval(&self) -> Duration {
        Duration::from_millis(self.reconnect_interval_ms)
    }

    pub fn request_timeout(&self) -> Duration {
        Duration::from_millis(self.request_timeout_ms.max(1))
    }

    pub fn keep_alive(&self) -> Duration {
        Duration::from_millis(self.keep_alive_ms.max(1))
    }
}

fn one_or_many<'de, D>(deserializer: D) -> std::result::Result<Vec<InputConfig>, D::Error>
where
    D: Deserializer<'de>,
{
    #[derive(Deserialize)]
    #[serde(untagged)]
    enum OneOrMany {
        Many(Vec<InputConfig>),
        One(InputConfig),
    }

    Ok(match Option::<OneOrMany>::deserialize(deserializer)? {
        Some(OneOrMany::Many(inputs)) => inputs,
        Some(OneOrMany::One(input)) => vec![input],
        None => Vec::new(),
    })
}
