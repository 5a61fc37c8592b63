use crate::config::{DeviceConfig, InputConfig, CONTROL_PORT};
use serde::{Deserialize, Serialize};
use serde_json::Value;
use std::collections::BTreeMap;

/// Identity and network attributes of a television
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct DeviceProfile {
    pub name: String,
    pub host: String,
    pub port: u16,
    pub mac: String,

    pub manufacturer: String,
    pub model_name: String,
    pub serial_number: String,
    pub firmware_revision: String,

    /// webOS product line, known once software info has been fetched
    pub product_name: Option<String>,
}

impl DeviceProfile {
    pub fn from_config(config: &DeviceConfig) -> Self {
        Self {
            name: config.name.clone(),
            host: config.host.clone(),
            port: CONTROL_PORT,
            mac: config.mac.clone(),
            manufacturer: config
                .manufacturer
                .clone()
                .unwrap_or_else(|| "LG Electronics".to_string()),
            model_name: config
                .model_name
                .clone()
                .unwrap_or_else(|| "lgwebos-tv".to_string()),
            serial_number: config
                .serial_number
                .clone()
                .unwrap_or_else(|| "SN0000004".to_string()),
            firmware_revision: config
                .firmware_revision
                .clone()
                .unwrap_or_else(|| "FW0000004".to_string()),
            product_name: None,
        }
    }

    /// URL of the control session
    pub fn url(&self) -> String {
        format!("ws://{}:{}", self.host, self.port)
    }

    /// Take the model from a `getSystemInfo` reply
    pub fn refine_from_system_info(&mut self, info: &Value) {
        self.manufacturer = "LG Electronics".to_string();
        if let Some(model) = info.get("modelName").and_then(Value::as_str) {
            self.model_name = model.to_string();
        }
    }

    /// Take product, serial and firmware from a `getCurrentSWInformation` reply
    pub fn refine_from_software_info(&mut self, info: &Value) {
        if let Some(product) = info.get("product_name").and_then(Value::as_str) {
            self.product_name = Some(product.to_string());
        }
        if let Some(serial) = info.get("device_id").and_then(Value::as_str) {
            self.serial_number = serial.to_string();
        }
        if let Some(firmware) = info.get("minor_ver").and_then(Value::as_str) {
            self.firmware_revision = firmware.to_string();
        }
    }
}

/// One selectable input
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct InputSource {
    /// App id launched to select this input, e.g. `com.webos.app.hdmi1`
    pub reference: String,
    pub name: String,
}

/// Ordered list of configured inputs
///
/// The position in the list is the input identifier the accessory layer uses.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct InputCatalog {
    sources: Vec<InputSource>,
}

impl InputCatalog {
    /// Build the catalog from configuration and persisted display names
    ///
    /// A persisted name wins over the configured one; without either the
    /// reference itself is shown.
    pub fn load(inputs: &[InputConfig], overrides: &BTreeMap<String, String>) -> Self {
        let sources = inputs
            .iter()
            .filter_map(|input| {
                let reference: String = input
                    .reference()
                    .chars()
                    .filter(|c| !c.is_whitespace())
                    .collect();
                if reference.is_empty() {
                    return None;
                }
                let name = overrides
                    .get(&reference)
                    .or_else(|| overrides.get(input.reference()))
                    .cloned()
                    .or_else(|| input.name().map(str::to_string))
                    .unwrap_or_else(|| reference.clone());
                Some(InputSource { reference, name })
            })
            .collect();

        Self { sources }
    }

    pub fn sources(&self) -> &[InputSource] {
        &self.sources
    }

    pub fn len(&self) -> usize {
        self.sources.len()
    }

    pub fn is_empty(&self) -> bool {
        self.sources.is_empty()
    }

    pub fn get(&self, index: usize) -> Option<&InputSource> {
        self.sources.get(index)
    }

    pub fn index_of(&self, reference: &str) -> Option<usize> {
        self.sources.iter().position(|s| s.reference == reference)
    }

    /// Rename an input; returns false for an unknown reference
    pub fn rename(&mut self, reference: &str, name: impl Into<String>) -> bool {
        match self.sources.iter_mut().find(|s| s.reference == reference) {
            Some(source) => {
                source.name = name.into();
                true
            }
            None => false,
        }
    }

    /// Display names keyed by reference, as persisted
    pub fn names(&self) -> BTreeMap<String, String> {
        self.sources
            .iter()
            .map(|s| (s.reference.clone(), s.name.clone()))
            .collect()
    }
}
