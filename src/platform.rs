//! Registry of managed televisions

use crate::config::PlatformConfig;
use crate::device::TvDevice;
use crate::error::Result;
use std::collections::BTreeMap;

/// All televisions of one configuration, keyed by host
pub struct Platform {
    devices: BTreeMap<String, TvDevice>,
}

impl Platform {
    /// Start a [`TvDevice`] for every usable entry in `config`
    ///
    /// Entries without a name or host are skipped with a warning, as is a
    /// second entry for a host that is already managed.
    pub fn launch(config: &PlatformConfig) -> Result<Self> {
        let root = config.storage_root()?;
        let mut devices = BTreeMap::new();

        for device in &config.devices {
            if let Err(e) = device.validate() {
                tracing::warn!("Skipping device entry: {}", e);
                continue;
            }
            if devices.contains_key(&device.host) {
                tracing::warn!("Skipping duplicate device entry for {}", device.host);
                continue;
            }
            devices.insert(device.host.clone(), TvDevice::spawn(device, &root));
        }

        tracing::info!("Managing {} device(s)", devices.len());
        Ok(Self { devices })
    }

    pub fn device(&self, host: &str) -> Option<&TvDevice> {
        self.devices.get(host)
    }

    pub fn devices(&self) -> impl Iterator<Item = &TvDevice> {
        self.devices.values()
    }

    pub fn len(&self) -> usize {
        self.devices.len()
    }

    pub fn is_empty(&self) -> bool {
        self.devices.is_empty()
    }

    /// Shut every device down
    pub async fn shutdown(&self) {
        for device in self.devices.values() {
            device.shutdown().await;
        }
    }
}
