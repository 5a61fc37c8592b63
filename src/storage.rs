//! Per-device persistence
//!
//! Every television gets its own set of small files inside the storage root,
//! suffixed with the host address stripped of delimiters (`192.168.1.20`
//! becomes `key_192168120`). Failures here never block device control; callers
//! log them and carry on in memory.

use crate::error::Result;
use serde_json::Value;
use std::collections::BTreeMap;
use std::fs::{self, OpenOptions};
use std::io::{ErrorKind, Write};
use std::path::{Path, PathBuf};

/// The files kept for one device
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum StoredFile {
    PairingKey,
    SystemInfo,
    SoftwareInfo,
    Services,
    Apps,
    InputNames,
}

impl StoredFile {
    fn prefix(self) -> &'static str {
        match self {
            StoredFile::PairingKey => "key",
            StoredFile::SystemInfo => "system",
            StoredFile::SoftwareInfo => "software",
            StoredFile::Services => "services",
            StoredFile::Apps => "apps",
            StoredFile::InputNames => "inputs",
        }
    }
}

/// Durable storage for one device
#[derive(Debug, Clone)]
pub struct Storage {
    dir: PathBuf,
    suffix: String,
}

impl Storage {
    pub fn new(dir: impl Into<PathBuf>, host: &str) -> Self {
        Self {
            dir: dir.into(),
            suffix: host.chars().filter(|c| !matches!(c, '.' | ':')).collect(),
        }
    }

    pub fn dir(&self) -> &Path {
        &self.dir
    }

    /// Create the storage directory if needed
    pub fn ensure_dir(&self) -> Result<()> {
        fs::create_dir_all(&self.dir)?;
        Ok(())
    }

    pub fn path(&self, file: StoredFile) -> PathBuf {
        self.dir.join(format!("{}_{}", file.prefix(), self.suffix))
    }

    /// Stored pairing key, if one was issued before
    pub fn load_pairing_key(&self) -> Option<String> {
        match fs::read_to_string(self.path(StoredFile::PairingKey)) {
            Ok(key) => {
                let key = key.trim().to_string();
                (!key.is_empty()).then_some(key)
            }
            Err(e) if e.kind() == ErrorKind::NotFound => None,
            Err(e) => {
                tracing::warn!("Could not read pairing key from {}: {}", self.dir.display(), e);
                None
            }
        }
    }

    pub fn save_pairing_key(&self, key: &str) -> Result<()> {
        self.ensure_dir()?;
        fs::write(self.path(StoredFile::PairingKey), key)?;
        Ok(())
    }

    /// Write `value` unless the file already exists
    ///
    /// Returns `false` when an earlier copy was kept.
    pub fn write_once(&self, file: StoredFile, value: &Value) -> Result<bool> {
        self.ensure_dir()?;
        let mut handle = match OpenOptions::new()
            .write(true)
            .create_new(true)
            .open(self.path(file))
        {
            Ok(handle) => handle,
            Err(e) if e.kind() == ErrorKind::AlreadyExists => return Ok(false),
            Err(e) => return Err(e.into()),
        };
        handle.write_all(serde_json::to_string(value)?.as_bytes())?;
        Ok(true)
    }

    /// Read back a JSON file written earlier
    pub fn read_json(&self, file: StoredFile) -> Result<Value> {
        let text = fs::read_to_string(self.path(file))?;
        Ok(serde_json::from_str(&text)?)
    }

    /// Display-name overrides keyed by input reference
    pub fn load_input_names(&self) -> BTreeMap<String, String> {
        let path = self.path(StoredFile::InputNames);
        match fs::read_to_string(&path) {
            Ok(text) => serde_json::from_str(&text).unwrap_or_else(|e| {
                tracing::debug!("Ignoring unreadable input names in {}: {}", path.display(), e);
                BTreeMap::new()
            }),
            Err(e) => {
                if e.kind() != ErrorKind::NotFound {
                    tracing::debug!("Could not read {}: {}", path.display(), e);
                }
                BTreeMap::new()
            }
        }
    }

    pub fn save_input_names(&self, names: &BTreeMap<String, String>) -> Result<()> {
        self.ensure_dir()?;
        fs::write(self.path(StoredFile::InputNames), serde_json::to_string(names)?)?;
        Ok(())
    }
}
