//! State shared between the supervisor, the session task and command handlers

use crate::config::ConnectionSettings;
use crate::error::{WebOsError, Result};
use crate::pointer::PointerChannel;
use crate::state::{ConnectionState, DeviceStateSnapshot};
use crate::storage::Storage;
use crate::transport::SessionTransport;
use crate::types::{DeviceProfile, InputCatalog};
use std::sync::atomic::AtomicBool;
use std::sync::{Arc, Mutex, MutexGuard};
use tokio::sync::watch;

/// Lock a std mutex, recovering the data if a holder panicked
pub(crate) fn lock<T>(mutex: &Mutex<T>) -> MutexGuard<'_, T> {
    mutex.lock().unwrap_or_else(|e| e.into_inner())
}

/// Everything one television's tasks share
pub(crate) struct DeviceContext {
    pub host: String,
    pub switch_info_menu: bool,
    pub settings: ConnectionSettings,
    pub profile: Mutex<DeviceProfile>,
    pub snapshot: Mutex<DeviceStateSnapshot>,
    pub inputs: Mutex<InputCatalog>,
    /// Set once the device summary has been logged
    pub announced: AtomicBool,
    /// Written only by the supervisor task
    pub link: watch::Sender<ConnectionState>,
    pub pointer: PointerChannel,
    pub storage: Storage,
    pub transport: Arc<dyn SessionTransport>,
}

impl DeviceContext {
    pub fn snapshot(&self) -> DeviceStateSnapshot {
        lock(&self.snapshot).clone()
    }

    /// Apply `f` to the cached state
    pub fn update<R>(&self, f: impl FnOnce(&mut DeviceStateSnapshot) -> R) -> R {
        f(&mut lock(&self.snapshot))
    }

    pub fn connection_state(&self) -> ConnectionState {
        *self.link.borrow()
    }

    /// Fail fast unless a session is established
    pub fn ensure_connected(&self) -> Result<()> {
        match self.connection_state() {
            ConnectionState::Connected => Ok(()),
            _ => Err(WebOsError::NotConnected),
        }
    }
}
