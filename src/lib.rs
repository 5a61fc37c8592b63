//! Rust library keeping a persistent control session to LG webOS televisions
//!
//! This library provides an async API for managing LG webOS televisions on the
//! local network. For every configured television it:
//!
//! - Probes the control port to learn whether the television is reachable
//! - Connects the SSAP control session and handles the pairing key
//! - Mirrors power, mute, volume, foreground app and channel through subscriptions
//! - Sends remote-control buttons over the pointer input socket
//! - Switches the television on with Wake-on-LAN
//! - Persists pairing keys, discovered metadata and input names
//!
//! # Quick Start
//!
//! ```no_run
//! use lgwebos_tv::{Platform, PlatformConfig};
//!
//! #[tokio::main]
//! async fn main() -> Result<(), Box<dyn std::error::Error>> {
//!     let config = PlatformConfig::from_json(
//!         r#"{"devices": [{"name": "Living Room", "host": "192.168.1.20", "mac": "a8:23:fe:01:02:03"}]}"#,
//!     )?;
//!     let platform = Platform::launch(&config)?;
//!
//!     if let Some(tv) = platform.device("192.168.1.20") {
//!         tv.watch_connection_state()
//!             .wait_for(|state| state.is_connected())
//!             .await?;
//!         tv.set_volume(12).await?;
//!         println!("Input: {:?}", tv.active_input());
//!     }
//!
//!     platform.shutdown().await;
//!     Ok(())
//! }
//! ```
//!
//! # Architecture
//!
//! The library is organized into several layers:
//!
//! - **Platform**: One [`TvDevice`] per configured television
//! - **Device**: Command handlers over the cached state
//! - **Supervisor**: State machine joining reachability and session lifecycle
//! - **Transport**: Control session, pairing and reconnect loop
//! - **Connection**: Low-level WebSocket request/subscription routing
//! - **Protocol**: SSAP message structures and endpoints

mod bootstrap;
mod config;
mod connection;
mod context;
mod device;
mod error;
mod keys;
mod platform;
mod pointer;
mod probe;
mod protocol;
mod state;
mod storage;
mod subscription;
mod supervisor;
mod transport;
mod types;
mod wol;

#[cfg(test)]
mod testing;

// Public exports
pub use config::{ConnectionSettings, DeviceConfig, InputConfig, PlatformConfig, CONTROL_PORT};
pub use device::{Collaborators, TvDevice};
pub use error::{Result, WebOsError};
pub use keys::{PowerModeSelection, RemoteKey, VolumeSelector};
pub use platform::Platform;
pub use pointer::{ButtonSink, PointerSocket};
pub use probe::{Prober, TcpProber};
pub use protocol::uri;
pub use state::{ConnectionState, DeviceStateSnapshot, Feed};
pub use storage::{Storage, StoredFile};
pub use subscription::Subscription;
pub use supervisor::{transition, Action, Event, Link};
pub use transport::{SessionTransport, TransportEvent, WebOsTransport};
pub use types::{DeviceProfile, InputCatalog, InputSource};
pub use wol::{MacAddress, MagicPacketWaker, WakeOnLan};
