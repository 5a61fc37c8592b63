use crate::config::DeviceConfig;
use crate::context::{lock, DeviceContext};
use crate::error::{WebOsError, Result};
use crate::keys::{overlay_button, PowerModeSelection, RemoteKey, VolumeSelector};
use crate::pointer::PointerChannel;
use crate::probe::{Prober, TcpProber};
use crate::protocol::uri;
use crate::state::{ConnectionState, DeviceStateSnapshot};
use crate::storage::Storage;
use crate::supervisor::{self, Event};
use crate::transport::{SessionTransport, WebOsTransport};
use crate::types::{DeviceProfile, InputCatalog};
use crate::wol::{MagicPacketWaker, WakeOnLan};
use serde_json::json;
use std::path::Path;
use std::sync::atomic::AtomicBool;
use std::sync::{Arc, Mutex};
use tokio::sync::{mpsc, watch};
use tokio::task::JoinHandle;
use tokio_util::sync::CancellationToken;

/// External capabilities a device is driven through
pub struct Collaborators {
    pub transport: Arc<dyn SessionTransport>,
    pub prober: Arc<dyn Prober>,
    pub waker: Arc<dyn WakeOnLan>,
}

/// One managed television
///
/// Owns the connection supervisor and prober for the device and exposes its
/// cached state and command surface. Setters compare against the cached value
/// first and send nothing when it already matches; otherwise they require an
/// established session and fail fast with [`WebOsError::NotConnected`].
/// Switching the power on is the exception, it goes out as Wake-on-LAN.
///
/// # Example
///
/// ```no_run
/// use lgwebos_tv::{DeviceConfig, TvDevice};
///
/// #[tokio::main]
/// async fn main() -> Result<(), Box<dyn std::error::Error>> {
///     let config = DeviceConfig::new("Living Room", "192.168.1.20", "a8:23:fe:01:02:03");
///     let tv = TvDevice::spawn(&config, "/var/lib/lgwebos");
///
///     let mut state = tv.watch_connection_state();
///     state.wait_for(|s| s.is_connected()).await?;
///
///     tv.set_mute(true).await?;
///     tv.shutdown().await;
///     Ok(())
/// }
/// ```
pub struct TvDevice {
    ctx: Arc<DeviceContext>,
    waker: Arc<dyn WakeOnLan>,
    events: mpsc::UnboundedSender<Event>,
    cancel: CancellationToken,
    tasks: Mutex<Vec<JoinHandle<()>>>,
}

impl TvDevice {
    /// Start managing the television described by `config`
    ///
    /// Pairing keys and metadata go below `storage_root`. Must be called from
    /// within a tokio runtime.
    pub fn spawn(config: &DeviceConfig, storage_root: impl AsRef<Path>) -> Self {
        let storage = Storage::new(storage_root.as_ref(), &config.host);
        let profile = DeviceProfile::from_config(config);
        let transport = WebOsTransport::new(
            profile.url(),
            config.host.clone(),
            storage.clone(),
            config.connection.clone(),
        );

        Self::spawn_with(
            config,
            storage,
            Collaborators {
                transport: Arc::new(transport),
                prober: Arc::new(TcpProber),
                waker: Arc::new(MagicPacketWaker::new()),
            },
        )
    }

    /// Start managing a television through the given collaborators
    pub fn spawn_with(config: &DeviceConfig, storage: Storage, collaborators: Collaborators) -> Self {
        if let Err(e) = storage.ensure_dir() {
            tracing::warn!(
                "Device {} storage {} unavailable: {}",
                config.host,
                storage.dir().display(),
                e
            );
        }
        let inputs = InputCatalog::load(&config.inputs, &storage.load_input_names());
        let (link, _) = watch::channel(ConnectionState::Probing);

        let ctx = Arc::new(DeviceContext {
            host: config.host.clone(),
            switch_info_menu: config.switch_info_menu,
            settings: config.connection.clone(),
            profile: Mutex::new(DeviceProfile::from_config(config)),
            snapshot: Mutex::new(DeviceStateSnapshot::default()),
            inputs: Mutex::new(inputs),
            announced: AtomicBool::new(false),
            link,
            pointer: PointerChannel::new(),
            storage,
            transport: collaborators.transport,
        });

        let cancel = CancellationToken::new();
        let (events, tasks) = supervisor::spawn(ctx.clone(), collaborators.prober, cancel.clone());
        tracing::info!("Device {} ({}) managed", config.host, config.name);

        Self {
            ctx,
            waker: collaborators.waker,
            events,
            cancel,
            tasks: Mutex::new(tasks),
        }
    }

    pub fn host(&self) -> &str {
        &self.ctx.host
    }

    /// Identity of the television, refined once connected
    pub fn profile(&self) -> DeviceProfile {
        lock(&self.ctx.profile).clone()
    }

    /// Latest cached state
    pub fn snapshot(&self) -> DeviceStateSnapshot {
        self.ctx.snapshot()
    }

    pub fn connection_state(&self) -> ConnectionState {
        self.ctx.connection_state()
    }

    /// Receiver that sees every published connection state change
    pub fn watch_connection_state(&self) -> watch::Receiver<ConnectionState> {
        self.ctx.link.subscribe()
    }

    /// Configured inputs with their current display names
    pub fn inputs(&self) -> InputCatalog {
        lock(&self.ctx.inputs).clone()
    }

    /// Whether remote-control buttons can be sent right now
    pub fn pointer_available(&self) -> bool {
        self.ctx.pointer.is_available()
    }

    /// Stop probing, close the session and wait for the background tasks
    pub async fn shutdown(&self) {
        self.cancel.cancel();
        let tasks = std::mem::take(&mut *lock(&self.tasks));
        for task in tasks {
            let _ = task.await;
        }
        tracing::info!("Device {} released", self.ctx.host);
    }

    // ========== Power ==========

    pub fn power(&self) -> bool {
        self.ctx.snapshot().power_on
    }

    /// Switch the television on or off
    ///
    /// On is a Wake-on-LAN broadcast and works without a session. Off sends
    /// `turnOff` and drops the session straight away.
    pub async fn set_power(&self, on: bool) -> Result<()> {
        if self.power() == on {
            return Ok(());
        }

        if on {
            let mac = lock(&self.ctx.profile).mac.clone();
            self.waker.wake(&mac).await?;
            self.ctx.update(|s| s.power_on = true);
            tracing::info!("Device {} power set to ON", self.ctx.host);
        } else {
            self.ctx.ensure_connected()?;
            self.ctx.transport.request(uri::TURN_OFF, None).await?;
            self.ctx.update(|s| s.power_on = false);
            tracing::info!("Device {} power set to STANDBY", self.ctx.host);
            let _ = self.events.send(Event::Teardown);
        }
        Ok(())
    }

    // ========== Audio ==========

    pub fn muted(&self) -> bool {
        self.ctx.snapshot().muted
    }

    pub async fn set_mute(&self, muted: bool) -> Result<()> {
        if self.muted() == muted {
            return Ok(());
        }
        self.ctx.ensure_connected()?;
        self.ctx
            .transport
            .request(uri::SET_MUTE, Some(json!({ "mute": muted })))
            .await?;
        self.ctx.update(|s| s.muted = muted);
        tracing::info!("Device {} mute set to {}", self.ctx.host, if muted { "ON" } else { "OFF" });
        Ok(())
    }

    pub fn volume(&self) -> i32 {
        self.ctx.snapshot().volume
    }

    /// Set the absolute volume
    pub async fn set_volume(&self, volume: i32) -> Result<()> {
        if self.volume() == volume {
            return Ok(());
        }
        self.ctx.ensure_connected()?;
        self.ctx
            .transport
            .request(uri::SET_VOLUME, Some(json!({ "volume": volume })))
            .await?;
        self.ctx.update(|s| s.volume = volume);
        tracing::info!("Device {} volume set to {}", self.ctx.host, volume);
        Ok(())
    }

    /// Step the volume with the remote's volume buttons
    ///
    /// The cache follows once the television pushes the new level.
    pub async fn volume_selector(&self, selector: VolumeSelector) -> Result<()> {
        self.ctx.ensure_connected()?;
        self.ctx.pointer.send_button(selector.button()).await?;
        tracing::debug!("Device {} sent {}", self.ctx.host, selector.button());
        Ok(())
    }

    // ========== Inputs ==========

    /// Index of the input in the foreground; `None` while off or for apps
    /// outside the configured list
    pub fn active_input(&self) -> Option<usize> {
        let snapshot = self.ctx.snapshot();
        if !snapshot.power_on {
            return None;
        }
        let app = snapshot.foreground_app_id?;
        lock(&self.ctx.inputs).index_of(&app)
    }

    /// Select the configured input at `index`
    pub async fn set_active_input(&self, index: usize) -> Result<()> {
        let reference = lock(&self.ctx.inputs)
            .get(index)
            .map(|source| source.reference.clone())
            .ok_or(WebOsError::UnknownInput(index))?;
        self.set_input(&reference).await
    }

    /// Bring the app or input `reference` to the foreground
    pub async fn set_input(&self, reference: &str) -> Result<()> {
        if self.ctx.snapshot().foreground_app_id.as_deref() == Some(reference) {
            return Ok(());
        }
        self.ctx.ensure_connected()?;
        self.ctx
            .transport
            .request(uri::LAUNCH, Some(json!({ "id": reference })))
            .await?;
        self.ctx
            .update(|s| s.foreground_app_id = Some(reference.to_string()));
        tracing::info!("Device {} input set to {}", self.ctx.host, reference);
        Ok(())
    }

    /// Give an input a new display name and persist it
    pub fn rename_input(&self, reference: &str, name: &str) -> Result<()> {
        let names = {
            let mut inputs = lock(&self.ctx.inputs);
            if !inputs.rename(reference, name) {
                return Err(WebOsError::UnknownReference(reference.to_string()));
            }
            inputs.names()
        };

        if let Err(e) = self.ctx.storage.save_input_names(&names) {
            tracing::warn!("Device {} could not save input names: {}", self.ctx.host, e);
        }
        tracing::info!("Device {} input {} renamed to {}", self.ctx.host, reference, name);
        Ok(())
    }

    // ========== Channels ==========

    /// Current channel number; `None` while off
    pub fn channel(&self) -> Option<String> {
        let snapshot = self.ctx.snapshot();
        if snapshot.power_on {
            snapshot.channel_number
        } else {
            None
        }
    }

    pub async fn set_channel(&self, number: &str) -> Result<()> {
        if self.ctx.snapshot().channel_number.as_deref() == Some(number) {
            return Ok(());
        }
        self.ctx.ensure_connected()?;
        self.ctx
            .transport
            .request(uri::OPEN_CHANNEL, Some(json!({ "channelNumber": number })))
            .await?;
        self.ctx.update(|s| {
            s.channel_number = Some(number.to_string());
            s.channel_name = None;
        });
        tracing::info!("Device {} channel set to {}", self.ctx.host, number);
        Ok(())
    }

    // ========== Remote ==========

    /// Press a remote-control key
    ///
    /// Keys without a matching button are accepted and ignored.
    pub async fn remote_key(&self, key: RemoteKey) -> Result<()> {
        let paused = self.ctx.snapshot().paused;
        let button = key.button(paused, self.ctx.switch_info_menu);
        if button.is_empty() {
            tracing::debug!("Device {} has no button for {:?}", self.ctx.host, key);
            return Ok(());
        }

        self.ctx.ensure_connected()?;
        self.ctx.pointer.send_button(button).await?;
        if key == RemoteKey::PlayPause {
            self.ctx.update(|s| s.paused = !paused);
        }
        tracing::debug!("Device {} sent {}", self.ctx.host, button);
        Ok(())
    }

    /// Press a remote key by its numeric code
    pub async fn remote_key_code(&self, code: u8) -> Result<()> {
        match RemoteKey::from_code(code) {
            Some(key) => self.remote_key(key).await,
            None => {
                tracing::debug!("Device {} ignoring unmapped remote key {}", self.ctx.host, code);
                Ok(())
            }
        }
    }

    /// Show or hide the on-screen info overlay
    pub async fn set_power_mode_selection(&self, selection: PowerModeSelection) -> Result<()> {
        let visible = self.ctx.snapshot().info_overlay_visible;
        if visible == (selection == PowerModeSelection::Show) {
            return Ok(());
        }

        self.ctx.ensure_connected()?;
        let button = overlay_button(visible, self.ctx.switch_info_menu);
        self.ctx.pointer.send_button(button).await?;
        self.ctx.update(|s| s.info_overlay_visible = !visible);
        tracing::debug!("Device {} sent {}", self.ctx.host, button);
        Ok(())
    }
}

impl Drop for TvDevice {
    fn drop(&mut self) {
        self.cancel.cancel();
    }
}
