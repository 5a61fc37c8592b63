//! Session transport
//!
//! Owns the WebSocket control session of one television: the registration
//! handshake with its pairing key, and the fixed-interval reconnect loop that
//! keeps trying until told to disconnect or the pairing is refused. Lifecycle
//! changes are published as [`TransportEvent`]s; deciding what they mean is
//! left to the supervisor.

use crate::config::ConnectionSettings;
use crate::connection::Connection;
use crate::context::lock;
use crate::error::{WebOsError, Result};
use crate::pointer::{ButtonSink, PointerSocket};
use crate::protocol::MessageKind;
use crate::storage::Storage;
use crate::subscription::Subscription;
use async_trait::async_trait;
use serde_json::Value;
use std::sync::{Arc, Mutex};
use std::time::Duration;
use tokio::sync::broadcast;
use tokio::task::JoinHandle;
use tokio::time::{sleep, timeout};
use tokio_util::sync::CancellationToken;

/// Lifecycle notifications from the transport
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum TransportEvent {
    /// A connection attempt has started
    Connecting,
    /// Session registered and usable
    Connected,
    /// The television shows a pairing prompt and waits for the user
    Prompt,
    /// An established session ended
    Closed,
    /// A connection attempt failed
    Error(String),
    /// The television refused registration; the reconnect loop has stopped
    PairingRejected,
}

/// Control session to a television
#[async_trait]
pub trait SessionTransport: Send + Sync {
    /// Receiver for lifecycle events emitted from now on
    fn events(&self) -> broadcast::Receiver<TransportEvent>;

    /// Start connecting, retrying until [`disconnect`](Self::disconnect); a
    /// no-op while already running
    async fn connect(&self);

    /// Stop retrying and close the current session
    async fn disconnect(&self);

    /// One-shot request over the current session
    async fn request(&self, uri: &str, payload: Option<Value>) -> Result<Value>;

    /// Subscribe to pushes from `uri` over the current session
    async fn subscribe(&self, uri: &str, payload: Option<Value>) -> Result<Subscription>;

    /// Fetch a socket path from `uri` and open it as a button channel
    async fn get_socket(&self, uri: &str) -> Result<Arc<dyn ButtonSink>>;
}

const EVENT_CAPACITY: usize = 32;

struct Inner {
    url: String,
    host: String,
    storage: Storage,
    settings: ConnectionSettings,
    pairing_key: Mutex<Option<String>>,
    events: broadcast::Sender<TransportEvent>,
    session: Mutex<Option<Arc<Connection>>>,
}

struct Runner {
    cancel: CancellationToken,
    handle: JoinHandle<()>,
}

/// [`SessionTransport`] speaking SSAP over WebSocket
pub struct WebOsTransport {
    inner: Arc<Inner>,
    runner: Mutex<Option<Runner>>,
}

impl WebOsTransport {
    /// Transport for the control session at `url`
    ///
    /// The pairing key is read from `storage` once, and written back whenever
    /// the television issues a new one.
    pub fn new(
        url: impl Into<String>,
        host: impl Into<String>,
        storage: Storage,
        settings: ConnectionSettings,
    ) -> Self {
        let (events, _) = broadcast::channel(EVENT_CAPACITY);
        let pairing_key = storage.load_pairing_key();
        Self {
            inner: Arc::new(Inner {
                url: url.into(),
                host: host.into(),
                storage,
                settings,
                pairing_key: Mutex::new(pairing_key),
                events,
                session: Mutex::new(None),
            }),
            runner: Mutex::new(None),
        }
    }

    /// Pairing key currently held, if any
    pub fn pairing_key(&self) -> Option<String> {
        lock(&self.inner.pairing_key).clone()
    }

    fn session(&self) -> Result<Arc<Connection>> {
        lock(&self.inner.session)
            .clone()
            .ok_or(WebOsError::NotConnected)
    }
}

#[async_trait]
impl SessionTransport for WebOsTransport {
    fn events(&self) -> broadcast::Receiver<TransportEvent> {
        self.inner.events.subscribe()
    }

    async fn connect(&self) {
        let mut runner = lock(&self.runner);
        if runner.as_ref().is_some_and(|r| !r.handle.is_finished()) {
            tracing::debug!("Transport for {} already running", self.inner.host);
            return;
        }

        let cancel = CancellationToken::new();
        let handle = tokio::spawn(run(self.inner.clone(), cancel.clone()));
        *runner = Some(Runner { cancel, handle });
    }

    async fn disconnect(&self) {
        let runner = lock(&self.runner).take();
        let session = lock(&self.inner.session).take();
        if let Some(connection) = session {
            connection.close();
        }

        if let Some(mut runner) = runner {
            runner.cancel.cancel();
            // Give it a moment to stop gracefully
            if timeout(Duration::from_millis(500), &mut runner.handle).await.is_err() {
                runner.handle.abort();
            }
            tracing::debug!("Transport for {} stopped", self.inner.host);
        }
    }

    async fn request(&self, uri: &str, payload: Option<Value>) -> Result<Value> {
        self.session()?.request(uri, payload).await
    }

    async fn subscribe(&self, uri: &str, payload: Option<Value>) -> Result<Subscription> {
        self.session()?.subscribe(uri, payload).await
    }

    async fn get_socket(&self, uri: &str) -> Result<Arc<dyn ButtonSink>> {
        let session = self.session()?;
        let reply = session.request(uri, None).await?;
        let path = reply
            .get("socketPath")
            .and_then(Value::as_str)
            .ok_or_else(|| WebOsError::InvalidResponse("No socketPath in reply".to_string()))?;

        let socket = PointerSocket::open(path, session.lifetime(), &self.inner.settings).await?;
        Ok(Arc::new(socket))
    }
}

impl Drop for WebOsTransport {
    fn drop(&mut self) {
        if let Some(runner) = lock(&self.runner).take() {
            runner.cancel.cancel();
        }
        if let Some(connection) = lock(&self.inner.session).take() {
            connection.close();
        }
    }
}

/// Reconnect loop, ends when `cancel` fires or the television refuses pairing
async fn run(inner: Arc<Inner>, cancel: CancellationToken) {
    loop {
        inner.emit(&cancel, TransportEvent::Connecting);

        let outcome = tokio::select! {
            _ = cancel.cancelled() => break,
            outcome = inner.open_session(&cancel) => outcome,
        };

        match outcome {
            Ok(connection) => {
                *lock(&inner.session) = Some(connection.clone());
                inner.emit(&cancel, TransportEvent::Connected);

                tokio::select! {
                    _ = cancel.cancelled() => {
                        inner.drop_session(&connection);
                        break;
                    }
                    _ = connection.closed() => {}
                }

                inner.drop_session(&connection);
                tracing::info!("Session to {} closed", inner.host);
                inner.emit(&cancel, TransportEvent::Closed);
            }
            Err(WebOsError::PairingRequired) => {
                tracing::warn!("Pairing refused by {}, not retrying until reconnected", inner.host);
                inner.emit(&cancel, TransportEvent::PairingRejected);
                break;
            }
            Err(e) => {
                if e.is_transient() {
                    tracing::debug!("Connecting to {} failed: {}", inner.host, e);
                } else {
                    tracing::warn!("Connecting to {} failed: {}", inner.host, e);
                }
                inner.emit(&cancel, TransportEvent::Error(e.to_string()));
            }
        }

        tokio::select! {
            _ = cancel.cancelled() => break,
            _ = sleep(inner.settings.reconnect_interval()) => {}
        }
    }
    tracing::debug!("Reconnect loop for {} finished", inner.host);
}

impl Inner {
    /// Publish an event unless the loop has been told to stop
    fn emit(&self, cancel: &CancellationToken, event: TransportEvent) {
        if cancel.is_cancelled() {
            return;
        }
        tracing::debug!("Transport {} event: {:?}", self.host, event);
        let _ = self.events.send(event);
    }

    fn drop_session(&self, connection: &Arc<Connection>) {
        let mut session = lock(&self.session);
        if session.as_ref().is_some_and(|s| Arc::ptr_eq(s, connection)) {
            *session = None;
        }
        connection.close();
    }

    /// Connect and run the registration handshake
    async fn open_session(&self, cancel: &CancellationToken) -> Result<Arc<Connection>> {
        let connection = Connection::connect(&self.url, &self.settings).await?;
        let known_key = lock(&self.pairing_key).clone();
        let mut replies = connection.register(known_key.as_deref()).await?;

        loop {
            let reply = replies.recv().await.ok_or(WebOsError::ConnectionClosed)?;
            match reply.kind {
                MessageKind::Registered => {
                    if let Some(key) = reply.client_key() {
                        self.remember_key(key, known_key.as_deref());
                    }
                    tracing::info!("Registered with {}", self.host);
                    return Ok(Arc::new(connection));
                }
                _ if reply.is_pairing_prompt() => {
                    tracing::info!("Please accept the pairing request on {}", self.host);
                    self.emit(cancel, TransportEvent::Prompt);
                }
                _ => {
                    if let Some(detail) = reply.error_message() {
                        tracing::warn!("Registration with {} refused: {}", self.host, detail);
                        return Err(WebOsError::PairingRequired);
                    }
                }
            }
        }
    }

    fn remember_key(&self, key: &str, known: Option<&str>) {
        if known == Some(key) {
            return;
        }
        *lock(&self.pairing_key) = Some(key.to_string());
        match self.storage.save_pairing_key(key) {
            Ok(()) => tracing::info!("Stored new pairing key for {}", self.host),
            Err(e) => tracing::warn!("Could not store pairing key for {}: {}", self.host, e),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use tempfile::TempDir;

    fn transport(temp: &TempDir) -> WebOsTransport {
        WebOsTransport::new(
            "ws://127.0.0.1:1",
            "127.0.0.1",
            Storage::new(temp.path(), "127.0.0.1"),
            ConnectionSettings::default(),
        )
    }

    #[tokio::test]
    async fn requests_fail_fast_without_session() {
        let temp = TempDir::new().unwrap();
        let transport = transport(&temp);

        assert!(matches!(
            transport.request("ssap://audio/getVolume", None).await,
            Err(WebOsError::NotConnected)
        ));
        assert!(matches!(
            transport.get_socket("ssap://x").await,
            Err(WebOsError::NotConnected)
        ));
    }

    #[tokio::test]
    async fn stored_pairing_key_is_loaded() {
        let temp = TempDir::new().unwrap();
        Storage::new(temp.path(), "127.0.0.1")
            .save_pairing_key("abc")
            .unwrap();

        assert_eq!(transport(&temp).pairing_key().as_deref(), Some("abc"));
    }

    #[tokio::test]
    async fn disconnect_without_connect_is_harmless() {
        let temp = TempDir::new().unwrap();
        let transport = transport(&temp);
        transport.disconnect().await;
        transport.disconnect().await;
    }
}
