//! Pointer/button channel
//!
//! The television exposes a second WebSocket for remote-control button events.
//! Its address comes from a request over the control session, and it dies with
//! that session: a new one has to be fetched after every reconnect.

use crate::config::ConnectionSettings;
use crate::context::lock;
use crate::error::{WebOsError, Result};
use crate::protocol::button_frame;
use async_trait::async_trait;
use futures_util::{SinkExt, StreamExt};
use std::sync::{Arc, Mutex};
use tokio::sync::mpsc;
use tokio::time::timeout;
use tokio_tungstenite::{connect_async, tungstenite::Message};
use tokio_util::sync::CancellationToken;

/// Something that can deliver remote-control button presses
#[async_trait]
pub trait ButtonSink: Send + Sync {
    /// Send one button press, e.g. `"UP"` or `"ENTER"`
    async fn send_button(&self, name: &str) -> Result<()>;
}

/// WebSocket connection to the television's pointer input socket
pub struct PointerSocket {
    tx: mpsc::UnboundedSender<Message>,
    closed: CancellationToken,
}

impl PointerSocket {
    /// Open the pointer socket at `socket_path`
    ///
    /// `session` is the lifetime of the control session that handed out the
    /// path; the socket closes as soon as that session ends.
    pub(crate) async fn open(
        socket_path: &str,
        session: &CancellationToken,
        settings: &ConnectionSettings,
    ) -> Result<Self> {
        tracing::debug!("Connecting to pointer socket {}", socket_path);

        let (ws_stream, _) = match timeout(settings.request_timeout(), connect_async(socket_path)).await {
            Ok(result) => result?,
            Err(_) => return Err(WebOsError::Timeout),
        };
        let (mut write, mut read) = ws_stream.split();
        let (tx, mut rx) = mpsc::unbounded_channel::<Message>();
        let closed = session.child_token();

        let writer_closed = closed.clone();
        tokio::spawn(async move {
            loop {
                tokio::select! {
                    _ = writer_closed.cancelled() => {
                        let _ = write.close().await;
                        break;
                    }
                    msg = rx.recv() => {
                        let Some(msg) = msg else { break };
                        if let Err(e) = write.send(msg).await {
                            tracing::warn!("Pointer socket send failed: {}", e);
                            writer_closed.cancel();
                            break;
                        }
                    }
                }
            }
        });

        // The television never sends anything useful here; watch for the close
        let reader_closed = closed.clone();
        tokio::spawn(async move {
            loop {
                tokio::select! {
                    _ = reader_closed.cancelled() => break,
                    frame = read.next() => match frame {
                        Some(Ok(Message::Close(_))) | Some(Err(_)) | None => break,
                        Some(Ok(_)) => {}
                    },
                }
            }
            tracing::debug!("Pointer socket closed");
            reader_closed.cancel();
        });

        Ok(Self { tx, closed })
    }

    /// Whether the socket can still carry button presses
    pub fn is_open(&self) -> bool {
        !self.closed.is_cancelled()
    }
}

#[async_trait]
impl ButtonSink for PointerSocket {
    async fn send_button(&self, name: &str) -> Result<()> {
        if !self.is_open() {
            return Err(WebOsError::PointerUnavailable);
        }
        self.tx
            .send(Message::Text(button_frame(name)))
            .map_err(|_| WebOsError::PointerUnavailable)
    }
}

impl Drop for PointerSocket {
    fn drop(&mut self) {
        self.closed.cancel();
    }
}

struct Slot {
    generation: u64,
    socket: Option<Arc<dyn ButtonSink>>,
}

/// Holder for the current session's pointer socket
///
/// Every session gets a generation number. A socket fetched for an older
/// generation is refused, so a slow bootstrap can never resurrect a channel
/// that belongs to a session which has already been torn down.
pub(crate) struct PointerChannel {
    slot: Mutex<Slot>,
}

impl PointerChannel {
    pub fn new() -> Self {
        Self {
            slot: Mutex::new(Slot {
                generation: 0,
                socket: None,
            }),
        }
    }

    /// Start a new session, dropping any socket still held
    pub fn begin(&self) -> u64 {
        let mut slot = lock(&self.slot);
        slot.generation += 1;
        slot.socket = None;
        slot.generation
    }

    /// Drop the socket and invalidate the current generation
    pub fn clear(&self) {
        let mut slot = lock(&self.slot);
        slot.generation += 1;
        slot.socket = None;
    }

    /// Install a socket for `generation`; returns false if that session is gone
    pub fn install(&self, generation: u64, socket: Arc<dyn ButtonSink>) -> bool {
        let mut slot = lock(&self.slot);
        if slot.generation != generation {
            return false;
        }
        slot.socket = Some(socket);
        true
    }

    pub fn is_available(&self) -> bool {
        lock(&self.slot).socket.is_some()
    }

    /// Send a button press on the current socket
    pub async fn send_button(&self, name: &str) -> Result<()> {
        let socket = lock(&self.slot)
            .socket
            .clone()
            .ok_or(WebOsError::PointerUnavailable)?;
        socket.send_button(name).await
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::testing::RecordingButtons;

    #[tokio::test]
    async fn empty_channel_refuses_buttons() {
        let channel = PointerChannel::new();
        assert!(!channel.is_available());
        assert!(matches!(
            channel.send_button("UP").await,
            Err(WebOsError::PointerUnavailable)
        ));
    }

    #[tokio::test]
    async fn installed_socket_receives_buttons() {
        let channel = PointerChannel::new();
        let buttons = RecordingButtons::new();
        let generation = channel.begin();

        assert!(channel.install(generation, buttons.clone()));
        channel.send_button("ENTER").await.unwrap();

        assert_eq!(buttons.pressed(), vec!["ENTER".to_string()]);
    }

    #[tokio::test]
    async fn stale_generation_is_refused() {
        let channel = PointerChannel::new();
        let buttons = RecordingButtons::new();
        let generation = channel.begin();
        channel.clear();

        assert!(!channel.install(generation, buttons.clone()));
        assert!(!channel.is_available());
    }

    #[tokio::test]
    async fn clear_drops_installed_socket() {
        let channel = PointerChannel::new();
        let generation = channel.begin();
        channel.install(generation, RecordingButtons::new());

        channel.clear();

        assert!(matches!(
            channel.send_button("BACK").await,
            Err(WebOsError::PointerUnavailable)
        ));
    }
}
