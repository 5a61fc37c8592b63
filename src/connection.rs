use crate::config::ConnectionSettings;
use crate::error::{WebOsError, Result};
use crate::protocol::{Request, Response};
use crate::subscription::Subscription;
use futures_util::{SinkExt, StreamExt};
use serde_json::Value;
use std::collections::HashMap;
use std::sync::Arc;
use std::time::Duration;
use tokio::sync::{mpsc, oneshot, Mutex};
use tokio::time::timeout;
use tokio_tungstenite::{connect_async, tungstenite::Message};
use tokio_util::sync::CancellationToken;

/// Where a reply for a given message id goes
enum Route {
    /// One-shot request waiting for a single reply
    Reply(oneshot::Sender<Response>),
    /// Subscription or handshake receiving every message with this id
    Stream(mpsc::UnboundedSender<Response>),
}

/// Routing table shared between callers and the read task
struct Routes {
    pending: HashMap<String, Route>,
    /// Channel for sending outgoing messages
    ws_tx: mpsc::UnboundedSender<Message>,
}

/// One live WebSocket control session
///
/// Replies are correlated by message id. Closing the connection (locally, by
/// the television, or through keep-alive expiry) drops every pending route so
/// waiters resolve with [`WebOsError::ConnectionClosed`].
pub(crate) struct Connection {
    routes: Arc<Mutex<Routes>>,
    closed: CancellationToken,
    request_timeout: Duration,
}

impl Connection {
    /// Connect to a WebSocket URL
    pub async fn connect(url: &str, settings: &ConnectionSettings) -> Result<Self> {
        tracing::info!("Connecting to {}", url);

        let (ws_stream, _) = match timeout(settings.request_timeout(), connect_async(url)).await {
            Ok(result) => result?,
            Err(_) => return Err(WebOsError::Timeout),
        };
        let (mut write, mut read) = ws_stream.split();

        let (ws_tx, mut ws_rx) = mpsc::unbounded_channel::<Message>();
        let routes = Arc::new(Mutex::new(Routes {
            pending: HashMap::new(),
            ws_tx,
        }));
        let closed = CancellationToken::new();

        // Forward outgoing messages and keep-alive pings to the socket
        let writer_closed = closed.clone();
        let keep_alive = settings.keep_alive();
        tokio::spawn(async move {
            let mut ping = tokio::time::interval(keep_alive);
            ping.tick().await;
            loop {
                tokio::select! {
                    _ = writer_closed.cancelled() => {
                        let _ = write.close().await;
                        break;
                    }
                    msg = ws_rx.recv() => {
                        let Some(msg) = msg else { break };
                        if let Err(e) = write.send(msg).await {
                            tracing::error!("Failed to send message: {}", e);
                            writer_closed.cancel();
                            break;
                        }
                    }
                    _ = ping.tick() => {
                        if let Err(e) = write.send(Message::Ping(Vec::new())).await {
                            tracing::warn!("Keep-alive ping failed: {}", e);
                            writer_closed.cancel();
                            break;
                        }
                    }
                }
            }
        });

        // Receive and route incoming messages until the socket goes quiet or closes
        let reader_routes = routes.clone();
        let reader_closed = closed.clone();
        let idle_limit = keep_alive * 3;
        tokio::spawn(async move {
            loop {
                let frame = tokio::select! {
                    _ = reader_closed.cancelled() => break,
                    frame = timeout(idle_limit, read.next()) => frame,
                };
                match frame {
                    Ok(Some(Ok(Message::Text(text)))) => {
                        if let Err(e) = Self::handle_message(&reader_routes, text).await {
                            tracing::error!("Error handling message: {}", e);
                        }
                    }
                    Ok(Some(Ok(Message::Close(_)))) => {
                        tracing::info!("WebSocket connection closed");
                        break;
                    }
                    Ok(Some(Err(e))) => {
                        tracing::error!("WebSocket error: {}", e);
                        break;
                    }
                    Ok(None) => {
                        tracing::info!("WebSocket stream ended");
                        break;
                    }
                    Ok(Some(Ok(_))) => {}
                    Err(_) => {
                        tracing::warn!("No traffic for {:?}, dropping connection", idle_limit);
                        break;
                    }
                }
            }

            // Connection closed, cancel all pending requests and subscriptions
            reader_closed.cancel();
            let mut routes = reader_routes.lock().await;
            routes.pending.clear();
        });

        Ok(Self {
            routes,
            closed,
            request_timeout: settings.request_timeout(),
        })
    }

    /// Handle an incoming message
    async fn handle_message(routes: &Arc<Mutex<Routes>>, text: String) -> Result<()> {
        tracing::debug!("Received: {}", text);

        let response: Response = serde_json::from_str(&text)?;
        let Some(id) = response.id.clone() else {
            tracing::debug!("Ignoring message without id");
            return Ok(());
        };

        let mut routes = routes.lock().await;
        match routes.pending.remove(&id) {
            Some(Route::Reply(tx)) => {
                let _ = tx.send(response);
            }
            Some(Route::Stream(tx)) => {
                // Keep the route while someone is still listening
                if tx.send(response).is_ok() {
                    routes.pending.insert(id, Route::Stream(tx));
                }
            }
            None => tracing::debug!("Dropping message for unknown id {}", id),
        }

        Ok(())
    }

    /// Register a route for the request and put it on the wire
    async fn dispatch(&self, request: &Request, route: Route) -> Result<()> {
        let json = serde_json::to_string(request)?;

        let mut routes = self.routes.lock().await;
        if self.closed.is_cancelled() {
            return Err(WebOsError::ConnectionClosed);
        }
        routes.pending.insert(request.id().to_string(), route);

        tracing::debug!("Sending: {}", json);
        if routes.ws_tx.send(Message::Text(json)).is_err() {
            routes.pending.remove(request.id());
            return Err(WebOsError::ConnectionClosed);
        }
        Ok(())
    }

    /// Send a request and wait for the response
    pub async fn request(&self, uri: &str, payload: Option<Value>) -> Result<Value> {
        let mut request = Request::new(uri);
        if let Some(payload) = payload {
            request = request.with_payload(payload);
        }

        let (tx, rx) = oneshot::channel();
        self.dispatch(&request, Route::Reply(tx)).await?;

        let response = match timeout(self.request_timeout, rx).await {
            Ok(Ok(response)) => response,
            Ok(Err(_)) => return Err(WebOsError::ConnectionClosed),
            Err(_) => {
                // Timeout - remove from pending requests
                let mut routes = self.routes.lock().await;
                routes.pending.remove(request.id());
                return Err(WebOsError::Timeout);
            }
        };

        response.into_result()
    }

    /// Subscribe to repeated pushes from an endpoint
    pub async fn subscribe(&self, uri: &str, payload: Option<Value>) -> Result<Subscription> {
        let mut request = Request::subscribe(uri);
        if let Some(payload) = payload {
            request = request.with_payload(payload);
        }

        let (tx, rx) = mpsc::unbounded_channel();
        self.dispatch(&request, Route::Stream(tx)).await?;
        Ok(Subscription::new(uri, rx))
    }

    /// Start the registration handshake; every reply to it is streamed back
    pub async fn register(&self, client_key: Option<&str>) -> Result<mpsc::UnboundedReceiver<Response>> {
        let request = Request::register(client_key);
        let (tx, rx) = mpsc::unbounded_channel();
        self.dispatch(&request, Route::Stream(tx)).await?;
        Ok(rx)
    }

    /// Token cancelled when this connection ends
    pub fn lifetime(&self) -> &CancellationToken {
        &self.closed
    }

    /// Wait until the connection has closed
    pub async fn closed(&self) {
        self.closed.cancelled().await
    }

    /// Close the connection and cancel every pending waiter
    pub fn close(&self) {
        self.closed.cancel();
    }
}

impl Drop for Connection {
    fn drop(&mut self) {
        self.closed.cancel();
    }
}
