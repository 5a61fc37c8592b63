//! Test doubles for the collaborator traits

use crate::context::lock;
use crate::error::{WebOsError, Result};
use crate::pointer::ButtonSink;
use crate::probe::Prober;
use crate::protocol::Response;
use crate::subscription::Subscription;
use crate::transport::{SessionTransport, TransportEvent};
use crate::wol::WakeOnLan;
use async_trait::async_trait;
use serde_json::{json, Value};
use std::collections::HashMap;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::{Arc, Mutex};
use std::time::Duration;
use tokio::sync::{broadcast, mpsc};

/// Outbound call seen by [`MockTransport`]
#[derive(Debug, Clone, PartialEq)]
pub(crate) enum Call {
    Connect,
    Disconnect,
    Request { uri: String, payload: Option<Value> },
    Subscribe(String),
    GetSocket(String),
}

enum Scripted {
    Reply(Value),
    Fail(String),
}

/// Transport that records every call and answers from a script
pub(crate) struct MockTransport {
    calls: Mutex<Vec<Call>>,
    scripted: Mutex<HashMap<String, Scripted>>,
    feeds: Mutex<HashMap<String, mpsc::UnboundedSender<Response>>>,
    events: broadcast::Sender<TransportEvent>,
    buttons: Arc<RecordingButtons>,
    socket_available: AtomicBool,
    auto_connect: bool,
}

impl MockTransport {
    /// Reports `Connected` as soon as it is asked to connect
    pub fn new() -> Arc<Self> {
        Self::build(true)
    }

    /// Only emits the events a test sends through [`emit`](Self::emit)
    pub fn manual() -> Arc<Self> {
        Self::build(false)
    }

    fn build(auto_connect: bool) -> Arc<Self> {
        let (events, _) = broadcast::channel(32);
        Arc::new(Self {
            calls: Mutex::new(Vec::new()),
            scripted: Mutex::new(HashMap::new()),
            feeds: Mutex::new(HashMap::new()),
            events,
            buttons: RecordingButtons::new(),
            socket_available: AtomicBool::new(true),
            auto_connect,
        })
    }

    pub fn emit(&self, event: TransportEvent) {
        let _ = self.events.send(event);
    }

    /// Answer requests to `uri` with `payload`
    pub fn reply(&self, uri: &str, payload: Value) {
        lock(&self.scripted).insert(uri.to_string(), Scripted::Reply(payload));
    }

    /// Answer requests to `uri` with an API error
    pub fn fail(&self, uri: &str, detail: &str) {
        lock(&self.scripted).insert(uri.to_string(), Scripted::Fail(detail.to_string()));
    }

    pub fn refuse_socket(&self) {
        self.socket_available.store(false, Ordering::SeqCst);
    }

    /// Deliver a push on the live subscription to `uri`
    pub fn push(&self, uri: &str, payload: Value) -> bool {
        lock(&self.feeds)
            .get(uri)
            .is_some_and(|tx| tx.send(Response::push(payload)).is_ok())
    }

    pub fn buttons(&self) -> Arc<RecordingButtons> {
        self.buttons.clone()
    }

    pub fn calls(&self) -> Vec<Call> {
        lock(&self.calls).clone()
    }

    pub fn count(&self, wanted: &Call) -> usize {
        lock(&self.calls).iter().filter(|c| *c == wanted).count()
    }

    /// Payloads of every request sent to `uri`
    pub fn requests_to(&self, uri: &str) -> Vec<Option<Value>> {
        lock(&self.calls)
            .iter()
            .filter_map(|call| match call {
                Call::Request { uri: u, payload } if u == uri => Some(payload.clone()),
                _ => None,
            })
            .collect()
    }

    /// Number of requests of any kind
    pub fn request_count(&self) -> usize {
        lock(&self.calls)
            .iter()
            .filter(|c| matches!(c, Call::Request { .. }))
            .count()
    }

    pub fn is_subscribed(&self, uri: &str) -> bool {
        lock(&self.feeds).get(uri).is_some_and(|tx| !tx.is_closed())
    }

    fn record(&self, call: Call) {
        lock(&self.calls).push(call);
    }
}

#[async_trait]
impl SessionTransport for MockTransport {
    fn events(&self) -> broadcast::Receiver<TransportEvent> {
        self.events.subscribe()
    }

    async fn connect(&self) {
        self.record(Call::Connect);
        if self.auto_connect {
            self.emit(TransportEvent::Connecting);
            self.emit(TransportEvent::Connected);
        }
    }

    async fn disconnect(&self) {
        self.record(Call::Disconnect);
        lock(&self.feeds).clear();
    }

    async fn request(&self, uri: &str, payload: Option<Value>) -> Result<Value> {
        self.record(Call::Request {
            uri: uri.to_string(),
            payload,
        });
        match lock(&self.scripted).get(uri) {
            Some(Scripted::Reply(value)) => Ok(value.clone()),
            Some(Scripted::Fail(detail)) => Err(WebOsError::ApiError {
                detail: detail.clone(),
            }),
            None => Ok(json!({ "returnValue": true })),
        }
    }

    async fn subscribe(&self, uri: &str, _payload: Option<Value>) -> Result<Subscription> {
        self.record(Call::Subscribe(uri.to_string()));
        let (tx, rx) = mpsc::unbounded_channel();
        lock(&self.feeds).insert(uri.to_string(), tx);
        Ok(Subscription::new(uri, rx))
    }

    async fn get_socket(&self, uri: &str) -> Result<Arc<dyn ButtonSink>> {
        self.record(Call::GetSocket(uri.to_string()));
        if self.socket_available.load(Ordering::SeqCst) {
            Ok(self.buttons.clone())
        } else {
            Err(WebOsError::ApiError {
                detail: "no pointer socket".to_string(),
            })
        }
    }
}

/// Button sink that remembers every press
#[derive(Default)]
pub(crate) struct RecordingButtons {
    pressed: Mutex<Vec<String>>,
}

impl RecordingButtons {
    pub fn new() -> Arc<Self> {
        Arc::new(Self::default())
    }

    pub fn pressed(&self) -> Vec<String> {
        lock(&self.pressed).clone()
    }
}

#[async_trait]
impl ButtonSink for RecordingButtons {
    async fn send_button(&self, name: &str) -> Result<()> {
        lock(&self.pressed).push(name.to_string());
        Ok(())
    }
}

/// Prober answering whatever the test set last
pub(crate) struct MockProber {
    reachable: AtomicBool,
}

impl MockProber {
    pub fn new(reachable: bool) -> Arc<Self> {
        Arc::new(Self {
            reachable: AtomicBool::new(reachable),
        })
    }

    pub fn set(&self, reachable: bool) {
        self.reachable.store(reachable, Ordering::SeqCst);
    }
}

#[async_trait]
impl Prober for MockProber {
    async fn probe(&self, _host: &str, _port: u16, _limit: Duration) -> bool {
        self.reachable.load(Ordering::SeqCst)
    }
}

/// Wake-on-LAN sender that only records the MAC addresses
#[derive(Default)]
pub(crate) struct RecordingWaker {
    woken: Mutex<Vec<String>>,
}

impl RecordingWaker {
    pub fn new() -> Arc<Self> {
        Arc::new(Self::default())
    }

    pub fn woken(&self) -> Vec<String> {
        lock(&self.woken).clone()
    }
}

#[async_trait]
impl WakeOnLan for RecordingWaker {
    async fn wake(&self, mac: &str) -> Result<()> {
        lock(&self.woken).push(mac.to_string());
        Ok(())
    }
}

/// Poll `condition` until it holds, failing the test after two seconds
pub(crate) async fn eventually(mut condition: impl FnMut() -> bool) {
    for _ in 0..200 {
        if condition() {
            return;
        }
        tokio::time::sleep(Duration::from_millis(10)).await;
    }
    panic!("condition not met in time");
}
