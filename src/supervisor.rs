//! Connection supervisor
//!
//! Reconciles what the prober says about reachability with what the transport
//! says about the session. Every decision is made by [`transition`], a pure
//! function; the supervisor task only feeds it events and carries out the
//! returned actions. It is the one writer of the published
//! [`ConnectionState`].

use crate::bootstrap;
use crate::config::CONTROL_PORT;
use crate::context::DeviceContext;
use crate::probe::Prober;
use crate::state::ConnectionState;
use crate::transport::TransportEvent;
use std::sync::Arc;
use tokio::sync::broadcast::error::RecvError;
use tokio::sync::{broadcast, mpsc};
use tokio::task::JoinHandle;
use tokio::time::sleep;
use tokio_util::sync::CancellationToken;

/// Supervisor state: the published state plus the last probe result
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Link {
    pub state: ConnectionState,
    pub reachable: bool,
}

impl Default for Link {
    fn default() -> Self {
        Self {
            state: ConnectionState::Probing,
            reachable: false,
        }
    }
}

/// Input to the supervisor
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Event {
    Probe(bool),
    Transport(TransportEvent),
    /// The television was switched off locally; drop the session now
    Teardown,
}

/// Side effect requested by a transition
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Action {
    Connect,
    Disconnect,
    /// Clear the pointer channel and stop the session's feeds
    ReleaseSession,
    Bootstrap,
}

/// Compute the next link and the actions to carry out
///
/// Transport events are only trusted while the television is reachable; a
/// session that comes up after the prober gave up on the television is shut
/// down again. A refused pairing parks the link until the television has been
/// unreachable once.
pub fn transition(link: Link, event: &Event) -> (Link, Vec<Action>) {
    use Action::*;
    use ConnectionState::*;

    let mut next = link;
    let actions = match event {
        Event::Probe(reachable) => {
            next.reachable = *reachable;
            match (link.state, *reachable) {
                (Probing | Disconnected, true) => {
                    next.state = Connecting;
                    vec![Connect]
                }
                (Probing, false) => {
                    next.state = Disconnected;
                    vec![]
                }
                // A dropped session leaves the transport retrying
                (Disconnected, false) if link.reachable => vec![Disconnect],
                (Connecting | AwaitingPairingConfirmation | Connected, false) => {
                    next.state = Disconnected;
                    vec![ReleaseSession, Disconnect]
                }
                _ => vec![],
            }
        }
        Event::Transport(TransportEvent::Connected) if !link.reachable => {
            next.state = Disconnected;
            vec![Disconnect]
        }
        Event::Transport(_) if !link.reachable => vec![],
        Event::Transport(transport) => match (link.state, transport) {
            (Disconnected | AwaitingPairingConfirmation, TransportEvent::Connecting) => {
                next.state = Connecting;
                vec![ReleaseSession]
            }
            (Connecting | Disconnected, TransportEvent::Prompt) => {
                next.state = AwaitingPairingConfirmation;
                vec![ReleaseSession]
            }
            (Connecting | AwaitingPairingConfirmation | Disconnected, TransportEvent::Connected) => {
                next.state = Connected;
                vec![Bootstrap]
            }
            (Connecting | AwaitingPairingConfirmation | Disconnected, TransportEvent::PairingRejected) => {
                next.state = AwaitingPairingConfirmation;
                vec![ReleaseSession]
            }
            (Connecting | AwaitingPairingConfirmation | Connected, TransportEvent::Closed) => {
                next.state = Disconnected;
                vec![ReleaseSession]
            }
            (Connected, TransportEvent::Error(_)) => {
                next.state = Disconnected;
                vec![ReleaseSession]
            }
            _ => vec![],
        },
        Event::Teardown => {
            next.state = Disconnected;
            next.reachable = false;
            vec![ReleaseSession, Disconnect]
        }
    };
    (next, actions)
}

/// Start the prober and supervisor tasks for one television
///
/// Returns the sender for local events and the task handles. Both tasks end
/// when `cancel` fires; the supervisor disconnects the transport on its way
/// out.
pub(crate) fn spawn(
    ctx: Arc<DeviceContext>,
    prober: Arc<dyn Prober>,
    cancel: CancellationToken,
) -> (mpsc::UnboundedSender<Event>, Vec<JoinHandle<()>>) {
    let (tx, rx) = mpsc::unbounded_channel();
    let transport_events = ctx.transport.events();

    let probe_task = tokio::spawn(probe_loop(ctx.clone(), prober, tx.clone(), cancel.clone()));

    let supervisor = Supervisor {
        ctx,
        link: Link::default(),
        session: None,
    };
    let supervisor_task = tokio::spawn(supervisor.run(rx, transport_events, cancel));

    (tx, vec![probe_task, supervisor_task])
}

async fn probe_loop(
    ctx: Arc<DeviceContext>,
    prober: Arc<dyn Prober>,
    events: mpsc::UnboundedSender<Event>,
    cancel: CancellationToken,
) {
    let interval = ctx.settings.probe_interval();
    let limit = ctx.settings.probe_timeout();
    loop {
        let reachable = tokio::select! {
            _ = cancel.cancelled() => break,
            reachable = prober.probe(&ctx.host, CONTROL_PORT, limit) => reachable,
        };
        if events.send(Event::Probe(reachable)).is_err() {
            break;
        }

        tokio::select! {
            _ = cancel.cancelled() => break,
            _ = sleep(interval) => {}
        }
    }
}

struct Supervisor {
    ctx: Arc<DeviceContext>,
    link: Link,
    /// Bootstrap and feed consumers of the current session
    session: Option<JoinHandle<()>>,
}

impl Supervisor {
    async fn run(
        mut self,
        mut events: mpsc::UnboundedReceiver<Event>,
        mut transport_events: broadcast::Receiver<TransportEvent>,
        cancel: CancellationToken,
    ) {
        loop {
            let event = tokio::select! {
                _ = cancel.cancelled() => break,
                Some(event) = events.recv() => event,
                received = transport_events.recv() => match received {
                    Ok(event) => Event::Transport(event),
                    Err(RecvError::Lagged(missed)) => {
                        tracing::warn!("Supervisor for {} missed {} transport events", self.ctx.host, missed);
                        continue;
                    }
                    Err(RecvError::Closed) => break,
                },
            };
            self.handle(event).await;
        }

        self.release_session();
        self.ctx.transport.disconnect().await;
        self.publish(ConnectionState::Disconnected);
        tracing::debug!("Supervisor for {} stopped", self.ctx.host);
    }

    async fn handle(&mut self, event: Event) {
        let (next, actions) = transition(self.link, &event);
        if actions.is_empty() && next == self.link {
            tracing::trace!("{} ignoring {:?} in state {}", self.ctx.host, event, self.link.state);
            return;
        }
        tracing::debug!("{} {:?}: {:?} -> {:?} {:?}", self.ctx.host, event, self.link, next, actions);

        // Old session is gone before the new state is published
        for action in &actions {
            match action {
                Action::ReleaseSession => self.release_session(),
                Action::Disconnect => self.ctx.transport.disconnect().await,
                Action::Connect | Action::Bootstrap => {}
            }
        }

        self.link = next;
        self.publish(next.state);

        for action in &actions {
            match action {
                Action::Connect => self.ctx.transport.connect().await,
                Action::Bootstrap => self.bootstrap(),
                Action::ReleaseSession | Action::Disconnect => {}
            }
        }
    }

    fn publish(&self, state: ConnectionState) {
        let previous = self.ctx.link.send_replace(state);
        if previous != state {
            match state {
                ConnectionState::AwaitingPairingConfirmation => {
                    tracing::info!("Device {} waiting on pairing confirmation", self.ctx.host)
                }
                _ => tracing::info!("Device {} {} (was {})", self.ctx.host, state, previous),
            }
        }
    }

    fn release_session(&mut self) {
        self.ctx.pointer.clear();
        if let Some(session) = self.session.take() {
            session.abort();
        }
        self.ctx.update(|s| s.power_on = false);
    }

    fn bootstrap(&mut self) {
        if let Some(stale) = self.session.take() {
            stale.abort();
        }
        let generation = self.ctx.pointer.begin();
        self.session = Some(tokio::spawn(bootstrap::run_session(self.ctx.clone(), generation)));
    }
}
