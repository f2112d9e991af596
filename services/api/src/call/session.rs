//! Per-channel call session: connection state machine and event handling.

use super::{
    CallError,
    registry::SessionRegistry,
    token::{AGENT_UID, Role, TokenIssuer},
    transport::{JoinOptions, RtcEvent, RtcEventSink, RtcTransport, RtcTransportFactory},
    worker::{self, ResponsePipeline},
};
use chrono::{DateTime, Utc};
use serde::Serialize;
use std::sync::atomic::AtomicBool;
use std::sync::{Arc, Weak};
use std::time::Duration;
use tokio::sync::{Mutex, mpsc, watch};
use tracing::{Instrument, debug, error, info, info_span, warn};
use utoipa::ToSchema;
use uuid::Uuid;

/// Connection lifecycle of a session.
///
/// `Idle` is both initial and terminal: a session that has returned to
/// `Idle` is discarded, and a later start-call builds a fresh one.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, ToSchema)]
#[serde(rename_all = "snake_case")]
pub enum CallState {
    Idle,
    Joining,
    Joined,
    Leaving,
}

/// Result of asking a session to join its channel.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum JoinOutcome {
    /// The join was initiated; `Joined` follows on the transport's success
    /// event.
    Started,
    /// The session was already joining, joined, or leaving.
    AlreadyActive,
}

struct SessionShared {
    state: CallState,
    peer_uid: Option<u32>,
    /// Set once the session has finalized; the registry replaces closed
    /// entries instead of returning them.
    closed: bool,
}

/// One agent connection to one channel.
///
/// Two tasks run per session: an event task draining transport events, and
/// the response worker. The event task (plus `join`/`leave`) is the only
/// writer of connection state; the worker only reads it and owns the
/// processing flag exclusively.
pub struct CallSession {
    id: Uuid,
    channel: String,
    created_at: DateTime<Utc>,
    shared: Mutex<SessionShared>,
    /// True while a response cycle is in flight. Written only by the worker.
    processing: AtomicBool,
    transport: Arc<dyn RtcTransport>,
    issuer: Arc<TokenIssuer>,
    registry: Weak<SessionRegistry>,
    shutdown_tx: watch::Sender<bool>,
}

/// Forwards transport callbacks into the session's event channel, so every
/// event is handled by the one persistent event task.
struct ChannelEventSink {
    events_tx: mpsc::UnboundedSender<RtcEvent>,
}

impl ChannelEventSink {
    fn forward(&self, event: RtcEvent) {
        // The receiver is gone only after the session finalized; late
        // transport callbacks are dropped on purpose.
        let _ = self.events_tx.send(event);
    }
}

impl RtcEventSink for ChannelEventSink {
    fn on_join_success(&self) {
        self.forward(RtcEvent::JoinSuccess);
    }

    fn on_leave_channel(&self) {
        self.forward(RtcEvent::LeaveChannel);
    }

    fn on_peer_joined(&self, uid: u32) {
        self.forward(RtcEvent::PeerJoined { uid });
    }

    fn on_peer_offline(&self, uid: u32) {
        self.forward(RtcEvent::PeerOffline { uid });
    }
}

impl CallSession {
    /// Builds a session for `channel` and spawns its event task and response
    /// worker. The session starts `Idle`; call [`CallSession::join`] to
    /// connect it.
    pub fn spawn(
        channel: String,
        issuer: Arc<TokenIssuer>,
        transport_factory: &dyn RtcTransportFactory,
        registry: &Arc<SessionRegistry>,
        pipeline: ResponsePipeline,
        response_interval: Duration,
    ) -> Arc<Self> {
        let (events_tx, events_rx) = mpsc::unbounded_channel();
        let (shutdown_tx, shutdown_rx) = watch::channel(false);
        let transport = transport_factory.create(Arc::new(ChannelEventSink { events_tx }));

        let session = Arc::new(Self {
            id: Uuid::new_v4(),
            channel,
            created_at: Utc::now(),
            shared: Mutex::new(SessionShared {
                state: CallState::Idle,
                peer_uid: None,
                closed: false,
            }),
            processing: AtomicBool::new(false),
            transport,
            issuer,
            registry: Arc::downgrade(registry),
            shutdown_tx,
        });

        let event_span =
            info_span!("call_session", channel = %session.channel, session_id = %session.id);
        tokio::spawn(
            Self::run_event_loop(session.clone(), events_rx, shutdown_rx.clone())
                .instrument(event_span),
        );

        let worker_span =
            info_span!("response_worker", channel = %session.channel, session_id = %session.id);
        tokio::spawn(
            worker::run(session.clone(), pipeline, response_interval, shutdown_rx)
                .instrument(worker_span),
        );

        session
    }

    pub fn id(&self) -> Uuid {
        self.id
    }

    pub fn channel(&self) -> &str {
        &self.channel
    }

    pub fn created_at(&self) -> DateTime<Utc> {
        self.created_at
    }

    pub async fn state(&self) -> CallState {
        self.shared.lock().await.state
    }

    pub async fn peer_uid(&self) -> Option<u32> {
        self.shared.lock().await.peer_uid
    }

    /// True when the registry may discard this entry in favor of a fresh
    /// session: the session finalized, or its leave is already under way.
    pub(crate) async fn is_replaceable(&self) -> bool {
        let shared = self.shared.lock().await;
        shared.closed || shared.state == CallState::Leaving
    }

    pub(crate) async fn is_joined(&self) -> bool {
        self.shared.lock().await.state == CallState::Joined
    }

    /// Worker eligibility: joined with a peer present.
    pub(crate) async fn is_joined_with_peer(&self) -> bool {
        let shared = self.shared.lock().await;
        shared.state == CallState::Joined && shared.peer_uid.is_some()
    }

    pub(crate) fn processing_flag(&self) -> &AtomicBool {
        &self.processing
    }

    pub(crate) fn transport(&self) -> &dyn RtcTransport {
        self.transport.as_ref()
    }

    /// Connects the agent to the channel.
    ///
    /// Issues the agent's own Publisher credential and asks the transport to
    /// join; `Joined` is reached when the transport reports success. On an
    /// issuance or transport failure the session reverts to `Idle` and the
    /// error is returned.
    pub async fn join(&self) -> Result<JoinOutcome, CallError> {
        {
            let mut shared = self.shared.lock().await;
            match shared.state {
                CallState::Idle => shared.state = CallState::Joining,
                CallState::Joining | CallState::Joined | CallState::Leaving => {
                    debug!(state = ?shared.state, "join requested while already active");
                    return Ok(JoinOutcome::AlreadyActive);
                }
            }
        }
        info!("agent joining channel");

        let result: Result<(), CallError> = async {
            let credential = self
                .issuer
                .issue(&self.channel, AGENT_UID, Role::Publisher)?;
            self.transport
                .join(&credential, &self.channel, AGENT_UID, JoinOptions::default())
                .await?;
            Ok(())
        }
        .await;

        match result {
            Ok(()) => Ok(JoinOutcome::Started),
            Err(e) => {
                let mut shared = self.shared.lock().await;
                if shared.state == CallState::Joining {
                    shared.state = CallState::Idle;
                }
                warn!(error = %e, "join failed; session reset to idle");
                Err(e)
            }
        }
    }

    /// Disconnects from the channel and discards the session.
    ///
    /// Always finalizes (terminal state, registry entry removed, worker
    /// stopped) even when the transport leave call fails, so a wedged
    /// session can be force-reset; the transport error is still returned.
    pub async fn leave(&self) -> Result<(), CallError> {
        let prior = {
            let mut shared = self.shared.lock().await;
            let prior = shared.state;
            if prior != CallState::Idle && prior != CallState::Leaving {
                shared.state = CallState::Leaving;
            }
            prior
        };
        match prior {
            // Never joined (or already finalized): nothing to tell the
            // transport, but make sure the entry and tasks are gone.
            CallState::Idle => {
                self.finalize().await;
                Ok(())
            }
            // Another leave is already driving the teardown.
            CallState::Leaving => Ok(()),
            CallState::Joining | CallState::Joined => {
                info!("agent leaving channel");
                let result = self.transport.leave().await;
                self.finalize().await;
                result.map_err(CallError::from)
            }
        }
    }

    /// Drops a session that never joined or is wedged: terminal state,
    /// registry entry removed, tasks stopped.
    pub async fn discard(&self) {
        self.finalize().await;
    }

    /// Marks the session terminal, removes its registry entry, and signals
    /// both tasks to stop. Safe to call more than once.
    async fn finalize(&self) {
        {
            let mut shared = self.shared.lock().await;
            shared.state = CallState::Idle;
            shared.peer_uid = None;
            shared.closed = true;
        }
        if let Some(registry) = self.registry.upgrade() {
            registry.remove_session(&self.channel, self.id).await;
        }
        let _ = self.shutdown_tx.send(true);
    }

    async fn run_event_loop(
        session: Arc<Self>,
        mut events: mpsc::UnboundedReceiver<RtcEvent>,
        mut shutdown: watch::Receiver<bool>,
    ) {
        debug!("event task started");
        loop {
            tokio::select! {
                maybe_event = events.recv() => match maybe_event {
                    Some(event) => session.handle_event(event).await,
                    None => break,
                },
                _ = shutdown.changed() => {
                    if *shutdown.borrow() {
                        break;
                    }
                }
            }
        }
        debug!("event task stopped");
    }

    async fn handle_event(&self, event: RtcEvent) {
        match event {
            RtcEvent::JoinSuccess => {
                let mut shared = self.shared.lock().await;
                if shared.state == CallState::Joining {
                    shared.state = CallState::Joined;
                    info!("agent joined channel");
                } else {
                    debug!(state = ?shared.state, "ignoring join success");
                }
            }
            RtcEvent::PeerJoined { uid } => {
                let mut shared = self.shared.lock().await;
                shared.peer_uid = Some(uid);
                info!(peer_uid = uid, "peer joined the call");
            }
            RtcEvent::PeerOffline { uid } => {
                let tracked = {
                    let mut shared = self.shared.lock().await;
                    if shared.peer_uid == Some(uid) {
                        shared.peer_uid = None;
                        true
                    } else {
                        false
                    }
                };
                if tracked {
                    info!(peer_uid = uid, "peer left the call; leaving channel");
                    if let Err(e) = self.leave().await {
                        error!(error = %e, "peer-triggered leave failed");
                    }
                } else {
                    debug!(peer_uid = uid, "ignoring offline notice for untracked peer");
                }
            }
            RtcEvent::LeaveChannel => {
                info!("agent left channel");
                self.finalize().await;
            }
        }
    }
}
