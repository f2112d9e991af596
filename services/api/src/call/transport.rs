//! Transport contract between a call session and the real-time media engine.
//!
//! The engine itself is an external collaborator; this module only fixes the
//! operations a session needs (join, leave, publish) and the event sink the
//! engine reports back through.

use super::token::Credential;
use async_trait::async_trait;
use parley_core::speech::SpeechArtifact;
use std::sync::Arc;
use tracing::{debug, info};

/// Asynchronous notifications a transport delivers to its event sink.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum RtcEvent {
    JoinSuccess,
    LeaveChannel,
    PeerJoined { uid: u32 },
    PeerOffline { uid: u32 },
}

/// Receives transport events. The session side implements this; the
/// transport holds a reference and invokes it as events arrive.
pub trait RtcEventSink: Send + Sync {
    fn on_join_success(&self);
    fn on_leave_channel(&self);
    fn on_peer_joined(&self, uid: u32);
    fn on_peer_offline(&self, uid: u32);
}

/// Options applied when joining a channel.
#[derive(Debug, Clone, Copy)]
pub struct JoinOptions {
    pub auto_subscribe_audio: bool,
    pub publish_custom_audio: bool,
}

impl Default for JoinOptions {
    fn default() -> Self {
        Self {
            auto_subscribe_audio: true,
            publish_custom_audio: true,
        }
    }
}

#[derive(Debug, thiserror::Error)]
pub enum TransportError {
    #[error("failed to join channel: {0}")]
    Join(String),
    #[error("failed to leave channel: {0}")]
    Leave(String),
    #[error("failed to publish audio: {0}")]
    Publish(String),
}

/// A connection to the real-time media engine for one channel.
#[async_trait]
pub trait RtcTransport: Send + Sync {
    /// Asks the engine to join `channel` as `uid`. A successful return means
    /// the join was accepted; the engine confirms it asynchronously through
    /// the event sink.
    async fn join(
        &self,
        credential: &Credential,
        channel: &str,
        uid: u32,
        options: JoinOptions,
    ) -> Result<(), TransportError>;

    async fn leave(&self) -> Result<(), TransportError>;

    /// Plays the artifact into the channel.
    async fn publish(&self, artifact: &SpeechArtifact) -> Result<(), TransportError>;
}

/// Builds one transport per session, wired to that session's event sink.
pub trait RtcTransportFactory: Send + Sync {
    fn create(&self, sink: Arc<dyn RtcEventSink>) -> Arc<dyn RtcTransport>;
}

/// Transport that acknowledges join and leave locally and discards
/// published audio.
///
/// Stands in until a real media engine binding is wired up. No peer ever
/// appears on it, so the response loop stays dormant.
pub struct LoopbackTransport {
    sink: Arc<dyn RtcEventSink>,
}

impl LoopbackTransport {
    pub fn new(sink: Arc<dyn RtcEventSink>) -> Self {
        Self { sink }
    }
}

#[async_trait]
impl RtcTransport for LoopbackTransport {
    async fn join(
        &self,
        _credential: &Credential,
        channel: &str,
        uid: u32,
        _options: JoinOptions,
    ) -> Result<(), TransportError> {
        info!(channel, uid, "loopback transport joining channel");
        self.sink.on_join_success();
        Ok(())
    }

    async fn leave(&self) -> Result<(), TransportError> {
        self.sink.on_leave_channel();
        Ok(())
    }

    async fn publish(&self, artifact: &SpeechArtifact) -> Result<(), TransportError> {
        debug!(
            bytes = artifact.byte_len(),
            "loopback transport discarding published audio"
        );
        Ok(())
    }
}

pub struct LoopbackTransportFactory;

impl RtcTransportFactory for LoopbackTransportFactory {
    fn create(&self, sink: Arc<dyn RtcEventSink>) -> Arc<dyn RtcTransport> {
        Arc::new(LoopbackTransport::new(sink))
    }
}
