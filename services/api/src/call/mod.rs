//! Call orchestration: join credentials, the session registry, the
//! per-channel connection state machine, its response worker, and the
//! transport contract they all sit on.

pub mod registry;
pub mod session;
pub mod token;
pub mod transport;
pub mod worker;

pub use registry::SessionRegistry;
pub use session::{CallSession, CallState, JoinOutcome};
pub use token::{AGENT_UID, Credential, Role, TokenIssuer};
pub use transport::{
    JoinOptions, LoopbackTransportFactory, RtcEvent, RtcEventSink, RtcTransport,
    RtcTransportFactory, TransportError,
};
pub use worker::ResponsePipeline;

use token::TokenError;

/// Errors surfaced by session commands (join and leave).
///
/// Collaborator failures inside the response worker never appear here; they
/// are contained in the worker loop.
#[derive(Debug, thiserror::Error)]
pub enum CallError {
    #[error(transparent)]
    Token(#[from] TokenError),
    #[error(transparent)]
    Transport(#[from] TransportError),
}
