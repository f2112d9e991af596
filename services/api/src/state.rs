//! Shared Application State
//!
//! This module defines the `AppState` struct, which holds the session
//! registry, the token issuer, and the collaborator clients the response
//! pipeline runs through.

use crate::call::{ResponsePipeline, RtcTransportFactory, SessionRegistry, TokenIssuer};
use crate::config::Config;
use std::sync::Arc;

/// The shared application state, created once at startup and passed to all
/// handlers. All fields are public to be accessible from other modules.
#[derive(Clone)]
pub struct AppState {
    pub registry: Arc<SessionRegistry>,
    pub issuer: Arc<TokenIssuer>,
    pub pipeline: ResponsePipeline,
    pub transport_factory: Arc<dyn RtcTransportFactory>,
    pub config: Arc<Config>,
}
