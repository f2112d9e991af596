//! Parley API Library Crate
//!
//! This library contains the call-session orchestrator for the Parley voice
//! agent (credential issuance, the session registry, the per-channel state
//! machine, and the response worker) plus the thin HTTP command surface
//! around it. The `bin/api.rs` binary is a thin wrapper around this library.

pub mod call;
pub mod config;
pub mod handlers;
pub mod models;
pub mod router;
pub mod state;
