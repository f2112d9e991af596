//! Collaborator contracts for the Parley voice agent.
//!
//! This crate defines the services a call session's response loop runs
//! through (speech capture, dialogue generation, and speech synthesis)
//! together with their production implementations. It knows nothing about
//! HTTP or session state; the `parley-api` service wires these into the
//! call orchestrator.

pub mod capture;
pub mod dialogue;
pub mod speech;
