//! Speech capture: the peer's side of the conversation.

use anyhow::Result;
use async_trait::async_trait;

/// Produces the peer's next spoken utterance, if one is ready.
#[async_trait]
pub trait CaptureService: Send + Sync {
    /// Returns the next transcribed utterance, or `None` when the peer has
    /// not said anything new since the last call.
    async fn next_utterance(&self) -> Result<Option<String>>;
}

/// Capture stand-in that always reports the same utterance.
///
/// Live transcription is not wired up; this keeps the response loop
/// exercisable end to end until a real capture backend exists.
pub struct FixedUtteranceCapture {
    utterance: String,
}

impl FixedUtteranceCapture {
    pub fn new(utterance: impl Into<String>) -> Self {
        Self {
            utterance: utterance.into(),
        }
    }
}

impl Default for FixedUtteranceCapture {
    fn default() -> Self {
        Self::new("What are your key skills?")
    }
}

#[async_trait]
impl CaptureService for FixedUtteranceCapture {
    async fn next_utterance(&self) -> Result<Option<String>> {
        Ok(Some(self.utterance.clone()))
    }
}
