//! Speech synthesis and the lifetime of synthesized audio.

use anyhow::{Context, Result};
use async_trait::async_trait;
use std::io::Write;
use std::path::Path;
use tempfile::NamedTempFile;
use tracing::debug;

/// Synthesized audio for a single response cycle.
///
/// The backing file is removed when the artifact is dropped, so the audio
/// cannot outlive the cycle that produced it, whichever way the cycle ends.
pub struct SpeechArtifact {
    file: NamedTempFile,
    byte_len: usize,
}

impl SpeechArtifact {
    /// Writes synthesized audio bytes to a fresh temporary file.
    pub fn from_bytes(bytes: &[u8]) -> Result<Self> {
        let mut file = NamedTempFile::new().context("failed to create speech artifact file")?;
        file.write_all(bytes)
            .context("failed to write speech artifact")?;
        file.flush().context("failed to flush speech artifact")?;
        Ok(Self {
            file,
            byte_len: bytes.len(),
        })
    }

    pub fn path(&self) -> &Path {
        self.file.path()
    }

    pub fn byte_len(&self) -> usize {
        self.byte_len
    }
}

/// Text-to-speech backend.
#[async_trait]
pub trait TtsService: Send + Sync {
    /// Synthesizes `text` into an audio artifact owned by the caller.
    async fn synthesize(&self, text: &str) -> Result<SpeechArtifact>;
}

/// `TtsService` backed by an HTTP synthesis endpoint.
///
/// Posts `{"text": …, "voice": …}` and expects the raw audio bytes back.
pub struct HttpTtsClient {
    http: reqwest::Client,
    endpoint: String,
    voice: String,
}

impl HttpTtsClient {
    pub fn new(endpoint: String, voice: String) -> Self {
        Self {
            http: reqwest::Client::new(),
            endpoint,
            voice,
        }
    }
}

#[async_trait]
impl TtsService for HttpTtsClient {
    async fn synthesize(&self, text: &str) -> Result<SpeechArtifact> {
        let response = self
            .http
            .post(&self.endpoint)
            .json(&serde_json::json!({ "text": text, "voice": self.voice }))
            .send()
            .await
            .context("TTS request failed")?
            .error_for_status()
            .context("TTS endpoint rejected the request")?;
        let bytes = response
            .bytes()
            .await
            .context("failed to read synthesized audio")?;

        let artifact = tokio::task::spawn_blocking(move || SpeechArtifact::from_bytes(&bytes))
            .await
            .context("artifact write task failed")??;
        debug!(bytes = artifact.byte_len(), "synthesized speech artifact");
        Ok(artifact)
    }
}
