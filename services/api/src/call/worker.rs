//! The response worker: one spoken reply per cycle while a peer is present.
//!
//! Each session owns exactly one worker task. The worker observes session
//! state on a fixed cadence and, when eligible, runs a single bounded
//! response cycle: capture a query, stream a reply, synthesize it, publish
//! it. A collaborator failure aborts the cycle, never the loop.

use super::session::CallSession;
use anyhow::Result;
use parley_core::{
    capture::CaptureService,
    dialogue::{self, ChatTurn, DialogueService, TurnRole},
    speech::TtsService,
};
use std::sync::Arc;
use std::sync::atomic::{AtomicBool, Ordering};
use std::time::Duration;
use tokio::sync::watch;
use tokio::time::MissedTickBehavior;
use tracing::{debug, info, warn};

/// Words the agent is assumed to speak per second when estimating playback
/// time. Stand-in pacing until the transport reports playback completion.
const SPEECH_WORDS_PER_SEC: f64 = 3.0;

/// Prior turns replayed to the dialogue backend as context.
const HISTORY_LIMIT: usize = 32;

/// The collaborators one response cycle runs through.
#[derive(Clone)]
pub struct ResponsePipeline {
    pub capture: Arc<dyn CaptureService>,
    pub dialogue: Arc<dyn DialogueService>,
    pub tts: Arc<dyn TtsService>,
}

/// Clears the processing flag when a cycle ends, on every exit path.
struct ProcessingGuard<'a>(&'a AtomicBool);

impl Drop for ProcessingGuard<'_> {
    fn drop(&mut self) {
        // Release pairs with the Acquire compare_exchange in `try_tick`: the
        // flag transition is observed before the next eligibility check.
        self.0.store(false, Ordering::Release);
    }
}

/// Drives the response loop until the session shuts down.
pub(crate) async fn run(
    session: Arc<CallSession>,
    pipeline: ResponsePipeline,
    period: Duration,
    mut shutdown: watch::Receiver<bool>,
) {
    debug!(period_secs = period.as_secs_f64(), "response worker started");
    let mut history: Vec<ChatTurn> = Vec::new();
    let mut ticker = tokio::time::interval(period);
    // A long cycle must not be followed by a burst of catch-up ticks.
    ticker.set_missed_tick_behavior(MissedTickBehavior::Delay);
    loop {
        tokio::select! {
            _ = ticker.tick() => {}
            _ = shutdown.changed() => {
                if *shutdown.borrow() {
                    break;
                }
                continue;
            }
        }
        try_tick(&session, &pipeline, &mut history).await;
    }
    debug!("response worker stopped");
}

/// Runs at most one response cycle.
///
/// Skipped entirely unless the session is joined, a peer is present, and no
/// cycle is already in flight. Returns whether a cycle was entered.
pub(crate) async fn try_tick(
    session: &Arc<CallSession>,
    pipeline: &ResponsePipeline,
    history: &mut Vec<ChatTurn>,
) -> bool {
    if !session.is_joined_with_peer().await {
        return false;
    }
    // Check and set in one step: no two ticks can both enter the cycle.
    if session
        .processing_flag()
        .compare_exchange(false, true, Ordering::Acquire, Ordering::Acquire)
        .is_err()
    {
        return false;
    }
    let _guard = ProcessingGuard(session.processing_flag());

    match run_cycle(session, pipeline, history).await {
        Ok(Some((query, reply))) => {
            history.push(ChatTurn {
                role: TurnRole::Peer,
                content: query,
            });
            history.push(ChatTurn {
                role: TurnRole::Agent,
                content: reply,
            });
            if history.len() > HISTORY_LIMIT {
                history.drain(..history.len() - HISTORY_LIMIT);
            }
        }
        Ok(None) => {}
        Err(e) => warn!(error = ?e, "response cycle aborted"),
    }
    true
}

/// One response cycle: capture a query, stream the reply, synthesize it,
/// and publish into the channel.
///
/// Returns the exchange when a reply was published. Any collaborator
/// failure aborts this cycle only; the synthesized artifact is dropped on
/// every path out of this function.
async fn run_cycle(
    session: &Arc<CallSession>,
    pipeline: &ResponsePipeline,
    history: &[ChatTurn],
) -> Result<Option<(String, String)>> {
    let Some(query) = pipeline.capture.next_utterance().await? else {
        return Ok(None);
    };
    debug!(query = %query, "captured peer utterance");

    let stream = pipeline.dialogue.stream_reply(&query, history).await?;
    let reply = dialogue::strip_reasoning(&dialogue::collect_reply(stream).await?);
    if reply.is_empty() {
        debug!("dialogue produced no speakable text");
        return Ok(None);
    }

    let artifact = pipeline.tts.synthesize(&reply).await?;

    // The session may have begun leaving while the reply was produced;
    // never publish into a channel the agent is no longer joined to.
    if !session.is_joined().await {
        debug!("session no longer joined; discarding reply");
        return Ok(None);
    }
    session.transport().publish(&artifact).await?;
    info!(words = reply.split_whitespace().count(), "published spoken reply");

    // Hold the cycle open for the estimated playback time.
    tokio::time::sleep(speaking_duration(&reply)).await;
    Ok(Some((query, reply)))
}

fn speaking_duration(reply: &str) -> Duration {
    let words = reply.split_whitespace().count();
    Duration::from_secs_f64(words as f64 / SPEECH_WORDS_PER_SEC)
}

#[cfg(test)]
pub(crate) mod testing {
    //! Collaborator doubles and helpers shared by the call-module tests.

    use super::*;
    use crate::call::token::{DEFAULT_TOKEN_TTL_SECS, TokenIssuer};
    use anyhow::anyhow;
    use async_trait::async_trait;
    use futures::stream;
    use parley_core::speech::SpeechArtifact;
    use std::path::PathBuf;
    use std::sync::Mutex;

    pub fn test_issuer() -> Arc<TokenIssuer> {
        Arc::new(TokenIssuer::new(
            "test-app",
            Some("test-secret"),
            DEFAULT_TOKEN_TTL_SECS,
        ))
    }

    /// Polls `cond` until it holds or a bounded wait elapses.
    pub async fn eventually<F, Fut>(what: &str, mut cond: F)
    where
        F: FnMut() -> Fut,
        Fut: Future<Output = bool>,
    {
        for _ in 0..400 {
            if cond().await {
                return;
            }
            tokio::time::sleep(Duration::from_millis(5)).await;
        }
        panic!("timed out waiting for: {what}");
    }

    pub struct SilentCapture;

    #[async_trait]
    impl CaptureService for SilentCapture {
        async fn next_utterance(&self) -> Result<Option<String>> {
            Ok(None)
        }
    }

    pub struct FailingCapture;

    #[async_trait]
    impl CaptureService for FailingCapture {
        async fn next_utterance(&self) -> Result<Option<String>> {
            Err(anyhow!("injected capture failure"))
        }
    }

    /// Streams a fixed set of reply fragments on every request.
    pub struct StaticDialogue(pub Vec<&'static str>);

    #[async_trait]
    impl DialogueService for StaticDialogue {
        async fn stream_reply(
            &self,
            _query: &str,
            _history: &[ChatTurn],
        ) -> Result<dialogue::ReplyStream> {
            let fragments: Vec<Result<String>> =
                self.0.iter().map(|f| Ok(f.to_string())).collect();
            Ok(Box::pin(stream::iter(fragments)))
        }
    }

    pub struct FailingDialogue;

    #[async_trait]
    impl DialogueService for FailingDialogue {
        async fn stream_reply(
            &self,
            _query: &str,
            _history: &[ChatTurn],
        ) -> Result<dialogue::ReplyStream> {
            Err(anyhow!("injected dialogue failure"))
        }
    }

    /// Produces real temp-file artifacts and remembers their paths so tests
    /// can assert the files are gone after the cycle.
    #[derive(Default)]
    pub struct RecordingTts {
        pub paths: Mutex<Vec<PathBuf>>,
    }

    #[async_trait]
    impl TtsService for RecordingTts {
        async fn synthesize(&self, _text: &str) -> Result<SpeechArtifact> {
            let artifact = SpeechArtifact::from_bytes(b"synthesized audio")?;
            self.paths.lock().unwrap().push(artifact.path().to_path_buf());
            Ok(artifact)
        }
    }

    pub struct FailingTts;

    #[async_trait]
    impl TtsService for FailingTts {
        async fn synthesize(&self, _text: &str) -> Result<SpeechArtifact> {
            Err(anyhow!("injected synthesis failure"))
        }
    }

    /// A pipeline whose capture never hears anything; the worker stays idle.
    pub fn noop_pipeline() -> ResponsePipeline {
        ResponsePipeline {
            capture: Arc::new(SilentCapture),
            dialogue: Arc::new(StaticDialogue(vec![])),
            tts: Arc::new(RecordingTts::default()),
        }
    }

    pub fn pipeline(
        capture: Arc<dyn CaptureService>,
        dialogue: Arc<dyn DialogueService>,
        tts: Arc<dyn TtsService>,
    ) -> ResponsePipeline {
        ResponsePipeline {
            capture,
            dialogue,
            tts,
        }
    }
}
