//! Process-wide registry of active call sessions.

use super::session::CallSession;
use std::collections::HashMap;
use std::sync::Arc;
use tokio::sync::Mutex;
use tracing::debug;
use uuid::Uuid;

/// Maps channel id to the single live session for that channel.
///
/// The map is the only resource shared between independent callers; every
/// access goes through one mutex, and `get_or_create` holds it across the
/// whole check-then-create, so two concurrent start-call requests for the
/// same channel yield exactly one session.
///
/// The registry lives only in process memory: sessions are live calls and
/// are not resumable across a restart.
#[derive(Default)]
pub struct SessionRegistry {
    sessions: Mutex<HashMap<String, Arc<CallSession>>>,
}

impl SessionRegistry {
    pub fn new() -> Self {
        Self::default()
    }

    /// Returns the existing session for `channel` unless it has finalized or
    /// is already leaving; otherwise builds a fresh one via `make` and
    /// installs it. The boolean is `true` when a new session was created.
    pub async fn get_or_create<F>(&self, channel: &str, make: F) -> (Arc<CallSession>, bool)
    where
        F: FnOnce() -> Arc<CallSession>,
    {
        let mut sessions = self.sessions.lock().await;
        if let Some(existing) = sessions.get(channel) {
            if !existing.is_replaceable().await {
                return (existing.clone(), false);
            }
            debug!(channel, "replacing finished session");
        }
        let session = make();
        sessions.insert(channel.to_string(), session.clone());
        debug!(channel, session_id = %session.id(), "registered session");
        (session, true)
    }

    /// Looks up the session for `channel`.
    pub async fn get(&self, channel: &str) -> Option<Arc<CallSession>> {
        self.sessions.lock().await.get(channel).cloned()
    }

    /// Removes the entry for `channel` if it still belongs to the session
    /// with `session_id`. A no-op when the channel is absent or the slot is
    /// already held by a replacement session.
    pub async fn remove_session(&self, channel: &str, session_id: Uuid) {
        let mut sessions = self.sessions.lock().await;
        if let Some(current) = sessions.get(channel) {
            if current.id() == session_id {
                sessions.remove(channel);
                debug!(channel, %session_id, "unregistered session");
            }
        }
    }

    /// Number of registered sessions.
    pub async fn len(&self) -> usize {
        self.sessions.lock().await.len()
    }

    pub async fn is_empty(&self) -> bool {
        self.sessions.lock().await.is_empty()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::call::transport::testing::FakeTransportFactory;
    use crate::call::worker::testing::{noop_pipeline, test_issuer};
    use std::sync::atomic::{AtomicUsize, Ordering};
    use std::time::Duration;

    fn make_session(
        channel: &str,
        registry: &Arc<SessionRegistry>,
        factory: &FakeTransportFactory,
    ) -> Arc<CallSession> {
        CallSession::spawn(
            channel.to_string(),
            test_issuer(),
            factory,
            registry,
            noop_pipeline(),
            Duration::from_secs(3600),
        )
    }

    #[tokio::test]
    async fn concurrent_get_or_create_builds_exactly_one_session() {
        let registry = Arc::new(SessionRegistry::new());
        let factory = Arc::new(FakeTransportFactory::default());
        let created = Arc::new(AtomicUsize::new(0));

        let mut handles = Vec::new();
        for _ in 0..16 {
            let registry = registry.clone();
            let factory = factory.clone();
            let created = created.clone();
            handles.push(tokio::spawn(async move {
                let (_, is_new) = registry
                    .get_or_create("abc", || {
                        created.fetch_add(1, Ordering::SeqCst);
                        make_session("abc", &registry, &factory)
                    })
                    .await;
                is_new
            }));
        }

        let mut new_count = 0;
        for handle in handles {
            if handle.await.unwrap() {
                new_count += 1;
            }
        }

        assert_eq!(created.load(Ordering::SeqCst), 1);
        assert_eq!(new_count, 1);
        assert_eq!(registry.len().await, 1);
    }

    #[tokio::test]
    async fn a_fresh_session_is_reported_as_already_present() {
        let registry = Arc::new(SessionRegistry::new());
        let factory = FakeTransportFactory::default();

        let (first, is_new) = registry
            .get_or_create("c1", || make_session("c1", &registry, &factory))
            .await;
        assert!(is_new);

        // The first session has not joined yet; a second start-call must
        // still observe it rather than racing in a duplicate.
        let (second, is_new) = registry
            .get_or_create("c1", || make_session("c1", &registry, &factory))
            .await;
        assert!(!is_new);
        assert!(Arc::ptr_eq(&first, &second));
    }

    #[tokio::test]
    async fn distinct_channels_get_distinct_sessions() {
        let registry = Arc::new(SessionRegistry::new());
        let factory = FakeTransportFactory::default();

        let (a, _) = registry
            .get_or_create("c1", || make_session("c1", &registry, &factory))
            .await;
        let (b, _) = registry
            .get_or_create("c2", || make_session("c2", &registry, &factory))
            .await;

        assert!(!Arc::ptr_eq(&a, &b));
        assert_eq!(registry.len().await, 2);
    }

    #[tokio::test]
    async fn a_discarded_session_is_replaced() {
        let registry = Arc::new(SessionRegistry::new());
        let factory = FakeTransportFactory::default();

        let (first, _) = registry
            .get_or_create("c1", || make_session("c1", &registry, &factory))
            .await;
        first.discard().await;

        let (second, is_new) = registry
            .get_or_create("c1", || make_session("c1", &registry, &factory))
            .await;
        assert!(is_new);
        assert!(!Arc::ptr_eq(&first, &second));
    }

    #[tokio::test]
    async fn removal_is_scoped_to_the_exact_session() {
        let registry = Arc::new(SessionRegistry::new());
        let factory = FakeTransportFactory::default();

        let old = make_session("c1", &registry, &factory);
        let (current, _) = registry
            .get_or_create("c1", || make_session("c1", &registry, &factory))
            .await;

        // A stale handle finalizing late must not evict the current entry.
        registry.remove_session("c1", old.id()).await;
        assert!(registry.get("c1").await.is_some());

        registry.remove_session("c1", current.id()).await;
        assert!(registry.get("c1").await.is_none());

        // Removing again is a no-op.
        registry.remove_session("c1", current.id()).await;
        assert!(registry.is_empty().await);
    }
}
