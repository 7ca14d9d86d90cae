//! Public entry point
//!
//! The engine ties the registry, the store, and the flush scheduler together
//! behind one handle. Callers address documents by scope key; the engine
//! loads instances on demand and schedules persistence after every mutation
//! that produced durable state.

use std::sync::Arc;
use std::time::Duration;

use crate::comment::CommentEvent;
use crate::cursor::Selection;
use crate::error::Result;
use crate::instance::{Applied, Diff, InstanceSummary, Member};
use crate::persist::FlushScheduler;
use crate::registry::Registry;
use crate::scope::ScopeKey;
use crate::step::ClientStep;
use crate::store::DocumentStore;

#[derive(Debug, Clone)]
pub struct EngineConfig {
    /// Loaded-instance cap; beyond it the idlest instance is evicted.
    pub max_instances: usize,
    /// Debounce window between a mutation and its snapshot write.
    pub flush_delay: Duration,
    /// Retained step log length per instance.
    pub max_step_history: usize,
}

impl Default for EngineConfig {
    fn default() -> Self {
        Self {
            max_instances: 200,
            flush_delay: Duration::from_secs(60),
            max_step_history: 10_000,
        }
    }
}

pub struct Engine {
    registry: Arc<Registry>,
    scheduler: Arc<FlushScheduler>,
}

impl Engine {
    pub fn new(store: Arc<dyn DocumentStore>, config: EngineConfig) -> Self {
        let registry = Arc::new(Registry::new(
            Arc::clone(&store),
            config.max_instances,
            config.max_step_history,
        ));
        let scheduler = Arc::new(FlushScheduler::new(
            Arc::clone(&registry),
            store,
            config.flush_delay,
        ));
        Self {
            registry,
            scheduler,
        }
    }

    /// Open a document and hand back its full current state. A member, when
    /// given, has their presence registered as part of the open.
    pub async fn get(&self, key: &ScopeKey, member: Option<&Member>) -> Result<Diff> {
        let instance = self.registry.get(key, member).await?;
        let state = instance.lock().current_state(0);
        if member.is_some() {
            self.scheduler.schedule_flush();
        }
        Ok(state)
    }

    /// A member's session ended: deactivate them in every loaded document
    /// and drop their cursors.
    pub fn remove_presence(&self, member: &Member) {
        self.registry.remove_presence(member);
    }

    /// Submit steps (and any accompanying comment events) made against
    /// `base_version`.
    pub async fn apply(
        &self,
        key: &ScopeKey,
        base_version: u64,
        steps: Vec<ClientStep>,
        comment_events: Vec<CommentEvent>,
    ) -> Result<Applied> {
        let instance = self.registry.get(key, None).await?;
        let applied = {
            let mut locked = instance.lock();
            locked.apply(base_version, steps, comment_events)?
        };
        self.scheduler.schedule_flush();
        Ok(applied)
    }

    /// Poll for changes since the versions the caller has seen.
    pub async fn diff_since(
        &self,
        key: &ScopeKey,
        version: u64,
        comment_version: u64,
        cursor_version: u64,
    ) -> Result<Diff> {
        let instance = self.registry.get(key, None).await?;
        let diff = instance
            .lock()
            .diff_since(version, comment_version, cursor_version)?;
        Ok(diff)
    }

    /// Move a member's cursor. Cursors are ephemeral, so no flush is
    /// scheduled.
    pub async fn update_cursor(
        &self,
        key: &ScopeKey,
        member: &Member,
        selection: Selection,
    ) -> Result<()> {
        let instance = self.registry.get(key, None).await?;
        instance.lock().update_cursor(member, selection);
        Ok(())
    }

    pub fn list_summary(&self) -> Vec<InstanceSummary> {
        self.registry.summaries()
    }

    /// Flush every dirty instance immediately, bypassing the debounce.
    /// Meant for shutdown.
    pub async fn flush_now(&self) {
        self.scheduler.flush_now().await;
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::step::Step;
    use crate::store::testing::TestStore;

    fn key() -> ScopeKey {
        ScopeKey::new("course", "lesson", "essay").unwrap()
    }

    fn member(email: &str, name: &str) -> Member {
        Member {
            email: email.into(),
            name: name.into(),
            durable_id: Some(format!("id-{email}")),
        }
    }

    fn insert(client: &str, pos: usize, text: &str) -> ClientStep {
        ClientStep {
            client_id: client.into(),
            step: Step::InsertText {
                pos,
                text: text.into(),
                marks: vec![],
            },
        }
    }

    fn engine(store: Arc<TestStore>) -> Engine {
        Engine::new(store, EngineConfig::default())
    }

    #[tokio::test]
    async fn test_two_clients_collaborate() {
        let engine = engine(Arc::new(TestStore::new()));
        let k = key();
        let ada = member("ada@x", "Ada");
        let bob = member("bob@x", "Bob");

        let state = engine.get(&k, Some(&ada)).await.unwrap();
        let Diff::Resync { version: 0, .. } = state else {
            panic!("expected fresh state");
        };
        engine.get(&k, Some(&bob)).await.unwrap();

        let applied = engine
            .apply(&k, 0, vec![insert("ada", 1, "hello")], vec![])
            .await
            .unwrap();
        assert_eq!(applied.version, 1);
        assert_eq!(applied.user_count, 2);

        // bob submits against the stale version and is rejected
        let err = engine
            .apply(&k, 0, vec![insert("bob", 1, "hi")], vec![])
            .await
            .unwrap_err();
        assert!(matches!(err, crate::error::Error::VersionMismatch { .. }));

        // bob catches up, then resubmits rebased input
        let diff = engine.diff_since(&k, 0, 0, 0).await.unwrap();
        let Diff::Events {
            version: 1,
            steps,
            user_count: 2,
            ..
        } = diff
        else {
            panic!("expected events");
        };
        assert_eq!(steps.len(), 1);

        let applied = engine
            .apply(&k, 1, vec![insert("bob", 6, "!")], vec![])
            .await
            .unwrap();
        assert_eq!(applied.version, 2);
    }

    #[tokio::test(start_paused = true)]
    async fn test_mutations_reach_the_store_after_the_delay() {
        let store = Arc::new(TestStore::new());
        let engine = engine(Arc::clone(&store));
        let k = key();

        engine.get(&k, Some(&member("ada@x", "Ada"))).await.unwrap();
        engine
            .apply(&k, 0, vec![insert("ada", 1, "hello")], vec![])
            .await
            .unwrap();
        assert_eq!(store.write_count(), 0);

        tokio::time::sleep(Duration::from_secs(61)).await;
        assert_eq!(store.write_count(), 1);
        let record = store.get(&k).unwrap();
        assert_eq!(record.version, 1);
        assert_eq!(record.users.len(), 1);
    }

    #[tokio::test]
    async fn test_remove_presence_sweeps_all_documents() {
        let engine = engine(Arc::new(TestStore::new()));
        let ada = member("ada@x", "Ada");
        let k1 = key();
        let k2 = ScopeKey::new("course", "lesson", "notes").unwrap();
        engine.get(&k1, Some(&ada)).await.unwrap();
        engine.get(&k2, Some(&ada)).await.unwrap();
        engine
            .update_cursor(&k1, &ada, Selection::caret(1))
            .await
            .unwrap();

        engine.remove_presence(&ada);

        for k in [&k1, &k2] {
            let diff = engine.diff_since(k, 0, 0, 0).await.unwrap();
            match diff {
                Diff::Events { user_count, .. } => assert_eq!(user_count, 0),
                Diff::Unchanged => {}
                other => panic!("unexpected diff {other:?}"),
            }
        }
    }

    #[tokio::test]
    async fn test_flush_now_persists_without_waiting() {
        let store = Arc::new(TestStore::new());
        let engine = engine(Arc::clone(&store));
        let k = key();
        engine.get(&k, Some(&member("ada@x", "Ada"))).await.unwrap();
        engine
            .apply(&k, 0, vec![insert("ada", 1, "bye")], vec![])
            .await
            .unwrap();

        engine.flush_now().await;
        assert_eq!(store.get(&k).unwrap().doc.text_content(), "bye");

        let summaries = engine.list_summary();
        assert_eq!(summaries.len(), 1);
        assert!(!summaries[0].dirty);
    }
}
