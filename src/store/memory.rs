//! In-process `SessionStore` backed by hash maps. State is lost on exit.

use std::collections::HashMap;

use async_trait::async_trait;
use tokio::sync::RwLock;

use crate::error::StoreError;
use crate::intake::{SequencerState, UserProfile};
use crate::store::traits::SessionStore;

#[derive(Default)]
struct Tables {
    states: HashMap<String, SequencerState>,
    profiles: HashMap<String, UserProfile>,
}

/// Memory-only store. Both maps sit behind one lock so a commit is atomic.
#[derive(Default)]
pub struct MemoryStore {
    tables: RwLock<Tables>,
}

impl MemoryStore {
    pub fn new() -> Self {
        Self::default()
    }

    /// Number of conversations with stored state.
    pub async fn conversation_count(&self) -> usize {
        self.tables.read().await.states.len()
    }
}

#[async_trait]
impl SessionStore for MemoryStore {
    async fn load_state(&self, conversation_id: &str) -> Result<Option<SequencerState>, StoreError> {
        Ok(self.tables.read().await.states.get(conversation_id).cloned())
    }

    async fn load_profile(&self, conversation_id: &str) -> Result<Option<UserProfile>, StoreError> {
        Ok(self.tables.read().await.profiles.get(conversation_id).cloned())
    }

    async fn commit_turn(
        &self,
        state: &SequencerState,
        profile: Option<&UserProfile>,
        expected_revision: Option<u64>,
    ) -> Result<(), StoreError> {
        let mut tables = self.tables.write().await;
        let stored = tables
            .states
            .get(&state.conversation_id)
            .map(|s| s.revision);
        if stored != expected_revision {
            return Err(StoreError::Conflict {
                conversation_id: state.conversation_id.clone(),
                expected: expected_revision,
            });
        }

        tables
            .states
            .insert(state.conversation_id.clone(), state.clone());
        if let Some(profile) = profile {
            tables
                .profiles
                .insert(state.conversation_id.clone(), profile.clone());
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::intake::{FlowVariant, Language};

    fn state(id: &str, revision: u64) -> SequencerState {
        let mut s = SequencerState::new(id, FlowVariant::Simple);
        s.revision = revision;
        s
    }

    fn profile() -> UserProfile {
        UserProfile {
            language: Language::En,
            name: "Amina".into(),
            county: "Nairobi".into(),
            subcounty: "Westlands".into(),
            ward: "Sub 1".into(),
            completed_at: None,
        }
    }

    #[tokio::test]
    async fn commit_then_load() {
        let store = MemoryStore::new();
        assert!(store.load_state("c1").await.unwrap().is_none());

        store.commit_turn(&state("c1", 1), Some(&profile()), None).await.unwrap();
        assert_eq!(store.load_state("c1").await.unwrap().unwrap().revision, 1);
        assert_eq!(store.load_profile("c1").await.unwrap().unwrap().name, "Amina");
        assert_eq!(store.conversation_count().await, 1);
    }

    #[tokio::test]
    async fn stale_revision_is_rejected_without_writing() {
        let store = MemoryStore::new();
        store.commit_turn(&state("c1", 1), None, None).await.unwrap();
        store.commit_turn(&state("c1", 2), None, Some(1)).await.unwrap();

        let err = store
            .commit_turn(&state("c1", 2), Some(&profile()), Some(1))
            .await
            .unwrap_err();
        assert!(matches!(err, StoreError::Conflict { expected: Some(1), .. }));
        assert!(store.load_profile("c1").await.unwrap().is_none());
        assert_eq!(store.load_state("c1").await.unwrap().unwrap().revision, 2);
    }

    #[tokio::test]
    async fn first_commit_conflicts_when_state_exists() {
        let store = MemoryStore::new();
        store.commit_turn(&state("c1", 1), None, None).await.unwrap();
        assert!(store.commit_turn(&state("c1", 1), None, None).await.is_err());
    }
}
