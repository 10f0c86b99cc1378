//! `SessionStore` trait: the persistence contract for conversation state.

use async_trait::async_trait;

use crate::error::StoreError;
use crate::intake::{SequencerState, UserProfile};

/// Backend-agnostic store for sequencer state and finished profiles, keyed by
/// conversation id.
#[async_trait]
pub trait SessionStore: Send + Sync {
    /// Load the state saved by the last committed turn.
    async fn load_state(&self, conversation_id: &str) -> Result<Option<SequencerState>, StoreError>;

    /// Load the profile written when the flow last finalized one.
    async fn load_profile(&self, conversation_id: &str) -> Result<Option<UserProfile>, StoreError>;

    /// Persist the outcome of one turn.
    ///
    /// The state and, when present, the profile are written together or not
    /// at all. `expected_revision` is the revision read at the start of the
    /// turn (`None` for a conversation that had no stored state); if the
    /// stored revision no longer matches, nothing is written and
    /// `StoreError::Conflict` is returned.
    async fn commit_turn(
        &self,
        state: &SequencerState,
        profile: Option<&UserProfile>,
        expected_revision: Option<u64>,
    ) -> Result<(), StoreError>;
}
