//! IntakeManager: runs one turn against the session store.
//!
//! Load, sequence, commit. The sequencer itself is pure; everything with a
//! side effect (timestamps, persistence, logging) happens here.

use std::sync::Arc;

use chrono::Utc;
use serde::Serialize;
use tracing::{debug, info, warn};

use crate::error::Result;
use crate::store::SessionStore;

use super::model::UserProfile;
use super::sequencer::{Flow, OutboundTurn};
use super::state::StepId;

/// One inbound user message.
#[derive(Debug, Clone)]
pub struct InboundTurn {
    pub conversation_id: String,
    pub text: String,
    /// Transport-assigned id, used to recognise redelivery.
    pub message_id: Option<String>,
}

impl InboundTurn {
    pub fn new(conversation_id: impl Into<String>, text: impl Into<String>) -> Self {
        Self {
            conversation_id: conversation_id.into(),
            text: text.into(),
            message_id: None,
        }
    }

    pub fn with_message_id(mut self, id: impl Into<String>) -> Self {
        self.message_id = Some(id.into());
        self
    }
}

/// Where a conversation stands.
#[derive(Debug, Clone, Serialize)]
pub struct IntakeStatus {
    /// A profile has been finalized for this conversation.
    pub completed: bool,
    /// Step the cursor is on; `None` before the first turn and after the end.
    pub step: Option<StepId>,
    pub awaiting_reply: bool,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub profile: Option<UserProfile>,
}

/// Coordinates turns: state loading, sequencing and the atomic commit.
pub struct IntakeManager {
    flow: Arc<Flow>,
    store: Arc<dyn SessionStore>,
}

impl IntakeManager {
    pub fn new(flow: Arc<Flow>, store: Arc<dyn SessionStore>) -> Self {
        Self { flow, store }
    }

    pub fn flow(&self) -> &Flow {
        &self.flow
    }

    /// Process one inbound message and return what to send back.
    ///
    /// A redelivered message gets the last stored reply again without
    /// touching state. For the latest message that is its own reply; an older
    /// one is dropped and the current prompt is repeated. If another turn
    /// for the conversation commits first, this returns a store conflict and
    /// nothing is written.
    pub async fn handle_turn(&self, inbound: &InboundTurn) -> Result<OutboundTurn> {
        let id = inbound.conversation_id.as_str();
        let stored = self.store.load_state(id).await?;

        if let (Some(state), Some(message_id)) = (&stored, &inbound.message_id) {
            if state.has_seen(message_id) {
                if let Some(previous) = &state.last_outbound {
                    if state.last_message_id.as_ref() == Some(message_id) {
                        info!(conversation_id = %id, %message_id, "Duplicate delivery, replaying reply");
                    } else {
                        info!(
                            conversation_id = %id,
                            %message_id,
                            "Stale redelivery dropped, repeating current prompt"
                        );
                    }
                    return Ok(previous.clone());
                }
            }
        }

        let expected_revision = stored.as_ref().map(|s| s.revision);
        let state = stored.unwrap_or_else(|| {
            debug!(conversation_id = %id, "New conversation");
            self.flow.new_state(id)
        });

        let turn = self.flow.run_turn(state, Some(inbound.text.as_str()))?;
        let mut next = turn.state;
        next.revision = expected_revision.map_or(1, |r| r + 1);
        next.last_message_id = inbound.message_id.clone();
        if let Some(message_id) = &inbound.message_id {
            next.remember_message(message_id);
        }
        next.last_outbound = Some(turn.outbound.clone());

        let profile = turn.profile.map(|mut p| {
            p.completed_at = Some(Utc::now());
            p
        });

        if let Err(e) = self
            .store
            .commit_turn(&next, profile.as_ref(), expected_revision)
            .await
        {
            warn!(conversation_id = %id, error = %e, "Failed to commit turn");
            return Err(e.into());
        }

        if let Some(profile) = &profile {
            info!(
                conversation_id = %id,
                county = %profile.county,
                language = %profile.language,
                "Profile finalized"
            );
        }
        info!(
            conversation_id = %id,
            step = ?next.current_step(),
            revision = next.revision,
            finished = turn.outbound.finished,
            "Turn complete"
        );

        Ok(turn.outbound)
    }

    /// The finalized profile for a conversation, if one has been written.
    pub async fn profile(&self, conversation_id: &str) -> Result<Option<UserProfile>> {
        Ok(self.store.load_profile(conversation_id).await?)
    }

    pub async fn status(&self, conversation_id: &str) -> Result<IntakeStatus> {
        let state = self.store.load_state(conversation_id).await?;
        let profile = self.store.load_profile(conversation_id).await?;
        Ok(IntakeStatus {
            completed: profile.is_some(),
            step: state.as_ref().and_then(|s| s.current_step()),
            awaiting_reply: state.as_ref().is_some_and(|s| s.awaiting_reply),
            profile,
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::error::{Error, StoreError};
    use crate::intake::{FlowSettings, FlowVariant};
    use crate::reference::CountyDirectory;
    use crate::store::MemoryStore;

    fn manager() -> (IntakeManager, Arc<MemoryStore>) {
        let dir = CountyDirectory::from_json(
            r#"[{"name": "Nairobi", "code": "047", "capital": "Nairobi City",
                 "sub_counties": ["Westlands", "Kibra"]}]"#,
        )
        .unwrap();
        let flow = Flow::new(FlowVariant::Simple, Arc::new(dir), FlowSettings::default()).unwrap();
        let store = Arc::new(MemoryStore::new());
        (IntakeManager::new(Arc::new(flow), store.clone()), store)
    }

    #[tokio::test]
    async fn revisions_increase_per_turn() {
        let (mgr, store) = manager();
        mgr.handle_turn(&InboundTurn::new("c1", "hi")).await.unwrap();
        mgr.handle_turn(&InboundTurn::new("c1", "English")).await.unwrap();
        let state = store.load_state("c1").await.unwrap().unwrap();
        assert_eq!(state.revision, 2);
        assert_eq!(state.current_step(), Some(StepId::Name));
    }

    #[tokio::test]
    async fn duplicate_message_id_replays_without_advancing() {
        let (mgr, store) = manager();
        mgr.handle_turn(&InboundTurn::new("c1", "hi")).await.unwrap();
        let first = mgr
            .handle_turn(&InboundTurn::new("c1", "English").with_message_id("m2"))
            .await
            .unwrap();
        let again = mgr
            .handle_turn(&InboundTurn::new("c1", "English").with_message_id("m2"))
            .await
            .unwrap();
        assert_eq!(first, again);
        assert_eq!(store.load_state("c1").await.unwrap().unwrap().revision, 2);
    }

    #[tokio::test]
    async fn older_message_id_is_not_applied_again() {
        let (mgr, store) = manager();
        mgr.handle_turn(&InboundTurn::new("c1", "hi").with_message_id("m1"))
            .await
            .unwrap();
        mgr.handle_turn(&InboundTurn::new("c1", "English").with_message_id("m2"))
            .await
            .unwrap();
        let current = mgr
            .handle_turn(&InboundTurn::new("c1", "Amina").with_message_id("m3"))
            .await
            .unwrap();

        let stale = mgr
            .handle_turn(&InboundTurn::new("c1", "English").with_message_id("m2"))
            .await
            .unwrap();
        assert_eq!(stale, current);
        let state = store.load_state("c1").await.unwrap().unwrap();
        assert_eq!(state.revision, 3);
        assert_eq!(state.current_step(), Some(StepId::County));
        assert_eq!(state.last_message_id.as_deref(), Some("m3"));
    }

    #[tokio::test]
    async fn profile_is_stamped_at_summary() {
        let (mgr, _store) = manager();
        for text in ["hi", "English", "Amina", "Nairobi", "Kibra"] {
            mgr.handle_turn(&InboundTurn::new("c1", text)).await.unwrap();
        }
        assert!(mgr.profile("c1").await.unwrap().is_none());
        mgr.handle_turn(&InboundTurn::new("c1", "ub")).await.unwrap();

        let status = mgr.status("c1").await.unwrap();
        assert!(status.completed);
        assert_eq!(status.step, Some(StepId::Summary));
        assert!(status.awaiting_reply);
        let profile = status.profile.unwrap();
        assert_eq!(profile.subcounty, "Kibra");
        assert!(profile.completed_at.is_some());
    }

    #[tokio::test]
    async fn status_of_unknown_conversation() {
        let (mgr, _store) = manager();
        let status = mgr.status("nobody").await.unwrap();
        assert!(!status.completed);
        assert!(status.step.is_none());
        assert!(!status.awaiting_reply);
    }

    #[tokio::test]
    async fn stale_commit_surfaces_conflict() {
        let (mgr, store) = manager();
        mgr.handle_turn(&InboundTurn::new("c1", "hi")).await.unwrap();

        // Another worker commits between our load and our commit.
        let mut raced = store.load_state("c1").await.unwrap().unwrap();
        raced.revision = 2;
        store.commit_turn(&raced, None, Some(1)).await.unwrap();
        let err = store.commit_turn(&raced, None, Some(1)).await.unwrap_err();
        assert!(matches!(err, StoreError::Conflict { .. }));

        let wrapped: Error = err.into();
        assert!(wrapped.to_string().contains("modified concurrently"));
    }
}
