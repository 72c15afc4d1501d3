//! In-process checkpoint store.

use std::collections::HashMap;

use async_trait::async_trait;
use tokio::sync::RwLock;

use crate::error::DatabaseError;
use crate::store::CheckpointStore;
use crate::workflow::state::ConversationState;

/// Checkpoints kept in memory. State is lost on restart.
#[derive(Debug, Default)]
pub struct InMemoryCheckpointStore {
    states: RwLock<HashMap<String, ConversationState>>,
}

impl InMemoryCheckpointStore {
    pub fn new() -> Self {
        Self::default()
    }
}

#[async_trait]
impl CheckpointStore for InMemoryCheckpointStore {
    async fn load_checkpoint(
        &self,
        conversation_id: &str,
    ) -> Result<Option<ConversationState>, DatabaseError> {
        Ok(self.states.read().await.get(conversation_id).cloned())
    }

    async fn save_checkpoint(
        &self,
        conversation_id: &str,
        state: &ConversationState,
    ) -> Result<(), DatabaseError> {
        let mut stored = state.clone();
        stored.profile = None;
        self.states
            .write()
            .await
            .insert(conversation_id.to_string(), stored);
        Ok(())
    }

    async fn delete_checkpoints_for_user(&self, user_id: &str) -> Result<u64, DatabaseError> {
        let mut states = self.states.write().await;
        let before = states.len();
        states.retain(|_, s| s.user_id != user_id);
        Ok((before - states.len()) as u64)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn save_load_delete() {
        let store = InMemoryCheckpointStore::new();
        store
            .save_checkpoint("c1", &ConversationState::new("u1"))
            .await
            .unwrap();
        store
            .save_checkpoint("c2", &ConversationState::new("u2"))
            .await
            .unwrap();

        assert_eq!(store.load_checkpoint("c1").await.unwrap().unwrap().user_id, "u1");
        assert!(store.load_checkpoint("missing").await.unwrap().is_none());

        assert_eq!(store.delete_checkpoints_for_user("u1").await.unwrap(), 1);
        assert!(store.load_checkpoint("c1").await.unwrap().is_none());
        assert!(store.load_checkpoint("c2").await.unwrap().is_some());
    }
}
