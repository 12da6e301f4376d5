//! Optional workflow checkpointing.
//!
//! A checkpointer lets a caller inspect or resume an in-progress workflow
//! by thread id. The verifier works without one, and deletes a thread's
//! state once its verdict is reached unless told to keep it.

use async_trait::async_trait;
use parking_lot::RwLock;
use std::collections::HashMap;
use thiserror::Error;
use veracity_core::WorkflowState;

/// Errors from a persistence backend.
#[derive(Error, Debug)]
pub enum PersistenceError {
    #[error("Checkpoint serialization failed: {0}")]
    Serialization(#[from] serde_json::Error),

    #[error("Checkpoint backend error: {0}")]
    Backend(String),
}

/// Stores workflow state between transitions.
#[async_trait]
pub trait Checkpointer: Send + Sync {
    async fn save(&self, thread_id: &str, state: &WorkflowState) -> Result<(), PersistenceError>;

    async fn load(&self, thread_id: &str) -> Result<Option<WorkflowState>, PersistenceError>;

    /// Drop the state saved for `thread_id`. Returns whether one existed.
    async fn delete(&self, thread_id: &str) -> Result<bool, PersistenceError>;
}

/// In-process checkpointer.
///
/// States are stored serialized so a loaded state never aliases the live one.
#[derive(Debug, Default)]
pub struct MemoryCheckpointer {
    states: RwLock<HashMap<String, serde_json::Value>>,
}

impl MemoryCheckpointer {
    pub fn new() -> Self {
        Self::default()
    }

    /// Number of threads with a saved state.
    pub fn len(&self) -> usize {
        self.states.read().len()
    }

    pub fn is_empty(&self) -> bool {
        self.states.read().is_empty()
    }
}

#[async_trait]
impl Checkpointer for MemoryCheckpointer {
    async fn save(&self, thread_id: &str, state: &WorkflowState) -> Result<(), PersistenceError> {
        let value = serde_json::to_value(state)?;
        self.states.write().insert(thread_id.to_string(), value);
        Ok(())
    }

    async fn load(&self, thread_id: &str) -> Result<Option<WorkflowState>, PersistenceError> {
        let value = self.states.read().get(thread_id).cloned();
        value
            .map(serde_json::from_value)
            .transpose()
            .map_err(PersistenceError::from)
    }

    async fn delete(&self, thread_id: &str) -> Result<bool, PersistenceError> {
        Ok(self.states.write().remove(thread_id).is_some())
    }
}
