//! Checkpoint coordination on top of the engine's snapshot backend.

use std::sync::Arc;

use tracing::{info, warn};

use ideascope_agent::{CheckpointBackend, EngineError};
use ideascope_core::{Checkpoint, CheckpointId};

/// Creates, lists, applies, and deletes named snapshots.
///
/// The strict operations return errors for the HTTP surface. The
/// `try_create` and `restore_best_effort` variants log failures and carry on,
/// which is what the run controller and approval gate need.
#[derive(Clone)]
pub struct CheckpointCoordinator {
    backend: Arc<dyn CheckpointBackend>,
}

impl CheckpointCoordinator {
    pub fn new(backend: Arc<dyn CheckpointBackend>) -> Self {
        Self { backend }
    }

    pub async fn create(&self, name: &str) -> Result<Checkpoint, EngineError> {
        let checkpoint = self.backend.create(name).await?;
        info!(checkpoint_id = %checkpoint.id, name = %checkpoint.name, "Checkpoint created");
        Ok(checkpoint)
    }

    pub async fn list(&self) -> Result<Vec<Checkpoint>, EngineError> {
        let mut checkpoints = self.backend.list().await?;
        checkpoints.sort_by(|a, b| b.created_at.cmp(&a.created_at));
        Ok(checkpoints)
    }

    pub async fn apply(&self, id: &CheckpointId) -> Result<(), EngineError> {
        self.backend.restore(id).await?;
        info!(checkpoint_id = %id, "Checkpoint applied");
        Ok(())
    }

    pub async fn delete(&self, id: &CheckpointId) -> Result<bool, EngineError> {
        let deleted = self.backend.delete(id).await?;
        if deleted {
            info!(checkpoint_id = %id, "Checkpoint deleted");
        }
        Ok(deleted)
    }

    /// Create a checkpoint, or log why not and return `None`.
    pub async fn try_create(&self, name: &str) -> Option<CheckpointId> {
        match self.create(name).await {
            Ok(checkpoint) => Some(checkpoint.id),
            Err(e) => {
                warn!(error = %e, name = %name, "Checkpoint creation failed, continuing without one");
                None
            }
        }
    }

    /// Apply a checkpoint before a run. On failure the run starts fresh.
    pub async fn restore_best_effort(&self, id: &CheckpointId) -> bool {
        match self.apply(id).await {
            Ok(()) => true,
            Err(e) => {
                warn!(error = %e, checkpoint_id = %id, "Checkpoint restore failed, starting fresh");
                false
            }
        }
    }
}
