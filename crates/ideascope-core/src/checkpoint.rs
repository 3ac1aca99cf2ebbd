//! Checkpoint handle.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use crate::CheckpointId;

/// A named snapshot of execution state. The contents live in the engine; this
/// is only the handle used to apply or delete it.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Checkpoint {
    pub id: CheckpointId,
    pub name: String,
    pub created_at: DateTime<Utc>,
}

impl Checkpoint {
    pub fn new(name: impl Into<String>) -> Self {
        Self {
            id: CheckpointId::generate(),
            name: name.into(),
            created_at: Utc::now(),
        }
    }
}
