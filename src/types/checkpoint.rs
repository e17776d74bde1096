//! Checkpoint type

use std::collections::BTreeMap;

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use super::identifiers::{CheckpointId, MessageId};

/// Immutable snapshot of project files tied to one transcript message
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Checkpoint {
    /// Checkpoint id
    pub id: CheckpointId,
    /// Message this checkpoint was captured for
    pub message_id: MessageId,
    /// File contents keyed by path relative to the project root
    pub files: BTreeMap<String, String>,
    /// Capture time
    pub created_at: DateTime<Utc>,
}

impl Checkpoint {
    /// New checkpoint with a generated id
    #[must_use]
    pub fn new(message_id: MessageId, files: BTreeMap<String, String>) -> Self {
        Self {
            id: CheckpointId::generate(),
            message_id,
            files,
            created_at: Utc::now(),
        }
    }
}
