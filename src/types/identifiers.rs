//! Newtype wrappers for type safety
//!
//! Session, project, message, checkpoint, tool and request identifiers are all
//! strings on the wire; wrapping them keeps them from being mixed up in the
//! state machine and the review staging area.

use std::path::Path;

use serde::{Deserialize, Serialize};
use uuid::Uuid;

// ============================================================================
// Newtype Wrappers for Type Safety
// ============================================================================

macro_rules! string_id {
    ($(#[$meta:meta])* $name:ident) => {
        $(#[$meta])*
        #[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
        #[serde(transparent)]
        pub struct $name(String);

        impl $name {
            /// Wrap an existing identifier
            pub fn new(id: impl Into<String>) -> Self {
                Self(id.into())
            }

            /// Get the identifier as a string slice
            #[must_use]
            pub fn as_str(&self) -> &str {
                &self.0
            }
        }

        impl From<String> for $name {
            fn from(s: String) -> Self {
                Self(s)
            }
        }

        impl From<&str> for $name {
            fn from(s: &str) -> Self {
                Self(s.to_string())
            }
        }

        impl std::fmt::Display for $name {
            fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
                f.write_str(&self.0)
            }
        }
    };
}

string_id!(
    /// Chat session identifier, regenerated whenever the machine is reset
    SessionId
);

string_id!(
    /// Project identifier derived from the real project path
    ProjectId
);

string_id!(
    /// Transcript message identifier
    MessageId
);

string_id!(
    /// Checkpoint identifier
    CheckpointId
);

string_id!(
    /// Tool name as exposed to the model
    ToolName
);

string_id!(
    /// Identifier of a decision the agent is waiting on (connector spec, approval)
    RequestId
);

impl SessionId {
    /// Generate a fresh random session id
    #[must_use]
    pub fn generate() -> Self {
        Self(Uuid::new_v4().to_string())
    }
}

impl MessageId {
    /// Generate a fresh random message id
    #[must_use]
    pub fn generate() -> Self {
        Self(Uuid::new_v4().to_string())
    }
}

impl CheckpointId {
    /// Generate a fresh random checkpoint id
    #[must_use]
    pub fn generate() -> Self {
        Self(Uuid::new_v4().to_string())
    }
}

impl RequestId {
    /// Generate a fresh random request id
    #[must_use]
    pub fn generate() -> Self {
        Self(Uuid::new_v4().to_string())
    }
}

impl ProjectId {
    /// Derive the project id for a project directory
    ///
    /// The id is stable across process restarts so that a persisted session
    /// can be matched back to the project it was recorded for.
    #[must_use]
    pub fn for_path(path: &Path) -> Self {
        let key = path.to_string_lossy();
        Self(Uuid::new_v5(&Uuid::NAMESPACE_URL, key.as_bytes()).to_string())
    }
}
