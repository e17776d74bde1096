//! Message-related type definitions
//!
//! Two layers of messages live here: the user-facing chat transcript kept by
//! the session state machine, and the model-facing messages exchanged with the
//! model-interaction transport.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use super::identifiers::{CheckpointId, MessageId};

// ============================================================================
// Model Messages
// ============================================================================

/// Role of a message author
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ChatRole {
    /// Human user
    User,
    /// Model output
    Assistant,
    /// Tool execution results fed back to the model
    Tool,
    /// System instructions
    System,
}

/// Content block types
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum ContentBlock {
    /// Text content block
    Text {
        /// Text content
        text: String,
    },
    /// Tool use request
    ToolUse {
        /// Tool call ID
        id: String,
        /// Tool name
        name: String,
        /// Tool input parameters
        input: serde_json::Value,
    },
    /// Tool execution result
    ToolResult {
        /// ID of the tool call this is a result for
        tool_use_id: String,
        /// Tool name
        name: String,
        /// Structured tool output
        content: serde_json::Value,
    },
}

/// A message as exchanged with the model
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ModelMessage {
    /// Author role
    pub role: ChatRole,
    /// Message content blocks
    pub content: Vec<ContentBlock>,
}

impl ModelMessage {
    /// Single text block authored by the user
    pub fn user_text(text: impl Into<String>) -> Self {
        Self {
            role: ChatRole::User,
            content: vec![ContentBlock::Text { text: text.into() }],
        }
    }

    /// Single text block authored by the system
    pub fn system_text(text: impl Into<String>) -> Self {
        Self {
            role: ChatRole::System,
            content: vec![ContentBlock::Text { text: text.into() }],
        }
    }

    /// Assistant message assembled from streamed blocks
    #[must_use]
    pub const fn assistant(content: Vec<ContentBlock>) -> Self {
        Self {
            role: ChatRole::Assistant,
            content,
        }
    }

    /// Concatenated text of every text block
    #[must_use]
    pub fn text(&self) -> String {
        self.content
            .iter()
            .filter_map(|block| match block {
                ContentBlock::Text { text } => Some(text.as_str()),
                _ => None,
            })
            .collect()
    }
}

// ============================================================================
// Chat Transcript
// ============================================================================

/// One immutable entry of the chat transcript
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ChatMessage {
    /// Message id
    pub id: MessageId,
    /// Author role
    pub role: ChatRole,
    /// Displayed content
    pub content: String,
    /// Checkpoint captured right before this message was acted on
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub checkpoint_id: Option<CheckpointId>,
    /// Model messages produced while answering this message
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub model_messages: Vec<ModelMessage>,
    /// Rendered UI response for this message
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub ui_response: Option<String>,
    /// Creation time
    pub timestamp: DateTime<Utc>,
}

impl ChatMessage {
    /// New user message with a generated id
    pub fn user(content: impl Into<String>) -> Self {
        Self {
            id: MessageId::generate(),
            role: ChatRole::User,
            content: content.into(),
            checkpoint_id: None,
            model_messages: Vec::new(),
            ui_response: None,
            timestamp: Utc::now(),
        }
    }
}

/// A file attached to a prompt by the user
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct FileAttachment {
    /// File name as shown to the user
    pub file_name: String,
    /// File content
    pub content: String,
}
