//! Inputs handed from the state machine to the generation services

use serde::{Deserialize, Serialize};

use super::identifiers::MessageId;
use super::messages::{FileAttachment, ModelMessage};

/// One agent generation, built from the transcript when a prompt is submitted
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct AgentRequest {
    /// Transcript message the generation answers
    pub message_id: MessageId,
    /// User prompt
    pub prompt: String,
    /// Model messages of earlier turns
    pub history: Vec<ModelMessage>,
    /// Whether the agent should plan before editing
    pub is_plan_mode: bool,
    /// Free-form operation label chosen by the UI
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub operation_type: Option<String>,
    /// Files attached to the prompt
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub file_attachments: Vec<FileAttachment>,
    /// Code selected in the editor
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub code_context: Option<String>,
}

/// Kinds of data mapping the datamapper service can generate
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum DatamapperKind {
    /// Mapping function
    Function,
    /// Inline mapping expression
    Inline,
    /// Context type definitions
    ContextTypes,
}

impl DatamapperKind {
    /// Display label
    #[must_use]
    pub const fn label(self) -> &'static str {
        match self {
            Self::Function => "function",
            Self::Inline => "inline",
            Self::ContextTypes => "context types",
        }
    }
}

/// A datamapper command recorded on the session while it executes
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct DatamapperRequest {
    /// Transcript message the command answers
    pub message_id: MessageId,
    /// Mapping kind
    pub kind: DatamapperKind,
    /// Kind-specific parameters
    pub params: serde_json::Value,
}
