//! Stream events, UI events and diagnostics
//!
//! [`StreamEvent`] is the closed set of records produced by the
//! model-interaction transport. [`UiEvent`] is the closed set of one-way
//! notifications the engine sends to the UI through an [`EventSink`].

use serde::{Deserialize, Serialize};
use tokio::sync::mpsc;

use super::identifiers::ToolName;

// ============================================================================
// Stream Events
// ============================================================================

/// One unit of the model-interaction event feed
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "kebab-case")]
pub enum StreamEvent {
    /// Incremental assistant text
    TextDelta {
        /// Text fragment
        text: String,
    },
    /// The model invoked a tool
    #[serde(rename_all = "camelCase")]
    ToolCall {
        /// Call id pairing the call with its result
        tool_call_id: String,
        /// Tool name
        tool_name: ToolName,
        /// Tool input
        input: serde_json::Value,
    },
    /// A tool finished
    #[serde(rename_all = "camelCase")]
    ToolResult {
        /// Call id pairing the result with its call
        tool_call_id: String,
        /// Tool name
        tool_name: ToolName,
        /// Tool input, echoed back
        #[serde(default)]
        input: serde_json::Value,
        /// Tool output
        output: serde_json::Value,
    },
    /// The transport failed
    Error {
        /// Error message reported by the transport
        error: String,
    },
    /// Generation was cancelled
    Abort,
    /// Generation completed
    #[serde(rename_all = "camelCase")]
    Finish {
        /// Reason reported by the model
        #[serde(default, skip_serializing_if = "Option::is_none")]
        finish_reason: Option<String>,
    },
}

impl StreamEvent {
    /// Short kind label used in logs
    #[must_use]
    pub const fn kind(&self) -> &'static str {
        match self {
            Self::TextDelta { .. } => "text-delta",
            Self::ToolCall { .. } => "tool-call",
            Self::ToolResult { .. } => "tool-result",
            Self::Error { .. } => "error",
            Self::Abort => "abort",
            Self::Finish { .. } => "finish",
        }
    }
}

// ============================================================================
// Diagnostics
// ============================================================================

/// Diagnostic severity
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Severity {
    /// Compilation error
    Error,
    /// Warning
    Warning,
    /// Informational
    Information,
    /// Hint
    Hint,
}

/// Zero-based line/character position
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct Position {
    /// Line
    pub line: u32,
    /// Character offset
    pub character: u32,
}

/// Source range of a diagnostic
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct Range {
    /// Start position
    pub start: Position,
    /// End position
    pub end: Position,
}

/// Structured diagnostic entry reported by the language server
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Diagnostic {
    /// File the diagnostic belongs to, relative to the project root
    pub file: String,
    /// Error code, if the language server reports one
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub code: Option<String>,
    /// Message
    pub message: String,
    /// Severity
    pub severity: Severity,
    /// Position range
    pub range: Range,
}

// ============================================================================
// UI Events
// ============================================================================

/// One-way notification sent to the UI
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum UiEvent {
    /// Generation started
    Start,
    /// A tool finished
    #[serde(rename_all = "camelCase")]
    ToolResult {
        /// Tool name
        tool_name: ToolName,
        /// Structured output for the UI, when the tool has one
        #[serde(default, skip_serializing_if = "Option::is_none")]
        tool_output: Option<serde_json::Value>,
    },
    /// Final diagnostics of the scratch workspace
    Diagnostics {
        /// Diagnostics
        diagnostics: Vec<Diagnostic>,
    },
    /// Generation aborted by the user
    Abort,
    /// Generation failed
    Error {
        /// Human-readable message
        content: String,
    },
    /// Generation finished
    Stop,
}

/// Callback accepting UI notifications
pub trait EventSink: Send + Sync {
    /// Deliver one notification; no reply is expected
    fn emit(&self, event: UiEvent);
}

impl<F> EventSink for F
where
    F: Fn(UiEvent) + Send + Sync,
{
    fn emit(&self, event: UiEvent) {
        self(event);
    }
}

/// Sink forwarding every notification into an unbounded channel
#[derive(Debug, Clone)]
pub struct ChannelSink {
    tx: mpsc::UnboundedSender<UiEvent>,
}

impl ChannelSink {
    /// Create a sink and the receiver draining it
    #[must_use]
    pub fn new() -> (Self, mpsc::UnboundedReceiver<UiEvent>) {
        let (tx, rx) = mpsc::unbounded_channel();
        (Self { tx }, rx)
    }
}

impl EventSink for ChannelSink {
    fn emit(&self, event: UiEvent) {
        if self.tx.send(event).is_err() {
            log::debug!("UI event receiver dropped; notification discarded");
        }
    }
}
