//! Generation telemetry
//!
//! Emission itself belongs to the host; the engine only describes what
//! happened. [`LogTelemetry`] writes every event to the log.

use std::collections::BTreeMap;

use serde::{Deserialize, Serialize};

use crate::types::{CheckpointId, MessageId, ProjectId};
use crate::workspace::ProjectMetrics;

/// Context shared by every generation event
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct GenerationInfo {
    /// Project
    pub project_id: ProjectId,
    /// Transcript message the generation answers
    pub message_id: MessageId,
}

/// Telemetry event
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "event", rename_all = "snake_case")]
pub enum TelemetryEvent {
    /// A prompt was handed to the model
    #[serde(rename_all = "camelCase")]
    GenerationSubmitted {
        /// Generation
        #[serde(flatten)]
        info: GenerationInfo,
        /// Whether the prompt is in plan mode
        is_plan_mode: bool,
        /// Approval mode label
        approval_mode: String,
        /// Size of the real project before generation
        input: ProjectMetrics,
    },
    /// The stream finished normally
    #[serde(rename_all = "camelCase")]
    GenerationCompleted {
        /// Generation
        #[serde(flatten)]
        info: GenerationInfo,
        /// Wall time of the generation
        duration_ms: u64,
        /// Number of modified files
        modified_files_count: usize,
        /// Approval mode label
        approval_mode: String,
        /// Number of diagnostics tool runs during generation
        diagnostic_check_count: u32,
        /// Errors reported across those runs
        total_compilation_errors: usize,
        /// Errors left in the final diagnostics
        final_error_count: usize,
        /// Distinct error codes seen
        error_codes: Vec<String>,
        /// Occurrences per error code
        error_code_frequency: BTreeMap<String, u32>,
        /// Size of the real project before generation
        input: ProjectMetrics,
        /// Size of the scratch project after generation
        output: ProjectMetrics,
    },
    /// The stream reported an error
    #[serde(rename_all = "camelCase")]
    GenerationFailed {
        /// Generation
        #[serde(flatten)]
        info: GenerationInfo,
        /// Wall time until the failure
        duration_ms: u64,
        /// Error message
        error_message: String,
        /// Error kind
        error_type: String,
    },
    /// The user aborted the stream
    #[serde(rename_all = "camelCase")]
    GenerationAborted {
        /// Generation
        #[serde(flatten)]
        info: GenerationInfo,
        /// Wall time until the abort
        duration_ms: u64,
        /// Files modified before the abort
        modified_files_count: usize,
    },
    /// The session was rolled back to a checkpoint
    #[serde(rename_all = "camelCase")]
    GenerationReverted {
        /// Generation the checkpoint belongs to
        #[serde(flatten)]
        info: GenerationInfo,
        /// Restored checkpoint
        checkpoint_id: CheckpointId,
        /// Transcript entries dropped
        removed_messages: usize,
    },
}

impl TelemetryEvent {
    /// Event name
    #[must_use]
    pub const fn name(&self) -> &'static str {
        match self {
            Self::GenerationSubmitted { .. } => "agent.generation.submitted",
            Self::GenerationCompleted { .. } => "agent.generation.completed",
            Self::GenerationFailed { .. } => "agent.generation.failed",
            Self::GenerationAborted { .. } => "agent.generation.aborted",
            Self::GenerationReverted { .. } => "agent.generation.reverted",
        }
    }
}

/// Receiver of telemetry events
pub trait Telemetry: Send + Sync {
    /// Record one event
    fn record(&self, event: &TelemetryEvent);
}

impl<F> Telemetry for F
where
    F: Fn(&TelemetryEvent) + Send + Sync,
{
    fn record(&self, event: &TelemetryEvent) {
        self(event);
    }
}

/// Writes telemetry events to the log at info level
#[derive(Debug, Clone, Copy, Default)]
pub struct LogTelemetry;

impl Telemetry for LogTelemetry {
    fn record(&self, event: &TelemetryEvent) {
        match serde_json::to_string(event) {
            Ok(json) => log::info!("[Telemetry] {} {}", event.name(), json),
            Err(e) => log::warn!("[Telemetry] Failed to encode {}: {}", event.name(), e),
        }
    }
}
