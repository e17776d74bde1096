//! States, events and effects of the session lifecycle machine

use serde::{Deserialize, Serialize};

use crate::types::{
    AgentRequest, Checkpoint, CheckpointId, DatamapperKind, DatamapperRequest,
    FileAttachment, MessageId, ModelMessage, Plan, ProjectId, RequestId,
};

use super::context::SessionSnapshot;

// ============================================================================
// STATES
// ============================================================================

/// Lifecycle state of a chat session
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum ChatState {
    /// Nothing in flight
    Idle,
    /// The agent is planning (or editing, without plan mode)
    GeneratingPlan,
    /// A plan is waiting for user approval
    PlanReview,
    /// The user approved the plan
    ApprovedPlan,
    /// The agent is working on the current task
    ExecutingTask,
    /// The current task is waiting for user approval
    TaskReview,
    /// The user approved the task
    ApprovedTask,
    /// The user rejected the task
    RejectedTask,
    /// Every task finished
    Completed,
    /// Generation finished with tasks left
    PartiallyCompleted,
    /// The agent asked for a connector specification
    WaitingForConnectorSpec,
    /// A datamapper command is running
    ExecutingDatamapper,
    /// Generation failed
    Error,
}

impl ChatState {
    /// Every state, in declaration order
    pub const ALL: [Self; 13] = [
        Self::Idle,
        Self::GeneratingPlan,
        Self::PlanReview,
        Self::ApprovedPlan,
        Self::ExecutingTask,
        Self::TaskReview,
        Self::ApprovedTask,
        Self::RejectedTask,
        Self::Completed,
        Self::PartiallyCompleted,
        Self::WaitingForConnectorSpec,
        Self::ExecutingDatamapper,
        Self::Error,
    ];

    /// Whether a new prompt may be submitted from this state
    ///
    /// Only states without a generation in flight accept prompts.
    #[must_use]
    pub const fn accepts_prompt(self) -> bool {
        matches!(
            self,
            Self::Idle | Self::Completed | Self::PartiallyCompleted | Self::Error
        )
    }
}

// ============================================================================
// EVENTS
// ============================================================================

/// Input to the session lifecycle machine
#[derive(Debug, Clone, PartialEq)]
pub enum ChatEvent {
    /// The user submitted an agent prompt
    SubmitAgentPrompt {
        /// Prompt text
        prompt: String,
        /// Whether the user asked for plan mode
        is_plan_mode: bool,
        /// Operation label chosen by the UI
        operation_type: Option<String>,
        /// Files attached to the prompt
        file_attachments: Vec<FileAttachment>,
        /// Code selected in the editor
        code_context: Option<String>,
    },
    /// The user submitted a datamapper request
    SubmitDatamapperRequest {
        /// Mapping kind
        kind: DatamapperKind,
        /// Kind-specific parameters
        params: serde_json::Value,
        /// Message shown in the transcript; defaults to "Generate <kind> mapping"
        user_message: Option<String>,
    },
    /// Attach model output to a transcript entry
    UpdateChatMessage {
        /// Transcript entry to update
        message_id: MessageId,
        /// Model messages of the turn
        model_messages: Vec<ModelMessage>,
        /// Rendered UI response
        ui_response: Option<String>,
    },
    /// Switch to auto approval
    EnableAutoApprove,
    /// Switch to manual approval
    DisableAutoApprove,
    /// The generation service (re)started planning
    PlanningStarted,
    /// The agent produced a plan
    PlanGenerated {
        /// The plan
        plan: Plan,
    },
    /// The user approved the plan
    ApprovePlan {
        /// Optional approval comment
        comment: Option<String>,
    },
    /// The user rejected the plan
    RejectPlan {
        /// Rejection comment passed back to the agent
        comment: Option<String>,
    },
    /// Move on to the next task
    StartTaskExecution,
    /// The agent finished the current task
    TaskCompleted,
    /// The user approved one or more tasks under review
    ApproveTask {
        /// Approve every reviewed task up to this index; defaults to the current one
        last_approved_task_index: Option<usize>,
    },
    /// The user rejected the current task
    RejectTask {
        /// Rejection comment passed back to the agent
        comment: Option<String>,
    },
    /// The generation stream ended
    FinishExecution,
    /// The datamapper command succeeded
    DatamapperDone {
        /// Files the datamapper wrote
        modified_files: Vec<String>,
    },
    /// The datamapper command failed
    DatamapperFailed {
        /// Failure message
        message: Option<String>,
    },
    /// The agent asked for a connector specification
    ConnectorGenerationRequested {
        /// Pending request id
        request_id: RequestId,
        /// State to return to once the spec is provided or skipped
        from_state: Option<ChatState>,
    },
    /// The user provided a connector specification
    ProvideConnectorSpec {
        /// Pending request id
        request_id: RequestId,
        /// The specification
        spec: serde_json::Value,
    },
    /// The user skipped connector generation
    SkipConnectorGeneration {
        /// Pending request id
        request_id: RequestId,
        /// Optional comment
        comment: Option<String>,
    },
    /// Something failed
    Error {
        /// Human-readable failure message
        message: String,
    },
    /// Retry after an error
    Retry,
    /// Drop the session and start over
    Reset,
    /// Rehydrate the session from a persisted snapshot
    RestoreState {
        /// Snapshot loaded from storage
        snapshot: Box<SessionSnapshot>,
    },
    /// Roll the session back to a checkpoint
    RestoreCheckpoint {
        /// Checkpoint to restore
        checkpoint_id: CheckpointId,
    },
    /// A background checkpoint capture finished
    CheckpointCaptured {
        /// The captured checkpoint
        checkpoint: Box<Checkpoint>,
    },
    /// Show accept/decline actions in the UI
    ShowReviewActions,
    /// Hide accept/decline actions in the UI
    HideReviewActions,
}

impl ChatEvent {
    /// Short event name used in logs
    #[must_use]
    pub const fn name(&self) -> &'static str {
        match self {
            Self::SubmitAgentPrompt { .. } => "SUBMIT_AGENT_PROMPT",
            Self::SubmitDatamapperRequest { .. } => "SUBMIT_DATAMAPPER_REQUEST",
            Self::UpdateChatMessage { .. } => "UPDATE_CHAT_MESSAGE",
            Self::EnableAutoApprove => "ENABLE_AUTO_APPROVE",
            Self::DisableAutoApprove => "DISABLE_AUTO_APPROVE",
            Self::PlanningStarted => "PLANNING_STARTED",
            Self::PlanGenerated { .. } => "PLAN_GENERATED",
            Self::ApprovePlan { .. } => "APPROVE_PLAN",
            Self::RejectPlan { .. } => "REJECT_PLAN",
            Self::StartTaskExecution => "START_TASK_EXECUTION",
            Self::TaskCompleted => "TASK_COMPLETED",
            Self::ApproveTask { .. } => "APPROVE_TASK",
            Self::RejectTask { .. } => "REJECT_TASK",
            Self::FinishExecution => "FINISH_EXECUTION",
            Self::DatamapperDone { .. } => "DATAMAPPER_DONE",
            Self::DatamapperFailed { .. } => "DATAMAPPER_FAILED",
            Self::ConnectorGenerationRequested { .. } => "CONNECTOR_GENERATION_REQUESTED",
            Self::ProvideConnectorSpec { .. } => "PROVIDE_CONNECTOR_SPEC",
            Self::SkipConnectorGeneration { .. } => "SKIP_CONNECTOR_GENERATION",
            Self::Error { .. } => "ERROR",
            Self::Retry => "RETRY",
            Self::Reset => "RESET",
            Self::RestoreState { .. } => "RESTORE_STATE",
            Self::RestoreCheckpoint { .. } => "RESTORE_CHECKPOINT",
            Self::CheckpointCaptured { .. } => "CHECKPOINT_CAPTURED",
            Self::ShowReviewActions => "SHOW_REVIEW_ACTIONS",
            Self::HideReviewActions => "HIDE_REVIEW_ACTIONS",
        }
    }
}

// ============================================================================
// EFFECTS
// ============================================================================

/// Side effect requested by a transition, executed by the session manager
#[derive(Debug, Clone, PartialEq)]
pub enum Effect {
    /// Save the snapshot taken at the end of the transition
    PersistSnapshot(Box<SessionSnapshot>),
    /// Remove the persisted snapshot of a project
    ClearPersistedState(ProjectId),
    /// Capture a checkpoint of the real project in the background
    CaptureCheckpoint {
        /// Message the checkpoint belongs to
        message_id: MessageId,
    },
    /// Write a checkpoint back to the real project
    RestoreWorkspace {
        /// Checkpoint to restore
        checkpoint: Box<Checkpoint>,
    },
    /// Record that the session was reverted to a checkpoint
    RecordRevert {
        /// Owning message of the restored checkpoint
        message_id: MessageId,
        /// Restored checkpoint
        checkpoint_id: CheckpointId,
        /// Number of transcript entries dropped
        removed_messages: usize,
    },
    /// Start an agent generation
    StartAgentGeneration(Box<AgentRequest>),
    /// Run a datamapper command
    ExecuteDatamapper(DatamapperRequest),
}
