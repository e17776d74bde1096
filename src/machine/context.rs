//! Mutable session context and its persisted snapshot

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use crate::types::{
    ApprovalMode, ChatMessage, Checkpoint, DatamapperRequest, FileAttachment, ModelMessage, Plan,
    ProjectId, RequestId, SessionId,
};

use super::state::ChatState;

/// A connector specification the agent is waiting for
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ConnectorSpecRequest {
    /// Pending request id
    pub request_id: RequestId,
    /// Specification supplied by the user
    pub spec: Option<serde_json::Value>,
    /// Whether the user provided a specification
    pub provided: bool,
    /// Whether the user skipped the request
    pub skipped: bool,
    /// Optional user comment
    pub comment: Option<String>,
}

/// Everything the lifecycle machine knows about the current session
#[derive(Debug, Clone, PartialEq)]
pub struct SessionContext {
    /// Session id; assigned on entering `Idle` when absent
    pub session_id: Option<SessionId>,
    /// Project the session belongs to
    pub project_id: ProjectId,
    /// Ordered chat transcript
    pub chat_history: Vec<ChatMessage>,
    /// Current plan
    pub current_plan: Option<Plan>,
    /// Index of the task being worked on; `None` before the first task
    pub current_task_index: Option<usize>,
    /// Last failure message
    pub error_message: Option<String>,
    /// Comment attached to the last plan/task approval or rejection
    pub approval_comment: Option<String>,
    /// Approval mode
    pub approval_mode: ApprovalMode,
    /// State to return to after a connector specification round-trip
    pub previous_state: Option<ChatState>,
    /// Outstanding connector specification request
    pub connector_spec: Option<ConnectorSpecRequest>,
    /// Whether the current generation plans before editing
    pub is_plan_mode: bool,
    /// Checkpoints, oldest first
    pub checkpoints: Vec<Checkpoint>,
    /// Whether accept/decline actions are visible
    pub show_review_actions: bool,
    /// Operation label of the current prompt
    pub operation_type: Option<String>,
    /// Files attached to the current prompt
    pub file_attachments: Vec<FileAttachment>,
    /// Code selected in the editor for the current prompt
    pub code_context: Option<String>,
    /// Running datamapper command
    pub command: Option<DatamapperRequest>,
    /// Files modified by the last command
    pub modified_files: Vec<String>,
}

impl SessionContext {
    /// Empty context for a project
    #[must_use]
    pub const fn new(project_id: ProjectId) -> Self {
        Self {
            session_id: None,
            project_id,
            chat_history: Vec::new(),
            current_plan: None,
            current_task_index: None,
            error_message: None,
            approval_comment: None,
            approval_mode: ApprovalMode::Manual,
            previous_state: None,
            connector_spec: None,
            is_plan_mode: false,
            checkpoints: Vec::new(),
            show_review_actions: false,
            operation_type: None,
            file_attachments: Vec::new(),
            code_context: None,
            command: None,
            modified_files: Vec::new(),
        }
    }

    /// Conversation so far as model messages
    ///
    /// Each entry contributes its own text followed by the model messages
    /// recorded for its turn.
    #[must_use]
    pub fn model_history(&self) -> Vec<ModelMessage> {
        self.chat_history
            .iter()
            .flat_map(|message| {
                std::iter::once(ModelMessage {
                    role: message.role,
                    content: vec![crate::types::ContentBlock::Text {
                        text: message.content.clone(),
                    }],
                })
                .chain(message.model_messages.iter().cloned())
            })
            .collect()
    }

    /// Snapshot of the persisted subset
    #[must_use]
    pub fn snapshot(&self) -> SessionSnapshot {
        SessionSnapshot {
            session_id: self.session_id.clone(),
            project_id: self.project_id.clone(),
            chat_history: self.chat_history.clone(),
            current_plan: self.current_plan.clone(),
            current_task_index: self.current_task_index,
            checkpoints: self.checkpoints.clone(),
            approval_mode: self.approval_mode,
            is_plan_mode: self.is_plan_mode,
            saved_at: Utc::now(),
        }
    }

    /// Rehydrate the persisted subset from a snapshot
    pub fn restore(&mut self, snapshot: SessionSnapshot) {
        self.session_id = snapshot.session_id;
        self.chat_history = snapshot.chat_history;
        self.current_plan = snapshot.current_plan;
        self.current_task_index = snapshot.current_task_index;
        self.checkpoints = snapshot.checkpoints;
        self.approval_mode = snapshot.approval_mode;
        self.is_plan_mode = snapshot.is_plan_mode;
        self.error_message = None;
        self.show_review_actions = false;
    }
}

/// Persisted subset of a session, keyed by project id
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct SessionSnapshot {
    /// Session id
    pub session_id: Option<SessionId>,
    /// Project id
    pub project_id: ProjectId,
    /// Chat transcript
    pub chat_history: Vec<ChatMessage>,
    /// Current plan
    pub current_plan: Option<Plan>,
    /// Current task index
    pub current_task_index: Option<usize>,
    /// Checkpoints, oldest first
    pub checkpoints: Vec<Checkpoint>,
    /// Approval mode
    #[serde(default)]
    pub approval_mode: ApprovalMode,
    /// Plan mode of the last prompt
    #[serde(default)]
    pub is_plan_mode: bool,
    /// Save time
    pub saved_at: DateTime<Utc>,
}
