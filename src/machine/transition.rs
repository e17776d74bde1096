//! Pure transition function of the session lifecycle machine
//!
//! [`ChatMachine::apply`] mutates state and context in place and returns the
//! effects the session manager must run. It performs no I/O, so every
//! `(state, event)` pair can be exercised directly in tests.

use crate::types::{
    AgentRequest, ApprovalMode, ChatMessage, DatamapperRequest, ProjectId, SessionId, TaskStatus,
};

use super::context::{ConnectorSpecRequest, SessionContext};
use super::state::{ChatEvent, ChatState, Effect};

/// Message stored when the datamapper fails without a message
const DATAMAPPER_FAILED_MESSAGE: &str = "Datamapper execution failed";

/// Static limits applied by the machine
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct MachineConfig {
    /// Maximum retained checkpoints
    pub max_checkpoints: usize,
    /// Whether prompts may request plan mode
    pub plan_mode_enabled: bool,
}

/// Result of handling one event before entry actions run
enum Step {
    /// Not handled in this state
    Ignore,
    /// Handled without leaving the current state
    Stay { effects: Vec<Effect>, persist: bool },
    /// Enter `target`, running its entry actions
    Enter { target: ChatState, effects: Vec<Effect> },
}

impl Step {
    const fn stay(persist: bool) -> Self {
        Self::Stay {
            effects: Vec::new(),
            persist,
        }
    }

    const fn enter(target: ChatState) -> Self {
        Self::Enter {
            target,
            effects: Vec::new(),
        }
    }
}

/// Session lifecycle state machine
#[derive(Debug, Clone, PartialEq)]
pub struct ChatMachine {
    state: ChatState,
    context: SessionContext,
    config: MachineConfig,
}

impl ChatMachine {
    /// Fresh machine in `Idle` for a project
    #[must_use]
    pub fn new(project_id: ProjectId, config: MachineConfig) -> Self {
        let mut context = SessionContext::new(project_id);
        context.session_id = Some(SessionId::generate());
        Self {
            state: ChatState::Idle,
            context,
            config,
        }
    }

    /// Machine positioned in an arbitrary state, for hosts restoring a live session
    #[must_use]
    pub const fn with_state(state: ChatState, context: SessionContext, config: MachineConfig) -> Self {
        Self {
            state,
            context,
            config,
        }
    }

    /// Current state
    #[must_use]
    pub const fn state(&self) -> ChatState {
        self.state
    }

    /// Current context
    #[must_use]
    pub const fn context(&self) -> &SessionContext {
        &self.context
    }

    /// Feed one event and return the effects to run
    ///
    /// Events that are not valid in the current state leave state and context
    /// untouched and return no effects.
    pub fn apply(&mut self, event: ChatEvent) -> Vec<Effect> {
        let name = event.name();
        let step = match self.handle_global(event) {
            Ok(step) => step,
            Err(event) => self.handle_local(event),
        };

        match step {
            Step::Ignore => {
                log::debug!("[Machine] {} ignored in {:?}", name, self.state);
                Vec::new()
            }
            Step::Stay {
                mut effects,
                persist,
            } => {
                if persist {
                    effects.push(self.persist_effect());
                }
                effects
            }
            Step::Enter {
                target,
                mut effects,
            } => {
                log::debug!("[Machine] {:?} --{}--> {:?}", self.state, name, target);
                self.state = target;
                if self.enter(target) {
                    effects.push(self.persist_effect());
                }
                effects
            }
        }
    }

    fn persist_effect(&self) -> Effect {
        Effect::PersistSnapshot(Box::new(self.context.snapshot()))
    }

    /// Entry actions; returns whether the snapshot should be persisted
    fn enter(&mut self, target: ChatState) -> bool {
        match target {
            ChatState::Idle => {
                if self.context.session_id.is_none() {
                    self.context.session_id = Some(SessionId::generate());
                }
                false
            }
            ChatState::ExecutingTask => {
                if let (Some(plan), Some(index)) = (
                    self.context.current_plan.as_mut(),
                    self.context.current_task_index,
                ) {
                    plan.set_status(index, TaskStatus::InProgress);
                }
                true
            }
            ChatState::Completed | ChatState::Error => {
                self.context.command = None;
                self.context.modified_files.clear();
                self.context.operation_type = None;
                true
            }
            _ => true,
        }
    }

    fn next_task_index(&self) -> usize {
        self.context
            .current_task_index
            .map_or(0, |index| index.saturating_add(1))
    }

    // ========================================================================
    // GLOBAL EVENTS
    // ========================================================================

    fn handle_global(&mut self, event: ChatEvent) -> Result<Step, ChatEvent> {
        let step = match event {
            ChatEvent::SubmitAgentPrompt {
                prompt,
                is_plan_mode,
                operation_type,
                file_attachments,
                code_context,
            } => {
                if !self.state.accepts_prompt() {
                    return Ok(Step::Ignore);
                }
                let history = self.context.model_history();
                let message = ChatMessage::user(prompt.clone());
                let message_id = message.id.clone();
                let ctx = &mut self.context;
                ctx.chat_history.push(message);
                ctx.error_message = None;
                ctx.show_review_actions = false;
                ctx.current_plan = None;
                ctx.current_task_index = None;
                ctx.approval_comment = None;
                ctx.is_plan_mode = is_plan_mode && self.config.plan_mode_enabled;
                ctx.operation_type = operation_type.clone();
                ctx.file_attachments = file_attachments.clone();
                ctx.code_context = code_context.clone();

                let request = AgentRequest {
                    message_id: message_id.clone(),
                    prompt,
                    history,
                    is_plan_mode: ctx.is_plan_mode,
                    operation_type,
                    file_attachments,
                    code_context,
                };
                Step::Enter {
                    target: ChatState::GeneratingPlan,
                    effects: vec![
                        Effect::CaptureCheckpoint { message_id },
                        Effect::StartAgentGeneration(Box::new(request)),
                    ],
                }
            }
            ChatEvent::SubmitDatamapperRequest {
                kind,
                params,
                user_message,
            } => {
                if !self.state.accepts_prompt() {
                    return Ok(Step::Ignore);
                }
                let content =
                    user_message.unwrap_or_else(|| format!("Generate {} mapping", kind.label()));
                let message = ChatMessage::user(content);
                let message_id = message.id.clone();
                let request = DatamapperRequest {
                    message_id: message_id.clone(),
                    kind,
                    params,
                };
                let ctx = &mut self.context;
                ctx.chat_history.push(message);
                ctx.error_message = None;
                ctx.show_review_actions = false;
                ctx.command = Some(request.clone());
                Step::Enter {
                    target: ChatState::ExecutingDatamapper,
                    effects: vec![
                        Effect::CaptureCheckpoint { message_id },
                        Effect::ExecuteDatamapper(request),
                    ],
                }
            }
            ChatEvent::UpdateChatMessage {
                message_id,
                model_messages,
                ui_response,
            } => {
                let Some(message) = self
                    .context
                    .chat_history
                    .iter_mut()
                    .find(|m| m.id == message_id)
                else {
                    return Ok(Step::Ignore);
                };
                message.model_messages = model_messages;
                if ui_response.is_some() {
                    message.ui_response = ui_response;
                }
                Step::stay(true)
            }
            ChatEvent::EnableAutoApprove => {
                self.context.approval_mode = ApprovalMode::Auto;
                Step::stay(true)
            }
            ChatEvent::DisableAutoApprove => {
                self.context.approval_mode = ApprovalMode::Manual;
                Step::stay(true)
            }
            ChatEvent::FinishExecution => {
                let pending = self
                    .context
                    .current_plan
                    .as_ref()
                    .is_some_and(crate::types::Plan::has_pending_tasks);
                Step::enter(if pending {
                    ChatState::PartiallyCompleted
                } else {
                    ChatState::Completed
                })
            }
            ChatEvent::ConnectorGenerationRequested {
                request_id,
                from_state,
            } => {
                let previous = from_state.unwrap_or(if self.state == ChatState::WaitingForConnectorSpec {
                    self.context
                        .previous_state
                        .unwrap_or(ChatState::GeneratingPlan)
                } else {
                    self.state
                });
                self.context.previous_state = Some(previous);
                self.context.connector_spec = Some(ConnectorSpecRequest {
                    request_id,
                    spec: None,
                    provided: false,
                    skipped: false,
                    comment: None,
                });
                Step::enter(ChatState::WaitingForConnectorSpec)
            }
            ChatEvent::Error { message } => {
                self.context.error_message = Some(message);
                Step::enter(ChatState::Error)
            }
            ChatEvent::Reset if self.state != ChatState::Error => {
                let project_id = self.context.project_id.clone();
                self.context = SessionContext::new(project_id.clone());
                Step::Enter {
                    target: ChatState::Idle,
                    effects: vec![Effect::ClearPersistedState(project_id)],
                }
            }
            ChatEvent::RestoreState { snapshot } => {
                self.context.restore(*snapshot);
                Step::enter(ChatState::Idle)
            }
            ChatEvent::RestoreCheckpoint { checkpoint_id } => {
                return Ok(self.restore_checkpoint(&checkpoint_id));
            }
            ChatEvent::CheckpointCaptured { checkpoint } => {
                let ctx = &mut self.context;
                let Some(message) = ctx
                    .chat_history
                    .iter_mut()
                    .find(|m| m.id == checkpoint.message_id)
                else {
                    log::debug!(
                        "[Machine] Dropping checkpoint {} for unknown message {}",
                        checkpoint.id,
                        checkpoint.message_id
                    );
                    return Ok(Step::Ignore);
                };
                message.checkpoint_id = Some(checkpoint.id.clone());
                ctx.checkpoints
                    .retain(|existing| existing.message_id != checkpoint.message_id);
                ctx.checkpoints.push(*checkpoint);
                let excess = ctx
                    .checkpoints
                    .len()
                    .saturating_sub(self.config.max_checkpoints);
                ctx.checkpoints.drain(..excess);
                Step::stay(true)
            }
            ChatEvent::ShowReviewActions => {
                self.context.show_review_actions = true;
                Step::stay(false)
            }
            ChatEvent::HideReviewActions => {
                self.context.show_review_actions = false;
                Step::stay(false)
            }
            other => return Err(other),
        };
        Ok(step)
    }

    fn restore_checkpoint(&mut self, checkpoint_id: &crate::types::CheckpointId) -> Step {
        let ctx = &mut self.context;
        let Some(position) = ctx.checkpoints.iter().position(|c| &c.id == checkpoint_id) else {
            log::warn!("[Machine] Checkpoint {} not found", checkpoint_id);
            return Step::Ignore;
        };
        let checkpoint = ctx.checkpoints[position].clone();
        let Some(message_index) = ctx
            .chat_history
            .iter()
            .position(|m| m.id == checkpoint.message_id)
        else {
            log::warn!(
                "[Machine] Message {} of checkpoint {} not found",
                checkpoint.message_id,
                checkpoint_id
            );
            return Step::Ignore;
        };

        let removed_messages = ctx.chat_history.len() - message_index;
        ctx.chat_history.truncate(message_index);
        ctx.checkpoints.truncate(position);
        ctx.current_plan = None;
        ctx.current_task_index = None;
        ctx.error_message = None;
        ctx.show_review_actions = false;

        let snapshot = Effect::PersistSnapshot(Box::new(ctx.snapshot()));
        Step::Enter {
            target: ChatState::Idle,
            effects: vec![
                Effect::RestoreWorkspace {
                    checkpoint: Box::new(checkpoint.clone()),
                },
                Effect::RecordRevert {
                    message_id: checkpoint.message_id,
                    checkpoint_id: checkpoint.id,
                    removed_messages,
                },
                snapshot,
            ],
        }
    }

    // ========================================================================
    // PER-STATE EVENTS
    // ========================================================================

    fn handle_local(&mut self, event: ChatEvent) -> Step {
        let ctx = &mut self.context;
        match (self.state, event) {
            (ChatState::GeneratingPlan, ChatEvent::PlanGenerated { plan })
            | (ChatState::RejectedTask, ChatEvent::PlanGenerated { plan }) => {
                ctx.current_plan = Some(plan);
                ctx.current_task_index = None;
                Step::enter(ChatState::PlanReview)
            }
            (ChatState::GeneratingPlan, ChatEvent::PlanningStarted) => Step::stay(false),
            (ChatState::PlanReview, ChatEvent::ApprovePlan { comment }) => {
                ctx.approval_comment = comment;
                ctx.current_task_index = None;
                Step::enter(ChatState::ApprovedPlan)
            }
            (ChatState::PlanReview, ChatEvent::RejectPlan { comment }) => {
                ctx.approval_comment = comment;
                Step::enter(ChatState::GeneratingPlan)
            }
            (ChatState::ApprovedPlan, ChatEvent::PlanningStarted) => {
                Step::enter(ChatState::GeneratingPlan)
            }
            (ChatState::ApprovedPlan, ChatEvent::StartTaskExecution)
            | (ChatState::RejectedTask, ChatEvent::StartTaskExecution)
            | (ChatState::PartiallyCompleted, ChatEvent::StartTaskExecution) => {
                let next = self.next_task_index();
                self.context.current_task_index = Some(next);
                Step::enter(ChatState::ExecutingTask)
            }
            (ChatState::ExecutingTask, ChatEvent::TaskCompleted) => {
                if let (Some(plan), Some(index)) =
                    (ctx.current_plan.as_mut(), ctx.current_task_index)
                {
                    plan.set_status(index, TaskStatus::Review);
                }
                Step::enter(ChatState::TaskReview)
            }
            (
                ChatState::TaskReview,
                ChatEvent::ApproveTask {
                    last_approved_task_index,
                },
            ) => {
                let last = last_approved_task_index.or(ctx.current_task_index);
                if let Some(mut last) = last {
                    if let Some(plan) = ctx.current_plan.as_mut() {
                        last = plan.clamp_index(last);
                        plan.complete_reviewed_through(last);
                    }
                    ctx.current_task_index = Some(last);
                }
                ctx.approval_comment = None;
                Step::enter(ChatState::ApprovedTask)
            }
            (ChatState::TaskReview, ChatEvent::RejectTask { comment }) => {
                // The rejected task is still marked completed; the agent redoes
                // it as the next task.
                if let (Some(plan), Some(index)) =
                    (ctx.current_plan.as_mut(), ctx.current_task_index)
                {
                    plan.set_status(index, TaskStatus::Completed);
                }
                ctx.approval_comment = comment;
                ctx.current_task_index = ctx.current_task_index.and_then(|i| i.checked_sub(1));
                Step::enter(ChatState::RejectedTask)
            }
            (ChatState::ApprovedTask, ChatEvent::StartTaskExecution) => {
                let next = self.next_task_index();
                let task_count = self
                    .context
                    .current_plan
                    .as_ref()
                    .map_or(0, |plan| plan.tasks.len());
                if next < task_count {
                    self.context.current_task_index = Some(next);
                    Step::enter(ChatState::ExecutingTask)
                } else {
                    Step::enter(ChatState::Completed)
                }
            }
            (ChatState::WaitingForConnectorSpec, ChatEvent::ProvideConnectorSpec { request_id, spec }) => {
                if let Some(request) = ctx.connector_spec.as_mut()
                    && request.request_id == request_id
                {
                    request.spec = Some(spec);
                    request.provided = true;
                }
                Step::enter(Self::connector_return_state(ctx.previous_state))
            }
            (
                ChatState::WaitingForConnectorSpec,
                ChatEvent::SkipConnectorGeneration {
                    request_id,
                    comment,
                },
            ) => {
                if let Some(request) = ctx.connector_spec.as_mut()
                    && request.request_id == request_id
                {
                    request.skipped = true;
                    request.comment = comment;
                }
                Step::enter(Self::connector_return_state(ctx.previous_state))
            }
            (ChatState::ExecutingDatamapper, ChatEvent::DatamapperDone { modified_files }) => {
                ctx.modified_files = modified_files;
                Step::enter(ChatState::Completed)
            }
            (ChatState::ExecutingDatamapper, ChatEvent::DatamapperFailed { message }) => {
                ctx.error_message =
                    Some(message.unwrap_or_else(|| DATAMAPPER_FAILED_MESSAGE.to_string()));
                Step::enter(ChatState::Error)
            }
            (ChatState::Error, ChatEvent::Retry) => {
                ctx.error_message = None;
                if ctx.current_plan.is_some() {
                    Step::enter(ChatState::PlanReview)
                } else {
                    Step::enter(ChatState::Idle)
                }
            }
            (ChatState::Error, ChatEvent::Reset) => Step::enter(ChatState::Idle),
            _ => Step::Ignore,
        }
    }

    const fn connector_return_state(previous: Option<ChatState>) -> ChatState {
        match previous {
            Some(ChatState::GeneratingPlan) => ChatState::GeneratingPlan,
            _ => ChatState::ExecutingTask,
        }
    }
}
