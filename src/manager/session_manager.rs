//! Session manager
//!
//! Owns one [`ChatMachine`] and runs the effects its transitions return.
//! Every event, whether it comes from the caller or from background work,
//! goes through one queue and is applied by one pump task, so transitions
//! never interleave.

use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::{Arc, Weak};

use parking_lot::Mutex;
use tokio::sync::{mpsc, oneshot, watch};
use tokio::task::JoinHandle;
use tokio_util::sync::CancellationToken;

use crate::checkpoint::CheckpointManager;
use crate::dispatch::{DispatchServices, SessionBridge, SessionView};
use crate::error::{AgentError, Result};
use crate::machine::{ChatEvent, ChatMachine, ChatState, Effect, MachineConfig, SessionContext};
use crate::persistence::{MemorySessionStore, SessionStore};
use crate::review::{PendingReview, ReviewStaging};
use crate::services::{
    ConnectorGenerator, DatamapperService, LanguageServer, LibraryProvider, NoopLanguageServer,
    StaticLibraryProvider,
};
use crate::telemetry::{GenerationInfo, LogTelemetry, Telemetry, TelemetryEvent};
use crate::tools::{ConnectorDecision, Decision};
use crate::transport::ModelTransport;
use crate::types::{
    CheckpointId, DatamapperKind, EventSink, ExecutionContext, FileAttachment, ProjectId,
    RequestId, SessionOptions, UiEvent,
};
use crate::workspace::ScratchWorkspaces;

use super::approvals::PendingDecisions;
use super::{generation, review_actions};

// ============================================================================
// EVENT QUEUE
// ============================================================================

enum Internal {
    /// Apply an event; signal `done` once its effects have run
    Event(ChatEvent, Option<oneshot::Sender<()>>),
    /// Signal once everything queued before it has been applied
    Flush(oneshot::Sender<()>),
}

/// Non-blocking path from background work back into the machine
#[derive(Clone)]
pub(crate) struct SessionLink {
    tx: mpsc::UnboundedSender<Internal>,
    machine: Arc<Mutex<ChatMachine>>,
}

impl SessionBridge for SessionLink {
    fn post(&self, event: ChatEvent) {
        let name = event.name();
        if self.tx.send(Internal::Event(event, None)).is_err() {
            log::debug!("[Session] Dropped {} after shutdown", name);
        }
    }

    fn view(&self) -> SessionView {
        let machine = self.machine.lock();
        SessionView {
            project_id: machine.context().project_id.clone(),
            approval_mode: machine.context().approval_mode,
        }
    }
}

// ============================================================================
// SHARED STATE
// ============================================================================

pub(super) struct Inner {
    machine: Arc<Mutex<ChatMachine>>,
    state_tx: watch::Sender<ChatState>,
    pub(super) link: SessionLink,
    pub(super) options: Arc<SessionOptions>,
    pub(super) execution: ExecutionContext,
    pub(super) transport: Arc<dyn ModelTransport>,
    pub(super) language_server: Arc<dyn LanguageServer>,
    pub(super) libraries: Arc<dyn LibraryProvider>,
    pub(super) connectors: Option<Arc<dyn ConnectorGenerator>>,
    datamapper: Option<Arc<dyn DatamapperService>>,
    store: Arc<dyn SessionStore>,
    pub(super) telemetry: Arc<dyn Telemetry>,
    pub(super) sink: Arc<dyn EventSink>,
    pub(super) workspaces: ScratchWorkspaces,
    checkpoints: CheckpointManager,
    /// Resolves once the latest checkpoint capture has read the project
    capture_gate: Mutex<Option<oneshot::Receiver<()>>>,
    pub(super) review: Arc<ReviewStaging>,
    pub(super) decisions: Arc<PendingDecisions>,
    cancel: Mutex<CancellationToken>,
    generation_active: AtomicBool,
    tasks: Mutex<Vec<JoinHandle<()>>>,
    pump: Mutex<Option<JoinHandle<()>>>,
}

impl Drop for Inner {
    fn drop(&mut self) {
        self.cancel.lock().cancel();
        if let Some(handle) = self.pump.lock().take() {
            handle.abort();
        }
    }
}

impl Inner {
    /// Collaborators for one generation's stream dispatcher
    pub(super) fn dispatch_services(&self) -> DispatchServices {
        DispatchServices {
            workspaces: self.workspaces.clone(),
            language_server: Arc::clone(&self.language_server),
            telemetry: Arc::clone(&self.telemetry),
            review: Arc::clone(&self.review),
            session: Arc::new(self.link.clone()),
            options: Arc::clone(&self.options),
        }
    }

    fn track(&self, handle: JoinHandle<()>) {
        let mut tasks = self.tasks.lock();
        tasks.retain(|task| !task.is_finished());
        tasks.push(handle);
    }

    /// Wait for an in-flight checkpoint capture before touching the project
    ///
    /// A failed capture resolves the gate too.
    async fn await_capture(gate: Option<oneshot::Receiver<()>>) {
        if let Some(gate) = gate {
            let _ = gate.await;
        }
    }

    /// Fresh cancellation token for the next generation
    fn rearm_cancel(&self) -> CancellationToken {
        let token = CancellationToken::new();
        *self.cancel.lock() = token.clone();
        token
    }

    async fn process(self: &Arc<Self>, event: ChatEvent) {
        let (effects, state) = {
            let mut machine = self.machine.lock();
            let effects = machine.apply(event);
            (effects, machine.state())
        };
        self.state_tx.send_replace(state);

        for effect in effects {
            self.run_effect(effect).await;
        }
    }

    async fn run_effect(self: &Arc<Self>, effect: Effect) {
        match effect {
            Effect::PersistSnapshot(snapshot) => {
                if let Err(e) = self.store.save(&snapshot).await {
                    log::warn!("[Session] Failed to persist session: {}", e);
                }
            }
            Effect::ClearPersistedState(project_id) => {
                if let Err(e) = self.store.clear(&project_id).await {
                    log::warn!("[Session] Failed to clear persisted session: {}", e);
                }
            }
            Effect::CaptureCheckpoint { message_id } => {
                let (captured, gate) = oneshot::channel();
                *self.capture_gate.lock() = Some(gate);
                let inner = Arc::clone(self);
                self.track(tokio::spawn(async move {
                    match inner
                        .checkpoints
                        .capture(inner.execution.source_root(), message_id)
                        .await
                    {
                        Ok(checkpoint) => inner.link.post(ChatEvent::CheckpointCaptured {
                            checkpoint: Box::new(checkpoint),
                        }),
                        Err(e) => log::warn!("[Checkpoint] Capture failed: {}", e),
                    }
                    let _ = captured.send(());
                }));
            }
            Effect::RestoreWorkspace { checkpoint } => {
                let inner = Arc::clone(self);
                self.track(tokio::spawn(async move {
                    match inner
                        .checkpoints
                        .restore(inner.execution.source_root(), &checkpoint)
                        .await
                    {
                        Ok(()) => log::info!("[Checkpoint] Restored checkpoint {}", checkpoint.id),
                        Err(e) => log::error!(
                            "[Checkpoint] Failed to restore checkpoint {}: {}",
                            checkpoint.id,
                            e
                        ),
                    }
                }));
            }
            Effect::RecordRevert {
                message_id,
                checkpoint_id,
                removed_messages,
            } => {
                self.telemetry.record(&TelemetryEvent::GenerationReverted {
                    info: GenerationInfo {
                        project_id: self.link.view().project_id,
                        message_id,
                    },
                    checkpoint_id,
                    removed_messages,
                });
            }
            Effect::StartAgentGeneration(request) => {
                let cancel = self.rearm_cancel();
                self.generation_active.store(true, Ordering::SeqCst);
                let gate = self.capture_gate.lock().take();
                let inner = Arc::clone(self);
                self.track(tokio::spawn(async move {
                    Self::await_capture(gate).await;
                    let result = generation::generate_agent(&inner, *request, cancel).await;
                    inner.decisions.cancel_all();
                    inner.generation_active.store(false, Ordering::SeqCst);
                    match result {
                        Ok(termination) => log::debug!(
                            "[Agent] Generation ended ({:?}) in {}",
                            termination.reason,
                            termination.scratch_path.display()
                        ),
                        Err(e) => {
                            log::error!("[Agent] Generation failed: {}", e);
                            let message = e.user_message();
                            inner.sink.emit(UiEvent::Error {
                                content: message.clone(),
                            });
                            inner.link.post(ChatEvent::Error { message });
                        }
                    }
                }));
            }
            Effect::ExecuteDatamapper(request) => {
                let gate = self.capture_gate.lock().take();
                let inner = Arc::clone(self);
                self.track(tokio::spawn(async move {
                    Self::await_capture(gate).await;
                    let event = match &inner.datamapper {
                        Some(service) => match service.execute(&request, &inner.execution).await {
                            Ok(modified_files) => ChatEvent::DatamapperDone { modified_files },
                            Err(e) => {
                                log::error!("[Datamapper] {} failed: {}", request.kind.label(), e);
                                ChatEvent::DatamapperFailed {
                                    message: Some(e.user_message()),
                                }
                            }
                        },
                        None => ChatEvent::DatamapperFailed {
                            message: Some("Datamapper service is not configured".to_string()),
                        },
                    };
                    inner.link.post(event);
                }));
            }
        }
    }
}

async fn pump(inner: Weak<Inner>, mut rx: mpsc::UnboundedReceiver<Internal>) {
    while let Some(message) = rx.recv().await {
        let Some(inner) = inner.upgrade() else {
            break;
        };
        match message {
            Internal::Event(event, done) => {
                inner.process(event).await;
                if let Some(done) = done {
                    let _ = done.send(());
                }
            }
            Internal::Flush(done) => {
                let _ = done.send(());
            }
        }
    }
}

// ============================================================================
// PROMPT SUBMISSION
// ============================================================================

/// A user prompt with its optional extras
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct PromptSubmission {
    /// Prompt text
    pub prompt: String,
    /// Ask the agent to plan first
    pub is_plan_mode: bool,
    /// Operation label
    pub operation_type: Option<String>,
    /// Attached files
    pub file_attachments: Vec<FileAttachment>,
    /// Selected code
    pub code_context: Option<String>,
}

impl PromptSubmission {
    /// Plain prompt
    pub fn new(prompt: impl Into<String>) -> Self {
        Self {
            prompt: prompt.into(),
            ..Self::default()
        }
    }

    /// Ask the agent to plan first
    #[must_use]
    pub const fn plan_mode(mut self, enabled: bool) -> Self {
        self.is_plan_mode = enabled;
        self
    }

    /// Set the operation label
    #[must_use]
    pub fn operation_type(mut self, operation: impl Into<String>) -> Self {
        self.operation_type = Some(operation.into());
        self
    }

    /// Attach a file
    #[must_use]
    pub fn attach(mut self, file_name: impl Into<String>, content: impl Into<String>) -> Self {
        self.file_attachments.push(FileAttachment {
            file_name: file_name.into(),
            content: content.into(),
        });
        self
    }

    /// Set the selected code
    #[must_use]
    pub fn code_context(mut self, code: impl Into<String>) -> Self {
        self.code_context = Some(code.into());
        self
    }
}

// ============================================================================
// SESSION MANAGER
// ============================================================================

/// One agent chat session bound to a project
///
/// Cheap to clone; every clone drives the same session.
#[derive(Clone)]
pub struct SessionManager {
    inner: Arc<Inner>,
}

impl std::fmt::Debug for SessionManager {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("SessionManager")
            .field("project", &self.inner.execution.project_path)
            .field("state", &self.state())
            .finish_non_exhaustive()
    }
}

impl SessionManager {
    /// Start building a session for `execution`, talking to the model through `transport`
    pub fn builder(
        execution: ExecutionContext,
        transport: Arc<dyn ModelTransport>,
    ) -> SessionManagerBuilder {
        SessionManagerBuilder::new(execution, transport)
    }

    /// Restore the persisted session of this project, if there is one
    ///
    /// Returns whether a snapshot was restored. Unreadable snapshots are
    /// logged and the session starts fresh.
    pub async fn initialize(&self) -> bool {
        let project_id = self.project_id();
        let snapshot = match self.inner.store.load(&project_id).await {
            Ok(snapshot) => snapshot,
            Err(e) => {
                log::warn!("[Session] Failed to load persisted session: {}", e);
                None
            }
        };

        match snapshot {
            Some(snapshot) if snapshot.session_id.is_some() && snapshot.project_id == project_id => {
                log::info!(
                    "[Session] Restoring session with {} message(s)",
                    snapshot.chat_history.len()
                );
                self.send(ChatEvent::RestoreState {
                    snapshot: Box::new(snapshot),
                })
                .await;
                true
            }
            Some(_) => {
                log::debug!("[Session] Ignoring persisted session of another project");
                false
            }
            None => false,
        }
    }

    /// Project id of the session
    #[must_use]
    pub fn project_id(&self) -> ProjectId {
        self.inner.machine.lock().context().project_id.clone()
    }

    /// Current lifecycle state
    #[must_use]
    pub fn state(&self) -> ChatState {
        self.inner.machine.lock().state()
    }

    /// Copy of the current session context
    #[must_use]
    pub fn context(&self) -> SessionContext {
        self.inner.machine.lock().context().clone()
    }

    /// Watch lifecycle state changes
    #[must_use]
    pub fn subscribe(&self) -> watch::Receiver<ChatState> {
        self.inner.state_tx.subscribe()
    }

    /// Wait until the machine enters `state`
    pub async fn wait_for_state(&self, state: ChatState) {
        let mut rx = self.subscribe();
        let closed = rx.wait_for(|current| *current == state).await.is_err();
        if closed {
            log::debug!("[Session] State channel closed while waiting for {:?}", state);
        }
    }

    /// Whether a generation is streaming
    #[must_use]
    pub fn is_generating(&self) -> bool {
        self.inner.generation_active.load(Ordering::SeqCst)
    }

    /// Current pending review, if any
    #[must_use]
    pub fn pending_review(&self) -> Option<PendingReview> {
        self.inner.review.get()
    }

    /// Apply an event and run its effects
    pub async fn send(&self, event: ChatEvent) {
        let (done, rx) = oneshot::channel();
        if self.inner.link.tx.send(Internal::Event(event, Some(done))).is_ok() {
            let _ = rx.await;
        }
    }

    /// Queue an event without waiting for it
    pub fn post(&self, event: ChatEvent) {
        self.inner.link.post(event);
    }

    /// Wait for background work and every queued event
    ///
    /// Does not return while a generation is parked on a user decision.
    pub async fn flush(&self) {
        loop {
            let tasks = std::mem::take(&mut *self.inner.tasks.lock());
            let had_tasks = !tasks.is_empty();
            for task in tasks {
                if let Err(e) = task.await
                    && e.is_panic()
                {
                    log::error!("[Session] Background task panicked: {}", e);
                }
            }

            let (done, rx) = oneshot::channel();
            if self.inner.link.tx.send(Internal::Flush(done)).is_ok() {
                let _ = rx.await;
            }

            if !had_tasks && self.inner.tasks.lock().is_empty() {
                return;
            }
        }
    }

    fn ensure_idle_for(&self, what: &str) -> Result<()> {
        if self.is_generating() {
            return Err(AgentError::GenerationInProgress);
        }
        let state = self.state();
        if !state.accepts_prompt() {
            return Err(AgentError::invalid_state(format!("{what} in state {state:?}")));
        }
        Ok(())
    }

    /// Submit a prompt and start a generation
    ///
    /// # Errors
    /// Returns error if a generation is running or the session is waiting on
    /// a review
    pub async fn submit_agent_prompt(&self, submission: PromptSubmission) -> Result<()> {
        self.ensure_idle_for("submitting a prompt")?;
        self.send(ChatEvent::SubmitAgentPrompt {
            prompt: submission.prompt,
            is_plan_mode: submission.is_plan_mode,
            operation_type: submission.operation_type,
            file_attachments: submission.file_attachments,
            code_context: submission.code_context,
        })
        .await;
        Ok(())
    }

    /// Submit a datamapper command
    ///
    /// # Errors
    /// Returns error if a generation is running or the session is waiting on
    /// a review
    pub async fn submit_datamapper_request(
        &self,
        kind: DatamapperKind,
        params: serde_json::Value,
        user_message: Option<String>,
    ) -> Result<()> {
        self.ensure_idle_for("running the datamapper")?;
        self.send(ChatEvent::SubmitDatamapperRequest {
            kind,
            params,
            user_message,
        })
        .await;
        Ok(())
    }

    /// Stop the running generation
    ///
    /// The transport observes the cancellation and emits `abort`; parked
    /// decisions resolve as rejected.
    pub fn abort_generation(&self) {
        log::info!("[Agent] Abort requested");
        self.inner.cancel.lock().cancel();
        self.inner.decisions.cancel_all();
    }

    /// Switch auto approval on or off
    pub async fn set_auto_approve(&self, enabled: bool) {
        self.send(if enabled {
            ChatEvent::EnableAutoApprove
        } else {
            ChatEvent::DisableAutoApprove
        })
        .await;
    }

    /// Approve the proposed plan
    pub async fn approve_plan(&self, comment: Option<String>) {
        self.send(ChatEvent::ApprovePlan {
            comment: comment.clone(),
        })
        .await;
        if !self.inner.decisions.resolve_plan(Decision::Approved { comment }) {
            log::debug!("[Approval] No plan approval was waiting");
        }
    }

    /// Reject the proposed plan
    pub async fn reject_plan(&self, comment: Option<String>) {
        self.send(ChatEvent::RejectPlan {
            comment: comment.clone(),
        })
        .await;
        if !self.inner.decisions.resolve_plan(Decision::Rejected { comment }) {
            log::debug!("[Approval] No plan approval was waiting");
        }
    }

    /// Approve reviewed tasks up to `last_approved_task_index`, or the current one
    pub async fn approve_task(&self, last_approved_task_index: Option<usize>) {
        self.send(ChatEvent::ApproveTask {
            last_approved_task_index,
        })
        .await;
        if !self
            .inner
            .decisions
            .resolve_task(Decision::Approved { comment: None })
        {
            log::debug!("[Approval] No task review was waiting");
        }
    }

    /// Reject the current task
    pub async fn reject_task(&self, comment: Option<String>) {
        self.send(ChatEvent::RejectTask {
            comment: comment.clone(),
        })
        .await;
        if !self.inner.decisions.resolve_task(Decision::Rejected { comment }) {
            log::debug!("[Approval] No task review was waiting");
        }
    }

    /// Answer a connector request with a specification
    ///
    /// # Errors
    /// Returns error if no connector request is waiting under `request_id`
    pub async fn provide_connector_spec(
        &self,
        request_id: RequestId,
        spec: serde_json::Value,
    ) -> Result<()> {
        if !self.inner.decisions.has_connector(&request_id) {
            return Err(AgentError::request_not_found(request_id.as_str()));
        }
        self.send(ChatEvent::ProvideConnectorSpec {
            request_id: request_id.clone(),
            spec: spec.clone(),
        })
        .await;
        self.inner
            .decisions
            .resolve_connector(&request_id, ConnectorDecision::Provided(spec));
        Ok(())
    }

    /// Decline a connector request
    ///
    /// # Errors
    /// Returns error if no connector request is waiting under `request_id`
    pub async fn skip_connector_generation(
        &self,
        request_id: RequestId,
        comment: Option<String>,
    ) -> Result<()> {
        if !self.inner.decisions.has_connector(&request_id) {
            return Err(AgentError::request_not_found(request_id.as_str()));
        }
        self.send(ChatEvent::SkipConnectorGeneration {
            request_id: request_id.clone(),
            comment: comment.clone(),
        })
        .await;
        self.inner
            .decisions
            .resolve_connector(&request_id, ConnectorDecision::Skipped(comment));
        Ok(())
    }

    /// Apply the pending review to the real project and release it
    ///
    /// Returns false when no review was pending.
    ///
    /// # Errors
    /// Returns error if integration fails; the review is released regardless
    pub async fn accept_changes(&self) -> Result<bool> {
        review_actions::accept(self).await
    }

    /// Release the pending review without touching the real project
    ///
    /// Returns false when no review was pending.
    pub async fn decline_changes(&self) -> bool {
        review_actions::decline(self).await
    }

    /// Roll the transcript and project back to a checkpoint
    pub async fn restore_checkpoint(&self, checkpoint_id: CheckpointId) {
        self.send(ChatEvent::RestoreCheckpoint { checkpoint_id }).await;
    }

    /// Leave the `Error` state
    pub async fn retry(&self) {
        self.send(ChatEvent::Retry).await;
    }

    /// Start over, forgetting the persisted session
    pub async fn reset(&self) {
        self.send(ChatEvent::Reset).await;
    }

    /// Shut the session down: stop any generation and release the pending review
    pub async fn deactivate(&self) {
        self.abort_generation();
        self.inner.review.on_deactivate().await;
    }

    pub(super) fn inner(&self) -> &Arc<Inner> {
        &self.inner
    }
}

// ============================================================================
// BUILDER
// ============================================================================

/// Builder for [`SessionManager`]
pub struct SessionManagerBuilder {
    execution: ExecutionContext,
    transport: Arc<dyn ModelTransport>,
    options: SessionOptions,
    language_server: Arc<dyn LanguageServer>,
    libraries: Arc<dyn LibraryProvider>,
    connectors: Option<Arc<dyn ConnectorGenerator>>,
    datamapper: Option<Arc<dyn DatamapperService>>,
    store: Arc<dyn SessionStore>,
    telemetry: Arc<dyn Telemetry>,
    sink: Arc<dyn EventSink>,
}

impl SessionManagerBuilder {
    fn new(execution: ExecutionContext, transport: Arc<dyn ModelTransport>) -> Self {
        Self {
            execution,
            transport,
            options: SessionOptions::from_env(),
            language_server: Arc::new(NoopLanguageServer),
            libraries: Arc::new(StaticLibraryProvider::default()),
            connectors: None,
            datamapper: None,
            store: Arc::new(MemorySessionStore::new()),
            telemetry: Arc::new(LogTelemetry),
            sink: Arc::new(|_: UiEvent| {}),
        }
    }

    /// Set the engine options
    #[must_use]
    pub fn options(mut self, options: SessionOptions) -> Self {
        self.options = options;
        self
    }

    /// Set the language server
    #[must_use]
    pub fn language_server(mut self, language_server: Arc<dyn LanguageServer>) -> Self {
        self.language_server = language_server;
        self
    }

    /// Set the library catalogue
    #[must_use]
    pub fn libraries(mut self, libraries: Arc<dyn LibraryProvider>) -> Self {
        self.libraries = libraries;
        self
    }

    /// Enable connector generation
    #[must_use]
    pub fn connector_generator(mut self, generator: Arc<dyn ConnectorGenerator>) -> Self {
        self.connectors = Some(generator);
        self
    }

    /// Enable datamapper commands
    #[must_use]
    pub fn datamapper(mut self, service: Arc<dyn DatamapperService>) -> Self {
        self.datamapper = Some(service);
        self
    }

    /// Set the session store
    #[must_use]
    pub fn store(mut self, store: Arc<dyn SessionStore>) -> Self {
        self.store = store;
        self
    }

    /// Set the telemetry receiver
    #[must_use]
    pub fn telemetry(mut self, telemetry: Arc<dyn Telemetry>) -> Self {
        self.telemetry = telemetry;
        self
    }

    /// Set the UI event sink
    #[must_use]
    pub fn event_sink(mut self, sink: Arc<dyn EventSink>) -> Self {
        self.sink = sink;
        self
    }

    /// Build the session and start its event pump
    ///
    /// Must be called inside a Tokio runtime.
    #[must_use]
    pub fn build(self) -> SessionManager {
        let options = Arc::new(self.options);
        let config = MachineConfig {
            max_checkpoints: options.max_checkpoints,
            plan_mode_enabled: options.plan_mode_enabled,
        };
        let project_id = ProjectId::for_path(&self.execution.project_path);
        let machine = Arc::new(Mutex::new(ChatMachine::new(project_id, config)));
        let (state_tx, _) = watch::channel(ChatState::Idle);
        let (tx, rx) = mpsc::unbounded_channel();
        let workspaces = ScratchWorkspaces::new(Arc::clone(&options));

        let inner = Arc::new(Inner {
            link: SessionLink {
                tx,
                machine: Arc::clone(&machine),
            },
            machine,
            state_tx,
            checkpoints: CheckpointManager::new(Arc::clone(&options)),
            capture_gate: Mutex::new(None),
            review: Arc::new(ReviewStaging::new(workspaces.clone(), options.review_ttl)),
            workspaces,
            options,
            execution: self.execution,
            transport: self.transport,
            language_server: self.language_server,
            libraries: self.libraries,
            connectors: self.connectors,
            datamapper: self.datamapper,
            store: self.store,
            telemetry: self.telemetry,
            sink: self.sink,
            decisions: Arc::new(PendingDecisions::default()),
            cancel: Mutex::new(CancellationToken::new()),
            generation_active: AtomicBool::new(false),
            tasks: Mutex::new(Vec::new()),
            pump: Mutex::new(None),
        });

        let handle = tokio::spawn(pump(Arc::downgrade(&inner), rx));
        *inner.pump.lock() = Some(handle);

        SessionManager { inner }
    }
}
