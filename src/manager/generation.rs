//! Agent generation runner
//!
//! Prepares a scratch workspace and the tool table, opens the transport and
//! drives the event feed through the [`StreamDispatcher`] until a terminal
//! event.

use std::path::PathBuf;
use std::sync::Arc;

use tokio_util::sync::CancellationToken;

use crate::dispatch::{SessionBridge, StreamContext, StreamDispatcher, Termination};
use crate::error::Result;
use crate::machine::ChatEvent;
use crate::telemetry::{GenerationInfo, TelemetryEvent};
use crate::tools::{ModifiedFiles, ToolBindings, ToolRegistry};
use crate::transport::GenerationRequest;
use crate::types::{AgentRequest, ModelMessage, UiEvent};
use crate::workspace::{ProjectMetrics, measure_async};

use super::approvals::GateHandle;
use super::prompts::{system_prompt, user_prompt};
use super::session_manager::Inner;

/// Run one agent generation to its terminal event
///
/// # Errors
/// Returns error if the scratch workspace cannot be prepared, the transport
/// cannot be opened, or a terminal handler fails
pub(super) async fn generate_agent(
    inner: &Arc<Inner>,
    request: AgentRequest,
    cancel: CancellationToken,
) -> Result<Termination> {
    log::info!(
        "[Agent] Starting generation for message {} (plan mode: {})",
        request.message_id,
        request.is_plan_mode
    );

    let input_metrics = measure_async(inner.execution.source_root(), &inner.options).await;
    let scratch = inner.workspaces.create(&inner.execution).await?;
    let should_cleanup = inner.options.should_cleanup();

    match run_in_scratch(inner, request, cancel, scratch.clone(), input_metrics).await {
        Ok(termination) => Ok(termination),
        Err(e) => {
            // A staged review still owns its scratch workspace.
            if should_cleanup && inner.review.get().is_none_or(|r| r.scratch_path != scratch) {
                inner.workspaces.teardown(&scratch).await;
            }
            Err(e)
        }
    }
}

async fn run_in_scratch(
    inner: &Arc<Inner>,
    request: AgentRequest,
    cancel: CancellationToken,
    scratch: PathBuf,
    input_metrics: ProjectMetrics,
) -> Result<Termination> {
    let projects = inner.workspaces.project_sources(&scratch, &inner.execution)?;
    if let Err(e) = inner
        .language_server
        .did_open(&scratch, &inner.execution.project_path, &projects)
        .await
    {
        log::warn!("[Agent] Language server did not accept the scratch workspace: {}", e);
    }

    let user_message = ModelMessage::user_text(user_prompt(&projects, &request));
    let mut messages = request.history.clone();
    messages.push(user_message.clone());

    let modified_files = ModifiedFiles::new();
    let gate = Arc::new(GateHandle::new(inner.link.clone(), Arc::clone(&inner.decisions)));
    let tools = ToolRegistry::for_generation(ToolBindings {
        scratch: scratch.clone(),
        modified_files: modified_files.clone(),
        language_server: Arc::clone(&inner.language_server),
        libraries: Arc::clone(&inner.libraries),
        connectors: inner.connectors.clone(),
        gate,
        cancel: cancel.clone(),
    })
    .await;
    log::debug!("[Agent] {} tools available", tools.definitions().len());

    let stream = inner
        .transport
        .open(
            GenerationRequest {
                system_prompt: system_prompt(&projects, &request),
                messages,
                max_steps: inner.options.max_steps,
                max_output_tokens: inner.options.max_output_tokens,
            },
            Arc::new(tools),
            cancel,
        )
        .await?;

    let view = inner.link.view();
    inner.link.post(ChatEvent::PlanningStarted);
    inner.telemetry.record(&TelemetryEvent::GenerationSubmitted {
        info: GenerationInfo {
            project_id: view.project_id,
            message_id: request.message_id.clone(),
        },
        is_plan_mode: request.is_plan_mode,
        approval_mode: view.approval_mode.as_str().to_string(),
        input: input_metrics,
    });
    inner.sink.emit(UiEvent::Start);

    let mut ctx = StreamContext::new(
        Arc::clone(&inner.sink),
        scratch,
        inner.execution.clone(),
        request.message_id,
    );
    ctx.modified_files = modified_files;
    ctx.projects = projects;
    ctx.should_cleanup = inner.options.should_cleanup();
    ctx.user_message = user_message;
    ctx.response = Some(stream.response);
    ctx.input_metrics = input_metrics;

    StreamDispatcher::new(inner.dispatch_services())
        .run(stream.events, &mut ctx)
        .await
}
