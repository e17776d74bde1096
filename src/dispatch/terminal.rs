//! Terminal event handlers
//!
//! Each handler runs the session bookkeeping for one way a generation can
//! end. The dispatcher calls at most one of them per generation.

use crate::error::Result;
use crate::machine::ChatEvent;
use crate::review::PendingReview;
use crate::telemetry::{GenerationInfo, TelemetryEvent};
use crate::types::{ChatRole, ModelMessage, Severity, UiEvent};
use crate::workspace::{integrate, measure_async};

use super::{DispatchServices, StreamContext};

/// Note appended to the transcript of an aborted generation
pub const ABORT_NOTIFICATION: &str = "<abort_notification>\n\
Generation stopped by user. The last in-progress task was not saved. Files have been \
reverted to the previous completed task state. Please redo the last task if needed.\n\
</abort_notification>";

/// Concatenated assistant text of a turn, if there is any
fn assistant_text(messages: &[ModelMessage]) -> Option<String> {
    let text: String = messages
        .iter()
        .filter(|m| m.role == ChatRole::Assistant)
        .map(ModelMessage::text)
        .collect();
    (!text.is_empty()).then_some(text)
}

fn info(services: &DispatchServices, ctx: &StreamContext) -> GenerationInfo {
    GenerationInfo {
        project_id: services.session.view().project_id,
        message_id: ctx.message_id.clone(),
    }
}

/// Close the scratch documents and remove the scratch workspace, if enabled
async fn release_scratch(services: &DispatchServices, ctx: &StreamContext) {
    if !ctx.should_cleanup {
        return;
    }
    if let Err(e) = services
        .language_server
        .did_close(&ctx.scratch_path, &ctx.projects)
        .await
    {
        log::warn!("[Agent] Failed to close scratch documents: {}", e);
    }
    services.workspaces.teardown(&ctx.scratch_path).await;
}

/// `abort`: keep the partial transcript and release the scratch workspace
///
/// # Errors
/// Never fails today; the signature matches the other handlers
pub async fn handle_abort(services: &DispatchServices, ctx: &mut StreamContext) -> Result<()> {
    log::info!("[Agent] Aborted by user");

    let partial = match ctx.response.take() {
        Some(response) => {
            match tokio::time::timeout(services.options.abort_response_timeout, response.wait())
                .await
            {
                Ok(Ok(response)) => Some(response.messages),
                Ok(Err(e)) => {
                    log::debug!("[Agent] No final response after abort: {}", e);
                    None
                }
                Err(_) => {
                    log::debug!("[Agent] Timed out waiting for the final response after abort");
                    None
                }
            }
        }
        None => None,
    };
    let mut messages = match partial {
        Some(messages) => messages,
        None => ctx.partial_messages(),
    };
    messages.push(ModelMessage::user_text(ABORT_NOTIFICATION));

    services.telemetry.record(&TelemetryEvent::GenerationAborted {
        info: info(services, ctx),
        duration_ms: ctx.elapsed_ms(),
        modified_files_count: ctx.modified_files.len(),
    });

    release_scratch(services, ctx).await;

    services.session.post(ChatEvent::UpdateChatMessage {
        message_id: ctx.message_id.clone(),
        ui_response: assistant_text(&messages),
        model_messages: messages,
    });
    ctx.emit(UiEvent::Abort);
    services.session.post(ChatEvent::FinishExecution);
    Ok(())
}

/// `error`: report the failure and release the scratch workspace
///
/// # Errors
/// Never fails today; the signature matches the other handlers
pub async fn handle_error(
    services: &DispatchServices,
    ctx: &mut StreamContext,
    error: &str,
) -> Result<()> {
    log::error!("[Agent] Error: {}", error);

    services.telemetry.record(&TelemetryEvent::GenerationFailed {
        info: info(services, ctx),
        duration_ms: ctx.elapsed_ms(),
        error_message: error.to_string(),
        error_type: "stream".to_string(),
    });

    release_scratch(services, ctx).await;

    ctx.emit(UiEvent::Error {
        content: error.to_string(),
    });
    services.session.post(ChatEvent::Error {
        message: error.to_string(),
    });
    Ok(())
}

/// `finish`: run final diagnostics, integrate and stage the review
///
/// # Errors
/// Returns error if the final response, the final diagnostics or the
/// integration fail
pub async fn handle_finish(services: &DispatchServices, ctx: &mut StreamContext) -> Result<()> {
    let messages = match ctx.response.take() {
        Some(response) => response.wait().await?.messages,
        None => ctx.partial_messages(),
    };

    let diagnostics = services
        .language_server
        .diagnostics(&ctx.scratch_path)
        .await?;
    let final_error_count = diagnostics
        .iter()
        .filter(|d| d.severity == Severity::Error)
        .count();
    ctx.emit(UiEvent::Diagnostics { diagnostics });

    let view = services.session.view();
    let output = measure_async(&ctx.scratch_path, &services.options).await;
    let modified_files = ctx.modified_files.to_vec();
    services.telemetry.record(&TelemetryEvent::GenerationCompleted {
        info: info(services, ctx),
        duration_ms: ctx.elapsed_ms(),
        modified_files_count: modified_files.len(),
        approval_mode: view.approval_mode.as_str().to_string(),
        diagnostic_check_count: ctx.diagnostic_check_count,
        total_compilation_errors: ctx.total_compilation_errors,
        final_error_count,
        error_codes: ctx.error_codes.iter().cloned().collect(),
        error_code_frequency: ctx.error_code_frequency.clone(),
        input: ctx.input_metrics,
        output,
    });

    if !services.options.test_isolation && !modified_files.is_empty() {
        integrate(&ctx.scratch_path, &modified_files, &ctx.execution).await?;
    }

    services.review.set(PendingReview {
        scratch_path: ctx.scratch_path.clone(),
        modified_files,
        execution: ctx.execution.clone(),
        projects: ctx.projects.clone(),
        should_cleanup: ctx.should_cleanup,
        created_at: tokio::time::Instant::now(),
        message_id: ctx.message_id.clone(),
    })
    .await;
    services.session.post(ChatEvent::ShowReviewActions);

    services.session.post(ChatEvent::UpdateChatMessage {
        message_id: ctx.message_id.clone(),
        ui_response: assistant_text(&messages),
        model_messages: messages,
    });
    ctx.emit(UiEvent::Stop);
    services.session.post(ChatEvent::FinishExecution);
    Ok(())
}
