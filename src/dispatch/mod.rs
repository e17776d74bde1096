//! Stream event dispatcher
//!
//! Consumes the transport's event feed one event at a time, in order. Text
//! and tool calls accumulate in the [`StreamContext`]; tool results are
//! routed to the first [`ToolResultDispatcher`] claiming the tool name.
//!
//! `error`, `abort` and `finish` are terminal: their handler does the
//! session bookkeeping once and returns [`StreamSignal::Terminate`], after
//! which no further event is read from the feed.

pub mod context;
pub mod terminal;
pub mod tool_result;

use std::path::PathBuf;
use std::sync::Arc;

use futures::StreamExt;
use serde_json::Value;

use crate::error::Result;
use crate::machine::ChatEvent;
use crate::review::ReviewStaging;
use crate::services::LanguageServer;
use crate::telemetry::Telemetry;
use crate::tools::LIBRARY_PROVIDER_TOOL;
use crate::transport::EventStream;
use crate::types::{
    ApprovalMode, ChatRole, ContentBlock, ModelMessage, ProjectId, SessionOptions, StreamEvent,
    ToolName,
};
use crate::workspace::ScratchWorkspaces;

pub use context::StreamContext;
pub use tool_result::{
    DefaultResultDispatcher, DiagnosticsResultDispatcher, FileResultDispatcher,
    LibraryResultDispatcher, TaskWriteResultDispatcher, ToolResultDispatcher,
    builtin_dispatchers,
};

// ============================================================================
// SIGNALS
// ============================================================================

/// Why a stream stopped
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum TerminalReason {
    /// `finish` event
    Finished,
    /// `abort` event
    Aborted,
    /// `error` event, or the feed ended without a terminal event
    Failed,
}

/// Result of a terminated stream
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Termination {
    /// Terminal event kind
    pub reason: TerminalReason,
    /// Scratch workspace of the generation
    pub scratch_path: PathBuf,
}

/// Outcome of handling one event
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum StreamSignal {
    /// Read the next event
    Continue,
    /// Stop reading
    Terminate(Termination),
}

// ============================================================================
// SESSION BRIDGE
// ============================================================================

/// Session facts the terminal handlers report in telemetry
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SessionView {
    /// Project of the session
    pub project_id: ProjectId,
    /// Current approval mode
    pub approval_mode: ApprovalMode,
}

/// Channel back into the session lifecycle machine
pub trait SessionBridge: Send + Sync {
    /// Queue a machine event; never blocks
    fn post(&self, event: ChatEvent);

    /// Current session facts
    fn view(&self) -> SessionView;
}

/// Collaborators the terminal handlers need
#[derive(Clone)]
pub struct DispatchServices {
    /// Scratch workspace teardown
    pub workspaces: ScratchWorkspaces,
    /// Language server
    pub language_server: Arc<dyn LanguageServer>,
    /// Telemetry receiver
    pub telemetry: Arc<dyn Telemetry>,
    /// Review staging area
    pub review: Arc<ReviewStaging>,
    /// Session lifecycle machine
    pub session: Arc<dyn SessionBridge>,
    /// Engine options
    pub options: Arc<SessionOptions>,
}

// ============================================================================
// DISPATCHER
// ============================================================================

/// Routes stream events to their handlers
pub struct StreamDispatcher {
    dispatchers: Vec<Box<dyn ToolResultDispatcher>>,
    fallback: DefaultResultDispatcher,
    services: DispatchServices,
}

impl StreamDispatcher {
    /// Dispatcher with the built-in tool-result dispatchers
    #[must_use]
    pub fn new(services: DispatchServices) -> Self {
        Self {
            dispatchers: builtin_dispatchers(),
            fallback: DefaultResultDispatcher,
            services,
        }
    }

    /// Add a tool-result dispatcher after the existing ones
    #[must_use]
    pub fn with_dispatcher(mut self, dispatcher: Box<dyn ToolResultDispatcher>) -> Self {
        self.dispatchers.push(dispatcher);
        self
    }

    /// Dispatcher responsible for `tool_name`
    #[must_use]
    pub fn dispatcher_for(&self, tool_name: &str) -> &dyn ToolResultDispatcher {
        self.dispatchers
            .iter()
            .find(|d| d.can_handle(tool_name))
            .map_or(&self.fallback as &dyn ToolResultDispatcher, |d| d.as_ref())
    }

    /// Drive the feed until a terminal event
    ///
    /// A feed that ends without a terminal event is handled as a failure so
    /// the session bookkeeping still runs exactly once.
    ///
    /// # Errors
    /// Returns error if a terminal handler hits an unexpected failure
    pub async fn run(&self, mut events: EventStream, ctx: &mut StreamContext) -> Result<Termination> {
        while let Some(event) = events.next().await {
            if let StreamSignal::Terminate(termination) = self.handle(event, ctx).await? {
                return Ok(termination);
            }
        }

        log::warn!("[Agent] Event stream ended without a terminal event");
        terminal::handle_error(&self.services, ctx, "Generation ended unexpectedly").await?;
        Ok(Termination {
            reason: TerminalReason::Failed,
            scratch_path: ctx.scratch_path.clone(),
        })
    }

    /// Handle one event
    ///
    /// # Errors
    /// Returns error if a terminal handler hits an unexpected failure
    pub async fn handle(&self, event: StreamEvent, ctx: &mut StreamContext) -> Result<StreamSignal> {
        ctx.events_processed += 1;
        log::trace!("[Agent] Stream event: {}", event.kind());

        let reason = match event {
            StreamEvent::TextDelta { text } => {
                ctx.push_text(&text);
                return Ok(StreamSignal::Continue);
            }
            StreamEvent::ToolCall {
                tool_call_id,
                tool_name,
                input,
            } => {
                record_tool_call(ctx, tool_call_id, &tool_name, input);
                return Ok(StreamSignal::Continue);
            }
            StreamEvent::ToolResult {
                tool_call_id,
                tool_name,
                input: _,
                output,
            } => {
                self.route_tool_result(ctx, tool_call_id, &tool_name, &output);
                return Ok(StreamSignal::Continue);
            }
            StreamEvent::Error { error } => {
                terminal::handle_error(&self.services, ctx, &error).await?;
                TerminalReason::Failed
            }
            StreamEvent::Abort => {
                terminal::handle_abort(&self.services, ctx).await?;
                TerminalReason::Aborted
            }
            StreamEvent::Finish { .. } => {
                terminal::handle_finish(&self.services, ctx).await?;
                TerminalReason::Finished
            }
        };

        Ok(StreamSignal::Terminate(Termination {
            reason,
            scratch_path: ctx.scratch_path.clone(),
        }))
    }

    fn route_tool_result(
        &self,
        ctx: &mut StreamContext,
        tool_call_id: String,
        tool_name: &ToolName,
        output: &Value,
    ) {
        ctx.flush_assistant();
        ctx.accumulated_messages.push(ModelMessage {
            role: ChatRole::Tool,
            content: vec![ContentBlock::ToolResult {
                tool_use_id: tool_call_id,
                name: tool_name.to_string(),
                content: output.clone(),
            }],
        });

        self.dispatcher_for(tool_name.as_str())
            .dispatch(tool_name, output, ctx);
    }
}

fn record_tool_call(ctx: &mut StreamContext, id: String, tool_name: &ToolName, input: Value) {
    if tool_name.as_str() == LIBRARY_PROVIDER_TOOL
        && let Some(names) = input.get("library_names").and_then(Value::as_array)
    {
        for name in names.iter().filter_map(Value::as_str) {
            if !ctx.selected_libraries.iter().any(|n| n == name) {
                ctx.selected_libraries.push(name.to_string());
            }
        }
    }

    ctx.current_assistant_content.push(ContentBlock::ToolUse {
        id,
        name: tool_name.to_string(),
        input,
    });
}
