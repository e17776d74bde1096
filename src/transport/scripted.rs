//! Deterministic transport replaying a fixed script
//!
//! Useful for dry runs and tests: tool calls in the script are executed
//! against the real tool table, so file edits, diagnostics and approvals go
//! through the same code paths as a live model.

use std::sync::Arc;

use async_trait::async_trait;
use parking_lot::Mutex;
use serde_json::json;
use tokio_util::sync::CancellationToken;

use crate::error::{AgentError, Result};
use crate::tools::ToolRegistry;
use crate::types::{ContentBlock, ModelMessage, StreamEvent, ToolName};

use super::{FinalResponse, GenerationRequest, GenerationStream, ModelTransport, ResponseHandle};

/// One step of a script
#[derive(Debug, Clone, PartialEq)]
pub enum ScriptStep {
    /// Yield an event as is
    Emit(StreamEvent),
    /// Run a tool and yield its `tool-call` and `tool-result` events
    CallTool {
        /// Tool name
        name: String,
        /// Tool input
        input: serde_json::Value,
    },
    /// Block until the generation is cancelled
    WaitForCancel,
}

/// Transport replaying a script on every `open`
#[derive(Debug, Default)]
pub struct ScriptedTransport {
    script: Vec<ScriptStep>,
    requests: Mutex<Vec<GenerationRequest>>,
}

impl ScriptedTransport {
    /// Create a transport replaying `script`
    #[must_use]
    pub fn new(script: Vec<ScriptStep>) -> Self {
        Self {
            script,
            requests: Mutex::new(Vec::new()),
        }
    }

    /// Requests received so far
    #[must_use]
    pub fn requests(&self) -> Vec<GenerationRequest> {
        self.requests.lock().clone()
    }
}

#[async_trait]
impl ModelTransport for ScriptedTransport {
    async fn open(
        &self,
        request: GenerationRequest,
        tools: Arc<ToolRegistry>,
        cancel: CancellationToken,
    ) -> Result<GenerationStream> {
        self.requests.lock().push(request);
        let script = self.script.clone();
        let (response_tx, response) = ResponseHandle::channel();

        let events = async_stream::stream! {
            let mut response_tx = Some(response_tx);
            let mut messages: Vec<ModelMessage> = Vec::new();
            let mut assistant: Vec<ContentBlock> = Vec::new();

            for (index, step) in script.into_iter().enumerate() {
                if cancel.is_cancelled() {
                    if let Some(tx) = response_tx.take() {
                        let _ = tx.send(Err(AgentError::transport("Generation aborted")));
                    }
                    yield StreamEvent::Abort;
                    return;
                }

                match step {
                    ScriptStep::Emit(event) => {
                        match &event {
                            StreamEvent::TextDelta { text } => {
                                assistant.push(ContentBlock::Text { text: text.clone() });
                            }
                            StreamEvent::Finish { .. } => {
                                if !assistant.is_empty() {
                                    messages.push(ModelMessage::assistant(std::mem::take(&mut assistant)));
                                }
                                if let Some(tx) = response_tx.take() {
                                    let _ = tx.send(Ok(FinalResponse {
                                        messages: messages.clone(),
                                        usage: None,
                                    }));
                                }
                            }
                            StreamEvent::Error { error } => {
                                if let Some(tx) = response_tx.take() {
                                    let _ = tx.send(Err(AgentError::transport(error.clone())));
                                }
                            }
                            StreamEvent::Abort => {
                                if let Some(tx) = response_tx.take() {
                                    let _ = tx.send(Err(AgentError::transport("Generation aborted")));
                                }
                            }
                            _ => {}
                        }
                        yield event;
                    }
                    ScriptStep::CallTool { name, input } => {
                        let tool_call_id = format!("call-{index}");
                        assistant.push(ContentBlock::ToolUse {
                            id: tool_call_id.clone(),
                            name: name.clone(),
                            input: input.clone(),
                        });
                        yield StreamEvent::ToolCall {
                            tool_call_id: tool_call_id.clone(),
                            tool_name: ToolName::new(name.clone()),
                            input: input.clone(),
                        };

                        // Runs to completion; cancellation is observed before the next step.
                        let output = match tools.execute(&name, input.clone()).await {
                            Ok(output) => output,
                            Err(e) => json!({ "success": false, "message": e.to_string() }),
                        };

                        messages.push(ModelMessage::assistant(std::mem::take(&mut assistant)));
                        messages.push(ModelMessage {
                            role: crate::types::ChatRole::Tool,
                            content: vec![ContentBlock::ToolResult {
                                tool_use_id: tool_call_id.clone(),
                                name: name.clone(),
                                content: output.clone(),
                            }],
                        });
                        yield StreamEvent::ToolResult {
                            tool_call_id,
                            tool_name: ToolName::new(name),
                            input,
                            output,
                        };
                    }
                    ScriptStep::WaitForCancel => {
                        cancel.cancelled().await;
                    }
                }
            }

            if cancel.is_cancelled() {
                if let Some(tx) = response_tx.take() {
                    let _ = tx.send(Err(AgentError::transport("Generation aborted")));
                }
                yield StreamEvent::Abort;
            }
        };

        Ok(GenerationStream {
            events: Box::pin(events),
            response,
        })
    }
}
