//! Model-interaction transport
//!
//! The transport turns a system prompt, a message history and a tool table
//! into an ordered feed of [`StreamEvent`]s. It runs the tools itself and
//! reports their results as `tool-result` events. Once the feed ends it
//! resolves a [`ResponseHandle`] with the full set of model messages.

pub mod scripted;

use std::pin::Pin;
use std::sync::Arc;

use async_trait::async_trait;
use futures::Stream;
use serde::{Deserialize, Serialize};
use tokio::sync::oneshot;
use tokio_util::sync::CancellationToken;

use crate::error::{AgentError, Result};
use crate::tools::ToolRegistry;
use crate::types::{ModelMessage, StreamEvent};

pub use scripted::{ScriptStep, ScriptedTransport};

/// Ordered feed of stream events
pub type EventStream = Pin<Box<dyn Stream<Item = StreamEvent> + Send>>;

/// Everything the transport needs to start a generation
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct GenerationRequest {
    /// System prompt
    pub system_prompt: String,
    /// Conversation so far, ending with the new user prompt
    pub messages: Vec<ModelMessage>,
    /// Upper bound on model steps
    pub max_steps: u32,
    /// Upper bound on output tokens
    pub max_output_tokens: u32,
}

/// Token usage reported by the model
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct Usage {
    /// Prompt tokens
    pub input_tokens: u64,
    /// Completion tokens
    pub output_tokens: u64,
}

/// Full result of a generation, available once the feed has ended
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct FinalResponse {
    /// Every model message produced during the generation
    pub messages: Vec<ModelMessage>,
    /// Token usage
    pub usage: Option<Usage>,
}

/// Deferred final response of a generation
#[derive(Debug)]
pub struct ResponseHandle {
    rx: oneshot::Receiver<Result<FinalResponse>>,
}

impl ResponseHandle {
    /// Create a handle and the sender resolving it
    #[must_use]
    pub fn channel() -> (oneshot::Sender<Result<FinalResponse>>, Self) {
        let (tx, rx) = oneshot::channel();
        (tx, Self { rx })
    }

    /// Wait for the final response
    ///
    /// # Errors
    /// Returns the transport's error, or a transport error if the sender was
    /// dropped without resolving
    pub async fn wait(self) -> Result<FinalResponse> {
        self.rx
            .await
            .map_err(|_| AgentError::transport("Generation ended without a final response"))?
    }
}

/// An opened generation
pub struct GenerationStream {
    /// Event feed
    pub events: EventStream,
    /// Deferred final response
    pub response: ResponseHandle,
}

/// Model-interaction transport
#[async_trait]
pub trait ModelTransport: Send + Sync {
    /// Start a generation
    ///
    /// The transport must observe `cancel` and emit an `abort` event once it
    /// fires.
    ///
    /// # Errors
    /// Returns error if the generation cannot be started
    async fn open(
        &self,
        request: GenerationRequest,
        tools: Arc<ToolRegistry>,
        cancel: CancellationToken,
    ) -> Result<GenerationStream>;
}
