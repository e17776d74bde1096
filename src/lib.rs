#![recursion_limit = "256"]

//! # Agent Session Engine
//!
//! The streaming-session core of an agentic code-generation assistant. A
//! session accepts user prompts, drives a model that plans and edits code
//! through tools, routes every streamed event to the right handler, keeps the
//! edits in a throwaway scratch copy of the project and stages the result for
//! the user to accept or decline.
//!
//! ## Quick Start
//!
//! ```no_run
//! use std::sync::Arc;
//!
//! use kodegen_agent_session::{
//!     ChatState, ExecutionContext, PromptSubmission, ScriptStep, ScriptedTransport,
//!     SessionManager, StreamEvent,
//! };
//!
//! # async fn example() -> kodegen_agent_session::Result<()> {
//! let transport = Arc::new(ScriptedTransport::new(vec![
//!     ScriptStep::Emit(StreamEvent::TextDelta { text: "Done.".into() }),
//!     ScriptStep::Emit(StreamEvent::Finish { finish_reason: None }),
//! ]));
//!
//! let session = SessionManager::builder(ExecutionContext::project("/path/to/project"), transport)
//!     .build();
//! session.initialize().await;
//!
//! session.submit_agent_prompt(PromptSubmission::new("Add a health check")).await?;
//! session.flush().await;
//!
//! if session.state() == ChatState::Completed && session.pending_review().is_some() {
//!     session.accept_changes().await?;
//! }
//! # Ok(())
//! # }
//! ```
//!
//! ## Core Pieces
//!
//! ### 1. Lifecycle machine
//!
//! [`ChatMachine`] is a pure value: each [`ChatEvent`] moves it between
//! [`ChatState`]s and returns the [`Effect`]s to run. [`SessionManager`]
//! serializes events through one queue and executes those effects.
//!
//! ### 2. Stream dispatch
//!
//! [`StreamDispatcher`] consumes the transport's [`StreamEvent`] feed in
//! order. Tool results go to the first [`ToolResultDispatcher`] that claims
//! the tool; `finish`, `abort` and `error` run the session bookkeeping once.
//!
//! ### 3. Scratch workspaces and review
//!
//! Every generation edits a scratch copy made by [`ScratchWorkspaces`].
//! Finished generations leave a [`PendingReview`] in [`ReviewStaging`], a
//! single slot whose record expires after the configured time-to-live.
//!
//! ### 4. Collaborators
//!
//! The model transport, language server, library catalogue, connector
//! scaffolder, datamapper, session store and telemetry sink are traits;
//! hosts plug in their own implementations.
//!
//! ## Configuration
//!
//! [`SessionOptions::from_env`] reads `AGENT_TEST_ENV` (test isolation: keep
//! scratch workspaces and never integrate) and `AGENT_SCRATCH_DIR` (scratch
//! root). Everything else is set through [`SessionOptions::builder`].

#![warn(missing_docs)]
#![warn(clippy::all)]

pub mod checkpoint;
pub mod dispatch;
pub mod error;
pub mod machine;
pub mod manager;
pub mod persistence;
pub mod review;
pub mod services;
pub mod telemetry;
pub mod tools;
pub mod transport;
pub mod types;
pub mod workspace;

// Re-export commonly used types for external API
pub use checkpoint::CheckpointManager;
pub use dispatch::{
    DispatchServices, SessionBridge, SessionView, StreamContext, StreamDispatcher, StreamSignal,
    TerminalReason, Termination, ToolResultDispatcher,
};
pub use error::{AgentError, Result};
pub use machine::{ChatEvent, ChatMachine, ChatState, Effect, MachineConfig, SessionContext, SessionSnapshot};
pub use manager::{PromptSubmission, SessionManager, SessionManagerBuilder};
pub use persistence::{FileSessionStore, MemorySessionStore, SessionStore};
pub use review::{PendingReview, ReviewStaging};
pub use services::{
    ConnectorGenerator, DatamapperService, GeneratedFile, LanguageServer, Library,
    LibraryProvider, LibraryScope, NoopLanguageServer, StaticLibraryProvider,
};
pub use telemetry::{LogTelemetry, Telemetry, TelemetryEvent};
pub use tools::{ModifiedFiles, ToolDefinition, ToolRegistry};
pub use transport::{ModelTransport, ScriptStep, ScriptedTransport};
pub use workspace::{ProjectMetrics, ScratchWorkspaces};

// Re-export type submodules for flat public API
pub use types::checkpoint::Checkpoint;
pub use types::events::{ChannelSink, Diagnostic, EventSink, Severity, StreamEvent, UiEvent};
pub use types::identifiers::{CheckpointId, MessageId, ProjectId, RequestId, SessionId, ToolName};
pub use types::messages::{ChatMessage, ChatRole, ContentBlock, FileAttachment, ModelMessage};
pub use types::options::{SessionOptions, SessionOptionsBuilder};
pub use types::plan::{ApprovalMode, Plan, Task, TaskStatus};
pub use types::project::{ExecutionContext, ProjectSource};
pub use types::request::{AgentRequest, DatamapperKind, DatamapperRequest};

/// Version of the engine
pub const VERSION: &str = env!("CARGO_PKG_VERSION");
