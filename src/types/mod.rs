//! Type definitions for the agent session engine
//!
//! This module contains the data types shared by every component,
//! organized into logical submodules:
//!
//! - [`identifiers`] - Type-safe ID wrappers (`SessionId`, `MessageId`, `ToolName`, ...)
//! - [`messages`] - Chat transcript entries and model messages
//! - [`plan`] - Plans, tasks and approval mode
//! - [`events`] - Stream events, UI events, diagnostics and the event sink
//! - [`project`] - Execution context and scratch project descriptions
//! - [`request`] - Generation and datamapper requests
//! - [`checkpoint`] - Restorable file snapshots
//! - [`options`] - Runtime configuration

pub mod checkpoint;
pub mod events;
pub mod identifiers;
pub mod messages;
pub mod options;
pub mod plan;
pub mod project;
pub mod request;

// Re-export commonly used types
pub use checkpoint::Checkpoint;
pub use events::{
    ChannelSink, Diagnostic, EventSink, Position, Range, Severity, StreamEvent, UiEvent,
};
pub use identifiers::{CheckpointId, MessageId, ProjectId, RequestId, SessionId, ToolName};
pub use messages::{ChatMessage, ChatRole, ContentBlock, FileAttachment, ModelMessage};
pub use options::{SessionOptions, SessionOptionsBuilder};
pub use plan::{ApprovalMode, Plan, Task, TaskStatus};
pub use project::{ExecutionContext, ProjectSource};
pub use request::{AgentRequest, DatamapperKind, DatamapperRequest};
