//! Mutable state threaded through one streaming generation

use std::collections::{BTreeMap, BTreeSet};
use std::path::PathBuf;
use std::sync::Arc;

use tokio::time::Instant;

use crate::tools::ModifiedFiles;
use crate::transport::ResponseHandle;
use crate::types::{
    ContentBlock, EventSink, ExecutionContext, MessageId, ModelMessage, ProjectSource, UiEvent,
};
use crate::workspace::ProjectMetrics;

/// State owned by the dispatcher for the duration of one generation
pub struct StreamContext {
    /// UI notification sink
    pub sink: Arc<dyn EventSink>,
    /// Files touched by tools
    pub modified_files: ModifiedFiles,
    /// Assistant blocks received since the last tool result
    pub current_assistant_content: Vec<ContentBlock>,
    /// Completed messages, used when the final response is unavailable
    pub accumulated_messages: Vec<ModelMessage>,
    /// Libraries the model asked for
    pub selected_libraries: Vec<String>,
    /// Scratch workspace
    pub scratch_path: PathBuf,
    /// Projects materialised in the scratch workspace
    pub projects: Vec<ProjectSource>,
    /// Whether the scratch workspace is torn down after use
    pub should_cleanup: bool,
    /// Transcript message being answered
    pub message_id: MessageId,
    /// User prompt as sent to the model
    pub user_message: ModelMessage,
    /// Generation start
    pub started: Instant,
    /// Number of diagnostics tool runs
    pub diagnostic_check_count: u32,
    /// Diagnostics reported across those runs
    pub total_compilation_errors: usize,
    /// Distinct diagnostic codes seen
    pub error_codes: BTreeSet<String>,
    /// Occurrences per diagnostic code
    pub error_code_frequency: BTreeMap<String, u32>,
    /// Final response, taken by the terminal handler
    pub response: Option<ResponseHandle>,
    /// Real project
    pub execution: ExecutionContext,
    /// Size of the real project before generation
    pub input_metrics: ProjectMetrics,
    /// Events handled so far
    pub events_processed: usize,
}

impl std::fmt::Debug for StreamContext {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("StreamContext")
            .field("scratch_path", &self.scratch_path)
            .field("message_id", &self.message_id)
            .field("modified_files", &self.modified_files)
            .field("events_processed", &self.events_processed)
            .finish_non_exhaustive()
    }
}

impl StreamContext {
    /// Fresh context for a generation in `scratch_path`
    pub fn new(
        sink: Arc<dyn EventSink>,
        scratch_path: impl Into<PathBuf>,
        execution: ExecutionContext,
        message_id: MessageId,
    ) -> Self {
        Self {
            sink,
            modified_files: ModifiedFiles::new(),
            current_assistant_content: Vec::new(),
            accumulated_messages: Vec::new(),
            selected_libraries: Vec::new(),
            scratch_path: scratch_path.into(),
            projects: Vec::new(),
            should_cleanup: true,
            message_id,
            user_message: ModelMessage::user_text(""),
            started: Instant::now(),
            diagnostic_check_count: 0,
            total_compilation_errors: 0,
            error_codes: BTreeSet::new(),
            error_code_frequency: BTreeMap::new(),
            response: None,
            execution,
            input_metrics: ProjectMetrics::default(),
            events_processed: 0,
        }
    }

    /// Send a UI notification
    pub fn emit(&self, event: UiEvent) {
        self.sink.emit(event);
    }

    /// Milliseconds since the generation started
    #[must_use]
    pub fn elapsed_ms(&self) -> u64 {
        u64::try_from(self.started.elapsed().as_millis()).unwrap_or(u64::MAX)
    }

    /// Append streamed assistant text, merging with a trailing text block
    pub fn push_text(&mut self, delta: &str) {
        if let Some(ContentBlock::Text { text }) = self.current_assistant_content.last_mut() {
            text.push_str(delta);
        } else {
            self.current_assistant_content.push(ContentBlock::Text {
                text: delta.to_string(),
            });
        }
    }

    /// Move the in-flight assistant blocks into the accumulated messages
    pub fn flush_assistant(&mut self) {
        if !self.current_assistant_content.is_empty() {
            let content = std::mem::take(&mut self.current_assistant_content);
            self.accumulated_messages.push(ModelMessage::assistant(content));
        }
    }

    /// Accumulated messages plus whatever assistant content is in flight
    #[must_use]
    pub fn partial_messages(&mut self) -> Vec<ModelMessage> {
        self.flush_assistant();
        self.accumulated_messages.clone()
    }
}
