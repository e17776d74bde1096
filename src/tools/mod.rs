//! Tool dispatch table
//!
//! Tools are named async callables from JSON input to JSON output. Every
//! generation gets its own [`ToolRegistry`] bound to one scratch workspace
//! and one shared [`ModifiedFiles`] set.
//!
//! Executors never fail the stream: bad input and I/O failures come back as
//! `{"success": false, "message": ...}` outputs for the model to read.

pub mod connector;
pub mod diagnostics;
pub mod files;
pub mod gate;
pub mod libraries;
pub mod task_writer;

use std::collections::BTreeSet;
use std::future::Future;
use std::path::PathBuf;
use std::pin::Pin;
use std::sync::Arc;

use parking_lot::Mutex;
use serde::Serialize;
use serde::de::DeserializeOwned;
use serde_json::{Value, json};
use tokio_util::sync::CancellationToken;

use crate::error::{AgentError, Result};
use crate::services::{ConnectorGenerator, LanguageServer, LibraryProvider};
use crate::types::ToolName;

pub use gate::{AutoApproveGate, ConnectorDecision, Decision, SessionGate};

// ============================================================================
// TOOL NAMES
// ============================================================================

/// Task list tracking
pub const TASK_WRITE_TOOL: &str = "task_write";
/// General library lookup
pub const LIBRARY_PROVIDER_TOOL: &str = "library_provider";
/// Healthcare library lookup
pub const HEALTHCARE_LIBRARY_PROVIDER_TOOL: &str = "healthcare_library_provider";
/// Connector scaffolding
pub const CONNECTOR_GENERATOR_TOOL: &str = "connector_generator";
/// Read a file
pub const FILE_READ_TOOL: &str = "file_read";
/// Create or overwrite a file
pub const FILE_WRITE_TOOL: &str = "file_write";
/// Replace text in a file
pub const FILE_EDIT_TOOL: &str = "file_edit";
/// Apply several replacements to a file atomically
pub const FILE_MULTI_EDIT_TOOL: &str = "file_multi_edit";
/// Language-server diagnostics of the scratch workspace
pub const DIAGNOSTICS_TOOL: &str = "diagnostics";

// ============================================================================
// MODIFIED FILES
// ============================================================================

/// Set of scratch-relative paths touched during one generation
#[derive(Debug, Clone, Default)]
pub struct ModifiedFiles(Arc<Mutex<BTreeSet<String>>>);

impl ModifiedFiles {
    /// Create an empty set
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Record a path
    pub fn insert(&self, path: impl Into<String>) {
        self.0.lock().insert(path.into());
    }

    /// Sorted copy of the recorded paths
    #[must_use]
    pub fn to_vec(&self) -> Vec<String> {
        self.0.lock().iter().cloned().collect()
    }

    /// Number of recorded paths
    #[must_use]
    pub fn len(&self) -> usize {
        self.0.lock().len()
    }

    /// Whether nothing was recorded
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.0.lock().is_empty()
    }
}

// ============================================================================
// TOOL DEFINITIONS
// ============================================================================

/// Boxed future returned by a tool handler
pub type ToolFuture = Pin<Box<dyn Future<Output = Value> + Send>>;

/// Tool handler callback
pub type ToolHandler = Arc<dyn Fn(Value) -> ToolFuture + Send + Sync>;

/// A named tool exposed to the model
#[derive(Clone)]
pub struct ToolDefinition {
    /// Tool name
    pub name: ToolName,
    /// Description shown to the model
    pub description: String,
    /// JSON schema of the input
    pub input_schema: Value,
    handler: ToolHandler,
}

impl std::fmt::Debug for ToolDefinition {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("ToolDefinition")
            .field("name", &self.name)
            .field("description", &self.description)
            .field("input_schema", &self.input_schema)
            .field("handler", &"<callback>")
            .finish()
    }
}

impl ToolDefinition {
    /// Create a tool from a raw JSON handler
    pub fn new(
        name: impl Into<ToolName>,
        description: impl Into<String>,
        input_schema: Value,
        handler: ToolHandler,
    ) -> Self {
        Self {
            name: name.into(),
            description: description.into(),
            input_schema,
            handler,
        }
    }

    /// Create a tool with typed input and output
    ///
    /// Input that fails to deserialize and handler errors are both reported
    /// as `success: false` outputs.
    pub fn typed<I, O, F, Fut>(
        name: impl Into<ToolName>,
        description: impl Into<String>,
        input_schema: Value,
        f: F,
    ) -> Self
    where
        I: DeserializeOwned + Send + 'static,
        O: Serialize + Send + 'static,
        F: Fn(I) -> Fut + Send + Sync + 'static,
        Fut: Future<Output = Result<O>> + Send + 'static,
    {
        let name = name.into();
        let tool = name.clone();
        let f = Arc::new(f);
        let handler: ToolHandler = Arc::new(move |input: Value| -> ToolFuture {
            let f = Arc::clone(&f);
            let tool = tool.clone();
            Box::pin(async move {
                let input: I = match serde_json::from_value(input) {
                    Ok(input) => input,
                    Err(e) => return failure(format!("Invalid input for {tool}: {e}")),
                };
                match (*f)(input).await {
                    Ok(output) => serde_json::to_value(output)
                        .unwrap_or_else(|e| failure(format!("Failed to encode output: {e}"))),
                    Err(e) => {
                        log::debug!("[Tools] {} failed: {}", tool, e);
                        failure(e.to_string())
                    }
                }
            })
        });

        Self::new(name, description, input_schema, handler)
    }

    /// Run the tool
    pub async fn call(&self, input: Value) -> Value {
        (self.handler)(input).await
    }
}

/// Standard failure output
pub(crate) fn failure(message: impl Into<String>) -> Value {
    json!({ "success": false, "message": message.into() })
}

// ============================================================================
// REGISTRY
// ============================================================================

/// Named tools available to one generation
#[derive(Debug, Clone, Default)]
pub struct ToolRegistry {
    tools: Vec<ToolDefinition>,
}

/// Collaborators a generation's tools are bound to
#[derive(Clone)]
pub struct ToolBindings {
    /// Scratch workspace root
    pub scratch: PathBuf,
    /// Shared modified-file set
    pub modified_files: ModifiedFiles,
    /// Language server for diagnostics
    pub language_server: Arc<dyn LanguageServer>,
    /// Library catalogue
    pub libraries: Arc<dyn LibraryProvider>,
    /// Connector scaffolder, when the host has one
    pub connectors: Option<Arc<dyn ConnectorGenerator>>,
    /// Plan/task approvals and connector specs
    pub gate: Arc<dyn SessionGate>,
    /// Generation cancellation switch
    pub cancel: CancellationToken,
}

impl ToolRegistry {
    /// Create an empty registry
    #[must_use]
    pub const fn new() -> Self {
        Self { tools: Vec::new() }
    }

    /// Full tool table for one generation
    pub async fn for_generation(bindings: ToolBindings) -> Self {
        let mut registry = Self::new();
        registry.register(task_writer::task_write_tool(
            Arc::clone(&bindings.gate),
            bindings.cancel.clone(),
        ));
        for tool in libraries::library_tools(Arc::clone(&bindings.libraries)).await {
            registry.register(tool);
        }
        registry.register(connector::connector_tool(&bindings));
        for tool in files::file_tools(&bindings.scratch, &bindings.modified_files) {
            registry.register(tool);
        }
        registry.register(diagnostics::diagnostics_tool(
            bindings.scratch.clone(),
            Arc::clone(&bindings.language_server),
        ));
        registry
    }

    /// Add a tool, replacing any tool with the same name
    pub fn register(&mut self, tool: ToolDefinition) {
        self.tools.retain(|existing| existing.name != tool.name);
        self.tools.push(tool);
    }

    /// Look a tool up by name
    #[must_use]
    pub fn get(&self, name: &str) -> Option<&ToolDefinition> {
        self.tools.iter().find(|tool| tool.name.as_str() == name)
    }

    /// Registered tool names, in registration order
    #[must_use]
    pub fn names(&self) -> Vec<&ToolName> {
        self.tools.iter().map(|tool| &tool.name).collect()
    }

    /// Registered tools, in registration order
    #[must_use]
    pub fn definitions(&self) -> &[ToolDefinition] {
        &self.tools
    }

    /// Run a tool by name
    ///
    /// # Errors
    /// Returns error if no tool with that name is registered
    pub async fn execute(&self, name: &str, input: Value) -> Result<Value> {
        let tool = self
            .get(name)
            .ok_or_else(|| AgentError::unknown_tool(name))?;
        Ok(tool.call(input).await)
    }
}
