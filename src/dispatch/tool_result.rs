//! Tool-result routing
//!
//! Each dispatcher declares the tool names it handles. The first dispatcher
//! claiming a name wins; [`DefaultResultDispatcher`] claims everything else
//! and reports only the tool name.

use serde_json::{Value, json};

use crate::tools::{
    DIAGNOSTICS_TOOL, FILE_EDIT_TOOL, FILE_MULTI_EDIT_TOOL, FILE_WRITE_TOOL,
    HEALTHCARE_LIBRARY_PROVIDER_TOOL, LIBRARY_PROVIDER_TOOL, TASK_WRITE_TOOL,
};
use crate::types::{ToolName, UiEvent};

use super::context::StreamContext;

/// Turns one tool result into UI notifications and context updates
pub trait ToolResultDispatcher: Send + Sync {
    /// Tool names this dispatcher handles
    fn supported_tools(&self) -> &[&'static str];

    /// Whether this dispatcher handles `tool_name`
    fn can_handle(&self, tool_name: &str) -> bool {
        self.supported_tools().contains(&tool_name)
    }

    /// Handle one result
    fn dispatch(&self, tool_name: &ToolName, output: &Value, ctx: &mut StreamContext);
}

/// `task_write` results: forwards the task list
#[derive(Debug, Default)]
pub struct TaskWriteResultDispatcher;

impl ToolResultDispatcher for TaskWriteResultDispatcher {
    fn supported_tools(&self) -> &[&'static str] {
        &[TASK_WRITE_TOOL]
    }

    fn dispatch(&self, tool_name: &ToolName, output: &Value, ctx: &mut StreamContext) {
        if output.is_null() {
            return;
        }
        ctx.emit(UiEvent::ToolResult {
            tool_name: tool_name.clone(),
            tool_output: Some(json!({
                "success": output.get("success").cloned().unwrap_or(Value::Bool(false)),
                "message": output.get("message").cloned().unwrap_or(Value::Null),
                "allTasks": output.get("tasks").cloned().unwrap_or_else(|| json!([])),
            })),
        });
    }
}

/// Library lookups: reports the fetched library names
///
/// The general lookup is narrowed to the names the model asked for; the
/// healthcare lookup decides relevance itself, so all of its names pass.
#[derive(Debug, Default)]
pub struct LibraryResultDispatcher;

impl ToolResultDispatcher for LibraryResultDispatcher {
    fn supported_tools(&self) -> &[&'static str] {
        &[LIBRARY_PROVIDER_TOOL, HEALTHCARE_LIBRARY_PROVIDER_TOOL]
    }

    fn dispatch(&self, tool_name: &ToolName, output: &Value, ctx: &mut StreamContext) {
        let names = output
            .as_array()
            .map(|libraries| {
                libraries
                    .iter()
                    .filter_map(|library| library.get("name").and_then(Value::as_str))
                    .map(str::to_string)
                    .collect::<Vec<_>>()
            })
            .unwrap_or_default();

        let fetched: Vec<String> = if tool_name.as_str() == HEALTHCARE_LIBRARY_PROVIDER_TOOL {
            names
        } else {
            names
                .into_iter()
                .filter(|name| ctx.selected_libraries.contains(name))
                .collect()
        };

        ctx.emit(UiEvent::ToolResult {
            tool_name: tool_name.clone(),
            tool_output: Some(json!(fetched)),
        });
    }
}

/// File writes and edits: reports success and, for writes, the action
#[derive(Debug, Default)]
pub struct FileResultDispatcher;

impl ToolResultDispatcher for FileResultDispatcher {
    fn supported_tools(&self) -> &[&'static str] {
        &[FILE_WRITE_TOOL, FILE_EDIT_TOOL, FILE_MULTI_EDIT_TOOL]
    }

    fn dispatch(&self, tool_name: &ToolName, output: &Value, ctx: &mut StreamContext) {
        let success = output.get("success").and_then(Value::as_bool).unwrap_or(true);
        let mut tool_output = json!({ "success": success });

        if tool_name.as_str() == FILE_WRITE_TOOL {
            let message = output.get("message").and_then(Value::as_str).unwrap_or_default();
            let action = if message.contains("updated") {
                Some("updated")
            } else if message.contains("created") {
                Some("created")
            } else {
                None
            };
            if let Some(action) = action {
                tool_output["action"] = json!(action);
            }
        }

        ctx.emit(UiEvent::ToolResult {
            tool_name: tool_name.clone(),
            tool_output: Some(tool_output),
        });
    }
}

/// Diagnostics runs: updates the error statistics and forwards the output
#[derive(Debug, Default)]
pub struct DiagnosticsResultDispatcher;

impl ToolResultDispatcher for DiagnosticsResultDispatcher {
    fn supported_tools(&self) -> &[&'static str] {
        &[DIAGNOSTICS_TOOL]
    }

    fn dispatch(&self, tool_name: &ToolName, output: &Value, ctx: &mut StreamContext) {
        ctx.diagnostic_check_count += 1;

        if let Some(diagnostics) = output.get("diagnostics").and_then(Value::as_array) {
            ctx.total_compilation_errors += diagnostics.len();
            for code in diagnostics
                .iter()
                .filter_map(|d| d.get("code").and_then(Value::as_str))
            {
                ctx.error_codes.insert(code.to_string());
                *ctx.error_code_frequency.entry(code.to_string()).or_insert(0) += 1;
            }
        }

        ctx.emit(UiEvent::ToolResult {
            tool_name: tool_name.clone(),
            tool_output: Some(output.clone()),
        });
    }
}

/// Fallback for every other tool
#[derive(Debug, Default)]
pub struct DefaultResultDispatcher;

impl ToolResultDispatcher for DefaultResultDispatcher {
    fn supported_tools(&self) -> &[&'static str] {
        &[]
    }

    fn can_handle(&self, _tool_name: &str) -> bool {
        true
    }

    fn dispatch(&self, tool_name: &ToolName, _output: &Value, ctx: &mut StreamContext) {
        ctx.emit(UiEvent::ToolResult {
            tool_name: tool_name.clone(),
            tool_output: None,
        });
    }
}

/// Dispatchers for the built-in tools, in lookup order
#[must_use]
pub fn builtin_dispatchers() -> Vec<Box<dyn ToolResultDispatcher>> {
    vec![
        Box::new(TaskWriteResultDispatcher),
        Box::new(LibraryResultDispatcher),
        Box::new(FileResultDispatcher),
        Box::new(DiagnosticsResultDispatcher),
    ]
}
