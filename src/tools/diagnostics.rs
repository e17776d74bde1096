//! `diagnostics` tool: language-server diagnostics of the scratch workspace

use std::path::PathBuf;
use std::sync::Arc;

use serde::{Deserialize, Serialize};
use serde_json::json;

use crate::error::AgentError;
use crate::services::LanguageServer;
use crate::types::{Diagnostic, Severity};

use super::{DIAGNOSTICS_TOOL, ToolDefinition};

#[derive(Debug, Default, Deserialize)]
struct DiagnosticsInput {}

/// Output of the `diagnostics` tool
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct DiagnosticsOutput {
    /// Whether the language server answered
    pub success: bool,
    /// Every reported diagnostic
    pub diagnostics: Vec<Diagnostic>,
    /// Summary line
    pub message: String,
}

/// Build the `diagnostics` tool
pub fn diagnostics_tool(scratch: PathBuf, language_server: Arc<dyn LanguageServer>) -> ToolDefinition {
    ToolDefinition::typed(
        DIAGNOSTICS_TOOL,
        "Check the project for compilation errors and warnings.",
        json!({ "type": "object", "properties": {} }),
        move |_: DiagnosticsInput| {
            let scratch = scratch.clone();
            let language_server = Arc::clone(&language_server);
            async move {
                let diagnostics = language_server.diagnostics(&scratch).await?;
                let errors = diagnostics
                    .iter()
                    .filter(|d| d.severity == Severity::Error)
                    .count();
                let message = if diagnostics.is_empty() {
                    "No diagnostics found".to_string()
                } else {
                    format!("Found {} diagnostic(s), {errors} error(s)", diagnostics.len())
                };
                Ok::<_, AgentError>(DiagnosticsOutput {
                    success: true,
                    diagnostics,
                    message,
                })
            }
        },
    )
}
