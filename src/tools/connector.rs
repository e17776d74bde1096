//! `connector_generator` tool
//!
//! Asks the session for a connector specification, then scaffolds the
//! connector into the scratch workspace. The request blocks until the user
//! provides or skips the specification.

use serde::{Deserialize, Serialize};
use serde_json::json;

use crate::error::AgentError;
use crate::types::RequestId;
use crate::workspace::ScratchWorkspaces;

use super::{CONNECTOR_GENERATOR_TOOL, ConnectorDecision, ToolBindings, ToolDefinition};

#[derive(Debug, Deserialize)]
struct ConnectorInput {
    connector_name: String,
}

/// Output of a successful or skipped connector generation
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ConnectorOutput {
    /// Whether files were generated
    pub success: bool,
    /// The user skipped the specification
    #[serde(default)]
    pub skipped: bool,
    /// Summary line
    pub message: String,
    /// Generated files, relative to the scratch root
    #[serde(default)]
    pub files: Vec<String>,
}

/// Build the `connector_generator` tool
pub fn connector_tool(bindings: &ToolBindings) -> ToolDefinition {
    let scratch = bindings.scratch.clone();
    let modified = bindings.modified_files.clone();
    let gate = std::sync::Arc::clone(&bindings.gate);
    let connectors = bindings.connectors.clone();

    ToolDefinition::typed(
        CONNECTOR_GENERATOR_TOOL,
        "Generate a connector from an API specification supplied by the user.",
        json!({
            "type": "object",
            "properties": {
                "connector_name": { "type": "string" }
            },
            "required": ["connector_name"]
        }),
        move |input: ConnectorInput| {
            let scratch = scratch.clone();
            let modified = modified.clone();
            let gate = std::sync::Arc::clone(&gate);
            let connectors = connectors.clone();
            async move {
                let Some(generator) = connectors else {
                    return Err(AgentError::tool(
                        CONNECTOR_GENERATOR_TOOL,
                        "Connector generation is not available",
                    ));
                };

                let request_id = RequestId::generate();
                let spec = match gate.connector_spec(request_id.clone()).await {
                    ConnectorDecision::Provided(spec) => spec,
                    ConnectorDecision::Skipped(comment) => {
                        let message = comment.map_or_else(
                            || "User skipped connector generation".to_string(),
                            |c| format!("User skipped connector generation: {c}"),
                        );
                        return Ok(ConnectorOutput {
                            success: false,
                            skipped: true,
                            message,
                            files: Vec::new(),
                        });
                    }
                };

                let generated = generator
                    .generate(&scratch, &input.connector_name, &spec)
                    .await?;
                let mut files = Vec::with_capacity(generated.len());
                for file in generated {
                    let path = ScratchWorkspaces::resolve(&scratch, &file.path)?;
                    if let Some(parent) = path.parent() {
                        tokio::fs::create_dir_all(parent).await?;
                    }
                    tokio::fs::write(&path, file.content).await?;
                    modified.insert(file.path.clone());
                    files.push(file.path);
                }

                log::debug!(
                    "[Tools] Connector {} generated for request {} ({} files)",
                    input.connector_name,
                    request_id,
                    files.len()
                );
                Ok(ConnectorOutput {
                    success: true,
                    skipped: false,
                    message: format!("Generated connector {}", input.connector_name),
                    files,
                })
            }
        },
    )
}
