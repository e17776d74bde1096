//! Library lookup tools
//!
//! The model asks for libraries by name; the output is the matching catalogue
//! entries. The tool description lists what is available so the model can
//! pick names without guessing.

use std::sync::Arc;

use serde::Deserialize;
use serde_json::json;

use crate::error::AgentError;
use crate::services::{LibraryProvider, LibraryScope};

use super::{HEALTHCARE_LIBRARY_PROVIDER_TOOL, LIBRARY_PROVIDER_TOOL, ToolDefinition};

/// Input of both library tools
#[derive(Debug, Deserialize)]
pub struct LibraryInput {
    /// Requested library names
    #[serde(default)]
    pub library_names: Vec<String>,
}

/// `library_provider` and `healthcare_library_provider`
pub async fn library_tools(provider: Arc<dyn LibraryProvider>) -> Vec<ToolDefinition> {
    let mut tools = Vec::with_capacity(2);
    for (name, scope, label) in [
        (LIBRARY_PROVIDER_TOOL, LibraryScope::General, "libraries"),
        (
            HEALTHCARE_LIBRARY_PROVIDER_TOOL,
            LibraryScope::Healthcare,
            "healthcare libraries",
        ),
    ] {
        let available = match provider.available(scope).await {
            Ok(libraries) => libraries
                .into_iter()
                .map(|library| library.name)
                .collect::<Vec<_>>(),
            Err(e) => {
                log::warn!("[Tools] Failed to list {}: {}", label, e);
                Vec::new()
            }
        };
        let description = if available.is_empty() {
            format!("Fetch documentation of {label} by name.")
        } else {
            format!(
                "Fetch documentation of {label} by name. Available: {}",
                available.join(", ")
            )
        };

        let provider = Arc::clone(&provider);
        tools.push(ToolDefinition::typed(
            name,
            description,
            json!({
                "type": "object",
                "properties": {
                    "library_names": { "type": "array", "items": { "type": "string" } }
                },
                "required": ["library_names"]
            }),
            move |input: LibraryInput| {
                let provider = Arc::clone(&provider);
                async move {
                    let libraries = provider.lookup(scope, &input.library_names).await?;
                    Ok::<_, AgentError>(libraries)
                }
            },
        ));
    }
    tools
}
