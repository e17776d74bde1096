//! File tools bound to one scratch workspace
//!
//! Every path is resolved inside the scratch root; writes and edits record
//! the scratch-relative path in the generation's [`ModifiedFiles`] set.

use std::path::{Path, PathBuf};

use serde::{Deserialize, Serialize};
use serde_json::json;

use crate::error::{AgentError, Result};
use crate::workspace::{ScratchWorkspaces, normalize_relative};

use super::{
    FILE_EDIT_TOOL, FILE_MULTI_EDIT_TOOL, FILE_READ_TOOL, FILE_WRITE_TOOL, ModifiedFiles,
    ToolDefinition,
};

#[derive(Debug, Deserialize)]
struct ReadInput {
    file_path: String,
    #[serde(default)]
    offset: Option<usize>,
    #[serde(default)]
    limit: Option<usize>,
}

#[derive(Debug, Serialize)]
struct ReadOutput {
    success: bool,
    content: String,
    total_lines: usize,
}

#[derive(Debug, Deserialize)]
struct WriteInput {
    file_path: String,
    content: String,
}

/// One text replacement
#[derive(Debug, Clone, Deserialize)]
pub struct Edit {
    /// Text to find
    pub old_string: String,
    /// Replacement
    pub new_string: String,
    /// Replace every occurrence instead of requiring a unique match
    #[serde(default)]
    pub replace_all: bool,
}

#[derive(Debug, Deserialize)]
struct EditInput {
    file_path: String,
    #[serde(flatten)]
    edit: Edit,
}

#[derive(Debug, Deserialize)]
struct MultiEditInput {
    file_path: String,
    edits: Vec<Edit>,
}

#[derive(Debug, Serialize)]
struct WriteOutput {
    success: bool,
    message: String,
}

/// `file_read`, `file_write`, `file_edit` and `file_multi_edit`
pub fn file_tools(scratch: &Path, modified: &ModifiedFiles) -> Vec<ToolDefinition> {
    vec![
        read_tool(scratch.to_path_buf()),
        write_tool(scratch.to_path_buf(), modified.clone()),
        edit_tool(scratch.to_path_buf(), modified.clone()),
        multi_edit_tool(scratch.to_path_buf(), modified.clone()),
    ]
}

fn read_tool(scratch: PathBuf) -> ToolDefinition {
    ToolDefinition::typed(
        FILE_READ_TOOL,
        "Read a file of the project. Optionally pass a 1-based line offset and a line limit.",
        json!({
            "type": "object",
            "properties": {
                "file_path": { "type": "string" },
                "offset": { "type": "integer", "minimum": 1 },
                "limit": { "type": "integer", "minimum": 1 }
            },
            "required": ["file_path"]
        }),
        move |input: ReadInput| {
            let scratch = scratch.clone();
            async move {
                let path = ScratchWorkspaces::resolve(&scratch, &input.file_path)?;
                let content = tokio::fs::read_to_string(&path).await.map_err(|e| {
                    AgentError::tool(FILE_READ_TOOL, format!("Cannot read {}: {e}", input.file_path))
                })?;
                let lines: Vec<&str> = content.lines().collect();
                let start = input.offset.unwrap_or(1).saturating_sub(1);
                let end = input
                    .limit
                    .map_or(lines.len(), |limit| start.saturating_add(limit).min(lines.len()));
                let content = lines.get(start..end).map_or_else(String::new, |l| l.join("\n"));
                Ok::<_, AgentError>(ReadOutput {
                    success: true,
                    content,
                    total_lines: lines.len(),
                })
            }
        },
    )
}

fn write_tool(scratch: PathBuf, modified: ModifiedFiles) -> ToolDefinition {
    ToolDefinition::typed(
        FILE_WRITE_TOOL,
        "Create a file or overwrite it with new content.",
        json!({
            "type": "object",
            "properties": {
                "file_path": { "type": "string" },
                "content": { "type": "string" }
            },
            "required": ["file_path", "content"]
        }),
        move |input: WriteInput| {
            let scratch = scratch.clone();
            let modified = modified.clone();
            async move {
                let relative = relative_path(&scratch, &input.file_path)?;
                let path = scratch.join(&relative);
                let existed = tokio::fs::try_exists(&path).await.unwrap_or(false);
                if let Some(parent) = path.parent() {
                    tokio::fs::create_dir_all(parent).await?;
                }
                tokio::fs::write(&path, input.content).await?;
                modified.insert(relative.clone());

                let action = if existed { "updated" } else { "created" };
                Ok::<_, AgentError>(WriteOutput {
                    success: true,
                    message: format!("Successfully {action} file {relative}"),
                })
            }
        },
    )
}

fn edit_tool(scratch: PathBuf, modified: ModifiedFiles) -> ToolDefinition {
    ToolDefinition::typed(
        FILE_EDIT_TOOL,
        "Replace text in a file. old_string must match exactly once unless replace_all is set.",
        json!({
            "type": "object",
            "properties": {
                "file_path": { "type": "string" },
                "old_string": { "type": "string" },
                "new_string": { "type": "string" },
                "replace_all": { "type": "boolean" }
            },
            "required": ["file_path", "old_string", "new_string"]
        }),
        move |input: EditInput| {
            let scratch = scratch.clone();
            let modified = modified.clone();
            async move {
                let count = edit_file(&scratch, &modified, &input.file_path, &[input.edit]).await?;
                Ok::<_, AgentError>(WriteOutput {
                    success: true,
                    message: format!("Applied {count} replacement(s) to {}", input.file_path),
                })
            }
        },
    )
}

fn multi_edit_tool(scratch: PathBuf, modified: ModifiedFiles) -> ToolDefinition {
    ToolDefinition::typed(
        FILE_MULTI_EDIT_TOOL,
        "Apply several replacements to one file in order. Either all succeed or the file is left untouched.",
        json!({
            "type": "object",
            "properties": {
                "file_path": { "type": "string" },
                "edits": {
                    "type": "array",
                    "items": {
                        "type": "object",
                        "properties": {
                            "old_string": { "type": "string" },
                            "new_string": { "type": "string" },
                            "replace_all": { "type": "boolean" }
                        },
                        "required": ["old_string", "new_string"]
                    }
                }
            },
            "required": ["file_path", "edits"]
        }),
        move |input: MultiEditInput| {
            let scratch = scratch.clone();
            let modified = modified.clone();
            async move {
                let count = edit_file(&scratch, &modified, &input.file_path, &input.edits).await?;
                Ok::<_, AgentError>(WriteOutput {
                    success: true,
                    message: format!(
                        "Applied {} edit(s), {count} replacement(s) to {}",
                        input.edits.len(),
                        input.file_path
                    ),
                })
            }
        },
    )
}

async fn edit_file(
    scratch: &Path,
    modified: &ModifiedFiles,
    file_path: &str,
    edits: &[Edit],
) -> Result<usize> {
    let relative = relative_path(scratch, file_path)?;
    let path = scratch.join(&relative);
    let original = tokio::fs::read_to_string(&path)
        .await
        .map_err(|e| AgentError::tool(FILE_EDIT_TOOL, format!("Cannot read {file_path}: {e}")))?;

    let (updated, count) = apply_edits(&original, edits)?;
    tokio::fs::write(&path, updated).await?;
    modified.insert(relative);
    Ok(count)
}

/// Apply `edits` in order, failing without partial results
///
/// # Errors
/// Returns error if an edit matches nothing, or matches more than once
/// without `replace_all`
pub fn apply_edits(content: &str, edits: &[Edit]) -> Result<(String, usize)> {
    let mut current = content.to_string();
    let mut total = 0;
    for (index, edit) in edits.iter().enumerate() {
        if edit.old_string.is_empty() {
            return Err(AgentError::tool(
                FILE_EDIT_TOOL,
                format!("Edit {index}: old_string must not be empty"),
            ));
        }
        let matches = current.matches(edit.old_string.as_str()).count();
        match matches {
            0 => {
                return Err(AgentError::tool(
                    FILE_EDIT_TOOL,
                    format!("Edit {index}: old_string not found"),
                ));
            }
            1 => {
                current = current.replacen(&edit.old_string, &edit.new_string, 1);
            }
            n if edit.replace_all => {
                current = current.replace(&edit.old_string, &edit.new_string);
                total += n - 1;
            }
            n => {
                return Err(AgentError::tool(
                    FILE_EDIT_TOOL,
                    format!("Edit {index}: old_string matches {n} times; set replace_all or add context"),
                ));
            }
        }
        total += 1;
    }
    Ok((current, total))
}

fn relative_path(scratch: &Path, file_path: &str) -> Result<String> {
    let clean = normalize_relative(scratch, file_path)?;
    Ok(clean
        .components()
        .map(|c| c.as_os_str().to_string_lossy().into_owned())
        .collect::<Vec<_>>()
        .join("/"))
}
