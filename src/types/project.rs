//! Execution context and project descriptions

use std::path::PathBuf;

use serde::{Deserialize, Serialize};

/// Where a generation is rooted in the user's real file system
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ExecutionContext {
    /// Real project directory
    pub project_path: PathBuf,
    /// Enclosing multi-project workspace, when there is one
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub workspace_path: Option<PathBuf>,
}

impl ExecutionContext {
    /// Context for a standalone project
    pub fn project(path: impl Into<PathBuf>) -> Self {
        Self {
            project_path: path.into(),
            workspace_path: None,
        }
    }

    /// Context for a project inside a workspace
    pub fn in_workspace(project: impl Into<PathBuf>, workspace: impl Into<PathBuf>) -> Self {
        Self {
            project_path: project.into(),
            workspace_path: Some(workspace.into()),
        }
    }

    /// Directory that gets mirrored into the scratch workspace
    #[must_use]
    pub fn source_root(&self) -> &std::path::Path {
        self.workspace_path.as_deref().unwrap_or(&self.project_path)
    }
}

/// A project materialised inside a scratch workspace
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ProjectSource {
    /// Project name (directory name)
    pub project_name: String,
    /// Project root relative to the scratch root; empty for the root itself
    pub relative_root: String,
    /// Source files relative to the scratch root
    pub files: Vec<String>,
}
