//! Scoped scratch workspaces
//!
//! Every generation runs against a private copy of the user's project placed
//! under the configured scratch root. The model's tools only ever touch that
//! copy; changes reach the real project through [`integration`] after the
//! user accepts them.

pub mod integration;
pub mod metrics;

use std::path::{Component, Path, PathBuf};
use std::sync::Arc;

use uuid::Uuid;
use walkdir::WalkDir;

use crate::error::{AgentError, Result};
use crate::types::{ExecutionContext, ProjectSource, SessionOptions};

pub use integration::integrate;
pub use metrics::{ProjectMetrics, measure, measure_async};

/// Creates, resolves paths in, and tears down scratch workspaces
#[derive(Debug, Clone)]
pub struct ScratchWorkspaces {
    options: Arc<SessionOptions>,
}

impl ScratchWorkspaces {
    /// Create a manager rooted at `options.scratch_root`
    #[must_use]
    pub const fn new(options: Arc<SessionOptions>) -> Self {
        Self { options }
    }

    /// Directory under which every scratch workspace is created
    #[must_use]
    pub fn root(&self) -> &Path {
        &self.options.scratch_root
    }

    /// Materialise a scratch copy of the execution context's source tree
    ///
    /// When the project lives inside a workspace the whole workspace is
    /// mirrored so cross-project references keep resolving.
    ///
    /// # Errors
    /// Returns error if the source tree cannot be read or the copy fails
    pub async fn create(&self, ctx: &ExecutionContext) -> Result<PathBuf> {
        let source = ctx.source_root().to_path_buf();
        if !source.is_dir() {
            return Err(AgentError::workspace(format!(
                "Project directory does not exist: {}",
                source.display()
            )));
        }

        let scratch = self.root().join(Uuid::new_v4().to_string());
        let options = Arc::clone(&self.options);
        let target = scratch.clone();
        tokio::task::spawn_blocking(move || copy_tree(&source, &target, &options))
            .await
            .map_err(|e| AgentError::workspace(format!("Scratch copy task failed: {e}")))??;

        log::debug!("[Workspace] Created scratch workspace {}", scratch.display());
        Ok(scratch)
    }

    /// Describe the projects materialised inside a scratch workspace
    ///
    /// # Errors
    /// Returns error if the project is not located inside its workspace
    pub fn project_sources(
        &self,
        scratch: &Path,
        ctx: &ExecutionContext,
    ) -> Result<Vec<ProjectSource>> {
        let relative_root = match &ctx.workspace_path {
            Some(workspace) => ctx
                .project_path
                .strip_prefix(workspace)
                .map_err(|_| {
                    AgentError::workspace(format!(
                        "Project {} is not inside workspace {}",
                        ctx.project_path.display(),
                        workspace.display()
                    ))
                })?
                .to_path_buf(),
            None => PathBuf::new(),
        };

        let project_name = ctx
            .project_path
            .file_name()
            .map_or_else(|| "project".to_string(), |n| n.to_string_lossy().into_owned());

        let project_dir = scratch.join(&relative_root);
        let files = list_files(&project_dir, &self.options)
            .into_iter()
            .map(|file| join_relative(&relative_root, &file))
            .collect();

        Ok(vec![ProjectSource {
            project_name,
            relative_root: to_slash(&relative_root),
            files,
        }])
    }

    /// Resolve a model-supplied path to a location inside the scratch workspace
    ///
    /// # Errors
    /// Returns error if the path is empty or escapes the scratch root
    pub fn resolve(scratch: &Path, relative: &str) -> Result<PathBuf> {
        Ok(scratch.join(normalize_relative(scratch, relative)?))
    }

    /// Translate a scratch-relative file into its real-project location
    ///
    /// # Errors
    /// Returns error if the path escapes the scratch root
    pub fn translate(scratch: &Path, real_root: &Path, relative: &str) -> Result<PathBuf> {
        Ok(real_root.join(normalize_relative(scratch, relative)?))
    }

    /// Remove a scratch workspace; missing directories are not an error
    ///
    /// Paths outside the scratch root are refused and logged.
    pub async fn teardown(&self, scratch: &Path) {
        if !scratch.starts_with(self.root()) {
            log::warn!(
                "[Workspace] Refusing to remove {} outside scratch root {}",
                scratch.display(),
                self.root().display()
            );
            return;
        }
        match tokio::fs::remove_dir_all(scratch).await {
            Ok(()) => log::debug!("[Workspace] Removed scratch workspace {}", scratch.display()),
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => {
                log::debug!("[Workspace] Scratch workspace {} already removed", scratch.display());
            }
            Err(e) => log::warn!(
                "[Workspace] Failed to remove scratch workspace {}: {}",
                scratch.display(),
                e
            ),
        }
    }

    /// Tear a scratch workspace down on a background task
    ///
    /// For callers that cannot await, such as lazy expiry on a read. Must be
    /// called inside a Tokio runtime.
    pub fn teardown_detached(&self, scratch: PathBuf) {
        let workspaces = self.clone();
        tokio::spawn(async move { workspaces.teardown(&scratch).await });
    }
}

// ============================================================================
// PATH HELPERS
// ============================================================================

/// Turn a model-supplied path into a clean relative path
///
/// Absolute paths are accepted when they point inside `root`.
pub(crate) fn normalize_relative(root: &Path, path: &str) -> Result<PathBuf> {
    let raw = Path::new(path);
    let raw = if raw.is_absolute() {
        raw.strip_prefix(root)
            .map_err(|_| AgentError::path_escape(path))?
    } else {
        raw
    };

    let mut clean = PathBuf::new();
    for component in raw.components() {
        match component {
            Component::Normal(part) => clean.push(part),
            Component::CurDir => {}
            Component::ParentDir => {
                if !clean.pop() {
                    return Err(AgentError::path_escape(path));
                }
            }
            Component::RootDir | Component::Prefix(_) => {
                return Err(AgentError::path_escape(path));
            }
        }
    }

    if clean.as_os_str().is_empty() {
        return Err(AgentError::path_escape(path));
    }
    Ok(clean)
}

/// Files under `root`, relative to it, with `/` separators
pub(crate) fn list_files(root: &Path, options: &SessionOptions) -> Vec<String> {
    WalkDir::new(root)
        .into_iter()
        .filter_entry(|entry| {
            entry.depth() == 0
                || !entry.file_type().is_dir()
                || !options.is_ignored_dir(&entry.file_name().to_string_lossy())
        })
        .filter_map(|entry| match entry {
            Ok(entry) => Some(entry),
            Err(e) => {
                log::debug!("[Workspace] Skipping unreadable entry: {}", e);
                None
            }
        })
        .filter(|entry| entry.file_type().is_file())
        .filter_map(|entry| {
            entry
                .path()
                .strip_prefix(root)
                .ok()
                .map(to_slash)
        })
        .collect()
}

fn copy_tree(source: &Path, target: &Path, options: &SessionOptions) -> Result<()> {
    std::fs::create_dir_all(target)?;
    for relative in list_files(source, options) {
        let from = source.join(&relative);
        let to = target.join(&relative);
        if let Some(parent) = to.parent() {
            std::fs::create_dir_all(parent)?;
        }
        std::fs::copy(&from, &to)?;
    }
    Ok(())
}

fn join_relative(root: &Path, file: &str) -> String {
    if root.as_os_str().is_empty() {
        file.to_string()
    } else {
        format!("{}/{}", to_slash(root), file)
    }
}

fn to_slash(path: &Path) -> String {
    path.components()
        .filter_map(|c| match c {
            Component::Normal(part) => Some(part.to_string_lossy().into_owned()),
            _ => None,
        })
        .collect::<Vec<_>>()
        .join("/")
}
