//! Checkpoint capture and restore
//!
//! A checkpoint stores the text content of every project file so the project
//! can be put back exactly as it was when the owning message was submitted.
//! Binary files are neither captured nor removed on restore.

use std::collections::BTreeMap;
use std::path::{Path, PathBuf};
use std::sync::Arc;

use crate::error::{AgentError, Result};
use crate::types::{Checkpoint, MessageId, SessionOptions};
use crate::workspace;

/// Reads and writes project snapshots
#[derive(Debug, Clone)]
pub struct CheckpointManager {
    options: Arc<SessionOptions>,
}

impl CheckpointManager {
    /// Create a checkpoint manager
    #[must_use]
    pub const fn new(options: Arc<SessionOptions>) -> Self {
        Self { options }
    }

    /// Snapshot the text files under `project_root`
    ///
    /// # Errors
    /// Returns error if the project directory cannot be read
    pub async fn capture(&self, project_root: &Path, message_id: MessageId) -> Result<Checkpoint> {
        let root = project_root.to_path_buf();
        let options = Arc::clone(&self.options);
        let files = tokio::task::spawn_blocking(move || snapshot_files(&root, &options))
            .await
            .map_err(|e| AgentError::checkpoint(format!("Capture task failed: {e}")))??;

        let checkpoint = Checkpoint::new(message_id, files);
        log::debug!(
            "[Checkpoint] Captured {} ({} files) for message {}",
            checkpoint.id,
            checkpoint.files.len(),
            checkpoint.message_id
        );
        Ok(checkpoint)
    }

    /// Put `project_root` back to the state recorded in `checkpoint`
    ///
    /// Text files created after the checkpoint are removed.
    ///
    /// # Errors
    /// Returns error if a file cannot be written or removed
    pub async fn restore(&self, project_root: &Path, checkpoint: &Checkpoint) -> Result<()> {
        let root = project_root.to_path_buf();
        let options = Arc::clone(&self.options);
        let files = checkpoint.files.clone();
        tokio::task::spawn_blocking(move || restore_files(&root, &files, &options))
            .await
            .map_err(|e| AgentError::checkpoint(format!("Restore task failed: {e}")))??;

        log::info!(
            "[Checkpoint] Restored {} to {}",
            checkpoint.id,
            project_root.display()
        );
        Ok(())
    }
}

fn snapshot_files(root: &Path, options: &SessionOptions) -> Result<BTreeMap<String, String>> {
    if !root.is_dir() {
        return Err(AgentError::checkpoint(format!(
            "Project directory does not exist: {}",
            root.display()
        )));
    }

    Ok(workspace::list_files(root, options)
        .into_iter()
        .filter_map(|relative| {
            std::fs::read_to_string(root.join(&relative))
                .ok()
                .map(|content| (relative, content))
        })
        .collect())
}

fn restore_files(
    root: &Path,
    files: &BTreeMap<String, String>,
    options: &SessionOptions,
) -> Result<()> {
    for relative in workspace::list_files(root, options) {
        if files.contains_key(&relative) {
            continue;
        }
        let path: PathBuf = root.join(&relative);
        if std::fs::read_to_string(&path).is_ok() {
            std::fs::remove_file(&path)?;
        }
    }

    for (relative, content) in files {
        let path = root.join(relative);
        if let Some(parent) = path.parent() {
            std::fs::create_dir_all(parent)?;
        }
        std::fs::write(&path, content)?;
    }
    Ok(())
}
