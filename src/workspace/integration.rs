//! Reconciliation of scratch changes into the real project

use std::path::Path;

use crate::error::Result;
use crate::types::ExecutionContext;

use super::ScratchWorkspaces;

/// Apply every modified scratch file onto the real project
///
/// Files present in the scratch workspace are copied over; files that no
/// longer exist there are removed from the real project. Returns the number
/// of paths written or removed.
///
/// # Errors
/// Returns error on the first path that escapes the workspace or fails to copy
pub async fn integrate(
    scratch: &Path,
    modified_files: &[String],
    ctx: &ExecutionContext,
) -> Result<usize> {
    let real_root = ctx.source_root();
    let mut applied = 0;

    for relative in modified_files {
        let source = ScratchWorkspaces::resolve(scratch, relative)?;
        let target = ScratchWorkspaces::translate(scratch, real_root, relative)?;

        if tokio::fs::try_exists(&source).await? {
            if let Some(parent) = target.parent() {
                tokio::fs::create_dir_all(parent).await?;
            }
            tokio::fs::copy(&source, &target).await?;
            applied += 1;
        } else if tokio::fs::try_exists(&target).await? {
            tokio::fs::remove_file(&target).await?;
            applied += 1;
        }
    }

    log::info!(
        "[Integration] Applied {}/{} modified files to {}",
        applied,
        modified_files.len(),
        real_root.display()
    );
    Ok(applied)
}
