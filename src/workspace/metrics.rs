//! File and line counts of a project tree

use std::path::Path;

use serde::{Deserialize, Serialize};

use crate::types::SessionOptions;

/// Size of a project tree
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct ProjectMetrics {
    /// Number of files
    pub file_count: usize,
    /// Total number of lines across readable text files
    pub line_count: usize,
}

/// Count files and lines under `root`
///
/// Files that are not valid UTF-8 count towards `file_count` only.
#[must_use]
pub fn measure(root: &Path, options: &SessionOptions) -> ProjectMetrics {
    let files = super::list_files(root, options);
    let line_count = files
        .iter()
        .filter_map(|file| std::fs::read_to_string(root.join(file)).ok())
        .map(|content| content.split('\n').count())
        .sum();

    ProjectMetrics {
        file_count: files.len(),
        line_count,
    }
}

/// [`measure`] on the blocking pool
pub async fn measure_async(root: &Path, options: &SessionOptions) -> ProjectMetrics {
    let root = root.to_path_buf();
    let options = options.clone();
    tokio::task::spawn_blocking(move || measure(&root, &options))
        .await
        .unwrap_or_else(|e| {
            log::warn!("[Metrics] Measuring task failed: {}", e);
            ProjectMetrics::default()
        })
}
