//! Session snapshot persistence
//!
//! Snapshots are keyed by project id. Hosts plug in any [`SessionStore`];
//! [`FileSessionStore`] keeps one JSON document per project and
//! [`MemorySessionStore`] keeps everything in process.

use std::collections::HashMap;
use std::path::PathBuf;

use async_trait::async_trait;
use parking_lot::Mutex;

use crate::error::{AgentError, Result};
use crate::machine::SessionSnapshot;
use crate::types::ProjectId;

/// Save/load/clear a session snapshot keyed by project id
#[async_trait]
pub trait SessionStore: Send + Sync {
    /// Store `snapshot`, replacing any previous snapshot of its project
    ///
    /// # Errors
    /// Returns error if the snapshot cannot be written
    async fn save(&self, snapshot: &SessionSnapshot) -> Result<()>;

    /// Most recent snapshot of a project, if any
    ///
    /// # Errors
    /// Returns error if a stored snapshot cannot be read
    async fn load(&self, project_id: &ProjectId) -> Result<Option<SessionSnapshot>>;

    /// Forget the snapshot of a project
    ///
    /// # Errors
    /// Returns error if the stored snapshot cannot be removed
    async fn clear(&self, project_id: &ProjectId) -> Result<()>;
}

// ============================================================================
// FILE STORE
// ============================================================================

/// One `<project-id>.json` file per project under a directory
#[derive(Debug, Clone)]
pub struct FileSessionStore {
    dir: PathBuf,
}

impl FileSessionStore {
    /// Create a store writing into `dir`; the directory is created on first save
    pub fn new(dir: impl Into<PathBuf>) -> Self {
        Self { dir: dir.into() }
    }

    fn path_for(&self, project_id: &ProjectId) -> PathBuf {
        self.dir.join(format!("{}.json", project_id.as_str()))
    }
}

#[async_trait]
impl SessionStore for FileSessionStore {
    async fn save(&self, snapshot: &SessionSnapshot) -> Result<()> {
        tokio::fs::create_dir_all(&self.dir).await?;
        let data = serde_json::to_vec_pretty(snapshot)?;
        let path = self.path_for(&snapshot.project_id);
        let tmp = path.with_extension("json.tmp");
        tokio::fs::write(&tmp, data).await?;
        tokio::fs::rename(&tmp, &path).await?;
        Ok(())
    }

    async fn load(&self, project_id: &ProjectId) -> Result<Option<SessionSnapshot>> {
        let path = self.path_for(project_id);
        let data = match tokio::fs::read(&path).await {
            Ok(data) => data,
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => return Ok(None),
            Err(e) => return Err(e.into()),
        };
        serde_json::from_slice(&data).map(Some).map_err(|e| {
            AgentError::persistence(format!("Corrupt session file {}: {e}", path.display()))
        })
    }

    async fn clear(&self, project_id: &ProjectId) -> Result<()> {
        match tokio::fs::remove_file(self.path_for(project_id)).await {
            Ok(()) => Ok(()),
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => Ok(()),
            Err(e) => Err(e.into()),
        }
    }
}

// ============================================================================
// MEMORY STORE
// ============================================================================

/// In-process store
#[derive(Debug, Default)]
pub struct MemorySessionStore {
    entries: Mutex<HashMap<ProjectId, SessionSnapshot>>,
}

impl MemorySessionStore {
    /// Create an empty store
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }
}

#[async_trait]
impl SessionStore for MemorySessionStore {
    async fn save(&self, snapshot: &SessionSnapshot) -> Result<()> {
        self.entries
            .lock()
            .insert(snapshot.project_id.clone(), snapshot.clone());
        Ok(())
    }

    async fn load(&self, project_id: &ProjectId) -> Result<Option<SessionSnapshot>> {
        Ok(self.entries.lock().get(project_id).cloned())
    }

    async fn clear(&self, project_id: &ProjectId) -> Result<()> {
        self.entries.lock().remove(project_id);
        Ok(())
    }
}
