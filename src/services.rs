//! Collaborator interfaces consumed by the engine
//!
//! The language server, library catalogue, connector scaffolder and
//! datamapper live outside this crate. Each is reached through an
//! object-safe trait so hosts and tests can plug in their own.

use std::path::Path;

use async_trait::async_trait;
use serde::{Deserialize, Serialize};

use crate::error::Result;
use crate::types::{DatamapperRequest, Diagnostic, ExecutionContext, ProjectSource};

// ============================================================================
// LANGUAGE SERVER
// ============================================================================

/// Language-server collaborator
#[async_trait]
pub trait LanguageServer: Send + Sync {
    /// Announce that the scratch copies of `projects` are open
    ///
    /// # Errors
    /// Returns error if the language server rejects the notification
    async fn did_open(
        &self,
        scratch: &Path,
        real_project: &Path,
        projects: &[ProjectSource],
    ) -> Result<()>;

    /// Announce that the scratch copies of `projects` are closing
    ///
    /// # Errors
    /// Returns error if the language server rejects the notification
    async fn did_close(&self, scratch: &Path, projects: &[ProjectSource]) -> Result<()>;

    /// Diagnostics of every project under `scratch`
    ///
    /// # Errors
    /// Returns error if the language server cannot be queried
    async fn diagnostics(&self, scratch: &Path) -> Result<Vec<Diagnostic>>;
}

/// Language server that accepts every notification and reports no diagnostics
#[derive(Debug, Clone, Copy, Default)]
pub struct NoopLanguageServer;

#[async_trait]
impl LanguageServer for NoopLanguageServer {
    async fn did_open(&self, _: &Path, _: &Path, _: &[ProjectSource]) -> Result<()> {
        Ok(())
    }

    async fn did_close(&self, _: &Path, _: &[ProjectSource]) -> Result<()> {
        Ok(())
    }

    async fn diagnostics(&self, _: &Path) -> Result<Vec<Diagnostic>> {
        Ok(Vec::new())
    }
}

// ============================================================================
// LIBRARIES
// ============================================================================

/// A library the agent may use
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Library {
    /// Fully qualified library name
    pub name: String,
    /// Short description
    pub description: String,
}

impl Library {
    /// Create a library entry
    pub fn new(name: impl Into<String>, description: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            description: description.into(),
        }
    }
}

/// Which catalogue a lookup targets
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum LibraryScope {
    /// General purpose libraries
    General,
    /// Healthcare libraries
    Healthcare,
}

/// Library catalogue collaborator
#[async_trait]
pub trait LibraryProvider: Send + Sync {
    /// Every library in a catalogue
    ///
    /// # Errors
    /// Returns error if the catalogue cannot be read
    async fn available(&self, scope: LibraryScope) -> Result<Vec<Library>>;

    /// Libraries of a catalogue matching `names`
    ///
    /// # Errors
    /// Returns error if the catalogue cannot be read
    async fn lookup(&self, scope: LibraryScope, names: &[String]) -> Result<Vec<Library>> {
        Ok(self
            .available(scope)
            .await?
            .into_iter()
            .filter(|library| names.iter().any(|name| name == &library.name))
            .collect())
    }
}

/// Fixed in-memory catalogue
#[derive(Debug, Clone, Default)]
pub struct StaticLibraryProvider {
    general: Vec<Library>,
    healthcare: Vec<Library>,
}

impl StaticLibraryProvider {
    /// Create a catalogue
    #[must_use]
    pub const fn new(general: Vec<Library>, healthcare: Vec<Library>) -> Self {
        Self {
            general,
            healthcare,
        }
    }
}

#[async_trait]
impl LibraryProvider for StaticLibraryProvider {
    async fn available(&self, scope: LibraryScope) -> Result<Vec<Library>> {
        Ok(match scope {
            LibraryScope::General => self.general.clone(),
            LibraryScope::Healthcare => self.healthcare.clone(),
        })
    }
}

// ============================================================================
// CONNECTORS
// ============================================================================

/// A file produced by connector scaffolding
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct GeneratedFile {
    /// Path relative to the scratch root
    pub path: String,
    /// File content
    pub content: String,
}

/// Connector scaffolding collaborator
#[async_trait]
pub trait ConnectorGenerator: Send + Sync {
    /// Produce connector sources for a specification
    ///
    /// # Errors
    /// Returns error if the specification cannot be turned into a connector
    async fn generate(
        &self,
        scratch: &Path,
        connector_name: &str,
        spec: &serde_json::Value,
    ) -> Result<Vec<GeneratedFile>>;
}

// ============================================================================
// DATAMAPPER
// ============================================================================

/// Datamapper collaborator
#[async_trait]
pub trait DatamapperService: Send + Sync {
    /// Run a datamapper command against the real project
    ///
    /// Returns the files it modified, relative to the project root.
    ///
    /// # Errors
    /// Returns error if the mapping cannot be generated
    async fn execute(
        &self,
        request: &DatamapperRequest,
        ctx: &ExecutionContext,
    ) -> Result<Vec<String>>;
}
