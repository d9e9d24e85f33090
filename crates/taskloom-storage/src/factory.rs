// SPDX-FileCopyrightText: 2026 Taskloom Contributors
// SPDX-License-Identifier: MIT OR Apache-2.0

//! Per-project backend resolution.
//!
//! The factory is the only place that branches on a project's storage
//! mode. Every caller receives a [`ProjectBinding`] holding one backend
//! and the matching embedding provider; swapping the bound backend never
//! requires touching a call site.

use std::sync::Arc;

use taskloom_core::traits::{EmbeddingProvider, ProjectRepository, StorageBackend};
use taskloom_core::types::{Project, StorageMode};
use taskloom_core::TaskloomError;

use crate::sqlite::SqliteBackend;

/// One project's resolved backend and embedding provider.
#[derive(Clone)]
pub struct ProjectBinding {
    pub project: Project,
    pub backend: Arc<dyn StorageBackend>,
    pub embedder: Arc<dyn EmbeddingProvider>,
}

impl std::fmt::Debug for ProjectBinding {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("ProjectBinding")
            .field("project", &self.project)
            .field("backend", &self.backend.backend_name())
            .field("embedder", &self.embedder.name())
            .finish()
    }
}

/// Resolves which storage backend and embedding provider serve a project.
///
/// The embedded SQLite backend is always present and is the authoritative
/// registry of project rows; the remote backend and provider exist only
/// when the process is configured for them.
pub struct BackendFactory {
    registry: Arc<SqliteBackend>,
    local_embedder: Arc<dyn EmbeddingProvider>,
    remote: Option<Arc<dyn StorageBackend>>,
    remote_embedder: Option<Arc<dyn EmbeddingProvider>>,
}

impl BackendFactory {
    pub fn new(
        registry: Arc<SqliteBackend>,
        local_embedder: Arc<dyn EmbeddingProvider>,
        remote: Option<Arc<dyn StorageBackend>>,
        remote_embedder: Option<Arc<dyn EmbeddingProvider>>,
    ) -> Self {
        Self {
            registry,
            local_embedder,
            remote,
            remote_embedder,
        }
    }

    /// The always-present project registry (embedded backend).
    pub fn registry(&self) -> Arc<SqliteBackend> {
        Arc::clone(&self.registry)
    }

    /// Capability query: is remote storage configured for this process?
    pub fn remote_available(&self) -> bool {
        self.remote.is_some() && self.remote_embedder.is_some()
    }

    /// Resolve the binding for a project id.
    pub async fn bind(&self, project_id: &str) -> Result<ProjectBinding, TaskloomError> {
        let project = self.registry.get_project(project_id).await?;
        self.bind_project(project)
    }

    /// Resolve the binding for an already loaded project.
    pub fn bind_project(&self, project: Project) -> Result<ProjectBinding, TaskloomError> {
        let (backend, embedder): (Arc<dyn StorageBackend>, Arc<dyn EmbeddingProvider>) =
            match project.storage_mode {
                StorageMode::Local => (
                    Arc::clone(&self.registry) as Arc<dyn StorageBackend>,
                    Arc::clone(&self.local_embedder),
                ),
                StorageMode::Remote => {
                    let backend = self.remote.clone().ok_or_else(|| {
                        TaskloomError::Config(format!(
                            "project {} is bound to remote storage but this process has none configured",
                            project.id
                        ))
                    })?;
                    let embedder = self.remote_embedder.clone().ok_or_else(|| {
                        TaskloomError::Config(
                            "remote embedding provider is not configured".to_string(),
                        )
                    })?;
                    (backend, embedder)
                }
            };

        Ok(ProjectBinding {
            project,
            backend,
            embedder,
        })
    }
}
