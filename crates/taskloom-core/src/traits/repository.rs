// SPDX-FileCopyrightText: 2026 Taskloom Contributors
// SPDX-License-Identifier: MIT OR Apache-2.0

//! Storage-agnostic repository contracts.
//!
//! One trait per entity kind; the embedded SQLite backend and the remote
//! document backend implement the identical set. Callers are bound to
//! exactly one backend per project by the factory and never branch on
//! storage mode themselves.

use async_trait::async_trait;

use crate::error::TaskloomError;
use crate::types::{
    MemoryRecord, Project, ProjectSummary, RecordFilter, ScoredRecord, TaskHistoryEntry, TaskRef,
};

/// Project CRUD.
#[async_trait]
pub trait ProjectRepository: Send + Sync {
    /// Fetch a project or return `NotFound`.
    async fn get_project(&self, id: &str) -> Result<Project, TaskloomError>;

    /// Create a project. An empty `id` is assigned by the backend; the
    /// assigned id is returned and callers never assume its format.
    async fn create_project(&self, project: &Project) -> Result<String, TaskloomError>;

    /// Update a project in place.
    async fn update_project(&self, project: &Project) -> Result<(), TaskloomError>;

    /// Idempotent upsert preserving the given id. Used by migration copy.
    async fn put_project(&self, project: &Project) -> Result<(), TaskloomError>;

    /// Delete a project and cascade to its memory records, task history,
    /// tasks, and summary, in that fixed order.
    async fn delete_project(&self, id: &str) -> Result<(), TaskloomError>;

    /// List all projects, newest-first.
    async fn list_projects(&self) -> Result<Vec<Project>, TaskloomError>;
}

/// Memory record persistence and vector search.
#[async_trait]
pub trait MemoryRepository: Send + Sync {
    /// Fetch a record or return `NotFound`.
    async fn get_record(&self, id: &str) -> Result<MemoryRecord, TaskloomError>;

    /// Create a record. An empty `id` is assigned by the backend.
    async fn create_record(&self, record: &MemoryRecord) -> Result<String, TaskloomError>;

    /// Idempotent upsert preserving the given id. Used by migration copy.
    async fn put_record(&self, record: &MemoryRecord) -> Result<(), TaskloomError>;

    /// Fulfill (or fail) a pending record's embedding.
    async fn set_embedding(
        &self,
        id: &str,
        outcome: &crate::types::EmbeddingResult,
    ) -> Result<(), TaskloomError>;

    /// Page through a project's records, newest-first.
    async fn list_records(
        &self,
        project_id: &str,
        filter: &RecordFilter,
        offset: usize,
        limit: usize,
    ) -> Result<Vec<MemoryRecord>, TaskloomError>;

    /// Total record count for a project.
    async fn count_records(&self, project_id: &str) -> Result<u64, TaskloomError>;

    /// Nearest-neighbor search over a project's `Ready` records.
    ///
    /// Cosine similarity, descending score, ties broken newest-first.
    /// Records whose vector length does not match `query` are excluded
    /// and logged, never an error on the read path.
    async fn vector_search(
        &self,
        project_id: &str,
        query: &[f32],
        k: usize,
        filter: &RecordFilter,
    ) -> Result<Vec<ScoredRecord>, TaskloomError>;
}

/// The single rolling summary per project.
#[async_trait]
pub trait SummaryRepository: Send + Sync {
    async fn get_summary(&self, project_id: &str)
        -> Result<Option<ProjectSummary>, TaskloomError>;

    /// Insert-or-replace; at most one row per project.
    async fn upsert_summary(&self, summary: &ProjectSummary) -> Result<(), TaskloomError>;
}

/// Minimal task/task-history persistence for tagging, cascade delete,
/// and verbatim migration copy.
#[async_trait]
pub trait TaskRepository: Send + Sync {
    async fn put_task(&self, task: &TaskRef) -> Result<(), TaskloomError>;
    async fn list_tasks(&self, project_id: &str) -> Result<Vec<TaskRef>, TaskloomError>;
    async fn count_tasks(&self, project_id: &str) -> Result<u64, TaskloomError>;

    async fn put_history(&self, entry: &TaskHistoryEntry) -> Result<(), TaskloomError>;
    async fn list_history(&self, project_id: &str)
        -> Result<Vec<TaskHistoryEntry>, TaskloomError>;
    async fn count_history(&self, project_id: &str) -> Result<u64, TaskloomError>;
}

/// The full per-backend contract: every entity repository behind one handle.
pub trait StorageBackend:
    ProjectRepository + MemoryRepository + SummaryRepository + TaskRepository
{
    /// Backend identifier used in logs ("sqlite" or "remote").
    fn backend_name(&self) -> &'static str;
}
