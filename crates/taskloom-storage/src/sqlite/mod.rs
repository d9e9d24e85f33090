// SPDX-FileCopyrightText: 2026 Taskloom Contributors
// SPDX-License-Identifier: MIT OR Apache-2.0

//! Embedded SQLite backend.
//!
//! Implements the full repository contract over the typed query modules.
//! Vector search is brute-force cosine over a project's `Ready` records;
//! per-project record counts are bounded, so in-process scoring beats an
//! index here. Also the authoritative registry of projects and migration
//! checkpoints, regardless of where a project's memory records live.

pub mod projects;
pub mod records;
pub mod runs;
pub mod summaries;
pub mod tasks;

use async_trait::async_trait;
use tracing::warn;

use taskloom_core::traits::{
    MemoryRepository, ProjectRepository, StorageBackend, SummaryRepository, TaskRepository,
};
use taskloom_core::types::{
    cosine_similarity, new_id, now_rfc3339, EmbeddingResult, MemoryRecord, MigrationRun, Project,
    ProjectSummary, RecordFilter, ScoredRecord, TaskHistoryEntry, TaskRef,
};
use taskloom_core::TaskloomError;

use crate::database::Database;

/// SQLite-backed storage.
#[derive(Clone)]
pub struct SqliteBackend {
    db: Database,
}

impl SqliteBackend {
    pub fn new(db: Database) -> Self {
        Self { db }
    }

    pub fn database(&self) -> &Database {
        &self.db
    }

    // --- Migration support (source-side only, not part of the backend contract) ---

    /// Current migration checkpoint for a project, if any.
    pub async fn migration_run(
        &self,
        project_id: &str,
    ) -> Result<Option<MigrationRun>, TaskloomError> {
        runs::get_run(&self.db, project_id).await
    }

    /// Persist a migration checkpoint.
    pub async fn set_migration_run(&self, run: &MigrationRun) -> Result<(), TaskloomError> {
        runs::upsert_run(&self.db, run).await
    }

    /// Stable oldest-first record page for migration export.
    pub async fn export_records_page(
        &self,
        project_id: &str,
        offset: usize,
        limit: usize,
    ) -> Result<Vec<MemoryRecord>, TaskloomError> {
        records::export_page(&self.db, project_id, offset, limit).await
    }
}

#[async_trait]
impl ProjectRepository for SqliteBackend {
    async fn get_project(&self, id: &str) -> Result<Project, TaskloomError> {
        projects::get_project(&self.db, id)
            .await?
            .ok_or_else(|| TaskloomError::NotFound {
                entity: "project",
                id: id.to_string(),
            })
    }

    async fn create_project(&self, project: &Project) -> Result<String, TaskloomError> {
        let mut project = project.clone();
        if project.id.is_empty() {
            project.id = new_id();
        }
        if project.created_at.is_empty() {
            project.created_at = now_rfc3339();
        }
        projects::insert_project(&self.db, &project).await?;
        Ok(project.id)
    }

    async fn update_project(&self, project: &Project) -> Result<(), TaskloomError> {
        let n = projects::update_project(&self.db, project).await?;
        if n == 0 {
            return Err(TaskloomError::NotFound {
                entity: "project",
                id: project.id.clone(),
            });
        }
        Ok(())
    }

    async fn put_project(&self, project: &Project) -> Result<(), TaskloomError> {
        projects::put_project(&self.db, project).await
    }

    async fn delete_project(&self, id: &str) -> Result<(), TaskloomError> {
        let found = projects::delete_cascade(&self.db, id).await?;
        if !found {
            return Err(TaskloomError::NotFound {
                entity: "project",
                id: id.to_string(),
            });
        }
        Ok(())
    }

    async fn list_projects(&self) -> Result<Vec<Project>, TaskloomError> {
        projects::list_projects(&self.db).await
    }
}

#[async_trait]
impl MemoryRepository for SqliteBackend {
    async fn get_record(&self, id: &str) -> Result<MemoryRecord, TaskloomError> {
        records::get_record(&self.db, id)
            .await?
            .ok_or_else(|| TaskloomError::NotFound {
                entity: "memory record",
                id: id.to_string(),
            })
    }

    async fn create_record(&self, record: &MemoryRecord) -> Result<String, TaskloomError> {
        let mut record = record.clone();
        if record.id.is_empty() {
            record.id = new_id();
        }
        if record.created_at.is_empty() {
            record.created_at = now_rfc3339();
        }
        records::insert_record(&self.db, &record).await?;
        Ok(record.id)
    }

    async fn put_record(&self, record: &MemoryRecord) -> Result<(), TaskloomError> {
        records::put_record(&self.db, record).await
    }

    async fn set_embedding(
        &self,
        id: &str,
        outcome: &EmbeddingResult,
    ) -> Result<(), TaskloomError> {
        let n = records::set_embedding(&self.db, id, outcome).await?;
        if n == 0 {
            return Err(TaskloomError::NotFound {
                entity: "memory record",
                id: id.to_string(),
            });
        }
        Ok(())
    }

    async fn list_records(
        &self,
        project_id: &str,
        filter: &RecordFilter,
        offset: usize,
        limit: usize,
    ) -> Result<Vec<MemoryRecord>, TaskloomError> {
        records::list_records(&self.db, project_id, filter, offset, limit).await
    }

    async fn count_records(&self, project_id: &str) -> Result<u64, TaskloomError> {
        records::count_records(&self.db, project_id).await
    }

    async fn vector_search(
        &self,
        project_id: &str,
        query: &[f32],
        k: usize,
        filter: &RecordFilter,
    ) -> Result<Vec<ScoredRecord>, TaskloomError> {
        let candidates = records::ready_records(&self.db, project_id).await?;

        let mut scored = Vec::new();
        for record in candidates {
            let Some(embedding) = record.embedding.as_deref() else {
                continue;
            };
            if embedding.len() != query.len() {
                // Mixed-dimension vectors should not occur; exclude and log
                // rather than failing the read path.
                warn!(
                    record_id = %record.id,
                    got = embedding.len(),
                    expected = query.len(),
                    "excluding record with mismatched embedding dimensions"
                );
                continue;
            }
            if !filter.matches(&record) {
                continue;
            }
            let score = cosine_similarity(query, embedding);
            scored.push(ScoredRecord { record, score });
        }

        scored.sort_by(|a, b| {
            b.score
                .partial_cmp(&a.score)
                .unwrap_or(std::cmp::Ordering::Equal)
                .then_with(|| b.record.created_at.cmp(&a.record.created_at))
        });
        scored.truncate(k);
        Ok(scored)
    }
}

#[async_trait]
impl SummaryRepository for SqliteBackend {
    async fn get_summary(
        &self,
        project_id: &str,
    ) -> Result<Option<ProjectSummary>, TaskloomError> {
        summaries::get_summary(&self.db, project_id).await
    }

    async fn upsert_summary(&self, summary: &ProjectSummary) -> Result<(), TaskloomError> {
        summaries::upsert_summary(&self.db, summary).await
    }
}

#[async_trait]
impl TaskRepository for SqliteBackend {
    async fn put_task(&self, task: &TaskRef) -> Result<(), TaskloomError> {
        tasks::put_task(&self.db, task).await
    }

    async fn list_tasks(&self, project_id: &str) -> Result<Vec<TaskRef>, TaskloomError> {
        tasks::list_tasks(&self.db, project_id).await
    }

    async fn count_tasks(&self, project_id: &str) -> Result<u64, TaskloomError> {
        tasks::count_tasks(&self.db, project_id).await
    }

    async fn put_history(&self, entry: &TaskHistoryEntry) -> Result<(), TaskloomError> {
        tasks::put_history(&self.db, entry).await
    }

    async fn list_history(
        &self,
        project_id: &str,
    ) -> Result<Vec<TaskHistoryEntry>, TaskloomError> {
        tasks::list_history(&self.db, project_id).await
    }

    async fn count_history(&self, project_id: &str) -> Result<u64, TaskloomError> {
        tasks::count_history(&self.db, project_id).await
    }
}

impl StorageBackend for SqliteBackend {
    fn backend_name(&self) -> &'static str {
        "sqlite"
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use taskloom_core::types::{EmbeddingStatus, MemoryRole};

    async fn setup_backend() -> SqliteBackend {
        let db = Database::open_in_memory().await.unwrap();
        let backend = SqliteBackend::new(db);
        backend
            .create_project(&Project {
                id: "p1".to_string(),
                name: "board".to_string(),
                path: "/work/board".to_string(),
                storage_mode: taskloom_core::types::StorageMode::Local,
                created_at: now_rfc3339(),
            })
            .await
            .unwrap();
        backend
    }

    fn ready_record(content: &str, vector: Vec<f32>, timestamp: &str) -> MemoryRecord {
        MemoryRecord {
            id: new_id(),
            project_id: "p1".to_string(),
            session_id: "s1".to_string(),
            task_id: None,
            role: MemoryRole::User,
            content: content.to_string(),
            embedding: Some(vector),
            embedding_status: EmbeddingStatus::Ready,
            embedding_error: None,
            metadata: None,
            created_at: timestamp.to_string(),
        }
    }

    #[tokio::test]
    async fn create_assigns_id_when_empty() {
        let backend = setup_backend().await;
        let mut record = ready_record("hello", vec![1.0, 0.0], "2026-05-01T10:00:00.000Z");
        record.id = String::new();
        let id = backend.create_record(&record).await.unwrap();
        assert!(!id.is_empty());
        assert_eq!(backend.get_record(&id).await.unwrap().content, "hello");
    }

    #[tokio::test]
    async fn get_missing_record_is_not_found() {
        let backend = setup_backend().await;
        let err = backend.get_record("ghost").await.unwrap_err();
        assert!(matches!(err, TaskloomError::NotFound { .. }));
    }

    #[tokio::test]
    async fn vector_search_ranks_by_similarity() {
        let backend = setup_backend().await;
        backend
            .put_record(&ready_record("close", vec![1.0, 0.0], "2026-05-01T10:00:00.000Z"))
            .await
            .unwrap();
        backend
            .put_record(&ready_record("far", vec![0.0, 1.0], "2026-05-01T10:00:01.000Z"))
            .await
            .unwrap();
        backend
            .put_record(&ready_record("middle", vec![0.7071, 0.7071], "2026-05-01T10:00:02.000Z"))
            .await
            .unwrap();

        let hits = backend
            .vector_search("p1", &[1.0, 0.0], 3, &RecordFilter::default())
            .await
            .unwrap();

        assert_eq!(hits.len(), 3);
        assert_eq!(hits[0].record.content, "close");
        assert_eq!(hits[1].record.content, "middle");
        assert_eq!(hits[2].record.content, "far");
        assert!((hits[0].score - 1.0).abs() < 0.001);
    }

    #[tokio::test]
    async fn vector_search_ties_break_newest_first() {
        let backend = setup_backend().await;
        backend
            .put_record(&ready_record("older", vec![1.0, 0.0], "2026-05-01T10:00:00.000Z"))
            .await
            .unwrap();
        backend
            .put_record(&ready_record("newer", vec![1.0, 0.0], "2026-05-01T10:00:05.000Z"))
            .await
            .unwrap();

        let hits = backend
            .vector_search("p1", &[1.0, 0.0], 2, &RecordFilter::default())
            .await
            .unwrap();
        assert_eq!(hits[0].record.content, "newer");
        assert_eq!(hits[1].record.content, "older");
    }

    #[tokio::test]
    async fn vector_search_excludes_mismatched_dimensions() {
        let backend = setup_backend().await;
        backend
            .put_record(&ready_record("good", vec![1.0, 0.0], "2026-05-01T10:00:00.000Z"))
            .await
            .unwrap();
        backend
            .put_record(&ready_record("bad dims", vec![1.0, 0.0, 0.0], "2026-05-01T10:00:01.000Z"))
            .await
            .unwrap();

        let hits = backend
            .vector_search("p1", &[1.0, 0.0], 5, &RecordFilter::default())
            .await
            .unwrap();
        assert_eq!(hits.len(), 1);
        assert_eq!(hits[0].record.content, "good");
    }

    #[tokio::test]
    async fn vector_search_skips_pending_and_failed() {
        let backend = setup_backend().await;
        let mut pending = ready_record("pending", vec![1.0, 0.0], "2026-05-01T10:00:00.000Z");
        pending.embedding = None;
        pending.embedding_status = EmbeddingStatus::Pending;
        backend.put_record(&pending).await.unwrap();

        let hits = backend
            .vector_search("p1", &[1.0, 0.0], 5, &RecordFilter::default())
            .await
            .unwrap();
        assert!(hits.is_empty());
    }

    #[tokio::test]
    async fn vector_search_applies_metadata_filter() {
        let backend = setup_backend().await;
        let mut tagged = ready_record("tagged", vec![1.0, 0.0], "2026-05-01T10:00:00.000Z");
        tagged.metadata = Some(serde_json::json!({ "tags": ["infra"] }));
        backend.put_record(&tagged).await.unwrap();
        backend
            .put_record(&ready_record("untagged", vec![1.0, 0.0], "2026-05-01T10:00:01.000Z"))
            .await
            .unwrap();

        let filter = RecordFilter {
            tag: Some("infra".to_string()),
            ..Default::default()
        };
        let hits = backend.vector_search("p1", &[1.0, 0.0], 5, &filter).await.unwrap();
        assert_eq!(hits.len(), 1);
        assert_eq!(hits[0].record.content, "tagged");
    }

    #[tokio::test]
    async fn delete_project_cascades_to_everything() {
        let backend = setup_backend().await;
        backend
            .put_record(&ready_record("turn", vec![1.0, 0.0], "2026-05-01T10:00:00.000Z"))
            .await
            .unwrap();
        backend
            .put_task(&TaskRef {
                id: "t1".to_string(),
                project_id: "p1".to_string(),
                title: "task".to_string(),
                state: "todo".to_string(),
                created_at: now_rfc3339(),
            })
            .await
            .unwrap();
        backend
            .put_history(&TaskHistoryEntry {
                id: "h1".to_string(),
                task_id: "t1".to_string(),
                project_id: "p1".to_string(),
                note: "created".to_string(),
                created_at: now_rfc3339(),
            })
            .await
            .unwrap();
        backend
            .upsert_summary(&ProjectSummary {
                project_id: "p1".to_string(),
                summary: "digest".to_string(),
                trigger: "session_end".to_string(),
                updated_at: now_rfc3339(),
            })
            .await
            .unwrap();

        backend.delete_project("p1").await.unwrap();

        assert!(matches!(
            backend.get_project("p1").await.unwrap_err(),
            TaskloomError::NotFound { .. }
        ));
        assert_eq!(backend.count_records("p1").await.unwrap(), 0);
        assert_eq!(backend.count_tasks("p1").await.unwrap(), 0);
        assert_eq!(backend.count_history("p1").await.unwrap(), 0);
        assert!(backend.get_summary("p1").await.unwrap().is_none());
    }
}
