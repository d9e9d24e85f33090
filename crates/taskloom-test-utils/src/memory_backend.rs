// SPDX-FileCopyrightText: 2026 Taskloom Contributors
// SPDX-License-Identifier: MIT OR Apache-2.0

//! In-memory `StorageBackend` with failure injection.
//!
//! Stands in for the remote backend in migration and degradation tests:
//! vector-index readiness can be toggled, and record writes can be made
//! to fail after N puts to exercise checkpoint resume.

use std::collections::HashMap;
use std::sync::atomic::{AtomicBool, AtomicUsize, Ordering};
use std::sync::RwLock;

use async_trait::async_trait;

use taskloom_core::traits::{
    MemoryRepository, ProjectRepository, StorageBackend, SummaryRepository, TaskRepository,
};
use taskloom_core::types::{
    cosine_similarity, new_id, now_rfc3339, EmbeddingResult, EmbeddingStatus, MemoryRecord,
    Project, ProjectSummary, RecordFilter, ScoredRecord, TaskHistoryEntry, TaskRef,
};
use taskloom_core::TaskloomError;

#[derive(Default)]
pub struct InMemoryBackend {
    projects: RwLock<HashMap<String, Project>>,
    records: RwLock<HashMap<String, MemoryRecord>>,
    summaries: RwLock<HashMap<String, ProjectSummary>>,
    tasks: RwLock<HashMap<String, TaskRef>>,
    history: RwLock<HashMap<String, TaskHistoryEntry>>,
    index_ready: AtomicBool,
    record_puts: AtomicUsize,
    fail_record_puts_after: AtomicUsize,
}

impl InMemoryBackend {
    pub fn new() -> Self {
        let backend = Self::default();
        backend.index_ready.store(true, Ordering::SeqCst);
        backend.fail_record_puts_after.store(usize::MAX, Ordering::SeqCst);
        backend
    }

    /// Toggle vector-index readiness (false simulates a still-building index).
    pub fn set_index_ready(&self, ready: bool) {
        self.index_ready.store(ready, Ordering::SeqCst);
    }

    /// Fail every record put after `n` successful ones.
    pub fn fail_record_puts_after(&self, n: usize) {
        self.fail_record_puts_after.store(n, Ordering::SeqCst);
    }

    /// Clear injected write failures.
    pub fn clear_failures(&self) {
        self.fail_record_puts_after.store(usize::MAX, Ordering::SeqCst);
    }

    /// Drop a record behind the backend's back (validation tests).
    pub fn lose_record(&self, id: &str) {
        self.records.write().unwrap().remove(id);
    }

    fn check_record_put(&self) -> Result<(), TaskloomError> {
        let done = self.record_puts.fetch_add(1, Ordering::SeqCst);
        if done >= self.fail_record_puts_after.load(Ordering::SeqCst) {
            return Err(TaskloomError::StorageUnavailable {
                message: "injected write failure".to_string(),
            });
        }
        Ok(())
    }
}

#[async_trait]
impl ProjectRepository for InMemoryBackend {
    async fn get_project(&self, id: &str) -> Result<Project, TaskloomError> {
        self.projects
            .read()
            .unwrap()
            .get(id)
            .cloned()
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
        let id = project.id.clone();
        self.projects.write().unwrap().insert(id.clone(), project);
        Ok(id)
    }

    async fn update_project(&self, project: &Project) -> Result<(), TaskloomError> {
        let mut projects = self.projects.write().unwrap();
        if !projects.contains_key(&project.id) {
            return Err(TaskloomError::NotFound {
                entity: "project",
                id: project.id.clone(),
            });
        }
        projects.insert(project.id.clone(), project.clone());
        Ok(())
    }

    async fn put_project(&self, project: &Project) -> Result<(), TaskloomError> {
        self.projects
            .write()
            .unwrap()
            .insert(project.id.clone(), project.clone());
        Ok(())
    }

    async fn delete_project(&self, id: &str) -> Result<(), TaskloomError> {
        self.records
            .write()
            .unwrap()
            .retain(|_, r| r.project_id != id);
        self.history
            .write()
            .unwrap()
            .retain(|_, h| h.project_id != id);
        self.tasks.write().unwrap().retain(|_, t| t.project_id != id);
        self.summaries.write().unwrap().remove(id);
        if self.projects.write().unwrap().remove(id).is_none() {
            return Err(TaskloomError::NotFound {
                entity: "project",
                id: id.to_string(),
            });
        }
        Ok(())
    }

    async fn list_projects(&self) -> Result<Vec<Project>, TaskloomError> {
        let mut projects: Vec<Project> = self.projects.read().unwrap().values().cloned().collect();
        projects.sort_by(|a, b| b.created_at.cmp(&a.created_at));
        Ok(projects)
    }
}

#[async_trait]
impl MemoryRepository for InMemoryBackend {
    async fn get_record(&self, id: &str) -> Result<MemoryRecord, TaskloomError> {
        self.records
            .read()
            .unwrap()
            .get(id)
            .cloned()
            .ok_or_else(|| TaskloomError::NotFound {
                entity: "memory record",
                id: id.to_string(),
            })
    }

    async fn create_record(&self, record: &MemoryRecord) -> Result<String, TaskloomError> {
        self.check_record_put()?;
        let mut record = record.clone();
        if record.id.is_empty() {
            record.id = new_id();
        }
        if record.created_at.is_empty() {
            record.created_at = now_rfc3339();
        }
        let id = record.id.clone();
        self.records.write().unwrap().insert(id.clone(), record);
        Ok(id)
    }

    async fn put_record(&self, record: &MemoryRecord) -> Result<(), TaskloomError> {
        self.check_record_put()?;
        self.records
            .write()
            .unwrap()
            .insert(record.id.clone(), record.clone());
        Ok(())
    }

    async fn set_embedding(
        &self,
        id: &str,
        outcome: &EmbeddingResult,
    ) -> Result<(), TaskloomError> {
        let mut records = self.records.write().unwrap();
        let record = records.get_mut(id).ok_or_else(|| TaskloomError::NotFound {
            entity: "memory record",
            id: id.to_string(),
        })?;
        match outcome {
            EmbeddingResult::Embedded(vector) => {
                record.embedding = Some(vector.clone());
                record.embedding_status = EmbeddingStatus::Ready;
                record.embedding_error = None;
            }
            EmbeddingResult::Failed { reason } => {
                record.embedding = None;
                record.embedding_status = EmbeddingStatus::Failed;
                record.embedding_error = Some(reason.clone());
            }
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
        let mut records: Vec<MemoryRecord> = self
            .records
            .read()
            .unwrap()
            .values()
            .filter(|r| r.project_id == project_id && filter.matches(r))
            .cloned()
            .collect();
        records.sort_by(|a, b| {
            b.created_at
                .cmp(&a.created_at)
                .then_with(|| b.id.cmp(&a.id))
        });
        Ok(records.into_iter().skip(offset).take(limit).collect())
    }

    async fn count_records(&self, project_id: &str) -> Result<u64, TaskloomError> {
        Ok(self
            .records
            .read()
            .unwrap()
            .values()
            .filter(|r| r.project_id == project_id)
            .count() as u64)
    }

    async fn vector_search(
        &self,
        project_id: &str,
        query: &[f32],
        k: usize,
        filter: &RecordFilter,
    ) -> Result<Vec<ScoredRecord>, TaskloomError> {
        if !self.index_ready.load(Ordering::SeqCst) {
            return Err(TaskloomError::VectorIndexUnavailable {
                message: "vector index is still building".to_string(),
            });
        }

        let mut scored: Vec<ScoredRecord> = self
            .records
            .read()
            .unwrap()
            .values()
            .filter(|r| {
                r.project_id == project_id
                    && r.embedding_status == EmbeddingStatus::Ready
                    && filter.matches(r)
            })
            .filter_map(|r| {
                let embedding = r.embedding.as_deref()?;
                if embedding.len() != query.len() {
                    return None;
                }
                Some(ScoredRecord {
                    record: r.clone(),
                    score: cosine_similarity(query, embedding),
                })
            })
            .collect();

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
impl SummaryRepository for InMemoryBackend {
    async fn get_summary(
        &self,
        project_id: &str,
    ) -> Result<Option<ProjectSummary>, TaskloomError> {
        Ok(self.summaries.read().unwrap().get(project_id).cloned())
    }

    async fn upsert_summary(&self, summary: &ProjectSummary) -> Result<(), TaskloomError> {
        self.summaries
            .write()
            .unwrap()
            .insert(summary.project_id.clone(), summary.clone());
        Ok(())
    }
}

#[async_trait]
impl TaskRepository for InMemoryBackend {
    async fn put_task(&self, task: &TaskRef) -> Result<(), TaskloomError> {
        self.tasks
            .write()
            .unwrap()
            .insert(task.id.clone(), task.clone());
        Ok(())
    }

    async fn list_tasks(&self, project_id: &str) -> Result<Vec<TaskRef>, TaskloomError> {
        let mut tasks: Vec<TaskRef> = self
            .tasks
            .read()
            .unwrap()
            .values()
            .filter(|t| t.project_id == project_id)
            .cloned()
            .collect();
        tasks.sort_by(|a, b| a.created_at.cmp(&b.created_at).then_with(|| a.id.cmp(&b.id)));
        Ok(tasks)
    }

    async fn count_tasks(&self, project_id: &str) -> Result<u64, TaskloomError> {
        Ok(self
            .tasks
            .read()
            .unwrap()
            .values()
            .filter(|t| t.project_id == project_id)
            .count() as u64)
    }

    async fn put_history(&self, entry: &TaskHistoryEntry) -> Result<(), TaskloomError> {
        self.history
            .write()
            .unwrap()
            .insert(entry.id.clone(), entry.clone());
        Ok(())
    }

    async fn list_history(
        &self,
        project_id: &str,
    ) -> Result<Vec<TaskHistoryEntry>, TaskloomError> {
        let mut entries: Vec<TaskHistoryEntry> = self
            .history
            .read()
            .unwrap()
            .values()
            .filter(|h| h.project_id == project_id)
            .cloned()
            .collect();
        entries.sort_by(|a, b| a.created_at.cmp(&b.created_at).then_with(|| a.id.cmp(&b.id)));
        Ok(entries)
    }

    async fn count_history(&self, project_id: &str) -> Result<u64, TaskloomError> {
        Ok(self
            .history
            .read()
            .unwrap()
            .values()
            .filter(|h| h.project_id == project_id)
            .count() as u64)
    }
}

impl StorageBackend for InMemoryBackend {
    fn backend_name(&self) -> &'static str {
        "memory"
    }
}
