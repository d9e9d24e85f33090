// SPDX-FileCopyrightText: 2026 Taskloom Contributors
// SPDX-License-Identifier: MIT OR Apache-2.0

//! Repository contract over the remote document database.
//!
//! One document per entity in backend-appropriate collections. There is
//! no engine-level cascade, so project deletion deletes children before
//! the parent in a fixed order, keeping both backends behaviorally
//! identical to callers.

use async_trait::async_trait;
use serde_json::{json, Value};
use tracing::warn;

use taskloom_core::traits::{
    MemoryRepository, ProjectRepository, StorageBackend, SummaryRepository, TaskRepository,
};
use taskloom_core::types::{
    new_id, now_rfc3339, EmbeddingResult, EmbeddingStatus, MemoryRecord, Project, ProjectSummary,
    RecordFilter, ScoredRecord, TaskHistoryEntry, TaskRef,
};
use taskloom_core::TaskloomError;

use crate::remote::client::DataApiClient;

const COLL_PROJECTS: &str = "projects";
const COLL_RECORDS: &str = "memory_records";
const COLL_SUMMARIES: &str = "project_summaries";
const COLL_TASKS: &str = "tasks";
const COLL_HISTORY: &str = "task_history";

/// Remote document-database backend.
#[derive(Debug, Clone)]
pub struct RemoteBackend {
    client: DataApiClient,
    /// Name of the managed vector index over memory-record embeddings.
    vector_index: String,
    /// Candidate pool multiplier for overfetch-then-filter.
    candidate_multiplier: usize,
}

impl RemoteBackend {
    pub fn new(client: DataApiClient, vector_index: String, candidate_multiplier: usize) -> Self {
        Self {
            client,
            vector_index,
            candidate_multiplier: candidate_multiplier.max(1),
        }
    }

    fn decode<T: serde::de::DeserializeOwned>(doc: Value) -> Result<T, TaskloomError> {
        serde_json::from_value(doc).map_err(|e| TaskloomError::Storage {
            source: format!("malformed document: {e}").into(),
        })
    }

    async fn count(&self, collection: &str, project_id: &str) -> Result<u64, TaskloomError> {
        let docs = self
            .client
            .aggregate(
                collection,
                json!([
                    { "$match": { "project_id": project_id } },
                    { "$count": "n" },
                ]),
            )
            .await?;
        Ok(docs
            .first()
            .and_then(|d| d.get("n"))
            .and_then(Value::as_u64)
            .unwrap_or(0))
    }
}

#[async_trait]
impl ProjectRepository for RemoteBackend {
    async fn get_project(&self, id: &str) -> Result<Project, TaskloomError> {
        let doc = self
            .client
            .find_one(COLL_PROJECTS, json!({ "id": id }))
            .await?
            .ok_or_else(|| TaskloomError::NotFound {
                entity: "project",
                id: id.to_string(),
            })?;
        Self::decode(doc)
    }

    async fn create_project(&self, project: &Project) -> Result<String, TaskloomError> {
        let mut project = project.clone();
        if project.id.is_empty() {
            project.id = new_id();
        }
        if project.created_at.is_empty() {
            project.created_at = now_rfc3339();
        }
        self.client
            .insert_one(COLL_PROJECTS, serde_json::to_value(&project).unwrap_or_default())
            .await?;
        Ok(project.id)
    }

    async fn update_project(&self, project: &Project) -> Result<(), TaskloomError> {
        let matched = self
            .client
            .update_one(
                COLL_PROJECTS,
                json!({ "id": project.id }),
                json!({ "$set": serde_json::to_value(project).unwrap_or_default() }),
                false,
            )
            .await?;
        if matched == 0 {
            return Err(TaskloomError::NotFound {
                entity: "project",
                id: project.id.clone(),
            });
        }
        Ok(())
    }

    async fn put_project(&self, project: &Project) -> Result<(), TaskloomError> {
        self.client
            .update_one(
                COLL_PROJECTS,
                json!({ "id": project.id }),
                json!({ "$set": serde_json::to_value(project).unwrap_or_default() }),
                true,
            )
            .await?;
        Ok(())
    }

    async fn delete_project(&self, id: &str) -> Result<(), TaskloomError> {
        // Children before parent: memory records, task history, tasks,
        // summary, then the project document itself.
        self.client
            .delete_many(COLL_RECORDS, json!({ "project_id": id }))
            .await?;
        self.client
            .delete_many(COLL_HISTORY, json!({ "project_id": id }))
            .await?;
        self.client
            .delete_many(COLL_TASKS, json!({ "project_id": id }))
            .await?;
        self.client
            .delete_many(COLL_SUMMARIES, json!({ "project_id": id }))
            .await?;
        let deleted = self
            .client
            .delete_many(COLL_PROJECTS, json!({ "id": id }))
            .await?;
        if deleted == 0 {
            return Err(TaskloomError::NotFound {
                entity: "project",
                id: id.to_string(),
            });
        }
        Ok(())
    }

    async fn list_projects(&self) -> Result<Vec<Project>, TaskloomError> {
        let docs = self
            .client
            .find(
                COLL_PROJECTS,
                json!({}),
                json!({ "created_at": -1, "id": -1 }),
                0,
                1000,
            )
            .await?;
        docs.into_iter().map(Self::decode).collect()
    }
}

#[async_trait]
impl MemoryRepository for RemoteBackend {
    async fn get_record(&self, id: &str) -> Result<MemoryRecord, TaskloomError> {
        let doc = self
            .client
            .find_one(COLL_RECORDS, json!({ "id": id }))
            .await?
            .ok_or_else(|| TaskloomError::NotFound {
                entity: "memory record",
                id: id.to_string(),
            })?;
        Self::decode(doc)
    }

    async fn create_record(&self, record: &MemoryRecord) -> Result<String, TaskloomError> {
        let mut record = record.clone();
        if record.id.is_empty() {
            record.id = new_id();
        }
        if record.created_at.is_empty() {
            record.created_at = now_rfc3339();
        }
        self.client
            .insert_one(COLL_RECORDS, serde_json::to_value(&record).unwrap_or_default())
            .await?;
        Ok(record.id)
    }

    async fn put_record(&self, record: &MemoryRecord) -> Result<(), TaskloomError> {
        self.client
            .update_one(
                COLL_RECORDS,
                json!({ "id": record.id }),
                json!({ "$set": serde_json::to_value(record).unwrap_or_default() }),
                true,
            )
            .await?;
        Ok(())
    }

    async fn set_embedding(
        &self,
        id: &str,
        outcome: &EmbeddingResult,
    ) -> Result<(), TaskloomError> {
        let update = match outcome {
            EmbeddingResult::Embedded(vector) => json!({
                "$set": {
                    "embedding": vector,
                    "embedding_status": "ready",
                    "embedding_error": null,
                }
            }),
            EmbeddingResult::Failed { reason } => json!({
                "$set": {
                    "embedding": null,
                    "embedding_status": "failed",
                    "embedding_error": reason,
                }
            }),
        };
        let matched = self
            .client
            .update_one(COLL_RECORDS, json!({ "id": id }), update, false)
            .await?;
        if matched == 0 {
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
        let mut query = json!({ "project_id": project_id });
        let q = query.as_object_mut().expect("object literal");
        if let Some(session_id) = &filter.session_id {
            q.insert("session_id".to_string(), json!(session_id));
        }
        if let Some(task_id) = &filter.task_id {
            q.insert("task_id".to_string(), json!(task_id));
        }
        if let Some(role) = filter.role {
            q.insert("role".to_string(), json!(role.as_str()));
        }
        if let Some(tag) = &filter.tag {
            q.insert("metadata.tags".to_string(), json!(tag));
        }

        let docs = self
            .client
            .find(
                COLL_RECORDS,
                query,
                json!({ "created_at": -1, "id": -1 }),
                offset,
                limit,
            )
            .await?;
        docs.into_iter().map(Self::decode).collect()
    }

    async fn count_records(&self, project_id: &str) -> Result<u64, TaskloomError> {
        self.count(COLL_RECORDS, project_id).await
    }

    async fn vector_search(
        &self,
        project_id: &str,
        query: &[f32],
        k: usize,
        filter: &RecordFilter,
    ) -> Result<Vec<ScoredRecord>, TaskloomError> {
        // The managed index applies vector similarity before arbitrary
        // metadata filters, so request a larger candidate pool and filter
        // client-side before truncating to k.
        let pool = k.max(1) * self.candidate_multiplier;
        let pipeline = json!([
            {
                "$vectorSearch": {
                    "index": self.vector_index,
                    "path": "embedding",
                    "queryVector": query,
                    "numCandidates": pool,
                    "limit": pool,
                    "filter": { "project_id": project_id },
                }
            },
            { "$addFields": { "score": { "$meta": "vectorSearchScore" } } },
        ]);

        let docs = match self.client.aggregate(COLL_RECORDS, pipeline).await {
            Ok(docs) => docs,
            Err(e) => {
                // The index is provisioned out-of-band; a missing or still
                // building index surfaces as a client error naming it.
                let message = e.to_string();
                if message.to_lowercase().contains("index") {
                    return Err(TaskloomError::VectorIndexUnavailable { message });
                }
                return Err(e);
            }
        };

        let mut scored = Vec::new();
        for mut doc in docs {
            let score = doc
                .as_object_mut()
                .and_then(|o| o.remove("score"))
                .and_then(|s| s.as_f64())
                .unwrap_or(0.0) as f32;
            let record: MemoryRecord = Self::decode(doc)?;

            if record.embedding_status != EmbeddingStatus::Ready {
                continue;
            }
            match record.embedding.as_deref() {
                Some(embedding) if embedding.len() == query.len() => {}
                Some(embedding) => {
                    warn!(
                        record_id = %record.id,
                        got = embedding.len(),
                        expected = query.len(),
                        "excluding record with mismatched embedding dimensions"
                    );
                    continue;
                }
                None => continue,
            }
            if !filter.matches(&record) {
                continue;
            }
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
impl SummaryRepository for RemoteBackend {
    async fn get_summary(
        &self,
        project_id: &str,
    ) -> Result<Option<ProjectSummary>, TaskloomError> {
        match self
            .client
            .find_one(COLL_SUMMARIES, json!({ "project_id": project_id }))
            .await?
        {
            Some(doc) => Ok(Some(Self::decode(doc)?)),
            None => Ok(None),
        }
    }

    async fn upsert_summary(&self, summary: &ProjectSummary) -> Result<(), TaskloomError> {
        self.client
            .update_one(
                COLL_SUMMARIES,
                json!({ "project_id": summary.project_id }),
                json!({ "$set": serde_json::to_value(summary).unwrap_or_default() }),
                true,
            )
            .await?;
        Ok(())
    }
}

#[async_trait]
impl TaskRepository for RemoteBackend {
    async fn put_task(&self, task: &TaskRef) -> Result<(), TaskloomError> {
        self.client
            .update_one(
                COLL_TASKS,
                json!({ "id": task.id }),
                json!({ "$set": serde_json::to_value(task).unwrap_or_default() }),
                true,
            )
            .await?;
        Ok(())
    }

    async fn list_tasks(&self, project_id: &str) -> Result<Vec<TaskRef>, TaskloomError> {
        let docs = self
            .client
            .find(
                COLL_TASKS,
                json!({ "project_id": project_id }),
                json!({ "created_at": 1, "id": 1 }),
                0,
                1000,
            )
            .await?;
        docs.into_iter().map(Self::decode).collect()
    }

    async fn count_tasks(&self, project_id: &str) -> Result<u64, TaskloomError> {
        self.count(COLL_TASKS, project_id).await
    }

    async fn put_history(&self, entry: &TaskHistoryEntry) -> Result<(), TaskloomError> {
        self.client
            .update_one(
                COLL_HISTORY,
                json!({ "id": entry.id }),
                json!({ "$set": serde_json::to_value(entry).unwrap_or_default() }),
                true,
            )
            .await?;
        Ok(())
    }

    async fn list_history(
        &self,
        project_id: &str,
    ) -> Result<Vec<TaskHistoryEntry>, TaskloomError> {
        let docs = self
            .client
            .find(
                COLL_HISTORY,
                json!({ "project_id": project_id }),
                json!({ "created_at": 1, "id": 1 }),
                0,
                1000,
            )
            .await?;
        docs.into_iter().map(Self::decode).collect()
    }

    async fn count_history(&self, project_id: &str) -> Result<u64, TaskloomError> {
        self.count(COLL_HISTORY, project_id).await
    }
}

impl StorageBackend for RemoteBackend {
    fn backend_name(&self) -> &'static str {
        "remote"
    }
}
