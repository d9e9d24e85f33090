// SPDX-FileCopyrightText: 2026 Taskloom Contributors
// SPDX-License-Identifier: MIT OR Apache-2.0

//! The memory service: record, retrieve, summarize.
//!
//! Write path: the turn's text is persisted immediately with a `pending`
//! embedding, so content is never lost even when the provider is down;
//! a background task fulfills the embedding and moves the record to
//! `ready` or `failed`. Read path: embed the query and ask the bound
//! backend for nearest neighbors; when the vector index is not ready (or
//! the query cannot be embedded), degrade to a recency/metadata query
//! instead of erroring.

use std::sync::Arc;

use tracing::{debug, warn};

use taskloom_config::model::MemoryConfig;
use taskloom_core::traits::{MemoryRepository, SummaryRepository};
use taskloom_core::types::{
    new_id, now_rfc3339, EmbeddingResult, EmbeddingStatus, MemoryRecord, MemoryRole,
    ProjectSummary, RecordFilter, ScoredRecord,
};
use taskloom_core::TaskloomError;
use taskloom_storage::factory::{BackendFactory, ProjectBinding};

use crate::summarizer::Summarizer;

/// Aggregate read served to the agent bridge: recent turns, the rolling
/// summary, and the top semantic hits for an optional query.
#[derive(Debug)]
pub struct MemoryContext {
    pub recent: Vec<MemoryRecord>,
    pub summary: Option<ProjectSummary>,
    pub relevant: Vec<ScoredRecord>,
}

struct Inner {
    factory: Arc<BackendFactory>,
    summarizer: Box<dyn Summarizer>,
    config: MemoryConfig,
}

/// Cheap-to-clone handle; all state is shared.
#[derive(Clone)]
pub struct MemoryService {
    inner: Arc<Inner>,
}

impl MemoryService {
    pub fn new(
        factory: Arc<BackendFactory>,
        summarizer: Box<dyn Summarizer>,
        config: MemoryConfig,
    ) -> Self {
        Self {
            inner: Arc::new(Inner {
                factory,
                summarizer,
                config,
            }),
        }
    }

    /// Persist one conversation turn and schedule embedding fulfillment.
    ///
    /// Returns as soon as the text is durably stored; the embedding is
    /// requested asynchronously from the provider bound to the project's
    /// storage mode. Concurrent calls are independent; timestamps
    /// determine retrieval order.
    pub async fn record_message(
        &self,
        project_id: &str,
        session_id: &str,
        task_id: Option<&str>,
        role: MemoryRole,
        content: &str,
        metadata: Option<serde_json::Value>,
    ) -> Result<MemoryRecord, TaskloomError> {
        let binding = self.inner.factory.bind(project_id).await?;

        let mut record = MemoryRecord {
            id: new_id(),
            project_id: project_id.to_string(),
            session_id: session_id.to_string(),
            task_id: task_id.map(str::to_string),
            role,
            content: content.to_string(),
            embedding: None,
            embedding_status: EmbeddingStatus::Pending,
            embedding_error: None,
            metadata,
            created_at: now_rfc3339(),
        };
        record.id = binding.backend.create_record(&record).await?;
        metrics::counter!("taskloom_memory_records_total").increment(1);
        debug!(record_id = %record.id, project_id, "memory record persisted");

        let service = self.clone();
        let spawned = record.clone();
        tokio::spawn(async move {
            service.fulfill_embedding(&binding, &spawned).await;
        });

        Ok(record)
    }

    /// Fulfill a record's pending embedding against its project's provider.
    ///
    /// Failures are absorbed here: the record is flagged embedding-failed
    /// and excluded from vector search until a later re-embed pass, but
    /// its content stays queryable.
    pub async fn fulfill_embedding(&self, binding: &ProjectBinding, record: &MemoryRecord) {
        let outcome = match binding.embedder.embed(&[record.content.clone()]).await {
            Ok(mut results) if !results.is_empty() => results.remove(0),
            Ok(_) => EmbeddingResult::Failed {
                reason: "provider returned empty batch".to_string(),
            },
            Err(e) => {
                warn!(record_id = %record.id, error = %e, "embedding unavailable, flagging record");
                metrics::counter!("taskloom_memory_embed_failures_total").increment(1);
                EmbeddingResult::Failed {
                    reason: e.to_string(),
                }
            }
        };

        if let Err(e) = binding.backend.set_embedding(&record.id, &outcome).await {
            warn!(record_id = %record.id, error = %e, "failed to store embedding outcome");
        }
    }

    /// Semantic search over a project's memory.
    ///
    /// Degrades to a non-vector recency/metadata query when the vector
    /// index is not ready or the query cannot be embedded; storage errors
    /// propagate to the caller.
    pub async fn search_memory(
        &self,
        project_id: &str,
        query_text: &str,
        k: usize,
        filter: &RecordFilter,
    ) -> Result<Vec<ScoredRecord>, TaskloomError> {
        let binding = self.inner.factory.bind(project_id).await?;
        metrics::counter!("taskloom_memory_searches_total").increment(1);

        let query_vector = match binding.embedder.embed(&[query_text.to_string()]).await {
            Ok(results) => match results.into_iter().next() {
                Some(EmbeddingResult::Embedded(vector)) => Some(vector),
                _ => None,
            },
            Err(TaskloomError::EmbeddingUnavailable { message }) => {
                warn!(project_id, %message, "query embedding unavailable, degrading to recency search");
                None
            }
            Err(e) => return Err(e),
        };

        if let Some(vector) = query_vector {
            match binding
                .backend
                .vector_search(project_id, &vector, k, filter)
                .await
            {
                Ok(hits) => return Ok(hits),
                Err(TaskloomError::VectorIndexUnavailable { message }) => {
                    warn!(project_id, %message, "vector index unavailable, degrading to recency search");
                }
                Err(e) => return Err(e),
            }
        }

        metrics::counter!("taskloom_memory_search_fallbacks_total").increment(1);
        let recent = binding
            .backend
            .list_records(project_id, filter, 0, k)
            .await?;
        Ok(recent
            .into_iter()
            .map(|record| ScoredRecord { record, score: 0.0 })
            .collect())
    }

    /// Regenerate the project's single rolling summary.
    pub async fn update_summary(
        &self,
        project_id: &str,
        trigger: &str,
    ) -> Result<ProjectSummary, TaskloomError> {
        let binding = self.inner.factory.bind(project_id).await?;

        let recent = binding
            .backend
            .list_records(
                project_id,
                &RecordFilter::default(),
                0,
                self.inner.config.summary_source_messages,
            )
            .await?;

        let text = self
            .inner
            .summarizer
            .digest(&recent, self.inner.config.summary_max_bytes);

        let summary = ProjectSummary {
            project_id: project_id.to_string(),
            summary: text,
            trigger: trigger.to_string(),
            updated_at: now_rfc3339(),
        };
        binding.backend.upsert_summary(&summary).await?;
        debug!(project_id, trigger, "project summary updated");
        Ok(summary)
    }

    /// Aggregate read for the agent bridge: recent turns + summary + top
    /// hits for an optional query, in one call.
    pub async fn project_context(
        &self,
        project_id: &str,
        query: Option<&str>,
    ) -> Result<MemoryContext, TaskloomError> {
        let binding = self.inner.factory.bind(project_id).await?;

        let recent = binding
            .backend
            .list_records(
                project_id,
                &RecordFilter::default(),
                0,
                self.inner.config.context_messages,
            )
            .await?;
        let summary = binding.backend.get_summary(project_id).await?;

        let relevant = match query {
            Some(q) => {
                self.search_memory(project_id, q, 5, &RecordFilter::default())
                    .await?
            }
            None => Vec::new(),
        };

        Ok(MemoryContext {
            recent,
            summary,
            relevant,
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::summarizer::ExtractiveSummarizer;
    use taskloom_core::traits::{MemoryRepository, StorageBackend, SummaryRepository};
    use taskloom_core::types::{Project, StorageMode};
    use taskloom_storage::database::Database;
    use taskloom_storage::sqlite::SqliteBackend;
    use taskloom_test_utils::{FailingEmbedder, HashEmbedder, InMemoryBackend};

    async fn local_service() -> (MemoryService, Arc<SqliteBackend>) {
        let db = Database::open_in_memory().await.unwrap();
        let registry = Arc::new(SqliteBackend::new(db));
        seed_project(&registry, StorageMode::Local).await;

        let factory = Arc::new(BackendFactory::new(
            Arc::clone(&registry),
            Arc::new(HashEmbedder::new(384)),
            None,
            None,
        ));
        let service = MemoryService::new(
            factory,
            Box::new(ExtractiveSummarizer),
            MemoryConfig::default(),
        );
        (service, registry)
    }

    async fn seed_project(registry: &SqliteBackend, mode: StorageMode) {
        use taskloom_core::traits::ProjectRepository;
        registry
            .create_project(&Project {
                id: "p1".to_string(),
                name: "board".to_string(),
                path: "/work/board".to_string(),
                storage_mode: mode,
                created_at: now_rfc3339(),
            })
            .await
            .unwrap();
    }

    /// Deterministically finish the embedding for a freshly written record.
    async fn settle(service: &MemoryService, record: &MemoryRecord) {
        let binding = service.inner.factory.bind(&record.project_id).await.unwrap();
        service.fulfill_embedding(&binding, record).await;
    }

    #[tokio::test]
    async fn record_then_search_returns_the_record_first() {
        let (service, _registry) = local_service().await;

        let record = service
            .record_message("p1", "s1", None, MemoryRole::User, "hello", None)
            .await
            .unwrap();
        settle(&service, &record).await;
        let other = service
            .record_message("p1", "s1", None, MemoryRole::Agent, "deploy the cluster", None)
            .await
            .unwrap();
        settle(&service, &other).await;

        let hits = service
            .search_memory("p1", "hello", 5, &RecordFilter::default())
            .await
            .unwrap();
        assert!(!hits.is_empty());
        assert_eq!(hits[0].record.id, record.id);
        assert!((hits[0].score - 1.0).abs() < 0.001);
    }

    #[tokio::test]
    async fn record_stores_384_dim_vector_for_local_project() {
        let (service, registry) = local_service().await;
        let record = service
            .record_message("p1", "s1", None, MemoryRole::User, "hello", None)
            .await
            .unwrap();
        settle(&service, &record).await;

        let stored = registry.get_record(&record.id).await.unwrap();
        assert_eq!(stored.embedding_status, EmbeddingStatus::Ready);
        assert_eq!(stored.embedding.unwrap().len(), 384);
    }

    #[tokio::test]
    async fn embedding_outage_flags_record_but_keeps_content() {
        let db = Database::open_in_memory().await.unwrap();
        let registry = Arc::new(SqliteBackend::new(db));
        seed_project(&registry, StorageMode::Local).await;
        let factory = Arc::new(BackendFactory::new(
            Arc::clone(&registry),
            Arc::new(FailingEmbedder::new(384)),
            None,
            None,
        ));
        let service = MemoryService::new(
            factory,
            Box::new(ExtractiveSummarizer),
            MemoryConfig::default(),
        );

        let record = service
            .record_message("p1", "s1", None, MemoryRole::User, "precious text", None)
            .await
            .unwrap();
        settle(&service, &record).await;

        let stored = registry.get_record(&record.id).await.unwrap();
        assert_eq!(stored.embedding_status, EmbeddingStatus::Failed);
        assert_eq!(stored.content, "precious text");
        assert!(stored.embedding.is_none());

        // Search cannot embed the query either; it degrades to recency
        // results instead of erroring.
        let hits = service
            .search_memory("p1", "precious", 5, &RecordFilter::default())
            .await
            .unwrap();
        assert_eq!(hits.len(), 1);
        assert_eq!(hits[0].record.id, record.id);
        assert_eq!(hits[0].score, 0.0);
    }

    #[tokio::test]
    async fn index_not_ready_falls_back_to_recency_results() {
        let db = Database::open_in_memory().await.unwrap();
        let registry = Arc::new(SqliteBackend::new(db));
        seed_project(&registry, StorageMode::Remote).await;

        let remote = Arc::new(InMemoryBackend::new());
        remote.set_index_ready(false);
        let factory = Arc::new(BackendFactory::new(
            Arc::clone(&registry),
            Arc::new(HashEmbedder::new(384)),
            Some(remote.clone() as Arc<dyn StorageBackend>),
            Some(Arc::new(HashEmbedder::new(1024))),
        ));
        let service = MemoryService::new(
            factory,
            Box::new(ExtractiveSummarizer),
            MemoryConfig::default(),
        );

        let record = service
            .record_message("p1", "s1", None, MemoryRole::User, "remote turn", None)
            .await
            .unwrap();
        settle(&service, &record).await;

        let hits = service
            .search_memory("p1", "remote turn", 5, &RecordFilter::default())
            .await
            .unwrap();
        assert_eq!(hits.len(), 1);
        assert_eq!(hits[0].record.id, record.id);
        assert_eq!(hits[0].score, 0.0);

        // Once the index is ready the same call serves real vector hits.
        remote.set_index_ready(true);
        let hits = service
            .search_memory("p1", "remote turn", 5, &RecordFilter::default())
            .await
            .unwrap();
        assert!(hits[0].score > 0.9);
    }

    #[tokio::test]
    async fn update_summary_keeps_single_row() {
        let (service, registry) = local_service().await;

        for content in ["First decision made.", "Second thing happened."] {
            let record = service
                .record_message("p1", "s1", None, MemoryRole::User, content, None)
                .await
                .unwrap();
            settle(&service, &record).await;
        }

        service.update_summary("p1", "session_end").await.unwrap();
        let summary = service.update_summary("p1", "task_done").await.unwrap();
        assert_eq!(summary.trigger, "task_done");
        assert!(summary.summary.contains("First decision made."));

        let stored = registry.get_summary("p1").await.unwrap().unwrap();
        assert_eq!(stored.trigger, "task_done");
    }

    #[tokio::test]
    async fn project_context_aggregates_recent_summary_and_hits() {
        let (service, _registry) = local_service().await;

        let record = service
            .record_message("p1", "s1", None, MemoryRole::User, "ship the release", None)
            .await
            .unwrap();
        settle(&service, &record).await;
        service.update_summary("p1", "session_end").await.unwrap();

        let context = service
            .project_context("p1", Some("ship the release"))
            .await
            .unwrap();
        assert_eq!(context.recent.len(), 1);
        assert!(context.summary.is_some());
        assert_eq!(context.relevant[0].record.id, record.id);
    }

    #[tokio::test]
    async fn unknown_project_surfaces_not_found() {
        let (service, _registry) = local_service().await;
        let err = service
            .record_message("ghost", "s1", None, MemoryRole::User, "hello", None)
            .await
            .unwrap_err();
        assert!(matches!(err, TaskloomError::NotFound { .. }));
    }
}
