// SPDX-FileCopyrightText: 2026 Taskloom Contributors
// SPDX-License-Identifier: MIT OR Apache-2.0

//! The migration state machine.

use std::sync::Arc;
use std::time::Duration;

use tracing::{info, warn};

use taskloom_core::traits::{
    EmbeddingProvider, MemoryRepository, ProjectRepository, StorageBackend, SummaryRepository,
    TaskRepository,
};
use taskloom_core::types::{
    now_rfc3339, EmbeddingResult, EmbeddingStatus, MigrationRun, MigrationState, RecordFilter,
    StorageMode,
};
use taskloom_core::TaskloomError;
use taskloom_storage::sqlite::SqliteBackend;

use crate::guard::MigrationGuard;
use crate::report::{EntityCount, MigrationOutcome, MigrationPlan, ValidationReport};

/// Rough per-record duration used for the dry-run estimate (remote embed
/// plus remote write, amortized over a batch).
const ESTIMATE_PER_RECORD: Duration = Duration::from_millis(50);

/// Validation pages through destination records at this size.
const VALIDATE_PAGE: usize = 100;

type ProgressFn = Box<dyn Fn(u64, u64) + Send + Sync>;

/// Moves one project's data from the embedded backend to the remote one.
pub struct MigrationEngine {
    source: Arc<SqliteBackend>,
    dest: Arc<dyn StorageBackend>,
    embedder: Arc<dyn EmbeddingProvider>,
    guard: Arc<MigrationGuard>,
    batch_size: usize,
    progress: Option<ProgressFn>,
}

impl MigrationEngine {
    pub fn new(
        source: Arc<SqliteBackend>,
        dest: Arc<dyn StorageBackend>,
        embedder: Arc<dyn EmbeddingProvider>,
        guard: Arc<MigrationGuard>,
        batch_size: usize,
    ) -> Self {
        Self {
            source,
            dest,
            embedder,
            guard,
            batch_size: batch_size.max(1),
            progress: None,
        }
    }

    /// Install a per-batch progress callback `(batches_done, batch_count)`.
    pub fn with_progress(mut self, progress: ProgressFn) -> Self {
        self.progress = Some(progress);
        self
    }

    /// Planning phase: count what would move. Writes nothing.
    pub async fn plan(&self, project_id: &str) -> Result<MigrationPlan, TaskloomError> {
        let project = self.source.get_project(project_id).await?;
        if project.storage_mode == StorageMode::Remote {
            return Err(TaskloomError::Config(format!(
                "project {project_id} is already on remote storage"
            )));
        }

        let record_count = self.source.count_records(project_id).await?;
        let task_count = self.source.count_tasks(project_id).await?;
        let history_count = self.source.count_history(project_id).await?;
        let batch_size = self.batch_size as u64;
        let batch_count = record_count.div_ceil(batch_size);

        Ok(MigrationPlan {
            project,
            record_count,
            task_count,
            history_count,
            batch_size,
            batch_count,
            estimated: ESTIMATE_PER_RECORD * record_count as u32,
        })
    }

    /// Execute a migration run (or report the plan when `dry_run`).
    ///
    /// At most one run per project may be in flight; a second attempt is
    /// rejected immediately. An interrupted run resumes at the batch
    /// after its last checkpoint. Source data is retained on commit.
    pub async fn run(
        &self,
        project_id: &str,
        dry_run: bool,
    ) -> Result<MigrationOutcome, TaskloomError> {
        let _claim = self.guard.acquire(project_id)?;

        let plan = self.plan(project_id).await?;
        info!(project_id, "migration plan: {}", plan.render());
        if dry_run {
            return Ok(MigrationOutcome::DryRun(plan));
        }

        let mut run = self.load_or_start_run(project_id, &plan).await?;

        if let Err(e) = self.copy_phase(&plan, &mut run).await {
            self.fail_run(&mut run, &e).await;
            return Err(e);
        }

        run.state = MigrationState::Validating;
        self.checkpoint(&run).await?;

        let report = match self.validate(project_id).await {
            Ok(report) => report,
            Err(e) => {
                self.fail_run(&mut run, &e).await;
                return Err(e);
            }
        };
        if !report.passed() {
            let error = TaskloomError::ValidationFailed {
                report: report.render(),
            };
            self.fail_run(&mut run, &error).await;
            return Err(error);
        }

        // Commit: flip the registry's storage mode. Source rows are kept,
        // so the operation stays reversible by re-flipping the flag.
        let mut project = plan.project.clone();
        project.storage_mode = StorageMode::Remote;
        self.source.update_project(&project).await?;

        run.state = MigrationState::Committed;
        run.error = None;
        self.checkpoint(&run).await?;
        metrics::counter!("taskloom_migrations_committed_total").increment(1);
        info!(project_id, "migration committed, storage mode flipped to remote");

        Ok(MigrationOutcome::Committed { plan, report })
    }

    /// Validating phase, runnable standalone. Read-only and idempotent:
    /// repeating it on a committed migration yields the same verdict.
    pub async fn validate(&self, project_id: &str) -> Result<ValidationReport, TaskloomError> {
        let counts = vec![
            EntityCount {
                entity: "memory_records",
                source: self.source.count_records(project_id).await?,
                destination: self.dest.count_records(project_id).await?,
            },
            EntityCount {
                entity: "tasks",
                source: self.source.count_tasks(project_id).await?,
                destination: self.dest.count_tasks(project_id).await?,
            },
            EntityCount {
                entity: "task_history",
                source: self.source.count_history(project_id).await?,
                destination: self.dest.count_history(project_id).await?,
            },
        ];

        let expected_dims = self.embedder.dimensions();
        let mut dimension_failures = Vec::new();
        let mut offset = 0;
        loop {
            let page = self
                .dest
                .list_records(project_id, &RecordFilter::default(), offset, VALIDATE_PAGE)
                .await?;
            if page.is_empty() {
                break;
            }
            offset += page.len();

            for record in &page {
                match record.embedding_status {
                    EmbeddingStatus::Ready => match record.embedding.as_deref() {
                        Some(v) if v.len() == expected_dims => {}
                        Some(v) => dimension_failures.push(format!(
                            "record {}: vector length {}, expected {expected_dims}",
                            record.id,
                            v.len()
                        )),
                        None => dimension_failures
                            .push(format!("record {}: ready but vector is null", record.id)),
                    },
                    // Explicitly marked embedding-failed is acceptable.
                    EmbeddingStatus::Failed => {}
                    EmbeddingStatus::Pending => dimension_failures
                        .push(format!("record {}: still pending after copy", record.id)),
                }
            }
        }

        Ok(ValidationReport {
            counts,
            dimension_failures,
        })
    }

    async fn load_or_start_run(
        &self,
        project_id: &str,
        plan: &MigrationPlan,
    ) -> Result<MigrationRun, TaskloomError> {
        let existing = self.source.migration_run(project_id).await?;
        let mut run = match existing {
            // Resume an interrupted run at its checkpoint, as long as the
            // batching geometry is unchanged.
            Some(run)
                if run.state != MigrationState::Committed
                    && run.batch_size == plan.batch_size =>
            {
                info!(
                    project_id,
                    batches_done = run.batches_done,
                    "resuming migration from checkpoint"
                );
                run
            }
            _ => MigrationRun {
                project_id: project_id.to_string(),
                state: MigrationState::Planning,
                total_records: plan.record_count,
                batch_size: plan.batch_size,
                batches_done: 0,
                error: None,
                started_at: now_rfc3339(),
                updated_at: now_rfc3339(),
            },
        };

        run.state = MigrationState::Copying;
        run.total_records = plan.record_count;
        run.error = None;
        self.checkpoint(&run).await?;
        Ok(run)
    }

    async fn copy_phase(
        &self,
        plan: &MigrationPlan,
        run: &mut MigrationRun,
    ) -> Result<(), TaskloomError> {
        let project_id = &plan.project.id;

        // Non-memory entities are copied verbatim; upserts make replay
        // on resume harmless.
        self.dest.put_project(&plan.project).await?;
        for task in self.source.list_tasks(project_id).await? {
            self.dest.put_task(&task).await?;
        }
        for entry in self.source.list_history(project_id).await? {
            self.dest.put_history(&entry).await?;
        }
        if let Some(summary) = self.source.get_summary(project_id).await? {
            self.dest.upsert_summary(&summary).await?;
        }

        for batch_idx in run.batches_done..plan.batch_count {
            let offset = (batch_idx * plan.batch_size) as usize;
            let records = self
                .source
                .export_records_page(project_id, offset, self.batch_size)
                .await?;

            // Re-embed with the remote provider; the old vectors have the
            // wrong dimensionality and never move.
            let texts: Vec<String> = records.iter().map(|r| r.content.clone()).collect();
            let outcomes = self.embedder.embed(&texts).await?;

            for (record, outcome) in records.iter().zip(outcomes) {
                let mut copy = record.clone();
                match outcome {
                    EmbeddingResult::Embedded(vector) => {
                        copy.embedding = Some(vector);
                        copy.embedding_status = EmbeddingStatus::Ready;
                        copy.embedding_error = None;
                    }
                    EmbeddingResult::Failed { reason } => {
                        copy.embedding = None;
                        copy.embedding_status = EmbeddingStatus::Failed;
                        copy.embedding_error = Some(reason);
                    }
                }
                self.dest.put_record(&copy).await?;
            }

            run.batches_done = batch_idx + 1;
            run.updated_at = now_rfc3339();
            self.checkpoint(run).await?;
            metrics::counter!("taskloom_migration_batches_total").increment(1);
            info!(
                project_id,
                batch = run.batches_done,
                of = plan.batch_count,
                "migration batch copied"
            );
            if let Some(progress) = &self.progress {
                progress(run.batches_done, plan.batch_count);
            }
        }

        Ok(())
    }

    async fn checkpoint(&self, run: &MigrationRun) -> Result<(), TaskloomError> {
        let mut run = run.clone();
        run.updated_at = now_rfc3339();
        self.source.set_migration_run(&run).await
    }

    async fn fail_run(&self, run: &mut MigrationRun, error: &TaskloomError) {
        run.state = MigrationState::Failed;
        run.error = Some(error.to_string());
        run.updated_at = now_rfc3339();
        // The checkpoint (including batches_done) survives so a restart
        // resumes instead of recopying from zero.
        if let Err(e) = self.source.set_migration_run(run).await {
            warn!(project_id = %run.project_id, error = %e, "failed to persist migration failure");
        }
        metrics::counter!("taskloom_migrations_failed_total").increment(1);
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use taskloom_core::types::{
        new_id, MemoryRecord, MemoryRole, Project, TaskHistoryEntry, TaskRef,
    };
    use taskloom_storage::database::Database;
    use taskloom_test_utils::{HashEmbedder, InMemoryBackend};

    struct Fixture {
        source: Arc<SqliteBackend>,
        dest: Arc<InMemoryBackend>,
        guard: Arc<MigrationGuard>,
    }

    impl Fixture {
        fn engine(&self, batch_size: usize) -> MigrationEngine {
            MigrationEngine::new(
                Arc::clone(&self.source),
                self.dest.clone() as Arc<dyn StorageBackend>,
                Arc::new(HashEmbedder::new(1024)),
                Arc::clone(&self.guard),
                batch_size,
            )
        }
    }

    async fn setup(record_count: usize) -> Fixture {
        let db = Database::open_in_memory().await.unwrap();
        let source = Arc::new(SqliteBackend::new(db));

        source
            .create_project(&Project {
                id: "p1".to_string(),
                name: "board".to_string(),
                path: "/work/board".to_string(),
                storage_mode: StorageMode::Local,
                created_at: now_rfc3339(),
            })
            .await
            .unwrap();

        for i in 0..record_count {
            source
                .put_record(&MemoryRecord {
                    id: new_id(),
                    project_id: "p1".to_string(),
                    session_id: "s1".to_string(),
                    task_id: None,
                    role: MemoryRole::User,
                    content: format!("turn number {i}"),
                    embedding: Some(vec![0.1; 384]),
                    embedding_status: EmbeddingStatus::Ready,
                    embedding_error: None,
                    metadata: None,
                    created_at: format!("2026-05-01T10:00:{i:02}.000Z"),
                })
                .await
                .unwrap();
        }

        source
            .put_task(&TaskRef {
                id: "t1".to_string(),
                project_id: "p1".to_string(),
                title: "task".to_string(),
                state: "done".to_string(),
                created_at: now_rfc3339(),
            })
            .await
            .unwrap();
        source
            .put_history(&TaskHistoryEntry {
                id: "h1".to_string(),
                task_id: "t1".to_string(),
                project_id: "p1".to_string(),
                note: "created".to_string(),
                created_at: now_rfc3339(),
            })
            .await
            .unwrap();

        Fixture {
            source,
            dest: Arc::new(InMemoryBackend::new()),
            guard: MigrationGuard::new(),
        }
    }

    #[tokio::test]
    async fn dry_run_reports_plan_and_writes_nothing() {
        let fixture = setup(3).await;
        let engine = fixture.engine(100);

        let outcome = engine.run("p1", true).await.unwrap();
        let MigrationOutcome::DryRun(plan) = outcome else {
            panic!("expected dry-run outcome");
        };
        assert_eq!(plan.record_count, 3);
        assert_eq!(plan.batch_count, 1);
        assert!(plan.render().contains("3 memory records"));

        assert_eq!(fixture.dest.count_records("p1").await.unwrap(), 0);
        assert!(fixture.source.migration_run("p1").await.unwrap().is_none());
    }

    #[tokio::test]
    async fn full_run_copies_validates_and_flips_mode() {
        let fixture = setup(3).await;
        let engine = fixture.engine(100);

        let outcome = engine.run("p1", false).await.unwrap();
        let MigrationOutcome::Committed { report, .. } = outcome else {
            panic!("expected committed outcome");
        };
        assert!(report.passed());

        // Destination holds everything, re-embedded at 1024 dims.
        assert_eq!(fixture.dest.count_records("p1").await.unwrap(), 3);
        assert_eq!(fixture.dest.count_tasks("p1").await.unwrap(), 1);
        assert_eq!(fixture.dest.count_history("p1").await.unwrap(), 1);
        let copied = fixture
            .dest
            .list_records("p1", &RecordFilter::default(), 0, 10)
            .await
            .unwrap();
        for record in &copied {
            assert_eq!(record.embedding_status, EmbeddingStatus::Ready);
            assert_eq!(record.embedding.as_ref().unwrap().len(), 1024);
        }

        // Registry mode flipped; source data retained for reversibility.
        let project = fixture.source.get_project("p1").await.unwrap();
        assert_eq!(project.storage_mode, StorageMode::Remote);
        assert_eq!(fixture.source.count_records("p1").await.unwrap(), 3);

        let run = fixture.source.migration_run("p1").await.unwrap().unwrap();
        assert_eq!(run.state, MigrationState::Committed);
    }

    #[tokio::test]
    async fn interrupted_copy_resumes_from_checkpoint_without_duplicates() {
        let fixture = setup(3).await;
        let engine = fixture.engine(1); // one record per batch

        // First batch succeeds, second write fails.
        fixture.dest.fail_record_puts_after(1);
        let err = engine.run("p1", false).await.unwrap_err();
        assert!(matches!(err, TaskloomError::StorageUnavailable { .. }));

        let run = fixture.source.migration_run("p1").await.unwrap().unwrap();
        assert_eq!(run.state, MigrationState::Failed);
        assert_eq!(run.batches_done, 1);
        assert!(run.error.is_some());

        // Restart: resumes at batch 2, ends with exactly 3 records.
        fixture.dest.clear_failures();
        let outcome = engine.run("p1", false).await.unwrap();
        assert!(matches!(outcome, MigrationOutcome::Committed { .. }));
        assert_eq!(fixture.dest.count_records("p1").await.unwrap(), 3);
    }

    #[tokio::test]
    async fn failed_run_leaves_storage_mode_unchanged() {
        let fixture = setup(2).await;
        let engine = fixture.engine(1);

        fixture.dest.fail_record_puts_after(0);
        engine.run("p1", false).await.unwrap_err();

        let project = fixture.source.get_project("p1").await.unwrap();
        assert_eq!(project.storage_mode, StorageMode::Local);
    }

    #[tokio::test]
    async fn concurrent_migration_is_rejected_without_disturbing_the_first() {
        let fixture = setup(2).await;
        let engine = fixture.engine(100);

        let claim = fixture.guard.acquire("p1").unwrap();
        let err = engine.run("p1", false).await.unwrap_err();
        assert!(matches!(err, TaskloomError::MigrationInFlight { .. }));
        // Nothing was planned or written by the rejected attempt.
        assert!(fixture.source.migration_run("p1").await.unwrap().is_none());

        drop(claim);
        let outcome = engine.run("p1", false).await.unwrap();
        assert!(matches!(outcome, MigrationOutcome::Committed { .. }));
    }

    #[tokio::test]
    async fn validation_is_idempotent_after_commit() {
        let fixture = setup(3).await;
        let engine = fixture.engine(100);
        engine.run("p1", false).await.unwrap();

        let first = engine.validate("p1").await.unwrap();
        let second = engine.validate("p1").await.unwrap();
        assert!(first.passed());
        assert!(second.passed());
        assert_eq!(first.render(), second.render());
    }

    #[tokio::test]
    async fn validation_catches_missing_destination_record() {
        let fixture = setup(3).await;
        let engine = fixture.engine(100);
        engine.run("p1", false).await.unwrap();

        let copied = fixture
            .dest
            .list_records("p1", &RecordFilter::default(), 0, 10)
            .await
            .unwrap();
        fixture.dest.lose_record(&copied[0].id);

        let report = engine.validate("p1").await.unwrap();
        assert!(!report.passed());
        assert!(report.render().contains("MISMATCH"));
    }

    #[tokio::test]
    async fn already_remote_project_is_not_replanned() {
        let fixture = setup(1).await;
        let engine = fixture.engine(100);
        engine.run("p1", false).await.unwrap();

        let err = engine.run("p1", false).await.unwrap_err();
        assert!(matches!(err, TaskloomError::Config(_)));
    }

    #[tokio::test]
    async fn source_embedding_failures_are_reembedded_on_copy() {
        let fixture = setup(0).await;
        // A record that failed to embed at the source still has content;
        // the copy phase gives the remote provider a fresh chance at it.
        fixture
            .source
            .put_record(&MemoryRecord {
                id: "r-failed".to_string(),
                project_id: "p1".to_string(),
                session_id: "s1".to_string(),
                task_id: None,
                role: MemoryRole::User,
                content: "turn that never got a vector".to_string(),
                embedding: None,
                embedding_status: EmbeddingStatus::Failed,
                embedding_error: Some("provider outage".to_string()),
                metadata: None,
                created_at: now_rfc3339(),
            })
            .await
            .unwrap();

        let engine = fixture.engine(100);
        let outcome = engine.run("p1", false).await.unwrap();
        let MigrationOutcome::Committed { report, .. } = outcome else {
            panic!("expected committed outcome");
        };
        assert!(report.passed());

        let copied = fixture.dest.get_record("r-failed").await.unwrap();
        assert_eq!(copied.embedding_status, EmbeddingStatus::Ready);
        assert_eq!(copied.embedding.unwrap().len(), 1024);
    }
}
