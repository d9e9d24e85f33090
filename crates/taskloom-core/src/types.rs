// SPDX-FileCopyrightText: 2026 Taskloom Contributors
// SPDX-License-Identifier: MIT OR Apache-2.0

//! Domain types for the project-memory core.

use serde::{Deserialize, Serialize};

/// Embedding dimensionality of the local provider (all-MiniLM-L6-v2).
pub const LOCAL_EMBEDDING_DIM: usize = 384;

/// Embedding dimensionality of the remote provider.
pub const REMOTE_EMBEDDING_DIM: usize = 1024;

/// Which storage backend a project is bound to.
///
/// Frozen once any memory record exists for the project; flipped only by
/// a completed, validated migration.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum StorageMode {
    /// Embedded SQLite backend with the local embedding provider.
    Local,
    /// Remote document database with the hosted embedding provider.
    Remote,
}

impl StorageMode {
    /// Convert to string for storage.
    pub fn as_str(&self) -> &'static str {
        match self {
            StorageMode::Local => "local",
            StorageMode::Remote => "remote",
        }
    }

    /// Parse from a stored string.
    pub fn from_str_value(s: &str) -> Self {
        match s {
            "remote" => StorageMode::Remote,
            _ => StorageMode::Local,
        }
    }

    /// Dimensionality of the embedding provider bound to this mode.
    pub fn embedding_dimensions(&self) -> usize {
        match self {
            StorageMode::Local => LOCAL_EMBEDDING_DIM,
            StorageMode::Remote => REMOTE_EMBEDDING_DIM,
        }
    }
}

/// A project registered with the task board.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Project {
    /// Opaque string identifier.
    pub id: String,
    /// Display name.
    pub name: String,
    /// Filesystem path of the project checkout.
    pub path: String,
    /// Bound storage backend.
    pub storage_mode: StorageMode,
    /// RFC 3339 creation timestamp.
    pub created_at: String,
}

/// Who produced a conversation turn.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum MemoryRole {
    User,
    Agent,
    System,
}

impl MemoryRole {
    pub fn as_str(&self) -> &'static str {
        match self {
            MemoryRole::User => "user",
            MemoryRole::Agent => "agent",
            MemoryRole::System => "system",
        }
    }

    pub fn from_str_value(s: &str) -> Self {
        match s {
            "user" => MemoryRole::User,
            "system" => MemoryRole::System,
            _ => MemoryRole::Agent,
        }
    }
}

/// Lifecycle of a record's embedding vector.
///
/// Records are persisted immediately with `Pending` status; a background
/// task fulfills the embedding and moves the record to `Ready` or `Failed`.
/// Only `Ready` records participate in vector search.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum EmbeddingStatus {
    Pending,
    Ready,
    Failed,
}

impl EmbeddingStatus {
    pub fn as_str(&self) -> &'static str {
        match self {
            EmbeddingStatus::Pending => "pending",
            EmbeddingStatus::Ready => "ready",
            EmbeddingStatus::Failed => "failed",
        }
    }

    pub fn from_str_value(s: &str) -> Self {
        match s {
            "ready" => EmbeddingStatus::Ready,
            "failed" => EmbeddingStatus::Failed,
            _ => EmbeddingStatus::Pending,
        }
    }
}

/// One conversational turn stored for a project.
///
/// Content is immutable after creation; the only in-place update is
/// embedding fulfillment. Deleted only via project cascade.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct MemoryRecord {
    pub id: String,
    pub project_id: String,
    pub session_id: String,
    pub task_id: Option<String>,
    pub role: MemoryRole,
    pub content: String,
    /// 384-dim (local) or 1024-dim (remote) vector, present once `Ready`.
    pub embedding: Option<Vec<f32>>,
    pub embedding_status: EmbeddingStatus,
    /// Failure detail when `embedding_status` is `Failed`.
    pub embedding_error: Option<String>,
    /// Free-form metadata. A `tags` string array is usable as a query filter.
    pub metadata: Option<serde_json::Value>,
    /// RFC 3339 creation timestamp.
    pub created_at: String,
}

/// The single rolling digest kept per project.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ProjectSummary {
    pub project_id: String,
    pub summary: String,
    /// What event caused the last update.
    pub trigger: String,
    /// RFC 3339 last-update timestamp.
    pub updated_at: String,
}

/// Minimal task reference. Task lifecycle is owned by the board, not this
/// core; records are stored only for tagging, cascade delete, and migration.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct TaskRef {
    pub id: String,
    pub project_id: String,
    pub title: String,
    pub state: String,
    pub created_at: String,
}

/// Minimal task-history entry, copied verbatim during migration.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct TaskHistoryEntry {
    pub id: String,
    pub task_id: String,
    pub project_id: String,
    pub note: String,
    pub created_at: String,
}

/// Migration run state machine.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum MigrationState {
    Planning,
    Copying,
    Validating,
    Committed,
    Failed,
}

impl MigrationState {
    pub fn as_str(&self) -> &'static str {
        match self {
            MigrationState::Planning => "planning",
            MigrationState::Copying => "copying",
            MigrationState::Validating => "validating",
            MigrationState::Committed => "committed",
            MigrationState::Failed => "failed",
        }
    }

    pub fn from_str_value(s: &str) -> Self {
        match s {
            "copying" => MigrationState::Copying,
            "validating" => MigrationState::Validating,
            "committed" => MigrationState::Committed,
            "failed" => MigrationState::Failed,
            _ => MigrationState::Planning,
        }
    }
}

/// Persisted checkpoint for one project's migration run.
///
/// `batches_done` is the resume point: an interrupted run restarts at
/// batch `batches_done`, not batch 0.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct MigrationRun {
    pub project_id: String,
    pub state: MigrationState,
    pub total_records: u64,
    pub batch_size: u64,
    pub batches_done: u64,
    pub error: Option<String>,
    pub started_at: String,
    pub updated_at: String,
}

/// Metadata filter applied to listing and vector search.
///
/// Both backends apply the same semantics; `matches` is the single source
/// of truth for the in-process half of overfetch-then-filter.
#[derive(Debug, Clone, Default)]
pub struct RecordFilter {
    pub session_id: Option<String>,
    pub task_id: Option<String>,
    pub role: Option<MemoryRole>,
    /// Record metadata must carry this value in its `tags` array.
    pub tag: Option<String>,
}

impl RecordFilter {
    /// True when no constraint is set.
    pub fn is_empty(&self) -> bool {
        self.session_id.is_none()
            && self.task_id.is_none()
            && self.role.is_none()
            && self.tag.is_none()
    }

    /// Whether a record satisfies every set constraint.
    pub fn matches(&self, record: &MemoryRecord) -> bool {
        if let Some(sid) = &self.session_id {
            if &record.session_id != sid {
                return false;
            }
        }
        if let Some(tid) = &self.task_id {
            if record.task_id.as_deref() != Some(tid.as_str()) {
                return false;
            }
        }
        if let Some(role) = self.role {
            if record.role != role {
                return false;
            }
        }
        if let Some(tag) = &self.tag {
            let has_tag = record
                .metadata
                .as_ref()
                .and_then(|m| m.get("tags"))
                .and_then(|t| t.as_array())
                .is_some_and(|tags| tags.iter().any(|v| v.as_str() == Some(tag.as_str())));
            if !has_tag {
                return false;
            }
        }
        true
    }
}

/// A memory record with its vector-search similarity score.
#[derive(Debug, Clone)]
pub struct ScoredRecord {
    pub record: MemoryRecord,
    /// Cosine similarity against the query vector.
    pub score: f32,
}

/// Per-item outcome of a batch embedding call.
///
/// A malformed or rejected item becomes `Failed` without aborting the
/// rest of the batch.
#[derive(Debug, Clone)]
pub enum EmbeddingResult {
    Embedded(Vec<f32>),
    Failed { reason: String },
}

impl EmbeddingResult {
    pub fn is_failed(&self) -> bool {
        matches!(self, EmbeddingResult::Failed { .. })
    }

    pub fn vector(&self) -> Option<&[f32]> {
        match self {
            EmbeddingResult::Embedded(v) => Some(v),
            EmbeddingResult::Failed { .. } => None,
        }
    }
}

/// Generate a new entity id. Opaque to callers; survives migration verbatim.
pub fn new_id() -> String {
    uuid::Uuid::new_v4().to_string()
}

/// Current UTC timestamp in RFC 3339 with millisecond precision.
pub fn now_rfc3339() -> String {
    chrono::Utc::now()
        .format("%Y-%m-%dT%H:%M:%S%.3fZ")
        .to_string()
}

/// Convert f32 vector to bytes for SQLite BLOB storage.
pub fn vec_to_blob(vec: &[f32]) -> Vec<u8> {
    vec.iter().flat_map(|f| f.to_le_bytes()).collect()
}

/// Convert SQLite BLOB back to f32 vector.
pub fn blob_to_vec(blob: &[u8]) -> Vec<f32> {
    blob.chunks_exact(4)
        .map(|chunk| f32::from_le_bytes(chunk.try_into().unwrap()))
        .collect()
}

/// Compute cosine similarity between two vectors.
///
/// For L2-normalized vectors this is the dot product. Callers must ensure
/// equal dimensionality; mismatched records are skipped upstream.
pub fn cosine_similarity(a: &[f32], b: &[f32]) -> f32 {
    debug_assert_eq!(a.len(), b.len(), "vectors must have same length");
    a.iter().zip(b.iter()).map(|(x, y)| x * y).sum()
}
