// SPDX-FileCopyrightText: 2026 Taskloom Contributors
// SPDX-License-Identifier: MIT OR Apache-2.0

//! Error types for the Taskloom memory core.

use thiserror::Error;

/// The primary error type used across the storage backends, embedding
/// providers, memory service, and migration engine.
#[derive(Debug, Error)]
pub enum TaskloomError {
    /// Configuration errors (invalid TOML, missing required fields, type mismatches).
    #[error("configuration error: {0}")]
    Config(String),

    /// Storage backend errors (query failure, serialization, schema).
    #[error("storage error: {source}")]
    Storage {
        source: Box<dyn std::error::Error + Send + Sync>,
    },

    /// Requested entity does not exist. Surfaced to the caller, never retried.
    #[error("{entity} not found: {id}")]
    NotFound { entity: &'static str, id: String },

    /// Backend connectivity or timeout after bounded retry.
    #[error("storage unavailable: {message}")]
    StorageUnavailable { message: String },

    /// Embedding provider failure after retries. Content is still persisted;
    /// the record is flagged embedding-failed.
    #[error("embedding unavailable: {message}")]
    EmbeddingUnavailable { message: String },

    /// The remote vector-search index is missing or still building.
    /// Callers degrade to a non-vector query instead of failing.
    #[error("vector index unavailable: {message}")]
    VectorIndexUnavailable { message: String },

    /// Migration validation mismatch (record counts or vector dimensions).
    /// Halts the migration; source data is left untouched.
    #[error("migration validation failed: {report}")]
    ValidationFailed { report: String },

    /// A migration is already in flight for this project.
    #[error("migration already in flight for project {project_id}")]
    MigrationInFlight { project_id: String },

    /// Defensive check tripped (e.g. mixed-dimension vectors). The offending
    /// record is excluded from search and logged rather than crashing reads.
    #[error("invariant violation: {0}")]
    InvariantViolation(String),

    /// Operation timed out.
    #[error("operation timed out after {duration:?}")]
    Timeout { duration: std::time::Duration },

    /// Internal or unexpected errors.
    #[error("internal error: {0}")]
    Internal(String),
}
