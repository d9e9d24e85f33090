// SPDX-FileCopyrightText: 2026 Taskloom Contributors
// SPDX-License-Identifier: MIT OR Apache-2.0

//! Configuration model structs for Taskloom.
//!
//! All structs use `#[serde(deny_unknown_fields)]` to reject unrecognized
//! config keys at startup, providing actionable error messages.

use serde::{Deserialize, Serialize};

/// Top-level Taskloom configuration.
///
/// Loaded from TOML files following XDG hierarchy, with environment variable overrides.
/// All sections are optional and default to sensible values.
#[derive(Debug, Clone, Default, Deserialize, Serialize)]
#[serde(deny_unknown_fields)]
pub struct TaskloomConfig {
    /// Embedded SQLite storage settings.
    #[serde(default)]
    pub storage: StorageConfig,

    /// Remote document database and hosted embedding settings.
    #[serde(default)]
    pub remote: RemoteConfig,

    /// Memory service settings.
    #[serde(default)]
    pub memory: MemoryConfig,

    /// Migration engine settings.
    #[serde(default)]
    pub migration: MigrationConfig,
}

/// Embedded SQLite storage configuration.
#[derive(Debug, Clone, Deserialize, Serialize)]
#[serde(deny_unknown_fields)]
pub struct StorageConfig {
    /// Path to the SQLite database file.
    #[serde(default = "default_database_path")]
    pub database_path: String,

    /// Enable WAL (Write-Ahead Logging) mode for SQLite.
    #[serde(default = "default_wal_mode")]
    pub wal_mode: bool,
}

impl Default for StorageConfig {
    fn default() -> Self {
        Self {
            database_path: default_database_path(),
            wal_mode: default_wal_mode(),
        }
    }
}

fn default_database_path() -> String {
    dirs::data_dir()
        .map(|p| p.join("taskloom").join("taskloom.db"))
        .unwrap_or_else(|| std::path::PathBuf::from("taskloom.db"))
        .to_string_lossy()
        .into_owned()
}

fn default_wal_mode() -> bool {
    true
}

/// Remote backend configuration.
///
/// All fields are optional. Remote storage is offered to project setup
/// only when [`RemoteConfig::is_configured`] returns true.
#[derive(Debug, Clone, Deserialize, Serialize)]
#[serde(deny_unknown_fields)]
pub struct RemoteConfig {
    /// Base URL of the document database's HTTP Data API.
    #[serde(default)]
    pub data_api_url: Option<String>,

    /// Database name within the remote deployment.
    #[serde(default)]
    pub database: Option<String>,

    /// API key for the Data API.
    #[serde(default)]
    pub api_key: Option<String>,

    /// Base URL of the hosted embedding API.
    #[serde(default = "default_embed_api_url")]
    pub embed_api_url: String,

    /// API key for the hosted embedding API.
    #[serde(default)]
    pub embed_api_key: Option<String>,

    /// Hosted embedding model identifier (1024-dim output).
    #[serde(default = "default_embed_model")]
    pub embed_model: String,

    /// Name of the managed vector-search index over memory records.
    /// The index is provisioned out-of-band by an operator.
    #[serde(default = "default_vector_index")]
    pub vector_index: String,
}

impl Default for RemoteConfig {
    fn default() -> Self {
        Self {
            data_api_url: None,
            database: None,
            api_key: None,
            embed_api_url: default_embed_api_url(),
            embed_api_key: None,
            embed_model: default_embed_model(),
            vector_index: default_vector_index(),
        }
    }
}

impl RemoteConfig {
    /// Capability query consulted by project setup before offering the
    /// remote storage option.
    pub fn is_configured(&self) -> bool {
        self.data_api_url.is_some()
            && self.database.is_some()
            && self.api_key.is_some()
            && self.embed_api_key.is_some()
    }
}

fn default_embed_api_url() -> String {
    "https://api.embeddings.example.com/v1".to_string()
}

fn default_embed_model() -> String {
    "embed-large-v3".to_string()
}

fn default_vector_index() -> String {
    "memory_vector_index".to_string()
}

/// Memory service configuration.
#[derive(Debug, Clone, Deserialize, Serialize)]
#[serde(deny_unknown_fields)]
pub struct MemoryConfig {
    /// Directory holding the local ONNX model and tokenizer files.
    #[serde(default = "default_model_dir")]
    pub model_dir: String,

    /// Pinned SHA-256 of the ONNX model file; verified after download when set.
    #[serde(default)]
    pub model_sha256: Option<String>,

    /// Texts per local inference chunk.
    #[serde(default = "default_local_batch_size")]
    pub local_batch_size: usize,

    /// Concurrent blocking inference tasks.
    #[serde(default = "default_embed_workers")]
    pub embed_workers: usize,

    /// Recent messages included in the project context aggregate.
    #[serde(default = "default_context_messages")]
    pub context_messages: usize,

    /// Recent messages fed into summary generation.
    #[serde(default = "default_summary_source_messages")]
    pub summary_source_messages: usize,

    /// Byte budget for a generated summary.
    #[serde(default = "default_summary_max_bytes")]
    pub summary_max_bytes: usize,

    /// Candidate pool multiplier for remote vector search (overfetch-then-filter).
    #[serde(default = "default_candidate_multiplier")]
    pub candidate_multiplier: usize,
}

impl Default for MemoryConfig {
    fn default() -> Self {
        Self {
            model_dir: default_model_dir(),
            model_sha256: None,
            local_batch_size: default_local_batch_size(),
            embed_workers: default_embed_workers(),
            context_messages: default_context_messages(),
            summary_source_messages: default_summary_source_messages(),
            summary_max_bytes: default_summary_max_bytes(),
            candidate_multiplier: default_candidate_multiplier(),
        }
    }
}

fn default_model_dir() -> String {
    dirs::data_dir()
        .map(|p| p.join("taskloom").join("models").join("all-MiniLM-L6-v2"))
        .unwrap_or_else(|| std::path::PathBuf::from("models/all-MiniLM-L6-v2"))
        .to_string_lossy()
        .into_owned()
}

fn default_local_batch_size() -> usize {
    32
}

fn default_embed_workers() -> usize {
    2
}

fn default_context_messages() -> usize {
    20
}

fn default_summary_source_messages() -> usize {
    50
}

fn default_summary_max_bytes() -> usize {
    4096
}

fn default_candidate_multiplier() -> usize {
    5
}

/// Migration engine configuration.
#[derive(Debug, Clone, Deserialize, Serialize)]
#[serde(deny_unknown_fields)]
pub struct MigrationConfig {
    /// Memory records per copy batch; progress is checkpointed per batch.
    #[serde(default = "default_batch_size")]
    pub batch_size: usize,
}

impl Default for MigrationConfig {
    fn default() -> Self {
        Self {
            batch_size: default_batch_size(),
        }
    }
}

fn default_batch_size() -> usize {
    100
}
