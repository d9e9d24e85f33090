// SPDX-FileCopyrightText: 2026 Taskloom Contributors
// SPDX-License-Identifier: MIT OR Apache-2.0

//! Storage backends for the Taskloom memory core.
//!
//! Two implementations of the repository contract from `taskloom-core`:
//!
//! - [`SqliteBackend`]: embedded SQLite over tokio-rusqlite with refinery
//!   migrations and in-process cosine vector search. Also the authoritative
//!   registry of projects and migration checkpoints.
//! - [`RemoteBackend`]: a remote document database reached through its
//!   HTTP Data API, with a managed vector-search index over memory-record
//!   embeddings.
//!
//! [`BackendFactory`] binds exactly one backend (and the matching
//! embedding provider) per project, keyed by its storage mode. No call
//! site outside this crate branches on the mode.

pub mod database;
pub mod factory;
mod migrations;
pub mod remote;
pub mod sqlite;

pub use database::Database;
pub use factory::{BackendFactory, ProjectBinding};
pub use remote::{DataApiClient, RemoteBackend};
pub use sqlite::SqliteBackend;
