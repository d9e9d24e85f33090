// SPDX-FileCopyrightText: 2026 Taskloom Contributors
// SPDX-License-Identifier: MIT OR Apache-2.0

//! Core types and traits for the Taskloom project-memory engine.
//!
//! Taskloom coordinates AI coding-agent work across git worktrees; this
//! crate defines the shared vocabulary of its memory core: the error
//! taxonomy, the domain model (projects, memory records, summaries), and
//! the adapter traits that the storage backends and embedding providers
//! implement.

pub mod error;
pub mod traits;
pub mod types;

pub use error::TaskloomError;
pub use traits::{EmbeddingProvider, StorageBackend};
pub use types::*;
