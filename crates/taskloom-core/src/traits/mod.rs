// SPDX-FileCopyrightText: 2026 Taskloom Contributors
// SPDX-License-Identifier: MIT OR Apache-2.0

//! Adapter traits implemented by embedding providers and storage backends.

pub mod embedding;
pub mod repository;

pub use embedding::EmbeddingProvider;
pub use repository::{
    MemoryRepository, ProjectRepository, StorageBackend, SummaryRepository, TaskRepository,
};
