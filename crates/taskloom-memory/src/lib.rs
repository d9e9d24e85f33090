// SPDX-FileCopyrightText: 2026 Taskloom Contributors
// SPDX-License-Identifier: MIT OR Apache-2.0

//! Conversation memory service for Taskloom.
//!
//! Orchestrates writing conversation turns (persist first, embed
//! asynchronously), semantic retrieval with graceful degradation, and
//! the rolling per-project summary. Storage-mode decisions live entirely
//! in the backend factory; this crate never branches on them.

pub mod service;
pub mod summarizer;

pub use service::{MemoryContext, MemoryService};
pub use summarizer::{ExtractiveSummarizer, Summarizer};
