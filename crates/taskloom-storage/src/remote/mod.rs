// SPDX-FileCopyrightText: 2026 Taskloom Contributors
// SPDX-License-Identifier: MIT OR Apache-2.0

//! Remote document-database backend.
//!
//! Speaks the database's HTTP Data API (find/insert/update/delete/aggregate)
//! and delegates nearest-neighbor search to its managed vector index via a
//! `$vectorSearch` aggregation stage. The index applies vector similarity
//! before arbitrary metadata filters, so search overfetches a candidate
//! pool and applies the metadata filter client-side.

pub mod backend;
pub mod client;

pub use backend::RemoteBackend;
pub use client::DataApiClient;
