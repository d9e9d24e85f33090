// SPDX-FileCopyrightText: 2026 Taskloom Contributors
// SPDX-License-Identifier: MIT OR Apache-2.0

//! Offline migration of a project from the embedded backend to the
//! remote backend.
//!
//! One state machine per run: `Planning → Copying → Validating →
//! Committed`, with `Failed` reachable from Copying and Validating.
//! Memory records are re-embedded with the remote provider (the
//! dimensionality differs); non-memory entities are copied verbatim.
//! Progress is checkpointed per batch so an interrupted run resumes at
//! the last committed batch, and all destination writes are idempotent
//! upserts so replaying a batch never duplicates. Source data is never
//! deleted; commit only flips the project's storage mode.

pub mod engine;
pub mod guard;
pub mod report;

pub use engine::MigrationEngine;
pub use guard::MigrationGuard;
pub use report::{EntityCount, MigrationOutcome, MigrationPlan, ValidationReport};
