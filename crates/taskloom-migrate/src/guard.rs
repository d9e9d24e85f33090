// SPDX-FileCopyrightText: 2026 Taskloom Contributors
// SPDX-License-Identifier: MIT OR Apache-2.0

//! Per-process in-flight migration registry.
//!
//! A project may have at most one migration running at a time; exactly
//! one process owns a project's migration, so a process-local registry
//! is sufficient and no distributed lock is needed.

use std::sync::Arc;

use dashmap::DashMap;

use taskloom_core::TaskloomError;

#[derive(Default)]
pub struct MigrationGuard {
    active: DashMap<String, ()>,
}

impl MigrationGuard {
    pub fn new() -> Arc<Self> {
        Arc::new(Self::default())
    }

    /// Claim the project for a migration run.
    ///
    /// Rejected immediately with `MigrationInFlight` when another run
    /// holds the claim; released when the returned permit drops.
    pub fn acquire(self: &Arc<Self>, project_id: &str) -> Result<InFlight, TaskloomError> {
        use dashmap::mapref::entry::Entry;

        match self.active.entry(project_id.to_string()) {
            Entry::Occupied(_) => Err(TaskloomError::MigrationInFlight {
                project_id: project_id.to_string(),
            }),
            Entry::Vacant(slot) => {
                slot.insert(());
                Ok(InFlight {
                    guard: Arc::clone(self),
                    project_id: project_id.to_string(),
                })
            }
        }
    }
}

/// RAII claim on a project's migration slot.
pub struct InFlight {
    guard: Arc<MigrationGuard>,
    project_id: String,
}

impl Drop for InFlight {
    fn drop(&mut self) {
        self.guard.active.remove(&self.project_id);
    }
}
