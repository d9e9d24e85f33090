// SPDX-FileCopyrightText: 2026 Taskloom Contributors
// SPDX-License-Identifier: MIT OR Apache-2.0

//! Plan and validation reports rendered by the migration CLI.

use std::time::Duration;

use taskloom_core::types::Project;

/// What a migration run will touch, computed during Planning.
#[derive(Debug, Clone)]
pub struct MigrationPlan {
    pub project: Project,
    pub record_count: u64,
    pub task_count: u64,
    pub history_count: u64,
    pub batch_size: u64,
    pub batch_count: u64,
    pub estimated: Duration,
}

impl MigrationPlan {
    pub fn render(&self) -> String {
        format!(
            "project {}: {} memory records, {} tasks, {} history entries; \
             {} batches of {}, estimated {:?}",
            self.project.id,
            self.record_count,
            self.task_count,
            self.history_count,
            self.batch_count,
            self.batch_size,
            self.estimated,
        )
    }
}

/// Per-entity source/destination count comparison.
#[derive(Debug, Clone)]
pub struct EntityCount {
    pub entity: &'static str,
    pub source: u64,
    pub destination: u64,
}

impl EntityCount {
    pub fn matches(&self) -> bool {
        self.source == self.destination
    }
}

/// Result of the Validating phase. Read-only to produce: running it
/// repeatedly yields the same verdict with no side effects.
#[derive(Debug, Clone)]
pub struct ValidationReport {
    pub counts: Vec<EntityCount>,
    /// Records whose vector is missing or has the wrong dimensionality
    /// without being explicitly marked embedding-failed.
    pub dimension_failures: Vec<String>,
}

impl ValidationReport {
    pub fn passed(&self) -> bool {
        self.counts.iter().all(EntityCount::matches) && self.dimension_failures.is_empty()
    }

    pub fn render(&self) -> String {
        let mut out = String::new();
        for count in &self.counts {
            let marker = if count.matches() { "ok" } else { "MISMATCH" };
            out.push_str(&format!(
                "{}: source={} destination={} [{marker}]\n",
                count.entity, count.source, count.destination
            ));
        }
        if self.dimension_failures.is_empty() {
            out.push_str("vectors: all dimensions valid\n");
        } else {
            for failure in &self.dimension_failures {
                out.push_str(&format!("vector check failed: {failure}\n"));
            }
        }
        out
    }
}

/// Terminal result of a migration run.
#[derive(Debug)]
pub enum MigrationOutcome {
    /// Planning-only run; nothing was written.
    DryRun(MigrationPlan),
    /// Validation passed and the project's storage mode was flipped.
    Committed {
        plan: MigrationPlan,
        report: ValidationReport,
    },
}
