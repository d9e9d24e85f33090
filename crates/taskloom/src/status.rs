// SPDX-FileCopyrightText: 2026 Taskloom Contributors
// SPDX-License-Identifier: MIT OR Apache-2.0

//! Storage status: remote capability, per-project counts, migration state.

use taskloom_config::model::TaskloomConfig;
use taskloom_core::traits::{MemoryRepository, ProjectRepository, SummaryRepository, TaskRepository};

use crate::bootstrap;

pub async fn run(config: &TaskloomConfig, project_id: Option<&str>) -> i32 {
    let registry = match bootstrap::open_registry(config).await {
        Ok(registry) => registry,
        Err(e) => {
            eprintln!("taskloom: {e}");
            return 1;
        }
    };

    if let Err(e) = registry.database().health_check().await {
        eprintln!("taskloom: embedded storage unhealthy: {e}");
        return 1;
    }

    println!(
        "remote storage: {}",
        if config.remote.is_configured() {
            "configured"
        } else {
            "not configured (projects pinned to embedded backend)"
        }
    );

    let projects = match project_id {
        Some(id) => match registry.get_project(id).await {
            Ok(project) => vec![project],
            Err(e) => {
                eprintln!("taskloom: {e}");
                return 1;
            }
        },
        None => match registry.list_projects().await {
            Ok(projects) => projects,
            Err(e) => {
                eprintln!("taskloom: {e}");
                return 1;
            }
        },
    };

    for project in &projects {
        let records = registry.count_records(&project.id).await.unwrap_or(0);
        let tasks = registry.count_tasks(&project.id).await.unwrap_or(0);
        let summary = registry
            .get_summary(&project.id)
            .await
            .ok()
            .flatten()
            .map(|s| s.updated_at)
            .unwrap_or_else(|| "none".to_string());

        println!(
            "{}  [{}]  {} records, {} tasks, summary: {}",
            project.id,
            project.storage_mode.as_str(),
            records,
            tasks,
            summary,
        );

        if let Ok(Some(run)) = registry.migration_run(&project.id).await {
            println!(
                "  migration: {} ({}/{} batches{})",
                run.state.as_str(),
                run.batches_done,
                run.total_records.div_ceil(run.batch_size.max(1)),
                run.error
                    .as_deref()
                    .map(|e| format!(", error: {e}"))
                    .unwrap_or_default(),
            );
        }
    }
    0
}
