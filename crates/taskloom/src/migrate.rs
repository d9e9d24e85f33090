// SPDX-FileCopyrightText: 2026 Taskloom Contributors
// SPDX-License-Identifier: MIT OR Apache-2.0

//! Migration CLI surface.
//!
//! Exit code 0 on a committed migration or successful dry-run report,
//! non-zero on any failed state.

use indicatif::{ProgressBar, ProgressStyle};

use taskloom_config::model::TaskloomConfig;
use taskloom_core::traits::{EmbeddingProvider, StorageBackend};
use taskloom_migrate::{MigrationEngine, MigrationGuard, MigrationOutcome};

use crate::bootstrap;

pub async fn run(config: &TaskloomConfig, project_id: &str, dry_run: bool) -> i32 {
    let registry = match bootstrap::open_registry(config).await {
        Ok(registry) => registry,
        Err(e) => {
            eprintln!("taskloom: {e}");
            return 1;
        }
    };

    let Some((remote_backend, remote_embedder)) = (match bootstrap::remote_parts(config) {
        Ok(parts) => parts,
        Err(e) => {
            eprintln!("taskloom: {e}");
            return 1;
        }
    }) else {
        eprintln!(
            "taskloom: migration requires remote storage; set remote.data_api_url, \
             remote.database, remote.api_key, and remote.embed_api_key"
        );
        return 2;
    };

    let bar = ProgressBar::hidden();
    if let Ok(style) = ProgressStyle::with_template("{bar:30} batch {pos}/{len}") {
        bar.set_style(style);
    }
    let progress_bar = bar.clone();

    let engine = MigrationEngine::new(
        registry,
        remote_backend as std::sync::Arc<dyn StorageBackend>,
        remote_embedder as std::sync::Arc<dyn EmbeddingProvider>,
        MigrationGuard::new(),
        config.migration.batch_size,
    )
    .with_progress(Box::new(move |done, total| {
        if progress_bar.is_hidden() && total > 0 {
            progress_bar.set_draw_target(indicatif::ProgressDrawTarget::stderr());
            progress_bar.set_length(total);
        }
        progress_bar.set_position(done);
    }));

    match engine.run(project_id, dry_run).await {
        Ok(MigrationOutcome::DryRun(plan)) => {
            println!("dry run: {}", plan.render());
            0
        }
        Ok(MigrationOutcome::Committed { plan, report }) => {
            bar.finish_and_clear();
            println!("migrated: {}", plan.render());
            print!("{}", report.render());
            println!("storage mode is now remote; source data retained");
            0
        }
        Err(e) => {
            bar.finish_and_clear();
            eprintln!("taskloom: migration failed: {e}");
            1
        }
    }
}
