// SPDX-FileCopyrightText: 2026 Taskloom Contributors
// SPDX-License-Identifier: MIT OR Apache-2.0

//! Project registration commands.

use clap::Subcommand;

use taskloom_config::model::TaskloomConfig;
use taskloom_core::traits::ProjectRepository;
use taskloom_core::types::{Project, StorageMode};

use crate::bootstrap;

#[derive(Subcommand, Debug)]
pub enum ProjectAction {
    /// Register a project.
    Add {
        name: String,
        path: String,
        /// Bind the project to remote storage from the start.
        #[arg(long)]
        remote: bool,
    },
    /// List registered projects.
    List,
    /// Delete a project and all of its memory (cascade).
    Delete { project_id: String },
}

pub async fn run(config: &TaskloomConfig, action: ProjectAction) -> i32 {
    let registry = match bootstrap::open_registry(config).await {
        Ok(registry) => registry,
        Err(e) => return fail(&e),
    };

    match action {
        ProjectAction::Add { name, path, remote } => {
            // Setup may only offer remote storage when this process is
            // configured for it.
            if remote && !config.remote.is_configured() {
                eprintln!("taskloom: remote storage is not configured for this process");
                return 2;
            }
            let storage_mode = if remote {
                StorageMode::Remote
            } else {
                StorageMode::Local
            };
            let project = Project {
                id: String::new(),
                name,
                path,
                storage_mode,
                created_at: String::new(),
            };
            match registry.create_project(&project).await {
                Ok(id) => {
                    println!("{id}");
                    0
                }
                Err(e) => fail(&e),
            }
        }
        ProjectAction::List => match registry.list_projects().await {
            Ok(projects) => {
                for project in projects {
                    println!(
                        "{}  {}  [{}]  {}",
                        project.id,
                        project.name,
                        project.storage_mode.as_str(),
                        project.path,
                    );
                }
                0
            }
            Err(e) => fail(&e),
        },
        ProjectAction::Delete { project_id } => match registry.delete_project(&project_id).await {
            Ok(()) => {
                println!("deleted {project_id} and all of its memory");
                0
            }
            Err(e) => fail(&e),
        },
    }
}

fn fail(error: &taskloom_core::TaskloomError) -> i32 {
    eprintln!("taskloom: {error}");
    1
}
