// SPDX-FileCopyrightText: 2026 Taskloom Contributors
// SPDX-License-Identifier: MIT OR Apache-2.0

//! Project CRUD and cascade delete.

use rusqlite::{params, OptionalExtension};

use taskloom_core::types::{Project, StorageMode};
use taskloom_core::TaskloomError;

use crate::database::{map_tr_err, Database};

fn row_to_project(row: &rusqlite::Row) -> Result<Project, rusqlite::Error> {
    let mode: String = row.get(3)?;
    Ok(Project {
        id: row.get(0)?,
        name: row.get(1)?,
        path: row.get(2)?,
        storage_mode: StorageMode::from_str_value(&mode),
        created_at: row.get(4)?,
    })
}

pub async fn insert_project(db: &Database, project: &Project) -> Result<(), TaskloomError> {
    let project = project.clone();
    db.connection()
        .call(move |conn| {
            conn.execute(
                "INSERT INTO projects (id, name, path, storage_mode, created_at)
                 VALUES (?1, ?2, ?3, ?4, ?5)",
                params![
                    project.id,
                    project.name,
                    project.path,
                    project.storage_mode.as_str(),
                    project.created_at,
                ],
            )?;
            Ok(())
        })
        .await
        .map_err(map_tr_err)
}

pub async fn put_project(db: &Database, project: &Project) -> Result<(), TaskloomError> {
    let project = project.clone();
    db.connection()
        .call(move |conn| {
            conn.execute(
                "INSERT OR REPLACE INTO projects (id, name, path, storage_mode, created_at)
                 VALUES (?1, ?2, ?3, ?4, ?5)",
                params![
                    project.id,
                    project.name,
                    project.path,
                    project.storage_mode.as_str(),
                    project.created_at,
                ],
            )?;
            Ok(())
        })
        .await
        .map_err(map_tr_err)
}

pub async fn get_project(db: &Database, id: &str) -> Result<Option<Project>, TaskloomError> {
    let id = id.to_string();
    db.connection()
        .call(move |conn| {
            let mut stmt = conn.prepare(
                "SELECT id, name, path, storage_mode, created_at FROM projects WHERE id = ?1",
            )?;
            let project = stmt
                .query_row(params![id], row_to_project)
                .optional()?;
            Ok(project)
        })
        .await
        .map_err(map_tr_err)
}

/// Returns the number of rows updated (0 means the project does not exist).
pub async fn update_project(db: &Database, project: &Project) -> Result<usize, TaskloomError> {
    let project = project.clone();
    db.connection()
        .call(move |conn| {
            let n = conn.execute(
                "UPDATE projects SET name = ?1, path = ?2, storage_mode = ?3 WHERE id = ?4",
                params![
                    project.name,
                    project.path,
                    project.storage_mode.as_str(),
                    project.id,
                ],
            )?;
            Ok(n)
        })
        .await
        .map_err(map_tr_err)
}

pub async fn list_projects(db: &Database) -> Result<Vec<Project>, TaskloomError> {
    db.connection()
        .call(move |conn| {
            let mut stmt = conn.prepare(
                "SELECT id, name, path, storage_mode, created_at FROM projects
                 ORDER BY created_at DESC, id DESC",
            )?;
            let projects = stmt
                .query_map([], row_to_project)?
                .collect::<Result<Vec<_>, _>>()?;
            Ok(projects)
        })
        .await
        .map_err(map_tr_err)
}

/// Delete a project and everything it owns, children before parent, in one
/// transaction. Order: memory records, task history, tasks, summary, project.
///
/// Returns false if the project did not exist (transaction rolled back).
pub async fn delete_cascade(db: &Database, id: &str) -> Result<bool, TaskloomError> {
    let id = id.to_string();
    db.connection()
        .call(move |conn| {
            let tx = conn.transaction()?;
            tx.execute("DELETE FROM memory_records WHERE project_id = ?1", params![id])?;
            tx.execute("DELETE FROM task_history WHERE project_id = ?1", params![id])?;
            tx.execute("DELETE FROM tasks WHERE project_id = ?1", params![id])?;
            tx.execute("DELETE FROM project_summaries WHERE project_id = ?1", params![id])?;
            let n = tx.execute("DELETE FROM projects WHERE id = ?1", params![id])?;
            tx.commit()?;
            Ok(n > 0)
        })
        .await
        .map_err(map_tr_err)
}
