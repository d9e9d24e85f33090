// SPDX-FileCopyrightText: 2026 Taskloom Contributors
// SPDX-License-Identifier: MIT OR Apache-2.0

//! Minimal task and task-history persistence.
//!
//! Task lifecycle lives in the board; these rows exist for memory-record
//! tagging, cascade delete, and verbatim migration copy.

use rusqlite::params;

use taskloom_core::types::{TaskHistoryEntry, TaskRef};
use taskloom_core::TaskloomError;

use crate::database::{map_tr_err, Database};

pub async fn put_task(db: &Database, task: &TaskRef) -> Result<(), TaskloomError> {
    let task = task.clone();
    db.connection()
        .call(move |conn| {
            conn.execute(
                "INSERT OR REPLACE INTO tasks (id, project_id, title, state, created_at)
                 VALUES (?1, ?2, ?3, ?4, ?5)",
                params![task.id, task.project_id, task.title, task.state, task.created_at],
            )?;
            Ok(())
        })
        .await
        .map_err(map_tr_err)
}

pub async fn list_tasks(db: &Database, project_id: &str) -> Result<Vec<TaskRef>, TaskloomError> {
    let project_id = project_id.to_string();
    db.connection()
        .call(move |conn| {
            let mut stmt = conn.prepare(
                "SELECT id, project_id, title, state, created_at FROM tasks
                 WHERE project_id = ?1 ORDER BY created_at ASC, id ASC",
            )?;
            let tasks = stmt
                .query_map(params![project_id], |row| {
                    Ok(TaskRef {
                        id: row.get(0)?,
                        project_id: row.get(1)?,
                        title: row.get(2)?,
                        state: row.get(3)?,
                        created_at: row.get(4)?,
                    })
                })?
                .collect::<Result<Vec<_>, _>>()?;
            Ok(tasks)
        })
        .await
        .map_err(map_tr_err)
}

pub async fn count_tasks(db: &Database, project_id: &str) -> Result<u64, TaskloomError> {
    count_for_project(db, "tasks", project_id).await
}

pub async fn put_history(db: &Database, entry: &TaskHistoryEntry) -> Result<(), TaskloomError> {
    let entry = entry.clone();
    db.connection()
        .call(move |conn| {
            conn.execute(
                "INSERT OR REPLACE INTO task_history (id, task_id, project_id, note, created_at)
                 VALUES (?1, ?2, ?3, ?4, ?5)",
                params![entry.id, entry.task_id, entry.project_id, entry.note, entry.created_at],
            )?;
            Ok(())
        })
        .await
        .map_err(map_tr_err)
}

pub async fn list_history(
    db: &Database,
    project_id: &str,
) -> Result<Vec<TaskHistoryEntry>, TaskloomError> {
    let project_id = project_id.to_string();
    db.connection()
        .call(move |conn| {
            let mut stmt = conn.prepare(
                "SELECT id, task_id, project_id, note, created_at FROM task_history
                 WHERE project_id = ?1 ORDER BY created_at ASC, id ASC",
            )?;
            let entries = stmt
                .query_map(params![project_id], |row| {
                    Ok(TaskHistoryEntry {
                        id: row.get(0)?,
                        task_id: row.get(1)?,
                        project_id: row.get(2)?,
                        note: row.get(3)?,
                        created_at: row.get(4)?,
                    })
                })?
                .collect::<Result<Vec<_>, _>>()?;
            Ok(entries)
        })
        .await
        .map_err(map_tr_err)
}

pub async fn count_history(db: &Database, project_id: &str) -> Result<u64, TaskloomError> {
    count_for_project(db, "task_history", project_id).await
}

async fn count_for_project(
    db: &Database,
    table: &'static str,
    project_id: &str,
) -> Result<u64, TaskloomError> {
    let project_id = project_id.to_string();
    db.connection()
        .call(move |conn| {
            let n: i64 = conn.query_row(
                &format!("SELECT count(*) FROM {table} WHERE project_id = ?1"),
                params![project_id],
                |row| row.get(0),
            )?;
            Ok(n as u64)
        })
        .await
        .map_err(map_tr_err)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::sqlite::projects;
    use taskloom_core::types::{now_rfc3339, Project, StorageMode};

    async fn setup_db() -> Database {
        let db = Database::open_in_memory().await.unwrap();
        projects::insert_project(
            &db,
            &Project {
                id: "p1".to_string(),
                name: "board".to_string(),
                path: "/work/board".to_string(),
                storage_mode: StorageMode::Local,
                created_at: now_rfc3339(),
            },
        )
        .await
        .unwrap();
        db
    }

    #[tokio::test]
    async fn put_list_count_tasks() {
        let db = setup_db().await;
        let task = TaskRef {
            id: "t1".to_string(),
            project_id: "p1".to_string(),
            title: "wire up CI".to_string(),
            state: "in_progress".to_string(),
            created_at: now_rfc3339(),
        };
        put_task(&db, &task).await.unwrap();
        put_task(&db, &task).await.unwrap(); // idempotent

        assert_eq!(count_tasks(&db, "p1").await.unwrap(), 1);
        let tasks = list_tasks(&db, "p1").await.unwrap();
        assert_eq!(tasks[0].title, "wire up CI");
    }

    #[tokio::test]
    async fn put_list_count_history() {
        let db = setup_db().await;
        let entry = TaskHistoryEntry {
            id: "h1".to_string(),
            task_id: "t1".to_string(),
            project_id: "p1".to_string(),
            note: "moved to review".to_string(),
            created_at: now_rfc3339(),
        };
        put_history(&db, &entry).await.unwrap();

        assert_eq!(count_history(&db, "p1").await.unwrap(), 1);
        assert_eq!(list_history(&db, "p1").await.unwrap()[0].note, "moved to review");
    }
}
