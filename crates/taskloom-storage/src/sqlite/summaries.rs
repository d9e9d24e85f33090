// SPDX-FileCopyrightText: 2026 Taskloom Contributors
// SPDX-License-Identifier: MIT OR Apache-2.0

//! Rolling project summaries, at most one row per project.

use rusqlite::{params, OptionalExtension};

use taskloom_core::types::ProjectSummary;
use taskloom_core::TaskloomError;

use crate::database::{map_tr_err, Database};

pub async fn get_summary(
    db: &Database,
    project_id: &str,
) -> Result<Option<ProjectSummary>, TaskloomError> {
    let project_id = project_id.to_string();
    db.connection()
        .call(move |conn| {
            let mut stmt = conn.prepare(
                "SELECT project_id, summary, trigger_reason, updated_at
                 FROM project_summaries WHERE project_id = ?1",
            )?;
            let summary = stmt
                .query_row(params![project_id], |row| {
                    Ok(ProjectSummary {
                        project_id: row.get(0)?,
                        summary: row.get(1)?,
                        trigger: row.get(2)?,
                        updated_at: row.get(3)?,
                    })
                })
                .optional()?;
            Ok(summary)
        })
        .await
        .map_err(map_tr_err)
}

pub async fn upsert_summary(db: &Database, summary: &ProjectSummary) -> Result<(), TaskloomError> {
    let summary = summary.clone();
    db.connection()
        .call(move |conn| {
            conn.execute(
                "INSERT INTO project_summaries (project_id, summary, trigger_reason, updated_at)
                 VALUES (?1, ?2, ?3, ?4)
                 ON CONFLICT(project_id) DO UPDATE SET
                     summary = excluded.summary,
                     trigger_reason = excluded.trigger_reason,
                     updated_at = excluded.updated_at",
                params![
                    summary.project_id,
                    summary.summary,
                    summary.trigger,
                    summary.updated_at,
                ],
            )?;
            Ok(())
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
    async fn upsert_keeps_at_most_one_row() {
        let db = setup_db().await;

        upsert_summary(
            &db,
            &ProjectSummary {
                project_id: "p1".to_string(),
                summary: "first digest".to_string(),
                trigger: "session_end".to_string(),
                updated_at: "2026-05-01T10:00:00.000Z".to_string(),
            },
        )
        .await
        .unwrap();

        upsert_summary(
            &db,
            &ProjectSummary {
                project_id: "p1".to_string(),
                summary: "second digest".to_string(),
                trigger: "task_done".to_string(),
                updated_at: "2026-05-01T11:00:00.000Z".to_string(),
            },
        )
        .await
        .unwrap();

        let got = get_summary(&db, "p1").await.unwrap().unwrap();
        assert_eq!(got.summary, "second digest");
        assert_eq!(got.trigger, "task_done");

        let count: i64 = db
            .connection()
            .call(|conn| {
                let n = conn.query_row("SELECT count(*) FROM project_summaries", [], |r| r.get(0))?;
                Ok::<_, rusqlite::Error>(n)
            })
            .await
            .unwrap();
        assert_eq!(count, 1);
    }

    #[tokio::test]
    async fn missing_summary_is_none() {
        let db = setup_db().await;
        assert!(get_summary(&db, "p1").await.unwrap().is_none());
    }
}
