// SPDX-FileCopyrightText: 2026 Taskloom Contributors
// SPDX-License-Identifier: MIT OR Apache-2.0

//! Migration checkpoint rows, one per project.

use rusqlite::{params, OptionalExtension};

use taskloom_core::types::{MigrationRun, MigrationState};
use taskloom_core::TaskloomError;

use crate::database::{map_tr_err, Database};

pub async fn get_run(
    db: &Database,
    project_id: &str,
) -> Result<Option<MigrationRun>, TaskloomError> {
    let project_id = project_id.to_string();
    db.connection()
        .call(move |conn| {
            let mut stmt = conn.prepare(
                "SELECT project_id, state, total_records, batch_size, batches_done,
                        error, started_at, updated_at
                 FROM migration_runs WHERE project_id = ?1",
            )?;
            let run = stmt
                .query_row(params![project_id], |row| {
                    let state: String = row.get(1)?;
                    Ok(MigrationRun {
                        project_id: row.get(0)?,
                        state: MigrationState::from_str_value(&state),
                        total_records: row.get::<_, i64>(2)? as u64,
                        batch_size: row.get::<_, i64>(3)? as u64,
                        batches_done: row.get::<_, i64>(4)? as u64,
                        error: row.get(5)?,
                        started_at: row.get(6)?,
                        updated_at: row.get(7)?,
                    })
                })
                .optional()?;
            Ok(run)
        })
        .await
        .map_err(map_tr_err)
}

pub async fn upsert_run(db: &Database, run: &MigrationRun) -> Result<(), TaskloomError> {
    let run = run.clone();
    db.connection()
        .call(move |conn| {
            conn.execute(
                "INSERT INTO migration_runs
                 (project_id, state, total_records, batch_size, batches_done,
                  error, started_at, updated_at)
                 VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7, ?8)
                 ON CONFLICT(project_id) DO UPDATE SET
                     state = excluded.state,
                     total_records = excluded.total_records,
                     batch_size = excluded.batch_size,
                     batches_done = excluded.batches_done,
                     error = excluded.error,
                     updated_at = excluded.updated_at",
                params![
                    run.project_id,
                    run.state.as_str(),
                    run.total_records as i64,
                    run.batch_size as i64,
                    run.batches_done as i64,
                    run.error,
                    run.started_at,
                    run.updated_at,
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
    use taskloom_core::types::now_rfc3339;

    #[tokio::test]
    async fn checkpoint_roundtrip_and_update() {
        let db = Database::open_in_memory().await.unwrap();

        assert!(get_run(&db, "p1").await.unwrap().is_none());

        let mut run = MigrationRun {
            project_id: "p1".to_string(),
            state: MigrationState::Copying,
            total_records: 250,
            batch_size: 100,
            batches_done: 1,
            error: None,
            started_at: now_rfc3339(),
            updated_at: now_rfc3339(),
        };
        upsert_run(&db, &run).await.unwrap();

        let got = get_run(&db, "p1").await.unwrap().unwrap();
        assert_eq!(got.state, MigrationState::Copying);
        assert_eq!(got.batches_done, 1);

        run.batches_done = 2;
        run.state = MigrationState::Validating;
        upsert_run(&db, &run).await.unwrap();

        let got = get_run(&db, "p1").await.unwrap().unwrap();
        assert_eq!(got.state, MigrationState::Validating);
        assert_eq!(got.batches_done, 2);
    }
}
