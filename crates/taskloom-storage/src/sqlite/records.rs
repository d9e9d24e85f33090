// SPDX-FileCopyrightText: 2026 Taskloom Contributors
// SPDX-License-Identifier: MIT OR Apache-2.0

//! Memory record persistence: BLOB vectors, filtered listing, fulfillment.

use rusqlite::types::ToSql;
use rusqlite::{params, OptionalExtension};

use taskloom_core::types::{
    blob_to_vec, vec_to_blob, EmbeddingResult, EmbeddingStatus, MemoryRecord, MemoryRole,
    RecordFilter,
};
use taskloom_core::TaskloomError;

use crate::database::{map_tr_err, Database};

const COLUMNS: &str = "id, project_id, session_id, task_id, role, content, embedding, \
                       embedding_status, embedding_error, metadata, created_at";

fn row_to_record(row: &rusqlite::Row) -> Result<MemoryRecord, rusqlite::Error> {
    let role: String = row.get(4)?;
    let embedding_blob: Option<Vec<u8>> = row.get(6)?;
    let status: String = row.get(7)?;
    let metadata_text: Option<String> = row.get(9)?;

    Ok(MemoryRecord {
        id: row.get(0)?,
        project_id: row.get(1)?,
        session_id: row.get(2)?,
        task_id: row.get(3)?,
        role: MemoryRole::from_str_value(&role),
        content: row.get(5)?,
        embedding: embedding_blob.map(|b| blob_to_vec(&b)),
        embedding_status: EmbeddingStatus::from_str_value(&status),
        embedding_error: row.get(8)?,
        metadata: metadata_text.and_then(|t| serde_json::from_str(&t).ok()),
        created_at: row.get(10)?,
    })
}

fn metadata_text(record: &MemoryRecord) -> Option<String> {
    record.metadata.as_ref().map(|m| m.to_string())
}

pub async fn insert_record(db: &Database, record: &MemoryRecord) -> Result<(), TaskloomError> {
    write_record(db, record, false).await
}

/// Idempotent upsert preserving the record id (migration copy path).
pub async fn put_record(db: &Database, record: &MemoryRecord) -> Result<(), TaskloomError> {
    write_record(db, record, true).await
}

async fn write_record(
    db: &Database,
    record: &MemoryRecord,
    replace: bool,
) -> Result<(), TaskloomError> {
    let record = record.clone();
    let metadata = metadata_text(&record);
    db.connection()
        .call(move |conn| {
            let verb = if replace { "INSERT OR REPLACE" } else { "INSERT" };
            conn.execute(
                &format!(
                    "{verb} INTO memory_records
                     (id, project_id, session_id, task_id, role, content, embedding,
                      embedding_status, embedding_error, metadata, created_at)
                     VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7, ?8, ?9, ?10, ?11)"
                ),
                params![
                    record.id,
                    record.project_id,
                    record.session_id,
                    record.task_id,
                    record.role.as_str(),
                    record.content,
                    record.embedding.as_deref().map(vec_to_blob),
                    record.embedding_status.as_str(),
                    record.embedding_error,
                    metadata,
                    record.created_at,
                ],
            )?;
            Ok(())
        })
        .await
        .map_err(map_tr_err)
}

pub async fn get_record(db: &Database, id: &str) -> Result<Option<MemoryRecord>, TaskloomError> {
    let id = id.to_string();
    db.connection()
        .call(move |conn| {
            let mut stmt = conn
                .prepare(&format!("SELECT {COLUMNS} FROM memory_records WHERE id = ?1"))?;
            let record = stmt.query_row(params![id], row_to_record).optional()?;
            Ok(record)
        })
        .await
        .map_err(map_tr_err)
}

/// Fulfill (or fail) a pending record's embedding.
///
/// Returns the number of rows updated (0 means the record does not exist).
pub async fn set_embedding(
    db: &Database,
    id: &str,
    outcome: &EmbeddingResult,
) -> Result<usize, TaskloomError> {
    let id = id.to_string();
    let outcome = outcome.clone();
    db.connection()
        .call(move |conn| {
            let n = match outcome {
                EmbeddingResult::Embedded(vector) => conn.execute(
                    "UPDATE memory_records
                     SET embedding = ?1, embedding_status = 'ready', embedding_error = NULL
                     WHERE id = ?2",
                    params![vec_to_blob(&vector), id],
                )?,
                EmbeddingResult::Failed { reason } => conn.execute(
                    "UPDATE memory_records
                     SET embedding = NULL, embedding_status = 'failed', embedding_error = ?1
                     WHERE id = ?2",
                    params![reason, id],
                )?,
            };
            Ok(n)
        })
        .await
        .map_err(map_tr_err)
}

/// Page through a project's records, newest-first, with optional filters.
pub async fn list_records(
    db: &Database,
    project_id: &str,
    filter: &RecordFilter,
    offset: usize,
    limit: usize,
) -> Result<Vec<MemoryRecord>, TaskloomError> {
    let project_id = project_id.to_string();
    let filter = filter.clone();
    db.connection()
        .call(move |conn| {
            let mut sql =
                format!("SELECT {COLUMNS} FROM memory_records WHERE project_id = ?");
            let mut owned: Vec<String> = vec![project_id];

            if let Some(session_id) = &filter.session_id {
                sql.push_str(" AND session_id = ?");
                owned.push(session_id.clone());
            }
            if let Some(task_id) = &filter.task_id {
                sql.push_str(" AND task_id = ?");
                owned.push(task_id.clone());
            }
            if let Some(role) = filter.role {
                sql.push_str(" AND role = ?");
                owned.push(role.as_str().to_string());
            }
            if let Some(tag) = &filter.tag {
                sql.push_str(
                    " AND EXISTS (SELECT 1 FROM json_each(memory_records.metadata, '$.tags')
                      WHERE json_each.value = ?)",
                );
                owned.push(tag.clone());
            }

            sql.push_str(" ORDER BY created_at DESC, id DESC LIMIT ? OFFSET ?");
            let limit = limit as i64;
            let offset = offset as i64;

            let mut args: Vec<&dyn ToSql> = owned.iter().map(|s| s as &dyn ToSql).collect();
            args.push(&limit);
            args.push(&offset);

            let mut stmt = conn.prepare(&sql)?;
            let records = stmt
                .query_map(args.as_slice(), row_to_record)?
                .collect::<Result<Vec<_>, _>>()?;
            Ok(records)
        })
        .await
        .map_err(map_tr_err)
}

/// All of a project's `Ready` records, for in-process vector scoring.
pub async fn ready_records(
    db: &Database,
    project_id: &str,
) -> Result<Vec<MemoryRecord>, TaskloomError> {
    let project_id = project_id.to_string();
    db.connection()
        .call(move |conn| {
            let mut stmt = conn.prepare(&format!(
                "SELECT {COLUMNS} FROM memory_records
                 WHERE project_id = ?1 AND embedding_status = 'ready'"
            ))?;
            let records = stmt
                .query_map(params![project_id], row_to_record)?
                .collect::<Result<Vec<_>, _>>()?;
            Ok(records)
        })
        .await
        .map_err(map_tr_err)
}

/// Stable oldest-first page for migration export. The ordering must not
/// change between resumed runs, so it sorts on immutable columns only.
pub async fn export_page(
    db: &Database,
    project_id: &str,
    offset: usize,
    limit: usize,
) -> Result<Vec<MemoryRecord>, TaskloomError> {
    let project_id = project_id.to_string();
    db.connection()
        .call(move |conn| {
            let mut stmt = conn.prepare(&format!(
                "SELECT {COLUMNS} FROM memory_records WHERE project_id = ?1
                 ORDER BY created_at ASC, id ASC LIMIT ?2 OFFSET ?3"
            ))?;
            let records = stmt
                .query_map(
                    params![project_id, limit as i64, offset as i64],
                    row_to_record,
                )?
                .collect::<Result<Vec<_>, _>>()?;
            Ok(records)
        })
        .await
        .map_err(map_tr_err)
}

pub async fn count_records(db: &Database, project_id: &str) -> Result<u64, TaskloomError> {
    let project_id = project_id.to_string();
    db.connection()
        .call(move |conn| {
            let n: i64 = conn.query_row(
                "SELECT count(*) FROM memory_records WHERE project_id = ?1",
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
    use taskloom_core::types::{new_id, now_rfc3339, Project, StorageMode};

    async fn setup_db() -> Database {
        let db = Database::open_in_memory().await.unwrap();
        let project = Project {
            id: "p1".to_string(),
            name: "board".to_string(),
            path: "/work/board".to_string(),
            storage_mode: StorageMode::Local,
            created_at: now_rfc3339(),
        };
        projects::insert_project(&db, &project).await.unwrap();
        db
    }

    fn make_record(session: &str, content: &str, timestamp: &str) -> MemoryRecord {
        MemoryRecord {
            id: new_id(),
            project_id: "p1".to_string(),
            session_id: session.to_string(),
            task_id: None,
            role: MemoryRole::User,
            content: content.to_string(),
            embedding: None,
            embedding_status: EmbeddingStatus::Pending,
            embedding_error: None,
            metadata: None,
            created_at: timestamp.to_string(),
        }
    }

    #[tokio::test]
    async fn insert_and_get_roundtrip() {
        let db = setup_db().await;
        let mut record = make_record("s1", "fix the flaky test", "2026-05-01T10:00:00.000Z");
        record.metadata = Some(serde_json::json!({ "tags": ["ci"] }));
        insert_record(&db, &record).await.unwrap();

        let got = get_record(&db, &record.id).await.unwrap().unwrap();
        assert_eq!(got.content, "fix the flaky test");
        assert_eq!(got.embedding_status, EmbeddingStatus::Pending);
        assert!(got.embedding.is_none());
        assert_eq!(got.metadata.unwrap()["tags"][0], "ci");
    }

    #[tokio::test]
    async fn set_embedding_moves_pending_to_ready() {
        let db = setup_db().await;
        let record = make_record("s1", "hello", "2026-05-01T10:00:00.000Z");
        insert_record(&db, &record).await.unwrap();

        let vector: Vec<f32> = (0..384).map(|i| i as f32 / 384.0).collect();
        let n = set_embedding(&db, &record.id, &EmbeddingResult::Embedded(vector.clone()))
            .await
            .unwrap();
        assert_eq!(n, 1);

        let got = get_record(&db, &record.id).await.unwrap().unwrap();
        assert_eq!(got.embedding_status, EmbeddingStatus::Ready);
        let stored = got.embedding.unwrap();
        assert_eq!(stored.len(), 384);
        for (a, b) in vector.iter().zip(stored.iter()) {
            assert!((a - b).abs() < f32::EPSILON);
        }
    }

    #[tokio::test]
    async fn set_embedding_failure_keeps_content() {
        let db = setup_db().await;
        let record = make_record("s1", "content survives", "2026-05-01T10:00:00.000Z");
        insert_record(&db, &record).await.unwrap();

        set_embedding(
            &db,
            &record.id,
            &EmbeddingResult::Failed {
                reason: "provider down".to_string(),
            },
        )
        .await
        .unwrap();

        let got = get_record(&db, &record.id).await.unwrap().unwrap();
        assert_eq!(got.embedding_status, EmbeddingStatus::Failed);
        assert_eq!(got.embedding_error.as_deref(), Some("provider down"));
        assert_eq!(got.content, "content survives");
    }

    #[tokio::test]
    async fn set_embedding_on_missing_record_updates_nothing() {
        let db = setup_db().await;
        let n = set_embedding(&db, "ghost", &EmbeddingResult::Embedded(vec![0.0; 4]))
            .await
            .unwrap();
        assert_eq!(n, 0);
    }

    #[tokio::test]
    async fn list_is_newest_first_with_pagination() {
        let db = setup_db().await;
        for i in 0..5 {
            let record = make_record(
                "s1",
                &format!("msg {i}"),
                &format!("2026-05-01T10:00:0{i}.000Z"),
            );
            insert_record(&db, &record).await.unwrap();
        }

        let filter = RecordFilter::default();
        let page = list_records(&db, "p1", &filter, 0, 2).await.unwrap();
        assert_eq!(page.len(), 2);
        assert_eq!(page[0].content, "msg 4");
        assert_eq!(page[1].content, "msg 3");

        let page = list_records(&db, "p1", &filter, 2, 2).await.unwrap();
        assert_eq!(page[0].content, "msg 2");
    }

    #[tokio::test]
    async fn list_filters_by_session_and_tag() {
        let db = setup_db().await;
        let mut tagged = make_record("s1", "tagged", "2026-05-01T10:00:00.000Z");
        tagged.metadata = Some(serde_json::json!({ "tags": ["review", "rust"] }));
        insert_record(&db, &tagged).await.unwrap();
        insert_record(&db, &make_record("s1", "untagged", "2026-05-01T10:00:01.000Z"))
            .await
            .unwrap();
        insert_record(&db, &make_record("s2", "other session", "2026-05-01T10:00:02.000Z"))
            .await
            .unwrap();

        let by_session = RecordFilter {
            session_id: Some("s1".to_string()),
            ..Default::default()
        };
        assert_eq!(list_records(&db, "p1", &by_session, 0, 10).await.unwrap().len(), 2);

        let by_tag = RecordFilter {
            tag: Some("review".to_string()),
            ..Default::default()
        };
        let hits = list_records(&db, "p1", &by_tag, 0, 10).await.unwrap();
        assert_eq!(hits.len(), 1);
        assert_eq!(hits[0].content, "tagged");
    }

    #[tokio::test]
    async fn export_page_is_oldest_first_and_stable() {
        let db = setup_db().await;
        for i in 0..3 {
            insert_record(
                &db,
                &make_record("s1", &format!("msg {i}"), &format!("2026-05-01T10:00:0{i}.000Z")),
            )
            .await
            .unwrap();
        }

        let first = export_page(&db, "p1", 0, 2).await.unwrap();
        assert_eq!(first[0].content, "msg 0");
        assert_eq!(first[1].content, "msg 1");

        let second = export_page(&db, "p1", 2, 2).await.unwrap();
        assert_eq!(second.len(), 1);
        assert_eq!(second[0].content, "msg 2");
    }

    #[tokio::test]
    async fn put_record_is_idempotent() {
        let db = setup_db().await;
        let record = make_record("s1", "copied", "2026-05-01T10:00:00.000Z");
        put_record(&db, &record).await.unwrap();
        put_record(&db, &record).await.unwrap();
        assert_eq!(count_records(&db, "p1").await.unwrap(), 1);
    }
}
