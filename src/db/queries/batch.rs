//! Import batch queries: intake, claim queue, persistence and operator actions

use anyhow::Result;
use chrono::{DateTime, Utc};
use sqlx::{PgConnection, PgPool};
use tracing::debug;

use crate::types::{
    BatchStatus, BatchSummary, ClaimedBatch, ImportRow, NewBatch, PersistSummary, Process, RowStatus,
    ValidatedRow,
};

use super::process;

// =============================================================================
// INTAKE
// =============================================================================

/// Store a freshly uploaded file as a `waiting` batch
pub async fn create_batch(pool: &PgPool, batch: &NewBatch) -> Result<i64> {
    let id: i64 = sqlx::query_scalar(
        r#"
        INSERT INTO processes_file (name, file_name, data_original_file, status, imported_by, created_at, updated_at)
        VALUES ($1, $2, $3, $4, $5, NOW(), NOW())
        RETURNING id_processes_file
        "#,
    )
    .bind(&batch.name)
    .bind(&batch.file_name)
    .bind(&batch.data)
    .bind(BatchStatus::Waiting)
    .bind(&batch.imported_by)
    .fetch_one(pool)
    .await?;

    Ok(id)
}

// =============================================================================
// CLAIM QUEUE
// =============================================================================

/// Flip up to `max_count` waiting batches (oldest first) to `inProgress` and
/// return them. The single conditional UPDATE is what keeps two workers from
/// claiming the same batch.
pub async fn claim_batches(pool: &PgPool, max_count: i64) -> Result<Vec<ClaimedBatch>> {
    let mut claimed = sqlx::query_as::<_, ClaimedBatch>(
        r#"
        UPDATE processes_file
        SET status = 'inProgress', updated_at = NOW()
        WHERE id_processes_file IN (
            SELECT id_processes_file
            FROM processes_file
            WHERE status = 'waiting'
            ORDER BY id_processes_file ASC
            LIMIT $1
            FOR UPDATE SKIP LOCKED
        )
        AND status = 'waiting'
        RETURNING id_processes_file AS id, file_name, data_original_file, imported_by
        "#,
    )
    .bind(max_count)
    .fetch_all(pool)
    .await?;

    claimed.sort_by_key(|b| b.id);
    Ok(claimed)
}

// =============================================================================
// PERSISTENCE
// =============================================================================

async fn insert_rows(
    conn: &mut PgConnection,
    batch_id: i64,
    rows: &[ValidatedRow],
    process_ids: &[Option<i64>],
) -> Result<()> {
    if rows.is_empty() {
        return Ok(());
    }

    let records: Vec<Option<&str>> = rows.iter().map(|r| r.raw.record.as_deref()).collect();
    let flows: Vec<Option<&str>> = rows.iter().map(|r| r.raw.flow.as_deref()).collect();
    let nicknames: Vec<Option<&str>> = rows.iter().map(|r| r.raw.nickname.as_deref()).collect();
    let priorities: Vec<Option<&str>> = rows.iter().map(|r| r.raw.priority.as_deref()).collect();
    let row_indexes: Vec<i32> = rows.iter().map(|r| r.row_index).collect();
    let statuses: Vec<&str> = rows.iter().map(|r| r.status().as_str()).collect();
    let messages: Vec<Option<String>> = rows.iter().map(ValidatedRow::message).collect();

    sqlx::query(
        r#"
        INSERT INTO processes_file_item
            (id_processes_file, id_process, record, flow, nickname, priority, row_index, status, message)
        SELECT $1, id_process, record, flow, nickname, priority, row_index,
            status::processes_file_item_status, message
        FROM UNNEST($2::bigint[], $3::text[], $4::text[], $5::text[], $6::text[], $7::int[], $8::text[], $9::text[])
            AS t(id_process, record, flow, nickname, priority, row_index, status, message)
        "#,
    )
    .bind(batch_id)
    .bind(process_ids)
    .bind(&records)
    .bind(&flows)
    .bind(&nicknames)
    .bind(&priorities)
    .bind(&row_indexes)
    .bind(&statuses)
    .bind(&messages)
    .execute(&mut *conn)
    .await?;

    Ok(())
}

/// Write a validated batch in one transaction: processes, their audit entries,
/// every row outcome, then flip the batch to `imported`. Any failure rolls all
/// of it back.
pub async fn persist_batch(
    pool: &PgPool,
    batch_id: i64,
    imported_by: &str,
    rows: &[ValidatedRow],
) -> Result<PersistSummary> {
    let mut tx = pool.begin().await?;

    let payloads: Vec<_> = rows.iter().filter_map(|r| r.process().cloned()).collect();
    let created: Vec<Process> = process::insert_processes(&mut tx, &payloads).await?;
    process::insert_creation_audits(&mut tx, &created, imported_by).await?;

    let mut created_ids = created.iter().map(|p| p.id);
    let process_ids: Vec<Option<i64>> = rows
        .iter()
        .map(|r| r.process().and_then(|_| created_ids.next()))
        .collect();
    insert_rows(&mut tx, batch_id, rows, &process_ids).await?;

    sqlx::query(
        r#"
        UPDATE processes_file
        SET status = 'imported', message = NULL, imported_at = NOW(), updated_at = NOW()
        WHERE id_processes_file = $1
        "#,
    )
    .bind(batch_id)
    .execute(&mut *tx)
    .await?;

    tx.commit().await?;

    let summary = PersistSummary {
        imported: created.len(),
        failed: rows.len() - created.len(),
    };
    debug!("Batch {} persisted: {:?}", batch_id, summary);
    Ok(summary)
}

/// Record a file-level failure on the batch
pub async fn mark_batch_error(pool: &PgPool, batch_id: i64, message: &str) -> Result<()> {
    sqlx::query(
        r#"
        UPDATE processes_file
        SET status = 'error', message = $2, imported_at = NULL, updated_at = NOW()
        WHERE id_processes_file = $1
        "#,
    )
    .bind(batch_id)
    .bind(message)
    .execute(pool)
    .await?;

    Ok(())
}

// =============================================================================
// OPERATOR ACTIONS
// =============================================================================

/// Put an `error` batch back in the queue. Returns false when the batch does
/// not exist or is not in `error`.
pub async fn reset_batch(pool: &PgPool, batch_id: i64) -> Result<bool> {
    let result = sqlx::query(
        r#"
        UPDATE processes_file
        SET status = 'waiting', message = NULL, updated_at = NOW()
        WHERE id_processes_file = $1 AND status = 'error'
        "#,
    )
    .bind(batch_id)
    .execute(pool)
    .await?;

    Ok(result.rows_affected() > 0)
}

/// Mark an `error` row as fixed by hand, linking the process the operator created.
/// Returns false when the row does not exist or is not in `error`.
pub async fn mark_row_manually_imported(pool: &PgPool, row_id: i64, process_id: i64) -> Result<bool> {
    let result = sqlx::query(
        r#"
        UPDATE processes_file_item
        SET status = $3, id_process = $2, message = NULL
        WHERE id_processes_file_item = $1 AND status = 'error'
        "#,
    )
    .bind(row_id)
    .bind(process_id)
    .bind(RowStatus::ManuallyImported)
    .execute(pool)
    .await?;

    Ok(result.rows_affected() > 0)
}

/// Delete a batch and its rows
pub async fn delete_batch(pool: &PgPool, batch_id: i64) -> Result<bool> {
    let mut tx = pool.begin().await?;

    sqlx::query("DELETE FROM processes_file_item WHERE id_processes_file = $1")
        .bind(batch_id)
        .execute(&mut *tx)
        .await?;

    let result = sqlx::query("DELETE FROM processes_file WHERE id_processes_file = $1")
        .bind(batch_id)
        .execute(&mut *tx)
        .await?;

    tx.commit().await?;
    Ok(result.rows_affected() > 0)
}

// =============================================================================
// READS
// =============================================================================

/// List batches, newest first, with row counters
pub async fn list_batches(pool: &PgPool) -> Result<Vec<BatchSummary>> {
    let batches = sqlx::query_as::<_, BatchSummary>(
        r#"
        SELECT
            f.id_processes_file AS id, f.name, f.file_name, f.status, f.message,
            f.imported_at, f.created_at,
            COUNT(i.id_processes_file_item) AS all_items_count,
            COUNT(i.id_processes_file_item) FILTER (WHERE i.status = 'error') AS error_items_count,
            COUNT(i.id_processes_file_item) FILTER (WHERE i.status IN ('imported', 'manuallyImported')) AS imported_items_count
        FROM processes_file f
        LEFT JOIN processes_file_item i ON i.id_processes_file = f.id_processes_file
        GROUP BY f.id_processes_file
        ORDER BY f.id_processes_file DESC
        "#,
    )
    .fetch_all(pool)
    .await?;

    Ok(batches)
}

const ROW_COLUMNS: &str = r#"
    id_processes_file_item AS id, id_processes_file AS batch_id, id_process AS process_id,
    record, flow, nickname, priority, row_index, status, message
"#;

/// Rows of a batch for operator review: errors first, then by position
pub async fn list_rows(pool: &PgPool, batch_id: i64) -> Result<Vec<ImportRow>> {
    let query = format!(
        "SELECT {} FROM processes_file_item WHERE id_processes_file = $1 ORDER BY status DESC, row_index",
        ROW_COLUMNS
    );
    let rows = sqlx::query_as::<_, ImportRow>(&query)
        .bind(batch_id)
        .fetch_all(pool)
        .await?;

    Ok(rows)
}

/// Rows of a batch in the order they were written
pub async fn rows_in_file_order(pool: &PgPool, batch_id: i64) -> Result<Vec<ImportRow>> {
    let query = format!(
        "SELECT {} FROM processes_file_item WHERE id_processes_file = $1 ORDER BY id_processes_file_item",
        ROW_COLUMNS
    );
    let rows = sqlx::query_as::<_, ImportRow>(&query)
        .bind(batch_id)
        .fetch_all(pool)
        .await?;

    Ok(rows)
}

/// Display name and import timestamp used by the result report
pub async fn find_report_header(
    pool: &PgPool,
    batch_id: i64,
) -> Result<Option<(String, Option<DateTime<Utc>>)>> {
    let header = sqlx::query_as(
        "SELECT name, imported_at FROM processes_file WHERE id_processes_file = $1",
    )
    .bind(batch_id)
    .fetch_optional(pool)
    .await?;

    Ok(header)
}

/// Stored file name and original upload bytes
pub async fn find_original_file(pool: &PgPool, batch_id: i64) -> Result<Option<(String, Vec<u8>)>> {
    let file = sqlx::query_as(
        "SELECT file_name, data_original_file FROM processes_file WHERE id_processes_file = $1",
    )
    .bind(batch_id)
    .fetch_optional(pool)
    .await?;

    Ok(file)
}

// =============================================================================
// Tests (require PostgreSQL: DATABASE_URL pointing at a server sqlx can
// create throwaway databases on)
// =============================================================================

#[cfg(test)]
mod tests {
    use super::*;
    use std::collections::HashSet;

    use crate::types::{NewProcess, RawRow, RowOutcome};

    async fn seed_flow(pool: &PgPool) -> (i64, i64) {
        let unit_id: i64 = sqlx::query_scalar("INSERT INTO unit (name) VALUES ('Vara Cível') RETURNING id_unit")
            .fetch_one(pool)
            .await
            .unwrap();
        let flow_id: i64 = sqlx::query_scalar("INSERT INTO flow (id_unit, name) VALUES ($1, 'Civil') RETURNING id_flow")
            .bind(unit_id)
            .fetch_one(pool)
            .await
            .unwrap();
        (flow_id, unit_id)
    }

    async fn new_batch(pool: &PgPool, name: &str) -> i64 {
        create_batch(
            pool,
            &NewBatch {
                name: name.to_string(),
                file_name: format!("{}.csv", name),
                data: b"Processos,Fluxo\n".to_vec(),
                imported_by: "12345678900".to_string(),
            },
        )
        .await
        .unwrap()
    }

    fn valid_row(row_index: i32, record: &str, (flow_id, unit_id): (i64, i64)) -> ValidatedRow {
        ValidatedRow {
            row_index,
            raw: RawRow {
                record: Some(record.to_string()),
                flow: Some("Civil".to_string()),
                nickname: None,
                priority: None,
            },
            outcome: RowOutcome::Valid(NewProcess {
                record: record.to_string(),
                flow_id,
                unit_id,
                priority_id: 0,
                nickname: None,
                finalised: false,
            }),
        }
    }

    fn error_row(row_index: i32, record: &str) -> ValidatedRow {
        ValidatedRow {
            row_index,
            raw: RawRow {
                record: Some(record.to_string()),
                flow: Some("Civil".to_string()),
                nickname: None,
                priority: None,
            },
            outcome: RowOutcome::Invalid(vec![format!("Número de processo {} fora do padrão CNJ", record)]),
        }
    }

    async fn count(pool: &PgPool, sql: &str) -> i64 {
        sqlx::query_scalar(sql).fetch_one(pool).await.unwrap()
    }

    async fn status_of(pool: &PgPool, batch_id: i64) -> BatchStatus {
        sqlx::query_scalar("SELECT status FROM processes_file WHERE id_processes_file = $1")
            .bind(batch_id)
            .fetch_one(pool)
            .await
            .unwrap()
    }

    #[sqlx::test]
    #[ignore = "Requires PostgreSQL"]
    async fn test_claim_takes_oldest_waiting_up_to_limit(pool: PgPool) {
        let first = new_batch(&pool, "a").await;
        let failed = new_batch(&pool, "b").await;
        let second = new_batch(&pool, "c").await;
        let third = new_batch(&pool, "d").await;
        mark_batch_error(&pool, failed, "Cabeçalho não encontrado").await.unwrap();

        let claimed: Vec<i64> = claim_batches(&pool, 2).await.unwrap().iter().map(|b| b.id).collect();
        assert_eq!(claimed, vec![first, second]);
        assert_eq!(status_of(&pool, first).await, BatchStatus::InProgress);
        assert_eq!(status_of(&pool, failed).await, BatchStatus::Error);

        let claimed: Vec<i64> = claim_batches(&pool, 2).await.unwrap().iter().map(|b| b.id).collect();
        assert_eq!(claimed, vec![third]);
        assert!(claim_batches(&pool, 2).await.unwrap().is_empty());
    }

    #[sqlx::test]
    #[ignore = "Requires PostgreSQL"]
    async fn test_concurrent_claims_never_share_a_batch(pool: PgPool) {
        for i in 0..6 {
            new_batch(&pool, &format!("lote{}", i)).await;
        }

        let (a, b) = tokio::join!(claim_batches(&pool, 6), claim_batches(&pool, 6));
        let ids: Vec<i64> = a.unwrap().into_iter().chain(b.unwrap()).map(|b| b.id).collect();
        let distinct: HashSet<i64> = ids.iter().copied().collect();

        assert_eq!(ids.len(), 6);
        assert_eq!(distinct.len(), 6);
    }

    #[sqlx::test]
    #[ignore = "Requires PostgreSQL"]
    async fn test_persist_links_rows_processes_and_audits(pool: PgPool) {
        let flow = seed_flow(&pool).await;
        let batch_id = new_batch(&pool, "lote").await;
        claim_batches(&pool, 1).await.unwrap();

        let rows = vec![
            valid_row(0, "12345678901234567890", flow),
            error_row(1, "abc"),
            valid_row(2, "09876543210987654321", flow),
        ];
        let summary = persist_batch(&pool, batch_id, "12345678900", &rows).await.unwrap();

        assert_eq!(summary, PersistSummary { imported: 2, failed: 1 });
        assert_eq!(status_of(&pool, batch_id).await, BatchStatus::Imported);
        assert_eq!(count(&pool, "SELECT COUNT(*) FROM process").await, 2);
        assert_eq!(
            count(
                &pool,
                "SELECT COUNT(*) FROM process_aud a JOIN process p USING (id_process) \
                 WHERE a.operation = 'INSERT' AND a.changed_by = '12345678900' AND a.process_record = p.record"
            )
            .await,
            2
        );

        let stored = rows_in_file_order(&pool, batch_id).await.unwrap();
        let linked: Vec<Option<String>> = stored
            .iter()
            .map(|r| r.process_id.map(|_| r.record.clone().unwrap_or_default()))
            .collect();
        assert_eq!(
            linked,
            vec![Some("12345678901234567890".to_string()), None, Some("09876543210987654321".to_string())]
        );
        for row in stored.iter().filter(|r| r.process_id.is_some()) {
            let record: String = sqlx::query_scalar("SELECT record FROM process WHERE id_process = $1")
                .bind(row.process_id)
                .fetch_one(&pool)
                .await
                .unwrap();
            assert_eq!(Some(record), row.record);
        }
        assert_eq!(
            stored[1].message.as_deref(),
            Some("Número de processo abc fora do padrão CNJ")
        );
    }

    #[sqlx::test]
    #[ignore = "Requires PostgreSQL"]
    async fn test_persist_failure_leaves_nothing_behind(pool: PgPool) {
        let flow = seed_flow(&pool).await;
        let missing_batch = 9_999;

        let rows = vec![valid_row(0, "12345678901234567890", flow), error_row(1, "abc")];
        assert!(persist_batch(&pool, missing_batch, "12345678900", &rows).await.is_err());

        assert_eq!(count(&pool, "SELECT COUNT(*) FROM process").await, 0);
        assert_eq!(count(&pool, "SELECT COUNT(*) FROM process_aud").await, 0);
        assert_eq!(count(&pool, "SELECT COUNT(*) FROM processes_file_item").await, 0);
    }

    #[sqlx::test]
    #[ignore = "Requires PostgreSQL"]
    async fn test_row_process_link_is_enforced(pool: PgPool) {
        let batch_id = new_batch(&pool, "lote").await;

        let imported_without_process = sqlx::query(
            "INSERT INTO processes_file_item (id_processes_file, id_process, row_index, status) VALUES ($1, NULL, 0, 'imported')",
        )
        .bind(batch_id)
        .execute(&pool)
        .await;
        assert!(imported_without_process.is_err());

        let flow = seed_flow(&pool).await;
        persist_batch(&pool, batch_id, "12345678900", &[valid_row(0, "12345678901234567890", flow)])
            .await
            .unwrap();
        let process_id: i64 = sqlx::query_scalar("SELECT id_process FROM process")
            .fetch_one(&pool)
            .await
            .unwrap();

        let error_with_process = sqlx::query(
            "INSERT INTO processes_file_item (id_processes_file, id_process, row_index, status) VALUES ($1, $2, 1, 'error')",
        )
        .bind(batch_id)
        .bind(process_id)
        .execute(&pool)
        .await;
        assert!(error_with_process.is_err());
    }

    #[sqlx::test]
    #[ignore = "Requires PostgreSQL"]
    async fn test_list_rows_puts_errors_first(pool: PgPool) {
        let flow = seed_flow(&pool).await;
        let batch_id = new_batch(&pool, "lote").await;
        let rows = vec![
            valid_row(0, "12345678901234567890", flow),
            error_row(1, "abc"),
            valid_row(2, "09876543210987654321", flow),
            error_row(3, "def"),
        ];
        persist_batch(&pool, batch_id, "12345678900", &rows).await.unwrap();

        let stored = rows_in_file_order(&pool, batch_id).await.unwrap();
        let process_id = stored[0].process_id.unwrap();
        assert!(mark_row_manually_imported(&pool, stored[3].id, process_id).await.unwrap());

        let order: Vec<(RowStatus, i32)> = list_rows(&pool, batch_id)
            .await
            .unwrap()
            .iter()
            .map(|r| (r.status, r.row_index))
            .collect();
        assert_eq!(
            order,
            vec![
                (RowStatus::Error, 1),
                (RowStatus::ManuallyImported, 3),
                (RowStatus::Imported, 0),
                (RowStatus::Imported, 2),
            ]
        );
    }

    #[sqlx::test]
    #[ignore = "Requires PostgreSQL"]
    async fn test_manual_fix_only_applies_to_error_rows(pool: PgPool) {
        let flow = seed_flow(&pool).await;
        let batch_id = new_batch(&pool, "lote").await;
        persist_batch(
            &pool,
            batch_id,
            "12345678900",
            &[valid_row(0, "12345678901234567890", flow), error_row(1, "abc")],
        )
        .await
        .unwrap();
        let stored = rows_in_file_order(&pool, batch_id).await.unwrap();
        let (imported, failed) = (&stored[0], &stored[1]);
        let process_id = imported.process_id.unwrap();

        assert!(!mark_row_manually_imported(&pool, imported.id, process_id).await.unwrap());
        assert!(mark_row_manually_imported(&pool, failed.id, process_id).await.unwrap());
        assert!(!mark_row_manually_imported(&pool, failed.id, process_id).await.unwrap());

        let fixed = &rows_in_file_order(&pool, batch_id).await.unwrap()[1];
        assert_eq!(fixed.status, RowStatus::ManuallyImported);
        assert_eq!(fixed.process_id, Some(process_id));
        assert_eq!(fixed.message, None);
    }

    #[sqlx::test]
    #[ignore = "Requires PostgreSQL"]
    async fn test_list_batches_counters(pool: PgPool) {
        let flow = seed_flow(&pool).await;
        let empty = new_batch(&pool, "vazio").await;
        let full = new_batch(&pool, "cheio").await;
        persist_batch(
            &pool,
            full,
            "12345678900",
            &[valid_row(0, "12345678901234567890", flow), error_row(1, "abc"), error_row(2, "def")],
        )
        .await
        .unwrap();
        let stored = rows_in_file_order(&pool, full).await.unwrap();
        mark_row_manually_imported(&pool, stored[1].id, stored[0].process_id.unwrap())
            .await
            .unwrap();

        let batches = list_batches(&pool).await.unwrap();
        assert_eq!(batches.iter().map(|b| b.id).collect::<Vec<_>>(), vec![full, empty]);

        let counts = |b: &BatchSummary| (b.all_items_count, b.imported_items_count, b.error_items_count);
        assert_eq!(counts(&batches[0]), (3, 2, 1));
        assert_eq!(counts(&batches[1]), (0, 0, 0));
        assert_eq!(batches[1].status, BatchStatus::Waiting);
    }

    #[sqlx::test]
    #[ignore = "Requires PostgreSQL"]
    async fn test_reset_and_delete(pool: PgPool) {
        let batch_id = new_batch(&pool, "lote").await;
        assert!(!reset_batch(&pool, batch_id).await.unwrap());

        mark_batch_error(&pool, batch_id, "Coluna fluxos não encontrada").await.unwrap();
        assert!(reset_batch(&pool, batch_id).await.unwrap());
        assert_eq!(status_of(&pool, batch_id).await, BatchStatus::Waiting);

        assert!(delete_batch(&pool, batch_id).await.unwrap());
        assert!(!delete_batch(&pool, batch_id).await.unwrap());
        assert!(find_original_file(&pool, batch_id).await.unwrap().is_none());
    }
}
