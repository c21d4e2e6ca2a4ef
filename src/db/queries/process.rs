//! Process creation and audit trail

use std::collections::HashMap;

use anyhow::{anyhow, Result};
use sqlx::PgConnection;

use crate::types::{NewProcess, Process};

const AUDIT_INSERT: &str = "INSERT";

/// Bulk-insert processes and return them with their generated ids, in input order.
///
/// Ids are reserved from the sequence first so the returned rows can be matched
/// back to the input positions regardless of the order `RETURNING` yields.
pub async fn insert_processes(conn: &mut PgConnection, processes: &[NewProcess]) -> Result<Vec<Process>> {
    if processes.is_empty() {
        return Ok(Vec::new());
    }

    let ids: Vec<i64> = sqlx::query_scalar(
        "SELECT nextval(pg_get_serial_sequence('process', 'id_process')) FROM generate_series(1, $1)",
    )
    .bind(processes.len() as i64)
    .fetch_all(&mut *conn)
    .await?;

    let records: Vec<&str> = processes.iter().map(|p| p.record.as_str()).collect();
    let flow_ids: Vec<i64> = processes.iter().map(|p| p.flow_id).collect();
    let unit_ids: Vec<i64> = processes.iter().map(|p| p.unit_id).collect();
    let priority_ids: Vec<i32> = processes.iter().map(|p| p.priority_id).collect();
    let nicknames: Vec<Option<&str>> = processes.iter().map(|p| p.nickname.as_deref()).collect();
    let finalised: Vec<bool> = processes.iter().map(|p| p.finalised).collect();

    let inserted = sqlx::query_as::<_, Process>(
        r#"
        INSERT INTO process (id_process, record, id_flow, id_unit, id_priority, nickname, finalised)
        SELECT * FROM UNNEST($1::bigint[], $2::varchar[], $3::bigint[], $4::bigint[], $5::int[], $6::varchar[], $7::bool[])
        RETURNING id_process AS id, record, id_flow AS flow_id, id_unit AS unit_id,
            id_priority AS priority_id, nickname, finalised, created_at
        "#,
    )
    .bind(&ids)
    .bind(&records)
    .bind(&flow_ids)
    .bind(&unit_ids)
    .bind(&priority_ids)
    .bind(&nicknames)
    .bind(&finalised)
    .fetch_all(&mut *conn)
    .await?;

    let mut by_id: HashMap<i64, Process> = inserted.into_iter().map(|p| (p.id, p)).collect();
    ids.iter()
        .map(|id| {
            by_id
                .remove(id)
                .ok_or_else(|| anyhow!("Processo {} não retornado pelo banco", id))
        })
        .collect()
}

/// Append one `INSERT` audit entry per created process
pub async fn insert_creation_audits(
    conn: &mut PgConnection,
    processes: &[Process],
    changed_by: &str,
) -> Result<()> {
    if processes.is_empty() {
        return Ok(());
    }

    let ids: Vec<i64> = processes.iter().map(|p| p.id).collect();
    let records: Vec<&str> = processes.iter().map(|p| p.record.as_str()).collect();
    let snapshots = processes
        .iter()
        .map(serde_json::to_value)
        .collect::<Result<Vec<serde_json::Value>, _>>()?;

    sqlx::query(
        r#"
        INSERT INTO process_aud (id_process, process_record, operation, changed_by, new_values, changed_at)
        SELECT id, record, $3, $4, snapshot, NOW()
        FROM UNNEST($1::bigint[], $2::varchar[], $5::jsonb[]) AS t(id, record, snapshot)
        "#,
    )
    .bind(&ids)
    .bind(&records)
    .bind(AUDIT_INSERT)
    .bind(changed_by)
    .bind(&snapshots)
    .execute(&mut *conn)
    .await?;

    Ok(())
}
