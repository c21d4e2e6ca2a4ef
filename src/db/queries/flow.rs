//! Flow reference-data lookups

use anyhow::Result;
use sqlx::PgPool;

use crate::types::FlowRef;

/// Find flows whose name is exactly one of `names`
pub async fn find_flows_by_names(pool: &PgPool, names: &[String]) -> Result<Vec<FlowRef>> {
    if names.is_empty() {
        return Ok(Vec::new());
    }

    let flows = sqlx::query_as::<_, FlowRef>(
        r#"
        SELECT id_flow AS id, id_unit AS unit_id, name
        FROM flow
        WHERE name = ANY($1)
        "#,
    )
    .bind(names)
    .fetch_all(pool)
    .await?;

    Ok(flows)
}
