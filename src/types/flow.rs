//! Flow reference data as seen by the import pipeline

use serde::{Deserialize, Serialize};
use sqlx::FromRow;

/// Flow resolved by name, with the unit that owns it
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize, FromRow)]
#[serde(rename_all = "camelCase")]
pub struct FlowRef {
    pub id: i64,
    pub unit_id: i64,
    pub name: String,
}
