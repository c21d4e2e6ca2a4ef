//! Process (legal case) types created by the import pipeline

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use sqlx::FromRow;

/// Candidate process built from a valid spreadsheet row
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct NewProcess {
    pub record: String,
    pub flow_id: i64,
    pub unit_id: i64,
    pub priority_id: i32,
    pub nickname: Option<String>,
    pub finalised: bool,
}

/// Process as stored, used as the audit snapshot
#[derive(Debug, Clone, Serialize, Deserialize, FromRow)]
#[serde(rename_all = "camelCase")]
pub struct Process {
    pub id: i64,
    pub record: String,
    pub flow_id: i64,
    pub unit_id: i64,
    pub priority_id: i32,
    pub nickname: Option<String>,
    pub finalised: bool,
    pub created_at: DateTime<Utc>,
}
