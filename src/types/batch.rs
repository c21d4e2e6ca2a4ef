//! Import batch (uploaded spreadsheet) and per-row outcome types

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use sqlx::FromRow;

use super::process::NewProcess;

/// Lifecycle status of an uploaded batch
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, sqlx::Type)]
#[serde(rename_all = "camelCase")]
#[sqlx(type_name = "processes_file_status", rename_all = "camelCase")]
pub enum BatchStatus {
    Waiting,
    InProgress,
    Imported,
    Error,
}

impl BatchStatus {
    pub fn as_str(&self) -> &'static str {
        match self {
            BatchStatus::Waiting => "waiting",
            BatchStatus::InProgress => "inProgress",
            BatchStatus::Imported => "imported",
            BatchStatus::Error => "error",
        }
    }
}

/// Outcome of a single spreadsheet row
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, sqlx::Type)]
#[serde(rename_all = "camelCase")]
#[sqlx(type_name = "processes_file_item_status", rename_all = "camelCase")]
pub enum RowStatus {
    Imported,
    ManuallyImported,
    Error,
}

impl RowStatus {
    pub fn as_str(&self) -> &'static str {
        match self {
            RowStatus::Imported => "imported",
            RowStatus::ManuallyImported => "manuallyImported",
            RowStatus::Error => "error",
        }
    }

    /// Label shown to operators in the result spreadsheet
    pub fn report_label(&self) -> &'static str {
        match self {
            RowStatus::Imported => "IMPORTADO",
            RowStatus::ManuallyImported => "IMPORTADO MANUALMENTE",
            RowStatus::Error => "ERRO",
        }
    }

    pub fn is_error(&self) -> bool {
        matches!(self, RowStatus::Error)
    }
}

/// A batch picked up by the claim queue, with the payload needed to process it
#[derive(Debug, Clone, FromRow)]
pub struct ClaimedBatch {
    pub id: i64,
    pub file_name: String,
    pub data_original_file: Vec<u8>,
    pub imported_by: String,
}

/// Batch listing entry with row counters
#[derive(Debug, Clone, Serialize, Deserialize, FromRow)]
#[serde(rename_all = "camelCase")]
pub struct BatchSummary {
    pub id: i64,
    pub name: String,
    pub file_name: String,
    pub status: BatchStatus,
    pub message: Option<String>,
    pub imported_at: Option<DateTime<Utc>>,
    pub created_at: DateTime<Utc>,
    pub all_items_count: i64,
    pub error_items_count: i64,
    pub imported_items_count: i64,
}

/// New batch as accepted by upload intake
#[derive(Debug, Clone)]
pub struct NewBatch {
    pub name: String,
    pub file_name: String,
    pub data: Vec<u8>,
    pub imported_by: String,
}

/// Stored row of a processed batch
#[derive(Debug, Clone, Serialize, Deserialize, FromRow)]
#[serde(rename_all = "camelCase")]
pub struct ImportRow {
    pub id: i64,
    pub batch_id: i64,
    pub process_id: Option<i64>,
    pub record: Option<String>,
    pub flow: Option<String>,
    pub nickname: Option<String>,
    pub priority: Option<String>,
    pub row_index: i32,
    pub status: RowStatus,
    pub message: Option<String>,
}

/// Raw cell values extracted for one spreadsheet row
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct RawRow {
    pub record: Option<String>,
    pub flow: Option<String>,
    pub nickname: Option<String>,
    pub priority: Option<String>,
}

impl RawRow {
    pub fn is_blank(&self) -> bool {
        self.record.is_none() && self.flow.is_none() && self.nickname.is_none() && self.priority.is_none()
    }
}

/// Validation verdict of one row
#[derive(Debug, Clone, PartialEq)]
pub enum RowOutcome {
    Valid(NewProcess),
    Invalid(Vec<String>),
}

/// Validated row ready to be persisted
#[derive(Debug, Clone, PartialEq)]
pub struct ValidatedRow {
    pub row_index: i32,
    pub raw: RawRow,
    pub outcome: RowOutcome,
}

impl ValidatedRow {
    pub fn status(&self) -> RowStatus {
        match self.outcome {
            RowOutcome::Valid(_) => RowStatus::Imported,
            RowOutcome::Invalid(_) => RowStatus::Error,
        }
    }

    /// Newline-joined, trimmed message; `None` for valid rows
    pub fn message(&self) -> Option<String> {
        match &self.outcome {
            RowOutcome::Valid(_) => None,
            RowOutcome::Invalid(messages) => Some(messages.join("\n").trim().to_string()),
        }
    }

    pub fn process(&self) -> Option<&NewProcess> {
        match &self.outcome {
            RowOutcome::Valid(process) => Some(process),
            RowOutcome::Invalid(_) => None,
        }
    }
}

/// Counters reported after a batch is persisted
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct PersistSummary {
    pub imported: usize,
    pub failed: usize,
}
