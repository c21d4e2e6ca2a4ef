//! Upload intake and stored file retrieval

use anyhow::Result;
use sqlx::PgPool;
use tracing::{debug, info};

use crate::db::queries;
use crate::error::ImportError;
use crate::types::NewBatch;

use super::convert::xlsx_to_csv;
use super::ingest::file_extension;
use super::report::generate_report;

/// Accepted upload MIME types and the extension each one is stored with
pub const ACCEPTED_MIME_TYPES: [(&str, &str); 4] = [
    ("application/vnd.openxmlformats-officedocument.spreadsheetml.sheet", "xlsx"),
    ("application/vnd.ms-excel", "xls"),
    ("text/csv", "csv"),
    ("application/csv", "csv"),
];

pub fn extension_for_mime(mime_type: &str) -> Option<&'static str> {
    ACCEPTED_MIME_TYPES
        .iter()
        .find(|(mime, _)| *mime == mime_type)
        .map(|(_, ext)| *ext)
}

/// Guess the MIME type from a file name, for callers that only have a path
pub fn mime_for_file_name(file_name: &str) -> Option<&'static str> {
    let ext = file_extension(file_name);
    ACCEPTED_MIME_TYPES
        .iter()
        .find(|(_, e)| *e == ext)
        .map(|(mime, _)| *mime)
}

/// Sanitise an uploaded file name: spaces become `_`, anything outside
/// `[A-Za-z0-9_.-]` is dropped and the extension is replaced with `extension`
/// (appended when the name has none).
pub fn format_file_name(file_name: &str, extension: &str) -> String {
    let cleaned: String = file_name
        .chars()
        .map(|c| if c == ' ' { '_' } else { c })
        .filter(|c| c.is_ascii_alphanumeric() || matches!(c, '_' | '-' | '.'))
        .collect();

    let stem = match cleaned.rsplit_once('.') {
        Some((stem, ext)) if !ext.is_empty() => stem,
        _ => cleaned.trim_end_matches('.'),
    };
    format!("{}.{}", stem, extension)
}

/// Validate an upload and turn it into a new `waiting` batch.
/// A blank display name falls back to the uploaded file name.
pub fn accept_upload(
    name: &str,
    file_name: &str,
    mime_type: &str,
    data: Vec<u8>,
    imported_by: &str,
) -> Result<NewBatch, ImportError> {
    if file_name.trim().is_empty() || data.is_empty() {
        return Err(ImportError::EmptyUpload);
    }

    let extension = extension_for_mime(mime_type)
        .ok_or_else(|| ImportError::UnsupportedFileType(mime_type.to_string()))?;

    let name = match name.trim() {
        "" => file_name.to_string(),
        trimmed => trimmed.to_string(),
    };

    Ok(NewBatch {
        name,
        file_name: format_file_name(file_name, extension),
        data,
        imported_by: imported_by.to_string(),
    })
}

/// Validate and store an upload. Returns the new batch id.
pub async fn create_upload(
    pool: &PgPool,
    name: &str,
    file_name: &str,
    mime_type: &str,
    data: Vec<u8>,
    imported_by: &str,
) -> Result<i64> {
    let batch = accept_upload(name, file_name, mime_type, data, imported_by)?;
    let id = queries::batch::create_batch(pool, &batch).await?;
    info!("Batch {} created from '{}' ({} bytes)", id, batch.file_name, batch.data.len());
    Ok(id)
}

/// Which stored artefact of a batch to retrieve
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum FileKind {
    /// The bytes exactly as uploaded
    Original,
    /// The original's first sheet as CSV text
    OriginalCsv,
    /// The generated result spreadsheet
    Report,
}

#[derive(Debug, Clone)]
pub struct StoredFile {
    pub file_name: String,
    pub data: Vec<u8>,
}

fn with_extension(file_name: &str, extension: &str) -> String {
    match file_name.rsplit_once('.') {
        Some((stem, _)) => format!("{}.{}", stem, extension),
        None => format!("{}.{}", file_name, extension),
    }
}

/// Convert the original upload to CSV. CSV uploads are returned untouched.
pub fn original_as_csv(file_name: &str, data: Vec<u8>) -> Result<StoredFile, ImportError> {
    if file_extension(file_name) == "csv" {
        return Ok(StoredFile {
            file_name: file_name.to_string(),
            data,
        });
    }

    let csv = xlsx_to_csv(&data)?;
    debug!("Converted '{}' to CSV ({} bytes)", file_name, csv.len());
    Ok(StoredFile {
        file_name: with_extension(file_name, "csv"),
        data: csv,
    })
}

pub async fn find_file(pool: &PgPool, batch_id: i64, kind: FileKind) -> Result<StoredFile> {
    let (file_name, data) = queries::batch::find_original_file(pool, batch_id)
        .await?
        .ok_or(ImportError::BatchNotFound(batch_id))?;

    let file = match kind {
        FileKind::Original => StoredFile { file_name, data },
        FileKind::OriginalCsv => original_as_csv(&file_name, data)?,
        FileKind::Report => StoredFile {
            file_name: format!("RESULTADO_{}", with_extension(&file_name, "xlsx")),
            data: generate_report(pool, batch_id).await?,
        },
    };

    Ok(file)
}
