//! Header row detection and column alias resolution

use crate::error::ImportError;

use super::ingest::Grid;

pub const RECORD_HEADERS: &[&str] = &["Número processo", "Número do Processo", "Processos"];
pub const FLOW_HEADERS: &[&str] = &["Fluxo", "Fluxos"];
pub const NICKNAME_HEADERS: &[&str] = &["Apelido", "Apelidos"];
pub const PRIORITY_HEADERS: &[&str] = &["Prioridade", "Prioridades", "prioridades"];

/// Position of the header row and of every recognised column
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct HeaderIndexMap {
    pub header_row: usize,
    pub record: usize,
    pub flow: usize,
    pub nickname: Option<usize>,
    pub priority: Option<usize>,
}

struct MandatoryColumn {
    aliases: &'static [&'static str],
    missing_message: &'static str,
}

const MANDATORY_COLUMNS: [MandatoryColumn; 2] = [
    MandatoryColumn {
        aliases: RECORD_HEADERS,
        missing_message: "Coluna processos não encontrada",
    },
    MandatoryColumn {
        aliases: FLOW_HEADERS,
        missing_message: "Coluna fluxos não encontrada",
    },
];

fn find_column(header: &[Option<String>], aliases: &[&str]) -> Option<usize> {
    header
        .iter()
        .position(|cell| cell.as_deref().is_some_and(|h| aliases.contains(&h)))
}

/// Locate the header row (first row with any non-empty cell) and map the
/// known columns. Missing mandatory columns fail the whole file.
pub fn resolve_headers(grid: &Grid) -> Result<HeaderIndexMap, ImportError> {
    let header_row = (0..grid.rows.len())
        .find(|&row| !grid.row_is_empty(row))
        .ok_or(ImportError::MissingHeader)?;
    let header = &grid.rows[header_row];

    let mut found = [None; 2];
    let mut missing = String::new();
    for (slot, column) in found.iter_mut().zip(MANDATORY_COLUMNS.iter()) {
        match find_column(header, column.aliases) {
            Some(idx) => *slot = Some(idx),
            None => {
                missing.push_str(column.missing_message);
                missing.push('\n');
            }
        }
    }

    match found {
        [Some(record), Some(flow)] => Ok(HeaderIndexMap {
            header_row,
            record,
            flow,
            nickname: find_column(header, NICKNAME_HEADERS),
            priority: find_column(header, PRIORITY_HEADERS),
        }),
        _ => Err(ImportError::HeaderValidation(missing.trim_end().to_string())),
    }
}
