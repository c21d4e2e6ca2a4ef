//! CSV <-> XLSX conversions
//!
//! Uploaded CSV files are turned into a single-sheet workbook before parsing so
//! every upload goes through the same workbook reader. The reverse direction
//! serves the "download original as CSV" request.

use std::io::Cursor;

use calamine::{open_workbook_auto_from_rs, Reader};
use rust_xlsxwriter::Workbook;

use crate::error::ImportError;

use super::ingest::cell_string;

/// Sheet name given to workbooks converted from CSV
pub const CSV_SHEET_NAME: &str = "Planilha1";

/// Pick `;` or `,` from the first line, whichever appears more often.
/// Spreadsheets exported with a Portuguese locale use `;`.
fn detect_delimiter(data: &[u8]) -> u8 {
    let first_line = data.split(|b| *b == b'\n').next().unwrap_or_default();
    let semicolons = first_line.iter().filter(|b| **b == b';').count();
    let commas = first_line.iter().filter(|b| **b == b',').count();
    if semicolons > commas {
        b';'
    } else {
        b','
    }
}

/// Convert a CSV upload into an in-memory XLSX workbook with one sheet.
/// Every non-empty field is written as a string cell so long record numbers
/// keep all their digits.
pub fn csv_to_xlsx(data: &[u8]) -> Result<Vec<u8>, ImportError> {
    let data = data.strip_prefix(b"\xEF\xBB\xBF").unwrap_or(data);

    let mut reader = csv::ReaderBuilder::new()
        .delimiter(detect_delimiter(data))
        .has_headers(false)
        .flexible(true)
        .from_reader(data);

    let mut workbook = Workbook::new();
    let sheet = workbook.add_worksheet();
    sheet.set_name(CSV_SHEET_NAME)?;

    // Excel exports in a Portuguese locale are often Windows-1252; invalid
    // UTF-8 is decoded lossily and left for row validation to report.
    for (row_idx, record) in reader.byte_records().enumerate() {
        let record = record?;
        let row = u32::try_from(row_idx)
            .map_err(|_| ImportError::Parse("CSV com linhas demais".to_string()))?;
        for (col_idx, field) in record.iter().enumerate() {
            if field.is_empty() {
                continue;
            }
            let col = u16::try_from(col_idx)
                .map_err(|_| ImportError::Parse("CSV com colunas demais".to_string()))?;
            sheet.write_string(row, col, String::from_utf8_lossy(field))?;
        }
    }

    Ok(workbook.save_to_buffer()?)
}

/// Render the first worksheet of a workbook as comma-separated text
pub fn xlsx_to_csv(data: &[u8]) -> Result<Vec<u8>, ImportError> {
    let mut workbook = open_workbook_auto_from_rs(Cursor::new(data))?;
    let first = workbook
        .sheet_names()
        .first()
        .cloned()
        .ok_or_else(|| ImportError::Parse("Planilha sem abas".to_string()))?;
    let range = workbook.worksheet_range(&first)?;

    let mut writer = csv::WriterBuilder::new().flexible(true).from_writer(Vec::new());
    if let Some((start_row, start_col)) = range.start() {
        for _ in 0..start_row {
            writer.write_record([""])?;
        }
        for row in range.rows() {
            let mut fields: Vec<String> = vec![String::new(); start_col as usize];
            fields.extend(row.iter().map(|c| cell_string(c).unwrap_or_default()));
            writer.write_record(&fields)?;
        }
    }

    writer
        .into_inner()
        .map_err(|e| ImportError::Parse(e.to_string()))
}
