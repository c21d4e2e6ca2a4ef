//! Tabular ingestion: uploaded binary -> one grid of optional cell strings per worksheet

use std::io::Cursor;

use calamine::{open_workbook_auto_from_rs, Data, Reader};
use tracing::debug;

use crate::error::ImportError;

use super::convert::csv_to_xlsx;

/// One worksheet as a dense grid anchored at A1. Empty cells are `None`.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct Grid {
    pub name: String,
    pub rows: Vec<Vec<Option<String>>>,
}

impl Grid {
    pub fn cell(&self, row: usize, col: usize) -> Option<&str> {
        self.rows.get(row)?.get(col)?.as_deref()
    }

    pub fn row_is_empty(&self, row: usize) -> bool {
        self.rows
            .get(row)
            .map_or(true, |cells| cells.iter().all(Option::is_none))
    }
}

pub(crate) fn cell_string(cell: &Data) -> Option<String> {
    match cell {
        Data::Empty => None,
        Data::String(s) if s.is_empty() => None,
        Data::String(s) => Some(s.clone()),
        Data::Float(v) => Some(v.to_string()),
        Data::Int(v) => Some(v.to_string()),
        Data::Bool(v) => Some(v.to_string()),
        other => Some(other.to_string()),
    }
}

/// Lowercased extension of a file name, `""` when there is none
pub fn file_extension(file_name: &str) -> String {
    match file_name.rsplit_once('.') {
        Some((_, ext)) => ext.to_lowercase(),
        None => String::new(),
    }
}

/// Parse an uploaded spreadsheet. CSV uploads (by extension) are converted to a
/// workbook first; anything else is handed to the workbook auto-detector.
pub fn ingest(data: &[u8], file_name: &str) -> Result<Vec<Grid>, ImportError> {
    let converted;
    let data = if file_extension(file_name) == "csv" {
        converted = csv_to_xlsx(data)?;
        debug!("Converted CSV '{}' to workbook ({} bytes)", file_name, converted.len());
        converted.as_slice()
    } else {
        data
    };

    let mut workbook = open_workbook_auto_from_rs(Cursor::new(data))?;

    let mut grids = Vec::new();
    for (name, range) in workbook.worksheets() {
        // calamine trims leading empty rows and columns; pad them back so
        // column positions and row indexes match what the operator sees.
        let rows = match range.start() {
            Some((start_row, start_col)) => {
                let mut rows: Vec<Vec<Option<String>>> = vec![Vec::new(); start_row as usize];
                for row in range.rows() {
                    let mut cells: Vec<Option<String>> = vec![None; start_col as usize];
                    cells.extend(row.iter().map(cell_string));
                    rows.push(cells);
                }
                rows
            }
            None => Vec::new(),
        };
        grids.push(Grid { name, rows });
    }

    if grids.is_empty() {
        return Err(ImportError::Parse("Planilha sem abas".to_string()));
    }

    Ok(grids)
}

#[cfg(test)]
mod tests {
    use super::*;
    use rust_xlsxwriter::Workbook;

    fn xlsx(sheets: Vec<(&str, Vec<(u32, u16, &str)>)>) -> Vec<u8> {
        let mut workbook = Workbook::new();
        for (name, cells) in sheets {
            let sheet = workbook.add_worksheet();
            sheet.set_name(name).unwrap();
            for (row, col, value) in cells {
                sheet.write_string(row, col, value).unwrap();
            }
        }
        workbook.save_to_buffer().unwrap()
    }

    #[test]
    fn test_file_extension_is_case_insensitive() {
        assert_eq!(file_extension("Lote Março.CSV"), "csv");
        assert_eq!(file_extension("lote.xlsx"), "xlsx");
        assert_eq!(file_extension("lote"), "");
    }

    #[test]
    fn test_ingest_keeps_every_worksheet() {
        let data = xlsx(vec![
            ("Civil", vec![(0, 0, "Processos"), (1, 0, "1")]),
            ("Penal", vec![(0, 0, "Processos"), (1, 0, "2")]),
        ]);
        let grids = ingest(&data, "lote.xlsx").unwrap();
        assert_eq!(grids.len(), 2);
        assert_eq!(grids[0].name, "Civil");
        assert_eq!(grids[1].cell(1, 0), Some("2"));
    }

    #[test]
    fn test_ingest_pads_leading_empty_rows_and_columns() {
        let data = xlsx(vec![("Planilha", vec![(2, 1, "Fluxo"), (3, 1, "Civil")])]);
        let grids = ingest(&data, "lote.xlsx").unwrap();
        let grid = &grids[0];
        assert!(grid.row_is_empty(0));
        assert!(grid.row_is_empty(1));
        assert_eq!(grid.cell(2, 0), None);
        assert_eq!(grid.cell(2, 1), Some("Fluxo"));
        assert_eq!(grid.cell(3, 1), Some("Civil"));
    }

    #[test]
    fn test_ingest_converts_csv_by_extension() {
        let grids = ingest(b"Processos,Fluxo\n1,Civil\n", "lote.csv").unwrap();
        assert_eq!(grids[0].cell(1, 1), Some("Civil"));
    }

    #[test]
    fn test_ingest_rejects_malformed_binary() {
        let err = ingest(b"\x00\x01\x02 definitely not a spreadsheet", "lote.xlsx").unwrap_err();
        assert!(matches!(err, ImportError::Parse(_)));
    }

    #[test]
    fn test_cell_string_formats_numbers_without_fraction() {
        assert_eq!(cell_string(&Data::Float(7.0)), Some("7".to_string()));
        assert_eq!(cell_string(&Data::Int(42)), Some("42".to_string()));
        assert_eq!(cell_string(&Data::String(String::new())), None);
        assert_eq!(cell_string(&Data::Empty), None);
    }
}
