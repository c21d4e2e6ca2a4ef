//! Result spreadsheet for a processed batch
//!
//! One sheet: a merged summary banner, a header row, then one line per stored
//! row in the order the rows were written.

use anyhow::Result;
use chrono::{DateTime, FixedOffset, Utc};
use rust_xlsxwriter::{Color, Format, FormatAlign, Workbook};
use sqlx::PgPool;
use tracing::info;

use crate::db::queries;
use crate::error::ImportError;
use crate::types::ImportRow;

pub const REPORT_SHEET_NAME: &str = "RESULTADO";

const COLUMN_HEADERS: [&str; 6] = [
    "Número do Processo",
    "Apelido",
    "Fluxo",
    "Prioridade",
    "Status",
    "Mensagens",
];

const STATUS_COLUMN: usize = 4;
const MESSAGE_COLUMN: usize = 5;
const STATUS_COLUMN_WIDTH: usize = 15;
const WIDTH_PADDING: usize = 5;
const BANNER_HEIGHT: f64 = 90.0;

const ERROR_COLOR: u32 = 0xD62D2D;
const OK_COLOR: u32 = 0x34EB4C;

/// America/Sao_Paulo has no daylight saving time since 2019
const BRAZIL_OFFSET_SECS: i32 = 3 * 3600;

const MISSING: &str = "-";

pub struct ReportInput {
    pub name: String,
    pub imported_at: Option<DateTime<Utc>>,
    pub rows: Vec<ImportRow>,
}

fn format_brazilian(ts: Option<DateTime<Utc>>) -> String {
    ts.zip(FixedOffset::west_opt(BRAZIL_OFFSET_SECS))
        .map(|(ts, offset)| ts.with_timezone(&offset).format("%d/%m/%Y %H:%M:%S").to_string())
        .unwrap_or_else(|| MISSING.to_string())
}

fn or_missing(value: Option<&str>) -> String {
    match value {
        Some(v) if !v.is_empty() => v.to_string(),
        _ => MISSING.to_string(),
    }
}

fn banner_text(input: &ReportInput) -> String {
    let errors = input.rows.iter().filter(|r| r.status.is_error()).count();
    let imported = input.rows.len() - errors;
    format!(
        "RESULTADO IMPORTAÇÃO\n\nLote: {}\nData Importação: {}\nImportados: {}\nErro: {}",
        input.name,
        format_brazilian(input.imported_at),
        imported,
        errors
    )
}

fn row_cells(row: &ImportRow) -> [String; 6] {
    [
        or_missing(row.record.as_deref()),
        or_missing(row.nickname.as_deref()),
        or_missing(row.flow.as_deref()),
        or_missing(row.priority.as_deref()),
        row.status.report_label().to_string(),
        or_missing(row.message.as_deref()).replace("\\n", "\n"),
    ]
}

fn longest_line(text: &str) -> usize {
    text.split('\n').map(|line| line.chars().count()).max().unwrap_or(0)
}

/// Width per column: longest line found in the column plus padding. The
/// banner only counts towards the first column; the status column is fixed.
fn compute_column_widths(banner: &str, rows: &[[String; 6]]) -> [usize; 6] {
    let mut widths = [0usize; 6];
    widths[0] = longest_line(banner);

    let header: [String; 6] = COLUMN_HEADERS.map(str::to_string);
    for cells in std::iter::once(&header).chain(rows) {
        for (idx, cell) in cells.iter().enumerate() {
            widths[idx] = widths[idx].max(longest_line(cell));
        }
    }

    widths[STATUS_COLUMN] = STATUS_COLUMN_WIDTH;
    widths.map(|w| w + WIDTH_PADDING)
}

/// Render the report workbook
pub fn render_report(input: &ReportInput) -> Result<Vec<u8>> {
    let banner = banner_text(input);
    let rows: Vec<[String; 6]> = input.rows.iter().map(row_cells).collect();
    let widths = compute_column_widths(&banner, &rows);

    let banner_format = Format::new()
        .set_text_wrap()
        .set_align(FormatAlign::Center)
        .set_align(FormatAlign::VerticalCenter);
    let wrap_format = Format::new().set_text_wrap();
    let error_format = Format::new().set_font_color(Color::RGB(ERROR_COLOR));
    let ok_format = Format::new().set_font_color(Color::RGB(OK_COLOR));

    let mut workbook = Workbook::new();
    let sheet = workbook.add_worksheet();
    sheet.set_name(REPORT_SHEET_NAME)?;

    sheet.merge_range(0, 0, 0, (COLUMN_HEADERS.len() - 1) as u16, &banner, &banner_format)?;
    sheet.set_row_height(0, BANNER_HEIGHT)?;

    for (col, title) in COLUMN_HEADERS.iter().enumerate() {
        sheet.write_string(1, col as u16, *title)?;
    }

    for (idx, (row, cells)) in input.rows.iter().zip(&rows).enumerate() {
        let line = (idx + 2) as u32;
        for (col, value) in cells.iter().enumerate() {
            match col {
                STATUS_COLUMN => {
                    let format = if row.status.is_error() { &error_format } else { &ok_format };
                    sheet.write_string_with_format(line, col as u16, value, format)?;
                }
                MESSAGE_COLUMN => {
                    sheet.write_string_with_format(line, col as u16, value, &wrap_format)?;
                }
                _ => {
                    sheet.write_string(line, col as u16, value)?;
                }
            }
        }
    }

    for (col, width) in widths.iter().enumerate() {
        sheet.set_column_width(col as u16, *width as f64)?;
    }

    Ok(workbook.save_to_buffer()?)
}

/// Load a batch and render its report. Read-only.
pub async fn generate_report(pool: &PgPool, batch_id: i64) -> Result<Vec<u8>> {
    let (name, imported_at) = queries::batch::find_report_header(pool, batch_id)
        .await?
        .ok_or(ImportError::BatchNotFound(batch_id))?;
    let rows = queries::batch::rows_in_file_order(pool, batch_id).await?;

    let input = ReportInput {
        name,
        imported_at,
        rows,
    };
    let bytes = render_report(&input)?;
    info!("Generated report for batch {} ({} rows)", batch_id, input.rows.len());
    Ok(bytes)
}
