//! Row validation: grid rows -> typed import outcomes
//!
//! Every check runs on every row, so one message can list several problems.
//! Nothing here touches the database; flows are resolved up front by the caller.

use crate::types::{FlowRef, NewProcess, RawRow, RowOutcome, ValidatedRow};

use super::headers::HeaderIndexMap;
use super::ingest::Grid;

pub const RECORD_DIGITS: usize = 20;
pub const MAX_NICKNAME_CHARS: usize = 50;

/// Label used when a row carries no priority
pub const NO_PRIORITY_LABEL: &str = "Sem prioridade";

/// Priority aliases in precedence order; first match wins
const PRIORITY_TABLE: &[(&[&str], i32)] = &[
    (&[NO_PRIORITY_LABEL, ""], 0),
    (&["Idoso", "Idosa(a) maior de 80 anos"], 4),
    (&["Art. 1048, II", "ECA"], 1),
    (&["Art. 1048, IV", "Licitação"], 2),
    (&["Art. 7 - 12.016/2009"], 3),
    (&["Doença grave", "Portador(a) de doença grave"], 7),
    (&["Deficiente", "Pessoa com deficiencia"], 5),
    (&["Situação rua", "Pessoa em situação de rua"], 6),
    (&["Réu Preso", "Réu preso", "preso"], 8),
];

/// Resolve a priority label to its id. An absent label is "no priority".
pub fn resolve_priority(label: Option<&str>) -> Option<i32> {
    let label = label.unwrap_or(NO_PRIORITY_LABEL);
    PRIORITY_TABLE
        .iter()
        .find(|(aliases, _)| aliases.contains(&label))
        .map(|(_, id)| *id)
}

/// Strip punctuation from a record number. Returns the digits only when they
/// form the canonical 20-digit shape (no check-digit verification).
pub fn normalize_record(raw: &str) -> Option<String> {
    let digits: String = raw.chars().filter(char::is_ascii_digit).collect();
    (digits.len() == RECORD_DIGITS).then_some(digits)
}

/// Validate one extracted row against the pre-fetched flows
pub fn validate_row(raw: &RawRow, flows: &[FlowRef]) -> RowOutcome {
    let mut messages = Vec::new();

    if raw.record.is_none() {
        messages.push("Número processo vazio".to_string());
    }
    if raw.flow.is_none() {
        messages.push("Fluxo vazio".to_string());
    }

    let flow = raw.flow.as_deref().and_then(|label| {
        let found = flows.iter().find(|f| f.name == label);
        if found.is_none() {
            messages.push(format!("Fluxo {} inválido", label));
        }
        found
    });

    let record = raw.record.as_deref().and_then(|value| {
        let normalized = normalize_record(value);
        if normalized.is_none() {
            messages.push(format!("Número de processo {} fora do padrão CNJ", value));
        }
        normalized
    });

    if raw
        .nickname
        .as_deref()
        .is_some_and(|n| n.chars().count() > MAX_NICKNAME_CHARS)
    {
        messages.push(format!(
            "Apelido não pode exceder os {} caracteres",
            MAX_NICKNAME_CHARS
        ));
    }

    let priority_id = resolve_priority(raw.priority.as_deref());
    if priority_id.is_none() {
        messages.push(format!(
            "Prioridade {} não encontrada",
            raw.priority.as_deref().unwrap_or_default()
        ));
    }

    match (messages.is_empty(), flow, record, priority_id) {
        (true, Some(flow), Some(record), Some(priority_id)) => RowOutcome::Valid(NewProcess {
            record,
            flow_id: flow.id,
            unit_id: flow.unit_id,
            priority_id,
            nickname: raw.nickname.clone(),
            finalised: false,
        }),
        _ => RowOutcome::Invalid(messages),
    }
}

fn extract_row(cells: &[Option<String>], headers: &HeaderIndexMap) -> RawRow {
    let at = |idx: Option<usize>| idx.and_then(|i| cells.get(i).cloned().flatten());
    RawRow {
        record: at(Some(headers.record)),
        flow: at(Some(headers.flow)),
        nickname: at(headers.nickname),
        priority: at(headers.priority),
    }
}

/// Raw rows below the header, keyed by their index relative to the first data row.
/// Rows without any tracked value are skipped.
pub fn extract_rows(grid: &Grid, headers: &HeaderIndexMap) -> Vec<(i32, RawRow)> {
    grid.rows
        .iter()
        .skip(headers.header_row + 1)
        .enumerate()
        .map(|(idx, cells)| (idx as i32, extract_row(cells, headers)))
        .filter(|(_, raw)| !raw.is_blank())
        .collect()
}

/// Distinct flow labels of a grid, in first-seen order
pub fn distinct_flow_names(rows: &[(i32, RawRow)]) -> Vec<String> {
    let mut names: Vec<String> = Vec::new();
    for (_, raw) in rows {
        if let Some(flow) = &raw.flow {
            if !names.contains(flow) {
                names.push(flow.clone());
            }
        }
    }
    names
}

/// Validate extracted rows against the flows resolved for them, preserving file order
pub fn validate_rows(rows: Vec<(i32, RawRow)>, flows: &[FlowRef]) -> Vec<ValidatedRow> {
    rows.into_iter()
        .map(|(row_index, raw)| {
            let outcome = validate_row(&raw, flows);
            ValidatedRow { row_index, raw, outcome }
        })
        .collect()
}
