//! Decoding of uploaded files into named tables.
//!
//! CSV uploads produce a single sheet called `CSV`. Workbooks (`.xlsx`,
//! `.xlsm`, `.xlsb`, `.xls`, `.ods`) produce one sheet per worksheet, in
//! workbook order. The first row of each sheet is its header.

use calamine::{open_workbook_auto_from_rs, Data, Reader};
use chrono::{NaiveDate, NaiveDateTime};
use std::collections::HashSet;
use std::io::Cursor;
use std::path::Path;
use tracing::{debug, trace};

use crate::error::{AppError, AppResult};
use crate::models::{CellValue, InputTable, Sheet};

pub const CSV_SHEET_NAME: &str = "CSV";

const WORKBOOK_EXTENSIONS: [&str; 5] = ["xlsx", "xlsm", "xlsb", "xls", "ods"];

pub fn is_workbook(file_name: &str) -> bool {
    Path::new(file_name)
        .extension()
        .and_then(|e| e.to_str())
        .is_some_and(|ext| {
            WORKBOOK_EXTENSIONS
                .iter()
                .any(|w| ext.eq_ignore_ascii_case(w))
        })
}

/// Decode an upload by its file name. Anything that is not a known workbook
/// extension is read as UTF-8 CSV.
pub fn parse_upload(file_name: &str, content: &[u8]) -> AppResult<Vec<Sheet>> {
    trace!(file_name, content_size = content.len(), "Decoding upload");
    if is_workbook(file_name) {
        parse_workbook(content)
    } else {
        parse_csv(content).map(|table| {
            vec![Sheet {
                name: CSV_SHEET_NAME.into(),
                table,
            }]
        })
    }
}

pub fn parse_csv(content: &[u8]) -> AppResult<InputTable> {
    let content = content.strip_prefix(b"\xEF\xBB\xBF").unwrap_or(content);
    let content_str = std::str::from_utf8(content)
        .map_err(|e| AppError::Upload(format!("CSV is not valid UTF-8: {}", e)))?;

    let mut reader = csv::ReaderBuilder::new()
        .has_headers(false)
        .flexible(true)
        .trim(csv::Trim::All)
        .from_reader(content_str.as_bytes());

    let mut records = reader.records();
    let header = match records.next() {
        Some(result) => result?,
        None => return Err(AppError::Upload("CSV has no header row".into())),
    };
    let columns = dedupe_headers(header.iter().map(str::to_string));

    let mut rows = Vec::new();
    for result in records {
        let record = result?;
        let row: Vec<CellValue> = record.iter().map(csv_cell).collect();
        if row.iter().all(CellValue::is_empty) {
            continue;
        }
        rows.push(row);
    }

    debug!(columns = columns.len(), rows = rows.len(), "CSV upload parsed");
    Ok(InputTable::new(columns, rows))
}

fn csv_cell(field: &str) -> CellValue {
    if field.is_empty() {
        CellValue::Empty
    } else {
        CellValue::Text(field.to_string())
    }
}

pub fn parse_workbook(content: &[u8]) -> AppResult<Vec<Sheet>> {
    let mut workbook = open_workbook_auto_from_rs(Cursor::new(content.to_vec()))
        .map_err(|e| AppError::Upload(format!("Could not open workbook: {}", e)))?;

    let mut sheets = Vec::new();
    for name in workbook.sheet_names() {
        let range = workbook
            .worksheet_range(&name)
            .map_err(|e| AppError::Upload(format!("Could not read sheet '{}': {}", name, e)))?;

        let mut rows = range.rows();
        let columns = match rows.next() {
            Some(header) => dedupe_headers(header.iter().map(|c| workbook_cell(c).to_text())),
            None => Vec::new(),
        };
        let rows: Vec<Vec<CellValue>> = rows
            .map(|row| row.iter().map(workbook_cell).collect::<Vec<_>>())
            .filter(|row| !row.iter().all(CellValue::is_empty))
            .collect();

        debug!(sheet = %name, columns = columns.len(), rows = rows.len(), "Worksheet parsed");
        sheets.push(Sheet {
            name,
            table: InputTable::new(columns, rows),
        });
    }

    if sheets.iter().all(|s| s.table.columns.is_empty()) {
        return Err(AppError::Upload("Workbook has no header row".into()));
    }
    Ok(sheets)
}

fn workbook_cell(cell: &Data) -> CellValue {
    match cell {
        Data::Empty => CellValue::Empty,
        Data::String(s) => csv_cell(s.trim()),
        Data::Int(i) => CellValue::Int(*i),
        Data::Float(f) => CellValue::Float(*f),
        Data::Bool(b) => CellValue::Bool(*b),
        Data::DateTime(dt) => dt
            .as_datetime()
            .map(CellValue::DateTime)
            .unwrap_or(CellValue::Empty),
        Data::DateTimeIso(s) => iso_cell(s),
        Data::DurationIso(s) => CellValue::Text(s.clone()),
        Data::Error(e) => {
            trace!(error = ?e, "Workbook cell holds an error value");
            CellValue::Empty
        }
    }
}

fn iso_cell(s: &str) -> CellValue {
    let s = s.trim();
    NaiveDateTime::parse_from_str(s, "%Y-%m-%dT%H:%M:%S%.f")
        .map(CellValue::DateTime)
        .or_else(|_| NaiveDate::parse_from_str(s, "%Y-%m-%d").map(CellValue::Date))
        .unwrap_or_else(|_| csv_cell(s))
}

/// Trim header names, name blank headers `Unnamed: <index>` and suffix
/// repeats with `.1`, `.2`, ...
pub fn dedupe_headers<I>(names: I) -> Vec<String>
where
    I: IntoIterator<Item = String>,
{
    let mut seen: HashSet<String> = HashSet::new();
    names
        .into_iter()
        .enumerate()
        .map(|(index, name)| {
            let name = name.trim();
            let base = if name.is_empty() {
                format!("Unnamed: {}", index)
            } else {
                name.to_string()
            };
            let mut candidate = base.clone();
            let mut n = 1;
            while seen.contains(&candidate) {
                candidate = format!("{}.{}", base, n);
                n += 1;
            }
            seen.insert(candidate.clone());
            candidate
        })
        .collect()
}
