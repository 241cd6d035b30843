//! CSV and XLSX Readers with Column Type Inference
//!
//! Readings arrive as spreadsheet workbooks or CSV exports of them. Each
//! column is typed from its cell text the same way the upstream tooling
//! types spreadsheet columns:
//! all-integer columns are ints, numeric columns with decimals or blanks are
//! floats, `True`/`False` columns are bools, everything else is text.

use crate::error::DataError;
use crate::table::{Column, ColumnData, Table};
use calamine::{Data, Reader, Xlsx};
use csv::{ReaderBuilder, Trim};
use std::io::Cursor;
use tracing::debug;

/// Parse CSV bytes (with a header row) into a typed table
pub fn read_csv(bytes: &[u8]) -> Result<Table, DataError> {
    let mut reader = ReaderBuilder::new()
        .has_headers(true)
        .trim(Trim::All)
        .from_reader(bytes);

    let headers: Vec<String> = reader.headers()?.iter().map(str::to_string).collect();
    let mut raw: Vec<Vec<String>> = vec![Vec::new(); headers.len()];

    for record in reader.records() {
        let record = record?;
        if record.len() != headers.len() {
            return Err(DataError::Csv(format!(
                "record has {} fields, header has {}",
                record.len(),
                headers.len()
            )));
        }
        for (cells, value) in raw.iter_mut().zip(record.iter()) {
            cells.push(value.to_string());
        }
    }

    let table = build_table(headers, raw)?;
    debug!(
        "Parsed CSV: {} rows x {} columns",
        table.n_rows(),
        table.n_columns()
    );
    Ok(table)
}

/// Parse the first worksheet of an XLSX workbook (header in the first row)
pub fn read_xlsx(bytes: &[u8]) -> Result<Table, DataError> {
    let mut workbook: Xlsx<_> = calamine::open_workbook_from_rs(Cursor::new(bytes))?;
    let range = workbook
        .worksheet_range_at(0)
        .ok_or_else(|| DataError::Spreadsheet("workbook has no worksheets".to_string()))??;

    let mut rows = range.rows();
    let headers: Vec<String> = match rows.next() {
        Some(header) => header.iter().map(cell_text).collect(),
        None => return Ok(Table::default()),
    };
    let mut raw: Vec<Vec<String>> = vec![Vec::new(); headers.len()];
    for row in rows {
        for (cells, cell) in raw.iter_mut().zip(row) {
            cells.push(cell_text(cell));
        }
    }

    let table = build_table(headers, raw)?;
    debug!(
        "Parsed XLSX: {} rows x {} columns",
        table.n_rows(),
        table.n_columns()
    );
    Ok(table)
}

fn build_table(headers: Vec<String>, raw: Vec<Vec<String>>) -> Result<Table, DataError> {
    let columns = headers
        .into_iter()
        .zip(raw)
        .map(|(name, cells)| Column::new(name, infer_column(&cells)))
        .collect();
    Table::from_columns(columns)
}

/// Cell as the text a CSV export would hold. Error cells count as missing.
fn cell_text(cell: &Data) -> String {
    match cell {
        Data::Empty | Data::Error(_) => String::new(),
        Data::Bool(true) => "True".to_string(),
        Data::Bool(false) => "False".to_string(),
        Data::String(s) => s.trim().to_string(),
        other => other.to_string(),
    }
}

fn is_missing(cell: &str) -> bool {
    matches!(cell, "" | "NA" | "NaN" | "nan" | "null")
}

fn parse_bool(cell: &str) -> Option<bool> {
    match cell {
        "True" | "true" | "TRUE" => Some(true),
        "False" | "false" | "FALSE" => Some(false),
        _ => None,
    }
}

/// Pick the narrowest type that holds every cell
fn infer_column(cells: &[String]) -> ColumnData {
    let present: Vec<&str> = cells
        .iter()
        .map(String::as_str)
        .filter(|c| !is_missing(c))
        .collect();
    let has_missing = present.len() != cells.len();

    if present.is_empty() {
        return ColumnData::Float(vec![f64::NAN; cells.len()]);
    }

    if !has_missing && present.iter().all(|c| c.parse::<i64>().is_ok()) {
        return ColumnData::Int(cells.iter().filter_map(|c| c.parse().ok()).collect());
    }

    if present.iter().all(|c| c.parse::<f64>().is_ok()) {
        return ColumnData::Float(
            cells
                .iter()
                .map(|c| c.parse::<f64>().unwrap_or(f64::NAN))
                .collect(),
        );
    }

    if !has_missing && present.iter().all(|c| parse_bool(c).is_some()) {
        return ColumnData::Bool(cells.iter().filter_map(|c| parse_bool(c)).collect());
    }

    ColumnData::Text(cells.to_vec())
}
