//! Turns uploaded bytes into typed [`SalesRecord`]s.
//!
//! Ingestion is atomic: the first malformed row aborts the whole upload and no
//! records are returned.

use std::io::Cursor;

use calamine::{Data, DataType, Reader, open_workbook_auto_from_rs};
use chrono::NaiveDateTime;
use encoding_rs::{Encoding, UTF_8};
use log::debug;

use crate::{
    columns::{CanonicalField, ColumnMapping, resolve_columns},
    data::{AmountError, SalesRecord, decimal_from_f64, parse_sales_amount, parse_sales_date},
    error::AnalyzerError,
    io_utils::{self, DEFAULT_CSV_DELIMITER, FileKind},
};

#[derive(Debug, Clone, Copy)]
pub struct IngestOptions {
    pub delimiter: u8,
    pub encoding: &'static Encoding,
}

impl Default for IngestOptions {
    fn default() -> Self {
        Self {
            delimiter: DEFAULT_CSV_DELIMITER,
            encoding: UTF_8,
        }
    }
}

/// An untyped cell as read from the source file.
#[derive(Debug, Clone, PartialEq)]
pub enum RawCell {
    Empty,
    Text(String),
    Number(f64),
    DateTime(NaiveDateTime),
}

impl RawCell {
    fn display(&self) -> String {
        match self {
            RawCell::Empty => String::new(),
            RawCell::Text(text) => text.clone(),
            RawCell::Number(n) => n.to_string(),
            RawCell::DateTime(dt) => dt.format("%Y-%m-%d %H:%M:%S").to_string(),
        }
    }
}

impl From<&Data> for RawCell {
    fn from(cell: &Data) -> Self {
        match cell {
            Data::Empty => RawCell::Empty,
            Data::String(s) => RawCell::Text(s.clone()),
            Data::Int(i) => RawCell::Number(*i as f64),
            Data::Float(f) => RawCell::Number(*f),
            Data::Bool(b) => RawCell::Text(b.to_string()),
            Data::DateTime(_) | Data::DateTimeIso(_) => cell
                .as_datetime()
                .map(RawCell::DateTime)
                .unwrap_or_else(|| RawCell::Text(cell.to_string())),
            other => RawCell::Text(other.to_string()),
        }
    }
}

static EMPTY_CELL: RawCell = RawCell::Empty;

/// A header row plus data rows, each row aligned with the headers.
#[derive(Debug, Clone, Default)]
pub struct RawTable {
    pub headers: Vec<String>,
    pub rows: Vec<Vec<RawCell>>,
}

pub fn read_table(
    bytes: &[u8],
    kind: FileKind,
    options: &IngestOptions,
) -> Result<RawTable, AnalyzerError> {
    match kind {
        FileKind::DelimitedText => read_delimited(bytes, options),
        FileKind::Spreadsheet => read_spreadsheet(bytes),
    }
}

fn read_delimited(bytes: &[u8], options: &IngestOptions) -> Result<RawTable, AnalyzerError> {
    let mut reader = io_utils::open_csv_reader(bytes, options.delimiter);
    let headers = io_utils::reader_headers(&mut reader, options.encoding)?;
    let mut rows = Vec::new();
    for record in reader.byte_records() {
        let decoded = io_utils::decode_record(&record?, options.encoding)?;
        rows.push(
            decoded
                .into_iter()
                .map(|value| {
                    if value.is_empty() {
                        RawCell::Empty
                    } else {
                        RawCell::Text(value)
                    }
                })
                .collect(),
        );
    }
    Ok(RawTable { headers, rows })
}

fn read_spreadsheet(bytes: &[u8]) -> Result<RawTable, AnalyzerError> {
    let mut workbook = open_workbook_auto_from_rs(Cursor::new(bytes))?;
    let range = workbook
        .worksheet_range_at(0)
        .ok_or_else(|| AnalyzerError::MalformedInput("Workbook has no worksheets".into()))??;

    let mut rows = range.rows();
    let headers = match rows.next() {
        Some(header_row) => header_row
            .iter()
            .map(|cell| match cell {
                Data::Empty => String::new(),
                other => other.to_string(),
            })
            .collect::<Vec<_>>(),
        None => return Ok(RawTable::default()),
    };
    let rows = rows
        .filter(|row| row.iter().any(|cell| !matches!(cell, Data::Empty)))
        .map(|row| row.iter().map(RawCell::from).collect())
        .collect();
    Ok(RawTable { headers, rows })
}

/// Resolves the table's headers once, then converts every row.
pub fn normalize_table(table: &RawTable) -> Result<Vec<SalesRecord>, AnalyzerError> {
    let mapping = resolve_columns(&table.headers)?;
    debug!(
        "Column mapping: product_name='{}', sales='{}', date='{}'",
        mapping.header(CanonicalField::ProductName),
        mapping.header(CanonicalField::Sales),
        mapping.header(CanonicalField::Date)
    );
    table
        .rows
        .iter()
        .enumerate()
        .map(|(row_idx, row)| normalize_row(&mapping, row, row_idx + 2))
        .collect()
}

fn normalize_row(
    mapping: &ColumnMapping,
    row: &[RawCell],
    line: usize,
) -> Result<SalesRecord, AnalyzerError> {
    let cell = |field: CanonicalField| row.get(mapping.index(field)).unwrap_or(&EMPTY_CELL);

    let date = match cell(CanonicalField::Date) {
        RawCell::DateTime(dt) => dt.date(),
        RawCell::Text(text) => {
            parse_sales_date(text).ok_or_else(|| AnalyzerError::date_parse(line, text.as_str()))?
        }
        other => return Err(AnalyzerError::date_parse(line, other.display())),
    };

    let sales_cell = cell(CanonicalField::Sales);
    let parsed = match sales_cell {
        RawCell::Number(n) => decimal_from_f64(*n),
        RawCell::Text(text) => parse_sales_amount(text),
        _ => Err(AmountError::NotANumber),
    };
    let sales = parsed.map_err(|err| match err {
        AmountError::NotANumber => AnalyzerError::numeric_parse(line, sales_cell.display()),
        AmountError::OutOfRange => {
            AnalyzerError::amount_out_of_range(line, sales_cell.display())
        }
    })?;

    let product_name = cell(CanonicalField::ProductName).display();
    Ok(SalesRecord::new(product_name, sales, date))
}

/// Parses `bytes` according to the extension of `file_name` and normalizes
/// every row.
pub fn ingest(
    file_name: &str,
    bytes: &[u8],
    options: &IngestOptions,
) -> Result<Vec<SalesRecord>, AnalyzerError> {
    let kind = FileKind::from_file_name(file_name)?;
    let table = read_table(bytes, kind, options)?;
    debug!(
        "Read {} data row(s) with headers {:?} from '{}'",
        table.rows.len(),
        table.headers,
        file_name
    );
    normalize_table(&table)
}
