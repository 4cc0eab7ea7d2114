use rust_decimal::Decimal;
use thiserror::Error;

use crate::columns::CanonicalField;

/// Failures raised while ingesting an upload or rendering its analysis.
#[derive(Debug, Error)]
pub enum AnalyzerError {
    #[error("Invalid file type '{file_name}'. Please upload a .xlsx or .csv file.")]
    UnsupportedFileType { file_name: String },
    #[error("Required column for '{field}' not found. Expected one of: {}", format_aliases(.aliases))]
    MissingColumn {
        field: CanonicalField,
        aliases: &'static [&'static str],
    },
    #[error("Row {row}: failed to parse '{value}' as a date")]
    DateParse { row: usize, value: String },
    #[error("Row {row}: failed to parse '{value}' as a sales amount")]
    NumericParse { row: usize, value: String },
    #[error("Row {row}: sales amount '{value}' is outside the supported range of ±{}", Decimal::MAX)]
    AmountOutOfRange { row: usize, value: String },
    #[error("Sales total for {scope} exceeds the supported range of ±{}", Decimal::MAX)]
    AmountOverflow { scope: String },
    #[error("Unsupported export kind '{kind}'. Expected one of: xlsx, csv, display")]
    UnsupportedExportKind { kind: String },
    #[error("Malformed input: {0}")]
    MalformedInput(String),
    #[error("Failed to build spreadsheet: {0}")]
    Spreadsheet(String),
}

impl AnalyzerError {
    pub fn missing_column(field: CanonicalField) -> Self {
        Self::MissingColumn {
            field,
            aliases: field.aliases(),
        }
    }

    pub fn date_parse(row: usize, value: impl Into<String>) -> Self {
        Self::DateParse {
            row,
            value: value.into(),
        }
    }

    pub fn amount_out_of_range(row: usize, value: impl Into<String>) -> Self {
        Self::AmountOutOfRange {
            row,
            value: value.into(),
        }
    }

    pub fn amount_overflow(scope: impl Into<String>) -> Self {
        Self::AmountOverflow {
            scope: scope.into(),
        }
    }

    pub fn numeric_parse(row: usize, value: impl Into<String>) -> Self {
        Self::NumericParse {
            row,
            value: value.into(),
        }
    }
}

fn format_aliases(aliases: &[&str]) -> String {
    let quoted = aliases
        .iter()
        .map(|alias| format!("'{alias}'"))
        .collect::<Vec<_>>();
    format!("[{}]", quoted.join(", "))
}

impl From<csv::Error> for AnalyzerError {
    fn from(err: csv::Error) -> Self {
        Self::MalformedInput(err.to_string())
    }
}

impl From<calamine::Error> for AnalyzerError {
    fn from(err: calamine::Error) -> Self {
        Self::MalformedInput(err.to_string())
    }
}
