//! I/O helpers shared by ingestion, export, and the command-line front end.
//!
//! - **File kind sniffing**: `.csv` uploads are delimited text, `.xlsx` and
//!   `.xls` uploads are spreadsheets; anything else is rejected.
//! - **Encoding**: CSV uploads are decoded through `encoding_rs`, defaulting
//!   to UTF-8.
//! - **Reader/writer construction**: `open_csv_reader` and `open_csv_writer`
//!   configure the `csv` crate the same way everywhere.
//! - **stdin/stdout**: the `-` path convention routes through standard streams.

use std::{
    fs::File,
    io::{self, BufWriter, Read, Write},
    path::Path,
};

use anyhow::{Context, Result, anyhow};
use csv::QuoteStyle;
use encoding_rs::{Encoding, UTF_8};

use crate::error::AnalyzerError;

pub const DEFAULT_CSV_DELIMITER: u8 = b',';

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum FileKind {
    DelimitedText,
    Spreadsheet,
}

impl FileKind {
    /// Chooses the parser family from the upload's file name extension.
    pub fn from_file_name(file_name: &str) -> Result<Self, AnalyzerError> {
        let extension = Path::new(file_name)
            .extension()
            .and_then(|ext| ext.to_str())
            .map(|ext| ext.to_ascii_lowercase());
        match extension.as_deref() {
            Some("csv") => Ok(FileKind::DelimitedText),
            Some("xlsx") | Some("xls") => Ok(FileKind::Spreadsheet),
            _ => Err(AnalyzerError::UnsupportedFileType {
                file_name: file_name.to_string(),
            }),
        }
    }
}

pub fn is_dash(path: &Path) -> bool {
    path == Path::new("-")
}

pub fn resolve_encoding(label: Option<&str>) -> Result<&'static Encoding> {
    if let Some(value) = label {
        Encoding::for_label(value.trim().as_bytes())
            .ok_or_else(|| anyhow!("Unknown encoding '{value}'"))
    } else {
        Ok(UTF_8)
    }
}

pub fn open_csv_reader<R>(reader: R, delimiter: u8) -> csv::Reader<R>
where
    R: Read,
{
    let mut builder = csv::ReaderBuilder::new();
    builder
        .has_headers(true)
        .delimiter(delimiter)
        .double_quote(true)
        .flexible(false);
    builder.from_reader(reader)
}

pub fn open_csv_writer<W>(writer: W, delimiter: u8) -> csv::Writer<W>
where
    W: Write,
{
    let mut builder = csv::WriterBuilder::new();
    builder
        .delimiter(delimiter)
        .quote_style(QuoteStyle::Necessary)
        .double_quote(true);
    builder.from_writer(writer)
}

pub fn decode_bytes(bytes: &[u8], encoding: &'static Encoding) -> Result<String, AnalyzerError> {
    let (text, _, had_errors) = encoding.decode(bytes);
    if had_errors {
        Err(AnalyzerError::MalformedInput(format!(
            "Failed to decode text with encoding {}",
            encoding.name()
        )))
    } else {
        Ok(text.into_owned())
    }
}

pub fn decode_record(
    record: &csv::ByteRecord,
    encoding: &'static Encoding,
) -> Result<Vec<String>, AnalyzerError> {
    record
        .iter()
        .map(|field| decode_bytes(field, encoding))
        .collect()
}

pub fn reader_headers<R>(
    reader: &mut csv::Reader<R>,
    encoding: &'static Encoding,
) -> Result<Vec<String>, AnalyzerError>
where
    R: Read,
{
    let headers = reader.byte_headers()?.clone();
    decode_record(&headers, encoding)
}

pub fn read_input(path: &Path) -> Result<Vec<u8>> {
    let mut bytes = Vec::new();
    if is_dash(path) {
        io::stdin()
            .lock()
            .read_to_end(&mut bytes)
            .context("Reading upload from stdin")?;
    } else {
        File::open(path)
            .with_context(|| format!("Opening input file {path:?}"))?
            .read_to_end(&mut bytes)
            .with_context(|| format!("Reading input file {path:?}"))?;
    }
    Ok(bytes)
}

pub fn write_output(path: Option<&Path>, bytes: &[u8]) -> Result<()> {
    let mut writer: Box<dyn Write> = match path {
        Some(p) if !is_dash(p) => Box::new(BufWriter::new(
            File::create(p).with_context(|| format!("Creating output file {p:?}"))?,
        )),
        _ => Box::new(io::stdout().lock()),
    };
    writer.write_all(bytes).context("Writing output")?;
    writer.flush().context("Flushing output")
}
