use std::path::PathBuf;

use clap::{Args, Parser, Subcommand};

pub const DEFAULT_STORE: &str = "sales_store.json";

#[derive(Debug, Parser)]
#[command(author, version, about = "Analyze sales spreadsheets and CSV files", long_about = None)]
pub struct Cli {
    #[command(subcommand)]
    pub command: Commands,
}

#[derive(Debug, Subcommand)]
pub enum Commands {
    /// Ingest a .csv, .xlsx or .xls sales file and print its analysis
    Upload(UploadArgs),
    /// Export the analysis of the latest successful upload as xlsx or csv
    Download(DownloadArgs),
    /// List previous uploads and their status
    History(HistoryArgs),
}

#[derive(Debug, Args)]
pub struct UploadArgs {
    /// Sales file to ingest (`-` reads stdin; pair it with --file-name)
    #[arg(short = 'i', long = "input")]
    pub input: PathBuf,
    /// File name used for type detection and the upload log (defaults to the input name)
    #[arg(long = "file-name")]
    pub file_name: Option<String>,
    /// JSON file holding upload batches and their records
    #[arg(short, long, default_value = DEFAULT_STORE)]
    pub store: PathBuf,
    /// CSV delimiter character (supports ',', 'tab', ';', '|')
    #[arg(long, value_parser = parse_delimiter)]
    pub delimiter: Option<u8>,
    /// Character encoding of CSV input (defaults to utf-8)
    #[arg(long = "input-encoding")]
    pub input_encoding: Option<String>,
    /// Print the summary as JSON instead of tables
    #[arg(long)]
    pub json: bool,
}

#[derive(Debug, Args)]
pub struct DownloadArgs {
    /// Export format: xlsx or csv
    pub file_type: String,
    /// JSON file holding upload batches and their records
    #[arg(short, long, default_value = DEFAULT_STORE)]
    pub store: PathBuf,
    /// Output file (defaults to analysis_result.<file_type>; `-` writes stdout)
    #[arg(short = 'o', long = "output")]
    pub output: Option<PathBuf>,
}

#[derive(Debug, Args)]
pub struct HistoryArgs {
    /// JSON file holding upload batches and their records
    #[arg(short, long, default_value = DEFAULT_STORE)]
    pub store: PathBuf,
}

pub fn parse_delimiter(value: &str) -> Result<u8, String> {
    match value {
        "tab" | "\t" => Ok(b'\t'),
        "comma" | "," => Ok(b','),
        "|" | "pipe" => Ok(b'|'),
        ";" | "semicolon" => Ok(b';'),
        other => {
            let mut chars = other.chars();
            let first = chars
                .next()
                .ok_or_else(|| "Delimiter cannot be empty".to_string())?;
            if chars.next().is_some() {
                return Err("Delimiter must be a single character".to_string());
            }
            if !first.is_ascii() {
                return Err("Delimiter must be ASCII".to_string());
            }
            Ok(first as u8)
        }
    }
}
