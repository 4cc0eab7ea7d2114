pub mod aggregate;
pub mod cli;
pub mod columns;
pub mod data;
pub mod error;
pub mod ingest;
pub mod io_utils;
pub mod report;
pub mod service;
pub mod store;
pub mod table;

use std::{env, path::PathBuf, sync::OnceLock};

use anyhow::{Context, Result, anyhow, bail};
use clap::Parser;
use log::{LevelFilter, debug, info};

use crate::{
    cli::{Cli, Commands},
    ingest::IngestOptions,
    service::UploadOutcome,
    store::{BatchStore, JsonFileStore},
};

static LOGGER: OnceLock<()> = OnceLock::new();

fn init_logging() {
    LOGGER.get_or_init(|| {
        let mut builder = env_logger::Builder::from_env(env_logger::Env::default());
        if env::var("RUST_LOG").is_err() {
            builder.filter_module("sales_analyzer", LevelFilter::Info);
        }
        let _ = builder.format_timestamp_millis().try_init();
    });
}

pub fn run() -> Result<()> {
    init_logging();
    let cli = Cli::parse();
    match cli.command {
        Commands::Upload(args) => handle_upload(&args),
        Commands::Download(args) => handle_download(&args),
        Commands::History(args) => handle_history(&args),
    }
}

fn handle_upload(args: &cli::UploadArgs) -> Result<()> {
    let file_name = match &args.file_name {
        Some(name) => name.clone(),
        None if io_utils::is_dash(&args.input) => {
            bail!("Reading from stdin requires --file-name to detect the file type")
        }
        None => args
            .input
            .file_name()
            .and_then(|name| name.to_str())
            .map(str::to_string)
            .ok_or_else(|| anyhow!("Input path {:?} has no file name", args.input))?,
    };
    let options = IngestOptions {
        delimiter: args.delimiter.unwrap_or(io_utils::DEFAULT_CSV_DELIMITER),
        encoding: io_utils::resolve_encoding(args.input_encoding.as_deref())?,
    };
    info!(
        "Uploading '{}' into store {:?}",
        args.input.display(),
        args.store
    );
    let bytes = io_utils::read_input(&args.input)?;
    let mut store = JsonFileStore::open(&args.store)
        .with_context(|| format!("Opening store {:?}", args.store))?;

    match service::upload(&mut store, &file_name, &bytes, &options) {
        UploadOutcome::Success { batch, summary } => {
            if args.json {
                let rendered =
                    serde_json::to_string_pretty(&summary).context("Serializing summary JSON")?;
                println!("{rendered}");
            } else {
                print!("{}", summary.render_text());
            }
            info!(
                "Upload batch {batch} succeeded with {} record(s)",
                summary.total_records
            );
            Ok(())
        }
        UploadOutcome::Failed { message, .. } => Err(anyhow!(message)),
    }
}

fn handle_download(args: &cli::DownloadArgs) -> Result<()> {
    let store = JsonFileStore::open(&args.store)
        .with_context(|| format!("Opening store {:?}", args.store))?;
    let response = service::download(&store, &args.file_type);
    if !response.is_success() {
        bail!(
            "Download failed ({}): {}",
            response.status,
            response.body_text()
        );
    }
    let output = args
        .output
        .clone()
        .unwrap_or_else(|| PathBuf::from(format!("analysis_result.{}", args.file_type)));
    debug!(
        "Writing {} byte(s) of {} to {:?}",
        response.body.len(),
        response.content_type,
        output
    );
    io_utils::write_output(Some(&output), &response.body)?;
    if !io_utils::is_dash(&output) {
        info!("Analysis written to {:?}", output);
    }
    Ok(())
}

fn handle_history(args: &cli::HistoryArgs) -> Result<()> {
    let store = JsonFileStore::open(&args.store)
        .with_context(|| format!("Opening store {:?}", args.store))?;
    let batches = store.batches()?;
    if batches.is_empty() {
        info!("No uploads recorded in {:?}", args.store);
        return Ok(());
    }
    let mut rows = Vec::with_capacity(batches.len());
    for batch in &batches {
        let records = store.records_for_batch(batch.id)?.len();
        rows.push(vec![
            batch.id.to_string(),
            batch.file_name.clone(),
            batch.status.to_string(),
            batch.created_at.format("%Y-%m-%d %H:%M:%S").to_string(),
            records.to_string(),
            batch.error_message.clone().unwrap_or_default(),
        ]);
    }
    let headers = vec![
        "id".to_string(),
        "file".to_string(),
        "status".to_string(),
        "uploaded_at".to_string(),
        "records".to_string(),
        "error".to_string(),
    ];
    table::print_table(&headers, &rows);
    info!("Listed {} upload(s)", batches.len());
    Ok(())
}
