//! Upload and download flows, independent of any HTTP framework.
//!
//! `upload` is the `POST /` handler: it ingests a file into a new batch and
//! returns the display summary. `download` is `GET /download/{file_type}`: it
//! re-aggregates the latest successful batch and returns an export file.

use log::{info, warn};

use crate::{
    aggregate::aggregate,
    ingest::{IngestOptions, ingest},
    report::{self, DisplaySummary, ExportKind, Report},
    store::{BatchId, BatchStatus, BatchStore},
};

pub const INVALID_FILE_TYPE: &str = "Invalid file type requested.";
pub const NO_SUCCESSFUL_UPLOADS: &str = "No successful uploads to download analysis.";
pub const NO_SALES_DATA: &str = "No sales data found for last upload.";

#[derive(Debug, Clone)]
pub enum UploadOutcome {
    Success {
        batch: BatchId,
        summary: DisplaySummary,
    },
    /// The batch was marked `Failed`; `message` is the user-facing text.
    Failed { batch: Option<BatchId>, message: String },
}

impl UploadOutcome {
    fn failed(batch: Option<BatchId>, err: impl std::fmt::Display) -> Self {
        UploadOutcome::Failed {
            batch,
            message: format!("Upload failed: {err}"),
        }
    }
}

/// A plain response: status code, optional attachment headers, and body.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Response {
    pub status: u16,
    pub content_type: &'static str,
    pub content_disposition: Option<String>,
    pub body: Vec<u8>,
}

impl Response {
    fn plain(status: u16, message: &str) -> Self {
        Self {
            status,
            content_type: "text/plain",
            content_disposition: None,
            body: message.as_bytes().to_vec(),
        }
    }

    fn attachment(content_type: &'static str, extension: &str, body: Vec<u8>) -> Self {
        Self {
            status: 200,
            content_type,
            content_disposition: Some(format!(
                "attachment; filename=analysis_result.{extension}"
            )),
            body,
        }
    }

    pub fn is_success(&self) -> bool {
        (200..300).contains(&self.status)
    }

    pub fn body_text(&self) -> String {
        String::from_utf8_lossy(&self.body).into_owned()
    }
}

/// Creates a pending batch, ingests `bytes`, and commits every record or none.
pub fn upload<S: BatchStore + ?Sized>(
    store: &mut S,
    file_name: &str,
    bytes: &[u8],
    options: &IngestOptions,
) -> UploadOutcome {
    let batch = match store.create_batch(file_name) {
        Ok(batch) => batch,
        Err(err) => {
            warn!("Could not register upload '{file_name}': {err:#}");
            return UploadOutcome::failed(None, format!("{err:#}"));
        }
    };

    let commit = ingest(file_name, bytes, options)
        .map_err(anyhow::Error::from)
        .and_then(|records| {
            let summary = DisplaySummary::from(&aggregate(&records)?);
            store.complete_batch(batch, records)?;
            Ok(summary)
        });

    match commit {
        Ok(summary) => {
            info!(
                "Batch {batch} ('{file_name}') stored {} record(s)",
                summary.total_records
            );
            UploadOutcome::Success { batch, summary }
        }
        Err(err) => {
            let message = format!("{err:#}");
            warn!("Batch {batch} ('{file_name}') failed: {message}");
            if let Err(mark_err) =
                store.mark_batch_status(batch, BatchStatus::Failed, Some(message.clone()))
            {
                warn!("Could not mark batch {batch} as failed: {mark_err:#}");
            }
            UploadOutcome::failed(Some(batch), message)
        }
    }
}

/// Exports the analysis of the latest successful batch as `xlsx` or `csv`.
pub fn download<S: BatchStore + ?Sized>(store: &S, file_type: &str) -> Response {
    let kind = match file_type.parse::<ExportKind>() {
        Ok(kind @ (ExportKind::Spreadsheet | ExportKind::DelimitedText)) => kind,
        Ok(ExportKind::Display) | Err(_) => return Response::plain(400, INVALID_FILE_TYPE),
    };

    let batch = match store.last_successful_batch() {
        Ok(Some(batch)) => batch,
        Ok(None) => return Response::plain(404, NO_SUCCESSFUL_UPLOADS),
        Err(err) => return internal_error(&err),
    };
    let records = match store.records_for_batch(batch) {
        Ok(records) if records.is_empty() => return Response::plain(404, NO_SALES_DATA),
        Ok(records) => records,
        Err(err) => return internal_error(&err),
    };

    let result = match aggregate(&records) {
        Ok(result) => result,
        Err(err) => return internal_error(&anyhow::Error::from(err)),
    };
    match report::render(&result, kind) {
        Ok(rendered) => {
            info!(
                "Exported batch {batch} as {file_type} ({} record(s))",
                result.grand_count
            );
            into_response(rendered, kind)
        }
        Err(err) => internal_error(&anyhow::Error::from(err)),
    }
}

fn into_response(rendered: Report, kind: ExportKind) -> Response {
    let content_type = kind.content_type().unwrap_or("text/plain");
    let extension = kind.extension().unwrap_or("txt");
    match rendered {
        Report::Spreadsheet(bytes) => Response::attachment(content_type, extension, bytes),
        Report::DelimitedText(text) => {
            Response::attachment(content_type, extension, text.into_bytes())
        }
        Report::Display(summary) => Response::plain(200, &summary.render_text()),
    }
}

fn internal_error(err: &anyhow::Error) -> Response {
    warn!("Download failed: {err:#}");
    Response::plain(500, &format!("{err:#}"))
}
