//! Exports of an answer: clipboard copy of the raw text and paginated PDF.

pub mod clipboard;
pub mod layout;
pub mod paginate;
pub mod pdf;

pub use clipboard::{copy_answer, ArboardClipboard, ClipboardSink};
pub use pdf::{AnswerRasterizer, PdfExporter, PdfReport, PdfiumExporter};

use crate::error::TutorError;
use crate::output::Answer;
use std::path::PathBuf;
use std::sync::Arc;
use tokio::task::JoinError;

/// Run a (blocking) PDF export off the async runtime's worker threads.
pub async fn export_pdf(
    exporter: Arc<dyn PdfExporter>,
    answer: Answer,
    path: PathBuf,
) -> Result<PdfReport, TutorError> {
    tokio::task::spawn_blocking(move || exporter.export(&answer, &path))
        .await
        .map_err(|e| TutorError::PdfExportFailed {
            detail: format!("export task panicked: {}", e),
        })?
}

/// Write `bytes` to `path` atomically on the blocking pool.
pub async fn write_output(path: PathBuf, bytes: Vec<u8>) -> Result<(), TutorError> {
    let target = path.clone();
    tokio::task::spawn_blocking(move || pdf::write_atomic(&target, &bytes))
        .await
        .map_err(|e| write_task_failed(path, e))?
}

fn write_task_failed(path: PathBuf, e: JoinError) -> TutorError {
    TutorError::OutputWriteFailed {
        path,
        source: std::io::Error::new(std::io::ErrorKind::Other, format!("write task panicked: {}", e)),
    }
}
