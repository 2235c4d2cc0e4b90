//! One-shot entry points: ask a question, get the rendered answer.
//!
//! These wrap a throwaway [`Session`] for callers that do not need to keep
//! state between questions (scripts, the CLI, batch jobs).

use crate::config::TutorConfig;
use crate::error::TutorError;
use crate::export::write_output;
use crate::output::{SolveOutput, SolveStats};
use crate::pipeline::input::ImageAttachment;
use crate::session::Session;
use std::path::Path;
use tracing::info;

/// Title of exported HTML documents.
pub const DOCUMENT_TITLE: &str = "Physics solution";

/// Ask one question (text, image or both) and render the answer.
///
/// # Errors
/// - [`TutorError::EmptyRequest`] when both inputs are empty; no call is made
/// - any service error from the model call
///
/// # Example
/// ```rust,no_run
/// use physics_tutor::{ask, TutorConfig};
///
/// #[tokio::main]
/// async fn main() -> Result<(), Box<dyn std::error::Error>> {
///     let config = TutorConfig::builder()
///         .api_key(std::env::var("GEMINI_API_KEY")?)
///         .build()?;
///     let out = ask(Some("A ball is thrown at 45° with 20 m/s. Range?".into()), None, &config).await?;
///     println!("{}", out.answer);
///     Ok(())
/// }
/// ```
pub async fn ask(
    text: Option<String>,
    image: Option<ImageAttachment>,
    config: &TutorConfig,
) -> Result<SolveOutput, TutorError> {
    let session = Session::new(config.clone())?;
    let outcome = session.submit(text, image).await?;
    let rendered = session
        .rendered()
        .ok_or_else(|| TutorError::Internal("answer vanished before rendering".into()))?;

    if !rendered.warnings.is_empty() {
        info!(
            "{} math expression(s) could not be rendered and are shown as text",
            rendered.warnings.len()
        );
    }

    Ok(SolveOutput {
        answer: outcome.answer,
        rendered,
        stats: outcome.stats,
    })
}

/// Synchronous wrapper around [`ask`].
///
/// Creates a temporary tokio runtime internally.
pub fn ask_sync(
    text: Option<String>,
    image: Option<ImageAttachment>,
    config: &TutorConfig,
) -> Result<SolveOutput, TutorError> {
    tokio::runtime::Runtime::new()
        .map_err(|e| TutorError::Internal(format!("Failed to create tokio runtime: {}", e)))?
        .block_on(ask(text, image, config))
}

/// Ask a question and write the rendered answer as a standalone HTML page.
///
/// The file is written atomically (temp file + rename).
pub async fn ask_to_file(
    text: Option<String>,
    image: Option<ImageAttachment>,
    output_path: impl AsRef<Path>,
    config: &TutorConfig,
) -> Result<SolveStats, TutorError> {
    let output = ask(text, image, config).await?;
    let path = output_path.as_ref().to_path_buf();
    let document = output.rendered.to_document(DOCUMENT_TITLE);

    write_output(path, document.into_bytes()).await?;

    Ok(output.stats)
}
