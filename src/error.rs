//! Error types for the physics-tutor library.
//!
//! Two distinct error types reflect two distinct failure modes:
//!
//! * [`TutorError`] is **fatal** for the operation that raised it: the
//!   submission, copy or export cannot complete (empty question, provider
//!   not configured, clipboard unavailable). Returned as `Err(TutorError)`
//!   from every public entry point. None of them is fatal to the process.
//!
//! * [`RenderError`] is **non-fatal**: a single LaTeX expression could not be
//!   rendered, but the rest of the answer is fine. Stored inside
//!   [`crate::output::RenderedAnswer::warnings`] while the expression stays
//!   visible as its original delimited text.
//!
//! [`TutorError::kind`] maps every variant onto the four-way taxonomy used
//! by front ends to decide how to surface it.

use std::path::PathBuf;
use thiserror::Error;

/// Message shown when a submission has neither text nor an image.
pub const EMPTY_REQUEST_MESSAGE: &str = "Please enter a question or upload an image.";

/// All operation-level errors returned by the physics-tutor library.
#[derive(Debug, Error)]
pub enum TutorError {
    // ── Validation errors ─────────────────────────────────────────────────
    /// Both the text and the image were empty.
    #[error("{}", EMPTY_REQUEST_MESSAGE)]
    EmptyRequest,

    /// Image file was not found at the given path.
    #[error("Image file not found: '{path}'\nCheck the path exists and is readable.")]
    ImageNotFound { path: PathBuf },

    /// Process does not have read permission on the file.
    #[error("Permission denied reading '{path}'\nTry: chmod +r {path:?}")]
    PermissionDenied { path: PathBuf },

    /// The file is not one of the accepted image types.
    #[error("Unsupported image '{path}': {detail}\nAccepted types: image/png, image/jpeg, image/webp")]
    UnsupportedImage { path: PathBuf, detail: String },

    /// Builder validation failed.
    #[error("Invalid configuration: {0}")]
    InvalidConfig(String),

    // ── Service errors ────────────────────────────────────────────────────
    /// The configured provider cannot be used (missing API key etc.).
    #[error("LLM provider '{provider}' is not configured.\n{hint}")]
    ProviderNotConfigured { provider: String, hint: String },

    /// The model API returned an error response.
    #[error("LLM API error: {message}")]
    LlmApiError { message: String },

    /// Model API returned HTTP 429.
    #[error("Rate limit exceeded for provider '{provider}'")]
    RateLimitExceeded {
        provider: String,
        retry_after_secs: Option<u64>,
    },

    /// The model call did not complete within the configured timeout.
    #[error("API call timed out after {elapsed_ms}ms")]
    ApiTimeout { elapsed_ms: u64 },

    /// Model API returned an authentication error (401/403).
    #[error("Authentication error from provider '{provider}': {detail}")]
    AuthError { provider: String, detail: String },

    /// The model answered but the response carried no text.
    #[error("The model returned an empty response ({reason})")]
    EmptyResponse { reason: String },

    /// A newer submission replaced this one before it completed.
    #[error("Submission #{generation} was superseded by a newer one")]
    Superseded { generation: u64 },

    // ── Export errors ─────────────────────────────────────────────────────
    /// Writing the answer to the system clipboard failed.
    #[error("Failed to copy to clipboard: {detail}")]
    ClipboardFailed { detail: String },

    /// Rasterising or paginating the answer failed.
    #[error("PDF export failed: {detail}")]
    PdfExportFailed { detail: String },

    /// Could not bind to a pdfium library.
    #[error(
        "Failed to bind to pdfium library: {0}\n\n\
PDFium is normally downloaded automatically on first export.\n\
If the auto-download failed, you can:\n\
  • Check your internet connection and try again.\n\
  • Set PDFIUM_LIB_PATH=/path/to/libpdfium to use an existing copy.\n"
    )]
    PdfiumBindingFailed(String),

    /// Could not create or write an output file.
    #[error("Failed to write output file '{path}': {source}")]
    OutputWriteFailed {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },

    /// There is no answer to copy or export yet.
    #[error("There is no answer yet; submit a question first")]
    NoAnswer,

    // ── Catch-all ─────────────────────────────────────────────────────────
    /// Unexpected internal error.
    #[error("Internal error: {0}")]
    Internal(String),
}

/// The four error categories a front end distinguishes.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ErrorKind {
    /// Bad input; handled locally, no service call was made.
    Validation,
    /// Network or model API failure at the call boundary.
    Service,
    /// A single expression failed to render (see [`RenderError`]).
    Render,
    /// Clipboard or PDF export failure.
    Export,
}

impl TutorError {
    /// Classify this error.
    pub fn kind(&self) -> ErrorKind {
        match self {
            TutorError::EmptyRequest
            | TutorError::ImageNotFound { .. }
            | TutorError::PermissionDenied { .. }
            | TutorError::UnsupportedImage { .. }
            | TutorError::InvalidConfig(_) => ErrorKind::Validation,

            TutorError::ProviderNotConfigured { .. }
            | TutorError::LlmApiError { .. }
            | TutorError::RateLimitExceeded { .. }
            | TutorError::ApiTimeout { .. }
            | TutorError::AuthError { .. }
            | TutorError::EmptyResponse { .. }
            | TutorError::Superseded { .. }
            | TutorError::Internal(_) => ErrorKind::Service,

            TutorError::ClipboardFailed { .. }
            | TutorError::PdfExportFailed { .. }
            | TutorError::PdfiumBindingFailed(_)
            | TutorError::OutputWriteFailed { .. }
            | TutorError::NoAnswer => ErrorKind::Export,
        }
    }

    /// Text suitable for showing to the student.
    ///
    /// Validation messages are shown as-is; service failures are prefixed so
    /// the underlying detail reads as the reason.
    pub fn user_message(&self) -> String {
        match self.kind() {
            ErrorKind::Validation => self.to_string(),
            ErrorKind::Service => format!("Failed to get a solution: {self}"),
            ErrorKind::Render | ErrorKind::Export => format!("Export failed: {self}"),
        }
    }
}

/// A non-fatal error for a single LaTeX expression.
#[derive(Debug, Clone, Error, PartialEq, serde::Serialize, serde::Deserialize)]
pub enum RenderError {
    /// The math renderer rejected the expression; it was left as literal text.
    #[error("Could not render {mode} math `{expression}`: {detail}")]
    MalformedExpression {
        expression: String,
        mode: MathMode,
        detail: String,
    },
}

/// Whether an expression was delimited as `$$...$$` or `$...$`.
#[derive(Debug, Clone, Copy, PartialEq, Eq, serde::Serialize, serde::Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum MathMode {
    Block,
    Inline,
}

impl std::fmt::Display for MathMode {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            MathMode::Block => f.write_str("block"),
            MathMode::Inline => f.write_str("inline"),
        }
    }
}

impl RenderError {
    pub fn kind(&self) -> ErrorKind {
        ErrorKind::Render
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn empty_request_is_validation() {
        let e = TutorError::EmptyRequest;
        assert_eq!(e.kind(), ErrorKind::Validation);
        assert_eq!(e.user_message(), EMPTY_REQUEST_MESSAGE);
    }

    #[test]
    fn service_message_includes_detail() {
        let e = TutorError::LlmApiError {
            message: "model overloaded".into(),
        };
        assert_eq!(e.kind(), ErrorKind::Service);
        let msg = e.user_message();
        assert!(msg.starts_with("Failed to get a solution"), "got: {msg}");
        assert!(msg.contains("model overloaded"), "got: {msg}");
    }

    #[test]
    fn rate_limit_display() {
        let e = TutorError::RateLimitExceeded {
            provider: "gemini".into(),
            retry_after_secs: Some(30),
        };
        assert!(e.to_string().contains("gemini"));
    }

    #[test]
    fn empty_response_display_with_reason() {
        let e = TutorError::EmptyResponse {
            reason: "SAFETY".into(),
        };
        assert_eq!(e.to_string(), "The model returned an empty response (SAFETY)");
    }

    #[test]
    fn clipboard_failure_is_export() {
        let e = TutorError::ClipboardFailed {
            detail: "no display".into(),
        };
        assert_eq!(e.kind(), ErrorKind::Export);
        assert!(e.user_message().contains("no display"));
    }

    #[test]
    fn render_error_display() {
        let e = RenderError::MalformedExpression {
            expression: r"\frac{a}{".into(),
            mode: MathMode::Block,
            detail: "unexpected end".into(),
        };
        assert_eq!(e.kind(), ErrorKind::Render);
        assert!(e.to_string().contains("block math"));
        assert!(e.to_string().contains(r"\frac{a}{"));
    }
}
