//! Progress-callback trait for submission and export events.
//!
//! Inject an [`Arc<dyn SubmissionProgressCallback>`] via
//! [`crate::config::TutorConfigBuilder::progress_callback`] to receive
//! events as a question is submitted, answered and exported. The CLI uses
//! it to drive a spinner; a GUI could toggle its "loading" affordance.
//!
//! # Example
//!
//! ```rust
//! use physics_tutor::{SubmissionProgressCallback, TutorConfig};
//! use std::sync::{Arc, atomic::{AtomicUsize, Ordering}};
//!
//! struct CountingCallback {
//!     answers: AtomicUsize,
//! }
//!
//! impl SubmissionProgressCallback for CountingCallback {
//!     fn on_answer(&self, generation: u64, answer_len: usize) {
//!         self.answers.fetch_add(1, Ordering::SeqCst);
//!         eprintln!("submission #{generation}: {answer_len} bytes");
//!     }
//! }
//!
//! let cb = Arc::new(CountingCallback { answers: AtomicUsize::new(0) });
//! let config = TutorConfig::builder()
//!     .progress_callback(cb as Arc<dyn SubmissionProgressCallback>)
//!     .build()
//!     .unwrap();
//! ```

use std::path::Path;
use std::sync::Arc;

/// Called by [`crate::session::Session`] as it drives a submission or export.
///
/// All methods have default no-op implementations so callers only override
/// what they care about. Implementations must be `Send + Sync`: a session can
/// be shared across tasks.
pub trait SubmissionProgressCallback: Send + Sync {
    /// Called after validation, just before the model request is sent.
    ///
    /// # Arguments
    /// * `generation`: request token of this submission
    /// * `parts`     : number of content parts in the request
    fn on_submit_start(&self, generation: u64, parts: usize) {
        let _ = (generation, parts);
    }

    /// Called when the model answered and the answer was stored.
    fn on_answer(&self, generation: u64, answer_len: usize) {
        let _ = (generation, answer_len);
    }

    /// Called when the submission failed (validation or service error).
    fn on_error(&self, generation: u64, error: &str) {
        let _ = (generation, error);
    }

    /// Called once the loading state has been reset, on every path.
    fn on_submit_finished(&self, generation: u64) {
        let _ = generation;
    }

    /// Called before a PDF export starts.
    fn on_export_start(&self, path: &Path) {
        let _ = path;
    }

    /// Called after a PDF export has been written.
    fn on_export_complete(&self, path: &Path, pages: usize) {
        let _ = (path, pages);
    }
}

/// A no-op implementation for callers that don't need progress events.
pub struct NoopProgressCallback;

impl SubmissionProgressCallback for NoopProgressCallback {}

/// Convenience alias matching the type stored in [`crate::config::TutorConfig`].
pub type ProgressCallback = Arc<dyn SubmissionProgressCallback>;
