//! Interactive session state: the current answer, the last error and the
//! loading/saving flags a front end binds its controls to.
//!
//! ## Request tokens
//!
//! Every [`Session::submit`] takes a new generation number and cancels the
//! previous submission's [`CancellationToken`]. Only the submission holding
//! the current generation may write the answer or the error; anything older
//! finishes with [`TutorError::Superseded`] and leaves the state alone. This
//! replaces "disable the button while loading" with something that also
//! holds when several tasks share one session.
//!
//! ## Guards
//!
//! The loading and saving flags are reset by drop guards, so they return to
//! inactive on success, failure, supersession and panic alike. A superseded
//! submission's guard never clears the flag of its successor.

use crate::config::TutorConfig;
use crate::error::TutorError;
use crate::export::{self, ClipboardSink, PdfExporter, PdfReport};
use crate::output::{Answer, RenderedAnswer, SolveStats};
use crate::pipeline::input::{self, ImageAttachment};
use crate::pipeline::llm::{resolve_service, AnswerService, GenerateRequest};
use crate::progress::{NoopProgressCallback, ProgressCallback};
use crate::render::Renderer;
use once_cell::sync::OnceCell;
use std::path::PathBuf;
use std::sync::{Arc, Mutex, MutexGuard};
use std::time::Instant;
use tokio_util::sync::CancellationToken;
use tracing::{debug, info, warn};

/// A successfully committed submission.
#[derive(Debug, Clone)]
pub struct SubmitOutcome {
    pub generation: u64,
    pub answer: Answer,
    pub stats: SolveStats,
}

/// The rendered cache is shared so rendering can run outside the lock.
struct AnswerView {
    answer: Answer,
    rendered: Arc<OnceCell<RenderedAnswer>>,
}

impl AnswerView {
    fn new(answer: Answer) -> Self {
        Self {
            answer,
            rendered: Arc::new(OnceCell::new()),
        }
    }
}

#[derive(Default)]
struct SessionState {
    generation: u64,
    cancel: Option<CancellationToken>,
    loading: bool,
    saving: usize,
    answer: Option<AnswerView>,
    error: Option<String>,
}

/// One student's tutoring session.
pub struct Session {
    service: Arc<dyn AnswerService>,
    renderer: Renderer,
    config: TutorConfig,
    callback: ProgressCallback,
    state: Mutex<SessionState>,
}

impl std::fmt::Debug for Session {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Session")
            .field("service", &self.service.name())
            .field("generation", &self.generation())
            .field("loading", &self.is_loading())
            .finish()
    }
}

impl Session {
    /// Create a session, resolving the answer service from `config`.
    pub fn new(config: TutorConfig) -> Result<Self, TutorError> {
        let service = resolve_service(&config)?;
        let renderer = Renderer::from_config(&config);
        let callback = config
            .progress_callback
            .clone()
            .unwrap_or_else(|| Arc::new(NoopProgressCallback));
        Ok(Self {
            service,
            renderer,
            config,
            callback,
            state: Mutex::new(SessionState::default()),
        })
    }

    /// Replace the renderer (e.g. a different math backend).
    pub fn with_renderer(mut self, renderer: Renderer) -> Self {
        self.renderer = renderer;
        self
    }

    pub fn config(&self) -> &TutorConfig {
        &self.config
    }

    fn lock(&self) -> MutexGuard<'_, SessionState> {
        self.state.lock().unwrap_or_else(|e| e.into_inner())
    }

    // ── Submission ───────────────────────────────────────────────────────

    /// Validate the input, ask the model and store the answer.
    ///
    /// An empty submission is rejected before any service call; its message
    /// becomes the session error and the generation is not advanced.
    pub async fn submit(
        &self,
        text: Option<String>,
        image: Option<ImageAttachment>,
    ) -> Result<SubmitOutcome, TutorError> {
        let request = match input::collect(text, image) {
            Ok(request) => request,
            Err(e) => {
                let generation = {
                    let mut state = self.lock();
                    state.error = Some(e.user_message());
                    state.generation
                };
                self.callback.on_error(generation, &e.user_message());
                return Err(e);
            }
        };

        let parts = request.content_parts();
        let part_count = parts.len();
        let (generation, token) = self.begin();
        let _loading = LoadingGuard {
            session: self,
            generation,
        };

        info!(
            "Submission #{}: {} content part(s) to {}",
            generation,
            part_count,
            self.service.name()
        );
        self.callback.on_submit_start(generation, part_count);

        let call = GenerateRequest {
            parts,
            system_instruction: Arc::clone(&self.config.system_instruction),
        };
        let started = Instant::now();
        let result = tokio::select! {
            biased;
            _ = token.cancelled() => Err(TutorError::Superseded { generation }),
            response = self.service.generate(&call) => response,
        };
        let duration_ms = started.elapsed().as_millis() as u64;

        let committed = {
            let mut state = self.lock();
            if state.generation != generation {
                None
            } else {
                state.cancel = None;
                Some(match result {
                    Ok(response) => {
                        let answer = Answer::new(response.text);
                        state.answer = Some(AnswerView::new(answer.clone()));
                        state.error = None;
                        Ok(SubmitOutcome {
                            generation,
                            answer,
                            stats: SolveStats {
                                provider: self.service.name().to_string(),
                                model: self.config.model.clone(),
                                content_parts: part_count,
                                duration_ms,
                                input_tokens: response.input_tokens,
                                output_tokens: response.output_tokens,
                            },
                        })
                    }
                    Err(e) => {
                        state.answer = None;
                        state.error = Some(e.user_message());
                        Err(e)
                    }
                })
            }
        };

        match committed {
            None => {
                debug!("Submission #{} superseded; discarding its result", generation);
                Err(TutorError::Superseded { generation })
            }
            Some(Ok(outcome)) => {
                info!(
                    "Submission #{} answered in {}ms ({} bytes)",
                    generation,
                    duration_ms,
                    outcome.answer.len()
                );
                self.callback.on_answer(generation, outcome.answer.len());
                Ok(outcome)
            }
            Some(Err(e)) => {
                warn!("Submission #{} failed: {}", generation, e);
                self.callback.on_error(generation, &e.user_message());
                Err(e)
            }
        }
    }

    /// Take a new generation, cancel the previous one and enter loading.
    fn begin(&self) -> (u64, CancellationToken) {
        let token = CancellationToken::new();
        let mut state = self.lock();
        state.generation += 1;
        if let Some(previous) = state.cancel.replace(token.clone()) {
            previous.cancel();
        }
        state.loading = true;
        state.answer = None;
        state.error = None;
        (state.generation, token)
    }

    /// Abandon the in-flight submission, if any.
    pub fn cancel(&self) {
        let mut state = self.lock();
        if let Some(token) = state.cancel.take() {
            state.generation += 1;
            state.loading = false;
            token.cancel();
            debug!("Cancelled in-flight submission");
        }
    }

    /// Clear the answer and error. Cancels any in-flight submission.
    pub fn clear(&self) {
        self.cancel();
        let mut state = self.lock();
        state.answer = None;
        state.error = None;
    }

    /// Show an answer obtained elsewhere (e.g. read back from a file).
    pub fn show_answer(&self, answer: Answer) {
        self.cancel();
        let mut state = self.lock();
        state.answer = Some(AnswerView::new(answer));
        state.error = None;
    }

    // ── Views ────────────────────────────────────────────────────────────

    pub fn answer(&self) -> Option<Answer> {
        self.lock().answer.as_ref().map(|v| v.answer.clone())
    }

    /// The rendered current answer, computed once per answer.
    pub fn rendered(&self) -> Option<RenderedAnswer> {
        let (answer, cell) = {
            let state = self.lock();
            let view = state.answer.as_ref()?;
            (view.answer.clone(), Arc::clone(&view.rendered))
        };
        Some(cell.get_or_init(|| self.renderer.render(&answer)).clone())
    }

    /// User-facing message of the last failed submission.
    pub fn error_message(&self) -> Option<String> {
        self.lock().error.clone()
    }

    pub fn is_loading(&self) -> bool {
        self.lock().loading
    }

    pub fn is_saving(&self) -> bool {
        self.lock().saving > 0
    }

    pub fn generation(&self) -> u64 {
        self.lock().generation
    }

    // ── Exports ──────────────────────────────────────────────────────────

    /// Copy the raw answer text to `sink`.
    pub fn copy_answer(&self, sink: &mut dyn ClipboardSink) -> Result<usize, TutorError> {
        let answer = self.answer().ok_or(TutorError::NoAnswer)?;
        export::copy_answer(&answer, sink)
    }

    /// Export the current answer to a PDF at `path` (default: the configured
    /// file name in the working directory).
    pub async fn export_pdf(
        &self,
        exporter: Arc<dyn PdfExporter>,
        path: Option<PathBuf>,
    ) -> Result<PdfReport, TutorError> {
        let answer = self.answer().ok_or(TutorError::NoAnswer)?;
        let path = path.unwrap_or_else(|| PathBuf::from(&self.config.pdf.file_name));

        let _saving = SavingGuard::enter(self);
        self.callback.on_export_start(&path);
        info!("Exporting answer to {}", path.display());

        match export::export_pdf(exporter, answer, path).await {
            Ok(report) => {
                self.callback.on_export_complete(&report.path, report.pages);
                Ok(report)
            }
            Err(e) => {
                warn!("PDF export failed: {}", e);
                Err(e)
            }
        }
    }
}

struct LoadingGuard<'a> {
    session: &'a Session,
    generation: u64,
}

impl Drop for LoadingGuard<'_> {
    fn drop(&mut self) {
        {
            let mut state = self.session.lock();
            if state.generation == self.generation {
                state.loading = false;
                state.cancel = None;
            }
        }
        self.session.callback.on_submit_finished(self.generation);
    }
}

struct SavingGuard<'a> {
    session: &'a Session,
}

impl<'a> SavingGuard<'a> {
    fn enter(session: &'a Session) -> Self {
        session.lock().saving += 1;
        Self { session }
    }
}

impl Drop for SavingGuard<'_> {
    fn drop(&mut self) {
        let mut state = self.session.lock();
        state.saving = state.saving.saturating_sub(1);
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::pipeline::llm::ServiceResponse;
    use async_trait::async_trait;

    struct Echo;

    #[async_trait]
    impl AnswerService for Echo {
        fn name(&self) -> &str {
            "echo"
        }

        async fn generate(&self, request: &GenerateRequest) -> Result<ServiceResponse, TutorError> {
            Ok(ServiceResponse {
                text: format!("{} part(s)", request.parts.len()),
                input_tokens: Some(3),
                output_tokens: None,
            })
        }
    }

    fn session() -> Session {
        let config = TutorConfig::builder()
            .service(Arc::new(Echo))
            .build()
            .unwrap();
        Session::new(config).unwrap()
    }

    #[tokio::test]
    async fn submit_stores_answer_and_stats() {
        let s = session();
        let out = s.submit(Some("Why is the sky blue?".into()), None).await.unwrap();
        assert_eq!(out.generation, 1);
        assert_eq!(out.answer.as_str(), "1 part(s)");
        assert_eq!(out.stats.provider, "echo");
        assert_eq!(out.stats.input_tokens, Some(3));
        assert_eq!(s.answer(), Some(Answer::new("1 part(s)")));
        assert!(!s.is_loading());
        assert!(s.error_message().is_none());
    }

    #[tokio::test]
    async fn empty_submission_does_not_advance_generation() {
        let s = session();
        let err = s.submit(Some("   ".into()), None).await.unwrap_err();
        assert!(matches!(err, TutorError::EmptyRequest));
        assert_eq!(s.generation(), 0);
        assert_eq!(
            s.error_message().as_deref(),
            Some(crate::error::EMPTY_REQUEST_MESSAGE)
        );
    }

    #[test]
    fn rendered_is_cached_per_answer() {
        let s = session();
        assert!(s.rendered().is_none());
        s.show_answer(Answer::new("**bold**"));
        let first = s.rendered().unwrap();
        assert!(first.html.contains("<strong>bold</strong>"));
        assert_eq!(s.rendered().unwrap(), first);
        s.show_answer(Answer::new("plain"));
        assert!(s.rendered().unwrap().html.contains("plain"));
    }

    #[test]
    fn rendering_does_not_hold_the_state_lock() {
        use crate::error::MathMode;
        use crate::render::math::MathRenderer;
        use std::sync::mpsc;
        use std::time::Duration;

        struct Gate {
            started: mpsc::Sender<()>,
            release: Mutex<mpsc::Receiver<()>>,
        }

        impl MathRenderer for Gate {
            fn render(&self, latex: &str, _mode: MathMode) -> Result<String, String> {
                let _ = self.started.send(());
                let _ = self.release.lock().unwrap().recv();
                Ok(latex.to_string())
            }
        }

        let (started_tx, started_rx) = mpsc::channel();
        let (release_tx, release_rx) = mpsc::channel();
        let renderer = Renderer::new(Arc::new(Gate {
            started: started_tx,
            release: Mutex::new(release_rx),
        }));
        let s = Arc::new(session().with_renderer(renderer));
        s.show_answer(Answer::new("slow $x$"));

        let render_thread = {
            let s = Arc::clone(&s);
            std::thread::spawn(move || s.rendered())
        };
        started_rx.recv().unwrap();

        let (reader_tx, reader_rx) = mpsc::channel();
        {
            let s = Arc::clone(&s);
            std::thread::spawn(move || {
                let _ = reader_tx.send(s.is_loading());
            });
        }
        let reader = reader_rx.recv_timeout(Duration::from_secs(5));
        release_tx.send(()).unwrap();

        assert_eq!(reader, Ok(false), "reader blocked while rendering");
        let rendered = render_thread.join().unwrap().unwrap();
        assert!(rendered.html.contains("slow"));
    }

    #[test]
    fn copy_without_answer_is_an_error() {
        let s = session();
        let mut sink = crate::export::clipboard::tests::MemoryClipboard::default();
        assert!(matches!(s.copy_answer(&mut sink), Err(TutorError::NoAnswer)));
    }

    #[test]
    fn saving_guard_counts_nested_exports() {
        let s = session();
        {
            let _a = SavingGuard::enter(&s);
            let _b = SavingGuard::enter(&s);
            assert!(s.is_saving());
        }
        assert!(!s.is_saving());
    }
}
