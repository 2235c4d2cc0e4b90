//! # physics-tutor
//!
//! Ask a hosted vision model to solve a physics problem, given as text, a
//! photo of the problem, or both, and get back a structured worked solution.
//!
//! ## Why this crate?
//!
//! Students photograph a textbook problem or type it out and want a worked
//! solution they can read, paste into notes and print. The model is steered
//! by a fixed system instruction into one predictable layout (difficulty,
//! step-by-step solution, conceptual insights, alternate method, boxed final
//! answer) written in Markdown with LaTeX math. This crate handles
//! everything around that call: input validation, the request itself,
//! rendering the answer to HTML with MathML, and exporting it.
//!
//! ## Pipeline Overview
//!
//! ```text
//! text / image
//!  │
//!  ├─ 1. Input   validate, load + type-check the image (png/jpeg/webp)
//!  ├─ 2. Encode  image bytes → base64 inline data
//!  ├─ 3. Model   one generateContent call with the system instruction
//!  ├─ 4. Render  LaTeX → MathML, Markdown → HTML (raw HTML escaped)
//!  └─ 5. Export  raw text → clipboard, rendered capture → paginated A4 PDF
//! ```
//!
//! ## Quick Start
//!
//! ```rust,no_run
//! use physics_tutor::{ask, TutorConfig};
//!
//! #[tokio::main]
//! async fn main() -> Result<(), Box<dyn std::error::Error>> {
//!     // Reads the key explicitly; the CLI also accepts GEMINI_API_KEY / API_KEY.
//!     let config = TutorConfig::builder()
//!         .api_key(std::env::var("GEMINI_API_KEY")?)
//!         .build()?;
//!     let output = ask(Some("A 2 kg block slides down a 30° frictionless incline. Acceleration?".into()), None, &config).await?;
//!     println!("{}", output.rendered.html);
//!     eprintln!("answered in {}ms", output.stats.duration_ms);
//!     Ok(())
//! }
//! ```
//!
//! ## Sessions
//!
//! Interactive front ends keep a [`Session`]: it stores the current answer
//! and error, exposes loading/saving flags, and makes sure only the newest
//! submission can change what is shown.
//!
//! ## Feature Flags
//!
//! | Feature | Default | Description |
//! |---------|---------|-------------|
//! | `cli`   | on      | Enables the `phystutor` binary (clap + anyhow + tracing-subscriber + indicatif) |
//!
//! Disable `cli` when using only the library:
//! ```toml
//! physics-tutor = { version = "0.1", default-features = false }
//! ```

// ── Modules ──────────────────────────────────────────────────────────────

pub mod config;
pub mod error;
pub mod export;
pub mod output;
pub mod pipeline;
pub mod progress;
pub mod prompts;
pub mod render;
pub mod session;
pub mod tutor;

// ── Re-exports ───────────────────────────────────────────────────────────

pub use config::{PdfExportConfig, TutorConfig, TutorConfigBuilder};
pub use error::{ErrorKind, MathMode, RenderError, TutorError};
pub use export::{copy_answer, ArboardClipboard, ClipboardSink, PdfExporter, PdfReport, PdfiumExporter};
pub use output::{Answer, RenderedAnswer, SolveOutput, SolveStats};
pub use pipeline::input::{collect, load_image, ImageAttachment, Request};
pub use pipeline::llm::{AnswerService, ContentPart, GeminiClient, GenerateRequest, InlineData, ServiceResponse};
pub use progress::{NoopProgressCallback, ProgressCallback, SubmissionProgressCallback};
pub use render::Renderer;
pub use session::{Session, SubmitOutcome};
pub use tutor::{ask, ask_sync, ask_to_file};
