//! CLI binary for physics-tutor.
//!
//! A thin shim over the library crate that maps CLI flags to `TutorConfig`,
//! runs one submission through a `Session` and performs the requested
//! exports.

use anyhow::{Context, Result};
use clap::Parser;
use indicatif::{ProgressBar, ProgressStyle};
use physics_tutor::config::DEFAULT_PDF_FILE_NAME;
use physics_tutor::export::write_output;
use physics_tutor::tutor::DOCUMENT_TITLE;
use physics_tutor::{
    load_image, ArboardClipboard, PdfiumExporter, ProgressCallback, Session, SolveOutput,
    SubmissionProgressCallback, TutorConfig, TutorError,
};
use std::io::{self, Read, Write};
use std::path::{Path, PathBuf};
use std::sync::Arc;
use std::time::Duration;
use tracing_subscriber::EnvFilter;

// ── ANSI colour helpers (no extra deps) ──────────────────────────────────────

fn green(s: &str) -> String {
    format!("\x1b[32m{s}\x1b[0m")
}
fn red(s: &str) -> String {
    format!("\x1b[31m{s}\x1b[0m")
}
fn dim(s: &str) -> String {
    format!("\x1b[2m{s}\x1b[0m")
}
fn bold(s: &str) -> String {
    format!("\x1b[1m{s}\x1b[0m")
}
fn cyan(s: &str) -> String {
    format!("\x1b[36m{s}\x1b[0m")
}

const TICKS: &[&str] = &["⠋", "⠙", "⠹", "⠸", "⠼", "⠴", "⠦", "⠧", "⠇", "⠏", "⠿"];

// ── CLI progress callback using indicatif ────────────────────────────────────

/// Spinner shown while the model is thinking; stands in for the disabled
/// submit button of a graphical front end.
struct CliProgressCallback {
    bar: ProgressBar,
}

impl CliProgressCallback {
    fn new() -> Arc<Self> {
        let bar = ProgressBar::new_spinner();
        let style = ProgressStyle::with_template("{spinner:.cyan} {prefix:.bold}  {msg}  {elapsed:.dim}")
            .unwrap_or_else(|_| ProgressStyle::default_spinner())
            .tick_strings(TICKS);
        bar.set_style(style);
        bar.set_prefix("Preparing");
        Arc::new(Self { bar })
    }
}

impl SubmissionProgressCallback for CliProgressCallback {
    fn on_submit_start(&self, _generation: u64, parts: usize) {
        self.bar.set_prefix("Solving");
        self.bar.set_message(if parts > 1 {
            "question + image sent, waiting for the tutor…".to_string()
        } else {
            "question sent, waiting for the tutor…".to_string()
        });
        self.bar.enable_steady_tick(Duration::from_millis(80));
    }

    fn on_answer(&self, _generation: u64, answer_len: usize) {
        self.bar.finish_and_clear();
        eprintln!(
            "{} Solution received  {}",
            green("✔"),
            dim(&format!("{answer_len} chars"))
        );
    }

    fn on_error(&self, _generation: u64, _error: &str) {
        self.bar.finish_and_clear();
    }

    fn on_export_start(&self, path: &Path) {
        eprintln!("{} Exporting PDF to {}…", cyan("◆"), bold(&path.display().to_string()));
    }

    fn on_export_complete(&self, path: &Path, pages: usize) {
        eprintln!(
            "{} Saved {}  {}",
            green("✔"),
            bold(&path.display().to_string()),
            dim(&format!("{pages} page(s)"))
        );
    }
}

const AFTER_HELP: &str = r#"EXAMPLES:
  # Ask a text question (answer printed to stdout as Markdown + LaTeX)
  phystutor "A ball is thrown at 45° with 20 m/s. Find the range."

  # Photo of a textbook problem, plus a hint
  phystutor --image problem.jpg "Only part (b), please"

  # Read the question from stdin
  cat question.txt | phystutor -

  # Rendered HTML page, PDF and clipboard in one go
  phystutor "Derive the period of a simple pendulum" --html pendulum.html --pdf --copy

  # Use another provider through edgequake-llm
  phystutor --provider openai --model gpt-4.1-mini "What is torque?"

  # Structured output
  phystutor --json "Why is the sky blue?" > answer.json

ENVIRONMENT VARIABLES:
  GEMINI_API_KEY          Google Gemini API key (API_KEY is also accepted)
  PHYSTUTOR_MODEL         Override model ID (default: gemini-2.5-flash)
  PHYSTUTOR_PROVIDER      Override provider (gemini, openai, anthropic, ollama, …)
  PHYSTUTOR_BASE_URL      Override the Gemini REST endpoint root
  OPENAI_API_KEY          Used when --provider openai
  ANTHROPIC_API_KEY       Used when --provider anthropic
  PDFIUM_LIB_PATH         Path to an existing libpdfium (skips auto-download)
  PDFIUM_AUTO_CACHE_DIR   Override the default pdfium cache directory

NOTES:
  PDFium (~30 MB) is downloaded automatically the first time --pdf is used.
  On X11/Wayland the clipboard is owned by the running process; use a
  clipboard manager if the copied text should outlive phystutor.
"#;

/// Solve physics problems with a vision LLM.
#[derive(Parser, Debug)]
#[command(
    name = "phystutor",
    version,
    about = "Solve physics problems from text or photos with a vision LLM",
    long_about = "Send a physics question (text and/or an image of the problem) to a hosted \
model and get a structured, step-by-step solution: difficulty, worked solution, conceptual \
insights, an alternate method and the final answer. Render it to HTML, copy the raw \
Markdown + LaTeX to the clipboard, or export a paginated A4 PDF.",
    arg_required_else_help = true,
    color = clap::ColorChoice::Auto,
    after_long_help = AFTER_HELP
)]
struct Cli {
    /// The question. Use "-" to read it from stdin.
    text: Option<String>,

    /// Image of the problem (png, jpeg or webp).
    #[arg(short, long, env = "PHYSTUTOR_IMAGE")]
    image: Option<PathBuf>,

    /// Write the rendered answer as a standalone HTML page.
    #[arg(long, env = "PHYSTUTOR_HTML")]
    html: Option<PathBuf>,

    /// Export the answer to a paginated A4 PDF (default file: physics-solution.pdf).
    #[arg(long, num_args = 0..=1, default_missing_value = DEFAULT_PDF_FILE_NAME)]
    pdf: Option<PathBuf>,

    /// Copy the raw Markdown + LaTeX answer to the clipboard.
    #[arg(long)]
    copy: bool,

    /// Do not render LaTeX; HTML/PDF show the answer as plain text.
    #[arg(long, env = "PHYSTUTOR_RAW")]
    raw: bool,

    /// Output structured JSON (answer, rendered HTML, stats) instead of Markdown.
    #[arg(long, env = "PHYSTUTOR_JSON")]
    json: bool,

    /// Model ID (e.g. gemini-2.5-flash, gemini-2.5-pro, gpt-4.1-mini).
    #[arg(long, env = "PHYSTUTOR_MODEL")]
    model: Option<String>,

    /// Provider: gemini (native client), openai, anthropic, ollama, …
    #[arg(long, env = "PHYSTUTOR_PROVIDER")]
    provider: Option<String>,

    /// API key for the Gemini client.
    #[arg(long, env = "GEMINI_API_KEY", hide_env_values = true)]
    api_key: Option<String>,

    /// Gemini REST endpoint root.
    #[arg(long, env = "PHYSTUTOR_BASE_URL")]
    base_url: Option<String>,

    /// Path to a text file replacing the built-in tutor instruction.
    #[arg(long, env = "PHYSTUTOR_SYSTEM_INSTRUCTION")]
    system_instruction: Option<PathBuf>,

    /// Sampling temperature (0.0–2.0). Provider default when unset.
    #[arg(long, env = "PHYSTUTOR_TEMPERATURE")]
    temperature: Option<f32>,

    /// Max output tokens. Provider default when unset.
    #[arg(long, env = "PHYSTUTOR_MAX_TOKENS")]
    max_tokens: Option<usize>,

    /// Model call timeout in seconds.
    #[arg(long, env = "PHYSTUTOR_API_TIMEOUT", default_value_t = 120)]
    api_timeout: u64,

    /// Disable the spinner.
    #[arg(long, env = "PHYSTUTOR_NO_PROGRESS")]
    no_progress: bool,

    /// Enable DEBUG-level tracing logs.
    #[arg(short, long, env = "PHYSTUTOR_VERBOSE")]
    verbose: bool,

    /// Suppress all output except the answer and errors.
    #[arg(short, long, env = "PHYSTUTOR_QUIET")]
    quiet: bool,
}

#[tokio::main]
async fn main() -> Result<()> {
    let cli = Cli::parse();

    // ── Logging setup ────────────────────────────────────────────────────
    // The spinner already tells the user what is happening; INFO logs
    // would tear it.
    let show_progress = !cli.quiet && !cli.no_progress && !cli.json;
    let filter = if cli.verbose {
        "debug"
    } else if cli.quiet || show_progress {
        "error"
    } else {
        "info"
    };

    tracing_subscriber::fmt()
        .with_env_filter(
            EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(filter)),
        )
        .with_writer(io::stderr)
        .init();

    // ── Gather input ─────────────────────────────────────────────────────
    let text = match cli.text.as_deref() {
        Some("-") => {
            let mut buf = String::new();
            io::stdin()
                .read_to_string(&mut buf)
                .context("Failed to read the question from stdin")?;
            Some(buf)
        }
        other => other.map(str::to_string),
    };

    let image = match cli.image {
        Some(ref path) => Some(load_image(path).await.context("Failed to load image")?),
        None => None,
    };

    // Fetch the PDF engine before spending tokens on an answer we could
    // not export.
    if cli.pdf.is_some() {
        ensure_pdf_engine(cli.quiet)?;
    }

    // ── Build config and session ─────────────────────────────────────────
    let progress_cb: Option<ProgressCallback> = if show_progress {
        Some(CliProgressCallback::new() as Arc<dyn SubmissionProgressCallback>)
    } else {
        None
    };
    let config = build_config(&cli, progress_cb).await?;
    let session = Session::new(config).context("Failed to set up the tutor")?;

    // ── Solve ────────────────────────────────────────────────────────────
    let outcome = match session.submit(text, image).await {
        Ok(outcome) => outcome,
        Err(e) => {
            eprintln!("{} {}", red("✘"), session.error_message().unwrap_or_else(|| e.user_message()));
            return Err(anyhow::Error::new(e).context("No solution"));
        }
    };
    let rendered = session
        .rendered()
        .context("The answer disappeared before it could be rendered")?;

    if cli.json {
        let output = SolveOutput {
            answer: outcome.answer.clone(),
            rendered: rendered.clone(),
            stats: outcome.stats.clone(),
        };
        let json = serde_json::to_string_pretty(&output).context("Failed to serialise output")?;
        println!("{json}");
    } else {
        let stdout = io::stdout();
        let mut handle = stdout.lock();
        handle
            .write_all(outcome.answer.as_str().as_bytes())
            .context("Failed to write to stdout")?;
        if !outcome.answer.as_str().ends_with('\n') {
            handle.write_all(b"\n").ok();
        }
    }

    if !cli.quiet && !cli.json {
        let tokens = |t: Option<u64>| t.map(|n| n.to_string()).unwrap_or_else(|| "?".into());
        eprintln!(
            "   {} tokens in  /  {} tokens out  —  {}ms  ({})",
            dim(&tokens(outcome.stats.input_tokens)),
            dim(&tokens(outcome.stats.output_tokens)),
            outcome.stats.duration_ms,
            outcome.stats.model,
        );
        if !rendered.warnings.is_empty() {
            eprintln!(
                "{} {} math expression(s) left as plain text",
                cyan("⚠"),
                rendered.warnings.len()
            );
        }
    }

    // ── Exports ──────────────────────────────────────────────────────────
    // Each export reports on its own; one failing does not skip the others.
    let mut failures: Vec<TutorError> = Vec::new();

    if let Some(ref path) = cli.html {
        write_output(path.clone(), rendered.to_document(DOCUMENT_TITLE).into_bytes())
            .await
            .with_context(|| format!("Failed to write HTML to {}", path.display()))?;
        if !cli.quiet {
            eprintln!("{} Saved {}", green("✔"), bold(&path.display().to_string()));
        }
    }

    if cli.copy {
        let copied = ArboardClipboard::new().and_then(|mut clipboard| session.copy_answer(&mut clipboard));
        match copied {
            Ok(_) if !cli.quiet => eprintln!("{} Solution copied to clipboard!", green("✔")),
            Ok(_) => {}
            Err(e) => {
                eprintln!("{} {}", red("✘"), e.user_message());
                failures.push(e);
            }
        }
    }

    if let Some(ref path) = cli.pdf {
        let exporter = Arc::new(PdfiumExporter::new(session.config().pdf.clone()));
        match session.export_pdf(exporter, Some(path.clone())).await {
            Ok(report) if !show_progress && !cli.quiet => eprintln!(
                "{} Saved {}  {}",
                green("✔"),
                bold(&report.path.display().to_string()),
                dim(&format!("{} page(s)", report.pages))
            ),
            Ok(_) => {}
            Err(e) => {
                eprintln!("{} {}", red("✘"), e.user_message());
                failures.push(e);
            }
        }
    }

    if let Some(first) = failures.into_iter().next() {
        return Err(anyhow::Error::new(first).context("Export failed"));
    }
    Ok(())
}

/// Download pdfium on first use, with a progress bar unless quiet.
fn ensure_pdf_engine(quiet: bool) -> Result<()> {
    if pdfium_auto::is_pdfium_cached() {
        return Ok(());
    }

    if quiet {
        tokio::task::block_in_place(|| pdfium_auto::ensure_pdfium_library(None))
            .context("Failed to download PDFium engine")?;
        return Ok(());
    }

    let dl_bar = ProgressBar::new(0);
    dl_bar.set_style(
        ProgressStyle::with_template(
            "{spinner:.cyan} {prefix:.bold}  \
             [{bar:42.green/238}] {bytes}/{total_bytes}  ETA {eta_precise}",
        )
        .unwrap_or_else(|_| ProgressStyle::default_bar())
        .progress_chars("█▉▊▋▌▍▎▏  ")
        .tick_strings(TICKS),
    );
    dl_bar.set_prefix("PDF engine");
    dl_bar.set_message("Connecting…");
    dl_bar.enable_steady_tick(Duration::from_millis(80));

    let bar = dl_bar.clone();
    tokio::task::block_in_place(|| {
        pdfium_auto::ensure_pdfium_library(Some(&|downloaded, total| {
            if let Some(t) = total {
                if bar.length().unwrap_or(0) != t {
                    bar.set_length(t);
                }
            }
            bar.set_position(downloaded);
        }))
    })
    .context("Failed to download PDFium engine")?;

    dl_bar.finish_with_message("ready ✓");
    Ok(())
}

/// Map CLI args to `TutorConfig`.
async fn build_config(cli: &Cli, progress: Option<ProgressCallback>) -> Result<TutorConfig> {
    let mut builder = TutorConfig::builder()
        .api_timeout_secs(cli.api_timeout)
        .render_math(!cli.raw);

    if let Some(ref path) = cli.system_instruction {
        let instruction = tokio::fs::read_to_string(path)
            .await
            .with_context(|| format!("Failed to read system instruction from {:?}", path))?;
        builder = builder.system_instruction(instruction);
    }
    if let Some(ref model) = cli.model {
        builder = builder.model(model.clone());
    }
    if let Some(ref provider) = cli.provider {
        builder = builder.provider_name(provider.to_lowercase());
    }
    // Absence is not checked here; the first call reports it.
    if let Some(key) = cli.api_key.clone().or_else(|| std::env::var("API_KEY").ok()) {
        builder = builder.api_key(key);
    }
    if let Some(ref url) = cli.base_url {
        builder = builder.base_url(url.clone());
    }
    if let Some(t) = cli.temperature {
        builder = builder.temperature(t);
    }
    if let Some(n) = cli.max_tokens {
        builder = builder.max_tokens(n);
    }
    if let Some(cb) = progress {
        builder = builder.progress_callback(cb);
    }

    builder.build().context("Invalid configuration")
}
