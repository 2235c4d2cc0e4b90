//! Configuration types for asking questions and exporting answers.
//!
//! All behaviour is controlled through [`TutorConfig`], built via its
//! [`TutorConfigBuilder`]. The system instruction lives here rather than in
//! the service client so tests and alternative front ends can inject their
//! own without touching the HTTP layer.

use crate::error::TutorError;
use crate::pipeline::llm::AnswerService;
use crate::progress::ProgressCallback;
use crate::prompts::DEFAULT_SYSTEM_INSTRUCTION;
use std::fmt;
use std::sync::Arc;

/// Default Gemini model used when neither the config nor the environment
/// names one.
pub const DEFAULT_MODEL: &str = "gemini-2.5-flash";

/// Default REST endpoint root for the Gemini API.
pub const DEFAULT_BASE_URL: &str = "https://generativelanguage.googleapis.com";

/// Default file name for PDF exports.
pub const DEFAULT_PDF_FILE_NAME: &str = "physics-solution.pdf";

/// Configuration for a tutoring session.
///
/// Built via [`TutorConfig::builder()`] or using [`TutorConfig::default()`].
///
/// # Example
/// ```rust
/// use physics_tutor::TutorConfig;
///
/// let config = TutorConfig::builder()
///     .model("gemini-2.5-flash")
///     .api_key("test-key")
///     .api_timeout_secs(30)
///     .build()
///     .unwrap();
/// assert_eq!(config.model, "gemini-2.5-flash");
/// ```
#[derive(Clone)]
pub struct TutorConfig {
    /// Model identifier. Default: [`DEFAULT_MODEL`].
    pub model: String,

    /// Provider name ("gemini", "openai", "anthropic", "ollama", …).
    /// `None` means the native Gemini client.
    pub provider_name: Option<String>,

    /// Pre-constructed answer service. Takes precedence over `provider_name`.
    pub service: Option<Arc<dyn AnswerService>>,

    /// API key for the Gemini client.
    ///
    /// Not validated at build time: a missing key surfaces as
    /// [`TutorError::ProviderNotConfigured`] on the first call.
    pub api_key: Option<String>,

    /// REST endpoint root for the Gemini client. Default: [`DEFAULT_BASE_URL`].
    pub base_url: String,

    /// Fixed instruction sent with every request.
    pub system_instruction: Arc<str>,

    /// Sampling temperature. `None` leaves the provider default.
    pub temperature: Option<f32>,

    /// Maximum tokens the model may generate. `None` leaves the provider default.
    pub max_tokens: Option<usize>,

    /// Per-call timeout in seconds. Default: 120.
    ///
    /// Solutions with several worked methods regularly take 30–60 s on
    /// "thinking" models, so the default is generous.
    pub api_timeout_secs: u64,

    /// Render LaTeX to MathML. When false the answer is shown as raw text.
    pub render_math: bool,

    /// PDF export settings.
    pub pdf: PdfExportConfig,

    /// Optional progress callback. Default: None.
    pub progress_callback: Option<ProgressCallback>,
}

impl Default for TutorConfig {
    fn default() -> Self {
        Self {
            model: DEFAULT_MODEL.to_string(),
            provider_name: None,
            service: None,
            api_key: None,
            base_url: DEFAULT_BASE_URL.to_string(),
            system_instruction: Arc::from(DEFAULT_SYSTEM_INSTRUCTION),
            temperature: None,
            max_tokens: None,
            api_timeout_secs: 120,
            render_math: true,
            pdf: PdfExportConfig::default(),
            progress_callback: None,
        }
    }
}

impl fmt::Debug for TutorConfig {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("TutorConfig")
            .field("model", &self.model)
            .field("provider_name", &self.provider_name)
            .field("service", &self.service.as_ref().map(|s| s.name().to_string()))
            .field("api_key", &self.api_key.as_ref().map(|_| "<redacted>"))
            .field("base_url", &self.base_url)
            .field("system_instruction_len", &self.system_instruction.len())
            .field("temperature", &self.temperature)
            .field("max_tokens", &self.max_tokens)
            .field("api_timeout_secs", &self.api_timeout_secs)
            .field("render_math", &self.render_math)
            .field("pdf", &self.pdf)
            .field(
                "progress_callback",
                &self.progress_callback.as_ref().map(|_| "<callback>"),
            )
            .finish()
    }
}

impl TutorConfig {
    /// Create a new builder for `TutorConfig`.
    pub fn builder() -> TutorConfigBuilder {
        TutorConfigBuilder {
            config: Self::default(),
        }
    }
}

/// Builder for [`TutorConfig`].
#[derive(Debug)]
pub struct TutorConfigBuilder {
    config: TutorConfig,
}

impl TutorConfigBuilder {
    pub fn model(mut self, model: impl Into<String>) -> Self {
        self.config.model = model.into();
        self
    }

    pub fn provider_name(mut self, name: impl Into<String>) -> Self {
        self.config.provider_name = Some(name.into());
        self
    }

    pub fn service(mut self, service: Arc<dyn AnswerService>) -> Self {
        self.config.service = Some(service);
        self
    }

    pub fn api_key(mut self, key: impl Into<String>) -> Self {
        self.config.api_key = Some(key.into());
        self
    }

    pub fn base_url(mut self, url: impl Into<String>) -> Self {
        self.config.base_url = url.into().trim_end_matches('/').to_string();
        self
    }

    pub fn system_instruction(mut self, instruction: impl Into<String>) -> Self {
        self.config.system_instruction = Arc::from(instruction.into());
        self
    }

    pub fn temperature(mut self, t: f32) -> Self {
        self.config.temperature = Some(t.clamp(0.0, 2.0));
        self
    }

    pub fn max_tokens(mut self, n: usize) -> Self {
        self.config.max_tokens = Some(n);
        self
    }

    pub fn api_timeout_secs(mut self, secs: u64) -> Self {
        self.config.api_timeout_secs = secs;
        self
    }

    pub fn render_math(mut self, v: bool) -> Self {
        self.config.render_math = v;
        self
    }

    pub fn pdf(mut self, pdf: PdfExportConfig) -> Self {
        self.config.pdf = pdf;
        self
    }

    /// Set a progress callback to receive submission and export events.
    pub fn progress_callback(mut self, cb: ProgressCallback) -> Self {
        self.config.progress_callback = Some(cb);
        self
    }

    /// Build the configuration, validating constraints.
    pub fn build(self) -> Result<TutorConfig, TutorError> {
        let c = &self.config;
        if c.model.trim().is_empty() {
            return Err(TutorError::InvalidConfig("model must not be empty".into()));
        }
        if c.system_instruction.trim().is_empty() {
            return Err(TutorError::InvalidConfig(
                "system instruction must not be empty".into(),
            ));
        }
        if c.api_timeout_secs == 0 {
            return Err(TutorError::InvalidConfig(
                "API timeout must be ≥ 1 second".into(),
            ));
        }
        if !(c.base_url.starts_with("http://") || c.base_url.starts_with("https://")) {
            return Err(TutorError::InvalidConfig(format!(
                "base URL must be http(s), got '{}'",
                c.base_url
            )));
        }
        c.pdf.validate()?;
        Ok(self.config)
    }
}

// ── PDF export ───────────────────────────────────────────────────────────

/// Settings for [`crate::export::pdf`].
///
/// Page geometry is fixed to A4 portrait; only the raster density, the
/// typesetting of the captured answer and the file name are tunable.
#[derive(Debug, Clone, PartialEq)]
pub struct PdfExportConfig {
    /// File name used when the caller gives no explicit path.
    pub file_name: String,

    /// Width in pixels of the captured answer raster. Default: 1240
    /// (150 DPI across an A4 width).
    pub raster_width_px: u32,

    /// Body font size in points for the captured answer. Default: 11.
    pub font_size_pt: f32,

    /// Margin around the captured answer in points. Default: 36.
    pub margin_pt: f32,
}

impl Default for PdfExportConfig {
    fn default() -> Self {
        Self {
            file_name: DEFAULT_PDF_FILE_NAME.to_string(),
            raster_width_px: 1240,
            font_size_pt: 11.0,
            margin_pt: 36.0,
        }
    }
}

impl PdfExportConfig {
    fn validate(&self) -> Result<(), TutorError> {
        if self.file_name.trim().is_empty() {
            return Err(TutorError::InvalidConfig("PDF file name must not be empty".into()));
        }
        if !(200..=4000).contains(&self.raster_width_px) {
            return Err(TutorError::InvalidConfig(format!(
                "PDF raster width must be 200–4000 px, got {}",
                self.raster_width_px
            )));
        }
        if !(6.0..=24.0).contains(&self.font_size_pt) {
            return Err(TutorError::InvalidConfig(format!(
                "PDF font size must be 6–24 pt, got {}",
                self.font_size_pt
            )));
        }
        if !(0.0..=120.0).contains(&self.margin_pt) {
            return Err(TutorError::InvalidConfig(format!(
                "PDF margin must be 0–120 pt, got {}",
                self.margin_pt
            )));
        }
        Ok(())
    }
}
