//! Answer and result types.

use crate::error::RenderError;
use crate::render::markdown::escape_html;
use serde::{Deserialize, Serialize};
use std::fmt;

/// Raw Markdown+LaTeX text returned by the model.
///
/// Kept byte-for-byte as received: copy and `--raw` output use it directly,
/// and only [`crate::render::Renderer`] ever interprets it.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(transparent)]
pub struct Answer(String);

impl Answer {
    pub fn new(text: impl Into<String>) -> Self {
        Self(text.into())
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }

    pub fn into_string(self) -> String {
        self.0
    }

    pub fn len(&self) -> usize {
        self.0.len()
    }

    pub fn is_empty(&self) -> bool {
        self.0.is_empty()
    }
}

impl AsRef<str> for Answer {
    fn as_ref(&self) -> &str {
        &self.0
    }
}

impl fmt::Display for Answer {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

/// HTML derived from an [`Answer`].
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct RenderedAnswer {
    /// HTML fragment (no `<html>`/`<body>` wrapper).
    pub html: String,
    /// False when math rendering was unavailable and the raw text is shown.
    pub math_rendered: bool,
    /// Number of expressions rendered to MathML.
    pub math_count: usize,
    /// Expressions left as literal text.
    pub warnings: Vec<RenderError>,
}

impl RenderedAnswer {
    /// Wrap the fragment in a standalone HTML page.
    pub fn to_document(&self, title: &str) -> String {
        format!(
            "<!DOCTYPE html>\n\
<html lang=\"en\">\n\
<head>\n\
<meta charset=\"utf-8\">\n\
<meta name=\"viewport\" content=\"width=device-width, initial-scale=1\">\n\
<title>{title}</title>\n\
<style>\n{DOCUMENT_CSS}</style>\n\
</head>\n\
<body>\n\
<article class=\"answer\">\n{html}</article>\n\
</body>\n\
</html>\n",
            title = escape_html(title),
            html = self.html,
        )
    }
}

const DOCUMENT_CSS: &str = "body { font-family: system-ui, sans-serif; line-height: 1.6; margin: 0; background: #f8fafc; color: #0f172a; }
.answer { max-width: 52rem; margin: 2rem auto; padding: 2rem 2.5rem; background: #fff; border-radius: 12px; box-shadow: 0 1px 3px rgba(0,0,0,.1); }
.answer pre { background: #0f172a; color: #e2e8f0; padding: 1rem; border-radius: 8px; overflow-x: auto; }
.answer pre.raw-answer { background: #f1f5f9; color: #0f172a; white-space: pre-wrap; }
.answer table { border-collapse: collapse; }
.answer th, .answer td { border: 1px solid #cbd5e1; padding: .35rem .75rem; }
.answer math[display=\"block\"] { margin: 1rem 0; overflow-x: auto; }
";

/// Usage and timing for one answered question.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct SolveStats {
    /// Label of the service that answered.
    pub provider: String,
    /// Model identifier from the config.
    pub model: String,
    /// Number of content parts sent (1 or 2).
    pub content_parts: usize,
    /// Wall-clock time of the model call.
    pub duration_ms: u64,
    pub input_tokens: Option<u64>,
    pub output_tokens: Option<u64>,
}

/// Everything produced by [`crate::tutor::ask`].
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct SolveOutput {
    pub answer: Answer,
    pub rendered: RenderedAnswer,
    pub stats: SolveStats,
}
