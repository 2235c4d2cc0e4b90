//! LaTeX substitution: replace `$$...$$` and `$...$` spans with rendered math.
//!
//! ## Two passes, block first
//!
//! Block delimiters are matched before inline ones; otherwise `$$x$$` would be
//! read as an empty inline span followed by `x`. Each pass replaces a match
//! with an opaque placeholder and records the rendered markup in a side
//! table, so the Markdown stage never sees (and can never mangle or
//! re-interpret) math output. [`crate::render::Renderer`] splices the
//! fragments back in once the Markdown has been converted.
//!
//! ## Failure isolation
//!
//! Every expression is rendered independently. When the renderer rejects one,
//! the original delimited text is kept verbatim (and protected from the inline
//! pass and from Markdown emphasis) and a [`RenderError`] is recorded. The
//! rest of the answer renders normally.
//!
//! ## Escaped dollars
//!
//! An inline span never starts at a `$` preceded by a backslash, so prices
//! like `\$5` survive. The `regex` crate has no look-behind, so the check is
//! done on the byte before each candidate match.

use crate::error::{MathMode, RenderError};
use latex2mathml::{latex_to_mathml, DisplayStyle};
use once_cell::sync::Lazy;
use regex::Regex;
use tracing::warn;

/// Opens a placeholder in the intermediate text (Unicode private use area).
pub(crate) const PLACEHOLDER_OPEN: char = '\u{E000}';
/// Closes a placeholder.
pub(crate) const PLACEHOLDER_CLOSE: char = '\u{E001}';

/// Renders a single LaTeX expression to HTML/MathML markup.
///
/// The returned markup is inserted into the page verbatim: implementations
/// are the trusted side of the HTML boundary and must not echo unescaped
/// input.
pub trait MathRenderer: Send + Sync {
    /// Render `latex` (without delimiters). `Err` carries a human-readable
    /// reason and causes the expression to be kept as literal text.
    fn render(&self, latex: &str, mode: MathMode) -> Result<String, String>;
}

/// [`MathRenderer`] producing MathML via `latex2mathml`.
#[derive(Debug, Default, Clone, Copy)]
pub struct MathmlRenderer;

impl MathRenderer for MathmlRenderer {
    fn render(&self, latex: &str, mode: MathMode) -> Result<String, String> {
        let style = match mode {
            MathMode::Block => DisplayStyle::Block,
            MathMode::Inline => DisplayStyle::Inline,
        };
        check_braces(latex)?;
        latex_to_mathml(latex.trim(), style).map_err(|e| format!("{e:?}"))
    }
}

/// Reject unbalanced `{`/`}` groups; `\{` and `\}` are literal braces.
fn check_braces(latex: &str) -> Result<(), String> {
    let mut depth = 0usize;
    let mut chars = latex.chars();
    while let Some(c) = chars.next() {
        match c {
            '\\' => {
                chars.next();
            }
            '{' => depth += 1,
            '}' => {
                depth = depth
                    .checked_sub(1)
                    .ok_or_else(|| "unexpected '}'".to_string())?;
            }
            _ => {}
        }
    }
    if depth == 0 {
        Ok(())
    } else {
        Err(format!("{depth} unclosed '{{'"))
    }
}

/// Markup that crossed the trust boundary and may be emitted unescaped.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct TrustedHtml(String);

impl TrustedHtml {
    pub fn as_str(&self) -> &str {
        &self.0
    }
}

/// A side-table entry referenced by a placeholder.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Fragment {
    /// Rendered math, emitted as-is.
    Math(TrustedHtml),
    /// Original delimited source of a failed expression, emitted escaped.
    Literal(String),
}

/// Result of [`substitute_math`].
#[derive(Debug, Clone, Default)]
pub struct MathSubstitution {
    /// The answer with every math span replaced by a placeholder.
    pub text: String,
    /// Placeholder `n` refers to `fragments[n]`.
    pub fragments: Vec<Fragment>,
    /// One entry per expression that failed to render.
    pub warnings: Vec<RenderError>,
}

impl MathSubstitution {
    /// Number of expressions that rendered successfully.
    pub fn rendered_count(&self) -> usize {
        self.fragments
            .iter()
            .filter(|f| matches!(f, Fragment::Math(_)))
            .count()
    }

    fn push(&mut self, fragment: Fragment) -> String {
        let idx = self.fragments.len();
        self.fragments.push(fragment);
        placeholder(idx)
    }
}

pub(crate) fn placeholder(idx: usize) -> String {
    format!("{PLACEHOLDER_OPEN}{idx}{PLACEHOLDER_CLOSE}")
}

static RE_BLOCK: Lazy<Regex> = Lazy::new(|| Regex::new(r"(?s)\$\$(.+?)\$\$").unwrap());

// Inline spans never cross a placeholder left by the block pass.
static RE_INLINE: Lazy<Regex> =
    Lazy::new(|| Regex::new(r"\$([^$\x{E000}\x{E001}]+?)\$").unwrap());

static RE_BLANK_LINE: Lazy<Regex> = Lazy::new(|| Regex::new(r"\n[ \t]*\n").unwrap());

/// Replace every math span in `input` with a placeholder.
///
/// Placeholder characters already present in `input` are replaced with
/// U+FFFD first so model text can never forge a reference into the
/// fragment table.
pub fn substitute_math(input: &str, renderer: &dyn MathRenderer) -> MathSubstitution {
    let cleaned: String = input
        .chars()
        .map(|c| {
            if c == PLACEHOLDER_OPEN || c == PLACEHOLDER_CLOSE {
                '\u{FFFD}'
            } else {
                c
            }
        })
        .collect();

    let mut sub = MathSubstitution::default();
    let after_block = substitute_block(&cleaned, renderer, &mut sub);
    sub.text = substitute_inline(&after_block, renderer, &mut sub);
    sub
}

fn substitute_block(input: &str, renderer: &dyn MathRenderer, sub: &mut MathSubstitution) -> String {
    let mut out = String::with_capacity(input.len());
    let mut last = 0;
    for caps in RE_BLOCK.captures_iter(input) {
        let (Some(whole), Some(latex)) = (caps.get(0), caps.get(1)) else {
            continue;
        };
        out.push_str(&input[last..whole.start()]);
        out.push_str(&render_one(
            whole.as_str(),
            latex.as_str(),
            MathMode::Block,
            renderer,
            sub,
        ));
        last = whole.end();
    }
    out.push_str(&input[last..]);
    out
}

fn substitute_inline(input: &str, renderer: &dyn MathRenderer, sub: &mut MathSubstitution) -> String {
    let bytes = input.as_bytes();
    let mut out = String::with_capacity(input.len());
    let mut last = 0;
    let mut pos = 0;

    while let Some(caps) = RE_INLINE.captures_at(input, pos) {
        let (Some(whole), Some(latex)) = (caps.get(0), caps.get(1)) else {
            break;
        };

        // `\$` never opens a span and a span never crosses a paragraph break;
        // retry from the next byte ('$' is ASCII).
        let escaped = whole.start() > 0 && bytes[whole.start() - 1] == b'\\';
        if escaped || RE_BLANK_LINE.is_match(latex.as_str()) {
            pos = whole.start() + 1;
            continue;
        }

        out.push_str(&input[last..whole.start()]);
        out.push_str(&render_one(
            whole.as_str(),
            latex.as_str(),
            MathMode::Inline,
            renderer,
            sub,
        ));
        last = whole.end();
        pos = whole.end();
    }

    out.push_str(&input[last..]);
    out
}

fn render_one(
    original: &str,
    latex: &str,
    mode: MathMode,
    renderer: &dyn MathRenderer,
    sub: &mut MathSubstitution,
) -> String {
    match renderer.render(latex, mode) {
        Ok(markup) => sub.push(Fragment::Math(TrustedHtml(markup))),
        Err(detail) => {
            warn!("Leaving {} math as text: {} ({})", mode, latex, detail);
            sub.warnings.push(RenderError::MalformedExpression {
                expression: latex.to_string(),
                mode,
                detail,
            });
            sub.push(Fragment::Literal(original.to_string()))
        }
    }
}
