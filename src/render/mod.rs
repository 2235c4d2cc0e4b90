//! Answer rendering: Markdown+LaTeX → HTML.
//!
//! ```text
//! Answer ──▶ math::substitute_math ──▶ markdown::markdown_to_html ──▶ splice
//!            ($$…$$, then $…$)         (raw HTML escaped)             (trusted fragments)
//! ```
//!
//! Math is rendered first and parked behind placeholders, then the Markdown
//! is converted with raw HTML neutralised, and finally the placeholders are
//! replaced with the rendered math (or the escaped original text of an
//! expression that failed). Without a math renderer the answer is shown as
//! escaped raw text instead; that is a degraded mode, not an error.

pub mod markdown;
pub mod math;

use crate::config::TutorConfig;
use crate::output::{Answer, RenderedAnswer};
use markdown::{escape_html, markdown_to_html};
use math::{substitute_math, Fragment, MathRenderer, MathmlRenderer, PLACEHOLDER_CLOSE, PLACEHOLDER_OPEN};
use once_cell::sync::Lazy;
use regex::{Captures, Regex};
use std::sync::Arc;
use tracing::debug;

static RE_PLACEHOLDER: Lazy<Regex> = Lazy::new(|| {
    Regex::new(&format!("{}([0-9]+){}", PLACEHOLDER_OPEN, PLACEHOLDER_CLOSE)).unwrap()
});

/// Converts answers to HTML.
#[derive(Clone)]
pub struct Renderer {
    math: Option<Arc<dyn MathRenderer>>,
}

impl Default for Renderer {
    fn default() -> Self {
        Self::new(Arc::new(MathmlRenderer))
    }
}

impl std::fmt::Debug for Renderer {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Renderer")
            .field("math", &self.math.as_ref().map(|_| "<dyn MathRenderer>"))
            .finish()
    }
}

impl Renderer {
    /// Renderer using the given math backend.
    pub fn new(math: Arc<dyn MathRenderer>) -> Self {
        Self { math: Some(math) }
    }

    /// Renderer without math support: answers are shown as raw text.
    pub fn plain() -> Self {
        Self { math: None }
    }

    pub fn from_config(config: &TutorConfig) -> Self {
        if config.render_math {
            Self::default()
        } else {
            Self::plain()
        }
    }

    /// Render an answer. Never fails; per-expression problems are reported in
    /// [`RenderedAnswer::warnings`].
    pub fn render(&self, answer: &Answer) -> RenderedAnswer {
        let Some(math) = self.math.as_deref() else {
            return RenderedAnswer {
                html: format!(
                    "<pre class=\"raw-answer\">{}</pre>\n",
                    escape_html(answer.as_str())
                ),
                math_rendered: false,
                math_count: 0,
                warnings: Vec::new(),
            };
        };

        let sub = substitute_math(answer.as_str(), math);
        let html = markdown_to_html(&sub.text);
        let html = splice_fragments(&html, &sub.fragments, |fragment| match fragment {
            Fragment::Math(trusted) => trusted.as_str().to_string(),
            Fragment::Literal(original) => escape_html(original),
        });

        debug!(
            "Rendered answer: {} bytes HTML, {} math expression(s), {} left as text",
            html.len(),
            sub.rendered_count(),
            sub.warnings.len()
        );

        RenderedAnswer {
            html,
            math_rendered: true,
            math_count: sub.rendered_count(),
            warnings: sub.warnings,
        }
    }
}

/// Replace every placeholder in `text` with `emit(fragment)`.
///
/// Placeholders pointing outside `fragments` are dropped.
pub(crate) fn splice_fragments(
    text: &str,
    fragments: &[Fragment],
    emit: impl Fn(&Fragment) -> String,
) -> String {
    RE_PLACEHOLDER
        .replace_all(text, |caps: &Captures| {
            caps[1]
                .parse::<usize>()
                .ok()
                .and_then(|idx| fragments.get(idx))
                .map(&emit)
                .unwrap_or_default()
        })
        .into_owned()
}

#[cfg(test)]
mod tests {
    use super::math::tests::FakeRenderer;
    use super::*;

    fn fake() -> Renderer {
        Renderer::new(Arc::new(FakeRenderer))
    }

    #[test]
    fn renders_math_inside_markdown() {
        let answer = Answer::new("## Solution\n\nSpeed is $v = d/t$.\n\n$$a = \\frac{v}{t}$$\n");
        let r = fake().render(&answer);
        assert!(r.html.contains("<h2>Solution</h2>"), "got: {}", r.html);
        assert!(r.html.contains("<m inline>v = d/t</m>"), "got: {}", r.html);
        assert!(r.html.contains("<m block>a = \\frac{v}{t}</m>"), "got: {}", r.html);
        assert_eq!(r.math_count, 2);
        assert!(r.warnings.is_empty());
    }

    #[test]
    fn no_raw_delimiter_pairs_survive() {
        let answer = Answer::new("$a$ $b$ $$c$$ text $d$\n\n- item $e_1$\n- $$f$$");
        let r = fake().render(&answer);
        assert!(!r.html.contains('$'), "got: {}", r.html);
        assert_eq!(r.math_count, 6);
    }

    #[test]
    fn malformed_expression_left_as_escaped_text() {
        let answer = Answer::new(r"Good $x$, bad $\frac{<b>}{$, good $y$");
        let r = fake().render(&answer);
        assert!(r.html.contains("<m inline>x</m>"));
        assert!(r.html.contains("<m inline>y</m>"));
        assert!(r.html.contains(r"$\frac{&lt;b&gt;}{$"), "got: {}", r.html);
        assert_eq!(r.warnings.len(), 1);
    }

    #[test]
    fn literal_math_is_not_emphasised_by_markdown() {
        // `_` pairs inside a failed expression must not turn into <em>.
        let answer = Answer::new(r"$a_b_c{$");
        let r = fake().render(&answer);
        assert!(!r.html.contains("<em>"), "got: {}", r.html);
    }

    #[test]
    fn model_html_is_escaped_but_math_is_not() {
        let answer = Answer::new("<img src=x onerror=alert(1)> $x$");
        let r = fake().render(&answer);
        assert!(!r.html.contains("<img"), "got: {}", r.html);
        assert!(r.html.contains("<m inline>x</m>"));
    }

    #[test]
    fn plain_renderer_shows_raw_text() {
        let answer = Answer::new("$$x$$ <b>");
        let r = Renderer::plain().render(&answer);
        assert!(!r.math_rendered);
        assert_eq!(r.html, "<pre class=\"raw-answer\">$$x$$ &lt;b&gt;</pre>\n");
    }

    #[test]
    fn from_config_respects_render_math() {
        let config = TutorConfig::builder().render_math(false).build().unwrap();
        let r = Renderer::from_config(&config).render(&Answer::new("$x$"));
        assert!(!r.math_rendered);
    }

    #[test]
    fn default_renderer_keeps_malformed_expression_literal() {
        let r = Renderer::default().render(&Answer::new(r"$a$ $\frac{1}{$ $b$"));
        assert_eq!(r.warnings.len(), 1, "got: {:?}", r.warnings);
        assert_eq!(r.math_count, 2);
        assert_eq!(r.html.matches("<math").count(), 2, "got: {}", r.html);
        assert!(r.html.contains(r"$\frac{1}{$"), "got: {}", r.html);
    }

    #[test]
    fn block_math_survives_stray_dollars_around_it() {
        let answer = Answer::new("Pay $5 now.\n\n$$F=ma$$\n\nThen $3 later.");
        let r = fake().render(&answer);
        assert!(r.html.contains("<m block>F=ma</m>"), "got: {}", r.html);
        assert!(!r.html.contains(math::PLACEHOLDER_OPEN), "got: {}", r.html);
        assert!(!r.html.contains(math::PLACEHOLDER_CLOSE), "got: {}", r.html);
        assert!(r.html.contains("Pay $5 now."), "got: {}", r.html);
    }

    #[test]
    fn default_renderer_emits_mathml() {
        let r = Renderer::default().render(&Answer::new("Newton: $F = ma$"));
        assert!(r.html.contains("<math"), "got: {}", r.html);
        assert!(!r.html.contains("$F"), "got: {}", r.html);
    }
}
