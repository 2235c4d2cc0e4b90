//! Line layout of an answer for the raster capture.
//!
//! The capture is a typeset reading of the answer, not a browser screenshot:
//! Markdown structure becomes line styles (headings, bullets, code) and math
//! is shown as its LaTeX source without delimiters. Wrapping uses an average
//! glyph width per font, which is close enough for the PDF standard fonts.

use crate::error::MathMode;
use crate::output::Answer;
use crate::render::math::{substitute_math, Fragment, MathRenderer};
use crate::render::splice_fragments;
use pulldown_cmark::{Event, HeadingLevel, Options, Parser, Tag, TagEnd};
use textwrap::WordSplitter;

/// How a line is typeset.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum LineStyle {
    Body,
    /// Heading level 1–6.
    Heading(u8),
    /// Monospaced code block line.
    Code,
    /// Empty vertical gap.
    Blank,
}

impl LineStyle {
    /// Font size relative to the body size.
    pub fn scale(self) -> f32 {
        match self {
            LineStyle::Heading(1) => 1.6,
            LineStyle::Heading(2) => 1.35,
            LineStyle::Heading(3) => 1.15,
            LineStyle::Heading(_) => 1.05,
            LineStyle::Code => 0.95,
            LineStyle::Body => 1.0,
            LineStyle::Blank => 0.6,
        }
    }

    /// Average advance of one glyph as a fraction of the font size.
    fn glyph_width(self) -> f32 {
        match self {
            LineStyle::Code => 0.6,
            LineStyle::Heading(_) => 0.56,
            _ => 0.5,
        }
    }
}

/// One typeset line.
#[derive(Debug, Clone, PartialEq)]
pub struct Line {
    pub text: String,
    pub style: LineStyle,
    /// Left indent in points.
    pub indent_pt: f32,
}

impl Line {
    /// Vertical space the line occupies at `font_size`.
    pub fn height(&self, font_size: f32) -> f32 {
        font_size * self.style.scale() * 1.45
    }
}

/// Keeps LaTeX source in place of rendered math.
struct SourceMath;

impl MathRenderer for SourceMath {
    fn render(&self, latex: &str, _mode: MathMode) -> Result<String, String> {
        Ok(latex.trim().to_string())
    }
}

/// Lay out `answer` into lines no wider than `width_pt` at `font_size`.
pub fn layout_answer(answer: &Answer, font_size: f32, width_pt: f32) -> Vec<Line> {
    // Math goes behind placeholders first so `_` and `*` in LaTeX are not
    // read as emphasis.
    let sub = substitute_math(answer.as_str(), &SourceMath);
    let restore = |text: &str| {
        splice_fragments(text, &sub.fragments, |fragment| match fragment {
            Fragment::Math(source) => source.as_str().to_string(),
            Fragment::Literal(original) => original.clone(),
        })
    };

    let mut builder = LineBuilder::new(font_size, width_pt);
    let options = Options::ENABLE_TABLES | Options::ENABLE_STRIKETHROUGH;

    for event in Parser::new_ext(&sub.text, options) {
        match event {
            Event::Start(Tag::Heading { level, .. }) => {
                builder.flush();
                builder.style = LineStyle::Heading(heading_number(level));
            }
            Event::End(TagEnd::Heading(_)) => {
                builder.flush();
                builder.style = LineStyle::Body;
                builder.blank();
            }
            Event::End(TagEnd::Paragraph) => {
                builder.flush();
                if builder.list_depth == 0 {
                    builder.blank();
                }
            }
            Event::Start(Tag::List(start)) => {
                builder.flush();
                builder.list_depth += 1;
                builder.counters.push(start);
            }
            Event::End(TagEnd::List(_)) => {
                builder.flush();
                builder.list_depth = builder.list_depth.saturating_sub(1);
                builder.counters.pop();
                if builder.list_depth == 0 {
                    builder.blank();
                }
            }
            Event::Start(Tag::Item) => {
                builder.flush();
                let marker = match builder.counters.last_mut() {
                    Some(Some(n)) => {
                        let marker = format!("{n}. ");
                        *n += 1;
                        marker
                    }
                    _ => "\u{2022} ".to_string(),
                };
                builder.current.push_str(&marker);
            }
            Event::End(TagEnd::Item) => builder.flush(),
            Event::Start(Tag::CodeBlock(_)) => {
                builder.flush();
                builder.style = LineStyle::Code;
            }
            Event::End(TagEnd::CodeBlock) => {
                builder.flush();
                builder.style = LineStyle::Body;
                builder.blank();
            }
            Event::Text(text) if builder.style == LineStyle::Code => {
                for raw_line in restore(&text).lines() {
                    builder.code_line(raw_line);
                }
            }
            Event::Text(text) | Event::Code(text) => builder.current.push_str(&restore(&text)),
            Event::Html(raw) | Event::InlineHtml(raw) => builder.current.push_str(&restore(&raw)),
            Event::SoftBreak => builder.current.push(' '),
            Event::HardBreak | Event::End(TagEnd::TableRow) | Event::End(TagEnd::TableHead) => {
                builder.flush()
            }
            Event::End(TagEnd::TableCell) => builder.current.push_str("   "),
            Event::End(TagEnd::Table) => {
                builder.flush();
                builder.blank();
            }
            Event::Rule => {
                builder.flush();
                builder.current.push_str(&"\u{2014}".repeat(12));
                builder.flush();
                builder.blank();
            }
            _ => {}
        }
    }
    builder.flush();
    builder.finish()
}

fn heading_number(level: HeadingLevel) -> u8 {
    match level {
        HeadingLevel::H1 => 1,
        HeadingLevel::H2 => 2,
        HeadingLevel::H3 => 3,
        HeadingLevel::H4 => 4,
        HeadingLevel::H5 => 5,
        HeadingLevel::H6 => 6,
    }
}

struct LineBuilder {
    font_size: f32,
    width_pt: f32,
    style: LineStyle,
    list_depth: usize,
    counters: Vec<Option<u64>>,
    current: String,
    lines: Vec<Line>,
}

impl LineBuilder {
    fn new(font_size: f32, width_pt: f32) -> Self {
        Self {
            font_size,
            width_pt,
            style: LineStyle::Body,
            list_depth: 0,
            counters: Vec::new(),
            current: String::new(),
            lines: Vec::new(),
        }
    }

    fn indent(&self) -> f32 {
        self.list_depth as f32 * self.font_size * 1.5
    }

    fn max_chars(&self) -> usize {
        let size = self.font_size * self.style.scale();
        let usable = (self.width_pt - self.indent()).max(size);
        ((usable / (size * self.style.glyph_width())) as usize).max(8)
    }

    /// Emit the pending text, wrapped.
    fn flush(&mut self) {
        let text = std::mem::take(&mut self.current);
        let text = text.trim();
        if text.is_empty() {
            return;
        }
        self.push_wrapped(text);
    }

    /// Code lines keep their leading spaces and may be empty.
    fn code_line(&mut self, raw: &str) {
        self.push_wrapped(raw.trim_end());
    }

    fn push_wrapped(&mut self, text: &str) {
        let max = self.max_chars();
        let indent_pt = self.indent();
        let pieces = if self.style == LineStyle::Code {
            wrap_code(text, max)
        } else {
            wrap(text, max)
        };
        for piece in pieces {
            self.lines.push(Line {
                text: piece,
                style: self.style,
                indent_pt,
            });
        }
    }

    /// One blank gap, never two in a row.
    fn blank(&mut self) {
        if matches!(self.lines.last(), Some(l) if l.style != LineStyle::Blank) {
            self.lines.push(Line {
                text: String::new(),
                style: LineStyle::Blank,
                indent_pt: 0.0,
            });
        }
    }

    fn finish(mut self) -> Vec<Line> {
        while matches!(self.lines.last(), Some(l) if l.style == LineStyle::Blank) {
            self.lines.pop();
        }
        self.lines
    }
}

/// Word wrap at `max` columns; words longer than a line are broken.
pub fn wrap(text: &str, max: usize) -> Vec<String> {
    wrap_with(text, textwrap::Options::new(max.max(1)))
}

/// Like [`wrap`] but never hyphenates, and leading indentation is kept.
pub fn wrap_code(text: &str, max: usize) -> Vec<String> {
    wrap_with(
        text,
        textwrap::Options::new(max.max(1)).word_splitter(WordSplitter::NoHyphenation),
    )
}

fn wrap_with(text: &str, options: textwrap::Options<'_>) -> Vec<String> {
    textwrap::wrap(text, options)
        .into_iter()
        .map(|line| line.into_owned())
        .collect()
}
