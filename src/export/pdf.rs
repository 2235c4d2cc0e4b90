//! PDF export: capture the answer as one tall raster, then tile it across
//! A4 portrait pages.
//!
//! ## Why a raster?
//!
//! The exported file is a picture of the answer, the same way a screenshot
//! of the rendered page would be. That keeps every page looking exactly like
//! the capture regardless of which fonts the reader has installed.
//!
//! ## Why strips?
//!
//! The capture is typeset on pdfium pages of A4 width. A very long answer
//! would need a single page taller than pdfium will rasterise comfortably, so
//! the lines are split into strips of at most [`MAX_STRIP_PT`] that are
//! rendered separately and stacked into one image.
//!
//! All pdfium calls are blocking; [`crate::export::export_pdf`] moves them
//! onto `spawn_blocking`.

use crate::config::PdfExportConfig;
use crate::error::TutorError;
use crate::export::layout::{layout_answer, Line, LineStyle};
use crate::export::paginate::{bottom_origin_y, plan_pages, scaled_height, A4_HEIGHT_PT, A4_WIDTH_PT};
use crate::output::Answer;
use image::{imageops, DynamicImage, Rgba, RgbaImage};
use pdfium_render::prelude::*;
use std::io::Write;
use std::path::{Path, PathBuf};
use tracing::{debug, info};

/// Tallest capture page rendered in one go, in points.
pub const MAX_STRIP_PT: f32 = 4000.0;

/// Result of a successful export.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct PdfReport {
    pub path: PathBuf,
    pub pages: usize,
}

/// Turns an answer into one tall image of A4 proportions (width-wise).
pub trait AnswerRasterizer: Send + Sync {
    fn rasterize(&self, answer: &Answer) -> Result<DynamicImage, TutorError>;
}

/// Writes an answer to a paginated PDF file. Blocking.
pub trait PdfExporter: Send + Sync {
    fn export(&self, answer: &Answer, path: &Path) -> Result<PdfReport, TutorError>;
}

/// pdfium-backed capture and writer.
///
/// Binds to pdfium through `pdfium-auto`, which downloads and caches the
/// library on first use (or honours `PDFIUM_LIB_PATH`).
#[derive(Debug, Clone, Default)]
pub struct PdfiumExporter {
    config: PdfExportConfig,
}

impl PdfiumExporter {
    pub fn new(config: PdfExportConfig) -> Self {
        Self { config }
    }

    fn bind() -> Result<Pdfium, TutorError> {
        pdfium_auto::bind_pdfium_silent().map_err(|e| TutorError::PdfiumBindingFailed(e.to_string()))
    }
}

impl AnswerRasterizer for PdfiumExporter {
    fn rasterize(&self, answer: &Answer) -> Result<DynamicImage, TutorError> {
        let pdfium = Self::bind()?;
        capture_answer(&pdfium, answer, &self.config)
    }
}

impl PdfExporter for PdfiumExporter {
    fn export(&self, answer: &Answer, path: &Path) -> Result<PdfReport, TutorError> {
        let pdfium = Self::bind()?;
        let capture = capture_answer(&pdfium, answer, &self.config)?;
        let (bytes, pages) = paginate_image(&pdfium, &capture)?;
        write_atomic(path, &bytes)?;
        info!("Wrote {} ({} page(s), {} bytes)", path.display(), pages, bytes.len());
        Ok(PdfReport {
            path: path.to_path_buf(),
            pages,
        })
    }
}

/// Group lines into strips no taller than `max_height` (at least one line each).
pub fn split_strips(lines: &[Line], font_size: f32, max_height: f32) -> Vec<&[Line]> {
    let mut strips = Vec::new();
    let mut start = 0;
    let mut height = 0.0;
    for (i, line) in lines.iter().enumerate() {
        let h = line.height(font_size);
        if height + h > max_height && i > start {
            strips.push(&lines[start..i]);
            start = i;
            height = 0.0;
        }
        height += h;
    }
    if start < lines.len() {
        strips.push(&lines[start..]);
    }
    strips
}

fn pdf_err(context: &str) -> impl Fn(PdfiumError) -> TutorError + '_ {
    move |e| TutorError::PdfExportFailed {
        detail: format!("{context}: {e:?}"),
    }
}

/// Typeset `answer` and rasterise it to one image `raster_width_px` wide.
pub fn capture_answer(
    pdfium: &Pdfium,
    answer: &Answer,
    config: &PdfExportConfig,
) -> Result<DynamicImage, TutorError> {
    let font_size = config.font_size_pt;
    let margin = config.margin_pt;
    let lines = layout_answer(answer, font_size, A4_WIDTH_PT - 2.0 * margin);
    let strips = split_strips(&lines, font_size, MAX_STRIP_PT);
    debug!("Capture: {} line(s) in {} strip(s)", lines.len(), strips.len());

    let mut document = pdfium.create_new_pdf().map_err(pdf_err("create capture document"))?;
    let body = document.fonts_mut().helvetica();
    let bold = document.fonts_mut().helvetica_bold();
    let mono = document.fonts_mut().courier();

    let render_config = PdfRenderConfig::new().set_target_width(config.raster_width_px as i32);
    let mut images = Vec::with_capacity(strips.len());

    // An empty answer still captures one blank strip.
    let empty: &[Line] = &[];
    let strips = if strips.is_empty() { vec![empty] } else { strips };
    let last = strips.len() - 1;
    for (idx, strip) in strips.into_iter().enumerate() {
        let top = if idx == 0 { margin } else { 0.0 };
        let bottom = if idx == last { margin } else { 0.0 };
        let content: f32 = strip.iter().map(|l| l.height(font_size)).sum();
        let page_height = (top + content + bottom).max(1.0);

        let mut page = document
            .pages_mut()
            .create_page_at_end(PdfPagePaperSize::from_points(
                PdfPoints::new(A4_WIDTH_PT),
                PdfPoints::new(page_height),
            ))
            .map_err(pdf_err("create capture page"))?;

        let mut cursor = top;
        for line in strip {
            let h = line.height(font_size);
            cursor += h;
            if line.style == LineStyle::Blank || line.text.is_empty() {
                continue;
            }
            let font = match line.style {
                LineStyle::Heading(_) => bold,
                LineStyle::Code => mono,
                _ => body,
            };
            // Baseline sits a quarter of the line height above its bottom.
            let baseline = page_height - cursor + h * 0.25;
            page.objects_mut()
                .create_text_object(
                    PdfPoints::new(margin + line.indent_pt),
                    PdfPoints::new(baseline),
                    &line.text,
                    font,
                    PdfPoints::new(font_size * line.style.scale()),
                )
                .map_err(pdf_err("place text"))?;
        }

        let bitmap = page
            .render_with_config(&render_config)
            .map_err(pdf_err("rasterise capture"))?;
        images.push(bitmap.as_image());
    }

    Ok(stack_vertically(&images))
}

/// Stack images top to bottom on a white canvas as wide as the widest one.
pub fn stack_vertically(images: &[DynamicImage]) -> DynamicImage {
    let width = images.iter().map(|i| i.width()).max().unwrap_or(1).max(1);
    let height = images.iter().map(|i| i.height()).sum::<u32>().max(1);
    let mut canvas = RgbaImage::from_pixel(width, height, Rgba([255, 255, 255, 255]));
    let mut y = 0i64;
    for image in images {
        imageops::overlay(&mut canvas, &image.to_rgba8(), 0, y);
        y += image.height() as i64;
    }
    DynamicImage::ImageRgba8(canvas)
}

/// Draw `capture` scaled to A4 width on as many A4 pages as it needs.
///
/// Returns the serialised PDF and its page count.
pub fn paginate_image(pdfium: &Pdfium, capture: &DynamicImage) -> Result<(Vec<u8>, usize), TutorError> {
    let image_height = scaled_height(capture.width(), capture.height(), A4_WIDTH_PT);
    let plan = plan_pages(image_height, A4_HEIGHT_PT);
    debug!(
        "Paginating {}x{} px capture ({:.0}pt tall) over {} page(s)",
        capture.width(),
        capture.height(),
        image_height,
        plan.len()
    );

    let mut document = pdfium.create_new_pdf().map_err(pdf_err("create document"))?;
    for placement in &plan {
        let mut page = document
            .pages_mut()
            .create_page_at_end(PdfPagePaperSize::a4())
            .map_err(pdf_err("add page"))?;
        let y = bottom_origin_y(A4_HEIGHT_PT, placement.offset_pt, image_height);
        page.objects_mut()
            .create_image_object(
                PdfPoints::new(0.0),
                PdfPoints::new(y),
                capture,
                Some(PdfPoints::new(A4_WIDTH_PT)),
                Some(PdfPoints::new(image_height)),
            )
            .map_err(pdf_err("place image"))?;
    }

    let bytes = document.save_to_bytes().map_err(pdf_err("serialise document"))?;
    Ok((bytes, plan.len()))
}

/// Write via a temp file in the target directory, then rename over `path`.
pub(crate) fn write_atomic(path: &Path, bytes: &[u8]) -> Result<(), TutorError> {
    let write_err = |source: std::io::Error| TutorError::OutputWriteFailed {
        path: path.to_path_buf(),
        source,
    };

    let parent = match path.parent() {
        Some(p) if !p.as_os_str().is_empty() => p.to_path_buf(),
        _ => PathBuf::from("."),
    };
    std::fs::create_dir_all(&parent).map_err(write_err)?;

    let mut tmp = tempfile::NamedTempFile::new_in(&parent).map_err(write_err)?;
    tmp.write_all(bytes).map_err(write_err)?;
    tmp.flush().map_err(write_err)?;
    tmp.persist(path).map_err(|e| write_err(e.error))?;
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;

    fn body(n: usize) -> Vec<Line> {
        (0..n)
            .map(|i| Line {
                text: format!("line {i}"),
                style: LineStyle::Body,
                indent_pt: 0.0,
            })
            .collect()
    }

    #[test]
    fn strips_respect_max_height() {
        let lines = body(100);
        let per_line = lines[0].height(10.0);
        let strips = split_strips(&lines, 10.0, per_line * 30.0 + 0.1);
        assert_eq!(strips.iter().map(|s| s.len()).collect::<Vec<_>>(), vec![30, 30, 30, 10]);
    }

    #[test]
    fn oversized_line_gets_its_own_strip() {
        let lines = body(3);
        let strips = split_strips(&lines, 10.0, 1.0);
        assert_eq!(strips.len(), 3);
    }

    #[test]
    fn no_lines_no_strips() {
        assert!(split_strips(&[], 10.0, 100.0).is_empty());
    }

    #[test]
    fn stacking_sums_heights() {
        let a = DynamicImage::ImageRgba8(RgbaImage::from_pixel(10, 4, Rgba([0, 0, 0, 255])));
        let b = DynamicImage::ImageRgba8(RgbaImage::from_pixel(8, 6, Rgba([0, 0, 0, 255])));
        let stacked = stack_vertically(&[a, b]);
        assert_eq!((stacked.width(), stacked.height()), (10, 10));
        let px = stacked.to_rgba8();
        // Right of the narrower lower image stays white.
        assert_eq!(px.get_pixel(9, 9), &Rgba([255, 255, 255, 255]));
        assert_eq!(px.get_pixel(0, 9), &Rgba([0, 0, 0, 255]));
    }

    #[test]
    fn atomic_write_replaces_file() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("nested").join("out.pdf");
        write_atomic(&path, b"first").unwrap();
        write_atomic(&path, b"second").unwrap();
        assert_eq!(std::fs::read(&path).unwrap(), b"second");
        let leftovers = std::fs::read_dir(path.parent().unwrap()).unwrap().count();
        assert_eq!(leftovers, 1);
    }
}
