//! Tiling one tall raster across fixed-size pages.
//!
//! The captured answer is scaled to the page width and drawn once per page,
//! shifted up by one page height each time so every page shows the next
//! slice. Offsets are measured from the top of the page in points and are
//! zero or negative.

/// A4 portrait width in points.
pub const A4_WIDTH_PT: f32 = 595.28;
/// A4 portrait height in points.
pub const A4_HEIGHT_PT: f32 = 841.89;

/// Where the image sits on one page.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct PagePlacement {
    /// Zero-based page number.
    pub page_index: usize,
    /// Top edge of the image relative to the top of the page (≤ 0).
    pub offset_pt: f32,
}

/// Plan the pages for an image of `image_height` drawn on pages of
/// `page_height` (both in points, image already scaled to the page width).
///
/// Yields `ceil(image_height / page_height)` pages; page `i` shows the image
/// at `offset = -i * page_height`. An empty or degenerate image still yields
/// one page.
pub fn plan_pages(image_height: f32, page_height: f32) -> Vec<PagePlacement> {
    let count = if page_height.is_nan() || page_height <= 0.0 || !image_height.is_finite() {
        1
    } else {
        (image_height / page_height).ceil().max(1.0) as usize
    };

    (0..count)
        .map(|i| PagePlacement {
            page_index: i,
            offset_pt: -(i as f32) * page_height,
        })
        .collect()
}

/// Height in points of an image of `width_px` × `height_px` scaled to
/// `page_width` points wide.
pub fn scaled_height(width_px: u32, height_px: u32, page_width: f32) -> f32 {
    if width_px == 0 {
        return 0.0;
    }
    height_px as f32 * page_width / width_px as f32
}

/// PDF coordinates start at the bottom-left corner. Convert a top-relative
/// offset into the y of the image's bottom edge.
pub fn bottom_origin_y(page_height: f32, offset_pt: f32, image_height: f32) -> f32 {
    page_height - (offset_pt + image_height)
}
