//! Input collection: turn free text and an optional image into a [`Request`].
//!
//! This stage is the only validation gate before the network. A submission
//! with neither text nor an image is rejected here with
//! [`TutorError::EmptyRequest`] and the service is never called.
//!
//! Image files go through the same filter a file picker would apply
//! (`image/png`, `image/jpeg`, `image/webp`). The type is sniffed from the
//! magic bytes first, so a mislabelled extension still works; the extension
//! is only consulted when the content is unrecognisable. There is no size
//! limit: large files are passed through unchanged.

use crate::error::TutorError;
use crate::pipeline::encode::encode_image;
use crate::pipeline::llm::ContentPart;
use image::ImageFormat;
use std::path::{Path, PathBuf};
use tracing::debug;

/// MIME types accepted for the question image.
pub const ACCEPTED_MIME_TYPES: [&str; 3] = ["image/png", "image/jpeg", "image/webp"];

/// A single image attached to a question.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ImageAttachment {
    /// Original file name, when the image came from disk.
    pub file_name: Option<String>,
    /// One of [`ACCEPTED_MIME_TYPES`].
    pub mime_type: &'static str,
    /// Raw file bytes, exactly as read.
    pub bytes: Vec<u8>,
}

impl ImageAttachment {
    /// Wrap in-memory bytes, sniffing the MIME type from their content.
    pub fn from_bytes(bytes: Vec<u8>) -> Result<Self, TutorError> {
        let mime_type =
            sniff_mime(&bytes, None).ok_or_else(|| TutorError::UnsupportedImage {
                path: PathBuf::from("<memory>"),
                detail: "content is not a PNG, JPEG or WebP image".into(),
            })?;
        Ok(Self {
            file_name: None,
            mime_type,
            bytes,
        })
    }
}

/// A validated question, ready to be sent.
///
/// Invariant: at least one of `text` / `image` is present. The only way to
/// construct a `Request` is [`collect`], which enforces it.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Request {
    text: Option<String>,
    image: Option<ImageAttachment>,
}

impl Request {
    pub fn text(&self) -> Option<&str> {
        self.text.as_deref()
    }

    pub fn image(&self) -> Option<&ImageAttachment> {
        self.image.as_ref()
    }

    /// Content parts in wire order: text first, then the image.
    pub fn content_parts(&self) -> Vec<ContentPart> {
        let mut parts = Vec::with_capacity(2);
        if let Some(text) = &self.text {
            parts.push(ContentPart::text(text.clone()));
        }
        if let Some(image) = &self.image {
            parts.push(ContentPart::inline(encode_image(image)));
        }
        parts
    }
}

/// Validate the student's input and build a [`Request`].
///
/// Whitespace-only text counts as absent. Text that is present is kept
/// verbatim (no trimming) so the model sees exactly what was typed.
pub fn collect(
    text: Option<String>,
    image: Option<ImageAttachment>,
) -> Result<Request, TutorError> {
    let text = text.filter(|t| !t.trim().is_empty());
    if text.is_none() && image.is_none() {
        return Err(TutorError::EmptyRequest);
    }
    debug!(
        "Collected request: text={} chars, image={}",
        text.as_ref().map(|t| t.chars().count()).unwrap_or(0),
        image
            .as_ref()
            .map(|i| format!("{} ({} bytes)", i.mime_type, i.bytes.len()))
            .unwrap_or_else(|| "none".into())
    );
    Ok(Request { text, image })
}

/// Read an image file from disk, applying the accepted-type filter.
pub async fn load_image(path: impl AsRef<Path>) -> Result<ImageAttachment, TutorError> {
    let path = path.as_ref();
    let bytes = tokio::fs::read(path).await.map_err(|e| match e.kind() {
        std::io::ErrorKind::NotFound => TutorError::ImageNotFound {
            path: path.to_path_buf(),
        },
        std::io::ErrorKind::PermissionDenied => TutorError::PermissionDenied {
            path: path.to_path_buf(),
        },
        _ => TutorError::UnsupportedImage {
            path: path.to_path_buf(),
            detail: format!("could not be read: {e}"),
        },
    })?;

    let mime_type = sniff_mime(&bytes, Some(path)).ok_or_else(|| TutorError::UnsupportedImage {
        path: path.to_path_buf(),
        detail: "not a PNG, JPEG or WebP image".into(),
    })?;

    debug!(
        "Loaded image {} → {} ({} bytes)",
        path.display(),
        mime_type,
        bytes.len()
    );

    Ok(ImageAttachment {
        file_name: path.file_name().map(|n| n.to_string_lossy().into_owned()),
        mime_type,
        bytes,
    })
}

/// Determine the MIME type of an image, or `None` if it is not accepted.
///
/// Content wins over the extension: a recognised but unaccepted format
/// (GIF, BMP, …) is rejected even if the file is named `*.png`.
pub fn sniff_mime(bytes: &[u8], path: Option<&Path>) -> Option<&'static str> {
    match image::guess_format(bytes) {
        Ok(format) => accepted_mime(format),
        Err(_) => path
            .and_then(|p| ImageFormat::from_path(p).ok())
            .and_then(accepted_mime),
    }
}

fn accepted_mime(format: ImageFormat) -> Option<&'static str> {
    match format {
        ImageFormat::Png => Some("image/png"),
        ImageFormat::Jpeg => Some("image/jpeg"),
        ImageFormat::WebP => Some("image/webp"),
        _ => None,
    }
}
