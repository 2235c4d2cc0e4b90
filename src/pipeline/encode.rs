//! Image encoding: [`ImageAttachment`] → base64 [`InlineData`].
//!
//! Multimodal APIs accept images as base64 strings embedded in the JSON
//! request body alongside a declared MIME type. The original file bytes are
//! encoded as-is; re-encoding a phone photo to PNG would only inflate it.

use crate::pipeline::input::ImageAttachment;
use crate::pipeline::llm::InlineData;
use base64::{engine::general_purpose::STANDARD, Engine as _};
use tracing::debug;

/// Encode an attached image for the request body.
pub fn encode_image(image: &ImageAttachment) -> InlineData {
    let data = STANDARD.encode(&image.bytes);
    debug!(
        "Encoded {} image: {} bytes → {} bytes base64",
        image.mime_type,
        image.bytes.len(),
        data.len()
    );
    InlineData {
        data,
        mime_type: image.mime_type.to_string(),
    }
}
