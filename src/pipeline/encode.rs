//! Image encoding: `DynamicImage` → PNG bytes, and PNG bytes → `ImageData`.
//!
//! The preview blob and the image attached to the analysis request are the
//! same PNG. PNG is lossless, so small résumé type survives both the preview
//! and the model's tiling.

use base64::{engine::general_purpose::STANDARD, Engine as _};
use edgequake_llm::ImageData;
use image::DynamicImage;
use std::io::Cursor;
use tracing::debug;

/// Encode a rendered page as PNG.
pub fn encode_png(img: &DynamicImage) -> Result<Vec<u8>, image::ImageError> {
    let mut buf = Vec::new();
    img.write_to(&mut Cursor::new(&mut buf), image::ImageFormat::Png)?;
    debug!(
        "Encoded {}x{} page → {} bytes PNG",
        img.width(),
        img.height(),
        buf.len()
    );
    Ok(buf)
}

/// Wrap PNG bytes as a base64 image attachment for a vision request.
///
/// `detail: "high"` keeps the model on full-resolution tiles; with the low
/// setting single-column body text is unreadable.
pub fn image_attachment(png: &[u8]) -> ImageData {
    ImageData::new(STANDARD.encode(png), "image/png").with_detail("high")
}
