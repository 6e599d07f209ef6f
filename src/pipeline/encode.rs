//! Image encoding: `DynamicImage` → base64 PNG wrapped in `ImageData`.
//!
//! Rendered PDF pages and uploaded images take the same route: whatever the
//! input format, the vision request carries a lossless PNG with
//! `detail: "high"` so fine print and small table cells stay legible.

use crate::error::TranslateError;
use base64::{engine::general_purpose::STANDARD, Engine as _};
use edgequake_llm::ImageData;
use image::DynamicImage;
use std::io::Cursor;
use std::path::Path;
use tracing::debug;

/// Encode a rasterised page as a base64 PNG ready for the vision request.
pub fn encode_page(img: &DynamicImage) -> Result<ImageData, image::ImageError> {
    let mut buf = Vec::new();
    img.write_to(&mut Cursor::new(&mut buf), image::ImageFormat::Png)?;

    let b64 = STANDARD.encode(&buf);
    debug!("Encoded image → {} bytes base64", b64.len());

    Ok(ImageData::new(b64, "image/png").with_detail("high"))
}

/// Decode an image file of any supported format and re-encode it as PNG.
pub async fn encode_image_file(path: &Path) -> Result<ImageData, TranslateError> {
    let owned = path.to_path_buf();
    tokio::task::spawn_blocking(move || {
        let img = image::open(&owned).map_err(|e| TranslateError::ImageDecode {
            path: owned.clone(),
            detail: e.to_string(),
        })?;
        debug!(
            "Decoded {} → {}x{} px",
            owned.display(),
            img.width(),
            img.height()
        );
        encode_page(&img).map_err(|e| TranslateError::ImageDecode {
            path: owned.clone(),
            detail: e.to_string(),
        })
    })
    .await
    .map_err(|e| TranslateError::Internal(format!("Image task panicked: {}", e)))?
}
