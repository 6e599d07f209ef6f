//! PDF rasterisation: render every page to a `DynamicImage` via pdfium.
//!
//! pdfium is not safe to drive from async contexts, so all work happens
//! inside `spawn_blocking`. Pages are scaled to the configured DPI and the
//! longest edge is capped at `max_rendered_pixels`, which keeps memory
//! bounded for oversized pages.

use crate::error::TranslateError;
use image::DynamicImage;
use pdfium_render::prelude::*;
use std::path::{Path, PathBuf};
use tracing::{debug, info};

/// Points per inch in PDF user space.
const POINTS_PER_INCH: f32 = 72.0;

/// Bind to pdfium: `PDFIUM_LIB_PATH` when it names an existing library,
/// otherwise the system library search path.
pub fn bind_pdfium() -> Result<Pdfium, TranslateError> {
    if let Ok(env_path) = std::env::var("PDFIUM_LIB_PATH") {
        let path = PathBuf::from(&env_path);
        if path.exists() {
            debug!("Binding pdfium from PDFIUM_LIB_PATH={}", path.display());
            return Pdfium::bind_to_library(&path)
                .map(Pdfium::new)
                .map_err(|e| TranslateError::PdfiumBindingFailed(format!("{}: {}", path.display(), e)));
        }
        debug!("PDFIUM_LIB_PATH '{}' does not exist; trying system library", env_path);
    }
    Pdfium::bind_to_system_library()
        .map(Pdfium::new)
        .map_err(|e| TranslateError::PdfiumBindingFailed(e.to_string()))
}

/// Scale factor for `dpi`, reduced so the longest edge of a
/// `width_pt` × `height_pt` page stays within `max_pixels`.
pub fn page_scale(width_pt: f32, height_pt: f32, dpi: u32, max_pixels: u32) -> f32 {
    let scale = dpi as f32 / POINTS_PER_INCH;
    let longest = width_pt.max(height_pt) * scale;
    if max_pixels > 0 && longest > max_pixels as f32 {
        scale * max_pixels as f32 / longest
    } else {
        scale
    }
}

/// Rasterise every page of a PDF, in page order.
pub async fn render_pages(
    pdf_path: &Path,
    dpi: u32,
    max_pixels: u32,
    password: Option<&str>,
) -> Result<Vec<DynamicImage>, TranslateError> {
    let path = pdf_path.to_path_buf();
    let password = password.map(str::to_string);

    tokio::task::spawn_blocking(move || {
        render_pages_blocking(&path, dpi, max_pixels, password.as_deref())
    })
    .await
    .map_err(|e| TranslateError::Internal(format!("Render task panicked: {}", e)))?
}

fn render_pages_blocking(
    pdf_path: &Path,
    dpi: u32,
    max_pixels: u32,
    password: Option<&str>,
) -> Result<Vec<DynamicImage>, TranslateError> {
    let pdfium = bind_pdfium()?;

    let document = pdfium
        .load_pdf_from_file(pdf_path, password)
        .map_err(|e| TranslateError::CorruptPdf {
            path: pdf_path.to_path_buf(),
            detail: format!("{:?}", e),
        })?;

    let pages = document.pages();
    let total_pages = pages.len() as usize;
    info!("PDF loaded: {} pages", total_pages);

    let mut results = Vec::with_capacity(total_pages);
    for (idx, page) in pages.iter().enumerate() {
        let scale = page_scale(page.width().value, page.height().value, dpi, max_pixels);
        let render_config = PdfRenderConfig::new().scale_page_by_factor(scale);

        let bitmap = page.render_with_config(&render_config).map_err(|e| {
            TranslateError::RasterisationFailed {
                page: idx + 1,
                detail: format!("{:?}", e),
            }
        })?;

        let image = bitmap.as_image();
        debug!(
            "Rendered page {} → {}x{} px",
            idx + 1,
            image.width(),
            image.height()
        );
        results.push(image);
    }

    Ok(results)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn scale_follows_dpi() {
        // US Letter at 150 DPI: 1275 x 1650, under the cap.
        let s = page_scale(612.0, 792.0, 150, 3000);
        assert!((s - 150.0 / 72.0).abs() < 1e-6);
    }

    #[test]
    fn scale_is_capped_by_longest_edge() {
        // US Letter at 300 DPI would be 3300 px tall.
        let s = page_scale(612.0, 792.0, 300, 3000);
        assert!((792.0 * s - 3000.0).abs() < 0.01);
    }

    #[test]
    fn zero_cap_means_uncapped() {
        let s = page_scale(612.0, 792.0, 300, 0);
        assert!((s - 300.0 / 72.0).abs() < 1e-6);
    }
}
