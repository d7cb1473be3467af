//! Page rasterisation via pdfium: first-page previews and page counts.
//!
//! ## Why spawn_blocking?
//!
//! pdfium keeps thread-local state and is CPU-bound, so every call runs on
//! tokio's blocking pool rather than a runtime worker.

use super::encode::write_png_asset;
use super::figure::ASSETS_DIR;
use super::pdfium::{bind, open_document};
use crate::error::LensError;
use image::DynamicImage;
use pdfium_render::prelude::*;
use std::path::Path;
use tracing::{debug, info, warn};

/// PDF user-space units per inch.
pub const POINTS_PER_INCH: f32 = 72.0;

/// Number of pages in a PDF.
///
/// Doubles as the "can this document be opened at all" check before the
/// best-effort stages run.
pub async fn page_count(pdf_path: &Path) -> Result<usize, LensError> {
    let path = pdf_path.to_path_buf();
    tokio::task::spawn_blocking(move || {
        let pdfium = bind()?;
        let document = open_document(&pdfium, &path)?;
        let total = document.pages().len() as usize;
        info!("PDF loaded: {} pages", total);
        Ok(total)
    })
    .await
    .map_err(|e| LensError::Internal(format!("Page count task panicked: {}", e)))?
}

/// Render page 1 at `dpi` to `assets/<doc>_page1.png`.
///
/// Returns the output-root-relative path, or `None` for an empty document
/// or any failure along the way.
pub async fn render_first_page(
    pdf_path: &Path,
    out_dir: &Path,
    document_id: &str,
    dpi: u32,
) -> Option<String> {
    let path = pdf_path.to_path_buf();
    let out = out_dir.to_path_buf();
    let rel = format!("{ASSETS_DIR}/{document_id}_page1.png");

    let joined = tokio::task::spawn_blocking(move || -> Result<Option<String>, String> {
        let Some(image) = render_page_blocking(&path, 0, dpi as f32 / POINTS_PER_INCH)
            .map_err(|e| e.to_string())?
        else {
            return Ok(None);
        };
        write_png_asset(&image, &out, &rel)
            .map(Some)
            .map_err(|e| e.to_string())
    })
    .await;

    match joined {
        Ok(Ok(preview)) => preview,
        Ok(Err(e)) => {
            warn!("First-page preview failed: {}", e);
            None
        }
        Err(e) => {
            warn!("Preview task panicked: {}", e);
            None
        }
    }
}

/// Render one page at `scale` × its point size; `None` when the page does
/// not exist.
fn render_page_blocking(
    pdf_path: &Path,
    index: usize,
    scale: f32,
) -> Result<Option<DynamicImage>, LensError> {
    let pdfium = bind()?;
    let document = open_document(&pdfium, pdf_path)?;
    let pages = document.pages();
    if index >= pages.len() as usize {
        debug!("No page {} to render in {}", index + 1, pdf_path.display());
        return Ok(None);
    }

    let page = pages
        .get(index as u16)
        .map_err(|e| LensError::RasterisationFailed {
            page: index + 1,
            detail: format!("{:?}", e),
        })?;
    render_page(&page, index, scale).map(Some)
}

/// Rasterise an open page at `scale` × its point size.
pub(crate) fn render_page(
    page: &PdfPage,
    index: usize,
    scale: f32,
) -> Result<DynamicImage, LensError> {
    let render_config = PdfRenderConfig::new().scale_page_by_factor(scale);
    let bitmap = page
        .render_with_config(&render_config)
        .map_err(|e| LensError::RasterisationFailed {
            page: index + 1,
            detail: format!("{:?}", e),
        })?;

    let image = bitmap.as_image();
    debug!(
        "Rendered page {} → {}x{} px",
        index + 1,
        image.width(),
        image.height()
    );
    Ok(image)
}
