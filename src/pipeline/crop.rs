//! Region cropping: rasterise selected regions to `slices/<id>.png`.
//!
//! Each page is rendered at most once per call, however many regions it
//! holds. The clip is the region's bbox padded on every side and clamped to
//! the page.

use super::encode::write_png_asset;
use super::geometry::Rect;
use super::pdfium::{bind, open_document};
use super::render::render_page;
use crate::candidate::{BBox, SelectedRegion};
use crate::error::LensError;
use image::DynamicImage;
use std::collections::HashMap;
use std::path::Path;
use tracing::{debug, info};

/// Subdirectory of the output root holding cropped regions.
pub const SLICES_DIR: &str = "slices";

/// Rasterise `regions`, returning output-root-relative paths in input order.
///
/// A region whose page does not exist is an error: regions are expected to
/// come from an extraction pass over the same document.
pub async fn crop_regions(
    pdf_path: &Path,
    out_dir: &Path,
    regions: &[SelectedRegion],
    pad: f64,
    zoom: f32,
) -> Result<Vec<String>, LensError> {
    if regions.is_empty() {
        return Ok(Vec::new());
    }
    let path = pdf_path.to_path_buf();
    let out = out_dir.to_path_buf();
    let regions = regions.to_vec();

    tokio::task::spawn_blocking(move || crop_blocking(&path, &out, &regions, pad, zoom))
        .await
        .map_err(|e| LensError::Internal(format!("Crop task panicked: {}", e)))?
}

fn crop_blocking(
    pdf_path: &Path,
    out_dir: &Path,
    regions: &[SelectedRegion],
    pad: f64,
    zoom: f32,
) -> Result<Vec<String>, LensError> {
    let pdfium = bind()?;
    let document = open_document(&pdfium, pdf_path)?;
    let pages = document.pages();
    let total = pages.len() as usize;

    // page index → (rendered image, page width, page height) in points
    let mut rendered: HashMap<usize, (DynamicImage, f64, f64)> = HashMap::new();
    let mut written = Vec::with_capacity(regions.len());

    for region in regions {
        if region.page >= total {
            return Err(LensError::RasterisationFailed {
                page: region.page + 1,
                detail: format!("page out of range (document has {} pages)", total),
            });
        }

        if !rendered.contains_key(&region.page) {
            let page = pages
                .get(region.page as u16)
                .map_err(|e| LensError::RasterisationFailed {
                    page: region.page + 1,
                    detail: format!("{:?}", e),
                })?;
            let image = render_page(&page, region.page, zoom)?;
            let size = (page.width().value as f64, page.height().value as f64);
            rendered.insert(region.page, (image, size.0, size.1));
        }
        let Some((image, page_w, page_h)) = rendered.get(&region.page) else {
            continue;
        };

        let clip = clip_rect(region.bbox, pad).clamp_to(*page_w, *page_h);
        let Some((x, y, w, h)) = pixel_box(&clip, *page_w, image.width(), image.height()) else {
            return Err(LensError::RasterisationFailed {
                page: region.page + 1,
                detail: format!("region {} has an empty clip", region.id),
            });
        };

        let slice = image.crop_imm(x, y, w, h);
        let rel = format!("{SLICES_DIR}/{}.png", region.id);
        let path = write_png_asset(&slice, out_dir, &rel).map_err(|e| {
            LensError::OutputWriteFailed {
                path: out_dir.join(&rel),
                source: std::io::Error::other(e.to_string()),
            }
        })?;
        debug!("Cropped {} on page {} → {}x{} px", region.id, region.page + 1, w, h);
        written.push(path);
    }

    info!("Cropped {} regions", written.len());
    Ok(written)
}

/// The bbox grown by `pad` points on every side.
pub fn clip_rect(bbox: BBox, pad: f64) -> Rect {
    Rect::from_bbox(bbox).expand(pad)
}

/// Map a clip in page points onto a rendered bitmap.
///
/// The scale comes from the bitmap itself so rounding in the renderer never
/// shifts the crop. `None` when nothing of the clip lands on the bitmap.
pub fn pixel_box(clip: &Rect, page_width: f64, img_w: u32, img_h: u32) -> Option<(u32, u32, u32, u32)> {
    if page_width <= 0.0 || img_w == 0 || img_h == 0 {
        return None;
    }
    let scale = img_w as f64 / page_width;
    let x0 = (clip.x0 * scale).floor().clamp(0.0, img_w as f64) as u32;
    let y0 = (clip.y0 * scale).floor().clamp(0.0, img_h as f64) as u32;
    let x1 = (clip.x1 * scale).ceil().clamp(0.0, img_w as f64) as u32;
    let y1 = (clip.y1 * scale).ceil().clamp(0.0, img_h as f64) as u32;
    if x1 <= x0 || y1 <= y0 {
        return None;
    }
    Some((x0, y0, x1 - x0, y1 - y0))
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::candidate::CandidateKind;

    #[test]
    fn clip_is_padded_on_every_side() {
        let clip = clip_rect((100.0, 100.0, 200.0, 150.0), 8.0);
        assert_eq!(clip.to_bbox(), (92.0, 92.0, 208.0, 158.0));
    }

    #[test]
    fn clip_is_clamped_to_the_page() {
        let clip = clip_rect((2.0, 780.0, 100.0, 790.0), 8.0).clamp_to(612.0, 792.0);
        assert_eq!(clip.to_bbox(), (0.0, 772.0, 108.0, 792.0));
    }

    #[test]
    fn pixel_box_scales_by_zoom() {
        let clip = Rect::new(92.0, 92.0, 208.0, 158.0);
        assert_eq!(pixel_box(&clip, 612.0, 1224, 1584), Some((184, 184, 232, 132)));
    }

    #[test]
    fn pixel_box_rejects_clips_off_the_bitmap() {
        let clip = Rect::new(700.0, 10.0, 720.0, 20.0);
        assert_eq!(pixel_box(&clip, 612.0, 1224, 1584), None);
    }

    #[tokio::test]
    async fn nothing_to_crop_touches_nothing() {
        let dir = tempfile::tempdir().unwrap();
        let paths = crop_regions(&dir.path().join("absent.pdf"), dir.path(), &[], 8.0, 2.0)
            .await
            .unwrap();
        assert!(paths.is_empty());
    }

    #[tokio::test]
    async fn unreadable_document_is_fatal() {
        let dir = tempfile::tempdir().unwrap();
        let region = SelectedRegion {
            id: "chart-0-0".into(),
            kind: CandidateKind::Chart,
            score: 50.0,
            page: 0,
            bbox: (10.0, 10.0, 50.0, 50.0),
        };
        let result =
            crop_regions(&dir.path().join("absent.pdf"), dir.path(), &[region], 8.0, 2.0).await;
        assert!(result.is_err());
    }
}
