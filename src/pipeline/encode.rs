//! Image encoding: `DynamicImage` → RGB PNG asset under the output root.
//!
//! Every image this crate writes (thumbnails, hero figures, slices, page
//! previews) goes through [`write_png_asset`]. Assets are always flattened
//! to 8-bit RGB: embedded PDF images arrive as grey, CMYK-converted or RGBA
//! buffers and the renderer downstream expects plain opaque PNGs.
//!
//! Paths handed back to callers are relative to the output root and always
//! use `/`, so a digest written on one machine resolves on another.

use crate::error::RegionError;
use image::{imageops::FilterType, DynamicImage, ImageFormat};
use std::io::Cursor;
use std::path::Path;
use tracing::debug;

/// Flatten any pixel layout to 8-bit RGB, dropping alpha.
pub fn to_rgb(img: &DynamicImage) -> DynamicImage {
    match img {
        DynamicImage::ImageRgb8(_) => img.clone(),
        other => DynamicImage::ImageRgb8(other.to_rgb8()),
    }
}

/// Downscale to at most `max_width` pixels wide, keeping the aspect ratio.
///
/// Images already narrow enough are returned unchanged.
pub fn fit_width(img: DynamicImage, max_width: u32) -> DynamicImage {
    if img.width() <= max_width || max_width == 0 {
        return img;
    }
    let new_height = ((img.height() as u64 * max_width as u64) / img.width() as u64).max(1) as u32;
    img.resize_exact(max_width, new_height, FilterType::Lanczos3)
}

/// Encode `img` as PNG bytes.
pub fn encode_png(img: &DynamicImage) -> Result<Vec<u8>, image::ImageError> {
    let mut buf = Vec::new();
    img.write_to(&mut Cursor::new(&mut buf), ImageFormat::Png)?;
    Ok(buf)
}

/// Write `img` as an RGB PNG at `out_root/rel_path`, creating parent
/// directories. Existing files are overwritten.
///
/// Returns `rel_path` unchanged so callers can record it directly.
pub fn write_png_asset(
    img: &DynamicImage,
    out_root: &Path,
    rel_path: &str,
) -> Result<String, RegionError> {
    let target = out_root.join(rel_path);
    let asset_err = |detail: String| RegionError::AssetWrite {
        path: target.display().to_string(),
        detail,
    };

    if let Some(parent) = target.parent() {
        std::fs::create_dir_all(parent).map_err(|e| asset_err(e.to_string()))?;
    }
    let bytes = encode_png(&to_rgb(img)).map_err(|e| asset_err(e.to_string()))?;
    std::fs::write(&target, &bytes).map_err(|e| asset_err(e.to_string()))?;

    debug!(
        "Wrote {} ({}x{}, {} bytes)",
        rel_path,
        img.width(),
        img.height(),
        bytes.len()
    );
    Ok(rel_path.to_string())
}

#[cfg(test)]
mod tests {
    use super::*;
    use image::{Rgba, RgbaImage};

    fn rgba(w: u32, h: u32) -> DynamicImage {
        DynamicImage::ImageRgba8(RgbaImage::from_pixel(w, h, Rgba([255, 0, 0, 128])))
    }

    #[test]
    fn rgba_is_flattened_to_rgb() {
        let rgb = to_rgb(&rgba(4, 4));
        assert!(matches!(rgb, DynamicImage::ImageRgb8(_)));
    }

    #[test]
    fn fit_width_keeps_aspect() {
        let out = fit_width(rgba(960, 600), 480);
        assert_eq!((out.width(), out.height()), (480, 300));
        let small = fit_width(rgba(200, 100), 480);
        assert_eq!((small.width(), small.height()), (200, 100));
    }

    #[test]
    fn writes_png_under_output_root() {
        let dir = tempfile::tempdir().unwrap();
        let rel = write_png_asset(&rgba(10, 10), dir.path(), "thumbs/chart-0-0.png").unwrap();
        assert_eq!(rel, "thumbs/chart-0-0.png");

        let written = image::open(dir.path().join(&rel)).unwrap();
        assert!(matches!(written, DynamicImage::ImageRgb8(_)));
        assert_eq!(written.width(), 10);

        // Overwriting the same asset is fine.
        write_png_asset(&rgba(12, 12), dir.path(), "thumbs/chart-0-0.png").unwrap();
        assert_eq!(image::open(dir.path().join(&rel)).unwrap().width(), 12);
    }
}
