//! Hero-figure selection: the one image that best represents a document.
//!
//! Every placed image in the body band is scored as
//!
//! ```text
//! area^0.9 × (1 + 0.15 × caption_score + 0.10 × label_bonus)
//! ```
//!
//! where `caption_score` is the relevance of the best nearby text block and
//! `label_bonus` rewards images close to a "Figure N" style label. Pixels
//! are decoded only for an image that beats the running best, and an image
//! smaller than the pixel floor is dropped without displacing the previous
//! best.

use super::encode::{to_rgb, write_png_asset};
use super::extract::decode_image;
use super::geometry::{center_distance, is_figure_label, nearest_block_text, CaptionMode, Rect};
use super::layout::{load_page, ObjectPath, PageLayout};
use super::pdfium::{bind, open_document};
use crate::config::RegionConfig;
use crate::error::RegionError;
use crate::output::HeroFigure;
use image::DynamicImage;
use std::path::Path;
use tracing::{debug, info, warn};

/// Subdirectory of the output root holding hero figures and previews.
pub const ASSETS_DIR: &str = "assets";

/// A scored image that passed the hero filters.
#[derive(Debug, Clone, PartialEq)]
pub struct HeroCandidate {
    pub page: usize,
    pub object_path: ObjectPath,
    pub rect: Rect,
    pub caption: Option<String>,
    pub score: f64,
}

/// Select and persist the hero figure, returning `(path, caption)`.
///
/// Both are `None` when no image qualifies or anything goes wrong.
pub async fn select_hero_figure(
    pdf_path: &Path,
    out_dir: &Path,
    document_id: &str,
    config: &RegionConfig,
) -> (Option<String>, Option<String>) {
    match hero_figure(pdf_path, out_dir, document_id, config).await {
        Some(hero) => (Some(hero.path), Some(hero.caption)),
        None => (None, None),
    }
}

/// Like [`select_hero_figure`] but keeps the page and score.
pub async fn hero_figure(
    pdf_path: &Path,
    out_dir: &Path,
    document_id: &str,
    config: &RegionConfig,
) -> Option<HeroFigure> {
    let path = pdf_path.to_path_buf();
    let out = out_dir.to_path_buf();
    let id = document_id.to_string();
    let cfg = config.clone();

    let joined =
        tokio::task::spawn_blocking(move || hero_figure_blocking(&path, &out, &id, &cfg)).await;

    match joined {
        Ok(Ok(hero)) => hero,
        Ok(Err(e)) => {
            warn!("Hero figure selection failed: {}", e);
            None
        }
        Err(e) => {
            warn!("Hero figure task panicked: {}", e);
            None
        }
    }
}

fn hero_figure_blocking(
    pdf_path: &Path,
    out_dir: &Path,
    document_id: &str,
    config: &RegionConfig,
) -> Result<Option<HeroFigure>, RegionError> {
    let unavailable = |detail: String| RegionError::DocumentUnavailable { detail };
    let pdfium = bind().map_err(|e| unavailable(e.to_string()))?;
    let document = open_document(&pdfium, pdf_path).map_err(|e| unavailable(e.to_string()))?;

    let pages = document.pages();
    let loaded = (0..pages.len()).map(|i| load_page(pages, i, config.ruling_max_thickness));
    let best = best_over_pages(loaded, config, |page, index, object_path| {
        decode_image(page, index, object_path)
    });

    let Some((best, pixels)) = best else {
        debug!("No hero figure in {}", pdf_path.display());
        return Ok(None);
    };

    let rel = format!("{ASSETS_DIR}/{document_id}_figure.png");
    let path = write_png_asset(&to_rgb(&pixels), out_dir, &rel)?;
    let caption = best
        .caption
        .filter(|c| !c.is_empty())
        .unwrap_or_else(|| format!("Auto-selected image from page {}", best.page + 1));

    info!(
        "Hero figure: page {} (score {:.1}) → {}",
        best.page + 1,
        best.score,
        path
    );
    Ok(Some(HeroFigure {
        path,
        caption,
        page: best.page,
        score: best.score,
    }))
}

/// Track the best hero image over `pages`, in page order.
///
/// Pages that failed to load and images that fail to decode are logged and
/// skipped; the running best survives both.
pub fn best_over_pages<T, I, F>(
    pages: I,
    config: &RegionConfig,
    mut decode: F,
) -> Option<(HeroCandidate, DynamicImage)>
where
    I: IntoIterator<Item = Result<(PageLayout, T), RegionError>>,
    F: FnMut(&T, usize, &[usize]) -> Result<DynamicImage, RegionError>,
{
    let mut tracker = BestImage::new(config.hero_min_pixels);
    for loaded in pages {
        let (layout, page) = match loaded {
            Ok(loaded) => loaded,
            Err(e) => {
                warn!("Skipping page: {}", e);
                continue;
            }
        };
        for candidate in score_page_images(&layout, config) {
            let index = candidate.page;
            let object_path = candidate.object_path.clone();
            if let Err(e) = tracker.offer(candidate, || decode(&page, index, &object_path)) {
                warn!("Skipping image on page {}: {}", index + 1, e);
            }
        }
    }
    tracker.into_best()
}

/// Filter and score the images on one page, in placement order.
pub fn score_page_images(page: &PageLayout, config: &RegionConfig) -> Vec<HeroCandidate> {
    let page_area = page.area();
    if page_area <= 0.0 {
        return Vec::new();
    }
    let (lo, hi) = config.hero_aspect_range;
    let labels: Vec<&Rect> = page
        .blocks
        .iter()
        .filter(|b| is_figure_label(&b.text))
        .map(|b| &b.rect)
        .collect();

    page.images
        .iter()
        .filter_map(|placed| {
            let rect = placed.rect;
            if !page.in_body(&rect, config.header_footer_frac) {
                return None;
            }
            let area = rect.area();
            if area / page_area < config.hero_min_area_frac {
                return None;
            }
            if !(lo..=hi).contains(&rect.aspect()) {
                return None;
            }

            let caption = nearest_block_text(
                &page.blocks,
                &rect,
                config.caption_max_distance,
                config.above_block_penalty,
                CaptionMode::Scored,
            );
            let caption_score = caption.as_ref().map_or(0, |c| c.score);
            let bonus = label_bonus(&rect, &labels, config);
            let score = hero_score(area, caption_score, bonus, config);

            Some(HeroCandidate {
                page: page.index,
                object_path: placed.object_path.clone(),
                rect,
                caption: caption.map(|c| c.text),
                score,
            })
        })
        .collect()
}

/// 3 when a figure label is nearer than `label_near_distance`, 1 when
/// nearer than `label_far_distance`, otherwise 0.
pub fn label_bonus(rect: &Rect, labels: &[&Rect], config: &RegionConfig) -> u32 {
    let nearest = labels
        .iter()
        .map(|l| center_distance(rect, l))
        .fold(f64::INFINITY, f64::min);
    if nearest < config.label_near_distance {
        3
    } else if nearest < config.label_far_distance {
        1
    } else {
        0
    }
}

pub fn hero_score(area: f64, caption_score: u32, label_bonus: u32, config: &RegionConfig) -> f64 {
    area.powf(config.hero_area_exponent)
        * (1.0
            + config.hero_caption_weight * caption_score as f64
            + config.hero_proximity_weight * label_bonus as f64)
}

/// Running best across a document.
pub struct BestImage {
    min_pixels: u64,
    best_score: f64,
    best: Option<(HeroCandidate, DynamicImage)>,
}

impl BestImage {
    pub fn new(min_pixels: u64) -> Self {
        Self {
            min_pixels,
            best_score: 0.0,
            best: None,
        }
    }

    /// Consider `candidate`; `decode` runs only when it beats the current best.
    ///
    /// Decoded images under the pixel floor are dropped and the previous
    /// best kept. Decode errors propagate.
    pub fn offer<F>(&mut self, candidate: HeroCandidate, decode: F) -> Result<(), RegionError>
    where
        F: FnOnce() -> Result<DynamicImage, RegionError>,
    {
        if candidate.score <= self.best_score {
            return Ok(());
        }
        let pixels = decode()?;
        let count = pixels.width() as u64 * pixels.height() as u64;
        if count < self.min_pixels {
            debug!(
                "Page {}: image of {} px below floor, keeping previous best",
                candidate.page + 1,
                count
            );
            return Ok(());
        }
        self.best_score = candidate.score;
        self.best = Some((candidate, pixels));
        Ok(())
    }

    pub fn into_best(self) -> Option<(HeroCandidate, DynamicImage)> {
        self.best
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::pipeline::geometry::TextBlock;
    use crate::pipeline::layout::PlacedImage;
    use image::{Rgb, RgbImage};

    fn pixels(w: u32, h: u32) -> DynamicImage {
        DynamicImage::ImageRgb8(RgbImage::from_pixel(w, h, Rgb([10, 20, 30])))
    }

    fn candidate(page: usize, score: f64) -> HeroCandidate {
        HeroCandidate {
            page,
            object_path: vec![0],
            rect: Rect::new(0.0, 0.0, 10.0, 10.0),
            caption: None,
            score,
        }
    }

    fn page_with(rect: Rect) -> PageLayout {
        PageLayout {
            index: 0,
            width: 612.0,
            height: 792.0,
            images: vec![PlacedImage {
                object_path: vec![0],
                rect,
            }],
            ..Default::default()
        }
    }

    #[test]
    fn small_decoded_image_never_wins() {
        let mut best = BestImage::new(80_000);
        best.offer(candidate(0, 100.0), || Ok(pixels(400, 300))).unwrap();
        // Higher score but only 200 × 200 = 40 000 px.
        best.offer(candidate(1, 500.0), || Ok(pixels(200, 200))).unwrap();
        let (winner, img) = best.into_best().unwrap();
        assert_eq!(winner.page, 0);
        assert_eq!(img.width(), 400);
    }

    #[test]
    fn small_image_alone_yields_nothing() {
        let mut best = BestImage::new(80_000);
        best.offer(candidate(0, 100.0), || Ok(pixels(100, 100))).unwrap();
        assert!(best.into_best().is_none());
    }

    #[test]
    fn lower_scores_are_not_decoded() {
        let mut best = BestImage::new(1);
        best.offer(candidate(0, 100.0), || Ok(pixels(10, 10))).unwrap();
        best.offer(candidate(1, 50.0), || panic!("must not decode"))
            .unwrap();
        assert_eq!(best.into_best().unwrap().0.page, 0);
    }

    #[test]
    fn decode_failure_propagates() {
        let mut best = BestImage::new(1);
        let err = best
            .offer(candidate(0, 10.0), || {
                Err(RegionError::ImageDecode {
                    page: 0,
                    object: 0,
                    detail: "bad stream".into(),
                })
            })
            .unwrap_err();
        assert!(err.to_string().contains("bad stream"));
    }

    #[test]
    fn score_formula() {
        let config = RegionConfig::default();
        let plain = hero_score(10_000.0, 0, 0, &config);
        assert!((plain - 10_000f64.powf(0.9)).abs() < 1e-6);
        let boosted = hero_score(10_000.0, 4, 3, &config);
        assert!((boosted / plain - 1.9).abs() < 1e-9);
    }

    #[test]
    fn label_bonus_steps() {
        let config = RegionConfig::default();
        let img = Rect::new(100.0, 100.0, 300.0, 300.0); // centre (200, 200)
        let near = Rect::new(190.0, 340.0, 210.0, 350.0); // 145 away
        let mid = Rect::new(190.0, 490.0, 210.0, 500.0); // 295 away
        let far = Rect::new(190.0, 640.0, 210.0, 650.0); // 445 away
        assert_eq!(label_bonus(&img, &[&near, &far], &config), 3);
        assert_eq!(label_bonus(&img, &[&mid], &config), 1);
        assert_eq!(label_bonus(&img, &[&far], &config), 0);
        assert_eq!(label_bonus(&img, &[], &config), 0);
    }

    #[test]
    fn page_scoring_uses_caption_and_label() {
        let config = RegionConfig::default();
        let rect = Rect::new(150.0, 200.0, 450.0, 400.0);
        let bare = score_page_images(&page_with(rect), &config);
        assert_eq!(bare.len(), 1);

        let mut captioned = page_with(rect);
        captioned.blocks.push(TextBlock::new(
            Rect::new(150.0, 405.0, 450.0, 415.0),
            "Figure 2: Revenue growth",
        ));
        let scored = score_page_images(&captioned, &config);
        assert_eq!(scored[0].caption.as_deref(), Some("Figure 2: Revenue growth"));
        assert!(scored[0].score > bare[0].score);
    }

    #[test]
    fn hero_filters_are_stricter_than_chart_filters() {
        let config = RegionConfig::default();
        // aspect 2.4: fine for a chart, too wide for a hero.
        let wide = Rect::new(66.0, 300.0, 546.0, 500.0);
        assert!(score_page_images(&page_with(wide), &config).is_empty());
        // 0.055 of the page: above the chart floor, below the hero floor.
        let small = Rect::new(100.0, 300.0, 280.0, 448.0);
        assert!(score_page_images(&page_with(small), &config).is_empty());
    }

    fn on_page(index: usize, rect: Rect) -> PageLayout {
        PageLayout {
            index,
            ..page_with(rect)
        }
    }

    #[test]
    fn unreadable_page_does_not_end_the_search() {
        let small = Rect::new(150.0, 200.0, 350.0, 350.0);
        let large = Rect::new(100.0, 150.0, 500.0, 450.0);
        let pages = vec![
            Ok((on_page(0, small), ())),
            Err(RegionError::PageUnreadable {
                page: 1,
                detail: "FPDF_LoadPage failed".into(),
            }),
            Ok((on_page(2, large), ())),
        ];
        let (winner, _) =
            best_over_pages(pages, &RegionConfig::default(), |_, _, _| Ok(pixels(400, 300)))
                .unwrap();
        assert_eq!(winner.page, 2);
    }

    #[test]
    fn undecodable_image_keeps_the_previous_best() {
        let small = Rect::new(150.0, 200.0, 350.0, 350.0);
        let large = Rect::new(100.0, 150.0, 500.0, 450.0);
        let pages = vec![Ok((on_page(0, small), ())), Ok((on_page(1, large), ()))];
        let (winner, _) = best_over_pages(pages, &RegionConfig::default(), |_, index, path| {
            if index == 1 {
                Err(RegionError::ImageDecode {
                    page: index,
                    object: path[0],
                    detail: "bad stream".into(),
                })
            } else {
                Ok(pixels(400, 300))
            }
        })
        .unwrap();
        assert_eq!(winner.page, 0);
    }
}
