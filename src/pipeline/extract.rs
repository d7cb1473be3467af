//! Region candidate extraction: chart images and ruled tables.
//!
//! Each page is read once into a [`PageLayout`]; the chart and table
//! heuristics are pure functions over that layout. Only charts that pass
//! every filter have their pixels decoded, and a failure to decode or
//! write one image skips that image alone.

use super::encode::{fit_width, to_rgb, write_png_asset};
use super::geometry::{has_chart_caption_hint, nearest_block_text, CaptionMode, Rect};
use super::lattice::{find_tables, LatticeSettings};
use super::layout::{load_page, ObjectPath, PageLayout};
use super::pdfium::{bind, open_document};
use crate::candidate::{Candidate, CandidateKind, Meta};
use crate::config::RegionConfig;
use crate::error::{LensError, RegionError};
use image::DynamicImage;
use pdfium_render::prelude::*;
use std::collections::HashSet;
use std::path::Path;
use tracing::{debug, info, warn};

/// Subdirectory of the output root holding chart thumbnails.
pub const THUMBS_DIR: &str = "thumbs";

/// A placed image that passed every chart filter, before decoding.
#[derive(Debug, Clone, PartialEq)]
pub struct ChartRegion {
    pub page: usize,
    pub object_path: ObjectPath,
    pub rect: Rect,
    pub caption: Option<String>,
    pub area_frac: f64,
    pub aspect: f64,
}

/// Extract chart and table candidates from `pdf_path`.
///
/// Charts come first (page order, then discovery order), followed by
/// tables. Thumbnails are written to `<work_dir>/thumbs/<id>.png`.
///
/// Never fails: when the document cannot be opened the error is logged and
/// an empty list returned.
pub async fn extract_candidates(
    pdf_path: &Path,
    work_dir: &Path,
    config: &RegionConfig,
) -> Vec<Candidate> {
    let path = pdf_path.to_path_buf();
    let out = work_dir.to_path_buf();
    let cfg = config.clone();

    let result = tokio::task::spawn_blocking(move || extract_blocking(&path, &out, &cfg))
        .await
        .map_err(|e| LensError::Internal(format!("Extraction task panicked: {}", e)))
        .and_then(|r| r);

    match result {
        Ok(candidates) => candidates,
        Err(e) => {
            warn!("Candidate extraction failed for {}: {}", pdf_path.display(), e);
            Vec::new()
        }
    }
}

fn extract_blocking(
    pdf_path: &Path,
    work_dir: &Path,
    config: &RegionConfig,
) -> Result<Vec<Candidate>, LensError> {
    let pdfium = bind()?;
    let document = open_document(&pdfium, pdf_path)?;
    let pages = document.pages();
    let loaded = (0..pages.len()).map(|i| load_page(pages, i, config.ruling_max_thickness));

    // (page, pixel digest) of every thumbnail written so far
    let mut seen = HashSet::new();
    let candidates = collect_candidates(loaded, config, |page, region, id| {
        let img = decode_image(page, region.page, &region.object_path)?;
        if !seen.insert((region.page, md5::compute(img.as_bytes()).0)) {
            return Ok(None);
        }
        write_thumbnail(&img, work_dir, id, config.thumb_max_width).map(Some)
    });

    let charts = candidates
        .iter()
        .filter(|c| c.kind == CandidateKind::Chart)
        .count();
    info!(
        "Extracted {} chart and {} table candidates from {}",
        charts,
        candidates.len() - charts,
        pdf_path.display()
    );
    Ok(candidates)
}

/// Accumulate chart and table candidates over `pages`, in page order.
///
/// A page that failed to load is logged and skipped; later pages are still
/// read. `materialise` writes the thumbnail for one chart region under the
/// given id and returns its path, or `None` when the image repeats one
/// already kept. Chart ids count only the charts kept on their page. Table
/// detection stops for the rest of the document once
/// `max_table_candidates` tables have been found.
pub fn collect_candidates<T, I, F>(pages: I, config: &RegionConfig, mut materialise: F) -> Vec<Candidate>
where
    I: IntoIterator<Item = Result<(PageLayout, T), RegionError>>,
    F: FnMut(&T, &ChartRegion, &str) -> Result<Option<String>, RegionError>,
{
    let mut charts = Vec::new();
    let mut tables = Vec::new();

    for loaded in pages {
        let (layout, page) = match loaded {
            Ok(loaded) => loaded,
            Err(e) => {
                warn!("Skipping page: {}", e);
                continue;
            }
        };
        let index = layout.index;

        let mut local = 0;
        for region in chart_regions(&layout, config) {
            let id = Candidate::make_id(CandidateKind::Chart, index, local);
            match materialise(&page, &region, &id) {
                Ok(Some(thumb_path)) => {
                    charts.push(chart_candidate(id, &region, thumb_path));
                    local += 1;
                }
                Ok(None) => debug!("Page {}: image repeats an earlier chart", index),
                Err(e) => warn!("Skipping chart image on page {}: {}", index, e),
            }
        }

        let remaining = config.max_table_candidates.saturating_sub(tables.len());
        if remaining > 0 {
            tables.extend(table_candidates(&layout, config, remaining));
        }
    }

    charts.extend(tables);
    charts
}

/// Decode the pixels of the image object at `object_path` on `page`.
pub(crate) fn decode_image(
    page: &PdfPage,
    page_index: usize,
    object_path: &[usize],
) -> Result<DynamicImage, RegionError> {
    let decode_err = |detail: String| RegionError::ImageDecode {
        page: page_index,
        object: object_path.first().copied().unwrap_or_default(),
        detail,
    };
    let (&first, nested) = object_path
        .split_first()
        .ok_or_else(|| decode_err("empty object path".into()))?;
    let object = page
        .objects()
        .get(first)
        .map_err(|e| decode_err(format!("{:?}", e)))?;
    decode_nested(&object, nested).map_err(decode_err)
}

fn decode_nested(object: &PdfPageObject, nested: &[usize]) -> Result<DynamicImage, String> {
    match nested.split_first() {
        None => object
            .as_image_object()
            .ok_or_else(|| "not an image object".to_string())?
            .get_raw_image()
            .map_err(|e| format!("{:?}", e)),
        Some((&index, rest)) => {
            let form = object
                .as_x_object_form_object()
                .ok_or_else(|| "not a form object".to_string())?;
            let child = form.get(index).map_err(|e| format!("{:?}", e))?;
            decode_nested(&child, rest)
        }
    }
}

fn write_thumbnail(
    img: &DynamicImage,
    work_dir: &Path,
    id: &str,
    max_width: u32,
) -> Result<String, RegionError> {
    let thumb = fit_width(to_rgb(img), max_width);
    write_png_asset(&thumb, work_dir, &format!("{THUMBS_DIR}/{id}.png"))
}

/// Images on `page` that qualify as charts, in placement order.
///
/// Filters: inside the body band, at least `chart_min_area_frac` of the
/// page, aspect within `chart_aspect_range`, and either a caption with a
/// chart keyword or an area of at least `chart_uncaptioned_min_area_frac`.
/// An image placed exactly over an earlier accepted one is dropped.
pub fn chart_regions(page: &PageLayout, config: &RegionConfig) -> Vec<ChartRegion> {
    let page_area = page.area();
    if page_area <= 0.0 {
        return Vec::new();
    }
    let (lo, hi) = config.chart_aspect_range;
    let mut accepted: Vec<Rect> = Vec::new();

    page.images
        .iter()
        .filter_map(|placed| {
            let rect = placed.rect;
            if !page.in_body(&rect, config.header_footer_frac) {
                return None;
            }
            let area_frac = rect.area() / page_area;
            let aspect = rect.aspect();
            if area_frac < config.chart_min_area_frac || !(lo..=hi).contains(&aspect) {
                return None;
            }
            let caption = nearest_block_text(
                &page.blocks,
                &rect,
                config.caption_max_distance,
                config.above_block_penalty,
                CaptionMode::Nearest,
            )
            .map(|m| m.text);
            let hinted = caption.as_deref().is_some_and(has_chart_caption_hint);
            if !hinted && area_frac < config.chart_uncaptioned_min_area_frac {
                debug!(
                    "Page {}: rejecting uncaptioned image ({:.3} of page)",
                    page.index, area_frac
                );
                return None;
            }
            if accepted.iter().any(|r| same_placement(r, &rect)) {
                debug!("Page {}: skipping repeated placement", page.index);
                return None;
            }
            accepted.push(rect);
            Some(ChartRegion {
                page: page.index,
                object_path: placed.object_path.clone(),
                rect,
                caption,
                area_frac,
                aspect,
            })
        })
        .collect()
}

fn same_placement(a: &Rect, b: &Rect) -> bool {
    const EPS: f64 = 0.5;
    (a.x0 - b.x0).abs() <= EPS
        && (a.y0 - b.y0).abs() <= EPS
        && (a.x1 - b.x1).abs() <= EPS
        && (a.y1 - b.y1).abs() <= EPS
}

fn chart_candidate(id: String, region: &ChartRegion, thumb_path: String) -> Candidate {
    let mut meta = Meta::new();
    meta.insert("area_frac".into(), round_to(region.area_frac, 3).into());
    meta.insert("aspect".into(), round_to(region.aspect, 2).into());
    Candidate {
        id,
        kind: CandidateKind::Chart,
        page: region.page,
        bbox: region.rect.to_bbox(),
        preview_text: region.caption.clone().unwrap_or_default(),
        caption: region.caption.clone(),
        thumb_path: Some(thumb_path),
        meta,
    }
}

/// Ruled tables on `page`, at most `limit` of them.
pub fn table_candidates(page: &PageLayout, config: &RegionConfig, limit: usize) -> Vec<Candidate> {
    let settings = LatticeSettings::uniform(config.ruling_tolerance, config.ruling_min_length);
    find_tables(&page.edges, &page.glyphs, &settings)
        .into_iter()
        .filter(|t| t.bbox.is_valid())
        .take(limit)
        .enumerate()
        .map(|(i, table)| {
            let (preview, rows_peek) = table_preview(&table.rows, config);
            let mut meta = Meta::new();
            meta.insert("rows_peek".into(), rows_peek.into());
            Candidate {
                id: Candidate::make_id(CandidateKind::Table, page.index, i),
                kind: CandidateKind::Table,
                page: page.index,
                bbox: table.bbox.to_bbox(),
                preview_text: preview,
                caption: None,
                thumb_path: None,
                meta,
            }
        })
        .collect()
}

/// Compact preview of a table grid plus the number of rows it covers.
///
/// First `table_preview_rows` rows, first `table_preview_cols` columns,
/// missing cells as empty strings, cells joined by `" | "`, rows by `\n`,
/// truncated to `table_preview_chars` characters.
pub fn table_preview(rows: &[Vec<Option<String>>], config: &RegionConfig) -> (String, usize) {
    let peek = &rows[..rows.len().min(config.table_preview_rows)];
    let lines: Vec<String> = peek
        .iter()
        .filter(|row| !row.is_empty())
        .map(|row| {
            row.iter()
                .take(config.table_preview_cols)
                .map(|cell| cell.as_deref().unwrap_or(""))
                .collect::<Vec<_>>()
                .join(" | ")
        })
        .collect();
    let preview = truncate_chars(&lines.join("\n"), config.table_preview_chars);
    (preview, peek.len())
}

pub(crate) fn truncate_chars(s: &str, max: usize) -> String {
    s.chars().take(max).collect()
}

fn round_to(v: f64, places: i32) -> f64 {
    let f = 10f64.powi(places);
    (v * f).round() / f
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::candidate::MetaValue;
    use crate::pipeline::geometry::TextBlock;
    use crate::pipeline::lattice::Edge;
    use crate::pipeline::layout::PlacedImage;

    fn letter_page() -> PageLayout {
        PageLayout {
            index: 0,
            width: 612.0,
            height: 792.0,
            ..Default::default()
        }
    }

    fn place(page: &mut PageLayout, rect: Rect) {
        let object_path = vec![page.images.len()];
        page.images.push(PlacedImage { object_path, rect });
    }

    #[test]
    fn large_body_image_is_a_chart() {
        let mut page = letter_page();
        // 300 × 200 = 60 000 of 484 704 → 0.124
        place(&mut page, Rect::new(150.0, 200.0, 450.0, 400.0));
        let regions = chart_regions(&page, &RegionConfig::default());
        assert_eq!(regions.len(), 1);
        assert!((regions[0].area_frac - 0.1238).abs() < 1e-3);
        assert_eq!(regions[0].aspect, 1.5);
        assert_eq!(regions[0].caption, None);
    }

    #[test]
    fn header_footer_and_banner_images_are_rejected() {
        let mut page = letter_page();
        place(&mut page, Rect::new(150.0, 20.0, 450.0, 220.0)); // header band
        place(&mut page, Rect::new(150.0, 600.0, 450.0, 780.0)); // footer band
        place(&mut page, Rect::new(20.0, 300.0, 590.0, 400.0)); // aspect 5.7
        place(&mut page, Rect::new(200.0, 300.0, 260.0, 360.0)); // tiny
        assert!(chart_regions(&page, &RegionConfig::default()).is_empty());
    }

    #[test]
    fn small_images_need_a_caption_keyword() {
        let mut page = letter_page();
        // 200 × 150 = 30 000 → 0.062: above the floor, below the uncaptioned bar.
        place(&mut page, Rect::new(100.0, 200.0, 300.0, 350.0));
        let config = RegionConfig::default();
        assert!(chart_regions(&page, &config).is_empty());

        page.blocks.push(TextBlock::new(
            Rect::new(100.0, 355.0, 300.0, 365.0),
            "Exhibit 3: Share of wallet",
        ));
        let regions = chart_regions(&page, &config);
        assert_eq!(regions.len(), 1);
        assert_eq!(regions[0].caption.as_deref(), Some("Exhibit 3: Share of wallet"));
    }

    #[test]
    fn chart_candidate_rounds_meta() {
        let region = ChartRegion {
            page: 0,
            object_path: vec![0],
            rect: Rect::new(150.0, 200.0, 450.0, 400.0),
            caption: Some("Figure 1".into()),
            area_frac: 0.123_789,
            aspect: 1.499_9,
        };
        let c = chart_candidate("chart-0-0".into(), &region, "thumbs/chart-0-0.png".into());
        assert_eq!(c.meta["area_frac"], MetaValue::Float(0.124));
        assert_eq!(c.meta["aspect"], MetaValue::Float(1.5));
        assert_eq!(c.preview_text, "Figure 1");
        assert_eq!(c.thumb_path.as_deref(), Some("thumbs/chart-0-0.png"));
    }

    #[test]
    fn table_preview_caps_rows_cols_and_length() {
        let config = RegionConfig::default();
        let row: Vec<Option<String>> = (0..8).map(|i| Some(format!("c{i}"))).collect();
        let rows = vec![row.clone(), vec![Some("a".into()), None], row.clone(), row];
        let (preview, peek) = table_preview(&rows, &config);
        assert_eq!(peek, 3);
        let lines: Vec<&str> = preview.lines().collect();
        assert_eq!(lines.len(), 3);
        assert_eq!(lines[0], "c0 | c1 | c2 | c3 | c4 | c5");
        assert_eq!(lines[1], "a | ");
        assert!(!preview.contains("None"));

        let long = vec![vec![Some("x".repeat(1000))]];
        let (preview, peek) = table_preview(&long, &config);
        assert_eq!(preview.chars().count(), 400);
        assert_eq!(peek, 1);
    }

    fn grid(page: &mut PageLayout, x: f64, y: f64) {
        for r in 0..=2 {
            page.edges.push(Edge::horizontal(x, x + 120.0, y + r as f64 * 20.0));
        }
        for c in 0..=2 {
            page.edges.push(Edge::vertical(x + c as f64 * 60.0, y, y + 40.0));
        }
    }

    #[test]
    fn tables_respect_the_limit() {
        let mut page = letter_page();
        page.index = 2;
        grid(&mut page, 50.0, 100.0);
        grid(&mut page, 50.0, 300.0);
        grid(&mut page, 50.0, 500.0);

        let config = RegionConfig::default();
        let all = table_candidates(&page, &config, 10);
        assert_eq!(all.len(), 3);
        assert_eq!(all[0].id, "table-2-0");
        assert_eq!(all[2].id, "table-2-2");
        assert_eq!(all[0].meta["rows_peek"], MetaValue::Int(2));

        let capped = table_candidates(&page, &config, 2);
        assert_eq!(capped.len(), 2);
        for c in &capped {
            let (x0, y0, x1, y1) = c.bbox;
            assert!(x0 < x1 && y0 < y1);
        }
    }

    fn page_at(index: usize) -> PageLayout {
        PageLayout {
            index,
            ..letter_page()
        }
    }

    fn thumb_for(_: &(), _: &ChartRegion, id: &str) -> Result<Option<String>, RegionError> {
        Ok(Some(format!("thumbs/{id}.png")))
    }

    fn ids(candidates: &[Candidate]) -> Vec<&str> {
        candidates.iter().map(|c| c.id.as_str()).collect()
    }

    #[test]
    fn repeated_placement_is_one_chart() {
        let mut page = letter_page();
        place(&mut page, Rect::new(150.0, 200.0, 450.0, 400.0));
        place(&mut page, Rect::new(150.2, 200.0, 450.0, 400.3));
        let regions = chart_regions(&page, &RegionConfig::default());
        assert_eq!(regions.len(), 1);
        assert_eq!(regions[0].object_path, vec![0]);
    }

    #[test]
    fn ids_are_unique_across_pages_of_charts_and_tables() {
        let mut first = page_at(0);
        place(&mut first, Rect::new(150.0, 120.0, 450.0, 320.0));
        place(&mut first, Rect::new(150.0, 420.0, 450.0, 620.0));
        grid(&mut first, 50.0, 640.0);

        let mut second = page_at(1);
        grid(&mut second, 50.0, 100.0);
        grid(&mut second, 50.0, 300.0);
        place(&mut second, Rect::new(150.0, 400.0, 450.0, 600.0));

        let pages = vec![Ok((first, ())), Ok((second, ()))];
        let candidates = collect_candidates(pages, &RegionConfig::default(), thumb_for);

        assert_eq!(
            ids(&candidates),
            vec!["chart-0-0", "chart-0-1", "chart-1-0", "table-0-0", "table-1-0", "table-1-1"]
        );
        let unique: HashSet<&str> = ids(&candidates).into_iter().collect();
        assert_eq!(unique.len(), candidates.len());
        assert_eq!(candidates[2].page, 1);
        assert_eq!(candidates[2].thumb_path.as_deref(), Some("thumbs/chart-1-0.png"));
    }

    #[test]
    fn unreadable_page_in_the_middle_is_skipped() {
        let mut before = page_at(0);
        place(&mut before, Rect::new(150.0, 200.0, 450.0, 400.0));
        let mut after = page_at(2);
        place(&mut after, Rect::new(150.0, 200.0, 450.0, 400.0));
        grid(&mut after, 50.0, 500.0);

        let pages = vec![
            Ok((before, ())),
            Err(RegionError::PageUnreadable {
                page: 1,
                detail: "FPDF_LoadPage failed".into(),
            }),
            Ok((after, ())),
        ];
        let candidates = collect_candidates(pages, &RegionConfig::default(), thumb_for);
        assert_eq!(ids(&candidates), vec!["chart-0-0", "chart-2-0", "table-2-0"]);
    }

    #[test]
    fn table_cap_stops_detection_for_later_pages() {
        let config = RegionConfig {
            max_table_candidates: 3,
            ..RegionConfig::default()
        };
        let pages: Vec<Result<(PageLayout, ()), RegionError>> = (0..3)
            .map(|i| {
                let mut page = page_at(i);
                grid(&mut page, 50.0, 100.0);
                grid(&mut page, 50.0, 300.0);
                Ok((page, ()))
            })
            .collect();
        let mut last = page_at(3);
        place(&mut last, Rect::new(150.0, 200.0, 450.0, 400.0));
        grid(&mut last, 50.0, 500.0);
        let pages = pages.into_iter().chain(std::iter::once(Ok((last, ()))));

        let candidates = collect_candidates(pages, &config, thumb_for);
        assert_eq!(
            ids(&candidates),
            vec!["chart-3-0", "table-0-0", "table-0-1", "table-1-0"]
        );
    }

    #[test]
    fn failed_and_repeated_thumbnails_leave_no_id_gaps() {
        let mut page = page_at(0);
        place(&mut page, Rect::new(150.0, 120.0, 450.0, 320.0));
        place(&mut page, Rect::new(150.0, 330.0, 450.0, 530.0));
        place(&mut page, Rect::new(150.0, 540.0, 450.0, 690.0));

        let mut calls = 0;
        let candidates = collect_candidates(
            vec![Ok((page, ()))],
            &RegionConfig::default(),
            |_, region, id| {
                calls += 1;
                match calls {
                    1 => Err(RegionError::ImageDecode {
                        page: region.page,
                        object: region.object_path[0],
                        detail: "bad stream".into(),
                    }),
                    2 => Ok(None),
                    _ => Ok(Some(format!("thumbs/{id}.png"))),
                }
            },
        );
        assert_eq!(calls, 3);
        assert_eq!(ids(&candidates), vec!["chart-0-0"]);
        assert_eq!(candidates[0].bbox, (150.0, 540.0, 450.0, 690.0));
    }
}
