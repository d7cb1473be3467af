//! Read a pdfium page into plain layout data.
//!
//! pdfium reports coordinates with a bottom-left origin; everything here is
//! converted to a top-left origin (`y = page_height - pdf_y`) so that "below"
//! means a larger `y`, matching how captions are searched for.

use super::geometry::{Rect, TextBlock};
use super::lattice::{edges_from_path, edges_from_steps, Edge, Glyph, PathStep, StepKind};
use crate::error::RegionError;
use pdfium_render::prelude::*;
use tracing::{debug, warn};

/// Vertical gap, relative to line height, still treated as the same block.
const BLOCK_LINE_GAP: f64 = 0.8;

/// Horizontal gap, relative to line height, still treated as the same line.
const BLOCK_WORD_GAP: f64 = 2.0;

/// Forms nested deeper than this are not entered.
const MAX_FORM_DEPTH: usize = 8;

/// Where an object sits: its index in the page's object list, then its
/// index inside each enclosing form.
pub type ObjectPath = Vec<usize>;

/// An image object placed on the page.
#[derive(Debug, Clone, PartialEq)]
pub struct PlacedImage {
    /// Used to fetch pixels later.
    pub object_path: ObjectPath,
    pub rect: Rect,
}

/// Everything the region heuristics need from one page.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct PageLayout {
    /// Zero-based page index.
    pub index: usize,
    pub width: f64,
    pub height: f64,
    pub blocks: Vec<TextBlock>,
    pub glyphs: Vec<Glyph>,
    pub images: Vec<PlacedImage>,
    pub edges: Vec<Edge>,
}

impl PageLayout {
    pub fn area(&self) -> f64 {
        self.width * self.height
    }

    /// `(top_cut, bottom_cut)` for a header/footer band of `frac` of the height.
    pub fn body_band(&self, frac: f64) -> (f64, f64) {
        (self.height * frac, self.height - self.height * frac)
    }

    /// True when `rect` lies entirely within the body band.
    pub fn in_body(&self, rect: &Rect, frac: f64) -> bool {
        let (top, bottom) = self.body_band(frac);
        rect.y0 >= top && rect.y1 <= bottom
    }
}

/// Convert a pdfium rectangle (bottom-left origin) to a top-left [`Rect`].
fn flip(left: f32, bottom: f32, right: f32, top: f32, page_height: f64) -> Rect {
    Rect::new(
        left as f64,
        page_height - top as f64,
        right as f64,
        page_height - bottom as f64,
    )
}

/// Read text blocks, glyphs, images and ruling edges from `page`.
///
/// Images and paths inside form XObjects are included, mapped to page
/// space. Individual objects that cannot be loaded or measured are skipped
/// with a warning; only a failure to read the page's text layer is reported.
pub fn read_page_layout(
    index: usize,
    page: &PdfPage,
    ruling_max_thickness: f64,
) -> Result<PageLayout, RegionError> {
    let width = page.width().value as f64;
    let height = page.height().value as f64;

    let text = page.text().map_err(|e| RegionError::PageUnreadable {
        page: index,
        detail: format!("{:?}", e),
    })?;

    let mut segments = Vec::new();
    for segment in text.segments().iter() {
        let content = segment.text();
        if content.trim().is_empty() {
            continue;
        }
        let b = segment.bounds();
        segments.push(TextBlock::new(
            flip(
                b.left().value,
                b.bottom().value,
                b.right().value,
                b.top().value,
                height,
            ),
            content,
        ));
    }

    let mut glyphs = Vec::new();
    for ch in text.chars().iter() {
        let Some(c) = ch.unicode_char() else {
            continue;
        };
        if let Ok(b) = ch.loose_bounds() {
            glyphs.push(Glyph {
                ch: c,
                rect: flip(
                    b.left().value,
                    b.bottom().value,
                    b.right().value,
                    b.top().value,
                    height,
                ),
            });
        }
    }

    let mut sink = ObjectSink {
        page: index,
        height,
        ruling_max_thickness,
        images: Vec::new(),
        edges: Vec::new(),
    };
    let objects = page.objects();
    let loaded = (0..objects.len()).map(|i| (i, objects.get(i))).collect();
    sink.collect(loaded, &[], &[]);
    let ObjectSink { images, edges, .. } = sink;

    let blocks = group_segments(segments);
    debug!(
        "Page {}: {} blocks, {} glyphs, {} images, {} edges",
        index,
        blocks.len(),
        glyphs.len(),
        images.len(),
        edges.len()
    );

    Ok(PageLayout {
        index,
        width,
        height,
        blocks,
        glyphs,
        images,
        edges,
    })
}

/// Load page `index` and read its layout.
///
/// Callers iterate `0..pages.len()` with this rather than `pages.iter()`,
/// whose iterator ends at the first page pdfium fails to load.
pub fn load_page<'a>(
    pages: &PdfPages<'a>,
    index: PdfPageIndex,
    ruling_max_thickness: f64,
) -> Result<(PageLayout, PdfPage<'a>), RegionError> {
    let page_index = usize::from(index);
    let page = pages.get(index).map_err(|e| RegionError::PageUnreadable {
        page: page_index,
        detail: format!("{:?}", e),
    })?;
    let layout = read_page_layout(page_index, &page, ruling_max_thickness)?;
    Ok((layout, page))
}

/// Accumulates images and rules while walking a page's object tree.
struct ObjectSink {
    page: usize,
    height: f64,
    ruling_max_thickness: f64,
    images: Vec<PlacedImage>,
    edges: Vec<Edge>,
}

impl ObjectSink {
    /// Walk `objects`, whose enclosing forms have the matrices `forms`
    /// (innermost first) and whose position prefix is `parent`.
    fn collect(
        &mut self,
        objects: Vec<(usize, Result<PdfPageObject<'_>, PdfiumError>)>,
        parent: &[usize],
        forms: &[PdfMatrix],
    ) {
        for (i, loaded) in objects {
            let mut path = parent.to_vec();
            path.push(i);
            let object = match loaded {
                Ok(object) => object,
                Err(e) => {
                    warn!("Page {}: skipping object {:?}: {:?}", self.page, path, e);
                    continue;
                }
            };
            match object.object_type() {
                PdfPageObjectType::Image => self.add_image(&object, path, forms),
                PdfPageObjectType::Path => self.add_path(&object, forms),
                PdfPageObjectType::XObjectForm => self.enter_form(&object, path, forms),
                _ => {}
            }
        }
    }

    fn enter_form(&mut self, object: &PdfPageObject, path: ObjectPath, forms: &[PdfMatrix]) {
        if forms.len() >= MAX_FORM_DEPTH {
            debug!("Page {}: form {:?} nested too deep", self.page, path);
            return;
        }
        let Some(form) = object.as_x_object_form_object() else {
            return;
        };
        let matrix = match object.matrix() {
            Ok(matrix) => matrix,
            Err(e) => {
                warn!("Page {}: skipping form {:?}: {:?}", self.page, path, e);
                return;
            }
        };
        let mut chain = Vec::with_capacity(forms.len() + 1);
        chain.push(matrix);
        chain.extend_from_slice(forms);

        let children = (0..form.len()).map(|j| (j, form.get(j))).collect();
        self.collect(children, &path, &chain);
    }

    fn add_image(&mut self, object: &PdfPageObject, object_path: ObjectPath, forms: &[PdfMatrix]) {
        let Ok(bounds) = object.bounds() else {
            return;
        };
        let rect = self.page_rect(&bounds, forms);
        if rect.is_valid() {
            self.images.push(PlacedImage { object_path, rect });
        }
    }

    fn add_path(&mut self, object: &PdfPageObject, forms: &[PdfMatrix]) {
        let steps = object
            .as_path_object()
            .and_then(|path| Some((path, path.matrix().ok()?)))
            .map(|(path, matrix)| {
                let filled = path
                    .fill_mode()
                    .map(|mode| mode != PdfPathFillMode::None)
                    .unwrap_or(false);
                (filled, self.path_steps(path, matrix, forms))
            });

        match steps {
            Some((filled, steps)) if !steps.is_empty() => self
                .edges
                .extend(edges_from_steps(&steps, filled, self.ruling_max_thickness)),
            _ => {
                if let Ok(bounds) = object.bounds() {
                    let rect = self.page_rect(&bounds, forms);
                    self.edges
                        .extend(edges_from_path(&rect, self.ruling_max_thickness));
                }
            }
        }
    }

    fn path_steps(
        &self,
        path: &PdfPagePathObject,
        matrix: PdfMatrix,
        forms: &[PdfMatrix],
    ) -> Vec<PathStep> {
        let segments = path.segments().transform(matrix);
        segments
            .iter()
            .map(|segment| {
                let (x, y) = segment.point();
                let (x, y) = to_page_space(x.value, y.value, forms);
                let kind = match segment.segment_type() {
                    PdfPathSegmentType::MoveTo => StepKind::Move,
                    PdfPathSegmentType::LineTo => StepKind::Line,
                    _ => StepKind::Curve,
                };
                PathStep {
                    kind,
                    x: x as f64,
                    y: self.height - y as f64,
                    close: segment.is_close(),
                }
            })
            .collect()
    }

    /// Object bounds (in the space of its enclosing form) as a page [`Rect`].
    fn page_rect(&self, bounds: &PdfQuadPoints, forms: &[PdfMatrix]) -> Rect {
        let (l, b, r, t) = (
            bounds.left().value,
            bounds.bottom().value,
            bounds.right().value,
            bounds.top().value,
        );
        if forms.is_empty() {
            return flip(l, b, r, t, self.height);
        }
        let corners = [(l, b), (r, b), (l, t), (r, t)].map(|(x, y)| to_page_space(x, y, forms));
        let (mut x0, mut y0) = corners[0];
        let (mut x1, mut y1) = corners[0];
        for (x, y) in corners {
            x0 = x0.min(x);
            x1 = x1.max(x);
            y0 = y0.min(y);
            y1 = y1.max(y);
        }
        flip(x0, y0, x1, y1, self.height)
    }
}

/// Map a point through enclosing form matrices, innermost first.
fn to_page_space(x: f32, y: f32, forms: &[PdfMatrix]) -> (f32, f32) {
    forms.iter().fold((x, y), |(x, y), m| {
        let (px, py) = m.apply_to_points(PdfPoints::new(x), PdfPoints::new(y));
        (px.value, py.value)
    })
}

/// Cluster text segments into paragraph-like blocks.
///
/// A segment joins a block when it continues the block's last line (same
/// baseline, small horizontal gap) or starts the next line directly beneath
/// it with horizontal overlap. Lines are joined with `\n`, words on a line
/// with a space.
pub fn group_segments(mut segments: Vec<TextBlock>) -> Vec<TextBlock> {
    segments.sort_by(|a, b| {
        (a.rect.y0, a.rect.x0)
            .partial_cmp(&(b.rect.y0, b.rect.x0))
            .unwrap_or(std::cmp::Ordering::Equal)
    });

    // (block, last segment rect)
    let mut blocks: Vec<(TextBlock, Rect)> = Vec::new();

    'segments: for seg in segments {
        let h = seg.rect.height().max(1.0);
        for (block, last) in blocks.iter_mut().rev() {
            let same_line = (seg.rect.y0 - last.y0).abs() <= h * 0.5
                && seg.rect.x0 >= last.x0
                && seg.rect.x0 - last.x1 <= h * BLOCK_WORD_GAP;
            let gap = seg.rect.y0 - block.rect.y1;
            let next_line = gap >= -h * 0.5
                && gap <= h * BLOCK_LINE_GAP
                && seg.rect.x0 <= block.rect.x1
                && seg.rect.x1 >= block.rect.x0;

            if same_line || next_line {
                block.text.push(if same_line { ' ' } else { '\n' });
                block.text.push_str(seg.text.trim());
                block.rect = block.rect.union(&seg.rect);
                *last = seg.rect;
                continue 'segments;
            }
        }
        let rect = seg.rect;
        blocks.push((TextBlock::new(rect, seg.text.trim()), rect));
    }

    blocks.into_iter().map(|(b, _)| b).collect()
}

#[cfg(test)]
mod tests {
    use super::*;

    fn seg(x0: f64, y0: f64, x1: f64, y1: f64, text: &str) -> TextBlock {
        TextBlock::new(Rect::new(x0, y0, x1, y1), text)
    }

    #[test]
    fn flip_converts_origin() {
        let r = flip(10.0, 700.0, 110.0, 720.0, 792.0);
        assert_eq!(r, Rect::new(10.0, 72.0, 110.0, 92.0));
    }

    #[test]
    fn form_matrices_apply_innermost_first() {
        assert_eq!(to_page_space(10.0, 20.0, &[]), (10.0, 20.0));

        let inner = PdfMatrix::new(0.5, 0.0, 0.0, 0.5, 100.0, 200.0);
        assert_eq!(to_page_space(10.0, 20.0, &[inner]), (105.0, 210.0));

        let outer = PdfMatrix::new(1.0, 0.0, 0.0, 1.0, 0.0, -50.0);
        assert_eq!(to_page_space(10.0, 20.0, &[inner, outer]), (105.0, 160.0));
    }

    #[test]
    fn body_band_excludes_header_and_footer() {
        let page = PageLayout {
            width: 600.0,
            height: 800.0,
            ..Default::default()
        };
        assert_eq!(page.body_band(0.12), (96.0, 704.0));
        assert!(page.in_body(&Rect::new(0.0, 100.0, 10.0, 700.0), 0.12));
        assert!(!page.in_body(&Rect::new(0.0, 50.0, 10.0, 200.0), 0.12));
        assert!(!page.in_body(&Rect::new(0.0, 600.0, 10.0, 750.0), 0.12));
    }

    #[test]
    fn words_on_a_line_join_with_spaces() {
        let blocks = group_segments(vec![
            seg(60.0, 100.0, 100.0, 110.0, "Figure"),
            seg(103.0, 100.0, 110.0, 110.0, "1:"),
            seg(113.0, 100.0, 160.0, 110.0, "Revenue"),
        ]);
        assert_eq!(blocks.len(), 1);
        assert_eq!(blocks[0].text, "Figure 1: Revenue");
        assert_eq!(blocks[0].rect, Rect::new(60.0, 100.0, 160.0, 110.0));
    }

    #[test]
    fn consecutive_lines_form_one_block() {
        let blocks = group_segments(vec![
            seg(60.0, 112.0, 200.0, 122.0, "second line"),
            seg(60.0, 100.0, 220.0, 110.0, "first line"),
        ]);
        assert_eq!(blocks.len(), 1);
        assert_eq!(blocks[0].text, "first line\nsecond line");
    }

    #[test]
    fn distant_text_starts_a_new_block() {
        let blocks = group_segments(vec![
            seg(60.0, 100.0, 200.0, 110.0, "Header"),
            seg(60.0, 400.0, 200.0, 410.0, "Source: company data"),
            seg(400.0, 100.0, 500.0, 110.0, "right column"),
        ]);
        assert_eq!(blocks.len(), 3);
    }
}
