//! Rectangle math and text-block proximity scoring.
//!
//! All coordinates are PDF points with a top-left origin: `y` grows
//! downwards, so a block *below* an image has `block.y0 >= image.y1`.

use crate::candidate::BBox;
use once_cell::sync::Lazy;
use regex::Regex;

/// Caption keywords that mark a chart-like image (extractor).
pub const CHART_CAPTION_HINTS: &[&str] = &["figure", "fig.", "exhibit", "chart", "graph", "source"];

/// Caption keywords worth +2 each in [`text_relevance_score`].
pub const CAPTION_KEYWORDS: &[&str] = &[
    "figure", "fig.", "exhibit", "chart", "graph", "source", "panel", "table",
];

/// Metric keywords worth +1 each in [`text_relevance_score`].
pub const METRIC_KEYWORDS: &[&str] = &[
    "%",
    "$",
    "€",
    "£",
    "growth",
    "share",
    "yoy",
    "cagr",
    "roi",
    "roas",
    "ctr",
    "conversion",
    "revenue",
    "impressions",
    "spend",
    "units",
];

static RE_FIGURE_LABEL: Lazy<Regex> =
    Lazy::new(|| Regex::new(r"(?i)\b(fig(?:ure)?|exhibit|chart)\b\s*\d+").unwrap());

/// Axis-aligned rectangle.
#[derive(Debug, Clone, Copy, PartialEq, Default)]
pub struct Rect {
    pub x0: f64,
    pub y0: f64,
    pub x1: f64,
    pub y1: f64,
}

impl Rect {
    pub fn new(x0: f64, y0: f64, x1: f64, y1: f64) -> Self {
        Self { x0, y0, x1, y1 }
    }

    pub fn width(&self) -> f64 {
        self.x1 - self.x0
    }

    pub fn height(&self) -> f64 {
        self.y1 - self.y0
    }

    pub fn area(&self) -> f64 {
        self.width().max(0.0) * self.height().max(0.0)
    }

    /// Width over height, with the height floored at 1 point.
    pub fn aspect(&self) -> f64 {
        self.width() / self.height().max(1.0)
    }

    pub fn center(&self) -> (f64, f64) {
        ((self.x0 + self.x1) * 0.5, (self.y0 + self.y1) * 0.5)
    }

    /// Non-degenerate: strictly positive width and height.
    pub fn is_valid(&self) -> bool {
        self.x0 < self.x1 && self.y0 < self.y1
    }

    /// Grow by `pad` on every side.
    pub fn expand(&self, pad: f64) -> Rect {
        Rect::new(self.x0 - pad, self.y0 - pad, self.x1 + pad, self.y1 + pad)
    }

    /// Clip to `[0, width] × [0, height]`.
    pub fn clamp_to(&self, width: f64, height: f64) -> Rect {
        Rect::new(
            self.x0.clamp(0.0, width),
            self.y0.clamp(0.0, height),
            self.x1.clamp(0.0, width),
            self.y1.clamp(0.0, height),
        )
    }

    pub fn contains_point(&self, x: f64, y: f64) -> bool {
        x >= self.x0 && x <= self.x1 && y >= self.y0 && y <= self.y1
    }

    /// Smallest rectangle containing both.
    pub fn union(&self, other: &Rect) -> Rect {
        Rect::new(
            self.x0.min(other.x0),
            self.y0.min(other.y0),
            self.x1.max(other.x1),
            self.y1.max(other.y1),
        )
    }

    pub fn to_bbox(self) -> BBox {
        (self.x0, self.y0, self.x1, self.y1)
    }

    pub fn from_bbox(b: BBox) -> Self {
        Rect::new(b.0, b.1, b.2, b.3)
    }
}

/// A block of text on a page.
#[derive(Debug, Clone, PartialEq)]
pub struct TextBlock {
    pub rect: Rect,
    pub text: String,
}

impl TextBlock {
    pub fn new(rect: Rect, text: impl Into<String>) -> Self {
        Self {
            rect,
            text: text.into(),
        }
    }
}

/// How [`nearest_block_text`] picks among blocks within range.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum CaptionMode {
    /// Smallest distance wins; the first block wins ties.
    Nearest,
    /// Highest [`text_relevance_score`] wins; ties go to the smaller distance.
    Scored,
}

/// The block chosen as an image's caption.
#[derive(Debug, Clone, PartialEq)]
pub struct CaptionMatch {
    /// Trimmed block text.
    pub text: String,
    pub distance: f64,
    pub score: u32,
}

/// Vertical distance from the bottom of `rect` to the top of `block`.
///
/// Blocks starting above the rect's bottom edge are charged `|gap| + penalty`.
pub fn block_distance(block: &Rect, rect: &Rect, above_penalty: f64) -> f64 {
    let dy = block.y0 - rect.y1;
    if dy >= 0.0 {
        dy
    } else {
        dy.abs() + above_penalty
    }
}

/// Find the caption-like text block for `rect`.
///
/// Blocks farther than `max_distance` or containing only whitespace are
/// ignored. Returns `None` when nothing is in range.
pub fn nearest_block_text(
    blocks: &[TextBlock],
    rect: &Rect,
    max_distance: f64,
    above_penalty: f64,
    mode: CaptionMode,
) -> Option<CaptionMatch> {
    let mut best: Option<CaptionMatch> = None;

    for block in blocks {
        if block.text.trim().is_empty() {
            continue;
        }
        let distance = block_distance(&block.rect, rect, above_penalty);
        if distance > max_distance {
            continue;
        }
        let score = match mode {
            CaptionMode::Nearest => 0,
            CaptionMode::Scored => text_relevance_score(&block.text),
        };
        let better = match &best {
            None => true,
            Some(b) => match mode {
                CaptionMode::Nearest => distance < b.distance,
                CaptionMode::Scored => {
                    score > b.score || (score == b.score && distance < b.distance)
                }
            },
        };
        if better {
            best = Some(CaptionMatch {
                text: block.text.trim().to_string(),
                distance,
                score,
            });
        }
    }

    best
}

/// Score how caption-like a piece of text is.
///
/// +2 per caption keyword, +1 per metric keyword, plus one point for every
/// four digits (capped at 3). Each keyword counts at most once.
pub fn text_relevance_score(text: &str) -> u32 {
    if text.is_empty() {
        return 0;
    }
    let t = text.to_lowercase();
    let captions = CAPTION_KEYWORDS.iter().filter(|k| t.contains(*k)).count() as u32;
    let metrics = METRIC_KEYWORDS.iter().filter(|k| t.contains(*k)).count() as u32;
    let digits = t.chars().filter(|c| c.is_ascii_digit()).count() as u32;
    2 * captions + metrics + (digits / 4).min(3)
}

/// True when the text carries one of [`CHART_CAPTION_HINTS`].
pub fn has_chart_caption_hint(text: &str) -> bool {
    let t = text.to_lowercase();
    CHART_CAPTION_HINTS.iter().any(|k| t.contains(k))
}

/// Euclidean distance between rectangle centres.
pub fn center_distance(a: &Rect, b: &Rect) -> f64 {
    let (ax, ay) = a.center();
    let (bx, by) = b.center();
    ((ax - bx).powi(2) + (ay - by).powi(2)).sqrt()
}

/// Matches labels such as "Figure 3", "fig 12" or "Exhibit 2".
pub fn is_figure_label(text: &str) -> bool {
    RE_FIGURE_LABEL.is_match(text)
}

#[cfg(test)]
mod tests {
    use super::*;

    fn image() -> Rect {
        Rect::new(100.0, 100.0, 300.0, 250.0)
    }

    #[test]
    fn rect_basics() {
        let r = image();
        assert_eq!(r.width(), 200.0);
        assert_eq!(r.height(), 150.0);
        assert_eq!(r.area(), 30_000.0);
        assert_eq!(r.center(), (200.0, 175.0));
        assert!(r.is_valid());
        assert!(!Rect::new(5.0, 5.0, 5.0, 9.0).is_valid());
    }

    #[test]
    fn aspect_floors_height_at_one() {
        let thin = Rect::new(0.0, 0.0, 10.0, 0.5);
        assert_eq!(thin.aspect(), 10.0);
    }

    #[test]
    fn expand_then_clamp() {
        let r = Rect::new(100.0, 100.0, 200.0, 150.0).expand(8.0);
        assert_eq!(r, Rect::new(92.0, 92.0, 208.0, 158.0));
        let c = Rect::new(-4.0, 10.0, 620.0, 900.0).clamp_to(612.0, 792.0);
        assert_eq!(c, Rect::new(0.0, 10.0, 612.0, 792.0));
    }

    #[test]
    fn distance_below_and_above() {
        let img = image();
        let below = Rect::new(100.0, 260.0, 300.0, 270.0);
        let above = Rect::new(100.0, 80.0, 300.0, 95.0);
        assert_eq!(block_distance(&below, &img, 24.0), 10.0);
        // 80 - 250 = -170 → 170 + 24
        assert_eq!(block_distance(&above, &img, 24.0), 194.0);
    }

    #[test]
    fn nearest_prefers_closest_block() {
        let blocks = vec![
            TextBlock::new(Rect::new(100.0, 300.0, 300.0, 310.0), "far note"),
            TextBlock::new(Rect::new(100.0, 255.0, 300.0, 265.0), "Figure 1: Revenue"),
        ];
        let m = nearest_block_text(&blocks, &image(), 90.0, 24.0, CaptionMode::Nearest).unwrap();
        assert_eq!(m.text, "Figure 1: Revenue");
        assert_eq!(m.distance, 5.0);
    }

    #[test]
    fn nearest_ignores_out_of_range_and_blank() {
        let blocks = vec![
            TextBlock::new(Rect::new(100.0, 252.0, 300.0, 260.0), "   \n"),
            TextBlock::new(Rect::new(100.0, 400.0, 300.0, 410.0), "Figure 9"),
        ];
        assert!(nearest_block_text(&blocks, &image(), 90.0, 24.0, CaptionMode::Nearest).is_none());
    }

    #[test]
    fn scored_mode_prefers_relevant_text() {
        let blocks = vec![
            TextBlock::new(Rect::new(100.0, 252.0, 300.0, 260.0), "Page footer"),
            TextBlock::new(
                Rect::new(100.0, 300.0, 300.0, 310.0),
                "Exhibit 4: Revenue growth, 2021-2024",
            ),
        ];
        let m = nearest_block_text(&blocks, &image(), 90.0, 24.0, CaptionMode::Scored).unwrap();
        assert!(m.text.starts_with("Exhibit 4"));
        assert!(m.score > 0);
    }

    #[test]
    fn scored_mode_breaks_ties_on_distance() {
        let blocks = vec![
            TextBlock::new(Rect::new(100.0, 280.0, 300.0, 290.0), "Chart"),
            TextBlock::new(Rect::new(100.0, 260.0, 300.0, 270.0), "Graph"),
        ];
        let m = nearest_block_text(&blocks, &image(), 90.0, 24.0, CaptionMode::Scored).unwrap();
        assert_eq!(m.text, "Graph");
    }

    #[test]
    fn relevance_score_counts_keywords_and_digits() {
        assert_eq!(text_relevance_score(""), 0);
        // figure(+2) + fig.(+2) + revenue(+1) + %(+1), digits "2024" + "12" = 6 → 1
        assert_eq!(text_relevance_score("Fig. 2024 figure revenue 12%"), 7);
        assert_eq!(text_relevance_score("12345678901234567890"), 3);
    }

    #[test]
    fn chart_hint_is_case_insensitive() {
        assert!(has_chart_caption_hint("SOURCE: company filings"));
        assert!(!has_chart_caption_hint("Quarterly overview"));
    }

    #[test]
    fn center_distance_is_euclidean() {
        let a = Rect::new(0.0, 0.0, 2.0, 2.0);
        let b = Rect::new(3.0, 4.0, 5.0, 6.0);
        assert_eq!(center_distance(&a, &b), 5.0);
    }

    #[test]
    fn figure_labels() {
        assert!(is_figure_label("Figure 3: Market share"));
        assert!(is_figure_label("see fig 12"));
        assert!(is_figure_label("EXHIBIT 2"));
        assert!(!is_figure_label("Figures are preliminary"));
        assert!(!is_figure_label("configure 3 ports"));
    }
}
