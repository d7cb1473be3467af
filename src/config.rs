//! Configuration types for region extraction, ranking and digest output.
//!
//! Runtime behaviour is controlled through [`LensConfig`], built via its
//! [`LensConfigBuilder`]. The heuristic thresholds live in a nested
//! [`RegionConfig`] whose defaults are the named constants below, so every
//! magic number used by the extractor and figure selector can be read,
//! tested and tuned in one place.

use crate::error::LensError;
use crate::progress::ProgressCallback;
use edgequake_llm::LLMProvider;
use serde::{Deserialize, Serialize};
use std::fmt;
use std::path::PathBuf;
use std::sync::Arc;

// ── Heuristic constants ──────────────────────────────────────────────────

/// Fraction of page height treated as header (top) and footer (bottom).
pub const HEADER_FOOTER_FRAC: f64 = 0.12;

/// Text blocks farther than this from an image (points) are not captions.
pub const CAPTION_MAX_DISTANCE: f64 = 90.0;

/// Extra distance charged to text blocks sitting above an image.
pub const ABOVE_BLOCK_PENALTY: f64 = 24.0;

/// Minimum image area, as a fraction of the page, for a chart candidate.
pub const CHART_MIN_AREA_FRAC: f64 = 0.05;

/// Charts smaller than this fraction need a caption keyword to qualify.
pub const CHART_UNCAPTIONED_MIN_AREA_FRAC: f64 = 0.08;

/// Accepted width/height range for chart candidates.
pub const CHART_ASPECT_RANGE: (f64, f64) = (0.55, 2.5);

/// Maximum thumbnail width in pixels.
pub const THUMB_MAX_WIDTH: u32 = 480;

/// Minimum image area, as a fraction of the page, for the hero figure.
pub const HERO_MIN_AREA_FRAC: f64 = 0.06;

/// Accepted width/height range for the hero figure.
pub const HERO_ASPECT_RANGE: (f64, f64) = (0.6, 2.2);

/// Hero images with fewer decoded pixels than this are discarded.
pub const HERO_MIN_PIXELS: u64 = 80_000;

/// Figure-label distance (points) earning the full proximity bonus.
pub const LABEL_NEAR_DISTANCE: f64 = 200.0;

/// Figure-label distance (points) earning the partial proximity bonus.
pub const LABEL_FAR_DISTANCE: f64 = 350.0;

/// Exponent applied to image area in the hero score.
pub const HERO_AREA_EXPONENT: f64 = 0.9;

/// Weight of the caption relevance score in the hero score.
pub const HERO_CAPTION_WEIGHT: f64 = 0.15;

/// Weight of the figure-label proximity bonus in the hero score.
pub const HERO_PROXIMITY_WEIGHT: f64 = 0.10;

/// Maximum table candidates per document.
pub const MAX_TABLE_CANDIDATES: usize = 10;

/// Rows and columns included in a table preview.
pub const TABLE_PREVIEW_ROWS: usize = 3;
pub const TABLE_PREVIEW_COLS: usize = 6;

/// Maximum characters in a table preview.
pub const TABLE_PREVIEW_CHARS: usize = 400;

/// Caption characters sent to the relevance model.
pub const RANK_CAPTION_CHARS: usize = 300;

/// Tolerance (points) used when snapping, joining and intersecting ruling lines.
pub const RULING_TOLERANCE: f64 = 3.0;

/// Paths thinner than this (points) are treated as ruling lines.
pub const RULING_MAX_THICKNESS: f64 = 3.0;

/// Ruling lines shorter than this (points) are ignored.
pub const RULING_MIN_LENGTH: f64 = 3.0;

/// Upper bound accepted by [`LensConfigBuilder::max_retries`].
pub const MAX_RETRIES_LIMIT: u32 = 10;

/// Tunable thresholds for chart, table and hero-figure detection.
///
/// Defaults reproduce the constants above.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct RegionConfig {
    pub header_footer_frac: f64,
    pub caption_max_distance: f64,
    pub above_block_penalty: f64,
    pub chart_min_area_frac: f64,
    pub chart_uncaptioned_min_area_frac: f64,
    pub chart_aspect_range: (f64, f64),
    pub thumb_max_width: u32,
    pub hero_min_area_frac: f64,
    pub hero_aspect_range: (f64, f64),
    pub hero_min_pixels: u64,
    pub label_near_distance: f64,
    pub label_far_distance: f64,
    pub hero_area_exponent: f64,
    pub hero_caption_weight: f64,
    pub hero_proximity_weight: f64,
    /// Global cap on table candidates. Scanning stops once it is reached.
    pub max_table_candidates: usize,
    pub table_preview_rows: usize,
    pub table_preview_cols: usize,
    pub table_preview_chars: usize,
    pub ruling_tolerance: f64,
    pub ruling_max_thickness: f64,
    pub ruling_min_length: f64,
}

impl Default for RegionConfig {
    fn default() -> Self {
        Self {
            header_footer_frac: HEADER_FOOTER_FRAC,
            caption_max_distance: CAPTION_MAX_DISTANCE,
            above_block_penalty: ABOVE_BLOCK_PENALTY,
            chart_min_area_frac: CHART_MIN_AREA_FRAC,
            chart_uncaptioned_min_area_frac: CHART_UNCAPTIONED_MIN_AREA_FRAC,
            chart_aspect_range: CHART_ASPECT_RANGE,
            thumb_max_width: THUMB_MAX_WIDTH,
            hero_min_area_frac: HERO_MIN_AREA_FRAC,
            hero_aspect_range: HERO_ASPECT_RANGE,
            hero_min_pixels: HERO_MIN_PIXELS,
            label_near_distance: LABEL_NEAR_DISTANCE,
            label_far_distance: LABEL_FAR_DISTANCE,
            hero_area_exponent: HERO_AREA_EXPONENT,
            hero_caption_weight: HERO_CAPTION_WEIGHT,
            hero_proximity_weight: HERO_PROXIMITY_WEIGHT,
            max_table_candidates: MAX_TABLE_CANDIDATES,
            table_preview_rows: TABLE_PREVIEW_ROWS,
            table_preview_cols: TABLE_PREVIEW_COLS,
            table_preview_chars: TABLE_PREVIEW_CHARS,
            ruling_tolerance: RULING_TOLERANCE,
            ruling_max_thickness: RULING_MAX_THICKNESS,
            ruling_min_length: RULING_MIN_LENGTH,
        }
    }
}

/// Configuration for processing one or more reports.
///
/// Built via [`LensConfig::builder()`] or using [`LensConfig::default()`].
///
/// # Example
/// ```rust
/// use market_lens::LensConfig;
///
/// let config = LensConfig::builder()
///     .output_dir("out")
///     .top_n(3)
///     .concurrency(2)
///     .model("gpt-4.1-mini")
///     .build()
///     .unwrap();
/// ```
#[derive(Clone)]
pub struct LensConfig {
    /// Root directory for thumbnails, slices, assets and digests. Default: `./out`.
    pub output_dir: PathBuf,

    /// Heuristic thresholds for the extractor and the figure selector.
    pub regions: RegionConfig,

    /// Number of ranked regions cropped into the gallery. Default: 3.
    pub top_n: usize,

    /// Padding (points) added around a region before cropping. Default: 8.
    pub crop_pad: f64,

    /// Zoom factor used when rasterising cropped regions. Default: 2.0 (144 DPI).
    pub crop_zoom: f32,

    /// DPI of the first-page preview. Default: 144.
    pub preview_dpi: u32,

    /// Render `assets/<doc>_page1.png`. Default: true.
    pub render_preview: bool,

    /// Send candidates to the relevance model. Default: true.
    ///
    /// When false (or no provider can be resolved) documents are digested
    /// without a gallery.
    pub rank: bool,

    /// LLM model identifier for ranking, e.g. "gpt-4.1-mini".
    /// If None, uses provider default.
    pub model: Option<String>,

    /// LLM provider name (e.g. "openai", "anthropic", "ollama").
    pub provider_name: Option<String>,

    /// Pre-constructed LLM provider. Takes precedence over `provider_name`.
    pub provider: Option<Arc<dyn LLMProvider>>,

    /// Sampling temperature for the ranking call. Default: 0.2.
    pub temperature: f32,

    /// Maximum tokens the model may generate for a ranking. Default: 2048.
    pub max_tokens: usize,

    /// Maximum retry attempts on a failed ranking call. Default: 3, at most
    /// [`MAX_RETRIES_LIMIT`] through the builder.
    pub max_retries: u32,

    /// Initial retry delay in milliseconds, doubled per attempt. Default: 1000.
    pub retry_backoff_ms: u64,

    /// When set, every raw ranking response is saved here for inspection.
    pub rank_debug_dir: Option<PathBuf>,

    /// Documents processed at the same time by the batch driver. Default: 1.
    pub concurrency: usize,

    /// Ignore the idempotency ledger and reprocess every document. Default: false.
    pub force: bool,

    /// Stop the batch once this many documents have been digested. Ledger
    /// skips and failures do not count. Default: no limit.
    pub batch_limit: Option<usize>,

    /// Download timeout for URL inputs in seconds. Default: 120.
    pub download_timeout_secs: u64,

    /// Optional progress callback for batch events.
    pub progress_callback: Option<ProgressCallback>,
}

impl Default for LensConfig {
    fn default() -> Self {
        Self {
            output_dir: PathBuf::from("out"),
            regions: RegionConfig::default(),
            top_n: 3,
            crop_pad: 8.0,
            crop_zoom: 2.0,
            preview_dpi: 144,
            render_preview: true,
            rank: true,
            model: None,
            provider_name: None,
            provider: None,
            temperature: 0.2,
            max_tokens: 2048,
            max_retries: 3,
            retry_backoff_ms: 1000,
            rank_debug_dir: None,
            concurrency: 1,
            force: false,
            batch_limit: None,
            download_timeout_secs: 120,
            progress_callback: None,
        }
    }
}

impl fmt::Debug for LensConfig {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("LensConfig")
            .field("output_dir", &self.output_dir)
            .field("regions", &self.regions)
            .field("top_n", &self.top_n)
            .field("crop_pad", &self.crop_pad)
            .field("crop_zoom", &self.crop_zoom)
            .field("rank", &self.rank)
            .field("model", &self.model)
            .field("provider_name", &self.provider_name)
            .field("provider", &self.provider.as_ref().map(|_| "<dyn LLMProvider>"))
            .field("max_retries", &self.max_retries)
            .field("concurrency", &self.concurrency)
            .field("force", &self.force)
            .field("batch_limit", &self.batch_limit)
            .field(
                "progress_callback",
                &self.progress_callback.as_ref().map(|_| "<callback>"),
            )
            .finish()
    }
}

impl LensConfig {
    /// Create a new builder for `LensConfig`.
    pub fn builder() -> LensConfigBuilder {
        LensConfigBuilder {
            config: Self::default(),
        }
    }
}

/// Builder for [`LensConfig`].
#[derive(Debug)]
pub struct LensConfigBuilder {
    config: LensConfig,
}

impl LensConfigBuilder {
    pub fn output_dir(mut self, dir: impl Into<PathBuf>) -> Self {
        self.config.output_dir = dir.into();
        self
    }

    pub fn regions(mut self, regions: RegionConfig) -> Self {
        self.config.regions = regions;
        self
    }

    pub fn max_table_candidates(mut self, n: usize) -> Self {
        self.config.regions.max_table_candidates = n;
        self
    }

    pub fn top_n(mut self, n: usize) -> Self {
        self.config.top_n = n;
        self
    }

    pub fn crop_pad(mut self, pad: f64) -> Self {
        self.config.crop_pad = pad.max(0.0);
        self
    }

    pub fn crop_zoom(mut self, zoom: f32) -> Self {
        self.config.crop_zoom = zoom.clamp(0.5, 8.0);
        self
    }

    pub fn preview_dpi(mut self, dpi: u32) -> Self {
        self.config.preview_dpi = dpi.clamp(36, 400);
        self
    }

    pub fn render_preview(mut self, v: bool) -> Self {
        self.config.render_preview = v;
        self
    }

    pub fn rank(mut self, v: bool) -> Self {
        self.config.rank = v;
        self
    }

    pub fn model(mut self, model: impl Into<String>) -> Self {
        self.config.model = Some(model.into());
        self
    }

    pub fn provider_name(mut self, name: impl Into<String>) -> Self {
        self.config.provider_name = Some(name.into());
        self
    }

    pub fn provider(mut self, provider: Arc<dyn LLMProvider>) -> Self {
        self.config.provider = Some(provider);
        self
    }

    pub fn temperature(mut self, t: f32) -> Self {
        self.config.temperature = t.clamp(0.0, 2.0);
        self
    }

    pub fn max_tokens(mut self, n: usize) -> Self {
        self.config.max_tokens = n;
        self
    }

    pub fn max_retries(mut self, n: u32) -> Self {
        self.config.max_retries = n.min(MAX_RETRIES_LIMIT);
        self
    }

    pub fn retry_backoff_ms(mut self, ms: u64) -> Self {
        self.config.retry_backoff_ms = ms;
        self
    }

    pub fn rank_debug_dir(mut self, dir: impl Into<PathBuf>) -> Self {
        self.config.rank_debug_dir = Some(dir.into());
        self
    }

    pub fn concurrency(mut self, n: usize) -> Self {
        self.config.concurrency = n.max(1);
        self
    }

    pub fn force(mut self, v: bool) -> Self {
        self.config.force = v;
        self
    }

    pub fn batch_limit(mut self, limit: Option<usize>) -> Self {
        self.config.batch_limit = limit;
        self
    }

    pub fn download_timeout_secs(mut self, secs: u64) -> Self {
        self.config.download_timeout_secs = secs;
        self
    }

    pub fn progress_callback(mut self, cb: ProgressCallback) -> Self {
        self.config.progress_callback = Some(cb);
        self
    }

    /// Build the configuration, validating constraints.
    pub fn build(self) -> Result<LensConfig, LensError> {
        let c = &self.config;
        if c.concurrency == 0 {
            return Err(LensError::InvalidConfig("Concurrency must be ≥ 1".into()));
        }
        let r = &c.regions;
        if !(0.0..0.5).contains(&r.header_footer_frac) {
            return Err(LensError::InvalidConfig(format!(
                "Header/footer fraction must be in [0, 0.5), got {}",
                r.header_footer_frac
            )));
        }
        for (name, (lo, hi)) in [
            ("chart", r.chart_aspect_range),
            ("hero", r.hero_aspect_range),
        ] {
            if lo <= 0.0 || lo > hi {
                return Err(LensError::InvalidConfig(format!(
                    "Invalid {name} aspect range [{lo}, {hi}]"
                )));
            }
        }
        if r.thumb_max_width == 0 {
            return Err(LensError::InvalidConfig(
                "Thumbnail width must be ≥ 1".into(),
            ));
        }
        Ok(self.config)
    }
}
