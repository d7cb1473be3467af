//! Candidate ranking through a text-only relevance model.
//!
//! Only lightweight summaries are sent (id, kind, page, meta, a truncated
//! caption and, for tables, a truncated preview). Responses are parsed
//! tolerantly: an optional Markdown fence is stripped, then an ordered list
//! of [`ShapeMatcher`]s decides where the ranked array lives.
//!
//! ## Retry Strategy
//!
//! Only the model call is retried. Backoff doubles per attempt
//! (`retry_backoff_ms * 2^(attempt-1)`); a malformed response is not
//! retried since the same prompt tends to produce the same shape.

use crate::candidate::{Candidate, CandidateKind, Meta, RankedItem, SelectedRegion};
use crate::config::{LensConfig, RANK_CAPTION_CHARS, TABLE_PREVIEW_CHARS};
use crate::error::RankError;
use crate::pipeline::extract::truncate_chars;
use crate::prompts::{ranking_user_prompt, RANK_SYSTEM_PROMPT};
use futures::future::BoxFuture;
use once_cell::sync::Lazy;
use regex::Regex;
use serde::Serialize;
use serde_json::Value;
use std::collections::HashMap;
use std::path::{Path, PathBuf};
use std::time::{SystemTime, UNIX_EPOCH};
use tokio::time::{sleep, Duration};
use tracing::{debug, info, warn};

static RE_CODE_FENCE: Lazy<Regex> =
    Lazy::new(|| Regex::new(r"(?s)^\s*```[A-Za-z]*[ \t]*\n(.*?)\n?```\s*$").unwrap());

/// A text-in, text-out model that scores candidates.
///
/// Errors are plain strings: the ranker only needs to log them and decide
/// whether to retry.
pub trait RelevanceModel: Send + Sync {
    fn complete<'a>(&'a self, system: &'a str, user: &'a str)
        -> BoxFuture<'a, Result<String, String>>;
}

/// Where a ranked array may sit in a response, tried in order.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ShapeMatcher {
    /// The response itself is the array.
    BareArray,
    /// The array sits under this key of a top-level object.
    Wrapped(&'static str),
}

/// Accepted response shapes, in priority order.
pub const SHAPE_MATCHERS: &[ShapeMatcher] = &[
    ShapeMatcher::BareArray,
    ShapeMatcher::Wrapped("results"),
    ShapeMatcher::Wrapped("data"),
    ShapeMatcher::Wrapped("items"),
];

impl ShapeMatcher {
    fn extract<'v>(&self, value: &'v Value) -> Option<&'v Vec<Value>> {
        match self {
            ShapeMatcher::BareArray => value.as_array(),
            ShapeMatcher::Wrapped(key) => value.get(*key).and_then(Value::as_array),
        }
    }
}

/// Knobs for one ranking call.
#[derive(Debug, Clone)]
pub struct RankOptions {
    pub max_retries: u32,
    pub retry_backoff_ms: u64,
    pub caption_chars: usize,
    pub preview_chars: usize,
    /// Save each raw response here as `rank_raw_<label>_<unix-secs>.txt`.
    pub debug_dir: Option<PathBuf>,
    pub debug_label: String,
}

impl Default for RankOptions {
    fn default() -> Self {
        Self {
            max_retries: 3,
            retry_backoff_ms: 1000,
            caption_chars: RANK_CAPTION_CHARS,
            preview_chars: TABLE_PREVIEW_CHARS,
            debug_dir: None,
            debug_label: "ranking".into(),
        }
    }
}

impl RankOptions {
    pub fn from_config(config: &LensConfig, document_id: &str) -> Self {
        Self {
            max_retries: config.max_retries,
            retry_backoff_ms: config.retry_backoff_ms,
            caption_chars: RANK_CAPTION_CHARS,
            preview_chars: config.regions.table_preview_chars,
            debug_dir: config.rank_debug_dir.clone(),
            debug_label: document_id.to_string(),
        }
    }
}

/// One candidate as the model sees it.
#[derive(Debug, Serialize)]
pub struct RankRow<'a> {
    pub id: &'a str,
    #[serde(rename = "type")]
    pub kind: CandidateKind,
    pub page: usize,
    pub meta: &'a Meta,
    pub title_or_caption: String,
    pub table_preview: String,
}

/// Summaries sent to the model; tables carry their preview, charts `""`.
pub fn build_request_rows<'a>(candidates: &'a [Candidate], options: &RankOptions) -> Vec<RankRow<'a>> {
    candidates
        .iter()
        .map(|c| RankRow {
            id: &c.id,
            kind: c.kind,
            page: c.page,
            meta: &c.meta,
            title_or_caption: truncate_chars(c.caption.as_deref().unwrap_or(""), options.caption_chars),
            table_preview: match c.kind {
                CandidateKind::Table => truncate_chars(&c.preview_text, options.preview_chars),
                CandidateKind::Chart => String::new(),
            },
        })
        .collect()
}

/// Ask `model` to score `candidates`.
///
/// An empty candidate list returns an empty ranking without calling the model.
pub async fn rank_candidates(
    candidates: &[Candidate],
    model: &dyn RelevanceModel,
    options: &RankOptions,
) -> Result<Vec<RankedItem>, RankError> {
    if candidates.is_empty() {
        return Ok(Vec::new());
    }

    let rows = build_request_rows(candidates, options);
    let rows_json = serde_json::to_string(&rows).map_err(|e| RankError::Parse {
        detail: format!("could not encode request: {e}"),
    })?;
    let user = ranking_user_prompt(&rows_json);

    let raw = complete_with_retry(model, &user, options).await?;
    if let Some(dir) = &options.debug_dir {
        if let Err(e) = dump_raw(dir, &options.debug_label, &raw) {
            warn!("Could not save raw ranking response: {}", e);
        }
    }

    let ranked = parse_ranking(&raw)?;
    info!("Ranked {} of {} candidates", ranked.len(), candidates.len());
    Ok(ranked)
}

async fn complete_with_retry(
    model: &dyn RelevanceModel,
    user: &str,
    options: &RankOptions,
) -> Result<String, RankError> {
    let mut last_err: Option<String> = None;

    for attempt in 0..=options.max_retries {
        if attempt > 0 {
            let backoff = backoff_ms(options.retry_backoff_ms, attempt);
            warn!(
                "Ranking: retry {}/{} after {}ms",
                attempt, options.max_retries, backoff
            );
            sleep(Duration::from_millis(backoff)).await;
        }

        match model.complete(RANK_SYSTEM_PROMPT, user).await {
            Ok(content) => {
                debug!("Ranking response: {} bytes", content.len());
                return Ok(content);
            }
            Err(e) => {
                warn!("Ranking: attempt {} failed: {}", attempt + 1, e);
                last_err = Some(e);
            }
        }
    }

    Err(RankError::Model {
        attempts: options.max_retries + 1,
        detail: last_err.unwrap_or_else(|| "Unknown error".to_string()),
    })
}

/// Delay before retry `attempt` (1-based): `base * 2^(attempt-1)`, saturating.
pub fn backoff_ms(base: u64, attempt: u32) -> u64 {
    2u64.checked_pow(attempt.saturating_sub(1))
        .map_or(u64::MAX, |factor| base.saturating_mul(factor))
}

fn dump_raw(dir: &Path, label: &str, raw: &str) -> std::io::Result<PathBuf> {
    std::fs::create_dir_all(dir)?;
    let secs = SystemTime::now()
        .duration_since(UNIX_EPOCH)
        .map(|d| d.as_secs())
        .unwrap_or(0);
    let path = dir.join(format!("rank_raw_{label}_{secs}.txt"));
    std::fs::write(&path, raw)?;
    info!("Saved raw ranking response to {}", path.display());
    Ok(path)
}

/// Remove one outer Markdown code fence, if present.
pub fn strip_code_fence(raw: &str) -> &str {
    match RE_CODE_FENCE.captures(raw).and_then(|c| c.get(1)) {
        Some(inner) => inner.as_str(),
        None => raw.trim(),
    }
}

/// Parse a ranking response into items.
///
/// Elements that are not objects with a string `id` are dropped.
pub fn parse_ranking(raw: &str) -> Result<Vec<RankedItem>, RankError> {
    let body = strip_code_fence(raw);
    let value: Value = serde_json::from_str(body).map_err(|e| RankError::Parse {
        detail: e.to_string(),
    })?;

    let Some((matcher, items)) = SHAPE_MATCHERS
        .iter()
        .find_map(|m| m.extract(&value).map(|items| (m, items)))
    else {
        return Err(RankError::Shape {
            found: json_type_name(&value),
        });
    };
    if let ShapeMatcher::Wrapped(key) = matcher {
        debug!("Ranking response wrapped under '{}'", key);
    }

    let ranked: Vec<RankedItem> = items
        .iter()
        .filter_map(|item| serde_json::from_value::<RankedItem>(item.clone()).ok())
        .collect();
    let dropped = items.len() - ranked.len();
    if dropped > 0 {
        debug!("Ranking: dropped {} of {} malformed elements", dropped, items.len());
    }
    Ok(ranked)
}

fn json_type_name(value: &Value) -> &'static str {
    match value {
        Value::Null => "null",
        Value::Bool(_) => "boolean",
        Value::Number(_) => "number",
        Value::String(_) => "string",
        Value::Array(_) => "array",
        Value::Object(_) => "object",
    }
}

/// Top-`n` ranked items by descending score, joined back onto candidates.
///
/// The sort is stable, so equal scores keep response order. Ids with no
/// matching candidate are dropped after the cut, so fewer than `n` regions
/// may come back.
pub fn select_top(ranked: &[RankedItem], candidates: &[Candidate], n: usize) -> Vec<SelectedRegion> {
    let by_id: HashMap<&str, &Candidate> = candidates.iter().map(|c| (c.id.as_str(), c)).collect();

    let mut sorted: Vec<&RankedItem> = ranked.iter().collect();
    sorted.sort_by(|a, b| b.score.partial_cmp(&a.score).unwrap_or(std::cmp::Ordering::Equal));

    sorted
        .into_iter()
        .take(n)
        .filter_map(|item| {
            let c = by_id.get(item.id.as_str())?;
            Some(SelectedRegion {
                id: c.id.clone(),
                kind: c.kind,
                score: item.score,
                page: c.page,
                bbox: c.bbox,
            })
        })
        .collect()
}
