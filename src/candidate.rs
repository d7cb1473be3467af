//! Candidate regions and their rankings.
//!
//! A [`Candidate`] is created fresh for every extraction pass and lives only
//! as long as the document run that produced it. Ids are unique within one
//! pass (`"<kind>-<page>-<index>"`) and carry no identity across runs.

use serde::{Deserialize, Deserializer, Serialize};
use std::collections::BTreeMap;
use std::fmt;

/// Bounding box `(x0, y0, x1, y1)` in page points, top-left origin.
pub type BBox = (f64, f64, f64, f64);

/// What kind of region a candidate is.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum CandidateKind {
    Chart,
    Table,
}

impl CandidateKind {
    pub fn as_str(self) -> &'static str {
        match self {
            CandidateKind::Chart => "chart",
            CandidateKind::Table => "table",
        }
    }
}

impl fmt::Display for CandidateKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// A scalar scoring signal stored in [`Candidate::meta`].
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(untagged)]
pub enum MetaValue {
    Bool(bool),
    Int(i64),
    Float(f64),
    Text(String),
}

impl From<f64> for MetaValue {
    fn from(v: f64) -> Self {
        MetaValue::Float(v)
    }
}

impl From<usize> for MetaValue {
    fn from(v: usize) -> Self {
        MetaValue::Int(v as i64)
    }
}

impl From<&str> for MetaValue {
    fn from(v: &str) -> Self {
        MetaValue::Text(v.to_string())
    }
}

impl From<bool> for MetaValue {
    fn from(v: bool) -> Self {
        MetaValue::Bool(v)
    }
}

/// Open map of auxiliary signals. Charts record `area_frac` and `aspect`,
/// tables record `rows_peek`.
pub type Meta = BTreeMap<String, MetaValue>;

/// A detected region of interest.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Candidate {
    pub id: String,
    pub kind: CandidateKind,
    /// Zero-based page index.
    pub page: usize,
    pub bbox: BBox,
    /// Caption for charts, tabular snippet for tables.
    pub preview_text: String,
    pub caption: Option<String>,
    /// Output-root-relative thumbnail path; charts only.
    pub thumb_path: Option<String>,
    pub meta: Meta,
}

impl Candidate {
    /// Build the id for the `index`-th accepted region of `kind` on `page`.
    pub fn make_id(kind: CandidateKind, page: usize, index: usize) -> String {
        format!("{kind}-{page}-{index}")
    }

    /// Look up a float signal, accepting integer values too.
    pub fn meta_f64(&self, key: &str) -> Option<f64> {
        match self.meta.get(key)? {
            MetaValue::Float(v) => Some(*v),
            MetaValue::Int(v) => Some(*v as f64),
            _ => None,
        }
    }
}

/// The relevance model's verdict on one candidate.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct RankedItem {
    pub id: String,
    #[serde(rename = "type", default)]
    pub kind: Option<String>,
    #[serde(default, deserialize_with = "lenient_score")]
    pub score: f64,
}

/// Accept `85`, `85.5`, `"85"` and `null`; anything unparseable scores 0.
fn lenient_score<'de, D>(deserializer: D) -> Result<f64, D::Error>
where
    D: Deserializer<'de>,
{
    let value = serde_json::Value::deserialize(deserializer)?;
    Ok(match value {
        serde_json::Value::Number(n) => n.as_f64().unwrap_or(0.0),
        serde_json::Value::String(s) => s.trim().parse().unwrap_or(0.0),
        _ => 0.0,
    })
}

/// A ranked item joined back onto its candidate: what the cropper needs.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct SelectedRegion {
    pub id: String,
    pub kind: CandidateKind,
    pub score: f64,
    pub page: usize,
    pub bbox: BBox,
}
