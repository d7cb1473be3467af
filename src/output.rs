//! Output types: per-document digests and batch reports.

use crate::candidate::{Candidate, CandidateKind, RankedItem};
use serde::{Deserialize, Serialize};

/// The single best image chosen to represent a document.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct HeroFigure {
    /// Output-root-relative PNG path (`assets/<doc>_figure.png`).
    pub path: String,
    /// Nearby caption, or a synthesised "Auto-selected image from page N".
    pub caption: String,
    /// Zero-based page the image was found on.
    pub page: usize,
    pub score: f64,
}

/// One cropped region in the digest gallery.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct GalleryItem {
    pub id: String,
    pub kind: CandidateKind,
    pub score: f64,
    /// Output-root-relative PNG path (`slices/<id>.png`).
    pub path: String,
}

/// Wall-clock timings for one document.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct DigestStats {
    pub page_count: usize,
    pub chart_candidates: usize,
    pub table_candidates: usize,
    pub extract_duration_ms: u64,
    pub rank_duration_ms: u64,
    pub crop_duration_ms: u64,
    pub total_duration_ms: u64,
}

/// Everything the renderer needs for one report, written to `<out>/<doc>.json`.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct DocumentDigest {
    pub document_id: String,
    pub name: String,
    /// Original input: local path or URL.
    pub source: String,
    /// MD5 of the PDF bytes, hex encoded.
    pub content_hash: String,
    pub hero: Option<HeroFigure>,
    /// Output-root-relative first-page preview.
    pub preview: Option<String>,
    pub candidates: Vec<Candidate>,
    pub ranked: Vec<RankedItem>,
    /// False when ranking was disabled or the ranking call failed.
    pub ranking_available: bool,
    /// Top-N regions in selection order.
    pub gallery: Vec<GalleryItem>,
    pub stats: DigestStats,
}

/// What happened to one document in a batch.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "status", rename_all = "snake_case")]
pub enum DocumentOutcome {
    /// Digest written to `digest_path`.
    Digested {
        document_id: String,
        digest_path: String,
        gallery_len: usize,
    },
    /// Same id and content hash were already recorded in the ledger.
    Skipped {
        document_id: String,
        content_hash: String,
    },
    /// Processing failed; later documents were still processed.
    Failed { name: String, error: String },
}

/// Summary of a batch run.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct BatchReport {
    pub outcomes: Vec<DocumentOutcome>,
}

impl BatchReport {
    pub fn digested(&self) -> usize {
        self.count(|o| matches!(o, DocumentOutcome::Digested { .. }))
    }

    pub fn skipped(&self) -> usize {
        self.count(|o| matches!(o, DocumentOutcome::Skipped { .. }))
    }

    pub fn failed(&self) -> usize {
        self.count(|o| matches!(o, DocumentOutcome::Failed { .. }))
    }

    fn count(&self, pred: impl Fn(&DocumentOutcome) -> bool) -> usize {
        self.outcomes.iter().filter(|o| pred(o)).count()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn batch_report_counts() {
        let report = BatchReport {
            outcomes: vec![
                DocumentOutcome::Digested {
                    document_id: "q3".into(),
                    digest_path: "out/q3.json".into(),
                    gallery_len: 3,
                },
                DocumentOutcome::Skipped {
                    document_id: "q2".into(),
                    content_hash: "abc".into(),
                },
                DocumentOutcome::Failed {
                    name: "broken.pdf".into(),
                    error: "corrupt".into(),
                },
            ],
        };
        assert_eq!(report.digested(), 1);
        assert_eq!(report.skipped(), 1);
        assert_eq!(report.failed(), 1);
    }

    #[test]
    fn outcome_is_tagged_by_status() {
        let o = DocumentOutcome::Skipped {
            document_id: "q2".into(),
            content_hash: "abc".into(),
        };
        let json = serde_json::to_value(&o).unwrap();
        assert_eq!(json["status"], "skipped");
    }
}
