//! Document digests: the per-document pipeline and the batch driver.
//!
//! ## Pipeline Overview
//!
//! ```text
//! source ─▶ resolve ─▶ md5 ─▶ ledger? ─▶ hero ─▶ candidates ─▶ rank ─▶ top-N
//!                                 │                                      │
//!                               skip                   crop ◀────────────┘
//!                                                       │
//!                                   record ◀─ digest ◀─ preview
//! ```
//!
//! Only input resolution, opening the PDF, cropping and writing the digest
//! are fatal for a document. Hero selection, extraction and preview degrade
//! to "nothing found"; a failed ranking call degrades to an empty ranking.
//! The batch driver isolates documents from each other: one failure is
//! logged and recorded, and the remaining documents still run.

use crate::candidate::{Candidate, CandidateKind, RankedItem};
use crate::config::LensConfig;
use crate::error::LensError;
use crate::ledger::{write_atomic, Ledger};
use crate::output::{BatchReport, DigestStats, DocumentDigest, DocumentOutcome, GalleryItem};
use crate::pipeline::rank::{rank_candidates, select_top, RankOptions, RelevanceModel};
use crate::pipeline::{crop, extract, figure, input, render};
use futures::stream::{self, StreamExt};
use once_cell::sync::Lazy;
use regex::Regex;
use std::collections::HashSet;
use std::path::{Path, PathBuf};
use std::sync::atomic::{AtomicUsize, Ordering};
use std::time::Instant;
use tracing::{debug, info, warn};

static RE_NON_SLUG: Lazy<Regex> = Lazy::new(|| Regex::new(r"[^a-z0-9]+").unwrap());

/// Longest document id produced by [`slugify`].
pub const MAX_SLUG_CHARS: usize = 120;

/// A document to digest.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct DocumentSource {
    /// Stable id; names every output file of the document.
    pub id: String,
    /// Human-readable name, usually the file name.
    pub name: String,
    /// Local path or HTTP(S) URL.
    pub location: String,
}

impl DocumentSource {
    /// Source for a path or URL; the id is the slug of the file stem.
    pub fn new(location: impl Into<String>) -> Self {
        let location = location.into();
        let name = if input::is_url(&location) {
            input::filename_from_url(&location)
        } else {
            Path::new(&location)
                .file_name()
                .map(|n| n.to_string_lossy().into_owned())
                .unwrap_or_else(|| location.clone())
        };
        let stem = Path::new(&name)
            .file_stem()
            .map(|s| s.to_string_lossy().into_owned())
            .unwrap_or_else(|| name.clone());
        Self {
            id: slugify(&stem),
            name,
            location,
        }
    }

    pub fn with_id(mut self, id: impl Into<String>) -> Self {
        self.id = id.into();
        self
    }
}

/// Lower-case, collapse every run of non-alphanumerics to `-`, trim dashes,
/// cap at [`MAX_SLUG_CHARS`]; `"report"` when nothing is left.
pub fn slugify(text: &str) -> String {
    let lowered = text.to_lowercase();
    let dashed = RE_NON_SLUG.replace_all(&lowered, "-");
    let slug: String = dashed.trim_matches('-').chars().take(MAX_SLUG_CHARS).collect();
    if slug.is_empty() {
        "report".to_string()
    } else {
        slug
    }
}

/// Suffix repeated ids (`report`, `report-2`, `report-3`, …) so documents in
/// one batch never share output files.
pub fn assign_unique_ids(sources: &mut [DocumentSource]) {
    let mut taken: HashSet<String> = HashSet::new();
    for source in sources.iter_mut() {
        if taken.insert(source.id.clone()) {
            continue;
        }
        let renamed = (2..)
            .map(|n| format!("{}-{}", source.id, n))
            .find(|candidate| !taken.contains(candidate))
            .unwrap_or_else(|| source.id.clone());
        debug!("Renaming duplicate id {} → {}", source.id, renamed);
        taken.insert(renamed.clone());
        source.id = renamed;
    }
}

/// Run the full pipeline for one document.
///
/// Returns [`DocumentOutcome::Skipped`] when the ledger already holds the
/// same id and content hash (unless `config.force`).
pub async fn process_document(
    source: &DocumentSource,
    config: &LensConfig,
    model: Option<&dyn RelevanceModel>,
    ledger: &dyn Ledger,
) -> Result<DocumentOutcome, LensError> {
    match check_ledger(source, config, ledger).await? {
        LedgerCheck::Skip(outcome) => Ok(outcome),
        LedgerCheck::Digest {
            resolved,
            content_hash,
        } => digest_and_record(source, resolved.path(), &content_hash, config, model, ledger).await,
    }
}

enum LedgerCheck {
    Skip(DocumentOutcome),
    Digest {
        resolved: input::ResolvedInput,
        content_hash: String,
    },
}

async fn check_ledger(
    source: &DocumentSource,
    config: &LensConfig,
    ledger: &dyn Ledger,
) -> Result<LedgerCheck, LensError> {
    info!("Processing {} ({})", source.name, source.id);

    // ── Step 1: Resolve input ────────────────────────────────────────────
    let resolved = input::resolve_input(&source.location, config.download_timeout_secs).await?;

    // ── Step 2: Content hash + ledger ────────────────────────────────────
    let content_hash = input::content_hash(resolved.path()).await?;
    debug!("{}: md5 {}", source.id, content_hash);
    if !config.force && ledger.is_processed(&source.id, &content_hash)? {
        info!("{}: already processed, skipping", source.id);
        return Ok(LedgerCheck::Skip(DocumentOutcome::Skipped {
            document_id: source.id.clone(),
            content_hash,
        }));
    }
    Ok(LedgerCheck::Digest {
        resolved,
        content_hash,
    })
}

async fn digest_and_record(
    source: &DocumentSource,
    pdf_path: &Path,
    content_hash: &str,
    config: &LensConfig,
    model: Option<&dyn RelevanceModel>,
    ledger: &dyn Ledger,
) -> Result<DocumentOutcome, LensError> {
    // ── Step 3: Digest ───────────────────────────────────────────────────
    let digest = digest_pdf(source, pdf_path, content_hash, config, model).await?;

    // ── Step 4: Persist + record ─────────────────────────────────────────
    let digest_path = write_digest(&digest, &config.output_dir)?;
    ledger.record(&source.id, content_hash)?;

    info!(
        "{}: digest written to {} ({} gallery items)",
        source.id,
        digest_path.display(),
        digest.gallery.len()
    );
    Ok(DocumentOutcome::Digested {
        document_id: digest.document_id,
        digest_path: digest_path.display().to_string(),
        gallery_len: digest.gallery.len(),
    })
}

/// Digest slots shared by the documents of one batch.
struct DigestBudget {
    limit: Option<usize>,
    claimed: AtomicUsize,
}

impl DigestBudget {
    fn new(limit: Option<usize>) -> Self {
        Self {
            limit,
            claimed: AtomicUsize::new(0),
        }
    }

    fn claim(&self) -> bool {
        match self.limit {
            None => true,
            Some(limit) => self
                .claimed
                .fetch_update(Ordering::SeqCst, Ordering::SeqCst, |n| {
                    (n < limit).then_some(n + 1)
                })
                .is_ok(),
        }
    }

    fn exhausted(&self) -> bool {
        self.limit
            .is_some_and(|limit| self.claimed.load(Ordering::SeqCst) >= limit)
    }

    /// Give back a slot whose document failed.
    fn release(&self) {
        if self.limit.is_some() {
            self.claimed.fetch_sub(1, Ordering::SeqCst);
        }
    }
}

/// Run one document of a batch. `None` means the batch limit was reached
/// before this document needed a digest.
async fn process_limited(
    source: &DocumentSource,
    config: &LensConfig,
    model: Option<&dyn RelevanceModel>,
    ledger: &dyn Ledger,
    budget: &DigestBudget,
) -> Result<Option<DocumentOutcome>, LensError> {
    if budget.exhausted() {
        return Ok(None);
    }
    let (resolved, content_hash) = match check_ledger(source, config, ledger).await? {
        LedgerCheck::Skip(outcome) => return Ok(Some(outcome)),
        LedgerCheck::Digest {
            resolved,
            content_hash,
        } => (resolved, content_hash),
    };
    if !budget.claim() {
        debug!("{}: batch limit reached", source.id);
        return Ok(None);
    }
    let outcome =
        digest_and_record(source, resolved.path(), &content_hash, config, model, ledger).await;
    if outcome.is_err() {
        budget.release();
    }
    outcome.map(Some)
}

/// Build the digest for an already-resolved PDF; writes image assets but
/// neither the digest JSON nor the ledger.
pub async fn digest_pdf(
    source: &DocumentSource,
    pdf_path: &Path,
    content_hash: &str,
    config: &LensConfig,
    model: Option<&dyn RelevanceModel>,
) -> Result<DocumentDigest, LensError> {
    let total_start = Instant::now();
    let out = &config.output_dir;
    let doc_dir = document_dir(out, &source.id);
    std::fs::create_dir_all(&doc_dir).map_err(|e| LensError::OutputWriteFailed {
        path: doc_dir.clone(),
        source: e,
    })?;

    let mut stats = DigestStats {
        page_count: render::page_count(pdf_path).await?,
        ..Default::default()
    };

    // ── Hero figure ──────────────────────────────────────────────────────
    let hero = figure::hero_figure(pdf_path, out, &source.id, &config.regions).await;

    // ── Candidates ───────────────────────────────────────────────────────
    let extract_start = Instant::now();
    let mut candidates = extract::extract_candidates(pdf_path, &doc_dir, &config.regions).await;
    rebase_thumbnails(&mut candidates, &source.id);
    stats.extract_duration_ms = extract_start.elapsed().as_millis() as u64;
    stats.chart_candidates = count_kind(&candidates, CandidateKind::Chart);
    stats.table_candidates = count_kind(&candidates, CandidateKind::Table);
    info!(
        "{}: {} charts, {} tables",
        source.id, stats.chart_candidates, stats.table_candidates
    );

    // ── Rank ─────────────────────────────────────────────────────────────
    let rank_start = Instant::now();
    let (ranked, ranking_available) = rank_or_degrade(&candidates, config, model, &source.id).await;
    stats.rank_duration_ms = rank_start.elapsed().as_millis() as u64;

    // ── Top-N + crop ─────────────────────────────────────────────────────
    let selected = select_top(&ranked, &candidates, config.top_n);
    let crop_start = Instant::now();
    let slices =
        crop::crop_regions(pdf_path, &doc_dir, &selected, config.crop_pad, config.crop_zoom).await?;
    stats.crop_duration_ms = crop_start.elapsed().as_millis() as u64;
    let gallery: Vec<GalleryItem> = selected
        .into_iter()
        .zip(slices)
        .map(|(region, path)| GalleryItem {
            id: region.id,
            kind: region.kind,
            score: region.score,
            path: under_document(&source.id, &path),
        })
        .collect();

    // ── Preview ──────────────────────────────────────────────────────────
    let preview = if config.render_preview {
        render::render_first_page(pdf_path, out, &source.id, config.preview_dpi).await
    } else {
        None
    };

    stats.total_duration_ms = total_start.elapsed().as_millis() as u64;
    Ok(DocumentDigest {
        document_id: source.id.clone(),
        name: source.name.clone(),
        source: source.location.clone(),
        content_hash: content_hash.to_string(),
        hero,
        preview,
        candidates,
        ranked,
        ranking_available,
        gallery,
        stats,
    })
}

async fn rank_or_degrade(
    candidates: &[Candidate],
    config: &LensConfig,
    model: Option<&dyn RelevanceModel>,
    document_id: &str,
) -> (Vec<RankedItem>, bool) {
    let Some(model) = model.filter(|_| config.rank) else {
        debug!("{}: ranking disabled", document_id);
        return (Vec::new(), false);
    };
    let options = RankOptions::from_config(config, document_id);
    match rank_candidates(candidates, model, &options).await {
        Ok(ranked) => (ranked, true),
        Err(e) => {
            warn!("{}: ranking failed, continuing without ranks: {}", document_id, e);
            (Vec::new(), false)
        }
    }
}

/// Per-document directory for thumbnails and slices.
pub fn document_dir(out_dir: &Path, document_id: &str) -> PathBuf {
    out_dir.join(document_id)
}

fn under_document(document_id: &str, rel: &str) -> String {
    format!("{document_id}/{rel}")
}

/// Make thumbnail paths written under [`document_dir`] relative to the
/// output root.
pub fn rebase_thumbnails(candidates: &mut [Candidate], document_id: &str) {
    for c in candidates {
        c.thumb_path = c.thumb_path.take().map(|p| under_document(document_id, &p));
    }
}

fn count_kind(candidates: &[Candidate], kind: CandidateKind) -> usize {
    candidates.iter().filter(|c| c.kind == kind).count()
}

/// Write `<out>/<doc>.json` atomically, returning its path.
pub fn write_digest(digest: &DocumentDigest, out_dir: &Path) -> Result<PathBuf, LensError> {
    let path = out_dir.join(format!("{}.json", digest.document_id));
    let json = serde_json::to_string_pretty(digest)
        .map_err(|e| LensError::Internal(format!("Digest serialisation failed: {}", e)))?;
    write_atomic(&path, json.as_bytes()).map_err(|source| LensError::OutputWriteFailed {
        path: path.clone(),
        source,
    })?;
    Ok(path)
}

/// Digest every source with at most `config.concurrency` in flight.
///
/// Per-document errors become [`DocumentOutcome::Failed`] and never stop
/// the batch. With `config.batch_limit` set, documents left once that many
/// digests are written are not run and have no outcome. Outcomes are
/// reported in input order.
pub async fn process_batch(
    sources: &[DocumentSource],
    config: &LensConfig,
    model: Option<&dyn RelevanceModel>,
    ledger: &dyn Ledger,
) -> BatchReport {
    let mut sources = sources.to_vec();
    assign_unique_ids(&mut sources);

    let total = sources.len();
    info!("Batch: {} documents, concurrency {}", total, config.concurrency);
    if let Some(ref cb) = config.progress_callback {
        cb.on_batch_start(total);
    }

    let budget = DigestBudget::new(config.batch_limit);
    let budget = &budget;
    let mut indexed: Vec<(usize, DocumentOutcome)> =
        stream::iter(sources.iter().enumerate().map(|(idx, source)| async move {
            if budget.exhausted() {
                return None;
            }
            if let Some(ref cb) = config.progress_callback {
                cb.on_document_start(&source.name);
            }
            let outcome = match process_limited(source, config, model, ledger, budget).await {
                Ok(Some(outcome)) => outcome,
                Ok(None) => return None,
                Err(e) => {
                    warn!("Error processing {}: {}", source.name, e);
                    DocumentOutcome::Failed {
                        name: source.name.clone(),
                        error: e.to_string(),
                    }
                }
            };
            if let Some(ref cb) = config.progress_callback {
                match &outcome {
                    DocumentOutcome::Digested { gallery_len, .. } => {
                        cb.on_document_complete(&source.name, *gallery_len)
                    }
                    DocumentOutcome::Skipped { .. } => cb.on_document_skipped(&source.name),
                    DocumentOutcome::Failed { error, .. } => {
                        cb.on_document_error(&source.name, error)
                    }
                }
            }
            Some((idx, outcome))
        }))
        .buffer_unordered(config.concurrency.max(1))
        .filter_map(|item| async move { item })
        .collect()
        .await;

    indexed.sort_by_key(|(idx, _)| *idx);
    let report = BatchReport {
        outcomes: indexed.into_iter().map(|(_, o)| o).collect(),
    };

    info!(
        "Batch done: {} digested, {} skipped, {} failed",
        report.digested(),
        report.skipped(),
        report.failed()
    );
    if let Some(ref cb) = config.progress_callback {
        cb.on_batch_complete(total, report.digested());
    }
    report
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::ledger::MemoryLedger;
    use crate::progress::DigestProgressCallback;
    use std::sync::atomic::{AtomicUsize, Ordering};
    use std::sync::Arc;

    #[test]
    fn slug_rules() {
        assert_eq!(slugify("Q3 Market Report (Final)"), "q3-market-report-final");
        assert_eq!(slugify("--Hello__World--"), "hello-world");
        assert_eq!(slugify("Отчёт"), "report");
        assert_eq!(slugify(""), "report");
        assert_eq!(slugify(&"a".repeat(300)).len(), MAX_SLUG_CHARS);
    }

    #[test]
    fn source_from_path_and_url() {
        let local = DocumentSource::new("/data/in/Q3 Outlook.pdf");
        assert_eq!(local.name, "Q3 Outlook.pdf");
        assert_eq!(local.id, "q3-outlook");

        let remote = DocumentSource::new("https://example.com/r/EV_Market-2025.pdf");
        assert_eq!(remote.name, "EV_Market-2025.pdf");
        assert_eq!(remote.id, "ev-market-2025");
        assert_eq!(remote.with_id("ev").id, "ev");
    }

    #[test]
    fn duplicate_ids_get_suffixes() {
        let mut sources = vec![
            DocumentSource::new("a/report.pdf"),
            DocumentSource::new("b/report.pdf"),
            DocumentSource::new("c/other.pdf"),
            DocumentSource::new("d/Report.pdf"),
        ];
        assign_unique_ids(&mut sources);
        let ids: Vec<&str> = sources.iter().map(|s| s.id.as_str()).collect();
        assert_eq!(ids, vec!["report", "report-2", "other", "report-3"]);
    }

    #[test]
    fn digest_is_written_under_its_id() {
        let dir = tempfile::tempdir().unwrap();
        let digest = DocumentDigest {
            document_id: "q3".into(),
            name: "q3.pdf".into(),
            source: "q3.pdf".into(),
            content_hash: "abc".into(),
            hero: None,
            preview: None,
            candidates: Vec::new(),
            ranked: Vec::new(),
            ranking_available: false,
            gallery: Vec::new(),
            stats: DigestStats::default(),
        };
        let path = write_digest(&digest, dir.path()).unwrap();
        assert_eq!(path, dir.path().join("q3.json"));
        let back: DocumentDigest =
            serde_json::from_str(&std::fs::read_to_string(&path).unwrap()).unwrap();
        assert_eq!(back, digest);
    }

    #[derive(Default)]
    struct Counting {
        errors: AtomicUsize,
        finished: AtomicUsize,
    }

    impl DigestProgressCallback for Counting {
        fn on_document_error(&self, _name: &str, _error: &str) {
            self.errors.fetch_add(1, Ordering::SeqCst);
        }

        fn on_batch_complete(&self, total: usize, _digested: usize) {
            self.finished.store(total, Ordering::SeqCst);
        }
    }

    #[tokio::test]
    async fn batch_continues_past_failures_in_order() {
        let dir = tempfile::tempdir().unwrap();
        let not_pdf = dir.path().join("notes.pdf");
        std::fs::write(&not_pdf, b"plain text").unwrap();

        let cb = Arc::new(Counting::default());
        let config = LensConfig::builder()
            .output_dir(dir.path().join("out"))
            .concurrency(2)
            .progress_callback(cb.clone())
            .build()
            .unwrap();
        let sources = vec![
            DocumentSource::new(dir.path().join("missing.pdf").display().to_string()),
            DocumentSource::new(not_pdf.display().to_string()),
        ];

        let ledger = MemoryLedger::new();
        let report = process_batch(&sources, &config, None, &ledger).await;

        assert_eq!(report.outcomes.len(), 2);
        assert_eq!(report.failed(), 2);
        match &report.outcomes[0] {
            DocumentOutcome::Failed { name, error } => {
                assert_eq!(name, "missing.pdf");
                assert!(error.contains("not found"));
            }
            other => panic!("unexpected outcome: {other:?}"),
        }
        assert!(matches!(
            &report.outcomes[1],
            DocumentOutcome::Failed { name, .. } if name == "notes.pdf"
        ));
        assert_eq!(cb.errors.load(Ordering::SeqCst), 2);
        assert_eq!(cb.finished.load(Ordering::SeqCst), 2);
        assert!(ledger.is_empty());
    }

    #[tokio::test]
    async fn recorded_document_is_skipped_before_any_pdf_work() {
        let dir = tempfile::tempdir().unwrap();
        // Valid magic but not a parseable PDF: reaching pdfium would fail.
        let path = dir.path().join("weekly.pdf");
        std::fs::write(&path, b"%PDF-1.4 truncated").unwrap();
        let source = DocumentSource::new(path.display().to_string());

        let ledger = MemoryLedger::new();
        ledger
            .record(&source.id, &input::hash_bytes(b"%PDF-1.4 truncated"))
            .unwrap();

        let config = LensConfig::builder()
            .output_dir(dir.path().join("out"))
            .build()
            .unwrap();
        let outcome = process_document(&source, &config, None, &ledger).await.unwrap();
        assert!(matches!(outcome, DocumentOutcome::Skipped { ref document_id, .. } if document_id == "weekly"));
    }

    #[tokio::test]
    async fn batch_renames_colliding_ids() {
        let dir = tempfile::tempdir().unwrap();
        let bytes = b"%PDF-1.4 truncated";
        let mut sources = Vec::new();
        for sub in ["east", "west"] {
            let path = dir.path().join(sub).join("weekly.pdf");
            std::fs::create_dir_all(path.parent().unwrap()).unwrap();
            std::fs::write(&path, bytes).unwrap();
            sources.push(DocumentSource::new(path.display().to_string()));
        }
        assert_eq!(sources[0].id, sources[1].id);

        let ledger = MemoryLedger::new();
        let hash = input::hash_bytes(bytes);
        ledger.record("weekly", &hash).unwrap();
        ledger.record("weekly-2", &hash).unwrap();

        let config = LensConfig::builder()
            .output_dir(dir.path().join("out"))
            .build()
            .unwrap();
        let report = process_batch(&sources, &config, None, &ledger).await;

        let ids: Vec<&str> = report
            .outcomes
            .iter()
            .map(|o| match o {
                DocumentOutcome::Skipped { document_id, .. } => document_id.as_str(),
                other => panic!("unexpected outcome: {other:?}"),
            })
            .collect();
        assert_eq!(ids, vec!["weekly", "weekly-2"]);
    }

    #[test]
    fn renamed_ids_avoid_existing_ones() {
        let mut sources = vec![
            DocumentSource::new("a/report.pdf"),
            DocumentSource::new("b/report-2.pdf"),
            DocumentSource::new("c/report.pdf"),
        ];
        assign_unique_ids(&mut sources);
        let ids: Vec<&str> = sources.iter().map(|s| s.id.as_str()).collect();
        assert_eq!(ids, vec!["report", "report-2", "report-3"]);
    }

    #[test]
    fn thumbnails_are_rebased_onto_the_output_root() {
        let mut candidates = vec![
            Candidate {
                id: "chart-0-0".into(),
                kind: CandidateKind::Chart,
                page: 0,
                bbox: (0.0, 0.0, 10.0, 10.0),
                preview_text: String::new(),
                caption: None,
                thumb_path: Some("thumbs/chart-0-0.png".into()),
                meta: Default::default(),
            },
            Candidate {
                id: "table-0-0".into(),
                kind: CandidateKind::Table,
                page: 0,
                bbox: (0.0, 20.0, 10.0, 30.0),
                preview_text: String::new(),
                caption: None,
                thumb_path: None,
                meta: Default::default(),
            },
        ];
        rebase_thumbnails(&mut candidates, "q3");
        assert_eq!(candidates[0].thumb_path.as_deref(), Some("q3/thumbs/chart-0-0.png"));
        assert_eq!(candidates[1].thumb_path, None);
    }

    #[test]
    fn digest_budget_counts_claims_and_releases() {
        let unlimited = DigestBudget::new(None);
        assert!((0..100).all(|_| unlimited.claim()));
        assert!(!unlimited.exhausted());

        let budget = DigestBudget::new(Some(2));
        assert!(budget.claim());
        assert!(budget.claim());
        assert!(budget.exhausted());
        assert!(!budget.claim());
        budget.release();
        assert!(!budget.exhausted());
        assert!(budget.claim());
    }

    #[tokio::test]
    async fn batch_limit_counts_only_digests() {
        let dir = tempfile::tempdir().unwrap();
        let bytes = b"%PDF-1.4 truncated";
        let mut sources = Vec::new();
        for name in ["weekly.pdf", "a.pdf", "b.pdf"] {
            let path = dir.path().join(name);
            std::fs::write(&path, bytes).unwrap();
            sources.push(DocumentSource::new(path.display().to_string()));
        }
        let ledger = MemoryLedger::new();
        ledger.record("weekly", &input::hash_bytes(bytes)).unwrap();

        let config = LensConfig::builder()
            .output_dir(dir.path().join("out"))
            .batch_limit(Some(1))
            .build()
            .unwrap();
        let report = process_batch(&sources, &config, None, &ledger).await;

        // The skip and both failed digests leave the single slot unused.
        assert_eq!(report.outcomes.len(), 3);
        assert_eq!(report.skipped(), 1);
        assert_eq!(report.failed(), 2);
    }

    #[tokio::test]
    async fn exhausted_batch_limit_runs_nothing() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("weekly.pdf");
        std::fs::write(&path, b"%PDF-1.4 truncated").unwrap();
        let sources = vec![DocumentSource::new(path.display().to_string())];

        let cb = Arc::new(Counting::default());
        let config = LensConfig::builder()
            .output_dir(dir.path().join("out"))
            .batch_limit(Some(0))
            .progress_callback(cb.clone())
            .build()
            .unwrap();
        let ledger = MemoryLedger::new();
        let report = process_batch(&sources, &config, None, &ledger).await;

        assert!(report.outcomes.is_empty());
        assert_eq!(cb.errors.load(Ordering::SeqCst), 0);
        assert!(ledger.is_empty());
    }
}
