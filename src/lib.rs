//! # market-lens
//!
//! Find the charts and tables that matter in PDF market reports, rank them
//! with an LLM, and crop them into a per-document digest.
//!
//! ## Why this crate?
//!
//! Market reports bury their few telling exhibits among dozens of pages of
//! boilerplate. Sending whole pages to a vision model is slow and costly.
//! This crate finds candidate regions locally (embedded chart images and
//! ruled tables), sends only short text summaries to a text model for
//! scoring, and rasterises just the winners.
//!
//! ## Pipeline Overview
//!
//! ```text
//! PDF
//!  │
//!  ├─ 1. Input    resolve local file or download from URL, MD5 for the ledger
//!  ├─ 2. Figure   pick one hero image for the document
//!  ├─ 3. Extract  chart candidates (images) + table candidates (ruled grids)
//!  ├─ 4. Rank     text-only summaries → LLM → scores (degrades to none)
//!  ├─ 5. Crop     top-N regions → slices/<id>.png
//!  └─ 6. Digest   <out>/<doc>.json + first-page preview
//! ```
//!
//! ## Quick Start
//!
//! ```rust,no_run
//! use market_lens::{process_batch, DocumentSource, JsonLedger, LensConfig, LlmRelevanceModel};
//!
//! #[tokio::main]
//! async fn main() -> Result<(), Box<dyn std::error::Error>> {
//!     // Provider auto-detected from OPENAI_API_KEY / ANTHROPIC_API_KEY / …
//!     let config = LensConfig::builder().output_dir("out").build()?;
//!     let model = LlmRelevanceModel::from_config(&config)?;
//!     let ledger = JsonLedger::open("state/ledger.json")?;
//!
//!     let sources = vec![DocumentSource::new("reports/q3-outlook.pdf")];
//!     let report = process_batch(&sources, &config, Some(&model), &ledger).await;
//!     eprintln!("{} digested, {} failed", report.digested(), report.failed());
//!     Ok(())
//! }
//! ```
//!
//! ## Feature Flags
//!
//! | Feature | Default | Description |
//! |---------|---------|-------------|
//! | `cli`   | on      | Enables the `market-lens` binary (clap + anyhow + tracing-subscriber + indicatif) |
//!
//! pdfium is loaded at runtime: set `PDFIUM_LIB_PATH` or place the shared
//! library next to the binary.

// ── Modules ──────────────────────────────────────────────────────────────

pub mod candidate;
pub mod config;
pub mod digest;
pub mod error;
pub mod ledger;
pub mod output;
pub mod pipeline;
pub mod progress;
pub mod prompts;

// ── Re-exports ───────────────────────────────────────────────────────────

pub use candidate::{Candidate, CandidateKind, MetaValue, RankedItem, SelectedRegion};
pub use config::{LensConfig, LensConfigBuilder, RegionConfig};
pub use digest::{process_batch, process_document, slugify, DocumentSource};
pub use error::{LensError, RankError, RegionError};
pub use ledger::{JsonLedger, Ledger, MemoryLedger};
pub use output::{BatchReport, DocumentDigest, DocumentOutcome, GalleryItem, HeroFigure};
pub use pipeline::crop::crop_regions;
pub use pipeline::extract::extract_candidates;
pub use pipeline::figure::select_hero_figure;
pub use pipeline::llm::LlmRelevanceModel;
pub use pipeline::rank::{rank_candidates, select_top, RelevanceModel};
pub use progress::{DigestProgressCallback, NoopProgressCallback};
