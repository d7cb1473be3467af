//! Pipeline stages for region extraction, ranking and cropping.
//!
//! Each submodule implements one step. Heuristics are pure functions over a
//! [`layout::PageLayout`]; only the thin pdfium-facing edges
//! ([`layout::read_page_layout`], image decoding, rendering) touch the
//! library, and they all run inside `spawn_blocking`.
//!
//! ## Data Flow
//!
//! ```text
//! input ──▶ layout ──▶ extract ──▶ rank ──▶ crop
//! (URL/path) (pdfium)  (charts,    (LLM)   (slices)
//!                 │     tables)
//!                 └──▶ figure (hero image)        render (page-1 preview)
//! ```
//!
//! 1. [`input`]    — local path or URL to a local PDF, plus its MD5
//! 2. [`layout`]   — one page as text blocks, glyphs, images and ruling edges
//! 3. [`extract`]  — chart candidates from images, table candidates from
//!    [`lattice`] grids
//! 4. [`figure`]   — the single hero image of the document
//! 5. [`rank`]     — text-only relevance ranking via a [`rank::RelevanceModel`]
//!    ([`llm`] adapts an LLM provider); the only stage with network I/O
//! 6. [`crop`]     — rasterise the top-N regions
//! 7. [`render`]   — first-page preview and page count

pub mod crop;
pub mod encode;
pub mod extract;
pub mod figure;
pub mod geometry;
pub mod input;
pub mod lattice;
pub mod layout;
pub mod llm;
pub mod pdfium;
pub mod rank;
pub mod render;
