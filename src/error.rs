//! Error types for the market-lens library.
//!
//! Three error types reflect three distinct failure modes:
//!
//! * [`LensError`] — **Fatal for one document**: the document cannot be
//!   processed at all (missing file, not a PDF, pdfium unavailable, output
//!   directory not writable). The batch driver logs it and moves on to the
//!   next document.
//!
//! * [`RegionError`] — **Non-fatal**: a single image, page or asset failed.
//!   Extraction and figure selection log it and skip the item, so one
//!   malformed page never costs the whole document.
//!
//! * [`RankError`] — the relevance-ranking call failed. Callers degrade to
//!   an empty ranking: the digest is still produced, just without a gallery.

use std::path::PathBuf;
use thiserror::Error;

/// Fatal errors for a single document.
#[derive(Debug, Error)]
pub enum LensError {
    // ── Input errors ──────────────────────────────────────────────────────
    /// Input file was not found at the given path.
    #[error("PDF file not found: '{path}'\nCheck the path exists and is readable.")]
    FileNotFound { path: PathBuf },

    /// Process does not have read permission on the file.
    #[error("Permission denied reading '{path}'\nTry: chmod +r {path:?}")]
    PermissionDenied { path: PathBuf },

    /// HTTP URL was syntactically valid but download failed.
    #[error("Failed to download '{url}': {reason}\nCheck your internet connection.")]
    DownloadFailed { url: String, reason: String },

    /// Download exceeded the configured timeout.
    #[error("Download timed out after {secs}s for '{url}'\nIncrease --download-timeout.")]
    DownloadTimeout { url: String, secs: u64 },

    /// The file exists and was read, but is not a PDF.
    #[error("File is not a valid PDF: '{path}'\nFirst bytes: {magic:?}")]
    NotAPdf { path: PathBuf, magic: [u8; 4] },

    // ── PDF errors ────────────────────────────────────────────────────────
    /// PDF header/trailer/xref is corrupt and cannot be parsed.
    #[error("PDF '{path}' is corrupt: {detail}")]
    CorruptPdf { path: PathBuf, detail: String },

    /// pdfium-render returned an error while rasterising a page.
    #[error("Rasterisation failed for page {page}: {detail}")]
    RasterisationFailed { page: usize, detail: String },

    /// Could not bind to a pdfium library.
    #[error(
        "Failed to bind to pdfium library: {0}\n\
Set PDFIUM_LIB_PATH=/path/to/libpdfium or place the library next to the binary."
    )]
    PdfiumBindingFailed(String),

    // ── LLM errors ────────────────────────────────────────────────────────
    /// The configured provider is not initialised (missing API key etc.).
    #[error("LLM provider '{provider}' is not configured.\n{hint}")]
    ProviderNotConfigured { provider: String, hint: String },

    // ── I/O errors ────────────────────────────────────────────────────────
    /// Could not create or write an output file (image, digest).
    #[error("Failed to write output file '{path}': {source}")]
    OutputWriteFailed {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },

    /// The idempotency ledger could not be read or written.
    #[error("Ledger '{path}' unavailable: {detail}")]
    LedgerFailed { path: PathBuf, detail: String },

    // ── Config errors ─────────────────────────────────────────────────────
    /// Builder validation failed.
    #[error("Invalid configuration: {0}")]
    InvalidConfig(String),

    // ── Catch-all ─────────────────────────────────────────────────────────
    /// Unexpected internal error.
    #[error("Internal error: {0}")]
    Internal(String),
}

/// A non-fatal error for one page, image or asset.
#[derive(Debug, Clone, Error, serde::Serialize, serde::Deserialize)]
pub enum RegionError {
    /// The page could not be loaded or its objects enumerated.
    #[error("Page {page}: unreadable: {detail}")]
    PageUnreadable { page: usize, detail: String },

    /// An embedded image could not be decoded to pixels.
    #[error("Page {page}: image {object} could not be decoded: {detail}")]
    ImageDecode {
        page: usize,
        object: usize,
        detail: String,
    },

    /// An image asset (thumbnail, figure, slice) could not be written.
    #[error("Failed to write asset '{path}': {detail}")]
    AssetWrite { path: String, detail: String },

    /// The document could not be opened for a best-effort stage.
    #[error("Document unavailable: {detail}")]
    DocumentUnavailable { detail: String },
}

/// Failure of the relevance-ranking call.
#[derive(Debug, Clone, Error)]
pub enum RankError {
    /// The model call itself failed after every retry.
    #[error("Ranking model failed after {attempts} attempt(s): {detail}")]
    Model { attempts: u32, detail: String },

    /// The response was not valid JSON.
    #[error("Ranking response is not valid JSON: {detail}")]
    Parse { detail: String },

    /// The response was JSON but not an array or a known wrapper object.
    #[error("Ranking response has unexpected shape: {found}")]
    Shape { found: &'static str },
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn not_a_pdf_display() {
        let e = LensError::NotAPdf {
            path: PathBuf::from("/tmp/report.pdf"),
            magic: *b"<htm",
        };
        assert!(e.to_string().contains("report.pdf"));
    }

    #[test]
    fn rasterisation_display_names_page() {
        let e = LensError::RasterisationFailed {
            page: 7,
            detail: "page out of range (document has 3 pages)".into(),
        };
        let msg = e.to_string();
        assert!(msg.contains("page 7"), "got: {msg}");
        assert!(msg.contains("3 pages"), "got: {msg}");
    }

    #[test]
    fn image_decode_display() {
        let e = RegionError::ImageDecode {
            page: 2,
            object: 5,
            detail: "unsupported filter".into(),
        };
        let msg = e.to_string();
        assert!(msg.contains("Page 2"));
        assert!(msg.contains("unsupported filter"));
    }

    #[test]
    fn shape_error_names_found_type() {
        let e = RankError::Shape { found: "object" };
        assert!(e.to_string().contains("object"));
    }

    #[test]
    fn model_error_display() {
        let e = RankError::Model {
            attempts: 4,
            detail: "HTTP 503".into(),
        };
        assert!(e.to_string().contains("4 attempt"));
        assert!(e.to_string().contains("HTTP 503"));
    }
}
