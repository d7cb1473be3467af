//! Progress-callback trait for batch digest events.
//!
//! Inject an [`Arc<dyn DigestProgressCallback>`] via
//! [`crate::config::LensConfigBuilder::progress_callback`] to receive events
//! as the batch driver works through its documents.
//!
//! # Example
//!
//! ```rust
//! use market_lens::{DigestProgressCallback, LensConfig};
//! use std::sync::{Arc, atomic::{AtomicUsize, Ordering}};
//!
//! struct CountingCallback {
//!     done: AtomicUsize,
//! }
//!
//! impl DigestProgressCallback for CountingCallback {
//!     fn on_document_complete(&self, name: &str, gallery_len: usize) {
//!         let n = self.done.fetch_add(1, Ordering::SeqCst) + 1;
//!         eprintln!("{n}: {name} ({gallery_len} regions)");
//!     }
//! }
//!
//! let cb = Arc::new(CountingCallback { done: AtomicUsize::new(0) });
//!
//! let config = LensConfig::builder()
//!     .progress_callback(cb as Arc<dyn DigestProgressCallback>)
//!     .build()
//!     .unwrap();
//! ```

use std::sync::Arc;

/// Called by the batch driver as it processes each document.
///
/// Implementations must be `Send + Sync`: with `concurrency > 1` documents
/// run concurrently and events for different documents interleave. All
/// methods have default no-op implementations.
pub trait DigestProgressCallback: Send + Sync {
    /// Called once before the first document starts.
    fn on_batch_start(&self, total_documents: usize) {
        let _ = total_documents;
    }

    /// Called when a document enters the pipeline.
    fn on_document_start(&self, name: &str) {
        let _ = name;
    }

    /// Called when the ledger says a document was already digested.
    fn on_document_skipped(&self, name: &str) {
        let _ = name;
    }

    /// Called when a document's digest has been written.
    ///
    /// `gallery_len` is the number of cropped regions in the digest.
    fn on_document_complete(&self, name: &str, gallery_len: usize) {
        let _ = (name, gallery_len);
    }

    /// Called when a document failed; the batch continues.
    fn on_document_error(&self, name: &str, error: &str) {
        let _ = (name, error);
    }

    /// Called once after every document has been attempted.
    fn on_batch_complete(&self, total_documents: usize, digested: usize) {
        let _ = (total_documents, digested);
    }
}

/// A no-op implementation for callers that don't need progress events.
pub struct NoopProgressCallback;

impl DigestProgressCallback for NoopProgressCallback {}

/// Convenience alias matching the type stored in [`crate::config::LensConfig`].
pub type ProgressCallback = Arc<dyn DigestProgressCallback>;
