//! Idempotency ledger: which `(document id, content hash)` pairs are done.
//!
//! A document is skipped when the ledger already holds its id with the same
//! hash. Recording replaces any previous entry for the id, so a changed
//! file is processed again on the next run and then remembered under its
//! new hash.

use crate::error::LensError;
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;
use std::path::{Path, PathBuf};
use std::sync::Mutex;
use std::time::{SystemTime, UNIX_EPOCH};
use tracing::debug;

/// Record of processed documents.
pub trait Ledger: Send + Sync {
    fn is_processed(&self, document_id: &str, content_hash: &str) -> Result<bool, LensError>;
    fn record(&self, document_id: &str, content_hash: &str) -> Result<(), LensError>;
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct LedgerEntry {
    pub hash: String,
    /// Unix seconds.
    pub processed_at: u64,
}

fn now_secs() -> u64 {
    SystemTime::now()
        .duration_since(UNIX_EPOCH)
        .map(|d| d.as_secs())
        .unwrap_or(0)
}

/// Ledger persisted as a JSON object `{ id: { hash, processed_at } }`.
///
/// The file is loaded once on open and rewritten in full (temp file then
/// rename) on every record.
pub struct JsonLedger {
    path: PathBuf,
    entries: Mutex<BTreeMap<String, LedgerEntry>>,
}

impl JsonLedger {
    /// Open the ledger at `path`; a missing file is an empty ledger.
    pub fn open(path: impl Into<PathBuf>) -> Result<Self, LensError> {
        let path = path.into();
        let entries = match std::fs::read_to_string(&path) {
            Ok(text) if text.trim().is_empty() => BTreeMap::new(),
            Ok(text) => serde_json::from_str(&text).map_err(|e| LensError::LedgerFailed {
                path: path.clone(),
                detail: format!("invalid JSON: {e}"),
            })?,
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => BTreeMap::new(),
            Err(e) => {
                return Err(LensError::LedgerFailed {
                    path,
                    detail: e.to_string(),
                })
            }
        };
        debug!("Ledger {}: {} entries", path.display(), entries.len());
        Ok(Self {
            path,
            entries: Mutex::new(entries),
        })
    }

    pub fn path(&self) -> &Path {
        &self.path
    }

    pub fn entry(&self, document_id: &str) -> Option<LedgerEntry> {
        self.lock().ok()?.get(document_id).cloned()
    }

    fn lock(&self) -> Result<std::sync::MutexGuard<'_, BTreeMap<String, LedgerEntry>>, LensError> {
        self.entries.lock().map_err(|_| LensError::LedgerFailed {
            path: self.path.clone(),
            detail: "ledger lock poisoned".into(),
        })
    }

    fn persist(&self, entries: &BTreeMap<String, LedgerEntry>) -> Result<(), LensError> {
        let failed = |detail: String| LensError::LedgerFailed {
            path: self.path.clone(),
            detail,
        };
        let json = serde_json::to_string_pretty(entries).map_err(|e| failed(e.to_string()))?;
        write_atomic(&self.path, json.as_bytes()).map_err(|e| failed(e.to_string()))
    }
}

impl Ledger for JsonLedger {
    fn is_processed(&self, document_id: &str, content_hash: &str) -> Result<bool, LensError> {
        Ok(self
            .lock()?
            .get(document_id)
            .is_some_and(|e| e.hash == content_hash))
    }

    fn record(&self, document_id: &str, content_hash: &str) -> Result<(), LensError> {
        let mut entries = self.lock()?;
        entries.insert(
            document_id.to_string(),
            LedgerEntry {
                hash: content_hash.to_string(),
                processed_at: now_secs(),
            },
        );
        self.persist(&entries)
    }
}

/// In-process ledger; nothing survives the run.
#[derive(Default)]
pub struct MemoryLedger {
    entries: Mutex<BTreeMap<String, String>>,
}

impl MemoryLedger {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn len(&self) -> usize {
        self.entries.lock().map(|e| e.len()).unwrap_or(0)
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }
}

impl Ledger for MemoryLedger {
    fn is_processed(&self, document_id: &str, content_hash: &str) -> Result<bool, LensError> {
        let entries = self
            .entries
            .lock()
            .map_err(|_| LensError::Internal("ledger lock poisoned".into()))?;
        Ok(entries.get(document_id).is_some_and(|h| h == content_hash))
    }

    fn record(&self, document_id: &str, content_hash: &str) -> Result<(), LensError> {
        self.entries
            .lock()
            .map_err(|_| LensError::Internal("ledger lock poisoned".into()))?
            .insert(document_id.to_string(), content_hash.to_string());
        Ok(())
    }
}

/// Write via a sibling temp file and rename, creating parent directories.
pub(crate) fn write_atomic(path: &Path, bytes: &[u8]) -> std::io::Result<()> {
    let parent = path
        .parent()
        .filter(|p| !p.as_os_str().is_empty())
        .unwrap_or_else(|| Path::new("."));
    std::fs::create_dir_all(parent)?;
    let mut tmp = tempfile::NamedTempFile::new_in(parent)?;
    std::io::Write::write_all(&mut tmp, bytes)?;
    tmp.persist(path).map_err(|e| e.error)?;
    Ok(())
}
