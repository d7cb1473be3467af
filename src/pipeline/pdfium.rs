//! Binding to the pdfium shared library and opening documents.
//!
//! The library is searched for in order:
//! 1. `$PDFIUM_LIB_PATH` (either the library file or its directory)
//! 2. the current directory
//! 3. the system library paths
//!
//! Every pdfium call in this crate happens on a blocking thread, so each
//! stage binds its own instance rather than sharing one across tasks.

use crate::error::LensError;
use pdfium_render::prelude::*;
use std::path::Path;
use tracing::debug;

/// Environment variable pointing at libpdfium.
pub const PDFIUM_LIB_PATH_ENV: &str = "PDFIUM_LIB_PATH";

/// Bind to pdfium, trying `$PDFIUM_LIB_PATH`, `./` and the system paths.
pub fn bind() -> Result<Pdfium, LensError> {
    let from_env = std::env::var(PDFIUM_LIB_PATH_ENV)
        .ok()
        .filter(|p| !p.trim().is_empty());

    let bindings = match from_env {
        Some(path) => {
            debug!("Binding pdfium from {}={}", PDFIUM_LIB_PATH_ENV, path);
            if Path::new(&path).is_dir() {
                Pdfium::bind_to_library(Pdfium::pdfium_platform_library_name_at_path(
                    path.as_str(),
                ))
            } else {
                Pdfium::bind_to_library(path.as_str())
            }
        }
        None => Pdfium::bind_to_library(Pdfium::pdfium_platform_library_name_at_path("./"))
            .or_else(|_| Pdfium::bind_to_system_library()),
    }
    .map_err(|e| LensError::PdfiumBindingFailed(format!("{:?}", e)))?;

    Ok(Pdfium::new(bindings))
}

/// Open a PDF, mapping load failures to [`LensError::CorruptPdf`].
pub fn open_document<'a>(pdfium: &'a Pdfium, path: &Path) -> Result<PdfDocument<'a>, LensError> {
    pdfium
        .load_pdf_from_file(path, None)
        .map_err(|e| LensError::CorruptPdf {
            path: path.to_path_buf(),
            detail: format!("{:?}", e),
        })
}
