//! Error types for the metersheet library.
//!
//! Two distinct error types reflect two distinct failure modes:
//!
//! * [`MeterSheetError`] — **Fatal**: the run cannot proceed at all
//!   (bad input file, rasterisation failure, no VLM credentials, operator
//!   abort at the confirmation gate). Returned as `Err(MeterSheetError)`
//!   from the top-level `run*` functions.
//!
//! * [`PageError`] — **Non-fatal**: a single sheet page failed (enhancement
//!   could not be persisted, extraction transport/parse error) but the other
//!   pages are fine. Stored inside [`crate::record::PageOutcome`] so callers
//!   can inspect partial success rather than losing the whole session to one
//!   bad scan.
//!
//! A third, even smaller tier lives in [`crate::validate::CoercionError`]:
//! a single table row that cannot be coerced to numbers. Those never leave
//! the driver loop — the row is logged and skipped, the page continues.

use std::path::PathBuf;
use thiserror::Error;

/// All fatal errors returned by the metersheet library.
///
/// Page-level failures use [`PageError`] and are stored in
/// [`crate::record::PageOutcome`] rather than propagated here.
#[derive(Debug, Error)]
pub enum MeterSheetError {
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

    /// The file exists and was read, but is not a PDF.
    #[error("File is not a valid PDF: '{path}'\nFirst bytes: {magic:?}")]
    NotAPdf { path: PathBuf, magic: [u8; 4] },

    // ── PDF errors ────────────────────────────────────────────────────────
    /// PDF header/trailer/xref is corrupt and cannot be parsed.
    #[error("PDF '{path}' is corrupt: {detail}\nTry repairing with: qpdf --decrypt input.pdf output.pdf")]
    CorruptPdf { path: PathBuf, detail: String },

    /// Selected page numbers exceed the actual page count.
    #[error("Page {page} is out of range (document has {total} pages)")]
    PageOutOfRange { page: usize, total: usize },

    /// pdfium-render returned an error for a specific page.
    ///
    /// Rasterisation is the one upstream stage the pipeline cannot recover
    /// from: without a page image there is nothing to enhance or extract.
    #[error("Rasterisation failed for page {page}: {detail}")]
    RasterisationFailed { page: usize, detail: String },

    // ── VLM errors ────────────────────────────────────────────────────────
    /// The configured provider is not initialised (missing API key etc.).
    #[error("VLM provider '{provider}' is not configured.\n{hint}")]
    ProviderNotConfigured { provider: String, hint: String },

    // ── Operator errors ───────────────────────────────────────────────────
    /// The operator declined the confirmation gate before page `page`.
    ///
    /// The gate exists to bound API spend on bad scans, so a refusal aborts
    /// the entire session rather than skipping the page.
    #[error("Run aborted by operator before extracting page {page}")]
    Aborted { page: usize },

    // ── I/O errors ────────────────────────────────────────────────────────
    /// Could not create or write the output CSV file.
    #[error("Failed to write output file '{path}': {detail}")]
    OutputWriteFailed { path: PathBuf, detail: String },

    // ── Config errors ─────────────────────────────────────────────────────
    /// Builder validation failed.
    #[error("Invalid configuration: {0}")]
    InvalidConfig(String),

    // ── Pdfium binding errors ─────────────────────────────────────────────
    /// Could not bind to a pdfium library.
    #[error(
        "Failed to bind to pdfium library: {0}\n\n\
Install libpdfium and/or set PDFIUM_LIB_PATH to its directory.\n"
    )]
    PdfiumBindingFailed(String),

    // ── Catch-all ─────────────────────────────────────────────────────────
    /// Unexpected internal error.
    #[error("Internal error: {0}")]
    Internal(String),
}

/// A non-fatal error for a single sheet page.
///
/// Stored inside [`crate::record::PageOutcome`] when a page fails. The page
/// contributes zero readings and the run continues with the next page.
#[derive(Debug, Clone, Error, serde::Serialize, serde::Deserialize)]
pub enum PageError {
    /// The enhanced page image could not be encoded or persisted.
    #[error("Page {page}: image enhancement failed: {detail}")]
    EnhanceFailed { page: usize, detail: String },

    /// The VLM call failed or its response could not be parsed as rows.
    #[error("Page {page}: extraction failed: {detail}")]
    ExtractFailed { page: usize, detail: String },
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn aborted_display_names_page() {
        let e = MeterSheetError::Aborted { page: 3 };
        assert!(e.to_string().contains("page 3"), "got: {e}");
    }

    #[test]
    fn provider_not_configured_display() {
        let e = MeterSheetError::ProviderNotConfigured {
            provider: "openai".into(),
            hint: "set OPENAI_API_KEY".into(),
        };
        let msg = e.to_string();
        assert!(msg.contains("openai"));
        assert!(msg.contains("OPENAI_API_KEY"));
    }

    #[test]
    fn page_error_display() {
        let e = PageError::ExtractFailed {
            page: 2,
            detail: "response was not a JSON array".into(),
        };
        assert!(e.to_string().contains("Page 2"));
        assert!(e.to_string().contains("JSON array"));
    }

    #[test]
    fn out_of_range_display() {
        let e = MeterSheetError::PageOutOfRange { page: 9, total: 4 };
        assert!(e.to_string().contains('9'));
        assert!(e.to_string().contains('4'));
    }
}
