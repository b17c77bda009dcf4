//! Error types for the docnorm library.
//!
//! Two distinct error types reflect two distinct failure modes:
//!
//! * [`DocnormError`] — **Fatal for one input**: the file cannot be
//!   normalized at all (no route for its extension, a refused office lock
//!   file, an image that does not decode, a missing optional capability).
//!   Returned as `Err(DocnormError)` from [`crate::engine::Engine::process`].
//!
//! * [`DescribeError`] — **Non-fatal**: a single vision call failed or timed
//!   out. Call sites translate it into a placeholder string so the rest of
//!   the document still completes; it never crosses the `process` boundary.
//!
//! Page-level and archive-member-level failures are not error types at all:
//! they are logged with their index and swallowed, because one bad page or
//! member must not lose the document.

use std::path::PathBuf;
use thiserror::Error;

/// All fatal errors returned when normalizing a single input file.
///
/// None of these abort processing of *other* independently submitted files.
#[derive(Debug, Error)]
pub enum DocnormError {
    // ── Routing errors ────────────────────────────────────────────────────
    /// No extractor is registered for this extension.
    #[error("Unsupported file format: '{extension}'")]
    UnsupportedFormat { extension: String },

    /// The filename matches an office lock/owner artifact (`~$…`, `.~lock.…#`).
    ///
    /// Refused before any extraction work; these files are application
    /// bookkeeping, not documents.
    #[error("Temporary file detected ('{name}'). Skipping processing.")]
    TemporaryArtifact { name: String },

    /// Input file was not found at the given path.
    #[error("File not found: '{path}'\nCheck the path exists and is readable.")]
    FileNotFound { path: PathBuf },

    /// Process does not have read permission on the file.
    #[error("Permission denied reading '{path}'")]
    PermissionDenied { path: PathBuf },

    // ── Capability errors ─────────────────────────────────────────────────
    /// An optional dependency is missing from the runtime environment.
    ///
    /// Fatal for this input only; the gap is surfaced loudly rather than
    /// producing a silently empty result.
    #[error("Capability '{capability}' is unavailable.\n{hint}")]
    CapabilityUnavailable { capability: String, hint: String },

    // ── Office conversion errors ──────────────────────────────────────────
    /// LibreOffice ran but did not produce a usable PDF.
    #[error("Office-to-PDF conversion failed for '{path}': {detail}")]
    Conversion { path: PathBuf, detail: String },

    /// The converter exceeded its allotted time.
    #[error("Office-to-PDF conversion timed out after {secs}s for '{path}'")]
    ConversionTimeout { path: PathBuf, secs: u64 },

    // ── Extraction errors ─────────────────────────────────────────────────
    /// The image file could not be decoded at all.
    ///
    /// The one whole-unit image failure: with no pixels there is nothing
    /// else to extract.
    #[error("Cannot open image '{path}': {detail}")]
    UnreadableImage { path: PathBuf, detail: String },

    /// A whole-file read/decode failure (spreadsheet container, text
    /// decoding, zip open, missing iWork preview, …). Not retried.
    #[error("Extraction failed for '{path}': {detail}")]
    Extraction { path: PathBuf, detail: String },

    /// The archive exceeds the total byte-size ceiling and is rejected
    /// outright, before any member is opened.
    #[error("Archive '{path}' is {size} bytes, over the {limit}-byte limit; refusing to open it")]
    ArchiveTooLarge { path: PathBuf, size: u64, limit: u64 },

    /// The PDF container itself could not be opened or parsed.
    #[error("PDF '{path}' could not be opened: {detail}")]
    CorruptPdf { path: PathBuf, detail: String },

    // ── I/O errors ────────────────────────────────────────────────────────
    /// Could not persist an output artifact (image file, working dir).
    #[error("Failed to write '{path}': {source}")]
    OutputWriteFailed {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },

    // ── Config errors ─────────────────────────────────────────────────────
    /// Builder validation failed.
    #[error("Invalid configuration: {0}")]
    InvalidConfig(String),

    // ── Pdfium binding errors ─────────────────────────────────────────────
    /// Could not bind to a pdfium library.
    #[error(
        "Failed to bind to pdfium library: {0}\n\
         Set PDFIUM_LIB_PATH=/path/to/libpdfium or install pdfium system-wide."
    )]
    PdfiumBindingFailed(String),

    // ── Catch-all ─────────────────────────────────────────────────────────
    /// Unexpected internal error.
    #[error("Internal error: {0}")]
    Internal(String),
}

/// A non-fatal failure of a single description call.
///
/// The caller substitutes a placeholder string and keeps going; only the
/// one call is lost.
#[derive(Debug, Clone, Error)]
pub enum DescribeError {
    /// The vision call did not return within the configured timeout.
    #[error("description call timed out after {secs}s")]
    Timeout { secs: u64 },

    /// The provider returned an error after all retries.
    #[error("description service failed after {retries} retries: {detail}")]
    Service { retries: u32, detail: String },
}
