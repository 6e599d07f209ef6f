//! Error types for the edgequake-doctrans library.
//!
//! Two distinct error types reflect two distinct failure modes:
//!
//! * [`TranslateError`] — **Fatal**: the job cannot proceed at all (missing
//!   input, unsupported extension, provider not configured, or a model call
//!   that exhausted its retry budget). Returned as `Err(TranslateError)` from
//!   the top-level `translate_*` functions.
//!
//! * [`ModelError`] — **Per attempt**: a single model call failed. The retry
//!   policy in [`crate::retry`] absorbs these and only surfaces a
//!   [`TranslateError::RetriesExhausted`] once every attempt has failed.
//!
//! Malformed model output is *not* an error: batch and vision replies are
//! parsed into tagged values with an explicit fallback variant, so a bad JSON
//! payload degrades the result instead of aborting the document.

use std::path::PathBuf;
use thiserror::Error;

/// All fatal errors returned by the edgequake-doctrans library.
#[derive(Debug, Error)]
pub enum TranslateError {
    // ── Input errors ──────────────────────────────────────────────────────
    /// Input file was not found at the given path.
    #[error("Input file not found: '{path}'\nCheck the path exists and is readable.")]
    FileNotFound { path: PathBuf },

    /// Process does not have read permission on the file.
    #[error("Permission denied reading '{path}'\nTry: chmod +r {path:?}")]
    PermissionDenied { path: PathBuf },

    /// The file extension does not belong to any supported family.
    #[error("Unsupported format '{extension}' for '{path}'\nSupported: xlsx, xls, xlsm, docx, doc, pdf, png, jpg, jpeg, gif, bmp, tiff, webp")]
    UnsupportedFormat { path: PathBuf, extension: String },

    /// HTTP URL was syntactically valid but download failed.
    #[error("Failed to download '{url}': {reason}\nCheck your internet connection.")]
    DownloadFailed { url: String, reason: String },

    /// Download exceeded the configured timeout.
    #[error("Download timed out after {secs}s for '{url}'")]
    DownloadTimeout { url: String, secs: u64 },

    /// The file has a supported extension but its content cannot be read
    /// (legacy binary format, missing container part, corrupt package).
    #[error("Cannot read '{path}': {detail}")]
    InvalidDocument { path: PathBuf, detail: String },

    // ── PDF / image errors ────────────────────────────────────────────────
    /// PDF header/trailer/xref is corrupt and cannot be parsed.
    #[error("PDF '{path}' is corrupt: {detail}")]
    CorruptPdf { path: PathBuf, detail: String },

    /// pdfium-render returned an error for a specific page.
    #[error("Rasterisation failed for page {page}: {detail}")]
    RasterisationFailed { page: usize, detail: String },

    /// Could not bind to a pdfium library.
    #[error(
        "Failed to bind to pdfium library: {0}\n\
Set PDFIUM_LIB_PATH=/path/to/libpdfium or install pdfium system-wide."
    )]
    PdfiumBindingFailed(String),

    /// The input image could not be decoded or re-encoded as PNG.
    #[error("Image '{path}' could not be decoded: {detail}")]
    ImageDecode { path: PathBuf, detail: String },

    // ── LLM errors ────────────────────────────────────────────────────────
    /// The configured provider is not initialised (missing API key etc.).
    #[error("LLM provider '{provider}' is not configured.\n{hint}")]
    ProviderNotConfigured { provider: String, hint: String },

    /// A model call failed on every attempt of its retry budget.
    #[error("{call_site}: model call failed after {attempts} attempts: {last_error}")]
    RetriesExhausted {
        call_site: String,
        attempts: u32,
        last_error: String,
    },

    // ── Container errors ──────────────────────────────────────────────────
    /// The zip container could not be read or written.
    #[error("Archive error in '{path}': {detail}")]
    Archive { path: PathBuf, detail: String },

    /// An XML part inside a container could not be parsed.
    #[error("XML error in part '{part}': {detail}")]
    Xml { part: String, detail: String },

    // ── I/O errors ────────────────────────────────────────────────────────
    /// Could not create or write the output file.
    #[error("Failed to write output file '{path}': {source}")]
    OutputWriteFailed {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },

    /// Generic I/O failure while reading input or staging a container rebuild.
    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),

    // ── Config errors ─────────────────────────────────────────────────────
    /// Builder validation failed.
    #[error("Invalid configuration: {0}")]
    InvalidConfig(String),

    // ── Catch-all ─────────────────────────────────────────────────────────
    /// Unexpected internal error.
    #[error("Internal error: {0}")]
    Internal(String),
}

impl TranslateError {
    pub(crate) fn archive(path: impl Into<PathBuf>, detail: impl ToString) -> Self {
        TranslateError::Archive {
            path: path.into(),
            detail: detail.to_string(),
        }
    }

    pub(crate) fn xml(part: impl Into<String>, detail: impl ToString) -> Self {
        TranslateError::Xml {
            part: part.into(),
            detail: detail.to_string(),
        }
    }
}

/// A single failed model call. Retried by [`crate::retry::RetryPolicy`].
#[derive(Debug, Clone, Error)]
pub enum ModelError {
    /// The provider returned an error (network, HTTP status, quota).
    #[error("provider error: {0}")]
    Provider(String),

    /// The provider answered but the completion carried no text.
    #[error("empty completion")]
    EmptyResponse,
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn unsupported_format_display() {
        let e = TranslateError::UnsupportedFormat {
            path: PathBuf::from("notes.odt"),
            extension: ".odt".into(),
        };
        let msg = e.to_string();
        assert!(msg.contains(".odt"), "got: {msg}");
        assert!(msg.contains("notes.odt"), "got: {msg}");
    }

    #[test]
    fn retries_exhausted_display() {
        let e = TranslateError::RetriesExhausted {
            call_site: "translate_single".into(),
            attempts: 3,
            last_error: "HTTP 503".into(),
        };
        let msg = e.to_string();
        assert!(msg.contains("3 attempts"), "got: {msg}");
        assert!(msg.contains("HTTP 503"), "got: {msg}");
    }

    #[test]
    fn file_not_found_display() {
        let e = TranslateError::FileNotFound {
            path: PathBuf::from("/tmp/missing.xlsx"),
        };
        assert!(e.to_string().contains("missing.xlsx"));
    }

    #[test]
    fn model_error_display() {
        assert_eq!(ModelError::EmptyResponse.to_string(), "empty completion");
        assert!(ModelError::Provider("429".into()).to_string().contains("429"));
    }
}
