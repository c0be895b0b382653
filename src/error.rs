//! Error types for the sheet-relink library.
//!
//! Two distinct error types reflect two distinct failure modes:
//!
//! * [`RelinkError`]: **Fatal**: the run cannot proceed at all (input sheet
//!   missing, no image column, no API key). Returned as `Err(RelinkError)`
//!   from the top-level `convert*` functions.
//!
//! * [`ItemError`]: **Non-fatal**: a single row failed (dead link, not an
//!   image, upload rejected) but every other row is fine. Stored inside
//!   [`crate::output::Outcome`] so the batch always completes with one
//!   result per row.
//!
//! The legacy string tokens (`Err: …`, `Format Image Invalide`, …) are only
//! produced at the presentation boundary through [`ItemError::token`].

use serde::{Deserialize, Serialize};
use std::path::PathBuf;
use thiserror::Error;

/// Token written for a row whose unit-of-work panicked.
pub const FATAL_TOKEN: &str = "Erreur Fatal";

/// Token written for a row whose content is not a decodable image.
pub const INVALID_FORMAT_TOKEN: &str = "Format Image Invalide";

/// Token written for any other unexpected failure.
pub const GENERIC_TOKEN: &str = "Erreur";

/// All fatal errors returned by the sheet-relink library.
///
/// Row-level failures use [`ItemError`] and are stored in
/// [`crate::output::Outcome`] rather than propagated here.
#[derive(Debug, Error)]
pub enum RelinkError {
    // ── Input errors ──────────────────────────────────────────────────────
    /// Input sheet was not found at the given path.
    #[error("Spreadsheet not found: '{path}'\nCheck the path exists and is readable.")]
    FileNotFound { path: PathBuf },

    /// Process does not have read permission on the file.
    #[error("Permission denied reading '{path}'\nTry: chmod +r {path:?}")]
    PermissionDenied { path: PathBuf },

    /// The CSV or workbook parser rejected the input.
    #[error("Failed to read spreadsheet '{path}': {detail}")]
    SheetRead { path: PathBuf, detail: String },

    /// The file extension names a sheet format that cannot be read.
    #[error("Unsupported spreadsheet format '{path}'\nExpected a .csv or .xlsx file.")]
    UnsupportedFormat { path: PathBuf },

    /// The sheet has no header row.
    #[error("Spreadsheet '{path}' is empty (no header row)")]
    EmptySheet { path: PathBuf },

    /// No column could be identified as holding image URLs.
    #[error("Image column {wanted} not found.\nAvailable columns: {}\nUse --column to pick one.", .available.join(", "))]
    ColumnNotFound {
        wanted: String,
        available: Vec<String>,
    },

    // ── Upload sink errors ────────────────────────────────────────────────
    /// Uploading requires a credential and none was supplied.
    #[error("No image-hosting API key configured.\nSet IMGBB_API_KEY or pass --api-key <KEY>.")]
    MissingApiKey,

    /// The shared HTTP client could not be constructed.
    #[error("Failed to build HTTP client: {0}")]
    HttpClient(String),

    /// Some rows succeeded but at least one failed.
    ///
    /// Returned by [`crate::output::BatchResult::into_result`] when the
    /// caller wants to treat any row failure as an error.
    #[error("{failed}/{total} rows failed during conversion")]
    PartialFailure {
        success: usize,
        failed: usize,
        total: usize,
    },

    // ── I/O errors ────────────────────────────────────────────────────────
    /// Could not create or write the output spreadsheet.
    #[error("Failed to write output file '{path}': {source}")]
    OutputWriteFailed {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },

    // ── Config errors ─────────────────────────────────────────────────────
    /// Builder validation failed.
    #[error("Invalid configuration: {0}")]
    InvalidConfig(String),

    // ── Catch-all ─────────────────────────────────────────────────────────
    /// Unexpected internal error.
    #[error("Internal error: {0}")]
    Internal(String),
}

/// Coarse classification of a row failure.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum ErrorKind {
    /// Unreachable host, timeout, or non-2xx status while fetching.
    NetworkFailure,
    /// The fetched body is not a valid image.
    DecodeFailure,
    /// The hosting API rejected the upload or answered garbage.
    UploadFailure,
    /// Anything else, including a panicking unit-of-work.
    UnexpectedFailure,
}

/// A non-fatal error for a single row.
///
/// Stored inside [`crate::output::Outcome`] when a row fails.
/// The batch always continues.
#[derive(Debug, Clone, PartialEq, Eq, Error, Serialize, Deserialize)]
pub enum ItemError {
    /// Transport-level failure while fetching the source image.
    #[error("fetch failed: {detail}")]
    Network { detail: String },

    /// The source URL answered with a non-2xx status.
    #[error("fetch failed: HTTP {status}")]
    HttpStatus { status: u16 },

    /// The fetched body could not be decoded as an image.
    #[error("invalid image format: {detail}")]
    Decode { detail: String },

    /// Re-encoding the decoded image to PNG failed.
    #[error("PNG encoding failed: {detail}")]
    Encode { detail: String },

    /// The hosting API rejected the upload.
    #[error("upload failed{}: {message}", .status.map(|s| format!(" (HTTP {s})")).unwrap_or_default())]
    Upload {
        status: Option<u16>,
        message: String,
    },

    /// Any other failure inside the unit-of-work.
    #[error("unexpected error: {detail}")]
    Unexpected { detail: String },

    /// The unit-of-work panicked; caught at the dispatch boundary.
    #[error("worker panicked")]
    Panicked,
}

impl ItemError {
    /// Classify this failure.
    pub fn kind(&self) -> ErrorKind {
        match self {
            ItemError::Network { .. } | ItemError::HttpStatus { .. } => ErrorKind::NetworkFailure,
            ItemError::Decode { .. } => ErrorKind::DecodeFailure,
            ItemError::Upload { .. } => ErrorKind::UploadFailure,
            ItemError::Encode { .. } | ItemError::Unexpected { .. } | ItemError::Panicked => {
                ErrorKind::UnexpectedFailure
            }
        }
    }

    /// Render the legacy cell token written into the output sheet.
    pub fn token(&self) -> String {
        match self {
            ItemError::Network { detail } => format!("Err: {detail}"),
            ItemError::HttpStatus { status } => format!("Err: HTTP {status}"),
            ItemError::Decode { .. } => INVALID_FORMAT_TOKEN.to_string(),
            ItemError::Upload { message, .. } => format!("Err API: {message}"),
            ItemError::Encode { .. } | ItemError::Unexpected { .. } => GENERIC_TOKEN.to_string(),
            ItemError::Panicked => FATAL_TOKEN.to_string(),
        }
    }
}

/// Render `e` followed by every error in its `source()` chain.
///
/// HTTP client errors only name the outermost layer in `Display`
/// ("error sending request"); the actionable cause sits at the bottom.
pub fn error_chain(e: &(dyn std::error::Error + 'static)) -> String {
    let mut msg = e.to_string();
    let mut source = e.source();
    while let Some(inner) = source {
        let text = inner.to_string();
        if !msg.contains(&text) {
            msg = format!("{msg}: {text}");
        }
        source = inner.source();
    }
    msg
}

/// Truncate `msg` to at most `limit` characters, marking the cut with `…`.
///
/// Cuts on a char boundary so multi-byte upstream messages never panic.
pub fn truncate_message(msg: &str, limit: usize) -> String {
    let msg = msg.trim();
    if msg.chars().count() <= limit {
        return msg.to_string();
    }
    let keep = limit.saturating_sub(1);
    let mut out: String = msg.chars().take(keep).collect();
    out.push('\u{2026}');
    out
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn partial_failure_display() {
        let e = RelinkError::PartialFailure {
            success: 9,
            failed: 1,
            total: 10,
        };
        let msg = e.to_string();
        assert!(msg.contains("1/10"), "got: {msg}");
    }

    #[test]
    fn column_not_found_lists_available() {
        let e = RelinkError::ColumnNotFound {
            wanted: "'image'".into(),
            available: vec!["sku".into(), "name".into()],
        };
        let msg = e.to_string();
        assert!(msg.contains("sku, name"), "got: {msg}");
    }

    #[test]
    fn tokens_follow_failure_table() {
        assert_eq!(
            ItemError::Network { detail: "connection refused".into() }.token(),
            "Err: connection refused"
        );
        assert_eq!(ItemError::HttpStatus { status: 404 }.token(), "Err: HTTP 404");
        assert_eq!(
            ItemError::Decode { detail: "bad magic".into() }.token(),
            "Format Image Invalide"
        );
        assert_eq!(
            ItemError::Upload { status: Some(400), message: "Invalid API v1 key.".into() }.token(),
            "Err API: Invalid API v1 key."
        );
        assert_eq!(ItemError::Unexpected { detail: "x".into() }.token(), "Erreur");
        assert_eq!(ItemError::Panicked.token(), "Erreur Fatal");
    }

    #[test]
    fn kinds() {
        assert_eq!(ItemError::HttpStatus { status: 500 }.kind(), ErrorKind::NetworkFailure);
        assert_eq!(ItemError::Encode { detail: "".into() }.kind(), ErrorKind::UnexpectedFailure);
        assert_eq!(ItemError::Panicked.kind(), ErrorKind::UnexpectedFailure);
    }

    #[test]
    fn upload_display_with_and_without_status() {
        let with = ItemError::Upload { status: Some(403), message: "nope".into() };
        assert_eq!(with.to_string(), "upload failed (HTTP 403): nope");
        let without = ItemError::Upload { status: None, message: "reset".into() };
        assert_eq!(without.to_string(), "upload failed: reset");
    }

    #[derive(Debug, Error)]
    #[error("error sending request")]
    struct Outer(#[source] std::io::Error);

    #[test]
    fn error_chain_reaches_root_cause() {
        let e = Outer(std::io::Error::new(
            std::io::ErrorKind::ConnectionRefused,
            "Connection refused (os error 111)",
        ));
        assert_eq!(
            error_chain(&e),
            "error sending request: Connection refused (os error 111)"
        );
    }

    #[test]
    fn error_chain_without_source_is_display() {
        let e = std::io::Error::other("boom");
        assert_eq!(error_chain(&e), "boom");
    }

    #[test]
    fn truncate_short_message_untouched() {
        assert_eq!(truncate_message("  short  ", 10), "short");
    }

    #[test]
    fn truncate_long_message_on_char_boundary() {
        let out = truncate_message("ééééééééééé", 5);
        assert_eq!(out.chars().count(), 5);
        assert!(out.ends_with('\u{2026}'));
    }
}
