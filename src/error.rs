//! Error types for the tessflow library.
//!
//! Two distinct error types reflect two distinct failure modes:
//!
//! * [`TessflowError`] is **fatal**: the caller cannot proceed at all
//!   (input file missing, configuration invalid, language tables unreadable).
//!   Returned as `Err(TessflowError)` from constructors and input resolution.
//!
//! * [`TraversalError`] is **per document**: one document failed somewhere in
//!   its traversal. It is recorded in the document's
//!   [`crate::processor::TraversalReport`] and the document is routed to the
//!   failure channel. Other documents in the same batch are unaffected.
//!
//! [`RoutingError`] is raised by a transport when a commit or discard fails.
//! It is logged and recorded, never propagated past the router.

use crate::language::ResolutionError;
use serde::{Deserialize, Serialize};
use std::path::PathBuf;
use thiserror::Error;
use uuid::Uuid;

/// All fatal errors returned by the tessflow library.
#[derive(Debug, Error)]
pub enum TessflowError {
    // ── Input errors ──────────────────────────────────────────────────────
    /// Input file was not found at the given path.
    #[error("Input file not found: '{path}'\nCheck the path exists and is readable.")]
    FileNotFound { path: PathBuf },

    /// Process does not have read permission on the file.
    #[error("Permission denied reading '{path}'\nTry: chmod +r {path:?}")]
    PermissionDenied { path: PathBuf },

    /// The input string is not a valid file path or URL.
    #[error("Invalid input '{input}': not a file path or a valid HTTP/HTTPS URL")]
    InvalidInput { input: String },

    /// HTTP URL was syntactically valid but download failed.
    #[error("Failed to download '{url}': {reason}\nCheck your internet connection.")]
    DownloadFailed { url: String, reason: String },

    /// Download exceeded the configured timeout.
    #[error("Download timed out after {secs}s for '{url}'\nIncrease --download-timeout.")]
    DownloadTimeout { url: String, secs: u64 },

    // ── Config errors ─────────────────────────────────────────────────────
    /// Builder or processor validation failed.
    #[error("Invalid configuration: {0}")]
    InvalidConfig(String),

    /// A properties source named an option this crate does not know.
    #[error("Unknown configuration option '{key}'")]
    UnknownOption { key: String },

    /// A configuration or language-table file could not be read.
    #[error("Failed to read '{path}': {source}")]
    ResourceRead {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },

    // ── I/O errors ────────────────────────────────────────────────────────
    /// Could not create or write an output file.
    #[error("Failed to write output file '{path}': {source}")]
    OutputWriteFailed {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },

    // ── Catch-all ─────────────────────────────────────────────────────────
    /// Unexpected internal error.
    #[error("Internal error: {0}")]
    Internal(String),
}

/// A failure confined to one document traversal.
///
/// Only [`TraversalError::Classification`] is non-fatal: processors log it and
/// continue with a best-effort default. Every other variant moves the
/// document to the failure channel and triggers rollback.
#[derive(Debug, Clone, PartialEq, Error, Serialize, Deserialize)]
pub enum TraversalError {
    /// No content signature matched.
    #[error("content type could not be determined: {0}")]
    Classification(String),

    /// No strategy produced an allowed language.
    #[error("language resolution failed: {0}")]
    Resolution(#[from] ResolutionError),

    /// The rasterisation engine rejected the document or a page.
    #[error("rasterisation failed: {0}")]
    Rasterization(String),

    /// The PDF reported zero pages.
    #[error("empty or unreadable document: page count = 0")]
    EmptyDocument,

    /// The OCR engine failed or the raster could not be decoded.
    #[error("recognition failed: {0}")]
    Recognition(String),

    /// A derived artifact could not be built.
    #[error("packaging failed: {0}")]
    Packaging(String),

    /// Page splitting failed part-way.
    #[error("split failed: {0}")]
    Split(String),

    /// The transport refused a commit.
    #[error("routing failed: {0}")]
    Routing(String),

    /// A blocking stage exceeded the configured bound.
    #[error("stage '{stage}' timed out after {secs}s")]
    Timeout { stage: String, secs: u64 },

    /// Unexpected internal error (task panic, closed channel).
    #[error("internal error: {0}")]
    Internal(String),
}

impl TraversalError {
    /// Whether this error sends the document to the failure channel.
    pub fn is_fatal(&self) -> bool {
        !matches!(self, TraversalError::Classification(_))
    }
}

/// A transport failed to commit or discard a document.
#[derive(Debug, Clone, Error)]
#[error("routing document {document} to '{channel}' failed: {reason}")]
pub struct RoutingError {
    pub channel: String,
    pub document: Uuid,
    pub reason: String,
}

impl From<RoutingError> for TraversalError {
    fn from(e: RoutingError) -> Self {
        TraversalError::Routing(e.to_string())
    }
}
