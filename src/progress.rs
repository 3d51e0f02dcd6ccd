//! Progress-callback trait for per-document batch events.
//!
//! Pass an [`Arc<dyn BatchProgressCallback>`] to [`crate::batch::run_batch`]
//! to receive events as each document is routed. Callers can forward them to
//! a terminal progress bar, a channel or a log without the library knowing
//! how the host application communicates.
//!
//! # Example
//!
//! ```rust
//! use tessflow::progress::BatchProgressCallback;
//! use tessflow::processor::TraversalReport;
//! use std::sync::atomic::{AtomicUsize, Ordering};
//!
//! struct FailureCounter(AtomicUsize);
//!
//! impl BatchProgressCallback for FailureCounter {
//!     fn on_document_failed(&self, _index: usize, report: &TraversalReport) {
//!         self.0.fetch_add(1, Ordering::SeqCst);
//!         eprintln!("{} failed", report.filename);
//!     }
//! }
//! ```

use crate::processor::TraversalReport;
use std::sync::Arc;

/// Called by the batch runner as it processes each document.
///
/// All methods have default no-op implementations so callers only override
/// what they care about.
///
/// # Thread safety
///
/// Documents run concurrently, so `on_document_start`, `on_document_routed`
/// and `on_document_failed` may be called from different threads at once.
/// Protect shared mutable state with `Mutex` or atomics.
pub trait BatchProgressCallback: Send + Sync {
    /// Called once before any document is processed.
    fn on_batch_start(&self, processor: &str, total_documents: usize) {
        let _ = (processor, total_documents);
    }

    /// Called when a traversal begins. `index` is 0-based in input order.
    fn on_document_start(&self, index: usize, filename: &str) {
        let _ = (index, filename);
    }

    /// Called when a document and all its artifacts were routed.
    fn on_document_routed(&self, index: usize, report: &TraversalReport) {
        let _ = (index, report);
    }

    /// Called when a document ended on the failure path.
    fn on_document_failed(&self, index: usize, report: &TraversalReport) {
        let _ = (index, report);
    }

    /// Called once after every document has been attempted.
    fn on_batch_complete(&self, total_documents: usize, routed: usize) {
        let _ = (total_documents, routed);
    }
}

/// A no-op implementation for callers that don't need progress events.
pub struct NoopProgressCallback;

impl BatchProgressCallback for NoopProgressCallback {}

pub type ProgressCallback = Arc<dyn BatchProgressCallback>;
