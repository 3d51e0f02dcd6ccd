//! Concurrent batch runner.
//!
//! Each document gets its own session and traversal; traversals share only
//! the processor, whose engines and language tables are read-only.

use crate::document::Document;
use crate::error::TessflowError;
use crate::processor::{Processor, TraversalReport};
use crate::progress::ProgressCallback;
use crate::session::Session;
use futures::stream::{self, StreamExt};
use serde::{Deserialize, Serialize};
use std::sync::Arc;
use tracing::info;

/// Run `processor` over `documents`, at most `concurrency` at a time.
///
/// Returns one `(report, session)` pair per document, in input order.
pub async fn run_batch<S, F>(
    processor: Arc<dyn Processor>,
    documents: Vec<Document>,
    concurrency: usize,
    make_session: F,
    progress: Option<ProgressCallback>,
) -> Vec<(TraversalReport, S)>
where
    S: Session + 'static,
    F: Fn() -> S,
{
    let total = documents.len();
    if let Some(ref cb) = progress {
        cb.on_batch_start(processor.name(), total);
    }

    let mut results: Vec<(usize, TraversalReport, S)> =
        stream::iter(documents.into_iter().enumerate().map(|(index, doc)| {
            let processor = Arc::clone(&processor);
            let progress = progress.clone();
            let mut session = make_session();
            async move {
                if let Some(ref cb) = progress {
                    cb.on_document_start(index, doc.filename());
                }
                let report = processor.process(&mut session, doc).await;
                if let Some(ref cb) = progress {
                    if report.is_routed() {
                        cb.on_document_routed(index, &report);
                    } else {
                        cb.on_document_failed(index, &report);
                    }
                }
                (index, report, session)
            }
        }))
        .buffer_unordered(concurrency.max(1))
        .collect()
        .await;

    results.sort_by_key(|(index, _, _)| *index);

    let stats = BatchStats::from_reports(results.iter().map(|(_, r, _)| r));
    info!(
        "[{}] batch done: {} routed, {} failed, {} artifact(s) committed",
        processor.name(),
        stats.routed,
        stats.failed,
        stats.artifacts_committed
    );
    if let Some(ref cb) = progress {
        cb.on_batch_complete(total, stats.routed);
    }

    results
        .into_iter()
        .map(|(_, report, session)| (report, session))
        .collect()
}

/// Synchronous wrapper around [`run_batch`].
///
/// Creates a temporary tokio runtime internally.
pub fn run_batch_sync<S, F>(
    processor: Arc<dyn Processor>,
    documents: Vec<Document>,
    concurrency: usize,
    make_session: F,
    progress: Option<ProgressCallback>,
) -> Result<Vec<(TraversalReport, S)>, TessflowError>
where
    S: Session + 'static,
    F: Fn() -> S,
{
    Ok(tokio::runtime::Runtime::new()
        .map_err(|e| TessflowError::Internal(format!("Failed to create tokio runtime: {}", e)))?
        .block_on(run_batch(
            processor,
            documents,
            concurrency,
            make_session,
            progress,
        )))
}

/// Totals over a batch of reports.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct BatchStats {
    pub total: usize,
    pub routed: usize,
    pub failed: usize,
    pub artifacts_committed: usize,
    pub artifacts_discarded: usize,
}

impl BatchStats {
    pub fn from_reports<'a>(reports: impl IntoIterator<Item = &'a TraversalReport>) -> Self {
        reports.into_iter().fold(Self::default(), |mut s, r| {
            s.total += 1;
            if r.is_routed() {
                s.routed += 1;
            } else {
                s.failed += 1;
            }
            s.artifacts_committed += r.ledger.committed.len();
            s.artifacts_discarded += r.ledger.discarded.len();
            s
        })
    }

    pub fn all_routed(&self) -> bool {
        self.failed == 0
    }
}
