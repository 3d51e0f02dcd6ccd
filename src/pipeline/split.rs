//! Page splitting: one standalone single-page PDF per source page.

use crate::error::TraversalError;
use lopdf::Document as PdfDocument;
use tracing::{debug, info};

/// One extracted page.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct PageBytes {
    /// 1-based page index.
    pub index: usize,
    pub total: usize,
    pub bytes: Vec<u8>,
}

/// PDF bytes → pages, emitted in page order.
///
/// Pages are pushed to `emit` as they are produced so the caller can create an
/// artifact per page without holding the whole split in memory. An error from
/// `emit` stops the split and is returned unchanged.
pub trait PageSplitter: Send + Sync {
    fn split(
        &self,
        pdf: &[u8],
        emit: &mut dyn FnMut(PageBytes) -> Result<(), TraversalError>,
    ) -> Result<usize, TraversalError>;
}

/// Splitter backed by `lopdf`.
#[derive(Debug, Default, Clone, Copy)]
pub struct LopdfSplitter;

impl PageSplitter for LopdfSplitter {
    fn split(
        &self,
        pdf: &[u8],
        emit: &mut dyn FnMut(PageBytes) -> Result<(), TraversalError>,
    ) -> Result<usize, TraversalError> {
        let source = PdfDocument::load_mem(pdf)
            .map_err(|e| TraversalError::Split(format!("failed to load PDF: {e}")))?;

        let mut numbers: Vec<u32> = source.get_pages().keys().copied().collect();
        numbers.sort_unstable();
        let total = numbers.len();
        if total == 0 {
            return Err(TraversalError::EmptyDocument);
        }
        info!("Splitting PDF: {} pages", total);

        for (i, &keep) in numbers.iter().enumerate() {
            let mut page_doc = source.clone();
            let others: Vec<u32> = numbers.iter().copied().filter(|&n| n != keep).collect();
            page_doc.delete_pages(&others);
            page_doc.prune_objects();

            let mut bytes = Vec::new();
            page_doc.save_to(&mut bytes).map_err(|e| {
                TraversalError::Split(format!("failed to write page {}: {e}", i + 1))
            })?;
            debug!("Extracted page {}/{} ({} bytes)", i + 1, total, bytes.len());

            emit(PageBytes {
                index: i + 1,
                total,
                bytes,
            })?;
        }
        Ok(total)
    }
}
