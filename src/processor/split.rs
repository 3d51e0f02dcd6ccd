//! Page-split pipeline: one single-page PDF artifact per source page.
//!
//! The splitter runs on the blocking pool and streams pages back over a
//! bounded channel, so at most [`PAGE_BUFFER`] pages are in flight between
//! the splitter and artifact creation.

use super::{classify, AtStage, Engines, Processor, Stage, StageFailure, Traversal, TraversalReport};
use crate::config::PipelineConfig;
use crate::document::{attrs, file_infos, page_index, Channel, Document};
use crate::error::{TessflowError, TraversalError};
use crate::pipeline::PageBytes;
use crate::router::ArtifactRouter;
use crate::session::Session;
use async_trait::async_trait;
use std::sync::Arc;
use tokio::sync::mpsc;
use tracing::{debug, info};

pub const PAGE_BUFFER: usize = 4;

/// Split a PDF into pages. Pages go to `files`, the source to `original`.
#[derive(Debug)]
pub struct SplitProcessor {
    config: Arc<PipelineConfig>,
    engines: Engines,
}

impl SplitProcessor {
    pub fn new(config: Arc<PipelineConfig>, engines: Engines) -> Self {
        Self { config, engines }
    }

    pub fn from_config(config: PipelineConfig) -> Result<Self, TessflowError> {
        let engines = Engines::system(&config);
        Ok(Self::new(Arc::new(config), engines))
    }

    async fn run(
        &self,
        router: &mut ArtifactRouter<'_>,
        trav: &mut Traversal,
        doc: &mut Document,
    ) -> Result<(), StageFailure> {
        // An unknown type still gets a split attempt; a known non-PDF does not.
        if let Some(ct) = classify(self.engines.classifier.as_ref(), doc) {
            if !ct.is_pdf() {
                return Err(TraversalError::Split(format!(
                    "expected a PDF, got {}",
                    ct.mime
                )))
                .at(Stage::Classified);
            }
        }
        trav.advance(Stage::Classified);

        let (tx, mut rx) = mpsc::channel::<PageBytes>(PAGE_BUFFER);
        let splitter = self.engines.splitter.clone();
        let pdf = doc.content().to_vec();
        let task = tokio::task::spawn_blocking(move || {
            splitter.split(&pdf, &mut |page| {
                tx.blocking_send(page)
                    .map_err(|_| TraversalError::Internal("page receiver dropped".into()))
            })
        });

        let source: &Document = doc;
        let collect = async {
            let mut emitted = 0usize;
            while let Some(page) = rx.recv().await {
                let artifact = router.derive(source);
                artifact.put_attribute(attrs::FILENAME, page_filename(source, page.index));
                artifact.put_attribute(attrs::MIME_TYPE, "application/pdf");
                artifact.put_attributes([
                    (attrs::SPLIT_SOURCE_FILENAME, source.filename().to_string()),
                    (attrs::SPLIT_SOURCE_UUID, source.id().to_string()),
                    (attrs::SPLIT_SOURCE_PAGE_COUNT, page.total.to_string()),
                    (attrs::SPLIT_PAGE, page_index(page.index)),
                ]);
                debug!(
                    "{}: page {}/{} ({} bytes)",
                    source.filename(),
                    page.index,
                    page.total,
                    page.bytes.len()
                );
                artifact.write_content(page.bytes);
                emitted += 1;
            }
            let total = task
                .await
                .map_err(|e| TraversalError::Internal(format!("split task panicked: {e}")))??;
            if emitted != total {
                return Err(TraversalError::Split(format!(
                    "splitter reported {total} page(s) but emitted {emitted}"
                )));
            }
            Ok::<usize, TraversalError>(total)
        };

        let total = match self.config.stage_timeout() {
            Some(limit) => tokio::time::timeout(limit, collect)
                .await
                .unwrap_or_else(|_| {
                    Err(TraversalError::Timeout {
                        stage: Stage::Split.to_string(),
                        secs: limit.as_secs(),
                    })
                }),
            None => collect.await,
        }
        .at(Stage::Split)?;

        trav.page_count = Some(total);
        trav.advance(Stage::Split);
        info!("{}: split into {} page(s)", doc.filename(), total);
        doc.put_attribute(attrs::SPLIT_SOURCE_PAGE_COUNT, total.to_string());
        Ok(())
    }
}

/// `<stem>_<00001>.<ext>`, or `<filename>_<00001>.pdf` when the source has no
/// extension. An empty filename falls back to the source UUID.
pub fn page_filename(source: &Document, index: usize) -> String {
    let idx = page_index(index);
    let filename = source.filename().trim();
    match file_infos(filename) {
        Some((stem, ext)) if !stem.is_empty() && !ext.is_empty() => format!("{stem}_{idx}.{ext}"),
        _ if filename.is_empty() => format!("{}_{idx}.pdf", source.id()),
        _ => format!("{filename}_{idx}.pdf"),
    }
}

#[async_trait]
impl Processor for SplitProcessor {
    fn name(&self) -> &'static str {
        "split"
    }

    async fn process(&self, session: &mut dyn Session, mut doc: Document) -> TraversalReport {
        let mut trav = Traversal::start(self.name(), &doc);
        let mut router = ArtifactRouter::new(session);
        let result = self.run(&mut router, &mut trav, &mut doc).await;
        trav.finish(router, &doc, result, Channel::Files, Channel::Original)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::pipeline::split::tests::sample_pdf;
    use crate::session::MemorySession;

    #[test]
    fn page_filenames() {
        assert_eq!(
            page_filename(&Document::new("report-fra.pdf", vec![]), 7),
            "report-fra_00007.pdf"
        );
        assert_eq!(
            page_filename(&Document::new("scan.PDF", vec![]), 1),
            "scan_00001.PDF"
        );
        assert_eq!(page_filename(&Document::new("noext", vec![]), 2), "noext_00002.pdf");
        assert_eq!(
            page_filename(&Document::new(".hidden", vec![]), 3),
            ".hidden_00003.pdf"
        );

        let unnamed = Document::new("", vec![]);
        assert_eq!(
            page_filename(&unnamed, 1),
            format!("{}_00001.pdf", unnamed.id())
        );
    }

    #[tokio::test]
    async fn splits_real_pdf_into_pages() {
        let processor = SplitProcessor::new(
            Arc::new(PipelineConfig::default()),
            Engines::system(&PipelineConfig::default()),
        );
        let mut session = MemorySession::new();
        let doc = Document::new("letter.pdf", sample_pdf(3));
        let source_id = doc.id();

        let report = processor.process(&mut session, doc).await;

        assert!(report.is_routed(), "{:?}", report.outcome);
        assert_eq!(report.page_count, Some(3));
        assert!(report.ledger.is_balanced());

        let pages = session.committed_to(Channel::Files);
        let names: Vec<_> = pages.iter().map(|p| p.filename()).collect();
        assert_eq!(
            names,
            ["letter_00001.pdf", "letter_00002.pdf", "letter_00003.pdf"]
        );
        for page in &pages {
            assert_eq!(page.attribute(attrs::SPLIT_SOURCE_PAGE_COUNT), Some("3"));
            assert_eq!(
                page.attribute(attrs::SPLIT_SOURCE_UUID),
                Some(source_id.to_string().as_str())
            );
            let single = lopdf::Document::load_mem(page.content()).unwrap();
            assert_eq!(single.get_pages().len(), 1);
        }
        let original = session.committed_to(Channel::Original);
        assert_eq!(original.len(), 1);
        assert_eq!(original[0].id(), source_id);
    }

    #[tokio::test]
    async fn rejects_non_pdf() {
        let processor = SplitProcessor::new(
            Arc::new(PipelineConfig::default()),
            Engines::system(&PipelineConfig::default()),
        );
        let mut session = MemorySession::new();
        let png = crate::pipeline::encode::encode_png(&image::DynamicImage::new_rgb8(4, 4)).unwrap();

        let report = processor
            .process(&mut session, Document::new("photo.png", png))
            .await;

        assert!(!report.is_routed());
        assert!(matches!(report.error(), Some(TraversalError::Split(_))));
        assert!(session.committed_to(Channel::Files).is_empty());
        assert_eq!(session.committed_to(Channel::Failure).len(), 1);
    }
}
