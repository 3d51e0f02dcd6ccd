//! PDF → multi-page TIFF conversion.

use super::{
    blocking, classify, rasterize_pages, AtStage, Engines, Processor, Stage, StageFailure,
    Traversal, TraversalReport,
};
use crate::config::{PageScope, PipelineConfig};
use crate::document::{attrs, file_infos, Channel, Document};
use crate::error::{TessflowError, TraversalError};
use crate::pipeline::encode::encode_multipage_tiff;
use crate::router::ArtifactRouter;
use crate::session::Session;
use async_trait::async_trait;
use std::sync::Arc;
use tracing::info;

/// Rasterize every page and pack the frames into one TIFF.
///
/// The TIFF goes to `files`, the source PDF to `original`.
#[derive(Debug)]
pub struct ConvertProcessor {
    config: Arc<PipelineConfig>,
    engines: Engines,
}

impl ConvertProcessor {
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
        let timeout = self.config.stage_timeout();

        if let Some(ct) = classify(self.engines.classifier.as_ref(), doc) {
            if !ct.is_pdf() {
                return Err(TraversalError::Rasterization(format!(
                    "expected a PDF, got {}",
                    ct.mime
                )))
                .at(Stage::Classified);
            }
        }
        trav.advance(Stage::Classified);

        let (pages, count) = rasterize_pages(
            &self.engines.rasterizer,
            doc.content(),
            PageScope::All,
            timeout,
        )
        .await?;
        trav.page_count = Some(count);
        trav.advance(Stage::Rasterized);

        let tiff = blocking(Stage::Packaged, timeout, move || encode_multipage_tiff(&pages)).await?;

        let artifact = router.derive(doc);
        artifact.write_content(tiff);
        artifact.put_attribute(attrs::FILENAME, tiff_filename(doc.filename()));
        artifact.put_attribute(attrs::MIME_TYPE, "image/tiff");
        artifact.put_attributes([
            (attrs::TIFF_SOURCE_FILENAME, doc.filename().to_string()),
            (attrs::TIFF_SOURCE_UUID, doc.id().to_string()),
            (attrs::SOURCE_PAGE_COUNT, count.to_string()),
        ]);
        info!(
            "{}: converted {} page(s) to TIFF ({})",
            doc.filename(),
            count,
            artifact.id()
        );
        trav.advance(Stage::Packaged);
        Ok(())
    }
}

/// `<stem>.tif`; a name without extension keeps its full name as the stem.
pub fn tiff_filename(source: &str) -> String {
    let source = source.trim();
    match file_infos(source) {
        Some((stem, _)) if !stem.is_empty() => format!("{stem}.tif"),
        _ => format!("{source}.tif"),
    }
}

#[async_trait]
impl Processor for ConvertProcessor {
    fn name(&self) -> &'static str {
        "convert"
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

    #[test]
    fn tiff_names() {
        assert_eq!(tiff_filename("scan.pdf"), "scan.tif");
        assert_eq!(tiff_filename("a.b.pdf"), "a.b.tif");
        assert_eq!(tiff_filename("scan"), "scan.tif");
        assert_eq!(tiff_filename(".pdf"), ".pdf.tif");
    }
}
