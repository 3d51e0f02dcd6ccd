//! OCR pipeline: one source document in, one text artifact out.
//!
//! PDFs are rasterized first; any other input is handed to the recognizer
//! as a single encoded image. The language is resolved before rasterization
//! so a strict-mode resolution failure never pays for rendering.

use super::{
    blocking, classify, rasterize_pages, AtStage, Engines, Processor, Stage, StageFailure,
    Traversal, TraversalReport,
};
use crate::config::{DocumentSettings, EngineParams, OutputFormat, PipelineConfig};
use crate::document::{attrs, Channel, Document};
use crate::error::{TessflowError, TraversalError};
use crate::language::{LanguageCode, LanguageResolver, LanguageTables, ResolutionRequest};
use crate::pipeline::encode::render_text_document;
use crate::pipeline::postprocess::clean_ocr_text;
use crate::pipeline::{ContentType, RasterImage};
use crate::router::ArtifactRouter;
use crate::session::Session;
use async_trait::async_trait;
use std::sync::Arc;
use std::time::Duration;
use tracing::info;

/// Separator between page texts in a TXT artifact.
pub const PAGE_BREAK: &str = "\u{000C}\n";

/// Recognized text of one traversal, consumed by packaging.
#[derive(Debug, Clone, PartialEq)]
pub struct RecognitionResult {
    /// Cleaned text, one entry per recognized image.
    pub pages: Vec<String>,
    pub language: LanguageCode,
    /// Pages in the source; 0 for non-PDF input.
    pub page_count: usize,
}

impl RecognitionResult {
    pub fn text(&self) -> String {
        self.pages.join(PAGE_BREAK)
    }
}

/// Classify → resolve language → rasterize (PDF only) → recognize → package.
///
/// The artifact and its source both go to the `files` channel.
#[derive(Debug)]
pub struct OcrProcessor {
    config: Arc<PipelineConfig>,
    resolver: LanguageResolver,
    engines: Engines,
}

impl OcrProcessor {
    /// Fails when the configured default language is literal and not in the
    /// allowed set. Templated defaults are checked per document.
    pub fn new(
        config: Arc<PipelineConfig>,
        tables: Arc<LanguageTables>,
        engines: Engines,
    ) -> Result<Self, TessflowError> {
        let default = config.default_language.trim();
        if !default.contains("${") {
            tables
                .normalize(default)
                .and_then(|code| tables.validate(&code))
                .ok_or_else(|| {
                    TessflowError::InvalidConfig(format!(
                        "default.language '{default}' is not an allowed language"
                    ))
                })?;
        }
        let resolver = LanguageResolver::new(tables, engines.identifier.clone());
        Ok(Self {
            config,
            resolver,
            engines,
        })
    }

    /// Load the language tables the config points at and wire the system engines.
    pub fn from_config(config: PipelineConfig) -> Result<Self, TessflowError> {
        let tables = LanguageTables::load(
            config.iso639_mapping_path.as_deref(),
            config.allowed_languages_path.as_deref(),
        )?;
        let engines = Engines::system(&config);
        Self::new(Arc::new(config), Arc::new(tables), engines)
    }

    pub fn config(&self) -> &PipelineConfig {
        &self.config
    }

    async fn run(
        &self,
        router: &mut ArtifactRouter<'_>,
        trav: &mut Traversal,
        doc: &mut Document,
    ) -> Result<(), StageFailure> {
        let timeout = self.config.stage_timeout();

        let content_type = classify(self.engines.classifier.as_ref(), doc);
        trav.advance(Stage::Classified);

        let settings = self.config.settings_for(doc).at(Stage::LanguageResolved)?;
        let language = self.resolve_language(doc, &settings, timeout).await?;
        trav.language = Some(language.clone());
        trav.advance(Stage::LanguageResolved);

        let (images, page_count) = if content_type.as_ref().is_some_and(ContentType::is_pdf) {
            let (pages, count) = rasterize_pages(
                &self.engines.rasterizer,
                doc.content(),
                self.config.page_scope,
                timeout,
            )
            .await?;
            trav.advance(Stage::Rasterized);
            (pages.into_iter().map(RasterImage::Decoded).collect(), count)
        } else {
            (vec![RasterImage::Encoded(doc.content().to_vec())], 0)
        };
        trav.page_count = Some(page_count);

        let result = self
            .recognize(images, language, settings.engine, page_count, timeout)
            .await?;
        trav.advance(Stage::Recognized);

        self.package(router, doc, content_type.as_ref(), &result)
            .at(Stage::Packaged)?;
        trav.advance(Stage::Packaged);
        Ok(())
    }

    async fn resolve_language(
        &self,
        doc: &Document,
        settings: &DocumentSettings,
        timeout: Option<Duration>,
    ) -> Result<LanguageCode, StageFailure> {
        let resolver = self.resolver.clone();
        let strategy = self.config.strategy;
        let policy = self.config.validation;
        let filename = doc.filename().to_string();
        let pattern = settings.regex.clone();
        let default = settings.default_language.clone();

        blocking(Stage::LanguageResolved, timeout, move || {
            resolver
                .resolve(&ResolutionRequest {
                    strategy,
                    filename: &filename,
                    detection_text: &filename,
                    pattern: pattern.as_ref(),
                    default: &default,
                    policy,
                })
                .map(|resolution| resolution.code)
                .map_err(TraversalError::from)
        })
        .await
    }

    /// One recognizer call per image, in page order.
    async fn recognize(
        &self,
        images: Vec<RasterImage>,
        language: LanguageCode,
        engine: EngineParams,
        page_count: usize,
        timeout: Option<Duration>,
    ) -> Result<RecognitionResult, StageFailure> {
        let mut pages = Vec::with_capacity(images.len());
        for image in images {
            let recognizer = self.engines.recognizer.clone();
            let (lang, params) = (language.clone(), engine.clone());
            let raw = blocking(Stage::Recognized, timeout, move || {
                recognizer.recognize(&image, &lang, &params)
            })
            .await?;
            pages.push(clean_ocr_text(&raw));
        }
        Ok(RecognitionResult {
            pages,
            language,
            page_count,
        })
    }

    fn package(
        &self,
        router: &mut ArtifactRouter<'_>,
        doc: &mut Document,
        content_type: Option<&ContentType>,
        result: &RecognitionResult,
    ) -> Result<(), TraversalError> {
        let format = self.config.output_format;
        let bytes = match format {
            OutputFormat::Txt => result.text().into_bytes(),
            OutputFormat::PdfDoc => render_text_document(&result.pages)?,
        };

        let (source_format, source_mime) = match content_type {
            Some(ct) => (ct.name.clone(), ct.mime.clone()),
            None => ("unknown".to_string(), "application/octet-stream".to_string()),
        };
        let lineage = [
            (attrs::SOURCE_FILENAME, doc.filename().to_string()),
            (attrs::SOURCE_UUID, doc.id().to_string()),
            (attrs::SOURCE_MIME_TYPE, source_mime),
            (attrs::SOURCE_FORMAT, source_format),
            (attrs::SOURCE_PAGE_COUNT, result.page_count.to_string()),
            (attrs::OUTPUT_LANGUAGE, result.language.to_string()),
        ];

        let artifact = router.derive(doc);
        artifact.write_content(bytes);
        artifact.put_attributes(lineage.clone());
        artifact.put_attribute(
            attrs::FILENAME,
            format!("{}.{}", doc.filename(), format.extension()),
        );
        artifact.put_attribute(attrs::MIME_TYPE, format.mime_type());
        let artifact_id = artifact.id();
        info!(
            "{}: packaged {} page(s) as {} ({})",
            doc.filename(),
            result.pages.len(),
            format.extension(),
            artifact_id
        );

        doc.put_attributes(lineage);
        doc.put_attribute(attrs::OUTPUT_OCR_UUID, artifact_id.to_string());
        Ok(())
    }
}

#[async_trait]
impl Processor for OcrProcessor {
    fn name(&self) -> &'static str {
        "ocr"
    }

    async fn process(&self, session: &mut dyn Session, mut doc: Document) -> TraversalReport {
        let mut trav = Traversal::start(self.name(), &doc);
        let mut router = ArtifactRouter::new(session);
        let result = self.run(&mut router, &mut trav, &mut doc).await;
        trav.finish(router, &doc, result, Channel::Files, Channel::Files)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::ResolutionStrategy;
    use crate::language::DisabledIdentifier;

    fn engines() -> Engines {
        let config = PipelineConfig::default();
        Engines::system(&config).with_identifier(Arc::new(DisabledIdentifier))
    }

    #[test]
    fn txt_joins_pages_with_form_feed() {
        let result = RecognitionResult {
            pages: vec!["one\n".into(), "two\n".into()],
            language: LanguageTables::bundled().validate("eng").unwrap(),
            page_count: 2,
        };
        assert_eq!(result.text(), "one\n\u{000C}\ntwo\n");
    }

    #[test]
    fn rejects_default_outside_allowed_set() {
        let config = PipelineConfig::builder()
            .strategy(ResolutionStrategy::None)
            .default_language("xx")
            .build()
            .unwrap();
        let err = OcrProcessor::new(
            Arc::new(config),
            Arc::new(LanguageTables::bundled()),
            engines(),
        )
        .unwrap_err();
        assert!(matches!(err, TessflowError::InvalidConfig(_)));
    }

    #[test]
    fn templated_default_is_deferred() {
        let config = PipelineConfig::builder()
            .default_language("${lang}")
            .build()
            .unwrap();
        let ocr = OcrProcessor::new(
            Arc::new(config),
            Arc::new(LanguageTables::bundled()),
            engines(),
        );
        assert!(ocr.is_ok());
    }

    #[test]
    fn two_letter_default_accepted() {
        let config = PipelineConfig::builder().default_language("fr").build().unwrap();
        assert!(OcrProcessor::new(
            Arc::new(config),
            Arc::new(LanguageTables::bundled()),
            engines()
        )
        .is_ok());
    }
}
