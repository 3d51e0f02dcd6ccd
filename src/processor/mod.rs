//! Processors: the per-document controllers.
//!
//! Every processor drives one [`Document`] through a strict stage sequence
//! and ends with the document routed to exactly one channel:
//!
//! ```text
//! Received ─▶ Classified ─▶ LanguageResolved ─▶ (Rasterized)? ─▶ Recognized ─▶ Packaged ─▶ Routed
//!                  │
//!                  └─▶ (Split) ─▶ Routed                (split pipeline)
//! any error ─▶ rollback pending artifacts ─▶ source → failure
//! ```
//!
//! Blocking adapter calls run on the blocking pool via [`blocking`], bounded
//! by the configured stage timeout. A timeout stops the traversal waiting;
//! the adapter itself keeps running to completion in the background.

pub mod convert;
pub mod ocr;
pub mod split;

pub use convert::ConvertProcessor;
pub use ocr::OcrProcessor;
pub use split::SplitProcessor;

use crate::config::{PageScope, PipelineConfig};
use crate::document::{Channel, Document};
use crate::error::TraversalError;
use crate::language::{default_identifier, LanguageCode, LanguageIdentifier};
use crate::pipeline::{
    Classifier, ContentType, LopdfSplitter, PageSplitter, PdfiumRasterizer, Rasterizer,
    Recognizer, SignatureClassifier, TesseractRecognizer,
};
use crate::router::{ArtifactRouter, RoutingLedger};
use crate::session::Session;
use async_trait::async_trait;
use image::DynamicImage;
use serde::{Deserialize, Serialize};
use std::fmt;
use std::sync::Arc;
use std::time::Duration;
use tracing::{debug, error, info, warn};
use uuid::Uuid;

/// The external engines a processor calls into.
#[derive(Clone)]
pub struct Engines {
    pub classifier: Arc<dyn Classifier>,
    pub rasterizer: Arc<dyn Rasterizer>,
    pub recognizer: Arc<dyn Recognizer>,
    pub splitter: Arc<dyn PageSplitter>,
    pub identifier: Arc<dyn LanguageIdentifier>,
}

impl Engines {
    /// infer + pdfium + tesseract + lopdf + the default identifier.
    pub fn system(config: &PipelineConfig) -> Self {
        Self {
            classifier: Arc::new(SignatureClassifier),
            rasterizer: Arc::new(PdfiumRasterizer::new(
                config.max_rendered_pixels,
                config.pdfium_library_path.clone(),
            )),
            recognizer: Arc::new(TesseractRecognizer::new(config.tesseract_binary.clone())),
            splitter: Arc::new(LopdfSplitter),
            identifier: default_identifier(),
        }
    }

    pub fn with_classifier(mut self, classifier: Arc<dyn Classifier>) -> Self {
        self.classifier = classifier;
        self
    }

    pub fn with_rasterizer(mut self, rasterizer: Arc<dyn Rasterizer>) -> Self {
        self.rasterizer = rasterizer;
        self
    }

    pub fn with_recognizer(mut self, recognizer: Arc<dyn Recognizer>) -> Self {
        self.recognizer = recognizer;
        self
    }

    pub fn with_splitter(mut self, splitter: Arc<dyn PageSplitter>) -> Self {
        self.splitter = splitter;
        self
    }

    pub fn with_identifier(mut self, identifier: Arc<dyn LanguageIdentifier>) -> Self {
        self.identifier = identifier;
        self
    }
}

impl fmt::Debug for Engines {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Engines").finish_non_exhaustive()
    }
}

/// Traversal stages, in order.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Stage {
    Received,
    Classified,
    LanguageResolved,
    Rasterized,
    Split,
    Recognized,
    Packaged,
    Routed,
}

impl fmt::Display for Stage {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(match self {
            Stage::Received => "received",
            Stage::Classified => "classified",
            Stage::LanguageResolved => "language_resolved",
            Stage::Rasterized => "rasterized",
            Stage::Split => "split",
            Stage::Recognized => "recognized",
            Stage::Packaged => "packaged",
            Stage::Routed => "routed",
        })
    }
}

/// How a traversal ended.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "status", rename_all = "snake_case")]
pub enum Outcome {
    /// The source reached `channel`; every artifact was committed.
    Routed { channel: Channel },
    /// The stage that failed and why. The source went to the failure channel.
    Failed { stage: Stage, error: TraversalError },
}

/// The result of one traversal.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct TraversalReport {
    pub processor: String,
    pub source_id: Uuid,
    pub filename: String,
    /// Last stage completed.
    pub reached: Stage,
    pub outcome: Outcome,
    pub language: Option<LanguageCode>,
    pub page_count: Option<usize>,
    pub ledger: RoutingLedger,
}

impl TraversalReport {
    pub fn is_routed(&self) -> bool {
        matches!(self.outcome, Outcome::Routed { .. })
    }

    pub fn error(&self) -> Option<&TraversalError> {
        match &self.outcome {
            Outcome::Failed { error, .. } => Some(error),
            Outcome::Routed { .. } => None,
        }
    }
}

/// A per-document controller.
#[async_trait]
pub trait Processor: Send + Sync {
    fn name(&self) -> &'static str;

    /// Drive `doc` to a terminal channel. Never fails: every error ends up in
    /// the report and the source on the failure channel.
    async fn process(&self, session: &mut dyn Session, doc: Document) -> TraversalReport;

    /// Process every document the session has queued.
    async fn on_trigger(&self, session: &mut dyn Session) -> Vec<TraversalReport> {
        let mut reports = Vec::new();
        while let Some(doc) = session.intake() {
            reports.push(self.process(session, doc).await);
        }
        reports
    }
}

// ── Shared traversal plumbing ─────────────────────────────────────────────

/// An error tagged with the stage that raised it.
#[derive(Debug)]
pub(crate) struct StageFailure {
    pub stage: Stage,
    pub error: TraversalError,
}

pub(crate) trait AtStage<T> {
    fn at(self, stage: Stage) -> Result<T, StageFailure>;
}

impl<T, E: Into<TraversalError>> AtStage<T> for Result<T, E> {
    fn at(self, stage: Stage) -> Result<T, StageFailure> {
        self.map_err(|e| StageFailure {
            stage,
            error: e.into(),
        })
    }
}

/// Progress of one traversal, turned into a report at the end.
pub(crate) struct Traversal {
    processor: &'static str,
    source_id: Uuid,
    filename: String,
    reached: Stage,
    pub language: Option<LanguageCode>,
    pub page_count: Option<usize>,
}

impl Traversal {
    pub fn start(processor: &'static str, doc: &Document) -> Self {
        info!("[{}] Received {} ({})", processor, doc.filename(), doc.id());
        Self {
            processor,
            source_id: doc.id(),
            filename: doc.filename().to_string(),
            reached: Stage::Received,
            language: None,
            page_count: None,
        }
    }

    pub fn advance(&mut self, stage: Stage) {
        debug!("[{}] {} → {}", self.processor, self.filename, stage);
        self.reached = stage;
    }

    /// Route the traversal's artifacts and source, then build the report.
    ///
    /// On success pending artifacts go to `artifact_channel` and the source to
    /// `source_channel`. On failure, or when a success commit is refused,
    /// pending artifacts are rolled back and the source goes to the failure
    /// channel.
    pub fn finish(
        mut self,
        mut router: ArtifactRouter<'_>,
        source: &Document,
        result: Result<(), StageFailure>,
        artifact_channel: Channel,
        source_channel: Channel,
    ) -> TraversalReport {
        let routed = result.and_then(|()| {
            router.commit_pending(artifact_channel).at(Stage::Routed)?;
            router.route_source(source_channel, source).at(Stage::Routed)
        });

        let outcome = match routed {
            Ok(()) => {
                self.advance(Stage::Routed);
                info!(
                    "[{}] {} routed to {}",
                    self.processor, self.filename, source_channel
                );
                Outcome::Routed {
                    channel: source_channel,
                }
            }
            Err(StageFailure { stage, error }) => {
                error!(
                    "[{}] {} failed at {}: {}",
                    self.processor, self.filename, stage, error
                );
                router.rollback();
                if router.route_source(Channel::Failure, source).is_err() {
                    warn!(
                        "[{}] {} could not be routed to failure",
                        self.processor, self.filename
                    );
                }
                Outcome::Failed { stage, error }
            }
        };

        TraversalReport {
            processor: self.processor.to_string(),
            source_id: self.source_id,
            filename: self.filename,
            reached: self.reached,
            outcome,
            language: self.language,
            page_count: self.page_count,
            ledger: router.into_ledger(),
        }
    }
}

/// Classify the head of `doc`, recording the mime type on success.
///
/// Classification failure is logged and yields `None`.
pub(crate) fn classify(classifier: &dyn Classifier, doc: &mut Document) -> Option<ContentType> {
    let classified = classifier.classify(&mut doc.reader());
    match classified {
        Ok(content_type) => {
            doc.put_attribute(crate::document::attrs::MIME_TYPE, content_type.mime.clone());
            Some(content_type)
        }
        Err(e) => {
            warn!("{} ({}): {}; continuing as unknown type", doc.filename(), doc.id(), e);
            None
        }
    }
}

/// Page count, then the page images `scope` selects. A zero page count is
/// fatal and rasterization is never attempted for it.
pub(crate) async fn rasterize_pages(
    rasterizer: &Arc<dyn Rasterizer>,
    pdf: &[u8],
    scope: PageScope,
    timeout: Option<Duration>,
) -> Result<(Vec<DynamicImage>, usize), StageFailure> {
    let bytes: Arc<[u8]> = Arc::from(pdf);

    let count = {
        let (rasterizer, bytes) = (rasterizer.clone(), bytes.clone());
        blocking(Stage::Rasterized, timeout, move || rasterizer.page_count(&bytes)).await?
    };
    if count == 0 {
        return Err(TraversalError::EmptyDocument).at(Stage::Rasterized);
    }

    let indices: Vec<usize> = match scope {
        PageScope::First => vec![0],
        PageScope::All => (0..count).collect(),
    };
    let rasterizer = rasterizer.clone();
    let images = blocking(Stage::Rasterized, timeout, move || {
        rasterizer.rasterize(&bytes, &indices)
    })
    .await?;
    if images.is_empty() {
        return Err(TraversalError::EmptyDocument).at(Stage::Rasterized);
    }
    Ok((images, count))
}

/// Run a blocking adapter call on the blocking pool, bounded by `timeout`.
pub(crate) async fn blocking<T, F>(
    stage: Stage,
    timeout: Option<Duration>,
    f: F,
) -> Result<T, StageFailure>
where
    F: FnOnce() -> Result<T, TraversalError> + Send + 'static,
    T: Send + 'static,
{
    let task = tokio::task::spawn_blocking(f);
    let joined = match timeout {
        Some(limit) => tokio::time::timeout(limit, task).await.map_err(|_| StageFailure {
            stage,
            error: TraversalError::Timeout {
                stage: stage.to_string(),
                secs: limit.as_secs(),
            },
        })?,
        None => task.await,
    };
    joined
        .map_err(|e| TraversalError::Internal(format!("{stage} task panicked: {e}")))
        .and_then(|r| r)
        .at(stage)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn stages_are_ordered() {
        assert!(Stage::Received < Stage::Classified);
        assert!(Stage::LanguageResolved < Stage::Rasterized);
        assert!(Stage::Packaged < Stage::Routed);
        assert_eq!(Stage::LanguageResolved.to_string(), "language_resolved");
    }

    #[test]
    fn outcome_serialises_with_status_tag() {
        let json = serde_json::to_value(Outcome::Failed {
            stage: Stage::Rasterized,
            error: TraversalError::EmptyDocument,
        })
        .unwrap();
        assert_eq!(json["status"], "failed");
        assert_eq!(json["stage"], "rasterized");
    }

    #[tokio::test]
    async fn blocking_returns_value() {
        let v = blocking(Stage::Recognized, None, || Ok(7)).await.unwrap();
        assert_eq!(v, 7);
    }

    #[tokio::test]
    async fn blocking_tags_errors_with_stage() {
        let err = blocking::<(), _>(Stage::Rasterized, None, || {
            Err(TraversalError::EmptyDocument)
        })
        .await
        .unwrap_err();
        assert_eq!(err.stage, Stage::Rasterized);
        assert_eq!(err.error, TraversalError::EmptyDocument);
    }

    #[tokio::test]
    async fn blocking_times_out() {
        let err = blocking(Stage::Recognized, Some(Duration::from_millis(20)), || {
            std::thread::sleep(Duration::from_millis(500));
            Ok(())
        })
        .await
        .unwrap_err();
        assert!(matches!(err.error, TraversalError::Timeout { .. }));
    }

    #[tokio::test]
    async fn blocking_reports_panics() {
        let err = blocking::<(), _>(Stage::Recognized, None, || panic!("engine crashed"))
            .await
            .unwrap_err();
        assert!(matches!(err.error, TraversalError::Internal(_)));
    }
}
