//! # tessflow
//!
//! Route scanned documents through OCR: classify them, resolve the language
//! to recognize in, rasterize PDFs, run Tesseract and package the text.
//!
//! ## Pipeline Overview
//!
//! ```text
//! Document (path, URL or transport intake)
//!  │
//!  ├─ 1. Classify   sniff the content type from the leading bytes (infer)
//!  ├─ 2. Language   none / regex / textdetection and their fallbacks,
//!  │                normalized to ISO 639-3 and checked against the allowed set
//!  ├─ 3. Rasterize  PDF pages → images via pdfium (spawn_blocking)
//!  ├─ 4. Recognize  tesseract CLI, one call per image
//!  ├─ 5. Package    TXT or paginated PDF artifact with lineage attributes
//!  └─ 6. Route      artifacts → files, source → files | original | failure
//! ```
//!
//! Two more processors share the same plumbing: [`SplitProcessor`] writes
//! one single-page PDF per source page and [`ConvertProcessor`] packs every
//! page into one multi-page TIFF.
//!
//! Every traversal is all-or-nothing: when any stage fails, the artifacts
//! created so far are discarded and only the source reaches the failure
//! channel.
//!
//! ## Quick Start
//!
//! ```rust,no_run
//! use std::sync::Arc;
//! use tessflow::{Document, MemorySession, OcrProcessor, PipelineConfig, Processor};
//!
//! #[tokio::main]
//! async fn main() -> Result<(), Box<dyn std::error::Error>> {
//!     let config = PipelineConfig::builder()
//!         .strategy("regex".parse()?)
//!         .default_language("eng")
//!         .build()?;
//!     let ocr = OcrProcessor::from_config(config)?;
//!
//!     let mut session = MemorySession::new();
//!     let doc = Document::new("report-fra_00007.pdf", std::fs::read("report-fra_00007.pdf")?);
//!     let report = ocr.process(&mut session, doc).await;
//!     println!("{:?} in {:?}", report.outcome, report.language);
//!     Ok(())
//! }
//! ```
//!
//! ## Feature Flags
//!
//! | Feature  | Default | Description |
//! |----------|---------|-------------|
//! | `cli`    | on      | Enables the `tessflow` binary (clap + anyhow + indicatif + tracing-subscriber) |
//! | `detect` | on      | Statistical language identification via lingua |
//!
//! Without `detect` the `textdetection` strategies always fail over to their
//! fallback, or to the default language in lenient mode.
//!
//! ## External tools
//!
//! Rasterization needs the pdfium shared library (`PDFIUM_LIB_PATH` or the
//! system library path) and recognition needs the `tesseract` executable
//! with the traineddata files for every allowed language.

// ── Modules ──────────────────────────────────────────────────────────────

pub mod batch;
pub mod config;
pub mod document;
pub mod error;
pub mod language;
pub mod pipeline;
pub mod processor;
pub mod progress;
pub mod router;
pub mod session;

// ── Re-exports ───────────────────────────────────────────────────────────

pub use batch::{run_batch, run_batch_sync, BatchStats};
pub use config::{
    OutputFormat, PageScope, PipelineConfig, PipelineConfigBuilder, ResolutionStrategy,
    ValidationPolicy,
};
pub use document::{Channel, Document};
pub use error::{RoutingError, TessflowError, TraversalError};
pub use language::{LanguageCode, LanguageResolver, LanguageTables};
pub use processor::{
    ConvertProcessor, Engines, OcrProcessor, Outcome, Processor, SplitProcessor, Stage,
    TraversalReport,
};
pub use router::{ArtifactRouter, RoutingLedger};
pub use session::{DirectorySession, MemorySession, Session};
