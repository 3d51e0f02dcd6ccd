//! Pipeline stages: adapters over the external engines plus encoders.
//!
//! Each submodule implements exactly one transformation step behind a trait,
//! so processors can be driven by real engines or by in-memory fakes.
//!
//! ## Data Flow
//!
//! ```text
//! input ──▶ classify ──▶ rasterize ──▶ recognize ──▶ postprocess ──▶ encode
//! (path/URL) (infer)     (pdfium)      (tesseract)   (cleanup)       (TXT/PDF/TIFF)
//!                 └──────▶ split (lopdf)
//! ```
//!
//! 1. [`input`]: turn a user-supplied path or URL into a document
//! 2. [`classify`]: sniff the content type from the leading bytes
//! 3. [`rasterize`]: page count and page images; blocking, runs in
//!    `spawn_blocking` because pdfium is not async-safe
//! 4. [`recognize`]: OCR one raster image with a validated language
//! 5. [`postprocess`]: deterministic text cleanup
//! 6. [`encode`]: PNG, multi-page TIFF and paginated text PDF writers
//! 7. [`split`]: one single-page PDF per source page

pub mod classify;
pub mod encode;
pub mod input;
pub mod postprocess;
pub mod rasterize;
pub mod recognize;
pub mod split;

pub use classify::{Classifier, ContentType, SignatureClassifier};
pub use rasterize::{PdfiumRasterizer, Rasterizer};
pub use recognize::{RasterImage, Recognizer, TesseractRecognizer};
pub use split::{LopdfSplitter, PageBytes, PageSplitter};
