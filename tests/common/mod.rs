//! Fake engines shared by the integration tests.
#![allow(dead_code)]

use image::DynamicImage;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::{Arc, Mutex};
use tessflow::config::EngineParams;
use tessflow::language::{Candidate, LanguageIdentifier, ResolutionError};
use tessflow::pipeline::encode::encode_png;
use tessflow::pipeline::{PageBytes, PageSplitter, RasterImage, Rasterizer, Recognizer};
use tessflow::{Engines, LanguageCode, PipelineConfig, TraversalError};

/// Reports `pages` pages and renders each requested one as a small image.
#[derive(Default)]
pub struct FakeRasterizer {
    pub pages: usize,
    pub rasterize_calls: AtomicUsize,
    /// Page indices asked for, one entry per `rasterize` call.
    pub requested: Mutex<Vec<Vec<usize>>>,
}

impl FakeRasterizer {
    pub fn new(pages: usize) -> Arc<Self> {
        Arc::new(Self {
            pages,
            rasterize_calls: AtomicUsize::new(0),
            requested: Mutex::new(Vec::new()),
        })
    }
}

impl Rasterizer for FakeRasterizer {
    fn page_count(&self, _pdf: &[u8]) -> Result<usize, TraversalError> {
        Ok(self.pages)
    }

    fn rasterize(
        &self,
        _pdf: &[u8],
        page_indices: &[usize],
    ) -> Result<Vec<DynamicImage>, TraversalError> {
        self.rasterize_calls.fetch_add(1, Ordering::SeqCst);
        self.requested.lock().unwrap().push(page_indices.to_vec());
        Ok(page_indices
            .iter()
            .filter(|&&i| i < self.pages)
            .map(|&i| DynamicImage::new_rgb8(8 + i as u32, 8))
            .collect())
    }
}

/// Decodes the image like a real engine would, then returns
/// `text <lang> <width>x<height>` and records the language it was given.
#[derive(Default)]
pub struct FakeRecognizer {
    pub languages: Mutex<Vec<String>>,
}

impl FakeRecognizer {
    pub fn new() -> Arc<Self> {
        Arc::new(Self::default())
    }

    pub fn calls(&self) -> usize {
        self.languages.lock().unwrap().len()
    }
}

impl Recognizer for FakeRecognizer {
    fn recognize(
        &self,
        image: &RasterImage,
        language: &LanguageCode,
        _params: &EngineParams,
    ) -> Result<String, TraversalError> {
        let img = image.decode()?;
        self.languages.lock().unwrap().push(language.to_string());
        Ok(format!(
            "text {} {}x{}  \r\n\u{000C}",
            language,
            img.width(),
            img.height()
        ))
    }
}

/// Always fails, as a crashed engine would.
pub struct FailingRecognizer;

impl Recognizer for FailingRecognizer {
    fn recognize(
        &self,
        _image: &RasterImage,
        _language: &LanguageCode,
        _params: &EngineParams,
    ) -> Result<String, TraversalError> {
        Err(TraversalError::Recognition("engine exited with status 1".into()))
    }
}

/// Returns a fixed candidate list, or a detection error when empty.
pub struct FakeIdentifier(pub Vec<(&'static str, f64)>);

impl LanguageIdentifier for FakeIdentifier {
    fn identify(&self, _text: &str) -> Result<Vec<Candidate>, ResolutionError> {
        if self.0.is_empty() {
            return Err(ResolutionError::Detection("no model".into()));
        }
        Ok(self
            .0
            .iter()
            .map(|(tag, confidence)| Candidate {
                tag: tag.to_string(),
                confidence: *confidence,
            })
            .collect())
    }
}

/// Emits `pages` pages, failing after `fail_after` of them when set.
pub struct FakeSplitter {
    pub pages: usize,
    pub fail_after: Option<usize>,
}

impl PageSplitter for FakeSplitter {
    fn split(
        &self,
        _pdf: &[u8],
        emit: &mut dyn FnMut(PageBytes) -> Result<(), TraversalError>,
    ) -> Result<usize, TraversalError> {
        if self.pages == 0 {
            return Err(TraversalError::EmptyDocument);
        }
        for index in 1..=self.pages {
            if self.fail_after == Some(index - 1) {
                return Err(TraversalError::Split(format!("page {index} is corrupt")));
            }
            emit(PageBytes {
                index,
                total: self.pages,
                bytes: format!("%PDF-1.5 page {index}").into_bytes(),
            })?;
        }
        Ok(self.pages)
    }
}

/// Bytes `infer` recognizes as a PDF.
pub fn pdf_bytes() -> Vec<u8> {
    b"%PDF-1.5\n%fake\n".to_vec()
}

pub fn png_bytes() -> Vec<u8> {
    encode_png(&DynamicImage::new_rgb8(16, 16)).unwrap()
}

/// System engines with every external engine replaced by a fake.
pub fn fake_engines(
    rasterizer: Arc<dyn Rasterizer>,
    recognizer: Arc<dyn Recognizer>,
    identifier: Arc<dyn LanguageIdentifier>,
) -> Engines {
    Engines::system(&PipelineConfig::default())
        .with_rasterizer(rasterizer)
        .with_recognizer(recognizer)
        .with_identifier(identifier)
}

pub fn init_tracing() {
    let _ = tracing_subscriber::fmt()
        .with_env_filter("tessflow=debug")
        .with_test_writer()
        .try_init();
}
