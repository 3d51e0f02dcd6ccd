//! OCR recognition over raster images, backed by the tesseract CLI.

use crate::config::EngineParams;
use crate::error::TraversalError;
use crate::language::LanguageCode;
use crate::pipeline::encode::encode_png;
use image::DynamicImage;
use std::io::Write;
use std::path::PathBuf;
use std::process::Command;
use tracing::debug;

/// An image handed to the recognizer.
#[derive(Debug, Clone)]
pub enum RasterImage {
    /// A rasterized PDF page.
    Decoded(DynamicImage),
    /// Raw document bytes, treated as a single image. Decoding happens
    /// inside recognition so a bad image surfaces as a recognition failure.
    Encoded(Vec<u8>),
}

impl RasterImage {
    /// Decode (if needed) into pixels.
    pub fn decode(&self) -> Result<DynamicImage, TraversalError> {
        match self {
            RasterImage::Decoded(img) => Ok(img.clone()),
            RasterImage::Encoded(bytes) => image::load_from_memory(bytes)
                .map_err(|e| TraversalError::Recognition(format!("image decode failed: {e}"))),
        }
    }
}

/// Raster image + language + engine parameters → text.
///
/// Implementations are blocking; callers run them in `spawn_blocking`.
pub trait Recognizer: Send + Sync {
    fn recognize(
        &self,
        image: &RasterImage,
        language: &LanguageCode,
        params: &EngineParams,
    ) -> Result<String, TraversalError>;
}

/// Recognizer that shells out to the `tesseract` executable.
#[derive(Debug, Clone)]
pub struct TesseractRecognizer {
    binary: PathBuf,
}

impl TesseractRecognizer {
    pub fn new(binary: impl Into<PathBuf>) -> Self {
        Self {
            binary: binary.into(),
        }
    }

    /// Arguments after the input path.
    fn args(language: &LanguageCode, params: &EngineParams) -> Vec<String> {
        vec![
            "stdout".into(),
            "-l".into(),
            traineddata_name(language),
            "--tessdata-dir".into(),
            params.install_dir.display().to_string(),
            "--oem".into(),
            params.engine_mode.to_string(),
            "--psm".into(),
            params.page_seg_mode.to_string(),
        ]
    }
}

impl Default for TesseractRecognizer {
    fn default() -> Self {
        Self::new("tesseract")
    }
}

/// Traineddata files use `_` where language codes use `-` (`chi-sim` → `chi_sim`).
pub fn traineddata_name(language: &LanguageCode) -> String {
    language.as_str().replace('-', "_")
}

impl Recognizer for TesseractRecognizer {
    fn recognize(
        &self,
        image: &RasterImage,
        language: &LanguageCode,
        params: &EngineParams,
    ) -> Result<String, TraversalError> {
        let pixels = image.decode()?;
        let png = encode_png(&pixels)
            .map_err(|e| TraversalError::Recognition(format!("PNG encode failed: {e}")))?;

        let io_err = |e: std::io::Error| TraversalError::Recognition(format!("temp image: {e}"));
        let mut input = tempfile::Builder::new()
            .prefix("tessflow-ocr-")
            .suffix(".png")
            .tempfile()
            .map_err(io_err)?;
        input.write_all(&png).map_err(io_err)?;
        input.flush().map_err(io_err)?;

        let args = Self::args(language, params);
        debug!(
            "Running {} {} {}",
            self.binary.display(),
            input.path().display(),
            args.join(" ")
        );
        let output = Command::new(&self.binary)
            .arg(input.path())
            .args(&args)
            .output()
            .map_err(|e| {
                TraversalError::Recognition(format!(
                    "failed to run {}: {e}",
                    self.binary.display()
                ))
            })?;

        if !output.status.success() {
            let stderr = String::from_utf8_lossy(&output.stderr);
            return Err(TraversalError::Recognition(format!(
                "tesseract exited with {}: {}",
                output.status,
                stderr.trim()
            )));
        }

        String::from_utf8(output.stdout)
            .map_err(|e| TraversalError::Recognition(format!("output is not UTF-8: {e}")))
    }
}
