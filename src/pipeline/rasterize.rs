//! PDF rasterisation: page count and one `DynamicImage` per page via pdfium.
//!
//! pdfium loads documents from disk, so the bytes are spooled to a
//! [`tempfile::NamedTempFile`] that is deleted when it drops, on every exit
//! path. Callers run these methods inside `spawn_blocking`; pdfium keeps
//! thread-local state and must not run on a Tokio worker thread.
//!
//! `max_rendered_pixels` caps the longest edge regardless of physical page
//! size, keeping memory bounded for large-format pages.

use crate::error::TraversalError;
use image::DynamicImage;
use pdfium_render::prelude::*;
use std::io::Write;
use std::path::PathBuf;
use tempfile::NamedTempFile;
use tracing::{debug, info, warn};

/// PDF bytes → page count and page images.
pub trait Rasterizer: Send + Sync {
    fn page_count(&self, pdf: &[u8]) -> Result<usize, TraversalError>;

    /// Render the pages at the given 0-based indices, in the order given.
    /// Indices past the last page are skipped.
    fn rasterize(
        &self,
        pdf: &[u8],
        page_indices: &[usize],
    ) -> Result<Vec<DynamicImage>, TraversalError>;
}

/// Rasterizer backed by the pdfium shared library.
#[derive(Debug, Clone)]
pub struct PdfiumRasterizer {
    max_rendered_pixels: u32,
    library_path: Option<PathBuf>,
}

impl PdfiumRasterizer {
    /// `library_path` is either the shared library itself or the directory
    /// containing it; `None` searches the system library path.
    pub fn new(max_rendered_pixels: u32, library_path: Option<PathBuf>) -> Self {
        Self {
            max_rendered_pixels,
            library_path,
        }
    }

    fn bind(&self) -> Result<Pdfium, TraversalError> {
        let bindings = match &self.library_path {
            Some(path) if path.is_dir() => {
                Pdfium::bind_to_library(Pdfium::pdfium_platform_library_name_at_path(path))
            }
            Some(path) => Pdfium::bind_to_library(path),
            None => Pdfium::bind_to_system_library(),
        }
        .map_err(|e| TraversalError::Rasterization(format!("failed to bind pdfium: {e}")))?;
        Ok(Pdfium::new(bindings))
    }

    /// Bind pdfium, spool `pdf` to disk and hand the open document to `f`.
    fn with_document<T>(
        &self,
        pdf: &[u8],
        f: impl FnOnce(&PdfDocument<'_>) -> Result<T, TraversalError>,
    ) -> Result<T, TraversalError> {
        let spool = spool(pdf)?;
        let pdfium = self.bind()?;
        let document = pdfium
            .load_pdf_from_file(spool.path(), None)
            .map_err(|e| TraversalError::Rasterization(format!("{e:?}")))?;
        f(&document)
    }
}

fn spool(pdf: &[u8]) -> Result<NamedTempFile, TraversalError> {
    let io_err = |e: std::io::Error| TraversalError::Rasterization(format!("spool file: {e}"));
    let mut file = tempfile::Builder::new()
        .prefix("tessflow-")
        .suffix(".pdf")
        .tempfile()
        .map_err(io_err)?;
    file.write_all(pdf).map_err(io_err)?;
    file.flush().map_err(io_err)?;
    debug!("Spooled {} bytes to {}", pdf.len(), file.path().display());
    Ok(file)
}

impl Rasterizer for PdfiumRasterizer {
    fn page_count(&self, pdf: &[u8]) -> Result<usize, TraversalError> {
        self.with_document(pdf, |document| {
            let count = document.pages().len() as usize;
            debug!("PDF page count: {}", count);
            Ok(count)
        })
    }

    fn rasterize(
        &self,
        pdf: &[u8],
        page_indices: &[usize],
    ) -> Result<Vec<DynamicImage>, TraversalError> {
        let max_pixels = self.max_rendered_pixels as i32;
        self.with_document(pdf, |document| {
            let render_config = PdfRenderConfig::new()
                .set_target_width(max_pixels)
                .set_maximum_height(max_pixels);

            let pages = document.pages();
            let total = pages.len() as usize;
            let mut images = Vec::with_capacity(page_indices.len());
            for &idx in page_indices {
                if idx >= total {
                    warn!("Skipping page {} (out of range, total={})", idx + 1, total);
                    continue;
                }
                let page = pages.get(idx as u16).map_err(|e| {
                    TraversalError::Rasterization(format!("page {}: {e:?}", idx + 1))
                })?;
                let bitmap = page.render_with_config(&render_config).map_err(|e| {
                    TraversalError::Rasterization(format!("page {}: {e:?}", idx + 1))
                })?;
                let image = bitmap.as_image();
                debug!(
                    "Rendered page {} → {}x{} px",
                    idx + 1,
                    image.width(),
                    image.height()
                );
                images.push(image);
            }
            info!("Rasterized {} of {} page(s)", images.len(), total);
            Ok(images)
        })
    }
}
