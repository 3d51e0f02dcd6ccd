//! Artifact encoders: PNG pages, multi-page TIFF and paginated text PDFs.

use crate::error::TraversalError;
use image::DynamicImage;
use lopdf::content::{Content, Operation};
use lopdf::{dictionary, Document as PdfDocument, Object, ObjectId, Stream, StringFormat};
use std::io::Cursor;
use tiff::encoder::{colortype, TiffEncoder};
use tracing::debug;

/// Encode one image as PNG. Lossless, so text edges stay crisp for OCR.
pub fn encode_png(img: &DynamicImage) -> Result<Vec<u8>, image::ImageError> {
    let mut buf = Vec::new();
    img.write_to(&mut Cursor::new(&mut buf), image::ImageFormat::Png)?;
    debug!("Encoded {}x{} image → {} bytes PNG", img.width(), img.height(), buf.len());
    Ok(buf)
}

/// Encode every image as one frame of a single TIFF, in order.
pub fn encode_multipage_tiff(pages: &[DynamicImage]) -> Result<Vec<u8>, TraversalError> {
    if pages.is_empty() {
        return Err(TraversalError::Packaging("no pages to encode".into()));
    }
    let tiff_err = |e: tiff::TiffError| TraversalError::Packaging(format!("TIFF encode: {e}"));

    let mut buf = Cursor::new(Vec::new());
    {
        let mut encoder = TiffEncoder::new(&mut buf).map_err(tiff_err)?;
        for page in pages {
            let rgb = page.to_rgb8();
            encoder
                .write_image::<colortype::RGB8>(rgb.width(), rgb.height(), rgb.as_raw())
                .map_err(tiff_err)?;
        }
    }
    let bytes = buf.into_inner();
    debug!("Encoded {} frame(s) → {} bytes TIFF", pages.len(), bytes.len());
    Ok(bytes)
}

// A4 in points, Courier 10/14.
const PAGE_WIDTH: i64 = 595;
const PAGE_HEIGHT: i64 = 842;
const MARGIN: i64 = 50;
const FONT_SIZE: i64 = 10;
const LEADING: i64 = 14;
const LINES_PER_PAGE: usize = ((PAGE_HEIGHT - 2 * MARGIN) / LEADING) as usize;
// Courier advances 0.6 em per glyph.
const CHARS_PER_LINE: usize = ((PAGE_WIDTH - 2 * MARGIN) * 10 / (FONT_SIZE * 6)) as usize;

/// Render recognized page texts as a paginated PDF.
///
/// Every entry of `pages` starts a fresh PDF page and overflows onto further
/// pages as needed. Characters outside Latin-1 become `?`.
pub fn render_text_document(pages: &[String]) -> Result<Vec<u8>, TraversalError> {
    let pdf_err = |e: lopdf::Error| TraversalError::Packaging(format!("PDF encode: {e}"));

    let mut doc = PdfDocument::with_version("1.5");
    let pages_id = doc.new_object_id();
    let font_id = doc.add_object(dictionary! {
        "Type" => "Font",
        "Subtype" => "Type1",
        "BaseFont" => "Courier",
        "Encoding" => "WinAnsiEncoding",
    });
    let resources_id = doc.add_object(dictionary! {
        "Font" => dictionary! { "F1" => font_id },
    });

    let mut kids: Vec<ObjectId> = Vec::new();
    for text in pages {
        let lines = wrap_lines(text);
        let mut chunks: Vec<&[String]> = lines.chunks(LINES_PER_PAGE).collect();
        if chunks.is_empty() {
            chunks.push(&[]);
        }
        for chunk in chunks {
            let content = page_content(chunk);
            let content_id = doc.add_object(Stream::new(
                dictionary! {},
                content.encode().map_err(pdf_err)?,
            ));
            let page_id = doc.add_object(dictionary! {
                "Type" => "Page",
                "Parent" => pages_id,
                "Contents" => content_id,
            });
            kids.push(page_id);
        }
    }

    let count = kids.len() as i64;
    let pages_dict = dictionary! {
        "Type" => "Pages",
        "Kids" => kids.into_iter().map(Object::Reference).collect::<Vec<_>>(),
        "Count" => Object::Integer(count),
        "Resources" => resources_id,
        "MediaBox" => vec![
            Object::Integer(0),
            Object::Integer(0),
            Object::Integer(PAGE_WIDTH),
            Object::Integer(PAGE_HEIGHT),
        ],
    };
    doc.objects.insert(pages_id, Object::Dictionary(pages_dict));
    let catalog_id = doc.add_object(dictionary! {
        "Type" => "Catalog",
        "Pages" => pages_id,
    });
    doc.trailer.set("Root", catalog_id);

    let mut out = Vec::new();
    doc.save_to(&mut out)
        .map_err(|e| TraversalError::Packaging(format!("PDF write: {e}")))?;
    debug!("Rendered {} text page(s) → {} PDF page(s)", pages.len(), count);
    Ok(out)
}

fn page_content(lines: &[String]) -> Content {
    let mut operations = vec![
        Operation::new("BT", vec![]),
        Operation::new(
            "Tf",
            vec![Object::Name(b"F1".to_vec()), Object::Integer(FONT_SIZE)],
        ),
        Operation::new("TL", vec![Object::Integer(LEADING)]),
        Operation::new(
            "Td",
            vec![
                Object::Integer(MARGIN),
                Object::Integer(PAGE_HEIGHT - MARGIN - FONT_SIZE),
            ],
        ),
    ];
    for (i, line) in lines.iter().enumerate() {
        if i > 0 {
            operations.push(Operation::new("T*", vec![]));
        }
        operations.push(Operation::new(
            "Tj",
            vec![Object::String(latin1(line), StringFormat::Literal)],
        ));
    }
    operations.push(Operation::new("ET", vec![]));
    Content { operations }
}

/// Split on newlines and hard-wrap at the line width.
fn wrap_lines(text: &str) -> Vec<String> {
    let mut out = Vec::new();
    for line in text.lines() {
        let chars: Vec<char> = line.chars().collect();
        if chars.is_empty() {
            out.push(String::new());
            continue;
        }
        for chunk in chars.chunks(CHARS_PER_LINE) {
            out.push(chunk.iter().collect());
        }
    }
    out
}

fn latin1(line: &str) -> Vec<u8> {
    line.chars()
        .map(|c| match u32::from(c) {
            n @ 0x20..=0xFF => n as u8,
            _ => b'?',
        })
        .collect()
}

#[cfg(test)]
mod tests {
    use super::*;
    use image::{Rgb, RgbImage, Rgba, RgbaImage};

    #[test]
    fn encode_small_png() {
        let img = DynamicImage::ImageRgba8(RgbaImage::from_pixel(10, 10, Rgba([255, 0, 0, 255])));
        let png = encode_png(&img).unwrap();
        assert_eq!(&png[..8], &[0x89, b'P', b'N', b'G', 0x0D, 0x0A, 0x1A, 0x0A]);
    }

    #[test]
    fn tiff_has_one_frame_per_page() {
        let pages: Vec<DynamicImage> = (0..3)
            .map(|i| DynamicImage::ImageRgb8(RgbImage::from_pixel(8 + i, 6, Rgb([i as u8, 0, 0]))))
            .collect();
        let bytes = encode_multipage_tiff(&pages).unwrap();

        let mut decoder = tiff::decoder::Decoder::new(Cursor::new(bytes)).unwrap();
        let mut frames = 1;
        assert_eq!(decoder.dimensions().unwrap(), (8, 6));
        while decoder.more_images() {
            decoder.next_image().unwrap();
            frames += 1;
        }
        assert_eq!(frames, 3);
        assert_eq!(decoder.dimensions().unwrap(), (10, 6));
    }

    #[test]
    fn tiff_without_pages_fails() {
        assert!(matches!(
            encode_multipage_tiff(&[]),
            Err(TraversalError::Packaging(_))
        ));
    }

    #[test]
    fn text_document_paginates() {
        let long: String = (0..LINES_PER_PAGE + 5)
            .map(|i| format!("line {i}\n"))
            .collect();
        let bytes = render_text_document(&["short page".into(), long]).unwrap();
        assert!(bytes.starts_with(b"%PDF-1.5"));
        let doc = PdfDocument::load_mem(&bytes).unwrap();
        assert_eq!(doc.get_pages().len(), 3);
    }

    #[test]
    fn empty_text_still_yields_a_page() {
        let bytes = render_text_document(&[String::new()]).unwrap();
        let doc = PdfDocument::load_mem(&bytes).unwrap();
        assert_eq!(doc.get_pages().len(), 1);
    }

    #[test]
    fn non_latin1_replaced() {
        assert_eq!(latin1("café 日本"), b"caf\xE9 ??".to_vec());
    }

    #[test]
    fn long_lines_wrap() {
        let line = "x".repeat(CHARS_PER_LINE * 2 + 1);
        let wrapped = wrap_lines(&line);
        assert_eq!(wrapped.len(), 3);
        assert_eq!(wrapped[2], "x");
    }
}
