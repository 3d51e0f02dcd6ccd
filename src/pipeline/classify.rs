//! Content-type classification by magic-byte signature.

use crate::error::TraversalError;
use std::io::Read;
use tracing::debug;

/// Leading bytes inspected. Covers every signature `infer` knows, including
/// container formats whose marker sits a few KiB in.
pub const SNIFF_LEN: u64 = 8192;

/// A classified content type.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ContentType {
    /// Canonical short name, e.g. `pdf`, `tif`, `png`.
    pub name: String,
    pub mime: String,
}

impl ContentType {
    pub fn is_pdf(&self) -> bool {
        self.mime == "application/pdf"
    }
}

/// Byte stream → content type.
pub trait Classifier: Send + Sync {
    /// Inspect the start of `reader`. Implementations must not require the
    /// whole stream.
    fn classify(&self, reader: &mut dyn Read) -> Result<ContentType, TraversalError>;
}

/// Classifier backed by the `infer` signature table.
#[derive(Debug, Default, Clone, Copy)]
pub struct SignatureClassifier;

impl Classifier for SignatureClassifier {
    fn classify(&self, reader: &mut dyn Read) -> Result<ContentType, TraversalError> {
        let mut head = Vec::with_capacity(SNIFF_LEN as usize);
        reader
            .take(SNIFF_LEN)
            .read_to_end(&mut head)
            .map_err(|e| TraversalError::Classification(e.to_string()))?;

        let kind = infer::get(&head).ok_or_else(|| {
            TraversalError::Classification(format!(
                "no signature matched the first {} bytes",
                head.len()
            ))
        })?;
        debug!("Classified as {} ({})", kind.extension(), kind.mime_type());
        Ok(ContentType {
            name: kind.extension().to_string(),
            mime: kind.mime_type().to_string(),
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::io::Cursor;

    struct CountingReader<R> {
        inner: R,
        consumed: usize,
    }

    impl<R: Read> Read for CountingReader<R> {
        fn read(&mut self, buf: &mut [u8]) -> std::io::Result<usize> {
            let n = self.inner.read(buf)?;
            self.consumed += n;
            Ok(n)
        }
    }

    #[test]
    fn detects_pdf() {
        let bytes = b"%PDF-1.7\n%\xE2\xE3\xCF\xD3\n1 0 obj\n".to_vec();
        let ct = SignatureClassifier.classify(&mut Cursor::new(bytes)).unwrap();
        assert_eq!(ct.mime, "application/pdf");
        assert!(ct.is_pdf());
    }

    #[test]
    fn detects_png() {
        let bytes = [0x89, b'P', b'N', b'G', 0x0D, 0x0A, 0x1A, 0x0A, 0, 0, 0, 0x0D];
        let ct = SignatureClassifier
            .classify(&mut Cursor::new(bytes.to_vec()))
            .unwrap();
        assert_eq!(ct.mime, "image/png");
        assert!(!ct.is_pdf());
    }

    #[test]
    fn unknown_signature_is_classification_error() {
        let err = SignatureClassifier
            .classify(&mut Cursor::new(b"just some words".to_vec()))
            .unwrap_err();
        assert!(matches!(err, TraversalError::Classification(_)));
        assert!(!err.is_fatal());
    }

    #[test]
    fn reads_only_a_prefix() {
        let mut bytes = b"%PDF-1.4\n".to_vec();
        bytes.resize(1 << 20, b'x');
        let mut reader = CountingReader {
            inner: Cursor::new(bytes),
            consumed: 0,
        };
        SignatureClassifier.classify(&mut reader).unwrap();
        assert!(reader.consumed as u64 <= SNIFF_LEN);
    }
}
