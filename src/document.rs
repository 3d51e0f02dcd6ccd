//! The unit of work flowing through a processor.
//!
//! A [`Document`] carries a stable identifier, its bytes and a string
//! attribute map. Core keys (`uuid`, `filename`, `mime.type`) live in the same
//! map as lineage keys so a transport can persist the whole map verbatim.

use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;
use std::fmt;
use std::io::Cursor;
use tracing::debug;
use uuid::Uuid;

/// Attribute keys written by the processors.
///
/// The names match the attribute surface of the original OCR flow so
/// downstream consumers keyed on them keep working.
pub mod attrs {
    pub const UUID: &str = "uuid";
    pub const FILENAME: &str = "filename";
    pub const MIME_TYPE: &str = "mime.type";

    // OCR
    pub const SOURCE_FILENAME: &str = "file.source.filename";
    pub const SOURCE_MIME_TYPE: &str = "file.source.mime.type";
    pub const SOURCE_UUID: &str = "file.source.uuid";
    pub const SOURCE_FORMAT: &str = "file.source.format";
    pub const SOURCE_PAGE_COUNT: &str = "file.source.page.count";
    pub const OUTPUT_LANGUAGE: &str = "output.language";
    pub const OUTPUT_OCR_UUID: &str = "output.ocr.uuid";

    // Page split
    pub const SPLIT_SOURCE_FILENAME: &str = "file.source.split.filename";
    pub const SPLIT_SOURCE_UUID: &str = "file.source.split.uuid";
    pub const SPLIT_SOURCE_PAGE_COUNT: &str = "file.source.split.page.count";
    pub const SPLIT_PAGE: &str = "file.split.page";

    // TIFF conversion
    pub const TIFF_SOURCE_FILENAME: &str = "file.source.tiffconvert.filename";
    pub const TIFF_SOURCE_UUID: &str = "file.source.tiffconvert.uuid";
}

/// A named terminal destination. Every document is routed to exactly one.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Channel {
    /// Successful outputs.
    Files,
    /// The untouched source of a successful split or conversion.
    Original,
    /// Documents that could not be processed.
    Failure,
}

impl Channel {
    pub fn as_str(&self) -> &'static str {
        match self {
            Channel::Files => "files",
            Channel::Original => "original",
            Channel::Failure => "failure",
        }
    }

    pub const ALL: [Channel; 3] = [Channel::Files, Channel::Original, Channel::Failure];
}

impl fmt::Display for Channel {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// One unit of input or derived work.
#[derive(Clone, PartialEq, Serialize, Deserialize)]
pub struct Document {
    id: Uuid,
    #[serde(skip)]
    content: Vec<u8>,
    attributes: BTreeMap<String, String>,
}

impl fmt::Debug for Document {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Document")
            .field("id", &self.id)
            .field("filename", &self.filename())
            .field("content_len", &self.content.len())
            .field("attributes", &self.attributes.len())
            .finish()
    }
}

impl Document {
    /// Create a fresh document with a new identifier.
    pub fn new(filename: impl Into<String>, content: Vec<u8>) -> Self {
        Self::with_id(Uuid::new_v4(), filename, content)
    }

    /// Create a document with a caller-supplied identifier.
    pub fn with_id(id: Uuid, filename: impl Into<String>, content: Vec<u8>) -> Self {
        let mut attributes = BTreeMap::new();
        attributes.insert(attrs::UUID.to_string(), id.to_string());
        attributes.insert(attrs::FILENAME.to_string(), filename.into());
        Self {
            id,
            content,
            attributes,
        }
    }

    /// Derive an empty child: new identifier, parent's attributes inherited.
    pub fn child_of(parent: &Document) -> Self {
        let id = Uuid::new_v4();
        let mut attributes = parent.attributes.clone();
        attributes.insert(attrs::UUID.to_string(), id.to_string());
        Self {
            id,
            content: Vec::new(),
            attributes,
        }
    }

    pub fn id(&self) -> Uuid {
        self.id
    }

    pub fn filename(&self) -> &str {
        self.attribute(attrs::FILENAME).unwrap_or("")
    }

    pub fn mime_type(&self) -> Option<&str> {
        self.attribute(attrs::MIME_TYPE)
    }

    pub fn content(&self) -> &[u8] {
        &self.content
    }

    /// Stream over the content, for readers that consume only a prefix.
    pub fn reader(&self) -> Cursor<&[u8]> {
        Cursor::new(&self.content)
    }

    /// Replace the content.
    pub fn write_content(&mut self, bytes: Vec<u8>) {
        self.content = bytes;
    }

    pub fn attribute(&self, key: &str) -> Option<&str> {
        self.attributes.get(key).map(String::as_str)
    }

    pub fn attributes(&self) -> &BTreeMap<String, String> {
        &self.attributes
    }

    /// Set one attribute, last write wins. The `uuid` key is immutable.
    pub fn put_attribute(&mut self, key: impl Into<String>, value: impl Into<String>) {
        let key = key.into();
        if key == attrs::UUID {
            debug!("Ignoring attempt to overwrite uuid of {}", self.id);
            return;
        }
        self.attributes.insert(key, value.into());
    }

    pub fn put_attributes<K, V>(&mut self, entries: impl IntoIterator<Item = (K, V)>)
    where
        K: Into<String>,
        V: Into<String>,
    {
        for (k, v) in entries {
            self.put_attribute(k, v);
        }
    }
}

/// Split a filename into `(stem, extension)` on the last dot, trimmed.
///
/// Returns `None` when there is no dot.
pub fn file_infos(filename: &str) -> Option<(&str, &str)> {
    let (stem, ext) = filename.rsplit_once('.')?;
    Some((stem.trim(), ext.trim()))
}

/// Zero-padded 5-digit page index, e.g. `00007`.
pub fn page_index(index: usize) -> String {
    format!("{index:05}")
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn new_document_has_core_attributes() {
        let doc = Document::new("scan.tif", vec![1, 2, 3]);
        assert_eq!(doc.filename(), "scan.tif");
        assert_eq!(doc.attribute(attrs::UUID), Some(doc.id().to_string().as_str()));
        assert_eq!(doc.content(), &[1, 2, 3]);
        assert!(doc.mime_type().is_none());
    }

    #[test]
    fn child_inherits_attributes_with_new_id() {
        let mut parent = Document::new("a.pdf", b"%PDF".to_vec());
        parent.put_attribute("custom", "x");
        let child = Document::child_of(&parent);
        assert_ne!(child.id(), parent.id());
        assert_eq!(child.attribute("custom"), Some("x"));
        assert_eq!(child.filename(), "a.pdf");
        assert_eq!(child.attribute(attrs::UUID), Some(child.id().to_string().as_str()));
        assert!(child.content().is_empty());
    }

    #[test]
    fn uuid_attribute_is_immutable() {
        let mut doc = Document::new("a", vec![]);
        let id = doc.id();
        doc.put_attribute(attrs::UUID, "forged");
        assert_eq!(doc.attribute(attrs::UUID), Some(id.to_string().as_str()));
    }

    #[test]
    fn attributes_last_write_wins() {
        let mut doc = Document::new("a", vec![]);
        doc.put_attributes([("k", "1"), ("k", "2")]);
        assert_eq!(doc.attribute("k"), Some("2"));
    }

    #[test]
    fn file_infos_splits_on_last_dot() {
        assert_eq!(file_infos("report.v2.pdf"), Some(("report.v2", "pdf")));
        assert_eq!(file_infos("noext"), None);
        assert_eq!(file_infos(" scan .tif "), Some(("scan", "tif")));
    }

    #[test]
    fn page_index_is_zero_padded() {
        assert_eq!(page_index(1), "00001");
        assert_eq!(page_index(123), "00123");
    }
}
