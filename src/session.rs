//! Transport sessions: how documents enter and leave a traversal.
//!
//! A [`Session`] owns intake, derivation and the terminal operations
//! (`commit` to a channel, `discard`). Processors never touch a transport
//! directly; they go through [`crate::router::ArtifactRouter`], which keeps
//! the routing ledger balanced.

use crate::document::{Channel, Document};
use crate::error::{RoutingError, TessflowError};
use std::collections::VecDeque;
use std::io::Write;
use std::path::{Path, PathBuf};
use tracing::{debug, info, warn};

/// The unit-of-work transport for one traversal.
pub trait Session: Send {
    /// Next document waiting for processing.
    fn intake(&mut self) -> Option<Document>;

    /// Create an empty artifact derived from `source`.
    fn derive(&mut self, source: &Document) -> Document {
        Document::child_of(source)
    }

    /// Terminally route `doc` to `channel`. On error the caller still holds
    /// the document and may route it elsewhere.
    fn commit(&mut self, channel: Channel, doc: &Document) -> Result<(), RoutingError>;

    /// Drop artifacts that will never be routed.
    fn discard(&mut self, docs: &[Document]) -> Result<(), RoutingError>;
}

/// In-memory transport for tests and embedders.
#[derive(Debug, Default)]
pub struct MemorySession {
    queue: VecDeque<Document>,
    committed: Vec<(Channel, Document)>,
    discarded: Vec<Document>,
    failing: Option<Channel>,
}

impl MemorySession {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with_documents(docs: impl IntoIterator<Item = Document>) -> Self {
        Self {
            queue: docs.into_iter().collect(),
            ..Self::default()
        }
    }

    /// Refuse every commit to `channel`.
    pub fn failing_on(mut self, channel: Channel) -> Self {
        self.failing = Some(channel);
        self
    }

    pub fn push(&mut self, doc: Document) {
        self.queue.push_back(doc);
    }

    pub fn committed(&self) -> &[(Channel, Document)] {
        &self.committed
    }

    pub fn committed_to(&self, channel: Channel) -> Vec<&Document> {
        self.committed
            .iter()
            .filter(|(c, _)| *c == channel)
            .map(|(_, d)| d)
            .collect()
    }

    pub fn discarded(&self) -> &[Document] {
        &self.discarded
    }
}

impl Session for MemorySession {
    fn intake(&mut self) -> Option<Document> {
        self.queue.pop_front()
    }

    fn commit(&mut self, channel: Channel, doc: &Document) -> Result<(), RoutingError> {
        if self.failing == Some(channel) {
            return Err(RoutingError {
                channel: channel.to_string(),
                document: doc.id(),
                reason: "channel refuses commits".into(),
            });
        }
        debug!("Committed {} to {}", doc.id(), channel);
        self.committed.push((channel, doc.clone()));
        Ok(())
    }

    fn discard(&mut self, docs: &[Document]) -> Result<(), RoutingError> {
        self.discarded.extend_from_slice(docs);
        Ok(())
    }
}

/// Filesystem transport: committed documents land in `<out>/<channel>/`.
///
/// Each document is written atomically (temp file + rename) next to a
/// `<filename>.attributes.json` sidecar holding its attribute map.
#[derive(Debug)]
pub struct DirectorySession {
    out_dir: PathBuf,
    queue: VecDeque<Document>,
    written: Vec<PathBuf>,
}

impl DirectorySession {
    pub fn new(out_dir: impl Into<PathBuf>) -> Self {
        Self {
            out_dir: out_dir.into(),
            queue: VecDeque::new(),
            written: Vec::new(),
        }
    }

    /// Create the channel directories up front so permission problems
    /// surface before any document is processed.
    pub fn prepare(out_dir: &Path) -> Result<(), TessflowError> {
        for channel in Channel::ALL {
            let dir = out_dir.join(channel.as_str());
            std::fs::create_dir_all(&dir)
                .map_err(|source| TessflowError::OutputWriteFailed { path: dir, source })?;
        }
        Ok(())
    }

    pub fn push(&mut self, doc: Document) {
        self.queue.push_back(doc);
    }

    /// Paths of every document file written so far.
    pub fn written(&self) -> &[PathBuf] {
        &self.written
    }

    fn file_name(doc: &Document) -> String {
        Path::new(doc.filename())
            .file_name()
            .map(|n| n.to_string_lossy().into_owned())
            .filter(|n| !n.trim().is_empty())
            .unwrap_or_else(|| doc.id().to_string())
    }

    fn write_atomic(dir: &Path, name: &str, bytes: &[u8]) -> std::io::Result<PathBuf> {
        let target = dir.join(name);
        let mut tmp = tempfile::NamedTempFile::new_in(dir)?;
        tmp.write_all(bytes)?;
        tmp.flush()?;
        tmp.persist(&target).map_err(|e| e.error)?;
        Ok(target)
    }
}

impl Session for DirectorySession {
    fn intake(&mut self) -> Option<Document> {
        self.queue.pop_front()
    }

    fn commit(&mut self, channel: Channel, doc: &Document) -> Result<(), RoutingError> {
        let fail = |reason: String| RoutingError {
            channel: channel.to_string(),
            document: doc.id(),
            reason,
        };
        let dir = self.out_dir.join(channel.as_str());
        std::fs::create_dir_all(&dir).map_err(|e| fail(format!("{}: {e}", dir.display())))?;

        let name = Self::file_name(doc);
        let sidecar = serde_json::to_vec_pretty(doc.attributes())
            .map_err(|e| fail(format!("attributes: {e}")))?;
        let path = Self::write_atomic(&dir, &name, doc.content())
            .map_err(|e| fail(format!("{name}: {e}")))?;
        // A refused commit must leave nothing behind in the channel.
        if let Err(e) = Self::write_atomic(&dir, &format!("{name}.attributes.json"), &sidecar) {
            if let Err(rm) = std::fs::remove_file(&path) {
                warn!("Could not remove {}: {rm}", path.display());
            }
            return Err(fail(format!("{name}.attributes.json: {e}")));
        }

        info!("Wrote {} ({} bytes)", path.display(), doc.content().len());
        self.written.push(path);
        Ok(())
    }

    fn discard(&mut self, docs: &[Document]) -> Result<(), RoutingError> {
        for doc in docs {
            debug!("Discarded {} ({})", doc.id(), doc.filename());
        }
        Ok(())
    }
}
