//! Artifact routing with compensation.
//!
//! Every artifact a traversal derives is registered with the
//! [`ArtifactRouter`] and ends up either committed to exactly one channel or
//! discarded by rollback. The [`RoutingLedger`] records both sides so the
//! invariant can be checked after the fact:
//!
//! ```text
//! created = committed ∪ discarded      committed ∩ discarded = ∅
//! ```
//!
//! Rollback never raises. A transport error during rollback is logged and
//! recorded in the ledger, and the artifacts still count as discarded since
//! they will never reach a channel.

use crate::document::{Channel, Document};
use crate::error::RoutingError;
use crate::session::Session;
use serde::{Deserialize, Serialize};
use std::collections::HashSet;
use tracing::{debug, warn};
use uuid::Uuid;

/// What happened to the artifacts of one traversal, and to its source.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct RoutingLedger {
    pub created: Vec<Uuid>,
    pub committed: Vec<(Channel, Uuid)>,
    pub discarded: Vec<Uuid>,
    /// Channel the source document was routed to, if any commit succeeded.
    pub source_channel: Option<Channel>,
    /// Transport errors recorded along the way.
    pub errors: Vec<String>,
}

impl RoutingLedger {
    /// Created = committed ∪ discarded, with no artifact on both sides and
    /// none routed twice.
    pub fn is_balanced(&self) -> bool {
        let created: HashSet<Uuid> = self.created.iter().copied().collect();
        let committed: HashSet<Uuid> = self.committed.iter().map(|(_, id)| *id).collect();
        let discarded: HashSet<Uuid> = self.discarded.iter().copied().collect();

        created.len() == self.created.len()
            && committed.len() == self.committed.len()
            && discarded.len() == self.discarded.len()
            && committed.is_disjoint(&discarded)
            && committed.union(&discarded).copied().collect::<HashSet<_>>() == created
    }

    pub fn committed_to(&self, channel: Channel) -> impl Iterator<Item = Uuid> + '_ {
        self.committed
            .iter()
            .filter(move |(c, _)| *c == channel)
            .map(|(_, id)| *id)
    }
}

/// Routes the artifacts of one traversal through a [`Session`].
///
/// Artifacts still pending when the router is dropped are rolled back.
pub struct ArtifactRouter<'s> {
    session: &'s mut dyn Session,
    pending: Vec<Document>,
    ledger: RoutingLedger,
}

impl<'s> ArtifactRouter<'s> {
    pub fn new(session: &'s mut dyn Session) -> Self {
        Self {
            session,
            pending: Vec::new(),
            ledger: RoutingLedger::default(),
        }
    }

    /// Derive an empty artifact from `source` and register it as pending.
    pub fn derive(&mut self, source: &Document) -> &mut Document {
        let artifact = self.session.derive(source);
        self.ledger.created.push(artifact.id());
        let idx = self.pending.len();
        self.pending.push(artifact);
        &mut self.pending[idx]
    }

    /// Commit every pending artifact to `channel`, in creation order.
    ///
    /// On the first refused commit the refused artifact and every artifact
    /// after it are rolled back. Artifacts committed before the failure stay
    /// committed; a transport offers no way to take them back.
    pub fn commit_pending(&mut self, channel: Channel) -> Result<(), RoutingError> {
        let mut pending = std::mem::take(&mut self.pending).into_iter();
        while let Some(artifact) = pending.next() {
            match self.session.commit(channel, &artifact) {
                Ok(()) => {
                    debug!("Artifact {} → {}", artifact.id(), channel);
                    self.ledger.committed.push((channel, artifact.id()));
                }
                Err(e) => {
                    warn!("{e}; rolling back remaining artifacts");
                    self.ledger.errors.push(e.to_string());
                    self.pending = std::iter::once(artifact).chain(pending).collect();
                    self.rollback();
                    return Err(e);
                }
            }
        }
        Ok(())
    }

    /// Route the traversal's source document to `channel`.
    pub fn route_source(&mut self, channel: Channel, source: &Document) -> Result<(), RoutingError> {
        match self.session.commit(channel, source) {
            Ok(()) => {
                debug!("Source {} → {}", source.id(), channel);
                self.ledger.source_channel = Some(channel);
                Ok(())
            }
            Err(e) => {
                warn!("{e}");
                self.ledger.errors.push(e.to_string());
                Err(e)
            }
        }
    }

    /// Discard every pending artifact. Never fails.
    pub fn rollback(&mut self) {
        if self.pending.is_empty() {
            return;
        }
        let pending = std::mem::take(&mut self.pending);
        debug!("Rolling back {} artifact(s)", pending.len());
        if let Err(e) = self.session.discard(&pending) {
            warn!("Rollback failed: {e}");
            self.ledger.errors.push(format!("rollback: {e}"));
        }
        self.ledger
            .discarded
            .extend(pending.iter().map(Document::id));
    }

    /// Finish routing and return the ledger. Pending artifacts are rolled back.
    pub fn into_ledger(mut self) -> RoutingLedger {
        self.rollback();
        std::mem::take(&mut self.ledger)
    }
}

impl Drop for ArtifactRouter<'_> {
    fn drop(&mut self) {
        self.rollback();
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::session::MemorySession;

    struct BrokenDiscard(MemorySession);

    impl Session for BrokenDiscard {
        fn intake(&mut self) -> Option<Document> {
            self.0.intake()
        }
        fn commit(&mut self, channel: Channel, doc: &Document) -> Result<(), RoutingError> {
            self.0.commit(channel, doc)
        }
        fn discard(&mut self, docs: &[Document]) -> Result<(), RoutingError> {
            Err(RoutingError {
                channel: "discard".into(),
                document: docs[0].id(),
                reason: "transport gone".into(),
            })
        }
    }

    #[test]
    fn commit_pending_balances_ledger() {
        let mut session = MemorySession::new();
        let source = Document::new("a.pdf", b"%PDF".to_vec());
        let mut router = ArtifactRouter::new(&mut session);
        router.derive(&source).write_content(b"1".to_vec());
        router.derive(&source).write_content(b"2".to_vec());
        router.commit_pending(Channel::Files).unwrap();
        router.route_source(Channel::Original, &source).unwrap();
        let ledger = router.into_ledger();

        assert!(ledger.is_balanced());
        assert_eq!(ledger.committed.len(), 2);
        assert!(ledger.discarded.is_empty());
        assert_eq!(ledger.source_channel, Some(Channel::Original));
        assert_eq!(session.committed_to(Channel::Files).len(), 2);
    }

    #[test]
    fn rollback_discards_everything_pending() {
        let mut session = MemorySession::new();
        let source = Document::new("a.pdf", vec![]);
        let ledger = {
            let mut router = ArtifactRouter::new(&mut session);
            for _ in 0..3 {
                router.derive(&source);
            }
            router.rollback();
            router.into_ledger()
        };
        assert!(ledger.is_balanced());
        assert_eq!(ledger.discarded.len(), 3);
        assert!(session.committed().is_empty());
        assert_eq!(session.discarded().len(), 3);
    }

    #[test]
    fn refused_commit_rolls_back_remainder() {
        let mut session = MemorySession::new().failing_on(Channel::Files);
        let source = Document::new("a.pdf", vec![]);
        let mut router = ArtifactRouter::new(&mut session);
        router.derive(&source);
        router.derive(&source);
        assert!(router.commit_pending(Channel::Files).is_err());
        let ledger = router.into_ledger();

        assert!(ledger.is_balanced());
        assert!(ledger.committed.is_empty());
        assert_eq!(ledger.discarded.len(), 2);
        assert_eq!(ledger.errors.len(), 1);
    }

    #[test]
    fn failed_discard_is_recorded_not_raised() {
        let mut session = BrokenDiscard(MemorySession::new());
        let source = Document::new("a.pdf", vec![]);
        let mut router = ArtifactRouter::new(&mut session);
        router.derive(&source);
        router.rollback();
        let ledger = router.into_ledger();
        assert!(ledger.is_balanced());
        assert_eq!(ledger.discarded.len(), 1);
        assert!(ledger.errors[0].contains("transport gone"));
    }

    #[test]
    fn drop_rolls_back_pending() {
        let mut session = MemorySession::new();
        let source = Document::new("a.pdf", vec![]);
        {
            let mut router = ArtifactRouter::new(&mut session);
            router.derive(&source);
        }
        assert_eq!(session.discarded().len(), 1);
    }

    #[test]
    fn unbalanced_ledgers_detected() {
        let a = Uuid::new_v4();
        let both = RoutingLedger {
            created: vec![a],
            committed: vec![(Channel::Files, a)],
            discarded: vec![a],
            ..Default::default()
        };
        assert!(!both.is_balanced());

        let orphan = RoutingLedger {
            created: vec![a],
            ..Default::default()
        };
        assert!(!orphan.is_balanced());
    }
}
