//! Scheduled reconciliation pipelines.
//!
//! certification: Idle -> SessionReady -> Scanning -> [Committing] -> Done
//! liveness:      Idle -> Scanning -> [Committing] -> Done
//!
//! Any state may fall to Failed. Entities are processed strictly one at a time
//! behind a `RateLimiter`; a failing entity is recorded and skipped.

pub mod certification;
pub mod liveness;

pub use certification::CertificationPipeline;
pub use liveness::LivenessPipeline;

use std::fmt;

use anyhow::{Context, Result};
use tracing::{debug, info};

use catalog_common::{RunLogRecord, UpdateProposal};

use crate::traits::ProposalStore;

// ---------------------------------------------------------------------------
// RunPhase
// ---------------------------------------------------------------------------

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum RunPhase {
    Idle,
    SessionReady,
    Scanning,
    Committing,
    Done,
    Failed,
}

impl RunPhase {
    pub fn can_advance_to(self, next: RunPhase) -> bool {
        use RunPhase::*;
        matches!(
            (self, next),
            (Idle, SessionReady)
                | (Idle, Scanning)
                | (SessionReady, Scanning)
                | (Scanning, Committing)
                | (Scanning, Done)
                | (Committing, Done)
        ) || (next == Failed && !matches!(self, Done | Failed))
    }
}

impl fmt::Display for RunPhase {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let s = match self {
            Self::Idle => "idle",
            Self::SessionReady => "session_ready",
            Self::Scanning => "scanning",
            Self::Committing => "committing",
            Self::Done => "done",
            Self::Failed => "failed",
        };
        f.write_str(s)
    }
}

/// Tracks the current phase of one run and logs each transition.
#[derive(Debug)]
pub(crate) struct PhaseTracker {
    scraper_name: &'static str,
    phase: RunPhase,
}

impl PhaseTracker {
    pub(crate) fn new(scraper_name: &'static str) -> Self {
        Self {
            scraper_name,
            phase: RunPhase::Idle,
        }
    }

    pub(crate) fn current(&self) -> RunPhase {
        self.phase
    }

    pub(crate) fn advance(&mut self, next: RunPhase) {
        debug_assert!(
            self.phase.can_advance_to(next),
            "illegal transition {} -> {}",
            self.phase,
            next
        );
        info!(scraper = self.scraper_name, from = %self.phase, to = %next, "Run phase transition");
        self.phase = next;
    }
}

// ---------------------------------------------------------------------------
// ProposalBuffer
// ---------------------------------------------------------------------------

/// Buffers proposals for a run and writes them in atomic batches.
///
/// With no batch size everything is written once after the scan; a run killed
/// mid-scan then loses every buffered proposal. With `Some(n)` the buffer is
/// flushed whenever it reaches `n`, bounding that loss.
pub(crate) struct ProposalBuffer {
    pending: Vec<UpdateProposal>,
    batch_size: Option<usize>,
    found: u32,
    committed: usize,
}

impl ProposalBuffer {
    pub(crate) fn new(batch_size: Option<usize>) -> Self {
        Self {
            pending: Vec::new(),
            batch_size: batch_size.filter(|n| *n > 0),
            found: 0,
            committed: 0,
        }
    }

    pub(crate) fn push(&mut self, proposal: UpdateProposal) {
        debug!(
            entity_id = %proposal.entity_id,
            field = %proposal.field,
            old = %proposal.old_value,
            new = %proposal.new_value,
            "Proposal buffered"
        );
        self.pending.push(proposal);
        self.found += 1;
    }

    pub(crate) fn has_pending(&self) -> bool {
        !self.pending.is_empty()
    }

    pub(crate) fn is_full(&self) -> bool {
        self.batch_size
            .is_some_and(|n| self.pending.len() >= n)
    }

    /// Total proposals produced this run, committed or not.
    pub(crate) fn found(&self) -> u32 {
        self.found
    }

    pub(crate) fn committed(&self) -> usize {
        self.committed
    }

    /// Write everything buffered as one batch. A no-op when empty.
    ///
    /// On failure the error names how many proposals earlier batches already wrote.
    pub(crate) async fn flush(&mut self, store: &dyn ProposalStore) -> Result<()> {
        if self.pending.is_empty() {
            return Ok(());
        }
        store.commit_batch(&self.pending).await.with_context(|| {
            format!(
                "batch of {} proposals not committed ({} committed earlier in this run)",
                self.pending.len(),
                self.committed
            )
        })?;
        self.committed += self.pending.len();
        info!(batch = self.pending.len(), committed = self.committed, "Proposal batch committed");
        self.pending.clear();
        Ok(())
    }
}

// ---------------------------------------------------------------------------
// RunReport
// ---------------------------------------------------------------------------

/// What a successful run hands back to its caller.
#[derive(Debug, Clone)]
pub struct RunReport {
    pub record: RunLogRecord,
    pub phase: RunPhase,
    pub committed: usize,
}

impl fmt::Display for RunReport {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{} phase={} committed={}", self.record, self.phase, self.committed)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::scoring::{propose, CERTIFICATION_POLICY, STATUS_FIELD};
    use crate::testing::MemoryStore;
    use catalog_common::CertificationStatus;

    fn proposal(entity_id: &str) -> UpdateProposal {
        propose(
            &CERTIFICATION_POLICY,
            entity_id,
            STATUS_FIELD,
            &CertificationStatus::NotCertified,
            &CertificationStatus::Certified,
        )
        .unwrap()
    }

    #[test]
    fn legal_transitions() {
        use RunPhase::*;
        assert!(Idle.can_advance_to(SessionReady));
        assert!(Idle.can_advance_to(Scanning));
        assert!(Scanning.can_advance_to(Done));
        assert!(Committing.can_advance_to(Failed));
        assert!(!Idle.can_advance_to(Committing));
        assert!(!Done.can_advance_to(Scanning));
        assert!(!Done.can_advance_to(Failed));
        assert!(!SessionReady.can_advance_to(Done));
    }

    #[tokio::test]
    async fn unbatched_buffer_never_reports_full() {
        let mut buffer = ProposalBuffer::new(None);
        for i in 0..100 {
            buffer.push(proposal(&format!("e{i}")));
        }
        assert!(!buffer.is_full());
        assert_eq!(buffer.found(), 100);
    }

    #[tokio::test]
    async fn flush_commits_and_clears() {
        let store = MemoryStore::new();
        let mut buffer = ProposalBuffer::new(Some(2));
        buffer.push(proposal("e1"));
        assert!(!buffer.is_full());
        buffer.push(proposal("e2"));
        assert!(buffer.is_full());

        buffer.flush(&store).await.unwrap();
        assert!(!buffer.has_pending());
        assert_eq!(buffer.committed(), 2);
        assert_eq!(store.proposals().len(), 2);

        // Empty flush does not touch the store.
        buffer.flush(&store).await.unwrap();
        assert_eq!(store.commit_calls(), 1);
    }

    #[tokio::test]
    async fn failed_flush_keeps_nothing() {
        let store = MemoryStore::new().failing_commits();
        let mut buffer = ProposalBuffer::new(None);
        buffer.push(proposal("e1"));
        buffer.push(proposal("e2"));

        assert!(buffer.flush(&store).await.is_err());
        assert!(store.proposals().is_empty());
        assert_eq!(buffer.committed(), 0);
    }
}
