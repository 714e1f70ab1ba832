//! The stateful publisher: build, compare, publish only on change.
//!
//! One evaluation cycle runs synchronously:
//!
//! ```text
//! IDLE ─▶ EVALUATING ─┬─▶ UNCHANGED ─────────────────────────▶ IDLE
//!                     └─▶ CHANGED ─▶ PUBLISHING ─┬─ ok ──▶ IDLE (state replaced)
//!                                                └─ err ─▶ IDLE (state kept, retried next cycle)
//! ```
//!
//! Because the cycle never yields, a snapshot is either fully built and
//! compared or not built at all; there is nothing partial to publish.

use std::sync::Arc;

use diagwatch_types::Snapshot;
use tokio::time::Instant;
use tracing::{debug, info, trace, warn};

use crate::change;
use crate::error::PublishError;
use crate::snapshot;
use crate::transport::Transport;
use crate::tree::AggregationTree;

/// What has been announced so far.
///
/// Only the publisher mutates this, and only right after a successful
/// publish, replacing both fields together.
#[derive(Debug, Default)]
pub struct PublishedState {
    last_snapshot: Option<Arc<Snapshot>>,
    last_publish: Option<Instant>,
}

impl PublishedState {
    pub fn last_snapshot(&self) -> Option<&Arc<Snapshot>> {
        self.last_snapshot.as_ref()
    }

    pub fn last_publish(&self) -> Option<Instant> {
        self.last_publish
    }

    fn replace(&mut self, snapshot: Arc<Snapshot>, at: Instant) {
        *self = Self {
            last_snapshot: Some(snapshot),
            last_publish: Some(at),
        };
    }
}

/// Running totals over all cycles.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct PublishStats {
    pub cycles: u64,
    pub published: u64,
    pub unchanged: u64,
    pub failed: u64,
}

/// Result of one evaluation cycle.
#[derive(Debug)]
pub enum CycleOutcome {
    /// Nothing changed semantically; nothing was sent.
    Unchanged,
    /// A changed snapshot was delivered.
    Published { sequence: u64 },
    /// A changed snapshot could not be delivered; it will be retried.
    Failed(PublishError),
}

impl CycleOutcome {
    pub fn is_published(&self) -> bool {
        matches!(self, CycleOutcome::Published { .. })
    }

    pub fn is_unchanged(&self) -> bool {
        matches!(self, CycleOutcome::Unchanged)
    }
}

/// Publishes snapshots through a transport, but only when they differ from
/// the last one that was successfully published.
#[derive(Debug)]
pub struct StatefulPublisher {
    transport: Box<dyn Transport>,
    state: PublishedState,
    stats: PublishStats,
    /// Set while the last attempt failed. A transport may have taken part of
    /// it, so the next cycle publishes even if the tree went back to `state`.
    pending_retry: bool,
}

impl StatefulPublisher {
    pub fn new(transport: impl Transport + 'static) -> Self {
        Self {
            transport: Box::new(transport),
            state: PublishedState::default(),
            stats: PublishStats::default(),
            pending_retry: false,
        }
    }

    pub fn state(&self) -> &PublishedState {
        &self.state
    }

    pub fn stats(&self) -> PublishStats {
        self.stats
    }

    pub fn transport(&self) -> &dyn Transport {
        self.transport.as_ref()
    }

    /// Run one full cycle against the tree.
    pub fn evaluate_and_maybe_publish(&mut self, tree: &AggregationTree, now: Instant) -> CycleOutcome {
        let sequence = self.stats.cycles + 1;
        let snapshot = snapshot::build(tree, now, sequence);
        self.offer(snapshot, now)
    }

    /// Compare an already built snapshot against the published state and
    /// publish it if it differs. Counts as one cycle.
    pub fn offer(&mut self, snapshot: Snapshot, now: Instant) -> CycleOutcome {
        self.stats.cycles += 1;
        let sequence = snapshot.sequence;

        match change::first_difference(&snapshot, self.state.last_snapshot.as_deref()) {
            Some(difference) => debug!(sequence, ?difference, "snapshot changed"),
            None if self.pending_retry => {
                debug!(sequence, "snapshot back to last published after a failed publish, re-announcing")
            }
            None => {
                self.stats.unchanged += 1;
                trace!(sequence, "snapshot unchanged, not publishing");
                return CycleOutcome::Unchanged;
            }
        }

        let snapshot = Arc::new(snapshot);
        match self.transport.publish(snapshot.clone()) {
            Ok(()) => {
                info!(
                    sequence,
                    level = %snapshot.level(),
                    nodes = snapshot.len(),
                    reports = snapshot.report_count(),
                    "published aggregated snapshot"
                );
                self.state.replace(snapshot, now);
                self.stats.published += 1;
                self.pending_retry = false;
                CycleOutcome::Published { sequence }
            }
            Err(e) => {
                warn!(
                    sequence,
                    transport = self.transport.description(),
                    error = %e,
                    "publish failed, will retry next cycle"
                );
                self.stats.failed += 1;
                self.pending_retry = true;
                CycleOutcome::Failed(e)
            }
        }
    }
}
