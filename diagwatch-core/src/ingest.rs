//! Report ingest: validate incoming statuses and file them into the tree.

use std::ops::AddAssign;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;

use diagwatch_types::{current_timestamp_ms, Level, RawStatus, ReportBatch, StatusReport};
use tokio::sync::Notify;
use tokio::time::Instant;
use tracing::{debug, warn};

use crate::config::AggregatorConfig;
use crate::error::IngestError;
use crate::path;
use crate::tree::AggregationTree;

/// What happened to one accepted status.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum IngestOutcome {
    /// Filed as a new report at `path`.
    Inserted { path: String },
    /// Replaced an earlier report with the same name at `path`.
    Replaced { path: String },
    /// The namespace is excluded; the status was ignored.
    Excluded,
}

/// Per-batch tally.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct IngestSummary {
    pub accepted: usize,
    pub rejected: usize,
    pub excluded: usize,
}

impl AddAssign for IngestSummary {
    fn add_assign(&mut self, rhs: Self) {
        self.accepted += rhs.accepted;
        self.rejected += rhs.rejected;
        self.excluded += rhs.excluded;
    }
}

/// Lifetime counters shared by all handles of one aggregator.
#[derive(Debug, Default)]
pub struct IngestStats {
    pub accepted: AtomicU64,
    pub rejected: AtomicU64,
    pub excluded: AtomicU64,
}

impl IngestStats {
    pub fn summary(&self) -> IngestSummary {
        IngestSummary {
            accepted: self.accepted.load(Ordering::Relaxed) as usize,
            rejected: self.rejected.load(Ordering::Relaxed) as usize,
            excluded: self.excluded.load(Ordering::Relaxed) as usize,
        }
    }
}

/// Validate a raw status into a report.
///
/// The timestamp falls back to `default_timestamp_ms` when the status carries
/// none.
pub fn validate(raw: RawStatus, default_timestamp_ms: u64) -> Result<StatusReport, IngestError> {
    if raw.name.trim().is_empty() {
        return Err(IngestError::EmptyName);
    }
    let level = Level::from_wire(raw.level).ok_or(IngestError::UnknownLevel(raw.level))?;

    Ok(StatusReport {
        name: raw.name,
        level,
        message: raw.message,
        hardware_id: raw.hardware_id,
        values: raw.values,
        timestamp_ms: raw.timestamp_ms.unwrap_or(default_timestamp_ms),
    })
}

/// A handle producers use to submit statuses.
///
/// Obtain one from [`Aggregator::ingest_handle`](crate::Aggregator::ingest_handle).
/// Handles are cheap to clone and safe to use from any thread or task; they
/// only ever take the tree lock for the insert itself and never wait on
/// publication.
///
/// # Example
///
/// ```rust
/// use diagwatch_core::{Aggregator, Level, RawStatus, ReportBatch};
/// use diagwatch_core::transport::LatchedTopic;
///
/// let aggregator = Aggregator::builder()
///     .transport(LatchedTopic::new("agg", 10))
///     .build()
///     .unwrap();
/// let handle = aggregator.ingest_handle();
///
/// let summary = handle.ingest_batch(
///     ReportBatch::new("/robot/arm")
///         .status(RawStatus::new("joint-1", Level::Ok))
///         .status(RawStatus::with_wire_level("joint-2", 42)),
/// );
/// assert_eq!(summary.accepted, 1);
/// assert_eq!(summary.rejected, 1);
/// ```
#[derive(Clone)]
pub struct IngestHandle {
    pub(crate) tree: Arc<AggregationTree>,
    pub(crate) config: Arc<AggregatorConfig>,
    pub(crate) stats: Arc<IngestStats>,
    pub(crate) escalation: Arc<Notify>,
}

impl IngestHandle {
    /// Validate one status and file it under `namespace`.
    pub fn ingest(&self, namespace: &str, raw: RawStatus) -> Result<IngestOutcome, IngestError> {
        let tree_path = path::normalize(namespace);
        self.ingest_at(&tree_path, raw, current_timestamp_ms())
    }

    /// File every status of a batch. Never fails as a whole; bad statuses are
    /// counted as rejected and logged.
    pub fn ingest_batch(&self, batch: ReportBatch) -> IngestSummary {
        let tree_path = path::normalize(batch.namespace.as_deref().unwrap_or(path::ROOT));
        let default_ts = batch.timestamp_ms.unwrap_or_else(current_timestamp_ms);

        let mut summary = IngestSummary::default();
        for raw in batch.statuses {
            match self.ingest_at(&tree_path, raw, default_ts) {
                Ok(IngestOutcome::Excluded) => summary.excluded += 1,
                Ok(_) => summary.accepted += 1,
                Err(_) => summary.rejected += 1,
            }
        }
        summary
    }

    fn ingest_at(
        &self,
        tree_path: &str,
        raw: RawStatus,
        default_ts: u64,
    ) -> Result<IngestOutcome, IngestError> {
        if self.config.is_excluded(tree_path) {
            debug!(path = tree_path, name = %raw.name, "namespace excluded, ignoring status");
            self.stats.excluded.fetch_add(1, Ordering::Relaxed);
            return Ok(IngestOutcome::Excluded);
        }

        let name = raw.name.clone();
        let report = match validate(raw, default_ts) {
            Ok(report) => report,
            Err(e) => {
                warn!(path = tree_path, name = %name, error = %e, "dropping malformed status");
                self.stats.rejected.fetch_add(1, Ordering::Relaxed);
                return Err(e);
            }
        };

        let level = report.level;
        let filed = self.tree.update(tree_path, report, Instant::now());
        self.stats.accepted.fetch_add(1, Ordering::Relaxed);

        if self.config.publish_on_escalation
            && level.is_critical()
            && filed.previous.map_or(true, |previous| previous < level)
        {
            debug!(path = %filed.path, name = %name, %level, "escalation, waking evaluator");
            self.escalation.notify_one();
        }

        Ok(match filed.previous {
            Some(_) => {
                debug!(path = %filed.path, name = %name, "replacing report");
                IngestOutcome::Replaced { path: filed.path }
            }
            None => IngestOutcome::Inserted { path: filed.path },
        })
    }

    /// Lifetime counters for all handles of this aggregator.
    pub fn stats(&self) -> IngestSummary {
        self.stats.summary()
    }
}

impl std::fmt::Debug for IngestHandle {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("IngestHandle")
            .field("exclusions", &self.config.namespace_exclusions)
            .finish()
    }
}
