//! Inbound sources of report batches.
//!
//! Every source reads [`ReportBatch`] values from somewhere (an async byte
//! stream, an in-process channel, a TCP listener) and files them into the
//! aggregator through an [`IngestHandle`]. Sources are best effort:
//! malformed input is logged, counted and skipped, never fatal.
//!
//! [`IngestHandle`]: diagwatch_core::IngestHandle

mod channel;
mod listener;
mod stream;

pub use channel::ChannelSource;
pub use listener::ListenerSource;
pub use stream::StreamSource;

use std::fmt::Debug;
use std::sync::Arc;

use diagwatch_core::{IngestHandle, IngestSummary, ReportBatch};
use parking_lot::Mutex;
use tracing::{debug, warn};

/// A running inbound source.
///
/// # Example
///
/// ```
/// use diagwatch::{ChannelSource, ReportSource};
/// use diagwatch_core::{transport::LatchedTopic, Aggregator};
///
/// # tokio_test::block_on(async {
/// let aggregator = Aggregator::builder()
///     .transport(LatchedTopic::new("agg", 10))
///     .build()
///     .unwrap();
/// let (_tx, source) = ChannelSource::create("in-process", aggregator.ingest_handle());
/// println!("{}: {:?}", source.description(), source.stats());
/// # });
/// ```
pub trait ReportSource: Send + Debug {
    /// Human-readable description, used in logs.
    fn description(&self) -> &str;

    /// Counters accumulated by this source so far.
    fn stats(&self) -> SourceStats;

    /// The most recent read or parse error, if any.
    fn last_error(&self) -> Option<String>;

    /// Whether the source has stopped reading.
    fn is_finished(&self) -> bool;
}

/// Per-source counters.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct SourceStats {
    /// Batches decoded and handed to the aggregator.
    pub batches: u64,
    /// Lines or messages that could not be decoded.
    pub malformed: u64,
    /// Status-level tally over all decoded batches.
    pub statuses: IngestSummary,
}

/// State shared between a source and its background task.
#[derive(Debug, Default)]
pub(crate) struct Shared {
    stats: SourceStats,
    last_error: Option<String>,
}

pub(crate) type SharedState = Arc<Mutex<Shared>>;

/// Ingest one decoded batch, updating the shared counters.
pub(crate) fn ingest(handle: &IngestHandle, shared: &SharedState, source: &str, batch: ReportBatch) {
    let namespace = batch.namespace.clone();
    let summary = handle.ingest_batch(batch);
    debug!(
        source,
        namespace = namespace.as_deref().unwrap_or("/"),
        accepted = summary.accepted,
        rejected = summary.rejected,
        "ingested batch"
    );

    let mut shared = shared.lock();
    shared.stats.batches += 1;
    shared.stats.statuses += summary;
}

/// Decode one NDJSON line and ingest it. Blank lines are ignored.
pub(crate) fn ingest_line(handle: &IngestHandle, shared: &SharedState, source: &str, line: &[u8]) {
    if line.iter().all(u8::is_ascii_whitespace) {
        return;
    }
    ingest_bytes(handle, shared, source, line);
}

/// Decode one JSON-encoded batch and ingest it.
pub(crate) fn ingest_bytes(handle: &IngestHandle, shared: &SharedState, source: &str, bytes: &[u8]) {
    match serde_json::from_slice::<ReportBatch>(bytes) {
        Ok(batch) => {
            ingest(handle, shared, source, batch);
            shared.lock().last_error = None;
        }
        Err(e) => {
            warn!(source, error = %e, "skipping malformed report batch");
            skip_malformed(shared, format!("Parse error: {}", e));
        }
    }
}

/// Count an input that could not be ingested and keep reading.
pub(crate) fn skip_malformed(shared: &SharedState, error: String) {
    let mut shared = shared.lock();
    shared.stats.malformed += 1;
    shared.last_error = Some(error);
}

pub(crate) fn set_error(shared: &SharedState, error: String) {
    shared.lock().last_error = Some(error);
}

pub(crate) fn snapshot_of(shared: &SharedState) -> (SourceStats, Option<String>) {
    let shared = shared.lock();
    (shared.stats.clone(), shared.last_error.clone())
}
