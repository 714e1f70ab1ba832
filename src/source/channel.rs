//! Channel-based report source.
//!
//! Receives already-decoded report batches over a tokio mpsc channel, for
//! producers living in the same process.

use diagwatch_core::{IngestHandle, ReportBatch};
use tokio::sync::mpsc;
use tokio::task::JoinHandle;
use tracing::debug;

use super::{ingest, snapshot_of, ReportSource, SharedState, SourceStats};

/// Default queue capacity for [`ChannelSource::create`].
pub const DEFAULT_CAPACITY: usize = 64;

/// A source fed with [`ReportBatch`] values by in-process producers.
///
/// # Example
///
/// ```
/// use diagwatch::ChannelSource;
/// use diagwatch_core::{transport::LatchedTopic, Aggregator, Level, RawStatus, ReportBatch};
///
/// # tokio_test::block_on(async {
/// let aggregator = Aggregator::builder()
///     .transport(LatchedTopic::new("agg", 10))
///     .build()
///     .unwrap();
/// let (tx, source) = ChannelSource::create("planner", aggregator.ingest_handle());
///
/// tx.send(ReportBatch::new("/planner").status(RawStatus::new("costmap", Level::Ok)))
///     .await
///     .unwrap();
/// drop(tx);
/// source.join().await;
/// assert_eq!(aggregator.ingest_stats().accepted, 1);
/// # });
/// ```
#[derive(Debug)]
pub struct ChannelSource {
    description: String,
    shared: SharedState,
    task: JoinHandle<()>,
}

impl ChannelSource {
    /// Create a source draining the given receiver.
    pub fn new(mut rx: mpsc::Receiver<ReportBatch>, source_description: &str, handle: IngestHandle) -> Self {
        let shared = SharedState::default();
        let task_shared = shared.clone();
        let description = format!("channel: {}", source_description);
        let task_description = description.clone();

        let task = tokio::spawn(async move {
            while let Some(batch) = rx.recv().await {
                ingest(&handle, &task_shared, &task_description, batch);
            }
            debug!(source = %task_description, "all senders dropped");
        });

        Self {
            description,
            shared,
            task,
        }
    }

    /// Create a channel pair with [`DEFAULT_CAPACITY`].
    ///
    /// Returns (sender, source); producers clone the sender.
    pub fn create(source_description: &str, handle: IngestHandle) -> (mpsc::Sender<ReportBatch>, Self) {
        let (tx, rx) = mpsc::channel(DEFAULT_CAPACITY);
        (tx, Self::new(rx, source_description, handle))
    }

    /// Wait until every sender has been dropped and the queue is drained.
    pub async fn join(self) {
        let _ = self.task.await;
    }
}

impl ReportSource for ChannelSource {
    fn description(&self) -> &str {
        &self.description
    }

    fn stats(&self) -> SourceStats {
        snapshot_of(&self.shared).0
    }

    fn last_error(&self) -> Option<String> {
        // Batches arrive decoded; there is nothing to fail on.
        None
    }

    fn is_finished(&self) -> bool {
        self.task.is_finished()
    }
}
