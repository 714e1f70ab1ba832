//! Stream-based report source.
//!
//! Reads newline-delimited JSON report batches from an async byte stream:
//! stdin, a TCP connection, or anything else implementing `AsyncRead`.

use std::io;

use diagwatch_core::IngestHandle;
use tokio::io::{AsyncBufRead, AsyncBufReadExt, AsyncRead, AsyncReadExt, BufReader};
use tokio::sync::mpsc;
use tokio::task::JoinHandle;
use tracing::{debug, warn};

use super::{
    ingest_bytes, ingest_line, set_error, skip_malformed, snapshot_of, ReportSource, SharedState,
    SourceStats,
};

/// Longest accepted line. Longer lines are discarded up to the next newline.
pub const MAX_LINE_BYTES: usize = 1024 * 1024;

/// A source that files report batches read from an async stream.
///
/// Spawns a background task that reads one JSON `ReportBatch` per line and
/// ingests it. Lines that fail to parse, are not UTF-8 or exceed
/// [`MAX_LINE_BYTES`] are skipped.
///
/// # Example with a byte stream
///
/// ```
/// use std::io::Cursor;
/// use diagwatch::StreamSource;
/// use diagwatch_core::{transport::LatchedTopic, Aggregator};
///
/// # tokio_test::block_on(async {
/// let aggregator = Aggregator::builder()
///     .transport(LatchedTopic::new("agg", 10))
///     .build()
///     .unwrap();
/// let data = br#"{"namespace":"/robot","statuses":[{"name":"battery","level":0}]}
/// "#;
/// let source = StreamSource::spawn(Cursor::new(data.to_vec()), "example", aggregator.ingest_handle());
/// source.join().await;
/// assert_eq!(aggregator.ingest_stats().accepted, 1);
/// # });
/// ```
#[derive(Debug)]
pub struct StreamSource {
    description: String,
    shared: SharedState,
    task: JoinHandle<()>,
}

impl StreamSource {
    /// Spawn a background task that reads from the given async reader.
    pub fn spawn<R>(reader: R, description: &str, handle: IngestHandle) -> Self
    where
        R: AsyncRead + Unpin + Send + 'static,
    {
        let shared = SharedState::default();
        let task_shared = shared.clone();
        let description = format!("stream: {}", description);
        let task_description = description.clone();

        let task = tokio::spawn(async move {
            read_lines(reader, &handle, &task_shared, &task_description).await;
        });

        Self {
            description,
            shared,
            task,
        }
    }

    /// Create a source fed with raw JSON-encoded batches, one per message.
    ///
    /// Useful for bridging from a message bus that already frames messages.
    pub fn from_bytes_channel(
        mut rx: mpsc::Receiver<Vec<u8>>,
        description: &str,
        handle: IngestHandle,
    ) -> Self {
        let shared = SharedState::default();
        let task_shared = shared.clone();
        let description = format!("stream: {}", description);
        let task_description = description.clone();

        let task = tokio::spawn(async move {
            while let Some(bytes) = rx.recv().await {
                ingest_bytes(&handle, &task_shared, &task_description, &bytes);
            }
            debug!(source = %task_description, "all senders dropped");
        });

        Self {
            description,
            shared,
            task,
        }
    }

    /// Wait until the stream is exhausted.
    pub async fn join(self) {
        let _ = self.task.await;
    }

    /// Stop reading immediately.
    pub fn abort(&self) {
        self.task.abort();
    }

    pub(crate) fn shared(&self) -> SharedState {
        self.shared.clone()
    }
}

/// Read NDJSON batches until EOF or a read error.
pub(crate) async fn read_lines<R>(reader: R, handle: &IngestHandle, shared: &SharedState, source: &str)
where
    R: AsyncRead + Unpin,
{
    read_lines_limited(reader, MAX_LINE_BYTES, handle, shared, source).await
}

async fn read_lines_limited<R>(
    reader: R,
    limit: usize,
    handle: &IngestHandle,
    shared: &SharedState,
    source: &str,
) where
    R: AsyncRead + Unpin,
{
    let mut reader = BufReader::new(reader);
    let mut line = Vec::new();

    loop {
        line.clear();
        let read = (&mut reader)
            .take(limit as u64 + 1)
            .read_until(b'\n', &mut line)
            .await;
        match read {
            Ok(0) => {
                debug!(source, "stream closed");
                set_error(shared, "Connection closed".to_string());
                break;
            }
            Ok(_) if line.len() > limit && line.last() != Some(&b'\n') => {
                warn!(source, limit, "line too long, skipping");
                skip_malformed(shared, format!("Line longer than {} bytes", limit));
                if let Err(e) = discard_line(&mut reader).await {
                    warn!(source, error = %e, "read failed, closing source");
                    set_error(shared, format!("Read error: {}", e));
                    break;
                }
            }
            Ok(_) => ingest_line(handle, shared, source, &line),
            Err(e) => {
                warn!(source, error = %e, "read failed, closing source");
                set_error(shared, format!("Read error: {}", e));
                break;
            }
        }
    }
}

/// Consume input up to and including the next newline.
async fn discard_line<R>(reader: &mut R) -> io::Result<()>
where
    R: AsyncBufRead + Unpin,
{
    loop {
        let buf = reader.fill_buf().await?;
        if buf.is_empty() {
            return Ok(());
        }
        match buf.iter().position(|&b| b == b'\n') {
            Some(end) => {
                reader.consume(end + 1);
                return Ok(());
            }
            None => {
                let len = buf.len();
                reader.consume(len);
            }
        }
    }
}

impl ReportSource for StreamSource {
    fn description(&self) -> &str {
        &self.description
    }

    fn stats(&self) -> SourceStats {
        snapshot_of(&self.shared).0
    }

    fn last_error(&self) -> Option<String> {
        snapshot_of(&self.shared).1
    }

    fn is_finished(&self) -> bool {
        self.task.is_finished()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use diagwatch_core::transport::LatchedTopic;
    use diagwatch_core::{Aggregator, Level};
    use std::io::Cursor;

    fn aggregator() -> Aggregator {
        Aggregator::builder()
            .transport(LatchedTopic::new("agg", 10))
            .build()
            .unwrap()
    }

    fn sample_json(namespace: &str, level: u8) -> String {
        format!(
            r#"{{"namespace":"{}","statuses":[{{"name":"primary","level":{},"message":"ok"}}]}}"#,
            namespace, level
        )
    }

    #[tokio::test]
    async fn test_stream_source_ingests_lines() {
        let mut aggregator = aggregator();
        let data = format!("{}\n{}\n", sample_json("/root", 0), sample_json("/other", 1));
        let source = StreamSource::spawn(Cursor::new(data), "test", aggregator.ingest_handle());
        let shared = source.shared();
        source.join().await;

        assert_eq!(snapshot_of(&shared).0.batches, 2);
        aggregator.evaluate();
        assert_eq!(aggregator.tree().report_count(), 2);
        assert_eq!(
            aggregator.published().last_snapshot().map(|s| s.level()),
            Some(Level::Warn)
        );
    }

    #[tokio::test]
    async fn test_stream_source_skips_invalid_json() {
        let aggregator = aggregator();
        let data = format!("not valid json\n\n{}\n", sample_json("/root", 2));
        let source = StreamSource::spawn(Cursor::new(data), "test", aggregator.ingest_handle());
        let shared = source.shared();
        source.join().await;

        let stats = snapshot_of(&shared).0;
        assert_eq!(stats.malformed, 1);
        assert_eq!(stats.batches, 1);
        assert_eq!(aggregator.ingest_stats().accepted, 1);
    }

    #[tokio::test]
    async fn test_stream_source_survives_non_utf8_line() {
        let aggregator = aggregator();
        let mut data = b"\xff\xfe garbage\n".to_vec();
        data.extend_from_slice(sample_json("/root", 1).as_bytes());
        data.push(b'\n');
        let source = StreamSource::spawn(Cursor::new(data), "test", aggregator.ingest_handle());
        let shared = source.shared();
        source.join().await;

        let stats = snapshot_of(&shared).0;
        assert_eq!(stats.malformed, 1);
        assert_eq!(stats.batches, 1);
        assert_eq!(aggregator.ingest_stats().accepted, 1);
    }

    #[tokio::test]
    async fn test_overlong_line_is_skipped() {
        let aggregator = aggregator();
        let handle = aggregator.ingest_handle();
        let shared = SharedState::default();
        let valid = sample_json("/root", 0);
        let data = format!("{}\n{}\n", "x".repeat(valid.len() * 3), valid);

        read_lines_limited(Cursor::new(data), valid.len() + 1, &handle, &shared, "test").await;

        let (stats, last_error) = snapshot_of(&shared);
        assert_eq!(stats.malformed, 1);
        assert_eq!(stats.batches, 1);
        assert_eq!(last_error.as_deref(), Some("Connection closed"));
        assert_eq!(aggregator.ingest_stats().accepted, 1);
    }

    #[tokio::test]
    async fn test_stream_source_counts_rejected_statuses() {
        let aggregator = aggregator();
        let data = r#"{"statuses":[{"name":"a","level":9},{"name":"b","level":0}]}"#;
        let source = StreamSource::spawn(Cursor::new(data), "test", aggregator.ingest_handle());
        let shared = source.shared();
        source.join().await;

        let stats = snapshot_of(&shared).0;
        assert_eq!(stats.statuses.accepted, 1);
        assert_eq!(stats.statuses.rejected, 1);
    }

    #[tokio::test]
    async fn test_stream_source_description_and_close() {
        let aggregator = aggregator();
        let source = StreamSource::spawn(
            Cursor::new(""),
            "tcp://localhost:7400",
            aggregator.ingest_handle(),
        );
        assert_eq!(source.description(), "stream: tcp://localhost:7400");

        tokio::time::sleep(tokio::time::Duration::from_millis(50)).await;
        assert!(source.is_finished());
        assert_eq!(source.last_error().as_deref(), Some("Connection closed"));
    }

    #[tokio::test]
    async fn test_stream_source_from_bytes_channel() {
        let aggregator = aggregator();
        let (tx, rx) = mpsc::channel::<Vec<u8>>(16);
        let source = StreamSource::from_bytes_channel(rx, "bus", aggregator.ingest_handle());

        tx.send(sample_json("/bus", 0).into_bytes()).await.unwrap();
        tx.send(b"{broken".to_vec()).await.unwrap();
        drop(tx);

        let shared = source.shared();
        source.join().await;
        let (stats, error) = snapshot_of(&shared);
        assert_eq!(stats.batches, 1);
        assert_eq!(stats.malformed, 1);
        assert!(error.unwrap().starts_with("Parse error"));
    }
}
