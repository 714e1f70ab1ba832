//! # diagwatch
//!
//! A diagnostic aggregator service built on [`diagwatch_core`].
//!
//! Producers send status batches in; one health summary comes out, published
//! only when it changes and latched so late subscribers get it immediately.
//!
//! ## Architecture
//!
//! ```text
//! ┌──────────────────────────────────────────────────────────────────┐
//! │                          diagwatch                               │
//! │  ┌──────────────┐    ┌──────────────┐    ┌────────────────────┐  │
//! │  │   source     │───▶│  Aggregator  │───▶│  LatchedTopic      │  │
//! │  │ stdin / tcp  │    │ (tree, rollup│    │  ├─▶ serve (tcp)   │  │
//! │  │ channel      │    │  publisher)  │    │  └─▶ file sink     │  │
//! │  └──────────────┘    └──────────────┘    └────────────────────┘  │
//! └──────────────────────────────────────────────────────────────────┘
//! ```
//!
//! - **[`source`]**: inbound adapters ([`ReportSource`] trait) reading
//!   newline-delimited JSON report batches from streams, TCP or channels
//! - **[`serve`]**: outbound TCP server for latched snapshots
//! - **[`settings`]**: layered configuration (file, environment, flags)
//! - **[`logging`]**: `tracing` subscriber setup
//!
//! ## Usage
//!
//! ```bash
//! # Read batches from stdin, print nothing, keep the summary in a file
//! producer | diagwatch --stdin --output diagnostics_agg.json
//!
//! # Accept producers on :7400 and serve the summary on :7401
//! diagwatch --listen 0.0.0.0:7400 --serve 0.0.0.0:7401
//! ```
//!
//! ### As a library
//!
//! ```
//! use std::io::Cursor;
//! use diagwatch::StreamSource;
//! use diagwatch_core::{Aggregator, Level};
//!
//! # tokio_test::block_on(async {
//! let (mut aggregator, topic) = Aggregator::builder().build_latched("agg").unwrap();
//! let input = b"{\"namespace\":\"/robot\",\"statuses\":[{\"name\":\"battery\",\"level\":1}]}\n";
//! StreamSource::spawn(Cursor::new(input.to_vec()), "example", aggregator.ingest_handle())
//!     .join()
//!     .await;
//!
//! aggregator.evaluate();
//! assert_eq!(topic.latest().map(|s| s.level()), Some(Level::Warn));
//! # });
//! ```

pub mod duration;
pub mod logging;
pub mod serve;
pub mod settings;
pub mod source;

pub use serve::SnapshotServer;
pub use settings::Settings;
pub use source::{ChannelSource, ListenerSource, ReportSource, SourceStats, StreamSource};
