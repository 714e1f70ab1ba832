//! # diagwatch-core
//!
//! Aggregates diagnostic status reports from many producers into a
//! hierarchical health summary, and republishes that summary only when it
//! actually changes.
//!
//! ## Quick Start
//!
//! ```rust,no_run
//! use diagwatch_core::{Aggregator, Level, RawStatus, ReportBatch};
//!
//! #[tokio::main]
//! async fn main() {
//!     // A latched topic retains the last 10 summaries for late subscribers
//!     let (aggregator, topic) = Aggregator::builder()
//!         .build_latched("diagnostics_agg")
//!         .unwrap();
//!
//!     // Producers submit statuses through cheap, cloneable handles
//!     let handle = aggregator.ingest_handle();
//!     handle.ingest_batch(
//!         ReportBatch::new("/robot/drive")
//!             .status(RawStatus::new("left-motor", Level::Ok))
//!             .status(RawStatus::new("right-motor", Level::Warn).message("hot")),
//!     );
//!
//!     // Evaluate once per second in the background
//!     let driver = aggregator.start();
//!
//!     let mut subscription = topic.subscribe();
//!     if let Some(snapshot) = subscription.recv().await {
//!         println!("robot is {}", snapshot.level());
//!     }
//!
//!     driver.stop().await.unwrap();
//! }
//! ```
//!
//! ## How it fits together
//!
//! ```text
//!  producers ──ingest──▶ AggregationTree ◀──build── StatefulPublisher ──▶ Transport
//!  (IngestHandle)        (RwLock, rollup)          (driver task, only     (LatchedTopic,
//!                                                    on change)            file, fanout)
//! ```
//!
//! - **Roll-up**: a node's level is the max of its own reports and its
//!   children, with `Ok < Warn < Error < Stale`
//! - **Staleness**: reports older than the staleness timeout count as `Stale`
//! - **Change detection**: timestamps and sequence numbers are ignored
//! - **Latched delivery**: new subscribers get the retained summary at once

mod aggregator;
pub mod change;
pub mod config;
pub mod error;
pub mod ingest;
pub mod path;
pub mod publisher;
pub mod snapshot;
pub mod transport;
pub mod tree;

pub use aggregator::{Aggregator, AggregatorBuilder, DriverHandle};
pub use config::AggregatorConfig;
pub use error::{ConfigError, IngestError, PublishError};
pub use ingest::{IngestHandle, IngestOutcome, IngestSummary};
pub use publisher::{CycleOutcome, PublishStats, PublishedState, StatefulPublisher};

// Re-export types for convenience
pub use diagwatch_types::{
    KeyValue, Level, NodeStatus, RawStatus, ReportBatch, Snapshot, StatusReport,
};
