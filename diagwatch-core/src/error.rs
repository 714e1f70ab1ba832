//! Error types for the aggregator.

use thiserror::Error;

/// Why a single status was refused at ingest.
///
/// Refused statuses are dropped and logged; they never reach the tree.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum IngestError {
    /// The status had no name (or only whitespace).
    #[error("status name is empty")]
    EmptyName,

    /// The level byte is not one of OK(0), WARN(1), ERROR(2), STALE(3).
    #[error("unrecognized severity level {0}")]
    UnknownLevel(u8),
}

/// Errors a transport can report when publishing a snapshot.
///
/// None of these are fatal: the publisher keeps its last published state and
/// tries again on the next evaluation cycle.
#[derive(Debug, Error)]
pub enum PublishError {
    /// The transport has been shut down.
    #[error("transport {0} is closed")]
    Closed(String),

    /// The transport is temporarily unable to accept messages.
    #[error("transport unavailable: {0}")]
    Unavailable(String),

    /// Writing the snapshot failed.
    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),

    /// The snapshot could not be encoded.
    #[error("failed to serialize snapshot: {0}")]
    Serialize(#[from] serde_json::Error),
}

/// Invalid aggregator configuration.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum ConfigError {
    #[error("evaluation period must be greater than zero")]
    ZeroPeriod,

    #[error("staleness timeout must be greater than zero")]
    ZeroStaleness,

    #[error("history depth must be at least 1")]
    ZeroDepth,

    #[error("no transport configured")]
    NoTransport,

    #[error("stale eviction ({eviction:?}) must not be shorter than the staleness timeout ({staleness:?})")]
    EvictionBeforeStale {
        eviction: std::time::Duration,
        staleness: std::time::Duration,
    },
}
