//! Snapshot - the aggregated health summary at one evaluation instant.

use alloc::string::String;
use alloc::vec::Vec;

use crate::{Level, StatusReport, SCHEMA_VERSION};

/// Schema version information embedded in snapshots.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
#[cfg_attr(feature = "serde", derive(serde::Serialize, serde::Deserialize))]
pub struct SchemaVersion {
    pub major: u32,
    pub minor: u32,
}

impl SchemaVersion {
    pub const fn current() -> Self {
        Self {
            major: SCHEMA_VERSION,
            minor: 0,
        }
    }

    /// Minor differences are compatible, major ones are not.
    pub fn is_compatible(&self) -> bool {
        self.major == SCHEMA_VERSION
    }
}

impl Default for SchemaVersion {
    fn default() -> Self {
        Self::current()
    }
}

/// One tree node as it appears in a snapshot.
///
/// `level` is the rolled-up level of the node. Reports carry their
/// *effective* level, so a report that went stale shows as `STALE` here even
/// though the stored report still says what the producer last sent.
#[derive(Debug, Clone, PartialEq, Eq)]
#[cfg_attr(feature = "serde", derive(serde::Serialize, serde::Deserialize))]
pub struct NodeStatus {
    pub path: String,
    pub level: Level,

    #[cfg_attr(feature = "serde", serde(default))]
    pub reports: Vec<StatusReport>,
}

impl NodeStatus {
    pub fn new(path: impl Into<String>, level: Level) -> Self {
        Self {
            path: path.into(),
            level,
            reports: Vec::new(),
        }
    }

    /// Find one of this node's own reports by name.
    pub fn report(&self, name: &str) -> Option<&StatusReport> {
        self.reports.iter().find(|r| r.name == name)
    }
}

/// A point-in-time, deterministically ordered view of the aggregation tree.
///
/// The header (`sequence`, `timestamp_ms`) changes on every evaluation and is
/// not part of the snapshot's meaning; two snapshots that only differ there
/// describe the same health state.
///
/// # Example
///
/// ```rust
/// use diagwatch_types::{Level, Snapshot, StatusReport};
///
/// let snapshot = Snapshot::builder()
///     .timestamp_ms(1703160000000)
///     .node("/", Level::Warn, |n| n)
///     .node("/lidar", Level::Warn, |n| {
///         n.report(StatusReport::builder("front").level(Level::Warn).message("dirty lens"))
///     })
///     .build();
///
/// assert_eq!(snapshot.node("/lidar").map(|n| n.level), Some(Level::Warn));
/// ```
#[derive(Debug, Clone, PartialEq, Eq)]
#[cfg_attr(feature = "serde", derive(serde::Serialize, serde::Deserialize))]
pub struct Snapshot {
    /// Schema version for forward compatibility.
    pub version: SchemaVersion,

    /// Evaluation cycle that produced this snapshot.
    pub sequence: u64,

    /// Unix timestamp in milliseconds when this snapshot was built.
    pub timestamp_ms: u64,

    /// Nodes in depth-first, lexicographic path order. The root `/` is first.
    pub nodes: Vec<NodeStatus>,
}

impl Snapshot {
    /// Create a builder for constructing snapshots.
    pub fn builder() -> SnapshotBuilder {
        SnapshotBuilder::new()
    }

    pub fn is_empty(&self) -> bool {
        self.nodes.is_empty()
    }

    /// Number of nodes in the snapshot.
    pub fn len(&self) -> usize {
        self.nodes.len()
    }

    /// Get the entry for a node path.
    pub fn node(&self, path: &str) -> Option<&NodeStatus> {
        self.nodes.iter().find(|n| n.path == path)
    }

    pub fn iter(&self) -> impl Iterator<Item = &NodeStatus> {
        self.nodes.iter()
    }

    /// Overall level: the worst level of any node (the root's rolled level).
    pub fn level(&self) -> Level {
        self.nodes
            .iter()
            .map(|n| n.level)
            .max()
            .unwrap_or(Level::Ok)
    }

    /// Total number of reports across all nodes.
    pub fn report_count(&self) -> usize {
        self.nodes.iter().map(|n| n.reports.len()).sum()
    }
}

/// Builder for constructing `Snapshot` instances.
#[derive(Debug, Default)]
pub struct SnapshotBuilder {
    sequence: u64,
    timestamp_ms: Option<u64>,
    nodes: Vec<NodeStatus>,
}

impl SnapshotBuilder {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn sequence(mut self, sequence: u64) -> Self {
        self.sequence = sequence;
        self
    }

    /// Set a specific timestamp (milliseconds since Unix epoch).
    pub fn timestamp_ms(mut self, ts: u64) -> Self {
        self.timestamp_ms = Some(ts);
        self
    }

    /// Append a node whose reports are added through a closure.
    ///
    /// Nodes keep the order they are appended in.
    pub fn node<F>(mut self, path: impl Into<String>, level: Level, f: F) -> Self
    where
        F: FnOnce(NodeBuilder) -> NodeBuilder,
    {
        let node = f(NodeBuilder::new(path, level)).build();
        self.nodes.push(node);
        self
    }

    /// Append a pre-built node.
    pub fn node_status(mut self, node: NodeStatus) -> Self {
        self.nodes.push(node);
        self
    }

    #[cfg(feature = "std")]
    pub fn build(self) -> Snapshot {
        Snapshot {
            version: SchemaVersion::current(),
            sequence: self.sequence,
            timestamp_ms: self.timestamp_ms.unwrap_or_else(current_timestamp_ms),
            nodes: self.nodes,
        }
    }

    /// Build the snapshot with a specific timestamp (for no_std).
    #[cfg(not(feature = "std"))]
    pub fn build(self) -> Snapshot {
        Snapshot {
            version: SchemaVersion::current(),
            sequence: self.sequence,
            timestamp_ms: self.timestamp_ms.unwrap_or(0),
            nodes: self.nodes,
        }
    }
}

/// Builder for one [`NodeStatus`].
#[derive(Debug)]
pub struct NodeBuilder {
    node: NodeStatus,
}

impl NodeBuilder {
    pub fn new(path: impl Into<String>, level: Level) -> Self {
        Self {
            node: NodeStatus::new(path, level),
        }
    }

    pub fn report(mut self, report: impl Into<StatusReport>) -> Self {
        self.node.reports.push(report.into());
        self
    }

    pub fn build(self) -> NodeStatus {
        self.node
    }
}

/// Current wall-clock time in milliseconds since the Unix epoch.
#[cfg(feature = "std")]
pub fn current_timestamp_ms() -> u64 {
    use std::time::{SystemTime, UNIX_EPOCH};
    SystemTime::now()
        .duration_since(UNIX_EPOCH)
        .map(|d| d.as_millis() as u64)
        .unwrap_or(0)
}
