//! The aggregation tree: reports filed under hierarchical paths, with a
//! cached, lazily recomputed severity roll-up per node.

use std::collections::BTreeMap;
use std::time::Duration;

use diagwatch_types::{Level, StatusReport};
use parking_lot::{RwLock, RwLockWriteGuard};
use tokio::time::Instant;
use tracing::{debug, warn};

use crate::path;

/// How report age turns into `STALE` (and optionally into removal).
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct StalenessPolicy {
    /// Reports older than this count as `STALE`.
    pub timeout: Duration,
    /// Reports older than this are dropped from the tree.
    pub eviction: Option<Duration>,
}

impl StalenessPolicy {
    pub fn new(timeout: Duration) -> Self {
        Self {
            timeout,
            eviction: None,
        }
    }
}

/// A report together with the instant the aggregator received it.
#[derive(Debug, Clone)]
pub struct StoredReport {
    pub report: StatusReport,
    pub received_at: Instant,
}

impl StoredReport {
    pub fn age(&self, now: Instant) -> Duration {
        now.saturating_duration_since(self.received_at)
    }

    pub fn is_stale(&self, now: Instant, timeout: Duration) -> bool {
        self.age(now) > timeout
    }

    /// The level this report counts as at `now`.
    pub fn effective_level(&self, now: Instant, timeout: Duration) -> Level {
        if self.is_stale(now, timeout) {
            Level::Stale
        } else {
            self.report.level
        }
    }

    /// Next instant at which this report's contribution changes: it goes
    /// stale, or (once stale) it gets evicted.
    fn next_transition(&self, now: Instant, policy: &StalenessPolicy) -> Option<Instant> {
        if !self.is_stale(now, policy.timeout) {
            self.received_at.checked_add(policy.timeout)
        } else {
            policy
                .eviction
                .and_then(|evict| self.received_at.checked_add(evict))
        }
    }
}

/// Where a report ended up after [`AggregationTree::update`].
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Filed {
    /// Path of the node that now holds the report.
    pub path: String,
    /// Level of the report it replaced, if one with the same name existed.
    pub previous: Option<Level>,
    /// The report was moved into a child node because its name is also a
    /// container path.
    pub relocated: bool,
}

/// One node of the tree. Owns its children; knows its own path but not its
/// parent.
#[derive(Debug)]
pub struct Node {
    path: String,
    reports: BTreeMap<String, StoredReport>,
    children: BTreeMap<String, Node>,
    rolled: Level,
    dirty: bool,
    next_expiry: Option<Instant>,
}

impl Node {
    fn new(path: String) -> Self {
        Self {
            path,
            reports: BTreeMap::new(),
            children: BTreeMap::new(),
            rolled: Level::Ok,
            dirty: true,
            next_expiry: None,
        }
    }

    pub fn path(&self) -> &str {
        &self.path
    }

    /// Rolled-up level as of the last [`AggregationTree::compute_rolled`].
    pub fn rolled_level(&self) -> Level {
        self.rolled
    }

    /// Own reports, ordered by name.
    pub fn reports(&self) -> impl Iterator<Item = &StoredReport> {
        self.reports.values()
    }

    /// Children, ordered by path segment.
    pub fn children(&self) -> impl Iterator<Item = &Node> {
        self.children.values()
    }

    pub fn is_dirty(&self) -> bool {
        self.dirty
    }

    fn find(&self, path: &str) -> Option<&Node> {
        path::segments(path).try_fold(self, |node, segment| node.children.get(segment))
    }

    fn file<'a>(
        &mut self,
        mut segments: impl Iterator<Item = &'a str>,
        report: StatusReport,
        received_at: Instant,
    ) -> Filed {
        self.dirty = true;
        match segments.next() {
            Some(segment) => self
                .child_mut(segment)
                .file(segments, report, received_at),
            None => {
                if let Some(container) = self.children.get_mut(&report.name) {
                    warn!(
                        path = %self.path,
                        name = %report.name,
                        "report name is also a container path, filing it under the container"
                    );
                    container.dirty = true;
                    return container.store(report, received_at, true);
                }
                self.store(report, received_at, false)
            }
        }
    }

    fn child_mut(&mut self, segment: &str) -> &mut Node {
        let parent_path = &self.path;
        let reports = &mut self.reports;
        self.children.entry(segment.to_string()).or_insert_with(|| {
            let mut child = Node::new(path::join(parent_path, segment));
            if let Some(leaf) = reports.remove(segment) {
                warn!(
                    path = %child.path,
                    "path was a report and is now a container, moving the report into it"
                );
                child.reports.insert(segment.to_string(), leaf);
            }
            child
        })
    }

    fn store(&mut self, report: StatusReport, received_at: Instant, relocated: bool) -> Filed {
        let previous = self
            .reports
            .insert(
                report.name.clone(),
                StoredReport {
                    report,
                    received_at,
                },
            )
            .map(|old| old.report.level);

        Filed {
            path: self.path.clone(),
            previous,
            relocated,
        }
    }

    /// Recompute this subtree's rolled level if anything in it changed or a
    /// report in it reached a staleness/eviction deadline.
    fn refresh(&mut self, now: Instant, policy: &StalenessPolicy) -> Level {
        let deadline_passed = self.next_expiry.is_some_and(|t| t <= now);
        if !self.dirty && !deadline_passed {
            return self.rolled;
        }

        if let Some(eviction) = policy.eviction {
            let before = self.reports.len();
            self.reports.retain(|_, stored| stored.age(now) <= eviction);
            let evicted = before - self.reports.len();
            if evicted > 0 {
                debug!(path = %self.path, evicted, "evicted expired reports");
            }
        }

        let mut level = Level::Ok;
        let mut next_expiry: Option<Instant> = None;

        for stored in self.reports.values() {
            level = level.max(stored.effective_level(now, policy.timeout));
            next_expiry = earliest(next_expiry, stored.next_transition(now, policy));
        }
        for child in self.children.values_mut() {
            level = level.max(child.refresh(now, policy));
            next_expiry = earliest(next_expiry, child.next_expiry);
        }

        self.rolled = level;
        self.next_expiry = next_expiry;
        self.dirty = false;
        level
    }

    fn count(&self) -> (usize, usize) {
        self.children
            .values()
            .map(Node::count)
            .fold((1, self.reports.len()), |(n, r), (cn, cr)| (n + cn, r + cr))
    }
}

fn earliest(a: Option<Instant>, b: Option<Instant>) -> Option<Instant> {
    match (a, b) {
        (Some(a), Some(b)) => Some(a.min(b)),
        (a, b) => a.or(b),
    }
}

/// Thread-safe aggregation tree.
///
/// A single coarse-grained lock guards the whole tree. Producers take the
/// write lock only for the insert itself; the evaluation driver takes it for
/// the roll-up and downgrades to a read lock while the snapshot is copied out,
/// so a snapshot never sees half of an update.
#[derive(Debug)]
pub struct AggregationTree {
    root: RwLock<Node>,
    policy: StalenessPolicy,
}

impl AggregationTree {
    pub fn new(policy: StalenessPolicy) -> Self {
        Self {
            root: RwLock::new(Node::new(path::ROOT.to_string())),
            policy,
        }
    }

    pub fn policy(&self) -> &StalenessPolicy {
        &self.policy
    }

    /// File a report under `tree_path`, creating missing nodes.
    ///
    /// Last write wins per report name. The target node and all of its
    /// ancestors are marked dirty.
    pub fn update(&self, tree_path: &str, report: StatusReport, received_at: Instant) -> Filed {
        let mut root = self.root.write();
        root.file(path::segments(tree_path), report, received_at)
    }

    /// Bring every rolled level up to date for `now` and return the root's.
    pub fn compute_rolled(&self, now: Instant) -> Level {
        self.root.write().refresh(now, &self.policy)
    }

    /// Refresh the roll-up, then run `f` over the refreshed tree without
    /// letting any writer in between.
    pub fn with_refreshed<R>(&self, now: Instant, f: impl FnOnce(&Node) -> R) -> R {
        let mut root = self.root.write();
        root.refresh(now, &self.policy);
        let root = RwLockWriteGuard::downgrade(root);
        f(&root)
    }

    /// Cached rolled level of a node, as of the last roll-up.
    pub fn level_of(&self, tree_path: &str) -> Option<Level> {
        self.root.read().find(tree_path).map(Node::rolled_level)
    }

    /// True if anything was filed since the last roll-up.
    pub fn is_dirty(&self) -> bool {
        self.root.read().dirty
    }

    /// Number of nodes, including the root.
    pub fn node_count(&self) -> usize {
        self.root.read().count().0
    }

    pub fn report_count(&self) -> usize {
        self.root.read().count().1
    }
}

impl Default for AggregationTree {
    fn default() -> Self {
        Self::new(StalenessPolicy::new(crate::config::DEFAULT_STALENESS_TIMEOUT))
    }
}
