//! Flattening the aggregation tree into a [`Snapshot`].

use diagwatch_types::{current_timestamp_ms, NodeStatus, Snapshot};
use tokio::time::Instant;

use crate::tree::{AggregationTree, Node};

/// Build a snapshot of the tree as it stands at `now`.
///
/// Rolled levels are refreshed first, then the tree is walked depth-first with
/// children in segment order and reports in name order, so identical tree
/// states always produce identical node sequences. Reports carry their
/// effective level (stale reports show as `STALE`). The tree's contents are
/// not modified.
pub fn build(tree: &AggregationTree, now: Instant, sequence: u64) -> Snapshot {
    build_at(tree, now, sequence, current_timestamp_ms())
}

/// Like [`build`] with an explicit header timestamp.
pub fn build_at(tree: &AggregationTree, now: Instant, sequence: u64, timestamp_ms: u64) -> Snapshot {
    let timeout = tree.policy().timeout;
    let nodes = tree.with_refreshed(now, |root| {
        let mut nodes = Vec::new();
        flatten(root, now, timeout, &mut nodes);
        nodes
    });

    nodes
        .into_iter()
        .fold(
            Snapshot::builder().sequence(sequence).timestamp_ms(timestamp_ms),
            |builder, node| builder.node_status(node),
        )
        .build()
}

fn flatten(node: &Node, now: Instant, timeout: std::time::Duration, out: &mut Vec<NodeStatus>) {
    let mut status = NodeStatus::new(node.path(), node.rolled_level());
    status.reports = node
        .reports()
        .map(|stored| {
            let level = stored.effective_level(now, timeout);
            if level == stored.report.level {
                stored.report.clone()
            } else {
                stored.report.with_level(level)
            }
        })
        .collect();
    out.push(status);

    for child in node.children() {
        flatten(child, now, timeout, out);
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::tree::StalenessPolicy;
    use diagwatch_types::{Level, StatusReport};
    use std::time::Duration;

    fn populated() -> (AggregationTree, Instant) {
        let tree = AggregationTree::new(StalenessPolicy::new(Duration::from_secs(5)));
        let now = Instant::now();
        for (ns, name, level) in [
            ("/zeta", "z", Level::Ok),
            ("/alpha/two", "b", Level::Warn),
            ("/alpha/one", "a", Level::Ok),
            ("/alpha", "self", Level::Ok),
        ] {
            tree.update(ns, StatusReport::builder(name).level(level).build(), now);
        }
        (tree, now)
    }

    #[test]
    fn traversal_is_depth_first_in_lexicographic_order() {
        let (tree, now) = populated();
        let snapshot = build_at(&tree, now, 1, 1000);
        let paths: Vec<&str> = snapshot.iter().map(|n| n.path.as_str()).collect();
        assert_eq!(paths, ["/", "/alpha", "/alpha/one", "/alpha/two", "/zeta"]);
        assert_eq!(snapshot.sequence, 1);
        assert_eq!(snapshot.timestamp_ms, 1000);
        assert_eq!(snapshot.level(), Level::Warn);
    }

    #[test]
    fn identical_state_builds_identical_nodes() {
        let (tree, now) = populated();
        let first = build_at(&tree, now, 1, 1000);
        let second = build_at(&tree, now, 2, 2000);
        assert_eq!(first.nodes, second.nodes);
    }

    #[test]
    fn stale_reports_show_effective_level() {
        let (tree, now) = populated();
        let later = now + Duration::from_secs(6);
        let snapshot = build_at(&tree, later, 1, 0);

        let zeta = snapshot.node("/zeta").unwrap();
        assert_eq!(zeta.level, Level::Stale);
        assert_eq!(zeta.report("z").map(|r| r.level), Some(Level::Stale));
        assert_eq!(snapshot.level(), Level::Stale);
    }

    #[test]
    fn building_does_not_change_contents() {
        let (tree, now) = populated();
        let nodes = tree.node_count();
        let reports = tree.report_count();
        build(&tree, now, 1);
        assert_eq!(tree.node_count(), nodes);
        assert_eq!(tree.report_count(), reports);
    }
}
