//! Semantic comparison of snapshots.
//!
//! Header fields (`sequence`, `timestamp_ms`) and per-report timestamps
//! change on every evaluation, so they are never compared. Paths, levels and
//! report contents always are.

use diagwatch_types::{Level, Snapshot};

/// The first semantic difference found between two snapshots.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Difference {
    /// Nothing has been published yet.
    Initial,
    /// The trees have a different number of nodes.
    NodeCount { new: usize, last: usize },
    /// The node at this position has a different path.
    Path { new: String, last: String },
    /// The node's rolled level changed.
    Level {
        path: String,
        new: Level,
        last: Level,
    },
    /// The node's own reports differ (added, removed or changed content).
    Reports { path: String },
}

/// True if `new` must be published given what was `last` published.
pub fn differs(new: &Snapshot, last: Option<&Snapshot>) -> bool {
    first_difference(new, last).is_some()
}

/// Find the first semantic difference, walking nodes in snapshot order.
pub fn first_difference(new: &Snapshot, last: Option<&Snapshot>) -> Option<Difference> {
    let Some(last) = last else {
        return Some(Difference::Initial);
    };

    if new.nodes.len() != last.nodes.len() {
        return Some(Difference::NodeCount {
            new: new.nodes.len(),
            last: last.nodes.len(),
        });
    }

    new.nodes.iter().zip(&last.nodes).find_map(|(a, b)| {
        if a.path != b.path {
            Some(Difference::Path {
                new: a.path.clone(),
                last: b.path.clone(),
            })
        } else if a.level != b.level {
            Some(Difference::Level {
                path: a.path.clone(),
                new: a.level,
                last: b.level,
            })
        } else if a.reports.len() != b.reports.len()
            || a.reports
                .iter()
                .zip(&b.reports)
                .any(|(x, y)| !x.same_content(y))
        {
            Some(Difference::Reports {
                path: a.path.clone(),
            })
        } else {
            None
        }
    })
}

#[cfg(test)]
mod tests {
    use super::*;
    use diagwatch_types::StatusReport;

    fn snapshot(ts: u64, seq: u64, level: Level, message: &str) -> Snapshot {
        Snapshot::builder()
            .sequence(seq)
            .timestamp_ms(ts)
            .node("/", level, |n| n)
            .node("/root", level, |n| {
                n.report(
                    StatusReport::builder("primary")
                        .level(level)
                        .message(message)
                        .timestamp_ms(ts),
                )
            })
            .build()
    }

    #[test]
    fn nothing_published_yet_always_differs() {
        let new = snapshot(1, 1, Level::Ok, "");
        assert_eq!(first_difference(&new, None), Some(Difference::Initial));
        assert!(differs(&new, None));
    }

    #[test]
    fn header_and_report_timestamps_are_ignored() {
        let a = snapshot(1_000, 1, Level::Ok, "fine");
        let b = snapshot(9_999, 42, Level::Ok, "fine");
        assert_ne!(a, b);
        assert!(!differs(&b, Some(&a)));
    }

    #[test]
    fn level_change_is_detected() {
        let a = snapshot(1, 1, Level::Ok, "");
        let b = snapshot(1, 2, Level::Error, "");
        assert_eq!(
            first_difference(&b, Some(&a)),
            Some(Difference::Level {
                path: "/".to_string(),
                new: Level::Error,
                last: Level::Ok,
            })
        );
    }

    #[test]
    fn message_change_is_detected() {
        let a = snapshot(1, 1, Level::Warn, "fan slow");
        let b = snapshot(1, 2, Level::Warn, "fan stopped");
        assert_eq!(
            first_difference(&b, Some(&a)),
            Some(Difference::Reports {
                path: "/root".to_string()
            })
        );
    }

    #[test]
    fn added_node_is_detected() {
        let a = snapshot(1, 1, Level::Ok, "");
        let b = Snapshot {
            nodes: {
                let mut nodes = a.nodes.clone();
                nodes.push(diagwatch_types::NodeStatus::new("/spare", Level::Ok));
                nodes
            },
            ..a.clone()
        };
        assert_eq!(
            first_difference(&b, Some(&a)),
            Some(Difference::NodeCount { new: 3, last: 2 })
        );
    }

    #[test]
    fn renamed_path_is_detected() {
        let a = snapshot(1, 1, Level::Ok, "");
        let mut b = a.clone();
        b.nodes[1].path = "/other".to_string();
        assert!(matches!(
            first_difference(&b, Some(&a)),
            Some(Difference::Path { .. })
        ));
    }
}
