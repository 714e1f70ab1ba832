//! Tree path helpers.
//!
//! Paths are `/`-separated strings with a leading slash; the root is `/`.
//! Nodes never point at their parents, so anything that needs an ancestor
//! derives it from the path string with these functions.

/// The root path.
pub const ROOT: &str = "/";

/// Normalise a producer namespace into a tree path.
///
/// Empty segments are dropped, so `""`, `"/"` and `"//"` all become `/`, and
/// `"robot//arm/"` becomes `/robot/arm`.
pub fn normalize(namespace: &str) -> String {
    let segments: Vec<&str> = segments(namespace).collect();
    if segments.is_empty() {
        ROOT.to_string()
    } else {
        format!("/{}", segments.join("/"))
    }
}

/// Non-empty segments of a path, root first.
pub fn segments(path: &str) -> impl Iterator<Item = &str> {
    path.split('/').map(str::trim).filter(|s| !s.is_empty())
}

/// Path of a child node.
pub fn join(parent: &str, segment: &str) -> String {
    if parent == ROOT {
        format!("/{segment}")
    } else {
        format!("{parent}/{segment}")
    }
}

/// Parent of a normalised path; `None` for the root.
pub fn parent(path: &str) -> Option<&str> {
    if path == ROOT {
        return None;
    }
    match path.rfind('/') {
        Some(0) => Some(ROOT),
        Some(idx) => Some(&path[..idx]),
        None => None,
    }
}

/// True if `path` equals `prefix` or lies below it, compared segment-wise.
pub fn is_within(path: &str, prefix: &str) -> bool {
    let mut path_segments = segments(path);
    segments(prefix).all(|p| path_segments.next() == Some(p))
}
