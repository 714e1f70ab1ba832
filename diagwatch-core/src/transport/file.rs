//! File sink: the latest published snapshot, as pretty-printed JSON.

use std::fs;
use std::path::{Path, PathBuf};
use std::sync::Arc;

use diagwatch_types::Snapshot;

use super::Transport;
use crate::error::PublishError;

/// Writes each published snapshot to a JSON file.
///
/// The file is replaced on every publish (written to a sibling temp file, then
/// renamed over the target), so readers never observe a half-written file and
/// the file always holds the retained value.
#[derive(Debug)]
pub struct FileTransport {
    path: PathBuf,
    tmp_path: PathBuf,
    description: String,
}

impl FileTransport {
    pub fn new(path: impl Into<PathBuf>) -> Self {
        let path = path.into();
        let mut tmp = path.clone().into_os_string();
        tmp.push(".tmp");
        Self {
            description: format!("file: {}", path.display()),
            tmp_path: PathBuf::from(tmp),
            path,
        }
    }

    pub fn path(&self) -> &Path {
        &self.path
    }
}

impl Transport for FileTransport {
    fn publish(&self, snapshot: Arc<Snapshot>) -> Result<(), PublishError> {
        let json = serde_json::to_vec_pretty(snapshot.as_ref())?;
        fs::write(&self.tmp_path, json)?;
        fs::rename(&self.tmp_path, &self.path)?;
        Ok(())
    }

    fn description(&self) -> &str {
        &self.description
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use diagwatch_types::{Level, StatusReport};
    use tempfile::tempdir;

    #[test]
    fn writes_latest_snapshot() {
        let dir = tempdir().unwrap();
        let transport = FileTransport::new(dir.path().join("agg.json"));
        assert!(transport.description().starts_with("file: "));

        let first = Snapshot::builder()
            .timestamp_ms(1)
            .node("/", Level::Ok, |n| n)
            .build();
        let second = Snapshot::builder()
            .timestamp_ms(2)
            .node("/", Level::Error, |n| {
                n.report(StatusReport::builder("primary").level(Level::Error))
            })
            .build();

        transport.publish(Arc::new(first)).unwrap();
        transport.publish(Arc::new(second.clone())).unwrap();

        let content = fs::read_to_string(transport.path()).unwrap();
        let parsed: Snapshot = serde_json::from_str(&content).unwrap();
        assert_eq!(parsed, second);
        assert!(!dir.path().join("agg.json.tmp").exists());
    }

    #[test]
    fn missing_directory_is_an_io_error() {
        let transport = FileTransport::new("/nonexistent/dir/agg.json");
        let result = transport.publish(Arc::new(Snapshot::builder().build()));
        assert!(matches!(result, Err(PublishError::Io(_))));
    }
}
