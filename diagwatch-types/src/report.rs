//! Status reports, as sent by producers and as stored after validation.

use alloc::string::String;
use alloc::vec::Vec;

use crate::Level;

/// One key/value pair attached to a report.
///
/// Reports carry an *ordered* list of these; order is part of the content.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
#[cfg_attr(feature = "serde", derive(serde::Serialize, serde::Deserialize))]
pub struct KeyValue {
    pub key: String,
    pub value: String,
}

impl KeyValue {
    pub fn new(key: impl Into<String>, value: impl Into<String>) -> Self {
        Self {
            key: key.into(),
            value: value.into(),
        }
    }
}

/// An unvalidated status as it arrives from a producer.
///
/// The level is the raw wire byte; anything outside `0..=3` is rejected at
/// ingest. An empty name is rejected too.
#[derive(Debug, Clone, PartialEq, Eq, Default)]
#[cfg_attr(feature = "serde", derive(serde::Serialize, serde::Deserialize))]
pub struct RawStatus {
    pub name: String,

    #[cfg_attr(feature = "serde", serde(default))]
    pub level: u8,

    #[cfg_attr(feature = "serde", serde(default))]
    pub message: String,

    #[cfg_attr(feature = "serde", serde(default))]
    pub hardware_id: String,

    #[cfg_attr(feature = "serde", serde(default))]
    pub values: Vec<KeyValue>,

    /// Producer timestamp, milliseconds since the Unix epoch.
    #[cfg_attr(
        feature = "serde",
        serde(default, skip_serializing_if = "Option::is_none")
    )]
    pub timestamp_ms: Option<u64>,
}

impl RawStatus {
    /// A status with a known level.
    pub fn new(name: impl Into<String>, level: Level) -> Self {
        Self::with_wire_level(name, level.to_wire())
    }

    /// A status with an arbitrary wire byte, which may not be a valid level.
    pub fn with_wire_level(name: impl Into<String>, level: u8) -> Self {
        Self {
            name: name.into(),
            level,
            ..Default::default()
        }
    }

    pub fn message(mut self, message: impl Into<String>) -> Self {
        self.message = message.into();
        self
    }

    pub fn hardware_id(mut self, hardware_id: impl Into<String>) -> Self {
        self.hardware_id = hardware_id.into();
        self
    }

    pub fn value(mut self, key: impl Into<String>, value: impl Into<String>) -> Self {
        self.values.push(KeyValue::new(key, value));
        self
    }

    pub fn timestamp_ms(mut self, ts: u64) -> Self {
        self.timestamp_ms = Some(ts);
        self
    }
}

/// A collection of statuses published together by one producer.
///
/// All statuses in a batch are filed under the same namespace. A missing
/// namespace means the tree root.
#[derive(Debug, Clone, PartialEq, Eq, Default)]
#[cfg_attr(feature = "serde", derive(serde::Serialize, serde::Deserialize))]
pub struct ReportBatch {
    #[cfg_attr(
        feature = "serde",
        serde(default, skip_serializing_if = "Option::is_none")
    )]
    pub namespace: Option<String>,

    /// Header timestamp, used for statuses that carry none of their own.
    #[cfg_attr(
        feature = "serde",
        serde(default, skip_serializing_if = "Option::is_none")
    )]
    pub timestamp_ms: Option<u64>,

    #[cfg_attr(feature = "serde", serde(default))]
    pub statuses: Vec<RawStatus>,
}

impl ReportBatch {
    /// An empty batch for the given namespace (e.g. `"/robot/arm"`).
    pub fn new(namespace: impl Into<String>) -> Self {
        Self {
            namespace: Some(namespace.into()),
            ..Default::default()
        }
    }

    /// An empty batch filed under the tree root.
    pub fn root() -> Self {
        Self::default()
    }

    pub fn timestamp_ms(mut self, ts: u64) -> Self {
        self.timestamp_ms = Some(ts);
        self
    }

    pub fn status(mut self, status: RawStatus) -> Self {
        self.statuses.push(status);
        self
    }

    pub fn is_empty(&self) -> bool {
        self.statuses.is_empty()
    }

    pub fn len(&self) -> usize {
        self.statuses.len()
    }
}

/// A validated status report.
///
/// Immutable once received. The derived `PartialEq` compares every field,
/// including the volatile timestamp; use [`StatusReport::same_content`] to
/// compare what the report actually says.
#[derive(Debug, Clone, PartialEq, Eq)]
#[cfg_attr(feature = "serde", derive(serde::Serialize, serde::Deserialize))]
pub struct StatusReport {
    pub name: String,
    pub level: Level,

    #[cfg_attr(feature = "serde", serde(default))]
    pub message: String,

    #[cfg_attr(
        feature = "serde",
        serde(default, skip_serializing_if = "String::is_empty")
    )]
    pub hardware_id: String,

    #[cfg_attr(
        feature = "serde",
        serde(default, skip_serializing_if = "Vec::is_empty")
    )]
    pub values: Vec<KeyValue>,

    /// Milliseconds since the Unix epoch when the report was produced.
    #[cfg_attr(feature = "serde", serde(default))]
    pub timestamp_ms: u64,
}

impl StatusReport {
    /// Create a builder for a report with the given name.
    pub fn builder(name: impl Into<String>) -> StatusReportBuilder {
        StatusReportBuilder::new(name)
    }

    /// Compare everything except the timestamp.
    pub fn same_content(&self, other: &StatusReport) -> bool {
        self.name == other.name
            && self.level == other.level
            && self.message == other.message
            && self.hardware_id == other.hardware_id
            && self.values == other.values
    }

    /// A copy of this report with a different level.
    ///
    /// Used when a report is shown with its effective (e.g. stale) level.
    pub fn with_level(&self, level: Level) -> Self {
        Self {
            level,
            ..self.clone()
        }
    }

    /// Look up a value by key (first match wins).
    pub fn value(&self, key: &str) -> Option<&str> {
        self.values
            .iter()
            .find(|kv| kv.key == key)
            .map(|kv| kv.value.as_str())
    }
}

/// Builder for [`StatusReport`].
#[derive(Debug, Clone)]
pub struct StatusReportBuilder {
    report: StatusReport,
}

impl StatusReportBuilder {
    pub fn new(name: impl Into<String>) -> Self {
        Self {
            report: StatusReport {
                name: name.into(),
                level: Level::Ok,
                message: String::new(),
                hardware_id: String::new(),
                values: Vec::new(),
                timestamp_ms: 0,
            },
        }
    }

    pub fn level(mut self, level: Level) -> Self {
        self.report.level = level;
        self
    }

    pub fn message(mut self, message: impl Into<String>) -> Self {
        self.report.message = message.into();
        self
    }

    pub fn hardware_id(mut self, hardware_id: impl Into<String>) -> Self {
        self.report.hardware_id = hardware_id.into();
        self
    }

    pub fn value(mut self, key: impl Into<String>, value: impl Into<String>) -> Self {
        self.report.values.push(KeyValue::new(key, value));
        self
    }

    pub fn timestamp_ms(mut self, ts: u64) -> Self {
        self.report.timestamp_ms = ts;
        self
    }

    pub fn build(self) -> StatusReport {
        self.report
    }
}

impl From<StatusReportBuilder> for StatusReport {
    fn from(builder: StatusReportBuilder) -> Self {
        builder.build()
    }
}
