//! Aggregator configuration.

use std::time::Duration;

use crate::error::ConfigError;
use crate::path;

/// Default time after which an un-refreshed report is treated as stale.
pub const DEFAULT_STALENESS_TIMEOUT: Duration = Duration::from_secs(5);

/// Default interval between evaluation cycles.
pub const DEFAULT_EVALUATION_PERIOD: Duration = Duration::from_secs(1);

/// Default number of snapshots retained for late subscribers.
pub const DEFAULT_HISTORY_DEPTH: usize = 10;

/// Tunables for the aggregation engine.
///
/// Build one with [`AggregatorConfig::default`] and the `with_*` methods, then
/// call [`validate`](AggregatorConfig::validate) (the aggregator builder does
/// this for you).
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct AggregatorConfig {
    /// Age after which a report counts as `STALE`.
    pub staleness_timeout: Duration,
    /// Tick interval of the evaluation driver.
    pub evaluation_period: Duration,
    /// Namespaces whose reports are ignored, including everything below them.
    /// Stored normalised (see [`path::normalize`]).
    pub namespace_exclusions: Vec<String>,
    /// How many published snapshots the latched topic keeps.
    pub history_depth: usize,
    /// When set, reports older than this are removed instead of lingering as
    /// `STALE` forever. Must not be shorter than `staleness_timeout`.
    pub stale_eviction: Option<Duration>,
    /// Run an evaluation as soon as a report escalates to `ERROR` or worse,
    /// instead of waiting for the next tick.
    pub publish_on_escalation: bool,
}

impl Default for AggregatorConfig {
    fn default() -> Self {
        Self {
            staleness_timeout: DEFAULT_STALENESS_TIMEOUT,
            evaluation_period: DEFAULT_EVALUATION_PERIOD,
            namespace_exclusions: Vec::new(),
            history_depth: DEFAULT_HISTORY_DEPTH,
            stale_eviction: None,
            publish_on_escalation: false,
        }
    }
}

impl AggregatorConfig {
    pub fn with_staleness_timeout(mut self, timeout: Duration) -> Self {
        self.staleness_timeout = timeout;
        self
    }

    pub fn with_evaluation_period(mut self, period: Duration) -> Self {
        self.evaluation_period = period;
        self
    }

    /// Exclude a namespace and everything below it.
    pub fn with_exclusion(mut self, namespace: &str) -> Self {
        self.namespace_exclusions.push(path::normalize(namespace));
        self
    }

    pub fn with_history_depth(mut self, depth: usize) -> Self {
        self.history_depth = depth;
        self
    }

    pub fn with_stale_eviction(mut self, eviction: Option<Duration>) -> Self {
        self.stale_eviction = eviction;
        self
    }

    pub fn with_publish_on_escalation(mut self, enabled: bool) -> Self {
        self.publish_on_escalation = enabled;
        self
    }

    /// Check the configuration for values the engine cannot work with.
    ///
    /// Exclusions are re-normalised here so configs built by hand or
    /// deserialized from elsewhere behave the same as ones built with
    /// [`with_exclusion`](Self::with_exclusion).
    pub fn validate(mut self) -> Result<Self, ConfigError> {
        if self.evaluation_period.is_zero() {
            return Err(ConfigError::ZeroPeriod);
        }
        if self.staleness_timeout.is_zero() {
            return Err(ConfigError::ZeroStaleness);
        }
        if self.history_depth == 0 {
            return Err(ConfigError::ZeroDepth);
        }
        if let Some(eviction) = self.stale_eviction {
            if eviction < self.staleness_timeout {
                return Err(ConfigError::EvictionBeforeStale {
                    eviction,
                    staleness: self.staleness_timeout,
                });
            }
        }

        self.namespace_exclusions = self
            .namespace_exclusions
            .iter()
            .map(|ns| path::normalize(ns))
            .collect();
        self.namespace_exclusions.sort();
        self.namespace_exclusions.dedup();
        Ok(self)
    }

    /// True if reports filed under `tree_path` must be ignored.
    pub fn is_excluded(&self, tree_path: &str) -> bool {
        self.namespace_exclusions
            .iter()
            .any(|excluded| path::is_within(tree_path, excluded))
    }
}
