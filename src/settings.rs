//! Settings for the `diagwatch` binary.
//!
//! Values are layered, later sources winning:
//!
//! 1. built-in defaults
//! 2. an optional TOML file (`--config`)
//! 3. `DIAGWATCH_*` environment variables (e.g. `DIAGWATCH_STALENESS_TIMEOUT=10s`,
//!    `DIAGWATCH_NAMESPACE_EXCLUSIONS=/sim,/test`)
//! 4. command-line flags, applied by the caller
//!
//! Durations are written as strings such as `"5s"` or `"500ms"`.
//!
//! ```toml
//! staleness_timeout = "5s"
//! evaluation_period = "1s"
//! namespace_exclusions = ["/simulation"]
//! history_depth = 10
//! publish_on_escalation = true
//! topic = "diagnostics_agg"
//! listen = "0.0.0.0:7400"
//! serve = "0.0.0.0:7401"
//! output = "diagnostics_agg.json"
//! ```

use std::path::{Path, PathBuf};

use anyhow::{Context, Result};
use config::{Config, Environment, File};
use diagwatch_core::config::{
    DEFAULT_EVALUATION_PERIOD, DEFAULT_HISTORY_DEPTH, DEFAULT_STALENESS_TIMEOUT,
};
use diagwatch_core::AggregatorConfig;
use serde::Deserialize;

use crate::duration::{format_duration, parse_duration};

/// Environment variable prefix.
pub const ENV_PREFIX: &str = "DIAGWATCH";

#[derive(Debug, Clone, PartialEq, Eq, Deserialize)]
pub struct Settings {
    pub staleness_timeout: String,
    pub evaluation_period: String,
    #[serde(default)]
    pub namespace_exclusions: Vec<String>,
    pub history_depth: usize,
    #[serde(default)]
    pub stale_eviction: Option<String>,
    #[serde(default)]
    pub publish_on_escalation: bool,

    /// Name of the latched output topic.
    pub topic: String,
    /// Address to accept NDJSON report batches on.
    #[serde(default)]
    pub listen: Option<String>,
    /// Address to serve NDJSON snapshots on.
    #[serde(default)]
    pub serve: Option<String>,
    /// File to keep the latest snapshot in.
    #[serde(default)]
    pub output: Option<PathBuf>,
}

impl Settings {
    /// Load settings from defaults, an optional file and the environment.
    pub fn load(path: Option<&Path>) -> Result<Self> {
        Self::load_with_env(path, Environment::with_prefix(ENV_PREFIX))
    }

    fn load_with_env(path: Option<&Path>, env: Environment) -> Result<Self> {
        let mut builder = Config::builder()
            .set_default("staleness_timeout", format_duration(DEFAULT_STALENESS_TIMEOUT))?
            .set_default("evaluation_period", format_duration(DEFAULT_EVALUATION_PERIOD))?
            .set_default("history_depth", DEFAULT_HISTORY_DEPTH as u64)?
            .set_default("topic", "diagnostics_agg")?;

        if let Some(path) = path {
            builder = builder.add_source(File::from(path));
        }

        let config = builder
            .add_source(
                env.try_parsing(true)
                    .list_separator(",")
                    .with_list_parse_key("namespace_exclusions"),
            )
            .build()
            .context("failed to load settings")?;

        config
            .try_deserialize()
            .context("failed to deserialize settings")
    }

    /// Convert to a validated aggregator configuration.
    pub fn aggregator_config(&self) -> Result<AggregatorConfig> {
        let staleness = parse_duration(&self.staleness_timeout).context("staleness_timeout")?;
        let period = parse_duration(&self.evaluation_period).context("evaluation_period")?;
        let eviction = self
            .stale_eviction
            .as_deref()
            .map(parse_duration)
            .transpose()
            .context("stale_eviction")?;

        let config = self.namespace_exclusions.iter().fold(
            AggregatorConfig::default()
                .with_staleness_timeout(staleness)
                .with_evaluation_period(period)
                .with_history_depth(self.history_depth)
                .with_stale_eviction(eviction)
                .with_publish_on_escalation(self.publish_on_escalation),
            |config, namespace| config.with_exclusion(namespace),
        );

        Ok(config.validate()?)
    }

    /// One-line summary for the startup log.
    pub fn describe(&self) -> Result<String> {
        let config = self.aggregator_config()?;
        Ok(format!(
            "topic={} period={} staleness={} depth={} exclusions={:?}",
            self.topic,
            format_duration(config.evaluation_period),
            format_duration(config.staleness_timeout),
            config.history_depth,
            config.namespace_exclusions,
        ))
    }
}
