//! The aggregator and its periodic evaluation driver.

use std::sync::Arc;

use tokio::sync::{watch, Notify};
use tokio::task::{JoinError, JoinHandle};
use tokio::time::{Instant, MissedTickBehavior};
use tracing::{debug, info};

use crate::config::AggregatorConfig;
use crate::error::ConfigError;
use crate::ingest::{IngestHandle, IngestStats, IngestSummary};
use crate::publisher::{CycleOutcome, PublishStats, PublishedState, StatefulPublisher};
use crate::transport::{LatchedTopic, Transport};
use crate::tree::{AggregationTree, StalenessPolicy};

/// The main entry point: one aggregation tree, one stateful publisher.
///
/// Producers write through [`IngestHandle`]s. Evaluation (build, compare,
/// publish) happens either manually via [`evaluate`](Self::evaluate) or on a
/// fixed interval once [`start`](Self::start) has moved the aggregator into
/// its driver task. Either way there is exactly one owner of the published
/// state.
///
/// # Example
///
/// ```rust,no_run
/// use std::time::Duration;
/// use diagwatch_core::{Aggregator, AggregatorConfig, Level, RawStatus};
///
/// #[tokio::main]
/// async fn main() {
///     let config = AggregatorConfig::default().with_evaluation_period(Duration::from_secs(1));
///     let (aggregator, topic) = Aggregator::builder()
///         .config(config)
///         .build_latched("diagnostics_agg")
///         .unwrap();
///
///     let handle = aggregator.ingest_handle();
///     let driver = aggregator.start();
///
///     handle.ingest("/robot", RawStatus::new("battery", Level::Ok)).unwrap();
///
///     let mut subscription = topic.subscribe();
///     while let Some(snapshot) = subscription.recv().await {
///         println!("overall level: {}", snapshot.level());
///     }
///     driver.stop().await.unwrap();
/// }
/// ```
#[derive(Debug)]
pub struct Aggregator {
    config: Arc<AggregatorConfig>,
    tree: Arc<AggregationTree>,
    publisher: StatefulPublisher,
    ingest_stats: Arc<IngestStats>,
    escalation: Arc<Notify>,
}

impl Aggregator {
    /// Create a builder for configuring the aggregator.
    pub fn builder() -> AggregatorBuilder {
        AggregatorBuilder::new()
    }

    pub fn config(&self) -> &AggregatorConfig {
        &self.config
    }

    /// Get a handle producers can use to submit statuses.
    pub fn ingest_handle(&self) -> IngestHandle {
        IngestHandle {
            tree: self.tree.clone(),
            config: self.config.clone(),
            stats: self.ingest_stats.clone(),
            escalation: self.escalation.clone(),
        }
    }

    pub fn tree(&self) -> &AggregationTree {
        &self.tree
    }

    /// Run one evaluation cycle now.
    pub fn evaluate(&mut self) -> CycleOutcome {
        self.evaluate_at(Instant::now())
    }

    /// Run one evaluation cycle as of `now`.
    pub fn evaluate_at(&mut self, now: Instant) -> CycleOutcome {
        self.publisher.evaluate_and_maybe_publish(&self.tree, now)
    }

    pub fn published(&self) -> &PublishedState {
        self.publisher.state()
    }

    pub fn publish_stats(&self) -> PublishStats {
        self.publisher.stats()
    }

    pub fn ingest_stats(&self) -> IngestSummary {
        self.ingest_stats.summary()
    }

    /// Move the aggregator into a background task that evaluates every
    /// `evaluation_period`.
    ///
    /// The first tick fires immediately, so the initial summary is published
    /// at startup. With `publish_on_escalation` the task also evaluates as
    /// soon as a report escalates. Cycles are synchronous, so stopping never
    /// interrupts one halfway.
    pub fn start(self) -> DriverHandle {
        let (stop_tx, mut stop_rx) = watch::channel(false);
        let period = self.config.evaluation_period;
        let escalation = self.escalation.clone();
        let mut aggregator = self;

        let task = tokio::spawn(async move {
            let mut ticker = tokio::time::interval(period);
            ticker.set_missed_tick_behavior(MissedTickBehavior::Delay);
            info!(?period, "evaluation driver started");

            loop {
                tokio::select! {
                    biased;
                    changed = stop_rx.changed() => {
                        if changed.is_err() || *stop_rx.borrow() {
                            break;
                        }
                    }
                    _ = ticker.tick() => {
                        aggregator.evaluate();
                    }
                    _ = escalation.notified() => {
                        debug!("escalation received, evaluating early");
                        aggregator.evaluate();
                    }
                }
            }

            let stats = aggregator.publish_stats();
            info!(
                cycles = stats.cycles,
                published = stats.published,
                failed = stats.failed,
                "evaluation driver stopped"
            );
            aggregator
        });

        DriverHandle { stop_tx, task }
    }
}

/// Builder for configuring an [`Aggregator`].
#[derive(Debug, Default)]
pub struct AggregatorBuilder {
    config: AggregatorConfig,
    transport: Option<Box<dyn Transport>>,
}

impl AggregatorBuilder {
    pub fn new() -> Self {
        Self::default()
    }

    /// Set the configuration. Defaults to [`AggregatorConfig::default`].
    pub fn config(mut self, config: AggregatorConfig) -> Self {
        self.config = config;
        self
    }

    /// Set where published snapshots go.
    pub fn transport(mut self, transport: impl Transport + 'static) -> Self {
        self.transport = Some(Box::new(transport));
        self
    }

    /// Validate the configuration and build the aggregator.
    pub fn build(self) -> Result<Aggregator, ConfigError> {
        let config = self.config.validate()?;
        let transport = self.transport.ok_or(ConfigError::NoTransport)?;

        let policy = StalenessPolicy {
            timeout: config.staleness_timeout,
            eviction: config.stale_eviction,
        };

        Ok(Aggregator {
            config: Arc::new(config),
            tree: Arc::new(AggregationTree::new(policy)),
            publisher: StatefulPublisher::new(transport),
            ingest_stats: Arc::default(),
            escalation: Arc::new(Notify::new()),
        })
    }

    /// Build with a [`LatchedTopic`] sized by `history_depth` as the
    /// transport, returning a clone of the topic for subscribing.
    pub fn build_latched(self, topic: &str) -> Result<(Aggregator, LatchedTopic), ConfigError> {
        let latched = LatchedTopic::new(topic, self.config.history_depth);
        let aggregator = self.transport(latched.clone()).build()?;
        Ok((aggregator, latched))
    }
}

/// Handle for controlling the background driver.
///
/// Dropping the handle also stops the driver.
#[derive(Debug)]
pub struct DriverHandle {
    stop_tx: watch::Sender<bool>,
    task: JoinHandle<Aggregator>,
}

impl DriverHandle {
    /// Stop the driver and get the aggregator back, with its published state
    /// and counters intact.
    pub async fn stop(self) -> Result<Aggregator, JoinError> {
        let _ = self.stop_tx.send(true);
        self.task.await
    }

    pub fn is_finished(&self) -> bool {
        self.task.is_finished()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use diagwatch_types::{Level, RawStatus};
    use std::time::Duration;

    fn config() -> AggregatorConfig {
        AggregatorConfig::default()
            .with_evaluation_period(Duration::from_secs(1))
            .with_staleness_timeout(Duration::from_secs(60))
    }

    #[test]
    fn build_requires_transport() {
        let result = Aggregator::builder().build();
        assert!(matches!(result, Err(ConfigError::NoTransport)));
    }

    #[test]
    fn build_validates_config() {
        let result = Aggregator::builder()
            .config(config().with_history_depth(0))
            .build_latched("agg");
        assert!(matches!(result, Err(ConfigError::ZeroDepth)));
    }

    #[test]
    fn build_latched_sizes_topic_from_config() {
        let (_, topic) = Aggregator::builder()
            .config(config().with_history_depth(4))
            .build_latched("agg")
            .unwrap();
        assert_eq!(topic.depth(), 4);
    }

    #[test]
    fn manual_evaluation() {
        let (mut aggregator, topic) = Aggregator::builder().config(config()).build_latched("agg").unwrap();
        let handle = aggregator.ingest_handle();

        assert!(aggregator.evaluate().is_published());
        assert!(aggregator.evaluate().is_unchanged());

        handle.ingest("/root", RawStatus::new("primary", Level::Warn)).unwrap();
        assert!(aggregator.evaluate().is_published());
        assert_eq!(topic.latest().map(|s| s.level()), Some(Level::Warn));
        assert_eq!(aggregator.ingest_stats().accepted, 1);
    }

    #[tokio::test(start_paused = true)]
    async fn driver_publishes_at_startup_then_only_on_change() {
        let (aggregator, topic) = Aggregator::builder().config(config()).build_latched("agg").unwrap();
        let handle = aggregator.ingest_handle();
        let driver = aggregator.start();

        tokio::time::sleep(Duration::from_millis(1100)).await;
        assert_eq!(topic.retained().len(), 1);

        handle.ingest("/root", RawStatus::new("primary", Level::Ok)).unwrap();
        tokio::time::sleep(Duration::from_secs(1)).await;
        assert_eq!(topic.retained().len(), 2);

        tokio::time::sleep(Duration::from_secs(5)).await;
        assert_eq!(topic.retained().len(), 2);

        let aggregator = driver.stop().await.unwrap();
        let stats = aggregator.publish_stats();
        assert_eq!(stats.published, 2);
        assert!(stats.cycles >= 7);
    }

    #[tokio::test(start_paused = true)]
    async fn escalation_publishes_before_next_tick() {
        let config = config()
            .with_evaluation_period(Duration::from_secs(30))
            .with_publish_on_escalation(true);
        let (aggregator, topic) = Aggregator::builder().config(config).build_latched("agg").unwrap();
        let handle = aggregator.ingest_handle();
        let driver = aggregator.start();

        tokio::time::sleep(Duration::from_millis(10)).await;
        assert_eq!(topic.retained().len(), 1);

        handle.ingest("/motors", RawStatus::new("left", Level::Error)).unwrap();
        tokio::time::sleep(Duration::from_millis(10)).await;

        assert_eq!(topic.retained().len(), 2);
        assert_eq!(topic.latest().map(|s| s.level()), Some(Level::Error));
        driver.stop().await.unwrap();
    }

    #[tokio::test(start_paused = true)]
    async fn stop_returns_published_state() {
        let (aggregator, topic) = Aggregator::builder().config(config()).build_latched("agg").unwrap();
        let driver = aggregator.start();
        tokio::time::sleep(Duration::from_millis(10)).await;

        let aggregator = driver.stop().await.unwrap();
        let published = aggregator.published().last_snapshot().cloned();
        assert!(published.is_some());
        assert_eq!(published, topic.latest());
    }

    #[tokio::test(start_paused = true)]
    async fn dropping_handle_stops_driver() {
        let (aggregator, _topic) = Aggregator::builder().config(config()).build_latched("agg").unwrap();
        let driver = aggregator.start();
        let DriverHandle { stop_tx, task } = driver;
        drop(stop_tx);

        let aggregator = task.await.unwrap();
        assert!(aggregator.publish_stats().cycles <= 1);
    }
}
