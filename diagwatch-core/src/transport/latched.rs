//! In-process latched topic.
//!
//! Keeps the last `depth` published snapshots. A subscriber that connects at
//! any time first receives that retained history (newest last), then every
//! later publish, so a late joiner sees the current summary immediately
//! without waiting for the next change.

use std::collections::VecDeque;
use std::sync::Arc;

use diagwatch_types::Snapshot;
use parking_lot::Mutex;
use tokio::sync::broadcast::{self, error::RecvError, error::TryRecvError};
use tracing::{debug, warn};

use super::Transport;
use crate::error::PublishError;

#[derive(Debug)]
struct LatchedState {
    retained: VecDeque<Arc<Snapshot>>,
    /// `None` once the topic is closed.
    sender: Option<broadcast::Sender<Arc<Snapshot>>>,
}

/// A topic with keep-last-N, transient-local style delivery.
///
/// Cloning is cheap and every clone refers to the same topic, so the
/// aggregator can own one clone as its transport while the application keeps
/// another for subscribing.
///
/// # Example
///
/// ```rust
/// use std::sync::Arc;
/// use diagwatch_core::transport::{LatchedTopic, Transport};
/// use diagwatch_core::Snapshot;
///
/// let topic = LatchedTopic::new("diagnostics_agg", 10);
/// topic.publish(Arc::new(Snapshot::builder().build())).unwrap();
///
/// // Subscribing after the fact still yields the retained snapshot.
/// let mut late = topic.subscribe();
/// assert!(late.try_recv().is_some());
/// ```
#[derive(Debug, Clone)]
pub struct LatchedTopic {
    description: String,
    depth: usize,
    state: Arc<Mutex<LatchedState>>,
}

impl LatchedTopic {
    /// Create a topic retaining up to `depth` snapshots (at least one).
    pub fn new(name: &str, depth: usize) -> Self {
        let depth = depth.max(1);
        let (sender, _) = broadcast::channel(depth);
        Self {
            description: format!("latched: {}", name),
            depth,
            state: Arc::new(Mutex::new(LatchedState {
                retained: VecDeque::with_capacity(depth),
                sender: Some(sender),
            })),
        }
    }

    pub fn depth(&self) -> usize {
        self.depth
    }

    /// Attach a new subscriber.
    ///
    /// The returned subscription already holds the retained history. A
    /// subscriber that falls at least `depth` snapshots behind loses the
    /// oldest ones it has not read; the newest always stays queued.
    pub fn subscribe(&self) -> Subscription {
        let state = self.state.lock();
        let subscription = Subscription {
            description: self.description.clone(),
            backlog: state.retained.clone(),
            rx: state.sender.as_ref().map(broadcast::Sender::subscribe),
        };

        debug!(
            topic = %self.description,
            retained = state.retained.len(),
            "subscriber attached"
        );
        subscription
    }

    /// The most recently published snapshot, if any.
    pub fn latest(&self) -> Option<Arc<Snapshot>> {
        self.state.lock().retained.back().cloned()
    }

    /// All retained snapshots, oldest first.
    pub fn retained(&self) -> Vec<Arc<Snapshot>> {
        self.state.lock().retained.iter().cloned().collect()
    }

    /// Number of live subscribers.
    pub fn subscriber_count(&self) -> usize {
        self.state
            .lock()
            .sender
            .as_ref()
            .map_or(0, broadcast::Sender::receiver_count)
    }

    /// Refuse further publishes and end all subscriptions once drained.
    pub fn close(&self) {
        self.state.lock().sender = None;
    }

    pub fn is_closed(&self) -> bool {
        self.state.lock().sender.is_none()
    }
}

impl Transport for LatchedTopic {
    fn publish(&self, snapshot: Arc<Snapshot>) -> Result<(), PublishError> {
        let mut state = self.state.lock();
        let Some(sender) = state.sender.clone() else {
            return Err(PublishError::Closed(self.description.clone()));
        };

        if state.retained.len() == self.depth {
            state.retained.pop_front();
        }
        state.retained.push_back(snapshot.clone());

        // No receivers is not an error: the snapshot is retained for them.
        let _ = sender.send(snapshot);
        Ok(())
    }

    fn description(&self) -> &str {
        &self.description
    }
}

/// The receiving end of a [`LatchedTopic`] subscription.
#[derive(Debug)]
pub struct Subscription {
    description: String,
    backlog: VecDeque<Arc<Snapshot>>,
    rx: Option<broadcast::Receiver<Arc<Snapshot>>>,
}

impl Subscription {
    /// Wait for the next snapshot. `None` once the topic is closed and the
    /// queue is drained.
    pub async fn recv(&mut self) -> Option<Arc<Snapshot>> {
        if let Some(snapshot) = self.backlog.pop_front() {
            return Some(snapshot);
        }
        let rx = self.rx.as_mut()?;
        loop {
            match rx.recv().await {
                Ok(snapshot) => return Some(snapshot),
                Err(RecvError::Lagged(missed)) => {
                    warn!(topic = %self.description, missed, "subscriber lagged, skipped oldest snapshots")
                }
                Err(RecvError::Closed) => return None,
            }
        }
    }

    /// Take the next queued snapshot without waiting.
    pub fn try_recv(&mut self) -> Option<Arc<Snapshot>> {
        if let Some(snapshot) = self.backlog.pop_front() {
            return Some(snapshot);
        }
        let rx = self.rx.as_mut()?;
        loop {
            match rx.try_recv() {
                Ok(snapshot) => return Some(snapshot),
                Err(TryRecvError::Lagged(missed)) => {
                    warn!(topic = %self.description, missed, "subscriber lagged, skipped oldest snapshots")
                }
                Err(TryRecvError::Empty | TryRecvError::Closed) => return None,
            }
        }
    }

    /// Drain the queue and return the newest snapshot in it, if any.
    pub fn latest(&mut self) -> Option<Arc<Snapshot>> {
        let mut latest = None;
        while let Some(snapshot) = self.try_recv() {
            latest = Some(snapshot);
        }
        latest
    }
}
