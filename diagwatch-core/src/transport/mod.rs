//! Outbound transports for published snapshots.
//!
//! The publisher hands every changed snapshot to a [`Transport`]. Transports
//! are fire-and-forget: `publish` returns as soon as the snapshot is queued or
//! written and never waits for a subscriber to acknowledge it.
//!
//! - [`LatchedTopic`]: in-process retained delivery for late subscribers
//! - [`FileTransport`]: the latest snapshot as a JSON file
//! - [`FanoutTransport`]: several of the above at once

mod file;
mod latched;

pub use file::FileTransport;
pub use latched::{LatchedTopic, Subscription};

use std::fmt::Debug;
use std::sync::Arc;

use diagwatch_types::Snapshot;
use parking_lot::Mutex;
use tracing::{trace, warn};

use crate::change;
use crate::error::PublishError;

/// Destination for published snapshots.
///
/// An error means the snapshot was not delivered; the publisher will keep
/// treating it as unannounced and try again on the next cycle.
pub trait Transport: Send + Sync + Debug {
    /// Deliver one snapshot.
    fn publish(&self, snapshot: Arc<Snapshot>) -> Result<(), PublishError>;

    /// Human-readable description, used in logs.
    fn description(&self) -> &str;
}

impl<T: Transport + ?Sized> Transport for Arc<T> {
    fn publish(&self, snapshot: Arc<Snapshot>) -> Result<(), PublishError> {
        (**self).publish(snapshot)
    }

    fn description(&self) -> &str {
        (**self).description()
    }
}

impl<T: Transport + ?Sized> Transport for Box<T> {
    fn publish(&self, snapshot: Arc<Snapshot>) -> Result<(), PublishError> {
        (**self).publish(snapshot)
    }

    fn description(&self) -> &str {
        (**self).description()
    }
}

/// Publishes to every inner transport.
///
/// Each inner transport remembers the last snapshot it accepted. A snapshot
/// that does not differ from that one (see [`change::differs`]) is skipped
/// for it, so when one sink fails and the publisher retries, only the failed
/// sink sees the retry. If any transport fails the first error is returned.
#[derive(Debug, Default)]
pub struct FanoutTransport {
    outlets: Vec<Outlet>,
    description: String,
}

#[derive(Debug)]
struct Outlet {
    transport: Box<dyn Transport>,
    delivered: Mutex<Option<Arc<Snapshot>>>,
}

impl FanoutTransport {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with(mut self, transport: impl Transport + 'static) -> Self {
        if !self.description.is_empty() {
            self.description.push_str(", ");
        }
        self.description.push_str(transport.description());
        self.outlets.push(Outlet {
            transport: Box::new(transport),
            delivered: Mutex::new(None),
        });
        self
    }

    pub fn len(&self) -> usize {
        self.outlets.len()
    }

    pub fn is_empty(&self) -> bool {
        self.outlets.is_empty()
    }
}

impl Transport for FanoutTransport {
    fn publish(&self, snapshot: Arc<Snapshot>) -> Result<(), PublishError> {
        let mut first_error = None;
        for outlet in &self.outlets {
            let mut delivered = outlet.delivered.lock();
            if !change::differs(&snapshot, delivered.as_deref()) {
                trace!(
                    transport = outlet.transport.description(),
                    "already delivered, skipping"
                );
                continue;
            }
            match outlet.transport.publish(snapshot.clone()) {
                Ok(()) => *delivered = Some(snapshot.clone()),
                Err(e) => {
                    warn!(transport = outlet.transport.description(), error = %e, "publish failed");
                    first_error.get_or_insert(e);
                }
            }
        }
        first_error.map_or(Ok(()), Err)
    }

    fn description(&self) -> &str {
        &self.description
    }
}
