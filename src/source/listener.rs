//! TCP listener accepting many producers.
//!
//! Each accepted connection is read as an NDJSON stream of report batches.
//! Connections are independent: one producer sending garbage or hanging up
//! does not affect the others.

use std::io;
use std::net::SocketAddr;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::Arc;

use diagwatch_core::IngestHandle;
use tokio::net::{TcpListener, ToSocketAddrs};
use tokio::task::JoinHandle;
use tracing::{debug, info, warn};

use super::stream::read_lines;
use super::{set_error, snapshot_of, ReportSource, SharedState, SourceStats};

/// A source accepting producer connections on a TCP port.
#[derive(Debug)]
pub struct ListenerSource {
    description: String,
    local_addr: SocketAddr,
    shared: SharedState,
    connections: Arc<AtomicUsize>,
    task: JoinHandle<()>,
}

impl ListenerSource {
    /// Bind to `addr` and start accepting producers.
    pub async fn bind<A: ToSocketAddrs>(addr: A, handle: IngestHandle) -> io::Result<Self> {
        let listener = TcpListener::bind(addr).await?;
        let local_addr = listener.local_addr()?;
        let description = format!("listen: {}", local_addr);
        info!(%local_addr, "accepting report batches");

        let shared = SharedState::default();
        let connections = Arc::new(AtomicUsize::new(0));
        let task = tokio::spawn(accept_loop(
            listener,
            handle,
            shared.clone(),
            connections.clone(),
        ));

        Ok(Self {
            description,
            local_addr,
            shared,
            connections,
            task,
        })
    }

    pub fn local_addr(&self) -> SocketAddr {
        self.local_addr
    }

    /// Number of producers currently connected.
    pub fn connections(&self) -> usize {
        self.connections.load(Ordering::Relaxed)
    }

    /// Stop accepting new producers. Open connections finish on their own.
    pub fn abort(&self) {
        self.task.abort();
    }
}

async fn accept_loop(
    listener: TcpListener,
    handle: IngestHandle,
    shared: SharedState,
    connections: Arc<AtomicUsize>,
) {
    loop {
        match listener.accept().await {
            Ok((stream, peer)) => {
                let handle = handle.clone();
                let shared = shared.clone();
                let connections = connections.clone();
                connections.fetch_add(1, Ordering::Relaxed);
                debug!(%peer, "producer connected");

                tokio::spawn(async move {
                    let source = format!("tcp: {}", peer);
                    read_lines(stream, &handle, &shared, &source).await;
                    connections.fetch_sub(1, Ordering::Relaxed);
                    debug!(%peer, "producer disconnected");
                });
            }
            Err(e) => {
                warn!(error = %e, "accept failed");
                set_error(&shared, format!("Accept error: {}", e));
            }
        }
    }
}

impl ReportSource for ListenerSource {
    fn description(&self) -> &str {
        &self.description
    }

    fn stats(&self) -> SourceStats {
        snapshot_of(&self.shared).0
    }

    fn last_error(&self) -> Option<String> {
        snapshot_of(&self.shared).1
    }

    fn is_finished(&self) -> bool {
        self.task.is_finished()
    }
}
