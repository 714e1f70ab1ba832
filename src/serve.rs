//! Latched snapshot server.
//!
//! Every client connecting over TCP immediately receives the current summary
//! as one JSON line, then one line per later change. Clients that cannot keep
//! up miss intermediate snapshots (see [`LatchedTopic::subscribe`]).

use std::io;
use std::net::SocketAddr;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::Arc;

use diagwatch_core::transport::{LatchedTopic, Subscription, Transport};
use diagwatch_core::Snapshot;
use tokio::io::{AsyncWrite, AsyncWriteExt};
use tokio::net::{TcpListener, ToSocketAddrs};
use tokio::task::JoinHandle;
use tracing::{debug, info, warn};

/// Serves a [`LatchedTopic`] as newline-delimited JSON over TCP.
#[derive(Debug)]
pub struct SnapshotServer {
    local_addr: SocketAddr,
    clients: Arc<AtomicUsize>,
    task: JoinHandle<()>,
}

impl SnapshotServer {
    /// Bind to `addr` and start serving `topic`.
    pub async fn bind<A: ToSocketAddrs>(addr: A, topic: LatchedTopic) -> io::Result<Self> {
        let listener = TcpListener::bind(addr).await?;
        let local_addr = listener.local_addr()?;
        info!(%local_addr, topic = topic.description(), "serving snapshots");

        let clients = Arc::new(AtomicUsize::new(0));
        let task_clients = clients.clone();
        let task = tokio::spawn(async move {
            loop {
                match listener.accept().await {
                    Ok((stream, peer)) => {
                        let subscription = topic.subscribe();
                        let clients = task_clients.clone();
                        clients.fetch_add(1, Ordering::Relaxed);
                        debug!(%peer, "client connected");

                        tokio::spawn(async move {
                            if let Err(e) = forward(subscription, stream).await {
                                debug!(%peer, error = %e, "client write failed");
                            }
                            clients.fetch_sub(1, Ordering::Relaxed);
                            debug!(%peer, "client disconnected");
                        });
                    }
                    Err(e) => warn!(error = %e, "accept failed"),
                }
            }
        });

        Ok(Self {
            local_addr,
            clients,
            task,
        })
    }

    pub fn local_addr(&self) -> SocketAddr {
        self.local_addr
    }

    /// Number of clients currently connected.
    pub fn clients(&self) -> usize {
        self.clients.load(Ordering::Relaxed)
    }

    /// Stop accepting clients.
    pub fn abort(&self) {
        self.task.abort();
    }
}

/// Write the newest retained snapshot, then every later one, until the topic
/// closes or the writer fails.
pub async fn forward<W>(mut subscription: Subscription, mut writer: W) -> io::Result<()>
where
    W: AsyncWrite + Unpin,
{
    if let Some(snapshot) = subscription.latest() {
        write_line(&mut writer, &snapshot).await?;
    }
    while let Some(snapshot) = subscription.recv().await {
        write_line(&mut writer, &snapshot).await?;
    }
    writer.shutdown().await
}

async fn write_line<W>(writer: &mut W, snapshot: &Snapshot) -> io::Result<()>
where
    W: AsyncWrite + Unpin,
{
    let mut line = serde_json::to_vec(snapshot)?;
    line.push(b'\n');
    writer.write_all(&line).await?;
    writer.flush().await
}
