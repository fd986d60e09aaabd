/// Rendezvous proxies for TCPROS connections
///
/// Each proxy owns one listening port and forwards every accepted connection,
/// byte for byte, to a single fixed target. The proxy knows nothing about the
/// payload.

use rosproxy_common::Result;
use std::fmt;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::Arc;
use tokio::net::{TcpListener, TcpStream};
use tokio::sync::watch;
use tracing::{debug, info, info_span, warn, Instrument};

use super::allocator::PortAllocator;
use crate::node::NodeRecord;

/// Real streaming endpoint a rendezvous proxy forwards to
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct RendezvousTarget {
    pub host: String,
    pub port: u16,
}

impl RendezvousTarget {
    pub fn new(host: impl Into<String>, port: u16) -> Self {
        Self {
            host: host.into(),
            port,
        }
    }
}

impl fmt::Display for RendezvousTarget {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}:{}", self.host, self.port)
    }
}

/// Handle to a running forwarding proxy
///
/// Clones share the same listener. The proxy stops when `close` is called or
/// when the last handle is dropped.
#[derive(Clone)]
pub struct RendezvousProxy {
    listen_port: u16,
    target: RendezvousTarget,
    shutdown: Arc<watch::Sender<bool>>,
    sessions: Arc<AtomicUsize>,
}

impl RendezvousProxy {
    /// Start forwarding connections accepted on `listener` to `target`
    pub fn spawn(listener: TcpListener, listen_port: u16, target: RendezvousTarget) -> Self {
        let (shutdown, shutdown_rx) = watch::channel(false);
        let sessions = Arc::new(AtomicUsize::new(0));

        let span = info_span!("rendezvous", listen_port, target = %target);
        tokio::spawn(
            accept_loop(listener, target.clone(), shutdown_rx, sessions.clone()).instrument(span),
        );

        Self {
            listen_port,
            target,
            shutdown: Arc::new(shutdown),
            sessions,
        }
    }

    pub fn listen_port(&self) -> u16 {
        self.listen_port
    }

    pub fn target(&self) -> &RendezvousTarget {
        &self.target
    }

    /// Stop accepting and tear down established sessions; idempotent
    pub fn close(&self) {
        if !self.shutdown.send_replace(true) {
            debug!(
                "Closing proxy {} ~> {} with {} open sessions",
                self.listen_port,
                self.target,
                self.sessions.load(Ordering::Relaxed)
            );
        }
    }

    pub fn is_closed(&self) -> bool {
        *self.shutdown.borrow()
    }
}

impl fmt::Debug for RendezvousProxy {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("RendezvousProxy")
            .field("listen_port", &self.listen_port)
            .field("target", &self.target)
            .field("closed", &self.is_closed())
            .finish()
    }
}

async fn accept_loop(
    listener: TcpListener,
    target: RendezvousTarget,
    mut shutdown: watch::Receiver<bool>,
    sessions: Arc<AtomicUsize>,
) {
    loop {
        tokio::select! {
            // Also fires when every handle is gone
            _ = shutdown.changed() => break,
            accepted = listener.accept() => {
                let (client, peer) = match accepted {
                    Ok(accepted) => accepted,
                    Err(e) => {
                        warn!("Accept failed: {}", e);
                        continue;
                    }
                };
                debug!("New connection from {}", peer);

                let target = target.clone();
                let shutdown = shutdown.clone();
                let sessions = sessions.clone();
                tokio::spawn(
                    async move {
                        sessions.fetch_add(1, Ordering::Relaxed);
                        if let Err(e) = forward(client, &target, shutdown).await {
                            warn!("Forwarding to {} failed: {}", target, e);
                        }
                        sessions.fetch_sub(1, Ordering::Relaxed);
                    }
                    .in_current_span(),
                );
            }
        }
    }
    debug!("Listener closed");
}

async fn forward(
    mut client: TcpStream,
    target: &RendezvousTarget,
    mut shutdown: watch::Receiver<bool>,
) -> std::io::Result<()> {
    if *shutdown.borrow() {
        return Ok(());
    }

    let mut upstream = tokio::select! {
        connected = TcpStream::connect((target.host.as_str(), target.port)) => connected?,
        _ = shutdown.changed() => {
            debug!("Proxy closed while connecting to target");
            return Ok(());
        }
    };

    // Half-closes are passed on; the session ends once both directions are done
    tokio::select! {
        result = tokio::io::copy_bidirectional(&mut client, &mut upstream) => {
            let (sent, received) = result?;
            debug!("Session closed after {} bytes out, {} bytes back", sent, received);
        }
        _ = shutdown.changed() => {
            debug!("Session torn down by proxy shutdown");
        }
    }
    Ok(())
}

/// Creates rendezvous proxies and deduplicates them per node and target
pub struct RendezvousPool {
    allocator: PortAllocator,
    advertised_host: String,
    created: AtomicUsize,
}

impl RendezvousPool {
    /// `advertised_host` is the host name handed out in rewritten addresses
    pub fn new(allocator: PortAllocator, advertised_host: impl Into<String>) -> Self {
        Self {
            allocator,
            advertised_host: advertised_host.into(),
            created: AtomicUsize::new(0),
        }
    }

    /// Total number of proxies this pool has started
    pub fn created_count(&self) -> usize {
        self.created.load(Ordering::Relaxed)
    }

    /// Bind a fresh port and start a proxy forwarding to `target`
    pub async fn open(&self, target: RendezvousTarget) -> Result<RendezvousProxy> {
        let listener = self.allocator.bind().await?;
        let listen_port = listener.local_addr()?.port();

        info!("Creating proxy: {} ~> {}", listen_port, target);
        self.created.fetch_add(1, Ordering::Relaxed);
        Ok(RendezvousProxy::spawn(listener, listen_port, target))
    }

    /// Advertised address of the node's proxy for `host:port`, starting one
    /// if the node has none for that target yet
    pub async fn get_or_create(
        &self,
        record: &mut NodeRecord,
        host: &str,
        port: u16,
    ) -> Result<(String, u16)> {
        let target = RendezvousTarget::new(host, port);
        if let Some(proxy) = record.rendezvous(&target) {
            return Ok((self.advertised_host.clone(), proxy.listen_port()));
        }

        let proxy = self.open(target.clone()).await?;
        let listen_port = proxy.listen_port();
        record.insert_rendezvous(target, proxy);
        Ok((self.advertised_host.clone(), listen_port))
    }
}
