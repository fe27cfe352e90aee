//! Forwarder lifecycle and accept loop.
//!
//! `Forwarder::start` binds the listening socket and spawns the accept
//! loop on its own task, so the caller gets control back immediately.
//! Each accepted connection is handled by its own spawned task; slow
//! clients or a stalled upstream never block sibling connections.

use std::net::{Ipv4Addr, SocketAddr};
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;

use tokio::net::TcpListener;
use tokio::sync::watch;
use tokio::task::JoinHandle;
use tracing::{debug, error, info, warn, Instrument};

use super::error::ForwarderError;
use super::handler;

/// Default transfer buffer size for the client-side writer.
pub const DEFAULT_BUFFER_SIZE: usize = 2048;

/// Configuration for a forwarder instance.
///
/// Immutable once the forwarder has started.
#[derive(Debug, Clone)]
pub struct ForwarderConfig {
    /// Local port to listen on.
    pub port: u16,
    /// Upstream base URL; never ends in `/` after construction.
    pub target_base_url: String,
    /// Size of the buffered writer used to relay responses.
    pub buffer_size: usize,
}

impl ForwarderConfig {
    /// Create a configuration for `port`, forwarding to `target_base_url`.
    ///
    /// Any trailing slashes on the base URL are stripped, so that
    /// concatenating a request path (which always starts with `/`)
    /// yields a well-formed upstream URL.
    pub fn new(port: u16, target_base_url: impl Into<String>) -> Self {
        let target_base_url = target_base_url
            .into()
            .trim_end_matches('/')
            .to_string();
        Self {
            port,
            target_base_url,
            buffer_size: DEFAULT_BUFFER_SIZE,
        }
    }
}

/// Counters for a forwarder instance.
#[derive(Debug, Default)]
pub struct ForwarderStats {
    /// Total connections accepted.
    pub connections_accepted: AtomicU64,
    /// Connections currently being handled.
    pub connections_active: AtomicU64,
    /// Connections fully closed.
    pub connections_closed: AtomicU64,
    /// Requests successfully relayed end-to-end.
    pub requests_forwarded: AtomicU64,
    /// Requests rejected with 400/405 before any upstream call.
    pub requests_rejected: AtomicU64,
    /// Upstream calls that failed to complete.
    pub upstream_failures: AtomicU64,
    /// Response body bytes relayed to clients.
    pub bytes_relayed: AtomicU64,
}

/// A running forwarder.
///
/// The accept-loop task owns the listening socket; `stop` signals it to
/// exit, which drops the listener and closes the socket. A stopped
/// forwarder cannot be restarted; start a fresh instance instead.
/// Dropping the handle also stops the accept loop.
pub struct Forwarder {
    local_addr: SocketAddr,
    shutdown: watch::Sender<bool>,
    stats: Arc<ForwarderStats>,
    task: JoinHandle<()>,
}

impl Forwarder {
    /// Bind the listening socket and start accepting connections.
    ///
    /// Returns as soon as the socket is bound; the accept loop runs on
    /// its own task. Fails with [`ForwarderError::Bind`] if the port is
    /// unavailable.
    pub async fn start(config: ForwarderConfig) -> Result<Self, ForwarderError> {
        let bind_addr = SocketAddr::from((Ipv4Addr::LOCALHOST, config.port));
        let listener = match TcpListener::bind(bind_addr).await {
            Ok(listener) => listener,
            Err(e) => {
                error!(port = config.port, error = %e, "Failed to bind listening socket");
                return Err(ForwarderError::Bind(e));
            }
        };
        let local_addr = listener.local_addr().map_err(ForwarderError::Bind)?;

        let client = reqwest::Client::builder()
            .build()
            .map_err(ForwarderError::Client)?;

        info!(
            local_addr = %local_addr,
            target_base_url = %config.target_base_url,
            "Forwarder listening"
        );

        let stats = Arc::new(ForwarderStats::default());
        let (shutdown, shutdown_rx) = watch::channel(false);

        let config = Arc::new(config);
        let loop_stats = Arc::clone(&stats);
        let task = tokio::spawn(accept_loop(listener, config, client, loop_stats, shutdown_rx));

        Ok(Self {
            local_addr,
            shutdown,
            stats,
            task,
        })
    }

    /// The address the listening socket is bound to.
    pub fn local_addr(&self) -> SocketAddr {
        self.local_addr
    }

    /// Forwarder counters.
    pub fn stats(&self) -> &ForwarderStats {
        &self.stats
    }

    /// Stop accepting new connections.
    ///
    /// Idempotent; safe to call at any time, including before or after
    /// the accept loop has already exited. In-flight connections run to
    /// completion, they are not interrupted.
    pub fn stop(&self) {
        let _ = self.shutdown.send(true);
    }

    /// Wait for the accept loop to exit.
    pub async fn join(self) {
        let _ = self.task.await;
    }
}

/// Accept connections until shutdown is signalled or accept fails.
///
/// Owns the listening socket; dropping it on exit closes the socket.
async fn accept_loop(
    listener: TcpListener,
    config: Arc<ForwarderConfig>,
    client: reqwest::Client,
    stats: Arc<ForwarderStats>,
    mut shutdown: watch::Receiver<bool>,
) {
    loop {
        tokio::select! {
            accepted = listener.accept() => {
                let (stream, peer_addr) = match accepted {
                    Ok(pair) => pair,
                    Err(e) => {
                        // Fatal for this instance; no automatic restart.
                        error!(error = %e, "Accept failed, forwarder shutting down");
                        break;
                    }
                };

                stats.connections_accepted.fetch_add(1, Ordering::Relaxed);
                stats.connections_active.fetch_add(1, Ordering::Relaxed);

                let config = Arc::clone(&config);
                let client = client.clone();
                let stats = Arc::clone(&stats);

                tokio::spawn(
                    async move {
                        if let Err(e) =
                            handler::handle_connection(stream, &config, &client, &stats).await
                        {
                            if e.is_client_disconnect() {
                                debug!(error = %e, "Connection closed by client");
                            } else {
                                warn!(error = %e, "Connection failed");
                            }
                        }

                        stats.connections_active.fetch_sub(1, Ordering::Relaxed);
                        stats.connections_closed.fetch_add(1, Ordering::Relaxed);
                    }
                    .instrument(tracing::info_span!("connection", peer = %peer_addr)),
                );
            }
            _ = shutdown.changed() => {
                debug!("Shutdown signalled");
                break;
            }
        }
    }

    info!("Forwarder stopped");
}
