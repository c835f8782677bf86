//! TCP server implementation.
//!
//! The accept loop is async; each accepted connection converts to a
//! blocking std stream and is served on its own blocking task, because one
//! conversation is one synchronous thread of control end to end.

use crate::error::ServerError;
use crate::registry::ProtocolRegistry;
use crate::session::Session;
use crate::stream::{MaybeTlsStream, SharedStream};
use crate::tls;
use std::net::SocketAddr;
use std::sync::atomic::{AtomicBool, AtomicU64, Ordering};
use std::sync::Arc;
use std::time::Duration;
use tokio::net::TcpListener;
use tokio::sync::broadcast;

/// Server configuration.
#[derive(Clone)]
pub struct ServerConfig {
    /// Address to bind to.
    pub bind_addr: SocketAddr,
    /// Idle connection timeout; enforced as a socket read timeout.
    pub idle_timeout: Duration,
    /// Maximum concurrent connections.
    pub max_connections: usize,
    /// TLS configuration (if TLS is enabled).
    pub tls: Option<Arc<rustls::ServerConfig>>,
}

impl std::fmt::Debug for ServerConfig {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("ServerConfig")
            .field("bind_addr", &self.bind_addr)
            .field("idle_timeout", &self.idle_timeout)
            .field("max_connections", &self.max_connections)
            .field("tls_enabled", &self.tls.is_some())
            .finish()
    }
}

impl Default for ServerConfig {
    fn default() -> Self {
        Self {
            bind_addr: format!("127.0.0.1:{}", sigildb_protocol::DEFAULT_PORT)
                .parse()
                .expect("default bind address"),
            idle_timeout: Duration::from_secs(300),
            max_connections: 1000,
            tls: None,
        }
    }
}

impl ServerConfig {
    pub fn new(bind_addr: SocketAddr) -> Self {
        Self {
            bind_addr,
            ..Default::default()
        }
    }

    /// Sets the TLS configuration.
    pub fn with_tls(mut self, tls: Arc<rustls::ServerConfig>) -> Self {
        self.tls = Some(tls);
        self
    }

    /// Returns whether TLS is enabled.
    pub fn tls_enabled(&self) -> bool {
        self.tls.is_some()
    }
}

/// Server statistics.
#[derive(Debug, Default)]
pub struct ServerStats {
    pub connections_total: AtomicU64,
    pub connections_active: AtomicU64,
    pub errors_total: AtomicU64,
}

/// TCP server for sigildb.
pub struct Server {
    config: ServerConfig,
    registry: Arc<ProtocolRegistry>,
    stats: Arc<ServerStats>,
    shutdown: broadcast::Sender<()>,
    running: AtomicBool,
    /// Bound address once running; differs from config when port 0 is used.
    bound_addr: parking_lot::Mutex<Option<SocketAddr>>,
}

impl Server {
    /// Creates a new server.
    pub fn new(config: ServerConfig, registry: ProtocolRegistry) -> Self {
        let (shutdown_tx, _) = broadcast::channel(1);
        Self {
            config,
            registry: Arc::new(registry),
            stats: Arc::new(ServerStats::default()),
            shutdown: shutdown_tx,
            running: AtomicBool::new(false),
            bound_addr: parking_lot::Mutex::new(None),
        }
    }

    /// Runs the server until shutdown.
    pub async fn run(&self) -> Result<(), ServerError> {
        let listener = TcpListener::bind(self.config.bind_addr).await?;
        let local_addr = listener.local_addr()?;
        *self.bound_addr.lock() = Some(local_addr);
        self.running.store(true, Ordering::SeqCst);

        let tls_mode = if self.config.tls_enabled() {
            "TLS"
        } else {
            "plain"
        };
        tracing::info!("Server listening on {} ({})", local_addr, tls_mode);

        let mut shutdown_rx = self.shutdown.subscribe();

        loop {
            tokio::select! {
                result = listener.accept() => {
                    match result {
                        Ok((tcp_stream, addr)) => {
                            if self.stats.connections_active.load(Ordering::Relaxed)
                                >= self.config.max_connections as u64
                            {
                                tracing::warn!("Connection limit reached, rejecting {}", addr);
                                continue;
                            }

                            self.stats.connections_total.fetch_add(1, Ordering::Relaxed);
                            self.stats.connections_active.fetch_add(1, Ordering::Relaxed);

                            let registry = self.registry.clone();
                            let stats = self.stats.clone();
                            let config = self.config.clone();

                            tokio::spawn(async move {
                                let result = tokio::task::spawn_blocking(move || {
                                    Self::serve_connection(tcp_stream, addr, registry, config)
                                })
                                .await;

                                match result {
                                    Ok(Ok(())) => {}
                                    Ok(Err(e)) => {
                                        tracing::debug!("Connection {} error: {}", addr, e);
                                        stats.errors_total.fetch_add(1, Ordering::Relaxed);
                                    }
                                    Err(e) => {
                                        tracing::error!("Connection task for {} panicked: {}", addr, e);
                                        stats.errors_total.fetch_add(1, Ordering::Relaxed);
                                    }
                                }

                                stats.connections_active.fetch_sub(1, Ordering::Relaxed);
                                tracing::info!("Client disconnected: {}", addr);
                            });
                        }
                        Err(e) => {
                            tracing::error!("Accept error: {}", e);
                        }
                    }
                }
                _ = shutdown_rx.recv() => {
                    tracing::info!("Server shutting down");
                    break;
                }
            }
        }

        self.running.store(false, Ordering::SeqCst);
        Ok(())
    }

    /// Serves one connection to completion on a blocking thread.
    fn serve_connection(
        tcp_stream: tokio::net::TcpStream,
        addr: SocketAddr,
        registry: Arc<ProtocolRegistry>,
        config: ServerConfig,
    ) -> Result<(), ServerError> {
        let std_stream = tcp_stream.into_std()?;
        std_stream.set_nonblocking(false)?;
        // A stalled peer surfaces as a read timeout, which the conversation
        // reports as a terminal protocol error rather than hanging.
        std_stream.set_read_timeout(Some(config.idle_timeout))?;
        std_stream.set_write_timeout(Some(config.idle_timeout))?;

        let stream = match &config.tls {
            Some(tls_config) => {
                tracing::debug!("[{}] Performing TLS handshake", addr);
                tls::accept(tls_config.clone(), std_stream)?
            }
            None => MaybeTlsStream::Plain(std_stream),
        };

        let tls_status = if stream.is_tls() { " (TLS)" } else { "" };
        tracing::info!("Client connected: {}{}", addr, tls_status);

        let session = Session::new(addr);
        let shared = SharedStream::new(stream);
        let mut input = shared.clone();
        let mut output = shared;

        let result = registry.handle(&session, &mut input, &mut output);
        tracing::debug!(
            session = %session.id,
            requests = session.request_count(),
            age_ms = session.age().as_millis() as u64,
            "session closed"
        );
        result
    }

    /// Initiates server shutdown.
    pub fn shutdown(&self) {
        let _ = self.shutdown.send(());
    }

    /// Returns whether the server is running.
    pub fn is_running(&self) -> bool {
        self.running.load(Ordering::SeqCst)
    }

    /// The bound address once the server is running.
    pub fn local_addr(&self) -> Option<SocketAddr> {
        *self.bound_addr.lock()
    }

    /// Returns server statistics.
    pub fn stats(&self) -> &ServerStats {
        &self.stats
    }
}
