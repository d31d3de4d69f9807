//! TCP listener and connection handling.
//!
//! Each accepted connection is handled in its own task:
//! sniff the `Host` header, map it to a slug, resolve the target, connect
//! (loopback for local targets, a pool tunnel for remote ones), replay the sniffed
//! bytes and forward until either side closes.

use std::io;
use std::net::SocketAddr;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;
use std::time::Duration;

use hoster_model::ProxyTarget;
use hoster_networking::HostnameParser;
use hoster_node_pool::{BoxedStream, ClientProvider};
use serde::Serialize;
use tokio::io::AsyncWriteExt;
use tokio::net::{TcpListener, TcpStream};
use tokio::sync::Semaphore;
use tracing::{debug, error, info, warn, Instrument};

use super::error::ProxyError;
use super::forward::{proxy_bidirectional, ForwardError, ForwardOptions};
use super::sniff::{HostSniffer, SniffConfig, SniffResult};
use super::table::SharedTargetTable;

/// Default maximum concurrent connections per listener.
pub const DEFAULT_MAX_CONNECTIONS: usize = 10000;

/// Default timeout for dialing a local target.
pub const DEFAULT_CONNECT_TIMEOUT: Duration = Duration::from_secs(2);

#[derive(Debug, Clone)]
pub struct ListenerConfig {
    pub bind_addr: SocketAddr,
    pub max_connections: usize,
    pub sniff: SniffConfig,
    pub connect_timeout: Duration,
    /// Close a forwarded connection after this long without data in either direction.
    pub idle_timeout: Option<Duration>,
}

impl ListenerConfig {
    pub fn new(bind_addr: SocketAddr) -> Self {
        Self {
            bind_addr,
            max_connections: DEFAULT_MAX_CONNECTIONS,
            sniff: SniffConfig::default(),
            connect_timeout: DEFAULT_CONNECT_TIMEOUT,
            idle_timeout: None,
        }
    }
}

#[derive(Debug, Default)]
pub struct ListenerStats {
    pub connections_accepted: AtomicU64,
    pub connections_active: AtomicU64,
    /// Dropped because `max_connections` was reached.
    pub connections_rejected: AtomicU64,
    pub not_found: AtomicU64,
    pub stopped: AtomicU64,
    pub unavailable: AtomicU64,
    pub bad_request: AtomicU64,
    /// Request heads delivered to a target.
    pub forwarded: AtomicU64,
    pub bytes_to_target: AtomicU64,
    pub bytes_from_target: AtomicU64,
}

/// Point-in-time copy of [`ListenerStats`].
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize)]
pub struct StatsSnapshot {
    pub connections_accepted: u64,
    pub connections_active: u64,
    pub connections_rejected: u64,
    pub not_found: u64,
    pub stopped: u64,
    pub unavailable: u64,
    pub bad_request: u64,
    pub forwarded: u64,
    pub bytes_to_target: u64,
    pub bytes_from_target: u64,
}

impl ListenerStats {
    pub fn snapshot(&self) -> StatsSnapshot {
        let load = |c: &AtomicU64| c.load(Ordering::Relaxed);
        StatsSnapshot {
            connections_accepted: load(&self.connections_accepted),
            connections_active: load(&self.connections_active),
            connections_rejected: load(&self.connections_rejected),
            not_found: load(&self.not_found),
            stopped: load(&self.stopped),
            unavailable: load(&self.unavailable),
            bad_request: load(&self.bad_request),
            forwarded: load(&self.forwarded),
            bytes_to_target: load(&self.bytes_to_target),
            bytes_from_target: load(&self.bytes_from_target),
        }
    }

    fn record_error(&self, error: &ProxyError) {
        let counter = match error {
            ProxyError::NotFound { .. } => &self.not_found,
            ProxyError::Stopped { .. } => &self.stopped,
            ProxyError::Unavailable { .. } => &self.unavailable,
            ProxyError::BadRequest(_) => &self.bad_request,
        };
        counter.fetch_add(1, Ordering::Relaxed);
    }
}

/// Map a `Host` header to its slug and a routable target.
pub fn resolve_target(
    parser: &HostnameParser,
    targets: &SharedTargetTable,
    host: &str,
) -> Result<(String, ProxyTarget), ProxyError> {
    let not_found = || ProxyError::NotFound {
        host: host.to_string(),
    };
    let slug = parser.parse(host).ok_or_else(not_found)?;
    let target = targets.resolve(&slug).ok_or_else(not_found)?;

    if !target.can_route() {
        return Err(ProxyError::Stopped {
            slug,
            status: target.status,
        });
    }
    Ok((slug, target))
}

pub struct Listener {
    config: ListenerConfig,
    listener: TcpListener,
    parser: HostnameParser,
    targets: SharedTargetTable,
    clients: Arc<dyn ClientProvider>,
    conn_semaphore: Arc<Semaphore>,
    sniffer: HostSniffer,
    stats: Arc<ListenerStats>,
}

impl Listener {
    pub async fn bind(
        config: ListenerConfig,
        parser: HostnameParser,
        targets: SharedTargetTable,
        clients: Arc<dyn ClientProvider>,
    ) -> io::Result<Self> {
        let listener = TcpListener::bind(config.bind_addr).await?;
        let local_addr = listener.local_addr()?;

        info!(
            bind_addr = %local_addr,
            base_domain = %parser.base_domain(),
            max_connections = config.max_connections,
            "Listener bound"
        );

        Ok(Self {
            conn_semaphore: Arc::new(Semaphore::new(config.max_connections)),
            sniffer: HostSniffer::with_config(config.sniff.clone()),
            listener,
            config,
            parser,
            targets,
            clients,
            stats: Arc::new(ListenerStats::default()),
        })
    }

    pub fn local_addr(&self) -> io::Result<SocketAddr> {
        self.listener.local_addr()
    }

    pub fn stats(&self) -> Arc<ListenerStats> {
        Arc::clone(&self.stats)
    }

    /// Accept connections until the task is cancelled.
    pub async fn run(self: Arc<Self>) -> io::Result<()> {
        loop {
            match self.listener.accept().await {
                Ok((stream, peer_addr)) => {
                    let permit = match self.conn_semaphore.clone().try_acquire_owned() {
                        Ok(permit) => permit,
                        Err(_) => {
                            self.stats
                                .connections_rejected
                                .fetch_add(1, Ordering::Relaxed);
                            warn!(peer_addr = %peer_addr, "Connection rejected: max connections reached");
                            continue;
                        }
                    };

                    self.stats
                        .connections_accepted
                        .fetch_add(1, Ordering::Relaxed);
                    self.stats
                        .connections_active
                        .fetch_add(1, Ordering::Relaxed);

                    let listener = Arc::clone(&self);
                    tokio::spawn(
                        async move {
                            if let Err(e) = listener.handle_connection(stream).await {
                                debug!(error = %e, "Connection error");
                            }
                            listener
                                .stats
                                .connections_active
                                .fetch_sub(1, Ordering::Relaxed);
                            drop(permit);
                        }
                        .instrument(tracing::info_span!("connection", peer = %peer_addr)),
                    );
                }
                Err(e) => {
                    error!(error = %e, "Accept error");
                    tokio::time::sleep(Duration::from_millis(100)).await;
                }
            }
        }
    }

    async fn handle_connection(&self, mut client: TcpStream) -> io::Result<()> {
        let mut head = Vec::new();
        let host = match self.sniffer.inspect(&mut client, &mut head).await {
            SniffResult::Found(host) => host,
            // No hostname matches no deployment.
            SniffResult::NoHost => String::new(),
            SniffResult::Closed => return Ok(()),
            SniffResult::IoError(e) => return Err(io::Error::other(e)),
            SniffResult::Malformed => {
                return self
                    .reject(&mut client, ProxyError::BadRequest("invalid request head".into()))
                    .await;
            }
            SniffResult::Timeout => {
                return self
                    .reject(&mut client, ProxyError::BadRequest("request head timed out".into()))
                    .await;
            }
        };

        let (slug, target) = match resolve_target(&self.parser, &self.targets, &host) {
            Ok(resolved) => resolved,
            Err(e) => return self.reject(&mut client, e).await,
        };

        let mut upstream = match self.connect(&slug, &target).await {
            Ok(stream) => stream,
            Err(e) => return self.reject(&mut client, e).await,
        };

        if let Err(e) = upstream.write_all(&head).await {
            self.mark_unreachable(&target).await;
            let err = ProxyError::Unavailable {
                slug,
                reason: e.to_string(),
            };
            return self.reject(&mut client, err).await;
        }

        self.stats.forwarded.fetch_add(1, Ordering::Relaxed);
        debug!(
            slug = %slug,
            deployment_id = %target.deployment_id,
            local = target.is_local(),
            "Forwarding connection"
        );

        let options = ForwardOptions {
            idle_timeout: self.config.idle_timeout,
            expect_response: true,
        };
        let result = proxy_bidirectional(
            &mut client,
            &mut upstream,
            options,
            &self.stats.bytes_to_target,
            &self.stats.bytes_from_target,
        )
        .await;

        match result {
            Ok(()) => Ok(()),
            // A tunnel whose channel failed to open looks like this too.
            Err(ForwardError::NoResponse(e)) => {
                drop(upstream);
                self.mark_unreachable(&target).await;
                let err = ProxyError::Unavailable {
                    slug,
                    reason: e.to_string(),
                };
                self.reject(&mut client, err).await
            }
            Err(ForwardError::Io(e)) => Err(e),
        }
    }

    async fn connect(&self, slug: &str, target: &ProxyTarget) -> Result<BoxedStream, ProxyError> {
        let unavailable = |reason: String| ProxyError::Unavailable {
            slug: slug.to_string(),
            reason,
        };

        match &target.node_id {
            Some(node_id) if !target.is_local() => {
                let client = match self.clients.client(node_id).await {
                    Ok(client) => client,
                    Err(e) => {
                        warn!(node_id = %node_id, error = %e, "Node unreachable");
                        return Err(unavailable(e.to_string()));
                    }
                };
                match client.open_stream(target.port).await {
                    Ok(stream) => Ok(stream),
                    Err(e) => {
                        warn!(node_id = %node_id, error = %e, "Tunnel stream failed");
                        self.clients.invalidate(node_id).await;
                        Err(unavailable(e.to_string()))
                    }
                }
            }
            _ => {
                let addr = target.local_addr();
                match tokio::time::timeout(self.config.connect_timeout, TcpStream::connect(addr))
                    .await
                {
                    Ok(Ok(stream)) => {
                        let _ = stream.set_nodelay(true);
                        Ok(Box::new(stream) as BoxedStream)
                    }
                    Ok(Err(e)) => Err(unavailable(format!("connect {addr}: {e}"))),
                    Err(_) => Err(unavailable(format!("connect {addr}: timed out"))),
                }
            }
        }
    }

    async fn mark_unreachable(&self, target: &ProxyTarget) {
        if let Some(node_id) = target.node_id.as_ref().filter(|_| !target.is_local()) {
            self.clients.invalidate(node_id).await;
        }
    }

    async fn reject(&self, client: &mut TcpStream, error: ProxyError) -> io::Result<()> {
        self.stats.record_error(&error);
        match &error {
            ProxyError::Unavailable { .. } => warn!(error = %error, "Target unavailable"),
            _ => debug!(status = error.status_code(), error = %error, "Rejecting request"),
        }
        client.write_all(&error.to_response()).await?;
        client.shutdown().await
    }
}
