use std::future::Future;
use std::net::SocketAddr;
use std::sync::Arc;
use std::time::Duration;

use anyhow::Context;
use tokio::net::{TcpListener, TcpSocket, TcpStream, lookup_host};
use tokio::sync::{OwnedSemaphorePermit, Semaphore};
use tokio::task::JoinSet;
use tracing::{Instrument, debug, error, info, info_span, warn};

use crate::config::Config;
use crate::http::connection::Connection;
use crate::http::parser::ParseLimits;
use crate::router::Router;

/// Pause after a failed accept, e.g. when the process is out of descriptors.
const ACCEPT_BACKOFF: Duration = Duration::from_millis(100);

/// Owns the listening socket and every client connection.
///
/// All connections run as tasks on the runtime that calls [`Server::run`];
/// with a current-thread runtime that is a single readiness-driven loop.
pub struct Server {
    listener: TcpListener,
    router: Arc<Router>,
    permits: Arc<Semaphore>,
    limits: ParseLimits,
    idle_timeout: Option<Duration>,
}

impl Server {
    /// Resolves the listen address, binds with `SO_REUSEADDR` and starts
    /// listening with the configured backlog.
    pub async fn bind(cfg: &Config) -> anyhow::Result<Self> {
        let router = Router::from_config(&cfg.files)?;

        let listen_addr = cfg.listen_addr();
        let addr = lookup_host(&listen_addr)
            .await
            .with_context(|| format!("Failed to resolve {}", listen_addr))?
            .next()
            .with_context(|| format!("No address found for {}", listen_addr))?;

        let socket = match addr {
            SocketAddr::V4(_) => TcpSocket::new_v4()?,
            SocketAddr::V6(_) => TcpSocket::new_v6()?,
        };
        socket.set_reuseaddr(true)?;
        socket
            .bind(addr)
            .with_context(|| format!("Failed to bind to {}", addr))?;
        let listener = socket
            .listen(cfg.server.backlog)
            .with_context(|| format!("Failed to listen on {}", addr))?;

        info!("Listening on {}", listener.local_addr()?);

        Ok(Self {
            listener,
            router: Arc::new(router),
            permits: Arc::new(Semaphore::new(cfg.server.max_connections)),
            limits: cfg.parse_limits(),
            idle_timeout: cfg.idle_timeout(),
        })
    }

    pub fn local_addr(&self) -> std::io::Result<SocketAddr> {
        self.listener.local_addr()
    }

    /// Accepts and serves connections until `shutdown` resolves.
    ///
    /// On shutdown the listener stops accepting and in-flight connections
    /// are aborted, which drops (and closes) their sockets.
    pub async fn run<F>(self, shutdown: F) -> anyhow::Result<()>
    where
        F: Future<Output = ()>,
    {
        let mut tasks = JoinSet::new();
        tokio::pin!(shutdown);

        loop {
            tokio::select! {
                _ = &mut shutdown => {
                    info!("Shutdown signal received");
                    break;
                }

                Some(joined) = tasks.join_next(), if !tasks.is_empty() => {
                    if let Err(e) = joined {
                        if e.is_panic() {
                            error!("Connection task panicked: {}", e);
                        }
                    }
                }

                accepted = self.accept() => {
                    let (socket, peer, permit) = match accepted {
                        Ok(accepted) => accepted,
                        Err(e) => {
                            warn!("Failed to accept connection: {:#}", e);
                            tokio::time::sleep(ACCEPT_BACKOFF).await;
                            continue;
                        }
                    };
                    info!("Accepted connection from {}", peer);

                    let mut conn = Connection::new(socket, self.router.clone())
                        .with_limits(self.limits)
                        .with_idle_timeout(self.idle_timeout);

                    tasks.spawn(
                        async move {
                            if let Err(e) = conn.run().await {
                                warn!("Connection error from {}: {:#}", peer, e);
                            }
                            debug!("Connection closed");
                            drop(permit);
                        }
                        .instrument(info_span!("conn", %peer)),
                    );
                }
            }
        }

        tasks.shutdown().await;
        Ok(())
    }

    async fn accept(&self) -> anyhow::Result<(TcpStream, SocketAddr, OwnedSemaphorePermit)> {
        // Wait for a free slot first so excess clients queue in the backlog.
        let permit = self
            .permits
            .clone()
            .acquire_owned()
            .await
            .context("Connection limiter closed")?;
        let (socket, peer) = self.listener.accept().await?;
        Ok((socket, peer, permit))
    }
}
