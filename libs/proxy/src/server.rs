use std::net::SocketAddr;
use std::sync::Arc;

use burrow_fabric::transport::TcpTransportListener;
use tokio::net::TcpListener;
use tokio_util::sync::CancellationToken;
use tracing::{info, warn};

use crate::config::ProxyConfig;
use crate::connection::ConnectionManager;
use crate::error::Result;
use crate::frontend;
use crate::router::DomainRouter;
use crate::status::Status;

/// The server role: a worker listener plus a client-facing HTTP listener
pub struct ProxyServer {
    workers: TcpTransportListener,
    http: TcpListener,
    manager: Arc<ConnectionManager>,
    shutdown: CancellationToken,
}

/// Cloneable control surface for a running [`ProxyServer`]
#[derive(Clone)]
pub struct ProxyHandle {
    manager: Arc<ConnectionManager>,
    shutdown: CancellationToken,
}

impl ProxyServer {
    /// Bind both listeners
    pub async fn bind(config: ProxyConfig) -> Result<Self> {
        let workers = TcpTransportListener::bind(config.tcp_listen)
            .await?
            .with_max_frame_len(config.max_frame_len);
        let http = TcpListener::bind(config.http_listen).await?;

        let router = Arc::new(DomainRouter::new());
        let manager = Arc::new(ConnectionManager::new(router, config.reply_timeout));

        Ok(Self {
            workers,
            http,
            manager,
            shutdown: CancellationToken::new(),
        })
    }

    pub fn worker_addr(&self) -> Result<SocketAddr> {
        Ok(self.workers.local_addr()?)
    }

    pub fn http_addr(&self) -> Result<SocketAddr> {
        Ok(self.http.local_addr()?)
    }

    pub fn handle(&self) -> ProxyHandle {
        ProxyHandle {
            manager: Arc::clone(&self.manager),
            shutdown: self.shutdown.clone(),
        }
    }

    /// Serve until [`ProxyHandle::shutdown`] is called
    ///
    /// On shutdown every worker connection is torn down and requests still
    /// waiting on a worker fail.
    pub async fn run(self) -> Result<()> {
        let worker_addr = self.worker_addr()?;
        let http_addr = self.http_addr()?;
        info!(workers = %worker_addr, http = %http_addr, "proxy listening");

        let router = Arc::clone(self.manager.router());
        let frontend = tokio::spawn(frontend::serve(
            self.http,
            router,
            self.shutdown.child_token(),
        ));
        let accept = tokio::spawn(Arc::clone(&self.manager).accept_loop(self.workers));

        self.shutdown.cancelled().await;
        info!("proxy shutting down");

        self.manager.shutdown().await;
        match accept.await {
            Ok(Ok(())) => {}
            Ok(Err(e)) => warn!(error = %e, "worker listener failed"),
            Err(e) => warn!(error = %e, "worker listener task failed"),
        }
        if let Err(e) = frontend.await {
            warn!(error = %e, "http listener task failed");
        }

        info!("proxy stopped");
        Ok(())
    }
}

impl ProxyHandle {
    pub fn status(&self) -> Status {
        self.manager.status()
    }

    pub fn shutdown(&self) {
        self.shutdown.cancel();
    }
}
