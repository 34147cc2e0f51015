use std::collections::HashMap;
use std::net::SocketAddr;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::{Arc, Mutex, MutexGuard, PoisonError};
use std::time::Duration;

use burrow_core::protocol::{self, arg, op, COMPONENT, GREETING};
use burrow_fabric::transport::{TcpTransport, TcpTransportListener};
use burrow_fabric::{Arguments, Component, Envelope, Session, SessionSender};
use tokio_util::sync::CancellationToken;
use tokio_util::task::TaskTracker;
use tracing::{debug, info, warn};

use crate::error::{Error, Result};
use crate::route::{ConnectionId, Route};
use crate::router::DomainRouter;
use crate::status::{ConnectionStatus, DomainStatus, Status};

/// Longest wait for a send still in progress when a connection closes
const CLOSE_GRACE: Duration = Duration::from_secs(5);

/// One accepted worker connection and the routes it registered
pub struct WorkerConnection {
    id: ConnectionId,
    peer: SocketAddr,
    sender: SessionSender,
    cancel: CancellationToken,
    routes: Mutex<Routes>,
}

#[derive(Default)]
struct Routes {
    by_domain: HashMap<String, Arc<Route>>,
    closed: bool,
}

impl WorkerConnection {
    fn new(id: ConnectionId, peer: SocketAddr, sender: SessionSender, cancel: CancellationToken) -> Self {
        Self {
            id,
            peer,
            sender,
            cancel,
            routes: Mutex::new(Routes::default()),
        }
    }

    fn routes(&self) -> MutexGuard<'_, Routes> {
        self.routes.lock().unwrap_or_else(PoisonError::into_inner)
    }

    pub fn id(&self) -> ConnectionId {
        self.id
    }

    pub fn peer(&self) -> SocketAddr {
        self.peer
    }

    pub fn domains(&self) -> Vec<String> {
        let mut domains: Vec<_> = self.routes().by_domain.keys().cloned().collect();
        domains.sort();
        domains
    }

    pub fn route(&self, domain: &str) -> Option<Arc<Route>> {
        self.routes()
            .by_domain
            .get(&protocol::normalize_domain(domain))
            .cloned()
    }

    /// Register this connection as a server for `domain`
    ///
    /// The router is updated under this connection's lock so a concurrent
    /// teardown cannot miss the new route.
    fn add_route(
        &self,
        domain: &str,
        router: &DomainRouter,
        reply_timeout: Option<Duration>,
    ) -> Result<Arc<Route>> {
        let domain = protocol::normalize_domain(domain);
        let mut routes = self.routes();
        if routes.closed {
            return Err(Error::ConnectionClosed);
        }
        if routes.by_domain.contains_key(&domain) {
            return Err(Error::DuplicateRegistration { domain });
        }
        let route = Arc::new(Route::new(
            domain.clone(),
            self.id,
            self.peer,
            self.sender.clone(),
            reply_timeout,
        ));
        router.register_route(Arc::clone(&route))?;
        routes.by_domain.insert(domain, Arc::clone(&route));
        Ok(route)
    }

    fn take_routes(&self) -> Vec<Arc<Route>> {
        let mut routes = self.routes();
        routes.closed = true;
        routes.by_domain.drain().map(|(_, route)| route).collect()
    }

    async fn message(&self, text: impl Into<Vec<u8>>) {
        let envelope = Envelope::new(COMPONENT, op::MESSAGE).with_arg(arg::MSG, text);
        if let Err(e) = self.sender.send(&envelope).await {
            warn!(peer = %self.peer, error = %e, "failed to send message");
        }
    }
}

/// Server-side operations bound to one worker connection
struct ServerOperations {
    connection: Arc<WorkerConnection>,
    router: Arc<DomainRouter>,
    reply_timeout: Option<Duration>,
}

impl ServerOperations {
    async fn register(&self, arguments: Arguments) {
        let domain = match protocol::require_text(&arguments, arg::DOMAIN) {
            Ok(domain) => domain,
            Err(e) => {
                warn!(peer = %self.connection.peer, error = %e, "register without domain");
                self.connection.message("missing argument: domain").await;
                return;
            }
        };

        match self
            .connection
            .add_route(&domain, &self.router, self.reply_timeout)
        {
            Ok(route) => {
                info!(peer = %self.connection.peer, domain = %route.domain(), "domain registered");
                self.connection
                    .message(format!("registered domain: {}", route.domain()))
                    .await;
            }
            Err(Error::ConnectionClosed) => {
                debug!(peer = %self.connection.peer, domain = %domain, "register after teardown");
            }
            Err(e) => {
                warn!(peer = %self.connection.peer, domain = %domain, error = %e, "register rejected");
                self.connection
                    .message(format!("failed to register domain {domain}: {e}"))
                    .await;
            }
        }
    }

    async fn http_response(&self, arguments: Arguments) {
        let domain = match protocol::require_text(&arguments, arg::DOMAIN) {
            Ok(domain) => domain,
            Err(e) => {
                warn!(peer = %self.connection.peer, error = %e, "dropping reply");
                return;
            }
        };
        match self.connection.route(&domain) {
            Some(route) => {
                route.deliver(arguments);
            }
            None => {
                warn!(peer = %self.connection.peer, domain = %domain, "reply for a domain this worker does not serve");
            }
        }
    }
}

#[async_trait::async_trait]
impl Component for ServerOperations {
    fn name(&self) -> &'static str {
        COMPONENT
    }

    fn operations(&self) -> &'static [&'static str] {
        &[op::REGISTER, op::MESSAGE, op::HTTP_RESPONSE]
    }

    async fn invoke(&self, operation: &str, arguments: Arguments) {
        match operation {
            op::REGISTER => self.register(arguments).await,
            op::HTTP_RESPONSE => self.http_response(arguments).await,
            op::MESSAGE => {
                let msg = arguments
                    .get(arg::MSG)
                    .map(|m| String::from_utf8_lossy(m).into_owned())
                    .unwrap_or_default();
                info!(peer = %self.connection.peer, msg = %msg, "message from worker");
            }
            other => warn!(operation = other, "unhandled operation"),
        }
    }
}

/// Accepts worker connections and tears their routes down when they end
pub struct ConnectionManager {
    router: Arc<DomainRouter>,
    connections: Mutex<HashMap<ConnectionId, Arc<WorkerConnection>>>,
    next_id: AtomicU64,
    reply_timeout: Option<Duration>,
    shutdown: CancellationToken,
    tasks: TaskTracker,
}

impl ConnectionManager {
    pub fn new(router: Arc<DomainRouter>, reply_timeout: Option<Duration>) -> Self {
        Self {
            router,
            connections: Mutex::new(HashMap::new()),
            next_id: AtomicU64::new(1),
            reply_timeout,
            shutdown: CancellationToken::new(),
            tasks: TaskTracker::new(),
        }
    }

    fn connections(&self) -> MutexGuard<'_, HashMap<ConnectionId, Arc<WorkerConnection>>> {
        self.connections
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
    }

    pub fn router(&self) -> &Arc<DomainRouter> {
        &self.router
    }

    /// Accept workers until [`ConnectionManager::shutdown`] is called
    pub async fn accept_loop(self: Arc<Self>, listener: TcpTransportListener) -> Result<()> {
        loop {
            let accepted = tokio::select! {
                biased;
                _ = self.shutdown.cancelled() => break,
                accepted = listener.accept() => accepted,
            };
            match accepted {
                Ok((transport, peer)) => {
                    let manager = Arc::clone(&self);
                    self.tasks.spawn(async move {
                        if let Err(e) = manager.handle(transport, peer).await {
                            warn!(peer = %peer, error = %e, "worker connection failed");
                        }
                    });
                }
                Err(e) => warn!(error = %e, "failed to accept worker connection"),
            }
        }
        Ok(())
    }

    /// Serve one worker connection until it ends, then tear it down
    pub async fn handle(&self, transport: TcpTransport, peer: SocketAddr) -> Result<()> {
        let id = ConnectionId(self.next_id.fetch_add(1, Ordering::Relaxed));
        let mut session = Session::from_tcp(transport);
        let connection = Arc::new(WorkerConnection::new(
            id,
            peer,
            session.sender(),
            self.shutdown.child_token(),
        ));
        self.connections().insert(id, Arc::clone(&connection));

        session.include(Arc::new(ServerOperations {
            connection: Arc::clone(&connection),
            router: Arc::clone(&self.router),
            reply_timeout: self.reply_timeout,
        }));
        info!(peer = %peer, connection = %id, "worker connected");

        connection.message(GREETING).await;

        let outcome = tokio::select! {
            outcome = session.run() => outcome.map_err(Error::from),
            _ = connection.sender.closed() => Err(Error::Fabric(burrow_fabric::Error::ConnectionLost)),
            _ = connection.cancel.cancelled() => Ok(()),
        };

        self.teardown(&connection).await;
        match &outcome {
            Ok(()) => info!(peer = %peer, connection = %id, "worker disconnected"),
            Err(e) => warn!(peer = %peer, connection = %id, error = %e, "worker connection lost"),
        }
        outcome
    }

    /// Routes and waiters are released before the stream is closed
    async fn teardown(&self, connection: &WorkerConnection) {
        let mut released = 0;
        for route in connection.take_routes() {
            released += route.close();
        }
        for route in self.router.remove_routes_for(connection.id) {
            released += route.close();
        }
        if released > 0 {
            warn!(peer = %connection.peer, released, "failed requests still waiting on the worker");
        }
        self.connections().remove(&connection.id);

        match tokio::time::timeout(CLOSE_GRACE, connection.sender.close()).await {
            Ok(Ok(())) => {}
            Ok(Err(e)) => debug!(peer = %connection.peer, error = %e, "closing worker stream"),
            Err(_) => warn!(peer = %connection.peer, "worker stream did not close in time"),
        }
    }

    /// Snapshot of active connections and the domain table
    pub fn status(&self) -> Status {
        let mut connections: Vec<ConnectionStatus> = self
            .connections()
            .values()
            .map(|connection| ConnectionStatus {
                id: connection.id,
                peer: connection.peer,
                domains: connection.domains(),
            })
            .collect();
        connections.sort_by_key(|c| c.id);

        let domains = self
            .router
            .snapshot()
            .into_iter()
            .map(|(domain, routes)| DomainStatus {
                domain,
                peers: routes.iter().map(|route| route.peer()).collect(),
            })
            .collect();

        Status {
            connections,
            domains,
        }
    }

    /// Stop accepting and disconnect every worker, waiting for teardown
    pub async fn shutdown(&self) {
        self.shutdown.cancel();
        self.tasks.close();
        self.tasks.wait().await;
    }
}
