use std::fmt;
use std::net::SocketAddr;
use std::time::Duration;

use burrow_core::protocol::{self, arg, op, COMPONENT};
use burrow_fabric::{Arguments, Correlator, Envelope, SessionSender};
use tracing::{debug, warn};

/// Identifies one accepted worker connection
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct ConnectionId(pub u64);

impl fmt::Display for ConnectionId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "#{}", self.0)
    }
}

/// One worker connection's registration to serve one domain
///
/// Owns the request id counter and the table of requests waiting on that
/// worker for this domain.
pub struct Route {
    domain: String,
    connection: ConnectionId,
    peer: SocketAddr,
    sender: SessionSender,
    correlator: Correlator,
    reply_timeout: Option<Duration>,
}

impl Route {
    pub fn new(
        domain: impl Into<String>,
        connection: ConnectionId,
        peer: SocketAddr,
        sender: SessionSender,
        reply_timeout: Option<Duration>,
    ) -> Self {
        Self {
            domain: domain.into(),
            connection,
            peer,
            sender,
            correlator: Correlator::new(),
            reply_timeout,
        }
    }

    pub fn domain(&self) -> &str {
        &self.domain
    }

    pub fn connection(&self) -> ConnectionId {
        self.connection
    }

    pub fn peer(&self) -> SocketAddr {
        self.peer
    }

    /// Send a raw HTTP request to the worker and wait for its `HttpResponse`
    ///
    /// Fails with `ConnectionLost` if the worker goes away first and with
    /// `ReplyTimeout` when the configured deadline passes.
    pub async fn forward(&self, raw_request: Vec<u8>) -> burrow_fabric::Result<Arguments> {
        let id = self.correlator.allocate_id();
        let envelope = Envelope::new(COMPONENT, op::HTTP_REQUEST)
            .with_arg(arg::DOMAIN, self.domain.as_bytes())
            .with_arg(arg::REQUEST, raw_request)
            .with_arg(arg::REQUEST_ID, protocol::encode_request_id(id));

        debug!(domain = %self.domain, connection = %self.connection, request_id = id, "forwarding request");
        self.correlator
            .await_reply(id, self.sender.send(&envelope), self.reply_timeout)
            .await
    }

    /// Route an `HttpResponse` to the request it answers
    pub fn deliver(&self, arguments: Arguments) -> bool {
        let id = match protocol::require(&arguments, arg::REQUEST_ID)
            .and_then(protocol::decode_request_id)
        {
            Ok(id) => id,
            Err(e) => {
                warn!(domain = %self.domain, error = %e, "dropping reply without a usable request id");
                return false;
            }
        };
        self.correlator.deliver(id, arguments)
    }

    /// Fail every request still waiting on this route
    pub fn close(&self) -> usize {
        self.correlator.close()
    }

    pub fn pending(&self) -> usize {
        self.correlator.pending()
    }
}

impl fmt::Debug for Route {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Route")
            .field("domain", &self.domain)
            .field("connection", &self.connection)
            .field("peer", &self.peer)
            .field("pending", &self.pending())
            .finish()
    }
}
