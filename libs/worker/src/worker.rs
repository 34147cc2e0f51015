use std::net::SocketAddr;
use std::sync::Arc;

use burrow_core::protocol::{self, arg, op, status, COMPONENT};
use burrow_core::raw;
use burrow_fabric::transport::TcpTransport;
use burrow_fabric::{Arguments, Component, Envelope, Session, SessionSender};
use tokio::net::tcp::OwnedReadHalf;
use tracing::{debug, info, warn};

use crate::config::WorkerConfig;
use crate::error::Result;
use crate::upstream;

/// Operations the proxy may invoke on a worker
struct WorkerOperations {
    target: String,
    sender: SessionSender,
}

/// Why a tunneled request produced no upstream response
enum Failure {
    BadRequest(String),
    Failed(String),
}

impl WorkerOperations {
    async fn http_request(&self, mut arguments: Arguments) {
        let request_id = arguments
            .get(arg::REQUEST_ID)
            .and_then(|id| protocol::decode_request_id(id).ok());
        let raw_request = arguments.remove(arg::REQUEST);

        match self.replay(raw_request).await {
            Ok(resp) => {
                arguments.insert(arg::STATUS.into(), status::OK.into());
                arguments.insert(arg::RESP.into(), resp);
            }
            Err(Failure::BadRequest(msg)) => {
                warn!(request_id = ?request_id, msg = %msg, "rejecting tunneled request");
                arguments.insert(arg::STATUS.into(), status::BAD_REQUEST.into());
                arguments.insert(arg::MSG.into(), msg.into_bytes());
            }
            Err(Failure::Failed(msg)) => {
                warn!(request_id = ?request_id, target = %self.target, msg = %msg, "tunneled request failed");
                arguments.insert(arg::STATUS.into(), status::FAILED.into());
                arguments.insert(arg::MSG.into(), msg.into_bytes());
            }
        }

        let reply = Envelope::new(COMPONENT, op::HTTP_RESPONSE).with_arguments(arguments);
        if let Err(e) = self.sender.send(&reply).await {
            warn!(request_id = ?request_id, error = %e, "failed to send reply");
        }
    }

    async fn replay(&self, raw_request: Option<Vec<u8>>) -> std::result::Result<Vec<u8>, Failure> {
        let raw_request = raw_request
            .ok_or_else(|| Failure::BadRequest(format!("missing argument: {}", arg::REQUEST)))?;
        let mut request =
            raw::parse_request(&raw_request).map_err(|e| Failure::BadRequest(e.to_string()))?;
        raw::retarget(&mut request, &self.target).map_err(|e| Failure::Failed(e.to_string()))?;

        debug!(method = %request.method(), uri = %request.uri(), "replaying request");
        let response = upstream::call(request)
            .await
            .map_err(|e| Failure::Failed(e.to_string()))?;

        let (parts, body) = response.into_parts();
        Ok(raw::dump_response(&parts, &body))
    }
}

#[async_trait::async_trait]
impl Component for WorkerOperations {
    fn name(&self) -> &'static str {
        COMPONENT
    }

    fn operations(&self) -> &'static [&'static str] {
        &[op::MESSAGE, op::HTTP_REQUEST]
    }

    async fn invoke(&self, operation: &str, arguments: Arguments) {
        match operation {
            op::HTTP_REQUEST => self.http_request(arguments).await,
            op::MESSAGE => {
                let msg = arguments
                    .get(arg::MSG)
                    .map(|m| String::from_utf8_lossy(m).into_owned())
                    .unwrap_or_default();
                info!(msg = %msg, "message from server");
            }
            other => warn!(operation = other, "unhandled operation"),
        }
    }
}

/// The worker role: one tunnel connection serving one domain
pub struct Worker {
    session: Session<OwnedReadHalf>,
    handle: WorkerHandle,
    domain: String,
    server: SocketAddr,
}

/// Cloneable sending side of a connected [`Worker`]
#[derive(Clone)]
pub struct WorkerHandle {
    sender: SessionSender,
}

impl Worker {
    /// Connect to the proxy and install the worker operations
    pub async fn connect(config: WorkerConfig) -> Result<Self> {
        let transport = TcpTransport::builder()
            .address(config.server)
            .max_frame_len(config.max_frame_len)
            .connect()
            .await?;
        let mut session = Session::from_tcp(transport);
        let sender = session.sender();
        session.include(Arc::new(WorkerOperations {
            target: config.target,
            sender: sender.clone(),
        }));

        info!(server = %config.server, domain = %config.domain, "connected to proxy");
        Ok(Self {
            session,
            handle: WorkerHandle { sender },
            domain: config.domain,
            server: config.server,
        })
    }

    pub fn handle(&self) -> WorkerHandle {
        self.handle.clone()
    }

    pub fn domain(&self) -> &str {
        &self.domain
    }

    /// Register the domain, then serve requests until the connection ends
    pub async fn run(self) -> Result<()> {
        let register = Envelope::new(COMPONENT, op::REGISTER).with_arg(arg::DOMAIN, self.domain.as_bytes());
        self.handle.sender.send(&register).await?;
        debug!(domain = %self.domain, "register sent");

        let outcome = self.session.run().await;
        info!(server = %self.server, "disconnected from proxy");
        Ok(outcome?)
    }
}

impl WorkerHandle {
    /// Send free text to the proxy's log
    pub async fn message(&self, text: impl Into<Vec<u8>>) -> Result<()> {
        let envelope = Envelope::new(COMPONENT, op::MESSAGE).with_arg(arg::MSG, text);
        Ok(self.sender.send(&envelope).await?)
    }

    /// Close the tunnel; the proxy tears down this worker's routes
    pub async fn close(&self) -> Result<()> {
        Ok(self.sender.close().await?)
    }
}
