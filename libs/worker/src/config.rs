use std::net::SocketAddr;

use burrow_fabric::transport::DEFAULT_MAX_FRAME_LEN;

/// Settings for a [`crate::Worker`]
#[derive(Debug, Clone)]
pub struct WorkerConfig {
    /// The proxy's worker listener
    pub server: SocketAddr,
    /// Domain to register; matched against the `Host` header of client requests
    pub domain: String,
    /// `host:port` of the local service requests are replayed against
    pub target: String,
    pub max_frame_len: usize,
}

impl Default for WorkerConfig {
    fn default() -> Self {
        Self {
            server: SocketAddr::from(([127, 0, 0, 1], 7000)),
            domain: "127.0.0.1:7100".to_string(),
            target: "127.0.0.1:8030".to_string(),
            max_frame_len: DEFAULT_MAX_FRAME_LEN,
        }
    }
}
