use std::net::SocketAddr;
use std::time::Duration;

use burrow_fabric::transport::DEFAULT_MAX_FRAME_LEN;

/// Settings for a [`crate::ProxyServer`]
#[derive(Debug, Clone)]
pub struct ProxyConfig {
    /// Where workers connect
    pub tcp_listen: SocketAddr,
    /// Where HTTP clients connect
    pub http_listen: SocketAddr,
    /// Longest wait for a worker's reply; `None` waits for the connection's lifetime
    pub reply_timeout: Option<Duration>,
    pub max_frame_len: usize,
}

impl Default for ProxyConfig {
    fn default() -> Self {
        Self {
            tcp_listen: SocketAddr::from(([127, 0, 0, 1], 7000)),
            http_listen: SocketAddr::from(([127, 0, 0, 1], 7100)),
            reply_timeout: Some(Duration::from_secs(60)),
            max_frame_len: DEFAULT_MAX_FRAME_LEN,
        }
    }
}
