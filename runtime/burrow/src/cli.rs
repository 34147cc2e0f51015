use std::net::SocketAddr;
use std::time::Duration;

use burrow_fabric::transport::DEFAULT_MAX_FRAME_LEN;
use burrow_proxy::ProxyConfig;
use burrow_worker::WorkerConfig;
use clap::Parser;

/// Reverse-tunnel HTTP proxy
#[derive(Parser, Debug)]
#[command(name = "burrowd", author, version, about, long_about = None)]
pub struct ServerArgs {
    /// Address workers connect to
    #[arg(long, env = "BURROW_TCP_LISTEN", default_value = "127.0.0.1:7000")]
    pub tcp_listen: SocketAddr,

    /// Address HTTP clients connect to
    #[arg(long, env = "BURROW_HTTP_LISTEN", default_value = "127.0.0.1:7100")]
    pub http_listen: SocketAddr,

    /// Seconds to wait for a worker's reply; 0 waits for as long as the worker stays connected
    #[arg(long, env = "BURROW_REPLY_TIMEOUT", default_value_t = 60)]
    pub reply_timeout: u64,

    /// Largest accepted frame payload in bytes
    #[arg(long, env = "BURROW_MAX_FRAME", default_value_t = DEFAULT_MAX_FRAME_LEN)]
    pub max_frame: usize,

    /// Log filter, overridden by RUST_LOG
    #[arg(long, env = "BURROW_LOG", default_value = "info")]
    pub log: String,
}

impl ServerArgs {
    pub fn config(&self) -> ProxyConfig {
        ProxyConfig {
            tcp_listen: self.tcp_listen,
            http_listen: self.http_listen,
            reply_timeout: (self.reply_timeout > 0).then(|| Duration::from_secs(self.reply_timeout)),
            max_frame_len: self.max_frame,
        }
    }
}

/// Tunnel worker serving one domain from a local service
#[derive(Parser, Debug)]
#[command(name = "burrow-worker", author, version, about, long_about = None)]
pub struct WorkerArgs {
    /// Proxy address to connect to
    #[arg(long, env = "BURROW_SERVER", default_value = "127.0.0.1:7000")]
    pub server: SocketAddr,

    /// Domain to serve, as clients send it in the Host header
    #[arg(long, env = "BURROW_DOMAIN", default_value = "127.0.0.1:7100")]
    pub domain: String,

    /// Local service that receives the requests
    #[arg(long, env = "BURROW_TARGET", default_value = "127.0.0.1:8030")]
    pub target: String,

    /// Largest accepted frame payload in bytes
    #[arg(long, env = "BURROW_MAX_FRAME", default_value_t = DEFAULT_MAX_FRAME_LEN)]
    pub max_frame: usize,

    /// Log filter, overridden by RUST_LOG
    #[arg(long, env = "BURROW_LOG", default_value = "info")]
    pub log: String,
}

impl WorkerArgs {
    pub fn config(&self) -> WorkerConfig {
        WorkerConfig {
            server: self.server,
            domain: self.domain.clone(),
            target: self.target.clone(),
            max_frame_len: self.max_frame,
        }
    }
}
