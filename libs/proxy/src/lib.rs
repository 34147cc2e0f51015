//! Burrow Proxy - the server role
//!
//! Workers connect over the framed TCP tunnel and register the domains they
//! serve. HTTP clients connect to the front end; each request is routed by
//! its `Host` header to one worker serving that domain and the worker's
//! response is relayed back.
//!
//! # Example
//!
//! ```no_run
//! use burrow_proxy::{ProxyConfig, ProxyServer};
//!
//! # async fn example() -> Result<(), Box<dyn std::error::Error>> {
//! let server = ProxyServer::bind(ProxyConfig::default()).await?;
//! let handle = server.handle();
//! tokio::spawn(server.run());
//!
//! println!("{}", handle.status());
//! handle.shutdown();
//! # Ok(())
//! # }
//! ```

pub mod config;
pub mod connection;
pub mod error;
pub mod frontend;
pub mod route;
pub mod router;
pub mod server;
pub mod status;

pub use config::ProxyConfig;
pub use connection::{ConnectionManager, WorkerConnection};
pub use error::{Error, Result};
pub use route::{ConnectionId, Route};
pub use router::DomainRouter;
pub use server::{ProxyHandle, ProxyServer};
pub use status::Status;
