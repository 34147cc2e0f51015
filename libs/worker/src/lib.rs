//! Burrow Worker - the client role
//!
//! Connects out to a proxy, registers one domain and replays every tunneled
//! request against a local service, shipping the response back over the
//! same connection.

pub mod config;
pub mod error;
pub mod upstream;
pub mod worker;

pub use config::WorkerConfig;
pub use error::{Error, Result};
pub use worker::{Worker, WorkerHandle};
