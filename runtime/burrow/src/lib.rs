//! Command-line front ends for the proxy (`burrowd`) and the worker
//! (`burrow-worker`).

pub mod cli;
pub mod console;

pub use cli::{ServerArgs, WorkerArgs};
pub use console::{ServerCommand, WorkerCommand};
