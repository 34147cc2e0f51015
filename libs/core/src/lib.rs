//! Burrow Core - vocabulary shared by both ends of the tunnel
//!
//! Operation and argument names, request id encoding, the raw HTTP message
//! format carried inside envelopes, and log initialisation.

pub mod error;
pub mod raw;
pub mod logging;
pub mod protocol;

pub use error::{Error, Result};
