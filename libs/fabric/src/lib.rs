//! Burrow Fabric - framed tunnel transport and command dispatch
//!
//! Turns one TCP stream into a channel of [`Envelope`]s, dispatches incoming
//! envelopes to registered handlers concurrently, and correlates replies to
//! the requests that caused them.
//!
//! # Example
//!
//! ```no_run
//! use burrow_fabric::{Envelope, Session, transport::TcpTransport};
//!
//! # async fn example() -> Result<(), Box<dyn std::error::Error>> {
//! let addr = "127.0.0.1:7000".parse()?;
//! let mut session = Session::from_tcp(TcpTransport::connect(addr).await?);
//!
//! session.register("tcpWorker", "Message", |args: burrow_fabric::Arguments| async move {
//!     println!("{:?}", args.get("msg"));
//! });
//!
//! let sender = session.sender();
//! let running = tokio::spawn(session.run());
//! sender
//!     .send(&Envelope::new("tcpWorker", "Message").with_arg("msg", "hello"))
//!     .await?;
//! running.await??;
//! # Ok(())
//! # }
//! ```

pub mod codec;
pub mod correlator;
pub mod envelope;
pub mod error;
pub mod session;
pub mod transport;

// Re-exports for convenience
pub use correlator::{Correlator, PendingReply};
pub use envelope::{Arguments, Envelope};
pub use error::{Error, Result};
pub use session::{Component, Handler, Session, SessionSender};
