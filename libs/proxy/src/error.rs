use thiserror::Error;

#[derive(Error, Debug)]
pub enum Error {
    #[error(transparent)]
    Fabric(#[from] burrow_fabric::Error),

    #[error(transparent)]
    Protocol(#[from] burrow_core::Error),

    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    #[error("Domain already registered on this connection: {domain}")]
    DuplicateRegistration { domain: String },

    #[error("No route for domain: {domain}")]
    NotFound { domain: String },

    #[error("Connection is shutting down")]
    ConnectionClosed,
}

pub type Result<T> = std::result::Result<T, Error>;
