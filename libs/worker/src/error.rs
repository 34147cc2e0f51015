use thiserror::Error;

#[derive(Error, Debug)]
pub enum Error {
    #[error(transparent)]
    Fabric(#[from] burrow_fabric::Error),

    #[error(transparent)]
    Protocol(#[from] burrow_core::Error),

    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    #[error("Upstream error: {0}")]
    Upstream(String),
}

impl Error {
    pub fn upstream(msg: impl Into<String>) -> Self {
        Self::Upstream(msg.into())
    }
}

pub type Result<T> = std::result::Result<T, Error>;
