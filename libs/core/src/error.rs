use thiserror::Error;

#[derive(Error, Debug)]
pub enum Error {
    #[error("Missing argument: {0}")]
    MissingArgument(&'static str),

    #[error("Invalid request id: expected 4 bytes, got {0}")]
    RequestId(usize),

    #[error("HTTP error: {0}")]
    Http(String),

    #[error("{0}")]
    Custom(String),
}

impl Error {
    pub fn custom(msg: impl Into<String>) -> Self {
        Self::Custom(msg.into())
    }

    pub fn http(msg: impl Into<String>) -> Self {
        Self::Http(msg.into())
    }
}

pub type Result<T> = std::result::Result<T, Error>;
