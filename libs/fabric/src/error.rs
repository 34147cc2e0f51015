use thiserror::Error;

#[derive(Error, Debug)]
pub enum Error {
    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    #[error("Write error: {0}")]
    Write(std::io::Error),

    #[error("Unknown frame tag: {0:?}")]
    UnknownTag([u8; 4]),

    #[error("Empty frame")]
    EmptyFrame,

    #[error("Frame too large: {len} bytes (max {max})")]
    FrameTooLarge { len: usize, max: usize },

    #[error("Truncated frame: expected {expected} bytes, got {received}")]
    TruncatedFrame { expected: usize, received: usize },

    #[error("Connection closed")]
    ConnectionClosed,

    #[error("Malformed envelope: {0}")]
    Codec(String),

    #[error("Connection lost")]
    ConnectionLost,

    #[error("No reply within {0:?}")]
    ReplyTimeout(std::time::Duration),

    #[error("{0}")]
    Custom(String),
}

impl Error {
    pub fn custom(msg: impl Into<String>) -> Self {
        Self::Custom(msg.into())
    }

    /// True when the peer closed the stream cleanly between frames.
    pub fn is_clean_close(&self) -> bool {
        matches!(self, Self::ConnectionClosed)
    }
}

pub type Result<T> = std::result::Result<T, Error>;
