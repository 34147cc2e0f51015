use std::net::SocketAddr;

use tokio::net::tcp::{OwnedReadHalf, OwnedWriteHalf};
use tokio::net::{TcpListener, TcpStream};

use crate::error::{Error, Result};
use crate::transport::frame::{FrameReader, FrameWriter, DEFAULT_MAX_FRAME_LEN};

/// TCP connection carrying marker-tagged, length-prefixed frames
pub struct TcpTransport {
    stream: TcpStream,
    max_frame_len: usize,
}

impl TcpTransport {
    /// Connect to a remote TCP address with no timeout
    pub async fn connect(addr: SocketAddr) -> Result<Self> {
        Self::builder().address(addr).connect().await
    }

    /// Create a builder for configuring the transport
    pub fn builder() -> TcpTransportBuilder {
        TcpTransportBuilder::new()
    }

    /// Create from an existing TcpStream
    pub fn from_stream(stream: TcpStream) -> Self {
        Self {
            stream,
            max_frame_len: DEFAULT_MAX_FRAME_LEN,
        }
    }

    pub fn with_max_frame_len(mut self, max_frame_len: usize) -> Self {
        self.max_frame_len = max_frame_len;
        self
    }

    /// Get the remote address of this connection
    pub fn peer_addr(&self) -> Result<SocketAddr> {
        self.stream.peer_addr().map_err(Into::into)
    }

    /// Get the local address of this connection
    pub fn local_addr(&self) -> Result<SocketAddr> {
        self.stream.local_addr().map_err(Into::into)
    }

    /// Split into independently owned framed halves
    pub fn into_split(self) -> (FrameReader<OwnedReadHalf>, FrameWriter<OwnedWriteHalf>) {
        let (read, write) = self.stream.into_split();
        (
            FrameReader::new(read).with_max_len(self.max_frame_len),
            FrameWriter::new(write),
        )
    }
}

/// TCP listener for accepting worker connections
pub struct TcpTransportListener {
    listener: TcpListener,
    max_frame_len: usize,
}

impl TcpTransportListener {
    /// Bind to a local address
    pub async fn bind(addr: SocketAddr) -> Result<Self> {
        let listener = TcpListener::bind(addr).await?;
        Ok(Self::from_listener(listener))
    }

    pub fn from_listener(listener: TcpListener) -> Self {
        Self {
            listener,
            max_frame_len: DEFAULT_MAX_FRAME_LEN,
        }
    }

    /// Apply a frame ceiling to every accepted transport
    pub fn with_max_frame_len(mut self, max_frame_len: usize) -> Self {
        self.max_frame_len = max_frame_len;
        self
    }

    /// Accept an incoming connection
    pub async fn accept(&self) -> Result<(TcpTransport, SocketAddr)> {
        let (stream, addr) = self.listener.accept().await?;
        let transport = TcpTransport::from_stream(stream).with_max_frame_len(self.max_frame_len);
        Ok((transport, addr))
    }

    /// Get the local address this listener is bound to
    pub fn local_addr(&self) -> Result<SocketAddr> {
        self.listener.local_addr().map_err(Into::into)
    }
}

/// Builder for configuring TCP transport
#[derive(Default)]
pub struct TcpTransportBuilder {
    address: Option<SocketAddr>,
    max_frame_len: Option<usize>,
}

impl TcpTransportBuilder {
    /// Create a new builder
    pub fn new() -> Self {
        Self::default()
    }

    /// Set the address to connect to
    pub fn address(mut self, addr: SocketAddr) -> Self {
        self.address = Some(addr);
        self
    }

    /// Set the largest frame payload the reader accepts
    pub fn max_frame_len(mut self, max_frame_len: usize) -> Self {
        self.max_frame_len = Some(max_frame_len);
        self
    }

    /// Connect with the configured settings
    pub async fn connect(self) -> Result<TcpTransport> {
        let addr = self
            .address
            .ok_or_else(|| Error::Custom("Address not set".to_string()))?;

        let stream = TcpStream::connect(addr).await?;

        Ok(TcpTransport {
            stream,
            max_frame_len: self.max_frame_len.unwrap_or(DEFAULT_MAX_FRAME_LEN),
        })
    }
}
