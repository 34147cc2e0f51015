use tokio::io::{AsyncRead, AsyncReadExt, AsyncWrite, AsyncWriteExt};

use crate::error::{Error, Result};

/// Tag that opens every frame on the wire
pub const MARKER: [u8; 4] = *b"mvc|";

/// Default ceiling for a single frame's payload
pub const DEFAULT_MAX_FRAME_LEN: usize = 64 * 1024 * 1024;

const HEADER_LEN: usize = 8;

/// Reading half of a framed stream
///
/// Frames are `MARKER`, a 4-byte little-endian payload length, then the payload.
pub struct FrameReader<R> {
    inner: R,
    max_len: usize,
}

impl<R: AsyncRead + Unpin> FrameReader<R> {
    pub fn new(inner: R) -> Self {
        Self {
            inner,
            max_len: DEFAULT_MAX_FRAME_LEN,
        }
    }

    /// Reject frames whose declared length exceeds `max_len`
    pub fn with_max_len(mut self, max_len: usize) -> Self {
        self.max_len = max_len;
        self
    }

    /// Read the next frame's payload
    ///
    /// End of stream before a marker is [`Error::ConnectionClosed`]; end of
    /// stream anywhere inside a frame is [`Error::TruncatedFrame`].
    pub async fn read_frame(&mut self) -> Result<Vec<u8>> {
        let mut marker = [0u8; 4];
        match fill(&mut self.inner, &mut marker).await? {
            0 => return Err(Error::ConnectionClosed),
            4 => {}
            received => {
                return Err(Error::TruncatedFrame {
                    expected: 4,
                    received,
                })
            }
        }
        if marker != MARKER {
            return Err(Error::UnknownTag(marker));
        }

        let mut len_buf = [0u8; 4];
        let received = fill(&mut self.inner, &mut len_buf).await?;
        if received < len_buf.len() {
            return Err(Error::TruncatedFrame {
                expected: len_buf.len(),
                received,
            });
        }

        let len = u32::from_le_bytes(len_buf) as usize;
        if len == 0 {
            return Err(Error::EmptyFrame);
        }
        if len > self.max_len {
            return Err(Error::FrameTooLarge {
                len,
                max: self.max_len,
            });
        }

        let mut payload = vec![0u8; len];
        let received = fill(&mut self.inner, &mut payload).await?;
        if received < len {
            return Err(Error::TruncatedFrame {
                expected: len,
                received,
            });
        }

        Ok(payload)
    }

    pub fn into_inner(self) -> R {
        self.inner
    }
}

/// Writing half of a framed stream
pub struct FrameWriter<W> {
    inner: W,
}

impl<W: AsyncWrite + Unpin> FrameWriter<W> {
    pub fn new(inner: W) -> Self {
        Self { inner }
    }

    /// Write one frame as a single buffer
    ///
    /// An empty payload is written as-is; the reading side rejects it.
    pub async fn write_frame(&mut self, payload: &[u8]) -> Result<()> {
        let len = u32::try_from(payload.len()).map_err(|_| Error::FrameTooLarge {
            len: payload.len(),
            max: u32::MAX as usize,
        })?;

        let mut buf = Vec::with_capacity(HEADER_LEN + payload.len());
        buf.extend_from_slice(&MARKER);
        buf.extend_from_slice(&len.to_le_bytes());
        buf.extend_from_slice(payload);

        self.inner.write_all(&buf).await.map_err(Error::Write)?;
        self.inner.flush().await.map_err(Error::Write)?;
        Ok(())
    }

    pub fn into_inner(self) -> W {
        self.inner
    }

    pub async fn shutdown(&mut self) -> Result<()> {
        self.inner.shutdown().await?;
        Ok(())
    }
}

impl<W: AsyncWrite + Send + Unpin + 'static> FrameWriter<W> {
    /// Erase the stream type
    pub fn boxed(self) -> FrameWriter<Box<dyn AsyncWrite + Send + Unpin>> {
        FrameWriter {
            inner: Box::new(self.inner),
        }
    }
}

/// Read until `buf` is full or the stream ends, returning the byte count
async fn fill<R: AsyncRead + Unpin>(reader: &mut R, buf: &mut [u8]) -> std::io::Result<usize> {
    let mut filled = 0;
    while filled < buf.len() {
        let n = reader.read(&mut buf[filled..]).await?;
        if n == 0 {
            break;
        }
        filled += n;
    }
    Ok(filled)
}
