pub mod frame;
pub mod tcp;

pub use self::frame::{FrameReader, FrameWriter, DEFAULT_MAX_FRAME_LEN, MARKER};
pub use self::tcp::{TcpTransport, TcpTransportBuilder, TcpTransportListener};
