//! TCP transport for the meridian RPC runtime.
//!
//! Frames are length-prefixed (4 bytes, big-endian) binary blobs with a
//! hard size cap. A connection starts with a handshake exchanging zone
//! identity and root descriptor; after that both ends run a symmetric pump:
//! requests are tagged, replies are matched to their pending slot, and
//! either side may originate calls, which is what makes reverse channels
//! work over a single connection.

mod channel;
mod wire;

pub use channel::{connect, serve, PeerInfo, TcpChannel};
pub use wire::{FRAME_PREFIX_SIZE, MAX_FRAME_SIZE};

use thiserror::Error;

/// Errors raised while establishing or running a TCP channel.
#[derive(Error, Debug)]
pub enum TcpTransportError {
    /// I/O error from the socket.
    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),

    /// The peer's handshake was malformed.
    #[error("handshake failed: {0}")]
    Handshake(String),

    /// The peer speaks a protocol version outside the supported window.
    #[error("unsupported peer protocol version: {0}")]
    VersionMismatch(u64),

    /// A frame exceeded the size cap.
    #[error("frame too large: {size} bytes (max {max})")]
    FrameTooLarge { size: usize, max: usize },

    /// Frame codec failure.
    #[error("frame codec error: {0}")]
    Codec(String),

    /// The connection is gone.
    #[error("connection closed")]
    Closed,
}

/// Result type for TCP transport operations.
pub type Result<T> = std::result::Result<T, TcpTransportError>;
