//! Frame codec for the TCP channel.

use meridian_proto::{
    AddRefFrame, BackChannelEntry, CallFrame, CastFrame, InterfaceDescriptor, ReleaseFrame,
    SendResult,
};
use serde::{Deserialize, Serialize};
use tokio::io::{AsyncRead, AsyncReadExt, AsyncWrite, AsyncWriteExt};

use crate::TcpTransportError;

/// Length prefix size in bytes.
pub const FRAME_PREFIX_SIZE: usize = 4;

/// Maximum frame size (16 MB: payload cap plus header slack).
pub const MAX_FRAME_SIZE: usize = 16 * 1024 * 1024;

/// Everything that crosses a TCP connection.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub enum WireFrame {
    /// Connection handshake, sent once by each side.
    Hello(Handshake),
    /// A tagged request. Tag 0 means no reply is expected.
    Request { tag: u64, op: WireOp },
    /// A reply to a tagged request.
    Reply {
        tag: u64,
        code: u8,
        ok: Option<WireOk>,
    },
}

/// Zone identity exchanged at connection start.
#[derive(Debug, Clone, Copy, Serialize, Deserialize)]
pub struct Handshake {
    pub protocol_version: u64,
    pub zone: u64,
    /// Descriptor of the zone's root object, for bootstrap.
    pub root: InterfaceDescriptor,
}

/// The five operations in wire form.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub enum WireOp {
    Send(CallFrame),
    Post(CallFrame),
    TryCast(CastFrame),
    AddRef(AddRefFrame),
    Release(ReleaseFrame),
}

/// Successful operation results in wire form.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub enum WireOk {
    Send(SendResult),
    BackChannel(Vec<BackChannelEntry>),
    Empty,
}

/// Reads one length-prefixed frame.
pub(crate) async fn read_frame<R: AsyncRead + Unpin>(
    reader: &mut R,
) -> crate::Result<WireFrame> {
    let mut prefix = [0u8; FRAME_PREFIX_SIZE];
    reader.read_exact(&mut prefix).await?;
    let size = u32::from_be_bytes(prefix) as usize;

    if size > MAX_FRAME_SIZE {
        return Err(TcpTransportError::FrameTooLarge {
            size,
            max: MAX_FRAME_SIZE,
        });
    }

    let mut buf = vec![0u8; size];
    reader.read_exact(&mut buf).await?;
    bincode::deserialize(&buf).map_err(|e| TcpTransportError::Codec(e.to_string()))
}

/// Writes one length-prefixed frame.
pub(crate) async fn write_frame<W: AsyncWrite + Unpin>(
    writer: &mut W,
    frame: &WireFrame,
) -> crate::Result<()> {
    let buf = bincode::serialize(frame).map_err(|e| TcpTransportError::Codec(e.to_string()))?;

    if buf.len() > MAX_FRAME_SIZE {
        return Err(TcpTransportError::FrameTooLarge {
            size: buf.len(),
            max: MAX_FRAME_SIZE,
        });
    }

    writer.write_all(&(buf.len() as u32).to_be_bytes()).await?;
    writer.write_all(&buf).await?;
    writer.flush().await?;
    Ok(())
}
