//! Wire protocol for relaymesh
//!
//! Every message is a postcard-encoded [`WireMessage`] preceded by a 4-byte
//! big-endian length. A client opens a connection, writes one request frame
//! and reads one response frame:
//!
//! | Request        | Response                                 |
//! |----------------|------------------------------------------|
//! | `Deliver`      | `Ack` or `Reject`                        |
//! | `LoadQuery`    | `LoadReport` or `Reject`                 |
//!
//! A server keeps reading requests on the same connection until EOF.

use bytes::{Buf, BufMut, Bytes, BytesMut};
use serde::{Deserialize, Serialize};
use tokio::io::{AsyncRead, AsyncReadExt, AsyncWrite, AsyncWriteExt};

use relaymesh_core::{NodeName, Payload};
use relaymesh_routing::LoadEntry;

/// Maximum encoded message size (1 MiB)
pub const MAX_MESSAGE_SIZE: usize = 1024 * 1024;

/// Length prefix size
const HEADER_LEN: usize = 4;

/// Reasons a node refuses a request
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[repr(u16)]
pub enum RejectCode {
    /// The target worker queue is full
    QueueFull = 1,
    /// The node is not running or is shutting down
    Unavailable = 2,
    /// The request could not be decoded or is not understood
    BadRequest = 3,
    /// The node hit an internal error
    Internal = 4,
}

impl RejectCode {
    pub fn as_u16(self) -> u16 {
        self as u16
    }

    pub fn from_u16(code: u16) -> Option<Self> {
        match code {
            1 => Some(RejectCode::QueueFull),
            2 => Some(RejectCode::Unavailable),
            3 => Some(RejectCode::BadRequest),
            4 => Some(RejectCode::Internal),
            _ => None,
        }
    }
}

/// Messages exchanged between nodes and clients
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub enum WireMessage {
    /// Hand a payload to the receiving node
    Deliver(Payload),

    /// Payload accepted for processing
    Ack,

    /// Request refused
    Reject { code: u16, message: String },

    /// Ask for the receiving node's load table
    LoadQuery,

    /// Load table of `node`, in configured neighbor order
    LoadReport {
        node: NodeName,
        entries: Vec<LoadEntry>,
    },
}

impl WireMessage {
    pub fn reject(code: RejectCode, message: impl Into<String>) -> Self {
        WireMessage::Reject {
            code: code.as_u16(),
            message: message.into(),
        }
    }

    /// Short variant name for logs
    pub fn kind(&self) -> &'static str {
        match self {
            WireMessage::Deliver(_) => "deliver",
            WireMessage::Ack => "ack",
            WireMessage::Reject { .. } => "reject",
            WireMessage::LoadQuery => "load_query",
            WireMessage::LoadReport { .. } => "load_report",
        }
    }
}

/// Encode `msg` as one length-prefixed frame
pub fn encode_frame(msg: &WireMessage) -> Result<Bytes, FramingError> {
    let body = postcard::to_allocvec(msg).map_err(|e| FramingError::Encode(e.to_string()))?;
    check_len(body.len())?;

    let mut frame = BytesMut::with_capacity(HEADER_LEN + body.len());
    frame.put_u32(body.len() as u32);
    frame.put_slice(&body);
    Ok(frame.freeze())
}

/// Take one complete frame off the front of `buf`
///
/// Returns `Ok(None)` and leaves `buf` untouched while the frame is still
/// incomplete.
pub fn decode_frame(buf: &mut BytesMut) -> Result<Option<WireMessage>, FramingError> {
    let Some(header) = buf.get(..HEADER_LEN) else {
        return Ok(None);
    };
    let len = u32::from_be_bytes([header[0], header[1], header[2], header[3]]) as usize;
    check_len(len)?;

    if buf.len() < HEADER_LEN + len {
        buf.reserve(HEADER_LEN + len - buf.len());
        return Ok(None);
    }

    buf.advance(HEADER_LEN);
    let body = buf.split_to(len);
    decode_body(&body).map(Some)
}

fn check_len(len: usize) -> Result<(), FramingError> {
    if len > MAX_MESSAGE_SIZE {
        return Err(FramingError::TooLarge { len });
    }
    Ok(())
}

fn decode_body(body: &[u8]) -> Result<WireMessage, FramingError> {
    postcard::from_bytes(body).map_err(|e| FramingError::Decode(e.to_string()))
}

/// Write one frame and flush
pub async fn write_message<W>(writer: &mut W, msg: &WireMessage) -> Result<(), FramingError>
where
    W: AsyncWrite + Unpin,
{
    writer.write_all(&encode_frame(msg)?).await?;
    writer.flush().await?;
    Ok(())
}

/// Read one frame
///
/// `Ok(None)` means the peer closed the stream between frames.
pub async fn read_message<R>(reader: &mut R) -> Result<Option<WireMessage>, FramingError>
where
    R: AsyncRead + Unpin,
{
    let len = match reader.read_u32().await {
        Ok(len) => len as usize,
        Err(e) if e.kind() == std::io::ErrorKind::UnexpectedEof => return Ok(None),
        Err(e) => return Err(e.into()),
    };
    check_len(len)?;

    let mut body = vec![0u8; len];
    reader.read_exact(&mut body).await?;
    decode_body(&body).map(Some)
}

/// Frame encoding and decoding failures
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum FramingError {
    #[error("frame of {len} bytes exceeds the {max} byte limit", max = MAX_MESSAGE_SIZE)]
    TooLarge { len: usize },

    #[error("cannot encode message: {0}")]
    Encode(String),

    #[error("cannot decode message: {0}")]
    Decode(String),

    #[error("stream error: {0}")]
    Io(String),
}

impl From<std::io::Error> for FramingError {
    fn from(e: std::io::Error) -> Self {
        FramingError::Io(e.to_string())
    }
}

impl From<FramingError> for relaymesh_core::TransportError {
    fn from(e: FramingError) -> Self {
        match e {
            FramingError::Io(msg) => relaymesh_core::TransportError::SendFailed(msg),
            other => relaymesh_core::TransportError::Protocol(other.to_string()),
        }
    }
}
