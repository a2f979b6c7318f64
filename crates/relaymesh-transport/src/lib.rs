//! # Relaymesh Transport
//!
//! TCP transport for relaymesh nodes.
//!
//! - [`protocol`]: length-prefixed postcard framing of [`WireMessage`]s
//! - [`tcp`]: [`TcpTransport`], the production [`Transport`](relaymesh_core::Transport),
//!   plus client helpers used by the command line
//! - [`server`]: [`TcpServer`], dispatching inbound frames to an [`InboundHandler`]
//!
//! ## Example
//!
//! ```rust,ignore
//! use relaymesh_transport::{TcpServer, TcpTransport};
//!
//! let server = TcpServer::bind("0.0.0.0:50051".parse()?).await?;
//! let handle = server.spawn(node.clone(), shutdown_tx.subscribe());
//!
//! let transport = TcpTransport::new(topology.address_book().clone());
//! transport.send(&neighbor, payload).await?;
//! ```

pub mod protocol;
pub mod server;
pub mod tcp;

// Re-export main types
pub use protocol::{
    FramingError, MAX_MESSAGE_SIZE, RejectCode, WireMessage, decode_frame, encode_frame, read_message,
    write_message,
};
pub use server::{InboundHandler, Rejection, ServerError, TcpServer};
pub use tcp::{DEFAULT_CONNECT_TIMEOUT, TcpTransport, connect, deliver, query_load};
