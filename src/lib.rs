//! Message-based send and receive queues sitting between a byte-stream TCP
//! engine and a network simulator whose transport layer exchanges
//! application message objects.
//!
//! The protocol engine sees flat bytes addressed by sequence number. The
//! simulator sees the messages its applications wrote. [SendQueue] and
//! [RecvQueue] translate between the two without losing or duplicating a
//! byte, and keep enough bookkeeping to reproduce the original message
//! boundaries on retransmission and delivery.
//!
//! Both queues are owned by a single connection and driven synchronously
//! from its processing context.

#![warn(missing_docs, missing_debug_implementations, rust_2018_idioms)]

pub mod log;

pub mod error;
pub use error::{Error, ParseError, QueueError, Result};

pub mod headers;
pub mod message;
pub mod segment;
pub mod seq;
pub mod socket;

pub mod recv;
pub mod send;

pub use headers::TcpHeader;
pub use message::AppMessage;
pub use recv::{RecvQueue, RecvQueueStatus};
pub use segment::{PayloadMessage, TcpSegment};
pub use send::{SendQueue, SendQueueStatus};
pub use socket::{Socket, SocketAddr};
