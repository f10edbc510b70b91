//! Parsing and serialization of the TCP header that prefixes every segment
//! exchanged with the protocol engine.

mod tcp;
pub use tcp::TcpHeader;
