//! TCP segments carrying application message boundaries.
//!
//! The protocol engine only deals in flat bytes. A [TcpSegment] additionally
//! carries the application messages whose last byte falls inside its payload,
//! each tagged with the sequence number following that byte, so the receiving
//! side can hand the same messages to its application.

use std::io::Write;

use bytes::Bytes;

use crate::Result;
use crate::headers::TcpHeader;
use crate::message::AppMessage;
use crate::seq;

/// Application message ending inside a segment.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct PayloadMessage {
    /// Sequence number immediately after the last byte of the message.
    pub end_seq: u32,
    /// The message itself.
    pub message: AppMessage,
}

impl PayloadMessage {
    /// Returns the sequence number of the first byte of the message.
    pub fn start_seq(&self) -> u32 {
        self.end_seq.wrapping_sub(self.message.len() as u32)
    }
}

/// TCP segment as exchanged between the simulator and the protocol engine.
#[derive(Debug, Clone)]
pub struct TcpSegment {
    /// TCP header of the segment.
    pub header: TcpHeader,
    /// Payload bytes of the segment.
    payload: Bytes,
    /// Messages ending within the payload, in stream order.
    messages: Vec<PayloadMessage>,
}

impl TcpSegment {
    /// Create a new TCP segment given the TCP header and payload, with no
    /// message boundaries attached.
    pub fn new(header: TcpHeader, payload: impl Into<Bytes>) -> Self {
        Self {
            header,
            payload: payload.into(),
            messages: Vec::new(),
        }
    }

    /// Returns the payload bytes of the segment.
    pub fn payload(&self) -> &Bytes {
        &self.payload
    }

    /// Returns the number of payload bytes in the segment.
    pub fn payload_len(&self) -> usize {
        self.payload.len()
    }

    /// Returns the sequence number of the first payload byte.
    pub fn seq_begin(&self) -> u32 {
        self.header.data_seq()
    }

    /// Returns the sequence number immediately after the last payload byte.
    pub fn seq_end(&self) -> u32 {
        self.seq_begin().wrapping_add(self.payload.len() as u32)
    }

    /// Attaches a message whose last byte precedes `end_seq`.
    ///
    /// Messages must be attached in stream order.
    pub fn add_payload_message(&mut self, message: AppMessage, end_seq: u32) {
        debug_assert!(
            self.messages
                .last()
                .is_none_or(|last| seq::wrapping_lt(last.end_seq, end_seq)),
            "payload messages attached out of order"
        );

        self.messages.push(PayloadMessage { end_seq, message });
    }

    /// Returns the attached messages in stream order.
    pub fn payload_messages(&self) -> &[PayloadMessage] {
        &self.messages
    }

    /// Returns the message boundaries within the segment, as the sequence
    /// number following each message.
    pub fn boundaries(&self) -> impl Iterator<Item = u32> + '_ {
        self.messages.iter().map(|m| m.end_seq)
    }

    /// Consumes the segment, returning its attached messages.
    pub fn into_payload_messages(self) -> Vec<PayloadMessage> {
        self.messages
    }

    /// Returns the length of the serialized segment in bytes.
    pub fn len(&self) -> usize {
        self.header.header_len() + self.payload.len()
    }

    /// Returns `true` if the segment carries no payload.
    pub fn is_empty(&self) -> bool {
        self.payload.is_empty()
    }

    /// Writes the header followed by the payload bytes to the given output
    /// stream.
    pub fn write<T: Write>(&self, output: &mut T) -> Result<()> {
        self.header.write(output)?;
        output.write_all(&self.payload)?;

        Ok(())
    }

    /// Returns the memory representation of the TCP segment as a vector of
    /// bytes in big-endian (network) byte order.
    pub fn to_be_bytes(&self) -> Result<Vec<u8>> {
        let mut buf = Vec::with_capacity(self.len());
        self.write(&mut buf)?;

        Ok(buf)
    }
}
