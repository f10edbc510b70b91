//! Error types for the message-based queues, covering TCP header parsing and
//! bookkeeping violations between the queues and the protocol engine.

use std::{error, fmt, io, result};

/// A convenience wrapper around `Result` for [crate::Error].
pub type Result<T> = result::Result<T, Error>;

/// Set of errors that can occur while moving data through the queues.
#[derive(Debug)]
#[non_exhaustive]
pub enum Error {
    /// Error while writing a TCP segment into a buffer.
    Io(io::Error),
    /// Error parsing a TCP segment handed out by the protocol engine.
    Parse(ParseError),
    /// The protocol engine and the queue disagree about the byte stream.
    Queue(QueueError),
}

impl error::Error for Error {}

impl From<io::Error> for Error {
    fn from(err: io::Error) -> Error {
        Error::Io(err)
    }
}

impl From<ParseError> for Error {
    fn from(err: ParseError) -> Error {
        Error::Parse(err)
    }
}

impl From<QueueError> for Error {
    fn from(err: QueueError) -> Error {
        Error::Queue(err)
    }
}

impl fmt::Display for Error {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match *self {
            Error::Io(ref err) => fmt::Display::fmt(err, f),
            Error::Parse(ref err) => fmt::Display::fmt(err, f),
            Error::Queue(ref err) => fmt::Display::fmt(err, f),
        }
    }
}

/// Error occurred while trying to parse a TCP segment.
#[derive(Debug)]
#[non_exhaustive]
#[allow(missing_docs)]
pub enum ParseError {
    /// Input buffer shorter than the minimum TCP header.
    InvalidBufferLength { provided: usize, min: u16 },
    /// Invalid TCP data offset.
    InvalidDataOffset { provided: u16, min: u16, max: u16 },
    /// Mismatch between the provided and expected TCP header length.
    ///
    /// Value provided is less than `data_offset << 2`.
    HeaderLengthMismatch { provided: usize, expected: u16 },
}

impl error::Error for ParseError {}

impl fmt::Display for ParseError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match *self {
            ParseError::InvalidBufferLength { provided, min } => {
                write!(
                    f,
                    "invalid segment length: {provided} bytes (less than minimum TCP header length {min} bytes)"
                )
            }
            ParseError::InvalidDataOffset { provided, min, max } => {
                write!(
                    f,
                    "invalid TCP data offset: {provided} (not within the valid range: {min}..={max})"
                )
            }
            ParseError::HeaderLengthMismatch { provided, expected } => {
                write!(
                    f,
                    "invalid TCP header length: {provided} bytes (less than indicated by data offset: {expected} bytes)"
                )
            }
        }
    }
}

/// Bookkeeping violation between a queue and the protocol engine.
///
/// These indicate the two sides have lost track of the byte stream and are
/// logged at error level when they are raised.
#[derive(Debug, PartialEq, Eq)]
#[non_exhaustive]
#[allow(missing_docs)]
pub enum QueueError {
    /// An acknowledgment covers bytes that were never offered to the engine.
    AckBeyondSent { ack: u32, sent: u32 },
    /// The engine confirmed more bytes than were offered to it.
    DequeueExceedsOffered { provided: usize, offered: usize },
    /// A segment was requested for bytes the send queue no longer (or never)
    /// held.
    SegmentOutOfRange {
        from: u32,
        to: u32,
        begin: u32,
        end: u32,
    },
    /// The engine's input buffer cannot hold the serialized segment.
    BufferTooSmall { provided: usize, required: usize },
}

impl error::Error for QueueError {}

impl fmt::Display for QueueError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match *self {
            QueueError::AckBeyondSent { ack, sent } => {
                write!(
                    f,
                    "acknowledgment {ack} beyond last sequence number offered to the TCP layer ({sent})"
                )
            }
            QueueError::DequeueExceedsOffered { provided, offered } => {
                write!(
                    f,
                    "TCP layer accepted {provided} bytes but only {offered} bytes were offered"
                )
            }
            QueueError::SegmentOutOfRange {
                from,
                to,
                begin,
                end,
            } => {
                write!(
                    f,
                    "segment range {from}..{to} not held by send queue (holding {begin}..{end})"
                )
            }
            QueueError::BufferTooSmall { provided, required } => {
                write!(
                    f,
                    "TCP layer buffer too small: {provided} bytes (segment requires {required} bytes)"
                )
            }
        }
    }
}
