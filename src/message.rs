//! Application-level messages exchanged with the simulator's transport layer.

use bytes::Bytes;

/// Opaque application message.
///
/// The payload is reference counted, so cloning a message for a
/// retransmission does not copy its bytes.
#[derive(Debug, Clone, PartialEq, Eq, Default)]
pub struct AppMessage {
    /// Name given by the application, carried along for diagnostics.
    name: String,
    /// Bytes of the message as written by the application.
    payload: Bytes,
}

impl AppMessage {
    /// Creates an unnamed message from the provided payload.
    pub fn new(payload: impl Into<Bytes>) -> Self {
        Self {
            name: String::new(),
            payload: payload.into(),
        }
    }

    /// Creates a named message from the provided payload.
    pub fn with_name(name: impl Into<String>, payload: impl Into<Bytes>) -> Self {
        Self {
            name: name.into(),
            payload: payload.into(),
        }
    }

    /// Returns the name of the message.
    pub fn name(&self) -> &str {
        &self.name
    }

    /// Returns the payload of the message.
    pub fn payload(&self) -> &Bytes {
        &self.payload
    }

    /// Consumes the message, returning its payload.
    pub fn into_payload(self) -> Bytes {
        self.payload
    }

    /// Returns the length of the message in bytes, which is also the number
    /// of sequence numbers it occupies.
    pub fn len(&self) -> usize {
        self.payload.len()
    }

    /// Returns `true` if the message carries no bytes.
    pub fn is_empty(&self) -> bool {
        self.payload.is_empty()
    }
}
