//! Send side of the message-based queue pair.
//!
//! Application messages are queued whole and exposed to the protocol engine
//! as a flat byte stream. They stay queued until acknowledged, so segments
//! built for a (re)transmission can carry the original message boundaries.
//!
//! ```text
//!          begin                 sent            offered              end
//!     ------|----------------------|-----------------|------------------|----
//!           |  sent, unacknowledged |  offered, not   |  queued, never   |
//!           |                      |  yet accepted   |  offered         |
//! ```

use std::collections::VecDeque;
use std::fmt;

use bytes::Bytes;

use crate::error::QueueError;
use crate::headers::TcpHeader;
use crate::message::AppMessage;
use crate::segment::TcpSegment;
use crate::seq::{is_between_wrapped, seq_diff, wrapping_gt, wrapping_le, wrapping_lt};
use crate::socket::Socket;
use crate::{Error, Result};
use crate::{debug, error, info, warn};

/// One application write held by the send queue.
#[derive(Debug)]
struct QueuedPayload {
    /// Sequence number immediately after the last byte of the message.
    end_seq: u32,
    /// The message, owned by the queue until acknowledged.
    message: AppMessage,
}

impl QueuedPayload {
    fn start_seq(&self) -> u32 {
        self.end_seq.wrapping_sub(self.message.len() as u32)
    }
}

/// Send queue holding application messages as "virtual bytes" for the
/// protocol engine.
#[derive(Debug, Default)]
pub struct SendQueue {
    /// Connection the queue belongs to.
    sock: Socket,
    /// Queued messages, oldest first.
    payloads: VecDeque<QueuedPayload>,
    /// First sequence number stored.
    begin: u32,
    /// Last sequence number stored + 1.
    end: u32,
    /// Whether `begin` and `end` have been initialized by a first enqueue.
    is_valid_seq: bool,
    /// Sequence number the stream starts at on the first enqueue.
    initial_seq: u32,
    /// Bytes queued but not yet offered to the protocol engine.
    unsent: usize,
    /// Bytes offered to the protocol engine but not yet confirmed by
    /// [SendQueue::dequeue_tcp_layer_msg].
    unconfirmed: usize,
}

/// Snapshot of the send queue bookkeeping.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct SendQueueStatus {
    /// First sequence number stored.
    pub begin: u32,
    /// Last sequence number stored + 1.
    pub end: u32,
    /// Bytes still retained (unacknowledged plus unsent).
    pub bytes_available: u32,
    /// Bytes never offered to the protocol engine.
    pub unsent: usize,
    /// Bytes offered but not yet confirmed.
    pub unconfirmed: usize,
    /// Number of queued messages.
    pub messages: usize,
}

impl fmt::Display for SendQueueStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(
            f,
            "send queue: seq {}..{} ({} bytes available, {} unsent, {} unconfirmed) in {} messages",
            self.begin,
            self.end,
            self.bytes_available,
            self.unsent,
            self.unconfirmed,
            self.messages
        )
    }
}

impl SendQueue {
    /// Creates an empty send queue whose stream starts at sequence number 0.
    pub fn new() -> Self {
        Default::default()
    }

    /// Creates an empty send queue whose stream starts at the provided
    /// sequence number.
    pub fn with_initial_seq(initial_seq: u32) -> Self {
        Self {
            initial_seq,
            ..Default::default()
        }
    }

    /// Associates the queue with its connection.
    ///
    /// `snd_nxt` is the protocol engine's next send sequence number and
    /// becomes the start of the stream, unless data has already been queued.
    pub fn set_connection(&mut self, sock: Socket, snd_nxt: u32) {
        self.sock = sock;

        if self.is_valid_seq {
            warn!(
                "[{}] send queue already started at {}, ignoring SND.NXT {snd_nxt}",
                self.sock, self.begin
            );
        } else {
            self.initial_seq = snd_nxt;

            info!("[{}] send queue attached, stream starts at {snd_nxt}", self.sock);
        }
    }

    /// Inserts a message the application wants to send at the end of the
    /// stream. The queue owns the message until its bytes are acknowledged.
    ///
    /// The first call fixes the start of the stream.
    pub fn enqueue_app_data(&mut self, message: AppMessage) {
        if !self.is_valid_seq {
            self.is_valid_seq = true;
            self.begin = self.initial_seq;
            self.end = self.initial_seq;
        }

        // Occupies no sequence space, so there is no boundary to keep.
        if message.is_empty() {
            debug!("[{}] dropping empty application message", self.sock);
            return;
        }

        let len = message.len();

        self.end = self.end.wrapping_add(len as u32);
        self.unsent += len;

        debug!(
            "[{}] queued {len} bytes of application data, stream now ends at {}",
            self.sock, self.end
        );

        self.payloads.push_back(QueuedPayload {
            end_seq: self.end,
            message,
        });
    }

    /// Copies bytes never offered before into `buf`, returning the number of
    /// bytes copied.
    ///
    /// Nothing is removed from the queue. The copied bytes count as offered
    /// until the protocol engine reports how many it accepted through
    /// [SendQueue::dequeue_tcp_layer_msg].
    pub fn get_bytes_for_tcp_layer(&mut self, buf: &mut [u8]) -> usize {
        let nbytes = usize::min(buf.len(), self.unsent);

        if nbytes == 0 {
            return 0;
        }

        let mut seq = self.offered_seq();
        let mut copied = 0;

        for payload in &self.payloads {
            if copied == nbytes {
                break;
            }

            // Already offered in full.
            if wrapping_le(payload.end_seq, seq) {
                continue;
            }

            let offset = seq_diff(seq, payload.start_seq()) as usize;
            let remaining = &payload.message.payload()[offset..];
            let take = usize::min(remaining.len(), nbytes - copied);

            buf[copied..copied + take].copy_from_slice(&remaining[..take]);

            copied += take;
            seq = seq.wrapping_add(take as u32);
        }

        debug_assert_eq!(copied, nbytes, "unsent bytes not backed by queued messages");

        self.unsent -= copied;
        self.unconfirmed += copied;

        copied
    }

    /// Confirms that the protocol engine accepted `len` of the bytes offered
    /// since the last confirmation.
    ///
    /// Offered bytes beyond `len` are rewound and will be offered again.
    /// Messages are kept for retransmission until acknowledged.
    ///
    /// # Errors
    ///
    /// Returns an error if `len` exceeds the number of offered bytes.
    pub fn dequeue_tcp_layer_msg(&mut self, len: usize) -> Result<()> {
        if len > self.unconfirmed {
            let err = QueueError::DequeueExceedsOffered {
                provided: len,
                offered: self.unconfirmed,
            };

            error!("[{}] {err}", self.sock);
            return Err(Error::Queue(err));
        }

        let rewound = self.unconfirmed - len;

        if rewound > 0 {
            debug!(
                "[{}] TCP layer accepted {len} bytes, rewinding {rewound} bytes",
                self.sock
            );
        }

        self.unsent += rewound;
        self.unconfirmed = 0;

        Ok(())
    }

    /// Returns how many bytes the queue retains: sent but unacknowledged
    /// bytes plus bytes not yet sent.
    pub fn bytes_available(&self) -> u32 {
        if self.is_valid_seq {
            seq_diff(self.end, self.begin)
        } else {
            0
        }
    }

    /// Builds the segment for the raw TCP segment (header followed by
    /// payload) the protocol engine wants to transmit or retransmit.
    ///
    /// Every queued message whose last byte lies within the payload is
    /// attached to the segment, so the receiver sees the original message
    /// boundaries rather than one opaque block of bytes.
    ///
    /// # Errors
    ///
    /// Returns an error if the TCP header cannot be parsed or the payload
    /// covers bytes the queue does not hold. A partially acknowledged
    /// message is held whole, so a resent segment may start before
    /// [SendQueue::begin_seq].
    pub fn create_segment_with_bytes(&self, raw: &[u8]) -> Result<TcpSegment> {
        let (header, payload) = TcpHeader::split(raw)?;
        let mut segment = TcpSegment::new(header, Bytes::copy_from_slice(payload));

        // SYN, FIN or pure ACK.
        if segment.is_empty() {
            return Ok(segment);
        }

        let from = segment.seq_begin();
        let to = segment.seq_end();

        let retained = self.retained_seq();

        if !self.is_valid_seq || wrapping_lt(from, retained) || wrapping_gt(to, self.end) {
            let err = QueueError::SegmentOutOfRange {
                from,
                to,
                begin: retained,
                end: self.end,
            };

            error!("[{}] {err}", self.sock);
            return Err(Error::Queue(err));
        }

        for payload in &self.payloads {
            if wrapping_le(payload.end_seq, from) {
                continue;
            }

            if wrapping_gt(payload.end_seq, to) {
                break;
            }

            segment.add_payload_message(payload.message.clone(), payload.end_seq);
        }

        debug!(
            "[{}] created segment for seq {from}..{to} with {} message boundaries",
            self.sock,
            segment.payload_messages().len()
        );

        Ok(segment)
    }

    /// Releases every message whose bytes all precede `ack` and moves the
    /// start of the queue to `ack`.
    ///
    /// A message only partially covered by `ack` stays queued. Acks at or
    /// before the start of the queue are ignored. Once every queued byte was
    /// accepted, an ack one past the last of them acknowledges a FIN and is
    /// treated as covering the stream.
    ///
    /// # Errors
    ///
    /// Returns an error if `ack` covers bytes never accepted by the protocol
    /// engine.
    pub fn discard_acked_bytes(&mut self, ack: u32) -> Result<()> {
        if !self.is_valid_seq || wrapping_le(ack, self.begin) {
            debug!("[{}] ignoring stale acknowledgment {ack}", self.sock);
            return Ok(());
        }

        let sent = self.sent_seq();

        let fin_outstanding = self.unsent == 0 && self.unconfirmed == 0;

        // Acked range is `begin + 1..=sent`, or the FIN one past it.
        let ack = if is_between_wrapped(self.begin, ack, sent.wrapping_add(1)) {
            ack
        } else if fin_outstanding && ack == sent.wrapping_add(1) {
            sent
        } else {
            let err = QueueError::AckBeyondSent { ack, sent };

            error!("[{}] {err}", self.sock);
            return Err(Error::Queue(err));
        };

        let released = self
            .payloads
            .iter()
            .position(|payload| wrapping_gt(payload.end_seq, ack))
            .unwrap_or(self.payloads.len());

        self.payloads.drain(..released);

        debug!(
            "[{}] acknowledged {} bytes, released {released} messages",
            self.sock,
            seq_diff(ack, self.begin)
        );

        self.begin = ack;

        Ok(())
    }

    /// Returns the first sequence number stored.
    pub fn begin_seq(&self) -> u32 {
        self.begin
    }

    /// Returns the sequence number after the last byte stored.
    pub fn end_seq(&self) -> u32 {
        self.end
    }

    /// Returns `true` once the first message fixed the start of the stream.
    pub fn is_valid_seq(&self) -> bool {
        self.is_valid_seq
    }

    /// Returns the number of bytes never offered to the protocol engine.
    pub fn unsent_bytes(&self) -> usize {
        self.unsent
    }

    /// Returns the number of queued messages.
    pub fn len(&self) -> usize {
        self.payloads.len()
    }

    /// Returns `true` if no messages are queued.
    pub fn is_empty(&self) -> bool {
        self.payloads.is_empty()
    }

    /// Returns a snapshot of the queue bookkeeping.
    pub fn status(&self) -> SendQueueStatus {
        SendQueueStatus {
            begin: self.begin,
            end: self.end,
            bytes_available: self.bytes_available(),
            unsent: self.unsent,
            unconfirmed: self.unconfirmed,
            messages: self.payloads.len(),
        }
    }

    /// Logs the current queue bookkeeping (debug builds only).
    pub fn log_status(&self) {
        debug!("[{}] {}", self.sock, self.status());
    }

    /// Releases every queued message and forgets the stream position.
    pub fn clear(&mut self) {
        self.payloads.clear();
        self.begin = 0;
        self.end = 0;
        self.is_valid_seq = false;
        self.unsent = 0;
        self.unconfirmed = 0;
    }

    /// Sequence number of the first byte still held, which precedes `begin`
    /// while the oldest message is only partially acknowledged.
    fn retained_seq(&self) -> u32 {
        self.payloads
            .front()
            .map_or(self.begin, QueuedPayload::start_seq)
    }

    /// Sequence number of the next byte to offer.
    fn offered_seq(&self) -> u32 {
        self.end.wrapping_sub(self.unsent as u32)
    }

    /// Sequence number after the last byte the protocol engine accepted.
    fn sent_seq(&self) -> u32 {
        self.offered_seq().wrapping_sub(self.unconfirmed as u32)
    }
}
