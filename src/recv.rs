//! Receive side of the message-based queue pair.
//!
//! Segments arriving from the simulator are written into the protocol
//! engine's input buffer as flat bytes, while the application messages they
//! carry are buffered by starting sequence number. Once the engine has
//! reassembled the stream past the end of a message, the message is handed
//! to the application.

use std::collections::BTreeMap;
use std::fmt;

use crate::error::QueueError;
use crate::message::AppMessage;
use crate::segment::TcpSegment;
use crate::seq::{SeqKey, wrapping_le, wrapping_lt};
use crate::socket::Socket;
use crate::{Error, Result};
use crate::{debug, error, info, warn};

/// Receive queue reassembling application messages from the byte stream
/// delivered by the protocol engine.
#[derive(Debug, Default)]
pub struct RecvQueue {
    /// Connection the queue belongs to.
    sock: Socket,
    /// Buffered messages keyed by the sequence number of their first byte.
    ///
    /// BTreeMap used so messages received out of order can be retrieved in
    /// stream order, with keys ordered across the wraparound.
    payloads: BTreeMap<SeqKey, AppMessage>,
    /// Bytes the protocol engine has read but the application has not yet
    /// been handed.
    buffered: usize,
    /// Sequence number following the last message handed to the
    /// application.
    delivered_seq: Option<u32>,
    /// Acknowledgment number of the last outgoing segment with ACK set.
    last_ack_sent: Option<u32>,
}

/// Snapshot of the receive queue bookkeeping.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct RecvQueueStatus {
    /// Bytes read by the protocol engine and not yet extracted.
    pub buffered: usize,
    /// Number of buffered messages.
    pub messages: usize,
    /// Sequence number of the first buffered message.
    pub first_seq: Option<u32>,
    /// Sequence number following the last message extracted.
    pub delivered_seq: Option<u32>,
    /// Acknowledgment number of the last outgoing ACK.
    pub last_ack_sent: Option<u32>,
}

impl fmt::Display for RecvQueueStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(
            f,
            "receive queue: {} bytes buffered in {} messages",
            self.buffered, self.messages
        )?;

        if let Some(seq) = self.first_seq {
            write!(f, ", first at {seq}")?;
        }

        if let Some(seq) = self.delivered_seq {
            write!(f, ", delivered up to {seq}")?;
        }

        if let Some(ack) = self.last_ack_sent {
            write!(f, ", last ACK sent {ack}")?;
        }

        Ok(())
    }
}

impl RecvQueue {
    /// Creates an empty receive queue.
    pub fn new() -> Self {
        Default::default()
    }

    /// Associates the queue with its connection.
    pub fn set_connection(&mut self, sock: Socket) {
        self.sock = sock;

        info!("[{}] receive queue attached", self.sock);
    }

    /// Writes the incoming segment (header followed by payload) into the
    /// protocol engine's input buffer and buffers the application messages
    /// it carries, returning the number of bytes written.
    ///
    /// The segment is consumed. A message starting at the same sequence
    /// number as one already buffered replaces it. A message starting before
    /// the end of the last extracted message is dropped.
    ///
    /// # Errors
    ///
    /// Returns an error if `buf` cannot hold the serialized segment.
    pub fn insert_bytes_from_segment(
        &mut self,
        segment: TcpSegment,
        seq_no: u32,
        buf: &mut [u8],
    ) -> Result<usize> {
        let required = segment.len();

        if buf.len() < required {
            let err = QueueError::BufferTooSmall {
                provided: buf.len(),
                required,
            };

            error!("[{}] {err}", self.sock);
            return Err(Error::Queue(err));
        }

        segment.write(&mut &mut buf[..required])?;

        if seq_no != segment.header.seq_number() {
            warn!(
                "[{}] segment inserted at {seq_no} but carries sequence number {}",
                self.sock,
                segment.header.seq_number()
            );
        }

        for payload in segment.into_payload_messages() {
            let start = payload.start_seq();

            if self.overlaps_delivered(start) {
                debug!(
                    "[{}] dropping message at {start}: already delivered",
                    self.sock
                );
                continue;
            }

            if self
                .payloads
                .insert(SeqKey(start), payload.message)
                .is_some()
            {
                debug!(
                    "[{}] replaced buffered message at {start} with newer copy",
                    self.sock
                );
            }
        }

        Ok(required)
    }

    /// Marks bytes the protocol engine read from its reassembly buffer as
    /// available for extraction.
    pub fn enqueue_tcp_layer_data(&mut self, data: &[u8]) {
        self.buffered += data.len();
    }

    /// Removes and returns the next buffered message that ends at or before
    /// `target` (usually RCV.NXT).
    ///
    /// Returns `None` once no further complete message precedes `target`.
    /// Each call yields at most one message, so callers loop until `None`.
    pub fn extract_bytes_up_to(&mut self, target: u32) -> Option<AppMessage> {
        loop {
            let (&key, message) = self.payloads.first_key_value()?;
            let start = key.get();

            if self.overlaps_delivered(start) {
                warn!(
                    "[{}] discarding message at {start} overlapping delivered data",
                    self.sock
                );
                self.payloads.pop_first();
                continue;
            }

            let end = start.wrapping_add(message.len() as u32);

            if !wrapping_le(end, target) {
                return None;
            }

            let (_, message) = self.payloads.pop_first()?;

            if message.len() > self.buffered {
                warn!(
                    "[{}] extracting {} bytes with only {} bytes read by the TCP layer",
                    self.sock,
                    message.len(),
                    self.buffered
                );
            }

            self.buffered = self.buffered.saturating_sub(message.len());
            self.delivered_seq = Some(end);

            return Some(message);
        }
    }

    /// Returns the number of bytes read by the protocol engine and not yet
    /// extracted.
    pub fn amount_of_buffered_bytes(&self) -> usize {
        self.buffered
    }

    /// Returns the number of buffered messages.
    pub fn queue_length(&self) -> usize {
        self.payloads.len()
    }

    /// Records an outgoing segment. Buffered data is left untouched.
    pub fn notify_about_sending(&mut self, segment: &TcpSegment) {
        if segment.header.ack() {
            self.last_ack_sent = Some(segment.header.ack_number());
        }
    }

    /// Returns the acknowledgment number of the last outgoing ACK.
    pub fn last_ack_sent(&self) -> Option<u32> {
        self.last_ack_sent
    }

    /// Returns a snapshot of the queue bookkeeping.
    pub fn status(&self) -> RecvQueueStatus {
        RecvQueueStatus {
            buffered: self.buffered,
            messages: self.payloads.len(),
            first_seq: self.payloads.keys().next().map(|key| key.get()),
            delivered_seq: self.delivered_seq,
            last_ack_sent: self.last_ack_sent,
        }
    }

    /// Logs the current queue bookkeeping (debug builds only).
    pub fn log_status(&self) {
        debug!("[{}] {}", self.sock, self.status());
    }

    /// Releases every buffered message and resets the counters.
    pub fn clear(&mut self) {
        self.payloads.clear();
        self.buffered = 0;
        self.delivered_seq = None;
        self.last_ack_sent = None;
    }

    fn overlaps_delivered(&self, start: u32) -> bool {
        self.delivered_seq
            .is_some_and(|delivered| wrapping_lt(start, delivered))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::headers::TcpHeader;
    use crate::send::SendQueue;

    /// Segment covering `payload` starting at `seq`, carrying one message
    /// spanning the whole payload.
    fn message_segment(seq: u32, payload: &[u8]) -> TcpSegment {
        let mut header = TcpHeader::new(80, 4000, seq, 8192);
        header.set_ack();
        header.set_psh();

        let mut segment = TcpSegment::new(header, payload.to_vec());
        segment.add_payload_message(
            AppMessage::new(payload.to_vec()),
            seq.wrapping_add(payload.len() as u32),
        );

        segment
    }

    fn stream(len: usize) -> Vec<u8> {
        (0..len).map(|i| i as u8).collect()
    }

    #[test]
    fn recv_queue_reassembly_out_of_order() {
        let data = stream(20);
        let mut queue = RecvQueue::new();
        let mut buf = [0u8; 1500];

        let n = queue
            .insert_bytes_from_segment(message_segment(10, &data[10..]), 10, &mut buf)
            .unwrap();
        assert_eq!(n, 30);
        assert_eq!(&buf[20..30], &data[10..]);

        let n = queue
            .insert_bytes_from_segment(message_segment(0, &data[..10]), 0, &mut buf)
            .unwrap();
        assert_eq!(n, 30);
        assert_eq!(&buf[20..30], &data[..10]);

        assert_eq!(queue.queue_length(), 2);

        queue.enqueue_tcp_layer_data(&data);
        assert_eq!(queue.amount_of_buffered_bytes(), 20);

        let mut out = Vec::new();
        let mut count = 0;

        while let Some(message) = queue.extract_bytes_up_to(20) {
            out.extend_from_slice(message.payload());
            count += 1;
        }

        assert_eq!(count, 2);
        assert_eq!(out, data);
        assert_eq!(queue.amount_of_buffered_bytes(), 0);
        assert_eq!(queue.queue_length(), 0);
        assert!(queue.extract_bytes_up_to(20).is_none());
    }

    #[test]
    fn recv_queue_extraction_stops_at_target() {
        let data = stream(20);
        let mut queue = RecvQueue::new();
        let mut buf = [0u8; 1500];

        assert!(
            queue
                .insert_bytes_from_segment(message_segment(0, &data[..10]), 0, &mut buf)
                .is_ok()
        );
        assert!(
            queue
                .insert_bytes_from_segment(message_segment(10, &data[10..]), 10, &mut buf)
                .is_ok()
        );
        queue.enqueue_tcp_layer_data(&data[..15]);

        let first = queue.extract_bytes_up_to(15).unwrap();
        assert_eq!(first.payload(), &data[..10]);

        // Second message is only partially below the target.
        assert!(queue.extract_bytes_up_to(15).is_none());
        assert!(queue.extract_bytes_up_to(15).is_none());
        assert_eq!(queue.amount_of_buffered_bytes(), 5);

        queue.enqueue_tcp_layer_data(&data[15..]);

        let second = queue.extract_bytes_up_to(20).unwrap();
        assert_eq!(second.payload(), &data[10..]);
        assert!(queue.extract_bytes_up_to(20).is_none());
    }

    #[test]
    fn recv_queue_idempotent_extraction() {
        let mut queue = RecvQueue::new();
        let mut buf = [0u8; 1500];

        assert!(queue.extract_bytes_up_to(100).is_none());

        assert!(
            queue
                .insert_bytes_from_segment(message_segment(0, b"abc"), 0, &mut buf)
                .is_ok()
        );
        queue.enqueue_tcp_layer_data(b"abc");

        assert!(queue.extract_bytes_up_to(3).is_some());

        for _ in 0..3 {
            assert!(queue.extract_bytes_up_to(3).is_none());
        }

        assert!(
            queue
                .insert_bytes_from_segment(message_segment(3, b"de"), 3, &mut buf)
                .is_ok()
        );
        queue.enqueue_tcp_layer_data(b"de");

        assert_eq!(queue.extract_bytes_up_to(5).unwrap().payload(), &b"de"[..]);
    }

    #[test]
    fn recv_queue_orders_across_wraparound() {
        let data = stream(20);
        let mut queue = RecvQueue::new();
        let mut buf = [0u8; 1500];

        assert!(
            queue
                .insert_bytes_from_segment(message_segment(0, &data[10..]), 0, &mut buf)
                .is_ok()
        );
        assert!(
            queue
                .insert_bytes_from_segment(
                    message_segment(0xFFFF_FFF6, &data[..10]),
                    0xFFFF_FFF6,
                    &mut buf
                )
                .is_ok()
        );
        queue.enqueue_tcp_layer_data(&data);

        assert_eq!(queue.status().first_seq, Some(0xFFFF_FFF6));

        assert_eq!(queue.extract_bytes_up_to(10).unwrap().payload(), &data[..10]);
        assert_eq!(queue.extract_bytes_up_to(10).unwrap().payload(), &data[10..]);
        assert!(queue.extract_bytes_up_to(10).is_none());
    }

    #[test]
    fn recv_queue_duplicate_start_replaces() {
        let mut queue = RecvQueue::new();
        let mut buf = [0u8; 1500];

        assert!(
            queue
                .insert_bytes_from_segment(message_segment(0, b"old"), 0, &mut buf)
                .is_ok()
        );
        assert!(
            queue
                .insert_bytes_from_segment(message_segment(0, b"new"), 0, &mut buf)
                .is_ok()
        );
        assert_eq!(queue.queue_length(), 1);

        queue.enqueue_tcp_layer_data(b"new");
        assert_eq!(queue.extract_bytes_up_to(3).unwrap().payload(), &b"new"[..]);
        assert!(queue.extract_bytes_up_to(3).is_none());
    }

    #[test]
    fn recv_queue_overlap_with_delivered_dropped() {
        let mut queue = RecvQueue::new();
        let mut buf = [0u8; 1500];

        assert!(
            queue
                .insert_bytes_from_segment(message_segment(0, b"0123456789"), 0, &mut buf)
                .is_ok()
        );
        // Starts inside the first message.
        assert!(
            queue
                .insert_bytes_from_segment(message_segment(5, b"56789abcde"), 5, &mut buf)
                .is_ok()
        );
        queue.enqueue_tcp_layer_data(b"0123456789abcde");

        assert_eq!(
            queue.extract_bytes_up_to(15).unwrap().payload(),
            &b"0123456789"[..]
        );
        assert!(queue.extract_bytes_up_to(15).is_none());
        assert_eq!(queue.queue_length(), 0);

        // Retransmission of delivered data never reaches the map.
        assert!(
            queue
                .insert_bytes_from_segment(message_segment(0, b"0123456789"), 0, &mut buf)
                .is_ok()
        );
        assert_eq!(queue.queue_length(), 0);
    }

    #[test]
    fn recv_queue_buffer_too_small_invalid() {
        let mut queue = RecvQueue::new();
        let mut buf = [0u8; 24];

        let res = queue.insert_bytes_from_segment(message_segment(0, b"hello"), 0, &mut buf);
        assert!(matches!(
            res,
            Err(Error::Queue(QueueError::BufferTooSmall {
                provided: 24,
                required: 25
            }))
        ));
        assert_eq!(queue.queue_length(), 0);
    }

    #[test]
    fn recv_queue_segment_without_messages() {
        let mut queue = RecvQueue::new();
        let mut buf = [0u8; 64];

        let segment = TcpSegment::new(TcpHeader::new(80, 4000, 7, 512), &b"partial"[..]);
        assert_eq!(
            queue.insert_bytes_from_segment(segment, 7, &mut buf).unwrap(),
            27
        );

        let (header, payload) = TcpHeader::split(&buf[..27]).unwrap();
        assert_eq!(header.seq_number(), 7);
        assert_eq!(payload, b"partial");
        assert_eq!(queue.queue_length(), 0);
    }

    #[test]
    fn recv_queue_notify_about_sending() {
        let mut queue = RecvQueue::new();
        let mut buf = [0u8; 64];

        assert!(
            queue
                .insert_bytes_from_segment(message_segment(0, b"abc"), 0, &mut buf)
                .is_ok()
        );
        queue.enqueue_tcp_layer_data(b"abc");

        let mut header = TcpHeader::new(4000, 80, 0, 8192);
        queue.notify_about_sending(&TcpSegment::new(header, Vec::new()));
        assert_eq!(queue.last_ack_sent(), None);

        header.set_ack();
        header.set_ack_number(3);
        queue.notify_about_sending(&TcpSegment::new(header, Vec::new()));
        assert_eq!(queue.last_ack_sent(), Some(3));

        assert_eq!(queue.amount_of_buffered_bytes(), 3);
        assert_eq!(queue.queue_length(), 1);
        assert!(queue.status().to_string().contains("last ACK sent 3"));

        queue.clear();
        assert_eq!(queue.queue_length(), 0);
        assert_eq!(queue.last_ack_sent(), None);
    }

    #[test]
    fn send_to_recv_preserves_messages() {
        const MSS: usize = 7;

        let messages = [
            AppMessage::with_name("a", &b"first message"[..]),
            AppMessage::with_name("b", &b"x"[..]),
            AppMessage::with_name("c", &b"a somewhat longer third message"[..]),
        ];

        let mut snd = SendQueue::with_initial_seq(0xFFFF_FFF0);
        for message in &messages {
            snd.enqueue_app_data(message.clone());
        }

        // Segment the stream the way the protocol engine would.
        let mut raw_segments = Vec::new();
        let mut seq = snd.begin_seq();
        let mut chunk = [0u8; MSS];

        loop {
            let n = snd.get_bytes_for_tcp_layer(&mut chunk);
            if n == 0 {
                break;
            }
            assert!(snd.dequeue_tcp_layer_msg(n).is_ok());

            let segment = TcpSegment::new(TcpHeader::new(4000, 80, seq, 8192), chunk[..n].to_vec());
            raw_segments.push(segment.to_be_bytes().unwrap());
            seq = seq.wrapping_add(n as u32);
        }

        let mut rcv = RecvQueue::new();
        let mut input = [0u8; 128];

        // Deliver in reverse to exercise out-of-order buffering.
        for raw in raw_segments.iter().rev() {
            let segment = snd.create_segment_with_bytes(raw).unwrap();
            let seq_no = segment.header.seq_number();
            let payload = segment.payload().clone();

            let n = rcv.insert_bytes_from_segment(segment, seq_no, &mut input).unwrap();
            assert_eq!(&input[..n], &raw[..]);

            rcv.enqueue_tcp_layer_data(&payload);
        }

        let mut received = Vec::new();
        while let Some(message) = rcv.extract_bytes_up_to(seq) {
            received.push(message);
        }

        assert_eq!(received, messages);
        assert_eq!(rcv.amount_of_buffered_bytes(), 0);

        assert!(snd.discard_acked_bytes(seq).is_ok());
        assert!(snd.is_empty());
        assert_eq!(snd.bytes_available(), 0);
    }
}
