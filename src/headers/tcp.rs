use std::io;

use crate::{Error, ParseError};

/// TCP Segment Header.
///
/// RFC 793 (3.1)
///
/// ```text
///   0                   1                   2                   3
///     0 1 2 3 4 5 6 7 8 9 0 1 2 3 4 5 6 7 8 9 0 1 2 3 4 5 6 7 8 9 0 1
///    +-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+
///    |          Source Port          |       Destination Port        |
///    +-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+
///    |                        Sequence Number                        |
///    +-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+
///    |                    Acknowledgment Number                      |
///    +-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+
///    |  Data |           |U|A|P|R|S|F|                               |
///    | Offset| Reserved  |R|C|S|S|Y|I|            Window             |
///    |       |           |G|K|H|T|N|N|                               |
///    +-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+
///    |           Checksum            |         Urgent Pointer        |
///    +-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+
///    |                    Options                    |    Padding    |
///    +-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+
///    |                             data                              |
///    +-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+
/// ```
///
/// The protocol engine computes checksums and builds options itself, so both
/// are carried through unchanged rather than interpreted.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct TcpHeader {
    /// The source port number.
    src_port: u16,
    /// The destination port number.
    dst_port: u16,
    /// The sequence number of the first data octet in this segment
    /// (except when SYN is present). If SYN is present the sequence number is
    /// the initial sequence number (ISN) and the first data octet is ISN+1.
    seq_number: u32,
    /// If the ACK control bit is set this field contains the value of the next
    /// sequence number the sender of the segment is expecting to receive.
    ack_number: u32,
    /// Data offset (4-bits), reserved (6-bits) and control bits (6-bits):
    ///
    /// ```text
    ///    URG:  Urgent Pointer field significant
    ///    ACK:  Acknowledgment field significant
    ///    PSH:  Push Function
    ///    RST:  Reset the connection
    ///    SYN:  Synchronize sequence numbers
    ///    FIN:  No more data from sender
    /// ```
    offset_and_control_bits: u16,
    /// The number of data octets the sender of this segment is willing to
    /// accept.
    window: u16,
    /// Checksum as computed by the protocol engine.
    checksum: u16,
    /// Positive offset from the sequence number in this segment.
    urgent_pointer: u16,
    /// Number of option bytes stored in `options`.
    options_len: usize,
    /// Raw option bytes, including padding.
    options: [u8; Self::MAX_OPTIONS_LEN],
}

impl TcpHeader {
    /// Minimum length of a TCP header in bytes.
    pub const MIN_HEADER_LEN: u16 = 20;

    /// Maximum length of a TCP header in bytes (data offset of 15).
    pub const MAX_HEADER_LEN: u16 = 60;

    /// Minimum data offset of a TCP header.
    pub const MIN_DATA_OFFSET: u16 = 5;

    /// Maximum data offset of a TCP header.
    pub const MAX_DATA_OFFSET: u16 = 15;

    /// Maximum length of TCP options in bytes.
    pub const MAX_OPTIONS_LEN: usize = 40;

    /// Creates a new TCP header with the specified source and destination
    /// ports, sequence number, and window size, while setting default values
    /// for other fields.
    pub fn new(src_port: u16, dst_port: u16, seq_number: u32, window: u16) -> Self {
        Self {
            src_port,
            dst_port,
            seq_number,
            window,
            ..Default::default()
        }
    }

    /// Returns the `source port` field of the TCP header.
    pub fn src_port(&self) -> u16 {
        self.src_port
    }

    /// Returns the `destination port` field of the TCP header.
    pub fn dst_port(&self) -> u16 {
        self.dst_port
    }

    /// Returns the `sequence number` field of the TCP header.
    pub fn seq_number(&self) -> u32 {
        self.seq_number
    }

    /// Returns the `acknowledgment number` field of the TCP header.
    pub fn ack_number(&self) -> u32 {
        self.ack_number
    }

    /// Sets the `acknowledgment number` field of the TCP header with the
    /// provided value.
    pub fn set_ack_number(&mut self, ack: u32) {
        self.ack_number = ack;
    }

    /// Returns the `data offset` field of the TCP header.
    ///
    /// To get the header length (including options) in bytes, use
    /// [TcpHeader::header_len].
    pub fn data_offset(&self) -> u8 {
        // Stored in the higher 4 bits.
        (self.offset_and_control_bits >> 12) as u8
    }

    /// Returns `true` if the URG (Urgent) control bit is set.
    pub fn urg(&self) -> bool {
        self.flag(5)
    }

    /// Returns `true` if the ACK (Acknowledgment) control bit is set.
    pub fn ack(&self) -> bool {
        self.flag(4)
    }

    /// Sets the ACK (Acknowledgment) control bit, if not already set.
    pub fn set_ack(&mut self) {
        self.set_flag(4);
    }

    /// Returns `true` if the PSH (Push) control bit is set.
    pub fn psh(&self) -> bool {
        self.flag(3)
    }

    /// Sets the PSH (Push) control bit, if not already set.
    pub fn set_psh(&mut self) {
        self.set_flag(3);
    }

    /// Returns `true` if the RST (Reset) control bit is set.
    pub fn rst(&self) -> bool {
        self.flag(2)
    }

    /// Returns `true` if the SYN (Synchronize) control bit is set.
    pub fn syn(&self) -> bool {
        self.flag(1)
    }

    /// Sets the SYN (Synchronize) control bit, if not already set.
    pub fn set_syn(&mut self) {
        self.set_flag(1);
    }

    /// Returns `true` if the FIN (Finish) control bit is set.
    pub fn fin(&self) -> bool {
        self.flag(0)
    }

    /// Sets the FIN (Finish) control bit, if not already set.
    pub fn set_fin(&mut self) {
        self.set_flag(0);
    }

    /// Returns the `window` field of the TCP header.
    pub fn window(&self) -> u16 {
        self.window
    }

    /// Returns the `checksum` field of the TCP header.
    pub fn checksum(&self) -> u16 {
        self.checksum
    }

    /// Returns the `urgent pointer` field of the TCP header.
    pub fn urgent_pointer(&self) -> u16 {
        self.urgent_pointer
    }

    /// Returns the raw option bytes of the TCP header.
    pub fn options(&self) -> &[u8] {
        &self.options[..self.options_len]
    }

    /// Returns the length of the TCP header in bytes, including options.
    pub fn header_len(&self) -> usize {
        Self::MIN_HEADER_LEN as usize + self.options_len
    }

    /// Returns the sequence number of the first payload octet.
    ///
    /// A SYN occupies the sequence number carried in the header, so data in
    /// a SYN segment starts one later.
    pub fn data_seq(&self) -> u32 {
        self.seq_number.wrapping_add(self.syn() as u32)
    }

    /// Parses the TCP header at the start of `segment`, returning the header
    /// together with the payload bytes that follow it.
    ///
    /// # Errors
    ///
    /// Returns an error if the buffer is shorter than the header it
    /// advertises or the data offset is out of range.
    pub fn split(segment: &[u8]) -> crate::Result<(Self, &[u8])> {
        let header = TcpHeader::try_from(segment)?;
        let payload = &segment[header.header_len()..];

        Ok((header, payload))
    }

    /// Returns the memory representation of the TCP header as a byte array in
    /// big-endian (network) byte order.
    ///
    /// A buffer of size `TcpHeader::MAX_HEADER_LEN` is used as the byte array,
    /// so the number of bytes written is also returned.
    #[allow(clippy::wrong_self_convention)]
    pub fn to_be_bytes(&self) -> ([u8; Self::MAX_HEADER_LEN as usize], usize) {
        let mut raw_header = [0u8; Self::MAX_HEADER_LEN as usize];
        let size = self.header_len();

        raw_header[0..2].copy_from_slice(&self.src_port.to_be_bytes());
        raw_header[2..4].copy_from_slice(&self.dst_port.to_be_bytes());
        raw_header[4..8].copy_from_slice(&self.seq_number.to_be_bytes());
        raw_header[8..12].copy_from_slice(&self.ack_number.to_be_bytes());
        raw_header[12..14].copy_from_slice(&self.offset_and_control_bits.to_be_bytes());
        raw_header[14..16].copy_from_slice(&self.window.to_be_bytes());
        raw_header[16..18].copy_from_slice(&self.checksum.to_be_bytes());
        raw_header[18..20].copy_from_slice(&self.urgent_pointer.to_be_bytes());

        raw_header[20..size].copy_from_slice(self.options());

        (raw_header, size)
    }

    /// Writes the TCP header to the given output stream.
    pub fn write<T: io::Write>(&self, output: &mut T) -> crate::Result<()> {
        let (raw_header, nbytes) = self.to_be_bytes();
        output.write_all(&raw_header[..nbytes])?;

        Ok(())
    }

    fn flag(&self, bit: u16) -> bool {
        (self.offset_and_control_bits >> bit) & 1 == 1
    }

    fn set_flag(&mut self, bit: u16) {
        self.offset_and_control_bits |= 1 << bit;
    }
}

/// Parses a TCP header from the start of the buffer. Bytes past the length
/// indicated by the data offset are left alone.
impl TryFrom<&[u8]> for TcpHeader {
    type Error = Error;

    fn try_from(header_raw: &[u8]) -> Result<Self, Self::Error> {
        if header_raw.len() < Self::MIN_HEADER_LEN as usize {
            return Err(Error::Parse(ParseError::InvalidBufferLength {
                provided: header_raw.len(),
                min: Self::MIN_HEADER_LEN,
            }));
        }

        let offset_and_control_bits = u16::from_be_bytes([header_raw[12], header_raw[13]]);
        let data_offset = offset_and_control_bits >> 12;

        // The 4-bit field can never exceed the maximum.
        if data_offset < Self::MIN_DATA_OFFSET {
            return Err(Error::Parse(ParseError::InvalidDataOffset {
                provided: data_offset,
                min: Self::MIN_DATA_OFFSET,
                max: Self::MAX_DATA_OFFSET,
            }));
        }

        let header_len = (data_offset << 2) as usize;

        // There are less bytes in the buffer than advertised by data offset.
        if header_len > header_raw.len() {
            return Err(Error::Parse(ParseError::HeaderLengthMismatch {
                provided: header_raw.len(),
                expected: data_offset << 2,
            }));
        }

        let options_len = header_len - Self::MIN_HEADER_LEN as usize;
        let mut options = [0u8; Self::MAX_OPTIONS_LEN];
        options[..options_len].copy_from_slice(&header_raw[20..header_len]);

        Ok(Self {
            src_port: u16::from_be_bytes([header_raw[0], header_raw[1]]),
            dst_port: u16::from_be_bytes([header_raw[2], header_raw[3]]),
            seq_number: u32::from_be_bytes([
                header_raw[4],
                header_raw[5],
                header_raw[6],
                header_raw[7],
            ]),
            ack_number: u32::from_be_bytes([
                header_raw[8],
                header_raw[9],
                header_raw[10],
                header_raw[11],
            ]),
            offset_and_control_bits,
            window: u16::from_be_bytes([header_raw[14], header_raw[15]]),
            checksum: u16::from_be_bytes([header_raw[16], header_raw[17]]),
            urgent_pointer: u16::from_be_bytes([header_raw[18], header_raw[19]]),
            options_len,
            options,
        })
    }
}

impl Default for TcpHeader {
    fn default() -> Self {
        Self {
            src_port: 0,
            dst_port: 0,
            seq_number: 0,
            ack_number: 0,
            // Data offset of 5, no control bits set.
            offset_and_control_bits: 0b0101_000000_000000,
            window: 0,
            checksum: 0,
            urgent_pointer: 0,
            options_len: 0,
            options: [0u8; Self::MAX_OPTIONS_LEN],
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    /// `8080 -> 50000`, seq 100, ack 1000, ACK|PSH, window 65535, "hello".
    const PSH_ACK_SEGMENT: [u8; 25] = [
        0x1f, 0x90, 0xc3, 0x50, 0x00, 0x00, 0x00, 0x64, 0x00, 0x00, 0x03, 0xe8, 0x50, 0x18,
        0xff, 0xff, 0x00, 0x00, 0x00, 0x00, b'h', b'e', b'l', b'l', b'o',
    ];

    #[test]
    fn tcp_header_split_payload_valid() {
        let res = TcpHeader::split(&PSH_ACK_SEGMENT);
        assert!(res.is_ok());
        let (header, payload) = res.unwrap();

        assert_eq!(header.src_port(), 8080);
        assert_eq!(header.dst_port(), 50000);
        assert_eq!(header.seq_number(), 100);
        assert_eq!(header.ack_number(), 1000);
        assert_eq!(header.data_offset(), 5);
        assert_eq!(header.header_len(), 20);
        assert!(header.ack());
        assert!(header.psh());
        assert!(!header.syn());
        assert!(!header.fin());
        assert!(!header.rst());
        assert!(!header.urg());
        assert_eq!(header.window(), 0xffff);
        assert_eq!(header.data_seq(), 100);
        assert_eq!(payload, b"hello");
    }

    #[test]
    fn tcp_header_options_are_not_payload() {
        let segment: [u8; 26] = [
            0x1f, 0x90, 0xc3, 0x50, 0x00, 0x00, 0x00, 0x64, 0x00, 0x00, 0x00, 0x00, 0x60, 0x02,
            0xfa, 0xf0, 0x00, 0x00, 0x00, 0x00, 0x02, 0x04, 0x05, 0xb4, 0xaa, 0xbb,
        ];

        let (header, payload) = TcpHeader::split(&segment).unwrap();

        assert!(header.syn());
        assert_eq!(header.header_len(), 24);
        assert_eq!(header.options(), &[0x02, 0x04, 0x05, 0xb4]);
        assert_eq!(header.data_seq(), 101);
        assert_eq!(payload, &[0xaa, 0xbb]);

        let (buf, nbytes) = header.to_be_bytes();
        assert_eq!(&buf[..nbytes], &segment[..24]);
    }

    #[test]
    fn tcp_header_write_round_trip_valid() {
        let mut header = TcpHeader::new(1, 2, u32::MAX, 512);
        header.set_ack();
        header.set_ack_number(77);
        header.set_fin();

        let mut buf = Vec::new();
        assert!(header.write(&mut buf).is_ok());
        assert_eq!(buf.len(), 20);

        let parsed = TcpHeader::try_from(&buf[..]).unwrap();
        assert_eq!(parsed, header);
        assert!(parsed.fin());
        assert_eq!(parsed.ack_number(), 77);
    }

    #[test]
    fn tcp_header_short_buffer_invalid() {
        let res = TcpHeader::split(&PSH_ACK_SEGMENT[..19]);
        assert!(matches!(
            res,
            Err(Error::Parse(ParseError::InvalidBufferLength { provided: 19, .. }))
        ));
    }

    #[test]
    fn tcp_header_data_offset_invalid() {
        let mut segment = PSH_ACK_SEGMENT;
        segment[12] = 0x40;

        assert!(matches!(
            TcpHeader::split(&segment),
            Err(Error::Parse(ParseError::InvalidDataOffset { provided: 4, .. }))
        ));

        // Advertises 60 bytes of header in a 25 byte buffer.
        segment[12] = 0xf0;

        assert!(matches!(
            TcpHeader::split(&segment),
            Err(Error::Parse(ParseError::HeaderLengthMismatch {
                provided: 25,
                expected: 60
            }))
        ));
    }
}
