//! RTP Packet Structures and Serialization
//!
//! This module implements the RTP packet format (RFC 3550 §5.1): a 12-byte
//! fixed header, an optional CSRC list, an optional header extension,
//! the payload and optional trailing padding.

use crate::sequence::RtpSeq;
use bytes::{Buf, BufMut, Bytes, BytesMut};
use std::fmt;
use thiserror::Error;

/// Size of the fixed RTP header in bytes
pub const HEADER_SIZE: usize = 12;

/// The only RTP version in use
pub const RTP_VERSION: u8 = 2;

/// Maximum number of CSRC identifiers in a header
pub const MAX_CSRC_COUNT: usize = 15;

/// Maximum transmission unit assumed for media packets
pub const MAX_MTU: usize = 1500;

/// Packet parsing errors
#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum PacketError {
    #[error("Insufficient data: expected {expected} bytes, got {actual}")]
    InsufficientData { expected: usize, actual: usize },

    #[error("Unsupported RTP version: {0}")]
    InvalidVersion(u8),

    #[error("Invalid padding length: {0}")]
    InvalidPadding(u8),

    #[error("Too many CSRC identifiers: {0}")]
    TooManyCsrc(usize),
}

/// RTP header extension (profile-defined, carried opaquely)
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct HeaderExtension {
    /// Profile-defined identifier
    pub profile: u16,
    /// Extension body, a whole number of 32-bit words
    pub data: Bytes,
}

/// RTP header
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RtpHeader {
    /// Marker bit
    pub marker: bool,
    /// Payload type (7 bits)
    pub payload_type: u8,
    /// Sequence number
    pub seq: RtpSeq,
    /// Media timestamp
    pub timestamp: u32,
    /// Synchronization source
    pub ssrc: u32,
    /// Contributing sources
    pub csrc: Vec<u32>,
    /// Optional header extension
    pub extension: Option<HeaderExtension>,
}

impl RtpHeader {
    /// Create a header without CSRCs or extension
    pub fn new(payload_type: u8, seq: RtpSeq, timestamp: u32, ssrc: u32) -> Self {
        RtpHeader {
            marker: false,
            payload_type: payload_type & 0x7F,
            seq,
            timestamp,
            ssrc,
            csrc: Vec::new(),
            extension: None,
        }
    }

    /// Encoded size of this header in bytes
    pub fn encoded_len(&self) -> usize {
        let ext_len = self
            .extension
            .as_ref()
            .map(|ext| 4 + padded_word_len(ext.data.len()))
            .unwrap_or(0);
        HEADER_SIZE + self.csrc.len() * 4 + ext_len
    }

    /// Serialize header to bytes (network byte order)
    pub fn to_bytes(&self, buf: &mut BytesMut) -> Result<(), PacketError> {
        if self.csrc.len() > MAX_CSRC_COUNT {
            return Err(PacketError::TooManyCsrc(self.csrc.len()));
        }

        let mut b0 = RTP_VERSION << 6;
        if self.extension.is_some() {
            b0 |= 0x10;
        }
        b0 |= self.csrc.len() as u8;

        let mut b1 = self.payload_type & 0x7F;
        if self.marker {
            b1 |= 0x80;
        }

        buf.reserve(self.encoded_len());
        buf.put_u8(b0);
        buf.put_u8(b1);
        buf.put_u16(self.seq.as_raw());
        buf.put_u32(self.timestamp);
        buf.put_u32(self.ssrc);
        for csrc in &self.csrc {
            buf.put_u32(*csrc);
        }

        if let Some(ext) = &self.extension {
            let words = padded_word_len(ext.data.len()) / 4;
            buf.put_u16(ext.profile);
            buf.put_u16(words as u16);
            buf.put_slice(&ext.data);
            buf.put_bytes(0, words * 4 - ext.data.len());
        }

        Ok(())
    }
}

#[inline]
fn padded_word_len(len: usize) -> usize {
    (len + 3) & !3
}

/// RTP packet: header plus payload (padding already stripped)
#[derive(Clone, PartialEq, Eq)]
pub struct RtpPacket {
    /// Packet header
    pub header: RtpHeader,
    /// Payload bytes
    pub payload: Bytes,
}

impl RtpPacket {
    /// Create a new packet
    pub fn new(header: RtpHeader, payload: Bytes) -> Self {
        RtpPacket { header, payload }
    }

    /// Parse a packet from a received datagram
    pub fn from_bytes(bytes: &[u8]) -> Result<Self, PacketError> {
        Self::parse(Bytes::copy_from_slice(bytes))
    }

    /// Parse a packet, slicing the payload out of `data` without copying
    pub fn parse(data: Bytes) -> Result<Self, PacketError> {
        if data.len() < HEADER_SIZE {
            return Err(PacketError::InsufficientData {
                expected: HEADER_SIZE,
                actual: data.len(),
            });
        }

        let mut buf = &data[..];
        let b0 = buf.get_u8();
        let b1 = buf.get_u8();

        let version = b0 >> 6;
        if version != RTP_VERSION {
            return Err(PacketError::InvalidVersion(version));
        }

        let has_padding = b0 & 0x20 != 0;
        let has_extension = b0 & 0x10 != 0;
        let csrc_count = (b0 & 0x0F) as usize;

        let seq = RtpSeq::new(buf.get_u16());
        let timestamp = buf.get_u32();
        let ssrc = buf.get_u32();

        let mut offset = HEADER_SIZE + csrc_count * 4;
        if data.len() < offset {
            return Err(PacketError::InsufficientData {
                expected: offset,
                actual: data.len(),
            });
        }
        let csrc = (0..csrc_count).map(|_| buf.get_u32()).collect();

        let extension = if has_extension {
            if data.len() < offset + 4 {
                return Err(PacketError::InsufficientData {
                    expected: offset + 4,
                    actual: data.len(),
                });
            }
            let profile = buf.get_u16();
            let words = buf.get_u16() as usize;
            let start = offset + 4;
            let end = start + words * 4;
            if data.len() < end {
                return Err(PacketError::InsufficientData {
                    expected: end,
                    actual: data.len(),
                });
            }
            offset = end;
            Some(HeaderExtension {
                profile,
                data: data.slice(start..end),
            })
        } else {
            None
        };

        let mut payload_end = data.len();
        if has_padding {
            let pad = data[data.len() - 1];
            if pad == 0 || (pad as usize) > data.len() - offset {
                return Err(PacketError::InvalidPadding(pad));
            }
            payload_end -= pad as usize;
        }

        Ok(RtpPacket {
            header: RtpHeader {
                marker: b1 & 0x80 != 0,
                payload_type: b1 & 0x7F,
                seq,
                timestamp,
                ssrc,
                csrc,
                extension,
            },
            payload: data.slice(offset..payload_end),
        })
    }

    /// Serialize the packet (never padded)
    pub fn to_bytes(&self) -> Result<Bytes, PacketError> {
        let mut buf = BytesMut::with_capacity(self.header.encoded_len() + self.payload.len());
        self.header.to_bytes(&mut buf)?;
        buf.put_slice(&self.payload);
        Ok(buf.freeze())
    }

    /// Sequence number shortcut
    pub fn seq(&self) -> RtpSeq {
        self.header.seq
    }
}

impl fmt::Debug for RtpPacket {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("RtpPacket")
            .field("pt", &self.header.payload_type)
            .field("seq", &self.header.seq)
            .field("ts", &self.header.timestamp)
            .field("ssrc", &format_args!("{:#010x}", self.header.ssrc))
            .field("marker", &self.header.marker)
            .field("payload_len", &self.payload.len())
            .finish()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn sample_header() -> RtpHeader {
        RtpHeader::new(0, RtpSeq::new(4321), 160_000, 0xDEAD_BEEF)
    }

    #[test]
    fn test_header_layout() {
        let mut header = sample_header();
        header.marker = true;

        let mut buf = BytesMut::new();
        header.to_bytes(&mut buf).unwrap();

        assert_eq!(buf.len(), HEADER_SIZE);
        assert_eq!(buf[0], 0x80);
        assert_eq!(buf[1], 0x80);
        assert_eq!(&buf[2..4], &4321u16.to_be_bytes());
        assert_eq!(&buf[8..12], &0xDEAD_BEEFu32.to_be_bytes());
    }

    #[test]
    fn test_packet_roundtrip_with_csrc_and_extension() {
        let mut header = sample_header();
        header.csrc = vec![1, 2];
        header.extension = Some(HeaderExtension {
            profile: 0xBEDE,
            data: Bytes::from_static(&[1, 2, 3, 4]),
        });
        let packet = RtpPacket::new(header, Bytes::from_static(b"payload"));

        let bytes = packet.to_bytes().unwrap();
        assert_eq!(bytes.len(), HEADER_SIZE + 8 + 8 + 7);

        let parsed = RtpPacket::from_bytes(&bytes).unwrap();
        assert_eq!(parsed, packet);
    }

    #[test]
    fn test_padding_is_stripped() {
        let mut buf = BytesMut::new();
        sample_header().to_bytes(&mut buf).unwrap();
        buf[0] |= 0x20;
        buf.put_slice(b"abc");
        buf.put_slice(&[0, 0, 3]);

        let parsed = RtpPacket::from_bytes(&buf).unwrap();
        assert_eq!(&parsed.payload[..], b"abc");
    }

    #[test]
    fn test_invalid_padding() {
        let mut buf = BytesMut::new();
        sample_header().to_bytes(&mut buf).unwrap();
        buf[0] |= 0x20;
        buf.put_slice(&[9]);

        let result = RtpPacket::from_bytes(&buf);
        assert_eq!(result, Err(PacketError::InvalidPadding(9)));
    }

    #[test]
    fn test_invalid_version() {
        let mut buf = BytesMut::new();
        sample_header().to_bytes(&mut buf).unwrap();
        buf[0] = (buf[0] & 0x3F) | (1 << 6);

        let result = RtpPacket::from_bytes(&buf);
        assert_eq!(result, Err(PacketError::InvalidVersion(1)));
    }

    #[test]
    fn test_truncated_csrc_list() {
        let mut buf = BytesMut::new();
        sample_header().to_bytes(&mut buf).unwrap();
        buf[0] |= 0x03;

        let result = RtpPacket::from_bytes(&buf);
        assert!(matches!(
            result,
            Err(PacketError::InsufficientData { expected: 24, .. })
        ));
    }

    #[test]
    fn test_short_buffer() {
        let result = RtpPacket::from_bytes(&[0x80, 0x00, 0x01]);
        assert!(matches!(result, Err(PacketError::InsufficientData { .. })));
    }
}
