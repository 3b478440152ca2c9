//! RFC 2833 Telephone Events
//!
//! DTMF digits travel as 4-byte telephone-event payloads:
//!
//! ```text
//!  0                   1                   2                   3
//!  0 1 2 3 4 5 6 7 8 9 0 1 2 3 4 5 6 7 8 9 0 1 2 3 4 5 6 7 8 9 0 1
//! +-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+
//! |     event     |E|R| volume    |          duration             |
//! +-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+
//! ```

use crate::packet::PacketError;
use bytes::{Buf, BufMut, BytesMut};

/// Size of a telephone-event payload
pub const DTMF_EVENT_SIZE: usize = 4;

/// Duration of one dialed digit, in timestamp units
pub const DTMF_DURATION: u32 = 1600;

/// Conventional dynamic payload type for telephone events
pub const DEFAULT_DTMF_PT: u8 = 101;

/// Telephone event payload
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct DtmfEvent {
    /// Event code (0-15 for DTMF)
    pub event: u8,
    /// End of event flag
    pub end: bool,
    /// Power level in -dBm0 (0-63)
    pub volume: u8,
    /// Duration so far, in timestamp units
    pub duration: u16,
}

impl DtmfEvent {
    /// Parse a telephone-event payload
    pub fn from_bytes(mut buf: &[u8]) -> Result<Self, PacketError> {
        if buf.len() < DTMF_EVENT_SIZE {
            return Err(PacketError::InsufficientData {
                expected: DTMF_EVENT_SIZE,
                actual: buf.len(),
            });
        }

        let event = buf.get_u8();
        let flags = buf.get_u8();
        let duration = buf.get_u16();

        Ok(DtmfEvent {
            event,
            end: flags & 0x80 != 0,
            volume: flags & 0x3F,
            duration,
        })
    }

    /// Serialize to network byte order
    pub fn to_bytes(&self, buf: &mut BytesMut) {
        let mut flags = self.volume & 0x3F;
        if self.end {
            flags |= 0x80;
        }
        buf.put_u8(self.event);
        buf.put_u8(flags);
        buf.put_u16(self.duration);
    }

    /// Digit character for this event, if it is a DTMF event
    pub fn digit(&self) -> Option<char> {
        event_to_digit(self.event)
    }
}

/// Map a dial digit to its event code
///
/// Accepts `0-9`, `*`, `#` and `A-D` in either case.
pub fn digit_to_event(digit: char) -> Option<u8> {
    match digit {
        '0'..='9' => Some(digit as u8 - b'0'),
        '*' => Some(10),
        '#' => Some(11),
        'a'..='d' => Some(digit as u8 - b'a' + 12),
        'A'..='D' => Some(digit as u8 - b'A' + 12),
        _ => None,
    }
}

/// Map an event code back to its dial digit
pub fn event_to_digit(event: u8) -> Option<char> {
    match event {
        0..=9 => Some((b'0' + event) as char),
        10 => Some('*'),
        11 => Some('#'),
        12..=15 => Some((b'A' + event - 12) as char),
        _ => None,
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_digit_mapping() {
        assert_eq!(digit_to_event('0'), Some(0));
        assert_eq!(digit_to_event('9'), Some(9));
        assert_eq!(digit_to_event('*'), Some(10));
        assert_eq!(digit_to_event('#'), Some(11));
        assert_eq!(digit_to_event('a'), Some(12));
        assert_eq!(digit_to_event('D'), Some(15));
        assert_eq!(digit_to_event('e'), None);
        assert_eq!(digit_to_event(' '), None);
    }

    #[test]
    fn test_event_to_digit() {
        for digit in "0123456789*#ABCD".chars() {
            let event = digit_to_event(digit).unwrap();
            assert_eq!(event_to_digit(event), Some(digit));
        }
        assert_eq!(event_to_digit(16), None);
    }

    #[test]
    fn test_event_wire_format() {
        let event = DtmfEvent {
            event: 11,
            end: true,
            volume: 10,
            duration: 1600,
        };
        let mut buf = BytesMut::new();
        event.to_bytes(&mut buf);
        assert_eq!(&buf[..], &[11, 0x8A, 0x06, 0x40]);

        let parsed = DtmfEvent::from_bytes(&buf).unwrap();
        assert_eq!(parsed, event);
        assert_eq!(parsed.digit(), Some('#'));
    }

    #[test]
    fn test_short_event() {
        assert!(DtmfEvent::from_bytes(&[1, 2]).is_err());
    }
}
