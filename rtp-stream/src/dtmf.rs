//! DTMF digit queues
//!
//! [`DtmfSender`] turns dialed digits into a sequence of RFC 2833 event
//! packets, one per outgoing frame, each digit lasting
//! [`DTMF_DURATION`] timestamp units. [`DtmfReceiver`] collects digits
//! from incoming event packets.

use crate::stream::StreamError;
use rtp_protocol::dtmf::{digit_to_event, DtmfEvent, DTMF_DURATION};
use std::collections::VecDeque;
use tracing::{debug, warn};

/// Maximum number of queued digits, in either direction
pub const MAX_DTMF_DIGITS: usize = 32;

/// Power level of generated events, in -dBm0
pub const DTMF_VOLUME: u8 = 10;

#[derive(Debug, Clone, Copy)]
struct PendingDigit {
    event: u8,
    /// Timestamp of the first packet of this digit, once sent
    start_ts: Option<u32>,
}

/// One outgoing event packet
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct DtmfPacket {
    pub event: DtmfEvent,
    /// RTP timestamp to send with, the start of the digit
    pub timestamp: u32,
    /// Set on the first packet of each digit
    pub marker: bool,
}

/// Outgoing digit queue
#[derive(Debug, Default)]
pub struct DtmfSender {
    queue: VecDeque<PendingDigit>,
}

impl DtmfSender {
    pub fn new() -> Self {
        Self::default()
    }

    /// Queue `digits` for transmission
    ///
    /// Nothing is queued unless every digit is valid and all of them fit.
    pub fn queue_digits(&mut self, digits: &str) -> Result<(), StreamError> {
        let events = digits
            .chars()
            .map(|c| digit_to_event(c).ok_or(StreamError::InvalidDtmfDigit(c)))
            .collect::<Result<Vec<_>, _>>()?;

        if self.queue.len() + events.len() > MAX_DTMF_DIGITS {
            return Err(StreamError::DtmfQueueFull);
        }

        self.queue.extend(events.into_iter().map(|event| PendingDigit {
            event,
            start_ts: None,
        }));
        Ok(())
    }

    /// Whether a digit is waiting or in progress
    pub fn is_active(&self) -> bool {
        !self.queue.is_empty()
    }

    /// Number of digits not yet finished
    pub fn pending(&self) -> usize {
        self.queue.len()
    }

    /// Produce the packet for the frame ending at timestamp `ts`
    ///
    /// `frame_len` is the frame duration in timestamp units. The digit is
    /// finished, and removed from the queue, once its duration reaches
    /// [`DTMF_DURATION`].
    pub fn next_packet(&mut self, ts: u32, frame_len: u32) -> Option<DtmfPacket> {
        let digit = self.queue.front_mut()?;

        let (start, marker) = match digit.start_ts {
            Some(start) => (start, false),
            None => {
                digit.start_ts = Some(ts);
                (ts, true)
            }
        };

        let duration = ts.wrapping_sub(start).wrapping_add(frame_len);
        let end = duration >= DTMF_DURATION;
        let packet = DtmfPacket {
            event: DtmfEvent {
                event: digit.event,
                end,
                volume: DTMF_VOLUME,
                duration: duration.min(u16::MAX as u32) as u16,
            },
            timestamp: start,
            marker,
        };

        if end {
            self.queue.pop_front();
        }
        Some(packet)
    }
}

/// Incoming digit collector
#[derive(Debug, Default)]
pub struct DtmfReceiver {
    digits: VecDeque<char>,
    last_ts: Option<u32>,
}

impl DtmfReceiver {
    pub fn new() -> Self {
        Self::default()
    }

    /// Handle one event packet
    ///
    /// Every packet of a digit carries the same timestamp, so only the
    /// first one with a new timestamp yields the digit.
    pub fn on_event(&mut self, timestamp: u32, payload: &[u8]) -> Option<char> {
        let event = match DtmfEvent::from_bytes(payload) {
            Ok(event) => event,
            Err(e) => {
                debug!("Ignoring malformed telephone event: {}", e);
                return None;
            }
        };

        if self.last_ts == Some(timestamp) {
            return None;
        }
        self.last_ts = Some(timestamp);

        let digit = event.digit()?;
        if self.digits.len() >= MAX_DTMF_DIGITS {
            warn!("DTMF receive queue full, dropping digit {:?}", self.digits.front());
            self.digits.pop_front();
        }
        self.digits.push_back(digit);
        Some(digit)
    }

    /// Take all received digits
    pub fn drain(&mut self) -> String {
        self.digits.drain(..).collect()
    }
}
