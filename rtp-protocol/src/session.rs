//! RTP Session State
//!
//! Tracks the outgoing header fields (sequence number and timestamp) of
//! the local source, and validates incoming headers from the remote
//! source against its payload type and sequence history.

use crate::packet::RtpHeader;
use crate::sequence::{RtpSeq, SeqState, SeqStatus, SeqUpdate};
use thiserror::Error;
use tracing::{debug, info};

/// Session validation errors
#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum SessionError {
    #[error("Payload type mismatch: expected {expected}, got {actual}")]
    PayloadTypeMismatch { expected: u8, actual: u8 },

    #[error("Bad sequence number {seq}: jump not yet confirmed")]
    BadSequence { seq: RtpSeq },
}

/// RTP session for one media stream
#[derive(Debug, Clone)]
pub struct RtpSession {
    /// Local synchronization source
    ssrc: u32,
    /// Expected payload type of incoming packets
    rx_pt: u8,
    /// Next outgoing sequence number
    out_seq: RtpSeq,
    /// Next outgoing timestamp
    out_ts: u32,
    /// Packets encoded so far
    sent: u64,
    /// SSRC of the remote source, once seen
    peer_ssrc: Option<u32>,
    /// Sequence validation for the remote source
    seq_state: Option<SeqState>,
}

impl RtpSession {
    /// Create a session
    ///
    /// `initial_seq` and `initial_ts` should be random per RFC 3550.
    pub fn new(rx_pt: u8, ssrc: u32, initial_seq: u16, initial_ts: u32) -> Self {
        RtpSession {
            ssrc,
            rx_pt,
            out_seq: RtpSeq::new(initial_seq),
            out_ts: initial_ts,
            sent: 0,
            peer_ssrc: None,
            seq_state: None,
        }
    }

    /// Produce the header of the next outgoing packet
    ///
    /// The timestamp is advanced by `ts_len` samples before the header is
    /// built, and the sequence number by one after.
    pub fn encode(&mut self, pt: u8, marker: bool, ts_len: u32) -> RtpHeader {
        self.out_ts = self.out_ts.wrapping_add(ts_len);
        let mut header = RtpHeader::new(pt, self.out_seq, self.out_ts, self.ssrc);
        header.marker = marker;
        self.out_seq.increment();
        self.sent += 1;
        header
    }

    /// Validate an incoming header and extend its sequence number
    ///
    /// When `check_pt` is set the payload type must match the one this
    /// session was created for. A change of remote SSRC restarts sequence
    /// tracking and is reported as [`SeqStatus::Restarted`].
    pub fn update(&mut self, header: &RtpHeader, check_pt: bool) -> Result<SeqUpdate, SessionError> {
        if check_pt && header.payload_type != self.rx_pt {
            return Err(SessionError::PayloadTypeMismatch {
                expected: self.rx_pt,
                actual: header.payload_type,
            });
        }

        let seq = header.seq.as_raw();
        let mut changed = false;

        if self.peer_ssrc != Some(header.ssrc) {
            if let Some(old) = self.peer_ssrc {
                info!(
                    "Remote SSRC changed from {:#010x} to {:#010x}",
                    old, header.ssrc
                );
                changed = true;
            }
            self.peer_ssrc = Some(header.ssrc);
            self.seq_state = None;
        }

        let state = self.seq_state.get_or_insert_with(|| SeqState::new(seq));
        let mut update = state.update(seq);

        match update.status {
            SeqStatus::Bad => {
                debug!("Dropping packet with unconfirmed sequence jump to {}", seq);
                return Err(SessionError::BadSequence { seq: header.seq });
            }
            SeqStatus::Restarted => {
                info!("Remote sequence restarted at {}", seq);
            }
            _ => {}
        }

        if changed {
            update.status = SeqStatus::Restarted;
        }

        Ok(update)
    }

    /// Local SSRC
    pub fn ssrc(&self) -> u32 {
        self.ssrc
    }

    /// Remote SSRC, if any packet has been accepted
    pub fn peer_ssrc(&self) -> Option<u32> {
        self.peer_ssrc
    }

    /// Timestamp of the most recently encoded packet
    pub fn out_timestamp(&self) -> u32 {
        self.out_ts
    }

    /// Sequence number the next encoded packet will carry
    pub fn out_seq(&self) -> RtpSeq {
        self.out_seq
    }

    /// Number of packets encoded
    pub fn packets_sent(&self) -> u64 {
        self.sent
    }

    /// Number of packets accepted from the remote source
    pub fn packets_received(&self) -> u64 {
        self.seq_state.as_ref().map(|s| s.received()).unwrap_or(0)
    }
}
