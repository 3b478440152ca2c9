//! RTP Protocol Core Implementation
//!
//! This crate implements the RTP wire format (RFC 3550), sequence number
//! validation and extension, per-stream session state, and the RFC 2833
//! telephone-event payload.

pub mod dtmf;
pub mod packet;
pub mod sequence;
pub mod session;

pub use dtmf::{digit_to_event, event_to_digit, DtmfEvent, DTMF_DURATION};
pub use packet::{HeaderExtension, PacketError, RtpHeader, RtpPacket, HEADER_SIZE, MAX_MTU};
pub use sequence::{RtpSeq, SeqState, SeqStatus, SeqUpdate};
pub use session::{RtpSession, SessionError};
