//! RTP Media
//!
//! High-level Rust API for RTP audio streams with adaptive jitter buffering.

pub use rtp_io as io;
pub use rtp_jbuf as jbuf;
pub use rtp_protocol as protocol;
pub use rtp_stream as stream;

// Re-export commonly used types
pub use jbuf::{FrameType, JitterBuffer, JitterState};
pub use protocol::{RtpHeader, RtpPacket, RtpSeq};
pub use stream::{
    Codec, Direction, JitterMode, L16Codec, MediaStream, PortFrameType, StreamInfo, StreamStats,
    UdpTransport,
};
