//! RTP Media Stream
//!
//! Bidirectional audio stream over RTP: packetization with a pluggable
//! codec, a receive thread feeding the adaptive jitter buffer, playout
//! through the buffer, and RFC 2833 DTMF in both directions.

pub mod codec;
pub mod dtmf;
pub mod stats;
pub mod stream;
pub mod transport;

pub use codec::{Codec, CodecError, CodecParam, L16Codec};
pub use dtmf::{DtmfReceiver, DtmfSender};
pub use stats::{ChannelStats, StreamStats};
pub use stream::{
    Direction, JitterMode, MediaStream, PortFrame, PortFrameType, StreamError, StreamInfo,
};
pub use transport::{ChannelTransport, Transport, UdpTransport};
