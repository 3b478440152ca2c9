//! Stream statistics

use rtp_jbuf::JitterState;

/// Per-direction packet counters
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct ChannelStats {
    /// RTP packets
    pub packets: u64,
    /// Bytes including RTP headers
    pub bytes: u64,
}

/// Stream statistics
#[derive(Debug, Clone, Default)]
pub struct StreamStats {
    /// Sent packets
    pub tx: ChannelStats,
    /// Accepted received packets
    pub rx: ChannelStats,
    /// Datagrams that did not parse as RTP
    pub rx_malformed: u64,
    /// Packets rejected by session validation
    pub rx_rejected: u64,
    /// Accepted packets the jitter buffer discarded
    pub rx_discarded: u64,
    /// Remote sequence restarts (including SSRC changes)
    pub rx_restarts: u64,
    /// Digits fully sent
    pub dtmf_sent: u64,
    /// Digits detected
    pub dtmf_received: u64,
    /// Jitter buffer snapshot taken with these counters
    pub jitter: JitterState,
}
