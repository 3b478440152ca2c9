//! RTP CLI Library
//!
//! Shared functionality for the RTP command-line tools.

pub mod config;
pub mod sim;
pub mod stats;

pub use config::{Config, ConfigError, JitterConfig, JitterPolicy, SimConfig, StreamConfig};
pub use sim::{SimReport, Simulator};
pub use stats::{display_sim_report, format_bytes, format_jitter_state, format_stream_stats};

use rtp_stream::{Direction, L16Codec, StreamInfo};
use tracing_subscriber::EnvFilter;

/// Install the fmt subscriber
///
/// `RUST_LOG` takes precedence over `default_level`.
pub fn init_logging(default_level: &str) {
    let filter =
        EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(default_level));
    tracing_subscriber::fmt()
        .with_env_filter(filter)
        .with_writer(std::io::stderr)
        .init();
}

/// Stream description for one tool
pub fn stream_info(config: &Config, name: &str, direction: Direction) -> StreamInfo {
    let mut info = StreamInfo::new(name, config.stream.payload_type);
    info.direction = direction;
    info.dtmf_payload_type = config.stream.dtmf_payload_type;
    info.jb_max_count = config.jitter.max_count;
    info.jitter = config.jitter.mode();
    info
}

/// L16 codec matching the stream settings
pub fn l16_codec(config: &StreamConfig) -> L16Codec {
    L16Codec::new(config.clock_rate, config.channels, config.ptime)
}
