//! Configuration file support for the RTP CLI tools

use rtp_stream::JitterMode;
use serde::{Deserialize, Serialize};
use std::fs;
use std::net::SocketAddr;
use std::path::Path;
use std::time::Duration;

/// Jitter buffer policy
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, Default)]
#[serde(rename_all = "lowercase")]
pub enum JitterPolicy {
    /// Adaptive with construction defaults
    #[default]
    Default,
    /// Fixed prefetch
    Fixed,
    /// Adaptive within bounds
    Adaptive,
}

/// Jitter buffer configuration
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct JitterConfig {
    /// Prefetch policy
    #[serde(default)]
    pub mode: JitterPolicy,
    /// Initial (or fixed) prefetch in frames
    #[serde(default = "default_prefetch")]
    pub prefetch: usize,
    /// Lower prefetch bound in frames (adaptive only)
    #[serde(default)]
    pub min_prefetch: usize,
    /// Upper prefetch bound in frames (adaptive only)
    #[serde(default = "default_max_prefetch")]
    pub max_prefetch: usize,
    /// Capacity in frames, defaults to two seconds worth
    pub max_count: Option<usize>,
}

fn default_prefetch() -> usize {
    5
}

fn default_max_prefetch() -> usize {
    40
}

impl Default for JitterConfig {
    fn default() -> Self {
        JitterConfig {
            mode: JitterPolicy::Default,
            prefetch: default_prefetch(),
            min_prefetch: 0,
            max_prefetch: default_max_prefetch(),
            max_count: None,
        }
    }
}

impl JitterConfig {
    /// Stream-level jitter mode
    pub fn mode(&self) -> JitterMode {
        match self.mode {
            JitterPolicy::Default => JitterMode::Default,
            JitterPolicy::Fixed => JitterMode::Fixed(self.prefetch),
            JitterPolicy::Adaptive => JitterMode::Adaptive {
                prefetch: self.prefetch,
                min: self.min_prefetch,
                max: self.max_prefetch,
            },
        }
    }

    /// Capacity for frames of `ptime` milliseconds
    pub fn capacity(&self, ptime: u32) -> usize {
        self.max_count
            .unwrap_or((rtp_stream::stream::MAX_BUFFER_SIZE_MS / ptime.max(1)) as usize)
    }

    fn validate(&self, ptime: u32) -> Result<(), ConfigError> {
        let capacity = self.capacity(ptime);
        match self.mode {
            JitterPolicy::Default => Ok(()),
            JitterPolicy::Fixed if self.prefetch > capacity => Err(ConfigError::Invalid(format!(
                "fixed prefetch {} exceeds capacity {}",
                self.prefetch, capacity
            ))),
            JitterPolicy::Fixed => Ok(()),
            JitterPolicy::Adaptive => {
                if self.min_prefetch >= self.max_prefetch
                    || self.max_prefetch > capacity
                    || self.prefetch > self.max_prefetch
                {
                    Err(ConfigError::Invalid(format!(
                        "adaptive bounds prefetch={} min={} max={} do not fit capacity {}",
                        self.prefetch, self.min_prefetch, self.max_prefetch, capacity
                    )))
                } else {
                    Ok(())
                }
            }
        }
    }
}

/// Stream configuration
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct StreamConfig {
    /// Local bind address
    #[serde(default = "default_local")]
    pub local: SocketAddr,
    /// Remote address; the receiver learns it from the first packet when unset
    pub remote: Option<SocketAddr>,
    /// Sampling rate in Hz
    #[serde(default = "default_clock_rate")]
    pub clock_rate: u32,
    /// Interleaved channels
    #[serde(default = "default_channels")]
    pub channels: u8,
    /// Frame duration in milliseconds
    #[serde(default = "default_ptime")]
    pub ptime: u32,
    /// Audio payload type
    #[serde(default = "default_payload_type")]
    pub payload_type: u8,
    /// Telephone-event payload type, unset to disable DTMF
    #[serde(default = "default_dtmf_payload_type")]
    pub dtmf_payload_type: Option<u8>,
    /// Statistics interval in seconds
    #[serde(default = "default_stats_interval")]
    pub stats_interval_secs: u64,
}

fn default_local() -> SocketAddr {
    SocketAddr::from(([0, 0, 0, 0], 4000))
}

fn default_clock_rate() -> u32 {
    8000
}

fn default_channels() -> u8 {
    1
}

fn default_ptime() -> u32 {
    20
}

fn default_payload_type() -> u8 {
    96
}

fn default_dtmf_payload_type() -> Option<u8> {
    Some(101)
}

fn default_stats_interval() -> u64 {
    5
}

impl Default for StreamConfig {
    fn default() -> Self {
        StreamConfig {
            local: default_local(),
            remote: None,
            clock_rate: default_clock_rate(),
            channels: default_channels(),
            ptime: default_ptime(),
            payload_type: default_payload_type(),
            dtmf_payload_type: default_dtmf_payload_type(),
            stats_interval_secs: default_stats_interval(),
        }
    }
}

impl StreamConfig {
    /// Get statistics interval as Duration
    pub fn stats_interval(&self) -> Duration {
        Duration::from_secs(self.stats_interval_secs.max(1))
    }

    /// Frame period as Duration
    pub fn frame_period(&self) -> Duration {
        Duration::from_millis(self.ptime as u64)
    }

    /// PCM samples per frame, all channels included
    pub fn samples_per_frame(&self) -> usize {
        (self.clock_rate as u64 * self.ptime as u64 / 1000 * self.channels as u64) as usize
    }

    fn validate(&self) -> Result<(), ConfigError> {
        if self.ptime == 0 || self.ptime > rtp_stream::stream::MAX_FRAME_DURATION_MS {
            return Err(ConfigError::Invalid(format!(
                "ptime {}ms outside 1..={}ms",
                self.ptime,
                rtp_stream::stream::MAX_FRAME_DURATION_MS
            )));
        }
        if self.clock_rate == 0 || self.channels == 0 {
            return Err(ConfigError::Invalid(
                "clock rate and channel count must be non-zero".to_string(),
            ));
        }
        if self.payload_type > 127 {
            return Err(ConfigError::Invalid(format!(
                "payload type {} is not 7-bit",
                self.payload_type
            )));
        }
        if let Some(pt) = self.dtmf_payload_type {
            if pt > 127 || pt == self.payload_type {
                return Err(ConfigError::Invalid(format!(
                    "DTMF payload type {} must be 7-bit and differ from the audio payload type",
                    pt
                )));
            }
        }
        Ok(())
    }
}

/// Network simulation configuration
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct SimConfig {
    /// Simulated duration in seconds
    #[serde(default = "default_duration")]
    pub duration_secs: u64,
    /// Frame duration in milliseconds
    #[serde(default = "default_ptime")]
    pub ptime: u32,
    /// Frame size in bytes
    #[serde(default = "default_frame_size")]
    pub frame_size: usize,
    /// Fixed network delay in milliseconds
    #[serde(default = "default_base_delay")]
    pub base_delay_ms: u32,
    /// Maximum extra random delay in milliseconds
    #[serde(default = "default_jitter")]
    pub jitter_ms: u32,
    /// Packet loss probability in percent
    #[serde(default = "default_loss")]
    pub loss_percent: f64,
    /// Probability in percent that a packet is held back behind later ones
    #[serde(default = "default_reorder")]
    pub reorder_percent: f64,
    /// Probability in percent that a packet is delivered twice
    #[serde(default)]
    pub duplicate_percent: f64,
    /// Random seed
    #[serde(default = "default_seed")]
    pub seed: u64,
}

fn default_duration() -> u64 {
    60
}

fn default_frame_size() -> usize {
    160
}

fn default_base_delay() -> u32 {
    30
}

fn default_jitter() -> u32 {
    40
}

fn default_loss() -> f64 {
    1.0
}

fn default_reorder() -> f64 {
    2.0
}

fn default_seed() -> u64 {
    1
}

impl Default for SimConfig {
    fn default() -> Self {
        SimConfig {
            duration_secs: default_duration(),
            ptime: default_ptime(),
            frame_size: default_frame_size(),
            base_delay_ms: default_base_delay(),
            jitter_ms: default_jitter(),
            loss_percent: default_loss(),
            reorder_percent: default_reorder(),
            duplicate_percent: 0.0,
            seed: default_seed(),
        }
    }
}

impl SimConfig {
    fn validate(&self) -> Result<(), ConfigError> {
        if self.ptime == 0 || self.frame_size == 0 {
            return Err(ConfigError::Invalid(
                "simulation ptime and frame size must be non-zero".to_string(),
            ));
        }
        for (name, value) in [
            ("loss_percent", self.loss_percent),
            ("reorder_percent", self.reorder_percent),
            ("duplicate_percent", self.duplicate_percent),
        ] {
            if !(0.0..=100.0).contains(&value) {
                return Err(ConfigError::Invalid(format!(
                    "{} {} outside 0..=100",
                    name, value
                )));
            }
        }
        Ok(())
    }
}

/// Combined configuration
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct Config {
    /// Jitter buffer settings
    #[serde(default)]
    pub jitter: JitterConfig,
    /// Stream settings
    #[serde(default)]
    pub stream: StreamConfig,
    /// Simulation settings
    #[serde(default)]
    pub sim: SimConfig,
}

impl Config {
    /// Load configuration from TOML file
    pub fn from_file<P: AsRef<Path>>(path: P) -> Result<Self, ConfigError> {
        let contents = fs::read_to_string(path)?;
        let config: Config = toml::from_str(&contents)?;
        Ok(config)
    }

    /// Load from `path` if given, defaults otherwise
    pub fn load(path: Option<&Path>) -> Result<Self, ConfigError> {
        match path {
            Some(path) => Self::from_file(path),
            None => Ok(Config::default()),
        }
    }

    /// Save configuration to TOML file
    pub fn to_file<P: AsRef<Path>>(&self, path: P) -> Result<(), ConfigError> {
        let contents = toml::to_string_pretty(self)?;
        fs::write(path, contents)?;
        Ok(())
    }

    /// Check stream and simulation settings against the jitter settings
    /// they are combined with
    pub fn validate(&self) -> Result<(), ConfigError> {
        self.stream.validate()?;
        self.sim.validate()?;
        self.jitter.validate(self.stream.ptime)?;
        self.jitter.validate(self.sim.ptime)
    }
}

/// Configuration errors
#[derive(Debug, thiserror::Error)]
pub enum ConfigError {
    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    #[error("TOML parse error: {0}")]
    Toml(#[from] toml::de::Error),

    #[error("TOML serialize error: {0}")]
    TomlSerialize(#[from] toml::ser::Error),

    #[error("Invalid configuration: {0}")]
    Invalid(String),
}
