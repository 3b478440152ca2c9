//! RTP I/O and Platform Abstraction
//!
//! This crate provides network I/O and timing abstractions: a UDP socket
//! wrapper with read timeouts, and clocks for driving fixed-cadence media
//! capture and playout.

pub mod socket;
pub mod time;

pub use socket::{RtpSocket, SocketError};
pub use time::{Ticker, Timer, Timestamp};
