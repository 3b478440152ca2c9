//! RTP Adaptive Jitter Buffer
//!
//! This crate implements the jitter buffer that sits between an RTP receive
//! path and a periodic audio consumer: a sequence-indexed ring of frame
//! slots, an adaptive prefetch controller that follows the observed burst
//! pattern, and a thread-safe facade with running statistics.

pub mod buffer;
pub mod controller;
pub mod framelist;
pub mod stats;

pub use buffer::{FrameType, GetFrame, JbufError, JitterBuffer, JitterState, DEFAULT_INIT_DELAY};
pub use controller::{JbStatus, Operation};
pub use framelist::{FrameList, SeqError, SlotType};
pub use stats::RunningStat;
