//! Jitter buffer facade
//!
//! [`JitterBuffer`] is the thread-safe entry point: the network receive
//! path calls [`put_frame`](JitterBuffer::put_frame) for every arriving
//! frame and the audio playout path calls
//! [`get_frame`](JitterBuffer::get_frame) once per frame period. A single
//! mutex covers the frame ring, the controller and the statistics, and
//! each call holds it from start to finish.

use crate::controller::{Controller, JbStatus, Operation};
use crate::framelist::{FrameList, SlotType};
use crate::stats::RunningStat;
use parking_lot::Mutex;
use thiserror::Error;
use tracing::{debug, trace};

/// Initial prefetch of a new buffer, in frames
pub const DEFAULT_INIT_DELAY: usize = 15;

/// Smallest capacity accepted by [`JitterBuffer::new`]
pub const MIN_MAX_COUNT: usize = 4;

/// Configuration errors
#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum JbufError {
    #[error("Frame size must be non-zero")]
    InvalidFrameSize,

    #[error("Frame ptime must be non-zero")]
    InvalidPtime,

    #[error("Capacity {max_count} is below the minimum of {min}")]
    CapacityTooSmall { max_count: usize, min: usize },

    #[error("Prefetch {prefetch} exceeds capacity {max_count}")]
    PrefetchTooLarge { prefetch: usize, max_count: usize },

    #[error("Invalid adaptive bounds: prefetch={prefetch} min={min} max={max} capacity={max_count}")]
    InvalidAdaptiveBounds {
        prefetch: usize,
        min: usize,
        max: usize,
        max_count: usize,
    },
}

/// Kind of frame returned by [`JitterBuffer::get_frame`]
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum FrameType {
    /// A received frame
    Normal,
    /// The frame for this position was lost
    Missing,
    /// Nothing buffered
    ZeroEmpty,
    /// Buffering toward the prefetch depth
    ZeroPrefetch,
}

impl FrameType {
    /// Whether the output buffer holds frame data
    pub fn is_normal(self) -> bool {
        self == FrameType::Normal
    }
}

/// Result of a get
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct GetFrame {
    pub frame_type: FrameType,
    /// Bytes written to the output buffer
    pub len: usize,
    pub bit_info: u32,
}

/// Snapshot of buffer state and statistics
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct JitterState {
    /// Maximum frame size
    pub frame_size: usize,
    /// Prefetch bounds, in frames
    pub min_prefetch: usize,
    pub max_prefetch: usize,
    /// Current prefetch, in frames
    pub prefetch: usize,
    /// Current window length, in frames
    pub size: usize,
    /// Buffering delay, in milliseconds
    pub avg_delay: u32,
    pub min_delay: u32,
    pub max_delay: u32,
    pub dev_delay: u32,
    /// Average put burst, in frames
    pub avg_burst: u32,
    /// Gets that returned nothing (empty or prefetching)
    pub empty: u32,
    /// Frames dropped on put or by shrinking
    pub discard: u32,
    /// Gets that hit a missing frame
    pub lost: u32,
}

struct JbufInner {
    frames: FrameList,
    ctl: Controller,
    /// Delay seen by the first frame of each get burst, in milliseconds
    delay: RunningStat,
    lost: u32,
    discard: u32,
    empty: u32,
}

/// Adaptive jitter buffer
///
/// Frames are placed by sequence number, so they leave in sequence order
/// whatever order they arrived in. Sequence numbers are 64-bit and must
/// already be extended past the 16-bit RTP wraparound.
pub struct JitterBuffer {
    name: String,
    frame_size: usize,
    ptime: u32,
    max_count: usize,
    inner: Mutex<JbufInner>,
}

impl JitterBuffer {
    /// Create a buffer of `max_count` frames of up to `frame_size` bytes,
    /// each `ptime` milliseconds long
    ///
    /// The buffer starts adaptive with prefetch
    /// `min(DEFAULT_INIT_DELAY, max_count * 4 / 5)` and prefetching disabled.
    pub fn new(
        name: impl Into<String>,
        frame_size: usize,
        ptime: u32,
        max_count: usize,
    ) -> Result<Self, JbufError> {
        if frame_size == 0 {
            return Err(JbufError::InvalidFrameSize);
        }
        if ptime == 0 {
            return Err(JbufError::InvalidPtime);
        }
        if max_count < MIN_MAX_COUNT {
            return Err(JbufError::CapacityTooSmall {
                max_count,
                min: MIN_MAX_COUNT,
            });
        }

        let name = name.into();
        debug!(
            "{}: jitter buffer created, frame_size={} ptime={}ms capacity={}",
            name, frame_size, ptime, max_count
        );

        Ok(JitterBuffer {
            name,
            frame_size,
            ptime,
            max_count,
            inner: Mutex::new(JbufInner {
                frames: FrameList::new(frame_size, max_count),
                ctl: Controller::new(ptime, max_count, DEFAULT_INIT_DELAY),
                delay: RunningStat::new(),
                lost: 0,
                discard: 0,
                empty: 0,
            }),
        })
    }

    /// Pin the prefetch to `prefetch` frames, disabling adaptation
    ///
    /// A non-zero value also enables prefetching after the buffer runs empty.
    pub fn set_fixed(&self, prefetch: usize) -> Result<(), JbufError> {
        if prefetch > self.max_count {
            return Err(JbufError::PrefetchTooLarge {
                prefetch,
                max_count: self.max_count,
            });
        }

        self.inner
            .lock()
            .ctl
            .configure(prefetch, prefetch, prefetch, prefetch);
        Ok(())
    }

    /// Adapt the prefetch within `[min, max]`, starting from `prefetch`
    ///
    /// Requires `min < max <= capacity` and `prefetch <= max`. A non-zero
    /// `prefetch` also enables prefetching after the buffer runs empty.
    pub fn set_adaptive(&self, prefetch: usize, min: usize, max: usize) -> Result<(), JbufError> {
        if !(min < max && max <= self.max_count && prefetch <= max) {
            return Err(JbufError::InvalidAdaptiveBounds {
                prefetch,
                min,
                max,
                max_count: self.max_count,
            });
        }

        self.inner.lock().ctl.configure(prefetch, min, max, prefetch);
        Ok(())
    }

    /// Drop all frames and restart adaptation
    ///
    /// Statistics are kept.
    pub fn reset(&self) {
        let mut inner = self.inner.lock();
        inner.ctl.reset();
        inner.frames.reset();
        debug!("{}: jitter buffer reset", self.name);
    }

    /// Store a frame under sequence number `seq`
    ///
    /// Frames longer than the frame size are truncated. Returns `true` if
    /// the frame was discarded (late, duplicate, or no room).
    pub fn put_frame(&self, frame: &[u8], bit_info: u32, seq: i64) -> bool {
        let mut guard = self.inner.lock();
        let inner = &mut *guard;

        let prev_size = inner.frames.size();
        let frame = &frame[..frame.len().min(self.frame_size)];

        let mut result = inner.frames.put_at(seq, frame, bit_info);
        if matches!(result, Err(crate::framelist::SeqError::TooMany { .. })) {
            let removed = inner.frames.remove_head((self.max_count / 4).max(1));
            inner.discard += removed as u32;
            trace!("{}: buffer full, evicted {} frame(s)", self.name, removed);
            result = inner.frames.put_at(seq, frame, bit_info);
        }

        if let Err(e) = result {
            inner.discard += 1;
            trace!("{}: frame discarded: {}", self.name, e);
            return true;
        }

        let cur_size = inner.frames.size();
        if inner.ctl.status() == JbStatus::Prefetching && cur_size >= inner.ctl.prefetch() {
            inner.ctl.set_status(JbStatus::Processing);
        }

        inner.ctl.add_level(if cur_size > prev_size {
            cur_size - prev_size
        } else {
            1
        });
        let shrunk = inner.ctl.update(Operation::Put, &mut inner.frames, &self.name);
        inner.discard += shrunk as u32;

        false
    }

    /// Take the next frame into `out`
    ///
    /// `out` must hold at least the frame size; a shorter buffer receives
    /// only the leading bytes and the returned `len` says how many. Only a
    /// [`FrameType::Normal`] result writes to it; for every other type the
    /// caller conceals the gap.
    pub fn get_frame(&self, out: &mut [u8]) -> GetFrame {
        debug_assert!(
            out.len() >= self.frame_size,
            "output buffer of {} bytes is shorter than the {} byte frame",
            out.len(),
            self.frame_size
        );
        let mut guard = self.inner.lock();
        let inner = &mut *guard;

        let cur_size = inner.frames.size();
        let mut result = GetFrame {
            frame_type: FrameType::ZeroEmpty,
            len: 0,
            bit_info: 0,
        };

        if cur_size == 0 {
            if inner.ctl.def_prefetch() > 0 {
                inner.ctl.set_status(JbStatus::Prefetching);
            }
            inner.empty += 1;
        } else if inner.ctl.status() == JbStatus::Prefetching {
            result.frame_type = FrameType::ZeroPrefetch;
            trace!(
                "{}: prefetching {}/{}",
                self.name,
                cur_size,
                inner.ctl.prefetch()
            );
            inner.empty += 1;
        } else if let Some(slot) = inner.frames.get(out) {
            match slot.frame_type {
                SlotType::Normal => {
                    result = GetFrame {
                        frame_type: FrameType::Normal,
                        len: slot.len,
                        bit_info: slot.bit_info,
                    };
                }
                SlotType::Missing => {
                    result.frame_type = FrameType::Missing;
                    inner.lost += 1;
                }
            }

            // First get after a put burst sees the whole buffer ahead of it
            if inner.ctl.last_op() == Some(Operation::Put) {
                inner.delay.update((cur_size as u32 * self.ptime) as i32);
            }
        }

        inner.ctl.add_level(1);
        let shrunk = inner.ctl.update(Operation::Get, &mut inner.frames, &self.name);
        inner.discard += shrunk as u32;

        result
    }

    /// Snapshot of the current state and statistics
    pub fn state(&self) -> JitterState {
        let inner = self.inner.lock();
        Self::snapshot(&inner, self.frame_size)
    }

    fn snapshot(inner: &JbufInner, frame_size: usize) -> JitterState {
        JitterState {
            frame_size,
            min_prefetch: inner.ctl.min_prefetch(),
            max_prefetch: inner.ctl.max_prefetch(),
            prefetch: inner.ctl.prefetch(),
            size: inner.frames.size(),
            avg_delay: inner.delay.mean().max(0) as u32,
            min_delay: inner.delay.min().max(0) as u32,
            max_delay: inner.delay.max().max(0) as u32,
            dev_delay: inner.delay.stddev().max(0) as u32,
            avg_burst: inner.ctl.burst_stat().mean().max(0) as u32,
            empty: inner.empty,
            discard: inner.discard,
            lost: inner.lost,
        }
    }

    /// Name used in log records
    pub fn name(&self) -> &str {
        &self.name
    }

    /// Maximum frame size in bytes
    pub fn frame_size(&self) -> usize {
        self.frame_size
    }

    /// Frame duration in milliseconds
    pub fn ptime(&self) -> u32 {
        self.ptime
    }

    /// Capacity in frames
    pub fn capacity(&self) -> usize {
        self.max_count
    }

    /// Current window length in frames
    pub fn size(&self) -> usize {
        self.inner.lock().frames.size()
    }

    /// Current prefetch in frames
    pub fn prefetch(&self) -> usize {
        self.inner.lock().ctl.prefetch()
    }

    pub fn status(&self) -> JbStatus {
        self.inner.lock().ctl.status()
    }
}

impl Drop for JitterBuffer {
    fn drop(&mut self) {
        let inner = self.inner.get_mut();
        let state = Self::snapshot(inner, self.frame_size);
        let burst = inner.ctl.burst_stat();
        debug!(
            "{}: jitter buffer summary: size={} prefetch={} \
             delay(min/max/avg/dev)={}/{}/{}/{}ms \
             burst(min/max/avg/dev)={}/{}/{}/{} frames \
             lost={} discard={} empty={}",
            self.name,
            state.size,
            state.prefetch,
            state.min_delay,
            state.max_delay,
            state.avg_delay,
            state.dev_delay,
            burst.min(),
            burst.max(),
            burst.mean(),
            burst.stddev(),
            state.lost,
            state.discard,
            state.empty
        );
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn buffer(max_count: usize) -> JitterBuffer {
        JitterBuffer::new("test", 160, 20, max_count).unwrap()
    }

    #[test]
    fn test_create_defaults() {
        let jb = buffer(15);
        let state = jb.state();
        assert_eq!(state.frame_size, 160);
        assert_eq!(state.prefetch, 12);
        assert_eq!(state.min_prefetch, 0);
        assert_eq!(state.max_prefetch, 12);
        assert_eq!(state.size, 0);
        assert_eq!(jb.status(), JbStatus::Initializing);

        let big = buffer(100);
        assert_eq!(big.prefetch(), DEFAULT_INIT_DELAY);
    }

    #[test]
    fn test_create_rejects_bad_config() {
        assert_eq!(
            JitterBuffer::new("x", 0, 20, 10).err(),
            Some(JbufError::InvalidFrameSize)
        );
        assert_eq!(
            JitterBuffer::new("x", 160, 0, 10).err(),
            Some(JbufError::InvalidPtime)
        );
        assert_eq!(
            JitterBuffer::new("x", 160, 20, 3).err(),
            Some(JbufError::CapacityTooSmall {
                max_count: 3,
                min: MIN_MAX_COUNT
            })
        );
    }

    #[test]
    fn test_set_fixed() {
        let jb = buffer(15);
        assert!(jb.set_fixed(16).is_err());

        jb.set_fixed(5).unwrap();
        let state = jb.state();
        assert_eq!(state.prefetch, 5);
        assert_eq!(state.min_prefetch, 5);
        assert_eq!(state.max_prefetch, 5);
    }

    #[test]
    fn test_set_adaptive_validation() {
        let jb = buffer(15);
        assert!(jb.set_adaptive(5, 5, 5).is_err());
        assert!(jb.set_adaptive(5, 1, 16).is_err());
        assert!(jb.set_adaptive(11, 1, 10).is_err());

        jb.set_adaptive(4, 2, 10).unwrap();
        let state = jb.state();
        assert_eq!(state.prefetch, 4);
        assert_eq!(state.min_prefetch, 2);
        assert_eq!(state.max_prefetch, 10);
    }

    #[test]
    fn test_put_get_roundtrip() {
        let jb = buffer(15);
        let payload: Vec<u8> = (0..100).collect();
        assert!(!jb.put_frame(&payload, 7, 42));

        let mut out = [0u8; 160];
        let got = jb.get_frame(&mut out);
        assert_eq!(got.frame_type, FrameType::Normal);
        assert_eq!(got.len, 100);
        assert_eq!(got.bit_info, 7);
        assert_eq!(&out[..100], &payload[..]);
    }

    #[test]
    fn test_oversized_frame_truncated() {
        let jb = JitterBuffer::new("test", 4, 20, 8).unwrap();
        assert!(!jb.put_frame(&[1, 2, 3, 4, 5, 6], 0, 0));

        let mut out = [0u8; 8];
        let got = jb.get_frame(&mut out);
        assert_eq!(got.len, 4);
        assert_eq!(&out[..4], &[1, 2, 3, 4]);
    }

    #[test]
    fn test_empty_get_counts() {
        let jb = buffer(15);
        let mut out = [0u8; 160];
        let got = jb.get_frame(&mut out);
        assert_eq!(got.frame_type, FrameType::ZeroEmpty);
        assert_eq!(got.len, 0);
        assert_eq!(jb.state().empty, 1);
        // Prefetching stays disabled by default
        assert_eq!(jb.status(), JbStatus::Initializing);
    }

    #[test]
    fn test_prefetching_after_running_empty() {
        let jb = buffer(15);
        jb.set_fixed(3).unwrap();
        let mut out = [0u8; 160];

        assert_eq!(jb.get_frame(&mut out).frame_type, FrameType::ZeroEmpty);
        assert_eq!(jb.status(), JbStatus::Prefetching);

        jb.put_frame(&[1; 160], 0, 0);
        jb.put_frame(&[2; 160], 0, 1);
        assert_eq!(jb.get_frame(&mut out).frame_type, FrameType::ZeroPrefetch);

        jb.put_frame(&[3; 160], 0, 2);
        assert_eq!(jb.status(), JbStatus::Processing);
        assert_eq!(jb.get_frame(&mut out).frame_type, FrameType::Normal);
        assert_eq!(out[0], 1);
        assert_eq!(jb.state().empty, 2);
    }

    #[test]
    fn test_duplicate_is_discarded() {
        let jb = buffer(15);
        assert!(!jb.put_frame(&[1; 160], 0, 5));
        assert!(jb.put_frame(&[2; 160], 0, 5));
        assert_eq!(jb.state().discard, 1);
    }

    #[test]
    fn test_overflow_evicts_quarter() {
        let jb = buffer(8);
        for seq in 0..8 {
            assert!(!jb.put_frame(&[seq as u8; 160], 0, seq));
        }
        assert_eq!(jb.size(), 8);

        // Two frames evicted from the head to make room
        assert!(!jb.put_frame(&[8; 160], 0, 8));
        assert_eq!(jb.state().discard, 2);
        assert_eq!(jb.size(), 7);

        let mut out = [0u8; 160];
        jb.get_frame(&mut out);
        assert_eq!(out[0], 2);
    }

    #[test]
    fn test_overflow_retry_failure_still_counts_evictions() {
        let jb = buffer(8);
        for seq in 0..8 {
            assert!(!jb.put_frame(&[seq as u8; 160], 0, seq));
        }

        // Seq 20 is still out of reach after two frames are evicted
        assert!(jb.put_frame(&[20; 160], 0, 20));
        let state = jb.state();
        assert_eq!(state.discard, 3);
        assert_eq!(state.size, 6);

        let mut out = [0u8; 160];
        jb.get_frame(&mut out);
        assert_eq!(out[0], 2);
    }

    #[test]
    fn test_extreme_sequence_jump_is_a_restart() {
        let jb = buffer(15);
        assert!(!jb.put_frame(&[1; 160], 0, -5));
        assert!(!jb.put_frame(&[2; 160], 0, i64::MAX));
        assert_eq!(jb.size(), 1);

        let mut out = [0u8; 160];
        let got = jb.get_frame(&mut out);
        assert_eq!(got.frame_type, FrameType::Normal);
        assert_eq!(out[0], 2);
    }

    #[test]
    #[cfg(debug_assertions)]
    #[should_panic(expected = "shorter than the 160 byte frame")]
    fn test_short_output_buffer_rejected() {
        let jb = buffer(15);
        jb.put_frame(&[1; 160], 0, 0);
        let mut out = [0u8; 10];
        jb.get_frame(&mut out);
    }

    #[test]
    fn test_reset_keeps_statistics() {
        let jb = buffer(15);
        jb.put_frame(&[1; 160], 0, 0);
        jb.put_frame(&[1; 160], 0, 0);
        jb.reset();

        let state = jb.state();
        assert_eq!(state.size, 0);
        assert_eq!(state.discard, 1);
        assert_eq!(jb.status(), JbStatus::Initializing);

        // After reset any sequence number is a fresh origin
        assert!(!jb.put_frame(&[1; 160], 0, 9000));
        assert_eq!(jb.size(), 1);
    }

    #[test]
    fn test_delay_recorded_on_first_get_after_puts() {
        let jb = buffer(15);
        for seq in 0..4 {
            jb.put_frame(&[0; 160], 0, seq);
        }
        let mut out = [0u8; 160];
        jb.get_frame(&mut out);
        jb.get_frame(&mut out);

        let state = jb.state();
        assert_eq!(state.avg_delay, 80);
        assert_eq!(state.min_delay, 80);
        assert_eq!(state.max_delay, 80);
    }
}
