//! Adaptive prefetch controller
//!
//! Watches the pattern of put and get calls to estimate network jitter.
//! A run of consecutive calls in one direction is a burst; the length of
//! each put burst, measured when the next get arrives, drives the target
//! prefetch depth. The controller also trims one frame at a time from a
//! buffer that has grown well past twice the burst level, which bounds
//! the latency added by clock drift between sender and receiver.
//!
//! Prefetch grows immediately when a longer burst is seen and shrinks
//! only after [`STABLE_HISTORY_LIMIT`] consecutive shorter bursts.

use crate::framelist::FrameList;
use crate::stats::RunningStat;
use tracing::{debug, trace};

/// Buffer must exceed twice the burst level by this many frames to shrink
pub const SAFE_SHRINKING_DIFF: i64 = 1;

/// Minimum interval between two shrinks
pub const MIN_SHRINK_GAP_MSEC: u32 = 200;

/// Bursts longer than this mean the other side was idle and are ignored
pub const MAX_BURST_MSEC: u32 = 1000;

/// Direction flips needed before leaving the initializing state
pub const INIT_CYCLE: u32 = 10;

/// Consecutive short bursts needed before prefetch is lowered
pub const STABLE_HISTORY_LIMIT: u32 = 100;

/// Direction of a buffer operation
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Operation {
    Put,
    Get,
}

/// Overall buffer status
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum JbStatus {
    /// Learning the put/get pattern, no adaptation yet
    Initializing,
    /// Normal operation
    Processing,
    /// Refilling to the prefetch depth after running empty
    Prefetching,
}

/// Prefetch and burst-level state
#[derive(Debug)]
pub struct Controller {
    /// Prefetch ceiling derived from capacity (80% of it)
    capacity_limit: usize,
    /// Current target depth
    prefetch: usize,
    min_prefetch: usize,
    max_prefetch: usize,
    /// Depth to refill to after running empty, 0 disables prefetching
    def_prefetch: usize,
    /// Prefetch restored on reset
    init_prefetch: usize,
    /// Longest burst, in frames, that still counts as jitter
    max_burst: usize,
    /// Minimum origin advance between shrinks, in frames
    min_shrink_gap: i64,

    /// Length of the current burst
    level: usize,
    /// Peak burst level since prefetch was last lowered
    max_hist_level: usize,
    /// Consecutive bursts shorter than the prefetch
    stable_hist: u32,
    last_op: Option<Operation>,
    status: JbStatus,
    init_cycle_cnt: u32,
    /// Origin right after the last shrink
    last_del_seq: i64,

    /// Distribution of measured put bursts
    burst: RunningStat,
}

impl Controller {
    /// Create a controller for frames of `ptime` milliseconds in a ring of `max_count` slots
    pub fn new(ptime: u32, max_count: usize, default_prefetch: usize) -> Self {
        let capacity_limit = max_count * 4 / 5;
        let prefetch = default_prefetch.min(capacity_limit);

        Controller {
            capacity_limit,
            prefetch,
            min_prefetch: 0,
            max_prefetch: capacity_limit,
            def_prefetch: 0,
            init_prefetch: prefetch,
            max_burst: (MAX_BURST_MSEC / ptime) as usize,
            min_shrink_gap: (MIN_SHRINK_GAP_MSEC / ptime) as i64,
            level: 0,
            max_hist_level: 0,
            stable_hist: 0,
            last_op: None,
            status: JbStatus::Initializing,
            init_cycle_cnt: 0,
            last_del_seq: 0,
            burst: RunningStat::new(),
        }
    }

    /// Set the prefetch bounds
    ///
    /// The caller validates the values; `prefetch` is pulled into
    /// `[min, max]` and also becomes the depth restored by [`reset`](Self::reset).
    pub fn configure(&mut self, prefetch: usize, min: usize, max: usize, def_prefetch: usize) {
        self.min_prefetch = min;
        self.max_prefetch = max;
        self.prefetch = prefetch.max(min).min(max);
        self.def_prefetch = def_prefetch;
        self.init_prefetch = self.prefetch;
    }

    /// Return to the initializing state with the configured prefetch
    pub fn reset(&mut self) {
        self.prefetch = self.init_prefetch;
        self.level = 0;
        self.max_hist_level = 0;
        self.stable_hist = 0;
        self.last_op = None;
        self.status = JbStatus::Initializing;
        self.init_cycle_cnt = 0;
    }

    /// Extend the current burst by `frames`
    #[inline]
    pub fn add_level(&mut self, frames: usize) {
        self.level += frames;
    }

    /// Record an operation and run shrink control
    ///
    /// Returns the number of frames removed from the head of `frames`.
    pub fn update(&mut self, op: Operation, frames: &mut FrameList, name: &str) -> usize {
        if self.last_op != Some(op) {
            self.last_op = Some(op);

            if self.status == JbStatus::Initializing {
                self.init_cycle_cnt += 1;
                // Leave on a get so the first measured burst is a put burst
                if self.init_cycle_cnt >= INIT_CYCLE && op == Operation::Get {
                    debug!("{}: jitter buffer initialized", name);
                    self.status = JbStatus::Processing;
                } else {
                    self.level = 0;
                    return 0;
                }
            }

            // Only put bursts reflect network jitter. An overlong burst means
            // the consumer was idle.
            if op == Operation::Get && self.level < self.max_burst {
                self.calculate_jitter(frames.size(), name);
            }

            self.level = 0;
        }

        if self.status != JbStatus::Processing {
            return 0;
        }

        let burst_level = self.prefetch.max(self.level) as i64;
        let diff = frames.size() as i64 - burst_level * 2;
        if diff < SAFE_SHRINKING_DIFF {
            return 0;
        }

        // Origin may have moved backwards on a sequence restart
        if frames.origin() < self.last_del_seq {
            self.last_del_seq = frames.origin();
        }

        if frames.origin().saturating_sub(self.last_del_seq) < self.min_shrink_gap {
            return 0;
        }

        let removed = frames.remove_head(1);
        self.last_del_seq = frames.origin();
        debug!(
            "{}: shrinking {} frame(s), size={}",
            name,
            removed,
            frames.size()
        );
        removed
    }

    fn calculate_jitter(&mut self, cur_size: usize, name: &str) {
        self.burst.update(self.level as i32);
        self.max_hist_level = self.max_hist_level.max(self.level);

        if self.level < self.prefetch {
            self.stable_hist += 1;

            if self.stable_hist > STABLE_HISTORY_LIMIT {
                let diff = (self.prefetch.saturating_sub(self.max_hist_level) / 3).max(1);
                self.prefetch = self.prefetch.saturating_sub(diff).max(self.min_prefetch);

                self.max_hist_level = 0;
                self.stable_hist = 0;

                trace!(
                    "{}: prefetch lowered to {}, size={}",
                    name,
                    self.prefetch,
                    cur_size
                );
            }
        } else if self.level > self.prefetch {
            // Jump straight to the recent peak; keep tracking it
            self.prefetch = self
                .max_hist_level
                .min(self.capacity_limit)
                .max(self.min_prefetch)
                .min(self.max_prefetch);
            self.stable_hist = 0;

            trace!(
                "{}: prefetch raised to {}, size={}",
                name,
                self.prefetch,
                cur_size
            );
        } else {
            self.stable_hist = 0;
        }
    }

    /// Current target depth
    pub fn prefetch(&self) -> usize {
        self.prefetch
    }

    pub fn min_prefetch(&self) -> usize {
        self.min_prefetch
    }

    pub fn max_prefetch(&self) -> usize {
        self.max_prefetch
    }

    /// Refill depth, 0 when prefetching is disabled
    pub fn def_prefetch(&self) -> usize {
        self.def_prefetch
    }

    /// Length of the current burst
    pub fn level(&self) -> usize {
        self.level
    }

    pub fn last_op(&self) -> Option<Operation> {
        self.last_op
    }

    pub fn status(&self) -> JbStatus {
        self.status
    }

    pub fn set_status(&mut self, status: JbStatus) {
        self.status = status;
    }

    /// Distribution of measured put bursts
    pub fn burst_stat(&self) -> &RunningStat {
        &self.burst
    }
}
