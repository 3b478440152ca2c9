//! Jitter buffer network simulation
//!
//! A sender emits one frame every ptime. Each frame crosses a simulated
//! network that delays, drops, reorders or duplicates it, and arrives at
//! one jitter buffer. A playout clock pulls a frame every ptime. The run
//! is fully determined by the seed.

use crate::config::SimConfig;
use rand::rngs::StdRng;
use rand::{Rng, SeedableRng};
use rtp_jbuf::{FrameType, JitterBuffer, JitterState};
use std::cmp::Reverse;
use std::collections::BinaryHeap;
use tracing::trace;

/// Counters collected over a simulation run
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct SimReport {
    /// Frames emitted by the sender
    pub sent: u64,
    /// Frames dropped by the network
    pub network_lost: u64,
    /// Extra copies delivered by the network
    pub duplicated: u64,
    /// Frames the jitter buffer refused
    pub put_discarded: u64,
    /// Playout results by frame type
    pub normal: u64,
    pub missing: u64,
    pub zero_empty: u64,
    pub zero_prefetch: u64,
    /// Frames played out of sequence order
    pub out_of_order: u64,
    /// Buffer state at the end of the run
    pub jitter: JitterState,
}

impl SimReport {
    /// Total playout ticks
    pub fn ticks(&self) -> u64 {
        self.normal + self.missing + self.zero_empty + self.zero_prefetch
    }
}

/// Seeded network simulator
pub struct Simulator {
    config: SimConfig,
    rng: StdRng,
}

impl Simulator {
    pub fn new(config: SimConfig) -> Self {
        let rng = StdRng::seed_from_u64(config.seed);
        Simulator { config, rng }
    }

    /// Run the simulation against `jb`
    ///
    /// Frames carry their sequence number in the first eight bytes so the
    /// playout side can check ordering.
    pub fn run(&mut self, jb: &JitterBuffer) -> SimReport {
        let ptime_us = self.config.ptime as u64 * 1000;
        let total_frames = self.config.duration_secs * 1000 / self.config.ptime as u64;
        let frame_size = self.config.frame_size.max(8);

        let mut report = SimReport::default();
        // Arrival events ordered by (arrival time, sequence)
        let mut arrivals: BinaryHeap<Reverse<(u64, i64)>> = BinaryHeap::new();
        let mut frame = vec![0u8; frame_size];
        let mut out = vec![0u8; frame_size];
        let mut last_played: Option<i64> = None;

        for tick in 0..total_frames {
            let now = tick * ptime_us;
            self.emit(tick as i64, now, ptime_us, &mut arrivals, &mut report);

            while let Some(Reverse((at, seq))) = arrivals.peek().copied() {
                if at > now {
                    break;
                }
                arrivals.pop();
                frame[..8].copy_from_slice(&seq.to_be_bytes());
                if jb.put_frame(&frame, 0, seq) {
                    report.put_discarded += 1;
                }
                trace!("t={}us put seq={}", at, seq);
            }

            let got = jb.get_frame(&mut out);
            match got.frame_type {
                FrameType::Normal => {
                    report.normal += 1;
                    let mut raw = [0u8; 8];
                    raw.copy_from_slice(&out[..8]);
                    let seq = i64::from_be_bytes(raw);
                    if last_played.map_or(false, |last| seq <= last) {
                        report.out_of_order += 1;
                    }
                    last_played = Some(seq);
                }
                FrameType::Missing => report.missing += 1,
                FrameType::ZeroEmpty => report.zero_empty += 1,
                FrameType::ZeroPrefetch => report.zero_prefetch += 1,
            }
        }

        report.jitter = jb.state();
        report
    }

    fn emit(
        &mut self,
        seq: i64,
        now: u64,
        ptime_us: u64,
        arrivals: &mut BinaryHeap<Reverse<(u64, i64)>>,
        report: &mut SimReport,
    ) {
        report.sent += 1;
        if self.chance(self.config.loss_percent) {
            report.network_lost += 1;
            return;
        }

        let mut delay = self.config.base_delay_ms as u64 * 1000;
        if self.config.jitter_ms > 0 {
            delay += self.rng.gen_range(0..=self.config.jitter_ms as u64 * 1000);
        }
        if self.chance(self.config.reorder_percent) {
            delay += 2 * ptime_us;
        }
        arrivals.push(Reverse((now + delay, seq)));

        if self.chance(self.config.duplicate_percent) {
            report.duplicated += 1;
            arrivals.push(Reverse((now + delay + ptime_us / 2, seq)));
        }
    }

    fn chance(&mut self, percent: f64) -> bool {
        percent > 0.0 && self.rng.gen_bool((percent / 100.0).min(1.0))
    }
}
