//! Sequence Number Handling
//!
//! RTP carries 16-bit sequence numbers that wrap around every 65536 packets.
//! This module provides a wrapped sequence number type with wrap-aware
//! arithmetic, and the RFC 3550 (Appendix A.1) validation state that maps
//! wire sequence numbers into a monotonic 64-bit extended space.

use std::fmt;
use std::ops::{Add, AddAssign, Sub};

/// Size of the 16-bit RTP sequence space
pub const RTP_SEQ_MOD: u32 = 1 << 16;

/// Largest forward jump still treated as ordinary loss
pub const MAX_DROPOUT: u16 = 3000;

/// Largest backward jump still treated as reordering
pub const MAX_MISORDER: u16 = 100;

/// Number of sequential packets required to leave probation
pub const MIN_SEQUENTIAL: u16 = 2;

/// RTP sequence number with 16-bit wraparound semantics
#[derive(Copy, Clone, Eq, PartialEq, Hash, Ord, PartialOrd, Default)]
pub struct RtpSeq(u16);

impl RtpSeq {
    /// Create a new sequence number
    #[inline]
    pub fn new(value: u16) -> Self {
        RtpSeq(value)
    }

    /// Get the raw sequence number value
    #[inline]
    pub fn as_raw(self) -> u16 {
        self.0
    }

    /// Increment the sequence number by 1
    #[inline]
    pub fn increment(&mut self) {
        self.0 = self.0.wrapping_add(1);
    }

    /// Get the next sequence number
    #[inline]
    pub fn next(self) -> Self {
        RtpSeq(self.0.wrapping_add(1))
    }

    /// Signed distance from this sequence number to another
    ///
    /// Positive values mean `other` is ahead of `self`. The result is in
    /// `-32768..=32767`, i.e. the shorter way around the ring.
    #[inline]
    pub fn distance_to(self, other: RtpSeq) -> i32 {
        other.0.wrapping_sub(self.0) as i16 as i32
    }

    /// Check if this sequence number is less than another (accounting for wraparound)
    #[inline]
    pub fn lt(self, other: RtpSeq) -> bool {
        self.distance_to(other) > 0
    }

    /// Check if this sequence number is less than or equal to another
    #[inline]
    pub fn le(self, other: RtpSeq) -> bool {
        self == other || self.lt(other)
    }

    /// Check if this sequence number is greater than another
    #[inline]
    pub fn gt(self, other: RtpSeq) -> bool {
        self.distance_to(other) < 0
    }

    /// Check if this sequence number is greater than or equal to another
    #[inline]
    pub fn ge(self, other: RtpSeq) -> bool {
        self == other || self.gt(other)
    }
}

impl fmt::Debug for RtpSeq {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "RtpSeq({})", self.0)
    }
}

impl fmt::Display for RtpSeq {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.0)
    }
}

impl From<u16> for RtpSeq {
    fn from(value: u16) -> Self {
        RtpSeq(value)
    }
}

impl From<RtpSeq> for u16 {
    fn from(seq: RtpSeq) -> u16 {
        seq.0
    }
}

impl Add<u16> for RtpSeq {
    type Output = RtpSeq;

    fn add(self, rhs: u16) -> RtpSeq {
        RtpSeq(self.0.wrapping_add(rhs))
    }
}

impl AddAssign<u16> for RtpSeq {
    fn add_assign(&mut self, rhs: u16) {
        self.0 = self.0.wrapping_add(rhs);
    }
}

impl Sub for RtpSeq {
    type Output = i32;

    /// Calculate the signed distance between two sequence numbers
    fn sub(self, rhs: RtpSeq) -> i32 {
        rhs.distance_to(self)
    }
}

/// Outcome of feeding one sequence number to [`SeqState::update`]
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SeqStatus {
    /// In order (possibly after a loss gap), accepted
    Valid,
    /// Source not yet validated; packet should still be processed
    Probation,
    /// Two consecutive packets confirmed a large jump: state re-initialized
    Restarted,
    /// Duplicate or late packet within the misorder window
    Misordered,
    /// Very large jump, not yet confirmed; packet should be dropped
    Bad,
}

/// Result of a sequence update
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct SeqUpdate {
    /// Classification of the packet
    pub status: SeqStatus,
    /// Extended (cycle-corrected) sequence number of the packet
    pub extended: i64,
}

/// Per-source sequence validation state (RFC 3550 A.1)
#[derive(Debug, Clone)]
pub struct SeqState {
    /// Highest sequence number seen
    max_seq: u16,
    /// Shifted count of sequence number cycles
    cycles: u64,
    /// Extended sequence number of the first packet of the current run
    base_ext: i64,
    /// Last 'bad' sequence number + 1
    bad_seq: u32,
    /// Sequential packets still needed before the source is valid
    probation: u16,
    /// Packets accepted
    received: u64,
}

impl SeqState {
    /// Create state for a new source whose first packet carries `seq`
    pub fn new(seq: u16) -> Self {
        SeqState {
            max_seq: seq.wrapping_sub(1),
            cycles: 0,
            base_ext: seq as i64,
            bad_seq: RTP_SEQ_MOD + 1,
            probation: MIN_SEQUENTIAL,
            received: 0,
        }
    }

    fn init(&mut self, seq: u16, cycles: u64) {
        self.max_seq = seq;
        self.bad_seq = RTP_SEQ_MOD + 1;
        self.cycles = cycles;
        self.base_ext = cycles as i64 + seq as i64;
        self.probation = 0;
    }

    /// Feed the next received sequence number
    pub fn update(&mut self, seq: u16) -> SeqUpdate {
        let udelta = seq.wrapping_sub(self.max_seq);

        let status = if self.probation > 0 {
            if seq == self.max_seq.wrapping_add(1) {
                // Keep extended numbers continuous when probation crosses the wrap
                let cycles = if seq < self.max_seq && self.probation < MIN_SEQUENTIAL {
                    self.cycles + RTP_SEQ_MOD as u64
                } else {
                    self.cycles
                };
                self.probation -= 1;
                self.max_seq = seq;
                self.cycles = cycles;
                if self.probation == 0 {
                    self.init(seq, cycles);
                    SeqStatus::Valid
                } else {
                    SeqStatus::Probation
                }
            } else {
                self.probation = MIN_SEQUENTIAL - 1;
                self.max_seq = seq;
                SeqStatus::Probation
            }
        } else if udelta < MAX_DROPOUT {
            if seq < self.max_seq {
                self.cycles += RTP_SEQ_MOD as u64;
            }
            self.max_seq = seq;
            SeqStatus::Valid
        } else if (udelta as u32) <= RTP_SEQ_MOD - MAX_MISORDER as u32 {
            if seq as u32 == self.bad_seq {
                // Two sequential packets after a big jump: the source restarted
                self.init(seq, 0);
                SeqStatus::Restarted
            } else {
                self.bad_seq = (seq as u32 + 1) & (RTP_SEQ_MOD - 1);
                return SeqUpdate {
                    status: SeqStatus::Bad,
                    extended: self.extend(seq),
                };
            }
        } else {
            SeqStatus::Misordered
        };

        if status != SeqStatus::Probation {
            self.received += 1;
        }

        SeqUpdate {
            status,
            extended: self.extend(seq),
        }
    }

    /// Map a 16-bit sequence number to the extended space of this source
    ///
    /// The number is interpreted relative to the highest sequence seen, taking
    /// the shorter way around the 16-bit ring.
    pub fn extend(&self, seq: u16) -> i64 {
        let delta = RtpSeq(self.max_seq).distance_to(RtpSeq(seq)) as i64;
        self.extended_max() + delta
    }

    /// Extended highest sequence number received
    pub fn extended_max(&self) -> i64 {
        self.cycles as i64 + self.max_seq as i64
    }

    /// Number of packets expected since the start of the current run
    pub fn expected(&self) -> i64 {
        self.extended_max() - self.base_ext + 1
    }

    /// Number of packets accepted
    pub fn received(&self) -> u64 {
        self.received
    }

    /// Check whether the source is still in probation
    pub fn in_probation(&self) -> bool {
        self.probation > 0
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_next_wraparound() {
        let seq = RtpSeq::new(u16::MAX);
        assert_eq!(seq.next().as_raw(), 0);
    }

    #[test]
    fn test_increment() {
        let mut seq = RtpSeq::new(100);
        seq.increment();
        assert_eq!(seq.as_raw(), 101);
    }

    #[test]
    fn test_distance_simple() {
        let a = RtpSeq::new(100);
        let b = RtpSeq::new(200);
        assert_eq!(a.distance_to(b), 100);
        assert_eq!(b.distance_to(a), -100);
    }

    #[test]
    fn test_distance_wraparound() {
        let a = RtpSeq::new(65530);
        let b = RtpSeq::new(10);
        assert_eq!(a.distance_to(b), 16);
        assert_eq!(b.distance_to(a), -16);
        assert!(a.lt(b));
        assert!(b.gt(a));
    }

    #[test]
    fn test_sub_seqnumbers() {
        let a = RtpSeq::new(5);
        let b = RtpSeq::new(65535);
        assert_eq!(a - b, 6);
        assert_eq!(b - a, -6);
    }

    #[test]
    fn test_probation_then_valid() {
        let mut state = SeqState::new(1000);
        assert!(state.in_probation());

        let first = state.update(1000);
        assert_eq!(first.status, SeqStatus::Probation);

        let second = state.update(1001);
        assert_eq!(second.status, SeqStatus::Valid);
        assert!(!state.in_probation());
        assert_eq!(second.extended, 1001);
    }

    #[test]
    fn test_probation_resets_on_gap() {
        let mut state = SeqState::new(10);
        state.update(10);
        let gap = state.update(20);
        assert_eq!(gap.status, SeqStatus::Probation);
        assert!(state.in_probation());

        let next = state.update(21);
        assert_eq!(next.status, SeqStatus::Valid);
    }

    #[test]
    fn test_cycle_extension() {
        let mut state = SeqState::new(65534);
        state.update(65534);
        state.update(65535);

        let wrapped = state.update(0);
        assert_eq!(wrapped.status, SeqStatus::Valid);
        assert_eq!(wrapped.extended, 65536);

        let next = state.update(1);
        assert_eq!(next.extended, 65537);
    }

    #[test]
    fn test_probation_across_wrap() {
        let mut state = SeqState::new(65535);
        assert_eq!(state.update(65535).extended, 65535);

        let second = state.update(0);
        assert_eq!(second.status, SeqStatus::Valid);
        assert_eq!(second.extended, 65536);
        assert_eq!(state.expected(), 1);
    }

    #[test]
    fn test_late_packet_across_wrap() {
        let mut state = SeqState::new(65534);
        state.update(65534);
        state.update(65535);
        state.update(1);

        // 0 arrives after 1: misordered, but still maps below 65537
        let late = state.update(0);
        assert_eq!(late.status, SeqStatus::Misordered);
        assert_eq!(late.extended, 65536);
    }

    #[test]
    fn test_restart_after_two_sequential_jumps() {
        let mut state = SeqState::new(100);
        state.update(100);
        state.update(101);

        let jump = state.update(40000);
        assert_eq!(jump.status, SeqStatus::Bad);

        let confirm = state.update(40001);
        assert_eq!(confirm.status, SeqStatus::Restarted);
        assert_eq!(confirm.extended, 40001);
    }

    proptest::proptest! {
        #[test]
        fn prop_distance_antisymmetric(a: u16, b: u16) {
            let (a, b) = (RtpSeq::new(a), RtpSeq::new(b));
            let d = a.distance_to(b);
            if d != i16::MIN as i32 {
                proptest::prop_assert_eq!(b.distance_to(a), -d);
            }
            proptest::prop_assert_eq!(a + (d as u16), b);
        }

        #[test]
        fn prop_in_order_stream_extends_monotonically(
            start in proptest::prelude::any::<u16>(),
            len in 2usize..5000
        ) {
            let mut state = SeqState::new(start);
            let mut last = None;
            for i in 0..len {
                let seq = start.wrapping_add(i as u16);
                let update = state.update(seq);
                if let Some(prev) = last {
                    proptest::prop_assert_eq!(update.extended, prev + 1);
                }
                last = Some(update.extended);
            }
        }
    }
}
