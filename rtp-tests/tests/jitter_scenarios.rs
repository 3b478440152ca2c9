//! End-to-end jitter buffer scenarios
//!
//! Drives the public `JitterBuffer` API through the put/get patterns a
//! media stream produces and checks the frames and statistics that come
//! out.

use rtp_jbuf::{FrameType, JbStatus, JitterBuffer};

const FRAME_SIZE: usize = 160;
const PTIME: u32 = 20;

fn frame(seq: i64) -> Vec<u8> {
    let mut data = vec![0u8; FRAME_SIZE];
    data[..8].copy_from_slice(&seq.to_be_bytes());
    data
}

fn seq_of(out: &[u8]) -> i64 {
    let mut raw = [0u8; 8];
    raw.copy_from_slice(&out[..8]);
    i64::from_be_bytes(raw)
}

fn buffer(max_count: usize) -> JitterBuffer {
    JitterBuffer::new("scenario", FRAME_SIZE, PTIME, max_count).unwrap()
}

/// One put followed by one get, as a steady stream does every ptime
fn steady_cycle(jb: &JitterBuffer, seq: i64, out: &mut [u8]) -> FrameType {
    assert!(!jb.put_frame(&frame(seq), 0, seq));
    jb.get_frame(out).frame_type
}

#[test]
fn test_in_order_puts_fill_buffer() {
    let jb = buffer(15);
    for seq in 0..10 {
        assert!(!jb.put_frame(&frame(seq), 0, seq));
    }

    let state = jb.state();
    assert_eq!(state.size, 10);
    assert_eq!(state.discard, 0);
}

#[test]
fn test_gets_drain_in_sequence_order() {
    let jb = buffer(15);
    for seq in 0..10 {
        jb.put_frame(&frame(seq), 0, seq);
    }

    let mut out = [0u8; FRAME_SIZE];
    for seq in 0..10 {
        let got = jb.get_frame(&mut out);
        assert_eq!(got.frame_type, FrameType::Normal);
        assert_eq!(got.len, FRAME_SIZE);
        assert_eq!(seq_of(&out), seq);
    }

    let state = jb.state();
    assert_eq!(state.size, 0);
    assert_eq!(state.empty, 0);
}

#[test]
fn test_gap_reported_as_missing() {
    let jb = buffer(15);
    jb.put_frame(&frame(0), 0, 0);
    jb.put_frame(&frame(2), 0, 2);
    assert_eq!(jb.size(), 3);

    let mut out = [0u8; FRAME_SIZE];
    assert_eq!(jb.get_frame(&mut out).frame_type, FrameType::Normal);
    assert_eq!(seq_of(&out), 0);

    let got = jb.get_frame(&mut out);
    assert_eq!(got.frame_type, FrameType::Missing);
    assert_eq!(got.len, 0);

    assert_eq!(jb.get_frame(&mut out).frame_type, FrameType::Normal);
    assert_eq!(seq_of(&out), 2);
    assert_eq!(jb.state().lost, 1);
}

#[test]
fn test_late_fill_of_gap_is_played() {
    let jb = buffer(15);
    jb.put_frame(&frame(0), 0, 0);
    jb.put_frame(&frame(2), 0, 2);
    assert!(!jb.put_frame(&frame(1), 0, 1));
    assert_eq!(jb.size(), 3);

    let mut out = [0u8; FRAME_SIZE];
    for seq in 0..3 {
        assert_eq!(jb.get_frame(&mut out).frame_type, FrameType::Normal);
        assert_eq!(seq_of(&out), seq);
    }
    assert_eq!(jb.state().lost, 0);
}

#[test]
fn test_duplicate_keeps_first_payload() {
    let jb = buffer(15);
    assert!(!jb.put_frame(&[0xAA; FRAME_SIZE], 0, 5));
    assert!(jb.put_frame(&[0xBB; FRAME_SIZE], 0, 5));
    assert_eq!(jb.state().discard, 1);
    assert_eq!(jb.size(), 1);

    let mut out = [0u8; FRAME_SIZE];
    assert_eq!(jb.get_frame(&mut out).frame_type, FrameType::Normal);
    assert!(out.iter().all(|&b| b == 0xAA));
}

#[test]
fn test_frame_behind_origin_is_late() {
    let jb = buffer(15);
    jb.put_frame(&frame(10), 0, 10);
    let mut out = [0u8; FRAME_SIZE];
    jb.get_frame(&mut out);

    assert!(jb.put_frame(&frame(9), 0, 9));
    assert!(jb.put_frame(&frame(10), 0, 10));
    assert_eq!(jb.state().discard, 2);
}

#[test]
fn test_burst_raises_prefetch_and_quiet_lowers_it() {
    let jb = buffer(15);
    jb.set_adaptive(1, 0, 12).unwrap();
    let mut out = [0u8; FRAME_SIZE];
    let mut seq = 0;

    // Alternate until the controller has seen enough flips to adapt
    for _ in 0..10 {
        steady_cycle(&jb, seq, &mut out);
        seq += 1;
    }
    assert_eq!(jb.status(), JbStatus::Processing);
    assert_eq!(jb.prefetch(), 1);

    // A burst of ten puts is measured on the next get
    for _ in 0..10 {
        assert!(!jb.put_frame(&frame(seq), 0, seq));
        seq += 1;
    }
    assert_eq!(jb.prefetch(), 1);
    jb.get_frame(&mut out);
    assert_eq!(jb.prefetch(), 10);

    // Short bursts only lower the prefetch after more than 100 of them
    for cycle in 1..=100 {
        assert_eq!(steady_cycle(&jb, seq, &mut out), FrameType::Normal);
        seq += 1;
        assert_eq!(jb.prefetch(), 10, "lowered early at cycle {}", cycle);
    }
    steady_cycle(&jb, seq, &mut out);
    seq += 1;
    assert_eq!(jb.prefetch(), 9);

    // And never below the configured floor
    for _ in 0..2000 {
        steady_cycle(&jb, seq, &mut out);
        seq += 1;
    }
    let state = jb.state();
    assert!(state.prefetch < 9);
    assert!(state.prefetch >= state.min_prefetch);
}

#[test]
fn test_overlong_burst_is_not_measured() {
    let jb = buffer(15);
    jb.set_adaptive(1, 0, 12).unwrap();
    let mut out = [0u8; FRAME_SIZE];

    for seq in 0..10 {
        steady_cycle(&jb, seq, &mut out);
    }
    assert_eq!(jb.status(), JbStatus::Processing);

    // 50 frames of 20ms is a full second: the consumer was stalled, so the
    // burst says nothing about network jitter
    for seq in 10..60 {
        jb.put_frame(&frame(seq), 0, seq);
        assert!(jb.size() <= 15);
    }
    assert!(jb.state().discard > 0);

    jb.get_frame(&mut out);
    assert_eq!(jb.prefetch(), 1);
}

#[test]
fn test_far_jump_resets_buffer() {
    let jb = buffer(15);
    for seq in 0..5 {
        jb.put_frame(&frame(seq), 0, seq);
    }
    assert_eq!(jb.size(), 5);

    let far = 3001;
    assert!(!jb.put_frame(&frame(far), 0, far));
    assert_eq!(jb.size(), 1);

    let mut out = [0u8; FRAME_SIZE];
    assert_eq!(jb.get_frame(&mut out).frame_type, FrameType::Normal);
    assert_eq!(seq_of(&out), far);

    // The new origin has moved past the old frames
    assert!(jb.put_frame(&frame(far), 0, far));
    assert!(!jb.put_frame(&frame(far + 1), 0, far + 1));
}

#[test]
fn test_reset_after_restart_accepts_new_sequence() {
    let jb = buffer(15);
    for seq in 1000..1005 {
        jb.put_frame(&frame(seq), 0, seq);
    }
    jb.reset();
    assert_eq!(jb.size(), 0);

    assert!(!jb.put_frame(&frame(3), 0, 3));
    let mut out = [0u8; FRAME_SIZE];
    assert_eq!(jb.get_frame(&mut out).frame_type, FrameType::Normal);
    assert_eq!(seq_of(&out), 3);
}
