//! Frame slot ring and sequencer
//!
//! A fixed-capacity ring of frame slots indexed by sequence number. The
//! slot at `head` holds the frame whose sequence number is `origin`; the
//! following `size - 1` slots hold the rest of the current window, with
//! gaps left as [`SlotType::Missing`] until their frame arrives.
//!
//! Sequence numbers are signed 64-bit and expected to be already extended
//! past the 16-bit RTP wraparound by the caller.

use thiserror::Error;

/// Origin value meaning "no frame received since the last reset"
pub const INVALID_OFFSET: i64 = -9999;

/// Frames arriving at most this far behind `origin` are rejected as late
pub const MAX_MISORDER: i64 = 100;

/// Jumps beyond this many frames reset the whole list
pub const MAX_DROPOUT: i64 = 3000;

/// State of one slot in the ring
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SlotType {
    /// Slot holds a received frame
    Normal,
    /// Slot is empty: not yet received, or lost
    Missing,
}

/// Reasons a frame could not be placed in the ring
#[derive(Error, Debug, Clone, Copy, PartialEq, Eq)]
pub enum SeqError {
    #[error("Frame {seq} arrived too late (origin {origin})")]
    TooLate { seq: i64, origin: i64 },

    #[error("No room for frame {seq}")]
    TooMany { seq: i64 },

    #[error("Frame {seq} already exists")]
    AlreadyExists { seq: i64 },
}

/// One slot of the ring
#[derive(Debug, Clone)]
struct FrameSlot {
    content: Box<[u8]>,
    frame_type: SlotType,
    content_len: usize,
    bit_info: u32,
}

impl FrameSlot {
    fn new(frame_size: usize) -> Self {
        FrameSlot {
            content: vec![0u8; frame_size].into_boxed_slice(),
            frame_type: SlotType::Missing,
            content_len: 0,
            bit_info: 0,
        }
    }

    /// Mark the slot empty. Content bytes are left as they are.
    #[inline]
    fn clear(&mut self) {
        self.frame_type = SlotType::Missing;
        self.content_len = 0;
        self.bit_info = 0;
    }
}

/// Metadata of a frame taken from the head of the ring
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct SlotFrame {
    /// Whether the slot was ever filled
    pub frame_type: SlotType,
    /// Number of bytes copied out
    pub len: usize,
    /// Side-channel value stored with the frame
    pub bit_info: u32,
}

/// Circular frame list
#[derive(Debug)]
pub struct FrameList {
    /// Maximum size of one frame
    frame_size: usize,
    /// Number of slots
    max_count: usize,
    /// Slot storage
    slots: Vec<FrameSlot>,
    /// Index of the slot returned by the next get
    head: usize,
    /// Length of the current window, gaps included
    size: usize,
    /// Sequence number of the frame at `head`
    origin: i64,
}

impl FrameList {
    /// Allocate `max_count` empty slots of `frame_size` bytes each
    pub fn new(frame_size: usize, max_count: usize) -> Self {
        let slots = (0..max_count).map(|_| FrameSlot::new(frame_size)).collect();
        FrameList {
            frame_size,
            max_count,
            slots,
            head: 0,
            size: 0,
            origin: INVALID_OFFSET,
        }
    }

    /// Empty every slot and forget the origin
    pub fn reset(&mut self) {
        self.head = 0;
        self.origin = INVALID_OFFSET;
        self.size = 0;
        for slot in &mut self.slots {
            slot.clear();
        }
    }

    /// Current window length
    #[inline]
    pub fn size(&self) -> usize {
        self.size
    }

    /// Sequence number at the head, or [`INVALID_OFFSET`]
    #[inline]
    pub fn origin(&self) -> i64 {
        self.origin
    }

    /// Number of slots
    #[inline]
    pub fn capacity(&self) -> usize {
        self.max_count
    }

    /// Maximum frame size
    #[inline]
    pub fn frame_size(&self) -> usize {
        self.frame_size
    }

    /// Take the frame at the head
    ///
    /// Copies up to `out.len()` bytes of the slot into `out`, empties the
    /// slot and advances the window by one. Returns `None` without touching
    /// any state when the list is empty.
    pub fn get(&mut self, out: &mut [u8]) -> Option<SlotFrame> {
        if self.size == 0 {
            return None;
        }

        let slot = &mut self.slots[self.head];
        let len = slot.content_len.min(out.len());
        out[..len].copy_from_slice(&slot.content[..len]);

        let frame = SlotFrame {
            frame_type: slot.frame_type,
            len,
            bit_info: slot.bit_info,
        };
        slot.clear();

        self.origin = self.origin.wrapping_add(1);
        self.head = (self.head + 1) % self.max_count;
        self.size -= 1;

        Some(frame)
    }

    /// Drop up to `count` frames from the head, returning how many were dropped
    pub fn remove_head(&mut self, count: usize) -> usize {
        let count = count.min(self.size);
        if count == 0 {
            return 0;
        }

        // The removed span may wrap past the end of the ring
        let first = count.min(self.max_count - self.head);
        let second = count - first;

        for slot in &mut self.slots[self.head..self.head + first] {
            slot.clear();
        }
        for slot in &mut self.slots[..second] {
            slot.clear();
        }

        self.origin = self.origin.wrapping_add(count as i64);
        self.head = (self.head + count) % self.max_count;
        self.size -= count;

        count
    }

    /// Store `frame` as sequence number `seq`
    ///
    /// `frame` must not be longer than the frame size.
    pub fn put_at(&mut self, seq: i64, frame: &[u8], bit_info: u32) -> Result<(), SeqError> {
        debug_assert!(frame.len() <= self.frame_size);

        if self.origin == INVALID_OFFSET {
            self.origin = seq;
        }

        if seq < self.origin {
            if self.origin.saturating_sub(seq) < MAX_MISORDER {
                return Err(SeqError::TooLate {
                    seq,
                    origin: self.origin,
                });
            }
            // Sequence restart: keep the current span in front of the new number
            match seq.checked_sub(self.size as i64) {
                Some(origin) => self.origin = origin,
                None => {
                    self.reset();
                    self.origin = seq;
                }
            }
        }

        // Distances too large for i64 saturate and count as a dropout
        let mut distance = seq.saturating_sub(self.origin);

        if distance >= self.max_count as i64 {
            if distance > MAX_DROPOUT {
                self.reset();
                self.origin = seq;
                distance = 0;
            } else if self.size == 0 {
                self.origin = seq;
                distance = 0;
            } else {
                return Err(SeqError::TooMany { seq });
            }
        }

        let distance = distance as usize;
        let index = (self.head + distance) % self.max_count;
        let slot = &mut self.slots[index];

        if slot.frame_type != SlotType::Missing {
            return Err(SeqError::AlreadyExists { seq });
        }

        let len = frame.len().min(self.frame_size);
        slot.content[..len].copy_from_slice(&frame[..len]);
        slot.frame_type = SlotType::Normal;
        slot.content_len = len;
        slot.bit_info = bit_info;

        if self.origin.saturating_add(self.size as i64) <= seq {
            self.size = distance + 1;
        }

        Ok(())
    }
}
