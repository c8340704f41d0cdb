//! Fixed-slot transmit ring between the audio pipeline and the transport.
//!
//! The ring holds `slot_count` byte slots of `slot_len` bytes each and two
//! cursors:
//!
//! * `fill`: the slot the pipeline is writing into (producer).
//! * `drain`: the oldest completed slot not yet confirmed sent (consumer).
//!
//! Completed, unsent slots are `drain..fill`; `fill == drain` means nothing
//! is waiting.  The ring never grows.  When completing a slot would move
//! `fill` onto `drain`, the oldest unsent slot is discarded by moving
//! `drain` forward: whole slots are lost, never individual samples, and the
//! slot being filled is never the one the transport will send next.
//!
//! A slot the transport has started writing is never discarded.  If the
//! ring runs out while the `drain` slot is part-way out, the slot that was
//! just completed is dropped instead and `fill` stays put, so the collector
//! never sees a torn slot.
//!
//! An overflow is counted once when it starts and again each time `fill`
//! laps the whole ring without the consumer confirming a send.
//!
//! # Example
//!
//! ```rust
//! use acoustic_node::stream::{FillAdvance, TransmitRing};
//!
//! let mut ring = TransmitRing::new(3, 2);
//! ring.push(1);
//! assert_eq!(ring.push(2), Some(FillAdvance::Advanced));
//! assert_eq!(ring.pending(), Some(&[1u8, 2][..]));
//! ring.confirm_sent();
//! assert!(ring.pending().is_none());
//! ```

// ---------------------------------------------------------------------------
// FillAdvance
// ---------------------------------------------------------------------------

/// Result of completing the slot under `fill`.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum FillAdvance {
    /// `fill` moved to a free slot.
    Advanced,
    /// The ring was exhausted and a slot was discarded.  Reported on the
    /// first overwrite and once per further lap of the ring.
    Overflowed,
    /// Another overwrite within the same lap.
    OverflowLatched,
}

// ---------------------------------------------------------------------------
// TransmitRing
// ---------------------------------------------------------------------------

/// Producer/consumer ring of fixed-size byte slots.
pub struct TransmitRing {
    slots: Vec<Box<[u8]>>,
    slot_len: usize,
    fill: usize,
    drain: usize,
    /// Bytes written into the slot under `fill`.
    cursor: usize,
    /// Bytes of the `drain` slot already handed to the transport.
    sent: usize,
    /// Slots completed since the last counted overflow; `None` while no
    /// overflow is latched.
    since_overflow: Option<usize>,
}

impl TransmitRing {
    /// Create a ring of `slot_count` slots, `slot_len` bytes each.
    ///
    /// # Panics
    ///
    /// Panics if `slot_count < 2` or `slot_len == 0`.
    pub fn new(slot_count: usize, slot_len: usize) -> Self {
        assert!(slot_count >= 2, "TransmitRing needs at least 2 slots");
        assert!(slot_len > 0, "TransmitRing slot length must be > 0");
        Self {
            slots: (0..slot_count)
                .map(|_| vec![0u8; slot_len].into_boxed_slice())
                .collect(),
            slot_len,
            fill: 0,
            drain: 0,
            cursor: 0,
            sent: 0,
            since_overflow: None,
        }
    }

    /// Append one byte to the slot under `fill`.
    ///
    /// Returns `Some` when this byte completed the slot and `fill` moved on.
    pub fn push(&mut self, byte: u8) -> Option<FillAdvance> {
        self.slots[self.fill][self.cursor] = byte;
        self.cursor += 1;
        if self.cursor < self.slot_len {
            return None;
        }
        self.cursor = 0;
        Some(self.advance_fill())
    }

    /// Close the slot under `fill` and move to the next one.
    pub fn advance_fill(&mut self) -> FillAdvance {
        let next = (self.fill + 1) % self.slots.len();
        self.cursor = 0;

        if next != self.drain {
            self.fill = next;
            return FillAdvance::Advanced;
        }

        if self.sent == 0 {
            // Exhausted: drop the oldest unsent slot.
            self.fill = next;
            self.drain = (self.drain + 1) % self.slots.len();
        }
        // Otherwise the drain slot is in flight: `fill` stays and the slot
        // just completed is rewritten.

        match self.since_overflow {
            Some(n) if n + 1 < self.slots.len() => {
                self.since_overflow = Some(n + 1);
                FillAdvance::OverflowLatched
            }
            _ => {
                self.since_overflow = Some(0);
                FillAdvance::Overflowed
            }
        }
    }

    /// Unsent bytes of the oldest completed slot, if any is waiting.
    pub fn pending(&self) -> Option<&[u8]> {
        if self.fill == self.drain {
            None
        } else {
            Some(&self.slots[self.drain][self.sent..])
        }
    }

    /// Record that the first `n` bytes of [`pending`](Self::pending) went
    /// out.  Returns `true` once the whole slot has been delivered.
    pub fn record_sent(&mut self, n: usize) -> bool {
        if self.fill == self.drain {
            return false;
        }
        self.sent = (self.sent + n).min(self.slot_len);
        if self.sent < self.slot_len {
            return false;
        }
        self.confirm_sent();
        true
    }

    /// Mark the slot returned by [`pending`](Self::pending) as delivered.
    pub fn confirm_sent(&mut self) {
        if self.fill == self.drain {
            return;
        }
        self.drain = (self.drain + 1) % self.slots.len();
        self.sent = 0;
        self.since_overflow = None;
    }

    /// `true` while the `drain` slot is part-way out.
    pub fn in_flight(&self) -> bool {
        self.sent > 0
    }

    /// Number of completed slots waiting to be sent.
    pub fn backlog(&self) -> usize {
        (self.fill + self.slots.len() - self.drain) % self.slots.len()
    }

    /// Index of the slot being filled.
    pub fn fill_index(&self) -> usize {
        self.fill
    }

    /// Index of the next slot to send.
    pub fn drain_index(&self) -> usize {
        self.drain
    }

    /// Number of slots.
    pub fn slot_count(&self) -> usize {
        self.slots.len()
    }

    /// Bytes per slot.
    pub fn slot_len(&self) -> usize {
        self.slot_len
    }

    /// Reset both cursors and discard all buffered audio.
    pub fn clear(&mut self) {
        self.fill = 0;
        self.drain = 0;
        self.cursor = 0;
        self.sent = 0;
        self.since_overflow = None;
    }
}

// ---------------------------------------------------------------------------
// Tests
// ---------------------------------------------------------------------------

#[cfg(test)]
mod tests {
    use super::*;

    fn fill_slot(ring: &mut TransmitRing, byte: u8) -> FillAdvance {
        let mut result = None;
        for _ in 0..ring.slot_len() {
            result = ring.push(byte);
        }
        result.expect("slot completed")
    }

    // ---- Basic produce / consume -------------------------------------------

    #[test]
    fn partial_slot_is_not_pending() {
        let mut ring = TransmitRing::new(4, 3);
        assert_eq!(ring.push(1), None);
        assert_eq!(ring.push(2), None);
        assert!(ring.pending().is_none());
        assert_eq!(ring.push(3), Some(FillAdvance::Advanced));
        assert_eq!(ring.pending(), Some(&[1u8, 2, 3][..]));
    }

    #[test]
    fn slots_drain_in_order() {
        let mut ring = TransmitRing::new(4, 2);
        fill_slot(&mut ring, 0xA);
        fill_slot(&mut ring, 0xB);
        assert_eq!(ring.backlog(), 2);

        assert_eq!(ring.pending(), Some(&[0xA, 0xA][..]));
        ring.confirm_sent();
        assert_eq!(ring.pending(), Some(&[0xB, 0xB][..]));
        ring.confirm_sent();
        assert!(ring.pending().is_none());
        assert_eq!(ring.backlog(), 0);
    }

    #[test]
    fn confirm_on_empty_ring_is_ignored() {
        let mut ring = TransmitRing::new(2, 1);
        ring.confirm_sent();
        assert_eq!(ring.drain_index(), 0);
        assert_eq!(ring.fill_index(), 0);
    }

    // ---- Overflow ----------------------------------------------------------

    #[test]
    fn four_advances_on_three_slots_overflow_once() {
        let mut ring = TransmitRing::new(3, 1);
        let events: Vec<FillAdvance> = (0..4).map(|_| ring.advance_fill()).collect();

        let counted = events
            .iter()
            .filter(|e| **e == FillAdvance::Overflowed)
            .count();
        assert_eq!(counted, 1);
        assert_eq!(events[2], FillAdvance::Overflowed);
        assert_eq!(events[3], FillAdvance::OverflowLatched);
    }

    #[test]
    fn stalled_consumer_counts_one_overflow_per_lap() {
        let mut ring = TransmitRing::new(3, 1);
        let counted = (0..10)
            .map(|_| ring.advance_fill())
            .filter(|e| *e == FillAdvance::Overflowed)
            .count();
        assert_eq!(counted, 3);
    }

    #[test]
    fn overflow_discards_oldest_slot() {
        let mut ring = TransmitRing::new(3, 1);
        ring.push(1);
        ring.push(2);
        assert_eq!(ring.push(3), Some(FillAdvance::Overflowed));

        // slot holding `1` was dropped
        assert_eq!(ring.backlog(), 2);
        assert_eq!(ring.pending(), Some(&[2u8][..]));
        ring.confirm_sent();
        assert_eq!(ring.pending(), Some(&[3u8][..]));
    }

    #[test]
    fn latch_clears_after_successful_drain() {
        let mut ring = TransmitRing::new(3, 1);
        for _ in 0..3 {
            ring.advance_fill();
        }
        ring.confirm_sent();
        assert_eq!(ring.advance_fill(), FillAdvance::Advanced);
        assert_eq!(ring.advance_fill(), FillAdvance::Overflowed);
    }

    #[test]
    fn fill_never_runs_more_than_capacity_minus_one_ahead() {
        let mut ring = TransmitRing::new(5, 1);
        let mut overflows = 0;
        for step in 0..200 {
            if step % 7 == 0 {
                ring.confirm_sent();
            }
            if ring.advance_fill() == FillAdvance::Overflowed {
                overflows += 1;
            }
            assert!(ring.backlog() <= ring.slot_count() - 1);
            assert_ne!(ring.fill_index(), ring.drain_index());
        }
        assert!(overflows > 0);
    }

    // ---- Partial sends -----------------------------------------------------

    #[test]
    fn partial_send_resumes_from_offset() {
        let mut ring = TransmitRing::new(3, 4);
        for b in 1..=4 {
            ring.push(b);
        }
        assert!(!ring.record_sent(3));
        assert!(ring.in_flight());
        assert_eq!(ring.pending(), Some(&[4u8][..]));

        assert!(ring.record_sent(1));
        assert!(!ring.in_flight());
        assert!(ring.pending().is_none());
    }

    #[test]
    fn slot_in_flight_survives_exhaustion() {
        let mut ring = TransmitRing::new(3, 2);
        fill_slot(&mut ring, 1);
        fill_slot(&mut ring, 2);
        ring.record_sent(1);

        // ring is full and slot 0 is part-way out: the new slot is dropped
        assert_eq!(fill_slot(&mut ring, 3), FillAdvance::Overflowed);
        assert_eq!(ring.drain_index(), 0);
        assert_eq!(ring.fill_index(), 2);
        assert_eq!(ring.pending(), Some(&[1u8][..]));

        assert!(ring.record_sent(1));
        assert_eq!(ring.pending(), Some(&[2u8, 2][..]));
    }

    #[test]
    fn clear_resets_cursors() {
        let mut ring = TransmitRing::new(3, 2);
        fill_slot(&mut ring, 1);
        ring.push(9);
        ring.record_sent(1);
        ring.clear();
        assert!(ring.pending().is_none());
        assert!(!ring.in_flight());
        assert_eq!(ring.fill_index(), 0);
        assert_eq!(ring.push(5), None);
    }

    // ---- Panic guards ------------------------------------------------------

    #[test]
    #[should_panic(expected = "TransmitRing needs at least 2 slots")]
    fn single_slot_panics() {
        let _ = TransmitRing::new(1, 16);
    }

    #[test]
    #[should_panic(expected = "TransmitRing slot length must be > 0")]
    fn zero_slot_len_panics() {
        let _ = TransmitRing::new(4, 0);
    }
}
