//! # Circular Delay Buffer
//!
//! A fixed-capacity, multi-channel ring store of past samples. All channels
//! share one write cursor, which is the single source of truth for "now":
//! it always points one slot past the most recently written sample, so
//! reading `delay` slots behind it yields the sample written `delay`
//! samples ago.
//!
//! ## Wraparound
//!
//! A run of `n` samples starting at index `start` fits contiguously when
//! `start + n <= capacity`. Otherwise it is split in two segments:
//!
//! ```text
//!   capacity = 8, start = 6, n = 4
//!
//!   index:  0   1   2   3   4   5   6   7
//!         [ c | d |   |   |   |   | a | b ]
//!           ^^^^^^^ second segment  ^^^^^^^ first segment
//! ```
//!
//! Both [`write`](CircularDelayBuffer::write) and
//! [`read`](CircularDelayBuffer::read) walk their run segment by segment
//! rather than taking a modulo per sample.
//!
//! ## Fractional reads
//!
//! Read positions are fractional. For position `p`, the two stored samples
//! at `floor(p)` (older) and `floor(p) + 1` (newer) are blended:
//!
//! ```text
//! result = older * (1 - frac) + newer * frac
//! ```
//!
//! Without this the delay time would snap between whole samples while the
//! smoother slews it, producing zipper noise.

use std::num::NonZeroUsize;

/// How [`CircularDelayBuffer::write`] combines incoming samples with the
/// samples already stored.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum WriteMode {
    /// Replace the stored samples.
    Overwrite,
    /// Add to the stored samples. Used to inject a signal into slots that
    /// other reads in the same block may still need.
    Accumulate,
}

/// A ring buffer of past samples, one lane per channel.
///
/// The storage is allocated once in [`new()`](Self::new) and never resized,
/// so nothing on the audio thread touches the allocator.
#[derive(Debug, Clone)]
pub struct CircularDelayBuffer {
    /// One zero-initialized lane of `capacity` samples per channel.
    storage: Vec<Vec<f32>>,

    /// Cached lane length. Kept separately so the index arithmetic reads
    /// the same for every channel.
    capacity: usize,

    /// Index one past the most recently written sample. Always in
    /// `[0, capacity)`.
    write_cursor: usize,
}

impl CircularDelayBuffer {
    /// Allocate `num_channels` silent lanes of `capacity` samples each.
    ///
    /// `NonZeroUsize` rules out an empty ring, which would make every
    /// modulo in here a division by zero.
    pub fn new(num_channels: usize, capacity: NonZeroUsize) -> Self {
        let capacity = capacity.get();
        Self {
            storage: (0..num_channels).map(|_| vec![0.0; capacity]).collect(),
            capacity,
            write_cursor: 0,
        }
    }

    pub fn capacity(&self) -> usize {
        self.capacity
    }

    pub fn write_cursor(&self) -> usize {
        self.write_cursor
    }

    /// The ring index `offset` samples after the write cursor.
    pub fn write_position(&self, offset: usize) -> usize {
        (self.write_cursor + offset) % self.capacity
    }

    /// Write `samples` into `channel`, starting `offset` samples after the
    /// write cursor.
    ///
    /// The cursor is **not** advanced; call [`advance()`](Self::advance)
    /// once per block after every read and write for that block has been
    /// issued. Runs longer than the capacity lap the ring, so only the last
    /// `capacity` samples survive an [`Overwrite`](WriteMode::Overwrite).
    pub fn write(&mut self, channel: usize, offset: usize, samples: &[f32], mode: WriteMode) {
        let mut index = self.write_position(offset);
        let Some(lane) = self.storage.get_mut(channel) else {
            return;
        };

        let mut remaining = samples;
        while !remaining.is_empty() {
            let len = remaining.len().min(self.capacity - index);
            let (segment, rest) = remaining.split_at(len);
            let target = &mut lane[index..index + len];

            match mode {
                WriteMode::Overwrite => target.copy_from_slice(segment),
                WriteMode::Accumulate => {
                    for (stored, &incoming) in target.iter_mut().zip(segment) {
                        *stored += incoming;
                    }
                }
            }

            index = 0;
            remaining = rest;
        }
    }

    /// Read `dest.len()` interpolated samples from `channel`, beginning at
    /// the fractional ring position `position`, and **add** them into
    /// `dest`.
    ///
    /// The gain applied to the read ramps linearly: sample `k` of `n` is
    /// scaled by `gain_start + (gain_end - gain_start) * (k + 1) / n`, so
    /// the last sample lands on `gain_end` and the next block's ramp picks
    /// up from there. A single sample read therefore uses `gain_end`.
    ///
    /// `position` must lie in `[0, capacity)`. Anything else is a bug in
    /// the caller's cursor arithmetic: debug builds panic, release builds
    /// clamp the position into range instead of reading garbage.
    pub fn read(
        &self,
        channel: usize,
        position: f64,
        dest: &mut [f32],
        gain_start: f32,
        gain_end: f32,
    ) {
        let Some(lane) = self.storage.get(channel) else {
            return;
        };
        if dest.is_empty() {
            return;
        }

        let position = self.checked_read_position(position);
        let base = position.floor();
        let frac = (position - base) as f32;

        let gain_step = (gain_end - gain_start) / dest.len() as f32;
        let mut gain = gain_start + gain_step;
        let mut index = base as usize;

        let mut remaining = dest;
        while !remaining.is_empty() {
            let len = remaining.len().min(self.capacity - index);
            let (segment, rest) = remaining.split_at_mut(len);
            read_segment(lane, index, frac, segment, gain, gain_step);

            gain += gain_step * len as f32;
            index = 0;
            remaining = rest;
        }
    }

    /// Move the write cursor forward by `n` samples, wrapping at capacity.
    pub fn advance(&mut self, n: usize) {
        self.write_cursor = (self.write_cursor + n) % self.capacity;
    }

    /// Silence every lane and rewind the cursor.
    pub fn clear(&mut self) {
        for lane in &mut self.storage {
            lane.fill(0.0);
        }
        self.write_cursor = 0;
    }

    fn checked_read_position(&self, position: f64) -> f64 {
        let capacity = self.capacity as f64;
        let in_range = (0.0..capacity).contains(&position);
        debug_assert!(in_range, "read position {position} outside [0, {capacity})");

        if in_range {
            position
        } else if position.is_nan() {
            0.0
        } else {
            position.clamp(0.0, capacity - 1.0)
        }
    }
}

/// Interpolate one contiguous run starting at `start`. The newer neighbour
/// of the last slot in the lane is slot 0.
fn read_segment(
    lane: &[f32],
    start: usize,
    frac: f32,
    dest: &mut [f32],
    gain: f32,
    gain_step: f32,
) {
    let capacity = lane.len();

    for (k, out) in dest.iter_mut().enumerate() {
        let index_a = start + k;
        let index_b = if index_a + 1 == capacity { 0 } else { index_a + 1 };

        let sample = lane[index_a] * (1.0 - frac) + lane[index_b] * frac;
        *out += sample * (gain + gain_step * k as f32);
    }
}

// ─────────────────────────────────────────────────────────────────────
// Tests
// ─────────────────────────────────────────────────────────────────────

#[cfg(test)]
mod tests {
    use super::*;
    use proptest::prelude::*;

    fn buffer(num_channels: usize, capacity: usize) -> CircularDelayBuffer {
        CircularDelayBuffer::new(num_channels, NonZeroUsize::new(capacity).unwrap())
    }

    /// Read `delay` samples behind the cursor with unity gain.
    fn read_behind(buf: &CircularDelayBuffer, channel: usize, delay: f64) -> f32 {
        let mut position = buf.write_cursor() as f64 - delay;
        if position < 0.0 {
            position += buf.capacity() as f64;
        }
        let mut out = 0.0;
        buf.read(channel, position, std::slice::from_mut(&mut out), 1.0, 1.0);
        out
    }

    #[test]
    fn test_write_and_read_exact() {
        let mut buf = buffer(1, 100);

        buf.write(0, 0, &[0.75], WriteMode::Overwrite);
        buf.advance(1);

        let result = read_behind(&buf, 0, 1.0);
        assert!((result - 0.75).abs() < 1e-6, "Expected 0.75, got {result}");
    }

    /// Reading halfway between two slots blends them equally.
    #[test]
    fn test_interpolation() {
        let mut buf = buffer(1, 100);

        buf.write(0, 0, &[0.0, 1.0], WriteMode::Overwrite);
        buf.advance(2);

        // Cursor is 2. Position 0.5 sits between slot 0 (0.0) and slot 1 (1.0).
        let result = read_behind(&buf, 0, 1.5);
        assert!((result - 0.5).abs() < 1e-6, "Expected 0.5, got {result}");

        // Position 0.25 is three quarters of the way to the older slot.
        let result = read_behind(&buf, 0, 1.75);
        assert!((result - 0.25).abs() < 1e-6, "Expected 0.25, got {result}");
    }

    /// A block that runs off the end of the ring continues at index 0.
    #[test]
    fn test_write_splits_at_wraparound() {
        let mut buf = buffer(1, 8);
        buf.advance(6);

        buf.write(0, 0, &[1.0, 2.0, 3.0, 4.0], WriteMode::Overwrite);

        let mut contents = [0.0; 8];
        buf.read(0, 0.0, &mut contents, 1.0, 1.0);
        assert_eq!(contents, [3.0, 4.0, 0.0, 0.0, 0.0, 0.0, 1.0, 2.0]);
    }

    /// The offset is relative to the cursor and wraps as well.
    #[test]
    fn test_write_offset_wraps() {
        let mut buf = buffer(1, 4);
        buf.advance(3);

        buf.write(0, 2, &[9.0], WriteMode::Overwrite);
        assert_eq!(buf.write_position(2), 1);

        let mut contents = [0.0; 4];
        buf.read(0, 0.0, &mut contents, 1.0, 1.0);
        assert_eq!(contents, [0.0, 9.0, 0.0, 0.0]);
    }

    #[test]
    fn test_accumulate_adds_to_existing() {
        let mut buf = buffer(1, 6);
        buf.advance(4);

        buf.write(0, 0, &[1.0, 1.0, 1.0], WriteMode::Overwrite);
        buf.write(0, 0, &[0.5, 0.25, 0.125], WriteMode::Accumulate);

        let mut contents = [0.0; 6];
        buf.read(0, 0.0, &mut contents, 1.0, 1.0);
        assert_eq!(contents, [1.125, 0.0, 0.0, 0.0, 1.5, 1.25]);
    }

    /// The cursor only moves on `advance()`, never on `write()`.
    #[test]
    fn test_write_does_not_advance() {
        let mut buf = buffer(2, 16);
        buf.write(0, 0, &[1.0; 5], WriteMode::Overwrite);
        buf.write(1, 3, &[1.0; 5], WriteMode::Accumulate);
        assert_eq!(buf.write_cursor(), 0);

        buf.advance(5);
        assert_eq!(buf.write_cursor(), 5);
        buf.advance(13);
        assert_eq!(buf.write_cursor(), 2);
    }

    /// Reads sum into the destination instead of replacing it.
    #[test]
    fn test_read_is_additive() {
        let mut buf = buffer(1, 8);
        buf.write(0, 0, &[1.0, 2.0], WriteMode::Overwrite);

        let mut dest = [10.0, 20.0];
        buf.read(0, 0.0, &mut dest, 1.0, 1.0);
        assert_eq!(dest, [11.0, 22.0]);
    }

    /// The read gain ramps from start to end across the run, not in a
    /// step, and reaches the end gain on the last sample.
    #[test]
    fn test_read_gain_ramp_is_linear() {
        let mut buf = buffer(1, 8);
        buf.write(0, 0, &[1.0; 4], WriteMode::Overwrite);

        let mut dest = [0.0; 4];
        buf.read(0, 0.0, &mut dest, 0.0, 1.0);
        for (k, &value) in dest.iter().enumerate() {
            let expected = (k + 1) as f32 * 0.25;
            assert!(
                (value - expected).abs() < 1e-6,
                "Sample {k}: expected {expected}, got {value}"
            );
        }
    }

    /// A fractional multi-sample read that crosses the end of the ring
    /// interpolates the last slot against slot 0 and keeps ramping the gain
    /// across the split.
    #[test]
    fn test_read_wraps_with_interpolation() {
        let mut buf = buffer(1, 4);
        buf.write(0, 0, &[0.0, 1.0, 2.0, 3.0], WriteMode::Overwrite);

        let mut dest = [0.0; 3];
        buf.read(0, 2.5, &mut dest, 2.0, 2.0);

        // 2.5 → (2+3)/2, 3.5 → (3+0)/2, 0.5 → (0+1)/2
        let expected = [5.0, 3.0, 1.0];
        for (got, want) in dest.iter().zip(expected) {
            assert!((got - want).abs() < 1e-6, "Expected {want}, got {got}");
        }
    }

    #[test]
    fn test_channels_are_independent() {
        let mut buf = buffer(2, 10);
        buf.write(0, 0, &[0.5], WriteMode::Overwrite);
        buf.write(1, 0, &[-0.5], WriteMode::Overwrite);
        buf.advance(1);

        assert!((read_behind(&buf, 0, 1.0) - 0.5).abs() < 1e-6);
        assert!((read_behind(&buf, 1, 1.0) + 0.5).abs() < 1e-6);
    }

    /// Unknown channels are ignored rather than panicking on the audio thread.
    #[test]
    fn test_unknown_channel_is_ignored() {
        let mut buf = buffer(1, 10);
        buf.write(3, 0, &[1.0], WriteMode::Overwrite);

        let mut dest = [0.25];
        buf.read(3, 0.0, &mut dest, 1.0, 1.0);
        assert_eq!(dest, [0.25]);
    }

    #[test]
    fn test_clear() {
        let mut buf = buffer(2, 10);
        buf.write(0, 0, &[0.5; 4], WriteMode::Overwrite);
        buf.write(1, 0, &[0.5; 4], WriteMode::Overwrite);
        buf.advance(4);
        buf.clear();

        assert_eq!(buf.write_cursor(), 0);
        for channel in 0..2 {
            let mut contents = [0.0; 10];
            buf.read(channel, 0.0, &mut contents, 1.0, 1.0);
            assert!(
                contents.iter().all(|s| *s == 0.0),
                "Expected silence after clear, got {contents:?}"
            );
        }
    }

    /// The ramp keeps its slope across the split at the end of the ring.
    #[test]
    fn test_read_gain_ramp_continues_across_wrap() {
        let mut buf = buffer(1, 4);
        buf.write(0, 0, &[1.0; 4], WriteMode::Overwrite);

        let mut dest = [0.0; 4];
        buf.read(0, 2.0, &mut dest, 1.0, 0.0);
        let expected = [0.75, 0.5, 0.25, 0.0];
        for (got, want) in dest.iter().zip(expected) {
            assert!((got - want).abs() < 1e-6, "Expected {want}, got {got}");
        }
    }

    /// Release builds keep streaming on a bad position: it is clamped to the
    /// nearest end of the ring, and NaN reads slot 0.
    #[test]
    #[cfg(not(debug_assertions))]
    fn test_out_of_range_read_is_clamped_in_release() {
        let mut buf = buffer(1, 10);
        buf.write(0, 0, &[0.1], WriteMode::Overwrite);
        buf.write(0, 9, &[0.9], WriteMode::Overwrite);

        let read_at = |position: f64| {
            let mut out = 0.0;
            buf.read(0, position, std::slice::from_mut(&mut out), 1.0, 1.0);
            out
        };

        assert_eq!(read_at(10.0), 0.9);
        assert_eq!(read_at(1e9), 0.9);
        assert_eq!(read_at(-3.0), 0.1);
        assert_eq!(read_at(f64::NAN), 0.1);
    }

    /// An out-of-range position is a cursor bug and fails fast in debug builds.
    #[test]
    #[cfg(debug_assertions)]
    #[should_panic(expected = "outside")]
    fn test_out_of_range_read_panics_in_debug() {
        let buf = buffer(1, 10);
        let mut out = 0.0;
        buf.read(0, 10.0, std::slice::from_mut(&mut out), 1.0, 1.0);
    }

    proptest! {
        /// Reading `d` slots behind the cursor returns exactly the value
        /// written `d` samples ago, for every `d` up to the capacity, across
        /// at least three full laps of the ring and with arbitrary block
        /// sizes (so writes regularly split at the wrap point).
        #[test]
        fn prop_wraparound_returns_value_written_d_ago(
            capacity in 2usize..64,
            block_sizes in prop::collection::vec(1usize..32, 1..16),
        ) {
            let mut buf = buffer(1, capacity);
            let mut history: Vec<f32> = Vec::new();

            let mut blocks = block_sizes.iter().cycle();
            while history.len() < capacity * 4 {
                let n = (*blocks.next().unwrap()).min(capacity);
                let block: Vec<f32> = (0..n).map(|i| (history.len() + i + 1) as f32).collect();

                buf.write(0, 0, &block, WriteMode::Overwrite);
                buf.advance(n);
                history.extend_from_slice(&block);

                for d in 1..=capacity.min(history.len()) {
                    let expected = history[history.len() - d];
                    let got = read_behind(&buf, 0, d as f64);
                    prop_assert_eq!(got, expected, "capacity {} delay {}", capacity, d);
                }
            }
        }
    }
}
