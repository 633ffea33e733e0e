//! # Delay Engine
//!
//! Owns the circular buffer, one delay-time smoother per channel and the
//! per-block control ramps, and runs the block processor over them.
//!
//! ## Lifecycle
//!
//! - [`prepare()`](DelayEngine::prepare): off the audio thread. Validates
//!   the configuration and allocates the buffer for
//!   `ceil(sample_rate * max_delay_seconds)` samples per channel.
//! - [`process()`](DelayEngine::process): the real-time callback. Never
//!   allocates, locks or logs.
//! - [`reset()`](DelayEngine::reset): silence the history and flatten the
//!   smoother and ramps (host reset, stream restart).
//! - [`release()`](DelayEngine::release): drop the buffer.
//!
//! ## Per-sample order
//!
//! For each channel, for each sample:
//!
//! ```text
//! delay    = smoother.next()
//! read_pos = (write_pos - delay) mod capacity
//! delayed  = buffer[read_pos]                       (interpolated)
//! buffer[write_pos] = dry + feedback * delayed      (overwrite)
//! out      = (dry * (1 - mix) + delayed * mix) * gain * phase
//! ```
//!
//! The cursor itself only advances once the whole block is done; the
//! per-sample write position is `cursor + i`. Processing sample by sample
//! matters when the delay is shorter than the block: the read for sample
//! `i` may land on a slot this same block wrote at sample `i - delay`, and
//! it must see that value (the recirculated echo), which a
//! copy-whole-block-in, copy-whole-block-out scheme would get wrong.

use std::num::NonZeroUsize;

use nih_plug::{nih_debug_assert, nih_log};

use crate::dsp::delay_buffer::{CircularDelayBuffer, WriteMode};
use crate::dsp::smoother::DelaySmoother;
use crate::error::ConfigurationError;
use crate::params::{ParamSnapshot, MAX_DELAY_MS};

/// Shortest delay the read head may sit at. Anything shorter would
/// interpolate against the slot that is about to be written this sample.
const MIN_DELAY_SAMPLES: f64 = 1.0;

/// Feedback at or above this never decays by 60 dB in a reasonable time.
const ENDLESS_FEEDBACK: f32 = 0.999;

/// Static engine configuration, fixed for the lifetime of a prepared engine.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct EngineConfig {
    /// Buffer length in seconds. Includes 100 ms of headroom over the
    /// longest delay the parameter allows.
    pub max_delay_seconds: f32,

    /// Time constant of the delay-time smoother.
    pub smoothing_ms: f32,
}

impl Default for EngineConfig {
    fn default() -> Self {
        Self {
            max_delay_seconds: MAX_DELAY_MS / 1000.0 + 0.1,
            smoothing_ms: 1.0,
        }
    }
}

/// A control value interpolated linearly across one block, from where the
/// previous block ended to this block's target.
#[derive(Debug, Clone, Copy, PartialEq)]
struct BlockRamp {
    start: f32,
    end: f32,
}

impl BlockRamp {
    const fn flat(value: f32) -> Self {
        Self {
            start: value,
            end: value,
        }
    }

    fn retarget(&mut self, target: f32) {
        self.start = self.end;
        self.end = target;
    }

    /// Value at sample `index` of a `len` sample block. Reaches `end` on
    /// the last sample.
    fn at(&self, index: usize, len: usize) -> f32 {
        if self.start == self.end {
            return self.end;
        }
        self.start + (self.end - self.start) * ((index + 1) as f32 / len as f32)
    }
}

#[derive(Debug, Clone, Copy)]
struct Ramps {
    feedback: BlockRamp,
    mix: BlockRamp,
    output_gain: BlockRamp,
}

/// The circular delay-line engine.
#[derive(Debug)]
pub struct DelayEngine {
    config: EngineConfig,
    sample_rate: f32,
    max_block_size: usize,

    /// `None` until prepared, and again after `release()`.
    buffer: Option<CircularDelayBuffer>,

    /// One per channel, so each is advanced exactly once per sample.
    smoothers: Vec<DelaySmoother>,

    ramps: Ramps,

    /// Cleared by `prepare()`/`reset()`. The first block afterwards snaps
    /// the smoothers and ramps onto its parameters instead of gliding in
    /// from zero.
    primed: bool,
}

impl Default for DelayEngine {
    fn default() -> Self {
        Self::new(EngineConfig::default())
    }
}

impl DelayEngine {
    pub fn new(config: EngineConfig) -> Self {
        Self {
            config,
            // Placeholder until prepare() is told the real rate.
            sample_rate: 44100.0,
            max_block_size: 0,
            buffer: None,
            smoothers: Vec::new(),
            ramps: Ramps {
                feedback: BlockRamp::flat(0.0),
                mix: BlockRamp::flat(0.0),
                output_gain: BlockRamp::flat(1.0),
            },
            primed: false,
        }
    }

    /// Validate the stream configuration and (re)allocate the buffer.
    ///
    /// Must complete before the first `process()` call. Calling it again,
    /// e.g. after a sample-rate change, discards all history. On error the
    /// engine is left unprepared and passes audio through.
    pub fn prepare(
        &mut self,
        sample_rate: f32,
        max_block_size: usize,
        num_channels: usize,
    ) -> Result<(), ConfigurationError> {
        self.release();

        if !sample_rate.is_finite() || sample_rate <= 0.0 {
            return Err(ConfigurationError::InvalidSampleRate(sample_rate));
        }
        let max_delay = self.config.max_delay_seconds;
        if !max_delay.is_finite() || max_delay <= 0.0 {
            return Err(ConfigurationError::InvalidMaxDelay(max_delay));
        }
        let smoothing = self.config.smoothing_ms;
        if !smoothing.is_finite() || smoothing < 0.0 {
            return Err(ConfigurationError::InvalidSmoothingTime(smoothing));
        }
        if num_channels == 0 {
            return Err(ConfigurationError::NoChannels);
        }
        if max_block_size == 0 {
            return Err(ConfigurationError::InvalidBlockSize);
        }

        // Blocks longer than the ring are split in process(), so only the
        // ring itself bounds the capacity.
        let capacity = buffer_capacity(sample_rate, max_delay);
        let capacity = match NonZeroUsize::new(capacity) {
            Some(capacity) if capacity.get() >= 2 => capacity,
            _ => return Err(ConfigurationError::BufferTooSmall { capacity }),
        };

        self.sample_rate = sample_rate;
        self.max_block_size = max_block_size;
        self.buffer = Some(CircularDelayBuffer::new(num_channels, capacity));
        self.smoothers = (0..num_channels)
            .map(|_| {
                let mut smoother = DelaySmoother::new();
                smoother.set_time_constant(smoothing, sample_rate);
                smoother
            })
            .collect();
        self.primed = false;

        nih_log!(
            "delay engine prepared: {sample_rate} Hz, {num_channels} channel(s), \
             {} sample buffer, blocks up to {max_block_size}",
            capacity.get()
        );
        Ok(())
    }

    /// Silence the history and rewind the cursor. The next block starts
    /// from its own parameters with no glide. Real-time safe.
    pub fn reset(&mut self) {
        if let Some(buffer) = self.buffer.as_mut() {
            buffer.clear();
        }
        for smoother in &mut self.smoothers {
            smoother.reset();
        }
        self.primed = false;
    }

    /// Free the buffer. Until the next `prepare()` audio passes through.
    pub fn release(&mut self) {
        if self.buffer.take().is_some() {
            nih_log!("delay engine released");
        }
        self.smoothers = Vec::new();
        self.primed = false;
    }

    pub fn is_prepared(&self) -> bool {
        self.buffer.is_some()
    }

    pub fn sample_rate(&self) -> f32 {
        self.sample_rate
    }

    pub fn max_block_size(&self) -> usize {
        self.max_block_size
    }

    /// Buffer length in samples per channel, 0 when unprepared.
    pub fn capacity(&self) -> usize {
        self.buffer.as_ref().map_or(0, CircularDelayBuffer::capacity)
    }

    /// The delay the read head is currently at, after smoothing. Meant for
    /// display; lags the parameter while a change is gliding in.
    pub fn effective_delay_ms(&self) -> f32 {
        self.smoothers
            .first()
            .map_or(0.0, |s| (s.current() * 1000.0 / f64::from(self.sample_rate)) as f32)
    }

    /// How many samples the echoes keep ringing after the input stops,
    /// until they have decayed by 60 dB. `None` when `feedback` is high
    /// enough that they effectively never do.
    pub fn tail_samples(&self, feedback: f32) -> Option<u32> {
        if feedback >= ENDLESS_FEEDBACK {
            return None;
        }
        let delay_samples = self.smoothers.first().map_or(0.0, DelaySmoother::target) as f32;

        // feedback^N = 0.001 (-60 dB)  →  N = log10(0.001) / log10(feedback)
        let tail = if feedback > 0.001 {
            let repeats = -3.0 / feedback.log10();
            repeats * delay_samples
        } else {
            delay_samples
        };
        Some(tail.ceil() as u32)
    }

    /// Process one block in place. `channels[c][i]` is sample `i` of
    /// channel `c`; all channels are expected to share one length.
    ///
    /// Channels beyond the prepared count are left untouched.
    pub fn process(&mut self, channels: &mut [&mut [f32]], params: &ParamSnapshot) {
        let params = params.sanitized();
        let Some(buffer) = self.buffer.as_mut() else {
            return;
        };

        let capacity = buffer.capacity();
        let target = delay_ms_to_samples(params.delay_ms, self.sample_rate)
            .clamp(MIN_DELAY_SAMPLES, (capacity - 1) as f64);
        let output_gain = params.output_gain();

        if self.primed {
            self.ramps.feedback.retarget(params.feedback);
            self.ramps.mix.retarget(params.mix);
            self.ramps.output_gain.retarget(output_gain);
            for smoother in &mut self.smoothers {
                smoother.set_target(target);
            }
        } else {
            self.ramps = Ramps {
                feedback: BlockRamp::flat(params.feedback),
                mix: BlockRamp::flat(params.mix),
                output_gain: BlockRamp::flat(output_gain),
            };
            for smoother in &mut self.smoothers {
                smoother.snap_to(target);
            }
            self.primed = true;
        }

        let num_samples = channels.iter().map(|c| c.len()).min().unwrap_or(0);
        nih_debug_assert!(
            channels.iter().all(|c| c.len() == num_samples),
            "channel lengths differ within one block"
        );

        // A block longer than the ring would lap its own writes, so it is
        // cut into capacity-sized pieces with the cursor advanced between
        // them. At the default buffer length that only happens for blocks
        // above two seconds.
        let mut start = 0;
        while start < num_samples {
            let len = (num_samples - start).min(capacity);

            for (channel, samples) in channels.iter_mut().enumerate() {
                let Some(smoother) = self.smoothers.get_mut(channel) else {
                    continue;
                };
                let block = &mut samples[start..start + len];

                if params.bypass {
                    bypass_channel(buffer, smoother, channel, block);
                } else {
                    process_channel(
                        buffer,
                        smoother,
                        channel,
                        block,
                        &self.ramps,
                        start,
                        num_samples,
                    );
                }
            }

            buffer.advance(len);
            start += len;
        }
    }
}

/// Run the delay over one channel's slice of the block.
///
/// `offset` is where `samples` starts within a block of `block_len`
/// samples, so the control ramps line up across sub-blocks.
fn process_channel(
    buffer: &mut CircularDelayBuffer,
    smoother: &mut DelaySmoother,
    channel: usize,
    samples: &mut [f32],
    ramps: &Ramps,
    offset: usize,
    block_len: usize,
) {
    let capacity = buffer.capacity() as f64;

    for (i, sample) in samples.iter_mut().enumerate() {
        let feedback = ramps.feedback.at(offset + i, block_len);
        let mix = ramps.mix.at(offset + i, block_len);
        let output_gain = ramps.output_gain.at(offset + i, block_len);

        let delay = smoother.next();

        let mut read_pos = buffer.write_position(i) as f64 - delay;
        if read_pos < 0.0 {
            read_pos += capacity;
        }

        let mut delayed = 0.0;
        buffer.read(channel, read_pos, std::slice::from_mut(&mut delayed), 1.0, 1.0);

        // Feedback goes in at write time: what is stored now includes part
        // of what was read now, so it comes round again `delay` later. The
        // dry path below never passes through the buffer.
        let dry = *sample;
        buffer.write(channel, i, &[dry + feedback * delayed], WriteMode::Overwrite);

        *sample = (dry * (1.0 - mix) + delayed * mix) * output_gain;
    }
}

/// Bypassed channels keep their history coherent: the dry input is still
/// recorded (without feedback) and the smoother keeps pace, so re-enabling
/// picks up from real audio instead of stale echoes.
fn bypass_channel(
    buffer: &mut CircularDelayBuffer,
    smoother: &mut DelaySmoother,
    channel: usize,
    samples: &[f32],
) {
    for _ in 0..samples.len() {
        smoother.next();
    }
    buffer.write(channel, 0, samples, WriteMode::Overwrite);
}

/// `delay_samples = delay_ms * sample_rate / 1000`
pub const fn delay_ms_to_samples(delay_ms: f32, sample_rate: f32) -> f64 {
    delay_ms as f64 * sample_rate as f64 / 1000.0
}

fn buffer_capacity(sample_rate: f32, max_delay_seconds: f32) -> usize {
    (f64::from(sample_rate) * f64::from(max_delay_seconds)).ceil() as usize
}

// ─────────────────────────────────────────────────────────────────────
// Tests
// ─────────────────────────────────────────────────────────────────────
