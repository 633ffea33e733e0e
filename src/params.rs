//! # Plugin Parameters
//!
//! The knobs the host sees. Each parameter has a stable string ID
//! (`#[id = "..."]`) used to save and recall sessions; once published these
//! never change.
//!
//! ## Reading parameters on the audio thread
//!
//! The host and UI write parameter values from their own threads. The
//! audio thread never waits on them: once per block it pulls a
//! [`ParamSnapshot`] through nih-plug's atomic `value()` loads. A value that
//! lands mid-block is picked up on the next block, which is fine; a
//! blocking read would not be.
//!
//! None of these parameters use nih-plug's smoothers. The engine smooths
//! delay time itself (the read position needs its own slew) and ramps
//! feedback, mix and gain across each block.

use nih_plug::prelude::*;

pub const MIN_DELAY_MS: f32 = 1.0;
pub const MAX_DELAY_MS: f32 = 2000.0;
pub const MIN_GAIN_DB: f32 = -96.0;
pub const MAX_GAIN_DB: f32 = 48.0;

const DEFAULT_DELAY_MS: f32 = 500.0;
const DEFAULT_FEEDBACK: f32 = 0.35;
const DEFAULT_MIX: f32 = 0.5;

/// All user-facing parameters of the delay.
#[derive(Params)]
pub struct PluginParams {
    /// **Delay Time**: distance between the dry signal and the first echo.
    ///
    /// The range reaches down to 1 ms so the delay can be shorter than a
    /// processing block; the engine processes sample by sample to stay
    /// correct there. Skewed so that most of the knob travel covers the
    /// short end, where small changes are most audible.
    #[id = "length"]
    pub delay_time: FloatParam,

    /// **Feedback**: how much of each echo is written back into the delay.
    ///
    /// 0% gives a single echo, 50% halves every repeat. At 100% echoes
    /// recirculate forever without decaying.
    #[id = "feedback"]
    pub feedback: FloatParam,

    /// **Dry / Wet**: 0% is the input only, 100% the delayed signal only.
    #[id = "mix"]
    pub mix: FloatParam,

    /// **Gain**: output level in decibels, applied after the mix.
    #[id = "gain"]
    pub gain: FloatParam,

    /// **Phase**: inverts the polarity of the output.
    #[id = "phase"]
    pub phase_invert: BoolParam,

    /// **Bypass**: passes the input through untouched. Registered as the
    /// host's bypass parameter so the DAW's own bypass button drives it.
    #[id = "bypass"]
    pub bypass: BoolParam,
}

impl Default for PluginParams {
    fn default() -> Self {
        Self {
            delay_time: FloatParam::new(
                "Delay Time",
                DEFAULT_DELAY_MS,
                FloatRange::Skewed {
                    min: MIN_DELAY_MS,
                    max: MAX_DELAY_MS,
                    factor: FloatRange::skew_factor(-1.5),
                },
            )
            .with_unit(" ms")
            .with_step_size(0.1),

            feedback: FloatParam::new(
                "Delay Feedback",
                DEFAULT_FEEDBACK,
                FloatRange::Linear { min: 0.0, max: 1.0 },
            )
            .with_unit("%")
            .with_value_to_string(formatters::v2s_f32_percentage(1))
            .with_string_to_value(formatters::s2v_f32_percentage()),

            mix: FloatParam::new(
                "Dry / Wet",
                DEFAULT_MIX,
                FloatRange::Linear { min: 0.0, max: 1.0 },
            )
            .with_unit("%")
            .with_value_to_string(formatters::v2s_f32_percentage(1))
            .with_string_to_value(formatters::s2v_f32_percentage()),

            gain: FloatParam::new(
                "Gain",
                0.0,
                FloatRange::Linear {
                    min: MIN_GAIN_DB,
                    max: MAX_GAIN_DB,
                },
            )
            .with_unit(" dB")
            .with_step_size(0.1),

            phase_invert: BoolParam::new("Phase", false),

            bypass: BoolParam::new("Bypass", false).make_bypass(),
        }
    }
}

impl PluginParams {
    /// Pull the current value of every parameter. Lock-free; called once
    /// per block from the audio thread.
    pub fn snapshot(&self) -> ParamSnapshot {
        ParamSnapshot {
            delay_ms: self.delay_time.value(),
            feedback: self.feedback.value(),
            mix: self.mix.value(),
            gain_db: self.gain.value(),
            phase_invert: self.phase_invert.value(),
            bypass: self.bypass.value(),
        }
    }
}

/// The parameter values the engine works from for one block.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct ParamSnapshot {
    pub delay_ms: f32,
    /// 0.0 ..= 1.0
    pub feedback: f32,
    /// 0.0 (dry) ..= 1.0 (wet)
    pub mix: f32,
    pub gain_db: f32,
    pub phase_invert: bool,
    pub bypass: bool,
}

impl Default for ParamSnapshot {
    fn default() -> Self {
        Self {
            delay_ms: DEFAULT_DELAY_MS,
            feedback: DEFAULT_FEEDBACK,
            mix: DEFAULT_MIX,
            gain_db: 0.0,
            phase_invert: false,
            bypass: false,
        }
    }
}

impl ParamSnapshot {
    /// Clamp every value into its valid range.
    ///
    /// Out-of-range values are never an error: the stream keeps running
    /// with the nearest valid value. NaN falls back to a neutral value.
    pub fn sanitized(&self) -> Self {
        Self {
            delay_ms: clamp_or(self.delay_ms, 0.0, MAX_DELAY_MS, MIN_DELAY_MS),
            feedback: clamp_or(self.feedback, 0.0, 1.0, 0.0),
            mix: clamp_or(self.mix, 0.0, 1.0, 0.0),
            gain_db: clamp_or(self.gain_db, MIN_GAIN_DB, MAX_GAIN_DB, 0.0),
            ..*self
        }
    }

    /// Output gain as a linear factor, including the polarity flip.
    pub fn output_gain(&self) -> f32 {
        let gain = util::db_to_gain(self.gain_db);
        if self.phase_invert {
            -gain
        } else {
            gain
        }
    }
}

fn clamp_or(value: f32, min: f32, max: f32, fallback: f32) -> f32 {
    if value.is_nan() {
        fallback
    } else {
        value.clamp(min, max)
    }
}
