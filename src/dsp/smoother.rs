//! # Delay-Time Smoother
//!
//! Turns a possibly discontinuous target delay length into a continuously
//! moving one. Jumping the read position straight to a new delay makes an
//! audible click (or a short pitch-shift chirp), so instead the delay
//! length slews there through a one-pole lowpass:
//!
//! ```text
//! y[n] = (1 - a) * target + a * y[n-1]
//! ```
//!
//! This is the same equation as a one-pole lowpass filter on audio, only
//! fed with a control value. The coefficient is derived from a time
//! constant `tau` (the time to cover ~63% of the remaining distance):
//!
//! ```text
//! a = e^(-1 / (tau_seconds * sample_rate))
//! ```
//!
//! Because every step is a convex blend of the previous value and the
//! target, the output approaches the target monotonically and never
//! overshoots it.
//!
//! The state is `f64`: delay lengths reach ~10^5 samples, where `f32` no
//! longer resolves the tiny final steps and the smoother would stall just
//! short of its target.

/// Distance (in samples) below which the smoother snaps onto its target.
const SNAP_EPSILON: f64 = 1e-6;

/// Exponential smoother for a delay length in samples.
#[derive(Debug, Clone)]
pub struct DelaySmoother {
    /// Pole of the one-pole lowpass. 0.0 means no smoothing at all.
    coefficient: f64,

    /// The value returned by the most recent [`next()`](Self::next).
    current: f64,

    target: f64,
}

impl DelaySmoother {
    /// Create a smoother resting at zero with smoothing disabled.
    pub fn new() -> Self {
        Self {
            coefficient: 0.0,
            current: 0.0,
            target: 0.0,
        }
    }

    /// Set the time constant. A non-positive (or non-finite) time disables
    /// smoothing so that every target is reached on the next step.
    pub fn set_time_constant(&mut self, time_ms: f32, sample_rate: f32) {
        let samples = f64::from(time_ms) * f64::from(sample_rate) / 1000.0;

        self.coefficient = if samples.is_finite() && samples > 0.0 {
            (-1.0 / samples).exp()
        } else {
            0.0
        };
    }

    pub fn set_target(&mut self, target: f64) {
        self.target = target;
    }

    /// Jump straight to `value` with no slew. Used when the engine is
    /// (re)started, where there is no previous delay to glide from.
    pub fn snap_to(&mut self, value: f64) {
        self.current = value;
        self.target = value;
    }

    /// Advance by exactly one sample and return the new value.
    ///
    /// Call this once per processed sample; calling it twice for the same
    /// sample makes the slew run at double speed.
    pub fn next(&mut self) -> f64 {
        let previous = self.current;
        let target = self.target;

        let next = (1.0 - self.coefficient) * target + self.coefficient * previous;

        self.current = if (target - next).abs() < SNAP_EPSILON {
            target
        } else {
            // Rounding must not carry the value past the target.
            next.clamp(previous.min(target), previous.max(target))
        };
        self.current
    }

    pub fn current(&self) -> f64 {
        self.current
    }

    pub fn target(&self) -> f64 {
        self.target
    }

    pub fn is_settled(&self) -> bool {
        self.current == self.target
    }

    /// Return to rest at zero. The coefficient is kept.
    pub fn reset(&mut self) {
        self.snap_to(0.0);
    }
}

impl Default for DelaySmoother {
    fn default() -> Self {
        Self::new()
    }
}

// ─────────────────────────────────────────────────────────────────────
// Tests
// ─────────────────────────────────────────────────────────────────────
