//! Errors raised while preparing the delay engine.
//!
//! Only configuration problems are errors. Everything that can go wrong
//! once audio is streaming is either clamped (out-of-range parameters) or a
//! bug caught by a debug assertion (cursor arithmetic), because the audio
//! callback has no way to retry or report.

/// A configuration rejected by [`DelayEngine::prepare`](crate::engine::DelayEngine::prepare).
#[derive(Debug, Clone, PartialEq, thiserror::Error)]
pub enum ConfigurationError {
    /// Sample rate is zero, negative or not finite.
    #[error("invalid sample rate: {0} Hz")]
    InvalidSampleRate(f32),

    /// Maximum delay time is zero, negative or not finite.
    #[error("invalid maximum delay time: {0} s")]
    InvalidMaxDelay(f32),

    /// Smoothing time is negative or not finite.
    #[error("invalid delay smoothing time: {0} ms")]
    InvalidSmoothingTime(f32),

    /// Nothing to process.
    #[error("the delay needs at least one channel")]
    NoChannels,

    /// The host announced a zero-length maximum block.
    #[error("maximum block size must be at least one sample")]
    InvalidBlockSize,

    /// The maximum delay is shorter than two samples at this sample rate,
    /// leaving no room for even a one-sample delay.
    #[error("delay buffer of {capacity} samples is too short, at least 2 are needed")]
    BufferTooSmall { capacity: usize },
}
