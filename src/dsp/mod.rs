//! # DSP Primitives
//!
//! - **`delay_buffer`**: the multi-channel ring of past samples, with
//!   wraparound-safe block writes and interpolated, gain-ramped reads.
//!
//! - **`smoother`**: a one-pole smoother that glides the delay length
//!   toward its target so the read head never jumps.

pub mod delay_buffer;
pub mod smoother;
