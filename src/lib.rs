//! # Loveless Delay II: A Circular Delay-Line Plugin
//!
//! An AU/VST3/CLAP delay built with [nih-plug](https://github.com/robbert-vdh/nih-plug).
//! A single delay tap with feedback, a dry/wet mix, output gain and a
//! polarity switch, running sample by sample so delay times shorter than
//! the host's block size stay correct.
//!
//! ## Signal Flow
//!
//! ```text
//! Input ──┬────────────────────────────── × (1 - mix) ─────┐
//!         │                                                │
//!         │    ┌────────────────────────────────────┐      │
//!         │    │           FEEDBACK LOOP            │      │
//!         └──►(+)──► [Circular Delay Buffer] ──┐    │      │
//!              ▲      read head at              │    │      │
//!              │      cursor - smoothed delay   │    │      │
//!              │                                ▼    │      │
//!              └──────────── × feedback ◄── delayed  │      │
//!                                               │           │
//!                                               └─ × mix ──(+)──► × gain × ±1 ──► Output
//! ```
//!
//! The DSP lives in [`engine`] and [`dsp`]; this file is only the glue
//! between nih-plug's plugin lifecycle and [`engine::DelayEngine`].

pub mod dsp;
pub mod engine;
pub mod error;
pub mod params;

use std::num::NonZeroU32;
use std::sync::Arc;

use engine::DelayEngine;
use nih_plug::prelude::*;
use params::PluginParams;

/// The plugin: shared parameters plus the engine the audio thread owns.
///
/// Parameters are shared with the host and UI through an `Arc` and read
/// atomically. The engine, and the delay buffer inside it, is touched only
/// from the plugin's lifecycle callbacks and never shared across threads.
struct LovelessDelay {
    params: Arc<PluginParams>,
    engine: DelayEngine,
}

impl Default for LovelessDelay {
    fn default() -> Self {
        Self {
            params: Arc::new(PluginParams::default()),
            // Unprepared until initialize() knows the sample rate and
            // channel count.
            engine: DelayEngine::default(),
        }
    }
}

impl Plugin for LovelessDelay {
    const NAME: &'static str = "Loveless Delay II";
    const VENDOR: &'static str = "Loveless Audio";
    const URL: &'static str = "";
    const EMAIL: &'static str = "steve.loveless@gmail.com";
    const VERSION: &'static str = env!("CARGO_PKG_VERSION");

    // Input and output channel counts always match; stereo first because
    // most DAW tracks are stereo.
    const AUDIO_IO_LAYOUTS: &'static [AudioIOLayout] = &[
        AudioIOLayout {
            main_input_channels: NonZeroU32::new(2),
            main_output_channels: NonZeroU32::new(2),
            aux_input_ports: &[],
            aux_output_ports: &[],
            names: PortNames::const_default(),
        },
        AudioIOLayout {
            main_input_channels: NonZeroU32::new(1),
            main_output_channels: NonZeroU32::new(1),
            aux_input_ports: &[],
            aux_output_ports: &[],
            names: PortNames::const_default(),
        },
    ];

    const MIDI_INPUT: MidiConfig = MidiConfig::None;

    // Parameters are pulled once per block; splitting blocks at automation
    // points would only shorten the ramps.
    const SAMPLE_ACCURATE_AUTOMATION: bool = false;

    type SysExMessage = ();
    type BackgroundTask = ();

    fn params(&self) -> Arc<dyn Params> {
        self.params.clone()
    }

    /// Called off the audio thread whenever the sample rate, block size or
    /// layout changes. This is the only place the delay buffer is
    /// allocated. Returning `false` makes the host reject the configuration.
    fn initialize(
        &mut self,
        audio_io_layout: &AudioIOLayout,
        buffer_config: &BufferConfig,
        _context: &mut impl InitContext<Self>,
    ) -> bool {
        let num_channels = audio_io_layout
            .main_output_channels
            .map(|c| c.get() as usize)
            .unwrap_or(2);

        match self.engine.prepare(
            buffer_config.sample_rate,
            buffer_config.max_buffer_size as usize,
            num_channels,
        ) {
            Ok(()) => true,
            Err(err) => {
                nih_error!("cannot run with this configuration: {err}");
                false
            }
        }
    }

    /// Transport restart or host-initiated reset: drop all echoes.
    fn reset(&mut self) {
        self.engine.reset();
    }

    fn deactivate(&mut self) {
        self.engine.release();
    }

    fn process(
        &mut self,
        buffer: &mut Buffer,
        _aux: &mut AuxiliaryBuffers,
        _context: &mut impl ProcessContext<Self>,
    ) -> ProcessStatus {
        let snapshot = self.params.snapshot();
        self.engine.process(buffer.as_slice(), &snapshot);

        if snapshot.bypass {
            return ProcessStatus::Normal;
        }

        // Keep being called after the input goes quiet until the echoes
        // have died away, or forever if they never do.
        match self.engine.tail_samples(snapshot.sanitized().feedback) {
            Some(tail) => ProcessStatus::Tail(tail),
            None => ProcessStatus::KeepAlive,
        }
    }
}

// ─────────────────────────────────────────────────────────────────────
// Plugin format trait implementations
// ─────────────────────────────────────────────────────────────────────

impl ClapPlugin for LovelessDelay {
    const CLAP_ID: &'static str = "com.loveless-audio.loveless-delay-v2";
    const CLAP_DESCRIPTION: Option<&'static str> =
        Some("A circular delay line with feedback, mix, gain and phase");
    const CLAP_MANUAL_URL: Option<&'static str> = None;
    const CLAP_SUPPORT_URL: Option<&'static str> = None;
    const CLAP_FEATURES: &'static [ClapFeature] = &[
        ClapFeature::AudioEffect,
        ClapFeature::Stereo,
        ClapFeature::Mono,
        ClapFeature::Delay,
    ];
}

impl Vst3Plugin for LovelessDelay {
    const VST3_CLASS_ID: [u8; 16] = *b"LvlssDelay__v002";
    const VST3_SUBCATEGORIES: &'static [Vst3SubCategory] =
        &[Vst3SubCategory::Fx, Vst3SubCategory::Delay];
}

// ─────────────────────────────────────────────────────────────────────
// Export macros
// ─────────────────────────────────────────────────────────────────────
//
// `clap_entry` for CLAP hosts, `GetPluginFactory` for VST3 hosts, and an
// AUv2 factory generated by clap-wrapper from the CLAP entry for Logic Pro.

nih_export_clap!(LovelessDelay);
nih_export_vst3!(LovelessDelay);
clap_wrapper::export_auv2!();
