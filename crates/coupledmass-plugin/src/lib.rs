// CoupledMass — mass-spring synthesizer with sympathetic strings (CLAP + VST3).

use coupledmass_dsp::engine::{Engine, EngineEvent};
use nih_plug::prelude::*;
use std::num::NonZeroU32;
use std::sync::Arc;

mod params;
use params::CoupledMassParams;

const DEFAULT_BLOCK_SIZE: usize = 8192;
const SUSTAIN_CC: u8 = 64;

/// Translate a host note event; anything the engine does not play is dropped.
fn engine_event(event: &PluginNoteEvent<CoupledMass>) -> Option<EngineEvent> {
    match event {
        NoteEvent::NoteOn { note, velocity, .. } => Some(EngineEvent::NoteOn {
            note: *note,
            velocity: *velocity as f64,
        }),
        NoteEvent::NoteOff { note, .. } => Some(EngineEvent::NoteOff { note: *note }),
        NoteEvent::MidiCC { cc, value, .. } if *cc == SUSTAIN_CC => {
            Some(EngineEvent::Sustain(*value >= 0.5))
        }
        _ => None,
    }
}

// ── Plugin ──────────────────────────────────────────────────────────────────

struct CoupledMass {
    params: Arc<CoupledMassParams>,

    // Built in `initialize` once the sample rate is known.
    engine: Option<Engine>,

    // Pre-allocated scratch buffers
    left_buf: Vec<f64>,
    right_buf: Vec<f64>,
}

impl Default for CoupledMass {
    fn default() -> Self {
        Self {
            params: Arc::new(CoupledMassParams::default()),
            engine: None,
            left_buf: vec![0.0; DEFAULT_BLOCK_SIZE],
            right_buf: vec![0.0; DEFAULT_BLOCK_SIZE],
        }
    }
}

impl Plugin for CoupledMass {
    const NAME: &'static str = "CoupledMass";
    const VENDOR: &'static str = "CoupledMass";
    const URL: &'static str = "";
    const EMAIL: &'static str = "";
    const VERSION: &'static str = env!("CARGO_PKG_VERSION");

    const AUDIO_IO_LAYOUTS: &'static [AudioIOLayout] = &[AudioIOLayout {
        main_input_channels: None,
        main_output_channels: NonZeroU32::new(2),
        aux_input_ports: &[],
        aux_output_ports: &[],
        names: PortNames::const_default(),
    }];

    const MIDI_INPUT: MidiConfig = MidiConfig::MidiCCs;
    const SAMPLE_ACCURATE_AUTOMATION: bool = false;

    type SysExMessage = ();
    type BackgroundTask = ();

    fn params(&self) -> Arc<dyn Params> {
        self.params.clone()
    }

    fn initialize(
        &mut self,
        _audio_io_layout: &AudioIOLayout,
        buffer_config: &BufferConfig,
        _context: &mut impl InitContext<Self>,
    ) -> bool {
        let sample_rate = buffer_config.sample_rate as f64;
        let max_block = (buffer_config.max_buffer_size as usize).max(1);

        let mut engine = match Engine::new(sample_rate, max_block) {
            Ok(engine) => engine,
            Err(err) => {
                nih_log!("CoupledMass: cannot build engine at {sample_rate} Hz: {err}");
                return false;
            }
        };
        if let Err(err) = engine.set_params(&self.params.snapshot()) {
            nih_log!("CoupledMass: stored parameters rejected: {err}");
            return false;
        }

        nih_log!(
            "CoupledMass: {sample_rate} Hz, block {max_block}, string segments {:?}",
            engine.strings().iter().map(|s| s.segments()).collect::<Vec<_>>()
        );

        // Ensure buffers are large enough
        if self.left_buf.len() < max_block {
            self.left_buf.resize(max_block, 0.0);
            self.right_buf.resize(max_block, 0.0);
        }
        self.engine = Some(engine);

        true
    }

    fn reset(&mut self) {
        if let Some(engine) = self.engine.as_mut() {
            engine.reset();
        }
    }

    fn process(
        &mut self,
        buffer: &mut Buffer,
        _aux: &mut AuxiliaryBuffers,
        context: &mut impl ProcessContext<Self>,
    ) -> ProcessStatus {
        let Some(engine) = self.engine.as_mut() else {
            return ProcessStatus::Normal;
        };

        // Control rate: one snapshot per buffer.
        if let Err(err) = engine.set_params(&self.params.snapshot()) {
            nih_debug_assert_failure!("parameter snapshot rejected: {}", err);
        }

        let num_samples = buffer.samples().min(engine.max_block());

        // Event-splitting process loop: split at each MIDI event for sample-accuracy
        let mut next_event = context.next_event();
        let mut block_start: usize = 0;

        while block_start < num_samples {
            // Process all events at or before current position
            loop {
                match next_event {
                    Some(ref event) if (event.timing() as usize) <= block_start => {
                        if let Some(ev) = engine_event(event) {
                            engine.handle_event(ev);
                        }
                        next_event = context.next_event();
                    }
                    _ => break,
                }
            }

            // Find next event boundary (or end of buffer)
            let block_end = match next_event {
                Some(ref event) => (event.timing() as usize).min(num_samples),
                None => num_samples,
            };
            let block_len = block_end - block_start;

            if block_len > 0 {
                engine.render_voices(block_start, block_len);
            }

            block_start = block_end;
        }

        // Drain any remaining events
        while let Some(event) = next_event {
            if let Some(ev) = engine_event(&event) {
                engine.handle_event(ev);
            }
            next_event = context.next_event();
        }

        // Strings -> low-pass -> chorus, one pass over the whole buffer.
        let left = &mut self.left_buf[..num_samples];
        let right = &mut self.right_buf[..num_samples];
        engine.mix_block(left, right);

        for (i, mut channel_samples) in buffer.iter_samples().enumerate() {
            let (l, r) = if i < num_samples {
                (left[i] as f32, right[i] as f32)
            } else {
                (0.0, 0.0)
            };
            if let Some(s) = channel_samples.get_mut(0) {
                *s = l;
            }
            if let Some(s) = channel_samples.get_mut(1) {
                *s = r;
            }
        }

        ProcessStatus::Normal
    }
}

impl ClapPlugin for CoupledMass {
    const CLAP_ID: &'static str = "com.coupledmass.synth";
    const CLAP_DESCRIPTION: Option<&'static str> =
        Some("Coupled mass-spring synthesizer with sympathetic strings");
    const CLAP_MANUAL_URL: Option<&'static str> = None;
    const CLAP_SUPPORT_URL: Option<&'static str> = None;
    const CLAP_FEATURES: &'static [ClapFeature] = &[
        ClapFeature::Instrument,
        ClapFeature::Synthesizer,
        ClapFeature::Stereo,
    ];
}

impl Vst3Plugin for CoupledMass {
    const VST3_CLASS_ID: [u8; 16] = *b"CoupledMassSynth";
    const VST3_SUBCATEGORIES: &'static [Vst3SubCategory] =
        &[Vst3SubCategory::Instrument, Vst3SubCategory::Synth];
}

nih_export_clap!(CoupledMass);
nih_export_vst3!(CoupledMass);
