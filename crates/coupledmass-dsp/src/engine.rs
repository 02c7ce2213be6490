//! Polyphonic engine: voice pool, sympathetic string bank, output low-pass
//! and stereo chorus.
//!
//! Signal flow per sample:
//!
//! ```text
//! voices -> dry --+--> strings (x wetVolume) --+
//!                 +--> x dryVolume x 100 ------+--> low-pass x 0.1 = filtered
//! left  = (chorus 0 + chorus 1) x chorusVol/100 + filtered, x 0.1
//! right = (chorus 2 + chorus 3) x chorusVol/100 + filtered, x 0.1
//! ```
//!
//! All storage is sized in `Engine::new`; rendering never allocates.

use crate::chorus::ModulatedDelayVoice;
use crate::error::{ConfigError, ConfigResult};
use crate::filters::Biquad;
use crate::params::EngineParams;
use crate::stiff_string::StiffString;
use crate::tables::{self, STRING_COUNT};
use crate::voice::{Voice, VoiceSettings};

pub const VOICE_COUNT: usize = 32;
pub const CHORUS_COUNT: usize = 4;

// ── Events ──────────────────────────────────────────────────────────────────

#[derive(Clone, Copy, Debug, PartialEq)]
pub enum EngineEvent {
    /// `velocity` normalized 0..1.
    NoteOn { note: u8, velocity: f64 },
    NoteOff { note: u8 },
    /// Sustain pedal down (true) or up.
    Sustain(bool),
}

/// An event at a sample offset inside the block passed to `process_block`.
#[derive(Clone, Copy, Debug, PartialEq)]
pub struct TimedEvent {
    pub offset: usize,
    pub event: EngineEvent,
}

// ── Voice management ────────────────────────────────────────────────────────

struct VoiceSlot {
    voice: Voice,
    age: u64,
}

// ── Engine ──────────────────────────────────────────────────────────────────

pub struct Engine {
    sample_rate: f64,
    max_block: usize,

    voices: Vec<VoiceSlot>,
    age_counter: u64,
    settings: VoiceSettings,
    sustain_pedal: bool,

    strings: Vec<StiffString>,
    choruses: [ModulatedDelayVoice; CHORUS_COUNT],
    lowpass: Biquad,

    // Last committed snapshot (defaults until the first `set_params`).
    params: EngineParams,
    // String tuning, fourth switch and damping are applied from the first
    // snapshot and afterwards only when `string_reset` flips.
    strings_configured: bool,
    string_resets: u64,

    dry: Vec<f64>,
}

impl Engine {
    /// Build the engine for `sample_rate`, rendering at most `max_block`
    /// samples per mix pass.
    pub fn new(sample_rate: f64, max_block: usize) -> ConfigResult<Self> {
        if !(sample_rate.is_finite() && sample_rate > 0.0) {
            return Err(ConfigError::SampleRate(sample_rate));
        }
        if max_block == 0 {
            return Err(ConfigError::BlockSize(max_block));
        }

        let params = EngineParams::default();
        let settings = VoiceSettings::from_params(&params)?;
        settings.check_stability(sample_rate)?;

        let mut voices = Vec::with_capacity(VOICE_COUNT);
        for _ in 0..VOICE_COUNT {
            voices.push(VoiceSlot {
                voice: Voice::new(sample_rate)?,
                age: 0,
            });
        }

        let mut strings = Vec::with_capacity(STRING_COUNT);
        for i in 0..STRING_COUNT {
            let mut string = StiffString::new(
                i,
                tables::string_physics(i, params.perfect_fourth),
                params.string_damping,
                sample_rate,
            )?;
            string.set_buzz(params.string_buzz);
            strings.push(string);
        }

        // Staggered rates until the first snapshot sets a common one. The
        // quarter-cycle phase spread keeps the four sweeps apart after that.
        let choruses = std::array::from_fn(|i| {
            ModulatedDelayVoice::with_phase(
                sample_rate,
                (i + 1) as f64 * 0.2,
                i as f64 / CHORUS_COUNT as f64,
            )
        });

        Ok(Self {
            sample_rate,
            max_block,
            voices,
            age_counter: 0,
            settings,
            sustain_pedal: false,
            strings,
            choruses,
            lowpass: Biquad::butterworth_lowpass(params.low_pass_freq, sample_rate),
            params,
            strings_configured: false,
            string_resets: 0,
            dry: vec![0.0; max_block],
        })
    }

    /// Validate and commit a parameter snapshot.
    ///
    /// Everything is checked before anything changes: on `Err` the engine
    /// keeps its previous configuration. Voice settings take effect at the
    /// next note-on. String tuning, the fourth switch and string damping
    /// are held until `string_reset` flips, which retunes and silences the
    /// whole bank; the first snapshot after construction applies them
    /// without counting as a reset.
    pub fn set_params(&mut self, params: &EngineParams) -> ConfigResult<()> {
        params.validate()?;
        let settings = VoiceSettings::from_params(params)?;
        settings.check_stability(self.sample_rate)?;
        ModulatedDelayVoice::validate_depth(params.chorus_depth)?;

        let reset_edge = params.string_reset != self.params.string_reset;
        let retune = reset_edge || !self.strings_configured;
        if retune {
            for (i, string) in self.strings.iter().enumerate() {
                string.preview(
                    &tables::string_physics(i, params.perfect_fourth),
                    params.string_damping,
                    params.string_tuning,
                )?;
            }
        }

        // Commit.
        self.settings = settings;
        for (i, string) in self.strings.iter_mut().enumerate() {
            if retune {
                string.configure(
                    tables::string_physics(i, params.perfect_fourth),
                    params.string_damping,
                    params.string_tuning,
                )?;
            }
            string.set_buzz(params.string_buzz);
        }
        self.strings_configured = true;
        if reset_edge {
            self.string_resets += 1;
        }
        for chorus in &mut self.choruses {
            chorus.set_depth(params.chorus_depth)?;
            chorus.set_mod_freq(params.chorus_freq);
        }
        self.lowpass
            .set_butterworth_lowpass(params.low_pass_freq, self.sample_rate);
        self.params = *params;
        Ok(())
    }

    pub fn note_on(&mut self, note: u8, velocity: f64) {
        let note = note.clamp(tables::MIDI_LO, tables::MIDI_HI);

        // Retriggering a sounding note releases the old voice first.
        for slot in &mut self.voices {
            if slot.voice.note() == Some(note) {
                slot.voice.stop_note();
            }
        }

        let idx = self.allocate_voice();
        self.age_counter += 1;
        let slot = &mut self.voices[idx];
        slot.voice
            .start_note(note, velocity, &self.settings, self.sustain_pedal);
        slot.age = self.age_counter;
    }

    pub fn note_off(&mut self, note: u8) {
        for slot in &mut self.voices {
            if slot.voice.note() == Some(note) && slot.voice.is_key_held() {
                slot.voice.stop_note();
            }
        }
    }

    /// Pedal down sustains voices whose key is held; pedal up releases all.
    pub fn set_sustain_pedal(&mut self, down: bool) {
        self.sustain_pedal = down;
        for slot in &mut self.voices {
            if !down {
                slot.voice.set_sustain(false);
            } else if slot.voice.is_active() && slot.voice.is_key_held() {
                slot.voice.set_sustain(true);
            }
        }
    }

    pub fn handle_event(&mut self, event: EngineEvent) {
        match event {
            EngineEvent::NoteOn { note, velocity } => self.note_on(note, velocity),
            EngineEvent::NoteOff { note } => self.note_off(note),
            EngineEvent::Sustain(down) => self.set_sustain_pedal(down),
        }
    }

    /// Find a voice slot: prefer idle, then oldest released, then oldest.
    fn allocate_voice(&self) -> usize {
        if let Some(i) = self.voices.iter().position(|s| !s.voice.is_active()) {
            return i;
        }

        let oldest = |released_only: bool| {
            self.voices
                .iter()
                .enumerate()
                .filter(|(_, s)| !released_only || !s.voice.is_key_held())
                .min_by_key(|(_, s)| s.age)
                .map(|(i, _)| i)
        };
        oldest(true).or_else(|| oldest(false)).unwrap_or(0)
    }

    /// Sum all active voices into `dry[offset..offset + len]`.
    ///
    /// The range is clipped to the block capacity.
    pub fn render_voices(&mut self, offset: usize, len: usize) {
        let start = offset.min(self.max_block);
        let end = (offset + len).min(self.max_block);
        let dry = &mut self.dry[start..end];
        dry.fill(0.0);
        for slot in &mut self.voices {
            slot.voice.render(dry);
        }
    }

    /// Run the rendered dry signal through strings, filter and chorus.
    ///
    /// Consumes `dry[..n]` where `n` is the shorter of the two channels,
    /// clipped to the block capacity.
    pub fn mix_block(&mut self, left: &mut [f64], right: &mut [f64]) {
        let n = left.len().min(right.len()).min(self.max_block);
        let wet_volume = self.params.wet_volume;
        let dry_volume = self.params.dry_volume;
        let chorus_gain = self.params.chorus_volume / 100.0;

        for i in 0..n {
            let dry = self.dry[i];

            let mut wet = 0.0;
            for string in &mut self.strings {
                wet += string.process(dry) * wet_volume;
            }

            let filtered = self.lowpass.process(wet + dry * dry_volume * 100.0) * 0.1;

            let [c0, c1, c2, c3] = &mut self.choruses;
            let chorus_left = c0.process(filtered) + c1.process(filtered);
            let chorus_right = c2.process(filtered) + c3.process(filtered);

            left[i] = (chorus_left * chorus_gain + filtered) * 0.1;
            right[i] = (chorus_right * chorus_gain + filtered) * 0.1;
        }
    }

    /// Render one host block with sample-accurate events.
    ///
    /// `events` must be sorted by offset. Blocks longer than the engine's
    /// capacity are rendered in chunks; events past the end of the block are
    /// applied after it.
    pub fn process_block(&mut self, events: &[TimedEvent], left: &mut [f64], right: &mut [f64]) {
        let len = left.len().min(right.len());
        let mut next = 0;

        for chunk_start in (0..len).step_by(self.max_block) {
            let chunk_end = (chunk_start + self.max_block).min(len);
            let mut pos = chunk_start;

            while pos < chunk_end {
                while let Some(ev) = events.get(next).filter(|ev| ev.offset <= pos) {
                    self.handle_event(ev.event);
                    next += 1;
                }

                let until = match events.get(next) {
                    Some(ev) if ev.offset < chunk_end => ev.offset,
                    _ => chunk_end,
                };
                self.render_voices(pos - chunk_start, until - pos);
                pos = until;
            }

            self.mix_block(
                &mut left[chunk_start..chunk_end],
                &mut right[chunk_start..chunk_end],
            );
        }

        for ev in &events[next..] {
            self.handle_event(ev.event);
        }
    }

    /// Free every voice and silence strings, filter and chorus.
    pub fn reset(&mut self) {
        for slot in &mut self.voices {
            slot.voice.kill();
            slot.age = 0;
        }
        self.age_counter = 0;
        self.sustain_pedal = false;
        for string in &mut self.strings {
            string.reset();
        }
        self.lowpass.reset();
        for chorus in &mut self.choruses {
            chorus.reset();
        }
        self.dry.fill(0.0);
    }

    pub fn sample_rate(&self) -> f64 {
        self.sample_rate
    }

    pub fn max_block(&self) -> usize {
        self.max_block
    }

    pub fn params(&self) -> &EngineParams {
        &self.params
    }

    /// Number of string-bank resets committed so far.
    pub fn string_reset_count(&self) -> u64 {
        self.string_resets
    }

    pub fn active_voices(&self) -> usize {
        self.voices.iter().filter(|s| s.voice.is_active()).count()
    }

    pub fn voices(&self) -> impl Iterator<Item = &Voice> {
        self.voices.iter().map(|s| &s.voice)
    }

    pub fn strings(&self) -> &[StiffString] {
        &self.strings
    }
}
