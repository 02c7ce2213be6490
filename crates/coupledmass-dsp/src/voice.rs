/// One synth voice: a mass-spring chain plus note bookkeeping.
///
/// Lifecycle: Idle -> Attacking -> Sustaining / Decaying -> Idle.
/// The chain itself decides when the voice is done: once it has spent its
/// free-decay budget the voice frees itself mid-block.

use std::f64::consts::PI;

use crate::error::{ConfigError, ConfigResult};
use crate::mass_spring::{MassCount, MassSpringNetwork, NetworkConfig};
use crate::params::EngineParams;
use crate::tables;

/// Linear fade-in at note start (s).
pub const ATTACK_SECONDS: f64 = 0.01;

#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum VoiceState {
    Idle,
    /// Inside the fade-in window.
    Attacking,
    /// Key or pedal held: slow decay.
    Sustaining,
    /// Released: free decay until the stop flag.
    Decaying,
}

/// Semitone offset for an octave switch position.
///
/// Positions 0, 1, 2 shift by 0, 12, 24; the "none" position (-1, or any
/// other value) shifts by three octaves.
pub fn octave_offset(setting: i32) -> u8 {
    match setting {
        0 => 0,
        1 => 12,
        2 => 24,
        _ => 36,
    }
}

/// Per-voice settings taken from the parameter snapshot.
#[derive(Clone, Copy, Debug, PartialEq)]
pub struct VoiceSettings {
    pub mass_count: MassCount,
    pub mass1: f64,
    pub d_mass: f64,
    pub d_spring: f64,
    pub damping: f64,
    pub sustain_damping: f64,
    pub octave: i32,
}

impl VoiceSettings {
    pub fn from_params(params: &EngineParams) -> ConfigResult<Self> {
        Ok(Self {
            mass_count: MassCount::new(params.mass_count)?,
            mass1: ConfigError::require_positive("mass1", params.mass1)?,
            d_mass: params.d_mass,
            d_spring: params.d_spring,
            damping: ConfigError::require_positive("damping", params.damping)?,
            sustain_damping: ConfigError::require_positive("sustainDamping", params.sustain_damping)?,
            octave: params.octave,
        })
    }

    /// Reject settings whose spring increments alone would make every note
    /// unstable at `sample_rate`. Notes that are merely too high are
    /// clamped at note-on instead.
    pub fn check_stability(&self, sample_rate: f64) -> ConfigResult<()> {
        let k = NoteConstants::derive(0, 0.0, self);
        network_config(sample_rate, self, &k).stabilized().map(|_| ())
    }
}

impl Default for VoiceSettings {
    fn default() -> Self {
        let p = EngineParams::default();
        Self {
            mass_count: MassCount::default(),
            mass1: p.mass1,
            d_mass: p.d_mass,
            d_spring: p.d_spring,
            damping: p.damping,
            sustain_damping: p.sustain_damping,
            octave: p.octave,
        }
    }
}

/// Chain constants derived for one note-on.
#[derive(Clone, Copy, Debug, PartialEq)]
pub struct NoteConstants {
    pub frequency: f64,
    pub mass: f64,
    pub mass_increment: f64,
    pub spring: f64,
    pub spring_increment: f64,
    pub velocity: f64,
    pub velocity_increment: f64,
}

impl NoteConstants {
    /// `velocity` is normalized 0..1.
    pub fn derive(note: u8, velocity: f64, settings: &VoiceSettings) -> Self {
        let shifted = note as f64 + octave_offset(settings.octave) as f64;
        let frequency = tables::midi_to_freq(shifted);
        let mass = settings.mass1 * settings.mass1;
        let w = 2.0 * PI * frequency;
        Self {
            frequency,
            mass,
            mass_increment: settings.d_mass * settings.d_mass,
            spring: w * w * mass,
            spring_increment: settings.d_spring * settings.d_spring,
            velocity: 0.5 * velocity,
            velocity_increment: 0.1 * velocity,
        }
    }

    /// Replace the first spring constant and the pitch it implies.
    fn with_spring(self, spring: f64) -> Self {
        Self {
            frequency: (spring / self.mass).sqrt() / (2.0 * PI),
            spring,
            ..self
        }
    }
}

fn network_config(sample_rate: f64, settings: &VoiceSettings, k: &NoteConstants) -> NetworkConfig {
    NetworkConfig {
        sample_rate,
        mass_count: settings.mass_count,
        decay_time: settings.damping,
        mass1: k.mass,
        mass_increment: k.mass_increment,
        spring1: k.spring,
        spring_increment: k.spring_increment,
        velocity1: k.velocity,
        velocity_increment: k.velocity_increment,
        sustain_decay_time: settings.sustain_damping,
    }
}

pub struct Voice {
    network: MassSpringNetwork,
    sample_rate: f64,
    attack_samples: f64,
    attack_count: f64,
    active: bool,
    key_held: bool,
    sustain: bool,
    note: Option<u8>,
}

impl Voice {
    pub fn new(sample_rate: f64) -> ConfigResult<Self> {
        let sample_rate = ConfigError::require_positive("sample rate", sample_rate)
            .map_err(|_| ConfigError::SampleRate(sample_rate))?;
        Ok(Self {
            network: MassSpringNetwork::new(),
            sample_rate,
            attack_samples: ATTACK_SECONDS * sample_rate,
            attack_count: 0.0,
            active: false,
            key_held: false,
            sustain: false,
            note: None,
        })
    }

    /// Start `note` at normalized `velocity`. `sustain_pedal` is the pedal
    /// state at the moment of the note-on.
    ///
    /// Notes too high for the chain to stay stable at this sample rate are
    /// pulled down to the highest stable pitch; the returned constants show
    /// what is actually played. Returns `None` and leaves the voice idle
    /// when no pitch is stable for these settings.
    pub fn start_note(
        &mut self,
        note: u8,
        velocity: f64,
        settings: &VoiceSettings,
        sustain_pedal: bool,
    ) -> Option<NoteConstants> {
        let k = NoteConstants::derive(note, velocity.clamp(0.0, 1.0), settings);
        let Ok(cfg) = network_config(self.sample_rate, settings, &k).stabilized() else {
            self.kill();
            return None;
        };
        self.network.init(&cfg);
        self.attack_count = 0.0;
        self.active = true;
        self.key_held = true;
        self.sustain = sustain_pedal;
        self.note = Some(note);
        Some(if cfg.spring1 < k.spring {
            k.with_spring(cfg.spring1)
        } else {
            k
        })
    }

    /// Key released. The chain keeps ringing until its decay budget runs out.
    pub fn stop_note(&mut self) {
        self.key_held = false;
    }

    pub fn set_sustain(&mut self, sustain: bool) {
        self.sustain = sustain;
    }

    /// Add this voice's output into `output`.
    pub fn render(&mut self, output: &mut [f64]) {
        if !self.active {
            return;
        }
        for s in output.iter_mut() {
            let mut y = self.network.process(self.sustain, self.key_held);
            if self.attack_count < self.attack_samples {
                y *= self.attack_count / self.attack_samples;
                self.attack_count += 1.0;
            }
            *s += y;

            if self.network.is_time_to_stop() {
                self.active = false;
                self.note = None;
                self.network.clear_time_to_stop();
                break;
            }
        }
    }

    /// Silence immediately.
    pub fn kill(&mut self) {
        self.active = false;
        self.key_held = false;
        self.sustain = false;
        self.note = None;
        self.network.clear_time_to_stop();
    }

    pub fn state(&self) -> VoiceState {
        if !self.active {
            VoiceState::Idle
        } else if self.attack_count < self.attack_samples {
            VoiceState::Attacking
        } else if self.key_held || self.sustain {
            VoiceState::Sustaining
        } else {
            VoiceState::Decaying
        }
    }

    pub fn is_active(&self) -> bool {
        self.active
    }

    pub fn is_key_held(&self) -> bool {
        self.key_held
    }

    pub fn is_sustained(&self) -> bool {
        self.sustain
    }

    /// Note currently sounding, if any.
    pub fn note(&self) -> Option<u8> {
        self.note
    }

    pub fn network(&self) -> &MassSpringNetwork {
        &self.network
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    const SR: f64 = 44100.0;

    fn settings(damping: f64) -> VoiceSettings {
        VoiceSettings {
            damping,
            ..VoiceSettings::default()
        }
    }

    #[test]
    fn test_a4_spring_constant() {
        let k = NoteConstants::derive(69, 1.0, &VoiceSettings::default());
        let expected = (2.0 * PI * 440.0).powi(2) * 6.84f64.powi(2);
        assert!((k.frequency - 440.0).abs() < 1e-9);
        assert!(((k.spring - expected) / expected).abs() < 1e-4);
        assert_eq!(k.velocity, 0.5);
        assert!((k.velocity_increment - 0.1).abs() < 1e-15);
    }

    #[test]
    fn test_octave_offsets() {
        assert_eq!(octave_offset(0), 0);
        assert_eq!(octave_offset(1), 12);
        assert_eq!(octave_offset(2), 24);
        assert_eq!(octave_offset(-1), 36);

        let s = VoiceSettings {
            octave: 1,
            ..VoiceSettings::default()
        };
        let k = NoteConstants::derive(69, 1.0, &s);
        assert!((k.frequency - 880.0).abs() < 1e-9);

        // Shifted notes past MIDI range still get a frequency.
        let s = VoiceSettings {
            octave: -1,
            ..VoiceSettings::default()
        };
        assert!(NoteConstants::derive(127, 1.0, &s).frequency > 20000.0);
    }

    #[test]
    fn test_settings_reject_bad_mass_count() {
        let p = EngineParams {
            mass_count: 1,
            ..EngineParams::default()
        };
        assert!(matches!(VoiceSettings::from_params(&p), Err(ConfigError::MassCount { .. })));
    }

    #[test]
    fn test_idle_voice_adds_nothing() {
        let mut voice = Voice::new(SR).unwrap();
        let mut buf = [0.25f64; 64];
        voice.render(&mut buf);
        assert!(buf.iter().all(|&s| s == 0.25));
        assert_eq!(voice.state(), VoiceState::Idle);
    }

    #[test]
    fn test_lifecycle() {
        let mut voice = Voice::new(SR).unwrap();
        voice.start_note(57, 0.8, &settings(0.05), false);
        assert_eq!(voice.state(), VoiceState::Attacking);
        assert_eq!(voice.note(), Some(57));

        let mut buf = vec![0.0f64; 1024];
        voice.render(&mut buf);
        assert_eq!(voice.state(), VoiceState::Sustaining);
        assert!(buf.iter().any(|&s| s != 0.0));

        voice.stop_note();
        assert_eq!(voice.state(), VoiceState::Decaying);

        // 0.05 s of free decay, rendered in blocks.
        for _ in 0..10 {
            buf.fill(0.0);
            voice.render(&mut buf);
        }
        assert_eq!(voice.state(), VoiceState::Idle);
        assert_eq!(voice.note(), None);
        assert!(!voice.network().is_time_to_stop());
    }

    #[test]
    fn test_attack_ramp() {
        let mut voice = Voice::new(SR).unwrap();
        voice.start_note(60, 1.0, &VoiceSettings::default(), false);

        let mut ramped = vec![0.0f64; 8];
        voice.render(&mut ramped);

        let mut net = MassSpringNetwork::new();
        let s = VoiceSettings::default();
        let k = NoteConstants::derive(60, 1.0, &s);
        net.init(&network_config(SR, &s, &k));
        let attack = ATTACK_SECONDS * SR;
        for (i, &y) in ramped.iter().enumerate() {
            let raw = net.process(false, true);
            assert!((y - raw * i as f64 / attack).abs() < 1e-15);
        }
    }

    #[test]
    fn test_render_is_additive() {
        let mut a = Voice::new(SR).unwrap();
        let mut b = Voice::new(SR).unwrap();
        a.start_note(64, 0.5, &VoiceSettings::default(), false);
        b.start_note(64, 0.5, &VoiceSettings::default(), false);

        let mut clean = vec![0.0f64; 256];
        let mut offset = vec![1.0f64; 256];
        a.render(&mut clean);
        b.render(&mut offset);
        for (c, o) in clean.iter().zip(&offset) {
            assert!((o - 1.0 - c).abs() < 1e-12);
        }
    }

    #[test]
    fn test_top_note_is_clamped_and_finite() {
        let s = VoiceSettings {
            octave: -1,
            ..VoiceSettings::default()
        };
        let mut voice = Voice::new(SR).unwrap();
        let k = voice.start_note(127, 1.0, &s, false).unwrap();
        assert!(k.frequency < SR / 2.0, "clamped pitch {} above Nyquist", k.frequency);
        assert!(k.frequency < NoteConstants::derive(127, 1.0, &s).frequency);

        let mut buf = vec![0.0f64; SR as usize];
        voice.render(&mut buf);
        assert!(buf.iter().all(|y| y.is_finite() && y.abs() < 1.0));
    }

    #[test]
    fn test_playable_note_is_not_clamped() {
        let mut voice = Voice::new(SR).unwrap();
        let s = VoiceSettings::default();
        let k = voice.start_note(69, 1.0, &s, false).unwrap();
        assert_eq!(k, NoteConstants::derive(69, 1.0, &s));
    }

    #[test]
    fn test_unstable_settings() {
        let s = VoiceSettings {
            mass_count: MassCount::new(20).unwrap(),
            mass1: 3.0,
            d_mass: 0.01,
            d_spring: 25000.0,
            ..VoiceSettings::default()
        };
        assert!(s.check_stability(44100.0).is_ok());
        assert!(matches!(s.check_stability(22050.0), Err(ConfigError::Unstable { .. })));

        let mut voice = Voice::new(22050.0).unwrap();
        assert!(voice.start_note(60, 1.0, &s, false).is_none());
        assert_eq!(voice.state(), VoiceState::Idle);
    }

    #[test]
    fn test_sustain_keeps_voice_alive() {
        let mut voice = Voice::new(SR).unwrap();
        voice.start_note(60, 1.0, &settings(0.02), true);
        voice.stop_note();
        assert_eq!(voice.state(), VoiceState::Attacking);

        let mut buf = vec![0.0f64; (SR * 0.2) as usize];
        voice.render(&mut buf);
        assert_eq!(voice.state(), VoiceState::Sustaining);

        voice.set_sustain(false);
        voice.render(&mut buf);
        assert_eq!(voice.state(), VoiceState::Idle);
    }
}
