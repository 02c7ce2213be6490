use coupledmass_dsp::params::{self as ranges, EngineParams, ParamRange};
use nih_plug::prelude::*;

fn linear(range: ParamRange) -> FloatRange {
    FloatRange::Linear {
        min: range.min as f32,
        max: range.max as f32,
    }
}

fn float_param(label: &str, range: ParamRange) -> FloatParam {
    FloatParam::new(label, range.default as f32, linear(range))
}

/// Widen to f64, pulling f32 rounding at the range ends back inside.
fn read(param: &FloatParam, range: ParamRange) -> f64 {
    (param.value() as f64).clamp(range.min, range.max)
}

#[derive(Params)]
pub struct CoupledMassParams {
    /// Masses per voice chain.
    #[id = "massNum"]
    pub mass_num: IntParam,

    /// Square root of the first mass.
    #[id = "mass1"]
    pub mass1: FloatParam,

    /// Square root of the per-mass increment.
    #[id = "dMass"]
    pub d_mass: FloatParam,

    /// Square root of the per-spring stiffness increment.
    #[id = "dSpring"]
    pub d_spring: FloatParam,

    /// Release decay time (s).
    #[id = "damping"]
    pub damping: FloatParam,

    /// Decay time while the key or pedal is held (s).
    #[id = "sustainDamping"]
    pub sustain_damping: FloatParam,

    #[id = "stringDamping"]
    pub string_damping: FloatParam,

    /// Sympathetic bank transposition (semitones).
    #[id = "stringTuning"]
    pub string_tuning: FloatParam,

    /// Tune string 4 to a perfect fourth instead of a sharpened one.
    #[id = "p4thTuning"]
    pub p4th_tuning: BoolParam,

    /// Flip to retune and silence the string bank.
    #[id = "stringReset"]
    pub string_reset: BoolParam,

    /// Bridge contact: 0 = hard stop, 1 = free.
    #[id = "stringBuzz"]
    pub string_buzz: FloatParam,

    /// Octave switch: -1 (none), 0, 1, 2.
    #[id = "octaveSelect"]
    pub octave_select: IntParam,

    /// Mean chorus delay (samples).
    #[id = "chorusDepth"]
    pub chorus_depth: FloatParam,

    #[id = "chorusFreq"]
    pub chorus_freq: FloatParam,

    #[id = "lowPassFreq"]
    pub low_pass_freq: FloatParam,

    #[id = "dryVolume"]
    pub dry_volume: FloatParam,

    #[id = "wetVolume"]
    pub wet_volume: FloatParam,

    #[id = "chorusVol"]
    pub chorus_vol: FloatParam,
}

impl Default for CoupledMassParams {
    fn default() -> Self {
        Self {
            mass_num: IntParam::new(
                "Masses",
                ranges::MASS_NUM.default as i32,
                IntRange::Linear {
                    min: ranges::MASS_NUM.min as i32,
                    max: ranges::MASS_NUM.max as i32,
                },
            ),

            mass1: float_param("Mass", ranges::MASS1).with_step_size(0.01),
            d_mass: float_param("Mass Increment", ranges::D_MASS).with_step_size(0.01),
            d_spring: float_param("Spring Increment", ranges::D_SPRING).with_step_size(1.0),

            damping: float_param("Damping", ranges::DAMPING).with_unit(" s"),
            sustain_damping: float_param("Sustain Damping", ranges::SUSTAIN_DAMPING).with_unit(" s"),
            string_damping: float_param("String Damping", ranges::STRING_DAMPING).with_unit(" s"),

            string_tuning: float_param("String Tuning", ranges::STRING_TUNING)
                .with_unit(" st")
                .with_step_size(1.0),
            p4th_tuning: BoolParam::new("Perfect Fourth", false),
            string_reset: BoolParam::new("String Reset", false),
            string_buzz: float_param("String Buzz", ranges::STRING_BUZZ)
                .with_unit(" %")
                .with_value_to_string(formatters::v2s_f32_percentage(0))
                .with_string_to_value(formatters::s2v_f32_percentage()),

            octave_select: IntParam::new(
                "Octave",
                ranges::OCTAVE_SELECT.default as i32,
                IntRange::Linear {
                    min: ranges::OCTAVE_SELECT.min as i32,
                    max: ranges::OCTAVE_SELECT.max as i32,
                },
            ),

            chorus_depth: float_param("Chorus Depth", ranges::CHORUS_DEPTH)
                .with_unit(" smp")
                .with_step_size(1.0),
            // The engine also accepts 0 Hz; hosts get the audible range.
            chorus_freq: FloatParam::new(
                "Chorus Rate",
                ranges::CHORUS_FREQ.default as f32,
                FloatRange::Linear { min: 0.1, max: 2.0 },
            )
            .with_unit(" Hz")
            .with_step_size(0.01),
            low_pass_freq: FloatParam::new(
                "Low Pass",
                ranges::LOW_PASS_FREQ.default as f32,
                FloatRange::Skewed {
                    min: ranges::LOW_PASS_FREQ.min as f32,
                    max: ranges::LOW_PASS_FREQ.max as f32,
                    factor: FloatRange::skew_factor(-2.0),
                },
            )
            .with_value_to_string(formatters::v2s_f32_hz_then_khz(0))
            .with_string_to_value(formatters::s2v_f32_hz_then_khz()),

            dry_volume: float_param("Dry", ranges::DRY_VOLUME),
            wet_volume: float_param("Strings", ranges::WET_VOLUME),
            chorus_vol: float_param("Chorus", ranges::CHORUS_VOLUME),
        }
    }
}

impl CoupledMassParams {
    /// Read the current values into a DSP snapshot.
    pub fn snapshot(&self) -> EngineParams {
        EngineParams {
            mass_count: self.mass_num.value() as usize,
            mass1: read(&self.mass1, ranges::MASS1),
            d_mass: read(&self.d_mass, ranges::D_MASS),
            d_spring: read(&self.d_spring, ranges::D_SPRING),
            damping: read(&self.damping, ranges::DAMPING),
            sustain_damping: read(&self.sustain_damping, ranges::SUSTAIN_DAMPING),
            string_damping: read(&self.string_damping, ranges::STRING_DAMPING),
            string_tuning: read(&self.string_tuning, ranges::STRING_TUNING),
            perfect_fourth: self.p4th_tuning.value(),
            string_reset: self.string_reset.value(),
            string_buzz: read(&self.string_buzz, ranges::STRING_BUZZ),
            octave: self.octave_select.value(),
            chorus_depth: read(&self.chorus_depth, ranges::CHORUS_DEPTH),
            chorus_freq: read(&self.chorus_freq, ranges::CHORUS_FREQ),
            low_pass_freq: read(&self.low_pass_freq, ranges::LOW_PASS_FREQ),
            dry_volume: read(&self.dry_volume, ranges::DRY_VOLUME),
            wet_volume: read(&self.wet_volume, ranges::WET_VOLUME),
            chorus_volume: read(&self.chorus_vol, ranges::CHORUS_VOLUME),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_default_snapshot_matches_engine_defaults() {
        let snapshot = CoupledMassParams::default().snapshot();
        let defaults = EngineParams::default();
        assert_eq!(snapshot.mass_count, defaults.mass_count);
        assert_eq!(snapshot.octave, defaults.octave);
        assert!((snapshot.mass1 - defaults.mass1).abs() < 1e-6);
        assert!((snapshot.string_damping - defaults.string_damping).abs() < 1e-6);
        assert!((snapshot.low_pass_freq - defaults.low_pass_freq).abs() < 1e-3);
        assert!(snapshot.validate().is_ok());
    }
}
