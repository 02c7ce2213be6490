//! Control-rate parameter snapshot.
//!
//! Hosts fill an `EngineParams` once per block and hand it to
//! `Engine::set_params`, which validates the whole snapshot before any of it
//! reaches the audio path.

use crate::error::{ConfigError, ConfigResult};
use crate::mass_spring::{MAX_MASSES, MIN_MASSES};

/// Inclusive range and default of one continuous parameter.
#[derive(Clone, Copy, Debug, PartialEq)]
pub struct ParamRange {
    pub name: &'static str,
    pub min: f64,
    pub max: f64,
    pub default: f64,
}

impl ParamRange {
    const fn new(name: &'static str, min: f64, max: f64, default: f64) -> Self {
        Self {
            name,
            min,
            max,
            default,
        }
    }

    pub fn check(&self, value: f64) -> ConfigResult<f64> {
        ConfigError::require_range(self.name, value, self.min, self.max)
    }
}

pub const MASS_NUM: ParamRange = ParamRange::new("massNum", MIN_MASSES as f64, MAX_MASSES as f64, 10.0);
pub const MASS1: ParamRange = ParamRange::new("mass1", 3.0, 10.0, 6.84);
pub const D_MASS: ParamRange = ParamRange::new("dMass", 0.01, 5.0, 1.43);
pub const D_SPRING: ParamRange = ParamRange::new("dSpring", 0.0, 25000.0, 1000.0);
pub const DAMPING: ParamRange = ParamRange::new("damping", 0.1, 10.0, 2.0);
pub const SUSTAIN_DAMPING: ParamRange = ParamRange::new("sustainDamping", 5.0, 40.0, 35.0);
pub const STRING_DAMPING: ParamRange = ParamRange::new("stringDamping", 1.0, 50.0, 5.4);
pub const STRING_TUNING: ParamRange = ParamRange::new("stringTuning", 0.0, 12.0, 0.0);
pub const STRING_BUZZ: ParamRange = ParamRange::new("stringBuzz", 0.0, 1.0, 0.36);
pub const OCTAVE_SELECT: ParamRange = ParamRange::new("octaveSelect", -1.0, 2.0, 0.0);
pub const CHORUS_DEPTH: ParamRange = ParamRange::new("chorusDepth", 100.0, 500.0, 200.0);
/// Hosts expose 0.1..2 Hz; 0 (static delay) is accepted for offline analysis.
pub const CHORUS_FREQ: ParamRange = ParamRange::new("chorusFreq", 0.0, 2.0, 0.5);
pub const LOW_PASS_FREQ: ParamRange = ParamRange::new("lowPassFreq", 100.0, 10000.0, 10000.0);
pub const DRY_VOLUME: ParamRange = ParamRange::new("dryVolume", 0.0, 100.0, 25.0);
pub const WET_VOLUME: ParamRange = ParamRange::new("wetVolume", 0.0, 100.0, 30.0);
pub const CHORUS_VOLUME: ParamRange = ParamRange::new("chorusVol", 0.0, 100.0, 50.0);

#[derive(Clone, Copy, Debug, PartialEq)]
pub struct EngineParams {
    pub mass_count: usize,
    /// Square root of the first mass (kg^1/2).
    pub mass1: f64,
    /// Square root of the mass increment.
    pub d_mass: f64,
    /// Square root of the spring-constant increment.
    pub d_spring: f64,
    /// Free-decay time (s).
    pub damping: f64,
    /// Held/pedalled decay time (s).
    pub sustain_damping: f64,
    /// String T60 (s).
    pub string_damping: f64,
    /// String bank transposition (semitones, shortens the strings).
    pub string_tuning: f64,
    pub perfect_fourth: bool,
    /// Edge-triggered: the string bank resets whenever this flips.
    pub string_reset: bool,
    pub string_buzz: f64,
    pub octave: i32,
    /// Mean chorus delay (samples).
    pub chorus_depth: f64,
    pub chorus_freq: f64,
    pub low_pass_freq: f64,
    pub dry_volume: f64,
    pub wet_volume: f64,
    pub chorus_volume: f64,
}

impl Default for EngineParams {
    fn default() -> Self {
        Self {
            mass_count: MASS_NUM.default as usize,
            mass1: MASS1.default,
            d_mass: D_MASS.default,
            d_spring: D_SPRING.default,
            damping: DAMPING.default,
            sustain_damping: SUSTAIN_DAMPING.default,
            string_damping: STRING_DAMPING.default,
            string_tuning: STRING_TUNING.default,
            perfect_fourth: false,
            string_reset: false,
            string_buzz: STRING_BUZZ.default,
            octave: OCTAVE_SELECT.default as i32,
            chorus_depth: CHORUS_DEPTH.default,
            chorus_freq: CHORUS_FREQ.default,
            low_pass_freq: LOW_PASS_FREQ.default,
            dry_volume: DRY_VOLUME.default,
            wet_volume: WET_VOLUME.default,
            chorus_volume: CHORUS_VOLUME.default,
        }
    }
}

impl EngineParams {
    /// Range-check every field.
    pub fn validate(&self) -> ConfigResult<()> {
        MASS_NUM.check(self.mass_count as f64)?;
        MASS1.check(self.mass1)?;
        D_MASS.check(self.d_mass)?;
        D_SPRING.check(self.d_spring)?;
        DAMPING.check(self.damping)?;
        SUSTAIN_DAMPING.check(self.sustain_damping)?;
        STRING_DAMPING.check(self.string_damping)?;
        STRING_TUNING.check(self.string_tuning)?;
        STRING_BUZZ.check(self.string_buzz)?;
        OCTAVE_SELECT.check(self.octave as f64)?;
        CHORUS_DEPTH.check(self.chorus_depth)?;
        CHORUS_FREQ.check(self.chorus_freq)?;
        LOW_PASS_FREQ.check(self.low_pass_freq)?;
        DRY_VOLUME.check(self.dry_volume)?;
        WET_VOLUME.check(self.wet_volume)?;
        CHORUS_VOLUME.check(self.chorus_volume)?;
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_defaults_are_valid() {
        assert_eq!(EngineParams::default().validate(), Ok(()));
    }

    #[test]
    fn test_defaults_match_ranges() {
        let p = EngineParams::default();
        assert_eq!(p.mass_count, 10);
        assert_eq!(p.mass1, 6.84);
        assert_eq!(p.octave, 0);
        assert_eq!(p.chorus_depth, 200.0);
        assert_eq!((p.dry_volume, p.wet_volume, p.chorus_volume), (25.0, 30.0, 50.0));
    }

    #[test]
    fn test_out_of_range_rejected() {
        let p = EngineParams {
            mass_count: 21,
            ..EngineParams::default()
        };
        assert!(matches!(p.validate(), Err(ConfigError::OutOfRange { name: "massNum", .. })));

        let p = EngineParams {
            string_buzz: f64::NAN,
            ..EngineParams::default()
        };
        assert!(p.validate().is_err());

        let p = EngineParams {
            octave: 3,
            ..EngineParams::default()
        };
        assert!(p.validate().is_err());
    }
}
