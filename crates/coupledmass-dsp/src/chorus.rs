//! Single chorus voice: a modulated fractional delay.
//!
//! The delay length sweeps sinusoidally around a mean depth. Fractional
//! reads use 4-point (3rd degree) Lagrange interpolation with weights
//! precomputed for `TABLE_STEPS` evenly spaced fractions.

use crate::error::{ConfigError, ConfigResult};
use crate::oscillator::{Oscillator, Waveform};

/// Delay line length in samples.
pub const DELAY_CAPACITY: usize = 1000;
/// Number of precomputed fractional positions.
pub const TABLE_STEPS: usize = 100;

/// Lagrange weights for the four taps at fractional position `frac` (0..1).
///
/// Taps sit at delay offsets -1, 0, +1, +2 around the integer delay; the
/// fraction is measured from the 0 tap.
pub fn lagrange_weights(frac: f64) -> [f64; 4] {
    let a = frac - 0.5;
    [
        ((a + 0.5) * (a - 0.5) * (a - 1.5)) / -6.0,
        ((a + 1.5) * (a - 0.5) * (a - 1.5)) / 2.0,
        ((a + 0.5) * (a - 1.5) * (a + 1.5)) / -2.0,
        ((a + 0.5) * (a - 0.5) * (a + 1.5)) / 6.0,
    ]
}

pub struct ModulatedDelayVoice {
    line: [f64; DELAY_CAPACITY],
    write_pos: usize,
    weights: [[f64; 4]; TABLE_STEPS],
    lfo: Oscillator,
    depth_mean: f64,
    depth_range: f64,
}

impl ModulatedDelayVoice {
    /// Default depth: 400 samples mean, swinging +/-200.
    pub const DEFAULT_DEPTH: f64 = 400.0;

    pub fn new(sample_rate: f64, mod_freq: f64) -> Self {
        Self::with_phase(sample_rate, mod_freq, 0.0)
    }

    /// Voice whose sweep starts `phase` cycles into the LFO.
    pub fn with_phase(sample_rate: f64, mod_freq: f64, phase: f64) -> Self {
        let mut weights = [[0.0f64; 4]; TABLE_STEPS];
        for (k, row) in weights.iter_mut().enumerate() {
            *row = lagrange_weights(k as f64 / TABLE_STEPS as f64);
        }

        Self {
            line: [0.0; DELAY_CAPACITY],
            write_pos: 0,
            weights,
            lfo: Oscillator::with_phase(Waveform::Sine, mod_freq, sample_rate, phase),
            depth_mean: Self::DEFAULT_DEPTH,
            depth_range: Self::DEFAULT_DEPTH / 2.0,
        }
    }

    /// Check that a depth keeps every read inside the delay line.
    ///
    /// The sweep spans `depth/2 ..= 1.5*depth`, and the interpolator reads
    /// one sample before and two after the integer delay.
    pub fn validate_depth(depth: f64) -> ConfigResult<f64> {
        let min_delay = depth * 0.5;
        let max_delay = depth * 1.5;
        if depth.is_finite() && min_delay >= 1.0 && max_delay + 2.0 < DELAY_CAPACITY as f64 {
            Ok(depth)
        } else {
            Err(ConfigError::ChorusDepth {
                depth,
                capacity: DELAY_CAPACITY,
            })
        }
    }

    /// Set mean depth in samples; the modulation range is half of it.
    pub fn set_depth(&mut self, depth: f64) -> ConfigResult<()> {
        let depth = Self::validate_depth(depth)?;
        self.depth_mean = depth;
        self.depth_range = depth / 2.0;
        Ok(())
    }

    pub fn set_mod_freq(&mut self, freq: f64) {
        self.lfo.set_frequency(freq);
    }

    pub fn process(&mut self, input: f64) -> f64 {
        self.write_pos = (self.write_pos + 1) % DELAY_CAPACITY;

        let delay = self.depth_mean + self.depth_range * self.lfo.process();
        let whole = delay.floor();
        let step = (((delay - whole) * TABLE_STEPS as f64) as usize).min(TABLE_STEPS - 1);
        let w = &self.weights[step];

        // Validated depth keeps `whole - 1 >= 0` and `whole + 2 < capacity`.
        let first = whole as usize - 1;
        let mut out = 0.0;
        for (tap, weight) in w.iter().enumerate() {
            let read = (DELAY_CAPACITY + self.write_pos - (first + tap)) % DELAY_CAPACITY;
            out += self.line[read] * weight;
        }

        self.line[self.write_pos] = input;
        out
    }

    pub fn reset(&mut self) {
        self.line.fill(0.0);
        self.write_pos = 0;
        self.lfo.reset();
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::f64::consts::PI;

    #[test]
    fn test_weights_partition_unity() {
        for k in 0..TABLE_STEPS {
            let w = lagrange_weights(k as f64 / TABLE_STEPS as f64);
            let sum: f64 = w.iter().sum();
            assert!((sum - 1.0).abs() < 1e-12, "weights at step {k} sum to {sum}");
        }
    }

    #[test]
    fn test_integer_delay_selects_single_tap() {
        assert_eq!(lagrange_weights(0.0), [0.0, 1.0, 0.0, 0.0]);
    }

    #[test]
    fn test_static_depth_is_pure_delay() {
        let mut voice = ModulatedDelayVoice::new(44100.0, 0.0);
        voice.set_depth(400.0).unwrap();

        let input: Vec<f64> = (0..3000).map(|i| (2.0 * PI * 220.0 * i as f64 / 44100.0).sin()).collect();
        let output: Vec<f64> = input.iter().map(|&x| voice.process(x)).collect();

        for n in 0..400 {
            assert_eq!(output[n], 0.0, "output before the delay should be silent at {n}");
        }
        for n in 400..input.len() {
            let err = (output[n] - input[n - 400]).abs();
            assert!(err < 1e-3, "delay mismatch at {n}: {err}");
        }
    }

    #[test]
    fn test_fractional_read_interpolates_sine() {
        // A slow sine sampled at a half-sample offset must land between
        // neighbours, close to the analytically delayed value.
        let sr = 44100.0;
        let freq = 100.0;
        let mut voice = ModulatedDelayVoice::new(sr, 0.0);
        voice.set_depth(300.0).unwrap();
        voice.depth_mean = 300.5;

        let mut max_err = 0.0f64;
        for n in 0..2000 {
            let x = (2.0 * PI * freq * n as f64 / sr).sin();
            let y = voice.process(x);
            if n > 400 {
                let expected = (2.0 * PI * freq * (n as f64 - 300.5) / sr).sin();
                max_err = max_err.max((y - expected).abs());
            }
        }
        assert!(max_err < 1e-3, "fractional delay error too large: {max_err}");
    }

    #[test]
    fn test_depth_validation() {
        let mut voice = ModulatedDelayVoice::new(44100.0, 0.5);
        assert!(voice.set_depth(500.0).is_ok());
        assert!(voice.set_depth(700.0).is_err());
        assert!(voice.set_depth(1.0).is_err());
        assert_eq!(voice.depth_mean, 500.0);
    }

    #[test]
    fn test_modulated_output_bounded() {
        let mut voice = ModulatedDelayVoice::new(44100.0, 2.0);
        voice.set_depth(500.0).unwrap();
        for n in 0..50_000 {
            let x = if n % 97 == 0 { 1.0 } else { 0.0 };
            let y = voice.process(x);
            assert!(y.is_finite() && y.abs() < 2.0);
        }
    }
}
