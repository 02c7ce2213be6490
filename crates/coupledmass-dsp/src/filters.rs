/// Output low-pass for the engine mix.
///
/// Second-order Butterworth (Q = 1/sqrt 2). Retuning keeps the filter
/// state so cutoff automation does not click.

use std::f64::consts::{FRAC_1_SQRT_2, PI};

/// Biquad filter — Direct Form II Transposed.
pub struct Biquad {
    b0: f64,
    b1: f64,
    b2: f64,
    a1: f64,
    a2: f64,
    s1: f64,
    s2: f64,
}

impl Biquad {
    /// Low-pass filter (Audio EQ Cookbook).
    pub fn lowpass(cutoff_hz: f64, q: f64, sample_rate: f64) -> Self {
        // Keep the pole pair inside the unit circle for any requested cutoff.
        let cutoff_hz = cutoff_hz.clamp(1.0, 0.49 * sample_rate);
        let w0 = 2.0 * PI * cutoff_hz / sample_rate;
        let alpha = w0.sin() / (2.0 * q);
        let cos_w0 = w0.cos();

        let b1 = 1.0 - cos_w0;
        let b0 = b1 / 2.0;
        let b2 = b0;
        let a0 = 1.0 + alpha;
        let a1 = -2.0 * cos_w0;
        let a2 = 1.0 - alpha;

        Self {
            b0: b0 / a0,
            b1: b1 / a0,
            b2: b2 / a0,
            a1: a1 / a0,
            a2: a2 / a0,
            s1: 0.0,
            s2: 0.0,
        }
    }

    /// Maximally flat low-pass at `cutoff_hz`.
    pub fn butterworth_lowpass(cutoff_hz: f64, sample_rate: f64) -> Self {
        Self::lowpass(cutoff_hz, FRAC_1_SQRT_2, sample_rate)
    }

    /// Update coefficients to lowpass without resetting filter state.
    pub fn set_lowpass(&mut self, cutoff_hz: f64, q: f64, sample_rate: f64) {
        let new = Self::lowpass(cutoff_hz, q, sample_rate);
        self.b0 = new.b0;
        self.b1 = new.b1;
        self.b2 = new.b2;
        self.a1 = new.a1;
        self.a2 = new.a2;
    }

    pub fn set_butterworth_lowpass(&mut self, cutoff_hz: f64, sample_rate: f64) {
        self.set_lowpass(cutoff_hz, FRAC_1_SQRT_2, sample_rate);
    }

    /// Process one sample (Direct Form II Transposed).
    pub fn process(&mut self, x: f64) -> f64 {
        let y = self.b0 * x + self.s1;
        self.s1 = self.b1 * x - self.a1 * y + self.s2;
        self.s2 = self.b2 * x - self.a2 * y;
        y
    }

    pub fn reset(&mut self) {
        self.s1 = 0.0;
        self.s2 = 0.0;
    }
}
