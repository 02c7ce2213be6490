/// Phase-accumulator LFO used to sweep the chorus delay length.
///
/// Phase runs over 0..1 and wraps once it passes 1. The waveform maps the
/// phase to a sample in -1..1.

use std::f64::consts::TAU;

#[derive(Clone, Copy, Debug, PartialEq, Eq, Default)]
pub enum Waveform {
    #[default]
    Sine,
}

impl Waveform {
    pub fn sample(self, phase: f64) -> f64 {
        match self {
            Waveform::Sine => (phase * TAU).sin(),
        }
    }
}

pub struct Oscillator {
    waveform: Waveform,
    phase: f64,
    start_phase: f64,
    phase_inc: f64,
    sample_rate: f64,
}

impl Oscillator {
    pub fn new(waveform: Waveform, frequency: f64, sample_rate: f64) -> Self {
        Self::with_phase(waveform, frequency, sample_rate, 0.0)
    }

    /// Start (and reset) at `phase` cycles, wrapped into 0..1.
    pub fn with_phase(waveform: Waveform, frequency: f64, sample_rate: f64, phase: f64) -> Self {
        let start_phase = phase.rem_euclid(1.0);
        Self {
            waveform,
            phase: start_phase,
            start_phase,
            phase_inc: frequency / sample_rate,
            sample_rate,
        }
    }

    pub fn set_frequency(&mut self, frequency: f64) {
        self.phase_inc = frequency / self.sample_rate;
    }

    pub fn frequency(&self) -> f64 {
        self.phase_inc * self.sample_rate
    }

    /// Advance one sample, then read the waveform at the new phase.
    pub fn process(&mut self) -> f64 {
        self.phase += self.phase_inc;
        if self.phase > 1.0 {
            self.phase -= 1.0;
        }
        self.waveform.sample(self.phase)
    }

    pub fn reset(&mut self) {
        self.phase = self.start_phase;
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_sine_frequency() {
        let sr = 44100.0;
        let mut osc = Oscillator::new(Waveform::Sine, 5.0, sr);

        let mut prev = osc.process();
        let mut crossings = 0u32;
        for _ in 0..(sr as usize * 2) {
            let s = osc.process();
            if prev < 0.0 && s >= 0.0 {
                crossings += 1;
            }
            prev = s;
        }
        assert!(crossings.abs_diff(10) <= 1, "expected ~10 cycles, got {crossings}");
    }

    #[test]
    fn test_zero_frequency_is_static() {
        let mut osc = Oscillator::new(Waveform::Sine, 0.0, 48000.0);
        for _ in 0..1000 {
            assert_eq!(osc.process(), 0.0);
        }
    }

    #[test]
    fn test_phase_offset() {
        let mut a = Oscillator::new(Waveform::Sine, 0.0, 48000.0);
        let mut b = Oscillator::with_phase(Waveform::Sine, 0.0, 48000.0, 1.25);
        assert_eq!(a.process(), 0.0);
        assert!((b.process() - 1.0).abs() < 1e-12);

        let mut c = Oscillator::with_phase(Waveform::Sine, 10.0, 48000.0, 0.5);
        let first = c.process();
        for _ in 0..100 {
            c.process();
        }
        c.reset();
        assert_eq!(c.process(), first);
    }

    #[test]
    fn test_output_bounded() {
        let mut osc = Oscillator::new(Waveform::Sine, 1234.5, 44100.0);
        for _ in 0..10_000 {
            let s = osc.process();
            assert!((-1.0..=1.0).contains(&s));
        }
    }
}
