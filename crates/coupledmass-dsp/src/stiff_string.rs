//! Sympathetic stiff string — explicit finite-difference scheme.
//!
//! Discretizes the damped stiff-string equation
//!
//!   u_tt = c^2 u_xx - kappa^2 u_xxxx - 2 sigma u_t
//!
//! on a grid whose spacing is the smallest that still satisfies the
//! scheme's stability bound. The bridge end (points 0 and 1) uses truncated
//! stencils and a one-sided contact: negative excursions are scaled by the
//! buzz factor, like a string rattling against a flat bridge. Input is
//! injected near the bridge and the output is tapped further along the
//! string so the sympathetic response arrives after a propagation delay.

use std::f64::consts::PI;

use crate::error::{ConfigError, ConfigResult};
use crate::generations::Generations;
use crate::tables::StringPhysics;

/// Storage capacity in grid points.
pub const MAX_SEGMENTS: usize = 159;
/// Grid point receiving the excitation.
pub const INPUT_POINT: usize = 4;
/// Output tap distance from the far end.
pub const OUTPUT_OFFSET: usize = 10;
/// Fewest segments that keep the output tap past the input point.
pub const MIN_SEGMENTS: usize = INPUT_POINT + OUTPUT_OFFSET + 1;

/// Derived grid and stencil for one string configuration.
#[derive(Clone, Copy, Debug, PartialEq)]
pub struct StringScheme {
    /// Effective vibrating length after tuning (m).
    pub length: f64,
    /// Transverse wave speed (m/s).
    pub wave_speed: f64,
    /// Stiffness constant (m^2/s).
    pub stiffness_const: f64,
    /// Frequency-independent loss (1/s).
    pub loss: f64,
    /// Smallest stable grid spacing (m).
    pub min_spacing: f64,
    /// Grid spacing actually used (m).
    pub spacing: f64,
    pub segments: usize,
    /// Stencil weights: end point, centre, first neighbour, second neighbour.
    pub b: [f64; 4],
    /// Weight on the generation before last.
    pub c: f64,
}

impl StringScheme {
    /// Derive the grid for `physics` at the given damping time, tuning
    /// offset (semitones) and sample rate.
    ///
    /// Tuning shortens the string by half its length per octave. The
    /// segment count is clamped to `MAX_SEGMENTS`; a coarser grid than the
    /// stability limit stays stable.
    pub fn derive(physics: &StringPhysics, damping_time: f64, tuning: f64, sample_rate: f64) -> Self {
        let k = 1.0 / sample_rate;
        let length = physics.length - 0.5 * physics.length * (tuning / 12.0);

        let area = PI * physics.radius * physics.radius;
        let linear_density = physics.density * area;
        let wave_speed = (physics.tension / linear_density).sqrt();
        let stiffness_const = (physics.stiffness / linear_density).sqrt();
        let loss = 6.0 * 10f64.ln() / damping_time;

        let c2k2 = wave_speed.powi(2) * k.powi(2);
        let min_spacing =
            (0.5 * (c2k2 + (c2k2.powi(2) + 16.0 * k.powi(2) * stiffness_const.powi(2)).sqrt())).sqrt();
        let segments = ((length / min_spacing).floor() as usize).min(MAX_SEGMENTS);
        let spacing = length / segments.max(1) as f64;

        let h2 = spacing.powi(2);
        let h4 = spacing.powi(4);
        let dxx = [-2.0 / h2, 1.0 / h2];
        let dxxxx = [5.0 / h4, 6.0 / h4, -4.0 / h4, 1.0 / h4];
        let k2kappa2 = k.powi(2) * stiffness_const.powi(2);
        let norm = 1.0 / (1.0 + loss * k);

        let b = [
            norm * (2.0 + c2k2 * dxx[0] - k2kappa2 * dxxxx[0]),
            norm * (2.0 + c2k2 * dxx[0] - k2kappa2 * dxxxx[1]),
            norm * (c2k2 * dxx[1] - k2kappa2 * dxxxx[2]),
            norm * (-k2kappa2 * dxxxx[3]),
        ];
        let c = (1.0 - loss * k) / (1.0 + loss * k);

        Self {
            length,
            wave_speed,
            stiffness_const,
            loss,
            min_spacing,
            spacing,
            segments,
            b,
            c,
        }
    }

    /// Reject grids too coarse for the injection point and output tap.
    pub fn validate(self, index: usize) -> ConfigResult<Self> {
        ConfigError::require_positive("string length", self.length)?;
        if self.segments < MIN_SEGMENTS {
            return Err(ConfigError::TooFewSegments {
                index,
                segments: self.segments,
                min: MIN_SEGMENTS,
            });
        }
        Ok(self)
    }

    pub fn output_tap(&self) -> usize {
        self.segments - OUTPUT_OFFSET
    }
}

pub struct StiffString {
    index: usize,
    physics: StringPhysics,
    damping_time: f64,
    tuning: f64,
    sample_rate: f64,
    buzz: f64,
    scheme: StringScheme,
    state: Generations<MAX_SEGMENTS>,
}

impl StiffString {
    pub const DEFAULT_BUZZ: f64 = 0.9;

    /// Build string `index` of a bank. `damping_time` is the T60 in seconds.
    pub fn new(index: usize, physics: StringPhysics, damping_time: f64, sample_rate: f64) -> ConfigResult<Self> {
        ConfigError::require_positive("sample rate", sample_rate)
            .map_err(|_| ConfigError::SampleRate(sample_rate))?;
        let scheme = Self::checked_scheme(index, &physics, damping_time, 0.0, sample_rate)?;
        Ok(Self {
            index,
            physics,
            damping_time,
            tuning: 0.0,
            sample_rate,
            buzz: Self::DEFAULT_BUZZ,
            scheme,
            state: Generations::new(),
        })
    }

    fn checked_scheme(
        index: usize,
        physics: &StringPhysics,
        damping_time: f64,
        tuning: f64,
        sample_rate: f64,
    ) -> ConfigResult<StringScheme> {
        ConfigError::require_positive("string tension", physics.tension)?;
        ConfigError::require_positive("string radius", physics.radius)?;
        ConfigError::require_positive("string stiffness", physics.stiffness)?;
        ConfigError::require_positive("string density", physics.density)?;
        ConfigError::require_positive("string damping", damping_time)?;
        StringScheme::derive(physics, damping_time, tuning, sample_rate).validate(index)
    }

    /// Preview the grid a reconfiguration would produce, without touching state.
    pub fn preview(&self, physics: &StringPhysics, damping_time: f64, tuning: f64) -> ConfigResult<StringScheme> {
        Self::checked_scheme(self.index, physics, damping_time, tuning, self.sample_rate)
    }

    /// Commit new physics, damping and tuning, then reset.
    ///
    /// Nothing changes if the new configuration is rejected.
    pub fn configure(&mut self, physics: StringPhysics, damping_time: f64, tuning: f64) -> ConfigResult<()> {
        self.scheme = self.preview(&physics, damping_time, tuning)?;
        self.physics = physics;
        self.damping_time = damping_time;
        self.tuning = tuning;
        self.state.clear();
        Ok(())
    }

    /// Recompute the scheme from the stored configuration and silence the string.
    pub fn reset(&mut self) {
        self.scheme = StringScheme::derive(&self.physics, self.damping_time, self.tuning, self.sample_rate);
        self.state.clear();
    }

    /// Bridge contact factor: 0 = hard stop, 1 = no contact.
    pub fn set_buzz(&mut self, buzz: f64) {
        self.buzz = buzz.clamp(0.0, 1.0);
    }

    pub fn scheme(&self) -> &StringScheme {
        &self.scheme
    }

    pub fn segments(&self) -> usize {
        self.scheme.segments
    }

    pub fn physics(&self) -> &StringPhysics {
        &self.physics
    }

    /// Advance one sample with `input` injected at `INPUT_POINT`.
    pub fn process(&mut self, input: f64) -> f64 {
        let n = self.scheme.segments;
        let [b0, b1, b2, b3] = self.scheme.b;
        let c = self.scheme.c;
        let buzz = self.buzz;
        let (u, p, pp) = self.state.split();

        // Bridge end: truncated stencils, one-sided contact.
        let mut x = b0 * p[0] + b2 * p[1] + b3 * p[2] - c * pp[0];
        if x < 0.0 {
            x *= buzz;
        }
        u[0] = x;

        let mut x = b2 * p[0] + b1 * p[1] + b2 * p[2] + b3 * p[3] - c * pp[1];
        if x < 0.0 {
            x *= buzz;
        }
        u[1] = x;

        for i in 2..n - 3 {
            u[i] = b3 * p[i - 2] + b2 * p[i - 1] + b1 * p[i] + b2 * p[i + 1] + b3 * p[i + 2] - c * pp[i];
        }

        // Held at rest: the far-end stencils below treat it as a fixed support.
        u[n - 3] = 0.0;

        u[n - 2] = b2 * p[n - 1] + b1 * p[n - 2] + b2 * p[n - 3] + b3 * p[n - 4] - c * pp[n - 2];
        u[n - 1] = b0 * p[n - 1] + b2 * p[n - 2] + b3 * p[n - 3] - c * pp[n - 1];

        u[INPUT_POINT] += input;

        let out = pp[n - OUTPUT_OFFSET];
        self.state.advance();
        out
    }
}
