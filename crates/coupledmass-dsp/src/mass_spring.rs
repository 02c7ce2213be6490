//! Coupled mass-spring chain — explicit finite-difference scheme.
//!
//! N masses in a line, N+1 springs (both ends anchored). Each mass obeys
//!
//!   m_i x_i'' = k_i (x_{i-1} - x_i) + k_{i+1} (x_{i+1} - x_i) - 2 alpha m_i x_i'
//!
//! discretized with centred differences. Two update matrices are kept: one
//! for free decay (key up, pedal up) and one for the much slower decay while
//! the note is held. The voice is told to stop once it has spent
//! `decay_time` seconds in free decay.

use crate::error::{ConfigError, ConfigResult};
use crate::generations::Generations;

pub const MIN_MASSES: usize = 2;
pub const MAX_MASSES: usize = 20;

/// The explicit update is stable while every eigenvalue of dt^2 M^-1 K
/// stays below this.
pub const STABILITY_LIMIT: f64 = 4.0;
/// Fraction of the limit a clamped chain is pulled back to.
const STABILITY_HEADROOM: f64 = 0.95;

/// Number of masses, guaranteed to fit the fixed storage.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub struct MassCount(usize);

impl MassCount {
    pub fn new(count: usize) -> ConfigResult<Self> {
        if (MIN_MASSES..=MAX_MASSES).contains(&count) {
            Ok(Self(count))
        } else {
            Err(ConfigError::MassCount {
                count,
                min: MIN_MASSES,
                max: MAX_MASSES,
            })
        }
    }

    pub fn get(self) -> usize {
        self.0
    }
}

impl Default for MassCount {
    fn default() -> Self {
        Self(10)
    }
}

impl TryFrom<usize> for MassCount {
    type Error = ConfigError;

    fn try_from(count: usize) -> ConfigResult<Self> {
        Self::new(count)
    }
}

/// Damping coefficient (1/s) for a 60 dB decay over `decay_time` seconds.
pub fn t60_coefficient(decay_time: f64) -> f64 {
    6.0 * 10f64.ln() / decay_time
}

/// Tridiagonal update matrix, stored as three bands.
#[derive(Clone, Copy, Debug, PartialEq)]
pub struct Tridiagonal {
    /// Coupling to mass i-1 (unused at i = 0).
    pub lower: [f64; MAX_MASSES],
    pub diag: [f64; MAX_MASSES],
    /// Coupling to mass i+1 (unused at i = N-1).
    pub upper: [f64; MAX_MASSES],
}

impl Tridiagonal {
    const ZERO: Self = Self {
        lower: [0.0; MAX_MASSES],
        diag: [0.0; MAX_MASSES],
        upper: [0.0; MAX_MASSES],
    };

    /// Build the update matrix for a damping coefficient `alpha`.
    ///
    /// Off-diagonal terms are normalized by the neighbour's mass. Each
    /// symmetric pair still multiplies to k^2 / (m_a m_b), so the spectrum
    /// is that of the physical chain.
    fn build(n: usize, masses: &[f64], springs: &[f64], dt: f64, alpha: f64) -> Self {
        let dt2 = dt * dt;
        let norm = 1.0 + alpha * dt;
        let mut m = Self::ZERO;
        for i in 0..n {
            m.diag[i] = (2.0 - (springs[i] + springs[i + 1]) * dt2 / masses[i]) / norm;
            if i > 0 {
                m.lower[i] = springs[i] * dt2 / masses[i - 1] / norm;
            }
            if i + 1 < n {
                m.upper[i] = springs[i + 1] * dt2 / masses[i + 1] / norm;
            }
        }
        m
    }

    /// Dense lookup; zero off the three bands.
    pub fn get(&self, row: usize, col: usize) -> f64 {
        if row == col {
            self.diag[row]
        } else if col + 1 == row {
            self.lower[row]
        } else if row + 1 == col {
            self.upper[row]
        } else {
            0.0
        }
    }
}

/// Everything `MassSpringNetwork::init` needs for one note.
#[derive(Clone, Copy, Debug, PartialEq)]
pub struct NetworkConfig {
    pub sample_rate: f64,
    pub mass_count: MassCount,
    /// Free-decay T60 (s). Also the time spent in free decay before stopping.
    pub decay_time: f64,
    pub mass1: f64,
    pub mass_increment: f64,
    pub spring1: f64,
    pub spring_increment: f64,
    pub velocity1: f64,
    pub velocity_increment: f64,
    /// Held/sustained T60 (s).
    pub sustain_decay_time: f64,
}

impl NetworkConfig {
    fn mass(&self, i: usize) -> f64 {
        self.mass1 + i as f64 * self.mass_increment
    }

    fn spring(&self, i: usize) -> f64 {
        self.spring1 + i as f64 * self.spring_increment
    }

    /// Gershgorin bound on the spectrum of dt^2 M^-1 K.
    ///
    /// Row i of M^-1 K has `(k_i + k_{i+1}) / m_i` on the diagonal and
    /// off-diagonal magnitudes summing to the same value.
    pub fn stiffness_bound(&self) -> f64 {
        let dt2 = (1.0 / self.sample_rate).powi(2);
        (0..self.mass_count.get())
            .map(|i| 2.0 * (self.spring(i) + self.spring(i + 1)) * dt2 / self.mass(i))
            .fold(0.0, f64::max)
    }

    /// Largest `spring1` that keeps `stiffness_bound` at the headroom
    /// target, or `None` when the spring increments alone exceed it.
    pub fn max_stable_spring1(&self) -> Option<f64> {
        let dt2 = (1.0 / self.sample_rate).powi(2);
        let target = STABILITY_HEADROOM * STABILITY_LIMIT;
        // 2 (2 s1 + (2i + 1) dk) dt^2 / m_i <= target, solved for s1.
        let limit = (0..self.mass_count.get())
            .map(|i| {
                let rows = (2 * i + 1) as f64 * self.spring_increment;
                (target * self.mass(i) / (2.0 * dt2) - rows) / 2.0
            })
            .fold(f64::INFINITY, f64::min);
        (limit.is_finite() && limit > 0.0).then_some(limit)
    }

    /// Pull `spring1` back under the stability limit.
    ///
    /// Fails when no positive `spring1` is stable for these masses and
    /// spring increments.
    pub fn stabilized(mut self) -> ConfigResult<Self> {
        let Some(max) = self.max_stable_spring1() else {
            let bound = NetworkConfig {
                spring1: 0.0,
                ..self
            }
            .stiffness_bound();
            return Err(ConfigError::Unstable {
                bound,
                limit: STABILITY_LIMIT,
            });
        };
        self.spring1 = self.spring1.min(max);
        Ok(self)
    }
}

pub struct MassSpringNetwork {
    n: usize,
    dt: f64,
    masses: [f64; MAX_MASSES],
    springs: [f64; MAX_MASSES + 1],
    velocities: [f64; MAX_MASSES],
    free: Tridiagonal,
    sustained: Tridiagonal,
    free_damping: f64,
    sustained_damping: f64,
    state: Generations<MAX_MASSES>,
    decay_count: u64,
    count_max: u64,
    time_to_stop: bool,
}

impl MassSpringNetwork {
    pub fn new() -> Self {
        Self {
            n: MIN_MASSES,
            dt: 0.0,
            masses: [0.0; MAX_MASSES],
            springs: [0.0; MAX_MASSES + 1],
            velocities: [0.0; MAX_MASSES],
            free: Tridiagonal::ZERO,
            sustained: Tridiagonal::ZERO,
            free_damping: 0.0,
            sustained_damping: 0.0,
            state: Generations::new(),
            decay_count: 0,
            count_max: 0,
            time_to_stop: false,
        }
    }

    /// Rebuild the chain for a new note. Does not allocate.
    pub fn init(&mut self, cfg: &NetworkConfig) {
        let n = cfg.mass_count.get();
        self.n = n;
        self.dt = 1.0 / cfg.sample_rate;

        self.masses = [0.0; MAX_MASSES];
        self.springs = [0.0; MAX_MASSES + 1];
        self.velocities = [0.0; MAX_MASSES];
        for i in 0..n {
            let f = i as f64;
            self.masses[i] = cfg.mass1 + f * cfg.mass_increment;
            self.springs[i] = cfg.spring1 + f * cfg.spring_increment;
            self.velocities[i] = cfg.velocity1 + f * cfg.velocity_increment;
        }
        self.springs[n] = cfg.spring1 + n as f64 * cfg.spring_increment;

        let alpha = t60_coefficient(cfg.decay_time);
        let alpha_sus = t60_coefficient(cfg.sustain_decay_time);
        self.free_damping = (1.0 - alpha * self.dt) / (1.0 + alpha * self.dt);
        self.sustained_damping = (1.0 - alpha_sus * self.dt) / (1.0 + alpha_sus * self.dt);
        self.free = Tridiagonal::build(n, &self.masses, &self.springs, self.dt, alpha);
        self.sustained = Tridiagonal::build(n, &self.masses, &self.springs, self.dt, alpha_sus);

        // Centred-difference start: x[-1] = 0, x[0] = dt * v.
        let mut start = [0.0f64; MAX_MASSES];
        for i in 0..n {
            start[i] = self.dt * self.velocities[i];
        }
        self.state.set_history(&start[..n], &[]);

        self.count_max = (n as f64 * cfg.decay_time * cfg.sample_rate) as u64;
        self.decay_count = 0;
        self.time_to_stop = false;
    }

    /// Advance one sample and return the summed positions.
    ///
    /// The sum is taken from the generation two steps back, so output lags
    /// the state by one sample.
    pub fn process(&mut self, sustain: bool, key_held: bool) -> f64 {
        let n = self.n;
        let held = sustain || key_held;
        let (matrix, damping) = if held {
            (&self.sustained, self.sustained_damping)
        } else {
            (&self.free, self.free_damping)
        };

        let (x, prev, prev2) = self.state.split();
        let mut output = 0.0;
        for i in 0..n {
            let mut v = matrix.diag[i] * prev[i];
            if i > 0 {
                v += matrix.lower[i] * prev[i - 1];
            }
            if i + 1 < n {
                v += matrix.upper[i] * prev[i + 1];
            }
            x[i] = v - prev2[i] * damping;
            output += prev2[i];
        }

        if !held {
            self.decay_count = self.decay_count.saturating_add(n as u64);
        }
        if self.decay_count > self.count_max {
            self.time_to_stop = true;
            self.decay_count = 0;
        }

        self.state.advance();
        output
    }

    pub fn is_time_to_stop(&self) -> bool {
        self.time_to_stop
    }

    pub fn clear_time_to_stop(&mut self) {
        self.time_to_stop = false;
    }

    pub fn mass_count(&self) -> usize {
        self.n
    }

    pub fn masses(&self) -> &[f64] {
        &self.masses[..self.n]
    }

    pub fn springs(&self) -> &[f64] {
        &self.springs[..=self.n]
    }

    pub fn velocities(&self) -> &[f64] {
        &self.velocities[..self.n]
    }

    pub fn free_matrix(&self) -> &Tridiagonal {
        &self.free
    }

    pub fn sustained_matrix(&self) -> &Tridiagonal {
        &self.sustained
    }

    /// Free-decay sample budget before the stop flag is raised.
    pub fn count_max(&self) -> u64 {
        self.count_max
    }

    /// Sum of squared positions in the most recent generation.
    pub fn energy(&self) -> f64 {
        self.state.previous()[..self.n].iter().map(|x| x * x).sum()
    }
}

impl Default for MassSpringNetwork {
    fn default() -> Self {
        Self::new()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::f64::consts::PI;

    const SR: f64 = 44100.0;

    fn config(mass_count: usize, decay_time: f64) -> NetworkConfig {
        let mass = 6.84f64.powi(2);
        NetworkConfig {
            sample_rate: SR,
            mass_count: MassCount::new(mass_count).unwrap(),
            decay_time,
            mass1: mass,
            mass_increment: 1.43f64.powi(2),
            spring1: (2.0 * PI * 220.0).powi(2) * mass,
            spring_increment: 1000.0f64.powi(2),
            velocity1: 0.4,
            velocity_increment: 0.08,
            sustain_decay_time: 35.0,
        }
    }

    #[test]
    fn test_mass_count_bounds() {
        assert!(MassCount::new(1).is_err());
        assert!(MassCount::new(21).is_err());
        assert_eq!(MassCount::try_from(20).unwrap().get(), 20);
    }

    #[test]
    fn test_progressions() {
        let mut net = MassSpringNetwork::new();
        let cfg = config(4, 1.0);
        net.init(&cfg);

        assert_eq!(net.masses().len(), 4);
        assert_eq!(net.springs().len(), 5);
        for i in 0..4 {
            let f = i as f64;
            assert_eq!(net.masses()[i], cfg.mass1 + f * cfg.mass_increment);
            assert_eq!(net.velocities()[i], cfg.velocity1 + f * cfg.velocity_increment);
        }
        assert_eq!(net.springs()[4], cfg.spring1 + 4.0 * cfg.spring_increment);
    }

    #[test]
    fn test_matrix_is_tridiagonal() {
        let mut net = MassSpringNetwork::new();
        net.init(&config(8, 1.0));
        let m = net.free_matrix();
        for row in 0..8 {
            for col in 0..8 {
                let v = m.get(row, col);
                if row.abs_diff(col) > 1 {
                    assert_eq!(v, 0.0);
                } else {
                    assert!(v != 0.0, "band entry ({row},{col}) is zero");
                }
            }
        }
        // Nothing leaks past the last mass.
        assert_eq!(m.upper[7], 0.0);
        assert_eq!(m.diag[8], 0.0);
    }

    #[test]
    fn test_matrix_entries() {
        let mut net = MassSpringNetwork::new();
        let cfg = config(3, 2.0);
        net.init(&cfg);

        let dt = 1.0 / SR;
        let alpha = t60_coefficient(2.0);
        let norm = 1.0 + alpha * dt;
        let m = net.masses();
        let k = net.springs();
        let a = net.free_matrix();

        let diag1 = (2.0 - (k[1] + k[2]) * dt * dt / m[1]) / norm;
        assert!((a.get(1, 1) - diag1).abs() < 1e-12);
        assert!((a.get(1, 0) - k[1] * dt * dt / m[0] / norm).abs() < 1e-15);
        assert!((a.get(1, 2) - k[2] * dt * dt / m[2] / norm).abs() < 1e-15);

        // Sustained matrix differs only through the damping normalization.
        let alpha_sus = t60_coefficient(35.0);
        let ratio = net.sustained_matrix().get(1, 1) / a.get(1, 1);
        assert!((ratio - norm / (1.0 + alpha_sus * dt)).abs() < 1e-12);
    }

    #[test]
    fn test_first_sample_is_silent() {
        let mut net = MassSpringNetwork::new();
        net.init(&config(10, 1.0));
        assert_eq!(net.process(false, true), 0.0);
        // Second sample reports the initial displacement dt * v.
        let expected: f64 = net.velocities().iter().map(|v| v / SR).sum();
        let y = net.process(false, true);
        assert!((y - expected).abs() < 1e-15);
    }

    #[test]
    fn test_stop_flag_timing() {
        let decay_time = 0.05;
        for count in MIN_MASSES..=MAX_MASSES {
            let mut net = MassSpringNetwork::new();
            net.init(&config(count, decay_time));

            let lower = (decay_time * SR) as u64;
            let mut samples = 0u64;
            while !net.is_time_to_stop() {
                net.process(false, false);
                samples += 1;
                assert!(samples <= net.count_max(), "mass count {count}: no stop within count_max");
            }
            assert!(samples >= lower, "mass count {count}: stopped after {samples}, before {lower}");
        }
    }

    #[test]
    fn test_stop_flag_retriggers() {
        let mut net = MassSpringNetwork::new();
        net.init(&config(5, 0.01));

        let run_until_stop = |net: &mut MassSpringNetwork| {
            let mut samples = 0u32;
            while !net.is_time_to_stop() {
                net.process(false, false);
                samples += 1;
            }
            samples
        };

        let first = run_until_stop(&mut net);
        net.clear_time_to_stop();
        let second = run_until_stop(&mut net);
        assert_eq!(first, second, "counter should restart from zero after each stop");
    }

    #[test]
    fn test_held_note_never_stops() {
        let mut net = MassSpringNetwork::new();
        net.init(&config(6, 0.01));
        for _ in 0..(SR as usize) {
            net.process(false, true);
        }
        assert!(!net.is_time_to_stop());
        for _ in 0..(SR as usize) {
            net.process(true, false);
        }
        assert!(!net.is_time_to_stop());
    }

    #[test]
    fn test_free_decay_is_passive() {
        let mut net = MassSpringNetwork::new();
        net.init(&config(10, 0.5));

        let window = (SR * 0.25) as usize;
        let mut peaks = Vec::new();
        for _ in 0..8 {
            let mut peak = 0.0f64;
            for _ in 0..window {
                let y = net.process(false, false);
                assert!(y.is_finite());
                peak = peak.max(y.abs());
            }
            peaks.push(peak);
        }
        for w in peaks.windows(2) {
            assert!(w[1] < w[0], "envelope grew: {peaks:?}");
        }
        assert!(net.energy() < 1e-12);
    }

    #[test]
    fn test_sustain_decays_slower() {
        let mut free = MassSpringNetwork::new();
        let mut held = MassSpringNetwork::new();
        free.init(&config(10, 0.5));
        held.init(&config(10, 0.5));

        for _ in 0..(SR as usize / 2) {
            free.process(false, false);
            held.process(true, false);
        }
        assert!(held.energy() > free.energy() * 100.0);
    }

    #[test]
    fn test_stabilized_clamps_stiff_chain() {
        let mut cfg = config(10, 0.5);
        cfg.spring1 = (2.0 * PI * 20000.0).powi(2) * cfg.mass1;
        assert!(cfg.stiffness_bound() > STABILITY_LIMIT);

        let cfg = cfg.stabilized().unwrap();
        assert!(cfg.stiffness_bound() <= STABILITY_HEADROOM * STABILITY_LIMIT + 1e-9);

        let mut net = MassSpringNetwork::new();
        net.init(&cfg);
        for _ in 0..(SR as usize) {
            let y = net.process(false, true);
            assert!(y.is_finite() && y.abs() < 1.0, "clamped chain blew up: {y}");
        }
    }

    #[test]
    fn test_stabilized_keeps_playable_chain() {
        let cfg = config(10, 0.5);
        assert!(cfg.stiffness_bound() < STABILITY_LIMIT);
        assert_eq!(cfg.stabilized().unwrap(), cfg);
    }

    #[test]
    fn test_unstable_increments_rejected() {
        let cfg = NetworkConfig {
            sample_rate: 8000.0,
            mass_count: MassCount::new(20).unwrap(),
            decay_time: 1.0,
            mass1: 9.0,
            mass_increment: 1e-4,
            spring1: 1.0,
            spring_increment: 25000.0f64.powi(2),
            velocity1: 0.5,
            velocity_increment: 0.1,
            sustain_decay_time: 35.0,
        };
        assert_eq!(cfg.max_stable_spring1(), None);
        assert!(matches!(cfg.stabilized(), Err(ConfigError::Unstable { .. })));
    }

    #[test]
    fn test_lowest_mode_frequency() {
        // Two equal masses, equal springs: modes at w0 and sqrt(3) w0 with
        // w0 = sqrt(k/m). Zero crossings of mass motion sit between them.
        let mut net = MassSpringNetwork::new();
        let m = 1.0;
        let f0 = 100.0;
        let cfg = NetworkConfig {
            sample_rate: SR,
            mass_count: MassCount::new(2).unwrap(),
            decay_time: 10.0,
            mass1: m,
            mass_increment: 0.0,
            spring1: (2.0 * PI * f0).powi(2) * m,
            spring_increment: 0.0,
            velocity1: 1.0,
            velocity_increment: 0.0,
            sustain_decay_time: 10.0,
        };
        net.init(&cfg);

        // Equal initial velocities excite only the in-phase mode at f0.
        let mut prev = net.process(true, false);
        let mut crossings = 0u32;
        for _ in 0..(SR as usize) {
            let y = net.process(true, false);
            if prev < 0.0 && y >= 0.0 {
                crossings += 1;
            }
            prev = y;
        }
        assert!(crossings.abs_diff(100) <= 1, "expected ~100 Hz, got {crossings}");
    }
}
