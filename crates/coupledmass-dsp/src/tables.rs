/// Fixed tables: pitch conversion and the sympathetic string bank.
///
/// The bank is eight steel-cored strings in two gauges. Lengths are chosen
/// so the open strings sit on a drone chord; string 3 switches between a
/// sharpened fourth (default) and a perfect fourth.

pub const MIDI_LO: u8 = 0;
pub const MIDI_HI: u8 = 127;

/// Number of strings in the sympathetic bank.
pub const STRING_COUNT: usize = 8;

/// Index of the string retuned by the perfect-fourth switch.
pub const FOURTH_STRING: usize = 3;
/// Length of the retunable string in perfect-fourth tuning (m).
pub const FOURTH_LENGTH_PERFECT: f64 = 0.5791;
/// Length of the retunable string in sharpened-fourth tuning (m).
pub const FOURTH_LENGTH_SHARP: f64 = 0.5466;

/// MIDI note number to fundamental frequency (Hz), A440 tuning.
///
/// Takes `f64` so octave-shifted notes past 127 still map.
pub fn midi_to_freq(midi: f64) -> f64 {
    440.0 * f64::powf(2.0, (midi - 69.0) / 12.0)
}

/// Physical description of one string.
#[derive(Clone, Copy, Debug, PartialEq)]
pub struct StringPhysics {
    /// Tension (N).
    pub tension: f64,
    /// Radius (m).
    pub radius: f64,
    /// Bending stiffness term E*I (N*m^2), scaled per unit cross-section.
    pub stiffness: f64,
    /// Nominal (untuned) length (m).
    pub length: f64,
    /// Density (kg/m^3).
    pub density: f64,
}

const HEAVY: StringPhysics = StringPhysics {
    tension: 53.4,
    radius: 0.000415,
    stiffness: 0.00016,
    length: 0.0,
    density: 959.0,
};

const LIGHT: StringPhysics = StringPhysics {
    tension: 70.3,
    radius: 0.000362,
    stiffness: 0.00013,
    length: 0.0,
    density: 923.3,
};

const fn with_length(base: StringPhysics, length: f64) -> StringPhysics {
    StringPhysics { length, ..base }
}

/// Default bank: three heavy strings, five light.
pub const STRING_BANK: [StringPhysics; STRING_COUNT] = [
    with_length(HEAVY, 0.5791),
    with_length(HEAVY, 0.5159),
    with_length(HEAVY, 0.4596),
    with_length(LIGHT, FOURTH_LENGTH_SHARP),
    with_length(LIGHT, 0.5159),
    with_length(LIGHT, 0.4596),
    with_length(LIGHT, 0.4095),
    with_length(LIGHT, 0.3865),
];

/// String physics for bank slot `index` under the selected fourth tuning.
pub fn string_physics(index: usize, perfect_fourth: bool) -> StringPhysics {
    let mut physics = STRING_BANK[index];
    if index == FOURTH_STRING {
        physics.length = if perfect_fourth {
            FOURTH_LENGTH_PERFECT
        } else {
            FOURTH_LENGTH_SHARP
        };
    }
    physics
}
