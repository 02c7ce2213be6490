//! Coupled-mass DSP library — mass-spring voices, sympathetic strings and
//! chorus.
//!
//! Pure DSP math with no audio framework dependencies.

pub mod error;

// Voice synthesis
pub mod generations;
pub mod mass_spring;
pub mod tables;
pub mod voice;

// Shared effects chain
pub mod chorus;
pub mod filters;
pub mod oscillator;
pub mod stiff_string;

// Host-facing engine
pub mod engine;
pub mod params;

pub use engine::{Engine, EngineEvent, TimedEvent};
pub use error::{ConfigError, ConfigResult};
pub use params::EngineParams;
