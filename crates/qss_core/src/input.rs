//! Time-driven inputs.
//!
//! An input variable has no derivative of its own. At every requantization
//! its value, slope and curvature are sampled from a function of time, and
//! other variables read it through their derivatives like any state.

use serde::{Deserialize, Serialize};
use std::fmt;

/// Smooth function of time driving an input variable.
///
/// Every method must return a finite value at the times the run samples.
pub trait InputFunction: fmt::Debug + Send + Sync {
    fn value(&self, t: f64) -> f64;

    /// First time derivative.
    fn slope(&self, t: f64) -> f64;

    /// Second time derivative.
    fn curvature(&self, t: f64) -> f64;
}

/// `offset + amplitude·sin(frequency·t)`
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct SineInput {
    pub offset: f64,
    pub amplitude: f64,
    /// Angular frequency in radians per unit time.
    pub frequency: f64,
}

impl Default for SineInput {
    fn default() -> Self {
        Self {
            offset: 0.0,
            amplitude: 1.0,
            frequency: 1.0,
        }
    }
}

impl SineInput {
    pub fn new(offset: f64, amplitude: f64) -> Self {
        Self {
            offset,
            amplitude,
            ..Self::default()
        }
    }

    pub fn with_frequency(mut self, frequency: f64) -> Self {
        self.frequency = frequency;
        self
    }
}

impl InputFunction for SineInput {
    fn value(&self, t: f64) -> f64 {
        self.offset + self.amplitude * (self.frequency * t).sin()
    }

    fn slope(&self, t: f64) -> f64 {
        self.amplitude * self.frequency * (self.frequency * t).cos()
    }

    fn curvature(&self, t: f64) -> f64 {
        let w = self.frequency;
        -self.amplitude * w * w * (w * t).sin()
    }
}
