use anyhow::{bail, Result};
use serde::{Deserialize, Serialize};

/// Run-wide controls for a QSS simulation.
///
/// These replace what would otherwise be process-wide toggles: every
/// `Simulation` carries its own copy.
#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq)]
#[serde(default)]
pub struct SolverSettings {
    /// Time at which the initialization passes are evaluated.
    pub start_time: f64,
    /// Events strictly after this time are not processed.
    pub end_time: f64,
    /// Clip requantization steps at trajectory extrema/inflection points.
    pub inflection_steps: bool,
    /// Emit per-event requantization traces through `log::debug!`.
    pub diagnostics: bool,
    /// Default lower bound on a variable's time step.
    pub dt_min: f64,
    /// Default upper bound on a variable's time step (`None` = unbounded).
    pub dt_max: Option<f64>,
}

impl Default for SolverSettings {
    fn default() -> Self {
        Self {
            start_time: 0.0,
            end_time: 10.0,
            inflection_steps: false,
            diagnostics: false,
            dt_min: 0.0,
            dt_max: None,
        }
    }
}

impl SolverSettings {
    pub fn with_end_time(mut self, end_time: f64) -> Self {
        self.end_time = end_time;
        self
    }

    pub fn validate(&self) -> Result<()> {
        if !self.start_time.is_finite() {
            bail!("start_time must be finite.");
        }
        if !self.end_time.is_finite() {
            bail!("end_time must be finite.");
        }
        if self.end_time < self.start_time {
            bail!(
                "end_time ({}) must not precede start_time ({}).",
                self.end_time,
                self.start_time
            );
        }
        validate_step_bounds(self.dt_min, self.dt_max)
    }

    pub(crate) fn dt_max_or_infinity(&self) -> f64 {
        self.dt_max.unwrap_or(f64::INFINITY)
    }
}

/// Checks a (dt_min, dt_max) pair; shared with the per-variable overrides.
pub(crate) fn validate_step_bounds(dt_min: f64, dt_max: Option<f64>) -> Result<()> {
    if !dt_min.is_finite() || dt_min < 0.0 {
        bail!("dt_min must be finite and non-negative (got {}).", dt_min);
    }
    if let Some(dt_max) = dt_max {
        if dt_max.is_nan() || dt_max <= 0.0 {
            bail!("dt_max must be positive (got {}).", dt_max);
        }
        if dt_min > dt_max {
            bail!("dt_min ({}) must not exceed dt_max ({}).", dt_min, dt_max);
        }
    }
    Ok(())
}
