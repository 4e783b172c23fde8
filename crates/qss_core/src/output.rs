//! Run observers and trajectory recording.
//!
//! Observers see the simulation only through `&Simulation`, and variables
//! only through [`Trajectory`], so sampling can never perturb a run.

use crate::simulation::Simulation;
use crate::traits::Trajectory;
use crate::variable::VarId;
use serde::{Deserialize, Serialize};
use std::fmt;

/// Hooks invoked by [`Simulation::run`]. Every method defaults to a no-op.
pub trait RunObserver {
    /// After initialization, before the first event.
    fn on_start(&mut self, _sim: &Simulation) {}

    /// Before processing the event instant `t_next`; every trajectory is
    /// still valid on `[time, t_next]`.
    fn on_advance(&mut self, _sim: &Simulation, _t_next: f64) {}

    /// After `triggers` requantized at `t` and observers were updated.
    fn on_requantize(&mut self, _sim: &Simulation, _t: f64, _triggers: &[VarId]) {}

    /// Once the next trigger lies past the end time.
    fn on_finish(&mut self, _sim: &Simulation) {}
}

impl RunObserver for () {}

/// One output record.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct Sample {
    pub time: f64,
    pub value: f64,
}

impl fmt::Display for Sample {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{} {}", self.time, self.value)
    }
}

/// Recorded quantized and continuous samples of one variable.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct Trace {
    pub name: String,
    pub q: Vec<Sample>,
    pub x: Vec<Sample>,
}

impl Trace {
    fn record(&mut self, var: &impl Trajectory, t: f64) {
        self.q.push(Sample {
            time: t,
            value: var.q(t),
        });
        self.x.push(Sample {
            time: t,
            value: var.x(t),
        });
    }
}

#[derive(Debug, Clone, Copy, Default, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct RecorderSettings {
    /// Fixed sampling interval between events (`None` disables it).
    pub sample_step: Option<f64>,
    /// Record every variable at each event, not just the triggers.
    pub all_variables: bool,
}

/// Collects [`Trace`]s during a run.
///
/// Samples are taken at the start time, at every requantization of a
/// variable, on the optional fixed grid, and once more at the end time for
/// variables whose last requantization precedes it.
#[derive(Debug, Clone, Default)]
pub struct Recorder {
    settings: RecorderSettings,
    traces: Vec<Trace>,
    next_sample: f64,
    sample_index: u64,
    origin: f64,
}

impl Recorder {
    pub fn new(settings: RecorderSettings) -> Self {
        Self {
            settings,
            ..Self::default()
        }
    }

    pub fn traces(&self) -> &[Trace] {
        &self.traces
    }

    pub fn trace(&self, name: &str) -> Option<&Trace> {
        self.traces.iter().find(|trace| trace.name == name)
    }

    pub fn into_traces(self) -> Vec<Trace> {
        self.traces
    }

    fn sample_grid_until(&mut self, sim: &Simulation, limit: f64) {
        let Some(step) = self.settings.sample_step else {
            return;
        };
        while self.next_sample < limit {
            for (trace, var) in self.traces.iter_mut().zip(sim.variables()) {
                trace.record(var, self.next_sample);
            }
            self.sample_index += 1;
            // Multiply rather than accumulate so the grid does not drift
            self.next_sample = self.origin + self.sample_index as f64 * step;
        }
    }
}

impl RunObserver for Recorder {
    fn on_start(&mut self, sim: &Simulation) {
        let t = sim.time();
        self.traces = sim
            .variables()
            .iter()
            .map(|var| {
                let mut trace = Trace {
                    name: var.name().to_string(),
                    ..Trace::default()
                };
                trace.record(var, t);
                trace
            })
            .collect();
        self.origin = t;
        self.sample_index = 1;
        self.next_sample = match self.settings.sample_step {
            Some(step) if step > 0.0 => t + step,
            _ => f64::INFINITY,
        };
    }

    fn on_advance(&mut self, sim: &Simulation, t_next: f64) {
        self.sample_grid_until(sim, t_next);
    }

    fn on_requantize(&mut self, sim: &Simulation, t: f64, triggers: &[VarId]) {
        if self.settings.all_variables {
            for (trace, var) in self.traces.iter_mut().zip(sim.variables()) {
                trace.record(var, t);
            }
        } else {
            for &id in triggers {
                if let Some(trace) = self.traces.get_mut(id.index()) {
                    trace.record(sim.variable(id), t);
                }
            }
        }
    }

    fn on_finish(&mut self, sim: &Simulation) {
        let end = sim.settings().end_time;
        self.sample_grid_until(sim, end);
        for (trace, var) in self.traces.iter_mut().zip(sim.variables()) {
            if var.t_q() < end {
                trace.record(var, end);
            }
        }
    }
}
