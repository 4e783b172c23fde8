//! Simulation context: variable arena, event schedule and the master loop.
//!
//! A `Simulation` is built in two stages. First variables are added and
//! their derivatives wired with [`Simulation::derivative_mut`]. Then
//! [`Simulation::run`] (or [`Simulation::initialize`] followed by repeated
//! [`Simulation::step`] calls) drives the event loop until `end_time`.

mod advance;
mod initialize;

use crate::derivative::Derivative;
use crate::event_queue::EventQueue;
use crate::input::InputFunction;
use crate::output::RunObserver;
use crate::settings::{validate_step_bounds, SolverSettings};
use crate::variable::{Lifecycle, Method, VarId, Variable};
use anyhow::{bail, Context, Result};
use log::debug;
use serde::{Deserialize, Serialize};
use std::sync::Arc;

/// Counters accumulated over one run.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct RunStats {
    /// Number of variable requantizations, solo and simultaneous.
    pub requantizations: u64,
    /// Number of event instants with two or more triggers.
    pub simultaneous_events: u64,
    /// Number of observer updates that changed a continuous trajectory.
    pub observer_updates: u64,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Status {
    Building,
    Running,
    Finished,
}

#[derive(Debug, Clone)]
pub struct Simulation {
    settings: SolverSettings,
    variables: Vec<Variable>,
    events: EventQueue<VarId>,
    time: f64,
    stats: RunStats,
    status: Status,
}

impl Simulation {
    pub fn new(settings: SolverSettings) -> Self {
        Self {
            time: settings.start_time,
            settings,
            variables: Vec::new(),
            events: EventQueue::new(),
            stats: RunStats::default(),
            status: Status::Building,
        }
    }

    pub fn settings(&self) -> &SolverSettings {
        &self.settings
    }

    /// Time of the most recent event instant (start time before the first).
    pub fn time(&self) -> f64 {
        self.time
    }

    pub fn stats(&self) -> RunStats {
        self.stats
    }

    pub fn status(&self) -> Status {
        self.status
    }

    pub fn events(&self) -> &EventQueue<VarId> {
        &self.events
    }

    pub fn variables(&self) -> &[Variable] {
        &self.variables
    }

    /// Panics if `id` did not come from this simulation.
    pub fn variable(&self, id: VarId) -> &Variable {
        &self.variables[id.index()]
    }

    pub fn variable_id(&self, name: &str) -> Option<VarId> {
        self.variables
            .iter()
            .position(|v| v.name == name)
            .map(VarId::new)
    }

    pub fn ids(&self) -> impl Iterator<Item = VarId> {
        (0..self.variables.len()).map(VarId::new)
    }

    /// Adds a state variable with its initial value.
    ///
    /// The derivative starts empty (constant zero); wire it with
    /// [`Simulation::derivative_mut`].
    pub fn add_variable(
        &mut self,
        name: &str,
        method: Method,
        a_tol: f64,
        r_tol: f64,
        initial: f64,
    ) -> Result<VarId> {
        self.ensure_building("add_variable")?;
        self.check_new_variable(name, a_tol, r_tol)?;
        if !initial.is_finite() {
            bail!("Initial value for '{name}' must be finite (got {initial}).");
        }
        Ok(self.push_variable(name, method, a_tol, r_tol, initial))
    }

    /// Adds an input variable driven by `function`.
    ///
    /// Inputs quantize at second order and have no derivative. They
    /// requantize on their own schedule, honour the step bounds, and are
    /// read by other variables' derivatives like any state.
    pub fn add_input(
        &mut self,
        name: &str,
        function: impl InputFunction + 'static,
        a_tol: f64,
        r_tol: f64,
    ) -> Result<VarId> {
        self.ensure_building("add_input")?;
        self.check_new_variable(name, a_tol, r_tol)?;
        let initial = function.value(self.settings.start_time);
        if !initial.is_finite() {
            bail!("Input '{name}' must be finite at the start time (got {initial}).");
        }
        let id = self.push_variable(name, Method::Qss2, a_tol, r_tol, initial);
        self.variables[id.index()].input = Some(Arc::new(function));
        Ok(id)
    }

    pub fn derivative_mut(&mut self, id: VarId) -> Result<&mut Derivative> {
        self.ensure_building("derivative_mut")?;
        let var = self.variable_mut(id)?;
        if var.is_input() {
            bail!("Input variable '{}' has no derivative.", var.name);
        }
        Ok(&mut var.derivative)
    }

    pub fn set_dt_min(&mut self, id: VarId, dt_min: f64) -> Result<()> {
        self.ensure_building("set_dt_min")?;
        let var = self.variable_mut(id)?;
        validate_step_bounds(dt_min, Some(var.dt_max).filter(|v| v.is_finite()))
            .with_context(|| format!("Invalid step bounds for '{}'", var.name))?;
        var.dt_min = dt_min;
        Ok(())
    }

    pub fn set_dt_max(&mut self, id: VarId, dt_max: Option<f64>) -> Result<()> {
        self.ensure_building("set_dt_max")?;
        let var = self.variable_mut(id)?;
        validate_step_bounds(var.dt_min, dt_max)
            .with_context(|| format!("Invalid step bounds for '{}'", var.name))?;
        var.dt_max = dt_max.unwrap_or(f64::INFINITY);
        Ok(())
    }

    /// Finalizes the dependency graph and runs the staged initialization.
    pub fn initialize(&mut self) -> Result<()> {
        self.ensure_building("initialize")?;
        self.settings.validate()?;
        self.initialize_variables()
            .context("Failed to initialize simulation")?;
        self.time = self.settings.start_time;
        self.status = Status::Running;
        debug!(
            "initialized {} variables at t={}, first trigger at t={}",
            self.variables.len(),
            self.time,
            self.events.top_time()
        );
        Ok(())
    }

    /// Processes the next event instant.
    ///
    /// Returns the variables that requantized, or `None` once the next
    /// trigger lies past `end_time` (the run is then finished).
    pub fn step(&mut self) -> Result<Option<Vec<VarId>>> {
        match self.status {
            Status::Running => {}
            Status::Building => bail!("initialize() must be called before step()."),
            Status::Finished => return Ok(None),
        }

        let t = self.events.top_time();
        if t.is_nan() || t > self.settings.end_time {
            self.finish();
            return Ok(None);
        }

        let triggers = if self.events.simultaneous() {
            let triggers = self.events.simultaneous_variables();
            self.advance_simultaneous(t, &triggers)
                .with_context(|| format!("Simultaneous requantization failed at t={t}"))?;
            triggers
        } else {
            let Some(id) = self.events.top() else {
                bail!("Event queue emptied during step.");
            };
            self.advance_solo(id)
                .with_context(|| format!("Requantization failed at t={t}"))?;
            vec![id]
        };
        self.time = t;
        Ok(Some(triggers))
    }

    /// Runs from the current state to `end_time`, reporting to `observer`.
    ///
    /// A finished simulation returns its stats without calling `observer`;
    /// use [`Simulation::reset`] to run it again.
    pub fn run<O: RunObserver>(&mut self, observer: &mut O) -> Result<RunStats> {
        match self.status {
            Status::Building => self.initialize()?,
            Status::Running => {}
            Status::Finished => {
                debug!("run() on a finished simulation at t={}", self.time);
                return Ok(self.stats);
            }
        }
        observer.on_start(self);
        while self.status == Status::Running {
            let t = self.events.top_time();
            if t <= self.settings.end_time {
                observer.on_advance(self, t);
            }
            match self.step()? {
                Some(triggers) => observer.on_requantize(self, t, &triggers),
                None => break,
            }
        }
        observer.on_finish(self);
        debug!(
            "run finished at t={}: {} requantizations, {} simultaneous, {} observer updates",
            self.time,
            self.stats.requantizations,
            self.stats.simultaneous_events,
            self.stats.observer_updates
        );
        Ok(self.stats)
    }

    /// Returns to the building stage, keeping the model definition.
    pub fn reset(&mut self) {
        self.events.clear();
        for var in &mut self.variables {
            var.observers.clear();
            var.event = None;
            var.self_observer = false;
            var.lifecycle = Lifecycle::Uninitialized;
        }
        self.time = self.settings.start_time;
        self.stats = RunStats::default();
        self.status = Status::Building;
    }

    fn finish(&mut self) {
        for var in &mut self.variables {
            var.lifecycle = Lifecycle::Finalized;
        }
        self.time = self.settings.end_time;
        self.status = Status::Finished;
    }

    fn ensure_building(&self, operation: &str) -> Result<()> {
        if self.status != Status::Building {
            bail!(
                "{} is only allowed before initialization (status: {:?}).",
                operation,
                self.status
            );
        }
        Ok(())
    }

    fn check_new_variable(&self, name: &str, a_tol: f64, r_tol: f64) -> Result<()> {
        if name.is_empty() {
            bail!("Variable name must not be empty.");
        }
        if self.variable_id(name).is_some() {
            bail!("Variable '{}' already exists.", name);
        }
        if !(a_tol > 0.0 && a_tol.is_finite()) {
            bail!("Absolute tolerance for '{name}' must be positive and finite (got {a_tol}).");
        }
        if !(r_tol >= 0.0 && r_tol.is_finite()) {
            bail!("Relative tolerance for '{name}' must be non-negative and finite (got {r_tol}).");
        }
        Ok(())
    }

    fn push_variable(
        &mut self,
        name: &str,
        method: Method,
        a_tol: f64,
        r_tol: f64,
        initial: f64,
    ) -> VarId {
        let id = VarId::new(self.variables.len());
        self.variables.push(Variable::new(
            name,
            method,
            a_tol,
            r_tol,
            initial,
            self.settings.dt_min,
            self.settings.dt_max_or_infinity(),
        ));
        id
    }

    fn variable_mut(&mut self, id: VarId) -> Result<&mut Variable> {
        let count = self.variables.len();
        match self.variables.get_mut(id.index()) {
            Some(var) => Ok(var),
            None => bail!("Unknown variable {} ({} defined).", id, count),
        }
    }
}
