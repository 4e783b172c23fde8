//! Lock-step initialization.
//!
//! Every variable completes a pass before any variable starts the next one,
//! so each coefficient is computed from coefficients of the previous order
//! that are already final across the whole model.

use super::Simulation;
use crate::derivative::{Derivative, Representation};
use crate::error::QssResult;
use crate::variable::{Lifecycle, VarId};

impl Simulation {
    pub(super) fn initialize_variables(&mut self) -> QssResult<()> {
        self.events.clear();
        self.stats = Default::default();
        self.finalize_dependencies()?;

        let start = self.settings.start_time;
        for var in &mut self.variables {
            let value = var.initial;
            var.init0(value, start)?;
            if var.is_input() {
                var.sample_input(start)?;
            }
        }

        self.init_first_order(start);
        self.init_second_order(start);
        self.init_third_order(start);

        let inflection = self.settings.inflection_steps;
        for index in 0..self.variables.len() {
            self.variables[index].set_aligned_end_time(inflection);
            self.reschedule(VarId::new(index))?;
            self.variables[index].lifecycle = Lifecycle::Scheduled;
        }
        Ok(())
    }

    /// Registers observer edges and records which variables read themselves.
    fn finalize_dependencies(&mut self) -> QssResult<()> {
        for var in &mut self.variables {
            var.observers.clear();
            var.event = None;
        }
        for index in 0..self.variables.len() {
            let owner = VarId::new(index);
            let derivative = std::mem::take(&mut self.variables[index].derivative);
            let result = derivative.finalize(owner, &mut self.variables);
            self.variables[index].derivative = derivative;
            self.variables[index].self_observer = result?;
        }
        for var in &mut self.variables {
            var.observers.sort_unstable();
            var.observers.dedup();
        }
        Ok(())
    }

    fn init_first_order(&mut self, t: f64) {
        // Implicit pass
        for index in 0..self.variables.len() {
            if self.variables[index].order() != 1 || !self.variables[index].method.is_implicit() {
                continue;
            }
            self.settle_implicit(index, 1, Representation::Continuous, t);
        }

        // Explicit pass
        for index in 0..self.variables.len() {
            let var = &self.variables[index];
            if var.is_input() || (var.method.is_implicit() && var.order() == 1) {
                continue;
            }
            let rep = if var.method.is_implicit() {
                Representation::Continuous
            } else {
                Representation::Quantized
            };
            let slope = var.derivative.value(rep, t, &self.variables);
            let var = &mut self.variables[index];
            var.x[1] = slope;
            if var.order() > 1 {
                var.q[1] = slope;
            }
        }
    }

    fn init_second_order(&mut self, t: f64) {
        for index in 0..self.variables.len() {
            if self.variables[index].order() != 2 || !self.variables[index].method.is_implicit() {
                continue;
            }
            self.settle_implicit(index, 2, Representation::Continuous, t);
        }

        for index in 0..self.variables.len() {
            let var = &self.variables[index];
            if var.is_input() || var.method.is_implicit() || var.order() < 2 {
                continue;
            }
            let slope = var.derivative.slope(Representation::Quantized, t, &self.variables);
            let x2 = 0.5 * slope;
            let var = &mut self.variables[index];
            var.x[2] = x2;
            if var.order() > 2 {
                var.q[2] = x2;
            }
        }
    }

    fn init_third_order(&mut self, t: f64) {
        for index in 0..self.variables.len() {
            let var = &self.variables[index];
            if var.order() < 3 {
                continue;
            }
            let curvature = var
                .derivative
                .curvature(Representation::Quantized, t, &self.variables);
            self.variables[index].x[3] = curvature / 6.0;
        }
    }

    /// Implicit coefficient of order `k` at an aligned instant.
    ///
    /// Self-observers relax against their bounds. Otherwise the leading
    /// coefficient comes straight from the derivative and `q0` is offset
    /// toward it.
    pub(super) fn settle_implicit(
        &mut self,
        index: usize,
        k: usize,
        rep: Representation,
        t: f64,
    ) {
        let owner = VarId::new(index);
        let var = &self.variables[index];
        let derivative: &Derivative = &var.derivative;
        let vars = &self.variables;
        if var.self_observer {
            let (centre, q_tol) = (var.q_c, var.q_tol);
            if k == 1 {
                let bounds = derivative.first_order_bounds(owner, centre, q_tol, rep, t, vars);
                self.variables[index].relax_first_order(bounds);
            } else {
                let bounds = derivative.second_order_bounds(owner, centre, q_tol, rep, t, vars);
                self.variables[index].relax_second_order(bounds);
            }
        } else {
            let leading = if k == 1 {
                derivative.value(rep, t, vars)
            } else {
                0.5 * derivative.slope(rep, t, vars)
            };
            let var = &mut self.variables[index];
            var.x[k] = leading;
            var.bias_towards(leading);
        }
    }
}
