//! Requantization and observer propagation.

use super::Simulation;
use crate::derivative::Representation;
use crate::error::QssResult;
use crate::variable::VarId;
use log::{debug, trace};

impl Simulation {
    /// Requantizes a single trigger and notifies its observers.
    pub(super) fn advance_solo(&mut self, id: VarId) -> QssResult<()> {
        let index = id.index();
        self.variables[index].ensure_scheduled()?;
        let (input, implicit, self_observer) = {
            let var = &self.variables[index];
            (var.is_input(), var.method.is_implicit(), var.self_observer)
        };
        self.variables[index].commit_centre(input || self_observer)?;
        let t = self.variables[index].t_q;
        let n = self.variables[index].order();

        match (implicit, self_observer) {
            _ if input => self.variables[index].sample_input(t)?,
            (false, true) => {
                for k in 1..=n {
                    self.explicit_coefficient(index, k, t);
                }
            }
            (false, false) => self.variables[index].expand_quantized(),
            (true, true) => self.settle_implicit(index, n, Representation::Quantized, t),
            (true, false) => {
                let var = &mut self.variables[index];
                let leading = var.x[n];
                var.bias_towards(leading);
                if n == 2 {
                    var.q[1] = var.x1(t);
                }
            }
        }

        let inflection = self.settings.inflection_steps;
        let t_e = self.variables[index].set_aligned_end_time(inflection);
        self.reschedule(id)?;
        self.stats.requantizations += 1;
        if self.settings.diagnostics {
            let var = &self.variables[index];
            debug!(
                "! {}({}) t={} q={} qTol={} tE={}",
                var.name, var.method, t, var.q[0], var.q_tol, t_e
            );
        }

        self.notify_observers(id, t)
    }

    /// Requantizes every variable tied at `t`, phase by phase, before any
    /// observer is notified.
    pub(super) fn advance_simultaneous(&mut self, t: f64, triggers: &[VarId]) -> QssResult<()> {
        trace!(
            "simultaneous requantization of {} variables at t={}",
            triggers.len(),
            t
        );
        for &id in triggers {
            let var = &mut self.variables[id.index()];
            var.ensure_scheduled()?;
            var.commit_centre(true)?;
            if var.is_input() {
                var.sample_input(t)?;
            }
        }

        let inflection = self.settings.inflection_steps;
        for k in 1..=3 {
            for &id in triggers {
                let var = &self.variables[id.index()];
                if var.method.is_implicit() && var.order() == k {
                    self.settle_implicit(id.index(), k, Representation::Continuous, t);
                }
            }
            for &id in triggers {
                let index = id.index();
                let var = &self.variables[index];
                let explicit = !var.is_input() && !var.method.is_implicit();
                if explicit && var.order() >= k {
                    self.explicit_coefficient(index, k, t);
                } else if var.method.is_implicit() && var.order() == 2 && k == 1 {
                    let vars = &self.variables;
                    let slope = var.derivative.value(Representation::Continuous, t, vars);
                    let var = &mut self.variables[index];
                    var.x[1] = slope;
                    var.q[1] = slope;
                }
                if self.variables[index].order() == k {
                    let t_e = self.variables[index].set_aligned_end_time(inflection);
                    self.reschedule(id)?;
                    if self.settings.diagnostics {
                        let var = &self.variables[index];
                        debug!(
                            "* {}({}) t={} q={} qTol={} tE={}",
                            var.name, var.method, t, var.q[0], var.q_tol, t_e
                        );
                    }
                }
            }
        }
        self.stats.requantizations += triggers.len() as u64;
        self.stats.simultaneous_events += 1;

        for &id in triggers {
            self.notify_observers(id, t)?;
        }
        Ok(())
    }

    /// Brings an observer's continuous trajectory up to date at `t`.
    pub(crate) fn advance_observer(&mut self, id: VarId, t: f64) -> QssResult<()> {
        let index = id.index();
        let var = &self.variables[index];
        var.ensure_scheduled()?;
        if !(var.t_x <= t && t <= var.t_e) {
            return Err(var.invariant(format!(
                "observer update at t={} outside [tX={}, tE={}]",
                t, var.t_x, var.t_e
            )));
        }
        if t == var.t_x {
            return Ok(());
        }

        let n = var.order();
        let (d, vars) = (&var.derivative, &self.variables);
        let mut coeffs = [var.x(t), 0.0, 0.0, 0.0];
        coeffs[1] = d.value(Representation::Quantized, t, vars);
        if n >= 2 {
            coeffs[2] = 0.5 * d.slope(Representation::Quantized, t, vars);
        }
        if n >= 3 {
            coeffs[3] = d.curvature(Representation::Quantized, t, vars) / 6.0;
        }

        let var = &mut self.variables[index];
        var.x = coeffs;
        var.t_x = t;
        let t_e = var.set_unaligned_end_time(self.settings.inflection_steps);
        self.reschedule(id)?;
        self.stats.observer_updates += 1;
        if self.settings.diagnostics {
            let var = &self.variables[index];
            debug!(
                "  ^ {}({}) t={} x={} tE={}",
                var.name, var.method, t, var.x[0], t_e
            );
        }
        Ok(())
    }

    fn notify_observers(&mut self, id: VarId, t: f64) -> QssResult<()> {
        let observers = self.variables[id.index()].observers.clone();
        for observer in observers {
            if observer != id {
                self.advance_observer(observer, t)?;
            }
        }
        Ok(())
    }

    /// Explicit coefficient `k` from the quantized derivative at `t`.
    ///
    /// The quantized trajectory shares every coefficient below the order.
    fn explicit_coefficient(&mut self, index: usize, k: usize, t: f64) {
        let var = &self.variables[index];
        let d = &var.derivative;
        let value = match k {
            1 => d.value(Representation::Quantized, t, &self.variables),
            2 => 0.5 * d.slope(Representation::Quantized, t, &self.variables),
            _ => d.curvature(Representation::Quantized, t, &self.variables) / 6.0,
        };
        let var = &mut self.variables[index];
        var.x[k] = value;
        if k < var.order() {
            var.q[k] = value;
        }
    }

    /// Moves (or first places) a variable's entry to its current `tE`.
    pub(super) fn reschedule(&mut self, id: VarId) -> QssResult<()> {
        let var = &mut self.variables[id.index()];
        if var.t_e.is_nan() {
            return Err(var.invariant("trigger time is NaN"));
        }
        let handle = match var.event {
            Some(handle) => match self.events.shift(var.t_e, handle) {
                Some(moved) => moved,
                None => return Err(var.invariant("stale event handle")),
            },
            None => self.events.add(var.t_e, id),
        };
        var.event = Some(handle);
        Ok(())
    }
}
