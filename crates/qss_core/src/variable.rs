//! Per-quantity QSS state.
//!
//! A variable carries two polynomial trajectories. The continuous one,
//! `x`, has degree equal to the method order and is anchored at `tX`. The
//! quantized one, `q`, is one degree lower, anchored at `tQ`, and is what
//! every observer reads. Requantization times `tE` come from how far the two
//! may drift apart (`qTol`), see [`end_time`].
//!
//! The variable only holds its own state. Anything that needs to read other
//! variables (derivative evaluation, relaxation bounds, observer updates) is
//! driven from [`crate::simulation`], which owns the arena.
//!
//! Input variables quantize like QSS2 but take every coefficient from an
//! [`InputFunction`] instead of a derivative.

mod end_time;
mod relaxation;

use crate::derivative::{Derivative, Representation};
use crate::error::{QssError, QssResult};
use crate::event_queue::EventHandle;
use crate::input::InputFunction;
use crate::polynomial::{evaluate, evaluate_derivative};
use crate::traits::Trajectory;
use serde::{Deserialize, Serialize};
use std::fmt;
use std::sync::Arc;

/// Index of a variable in its simulation's arena.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash)]
pub struct VarId(usize);

impl VarId {
    pub(crate) fn new(index: usize) -> Self {
        VarId(index)
    }

    pub fn index(self) -> usize {
        self.0
    }
}

impl fmt::Display for VarId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "#{}", self.0)
    }
}

/// Integration scheme of a variable.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum Method {
    Qss1,
    Qss2,
    Qss3,
    /// Linearly implicit QSS1.
    Liqss1,
    /// Linearly implicit QSS2.
    Liqss2,
}

impl Method {
    pub fn order(self) -> usize {
        match self {
            Method::Qss1 | Method::Liqss1 => 1,
            Method::Qss2 | Method::Liqss2 => 2,
            Method::Qss3 => 3,
        }
    }

    pub fn is_implicit(self) -> bool {
        matches!(self, Method::Liqss1 | Method::Liqss2)
    }
}

impl fmt::Display for Method {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let label = match self {
            Method::Qss1 => "QSS1",
            Method::Qss2 => "QSS2",
            Method::Qss3 => "QSS3",
            Method::Liqss1 => "LIQSS1",
            Method::Liqss2 => "LIQSS2",
        };
        f.write_str(label)
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Lifecycle {
    Uninitialized,
    Initializing,
    Scheduled,
    Finalized,
}

#[derive(Debug, Clone)]
pub struct Variable {
    pub(crate) name: String,
    pub(crate) method: Method,
    pub(crate) a_tol: f64,
    pub(crate) r_tol: f64,
    pub(crate) q_tol: f64,
    pub(crate) initial: f64,
    pub(crate) t_x: f64,
    pub(crate) t_q: f64,
    pub(crate) t_e: f64,
    /// Continuous coefficients relative to `t_x`; entries past the order stay zero.
    pub(crate) x: [f64; 4],
    /// Quantized coefficients relative to `t_q`; entries at or past the order stay zero.
    pub(crate) q: [f64; 3],
    /// Quantized centre: the committed value before any LIQSS offset.
    pub(crate) q_c: f64,
    pub(crate) dt_min: f64,
    pub(crate) dt_max: f64,
    pub(crate) self_observer: bool,
    pub(crate) derivative: Derivative,
    /// Driving function of an input variable.
    pub(crate) input: Option<Arc<dyn InputFunction>>,
    pub(crate) observers: Vec<VarId>,
    pub(crate) event: Option<EventHandle>,
    pub(crate) lifecycle: Lifecycle,
}

impl Variable {
    pub(crate) fn new(
        name: impl Into<String>,
        method: Method,
        a_tol: f64,
        r_tol: f64,
        initial: f64,
        dt_min: f64,
        dt_max: f64,
    ) -> Self {
        Self {
            name: name.into(),
            method,
            a_tol,
            r_tol,
            q_tol: a_tol,
            initial,
            t_x: 0.0,
            t_q: 0.0,
            t_e: f64::INFINITY,
            x: [0.0; 4],
            q: [0.0; 3],
            q_c: initial,
            dt_min,
            dt_max,
            self_observer: false,
            derivative: Derivative::new(),
            input: None,
            observers: Vec::new(),
            event: None,
            lifecycle: Lifecycle::Uninitialized,
        }
    }

    pub fn name(&self) -> &str {
        &self.name
    }

    pub fn method(&self) -> Method {
        self.method
    }

    pub fn order(&self) -> usize {
        self.method.order()
    }

    pub fn a_tol(&self) -> f64 {
        self.a_tol
    }

    pub fn r_tol(&self) -> f64 {
        self.r_tol
    }

    pub fn q_tol(&self) -> f64 {
        self.q_tol
    }

    pub fn initial_value(&self) -> f64 {
        self.initial
    }

    pub fn t_x(&self) -> f64 {
        self.t_x
    }

    pub fn t_q(&self) -> f64 {
        self.t_q
    }

    pub fn t_e(&self) -> f64 {
        self.t_e
    }

    pub fn centre(&self) -> f64 {
        self.q_c
    }

    pub fn dt_min(&self) -> f64 {
        self.dt_min
    }

    pub fn dt_max(&self) -> f64 {
        self.dt_max
    }

    pub fn self_observer(&self) -> bool {
        self.self_observer
    }

    pub fn derivative(&self) -> &Derivative {
        &self.derivative
    }

    pub fn is_input(&self) -> bool {
        self.input.is_some()
    }

    /// Variables whose derivatives read this one, sorted and de-duplicated.
    pub fn observers(&self) -> &[VarId] {
        &self.observers
    }

    pub fn lifecycle(&self) -> Lifecycle {
        self.lifecycle
    }

    /// Continuous coefficients `x0..=xn` relative to `tX`.
    pub fn continuous_coefficients(&self) -> &[f64] {
        &self.x[..=self.order()]
    }

    /// Quantized coefficients `q0..q(n-1)` relative to `tQ`.
    pub fn quantized_coefficients(&self) -> &[f64] {
        &self.q[..self.order()]
    }

    /// Continuous value, valid on `[tX, tE]`.
    ///
    /// Release builds extrapolate the polynomial outside that segment.
    pub fn x(&self, t: f64) -> f64 {
        debug_assert!(
            self.t_x <= t && t <= self.t_e,
            "{}: x({t}) outside [{}, {}]",
            self.name,
            self.t_x,
            self.t_e
        );
        evaluate(self.continuous_coefficients(), t - self.t_x)
    }

    pub fn x1(&self, t: f64) -> f64 {
        evaluate_derivative(self.continuous_coefficients(), 1, t - self.t_x)
    }

    pub fn x2(&self, t: f64) -> f64 {
        evaluate_derivative(self.continuous_coefficients(), 2, t - self.t_x)
    }

    /// Quantized value, valid on `[tQ, tE]`; extrapolated outside it like
    /// [`Variable::x`].
    pub fn q(&self, t: f64) -> f64 {
        debug_assert!(
            self.t_q <= t && t <= self.t_e,
            "{}: q({t}) outside [{}, {}]",
            self.name,
            self.t_q,
            self.t_e
        );
        evaluate(self.quantized_coefficients(), t - self.t_q)
    }

    pub fn q1(&self, t: f64) -> f64 {
        evaluate_derivative(self.quantized_coefficients(), 1, t - self.t_q)
    }

    pub fn q2(&self, t: f64) -> f64 {
        evaluate_derivative(self.quantized_coefficients(), 2, t - self.t_q)
    }

    pub fn value(&self, rep: Representation, t: f64) -> f64 {
        match rep {
            Representation::Continuous => self.x(t),
            Representation::Quantized => self.q(t),
        }
    }

    pub fn slope(&self, rep: Representation, t: f64) -> f64 {
        match rep {
            Representation::Continuous => self.x1(t),
            Representation::Quantized => self.q1(t),
        }
    }

    pub fn curvature(&self, rep: Representation, t: f64) -> f64 {
        match rep {
            Representation::Continuous => self.x2(t),
            Representation::Quantized => self.q2(t),
        }
    }

    /// Recomputes `qTol = max(aTol, rTol·|centre|)` from the current centre.
    pub(crate) fn set_q_tol(&mut self) -> QssResult<()> {
        self.q_tol = self.a_tol.max(self.r_tol * self.q_c.abs());
        if !(self.q_tol > 0.0 && self.q_tol.is_finite()) {
            return Err(self.invariant(format!(
                "qTol must be positive and finite (got {})",
                self.q_tol
            )));
        }
        Ok(())
    }

    /// First initialization pass: both trajectories become the constant `value`.
    pub(crate) fn init0(&mut self, value: f64, t: f64) -> QssResult<()> {
        self.x = [value, 0.0, 0.0, 0.0];
        self.q = [value, 0.0, 0.0];
        self.q_c = value;
        self.t_x = t;
        self.t_q = t;
        self.t_e = f64::INFINITY;
        self.lifecycle = Lifecycle::Initializing;
        self.set_q_tol()
    }

    /// Commits the quantized centre at the current trigger time.
    ///
    /// `tQ` moves to `tE`. When `align` is set the continuous trajectory is
    /// re-anchored there too and collapses to the committed constant.
    pub(crate) fn commit_centre(&mut self, align: bool) -> QssResult<()> {
        let t = self.t_e;
        if t < self.t_q || t < self.t_x {
            return Err(self.invariant(format!(
                "trigger time {} precedes tQ={} or tX={}",
                t, self.t_q, self.t_x
            )));
        }
        let value = self.x(t);
        self.t_q = t;
        self.q_c = value;
        self.q = [value, 0.0, 0.0];
        if align {
            self.t_x = t;
            self.x[0] = value;
        }
        self.set_q_tol()
    }

    /// Quantized coefficients become the Taylor coefficients of `x` at `tQ`.
    /// `q0` (the committed centre) is left alone.
    pub(crate) fn expand_quantized(&mut self) {
        let t = self.t_q;
        let n = self.order();
        if n >= 2 {
            self.q[1] = self.x1(t);
        }
        if n >= 3 {
            self.q[2] = 0.5 * self.x2(t);
        }
    }

    /// Resamples an input variable from its function at `t`, which becomes
    /// both `tX` and `tQ`.
    pub(crate) fn sample_input(&mut self, t: f64) -> QssResult<()> {
        let Some(input) = &self.input else {
            return Err(self.invariant("not an input variable"));
        };
        let (value, slope, curvature) = (input.value(t), input.slope(t), input.curvature(t));
        if !(value.is_finite() && slope.is_finite() && curvature.is_finite()) {
            let detail = format!("input function is not finite at t={t}");
            return Err(self.invariant(detail));
        }
        self.t_x = t;
        self.t_q = t;
        self.x = [value, slope, 0.5 * curvature, 0.0];
        self.q = [value, slope, 0.0];
        self.q_c = value;
        self.set_q_tol()
    }

    /// Offsets `q0` from the centre toward the sign of `leading`.
    pub(crate) fn bias_towards(&mut self, leading: f64) {
        self.q[0] = self.q_c + f64::from(crate::polynomial::signum(leading)) * self.q_tol;
    }

    pub(crate) fn ensure_scheduled(&self) -> QssResult<()> {
        if self.lifecycle != Lifecycle::Scheduled {
            return Err(self.invariant(format!(
                "expected a scheduled variable, found {:?}",
                self.lifecycle
            )));
        }
        Ok(())
    }

    pub(crate) fn invariant(&self, detail: impl Into<String>) -> QssError {
        QssError::invariant(self.name.clone(), detail)
    }
}

impl Trajectory for Variable {
    fn name(&self) -> &str {
        &self.name
    }

    fn order(&self) -> usize {
        self.method.order()
    }

    fn x(&self, t: f64) -> f64 {
        Variable::x(self, t)
    }

    fn q(&self, t: f64) -> f64 {
        Variable::q(self, t)
    }

    fn t_q(&self) -> f64 {
        self.t_q
    }

    fn t_e(&self) -> f64 {
        self.t_e
    }
}
