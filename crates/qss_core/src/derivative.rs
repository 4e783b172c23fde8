use crate::error::{QssError, QssResult};
use crate::variable::{VarId, Variable};

/// Which of a variable's two trajectories an evaluation reads.
///
/// A single evaluation never mixes the two: every referenced variable is
/// read through the same representation.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Representation {
    Continuous,
    Quantized,
}

/// One weighted reference `coefficient · v(t)`.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct Term {
    pub coefficient: f64,
    pub variable: VarId,
}

/// Value bounds used by first-order LIQSS relaxation.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct FirstOrderBounds {
    /// Derivative with the owner held at `centre - qTol`.
    pub lower: f64,
    /// Derivative with the owner held at `centre + qTol`.
    pub upper: f64,
    /// Owner value at which the derivative vanishes.
    pub zero: f64,
}

/// Value and slope bounds used by second-order LIQSS relaxation.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct SecondOrderBounds {
    pub l1: f64,
    pub u1: f64,
    pub l2: f64,
    pub u2: f64,
    /// Owner slope at which the second derivative vanishes.
    pub z1: f64,
    /// Owner value at which the derivative equals `z1`.
    pub z2: f64,
}

/// Linear derivative function `c0 + Σ c_i · v_i`.
///
/// Terms are kept in insertion order. Repeated references to one variable
/// are summed at evaluation time, never merged, so results are bit-for-bit
/// reproducible for a given construction order.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct Derivative {
    constant: f64,
    terms: Vec<Term>,
}

impl Derivative {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn add_constant(&mut self, constant: f64) -> &mut Self {
        self.constant += constant;
        self
    }

    pub fn add(&mut self, coefficient: f64, variable: VarId) -> &mut Self {
        self.terms.push(Term {
            coefficient,
            variable,
        });
        self
    }

    pub fn constant(&self) -> f64 {
        self.constant
    }

    pub fn terms(&self) -> &[Term] {
        &self.terms
    }

    /// Registers `owner` as an observer of every referenced variable.
    ///
    /// Returns whether the derivative references its owner. Observer lists
    /// are left unsorted; the caller normalizes them once every derivative
    /// has been finalized.
    pub fn finalize(&self, owner: VarId, variables: &mut [Variable]) -> QssResult<bool> {
        let count = variables.len();
        let mut self_observer = false;
        for term in &self.terms {
            if term.variable.index() >= count {
                let name = variables
                    .get(owner.index())
                    .map_or_else(|| owner.to_string(), |v| v.name().to_string());
                return Err(QssError::invariant(
                    name,
                    format!(
                        "derivative references unknown variable #{} ({} defined)",
                        term.variable.index(),
                        count
                    ),
                ));
            }
            if term.variable == owner {
                self_observer = true;
            }
            variables[term.variable.index()].observers.push(owner);
        }
        Ok(self_observer)
    }

    /// `c0 + Σ c_i v_i(t)`
    pub fn value(&self, rep: Representation, t: f64, variables: &[Variable]) -> f64 {
        self.terms.iter().fold(self.constant, |acc, term| {
            acc + term.coefficient * variables[term.variable.index()].value(rep, t)
        })
    }

    /// `Σ c_i v_i'(t)`
    pub fn slope(&self, rep: Representation, t: f64, variables: &[Variable]) -> f64 {
        self.terms.iter().fold(0.0, |acc, term| {
            acc + term.coefficient * variables[term.variable.index()].slope(rep, t)
        })
    }

    /// `Σ c_i v_i''(t)`
    pub fn curvature(&self, rep: Representation, t: f64, variables: &[Variable]) -> f64 {
        self.terms.iter().fold(0.0, |acc, term| {
            acc + term.coefficient * variables[term.variable.index()].curvature(rep, t)
        })
    }

    /// Summed coefficient of every reference to `owner`.
    pub fn self_coefficient(&self, owner: VarId) -> f64 {
        self.terms
            .iter()
            .filter(|term| term.variable == owner)
            .fold(0.0, |acc, term| acc + term.coefficient)
    }

    /// Constant plus every term except the owner's own.
    fn other_value(
        &self,
        owner: VarId,
        rep: Representation,
        t: f64,
        variables: &[Variable],
    ) -> f64 {
        self.terms
            .iter()
            .filter(|term| term.variable != owner)
            .fold(self.constant, |acc, term| {
                acc + term.coefficient * variables[term.variable.index()].value(rep, t)
            })
    }

    fn other_slope(
        &self,
        owner: VarId,
        rep: Representation,
        t: f64,
        variables: &[Variable],
    ) -> f64 {
        self.terms
            .iter()
            .filter(|term| term.variable != owner)
            .fold(0.0, |acc, term| {
                acc + term.coefficient * variables[term.variable.index()].slope(rep, t)
            })
    }

    /// Derivative bounds with the owner's own value pinned to either edge
    /// of its quantum band.
    pub fn first_order_bounds(
        &self,
        owner: VarId,
        centre: f64,
        q_tol: f64,
        rep: Representation,
        t: f64,
        variables: &[Variable],
    ) -> FirstOrderBounds {
        let cs = self.self_coefficient(owner);
        let other = self.other_value(owner, rep, t, variables);
        let zero = if cs == 0.0 { centre } else { -other / cs };
        FirstOrderBounds {
            lower: other + cs * (centre - q_tol),
            upper: other + cs * (centre + q_tol),
            zero,
        }
    }

    pub fn second_order_bounds(
        &self,
        owner: VarId,
        centre: f64,
        q_tol: f64,
        rep: Representation,
        t: f64,
        variables: &[Variable],
    ) -> SecondOrderBounds {
        let cs = self.self_coefficient(owner);
        let other = self.other_value(owner, rep, t, variables);
        let other_slope = self.other_slope(owner, rep, t, variables);

        let l1 = other + cs * (centre - q_tol);
        let u1 = other + cs * (centre + q_tol);
        let (z1, z2) = if cs == 0.0 {
            (other, centre)
        } else {
            let z1 = -other_slope / cs;
            (z1, (z1 - other) / cs)
        };
        SecondOrderBounds {
            l1,
            u1,
            l2: other_slope + cs * l1,
            u2: other_slope + cs * u1,
            z1,
            z2,
        }
    }
}
