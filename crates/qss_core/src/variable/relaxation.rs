use super::Variable;
use crate::derivative::{FirstOrderBounds, SecondOrderBounds};
use crate::polynomial::signum;

impl Variable {
    /// LIQSS1: pick the band edge the derivative pushes toward, or settle
    /// at the equilibrium inside the band.
    pub(crate) fn relax_first_order(&mut self, bounds: FirstOrderBounds) {
        let (lo, hi) = (self.q_c - self.q_tol, self.q_c + self.q_tol);
        let (q0, x1) = match (signum(bounds.lower), signum(bounds.upper)) {
            (-1, -1) => (lo, bounds.lower),
            (1, 1) => (hi, bounds.upper),
            _ => (bounds.zero.clamp(lo, hi), 0.0),
        };
        self.q[0] = q0;
        self.x[0] = self.q_c;
        self.x[1] = x1;
        self.t_x = self.t_q;
    }

    /// LIQSS2: the same decision on second-derivative bounds.
    pub(crate) fn relax_second_order(&mut self, bounds: SecondOrderBounds) {
        let (lo, hi) = (self.q_c - self.q_tol, self.q_c + self.q_tol);
        let (q0, slope, x2) = match (signum(bounds.l2), signum(bounds.u2)) {
            (-1, -1) => (lo, bounds.l1, 0.5 * bounds.l2),
            (1, 1) => (hi, bounds.u1, 0.5 * bounds.u2),
            _ => (bounds.z2.clamp(lo, hi), bounds.z1, 0.0),
        };
        self.q[0] = q0;
        self.q[1] = slope;
        self.x[0] = self.q_c;
        self.x[1] = slope;
        self.x[2] = x2;
        self.t_x = self.t_q;
    }
}
