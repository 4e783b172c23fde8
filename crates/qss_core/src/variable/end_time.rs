//! Next-trigger computations.
//!
//! Aligned: right after a requantization the quantized trajectory is the
//! Taylor truncation of the continuous one, so the gap is `x_n·δ^n` and the
//! step follows in closed form. Unaligned: after an observer update the two
//! trajectories differ in every coefficient and the step is the first
//! positive crossing of `±qTol` by their difference.

use super::Variable;
use crate::polynomial::{
    min_positive_root_cubic, min_positive_root_linear, min_positive_root_quadratic, shift, signum,
};

impl Variable {
    /// Sets `tE` for a freshly requantized variable and returns it.
    pub(crate) fn set_aligned_end_time(&mut self, inflection: bool) -> f64 {
        let n = self.order();
        let leading = self.x[n];
        let dt = if leading == 0.0 {
            f64::INFINITY
        } else {
            let ratio = self.q_tol / leading.abs();
            match n {
                1 => ratio,
                2 => ratio.sqrt(),
                _ => ratio.cbrt(),
            }
        };
        let mut t_e = self.clamp_step(self.t_q, dt);
        if inflection {
            if let Some(t_i) = self.inflection_time() {
                if self.t_q < t_i {
                    t_e = t_e.min(t_i);
                }
            }
        }
        self.t_e = t_e;
        t_e
    }

    /// Sets `tE` after an observer update (`tQ <= tX`) and returns it.
    pub(crate) fn set_unaligned_end_time(&mut self, inflection: bool) -> f64 {
        let dt = self.drift_step();
        let mut t_e = self.clamp_step(self.t_x, dt);
        if inflection {
            let n = self.order();
            if let Some(t_i) = self.inflection_time() {
                let same_direction = signum(self.x[n - 1]) == signum(self.q[n - 1]);
                if same_direction && self.t_x < t_i {
                    t_e = t_e.min(t_i);
                }
            }
        }
        self.t_e = t_e;
        t_e
    }

    /// `origin + dt`, clamped to `[origin + dt_min, origin + dt_max]`.
    fn clamp_step(&self, origin: f64, dt: f64) -> f64 {
        let t_e = (origin + dt).min(origin + self.dt_max);
        t_e.max(origin + self.dt_min)
    }

    /// Time at which `x^(n-1)` crosses zero, if it changes sign ahead.
    fn inflection_time(&self) -> Option<f64> {
        let n = self.order();
        if n < 2 {
            return None;
        }
        let (below, leading) = (self.x[n - 1], self.x[n]);
        let signs_differ = below != 0.0 && leading != 0.0 && signum(below) != signum(leading);
        signs_differ.then(|| self.t_x - below / (n as f64 * leading))
    }

    /// Smallest `δ > 0` with `|x(tX+δ) - q_centre(tX+δ)| = qTol`.
    fn drift_step(&self) -> f64 {
        let n = self.order();
        let mut centred = [0.0; 4];
        centred[..n].copy_from_slice(&self.q[..n]);
        centred[0] = self.q_c;
        let centred = shift(centred, self.t_x - self.t_q);

        let mut d = [0.0; 4];
        for (k, slot) in d.iter_mut().enumerate().take(n + 1) {
            *slot = self.x[k] - centred[k];
        }
        if d[0].abs() > self.q_tol {
            return 0.0;
        }

        let rising = d[1..=n].iter().all(|&c| c >= 0.0);
        let falling = d[1..=n].iter().all(|&c| c <= 0.0);
        let upper = || crossing(n, &d, -self.q_tol);
        let lower = || crossing(n, &d, self.q_tol);
        if rising {
            upper()
        } else if falling {
            lower()
        } else {
            upper().min(lower())
        }
    }
}

/// Smallest positive root of `d(δ) + offset = 0` for a degree-`n` `d`.
fn crossing(n: usize, d: &[f64; 4], offset: f64) -> f64 {
    let c0 = d[0] + offset;
    match n {
        1 => min_positive_root_linear(d[1], c0),
        2 => min_positive_root_quadratic(d[2], d[1], c0),
        _ => min_positive_root_cubic(d[3], d[2], d[1], c0),
    }
}
