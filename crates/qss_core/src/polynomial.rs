//! Small polynomial toolkit used by the QSS variables.
//!
//! Coefficients are stored lowest order first, i.e. `coeffs[k]` multiplies
//! `δ^k` where `δ` is the time since the segment's reference time. The root
//! solvers answer one question only: the smallest strictly positive real
//! root, or `+∞` when there is none.

use crate::traits::Scalar;

fn lit<T: Scalar>(value: f64) -> T {
    T::from_f64(value).unwrap_or_else(T::nan)
}

/// Sign as -1, 0 or +1. Unlike `Float::signum`, zero maps to zero.
pub fn signum<T: Scalar>(value: T) -> i8 {
    if value > T::zero() {
        1
    } else if value < T::zero() {
        -1
    } else {
        0
    }
}

/// Evaluates `Σ c_k δ^k` with Horner's rule.
pub fn evaluate<T: Scalar>(coeffs: &[T], delta: T) -> T {
    coeffs
        .iter()
        .rev()
        .fold(T::zero(), |acc, &c| acc * delta + c)
}

/// Evaluates the k-th derivative of `Σ c_j δ^j` at `δ`.
pub fn evaluate_derivative<T: Scalar>(coeffs: &[T], k: usize, delta: T) -> T {
    if k >= coeffs.len() {
        return T::zero();
    }
    let mut acc = T::zero();
    for j in (k..coeffs.len()).rev() {
        acc = acc * delta + coeffs[j] * falling_factorial::<T>(j, k);
    }
    acc
}

/// Re-centres a polynomial: returns `d` such that `Σ d_k δ^k == Σ c_k (δ + s)^k`.
pub fn shift<T: Scalar, const N: usize>(coeffs: [T; N], s: T) -> [T; N] {
    let mut out = [T::zero(); N];
    for (k, slot) in out.iter_mut().enumerate() {
        *slot = evaluate_derivative(&coeffs, k, s) / falling_factorial::<T>(k, k);
    }
    out
}

/// j! / (j - k)!
fn falling_factorial<T: Scalar>(j: usize, k: usize) -> T {
    ((j - k + 1)..=j).fold(T::one(), |acc, i| acc * lit::<T>(i as f64))
}

/// Smallest positive root of `a δ + b = 0`.
pub fn min_positive_root_linear<T: Scalar>(a: T, b: T) -> T {
    if a == T::zero() {
        return T::infinity();
    }
    positive_or_infinity(-b / a)
}

/// Smallest positive root of `a δ² + b δ + c = 0`.
///
/// Falls through to the linear solver when `a == 0`. Uses the cancellation
/// free form `q = -(b + sign(b)·√disc)/2`, roots `q/a` and `c/q`.
pub fn min_positive_root_quadratic<T: Scalar>(a: T, b: T, c: T) -> T {
    if a == T::zero() {
        return min_positive_root_linear(b, c);
    }
    let two = lit::<T>(2.0);
    let four = lit::<T>(4.0);
    let disc = b * b - four * a * c;
    if disc < T::zero() || !disc.is_finite() {
        return T::infinity();
    }
    if disc == T::zero() {
        return positive_or_infinity(-b / (two * a));
    }
    let sq = disc.sqrt();
    let q = if b >= T::zero() {
        -(b + sq) / two
    } else {
        -(b - sq) / two
    };
    let r1 = q / a;
    let r2 = if q != T::zero() { c / q } else { r1 };
    min_positive(&[r1, r2])
}

/// Smallest positive root of `a δ³ + b δ² + c δ + d = 0`.
///
/// Reduces to the depressed cubic `y³ + p y + q` and takes the Cardano
/// branch (one real root) or the trigonometric branch (three real roots).
/// Every candidate is polished with Newton steps on the undepressed cubic.
pub fn min_positive_root_cubic<T: Scalar>(a: T, b: T, c: T, d: T) -> T {
    if a == T::zero() {
        return min_positive_root_quadratic(b, c, d);
    }
    if d == T::zero() {
        // δ = 0 is a root; the others solve the remaining quadratic
        return min_positive_root_quadratic(a, b, c);
    }

    let two = lit::<T>(2.0);
    let three = lit::<T>(3.0);
    let twenty_seven = lit::<T>(27.0);

    let bn = b / a;
    let cn = c / a;
    let dn = d / a;
    let p = cn - bn * bn / three;
    let q = (two * bn * bn * bn) / twenty_seven - (bn * cn) / three + dn;
    let offset = -bn / three;
    let disc = (q * q) / lit::<T>(4.0) + (p * p * p) / twenty_seven;

    let mut roots = [T::nan(); 3];
    if !disc.is_finite() {
        // leading coefficient negligible against the rest
        return min_positive_root_quadratic(b, c, d);
    } else if disc > T::zero() {
        let s = disc.sqrt();
        let half_q = q / two;
        roots[0] = (-half_q + s).cbrt() + (-half_q - s).cbrt() + offset;
    } else if p == T::zero() {
        roots[0] = offset;
    } else if disc == T::zero() {
        roots[0] = three * q / p + offset;
        roots[1] = -three * q / (two * p) + offset;
    } else {
        let r = two * (-p / three).sqrt();
        let arg = ((three * q) / (two * p) * (-three / p).sqrt())
            .max(-T::one())
            .min(T::one());
        let phi = arg.acos() / three;
        let third_turn = two * lit::<T>(std::f64::consts::PI) / three;
        for (k, root) in roots.iter_mut().enumerate() {
            *root = r * (phi - third_turn * lit::<T>(k as f64)).cos() + offset;
        }
    }

    for root in roots.iter_mut() {
        if root.is_finite() {
            *root = polish_cubic_root(a, b, c, d, *root);
        }
    }
    min_positive(&roots)
}

fn polish_cubic_root<T: Scalar>(a: T, b: T, c: T, d: T, guess: T) -> T {
    let coeffs = [d, c, b, a];
    let mut root = guess;
    let mut residual = evaluate(&coeffs, root).abs();
    for _ in 0..3 {
        let slope = evaluate_derivative(&coeffs, 1, root);
        if slope == T::zero() || !slope.is_finite() {
            break;
        }
        let candidate = root - evaluate(&coeffs, root) / slope;
        let candidate_residual = evaluate(&coeffs, candidate).abs();
        if !candidate.is_finite() || candidate_residual >= residual {
            break;
        }
        root = candidate;
        residual = candidate_residual;
    }
    root
}

fn positive_or_infinity<T: Scalar>(root: T) -> T {
    if root > T::zero() && root.is_finite() {
        root
    } else {
        T::infinity()
    }
}

fn min_positive<T: Scalar>(roots: &[T]) -> T {
    roots
        .iter()
        .map(|&r| positive_or_infinity(r))
        .fold(T::infinity(), |acc, r| acc.min(r))
}
