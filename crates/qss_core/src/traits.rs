use num_traits::{Float, FromPrimitive};
use std::fmt::Debug;

/// A trait for types that can be used as scalars in the polynomial toolkit.
/// Must support basic arithmetic, debug printing, and conversion from f64.
pub trait Scalar: Float + FromPrimitive + Debug + 'static {}

impl<T: Float + FromPrimitive + Debug + 'static> Scalar for T {}

/// Read-only view of a quantized-state trajectory.
///
/// Output collaborators (samplers, recorders, plotting) only ever see a
/// variable through this trait, so they cannot disturb the integration.
pub trait Trajectory {
    /// Identity used for labelling output.
    fn name(&self) -> &str;

    /// QSS order of the underlying method (1, 2 or 3).
    fn order(&self) -> usize;

    /// Continuous value at time t.
    /// t: must lie in the current continuous segment [tX, tE]
    fn x(&self, t: f64) -> f64;

    /// Quantized value at time t.
    /// t: must lie in the current quantized segment [tQ, tE]
    fn q(&self, t: f64) -> f64;

    /// Time of the most recent requantization.
    fn t_q(&self) -> f64;

    /// Next scheduled trigger time (`f64::INFINITY` if none).
    fn t_e(&self) -> f64;
}
