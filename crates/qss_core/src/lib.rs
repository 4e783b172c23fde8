//! The `qss_core` crate integrates systems of coupled ODEs with Quantized
//! State System methods. Each variable advances on its own schedule: it
//! requantizes only when its continuous trajectory drifts a tolerance away
//! from the quantized trajectory its observers read.
//!
//! Key components:
//! - **Polynomial**: evaluation, Taylor shifts and smallest-positive-root solvers.
//! - **Derivative**: linear derivative functions over continuous or quantized values.
//! - **Variable**: QSS1/2/3 and LIQSS1/2 state, end-time and relaxation rules.
//! - **Input**: time functions that drive input variables.
//! - **Event Queue**: trigger schedule with exact simultaneity detection.
//! - **Simulation**: staged initialization and the event loop, including the
//!   barrier protocol for simultaneous triggers.
//! - **Output**: run observers and a trajectory recorder.

pub mod derivative;
pub mod error;
pub mod event_queue;
pub mod input;
pub mod output;
pub mod polynomial;
pub mod settings;
pub mod simulation;
pub mod traits;
pub mod variable;

pub use derivative::{Derivative, Representation};
pub use error::{QssError, QssResult};
pub use input::{InputFunction, SineInput};
pub use output::{Recorder, RecorderSettings, RunObserver, Sample, Trace};
pub use settings::SolverSettings;
pub use simulation::{RunStats, Simulation, Status};
pub use traits::Trajectory;
pub use variable::{Lifecycle, Method, VarId, Variable};
