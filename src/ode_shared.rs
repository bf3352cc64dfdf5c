//! Shared traits and structures for the Adams integrator.

use std::fmt;

use nalgebra::Scalar;
use num_traits::{Float, NumCast, Zero};
use simba::scalar::{ClosedAdd, ClosedDiv, ClosedMul, ClosedNeg, ClosedSub, SubsetOf};
use thiserror::Error;

/// Floating point type the integrator works in.
pub trait FloatNumber:
    Copy
    + Float
    + NumCast
    + SubsetOf<f64>
    + Scalar
    + ClosedAdd
    + ClosedMul
    + ClosedSub
    + ClosedDiv
    + ClosedNeg
    + Zero
    + fmt::Display
{
}

impl FloatNumber for f32 {}
impl FloatNumber for f64 {}

/// Trait needed to be implemented by the user.
///
/// The implementing structure doubles as the parameter block of the problem: it is handed
/// unmodified to every evaluation. Evaluations may happen at predicted states that are later
/// rejected.
pub trait System<T, V> {
    /// System of ordinary differential equations.
    fn system(&self, x: T, y: &V, dy: &mut V);
    /// Stop function called at every successful integration step. The integration is stopped when this function returns true.
    fn solout(&mut self, _x: T, _y: &V, _dy: &V) -> bool {
        false
    }
}

/// Enumeration of the types of the integration output.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum OutputType {
    /// Output at regular increments of the independent variable, through the interpolator.
    Dense,
    /// Output at every accepted step.
    Sparse,
}

/// Instruction given to the driver on each call.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum RunMode {
    /// Start a new problem from the current point. Difference table and step history are discarded.
    Start,
    /// Continue the current problem, reusing the difference table, order and step history.
    Continue,
    /// The target lies behind the internal integration point: answer by interpolation only.
    Interpolate,
}

/// Outcome of a single call to the step engine.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum StepStatus {
    /// A step was taken. The state describes the new point.
    Accepted,
    /// The requested tolerance was below round-off and has been enlarged. Nothing advanced.
    ToleranceRaised,
    /// The step size fell below the machine-precision floor. Nothing advanced.
    Crashed,
}

/// Enumeration of the errors that may arise during integration.
#[derive(Debug, Error)]
pub enum IntegrationError {
    #[error("Stopped at x = {x}. Need more than {n_step} steps.")]
    MaxNumStepReached { x: f64, n_step: u32 },
    #[error("Stopped at x = {x}. Step size underflow.")]
    StepSizeUnderflow { x: f64 },
    #[error("The problem seems to be stiff at x = {x}.")]
    StiffnessDetected { x: f64 },
    #[error("Stopped at x = {x}. Tolerances too small, relaxed to rtol = {rtol}, atol = {atol}.")]
    ToleranceTooSmall { x: f64, rtol: f64, atol: f64 },
    #[error("Interpolation at x = {x} outside of the last step [{lower}, {upper}].")]
    OutOfSpan { x: f64, lower: f64, upper: f64 },
    #[error("Improper input: {0}")]
    ImproperInput(String),
}

/// Contains some statistics of the integration.
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq)]
pub struct Stats {
    pub num_eval: u32,
    pub accepted_steps: u32,
    pub rejected_steps: u32,
}

impl Stats {
    pub(crate) fn new() -> Stats {
        Stats {
            num_eval: 0,
            accepted_steps: 0,
            rejected_steps: 0,
        }
    }
}

impl fmt::Display for Stats {
    fn fmt(&self, f: &mut fmt::Formatter) -> fmt::Result {
        writeln!(f, "Number of function evaluations: {}", self.num_eval)?;
        writeln!(f, "Number of accepted steps: {}", self.accepted_steps)?;
        write!(f, "Number of rejected steps: {}", self.rejected_steps)
    }
}

/// Converts a value of the working type into `f64` for error reporting.
pub(crate) fn to_f64<T: FloatNumber>(value: T) -> f64 {
    value.to_superset()
}

/// Returns |a| with the sign of b.
pub(crate) fn sign<T: FloatNumber>(a: T, b: T) -> T {
    if b >= T::zero() {
        a.abs()
    } else {
        -a.abs()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn sign_follows_second_argument() {
        assert_eq!(sign(2.0, -1.0), -2.0);
        assert_eq!(sign(-2.0, 3.0), 2.0);
        assert_eq!(sign(-2.0_f32, 0.0), 2.0);
    }

    #[test]
    fn stats_display() {
        let stats = Stats {
            num_eval: 12,
            accepted_steps: 5,
            rejected_steps: 1,
        };
        assert_eq!(
            stats.to_string(),
            "Number of function evaluations: 12\nNumber of accepted steps: 5\nNumber of rejected steps: 1"
        );
    }
}
