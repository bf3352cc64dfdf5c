//! # Adams ODE
//! `adams_ode` solves non-stiff systems of ordinary differential equations with a variable
//! order (1 to 12), variable step Adams predictor-corrector method. The integration can be
//! driven step by step through [`IntegratorState`] or towards output points through [`Adams`],
//! and the solution is available between steps through the interpolant of each step.

// Re-export from external crate
use nalgebra as na;
pub use crate::na::{DVector, OVector, Vector1, Vector2, Vector3, Vector4, Vector5, Vector6};

// Declare modules
pub mod adams;
pub mod coefficients;
pub mod compensated;
pub mod constants;
pub mod continuous_output_model;
pub mod controller;
pub mod difference_table;
pub mod interpolation;
pub mod ode_shared;
pub mod state;
mod step;

pub use adams::Adams;
pub use interpolation::DenseSegment;
pub use state::IntegratorState;

pub use ode_shared::{IntegrationError, OutputType, RunMode, Stats, StepStatus, System};
