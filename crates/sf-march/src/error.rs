//! Error types for the marching loop.
//!
//! Only configuration mistakes and unrecoverable stepping conditions live
//! here. Nonlinear divergence is handled inside the loop through step
//! rejection and retry; an exhausted coupling iteration budget is a warning.

use sf_solver::SolverError;
use sf_stepping::SteppingError;
use thiserror::Error;

#[derive(Error, Debug)]
pub enum MarchError {
    /// The step controller proposed the same step size that was just
    /// rejected (or cannot shrink below its floor); the run cannot make
    /// progress.
    #[error(
        "Time step size stalled for process '{process}': new step size {dt:e} \
         equals the rejected step size {rejected_dt:e}; the controller cannot \
         reduce the step size further"
    )]
    StepSizeStalled {
        process: String,
        dt: f64,
        rejected_dt: f64,
    },

    #[error("Process '{process}' does not support the {scheme} coupling scheme")]
    UnsupportedScheme {
        process: String,
        scheme: &'static str,
    },

    #[error(
        "A Newton solver is configured for process '{process}' but its \
         equation system does not provide a Jacobian"
    )]
    SolverTypeMismatch { process: String },

    #[error("Invalid time loop configuration: {what}")]
    InvalidConfig { what: String },

    #[error(transparent)]
    Solver(#[from] SolverError),
}

impl From<SteppingError> for MarchError {
    fn from(e: SteppingError) -> Self {
        match e {
            SteppingError::InvalidConfig { what } => MarchError::InvalidConfig { what },
        }
    }
}

pub type MarchResult<T> = Result<T, MarchError>;
