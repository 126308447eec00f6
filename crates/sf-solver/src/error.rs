//! Error types for nonlinear solving.

use thiserror::Error;

/// Errors encountered while setting up or running a nonlinear solve.
///
/// Non-convergence is deliberately not represented here; it is a normal
/// outcome reported through
/// [`NonlinearSolverStatus`](crate::NonlinearSolverStatus).
#[derive(Error, Debug)]
pub enum SolverError {
    #[error("Numeric failure: {what}")]
    Numeric { what: String },

    #[error("Assembly failed: {what}")]
    Assembly { what: String },

    #[error("The equation system does not provide a Jacobian")]
    JacobianUnavailable,

    #[error("Invalid solver configuration: {what}")]
    InvalidConfig { what: String },
}

pub type SolverResult<T> = Result<T, SolverError>;
