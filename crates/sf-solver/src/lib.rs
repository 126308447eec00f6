//! Nonlinear equation solving for stepflow.
//!
//! Provides:
//! - EquationSystem: assembly contract between a process and its solver
//! - LinearSolver: external linear-algebra backend seam (dense LU shipped)
//! - ConvergenceCriterion: tolerance tests on solution deltas or residuals
//! - Picard and Newton nonlinear solvers behind a closed tagged enum

pub mod convergence;
pub mod error;
pub mod linear;
pub mod newton;
pub mod picard;
pub mod solver;
pub mod system;

// Re-exports for public API
pub use convergence::{ConvergenceCriterion, DeltaXCriterion, ResidualCriterion};
pub use error::{SolverError, SolverResult};
pub use linear::{DenseLu, LinearSolver};
pub use newton::{NewtonConfig, NewtonSolver};
pub use picard::{PicardConfig, PicardSolver};
pub use solver::{NonlinearSolver, NonlinearSolverKind, NonlinearSolverStatus};
pub use system::EquationSystem;
