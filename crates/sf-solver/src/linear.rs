//! Linear-algebra backend seam.

use sf_core::{GlobalMatrix, GlobalVector};

use crate::error::{SolverError, SolverResult};

/// Backend contract for the linear solve inside a nonlinear iteration.
///
/// The marching core treats each call as atomic and blocking; any internal
/// parallelism is the backend's business.
pub trait LinearSolver {
    /// Solve `A x = b`.
    fn solve(&mut self, a: &GlobalMatrix, b: &GlobalVector) -> SolverResult<GlobalVector>;
}

/// Dense LU factorization backend.
#[derive(Clone, Copy, Debug, Default)]
pub struct DenseLu;

impl LinearSolver for DenseLu {
    fn solve(&mut self, a: &GlobalMatrix, b: &GlobalVector) -> SolverResult<GlobalVector> {
        a.clone().lu().solve(b).ok_or_else(|| SolverError::Numeric {
            what: "LU solve failed, matrix is singular".to_string(),
        })
    }
}
