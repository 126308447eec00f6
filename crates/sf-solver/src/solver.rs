//! Tagged nonlinear solver variant and solve status.

use sf_core::GlobalVector;

use crate::convergence::ConvergenceCriterion;
use crate::error::{SolverError, SolverResult};
use crate::newton::NewtonSolver;
use crate::picard::PicardSolver;
use crate::system::EquationSystem;

/// Outcome of one nonlinear solve.
///
/// Produced once per solve and consumed immediately by the marching loop and
/// the step-size controller. `converged == false` is a normal outcome, not an
/// error.
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq)]
pub struct NonlinearSolverStatus {
    pub converged: bool,
    pub iterations: u32,
}

/// Hook invoked after every nonlinear iteration with the iteration number and
/// the current iterate, used for per-iteration output.
pub type PostIterationHook<'a> = &'a mut dyn FnMut(u32, &GlobalVector);

/// Which nonlinear strategy a solver uses.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum NonlinearSolverKind {
    Picard,
    Newton,
}

/// Closed set of nonlinear solver variants, resolved once at setup.
pub enum NonlinearSolver {
    Picard(PicardSolver),
    Newton(NewtonSolver),
}

impl NonlinearSolver {
    pub fn kind(&self) -> NonlinearSolverKind {
        match self {
            NonlinearSolver::Picard(_) => NonlinearSolverKind::Picard,
            NonlinearSolver::Newton(_) => NonlinearSolverKind::Newton,
        }
    }

    /// Verify at setup time that the solver can work with the given system.
    ///
    /// A Newton solver needs a Jacobian-providing system; a Picard solver
    /// works with any system.
    pub fn check_compatibility(&self, system: &dyn EquationSystem) -> SolverResult<()> {
        match self {
            NonlinearSolver::Picard(_) => Ok(()),
            NonlinearSolver::Newton(_) => {
                if system.supports_jacobian() {
                    Ok(())
                } else {
                    Err(SolverError::JacobianUnavailable)
                }
            }
        }
    }

    /// Drive the system to convergence at fixed `t` and `dt`, starting from
    /// and updating `x` in place.
    #[allow(clippy::too_many_arguments)]
    pub fn solve(
        &mut self,
        system: &mut dyn EquationSystem,
        x: &mut GlobalVector,
        x_prev: &GlobalVector,
        t: f64,
        dt: f64,
        criterion: &mut dyn ConvergenceCriterion,
        post_iteration: PostIterationHook<'_>,
    ) -> SolverResult<NonlinearSolverStatus> {
        match self {
            NonlinearSolver::Picard(solver) => {
                solver.solve(system, x, x_prev, t, dt, criterion, post_iteration)
            }
            NonlinearSolver::Newton(solver) => {
                solver.solve(system, x, x_prev, t, dt, criterion, post_iteration)
            }
        }
    }
}
