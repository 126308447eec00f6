//! ProcessBundle: one process with its per-process numerics.

use sf_core::TimeStep;
use sf_solver::{ConvergenceCriterion, NonlinearSolver, NonlinearSolverStatus};
use sf_stepping::TimeStepAlgorithm;

use crate::process::Process;

/// A process together with its nonlinear solver, step-size controller, and
/// convergence criterion, plus the per-process stepping state.
///
/// Owned by the [`TimeLoop`](crate::TimeLoop) for its entire lifetime.
pub struct ProcessBundle {
    pub(crate) id: usize,
    pub(crate) name: String,
    pub(crate) process: Box<dyn Process>,
    pub(crate) nonlinear_solver: NonlinearSolver,
    pub(crate) timestep_algorithm: Box<dyn TimeStepAlgorithm>,
    pub(crate) conv_crit: Box<dyn ConvergenceCriterion>,
    pub(crate) timestep_previous: TimeStep,
    pub(crate) timestep_current: TimeStep,
    pub(crate) solver_status: NonlinearSolverStatus,
}

impl ProcessBundle {
    pub fn new(
        process: Box<dyn Process>,
        nonlinear_solver: NonlinearSolver,
        timestep_algorithm: Box<dyn TimeStepAlgorithm>,
        conv_crit: Box<dyn ConvergenceCriterion>,
    ) -> Self {
        let name = process.name().to_string();
        let t0 = timestep_algorithm.begin();
        Self {
            id: 0,
            name,
            process,
            nonlinear_solver,
            timestep_algorithm,
            conv_crit,
            timestep_previous: TimeStep::initial(t0),
            timestep_current: TimeStep::initial(t0),
            // The initial state counts as solved.
            solver_status: NonlinearSolverStatus {
                converged: true,
                iterations: 0,
            },
        }
    }

    pub fn name(&self) -> &str {
        &self.name
    }

    /// Status of the last nonlinear solve for this process.
    pub fn solver_status(&self) -> NonlinearSolverStatus {
        self.solver_status
    }

    pub fn process(&self) -> &dyn Process {
        self.process.as_ref()
    }
}
