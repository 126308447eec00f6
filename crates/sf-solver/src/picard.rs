//! Picard (fixed-point) nonlinear solver.

use sf_core::GlobalVector;
use tracing::warn;

use crate::convergence::ConvergenceCriterion;
use crate::error::SolverResult;
use crate::linear::{DenseLu, LinearSolver};
use crate::solver::{NonlinearSolverStatus, PostIterationHook};
use crate::system::EquationSystem;

/// Picard solver configuration.
#[derive(Clone, Copy, Debug)]
pub struct PicardConfig {
    /// Maximum iterations
    pub max_iterations: u32,
    /// Under-relaxation factor applied to each update, in (0, 1]
    pub damping: f64,
}

impl Default for PicardConfig {
    fn default() -> Self {
        Self {
            max_iterations: 25,
            damping: 1.0,
        }
    }
}

/// Fixed-point iteration on the linearized operator: solve `A(x_k) x = b(x_k)`
/// and relax towards the result until the criterion is met.
pub struct PicardSolver {
    config: PicardConfig,
    linear: Box<dyn LinearSolver>,
}

impl PicardSolver {
    pub fn new(config: PicardConfig) -> Self {
        Self::with_linear_solver(config, Box::new(DenseLu))
    }

    pub fn with_linear_solver(config: PicardConfig, linear: Box<dyn LinearSolver>) -> Self {
        Self { config, linear }
    }

    pub(crate) fn solve(
        &mut self,
        system: &mut dyn EquationSystem,
        x: &mut GlobalVector,
        x_prev: &GlobalVector,
        t: f64,
        dt: f64,
        criterion: &mut dyn ConvergenceCriterion,
        post_iteration: PostIterationHook<'_>,
    ) -> SolverResult<NonlinearSolverStatus> {
        criterion.pre_first_iteration();

        for iteration in 1..=self.config.max_iterations {
            criterion.reset();

            if let Err(e) = system.assemble(x, x_prev, t, dt) {
                warn!(iteration, error = %e, "assembly failed, reporting divergence");
                return Ok(NonlinearSolverStatus {
                    converged: false,
                    iterations: iteration,
                });
            }

            let x_fixed_point = match self.linear.solve(system.matrix(), system.rhs()) {
                Ok(solution) => solution,
                Err(e) => {
                    warn!(iteration, error = %e, "linear solve failed, reporting divergence");
                    return Ok(NonlinearSolverStatus {
                        converged: false,
                        iterations: iteration,
                    });
                }
            };

            let applied_dx = (&x_fixed_point - &*x) * self.config.damping;
            let x_new = &*x + &applied_dx;

            if criterion.has_delta_x_check() {
                criterion.check_delta_x(&applied_dx, &x_new);
            }
            if criterion.has_residual_check() {
                let residual = system.residual(&x_new);
                criterion.check_residual(&residual);
            }

            x.copy_from(&x_new);
            post_iteration(iteration, x);

            if criterion.is_satisfied() {
                return Ok(NonlinearSolverStatus {
                    converged: true,
                    iterations: iteration,
                });
            }
        }

        warn!(
            max_iterations = self.config.max_iterations,
            "Picard iteration did not converge within the iteration budget"
        );
        Ok(NonlinearSolverStatus {
            converged: false,
            iterations: self.config.max_iterations,
        })
    }
}
