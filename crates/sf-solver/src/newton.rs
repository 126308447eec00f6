//! Newton-Raphson nonlinear solver.

use sf_core::GlobalVector;
use tracing::warn;

use crate::convergence::ConvergenceCriterion;
use crate::error::SolverResult;
use crate::linear::{DenseLu, LinearSolver};
use crate::solver::{NonlinearSolverStatus, PostIterationHook};
use crate::system::EquationSystem;

/// Newton solver configuration.
#[derive(Clone, Copy, Debug)]
pub struct NewtonConfig {
    /// Maximum iterations
    pub max_iterations: u32,
    /// Damping factor applied to each Newton update, in (0, 1]
    pub damping: f64,
}

impl Default for NewtonConfig {
    fn default() -> Self {
        Self {
            max_iterations: 50,
            damping: 1.0,
        }
    }
}

/// Newton iteration using the system's explicit Jacobian: solve
/// `J dx = -r` and apply the damped update until the criterion is met.
///
/// Requires a Newton-ready [`EquationSystem`]; the marching loop verifies
/// [`supports_jacobian`](EquationSystem::supports_jacobian) once at setup.
pub struct NewtonSolver {
    config: NewtonConfig,
    linear: Box<dyn LinearSolver>,
}

impl NewtonSolver {
    pub fn new(config: NewtonConfig) -> Self {
        Self::with_linear_solver(config, Box::new(DenseLu))
    }

    pub fn with_linear_solver(config: NewtonConfig, linear: Box<dyn LinearSolver>) -> Self {
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

            let residual = system.residual(x);
            // Missing Jacobian support is a setup error, not divergence.
            let jacobian = system.jacobian()?;

            let dx = match self.linear.solve(jacobian, &(-&residual)) {
                Ok(dx) => dx,
                Err(e) => {
                    warn!(iteration, error = %e, "linear solve failed, reporting divergence");
                    return Ok(NonlinearSolverStatus {
                        converged: false,
                        iterations: iteration,
                    });
                }
            };

            let applied_dx = &dx * self.config.damping;
            let x_new = &*x + &applied_dx;

            if criterion.has_delta_x_check() {
                criterion.check_delta_x(&applied_dx, &x_new);
            }
            if criterion.has_residual_check() {
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
            "Newton iteration did not converge within the iteration budget"
        );
        Ok(NonlinearSolverStatus {
            converged: false,
            iterations: self.config.max_iterations,
        })
    }
}
