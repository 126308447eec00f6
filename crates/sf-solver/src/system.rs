//! Assembly contract between a process and its nonlinear solver.

use sf_core::{GlobalMatrix, GlobalVector};

use crate::error::{SolverError, SolverResult};

/// One process's nonlinear equation system in linearized form.
///
/// [`assemble`](EquationSystem::assemble) builds the fixed-point form
/// `A(x) x = b(x)` at the trial solution; the Picard solver iterates on it
/// directly and the residual `A x - b` falls out of it for free. Systems that
/// additionally provide an explicit Jacobian opt in via
/// [`supports_jacobian`](EquationSystem::supports_jacobian) and become
/// Newton-ready. A Picard solver works with a Newton-ready system, but not
/// the other way around; the marching loop checks this once at setup.
pub trait EquationSystem {
    /// Number of unknowns.
    fn dimension(&self) -> usize;

    /// Assemble the linearized operator and right-hand side at the trial
    /// solution `x`, with `x_prev` the last accepted solution.
    fn assemble(&mut self, x: &GlobalVector, x_prev: &GlobalVector, t: f64, dt: f64)
        -> SolverResult<()>;

    /// Assembled operator `A(x)`.
    fn matrix(&self) -> &GlobalMatrix;

    /// Assembled right-hand side `b(x)`.
    fn rhs(&self) -> &GlobalVector;

    /// Residual `A x - b` at `x`, using the last assembly.
    fn residual(&self, x: &GlobalVector) -> GlobalVector {
        self.matrix() * x - self.rhs()
    }

    /// Whether [`jacobian`](EquationSystem::jacobian) is available.
    fn supports_jacobian(&self) -> bool {
        false
    }

    /// Jacobian of the residual at the last assembled trial solution.
    fn jacobian(&self) -> SolverResult<&GlobalMatrix> {
        Err(SolverError::JacobianUnavailable)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    struct Linear {
        a: GlobalMatrix,
        b: GlobalVector,
    }

    impl EquationSystem for Linear {
        fn dimension(&self) -> usize {
            self.b.len()
        }

        fn assemble(
            &mut self,
            _x: &GlobalVector,
            _x_prev: &GlobalVector,
            _t: f64,
            _dt: f64,
        ) -> SolverResult<()> {
            Ok(())
        }

        fn matrix(&self) -> &GlobalMatrix {
            &self.a
        }

        fn rhs(&self) -> &GlobalVector {
            &self.b
        }
    }

    #[test]
    fn default_residual_is_ax_minus_b() {
        let sys = Linear {
            a: GlobalMatrix::from_diagonal_element(2, 2, 2.0),
            b: GlobalVector::from_vec(vec![1.0, 2.0]),
        };
        let x = GlobalVector::from_vec(vec![1.0, 1.0]);
        let r = sys.residual(&x);
        assert_eq!(r, GlobalVector::from_vec(vec![1.0, 0.0]));
    }

    #[test]
    fn jacobian_is_unavailable_by_default() {
        let sys = Linear {
            a: GlobalMatrix::from_diagonal_element(1, 1, 1.0),
            b: GlobalVector::from_vec(vec![0.0]),
        };
        assert!(!sys.supports_jacobian());
        assert!(matches!(
            sys.jacobian(),
            Err(SolverError::JacobianUnavailable)
        ));
    }
}
