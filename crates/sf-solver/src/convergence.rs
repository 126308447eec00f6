//! Convergence criteria for nonlinear solves and coupling iterations.

use sf_core::{norm, GlobalVector, VecNormType};

use crate::error::{SolverError, SolverResult};

/// Tolerance test on a solution delta or residual.
///
/// A criterion is pure evaluation: the only mutable state is the satisfied
/// flag and a first-call marker, reset at the start of every solve or
/// coupling iteration. Separate instances serve the per-process nonlinear
/// solve and the global staggered-coupling test.
pub trait ConvergenceCriterion {
    /// Mark the next check as the first of a new iteration sequence; the
    /// first check never reports satisfied, so at least one full round runs.
    fn pre_first_iteration(&mut self) {}

    /// Clear the satisfied flag before a new check.
    fn reset(&mut self);

    fn has_delta_x_check(&self) -> bool {
        false
    }

    fn has_residual_check(&self) -> bool {
        false
    }

    /// Test the change `dx` against the new solution `x_new`.
    fn check_delta_x(&mut self, _dx: &GlobalVector, _x_new: &GlobalVector) {}

    /// Test a residual vector.
    fn check_residual(&mut self, _residual: &GlobalVector) {}

    fn is_satisfied(&self) -> bool;

    /// Norm used by this criterion; the loop reuses it for solution-error
    /// estimates fed to the step controller.
    fn norm_type(&self) -> VecNormType;
}

/// Criterion on the norm of the solution change per iteration.
#[derive(Clone, Debug)]
pub struct DeltaXCriterion {
    abs_tol: Option<f64>,
    rel_tol: Option<f64>,
    norm_type: VecNormType,
    satisfied: bool,
    first_iteration: bool,
}

impl DeltaXCriterion {
    /// At least one of the tolerances must be given.
    pub fn new(
        abs_tol: Option<f64>,
        rel_tol: Option<f64>,
        norm_type: VecNormType,
    ) -> SolverResult<Self> {
        if abs_tol.is_none() && rel_tol.is_none() {
            return Err(SolverError::InvalidConfig {
                what: "delta-x criterion needs an absolute or relative tolerance".to_string(),
            });
        }
        if abs_tol.is_some_and(|t| !(t >= 0.0)) || rel_tol.is_some_and(|t| !(t >= 0.0)) {
            return Err(SolverError::InvalidConfig {
                what: "tolerances must be non-negative".to_string(),
            });
        }
        Ok(Self {
            abs_tol,
            rel_tol,
            norm_type,
            satisfied: false,
            first_iteration: false,
        })
    }
}

impl ConvergenceCriterion for DeltaXCriterion {
    fn pre_first_iteration(&mut self) {
        self.first_iteration = true;
        self.satisfied = false;
    }

    fn reset(&mut self) {
        self.satisfied = false;
    }

    fn has_delta_x_check(&self) -> bool {
        true
    }

    fn check_delta_x(&mut self, dx: &GlobalVector, x_new: &GlobalVector) {
        if self.first_iteration {
            self.first_iteration = false;
            self.satisfied = false;
            return;
        }

        let dx_norm = norm(dx, self.norm_type);
        let x_norm = norm(x_new, self.norm_type);

        let abs_ok = self.abs_tol.map(|tol| dx_norm <= tol);
        let rel_ok = self
            .rel_tol
            .map(|tol| dx_norm <= tol * x_norm.max(f64::MIN_POSITIVE));

        self.satisfied = abs_ok.unwrap_or(false) || rel_ok.unwrap_or(false);
    }

    fn is_satisfied(&self) -> bool {
        self.satisfied
    }

    fn norm_type(&self) -> VecNormType {
        self.norm_type
    }
}

/// Criterion on the residual norm, absolute and/or relative to the first
/// residual of the current solve.
#[derive(Clone, Debug)]
pub struct ResidualCriterion {
    abs_tol: Option<f64>,
    rel_tol: Option<f64>,
    norm_type: VecNormType,
    initial_residual_norm: Option<f64>,
    satisfied: bool,
    first_iteration: bool,
}

impl ResidualCriterion {
    /// At least one of the tolerances must be given.
    pub fn new(
        abs_tol: Option<f64>,
        rel_tol: Option<f64>,
        norm_type: VecNormType,
    ) -> SolverResult<Self> {
        if abs_tol.is_none() && rel_tol.is_none() {
            return Err(SolverError::InvalidConfig {
                what: "residual criterion needs an absolute or relative tolerance".to_string(),
            });
        }
        if abs_tol.is_some_and(|t| !(t >= 0.0)) || rel_tol.is_some_and(|t| !(t >= 0.0)) {
            return Err(SolverError::InvalidConfig {
                what: "tolerances must be non-negative".to_string(),
            });
        }
        Ok(Self {
            abs_tol,
            rel_tol,
            norm_type,
            initial_residual_norm: None,
            satisfied: false,
            first_iteration: false,
        })
    }
}

impl ConvergenceCriterion for ResidualCriterion {
    fn pre_first_iteration(&mut self) {
        self.first_iteration = true;
        self.satisfied = false;
        self.initial_residual_norm = None;
    }

    fn reset(&mut self) {
        self.satisfied = false;
    }

    fn has_residual_check(&self) -> bool {
        true
    }

    fn check_residual(&mut self, residual: &GlobalVector) {
        let r_norm = norm(residual, self.norm_type);
        let r0_norm = *self.initial_residual_norm.get_or_insert(r_norm);

        if self.first_iteration {
            self.first_iteration = false;
            self.satisfied = false;
            return;
        }

        let abs_ok = self.abs_tol.map(|tol| r_norm <= tol);
        let rel_ok = self
            .rel_tol
            .map(|tol| r_norm <= tol * r0_norm.max(f64::MIN_POSITIVE));

        self.satisfied = abs_ok.unwrap_or(false) || rel_ok.unwrap_or(false);
    }

    fn is_satisfied(&self) -> bool {
        self.satisfied
    }

    fn norm_type(&self) -> VecNormType {
        self.norm_type
    }
}
