//! Error-based adaptive step-size control (evolutionary PID).

use sf_core::TimeStep;
use tracing::debug;

use crate::algorithm::{StepProposal, TimeStepAlgorithm};
use crate::error::{SteppingError, SteppingResult};

/// Shrink factor applied when the nonlinear solve diverged and no usable
/// error estimate exists.
const DIVERGENCE_FACTOR: f64 = 0.25;

/// Configuration for [`PidStepControl`].
#[derive(Clone, Debug)]
pub struct PidStepConfig {
    /// Step size of the very first step (seconds), used verbatim
    pub initial_dt: f64,
    /// Smallest allowed step size
    pub min_dt: f64,
    /// Largest allowed step size
    pub max_dt: f64,
    /// Relative solution-error tolerance; a step with a larger error is
    /// rejected
    pub tolerance: f64,
    /// Proportional gain
    pub kp: f64,
    /// Integral gain
    pub ki: f64,
    /// Derivative gain
    pub kd: f64,
}

impl Default for PidStepConfig {
    fn default() -> Self {
        Self {
            initial_dt: 1e-2,
            min_dt: 1e-6,
            max_dt: 1e2,
            tolerance: 1e-3,
            kp: 0.075,
            ki: 0.175,
            kd: 0.01,
        }
    }
}

/// Adapts the step size to the relative change of the solution.
///
/// The next step size follows a PID law over the error history,
/// `dt * (e_{n-1}/e_n)^kp * (tol/e_n)^ki * (e_{n-1}^2/(e_n e_{n-2}))^kd`,
/// clamped to the configured bounds. A step whose error exceeds the
/// tolerance is rejected and always gets a strictly smaller retry size. The
/// non-convergence sentinel (a non-finite error) shrinks the step by a fixed
/// factor without touching the error history.
#[derive(Clone, Debug)]
pub struct PidStepControl {
    t_initial: f64,
    t_end: f64,
    config: PidStepConfig,
    error_prev: Option<f64>,
    error_prev2: Option<f64>,
}

impl PidStepControl {
    pub fn new(t0: f64, t_end: f64, config: PidStepConfig) -> SteppingResult<Self> {
        if !(t0 < t_end) {
            return Err(SteppingError::InvalidConfig {
                what: format!("start time {t0} must lie before end time {t_end}"),
            });
        }
        if !(config.min_dt > 0.0) || config.min_dt > config.max_dt {
            return Err(SteppingError::InvalidConfig {
                what: format!(
                    "step size bounds must satisfy 0 < min_dt <= max_dt, got [{}, {}]",
                    config.min_dt, config.max_dt
                ),
            });
        }
        if config.initial_dt < config.min_dt || config.initial_dt > config.max_dt {
            return Err(SteppingError::InvalidConfig {
                what: format!(
                    "initial step size {} lies outside [{}, {}]",
                    config.initial_dt, config.min_dt, config.max_dt
                ),
            });
        }
        if !(config.tolerance > 0.0) {
            return Err(SteppingError::InvalidConfig {
                what: format!("error tolerance must be positive, got {}", config.tolerance),
            });
        }
        Ok(Self {
            t_initial: t0,
            t_end,
            config,
            error_prev: None,
            error_prev2: None,
        })
    }
}

impl TimeStepAlgorithm for PidStepControl {
    fn begin(&self) -> f64 {
        self.t_initial
    }

    fn end(&self) -> f64 {
        self.t_end
    }

    fn next(
        &mut self,
        solution_error: f64,
        _iterations: u32,
        ts_previous: &TimeStep,
        ts_current: &TimeStep,
    ) -> StepProposal {
        if ts_current.number == 0 {
            return StepProposal {
                accepted: true,
                dt: self.config.initial_dt,
            };
        }

        let current_dt = ts_current.dt_since(ts_previous);

        if !solution_error.is_finite() {
            let dt = (current_dt * DIVERGENCE_FACTOR).clamp(self.config.min_dt, self.config.max_dt);
            debug!(dt, "diverged solve, shrinking step without error feedback");
            return StepProposal {
                accepted: false,
                dt,
            };
        }

        // Zero error (solution unchanged) would blow the PID factor up; treat
        // it as a very small error instead.
        let e_n = if solution_error > 0.0 {
            solution_error
        } else {
            self.config.tolerance * 1e-3
        };
        let e_1 = self.error_prev.unwrap_or(e_n);
        let e_2 = self.error_prev2.unwrap_or(e_1);

        let tol = self.config.tolerance;
        let mut factor = (e_1 / e_n).powf(self.config.kp)
            * (tol / e_n).powf(self.config.ki)
            * ((e_1 * e_1) / (e_n * e_2)).powf(self.config.kd);

        let accepted = e_n <= tol;
        if !accepted {
            // A rejected step must retry with a strictly smaller size.
            factor = factor.min(0.8);
        }

        let dt = (current_dt * factor).clamp(self.config.min_dt, self.config.max_dt);

        self.error_prev2 = self.error_prev;
        self.error_prev = Some(e_n);

        StepProposal { accepted, dt }
    }

    fn needs_solution_error(&self) -> bool {
        true
    }

    fn can_reduce_step_size(&self, current: &TimeStep, previous: &TimeStep) -> bool {
        current.dt_since(previous) > self.config.min_dt * (1.0 + f64::EPSILON)
    }
}
