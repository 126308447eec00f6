//! Step-size control from nonlinear iteration counts.

use sf_core::TimeStep;

use crate::algorithm::{StepProposal, TimeStepAlgorithm};
use crate::error::{SteppingError, SteppingResult};

/// Configuration for [`IterationBasedStepping`].
#[derive(Clone, Debug)]
pub struct IterationBasedConfig {
    /// Step size of the very first step (seconds), used verbatim
    pub initial_dt: f64,
    /// Smallest allowed step size
    pub min_dt: f64,
    /// Largest allowed step size
    pub max_dt: f64,
    /// Ascending iteration-count thresholds
    pub iteration_bounds: Vec<u32>,
    /// Step multiplier in effect once the matching threshold is reached
    pub multipliers: Vec<f64>,
}

impl Default for IterationBasedConfig {
    fn default() -> Self {
        Self {
            initial_dt: 1e-2,
            min_dt: 1e-6,
            max_dt: 1e2,
            iteration_bounds: vec![1, 4, 10, 15],
            multipliers: vec![1.6, 1.0, 0.5, 0.25],
        }
    }
}

/// Grows the step when the nonlinear solver needed few iterations, shrinks it
/// when it needed many or diverged.
///
/// The multiplier table is piecewise constant over the iteration count: the
/// last threshold not exceeding the count selects the multiplier. After a
/// diverged solve the smallest multiplier in the table is applied.
#[derive(Clone, Debug)]
pub struct IterationBasedStepping {
    t_initial: f64,
    t_end: f64,
    config: IterationBasedConfig,
}

impl IterationBasedStepping {
    pub fn new(t0: f64, t_end: f64, config: IterationBasedConfig) -> SteppingResult<Self> {
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
        if config.iteration_bounds.is_empty()
            || config.iteration_bounds.len() != config.multipliers.len()
        {
            return Err(SteppingError::InvalidConfig {
                what: "iteration bounds and multipliers must be non-empty and equally long"
                    .to_string(),
            });
        }
        if config.iteration_bounds.windows(2).any(|w| w[0] >= w[1]) {
            return Err(SteppingError::InvalidConfig {
                what: "iteration bounds must be strictly increasing".to_string(),
            });
        }
        if config.multipliers.iter().any(|&m| !(m > 0.0)) {
            return Err(SteppingError::InvalidConfig {
                what: "all step multipliers must be positive".to_string(),
            });
        }
        Ok(Self {
            t_initial: t0,
            t_end,
            config,
        })
    }

    fn multiplier_for(&self, iterations: u32) -> f64 {
        let mut multiplier = self.config.multipliers[0];
        for (bound, m) in self
            .config
            .iteration_bounds
            .iter()
            .zip(&self.config.multipliers)
        {
            if iterations >= *bound {
                multiplier = *m;
            }
        }
        multiplier
    }

    fn smallest_multiplier(&self) -> f64 {
        self.config
            .multipliers
            .iter()
            .copied()
            .fold(f64::INFINITY, f64::min)
    }
}

impl TimeStepAlgorithm for IterationBasedStepping {
    fn begin(&self) -> f64 {
        self.t_initial
    }

    fn end(&self) -> f64 {
        self.t_end
    }

    fn next(
        &mut self,
        _solution_error: f64,
        iterations: u32,
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
        let multiplier = if ts_current.accepted {
            self.multiplier_for(iterations)
        } else {
            self.smallest_multiplier()
        };
        let dt = (current_dt * multiplier).clamp(self.config.min_dt, self.config.max_dt);

        StepProposal {
            accepted: ts_current.accepted,
            dt,
        }
    }

    fn can_reduce_step_size(&self, current: &TimeStep, previous: &TimeStep) -> bool {
        current.dt_since(previous) > self.config.min_dt * (1.0 + f64::EPSILON)
    }
}
