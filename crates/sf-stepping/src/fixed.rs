//! Fixed time stepping with a predetermined step sequence.

use sf_core::TimeStep;

use crate::algorithm::{StepProposal, TimeStepAlgorithm};
use crate::error::{SteppingError, SteppingResult};

/// Controller that walks a user-defined sequence of step sizes.
///
/// Ignores solver feedback entirely. Once the schedule is exhausted (the end
/// time has been reached) it proposes `accepted = false` with a zero step as
/// the "no more work" signal.
#[derive(Clone, Debug)]
pub struct FixedTimeStepping {
    t_initial: f64,
    t_end: f64,
    increments: Vec<f64>,
}

impl FixedTimeStepping {
    /// Uniform step size over `[t0, t_end]`.
    ///
    /// The last increment is shortened if `t_end - t0` is not an integer
    /// multiple of `dt`.
    pub fn new(t0: f64, t_end: f64, dt: f64) -> SteppingResult<Self> {
        if !(t0 < t_end) {
            return Err(SteppingError::InvalidConfig {
                what: format!("start time {t0} must lie before end time {t_end}"),
            });
        }
        if !(dt > 0.0) || !dt.is_finite() {
            return Err(SteppingError::InvalidConfig {
                what: format!("step size must be positive and finite, got {dt}"),
            });
        }

        let span = t_end - t0;
        let whole = (span / dt).floor();
        let mut increments = vec![dt; whole as usize];
        let remainder = span - whole * dt;
        if remainder > f64::EPSILON * span {
            increments.push(remainder);
        }
        Ok(Self {
            t_initial: t0,
            t_end,
            increments,
        })
    }

    /// Explicit per-step increments over `[t0, t_end]`.
    ///
    /// The schedule may end before `t_end`; stepping then stops early with
    /// the usual end-of-schedule signal.
    pub fn with_increments(t0: f64, t_end: f64, increments: Vec<f64>) -> SteppingResult<Self> {
        if !(t0 < t_end) {
            return Err(SteppingError::InvalidConfig {
                what: format!("start time {t0} must lie before end time {t_end}"),
            });
        }
        if increments.is_empty() {
            return Err(SteppingError::InvalidConfig {
                what: "step increment sequence must not be empty".to_string(),
            });
        }
        if increments.iter().any(|&dt| !(dt > 0.0) || !dt.is_finite()) {
            return Err(SteppingError::InvalidConfig {
                what: "all step increments must be positive and finite".to_string(),
            });
        }
        Ok(Self {
            t_initial: t0,
            t_end,
            increments,
        })
    }
}

impl TimeStepAlgorithm for FixedTimeStepping {
    fn begin(&self) -> f64 {
        self.t_initial
    }

    fn end(&self) -> f64 {
        self.t_end
    }

    fn next(
        &mut self,
        _solution_error: f64,
        _iterations: u32,
        _ts_previous: &TimeStep,
        ts_current: &TimeStep,
    ) -> StepProposal {
        let index = ts_current.number;
        let exhausted =
            index >= self.increments.len() || ts_current.time + f64::EPSILON >= self.t_end;
        if exhausted {
            return StepProposal {
                accepted: false,
                dt: 0.0,
            };
        }
        StepProposal {
            accepted: true,
            dt: self.increments[index],
        }
    }

    fn reset_current_time_step(&mut self, dt: f64, previous: &TimeStep, _current: &TimeStep) {
        // An external constraint (fixed output time) shortened the step:
        // split the planned increment so later steps stay on the schedule.
        let index = previous.number;
        if index >= self.increments.len() {
            return;
        }
        let planned = self.increments[index];
        if dt < planned - f64::EPSILON * planned.max(1.0) {
            self.increments[index] = dt;
            self.increments.insert(index + 1, planned - dt);
        }
    }

    /// A predetermined schedule has no smaller step to offer.
    fn can_reduce_step_size(&self, _current: &TimeStep, _previous: &TimeStep) -> bool {
        false
    }
}
