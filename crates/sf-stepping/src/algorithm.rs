//! TimeStepAlgorithm trait for pluggable step-size controllers.

use sf_core::TimeStep;

/// A controller's answer for the next time step.
#[derive(Clone, Copy, Debug, PartialEq)]
pub struct StepProposal {
    /// Whether the controller accepts the step that was just computed.
    ///
    /// `FixedTimeStepping` also uses `false` to signal that the end of its
    /// schedule has been reached ("no more work"), not a rejection.
    pub accepted: bool,
    /// Proposed size of the next step (seconds)
    pub dt: f64,
}

/// Per-process step-size controller.
///
/// Lifecycle: constructed for one run over `[begin, end]`, queried once per
/// step attempt via [`next`](TimeStepAlgorithm::next) with feedback from the
/// nonlinear solve, and informed via
/// [`reset_current_time_step`](TimeStepAlgorithm::reset_current_time_step)
/// when the step actually taken was forced smaller by an external constraint
/// (end time, fixed output time).
pub trait TimeStepAlgorithm {
    /// Start time of the controlled interval.
    fn begin(&self) -> f64;

    /// End time of the controlled interval.
    fn end(&self) -> f64;

    /// Propose the next step size.
    ///
    /// `solution_error` is the relative change of the solution over the last
    /// step; a non-finite value is the caller's sentinel for a diverged
    /// nonlinear solve and must always fail the controller's tolerance.
    /// `iterations` is the nonlinear iteration count of the last solve.
    fn next(
        &mut self,
        solution_error: f64,
        iterations: u32,
        ts_previous: &TimeStep,
        ts_current: &TimeStep,
    ) -> StepProposal;

    /// Record that the step actually used was `dt`, which may be smaller than
    /// the last proposal because of external constraints.
    fn reset_current_time_step(&mut self, _dt: f64, _previous: &TimeStep, _current: &TimeStep) {}

    /// Whether [`next`](TimeStepAlgorithm::next) consumes the solution error.
    /// Controllers that ignore it spare the caller the norm computation.
    fn needs_solution_error(&self) -> bool {
        false
    }

    /// Whether the controller can still shrink the step after a rejection.
    fn can_reduce_step_size(&self, _current: &TimeStep, _previous: &TimeStep) -> bool {
        true
    }
}
