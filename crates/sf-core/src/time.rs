//! Time step bookkeeping.

/// One time step of the marching loop.
///
/// A `previous`/`current` pair of these is held per process. `previous`
/// always refers to the last accepted step; `current` may describe a
/// tentative step that is still awaiting acceptance.
#[derive(Clone, Copy, Debug, PartialEq)]
pub struct TimeStep {
    /// Time at the end of this step (seconds)
    pub time: f64,
    /// Step counter; the initial state is step 0
    pub number: usize,
    /// Whether the step has been accepted
    pub accepted: bool,
}

impl TimeStep {
    /// The initial step at the start time. Step 0 is always accepted.
    pub fn initial(t0: f64) -> Self {
        Self {
            time: t0,
            number: 0,
            accepted: true,
        }
    }

    /// Step size relative to another (usually the previous) step.
    pub fn dt_since(&self, previous: &TimeStep) -> f64 {
        self.time - previous.time
    }
}

/// Push `current` into `previous` and advance `current` by `dt`.
///
/// Called once per accepted step, after the global step size has been
/// reconciled across all processes.
pub fn update_time_steps(dt: f64, previous: &mut TimeStep, current: &mut TimeStep) {
    *previous = *current;
    current.time += dt;
    current.number += 1;
}
