//! Output contract and an in-memory recorder.

use std::cell::RefCell;
use std::rc::Rc;

use sf_core::GlobalVector;

use crate::process::Process;

/// Sink for solutions produced by the marching loop.
///
/// `do_output` is called for the initial condition and after every accepted
/// step; the remaining hooks have delegating defaults so simple sinks only
/// implement one method.
pub trait Output {
    fn do_output(
        &mut self,
        process: &dyn Process,
        process_id: usize,
        step: usize,
        t: f64,
        iterations: u32,
        solutions: &[GlobalVector],
    );

    /// Per-nonlinear-iteration hook, for solver diagnostics.
    fn do_output_nonlinear_iteration(
        &mut self,
        _process_id: usize,
        _step: usize,
        _t: f64,
        _iteration: u32,
        _x: &GlobalVector,
    ) {
    }

    /// Called once after the loop finishes, for the final accepted state.
    fn do_output_last_timestep(
        &mut self,
        process: &dyn Process,
        process_id: usize,
        step: usize,
        t: f64,
        iterations: u32,
        solutions: &[GlobalVector],
    ) {
        self.do_output(process, process_id, step, t, iterations, solutions);
    }

    /// Unconditional output on fatal termination, so the failing state is
    /// observable even when the step would otherwise be suppressed.
    fn do_output_always(
        &mut self,
        process: &dyn Process,
        process_id: usize,
        step: usize,
        t: f64,
        iterations: u32,
        solutions: &[GlobalVector],
    ) {
        self.do_output(process, process_id, step, t, iterations, solutions);
    }

    /// Times the loop must land on exactly, in addition to its own steps.
    fn fixed_output_times(&self) -> Vec<f64> {
        Vec::new()
    }
}

/// One recorded output event.
#[derive(Clone, Debug)]
pub struct OutputRow {
    pub step: usize,
    pub time: f64,
    pub process_id: usize,
    pub iterations: u32,
    pub solution: GlobalVector,
}

#[derive(Default)]
struct MemoryOutputInner {
    rows: Vec<OutputRow>,
    fixed_times: Vec<f64>,
}

/// Output sink that records every event in memory.
///
/// Clones share the same storage, so a handle kept outside the loop reads
/// what the loop wrote.
#[derive(Clone, Default)]
pub struct MemoryOutput {
    inner: Rc<RefCell<MemoryOutputInner>>,
}

impl MemoryOutput {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with_fixed_times(fixed_times: Vec<f64>) -> Self {
        Self {
            inner: Rc::new(RefCell::new(MemoryOutputInner {
                rows: Vec::new(),
                fixed_times,
            })),
        }
    }

    /// Snapshot of all recorded rows.
    pub fn rows(&self) -> Vec<OutputRow> {
        self.inner.borrow().rows.clone()
    }
}

impl Output for MemoryOutput {
    fn do_output(
        &mut self,
        _process: &dyn Process,
        process_id: usize,
        step: usize,
        t: f64,
        iterations: u32,
        solutions: &[GlobalVector],
    ) {
        self.inner.borrow_mut().rows.push(OutputRow {
            step,
            time: t,
            process_id,
            iterations,
            solution: solutions[process_id].clone(),
        });
    }

    fn fixed_output_times(&self) -> Vec<f64> {
        self.inner.borrow().fixed_times.clone()
    }
}
