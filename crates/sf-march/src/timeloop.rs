//! The time marching loop: adaptive stepping, nonlinear solves, rollback.

use sf_core::{relative_change, update_time_steps, GlobalVector, TimeStep, VectorPool};
use sf_solver::{ConvergenceCriterion, NonlinearSolverStatus};
use tracing::{debug, error, info, warn};

use crate::bundle::ProcessBundle;
use crate::config::TimeLoopDef;
use crate::constraints::{output_time_constraints, unique_fixed_times, TimeStepConstraint};
use crate::error::{MarchError, MarchResult};
use crate::output::Output;
use crate::process::CoupledSolutions;

/// Global settings of a [`TimeLoop`].
#[derive(Clone, Copy, Debug)]
pub struct TimeLoopOptions {
    pub start_time: f64,
    pub end_time: f64,
    /// Coupling iteration budget for the staggered scheme; zero means a
    /// single sweep per step with no convergence check.
    pub coupling_max_iterations: u32,
}

impl From<&TimeLoopDef> for TimeLoopOptions {
    fn from(def: &TimeLoopDef) -> Self {
        Self {
            start_time: def.start_time,
            end_time: def.end_time,
            coupling_max_iterations: def.coupling_max_iterations,
        }
    }
}

enum OutputAction {
    Regular,
    LastTimestep,
}

/// Whether two times coincide, with a tolerance scaled to the target.
fn reached(t: f64, target: f64) -> bool {
    (t - target).abs() < 1e-12 * target.abs().max(1.0)
}

/// Orchestrates time marching over a set of process bundles.
///
/// Owns the processes, their numerics, the solution vectors, and the output
/// sinks for the whole run. One step proceeds as: advance time by the
/// reconciled step size, solve every process (monolithically independent or
/// staggered with Gauss-Seidel coupling rounds), then ask every step
/// controller for the next size. The smallest proposal wins for all
/// processes. A rejected step rolls time and all solutions back and retries
/// with the smaller size; a controller that cannot shrink any further ends
/// the run with an error.
pub struct TimeLoop {
    bundles: Vec<ProcessBundle>,
    outputs: Vec<Box<dyn Output>>,
    coupling_criteria: Vec<Box<dyn ConvergenceCriterion>>,
    constraints: Vec<TimeStepConstraint>,
    start_time: f64,
    end_time: f64,
    coupling_max_iterations: u32,
    solutions: Vec<GlobalVector>,
    solutions_prev: Vec<GlobalVector>,
    coupling_solutions: Vec<GlobalVector>,
    pool: VectorPool,
    dt: f64,
    current_time: f64,
    accepted_steps: usize,
    rejected_steps: usize,
    repeated_rejections: u32,
    last_step_rejected: bool,
    last_step_successful: bool,
    initialized: bool,
}

impl TimeLoop {
    pub fn new(
        mut bundles: Vec<ProcessBundle>,
        outputs: Vec<Box<dyn Output>>,
        coupling_criteria: Vec<Box<dyn ConvergenceCriterion>>,
        options: TimeLoopOptions,
    ) -> MarchResult<Self> {
        if !options.start_time.is_finite() || !options.end_time.is_finite() {
            return Err(MarchError::InvalidConfig {
                what: "start and end time must be finite".to_string(),
            });
        }
        if options.start_time >= options.end_time {
            return Err(MarchError::InvalidConfig {
                what: format!(
                    "start time {} must lie before end time {}",
                    options.start_time, options.end_time
                ),
            });
        }
        if bundles.is_empty() {
            return Err(MarchError::InvalidConfig {
                what: "at least one process is required".to_string(),
            });
        }
        for (id, bundle) in bundles.iter_mut().enumerate() {
            bundle.id = id;
        }

        let constraints =
            output_time_constraints(unique_fixed_times(&outputs), options.end_time);

        Ok(Self {
            bundles,
            outputs,
            coupling_criteria,
            constraints,
            start_time: options.start_time,
            end_time: options.end_time,
            coupling_max_iterations: options.coupling_max_iterations,
            solutions: Vec::new(),
            solutions_prev: Vec::new(),
            coupling_solutions: Vec::new(),
            pool: VectorPool::new(),
            dt: 0.0,
            current_time: options.start_time,
            accepted_steps: 0,
            rejected_steps: 0,
            repeated_rejections: 0,
            last_step_rejected: false,
            last_step_successful: false,
            initialized: false,
        })
    }

    /// Run from start to end time. Also usable step by step through
    /// [`initialize`](TimeLoop::initialize) and the public accessors.
    pub fn run(&mut self) -> MarchResult<()> {
        self.initialize()?;
        loop {
            let step = self.accepted_steps + 1;
            self.execute_time_step(step)?;
            if !self.calculate_next_time_step()? {
                break;
            }
        }
        self.output_last_time_step();
        Ok(())
    }

    /// Validate the setup, apply initial conditions, write the initial
    /// output, and compute the first step size.
    pub fn initialize(&mut self) -> MarchResult<()> {
        if self.initialized {
            return Ok(());
        }

        let monolithic = self.bundles[0].process.is_monolithic_scheme_used();
        for bundle in &self.bundles {
            if bundle.process.is_monolithic_scheme_used() != monolithic {
                return Err(MarchError::UnsupportedScheme {
                    process: bundle.name.clone(),
                    scheme: if monolithic { "monolithic" } else { "staggered" },
                });
            }
        }
        if !monolithic
            && self.coupling_max_iterations > 0
            && self.coupling_criteria.len() != self.bundles.len()
        {
            return Err(MarchError::InvalidConfig {
                what: format!(
                    "staggered coupling with convergence checks needs one criterion per \
                     process, got {} criteria for {} processes",
                    self.coupling_criteria.len(),
                    self.bundles.len()
                ),
            });
        }

        for bundle in &mut self.bundles {
            if !reached(bundle.timestep_algorithm.begin(), self.start_time) {
                return Err(MarchError::InvalidConfig {
                    what: format!(
                        "step controller of process '{}' starts at {}, the loop at {}",
                        bundle.name,
                        bundle.timestep_algorithm.begin(),
                        self.start_time
                    ),
                });
            }
            bundle
                .nonlinear_solver
                .check_compatibility(&*bundle.process.equation_system())
                .map_err(|_| MarchError::SolverTypeMismatch {
                    process: bundle.name.clone(),
                })?;
        }

        self.solutions.clear();
        for bundle in &self.bundles {
            let x = bundle.process.initial_solution();
            if x.len() != bundle.process.num_dof() {
                return Err(MarchError::InvalidConfig {
                    what: format!(
                        "initial condition of process '{}' has {} entries, expected {}",
                        bundle.name,
                        x.len(),
                        bundle.process.num_dof()
                    ),
                });
            }
            self.solutions.push(x);
        }
        self.solutions_prev = self.solutions.clone();
        if !monolithic {
            self.coupling_solutions = self.solutions.clone();
        }

        for bundle in &mut self.bundles {
            bundle.timestep_previous = TimeStep::initial(self.start_time);
            bundle.timestep_current = TimeStep::initial(self.start_time);
        }
        self.current_time = self.start_time;

        let t0 = self.start_time;
        self.output_solutions(true, 0, t0, OutputAction::Regular);

        self.dt = self.compute_time_stepping(0.0)?;
        self.initialized = true;
        Ok(())
    }

    fn is_staggered(&self) -> bool {
        !self.bundles[0].process.is_monolithic_scheme_used()
    }

    fn execute_time_step(&mut self, step: usize) -> MarchResult<()> {
        self.current_time += self.dt;
        let t = self.current_time;
        let dt = self.dt;
        info!(step, t, dt, "time step");
        self.last_step_successful = self.do_nonlinear_iteration(t, dt, step)?;
        Ok(())
    }

    /// Reconcile the next step size across all processes and decide whether
    /// marching continues. Also writes the regular output for a step that was
    /// not rejected.
    fn calculate_next_time_step(&mut self) -> MarchResult<bool> {
        let prev_dt = self.dt;
        let t = self.current_time;

        self.dt = self.compute_time_stepping(prev_dt)?;

        if !self.last_step_rejected {
            let step = self.accepted_steps;
            self.output_solutions(false, step, t, OutputAction::Regular);
        }

        // Termination is judged after a possible rollback.
        if reached(self.current_time, self.end_time) {
            return Ok(false);
        }
        let margin = 1e-12 * self.end_time.abs().max(1.0);
        if self.current_time + self.dt > self.end_time + margin {
            return Ok(false);
        }
        if self.dt < f64::EPSILON {
            warn!(t, "no usable step size left, stopping before the end time");
            return Ok(false);
        }
        Ok(true)
    }

    /// Ask every controller for a proposal, take the minimum, and reconcile
    /// the per-process stepping state: on acceptance advance all time steps
    /// and push the solutions, on rejection roll time back and restore the
    /// solutions of the last accepted step.
    fn compute_time_stepping(&mut self, prev_dt: f64) -> MarchResult<f64> {
        let Self {
            bundles,
            outputs,
            constraints,
            solutions,
            solutions_prev,
            current_time,
            end_time,
            accepted_steps,
            rejected_steps,
            repeated_rejections,
            last_step_rejected,
            ..
        } = self;

        let is_initial = bundles.iter().any(|b| b.timestep_current.number == 0);
        let mut all_accepted = true;
        let mut dt = f64::MAX;
        let mut min_proposer = 0usize;

        for (i, bundle) in bundles.iter_mut().enumerate() {
            let status = bundle.solver_status;
            let t = *current_time;

            let solution_error = if !status.converged {
                // Sentinel: fails any error tolerance.
                f64::INFINITY
            } else if bundle.timestep_algorithm.needs_solution_error()
                && t != bundle.timestep_algorithm.begin()
            {
                relative_change(
                    &solutions[i],
                    &solutions_prev[i],
                    bundle.conv_crit.norm_type(),
                )
            } else {
                0.0
            };

            bundle.timestep_current.accepted = status.converged;
            let proposal = bundle.timestep_algorithm.next(
                solution_error,
                status.iterations,
                &bundle.timestep_previous,
                &bundle.timestep_current,
            );

            if !proposal.accepted && t + f64::EPSILON < bundle.timestep_algorithm.end() {
                all_accepted = false;
            }
            if !status.converged {
                warn!(
                    process = bundle.name.as_str(),
                    t, "nonlinear solver did not converge, the step will be repeated"
                );
                all_accepted = false;
            }

            // Zero-step proposals only count once a process has reached its
            // own end time.
            if (proposal.dt > f64::EPSILON || reached(t, bundle.timestep_algorithm.end()))
                && proposal.dt < dt
            {
                dt = proposal.dt;
                min_proposer = i;
            }
        }

        if all_accepted {
            *repeated_rejections = 0;
        } else {
            *repeated_rejections += 1;
        }

        *last_step_rejected = false;
        if !is_initial {
            if all_accepted {
                *accepted_steps += 1;
            } else if *current_time < *end_time || reached(*current_time, *end_time) {
                *current_time -= prev_dt;
                *rejected_steps += 1;
                *last_step_rejected = true;
            }
        }

        for constraint in constraints.iter() {
            dt = dt.min(constraint(*current_time, dt));
        }

        if (dt - prev_dt).abs() < f64::EPSILON {
            if *last_step_rejected {
                let step = *accepted_steps + *rejected_steps;
                for (i, bundle) in bundles.iter().enumerate() {
                    for output in outputs.iter_mut() {
                        output.do_output_always(
                            bundle.process.as_ref(),
                            i,
                            step,
                            *current_time,
                            bundle.solver_status.iterations,
                            solutions,
                        );
                    }
                }
                return Err(MarchError::StepSizeStalled {
                    process: bundles[min_proposer].name.clone(),
                    dt,
                    rejected_dt: prev_dt,
                });
            }
            if !is_initial {
                debug!(dt, "step size stabilized");
            }
        }

        for (i, bundle) in bundles.iter_mut().enumerate() {
            if all_accepted {
                update_time_steps(
                    dt,
                    &mut bundle.timestep_previous,
                    &mut bundle.timestep_current,
                );
                bundle.timestep_algorithm.reset_current_time_step(
                    dt,
                    &bundle.timestep_previous,
                    &bundle.timestep_current,
                );
            } else {
                // Rebase the tentative step on the retry size so the next
                // rejection shrinks from the step actually attempted.
                bundle.timestep_current.time = *current_time + dt;
            }

            // No accepted state to push or restore at the start time.
            if *current_time == bundle.timestep_algorithm.begin() {
                continue;
            }
            if all_accepted {
                solutions_prev[i].copy_from(&solutions[i]);
            } else {
                debug!(
                    process = bundle.name.as_str(),
                    rejections = *repeated_rejections,
                    "restoring the solution of the last accepted step"
                );
                solutions[i].copy_from(&solutions_prev[i]);
            }
        }

        Ok(dt)
    }

    /// Solve all processes for the step at `t` with step size `dt`.
    fn do_nonlinear_iteration(&mut self, t: f64, dt: f64, step: usize) -> MarchResult<bool> {
        for (i, bundle) in self.bundles.iter_mut().enumerate() {
            bundle.process.pre_timestep(&self.solutions[i], t, dt);
        }

        let converged = if self.is_staggered() {
            self.solve_staggered(t, dt, step)?
        } else {
            self.solve_uncoupled(t, dt, step)?
        };

        if converged {
            self.post_timestep_all(t, dt);
        }
        Ok(converged)
    }

    /// Monolithic scheme: every process solves independently. The first
    /// diverged process aborts the sweep; a controller that cannot shrink the
    /// step any further is fatal.
    fn solve_uncoupled(&mut self, t: f64, dt: f64, step: usize) -> MarchResult<bool> {
        let Self {
            bundles,
            outputs,
            solutions,
            solutions_prev,
            ..
        } = self;

        for bundle in bundles.iter_mut() {
            let status = solve_one_process(bundle, solutions, solutions_prev, t, dt, step, outputs)?;
            bundle.solver_status = status;

            if !status.converged {
                error!(process = bundle.name.as_str(), t, "nonlinear solve failed");
                if !bundle
                    .timestep_algorithm
                    .can_reduce_step_size(&bundle.timestep_current, &bundle.timestep_previous)
                {
                    // The failing state must remain observable.
                    let id = bundle.id;
                    for output in outputs.iter_mut() {
                        output.do_output_always(
                            bundle.process.as_ref(),
                            id,
                            step,
                            t,
                            status.iterations,
                            solutions,
                        );
                    }
                    return Err(MarchError::StepSizeStalled {
                        process: bundle.name.clone(),
                        dt,
                        rejected_dt: dt,
                    });
                }
                return Ok(false);
            }
        }
        Ok(true)
    }

    /// Staggered scheme: Gauss-Seidel sweeps in registration order until the
    /// coupling criteria are satisfied or the round budget is exhausted.
    /// Budget exhaustion is a warning, not a failure.
    fn solve_staggered(&mut self, t: f64, dt: f64, step: usize) -> MarchResult<bool> {
        let Self {
            bundles,
            outputs,
            coupling_criteria,
            coupling_max_iterations,
            solutions,
            solutions_prev,
            coupling_solutions,
            pool,
            ..
        } = self;

        // Partner views start every attempt from the last accepted solutions;
        // a rejected attempt's iterates must not leak into the retry.
        for (x, x_prev) in coupling_solutions.iter_mut().zip(solutions_prev.iter()) {
            x.copy_from(x_prev);
        }

        let rounds = (*coupling_max_iterations).max(1);
        let check_convergence = *coupling_max_iterations > 0;

        if check_convergence {
            for criterion in coupling_criteria.iter_mut() {
                criterion.pre_first_iteration();
            }
        }

        let mut coupling_converged = false;
        for round in 0..rounds {
            if round > 0 && check_convergence {
                for criterion in coupling_criteria.iter_mut() {
                    criterion.reset();
                }
            }

            let mut round_converged = true;
            for bundle in bundles.iter_mut() {
                let id = bundle.id;
                bundle
                    .process
                    .update_coupled_solutions(CoupledSolutions::new(coupling_solutions, id));

                let status =
                    solve_one_process(bundle, solutions, solutions_prev, t, dt, step, outputs)?;
                bundle.solver_status = status;
                if !status.converged {
                    warn!(
                        process = bundle.name.as_str(),
                        round, t, "nonlinear solve failed in coupling round"
                    );
                    return Ok(false);
                }

                if check_convergence && round > 0 {
                    let mut dx = pool.acquire(solutions[id].len());
                    dx.copy_from(&solutions[id]);
                    *dx -= &coupling_solutions[id];
                    coupling_criteria[id].check_delta_x(&dx, &solutions[id]);
                    round_converged &= coupling_criteria[id].is_satisfied();
                }
                coupling_solutions[id].copy_from(&solutions[id]);
            }

            if check_convergence && round > 0 && round_converged {
                debug!(round, t, "coupling iterations converged");
                coupling_converged = true;
                break;
            }
        }

        if check_convergence && !coupling_converged {
            warn!(
                rounds,
                t, "coupling iterations did not converge within the round budget"
            );
        }
        Ok(true)
    }

    /// Post-processing of an accepted step: time derivatives, secondary
    /// quantities, and the per-process post hook.
    fn post_timestep_all(&mut self, t: f64, dt: f64) {
        let Self {
            bundles,
            solutions,
            solutions_prev,
            coupling_solutions,
            pool,
            ..
        } = self;

        let staggered = !bundles[0].process.is_monolithic_scheme_used();
        for (i, bundle) in bundles.iter_mut().enumerate() {
            if staggered {
                bundle
                    .process
                    .update_coupled_solutions(CoupledSolutions::new(coupling_solutions, i));
            }

            let mut x_dot = pool.acquire(solutions[i].len());
            x_dot.copy_from(&solutions[i]);
            x_dot.axpy(-1.0, &solutions_prev[i], 1.0);
            *x_dot /= dt;

            bundle
                .process
                .compute_secondary_quantities(&solutions[i], &x_dot, t, dt);
            bundle.process.post_timestep(&solutions[i], &x_dot, t, dt);
        }
    }

    /// Write output for every process whose last solve converged.
    ///
    /// For the initial condition the secondary quantities are computed first,
    /// with a zero time derivative and a dummy unit step size.
    fn output_solutions(&mut self, initial_condition: bool, step: usize, t: f64, action: OutputAction) {
        let Self {
            bundles,
            outputs,
            solutions,
            coupling_solutions,
            pool,
            ..
        } = self;

        let staggered = !bundles[0].process.is_monolithic_scheme_used();
        for (i, bundle) in bundles.iter_mut().enumerate() {
            if !initial_condition && !bundle.solver_status.converged {
                continue;
            }

            if initial_condition {
                if staggered {
                    bundle
                        .process
                        .update_coupled_solutions(CoupledSolutions::new(coupling_solutions, i));
                }
                let x_dot = pool.acquire(solutions[i].len());
                bundle
                    .process
                    .compute_secondary_quantities(&solutions[i], &x_dot, t, 1.0);
            }

            let iterations = bundle.solver_status.iterations;
            for output in outputs.iter_mut() {
                match action {
                    OutputAction::Regular => {
                        output.do_output(bundle.process.as_ref(), i, step, t, iterations, solutions)
                    }
                    OutputAction::LastTimestep => output.do_output_last_timestep(
                        bundle.process.as_ref(),
                        i,
                        step,
                        t,
                        iterations,
                        solutions,
                    ),
                }
            }
        }
    }

    fn output_last_time_step(&mut self) {
        info!(
            accepted = self.accepted_steps,
            rejected = self.rejected_steps,
            "time marching finished"
        );
        if self.last_step_successful {
            let step = self.accepted_steps + self.rejected_steps;
            let t = self.current_time;
            self.output_solutions(false, step, t, OutputAction::LastTimestep);
        }
    }

    pub fn current_time(&self) -> f64 {
        self.current_time
    }

    pub fn dt(&self) -> f64 {
        self.dt
    }

    pub fn accepted_steps(&self) -> usize {
        self.accepted_steps
    }

    pub fn rejected_steps(&self) -> usize {
        self.rejected_steps
    }

    pub fn solutions(&self) -> &[GlobalVector] {
        &self.solutions
    }
}

/// Solve one process at fixed `t` and `dt`, streaming per-iteration output.
fn solve_one_process(
    bundle: &mut ProcessBundle,
    solutions: &mut [GlobalVector],
    solutions_prev: &[GlobalVector],
    t: f64,
    dt: f64,
    step: usize,
    outputs: &mut [Box<dyn Output>],
) -> MarchResult<NonlinearSolverStatus> {
    let id = bundle.id;
    let x_prev = &solutions_prev[id];
    let x = &mut solutions[id];

    let mut hook = |iteration: u32, iterate: &GlobalVector| {
        for output in outputs.iter_mut() {
            output.do_output_nonlinear_iteration(id, step, t, iteration, iterate);
        }
    };

    let status = bundle.nonlinear_solver.solve(
        bundle.process.equation_system(),
        x,
        x_prev,
        t,
        dt,
        bundle.conv_crit.as_mut(),
        &mut hook,
    )?;
    Ok(status)
}
