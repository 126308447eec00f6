//! Process trait: capability set of one time-dependent equation system.

use sf_core::GlobalVector;
use sf_solver::EquationSystem;

/// Read-only view of all process solutions, handed to a process before each
/// staggered solve so it can pick up its coupling partners' latest values.
///
/// Later processes in registration order see values already updated within
/// the same coupling round (Gauss-Seidel semantics).
#[derive(Clone, Copy)]
pub struct CoupledSolutions<'a> {
    solutions: &'a [GlobalVector],
    own_id: usize,
}

impl<'a> CoupledSolutions<'a> {
    pub fn new(solutions: &'a [GlobalVector], own_id: usize) -> Self {
        Self { solutions, own_id }
    }

    /// Id of the process receiving this view.
    pub fn own_id(&self) -> usize {
        self.own_id
    }

    pub fn len(&self) -> usize {
        self.solutions.len()
    }

    pub fn is_empty(&self) -> bool {
        self.solutions.is_empty()
    }

    /// Solution of an arbitrary process.
    pub fn solution(&self, process_id: usize) -> &'a GlobalVector {
        &self.solutions[process_id]
    }

    /// Solutions of all coupling partners, excluding the receiver's own.
    pub fn others(&self) -> impl Iterator<Item = (usize, &'a GlobalVector)> + '_ {
        let own_id = self.own_id;
        self.solutions
            .iter()
            .enumerate()
            .filter(move |(id, _)| *id != own_id)
    }
}

/// One coupled nonlinear equation system advanced in time.
///
/// A process owns its equation system and any model state behind it; all
/// side effects stay within the process. Inter-process coupling happens only
/// through [`update_coupled_solutions`](Process::update_coupled_solutions),
/// fed by the marching loop.
pub trait Process {
    fn name(&self) -> &str {
        "process"
    }

    /// Number of unknowns in this process's solution vector.
    fn num_dof(&self) -> usize;

    /// Solution at the start time.
    fn initial_solution(&self) -> GlobalVector;

    /// Assembly access for the nonlinear solver.
    fn equation_system(&mut self) -> &mut dyn EquationSystem;

    /// Whether this process participates in the monolithic scheme (true) or
    /// in staggered coupling (false). All registered processes must agree.
    fn is_monolithic_scheme_used(&self) -> bool {
        true
    }

    /// Receive the coupling partners' latest solutions (staggered mode).
    fn update_coupled_solutions(&mut self, _coupled: CoupledSolutions<'_>) {}

    /// Hook before a step is attempted at time `t` with step size `dt`.
    fn pre_timestep(&mut self, _x: &GlobalVector, _t: f64, _dt: f64) {}

    /// Hook after a step has been accepted.
    fn post_timestep(&mut self, _x: &GlobalVector, _x_dot: &GlobalVector, _t: f64, _dt: f64) {}

    /// Update derived quantities from the converged solution; runs before
    /// results become externally observable.
    fn compute_secondary_quantities(
        &mut self,
        _x: &GlobalVector,
        _x_dot: &GlobalVector,
        _t: f64,
        _dt: f64,
    ) {
    }
}
