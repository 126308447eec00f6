//! Staggered Gauss-Seidel coupling: convergence, ordering, setup errors.

use std::cell::RefCell;
use std::rc::Rc;

use sf_core::{GlobalMatrix, GlobalVector, VecNormType};
use sf_march::{
    CoupledSolutions, CriterionDef, MarchError, MemoryOutput, Process, ProcessBundle, TimeLoop,
    TimeLoopDef, TimeLoopOptions,
};
use sf_solver::{
    ConvergenceCriterion, DeltaXCriterion, EquationSystem, NewtonConfig, NewtonSolver,
    NonlinearSolver, PicardConfig, PicardSolver, SolverResult,
};
use sf_stepping::{FixedTimeStepping, IterationBasedConfig, IterationBasedStepping};

/// One half of the linear coupled pair x = coeff * partner + offset.
///
/// With |coeff_x * coeff_y| < 1 the Gauss-Seidel sweeps contract to the
/// joint fixed point.
struct CoupledSystem {
    coeff: f64,
    offset: f64,
    partner_value: f64,
    a: GlobalMatrix,
    b: GlobalVector,
}

impl EquationSystem for CoupledSystem {
    fn dimension(&self) -> usize {
        1
    }

    fn assemble(
        &mut self,
        _x: &GlobalVector,
        _x_prev: &GlobalVector,
        _t: f64,
        _dt: f64,
    ) -> SolverResult<()> {
        self.a[(0, 0)] = 1.0;
        self.b[0] = self.coeff * self.partner_value + self.offset;
        Ok(())
    }

    fn matrix(&self) -> &GlobalMatrix {
        &self.a
    }

    fn rhs(&self) -> &GlobalVector {
        &self.b
    }
}

struct LinearCoupled {
    name: String,
    partner: usize,
    x0: f64,
    monolithic: bool,
    sys: CoupledSystem,
}

impl LinearCoupled {
    fn new(name: &str, partner: usize, coeff: f64, offset: f64, x0: f64) -> Self {
        Self {
            name: name.to_string(),
            partner,
            x0,
            monolithic: false,
            sys: CoupledSystem {
                coeff,
                offset,
                partner_value: 0.0,
                a: GlobalMatrix::zeros(1, 1),
                b: GlobalVector::zeros(1),
            },
        }
    }
}

impl Process for LinearCoupled {
    fn name(&self) -> &str {
        &self.name
    }

    fn num_dof(&self) -> usize {
        1
    }

    fn initial_solution(&self) -> GlobalVector {
        GlobalVector::from_vec(vec![self.x0])
    }

    fn equation_system(&mut self) -> &mut dyn EquationSystem {
        &mut self.sys
    }

    fn is_monolithic_scheme_used(&self) -> bool {
        self.monolithic
    }

    fn update_coupled_solutions(&mut self, coupled: CoupledSolutions<'_>) {
        self.sys.partner_value = coupled.solution(self.partner)[0];
    }
}

fn picard() -> NonlinearSolver {
    NonlinearSolver::Picard(PicardSolver::new(PicardConfig::default()))
}

fn bundle(process: LinearCoupled) -> ProcessBundle {
    ProcessBundle::new(
        Box::new(process),
        picard(),
        Box::new(FixedTimeStepping::new(0.0, 1.0, 1.0).unwrap()),
        Box::new(DeltaXCriterion::new(Some(1e-12), None, VecNormType::Norm2).unwrap()),
    )
}

fn coupling_criteria(n: usize) -> Vec<Box<dyn ConvergenceCriterion>> {
    (0..n)
        .map(|_| {
            Box::new(DeltaXCriterion::new(Some(1e-10), None, VecNormType::Norm2).unwrap())
                as Box<dyn ConvergenceCriterion>
        })
        .collect()
}

fn options(coupling_max_iterations: u32) -> TimeLoopOptions {
    TimeLoopOptions {
        start_time: 0.0,
        end_time: 1.0,
        coupling_max_iterations,
    }
}

#[test]
fn coupling_rounds_converge_to_the_joint_fixed_point() {
    // x = 0.5 y + 1, y = 0.5 x + 1 has the fixed point (2, 2).
    let bundles = vec![
        bundle(LinearCoupled::new("x", 1, 0.5, 1.0, 0.0)),
        bundle(LinearCoupled::new("y", 0, 0.5, 1.0, 0.0)),
    ];
    let mut time_loop =
        TimeLoop::new(bundles, Vec::new(), coupling_criteria(2), options(40)).unwrap();

    time_loop.run().unwrap();

    assert_eq!(time_loop.accepted_steps(), 1);
    assert!((time_loop.solutions()[0][0] - 2.0).abs() < 1e-8);
    assert!((time_loop.solutions()[1][0] - 2.0).abs() < 1e-8);
}

#[test]
fn later_processes_see_updated_partner_values_within_a_round() {
    // A single sweep: x solves first (x = 1), y must already see x = 1.
    let bundles = vec![
        bundle(LinearCoupled::new("x", 1, 0.5, 1.0, 0.0)),
        bundle(LinearCoupled::new("y", 0, 0.5, 1.0, 0.0)),
    ];
    let mut time_loop =
        TimeLoop::new(bundles, Vec::new(), coupling_criteria(2), options(1)).unwrap();

    time_loop.run().unwrap();

    assert!((time_loop.solutions()[0][0] - 1.0).abs() < 1e-12);
    assert!((time_loop.solutions()[1][0] - 1.5).abs() < 1e-12);
}

#[test]
fn a_solution_at_the_fixed_point_stays_there() {
    let bundles = vec![
        bundle(LinearCoupled::new("x", 1, 0.5, 1.0, 2.0)),
        bundle(LinearCoupled::new("y", 0, 0.5, 1.0, 2.0)),
    ];
    let mut time_loop =
        TimeLoop::new(bundles, Vec::new(), coupling_criteria(2), options(10)).unwrap();

    time_loop.run().unwrap();

    assert!((time_loop.solutions()[0][0] - 2.0).abs() < 1e-12);
    assert!((time_loop.solutions()[1][0] - 2.0).abs() < 1e-12);
}

#[test]
fn an_exhausted_round_budget_is_not_a_failure() {
    // Slow contraction, two rounds are nowhere near the fixed point (10, 10).
    let out = MemoryOutput::new();
    let bundles = vec![
        bundle(LinearCoupled::new("x", 1, 0.9, 1.0, 0.0)),
        bundle(LinearCoupled::new("y", 0, 0.9, 1.0, 0.0)),
    ];
    let mut time_loop = TimeLoop::new(
        bundles,
        vec![Box::new(out.clone())],
        coupling_criteria(2),
        options(2),
    )
    .unwrap();

    time_loop.run().unwrap();

    assert_eq!(time_loop.accepted_steps(), 1);
    // Exactly two Gauss-Seidel sweeps were applied.
    assert!((time_loop.solutions()[0][0] - 2.71).abs() < 1e-10);
    assert!((time_loop.solutions()[1][0] - 3.439).abs() < 1e-10);
    assert!(!out.rows().is_empty());
}

#[test]
fn mixing_coupling_schemes_is_rejected_at_setup() {
    let staggered = LinearCoupled::new("x", 1, 0.5, 1.0, 0.0);
    let mut monolithic = LinearCoupled::new("y", 0, 0.5, 1.0, 0.0);
    monolithic.monolithic = true;

    let mut time_loop = TimeLoop::new(
        vec![bundle(staggered), bundle(monolithic)],
        Vec::new(),
        coupling_criteria(2),
        options(5),
    )
    .unwrap();

    let err = time_loop.run().unwrap_err();
    assert!(matches!(err, MarchError::UnsupportedScheme { .. }));
}

#[test]
fn newton_without_a_jacobian_is_rejected_at_setup() {
    let mut process = LinearCoupled::new("x", 0, 0.0, 1.0, 0.0);
    process.monolithic = true;
    let bundle = ProcessBundle::new(
        Box::new(process),
        NonlinearSolver::Newton(NewtonSolver::new(NewtonConfig::default())),
        Box::new(FixedTimeStepping::new(0.0, 1.0, 1.0).unwrap()),
        Box::new(DeltaXCriterion::new(Some(1e-12), None, VecNormType::Norm2).unwrap()),
    );
    let mut time_loop = TimeLoop::new(vec![bundle], Vec::new(), Vec::new(), options(0)).unwrap();

    let err = time_loop.run().unwrap_err();
    match err {
        MarchError::SolverTypeMismatch { process } => assert_eq!(process, "x"),
        other => panic!("unexpected error: {other}"),
    }
}

type PartnerLog = Rc<RefCell<Vec<(f64, f64)>>>;

/// The stable half of the pair; logs the partner value behind every assembly.
struct WatchfulSystem {
    partner_value: f64,
    log: PartnerLog,
    a: GlobalMatrix,
    b: GlobalVector,
}

impl EquationSystem for WatchfulSystem {
    fn dimension(&self) -> usize {
        1
    }

    fn assemble(
        &mut self,
        _x: &GlobalVector,
        _x_prev: &GlobalVector,
        _t: f64,
        dt: f64,
    ) -> SolverResult<()> {
        self.log.borrow_mut().push((dt, self.partner_value));
        self.a[(0, 0)] = 1.0;
        self.b[0] = 0.5 * self.partner_value + 1.0;
        Ok(())
    }

    fn matrix(&self) -> &GlobalMatrix {
        &self.a
    }

    fn rhs(&self) -> &GlobalVector {
        &self.b
    }
}

struct WatchfulProcess {
    sys: WatchfulSystem,
}

impl WatchfulProcess {
    fn new(log: PartnerLog) -> Self {
        Self {
            sys: WatchfulSystem {
                partner_value: 0.0,
                log,
                a: GlobalMatrix::zeros(1, 1),
                b: GlobalVector::zeros(1),
            },
        }
    }
}

impl Process for WatchfulProcess {
    fn name(&self) -> &str {
        "watchful"
    }

    fn num_dof(&self) -> usize {
        1
    }

    fn initial_solution(&self) -> GlobalVector {
        GlobalVector::from_vec(vec![1.0])
    }

    fn equation_system(&mut self) -> &mut dyn EquationSystem {
        &mut self.sys
    }

    fn is_monolithic_scheme_used(&self) -> bool {
        false
    }

    fn update_coupled_solutions(&mut self, coupled: CoupledSolutions<'_>) {
        self.sys.partner_value = coupled.solution(1)[0];
    }
}

/// The fragile half; diverges in coupling rounds past the first whenever the
/// step size exceeds `dt_limit`.
struct RoundFragileSystem {
    partner_value: f64,
    diverge: bool,
    a: GlobalMatrix,
    b: GlobalVector,
}

impl EquationSystem for RoundFragileSystem {
    fn dimension(&self) -> usize {
        1
    }

    fn assemble(
        &mut self,
        x: &GlobalVector,
        _x_prev: &GlobalVector,
        _t: f64,
        _dt: f64,
    ) -> SolverResult<()> {
        self.a[(0, 0)] = 1.0;
        self.b[0] = if self.diverge {
            // Runaway fixed-point map.
            2.0 * x[0] + 1.0
        } else {
            0.5 * self.partner_value + 1.0
        };
        Ok(())
    }

    fn matrix(&self) -> &GlobalMatrix {
        &self.a
    }

    fn rhs(&self) -> &GlobalVector {
        &self.b
    }
}

struct RoundFragileProcess {
    dt_limit: f64,
    armed: bool,
    rounds: usize,
    sys: RoundFragileSystem,
}

impl RoundFragileProcess {
    fn new(dt_limit: f64) -> Self {
        Self {
            dt_limit,
            armed: false,
            rounds: 0,
            sys: RoundFragileSystem {
                partner_value: 0.0,
                diverge: false,
                a: GlobalMatrix::zeros(1, 1),
                b: GlobalVector::zeros(1),
            },
        }
    }
}

impl Process for RoundFragileProcess {
    fn name(&self) -> &str {
        "fragile"
    }

    fn num_dof(&self) -> usize {
        1
    }

    fn initial_solution(&self) -> GlobalVector {
        GlobalVector::from_vec(vec![1.0])
    }

    fn equation_system(&mut self) -> &mut dyn EquationSystem {
        &mut self.sys
    }

    fn is_monolithic_scheme_used(&self) -> bool {
        false
    }

    fn pre_timestep(&mut self, _x: &GlobalVector, _t: f64, dt: f64) {
        self.armed = dt > self.dt_limit;
        self.rounds = 0;
    }

    fn update_coupled_solutions(&mut self, coupled: CoupledSolutions<'_>) {
        self.rounds += 1;
        self.sys.diverge = self.armed && self.rounds > 1;
        self.sys.partner_value = coupled.solution(0)[0];
    }
}

#[test]
fn a_rejected_step_does_not_leak_iterates_into_the_retry() {
    fn adaptive_stepper() -> Box<IterationBasedStepping> {
        Box::new(
            IterationBasedStepping::new(
                0.0,
                0.5,
                IterationBasedConfig {
                    initial_dt: 0.5,
                    min_dt: 0.1,
                    max_dt: 1.0,
                    iteration_bounds: vec![1, 4],
                    multipliers: vec![2.0, 0.5],
                },
            )
            .unwrap(),
        )
    }

    let log: PartnerLog = Rc::default();
    let bundles = vec![
        ProcessBundle::new(
            Box::new(WatchfulProcess::new(log.clone())),
            picard(),
            adaptive_stepper(),
            Box::new(DeltaXCriterion::new(Some(1e-12), None, VecNormType::Norm2).unwrap()),
        ),
        ProcessBundle::new(
            Box::new(RoundFragileProcess::new(0.3)),
            picard(),
            adaptive_stepper(),
            Box::new(DeltaXCriterion::new(Some(1e-12), None, VecNormType::Norm2).unwrap()),
        ),
    ];
    let delta_x = CriterionDef::DeltaX {
        abs_tol: Some(1e-10),
        rel_tol: None,
        norm: VecNormType::Norm2,
    };
    let def = TimeLoopDef {
        start_time: 0.0,
        end_time: 0.5,
        coupling_max_iterations: 40,
        coupling_criteria: vec![delta_x.clone(), delta_x],
    };
    let mut time_loop = def.build(bundles, Vec::new()).unwrap();

    // The first step at dt = 0.5 fails in the second coupling round and is
    // retried at dt = 0.25.
    time_loop.run().unwrap();

    assert_eq!(time_loop.accepted_steps(), 2);
    assert_eq!(time_loop.rejected_steps(), 1);

    let records = log.borrow().clone();
    // The rejected attempt reached the second round and saw the partner's
    // intermediate value there.
    assert!(records
        .iter()
        .any(|&(dt, p)| dt == 0.5 && (p - 1.75).abs() < 1e-12));
    // The retry's first round sees the last accepted partner value again,
    // not a leftover iterate of the rejected attempt.
    let (_, partner) = records.iter().copied().find(|&(dt, _)| dt < 0.3).unwrap();
    assert!((partner - 1.0).abs() < 1e-12);

    assert!((time_loop.solutions()[0][0] - 2.0).abs() < 1e-8);
    assert!((time_loop.solutions()[1][0] - 2.0).abs() < 1e-8);
}

#[test]
fn coupling_checks_need_one_criterion_per_process() {
    let bundles = vec![
        bundle(LinearCoupled::new("x", 1, 0.5, 1.0, 0.0)),
        bundle(LinearCoupled::new("y", 0, 0.5, 1.0, 0.0)),
    ];
    let mut time_loop =
        TimeLoop::new(bundles, Vec::new(), coupling_criteria(1), options(5)).unwrap();

    let err = time_loop.run().unwrap_err();
    assert!(matches!(err, MarchError::InvalidConfig { .. }));
}
