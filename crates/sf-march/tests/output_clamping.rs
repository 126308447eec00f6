//! Fixed output times force the loop to land on them exactly.

use sf_core::{GlobalMatrix, GlobalVector, VecNormType};
use sf_march::{MemoryOutput, Process, ProcessBundle, TimeLoop, TimeLoopOptions};
use sf_solver::{
    DeltaXCriterion, EquationSystem, NonlinearSolver, PicardConfig, PicardSolver, SolverResult,
};
use sf_stepping::FixedTimeStepping;

struct DecaySystem {
    a: GlobalMatrix,
    b: GlobalVector,
}

impl EquationSystem for DecaySystem {
    fn dimension(&self) -> usize {
        1
    }

    fn assemble(
        &mut self,
        _x: &GlobalVector,
        x_prev: &GlobalVector,
        _t: f64,
        dt: f64,
    ) -> SolverResult<()> {
        self.a[(0, 0)] = 1.0 + dt;
        self.b[0] = x_prev[0];
        Ok(())
    }

    fn matrix(&self) -> &GlobalMatrix {
        &self.a
    }

    fn rhs(&self) -> &GlobalVector {
        &self.b
    }
}

struct DecayProcess {
    sys: DecaySystem,
}

impl DecayProcess {
    fn new() -> Self {
        Self {
            sys: DecaySystem {
                a: GlobalMatrix::zeros(1, 1),
                b: GlobalVector::zeros(1),
            },
        }
    }
}

impl Process for DecayProcess {
    fn name(&self) -> &str {
        "decay"
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
}

fn run_with_fixed_times(fixed_times: Vec<f64>) -> (MemoryOutput, usize) {
    let out = MemoryOutput::with_fixed_times(fixed_times);
    let bundle = ProcessBundle::new(
        Box::new(DecayProcess::new()),
        NonlinearSolver::Picard(PicardSolver::new(PicardConfig::default())),
        Box::new(FixedTimeStepping::new(0.0, 1.0, 0.5).unwrap()),
        Box::new(DeltaXCriterion::new(Some(1e-12), None, VecNormType::Norm2).unwrap()),
    );
    let mut time_loop = TimeLoop::new(
        vec![bundle],
        vec![Box::new(out.clone())],
        Vec::new(),
        TimeLoopOptions {
            start_time: 0.0,
            end_time: 1.0,
            coupling_max_iterations: 0,
        },
    )
    .unwrap();
    time_loop.run().unwrap();
    (out, time_loop.accepted_steps())
}

#[test]
fn an_output_time_between_steps_is_hit_exactly() {
    let (out, accepted) = run_with_fixed_times(vec![0.3]);

    // The 0.5 schedule is split into 0.3 + 0.2 around the output time.
    assert_eq!(accepted, 3);
    let times: Vec<f64> = out.rows().iter().map(|r| r.time).collect();
    assert_eq!(times, vec![0.0, 0.3, 0.5, 1.0, 1.0]);
    assert!(times.contains(&0.3));
}

#[test]
fn several_output_times_keep_the_schedule_on_track() {
    let (out, accepted) = run_with_fixed_times(vec![0.3, 0.7]);

    assert_eq!(accepted, 4);
    let times: Vec<f64> = out.rows().iter().map(|r| r.time).collect();
    assert_eq!(times[0], 0.0);
    assert!(times.contains(&0.3));
    assert!(times.contains(&0.7));
    assert!((times[times.len() - 1] - 1.0).abs() < 1e-12);
}

#[test]
fn output_times_already_passed_are_ignored() {
    // 0.0 coincides with the start and must not produce a zero-length step.
    let (_, accepted) = run_with_fixed_times(vec![0.0, 0.5]);
    assert_eq!(accepted, 2);
}
