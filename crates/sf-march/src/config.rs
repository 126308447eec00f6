//! serde-backed numerics configuration.
//!
//! These definition types are the serialized face of the numerics: each
//! `*Def` builds the corresponding runtime object. Processes themselves are
//! constructed in code and paired with a built definition.

use serde::{Deserialize, Serialize};
use sf_core::VecNormType;
use sf_solver::{
    DeltaXCriterion, NewtonConfig, NewtonSolver, NonlinearSolver, PicardConfig, PicardSolver,
    ResidualCriterion,
};
use sf_stepping::{
    FixedTimeStepping, IterationBasedConfig, IterationBasedStepping, PidStepConfig, PidStepControl,
};

use crate::bundle::ProcessBundle;
use crate::error::{MarchError, MarchResult};
use crate::output::Output;
use crate::process::Process;
use crate::timeloop::{TimeLoop, TimeLoopOptions};

/// Step-size controller selection.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(tag = "type")]
pub enum TimeStepperDef {
    Fixed {
        dt: f64,
    },
    FixedIncrements {
        dts: Vec<f64>,
    },
    IterationBased {
        initial_dt: f64,
        min_dt: f64,
        max_dt: f64,
        iteration_bounds: Vec<u32>,
        multipliers: Vec<f64>,
    },
    ErrorBased {
        initial_dt: f64,
        min_dt: f64,
        max_dt: f64,
        tolerance: f64,
    },
}

impl TimeStepperDef {
    pub fn build(
        &self,
        t0: f64,
        t_end: f64,
    ) -> MarchResult<Box<dyn sf_stepping::TimeStepAlgorithm>> {
        Ok(match self {
            TimeStepperDef::Fixed { dt } => Box::new(FixedTimeStepping::new(t0, t_end, *dt)?),
            TimeStepperDef::FixedIncrements { dts } => {
                Box::new(FixedTimeStepping::with_increments(t0, t_end, dts.clone())?)
            }
            TimeStepperDef::IterationBased {
                initial_dt,
                min_dt,
                max_dt,
                iteration_bounds,
                multipliers,
            } => Box::new(IterationBasedStepping::new(
                t0,
                t_end,
                IterationBasedConfig {
                    initial_dt: *initial_dt,
                    min_dt: *min_dt,
                    max_dt: *max_dt,
                    iteration_bounds: iteration_bounds.clone(),
                    multipliers: multipliers.clone(),
                },
            )?),
            TimeStepperDef::ErrorBased {
                initial_dt,
                min_dt,
                max_dt,
                tolerance,
            } => Box::new(PidStepControl::new(
                t0,
                t_end,
                PidStepConfig {
                    initial_dt: *initial_dt,
                    min_dt: *min_dt,
                    max_dt: *max_dt,
                    tolerance: *tolerance,
                    ..Default::default()
                },
            )?),
        })
    }
}

fn default_max_iterations() -> u32 {
    25
}

fn default_damping() -> f64 {
    1.0
}

/// Nonlinear solver selection.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(tag = "type")]
pub enum NonlinearSolverDef {
    Picard {
        #[serde(default = "default_max_iterations")]
        max_iterations: u32,
        #[serde(default = "default_damping")]
        damping: f64,
    },
    Newton {
        #[serde(default = "default_max_iterations")]
        max_iterations: u32,
        #[serde(default = "default_damping")]
        damping: f64,
    },
}

impl NonlinearSolverDef {
    pub fn build(&self) -> NonlinearSolver {
        match *self {
            NonlinearSolverDef::Picard {
                max_iterations,
                damping,
            } => NonlinearSolver::Picard(PicardSolver::new(PicardConfig {
                max_iterations,
                damping,
            })),
            NonlinearSolverDef::Newton {
                max_iterations,
                damping,
            } => NonlinearSolver::Newton(NewtonSolver::new(NewtonConfig {
                max_iterations,
                damping,
            })),
        }
    }
}

/// Convergence criterion selection.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(tag = "type")]
pub enum CriterionDef {
    DeltaX {
        abs_tol: Option<f64>,
        rel_tol: Option<f64>,
        #[serde(default)]
        norm: VecNormType,
    },
    Residual {
        abs_tol: Option<f64>,
        rel_tol: Option<f64>,
        #[serde(default)]
        norm: VecNormType,
    },
}

impl CriterionDef {
    pub fn build(&self) -> MarchResult<Box<dyn sf_solver::ConvergenceCriterion>> {
        Ok(match *self {
            CriterionDef::DeltaX {
                abs_tol,
                rel_tol,
                norm,
            } => Box::new(DeltaXCriterion::new(abs_tol, rel_tol, norm)?),
            CriterionDef::Residual {
                abs_tol,
                rel_tol,
                norm,
            } => Box::new(ResidualCriterion::new(abs_tol, rel_tol, norm)?),
        })
    }
}

/// Full per-process numerics: stepper, solver, and convergence criterion.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ProcessNumericsDef {
    pub stepper: TimeStepperDef,
    pub solver: NonlinearSolverDef,
    pub criterion: CriterionDef,
}

impl ProcessNumericsDef {
    pub fn build_bundle(
        &self,
        process: Box<dyn Process>,
        t0: f64,
        t_end: f64,
    ) -> MarchResult<ProcessBundle> {
        let stepper = self.stepper.build(t0, t_end)?;
        let solver = self.solver.build();
        let criterion = self.criterion.build()?;
        Ok(ProcessBundle::new(process, solver, stepper, criterion))
    }
}

fn is_zero(v: &u32) -> bool {
    *v == 0
}

/// Top-level time loop definition.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct TimeLoopDef {
    pub start_time: f64,
    pub end_time: f64,
    /// Coupling iteration budget for the staggered scheme; zero means a
    /// single sweep per step with no convergence check.
    #[serde(default, skip_serializing_if = "is_zero")]
    pub coupling_max_iterations: u32,
    /// One global coupling criterion per process, staggered scheme only.
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub coupling_criteria: Vec<CriterionDef>,
}

impl TimeLoopDef {
    pub fn validate(&self) -> MarchResult<()> {
        if !self.start_time.is_finite() || !self.end_time.is_finite() {
            return Err(MarchError::InvalidConfig {
                what: "start and end time must be finite".to_string(),
            });
        }
        if self.start_time >= self.end_time {
            return Err(MarchError::InvalidConfig {
                what: format!(
                    "start time {} must lie before end time {}",
                    self.start_time, self.end_time
                ),
            });
        }
        Ok(())
    }

    /// Build the coupling criteria for the staggered scheme, one per process.
    pub fn build_coupling_criteria(
        &self,
    ) -> MarchResult<Vec<Box<dyn sf_solver::ConvergenceCriterion>>> {
        self.coupling_criteria.iter().map(|def| def.build()).collect()
    }

    /// Build a [`TimeLoop`] over the given bundles and output sinks.
    pub fn build(
        &self,
        bundles: Vec<ProcessBundle>,
        outputs: Vec<Box<dyn Output>>,
    ) -> MarchResult<TimeLoop> {
        self.validate()?;
        TimeLoop::new(
            bundles,
            outputs,
            self.build_coupling_criteria()?,
            TimeLoopOptions::from(self),
        )
    }
}
