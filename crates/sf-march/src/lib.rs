//! Time-marching orchestration for coupled nonlinear processes.
//!
//! Provides:
//! - Process trait: capability set of one time-dependent equation system
//! - ProcessBundle: a process with its solver, step controller, and criterion
//! - Output contract with an in-memory recorder
//! - Fixed-output-time and end-time step constraints
//! - serde-backed numerics configuration
//! - TimeLoop: the adaptive stepping and coupling orchestrator

pub mod bundle;
pub mod config;
pub mod constraints;
pub mod error;
pub mod output;
pub mod process;
pub mod timeloop;

// Re-exports for public API
pub use bundle::ProcessBundle;
pub use config::{CriterionDef, NonlinearSolverDef, ProcessNumericsDef, TimeLoopDef, TimeStepperDef};
pub use constraints::{clamp_dt_to_next_fixed_time, TimeStepConstraint};
pub use error::{MarchError, MarchResult};
pub use output::{MemoryOutput, Output, OutputRow};
pub use process::{CoupledSolutions, Process};
pub use timeloop::{TimeLoop, TimeLoopOptions};
