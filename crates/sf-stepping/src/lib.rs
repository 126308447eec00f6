//! Time step size control for stepflow.
//!
//! Provides:
//! - TimeStepAlgorithm trait: per-process step-size controllers
//! - FixedTimeStepping: predetermined step sequence
//! - IterationBasedStepping: adapts on nonlinear iteration counts
//! - PidStepControl: adapts on the relative solution error

pub mod algorithm;
pub mod error;
pub mod fixed;
pub mod iteration_based;
pub mod pid;

// Re-exports for public API
pub use algorithm::{StepProposal, TimeStepAlgorithm};
pub use error::{SteppingError, SteppingResult};
pub use fixed::FixedTimeStepping;
pub use iteration_based::{IterationBasedConfig, IterationBasedStepping};
pub use pid::{PidStepConfig, PidStepControl};
