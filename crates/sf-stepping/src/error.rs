//! Error types for step-size controller construction.

use thiserror::Error;

/// Errors raised while building a step-size controller.
#[derive(Error, Debug)]
pub enum SteppingError {
    #[error("Invalid time stepping configuration: {what}")]
    InvalidConfig { what: String },
}

pub type SteppingResult<T> = Result<T, SteppingError>;
