//! sf-core: stable foundation for stepflow.
//!
//! Contains:
//! - error (shared error types)
//! - time (time step bookkeeping)
//! - norms (global vector alias, vector norms, solution-change measures)
//! - pool (reusable solution-buffer arena with scoped checkout)

pub mod error;
pub mod norms;
pub mod pool;
pub mod time;

// Re-exports: nice ergonomics for downstream crates
pub use error::{CoreError, CoreResult};
pub use norms::{norm, relative_change, GlobalMatrix, GlobalVector, VecNormType};
pub use pool::{PoolVector, VectorPool};
pub use time::{update_time_steps, TimeStep};
