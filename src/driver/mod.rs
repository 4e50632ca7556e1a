//! Nodes that own and repeatedly run an iteration set.
pub mod iterate;
pub mod optimizer;

pub use iterate::{ConvergenceDriver, DriverState};
pub use optimizer::{OptimizerDriver, OptimizerStrategy};
