//! Connection edges, per-variable validity and lazy scheduling.
pub mod connections;
pub mod scheduler;
pub mod topology;
pub mod validity;

pub use connections::Connections;
pub use topology::{order_units, Unit};
pub use validity::ValidityGraph;
