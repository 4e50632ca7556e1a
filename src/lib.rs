// Crate root: a hierarchical dataflow engine.
// Nodes live in a scope tree, exchange values through connected variables,
// and re-execute lazily when an upstream input changes.

pub mod component;
pub mod config;
pub mod display;
pub mod driver;
pub mod error;
pub mod expr;
pub mod graph;
pub mod model;
pub mod project;
pub mod scope;
pub mod store;

pub use component::{Component, ExecContext, FnComponent, VarSpec};
pub use config::{EngineConfig, IterateSettings};
pub use driver::{ConvergenceDriver, DriverState, OptimizerDriver, OptimizerStrategy};
pub use error::{FlowError, Origin, Result};
pub use expr::CompiledExpression;
pub use model::Model;
pub use project::{Command, CommandRecorder, ComponentFactory, MacroLog, Project};
pub use store::{Direction, NodeId, NodeKind, Value, VarId};
