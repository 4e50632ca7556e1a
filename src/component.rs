//! The node contract consumed by the scheduler.

use std::any::Any;
use std::fmt;

use crate::error::{FlowError, Result};
use crate::model::Model;
use crate::scope;
use crate::store::{Direction, NodeId, NodeKind, Value};

pub trait AsAny: Any {
    fn as_any(&self) -> &dyn Any;
    fn as_any_mut(&mut self) -> &mut dyn Any;
}

impl<T: Any> AsAny for T {
    fn as_any(&self) -> &dyn Any { self }
    fn as_any_mut(&mut self) -> &mut dyn Any { self }
}

/// Declaration of one variable a component owns.
#[derive(Debug, Clone, PartialEq)]
pub struct VarSpec {
    pub name: String,
    pub direction: Direction,
    pub default: Value,
}

impl VarSpec {
    pub fn input(name: &str, default: impl Into<Value>) -> Self {
        Self { name: name.to_string(), direction: Direction::Input, default: default.into() }
    }

    pub fn output(name: &str, default: impl Into<Value>) -> Self {
        Self { name: name.to_string(), direction: Direction::Output, default: default.into() }
    }
}

/// Behaviour attached to a node.
///
/// `execute` reads the node's inputs and writes its outputs through the
/// [`ExecContext`]; it has no other observable side effects. Drivers
/// additionally call [`ExecContext::run_workflow`].
pub trait Component: AsAny {
    fn variables(&self) -> Vec<VarSpec>;

    fn execute(&mut self, ctx: &mut ExecContext<'_>) -> Result<()>;

    fn kind(&self) -> NodeKind {
        NodeKind::Component
    }

    /// Named operation reachable from expressions as `node.method(args)`.
    fn invoke(&mut self, ctx: &mut ExecContext<'_>, method: &str, _args: &[Value]) -> Result<Value> {
        Err(ctx.fail(format!("has no method '{}'", method)))
    }

    /// Expression texts this node evaluates; used to derive driver workflows.
    fn expression_texts(&self) -> Vec<String> {
        Vec::new()
    }
}

impl fmt::Debug for dyn Component {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "Component({:?})", self.kind())
    }
}

/// Handle given to a component while it runs.
pub struct ExecContext<'a> {
    pub(crate) model: &'a mut Model,
    pub(crate) node: NodeId,
}

impl<'a> ExecContext<'a> {
    pub fn node(&self) -> NodeId {
        self.node
    }

    pub fn pathname(&self) -> String {
        self.model.registry().pathname(self.node)
    }

    pub fn model(&mut self) -> &mut Model {
        self.model
    }

    pub fn get(&self, name: &str) -> Result<Value> {
        let var = scope::resolve_var(self.model.registry(), self.node, name)?;
        Ok(self.model.registry().values[var.index()].clone())
    }

    pub fn get_f64(&self, name: &str) -> Result<f64> {
        let v = self.get(name)?;
        v.as_f64().ok_or_else(|| self.fail(format!("'{}' is not a number ({})", name, v)))
    }

    pub fn get_i64(&self, name: &str) -> Result<i64> {
        let v = self.get(name)?;
        v.as_i64().ok_or_else(|| self.fail(format!("'{}' is not an integer ({})", name, v)))
    }

    /// Stores an output value; validity is settled by the scheduler once `execute` returns.
    pub fn set_output(&mut self, name: &str, value: impl Into<Value>) -> Result<()> {
        let reg = self.model.registry();
        let var = reg.var(self.node, name).ok_or_else(|| FlowError::NameResolution {
            origin: reg.pathname(self.node).into(),
            name: name.to_string(),
        })?;
        if reg.directions[var.index()] != Direction::Output {
            return Err(self.fail(format!("'{}' is not an output", name)));
        }
        self.model.store_value(var, value.into())
    }

    /// Runs this driver's iteration set inside the parent scope.
    pub fn run_workflow(&mut self) -> Result<()> {
        self.model.run_workflow(self.node)
    }

    pub fn fail(&self, message: impl Into<String>) -> FlowError {
        FlowError::execution(self.pathname(), message)
    }
}

type ExecFn = Box<dyn FnMut(&mut ExecContext<'_>) -> Result<()>>;

/// A component assembled from variable declarations and a closure.
pub struct FnComponent {
    vars: Vec<VarSpec>,
    body: ExecFn,
}

impl FnComponent {
    pub fn new(vars: Vec<VarSpec>, body: impl FnMut(&mut ExecContext<'_>) -> Result<()> + 'static) -> Self {
        Self { vars, body: Box::new(body) }
    }
}

impl Component for FnComponent {
    fn variables(&self) -> Vec<VarSpec> {
        self.vars.clone()
    }

    fn execute(&mut self, ctx: &mut ExecContext<'_>) -> Result<()> {
        (self.body)(ctx)
    }
}
