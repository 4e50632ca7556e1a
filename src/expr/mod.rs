//! Dotted-path expressions: grammar, scope binding and evaluation.

pub mod ast;
pub mod compile;
pub mod eval;
pub mod parser;

use crate::error::{FlowError, Origin, Result};
use crate::model::Model;
use crate::store::{NodeId, Registry, Value};
use ast::Statement;
use compile::{Program, WriteOp};

/// Expression text paired with its parse tree and a lazily bound program.
///
/// The grammar runs only when the text is assigned. Binding against a scope
/// happens once and is reused by every later [`evaluate`](Self::evaluate).
#[derive(Debug, Clone)]
pub struct CompiledExpression {
    text: String,
    statement: Statement,
    scope: Option<NodeId>,
    program: Option<Program>,
    write: Option<WriteOp>,
    compile_count: usize,
}

impl CompiledExpression {
    /// Parses `text` without binding it to any scope.
    pub fn parse(text: &str) -> Result<Self> {
        Ok(Self {
            text: text.to_string(),
            statement: parser::parse(text)?,
            scope: None,
            program: None,
            write: None,
            compile_count: 0,
        })
    }

    /// Parses and eagerly binds, so resolution failures surface here.
    pub fn new(model: &Model, text: &str, scope: NodeId) -> Result<Self> {
        let mut expr = Self::parse(text).map_err(|e| with_origin(e, model.registry(), scope))?;
        expr.bind(model.registry(), scope)?;
        Ok(expr)
    }

    pub fn text(&self) -> &str {
        &self.text
    }

    pub fn scope(&self) -> Option<NodeId> {
        self.scope
    }

    /// How many times a program or write target has been bound for this expression.
    pub fn compile_count(&self) -> usize {
        self.compile_count
    }

    pub fn is_assignment(&self) -> bool {
        self.statement.target.is_some()
    }

    /// Replaces the text. Identical text keeps the cached program.
    pub fn set_text(&mut self, text: &str) -> Result<()> {
        if text == self.text {
            return Ok(());
        }
        self.statement = parser::parse(text)?;
        self.text = text.to_string();
        self.program = None;
        self.write = None;
        Ok(())
    }

    pub fn bind(&mut self, reg: &Registry, scope: NodeId) -> Result<()> {
        let program = compile::compile(reg, scope, &self.statement)?;
        self.scope = Some(scope);
        self.program = Some(program);
        self.write = None;
        self.compile_count += 1;
        Ok(())
    }

    /// Origin is the bound scope's pathname, even once that scope is detached.
    fn scope_required(&self, reg: &Registry) -> FlowError {
        let origin = self.scope.map_or_else(Origin::root, |s| reg.pathname(s).into());
        FlowError::ScopeRequired { origin, text: self.text.clone() }
    }

    /// Evaluates against the bound scope, or against `scope` when it differs.
    ///
    /// A bound program that refers to removed variables or nodes is rebound
    /// against the same scope, so a sibling that was removed and re-added under
    /// its old name is picked up again.
    pub fn evaluate(&mut self, model: &mut Model, scope: Option<NodeId>) -> Result<Value> {
        if let Some(other) = scope.filter(|s| Some(*s) != self.scope) {
            let program = compile::compile(model.registry(), other, &self.statement)?;
            return eval::run(model, &program);
        }
        let bound = self.bound_scope(model.registry())?;
        let stale = self.program.as_ref().map_or(true, |p| !p.is_current(model.registry()));
        if stale {
            self.bind(model.registry(), bound)?;
        }
        match &self.program {
            Some(program) => eval::run(model, program),
            None => Err(self.scope_required(model.registry())),
        }
    }

    /// Writes `value` through an expression that is a bare reference such as `comp.x` or `a[2]`.
    ///
    /// The write target is bound once per scope binding and reused.
    pub fn set(&mut self, model: &mut Model, value: Value, scope: Option<NodeId>) -> Result<()> {
        if self.statement.target.is_some() {
            let origin = scope.or(self.scope).map(|s| model.registry().pathname(s)).unwrap_or_default();
            return Err(FlowError::structure(origin, format!("cannot set through assignment '{}'", self.text)));
        }
        if let Some(other) = scope.filter(|s| Some(*s) != self.scope) {
            model.registry().check(other)?;
            let write = compile::compile_target(model.registry(), other, &self.statement.value)?;
            return eval::store(model, other, &write, value);
        }
        let bound = self.bound_scope(model.registry())?;
        let stale = self.write.as_ref().map_or(true, |w| !w.is_current(model.registry()));
        if stale {
            self.write = Some(compile::compile_target(model.registry(), bound, &self.statement.value)?);
            self.compile_count += 1;
        }
        match &self.write {
            Some(write) => eval::store(model, bound, write, value),
            None => Err(self.scope_required(model.registry())),
        }
    }

    fn bound_scope(&self, reg: &Registry) -> Result<NodeId> {
        match self.scope {
            Some(scope) if reg.is_alive(scope) => Ok(scope),
            _ => Err(self.scope_required(reg)),
        }
    }

    /// Nodes named by the first segment of every bound reference, in order of appearance.
    pub fn referenced_nodes(&self, reg: &Registry) -> Result<Vec<NodeId>> {
        let fresh;
        let program = match (&self.program, self.scope) {
            (Some(p), _) => p,
            (None, Some(scope)) => {
                fresh = compile::compile(reg, scope, &self.statement)?;
                &fresh
            }
            (None, None) => return Err(self.scope_required(reg)),
        };
        let mut nodes = Vec::new();
        for (base, first) in &program.refs {
            if let Some(child) = reg.child(*base, first) {
                if !nodes.contains(&child) {
                    nodes.push(child);
                }
            }
        }
        Ok(nodes)
    }
}

/// Gives a syntax error the pathname of the scope it was compiled for.
pub(crate) fn with_origin(err: FlowError, reg: &Registry, scope: NodeId) -> FlowError {
    match err {
        FlowError::ExpressionSyntax { text, offset, message, .. } => {
            FlowError::ExpressionSyntax { origin: reg.pathname(scope).into(), text, offset, message }
        }
        other => other,
    }
}
