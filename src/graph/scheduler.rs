//! Lazy, dependency-ordered execution.

use std::collections::HashSet;
use tracing::debug;

use super::topology::{order_units, Unit};
use crate::component::ExecContext;
use crate::error::{FlowError, Result};
use crate::expr::CompiledExpression;
use crate::model::Model;
use crate::scope;
use crate::store::{Direction, NodeId, NodeKind, VarId};

impl Model {
    /// Runs the root scope.
    pub fn run(&mut self) -> Result<()> {
        self.run_scope(self.root())
    }

    /// Executes the stale part of `scope`'s workflow, then pulls the scope's outputs valid.
    pub fn run_scope(&mut self, scope: NodeId) -> Result<()> {
        self.registry.check(scope)?;
        if self.registry.kinds[scope.index()] != NodeKind::Assembly {
            return self.run_node(scope);
        }
        let members = self.scope_members(scope)?;
        let order = self.order(scope, &members)?;
        debug!(scope = %self.registry.pathname(scope), ?order, "running scope");
        for node in order {
            self.run_unit(node)?;
        }
        for out in self.registry.outputs(scope).collect::<Vec<_>>() {
            self.ensure_valid(out)?;
        }
        Ok(())
    }

    /// Runs a driver's iteration set in the driver's parent scope.
    pub fn run_workflow(&mut self, driver: NodeId) -> Result<()> {
        let parent = scope::parent(&self.registry, driver)?.unwrap_or(driver);
        let members = self.iteration_set(driver)?;
        let order = self.order(parent, &members)?;
        for node in order {
            self.run_unit(node)?;
        }
        Ok(())
    }

    /// Direct run: pulls every invalid input from upstream, then always executes `node`.
    pub fn run_node(&mut self, node: NodeId) -> Result<()> {
        self.registry.check(node)?;
        match self.registry.kinds[node.index()] {
            NodeKind::Assembly => self.run_scope(node),
            _ => self.execute_node(node),
        }
    }

    fn run_unit(&mut self, node: NodeId) -> Result<()> {
        match self.registry.kinds[node.index()] {
            NodeKind::Assembly => self.run_scope(node),
            _ => {
                if self.needs_run(node, &mut HashSet::new())? {
                    self.execute_node(node)
                } else {
                    Ok(())
                }
            }
        }
    }

    fn needs_run(&mut self, node: NodeId, seen: &mut HashSet<NodeId>) -> Result<bool> {
        if !seen.insert(node) {
            return Ok(false);
        }
        let kind = self.registry.kinds[node.index()];
        // Assemblies never execute themselves, so only their outputs and children count.
        if kind != NodeKind::Assembly && self.graph.is_stale(node) {
            return Ok(true);
        }
        if self.registry.outputs(node).any(|v| !self.registry.valid[v.index()]) {
            return Ok(true);
        }
        let inner = match kind {
            NodeKind::Assembly => self.registry.children[node.index()].clone(),
            NodeKind::Driver => self.iteration_set(node)?,
            NodeKind::Component => Vec::new(),
        };
        for n in inner {
            if self.needs_run(n, seen)? {
                return Ok(true);
            }
        }
        Ok(false)
    }

    pub(crate) fn execute_node(&mut self, node: NodeId) -> Result<()> {
        if !self.in_progress.insert(node) {
            return Err(FlowError::CyclicDependency {
                origin: self.registry.pathname(node).into(),
                node: self.registry.pathname(node),
            });
        }
        let result = self.execute_inner(node);
        self.in_progress.remove(&node);
        result
    }

    fn execute_inner(&mut self, node: NodeId) -> Result<()> {
        for input in self.registry.inputs(node).collect::<Vec<_>>() {
            self.ensure_valid(input)?;
        }
        self.graph.invalidate_outputs(&mut self.registry, node);

        let Some(mut behaviour) = self.behaviours[node.index()].take() else {
            return Err(FlowError::execution(self.registry.pathname(node), "node has no behaviour"));
        };
        self.remember_expressions(node, behaviour.expression_texts());
        let result = {
            let mut ctx = ExecContext { model: self, node };
            behaviour.execute(&mut ctx)
        };
        self.behaviours[node.index()] = Some(behaviour);
        result?;

        self.graph.mark_executed(&mut self.registry, node);
        debug!(
            node = %self.registry.pathname(node),
            count = self.graph.execution_count(node),
            "executed"
        );
        Ok(())
    }

    /// Makes `var` valid, executing whatever upstream node produces it.
    pub(crate) fn ensure_valid(&mut self, var: VarId) -> Result<()> {
        if self.registry.valid[var.index()] {
            return Ok(());
        }
        if let Some(src) = self.graph.links.source(var) {
            self.ensure_valid(src)?;
            self.registry.values[var.index()] = self.registry.values[src.index()].clone();
            self.registry.valid[var.index()] = true;
            return Ok(());
        }
        let owner = self.registry.var_owner[var.index()];
        if self.registry.directions[var.index()] == Direction::Output
            && self.registry.kinds[owner.index()] != NodeKind::Assembly
        {
            return self.execute_node(owner);
        }
        self.registry.valid[var.index()] = true;
        Ok(())
    }

    // --- Workflow resolution ---

    /// Explicit workflow, or the children not already run by a child driver.
    fn scope_members(&mut self, scope: NodeId) -> Result<Vec<NodeId>> {
        if let Some(explicit) = self.workflows.get(&scope) {
            return Ok(explicit.clone());
        }
        let children = self.registry.children[scope.index()].clone();
        let mut covered = HashSet::new();
        for &c in &children {
            if self.registry.kinds[c.index()] == NodeKind::Driver {
                covered.extend(self.coverage(c)?);
            }
        }
        Ok(children.into_iter().filter(|c| !covered.contains(c)).collect())
    }

    /// A driver's explicit workflow, or the siblings its expressions reference.
    pub fn iteration_set(&mut self, driver: NodeId) -> Result<Vec<NodeId>> {
        if let Some(explicit) = self.workflows.get(&driver) {
            return Ok(explicit.clone());
        }
        Ok(self.expression_refs(driver)?.into_iter().filter(|n| *n != driver).collect())
    }

    /// Every sibling a driver runs, through nested drivers as well.
    fn coverage(&mut self, driver: NodeId) -> Result<Vec<NodeId>> {
        let mut out = Vec::new();
        let mut stack = vec![driver];
        let mut seen = HashSet::from([driver]);
        while let Some(d) = stack.pop() {
            for n in self.iteration_set(d)? {
                if seen.insert(n) {
                    out.push(n);
                    if self.registry.kinds[n.index()] == NodeKind::Driver {
                        stack.push(n);
                    }
                }
            }
        }
        Ok(out)
    }

    fn order(&mut self, scope: NodeId, members: &[NodeId]) -> Result<Vec<NodeId>> {
        let mut units = Vec::with_capacity(members.len());
        for &m in members {
            self.registry.check(m)?;
            if self.registry.kinds[m.index()] != NodeKind::Driver {
                units.push(Unit::plain(m));
                continue;
            }
            let covers = self.coverage(m)?;
            let after = if self.workflows.contains_key(&m) {
                self.expression_refs(m)?.into_iter().filter(|n| !covers.contains(n) && *n != m).collect()
            } else {
                Vec::new()
            };
            units.push(Unit { node: m, covers, after });
        }
        order_units(&self.registry, &self.graph.links, scope, &units)
    }

    fn remember_expressions(&mut self, node: NodeId, texts: Vec<String>) {
        let unchanged = matches!(self.expr_refs.get(&node), Some((known, _)) if *known == texts);
        if !unchanged {
            self.expr_refs.insert(node, (texts, None));
        }
    }

    /// Siblings referenced by a node's expressions, re-resolved only when its texts change.
    fn expression_refs(&mut self, node: NodeId) -> Result<Vec<NodeId>> {
        if let Some(texts) = self.behaviours[node.index()].as_deref().map(|b| b.expression_texts()) {
            self.remember_expressions(node, texts);
        }
        let texts = match self.expr_refs.get(&node) {
            Some((_, Some(refs))) => return Ok(refs.clone()),
            Some((texts, None)) => texts.clone(),
            None => return Ok(Vec::new()),
        };
        let mut refs = Vec::new();
        for text in texts.iter().filter(|t| !t.trim().is_empty()) {
            let mut expr = CompiledExpression::parse(text)?;
            expr.bind(&self.registry, node)?;
            for n in expr.referenced_nodes(&self.registry)? {
                if !refs.contains(&n) {
                    refs.push(n);
                }
            }
        }
        if let Some(entry) = self.expr_refs.get_mut(&node) {
            entry.1 = Some(refs.clone());
        }
        Ok(refs)
    }
}
