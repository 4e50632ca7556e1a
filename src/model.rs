//! The model: hierarchy, behaviours, connections and workflows in one place.

use std::collections::{HashMap, HashSet};
use tracing::debug;

use crate::component::{Component, ExecContext};
use crate::config::EngineConfig;
use crate::error::{FlowError, Result};
use crate::expr::{self, CompiledExpression};
use crate::graph::ValidityGraph;
use crate::scope;
use crate::store::{Direction, NodeId, NodeKind, Registry, Value, VarId};

pub struct Model {
    pub(crate) registry: Registry,
    pub(crate) behaviours: Vec<Option<Box<dyn Component>>>,
    pub(crate) graph: ValidityGraph,
    pub(crate) workflows: HashMap<NodeId, Vec<NodeId>>,
    /// Expression texts last seen per node, with the siblings they reference once resolved.
    pub(crate) expr_refs: HashMap<NodeId, (Vec<String>, Option<Vec<NodeId>>)>,
    pub(crate) in_progress: HashSet<NodeId>,
    config: EngineConfig,
}

impl Default for Model {
    fn default() -> Self {
        Self::new()
    }
}

impl Model {
    pub fn new() -> Self {
        Self::with_config(EngineConfig::default())
    }

    pub fn with_config(config: EngineConfig) -> Self {
        let registry = Registry::with_root("top");
        let mut graph = ValidityGraph::default();
        graph.register_node(registry.root());
        Self {
            registry,
            behaviours: vec![None],
            graph,
            workflows: HashMap::new(),
            expr_refs: HashMap::new(),
            in_progress: HashSet::new(),
            config,
        }
    }

    pub fn config(&self) -> &EngineConfig {
        &self.config
    }

    pub fn registry(&self) -> &Registry {
        &self.registry
    }

    pub fn root(&self) -> NodeId {
        self.registry.root()
    }

    // --- Building ---

    pub fn add(&mut self, scope: NodeId, name: &str, component: impl Component + 'static) -> Result<NodeId> {
        self.add_boxed(scope, name, Box::new(component))
    }

    pub fn add_boxed(&mut self, scope: NodeId, name: &str, component: Box<dyn Component>) -> Result<NodeId> {
        let kind = component.kind();
        if kind == NodeKind::Assembly {
            return Err(FlowError::structure(
                self.registry.pathname(scope),
                format!("'{}' declares itself an assembly; use add_assembly", name),
            ));
        }
        let node = self.registry.add_node(scope, name, kind)?;
        for spec in component.variables() {
            if let Err(err) = self.registry.add_var(node, &spec.name, spec.direction, spec.default) {
                self.registry.remove(node)?;
                return Err(err);
            }
        }
        self.attach(node, Some(component));
        debug!(node = %self.registry.pathname(node), ?kind, "added");
        Ok(node)
    }

    pub fn add_assembly(&mut self, scope: NodeId, name: &str) -> Result<NodeId> {
        let node = self.registry.add_node(scope, name, NodeKind::Assembly)?;
        self.attach(node, None);
        debug!(node = %self.registry.pathname(node), "added assembly");
        Ok(node)
    }

    fn attach(&mut self, node: NodeId, behaviour: Option<Box<dyn Component>>) {
        if self.behaviours.len() <= node.index() {
            self.behaviours.resize_with(node.index() + 1, || None);
        }
        self.behaviours[node.index()] = behaviour;
        self.graph.register_node(node);
        self.forget_resolved_refs();
    }

    /// Structure changed: expression references must be resolved again.
    fn forget_resolved_refs(&mut self) {
        for (_, refs) in self.expr_refs.values_mut() {
            *refs = None;
        }
    }

    /// Detaches `node` and its subtree. Inputs it used to drive keep their last value.
    pub fn remove(&mut self, node: NodeId) -> Result<()> {
        let path = self.registry.pathname(node);
        let (nodes, vars) = self.registry.remove(node)?;

        let mut orphaned = Vec::new();
        for &v in &vars {
            orphaned.extend(self.graph.links.targets(v).iter().copied());
            self.graph.links.remove_var(v);
        }
        for dst in orphaned {
            if self.registry.is_var_alive(dst) {
                self.registry.valid[dst.index()] = true;
                self.graph.invalidate_downstream(&mut self.registry, dst);
            }
        }

        let gone: HashSet<NodeId> = nodes.iter().copied().collect();
        self.workflows.retain(|owner, _| !gone.contains(owner));
        for members in self.workflows.values_mut() {
            members.retain(|m| !gone.contains(m));
        }
        for n in &nodes {
            self.behaviours[n.index()] = None;
            self.expr_refs.remove(n);
        }
        self.forget_resolved_refs();
        debug!(node = %path, removed = nodes.len(), "removed");
        Ok(())
    }

    // --- Lookup ---

    pub fn find(&self, path: &str) -> Result<NodeId> {
        scope::resolve_node(&self.registry, self.root(), path)
    }

    pub fn child(&self, scope: NodeId, name: &str) -> Option<NodeId> {
        self.registry.child(scope, name)
    }

    pub fn pathname(&self, node: NodeId) -> Result<String> {
        scope::pathname(&self.registry, node)
    }

    pub fn var(&self, scope: NodeId, path: &str) -> Result<VarId> {
        scope::resolve_var(&self.registry, scope, path)
    }

    pub fn get(&self, scope: NodeId, path: &str) -> Result<Value> {
        let var = self.var(scope, path)?;
        Ok(self.registry.values[var.index()].clone())
    }

    pub fn value(&self, var: VarId) -> Result<Value> {
        if !self.registry.is_var_alive(var) {
            return Err(FlowError::detached(self.registry.var_pathname(var)));
        }
        Ok(self.registry.values[var.index()].clone())
    }

    pub fn is_valid(&self, scope: NodeId, path: &str) -> Result<bool> {
        let var = self.var(scope, path)?;
        Ok(self.registry.valid[var.index()])
    }

    pub fn set(&mut self, scope: NodeId, path: &str, value: impl Into<Value>) -> Result<()> {
        let var = self.var(scope, path)?;
        self.assign(var, value.into())
    }

    /// External write into a variable.
    ///
    /// Connected inputs and component outputs are rejected. An accepted write
    /// leaves the variable valid and invalidates every transitive consumer.
    pub fn assign(&mut self, var: VarId, value: Value) -> Result<()> {
        if !self.registry.is_var_alive(var) {
            return Err(FlowError::detached(self.registry.var_pathname(var)));
        }
        let owner = self.registry.var_owner[var.index()];
        let name = self.registry.var_names[var.index()].clone();

        if let Some(src) = self.graph.links.source(var) {
            let viewpoint = scope::parent(&self.registry, owner).ok().flatten().unwrap_or(owner);
            return Err(FlowError::connection(
                self.registry.pathname(owner),
                format!(
                    "'{}' is already connected to source '{}' and cannot be directly set",
                    name,
                    scope::relative_path(&self.registry, viewpoint, src)
                ),
            ));
        }
        if self.registry.directions[var.index()] == Direction::Output
            && self.registry.kinds[owner.index()] != NodeKind::Assembly
        {
            return Err(FlowError::connection(
                self.registry.pathname(owner),
                format!("'{}' is an output and cannot be set from outside its node", name),
            ));
        }

        self.store_value(var, value)?;
        self.registry.valid[var.index()] = true;
        self.graph.invalidate_downstream(&mut self.registry, var);
        Ok(())
    }

    /// Writes a value after conforming it to the variable's type. Validity is untouched.
    pub(crate) fn store_value(&mut self, var: VarId, value: Value) -> Result<()> {
        let current = &self.registry.values[var.index()];
        let value = value
            .conform_to(current)
            .map_err(|m| FlowError::type_error(self.registry.var_pathname(var), m))?;
        self.registry.values[var.index()] = value;
        Ok(())
    }

    // --- Wiring ---

    /// Connects `src` to `dst`, both relative to `scope`.
    ///
    /// The source is a child's output or an input of `scope`; the destination
    /// a child's input or an output of `scope`.
    pub fn connect(&mut self, scope: NodeId, src: &str, dst: &str) -> Result<()> {
        self.registry.check(scope)?;
        let src_var = self.var(scope, src)?;
        let dst_var = self.var(scope, dst)?;
        self.connect_vars(scope, src_var, dst_var)
    }

    fn endpoint_ok(&self, scope: NodeId, var: VarId, child_dir: Direction) -> bool {
        let owner = self.registry.var_owner[var.index()];
        let dir = self.registry.directions[var.index()];
        if owner == scope {
            dir != child_dir
        } else {
            dir == child_dir && scope::parent(&self.registry, owner).ok().flatten() == Some(scope)
        }
    }

    fn connect_vars(&mut self, scope: NodeId, src: VarId, dst: VarId) -> Result<()> {
        let origin = self.registry.pathname(scope);
        let rel = |var: VarId| scope::relative_path(&self.registry, scope, var);

        if !self.endpoint_ok(scope, src, Direction::Output) {
            return Err(FlowError::connection(
                origin,
                format!("'{}' must be an output of a child or an input of this scope", rel(src)),
            ));
        }
        if !self.endpoint_ok(scope, dst, Direction::Input) {
            return Err(FlowError::connection(
                origin,
                format!("'{}' must be an input of a child or an output of this scope", rel(dst)),
            ));
        }
        if self.registry.var_owner[src.index()] == self.registry.var_owner[dst.index()] {
            return Err(FlowError::connection(
                origin,
                format!("cannot connect '{}' to '{}' on the same node", rel(src), rel(dst)),
            ));
        }
        if let Err(existing) = self.graph.links.insert(src, dst) {
            return Err(FlowError::connection(
                origin,
                format!("'{}' is already connected to source '{}'", rel(dst), rel(existing)),
            ));
        }
        debug!(scope = %origin, src = %rel(src), dst = %rel(dst), "connected");

        self.registry.valid[dst.index()] = false;
        self.graph.invalidate_downstream(&mut self.registry, dst);
        Ok(())
    }

    /// Removes the connection driving `dst`. The input keeps its last value.
    pub fn disconnect(&mut self, scope: NodeId, dst: &str) -> Result<()> {
        let var = self.var(scope, dst)?;
        if self.graph.links.remove(var).is_none() {
            return Err(FlowError::connection(
                self.registry.pathname(scope),
                format!("'{}' is not connected", dst),
            ));
        }
        self.registry.valid[var.index()] = true;
        self.graph.invalidate_downstream(&mut self.registry, var);
        Ok(())
    }

    /// Exposes `child.var` on `scope` as `alias`, wired in the variable's direction.
    pub fn create_passthrough(&mut self, scope: NodeId, path: &str, alias: &str) -> Result<VarId> {
        let inner = self.var(scope, path)?;
        let owner = self.registry.var_owner[inner.index()];
        if scope::parent(&self.registry, owner)? != Some(scope) {
            return Err(FlowError::structure(
                self.registry.pathname(scope),
                format!("'{}' is not a variable of a direct child", path),
            ));
        }
        let direction = self.registry.directions[inner.index()];
        let value = self.registry.values[inner.index()].clone();
        let outer = self.registry.add_var(scope, alias, direction, value)?;
        let wired = match direction {
            Direction::Input => self.connect_vars(scope, outer, inner),
            Direction::Output => self.connect_vars(scope, inner, outer),
        };
        if let Err(err) = wired {
            self.registry.var_alive[outer.index()] = false;
            self.registry.node_vars[scope.index()].retain(|v| *v != outer);
            return Err(err);
        }
        Ok(outer)
    }

    /// Appends members to the workflow of an assembly (children) or a driver (siblings).
    pub fn workflow_add(&mut self, owner: NodeId, nodes: &[NodeId]) -> Result<()> {
        self.registry.check(owner)?;
        let kind = self.registry.kinds[owner.index()];
        let expected_parent = match kind {
            NodeKind::Assembly => Some(owner),
            NodeKind::Driver => scope::parent(&self.registry, owner)?,
            NodeKind::Component => {
                return Err(FlowError::structure(self.registry.pathname(owner), "a plain component has no workflow"))
            }
        };
        for &n in nodes {
            self.registry.check(n)?;
            if n == owner || scope::parent(&self.registry, n)? != expected_parent {
                return Err(FlowError::structure(
                    self.registry.pathname(owner),
                    format!("'{}' cannot be part of this workflow", self.registry.pathname(n)),
                ));
            }
        }
        let members = self.workflows.entry(owner).or_default();
        for &n in nodes {
            if !members.contains(&n) {
                members.push(n);
            }
        }
        if kind == NodeKind::Driver {
            self.graph.mark_stale(owner);
        }
        Ok(())
    }

    pub fn workflow(&self, owner: NodeId) -> Option<&[NodeId]> {
        self.workflows.get(&owner).map(|w| w.as_slice())
    }

    // --- Behaviour access ---

    pub fn execution_count(&self, node: NodeId) -> u64 {
        self.graph.execution_count(node)
    }

    pub fn is_stale(&self, node: NodeId) -> bool {
        self.graph.is_stale(node)
    }

    pub fn component<T: Component + 'static>(&self, node: NodeId) -> Option<&T> {
        let c: &dyn Component = self.behaviours.get(node.index())?.as_deref()?;
        c.as_any().downcast_ref::<T>()
    }

    pub fn component_mut<T: Component + 'static>(&mut self, node: NodeId) -> Option<&mut T> {
        let c: &mut dyn Component = self.behaviours.get_mut(node.index())?.as_deref_mut()?;
        c.as_any_mut().downcast_mut::<T>()
    }

    /// Mutates a node's behaviour and marks the node stale, so the next run re-executes it.
    ///
    /// Syntax errors from expression text set inside `f` carry the node's pathname.
    pub fn configure<T: Component + 'static, R>(
        &mut self,
        node: NodeId,
        f: impl FnOnce(&mut T) -> Result<R>,
    ) -> Result<R> {
        self.registry.check(node)?;
        let Some(behaviour) = self.component_mut::<T>(node) else {
            return Err(FlowError::structure(self.registry.pathname(node), "behaviour has a different type"));
        };
        let out = f(behaviour).map_err(|e| expr::with_origin(e, &self.registry, node))?;
        self.graph.mark_stale(node);
        Ok(out)
    }

    pub fn invoke(&mut self, node: NodeId, method: &str, args: &[Value]) -> Result<Value> {
        self.registry.check(node)?;
        let Some(mut behaviour) = self.behaviours.get_mut(node.index()).and_then(Option::take) else {
            return Err(FlowError::execution(
                self.registry.pathname(node),
                format!("cannot invoke '{}': node has no behaviour or is busy", method),
            ));
        };
        let result = {
            let mut ctx = ExecContext { model: self, node };
            behaviour.invoke(&mut ctx, method, args)
        };
        self.behaviours[node.index()] = Some(behaviour);
        result
    }

    // --- Expressions ---

    pub fn compile(&self, text: &str, scope: NodeId) -> Result<CompiledExpression> {
        CompiledExpression::new(self, text, scope)
    }

    /// One-shot evaluation of `text` in `scope`.
    pub fn evaluate(&mut self, text: &str, scope: NodeId) -> Result<Value> {
        let mut expr = CompiledExpression::new(self, text, scope)?;
        expr.evaluate(self, None)
    }
}
