use super::connections::Connections;
use crate::store::{Direction, NodeId, NodeKind, Registry, VarId};

/// Per-node staleness and execution counters layered over the per-variable
/// `valid` column of the [`Registry`].
#[derive(Debug, Clone, Default)]
pub struct ValidityGraph {
    pub links: Connections,
    stale: Vec<bool>,
    runs: Vec<u64>,
}

impl ValidityGraph {
    /// Grows the node columns; new nodes start stale (never executed).
    pub fn register_node(&mut self, node: NodeId) {
        let needed = node.index() + 1;
        if self.stale.len() < needed {
            self.stale.resize(needed, true);
            self.runs.resize(needed, 0);
        }
    }

    pub fn is_stale(&self, node: NodeId) -> bool {
        self.stale.get(node.index()).copied().unwrap_or(true)
    }

    pub fn execution_count(&self, node: NodeId) -> u64 {
        self.runs.get(node.index()).copied().unwrap_or(0)
    }

    pub fn mark_stale(&mut self, node: NodeId) {
        if let Some(flag) = self.stale.get_mut(node.index()) {
            *flag = true;
        }
    }

    /// Forward invalidation from `start`, whose own flag the caller has already set.
    ///
    /// Walks connection edges, and from a component or driver input into every
    /// output of its owner. Stops at variables that are already invalid.
    pub fn invalidate_downstream(&mut self, reg: &mut Registry, start: VarId) {
        let mut stack = vec![start];
        while let Some(var) = stack.pop() {
            for &dst in self.links.targets(var) {
                if reg.valid[dst.index()] {
                    reg.valid[dst.index()] = false;
                    stack.push(dst);
                }
            }

            let owner = reg.var_owner[var.index()];
            if reg.directions[var.index()] == Direction::Input && reg.kinds[owner.index()] != NodeKind::Assembly {
                self.mark_stale(owner);
                for out in reg.outputs(owner).collect::<Vec<_>>() {
                    if reg.valid[out.index()] {
                        reg.valid[out.index()] = false;
                        stack.push(out);
                    }
                }
            }
        }
    }

    /// Invalidates a node's outputs ahead of an execution.
    pub fn invalidate_outputs(&mut self, reg: &mut Registry, node: NodeId) {
        for out in reg.outputs(node).collect::<Vec<_>>() {
            if reg.valid[out.index()] {
                reg.valid[out.index()] = false;
                self.invalidate_downstream(reg, out);
            }
        }
    }

    /// Marks a successful execution and pushes fresh outputs to every mirror.
    pub fn mark_executed(&mut self, reg: &mut Registry, node: NodeId) {
        self.register_node(node);
        self.stale[node.index()] = false;
        self.runs[node.index()] += 1;
        for out in reg.outputs(node).collect::<Vec<_>>() {
            reg.valid[out.index()] = true;
            self.push_from(reg, out);
        }
    }

    /// Copies value and validity of `src` along outgoing edges, transitively.
    pub fn push_from(&self, reg: &mut Registry, src: VarId) {
        let mut stack = vec![src];
        while let Some(var) = stack.pop() {
            for &dst in self.links.targets(var) {
                reg.values[dst.index()] = reg.values[var.index()].clone();
                reg.valid[dst.index()] = reg.valid[var.index()];
                stack.push(dst);
            }
        }
    }
}
