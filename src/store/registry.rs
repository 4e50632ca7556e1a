use super::types::*;
use crate::error::{FlowError, Result};

/// Columnar arena holding every node and variable of a model.
///
/// Slots are append-only. Removing a node tombstones it (and its subtree) so a
/// stale handle fails loudly instead of aliasing a newer entry.
#[derive(Debug, Clone, Default)]
pub struct Registry {
    // Node columns
    pub names: Vec<String>,
    pub kinds: Vec<NodeKind>,
    pub parents: Vec<ParentLink>,
    pub children: Vec<Vec<NodeId>>,
    pub node_vars: Vec<Vec<VarId>>,
    pub alive: Vec<bool>,

    // Variable columns
    pub var_names: Vec<String>,
    pub var_owner: Vec<NodeId>,
    pub directions: Vec<Direction>,
    pub values: Vec<Value>,
    pub valid: Vec<bool>,
    pub var_alive: Vec<bool>,
}

pub(crate) fn is_identifier(name: &str) -> bool {
    let mut chars = name.chars();
    match chars.next() {
        Some(c) if c.is_ascii_alphabetic() || c == '_' => {}
        _ => return false,
    }
    chars.all(|c| c.is_ascii_alphanumeric() || c == '_')
}

impl Registry {
    /// Creates an arena containing only the root scope.
    pub fn with_root(name: &str) -> Self {
        let mut reg = Self::default();
        reg.push_node(name.to_string(), NodeKind::Assembly, ParentLink::Root);
        reg
    }

    pub fn root(&self) -> NodeId { NodeId(0) }
    pub fn node_count(&self) -> usize { self.kinds.len() }
    pub fn var_count(&self) -> usize { self.var_names.len() }

    #[inline(always)]
    pub fn is_alive(&self, node: NodeId) -> bool {
        self.alive.get(node.index()).copied().unwrap_or(false)
    }

    #[inline(always)]
    pub fn is_var_alive(&self, var: VarId) -> bool {
        self.var_alive.get(var.index()).copied().unwrap_or(false)
    }

    /// Fails with `DetachedScope` when `node` has been removed.
    pub fn check(&self, node: NodeId) -> Result<()> {
        if self.is_alive(node) {
            Ok(())
        } else {
            Err(FlowError::detached(self.pathname(node)))
        }
    }

    /// Best-effort dotted path; also works for tombstoned slots (used for error origins).
    pub fn pathname(&self, node: NodeId) -> String {
        let mut parts = Vec::new();
        let mut cursor = Some(node);
        while let Some(id) = cursor {
            let Some(link) = self.parents.get(id.index()) else { break };
            match *link {
                ParentLink::Root => break,
                ParentLink::Attached(parent) => {
                    parts.push(self.names[id.index()].as_str());
                    cursor = Some(parent);
                }
                ParentLink::Detached => {
                    parts.push(self.names[id.index()].as_str());
                    cursor = None;
                }
            }
        }
        parts.reverse();
        parts.join(".")
    }

    pub fn var_pathname(&self, var: VarId) -> String {
        let owner = self.pathname(self.var_owner[var.index()]);
        let name = &self.var_names[var.index()];
        if owner.is_empty() { name.clone() } else { format!("{}.{}", owner, name) }
    }

    pub fn has_child(&self, node: NodeId, name: &str) -> bool {
        self.child(node, name).is_some()
    }

    pub fn has_local(&self, node: NodeId, name: &str) -> bool {
        self.var(node, name).is_some()
    }

    pub fn child(&self, node: NodeId, name: &str) -> Option<NodeId> {
        self.children
            .get(node.index())?
            .iter()
            .copied()
            .find(|c| self.names[c.index()] == name)
    }

    pub fn var(&self, node: NodeId, name: &str) -> Option<VarId> {
        self.node_vars
            .get(node.index())?
            .iter()
            .copied()
            .find(|v| self.var_names[v.index()] == name)
    }

    pub fn outputs(&self, node: NodeId) -> impl Iterator<Item = VarId> + '_ {
        self.node_vars[node.index()]
            .iter()
            .copied()
            .filter(|v| self.directions[v.index()] == Direction::Output)
    }

    pub fn inputs(&self, node: NodeId) -> impl Iterator<Item = VarId> + '_ {
        self.node_vars[node.index()]
            .iter()
            .copied()
            .filter(|v| self.directions[v.index()] == Direction::Input)
    }

    fn claim_name(&self, node: NodeId, name: &str) -> Result<()> {
        if !is_identifier(name) {
            return Err(FlowError::structure(
                self.pathname(node),
                format!("'{}' is not a valid identifier", name),
            ));
        }
        if self.has_child(node, name) || self.has_local(node, name) {
            return Err(FlowError::structure(
                self.pathname(node),
                format!("name '{}' is already in use", name),
            ));
        }
        Ok(())
    }

    fn push_node(&mut self, name: String, kind: NodeKind, link: ParentLink) -> NodeId {
        let id = NodeId::new(self.kinds.len());
        self.names.push(name);
        self.kinds.push(kind);
        self.parents.push(link);
        self.children.push(Vec::new());
        self.node_vars.push(Vec::new());
        self.alive.push(true);
        id
    }

    pub fn add_node(&mut self, parent: NodeId, name: &str, kind: NodeKind) -> Result<NodeId> {
        self.check(parent)?;
        if self.kinds[parent.index()] != NodeKind::Assembly {
            return Err(FlowError::structure(
                self.pathname(parent),
                format!("cannot add '{}': only assemblies own child nodes", name),
            ));
        }
        self.claim_name(parent, name)?;
        let id = self.push_node(name.to_string(), kind, ParentLink::Attached(parent));
        self.children[parent.index()].push(id);
        Ok(id)
    }

    pub fn add_var(&mut self, owner: NodeId, name: &str, direction: Direction, value: Value) -> Result<VarId> {
        self.check(owner)?;
        self.claim_name(owner, name)?;
        let id = VarId::new(self.var_names.len());
        self.var_names.push(name.to_string());
        self.var_owner.push(owner);
        self.directions.push(direction);
        self.values.push(value);
        // Fresh outputs have not been computed yet; fresh inputs hold their default.
        self.valid.push(direction == Direction::Input);
        self.var_alive.push(true);
        self.node_vars[owner.index()].push(id);
        Ok(id)
    }

    /// Detaches `node` from its parent and tombstones its whole subtree.
    /// Returns the removed nodes and variables.
    pub fn remove(&mut self, node: NodeId) -> Result<(Vec<NodeId>, Vec<VarId>)> {
        self.check(node)?;
        let parent = match self.parents[node.index()] {
            ParentLink::Attached(p) => p,
            _ => {
                return Err(FlowError::structure(self.pathname(node), "the root scope cannot be removed"))
            }
        };
        self.children[parent.index()].retain(|c| *c != node);
        self.parents[node.index()] = ParentLink::Detached;

        let mut nodes = Vec::new();
        let mut vars = Vec::new();
        let mut stack = vec![node];
        while let Some(id) = stack.pop() {
            self.alive[id.index()] = false;
            for &v in &self.node_vars[id.index()] {
                self.var_alive[v.index()] = false;
                vars.push(v);
            }
            stack.extend(self.children[id.index()].iter().copied());
            nodes.push(id);
        }
        Ok((nodes, vars))
    }
}
