//! Hierarchical naming: pathnames, parent links and dotted-path resolution.
//!
//! All functions are read-only views over the [`Registry`]; the hierarchy
//! itself is mutated through [`crate::model::Model`].

use crate::error::{FlowError, Result};
use crate::store::{NodeId, ParentLink, Registry, VarId};

/// What a dotted path points at.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Resolved {
    Variable(VarId),
    Node(NodeId),
}

/// Root-to-node dotted chain, excluding the root's own name.
pub fn pathname(reg: &Registry, node: NodeId) -> Result<String> {
    reg.check(node)?;
    Ok(reg.pathname(node))
}

/// Follows the non-owning back-link. `Ok(None)` for the root.
pub fn parent(reg: &Registry, node: NodeId) -> Result<Option<NodeId>> {
    match reg.parents.get(node.index()) {
        Some(ParentLink::Root) => Ok(None),
        Some(ParentLink::Attached(p)) if reg.is_alive(*p) => Ok(Some(*p)),
        _ => Err(FlowError::detached(reg.pathname(node))),
    }
}

/// True iff `name` is a variable or a child of `scope` itself. No parent fallback.
pub fn contains(reg: &Registry, scope: NodeId, name: &str) -> bool {
    reg.is_alive(scope) && (reg.has_local(scope, name) || reg.has_child(scope, name))
}

/// Walks `path` segment by segment starting inside `scope`.
pub fn resolve(reg: &Registry, scope: NodeId, path: &str) -> Result<Resolved> {
    reg.check(scope)?;
    let mut current = Resolved::Node(scope);
    for segment in path.split('.') {
        let node = match current {
            Resolved::Node(n) => n,
            // Variables have no members.
            Resolved::Variable(_) => return Err(unresolved(reg, scope, path)),
        };
        current = if let Some(v) = reg.var(node, segment) {
            Resolved::Variable(v)
        } else if let Some(c) = reg.child(node, segment) {
            Resolved::Node(c)
        } else {
            return Err(unresolved(reg, scope, path));
        };
    }
    Ok(current)
}

pub fn resolve_var(reg: &Registry, scope: NodeId, path: &str) -> Result<VarId> {
    match resolve(reg, scope, path)? {
        Resolved::Variable(v) => Ok(v),
        Resolved::Node(_) => Err(FlowError::structure(
            reg.pathname(scope),
            format!("'{}' is a node, not a variable", path),
        )),
    }
}

pub fn resolve_node(reg: &Registry, scope: NodeId, path: &str) -> Result<NodeId> {
    match resolve(reg, scope, path)? {
        Resolved::Node(n) => Ok(n),
        Resolved::Variable(_) => Err(FlowError::structure(
            reg.pathname(scope),
            format!("'{}' is a variable, not a node", path),
        )),
    }
}

fn unresolved(reg: &Registry, scope: NodeId, path: &str) -> FlowError {
    FlowError::NameResolution { origin: reg.pathname(scope).into(), name: path.to_string() }
}

/// The ancestor of `node` (possibly `node` itself) whose parent is `scope`.
/// `None` when `node` is `scope` or lies outside it.
pub fn sibling_in(reg: &Registry, scope: NodeId, node: NodeId) -> Option<NodeId> {
    let mut cursor = node;
    loop {
        match reg.parents.get(cursor.index())? {
            ParentLink::Attached(p) if *p == scope => return Some(cursor),
            ParentLink::Attached(p) => cursor = *p,
            _ => return None,
        }
    }
}

/// Pathname of `var` as seen from inside `scope`.
pub fn relative_path(reg: &Registry, scope: NodeId, var: VarId) -> String {
    let full = reg.var_pathname(var);
    let prefix = reg.pathname(scope);
    if prefix.is_empty() {
        return full;
    }
    full.strip_prefix(&prefix)
        .and_then(|rest| rest.strip_prefix('.'))
        .map(str::to_string)
        .unwrap_or(full)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::store::{Direction, NodeKind, Value};

    fn tree() -> (Registry, NodeId, NodeId) {
        let mut reg = Registry::with_root("top");
        let sub = reg.add_node(reg.root(), "sub", NodeKind::Assembly).unwrap();
        let comp = reg.add_node(sub, "comp", NodeKind::Component).unwrap();
        reg.add_var(comp, "x", Direction::Input, Value::Int(0)).unwrap();
        reg.add_var(sub, "y", Direction::Output, Value::Int(0)).unwrap();
        (reg, sub, comp)
    }

    #[test]
    fn test_resolve_walks_segments() {
        let (reg, sub, comp) = tree();
        assert_eq!(resolve(&reg, reg.root(), "sub.comp").unwrap(), Resolved::Node(comp));
        let x = resolve_var(&reg, reg.root(), "sub.comp.x").unwrap();
        assert_eq!(reg.var_pathname(x), "sub.comp.x");
        assert!(matches!(resolve(&reg, sub, "y"), Ok(Resolved::Variable(_))));
    }

    #[test]
    fn test_resolve_reports_missing_segment() {
        let (reg, _, _) = tree();
        let err = resolve(&reg, reg.root(), "sub.nope.x").unwrap_err();
        assert!(matches!(err, FlowError::NameResolution { ref name, .. } if name == "sub.nope.x"));
        assert!(resolve(&reg, reg.root(), "sub.y.z").is_err());
    }

    #[test]
    fn test_contains_is_local_only() {
        let (reg, sub, comp) = tree();
        assert!(contains(&reg, sub, "comp"));
        assert!(contains(&reg, sub, "y"));
        assert!(!contains(&reg, comp, "y"));
        assert!(!contains(&reg, reg.root(), "comp"));
    }

    #[test]
    fn test_parent_of_removed_scope_is_detached() {
        let (mut reg, sub, comp) = tree();
        assert_eq!(parent(&reg, comp).unwrap(), Some(sub));
        assert_eq!(parent(&reg, reg.root()).unwrap(), None);
        reg.remove(sub).unwrap();
        assert!(matches!(parent(&reg, comp), Err(FlowError::DetachedScope { .. })));
        assert!(matches!(pathname(&reg, comp), Err(FlowError::DetachedScope { .. })));
    }

    #[test]
    fn test_sibling_and_relative_path() {
        let (reg, sub, comp) = tree();
        assert_eq!(sibling_in(&reg, reg.root(), comp), Some(sub));
        assert_eq!(sibling_in(&reg, sub, comp), Some(comp));
        assert_eq!(sibling_in(&reg, comp, comp), None);
        let x = resolve_var(&reg, sub, "comp.x").unwrap();
        assert_eq!(relative_path(&reg, sub, x), "comp.x");
        assert_eq!(relative_path(&reg, reg.root(), x), "sub.comp.x");
    }
}
