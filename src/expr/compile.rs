//! Binds a parsed statement to a scope, producing an op tree.
//!
//! Each dotted name is bound with one rule: if its first segment is contained
//! in the evaluation scope it resolves there, otherwise it must be contained in
//! the immediate parent. Nothing beyond the parent is ever searched.

use tracing::trace;

use super::ast::{BinaryOp, Expr, Statement, Suffix, Target};
use crate::error::{FlowError, Result};
use crate::scope::{self, Resolved};
use crate::store::{NodeId, Registry, Value, VarId};

/// Which scope a name was bound against.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Base {
    Local,
    Parent,
}

/// A bound reference to a variable.
#[derive(Debug, Clone)]
pub struct Accessor {
    pub base: Base,
    pub path: String,
    pub var: VarId,
}

#[derive(Debug, Clone)]
pub enum Op {
    Const(Value),
    Read(Accessor),
    Index { var: Accessor, at: Vec<Op> },
    Invoke { base: Base, path: String, node: NodeId, method: String, args: Vec<Op> },
    Neg(Box<Op>),
    Binary { op: BinaryOp, lhs: Box<Op>, rhs: Box<Op> },
}

/// Write half of an assignment: target variable and (possibly empty) index chain.
#[derive(Debug, Clone)]
pub struct WriteOp {
    pub target: Accessor,
    pub at: Vec<Op>,
}

/// The cached, scope-bound form of an expression.
#[derive(Debug, Clone)]
pub struct Program {
    pub scope: NodeId,
    pub write: Option<WriteOp>,
    pub value: Op,
    /// `(base scope, first segment)` for every bound name.
    pub refs: Vec<(NodeId, String)>,
}

impl Op {
    /// False once any variable or node this op was bound to has been removed.
    fn is_current(&self, reg: &Registry) -> bool {
        match self {
            Op::Const(_) => true,
            Op::Read(acc) => reg.is_var_alive(acc.var),
            Op::Index { var, at } => reg.is_var_alive(var.var) && at.iter().all(|op| op.is_current(reg)),
            Op::Invoke { node, args, .. } => reg.is_alive(*node) && args.iter().all(|op| op.is_current(reg)),
            Op::Neg(inner) => inner.is_current(reg),
            Op::Binary { lhs, rhs, .. } => lhs.is_current(reg) && rhs.is_current(reg),
        }
    }
}

impl WriteOp {
    pub fn is_current(&self, reg: &Registry) -> bool {
        reg.is_var_alive(self.target.var) && self.at.iter().all(|op| op.is_current(reg))
    }
}

impl Program {
    pub fn is_current(&self, reg: &Registry) -> bool {
        reg.is_alive(self.scope)
            && self.write.as_ref().map_or(true, |w| w.is_current(reg))
            && self.value.is_current(reg)
    }
}

struct Binder<'a> {
    reg: &'a Registry,
    scope: NodeId,
    refs: Vec<(NodeId, String)>,
}

impl<'a> Binder<'a> {
    /// Applies the local-then-parent rule to the first segment of `path`.
    fn base_for(&self, path: &str) -> Result<(Base, NodeId)> {
        let first = path.split('.').next().unwrap_or(path);
        if scope::contains(self.reg, self.scope, first) {
            return Ok((Base::Local, self.scope));
        }
        if let Some(parent) = scope::parent(self.reg, self.scope)? {
            if scope::contains(self.reg, parent, first) {
                trace!(name = path, scope = %self.reg.pathname(self.scope), "bound against parent scope");
                return Ok((Base::Parent, parent));
            }
        }
        Err(FlowError::NameResolution { origin: self.reg.pathname(self.scope).into(), name: path.to_string() })
    }

    fn bind_var(&mut self, path: &str) -> Result<Accessor> {
        let (base, owner) = self.base_for(path)?;
        let var = match scope::resolve(self.reg, owner, path)? {
            Resolved::Variable(v) => v,
            Resolved::Node(_) => {
                return Err(FlowError::type_error(
                    self.reg.pathname(self.scope),
                    format!("'{}' names a node and has no value", path),
                ))
            }
        };
        self.note(owner, path);
        Ok(Accessor { base, path: path.to_string(), var })
    }

    fn bind_invoke(&mut self, path: &str, args: &[Expr]) -> Result<Op> {
        let Some((node_path, method)) = path.rsplit_once('.') else {
            // No free functions: a call always targets a node.
            return Err(FlowError::NameResolution { origin: self.reg.pathname(self.scope).into(), name: path.to_string() });
        };
        let (base, owner) = self.base_for(node_path)?;
        let node = scope::resolve_node(self.reg, owner, node_path)?;
        self.note(owner, node_path);
        let args = args.iter().map(|a| self.bind(a)).collect::<Result<Vec<_>>>()?;
        Ok(Op::Invoke { base, path: node_path.to_string(), node, method: method.to_string(), args })
    }

    fn note(&mut self, owner: NodeId, path: &str) {
        let first = path.split('.').next().unwrap_or(path).to_string();
        self.refs.push((owner, first));
    }

    fn bind_indices(&mut self, groups: &[Vec<Expr>]) -> Result<Vec<Op>> {
        groups.iter().flatten().map(|e| self.bind(e)).collect()
    }

    fn bind(&mut self, expr: &Expr) -> Result<Op> {
        Ok(match expr {
            Expr::Int(i) => Op::Const(Value::Int(*i)),
            Expr::Float(f) => Op::Const(Value::Scalar(*f)),
            Expr::Name { path, suffix, .. } => match suffix {
                Suffix::None => Op::Read(self.bind_var(path)?),
                Suffix::Index(groups) => {
                    let var = self.bind_var(path)?;
                    Op::Index { var, at: self.bind_indices(groups)? }
                }
                Suffix::Call(args) => self.bind_invoke(path, args)?,
            },
            Expr::Neg(inner) => Op::Neg(Box::new(self.bind(inner)?)),
            Expr::Binary { op, lhs, rhs } => Op::Binary {
                op: *op,
                lhs: Box::new(self.bind(lhs)?),
                rhs: Box::new(self.bind(rhs)?),
            },
        })
    }

    fn bind_target(&mut self, target: &Target) -> Result<WriteOp> {
        let accessor = self.bind_var(&target.path)?;
        Ok(WriteOp { target: accessor, at: self.bind_indices(&target.indices)? })
    }
}

pub fn compile(reg: &Registry, scope: NodeId, statement: &Statement) -> Result<Program> {
    reg.check(scope)?;
    let mut binder = Binder { reg, scope, refs: Vec::new() };
    let write = statement.target.as_ref().map(|t| binder.bind_target(t)).transpose()?;
    let value = binder.bind(&statement.value)?;
    Ok(Program { scope, write, value, refs: binder.refs })
}

/// Binds a bare (optionally indexed) reference as a write target.
pub fn compile_target(reg: &Registry, scope: NodeId, expr: &Expr) -> Result<WriteOp> {
    reg.check(scope)?;
    let target = match expr {
        Expr::Name { path, suffix: Suffix::None, span } => Target { path: path.clone(), indices: Vec::new(), span: span.clone() },
        Expr::Name { path, suffix: Suffix::Index(groups), span } => {
            Target { path: path.clone(), indices: groups.clone(), span: span.clone() }
        }
        _ => {
            return Err(FlowError::structure(reg.pathname(scope), "expression is not an assignable reference"))
        }
    };
    let mut binder = Binder { reg, scope, refs: Vec::new() };
    binder.bind_target(&target)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::expr::parser::parse;
    use crate::store::{Direction, NodeKind};

    /// root{v, child}, child = sub{v, comp{x}}
    fn fixture() -> (Registry, NodeId, NodeId) {
        let mut reg = Registry::with_root("top");
        let root = reg.root();
        reg.add_var(root, "v", Direction::Input, Value::Int(1)).unwrap();
        reg.add_var(root, "far", Direction::Input, Value::Int(9)).unwrap();
        let sub = reg.add_node(root, "sub", NodeKind::Assembly).unwrap();
        reg.add_var(sub, "v", Direction::Input, Value::Int(2)).unwrap();
        reg.add_var(sub, "w", Direction::Input, Value::Int(3)).unwrap();
        let comp = reg.add_node(sub, "comp", NodeKind::Component).unwrap();
        reg.add_var(comp, "x", Direction::Input, Value::Int(4)).unwrap();
        (reg, sub, comp)
    }

    fn read_base(program: &Program) -> (Base, String) {
        match &program.value {
            Op::Read(acc) => (acc.base, acc.path.clone()),
            other => panic!("expected a read, got {:?}", other),
        }
    }

    #[test]
    fn test_local_shadows_parent() {
        let (reg, sub, _) = fixture();
        let prog = compile(&reg, sub, &parse("v").unwrap()).unwrap();
        let (base, _) = read_base(&prog);
        assert_eq!(base, Base::Local);
        if let Op::Read(acc) = &prog.value {
            assert_eq!(reg.var_pathname(acc.var), "sub.v");
        }
    }

    #[test]
    fn test_falls_back_exactly_one_level() {
        let (reg, _, comp) = fixture();
        let prog = compile(&reg, comp, &parse("w").unwrap()).unwrap();
        assert_eq!(read_base(&prog).0, Base::Parent);

        // `far` lives two levels up and must stay invisible.
        let err = compile(&reg, comp, &parse("far + 1").unwrap()).unwrap_err();
        assert!(matches!(err, FlowError::NameResolution { ref name, .. } if name == "far"));
    }

    #[test]
    fn test_missing_later_segment_fails() {
        let (reg, sub, _) = fixture();
        let err = compile(&reg, sub, &parse("comp.nope").unwrap()).unwrap_err();
        assert!(matches!(err, FlowError::NameResolution { .. }));
    }

    #[test]
    fn test_call_binds_node_and_method() {
        let (reg, sub, comp) = fixture();
        let prog = compile(&reg, sub, &parse("comp.scale(w, 2)").unwrap()).unwrap();
        match prog.value {
            Op::Invoke { node, method, args, base, .. } => {
                assert_eq!(node, comp);
                assert_eq!(method, "scale");
                assert_eq!(args.len(), 2);
                assert_eq!(base, Base::Local);
            }
            other => panic!("expected invoke, got {:?}", other),
        }
        assert!(compile(&reg, sub, &parse("sin(w)").unwrap()).is_err());
    }

    #[test]
    fn test_assignment_writes_where_name_resolved() {
        let (reg, _, comp) = fixture();
        let prog = compile(&reg, comp, &parse("w = x * 2").unwrap()).unwrap();
        let write = prog.write.unwrap();
        assert_eq!(write.target.base, Base::Parent);
        assert_eq!(reg.var_pathname(write.target.var), "sub.w");
    }

    #[test]
    fn test_refs_record_first_segment_per_base() {
        let (reg, sub, _) = fixture();
        let prog = compile(&reg, sub, &parse("comp.x + v").unwrap()).unwrap();
        assert_eq!(prog.refs, vec![(sub, "comp".to_string()), (sub, "v".to_string())]);
    }

    #[test]
    fn test_program_goes_stale_when_a_bound_var_is_removed() {
        let (mut reg, sub, comp) = fixture();
        let prog = compile(&reg, sub, &parse("comp.x + w").unwrap()).unwrap();
        let write = compile_target(&reg, sub, &parse("comp.x").unwrap().value).unwrap();
        assert!(prog.is_current(&reg));
        assert!(write.is_current(&reg));

        reg.remove(comp).unwrap();
        assert!(!prog.is_current(&reg));
        assert!(!write.is_current(&reg));
    }

    #[test]
    fn test_non_reference_is_not_assignable() {
        let (reg, sub, _) = fixture();
        let stmt = parse("v + 1").unwrap();
        assert!(compile_target(&reg, sub, &stmt.value).is_err());
        let stmt = parse("comp.x").unwrap();
        assert!(compile_target(&reg, sub, &stmt.value).is_ok());
    }
}
