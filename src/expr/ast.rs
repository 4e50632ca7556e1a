//! Syntax tree produced by the expression grammar.

use std::ops::Range;

pub type Span = Range<usize>;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum BinaryOp {
    Add,
    Sub,
    Mul,
    Div,
    Pow,
}

/// What follows a dotted name: nothing, index groups (`a[1][2,3]`) or one call.
#[derive(Debug, Clone, PartialEq)]
pub enum Suffix {
    None,
    Index(Vec<Vec<Expr>>),
    Call(Vec<Expr>),
}

#[derive(Debug, Clone, PartialEq)]
pub enum Expr {
    Int(i64),
    Float(f64),
    Name { path: String, suffix: Suffix, span: Span },
    Neg(Box<Expr>),
    Binary { op: BinaryOp, lhs: Box<Expr>, rhs: Box<Expr> },
}

/// Left-hand side of a top-level assignment.
#[derive(Debug, Clone, PartialEq)]
pub struct Target {
    pub path: String,
    pub indices: Vec<Vec<Expr>>,
    pub span: Span,
}

#[derive(Debug, Clone, PartialEq)]
pub struct Statement {
    pub target: Option<Target>,
    pub value: Expr,
}

impl Expr {
    /// Visits every dotted name in the tree, including those nested in indices and arguments.
    pub fn for_each_name<'a>(&'a self, f: &mut dyn FnMut(&'a str)) {
        match self {
            Expr::Int(_) | Expr::Float(_) => {}
            Expr::Name { path, suffix, .. } => {
                f(path);
                match suffix {
                    Suffix::None => {}
                    Suffix::Index(groups) => groups.iter().flatten().for_each(|e| e.for_each_name(f)),
                    Suffix::Call(args) => args.iter().for_each(|e| e.for_each_name(f)),
                }
            }
            Expr::Neg(inner) => inner.for_each_name(f),
            Expr::Binary { lhs, rhs, .. } => {
                lhs.for_each_name(f);
                rhs.for_each_name(f);
            }
        }
    }
}
