//! Tree-walking evaluator for bound programs.

use super::ast::BinaryOp;
use super::compile::{Accessor, Op, Program, WriteOp};
use crate::error::{FlowError, Result};
use crate::model::Model;
use crate::store::{NodeId, Value, VarId};

type OpResult<T> = std::result::Result<T, String>;

pub fn run(model: &mut Model, program: &Program) -> Result<Value> {
    let value = eval(model, program.scope, &program.value)?;
    if let Some(write) = &program.write {
        store(model, program.scope, write, value.clone())?;
    }
    Ok(value)
}

/// Writes `value` through a bound target, replacing a single element when indexed.
pub fn store(model: &mut Model, scope: NodeId, write: &WriteOp, value: Value) -> Result<()> {
    let var = live(model, scope, &write.target)?;
    if write.at.is_empty() {
        return model.assign(var, value);
    }
    let positions = write
        .at
        .iter()
        .map(|op| position(model, scope, op))
        .collect::<Result<Vec<_>>>()?;
    let current = model.registry().values[var.index()].clone();
    let updated = replace_at(&current, &positions, value)
        .ok_or_else(|| type_error(model, scope, format!("index out of range for '{}'", write.target.path)))?;
    model.assign(var, updated)
}

fn replace_at(current: &Value, positions: &[i64], value: Value) -> Option<Value> {
    match positions.split_first() {
        None => Some(value),
        Some((&first, rest)) => {
            let inner = replace_at(current.element(first)?, rest, value)?;
            current.with_element(first, inner)
        }
    }
}

/// A dead variable under a live scope means the name itself went away.
fn live(model: &Model, scope: NodeId, acc: &Accessor) -> Result<VarId> {
    let reg = model.registry();
    if reg.is_var_alive(acc.var) {
        Ok(acc.var)
    } else if reg.is_alive(scope) {
        Err(FlowError::NameResolution { origin: reg.pathname(scope).into(), name: acc.path.clone() })
    } else {
        Err(FlowError::detached(reg.pathname(scope)))
    }
}

fn type_error(model: &Model, scope: NodeId, message: String) -> FlowError {
    FlowError::type_error(model.registry().pathname(scope), message)
}

fn position(model: &mut Model, scope: NodeId, op: &Op) -> Result<i64> {
    let v = eval(model, scope, op)?;
    v.as_i64()
        .ok_or_else(|| type_error(model, scope, format!("index must be an integer, got {}", v)))
}

fn eval(model: &mut Model, scope: NodeId, op: &Op) -> Result<Value> {
    match op {
        Op::Const(v) => Ok(v.clone()),
        Op::Read(acc) => {
            let var = live(model, scope, acc)?;
            Ok(model.registry().values[var.index()].clone())
        }
        Op::Index { var, at } => {
            let id = live(model, scope, var)?;
            let mut current = model.registry().values[id.index()].clone();
            for op in at {
                let pos = position(model, scope, op)?;
                current = current.element(pos).cloned().ok_or_else(|| {
                    type_error(model, scope, format!("index {} out of range for '{}'", pos, var.path))
                })?;
            }
            Ok(current)
        }
        Op::Invoke { node, method, args, .. } => {
            let args = args.iter().map(|a| eval(model, scope, a)).collect::<Result<Vec<_>>>()?;
            model.invoke(*node, method, &args)
        }
        Op::Neg(inner) => {
            let v = eval(model, scope, inner)?;
            negate(v).map_err(|m| type_error(model, scope, m))
        }
        Op::Binary { op, lhs, rhs } => {
            let l = eval(model, scope, lhs)?;
            let r = eval(model, scope, rhs)?;
            binary(*op, l, r).map_err(|m| type_error(model, scope, m))
        }
    }
}

fn negate(v: Value) -> OpResult<Value> {
    match v {
        Value::Int(i) => i.checked_neg().map(Value::Int).ok_or_else(|| "integer overflow".to_string()),
        Value::Scalar(s) => Ok(Value::Scalar(-s)),
        Value::Series(items) => Ok(Value::series(
            items.iter().cloned().map(negate).collect::<OpResult<Vec<_>>>()?,
        )),
    }
}

pub(crate) fn binary(op: BinaryOp, l: Value, r: Value) -> OpResult<Value> {
    match (l, r) {
        (Value::Series(a), Value::Series(b)) => {
            if a.len() != b.len() {
                return Err(format!("shape mismatch: {} vs {} elements", a.len(), b.len()));
            }
            let items = a
                .iter()
                .zip(b.iter())
                .map(|(x, y)| binary(op, x.clone(), y.clone()))
                .collect::<OpResult<Vec<_>>>()?;
            Ok(Value::series(items))
        }
        (Value::Series(a), scalar) => Ok(Value::series(
            a.iter().map(|x| binary(op, x.clone(), scalar.clone())).collect::<OpResult<Vec<_>>>()?,
        )),
        (scalar, Value::Series(b)) => Ok(Value::series(
            b.iter().map(|y| binary(op, scalar.clone(), y.clone())).collect::<OpResult<Vec<_>>>()?,
        )),
        (Value::Int(a), Value::Int(b)) => int_op(op, a, b),
        (l, r) => {
            let (a, b) = match (l.as_f64(), r.as_f64()) {
                (Some(a), Some(b)) => (a, b),
                _ => return Err("operands must be numeric".to_string()),
            };
            float_op(op, a, b)
        }
    }
}

fn int_op(op: BinaryOp, a: i64, b: i64) -> OpResult<Value> {
    let overflow = || "integer overflow".to_string();
    match op {
        BinaryOp::Add => a.checked_add(b).map(Value::Int).ok_or_else(overflow),
        BinaryOp::Sub => a.checked_sub(b).map(Value::Int).ok_or_else(overflow),
        BinaryOp::Mul => a.checked_mul(b).map(Value::Int).ok_or_else(overflow),
        BinaryOp::Pow if b >= 0 => {
            let exp = u32::try_from(b).map_err(|_| overflow())?;
            a.checked_pow(exp).map(Value::Int).ok_or_else(overflow)
        }
        _ => float_op(op, a as f64, b as f64),
    }
}

fn float_op(op: BinaryOp, a: f64, b: f64) -> OpResult<Value> {
    Ok(Value::Scalar(match op {
        BinaryOp::Add => a + b,
        BinaryOp::Sub => a - b,
        BinaryOp::Mul => a * b,
        BinaryOp::Div if b == 0.0 => return Err("division by zero".to_string()),
        BinaryOp::Div => a / b,
        BinaryOp::Pow => a.powf(b),
    }))
}

#[cfg(test)]
mod tests {
    use super::*;
    use rstest::rstest;

    #[rstest]
    #[case(BinaryOp::Add, Value::Int(2), Value::Int(3), Value::Int(5))]
    #[case(BinaryOp::Div, Value::Int(7), Value::Int(2), Value::Scalar(3.5))]
    #[case(BinaryOp::Pow, Value::Int(2), Value::Int(10), Value::Int(1024))]
    #[case(BinaryOp::Pow, Value::Int(2), Value::Int(-1), Value::Scalar(0.5))]
    #[case(BinaryOp::Mul, Value::Scalar(1.5), Value::Int(2), Value::Scalar(3.0))]
    fn test_numeric_promotion(#[case] op: BinaryOp, #[case] l: Value, #[case] r: Value, #[case] expected: Value) {
        assert_eq!(binary(op, l, r).unwrap(), expected);
    }

    #[test]
    fn test_series_broadcast() {
        let v = Value::from(vec![1.0, 2.0]);
        assert_eq!(binary(BinaryOp::Mul, v.clone(), Value::Int(2)).unwrap(), Value::from(vec![2.0, 4.0]));
        assert_eq!(binary(BinaryOp::Sub, Value::Int(1), v.clone()).unwrap(), Value::from(vec![0.0, -1.0]));
        assert!(binary(BinaryOp::Add, v, Value::from(vec![1.0])).is_err());
    }

    #[test]
    fn test_division_by_zero_is_rejected() {
        assert!(binary(BinaryOp::Div, Value::Int(1), Value::Int(0)).is_err());
        assert!(binary(BinaryOp::Div, Value::Scalar(1.0), Value::Scalar(0.0)).is_err());
    }

    #[test]
    fn test_replace_nested_element() {
        let row = Value::from(vec![1.0, 2.0]);
        let grid = Value::series(vec![row.clone(), row]);
        let updated = replace_at(&grid, &[1, -1], Value::Scalar(9.0)).unwrap();
        assert_eq!(updated.element(1).and_then(|r| r.element(1)), Some(&Value::Scalar(9.0)));
        assert_eq!(updated.element(0).and_then(|r| r.element(1)), Some(&Value::Scalar(2.0)));
        assert!(replace_at(&updated, &[5], Value::Int(0)).is_none());
    }
}
