use serde::{Deserialize, Serialize};
use std::fmt;
use std::sync::Arc;

/// 2^63: the first integral float magnitude an `i64` cannot hold.
const I64_BOUND: f64 = 9_223_372_036_854_775_808.0;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Default, Serialize, Deserialize)]
pub struct NodeId(pub u32);

impl NodeId {
    #[inline(always)]
    pub fn index(&self) -> usize { self.0 as usize }
    pub fn new(idx: usize) -> Self { Self(idx as u32) }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Default, Serialize, Deserialize)]
pub struct VarId(pub u32);

impl VarId {
    #[inline(always)]
    pub fn index(&self) -> usize { self.0 as usize }
    pub fn new(idx: usize) -> Self { Self(idx as u32) }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Direction {
    Input,
    Output,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum NodeKind {
    /// A scope: owns children, has no behaviour of its own.
    Assembly,
    Component,
    /// A component that runs an inner workflow of its siblings.
    Driver,
}

/// Non-owning link from a node to the scope that contains it.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ParentLink {
    Root,
    Attached(NodeId),
    Detached,
}

/// The atomic unit of data stored in a variable.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(untagged)]
pub enum Value {
    Int(i64),
    Scalar(f64),
    /// Shared, possibly nested, array. Cloning only bumps a refcount.
    Series(Arc<Vec<Value>>),
}

impl Value {
    pub fn series(items: Vec<Value>) -> Self {
        Value::Series(Arc::new(items))
    }

    pub fn kind_name(&self) -> &'static str {
        match self {
            Value::Int(_) => "int",
            Value::Scalar(_) => "float",
            Value::Series(_) => "array",
        }
    }

    pub fn as_f64(&self) -> Option<f64> {
        match self {
            Value::Int(i) => Some(*i as f64),
            Value::Scalar(s) => Some(*s),
            Value::Series(_) => None,
        }
    }

    /// Integral view, accepting floats only when they carry no fraction and fit in an `i64`.
    pub fn as_i64(&self) -> Option<i64> {
        match self {
            Value::Int(i) => Some(*i),
            Value::Scalar(s) if s.fract() == 0.0 && s.is_finite() && s.abs() < I64_BOUND => Some(*s as i64),
            _ => None,
        }
    }

    pub fn len(&self) -> usize {
        match self {
            Value::Series(items) => items.len(),
            _ => 1,
        }
    }

    pub fn is_empty(&self) -> bool {
        matches!(self, Value::Series(items) if items.is_empty())
    }

    /// Python-style element access: negative positions count from the end.
    pub fn element(&self, position: i64) -> Option<&Value> {
        match self {
            Value::Series(items) => {
                let len = items.len() as i64;
                let idx = if position < 0 { len + position } else { position };
                if idx < 0 { None } else { items.get(idx as usize) }
            }
            _ => None,
        }
    }

    /// Returns a copy with the element at `position` replaced.
    pub fn with_element(&self, position: i64, value: Value) -> Option<Value> {
        match self {
            Value::Series(items) => {
                let len = items.len() as i64;
                let idx = if position < 0 { len + position } else { position };
                if idx < 0 || idx >= len {
                    return None;
                }
                let mut copy = items.as_ref().clone();
                copy[idx as usize] = value;
                Some(Value::series(copy))
            }
            _ => None,
        }
    }

    /// Flattens numeric content into a vector (for strategy/solver consumption).
    pub fn to_vec(&self) -> Vec<f64> {
        match self {
            Value::Int(i) => vec![*i as f64],
            Value::Scalar(s) => vec![*s],
            Value::Series(items) => items.iter().flat_map(|v| v.to_vec()).collect(),
        }
    }

    /// Converts `self` so it can be stored where `like` currently lives.
    pub(crate) fn conform_to(self, like: &Value) -> Result<Value, String> {
        match (like, self) {
            (Value::Int(_), Value::Int(i)) => Ok(Value::Int(i)),
            (Value::Int(_), Value::Scalar(s)) => Value::Scalar(s)
                .as_i64()
                .map(Value::Int)
                .ok_or_else(|| format!("cannot store non-integral value {} in an int variable", s)),
            (Value::Scalar(_), Value::Int(i)) => Ok(Value::Scalar(i as f64)),
            (Value::Scalar(_), Value::Scalar(s)) => Ok(Value::Scalar(s)),
            (Value::Series(_), v @ Value::Series(_)) => Ok(v),
            (like, other) => Err(format!(
                "cannot store a {} value in a {} variable",
                other.kind_name(),
                like.kind_name()
            )),
        }
    }
}

impl From<f64> for Value {
    fn from(v: f64) -> Self { Value::Scalar(v) }
}

impl From<i64> for Value {
    fn from(v: i64) -> Self { Value::Int(v) }
}

impl From<i32> for Value {
    fn from(v: i32) -> Self { Value::Int(v as i64) }
}

impl From<Vec<f64>> for Value {
    fn from(v: Vec<f64>) -> Self {
        Value::series(v.into_iter().map(Value::Scalar).collect())
    }
}

impl fmt::Display for Value {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Value::Int(i) => write!(f, "{}", i),
            Value::Scalar(s) => write!(f, "{}", s),
            Value::Series(items) => {
                write!(f, "[")?;
                for (i, item) in items.iter().enumerate() {
                    if i > 0 { write!(f, ", ")?; }
                    write!(f, "{}", item)?;
                }
                write!(f, "]")
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use rstest::rstest;

    #[rstest]
    #[case(Value::Int(1), Value::Scalar(2.0), Ok(Value::Int(2)))]
    #[case(Value::Scalar(1.0), Value::Int(3), Ok(Value::Scalar(3.0)))]
    #[case(Value::Scalar(1.0), Value::Scalar(0.5), Ok(Value::Scalar(0.5)))]
    fn test_conform_accepts_compatible_values(
        #[case] like: Value,
        #[case] incoming: Value,
        #[case] expected: Result<Value, String>,
    ) {
        assert_eq!(incoming.conform_to(&like), expected);
    }

    #[test]
    fn test_conform_rejects_lossy_and_shape_changes() {
        assert!(Value::Scalar(1.5).conform_to(&Value::Int(0)).is_err());
        assert!(Value::from(vec![1.0]).conform_to(&Value::Scalar(0.0)).is_err());
        assert!(Value::Int(1).conform_to(&Value::from(vec![1.0])).is_err());
        assert!(Value::Scalar(1e300).conform_to(&Value::Int(0)).is_err());
    }

    #[rstest]
    #[case(Value::Scalar(-4.0), Some(-4))]
    #[case(Value::Scalar(9_007_199_254_740_992.0), Some(9_007_199_254_740_992))]
    #[case(Value::Scalar(9_223_372_036_854_775_808.0), None)]
    #[case(Value::Scalar(-1e300), None)]
    #[case(Value::Scalar(f64::INFINITY), None)]
    fn test_integral_view_stays_in_range(#[case] v: Value, #[case] expected: Option<i64>) {
        assert_eq!(v.as_i64(), expected);
    }

    #[test]
    fn test_negative_element_counts_from_end() {
        let v = Value::from(vec![1.0, 2.0, 3.0]);
        assert_eq!(v.element(-1), Some(&Value::Scalar(3.0)));
        assert_eq!(v.element(3), None);
        assert_eq!(v.element(-4), None);
    }

    #[test]
    fn test_serde_untagged_shapes() {
        let v: Value = serde_json::from_str("[1, 2.5]").expect("parse");
        assert_eq!(v, Value::series(vec![Value::Int(1), Value::Scalar(2.5)]));
        assert_eq!(serde_json::to_string(&Value::Int(4)).expect("ser"), "4");
    }
}
