//! Typed leaf payloads for [`Node`](super::Node) trees.
//!
//! A leaf is either a string or a typed numeric array; scalars are stored as
//! one-element arrays. `gather`/`concat`/`zeros` are the dtype-preserving
//! primitives that field slicing and mesh combining are built from.

use crate::error::RepartError;

/// Data type tag for a [`Value`].
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
#[cfg_attr(feature = "serde", derive(serde::Serialize, serde::Deserialize))]
pub enum DType {
    Empty,
    String,
    Int32,
    Int64,
    UInt64,
    Float64,
}

/// Leaf data carried by a tree node.
#[derive(Debug, Clone, PartialEq, Default)]
#[cfg_attr(feature = "serde", derive(serde::Serialize, serde::Deserialize))]
pub enum Value {
    #[default]
    Empty,
    String(String),
    Int32(Vec<i32>),
    Int64(Vec<i64>),
    UInt64(Vec<u64>),
    Float64(Vec<f64>),
}

impl Value {
    /// The data type tag of this value.
    pub fn dtype(&self) -> DType {
        match self {
            Value::Empty => DType::Empty,
            Value::String(_) => DType::String,
            Value::Int32(_) => DType::Int32,
            Value::Int64(_) => DType::Int64,
            Value::UInt64(_) => DType::UInt64,
            Value::Float64(_) => DType::Float64,
        }
    }

    /// Number of array elements (string length in bytes for strings).
    pub fn len(&self) -> usize {
        match self {
            Value::Empty => 0,
            Value::String(s) => s.len(),
            Value::Int32(v) => v.len(),
            Value::Int64(v) => v.len(),
            Value::UInt64(v) => v.len(),
            Value::Float64(v) => v.len(),
        }
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    /// First element as `i64` if this is a numeric value.
    pub fn as_i64(&self) -> Option<i64> {
        match self {
            Value::Int32(v) => v.first().map(|&x| x as i64),
            Value::Int64(v) => v.first().copied(),
            Value::UInt64(v) => v.first().map(|&x| x as i64),
            Value::Float64(v) => v.first().map(|&x| x as i64),
            _ => None,
        }
    }

    /// First element as `f64` if this is a numeric value.
    pub fn as_f64(&self) -> Option<f64> {
        match self {
            Value::Int32(v) => v.first().map(|&x| x as f64),
            Value::Int64(v) => v.first().map(|&x| x as f64),
            Value::UInt64(v) => v.first().map(|&x| x as f64),
            Value::Float64(v) => v.first().copied(),
            _ => None,
        }
    }

    pub fn as_str(&self) -> Option<&str> {
        match self {
            Value::String(s) => Some(s),
            _ => None,
        }
    }

    pub fn as_f64_slice(&self) -> Option<&[f64]> {
        match self {
            Value::Float64(v) => Some(v),
            _ => None,
        }
    }

    /// Whole array widened to `i64`, for integer-valued fields of any width.
    pub fn to_i64_vec(&self) -> Option<Vec<i64>> {
        match self {
            Value::Int32(v) => Some(v.iter().map(|&x| x as i64).collect()),
            Value::Int64(v) => Some(v.clone()),
            Value::UInt64(v) => Some(v.iter().map(|&x| x as i64).collect()),
            _ => None,
        }
    }

    /// Whole array widened to `f64`, for coordinate-like data of any width.
    pub fn to_f64_vec(&self) -> Option<Vec<f64>> {
        match self {
            Value::Int32(v) => Some(v.iter().map(|&x| x as f64).collect()),
            Value::Int64(v) => Some(v.iter().map(|&x| x as f64).collect()),
            Value::UInt64(v) => Some(v.iter().map(|&x| x as f64).collect()),
            Value::Float64(v) => Some(v.clone()),
            _ => None,
        }
    }

    /// Dtype-preserving slice by index list.
    ///
    /// Out-of-range ids are a caller bug; they panic in debug builds via
    /// indexing, matching slice semantics.
    pub fn gather(&self, ids: &[usize]) -> Value {
        match self {
            Value::Empty => Value::Empty,
            Value::String(s) => Value::String(s.clone()),
            Value::Int32(v) => Value::Int32(ids.iter().map(|&i| v[i]).collect()),
            Value::Int64(v) => Value::Int64(ids.iter().map(|&i| v[i]).collect()),
            Value::UInt64(v) => Value::UInt64(ids.iter().map(|&i| v[i]).collect()),
            Value::Float64(v) => Value::Float64(ids.iter().map(|&i| v[i]).collect()),
        }
    }

    /// A zero-filled array of the given dtype and length.
    pub fn zeros(dtype: DType, len: usize) -> Value {
        match dtype {
            DType::Empty => Value::Empty,
            DType::String => Value::String(String::new()),
            DType::Int32 => Value::Int32(vec![0; len]),
            DType::Int64 => Value::Int64(vec![0; len]),
            DType::UInt64 => Value::UInt64(vec![0; len]),
            DType::Float64 => Value::Float64(vec![0.0; len]),
        }
    }

    /// Concatenate values of a common dtype in order.
    pub fn concat(parts: &[&Value]) -> Result<Value, RepartError> {
        let dtype = parts
            .iter()
            .map(|p| p.dtype())
            .find(|&d| d != DType::Empty)
            .unwrap_or(DType::Empty);
        let mut out = Value::zeros(dtype, 0);
        for part in parts {
            if part.dtype() == DType::Empty {
                continue;
            }
            if part.dtype() != dtype {
                return Err(RepartError::Combine(format!(
                    "cannot concatenate {:?} into {:?}",
                    part.dtype(),
                    dtype
                )));
            }
            match (&mut out, part) {
                (Value::Int32(a), Value::Int32(b)) => a.extend_from_slice(b),
                (Value::Int64(a), Value::Int64(b)) => a.extend_from_slice(b),
                (Value::UInt64(a), Value::UInt64(b)) => a.extend_from_slice(b),
                (Value::Float64(a), Value::Float64(b)) => a.extend_from_slice(b),
                (Value::String(a), Value::String(b)) => a.push_str(b),
                _ => unreachable!("dtype checked above"),
            }
        }
        Ok(out)
    }
}

impl From<i32> for Value {
    fn from(v: i32) -> Self {
        Value::Int32(vec![v])
    }
}
impl From<i64> for Value {
    fn from(v: i64) -> Self {
        Value::Int64(vec![v])
    }
}
impl From<u64> for Value {
    fn from(v: u64) -> Self {
        Value::UInt64(vec![v])
    }
}
impl From<f64> for Value {
    fn from(v: f64) -> Self {
        Value::Float64(vec![v])
    }
}
impl From<&str> for Value {
    fn from(v: &str) -> Self {
        Value::String(v.to_string())
    }
}
impl From<String> for Value {
    fn from(v: String) -> Self {
        Value::String(v)
    }
}
impl From<Vec<i32>> for Value {
    fn from(v: Vec<i32>) -> Self {
        Value::Int32(v)
    }
}
impl From<Vec<i64>> for Value {
    fn from(v: Vec<i64>) -> Self {
        Value::Int64(v)
    }
}
impl From<Vec<u64>> for Value {
    fn from(v: Vec<u64>) -> Self {
        Value::UInt64(v)
    }
}
impl From<Vec<f64>> for Value {
    fn from(v: Vec<f64>) -> Self {
        Value::Float64(v)
    }
}
impl From<&[f64]> for Value {
    fn from(v: &[f64]) -> Self {
        Value::Float64(v.to_vec())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn gather_preserves_dtype() {
        let v = Value::Int32(vec![10, 20, 30, 40]);
        let g = v.gather(&[3, 1]);
        assert_eq!(g, Value::Int32(vec![40, 20]));
        assert_eq!(g.dtype(), DType::Int32);
    }

    #[test]
    fn concat_rejects_mixed_dtypes() {
        let a = Value::Int32(vec![1]);
        let b = Value::Float64(vec![2.0]);
        assert!(Value::concat(&[&a, &b]).is_err());
    }

    #[test]
    fn concat_skips_empty_parts() {
        let a = Value::Float64(vec![1.0, 2.0]);
        let e = Value::Empty;
        let c = Value::concat(&[&a, &e, &a]).unwrap();
        assert_eq!(c, Value::Float64(vec![1.0, 2.0, 1.0, 2.0]));
    }

    #[test]
    fn scalar_coercions() {
        assert_eq!(Value::from(7i32).as_i64(), Some(7));
        assert_eq!(Value::from(7u64).as_f64(), Some(7.0));
        assert_eq!(Value::from("quad").as_str(), Some("quad"));
    }
}
