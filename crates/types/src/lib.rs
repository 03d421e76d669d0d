//! Scalar value model: attribute types, the tagged `Value` variant, and the
//! per-type behavior registry (`DataType`).

mod data_type;
#[cfg(test)]
mod tests;

pub use data_type::{type_instance, DataType};

use serde::{Deserialize, Serialize};
use std::cmp::Ordering;
use std::fmt;
use thiserror::Error;

/// Attribute kind of a column or scalar.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum AttrType {
    Undefined,
    Chars,
    Ints,
    Bigints,
    Floats,
    Dates,
    Texts,
    Vectors,
    Booleans,
}

impl AttrType {
    /// Storage width of one element for fixed-width kinds. Text columns hold
    /// 16-byte descriptors; `Chars` width is declared per field.
    pub fn fixed_len(&self) -> Option<usize> {
        match self {
            AttrType::Ints | AttrType::Floats | AttrType::Dates => Some(4),
            AttrType::Bigints => Some(8),
            AttrType::Booleans => Some(1),
            AttrType::Texts => Some(16),
            _ => None,
        }
    }

    pub fn is_numeric(&self) -> bool {
        matches!(self, AttrType::Ints | AttrType::Bigints | AttrType::Floats)
    }
}

impl fmt::Display for AttrType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let name = match self {
            AttrType::Undefined => "UNDEFINED",
            AttrType::Chars => "CHARS",
            AttrType::Ints => "INTS",
            AttrType::Bigints => "BIGINTS",
            AttrType::Floats => "FLOATS",
            AttrType::Dates => "DATES",
            AttrType::Texts => "TEXTS",
            AttrType::Vectors => "VECTORS",
            AttrType::Booleans => "BOOLEANS",
        };
        write!(f, "{name}")
    }
}

/// Errors raised by value parsing, casting, and comparison.
#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum TypeError {
    #[error("invalid value: {0}")]
    Invalid(String),
    #[error("type mismatch: {0}")]
    Mismatch(String),
    #[error("unsupported: {0}")]
    Unsupported(String),
}

/// A tagged scalar. Dates are stored as `YYYY * 10000 + MM * 100 + DD`.
#[derive(Clone, Debug, Serialize, Deserialize)]
pub enum Value {
    Undefined,
    Bool(bool),
    Int(i32),
    Bigint(i64),
    Float(f32),
    Date(i32),
    Chars(String),
    Texts(String),
    Vector(Vec<f32>),
}

impl Value {
    pub fn attr_type(&self) -> AttrType {
        match self {
            Value::Undefined => AttrType::Undefined,
            Value::Bool(_) => AttrType::Booleans,
            Value::Int(_) => AttrType::Ints,
            Value::Bigint(_) => AttrType::Bigints,
            Value::Float(_) => AttrType::Floats,
            Value::Date(_) => AttrType::Dates,
            Value::Chars(_) => AttrType::Chars,
            Value::Texts(_) => AttrType::Texts,
            Value::Vector(_) => AttrType::Vectors,
        }
    }

    pub fn as_int(&self) -> Option<i32> {
        match self {
            Value::Int(v) | Value::Date(v) => Some(*v),
            _ => None,
        }
    }

    pub fn as_bigint(&self) -> Option<i64> {
        match self {
            Value::Bigint(v) => Some(*v),
            Value::Int(v) => Some(*v as i64),
            _ => None,
        }
    }

    pub fn as_float(&self) -> Option<f32> {
        match self {
            Value::Float(v) => Some(*v),
            Value::Int(v) => Some(*v as f32),
            Value::Bigint(v) => Some(*v as f32),
            _ => None,
        }
    }

    pub fn as_str(&self) -> Option<&str> {
        match self {
            Value::Chars(s) | Value::Texts(s) => Some(s),
            _ => None,
        }
    }

    /// Total-order comparison within one type; numeric kinds compare across
    /// each other by widening. Returns `None` for incomparable kinds.
    pub fn compare(&self, other: &Value) -> Option<Ordering> {
        if self.attr_type() == other.attr_type() {
            return type_instance(self.attr_type()).compare(self, other).ok();
        }
        if self.attr_type().is_numeric() && other.attr_type().is_numeric() {
            let l = self.widened();
            let r = other.widened();
            return Some(l.total_cmp(&r));
        }
        // Fixed-width and spilled strings compare as text.
        if self.as_str().is_some() && other.as_str().is_some() {
            return Some(self.as_str().cmp(&other.as_str()));
        }
        None
    }

    fn widened(&self) -> f64 {
        match self {
            Value::Int(v) => *v as f64,
            Value::Bigint(v) => *v as f64,
            Value::Float(v) => *v as f64,
            _ => 0.0,
        }
    }

    /// Cast through the type registry.
    pub fn cast_to(&self, to: AttrType) -> Result<Value, TypeError> {
        if self.attr_type() == to {
            return Ok(self.clone());
        }
        type_instance(self.attr_type()).cast_to(self, to)
    }

    /// Cost of the implicit promotion from this value's type to `to`.
    /// `0` means free, `i32::MAX` means impossible.
    pub fn cast_cost(from: AttrType, to: AttrType) -> i32 {
        if from == to {
            return 0;
        }
        type_instance(from).cast_cost(to)
    }

    pub fn add(&self, other: &Value) -> Result<Value, TypeError> {
        numeric_binop(self, other, i64::wrapping_add, |a, b| a + b)
    }

    pub fn subtract(&self, other: &Value) -> Result<Value, TypeError> {
        numeric_binop(self, other, i64::wrapping_sub, |a, b| a - b)
    }

    pub fn multiply(&self, other: &Value) -> Result<Value, TypeError> {
        numeric_binop(self, other, i64::wrapping_mul, |a, b| a * b)
    }

    pub fn divide(&self, other: &Value) -> Result<Value, TypeError> {
        match (self, other) {
            (Value::Int(_), Value::Int(0)) | (Value::Bigint(_), Value::Bigint(0)) => {
                Err(TypeError::Invalid("division by zero".into()))
            }
            (Value::Int(a), Value::Int(b)) => Ok(Value::Int(a / b)),
            (Value::Bigint(_), _) | (_, Value::Bigint(_)) => {
                let (a, b) = (self.as_bigint(), other.as_bigint());
                match (a, b) {
                    (Some(_), Some(0)) => Err(TypeError::Invalid("division by zero".into())),
                    (Some(a), Some(b)) => Ok(Value::Bigint(a / b)),
                    _ => float_div(self, other),
                }
            }
            _ => float_div(self, other),
        }
    }
}

fn float_div(l: &Value, r: &Value) -> Result<Value, TypeError> {
    match (l.as_float(), r.as_float()) {
        (Some(a), Some(b)) => Ok(Value::Float(a / b)),
        _ => Err(TypeError::Mismatch(format!(
            "cannot divide {} by {}",
            l.attr_type(),
            r.attr_type()
        ))),
    }
}

fn numeric_binop(
    l: &Value,
    r: &Value,
    int_op: fn(i64, i64) -> i64,
    float_op: fn(f32, f32) -> f32,
) -> Result<Value, TypeError> {
    match (l, r) {
        (Value::Int(a), Value::Int(b)) => {
            Ok(Value::Int(int_op(*a as i64, *b as i64) as i32))
        }
        (Value::Float(_), _) | (_, Value::Float(_)) => match (l.as_float(), r.as_float()) {
            (Some(a), Some(b)) => Ok(Value::Float(float_op(a, b))),
            _ => Err(TypeError::Mismatch(format!(
                "non-numeric operands {} and {}",
                l.attr_type(),
                r.attr_type()
            ))),
        },
        _ => match (l.as_bigint(), r.as_bigint()) {
            (Some(a), Some(b)) => Ok(Value::Bigint(int_op(a, b))),
            _ => Err(TypeError::Mismatch(format!(
                "non-numeric operands {} and {}",
                l.attr_type(),
                r.attr_type()
            ))),
        },
    }
}

impl fmt::Display for Value {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", type_instance(self.attr_type()).to_text(self))
    }
}

impl PartialEq for Value {
    fn eq(&self, other: &Self) -> bool {
        self.compare(other) == Some(Ordering::Equal)
    }
}

/// Pack a calendar date into the internal integer form.
pub fn date_from_parts(year: i32, month: i32, day: i32) -> i32 {
    year * 10000 + month * 100 + day
}
