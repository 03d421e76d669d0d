//! Per-type behavior registry. Each attribute kind has one `DataType`
//! implementation reached through [`type_instance`], carrying comparison,
//! casting with cost, parsing, and formatting.

use crate::{AttrType, TypeError, Value};
use std::cmp::Ordering;

pub trait DataType: Sync + Send {
    fn attr_type(&self) -> AttrType;

    /// Compare two values of this type.
    fn compare(&self, left: &Value, right: &Value) -> Result<Ordering, TypeError>;

    /// Cast a value of this type into `to`.
    fn cast_to(&self, _value: &Value, to: AttrType) -> Result<Value, TypeError> {
        Err(TypeError::Unsupported(format!(
            "cast from {} to {}",
            self.attr_type(),
            to
        )))
    }

    /// Implicit-promotion cost toward `to`; `i32::MAX` means impossible.
    fn cast_cost(&self, to: AttrType) -> i32 {
        if to == self.attr_type() {
            0
        } else {
            i32::MAX
        }
    }

    /// Parse a value of this type from a string field.
    fn set_value_from_str(&self, s: &str) -> Result<Value, TypeError>;

    /// Render for the wire protocol.
    fn to_text(&self, value: &Value) -> String;
}

/// Look up the behavior singleton for an attribute kind.
pub fn type_instance(attr_type: AttrType) -> &'static dyn DataType {
    match attr_type {
        AttrType::Ints => &IntType,
        AttrType::Bigints => &BigintType,
        AttrType::Floats => &FloatType,
        AttrType::Dates => &DateType,
        AttrType::Chars => &CharType,
        AttrType::Texts => &TextType,
        AttrType::Booleans => &BooleanType,
        AttrType::Vectors => &VectorType,
        AttrType::Undefined => &UndefinedType,
    }
}

fn expect_same(kind: AttrType, left: &Value, right: &Value) -> Result<(), TypeError> {
    if left.attr_type() != kind || right.attr_type() != kind {
        return Err(TypeError::Mismatch(format!(
            "cannot compare {} with {}",
            left.attr_type(),
            right.attr_type()
        )));
    }
    Ok(())
}

struct IntType;

impl DataType for IntType {
    fn attr_type(&self) -> AttrType {
        AttrType::Ints
    }

    fn compare(&self, left: &Value, right: &Value) -> Result<Ordering, TypeError> {
        expect_same(AttrType::Ints, left, right)?;
        match (left, right) {
            (Value::Int(a), Value::Int(b)) => Ok(a.cmp(b)),
            _ => unreachable!(),
        }
    }

    fn cast_to(&self, value: &Value, to: AttrType) -> Result<Value, TypeError> {
        match (value, to) {
            (Value::Int(v), AttrType::Floats) => Ok(Value::Float(*v as f32)),
            (Value::Int(v), AttrType::Bigints) => Ok(Value::Bigint(*v as i64)),
            _ => Err(TypeError::Unsupported(format!("cast INTS to {to}"))),
        }
    }

    fn cast_cost(&self, to: AttrType) -> i32 {
        match to {
            AttrType::Ints => 0,
            AttrType::Bigints => 1,
            AttrType::Floats => 2,
            _ => i32::MAX,
        }
    }

    fn set_value_from_str(&self, s: &str) -> Result<Value, TypeError> {
        s.parse::<i32>()
            .map(Value::Int)
            .map_err(|_| TypeError::Mismatch(format!("not an integer: {s:?}")))
    }

    fn to_text(&self, value: &Value) -> String {
        match value {
            Value::Int(v) => v.to_string(),
            _ => String::new(),
        }
    }
}

struct BigintType;

impl DataType for BigintType {
    fn attr_type(&self) -> AttrType {
        AttrType::Bigints
    }

    fn compare(&self, left: &Value, right: &Value) -> Result<Ordering, TypeError> {
        expect_same(AttrType::Bigints, left, right)?;
        match (left, right) {
            (Value::Bigint(a), Value::Bigint(b)) => Ok(a.cmp(b)),
            _ => unreachable!(),
        }
    }

    fn cast_to(&self, value: &Value, to: AttrType) -> Result<Value, TypeError> {
        match (value, to) {
            (Value::Bigint(v), AttrType::Floats) => Ok(Value::Float(*v as f32)),
            _ => Err(TypeError::Unsupported(format!("cast BIGINTS to {to}"))),
        }
    }

    fn cast_cost(&self, to: AttrType) -> i32 {
        match to {
            AttrType::Bigints => 0,
            AttrType::Floats => 1,
            _ => i32::MAX,
        }
    }

    fn set_value_from_str(&self, s: &str) -> Result<Value, TypeError> {
        s.parse::<i64>()
            .map(Value::Bigint)
            .map_err(|_| TypeError::Mismatch(format!("not a bigint: {s:?}")))
    }

    fn to_text(&self, value: &Value) -> String {
        match value {
            Value::Bigint(v) => v.to_string(),
            _ => String::new(),
        }
    }
}

struct FloatType;

impl DataType for FloatType {
    fn attr_type(&self) -> AttrType {
        AttrType::Floats
    }

    fn compare(&self, left: &Value, right: &Value) -> Result<Ordering, TypeError> {
        expect_same(AttrType::Floats, left, right)?;
        match (left, right) {
            (Value::Float(a), Value::Float(b)) => Ok(a.total_cmp(b)),
            _ => unreachable!(),
        }
    }

    fn set_value_from_str(&self, s: &str) -> Result<Value, TypeError> {
        s.parse::<f32>()
            .map(Value::Float)
            .map_err(|_| TypeError::Mismatch(format!("not a float: {s:?}")))
    }

    fn to_text(&self, value: &Value) -> String {
        match value {
            Value::Float(v) => format_float(*v),
            _ => String::new(),
        }
    }
}

/// Trailing zeros are trimmed so `1.0` renders as `1`.
fn format_float(v: f32) -> String {
    let text = format!("{v}");
    match text.strip_suffix(".0") {
        Some(trimmed) => trimmed.to_string(),
        None => text,
    }
}

struct DateType;

impl DataType for DateType {
    fn attr_type(&self) -> AttrType {
        AttrType::Dates
    }

    fn compare(&self, left: &Value, right: &Value) -> Result<Ordering, TypeError> {
        expect_same(AttrType::Dates, left, right)?;
        match (left, right) {
            (Value::Date(a), Value::Date(b)) => Ok(a.cmp(b)),
            _ => unreachable!(),
        }
    }

    fn cast_cost(&self, to: AttrType) -> i32 {
        match to {
            AttrType::Dates => 0,
            AttrType::Chars => 0,
            _ => i32::MAX,
        }
    }

    fn cast_to(&self, value: &Value, to: AttrType) -> Result<Value, TypeError> {
        match (value, to) {
            (Value::Date(_), AttrType::Chars) => Ok(Value::Chars(self.to_text(value))),
            _ => Err(TypeError::Unsupported(format!("cast DATES to {to}"))),
        }
    }

    fn set_value_from_str(&self, s: &str) -> Result<Value, TypeError> {
        parse_date(s).map(Value::Date)
    }

    fn to_text(&self, value: &Value) -> String {
        match value {
            Value::Date(v) => {
                let year = v / 10000;
                let month = (v / 100) % 100;
                let day = v % 100;
                format!("{year:04}-{month:02}-{day:02}")
            }
            _ => String::new(),
        }
    }
}

/// Parse `YYYY-MM-DD` into the packed integer form.
pub(crate) fn parse_date(s: &str) -> Result<i32, TypeError> {
    let mut parts = s.trim().splitn(3, '-');
    let (year, month, day) = match (parts.next(), parts.next(), parts.next()) {
        (Some(y), Some(m), Some(d)) => (
            y.parse::<i32>(),
            m.parse::<i32>(),
            d.parse::<i32>(),
        ),
        _ => return Err(TypeError::Invalid(format!("invalid date string: {s:?}"))),
    };
    match (year, month, day) {
        (Ok(y), Ok(m), Ok(d)) => Ok(crate::date_from_parts(y, m, d)),
        _ => Err(TypeError::Invalid(format!("invalid date string: {s:?}"))),
    }
}

struct CharType;

impl DataType for CharType {
    fn attr_type(&self) -> AttrType {
        AttrType::Chars
    }

    fn compare(&self, left: &Value, right: &Value) -> Result<Ordering, TypeError> {
        expect_same(AttrType::Chars, left, right)?;
        match (left, right) {
            (Value::Chars(a), Value::Chars(b)) => Ok(a.cmp(b)),
            _ => unreachable!(),
        }
    }

    fn cast_to(&self, value: &Value, to: AttrType) -> Result<Value, TypeError> {
        let s = match value {
            Value::Chars(s) => s,
            _ => return Err(TypeError::Mismatch("expected CHARS".into())),
        };
        match to {
            AttrType::Dates => parse_date(s).map(Value::Date),
            AttrType::Texts => Ok(Value::Texts(s.clone())),
            AttrType::Ints => IntType.set_value_from_str(s),
            AttrType::Floats => FloatType.set_value_from_str(s),
            _ => Err(TypeError::Unsupported(format!("cast CHARS to {to}"))),
        }
    }

    fn cast_cost(&self, to: AttrType) -> i32 {
        match to {
            AttrType::Chars => 0,
            AttrType::Dates => 0,
            AttrType::Texts => 1,
            AttrType::Ints | AttrType::Floats => 2,
            _ => i32::MAX,
        }
    }

    fn set_value_from_str(&self, s: &str) -> Result<Value, TypeError> {
        Ok(Value::Chars(s.to_string()))
    }

    fn to_text(&self, value: &Value) -> String {
        match value {
            Value::Chars(s) => s.clone(),
            _ => String::new(),
        }
    }
}

struct TextType;

impl DataType for TextType {
    fn attr_type(&self) -> AttrType {
        AttrType::Texts
    }

    fn compare(&self, left: &Value, right: &Value) -> Result<Ordering, TypeError> {
        expect_same(AttrType::Texts, left, right)?;
        match (left, right) {
            (Value::Texts(a), Value::Texts(b)) => Ok(a.cmp(b)),
            _ => unreachable!(),
        }
    }

    fn cast_to(&self, value: &Value, to: AttrType) -> Result<Value, TypeError> {
        let s = match value {
            Value::Texts(s) => s,
            _ => return Err(TypeError::Mismatch("expected TEXTS".into())),
        };
        match to {
            // The promotion table treats this as free; a malformed date still
            // fails at cast time.
            AttrType::Dates => parse_date(s).map(Value::Date),
            AttrType::Chars => Ok(Value::Chars(s.clone())),
            _ => Err(TypeError::Unsupported(format!("cast TEXTS to {to}"))),
        }
    }

    fn cast_cost(&self, to: AttrType) -> i32 {
        match to {
            AttrType::Texts => 0,
            AttrType::Dates => 0,
            AttrType::Chars => 50,
            _ => i32::MAX,
        }
    }

    fn set_value_from_str(&self, s: &str) -> Result<Value, TypeError> {
        Ok(Value::Texts(s.to_string()))
    }

    fn to_text(&self, value: &Value) -> String {
        match value {
            Value::Texts(s) => s.clone(),
            _ => String::new(),
        }
    }
}

struct BooleanType;

impl DataType for BooleanType {
    fn attr_type(&self) -> AttrType {
        AttrType::Booleans
    }

    fn compare(&self, left: &Value, right: &Value) -> Result<Ordering, TypeError> {
        expect_same(AttrType::Booleans, left, right)?;
        match (left, right) {
            (Value::Bool(a), Value::Bool(b)) => Ok(a.cmp(b)),
            _ => unreachable!(),
        }
    }

    fn set_value_from_str(&self, s: &str) -> Result<Value, TypeError> {
        match s.to_ascii_lowercase().as_str() {
            "true" | "1" => Ok(Value::Bool(true)),
            "false" | "0" => Ok(Value::Bool(false)),
            _ => Err(TypeError::Mismatch(format!("not a boolean: {s:?}"))),
        }
    }

    fn to_text(&self, value: &Value) -> String {
        match value {
            Value::Bool(v) => v.to_string(),
            _ => String::new(),
        }
    }
}

struct VectorType;

impl DataType for VectorType {
    fn attr_type(&self) -> AttrType {
        AttrType::Vectors
    }

    fn compare(&self, left: &Value, right: &Value) -> Result<Ordering, TypeError> {
        expect_same(AttrType::Vectors, left, right)?;
        match (left, right) {
            (Value::Vector(a), Value::Vector(b)) => {
                for (x, y) in a.iter().zip(b.iter()) {
                    let ord = x.total_cmp(y);
                    if ord != Ordering::Equal {
                        return Ok(ord);
                    }
                }
                Ok(a.len().cmp(&b.len()))
            }
            _ => unreachable!(),
        }
    }

    fn set_value_from_str(&self, s: &str) -> Result<Value, TypeError> {
        let inner = s.trim().trim_start_matches('[').trim_end_matches(']');
        if inner.trim().is_empty() {
            return Ok(Value::Vector(Vec::new()));
        }
        inner
            .split(',')
            .map(|part| {
                part.trim()
                    .parse::<f32>()
                    .map_err(|_| TypeError::Mismatch(format!("not a vector: {s:?}")))
            })
            .collect::<Result<Vec<_>, _>>()
            .map(Value::Vector)
    }

    fn to_text(&self, value: &Value) -> String {
        match value {
            Value::Vector(v) => {
                let parts: Vec<String> = v.iter().map(|x| format_float(*x)).collect();
                format!("[{}]", parts.join(","))
            }
            _ => String::new(),
        }
    }
}

struct UndefinedType;

impl DataType for UndefinedType {
    fn attr_type(&self) -> AttrType {
        AttrType::Undefined
    }

    fn compare(&self, _left: &Value, _right: &Value) -> Result<Ordering, TypeError> {
        Err(TypeError::Unsupported("compare on UNDEFINED".into()))
    }

    fn set_value_from_str(&self, _s: &str) -> Result<Value, TypeError> {
        Err(TypeError::Unsupported("parse into UNDEFINED".into()))
    }

    fn to_text(&self, _value: &Value) -> String {
        String::new()
    }
}
