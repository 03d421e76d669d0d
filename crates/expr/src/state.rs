//! Aggregate accumulators: one state per group per aggregate, with scalar
//! and columnar update paths and a finalize step that appends into an
//! output column.

use crate::simd;
use crate::AggregateKind;
use columnar::Column;
use common::{DbError, DbResult};
use types::{AttrType, Value};

#[derive(Clone, Copy, Debug, Default, PartialEq)]
pub struct SumState<T> {
    pub value: T,
}

#[derive(Clone, Copy, Debug, Default, PartialEq, Eq)]
pub struct CountState {
    pub value: i64,
}

#[derive(Clone, Copy, Debug, Default, PartialEq)]
pub struct AvgState<T> {
    pub value: T,
    pub count: i64,
}

/// Tagged accumulator selected by `(kind, child type)`.
#[derive(Clone, Debug, PartialEq)]
pub enum AggState {
    SumInt(SumState<i32>),
    SumBigint(SumState<i64>),
    SumFloat(SumState<f32>),
    Count(CountState),
    AvgInt(AvgState<i32>),
    AvgBigint(AvgState<i64>),
    AvgFloat(AvgState<f32>),
}

impl AggState {
    pub fn create(kind: AggregateKind, child_type: AttrType) -> DbResult<Self> {
        match (kind, child_type) {
            (AggregateKind::Count, _) => Ok(AggState::Count(CountState::default())),
            (AggregateKind::Sum, AttrType::Ints) => Ok(AggState::SumInt(SumState::default())),
            (AggregateKind::Sum, AttrType::Bigints) => {
                Ok(AggState::SumBigint(SumState::default()))
            }
            (AggregateKind::Sum, AttrType::Floats) => Ok(AggState::SumFloat(SumState::default())),
            (AggregateKind::Avg, AttrType::Ints) => Ok(AggState::AvgInt(AvgState::default())),
            (AggregateKind::Avg, AttrType::Bigints) => {
                Ok(AggState::AvgBigint(AvgState::default()))
            }
            (AggregateKind::Avg, AttrType::Floats) => Ok(AggState::AvgFloat(AvgState::default())),
            (kind, child_type) => Err(DbError::Unimplemented(format!(
                "aggregate {kind} over {child_type}"
            ))),
        }
    }

    /// Fold one scalar in.
    pub fn update_value(&mut self, value: &Value) -> DbResult<()> {
        match self {
            AggState::Count(state) => {
                state.value += 1;
                Ok(())
            }
            AggState::SumInt(state) => {
                let v = value.as_int().ok_or_else(|| type_mismatch(value))?;
                state.value = state.value.wrapping_add(v);
                Ok(())
            }
            AggState::SumBigint(state) => {
                let v = value.as_bigint().ok_or_else(|| type_mismatch(value))?;
                state.value = state.value.wrapping_add(v);
                Ok(())
            }
            AggState::SumFloat(state) => {
                let v = value.as_float().ok_or_else(|| type_mismatch(value))?;
                state.value += v;
                Ok(())
            }
            AggState::AvgInt(state) => {
                let v = value.as_int().ok_or_else(|| type_mismatch(value))?;
                state.value = state.value.wrapping_add(v);
                state.count += 1;
                Ok(())
            }
            AggState::AvgBigint(state) => {
                let v = value.as_bigint().ok_or_else(|| type_mismatch(value))?;
                state.value = state.value.wrapping_add(v);
                state.count += 1;
                Ok(())
            }
            AggState::AvgFloat(state) => {
                let v = value.as_float().ok_or_else(|| type_mismatch(value))?;
                state.value += v;
                state.count += 1;
                Ok(())
            }
        }
    }

    /// Fold a whole column in; integer kinds go through the lane
    /// accumulators.
    pub fn update_column(&mut self, column: &Column) -> DbResult<()> {
        match self {
            AggState::Count(state) => {
                state.value += column.count() as i64;
                Ok(())
            }
            AggState::SumInt(state) => {
                state.value = state.value.wrapping_add(simd::sum_i32(&column.collect_i32()));
                Ok(())
            }
            AggState::SumBigint(state) => {
                state.value = state.value.wrapping_add(simd::sum_i64(&column.collect_i64()));
                Ok(())
            }
            AggState::SumFloat(state) => {
                state.value += simd::sum_f32(&column.collect_f32());
                Ok(())
            }
            AggState::AvgInt(state) => {
                state.value = state.value.wrapping_add(simd::sum_i32(&column.collect_i32()));
                state.count += column.count() as i64;
                Ok(())
            }
            AggState::AvgBigint(state) => {
                state.value = state.value.wrapping_add(simd::sum_i64(&column.collect_i64()));
                state.count += column.count() as i64;
                Ok(())
            }
            AggState::AvgFloat(state) => {
                state.value += simd::sum_f32(&column.collect_f32());
                state.count += column.count() as i64;
                Ok(())
            }
        }
    }

    /// Append the finalized value: the sum, the count, or `value / count`
    /// as float for averages.
    pub fn finalize_into(&self, column: &mut Column) -> DbResult<()> {
        match self {
            AggState::SumInt(state) => column.append_value(&Value::Int(state.value)),
            AggState::SumBigint(state) => column.append_value(&Value::Bigint(state.value)),
            AggState::SumFloat(state) => column.append_value(&Value::Float(state.value)),
            AggState::Count(state) => column.append_value(&Value::Bigint(state.value)),
            AggState::AvgInt(state) => column.append_value(&Value::Float(avg(
                state.value as f32,
                state.count,
            ))),
            AggState::AvgBigint(state) => column.append_value(&Value::Float(avg(
                state.value as f32,
                state.count,
            ))),
            AggState::AvgFloat(state) => {
                column.append_value(&Value::Float(avg(state.value, state.count)))
            }
        }
    }

    /// The accumulated count when this is a count state.
    pub fn count_value(&self) -> i64 {
        match self {
            AggState::Count(state) => state.value,
            _ => 0,
        }
    }
}

fn avg(sum: f32, count: i64) -> f32 {
    if count == 0 {
        0.0
    } else {
        sum / count as f32
    }
}

fn type_mismatch(value: &Value) -> DbError {
    DbError::FieldTypeMismatch(format!(
        "aggregate input of type {}",
        value.attr_type()
    ))
}
