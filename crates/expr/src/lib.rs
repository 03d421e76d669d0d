//! Vectorized expressions over chunks: column references, literals,
//! comparisons driving a select mask, arithmetic, and aggregate markers.

pub mod simd;
mod state;
#[cfg(test)]
mod tests;

pub use state::{AggState, AvgState, CountState, SumState};

use columnar::{Chunk, Column};
use common::{DbError, DbResult};
use serde::{Deserialize, Serialize};
use std::cmp::Ordering;
use types::{AttrType, Value};

/// Comparison operators for predicates.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub enum CompOp {
    Eq,
    Ne,
    Lt,
    Le,
    Gt,
    Ge,
}

impl CompOp {
    fn matches(&self, ord: Ordering) -> bool {
        match self {
            CompOp::Eq => ord == Ordering::Equal,
            CompOp::Ne => ord != Ordering::Equal,
            CompOp::Lt => ord == Ordering::Less,
            CompOp::Le => ord != Ordering::Greater,
            CompOp::Gt => ord == Ordering::Greater,
            CompOp::Ge => ord != Ordering::Less,
        }
    }
}

/// Arithmetic operators.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub enum ArithOp {
    Add,
    Sub,
    Mul,
    Div,
}

/// Aggregate function kinds.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub enum AggregateKind {
    Count,
    Sum,
    Avg,
}

impl std::fmt::Display for AggregateKind {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            AggregateKind::Count => write!(f, "count"),
            AggregateKind::Sum => write!(f, "sum"),
            AggregateKind::Avg => write!(f, "avg"),
        }
    }
}

/// A reference to one logical column of the incoming chunk.
#[derive(Clone, Debug)]
pub struct ColumnRefExpr {
    pub column_id: i32,
    pub attr_type: AttrType,
    pub attr_len: usize,
    pub name: String,
}

/// An aggregate over a child expression. `count(*)` carries a literal `1`.
#[derive(Clone, Debug)]
pub struct AggregateExpr {
    pub kind: AggregateKind,
    pub child: Box<Expression>,
    pub name: String,
}

impl AggregateExpr {
    /// The attribute kind of the accumulated input.
    pub fn child_type(&self) -> AttrType {
        self.child.value_type()
    }

    /// The attribute kind of the finalized output.
    pub fn value_type(&self) -> AttrType {
        match self.kind {
            AggregateKind::Count => AttrType::Bigints,
            AggregateKind::Sum => self.child.value_type(),
            AggregateKind::Avg => AttrType::Floats,
        }
    }

    pub fn value_length(&self) -> usize {
        match self.kind {
            AggregateKind::Count => 8,
            AggregateKind::Sum => self.child.value_length(),
            AggregateKind::Avg => 4,
        }
    }
}

#[derive(Clone, Debug)]
pub enum Expression {
    ColumnRef(ColumnRefExpr),
    Literal(Value),
    Comparison {
        op: CompOp,
        left: Box<Expression>,
        right: Box<Expression>,
    },
    Arithmetic {
        op: ArithOp,
        left: Box<Expression>,
        right: Box<Expression>,
    },
    Aggregate(AggregateExpr),
}

impl Expression {
    pub fn column_ref(column_id: i32, attr_type: AttrType, attr_len: usize, name: &str) -> Self {
        Expression::ColumnRef(ColumnRefExpr {
            column_id,
            attr_type,
            attr_len,
            name: name.to_string(),
        })
    }

    pub fn value_type(&self) -> AttrType {
        match self {
            Expression::ColumnRef(c) => c.attr_type,
            Expression::Literal(v) => v.attr_type(),
            Expression::Comparison { .. } => AttrType::Booleans,
            Expression::Arithmetic { left, right, .. } => {
                widen(left.value_type(), right.value_type())
            }
            Expression::Aggregate(a) => a.value_type(),
        }
    }

    pub fn value_length(&self) -> usize {
        match self {
            Expression::ColumnRef(c) => c.attr_len,
            Expression::Literal(v) => match v {
                Value::Chars(s) | Value::Texts(s) => s.len().max(1),
                _ => v.attr_type().fixed_len().unwrap_or(4),
            },
            Expression::Comparison { .. } => 1,
            Expression::Arithmetic { .. } => self.value_type().fixed_len().unwrap_or(4),
            Expression::Aggregate(a) => a.value_length(),
        }
    }

    /// Header name for projected output.
    pub fn name(&self) -> String {
        match self {
            Expression::ColumnRef(c) => c.name.clone(),
            Expression::Literal(v) => v.to_string(),
            Expression::Comparison { .. } => "?".to_string(),
            Expression::Arithmetic { left, op, right } => {
                let symbol = match op {
                    ArithOp::Add => "+",
                    ArithOp::Sub => "-",
                    ArithOp::Mul => "*",
                    ArithOp::Div => "/",
                };
                format!("{}{}{}", left.name(), symbol, right.name())
            }
            Expression::Aggregate(a) => a.name.clone(),
        }
    }

    /// Materialize this expression over the chunk into `out`. Column
    /// references become zero-copy views; literals become constant columns.
    pub fn get_column(&self, chunk: &Chunk, out: &mut Column) -> DbResult<()> {
        match self {
            Expression::ColumnRef(c) => {
                let pos = chunk.position_of(c.column_id).ok_or_else(|| {
                    DbError::FieldMissing(format!("column '{}' not in chunk", c.name))
                })?;
                out.reference(chunk.column(pos));
                Ok(())
            }
            Expression::Literal(v) => {
                *out = Column::new_constant(v.clone(), chunk.rows());
                Ok(())
            }
            Expression::Arithmetic { op, left, right } => {
                let rows = chunk.rows();
                let mut lcol = Column::default();
                let mut rcol = Column::default();
                left.get_column(chunk, &mut lcol)?;
                right.get_column(chunk, &mut rcol)?;
                let out_type = self.value_type();
                *out = Column::with_capacity(
                    out_type,
                    out_type.fixed_len().unwrap_or(4),
                    rows.max(1),
                );
                for row in 0..rows {
                    let l = lcol.get_value(row);
                    let r = rcol.get_value(row);
                    let v = match op {
                        ArithOp::Add => l.add(&r),
                        ArithOp::Sub => l.subtract(&r),
                        ArithOp::Mul => l.multiply(&r),
                        ArithOp::Div => l.divide(&r),
                    }?;
                    out.append_value(&v.cast_to(out_type)?)?;
                }
                Ok(())
            }
            Expression::Comparison { .. } => {
                let rows = chunk.rows();
                let mut select = vec![1u8; rows];
                self.eval(chunk, &mut select)?;
                *out = Column::with_capacity(AttrType::Booleans, 1, rows.max(1));
                for flag in &select {
                    out.append_value(&Value::Bool(*flag != 0))?;
                }
                Ok(())
            }
            Expression::Aggregate(_) => Err(DbError::Internal(
                "aggregate expressions are materialized by the group operator".into(),
            )),
        }
    }

    /// Evaluate a predicate, clearing mask bytes for rows where it does not
    /// hold. Predicates AND together by sharing one mask.
    pub fn eval(&self, chunk: &Chunk, select: &mut [u8]) -> DbResult<()> {
        let (op, left, right) = match self {
            Expression::Comparison { op, left, right } => (*op, left, right),
            _ => {
                return Err(DbError::Unimplemented(
                    "only comparisons drive the select mask".into(),
                ))
            }
        };
        let mut lcol = Column::default();
        let mut rcol = Column::default();
        left.get_column(chunk, &mut lcol)?;
        right.get_column(chunk, &mut rcol)?;
        for (row, flag) in select.iter_mut().enumerate() {
            if *flag == 0 {
                continue;
            }
            let l = lcol.get_value(row);
            let r = rcol.get_value(row);
            let ord = l.compare(&r).ok_or_else(|| {
                DbError::InvalidArgument(format!(
                    "cannot compare {} with {}",
                    l.attr_type(),
                    r.attr_type()
                ))
            })?;
            if !op.matches(ord) {
                *flag = 0;
            }
        }
        Ok(())
    }
}

/// Numeric widening for arithmetic results.
fn widen(left: AttrType, right: AttrType) -> AttrType {
    use AttrType::*;
    match (left, right) {
        (Floats, _) | (_, Floats) => Floats,
        (Bigints, _) | (_, Bigints) => Bigints,
        _ => Ints,
    }
}
