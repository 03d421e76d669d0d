//! Vectorized group-by. Construction picks the cheapest table for the key
//! and aggregate shape, first match wins:
//!
//! 1. one `int` key (or chars of width <= 4, re-encoded) + one sum -> the
//!    linear-probing table;
//! 2. the shapes the specialized multi-key tables cover;
//! 3. anything else -> the standard value-keyed table.

use crate::hash_linear::LinearProbingAggTable;
use crate::hash_specialized::{build_specialized, SpecializedTable};
use crate::hash_standard::StandardAggregateHashTable;
use crate::PhysicalOperator;
use columnar::{Chunk, Column};
use common::DbResult;
use expr::{AggregateExpr, AggregateKind, Expression};
use types::AttrType;

enum GroupTable {
    LinearInt(LinearProbingAggTable<i32>),
    LinearBigint(LinearProbingAggTable<i64>),
    LinearFloat(LinearProbingAggTable<f32>),
    Specialized(Box<dyn SpecializedTable>),
    Standard(StandardAggregateHashTable),
}

impl GroupTable {
    fn add_chunk(&mut self, groups: &Chunk, aggrs: &Chunk) -> DbResult<()> {
        match self {
            GroupTable::LinearInt(t) => t.add_chunk(groups, aggrs),
            GroupTable::LinearBigint(t) => t.add_chunk(groups, aggrs),
            GroupTable::LinearFloat(t) => t.add_chunk(groups, aggrs),
            GroupTable::Specialized(t) => t.add_chunk(groups, aggrs),
            GroupTable::Standard(t) => t.add_chunk(groups, aggrs),
        }
    }

    fn open_scan(&mut self) {
        match self {
            GroupTable::LinearInt(t) => t.open_scan(),
            GroupTable::LinearBigint(t) => t.open_scan(),
            GroupTable::LinearFloat(t) => t.open_scan(),
            GroupTable::Specialized(_) => {}
            GroupTable::Standard(t) => t.open_scan(),
        }
    }

    fn scan_next(&mut self, output: &mut Chunk) -> DbResult<bool> {
        match self {
            GroupTable::LinearInt(t) => t.scan_next(output),
            GroupTable::LinearBigint(t) => t.scan_next(output),
            GroupTable::LinearFloat(t) => t.scan_next(output),
            GroupTable::Specialized(t) => t.scan_next(output),
            GroupTable::Standard(t) => t.scan_next(output),
        }
    }
}

pub struct GroupByVec {
    child: Box<dyn PhysicalOperator>,
    group_exprs: Vec<Expression>,
    aggregates: Vec<AggregateExpr>,
    table: GroupTable,
    need_encode: bool,
    /// `(attr type, width)` per output column, group keys first.
    output_layout: Vec<(AttrType, usize)>,
    schema: Vec<String>,
}

impl GroupByVec {
    pub fn new(
        child: Box<dyn PhysicalOperator>,
        group_exprs: Vec<Expression>,
        aggregates: Vec<AggregateExpr>,
    ) -> DbResult<Self> {
        let (table, need_encode) = choose_table(&group_exprs, &aggregates)?;
        let mut output_layout = Vec::new();
        let mut schema = Vec::new();
        for expr in &group_exprs {
            output_layout.push((expr.value_type(), expr.value_length()));
            schema.push(expr.name());
        }
        for agg in &aggregates {
            output_layout.push((agg.value_type(), agg.value_length()));
            schema.push(agg.name.clone());
        }
        Ok(Self {
            child,
            group_exprs,
            aggregates,
            table,
            need_encode,
            output_layout,
            schema,
        })
    }
}

fn choose_table(
    group_exprs: &[Expression],
    aggregates: &[AggregateExpr],
) -> DbResult<(GroupTable, bool)> {
    if group_exprs.len() == 1 && aggregates.len() == 1 {
        let key = &group_exprs[0];
        let agg = &aggregates[0];
        let int_like = key.value_type() == AttrType::Ints
            || (key.value_type() == AttrType::Chars && key.value_length() <= 4);
        if agg.kind == AggregateKind::Sum && int_like {
            let need_encode = key.value_type() == AttrType::Chars;
            let table = match agg.child_type() {
                AttrType::Ints => GroupTable::LinearInt(LinearProbingAggTable::new()),
                AttrType::Bigints => GroupTable::LinearBigint(LinearProbingAggTable::new()),
                AttrType::Floats => GroupTable::LinearFloat(LinearProbingAggTable::new()),
                _ => GroupTable::Standard(standard_table(aggregates)),
            };
            // Only the probing variants understand encoded keys.
            let need_encode = need_encode && !matches!(table, GroupTable::Standard(_));
            return Ok((table, need_encode));
        }
    }

    let group_types: Vec<AttrType> = group_exprs.iter().map(|e| e.value_type()).collect();
    let aggr_shapes: Vec<(AggregateKind, AttrType)> = aggregates
        .iter()
        .map(|a| (a.kind, a.child_type()))
        .collect();
    if let Some(table) = build_specialized(&group_types, &aggr_shapes)? {
        return Ok((GroupTable::Specialized(table), false));
    }
    Ok((GroupTable::Standard(standard_table(aggregates)), false))
}

fn standard_table(aggregates: &[AggregateExpr]) -> StandardAggregateHashTable {
    StandardAggregateHashTable::new(
        aggregates.iter().map(|a| a.kind).collect(),
        aggregates.iter().map(|a| a.child_type()).collect(),
    )
}

/// Pack char keys of width <= 4 into the low bytes of an `int` column.
fn encode_chars(column: &Column) -> DbResult<Column> {
    let mut encoded = Column::with_capacity(AttrType::Ints, 4, column.count().max(1));
    for row in 0..column.count() {
        let raw = column.element(row);
        let mut packed = [0u8; 4];
        packed[..raw.len().min(4)].copy_from_slice(&raw[..raw.len().min(4)]);
        encoded.append_raw(&packed)?;
    }
    Ok(encoded)
}

impl PhysicalOperator for GroupByVec {
    fn open(&mut self) -> DbResult<()> {
        self.child.open()?;
        let mut chunk = Chunk::new();
        while self.child.next(&mut chunk)? {
            if chunk.rows() == 0 {
                continue;
            }
            let mut groups = Chunk::new();
            for (pos, expr) in self.group_exprs.iter().enumerate() {
                let mut column = Column::default();
                expr.get_column(&chunk, &mut column)?;
                if self.need_encode {
                    column = encode_chars(&column)?;
                }
                groups.add_column(column, pos as i32);
            }
            let mut aggrs = Chunk::new();
            for (pos, agg) in self.aggregates.iter().enumerate() {
                let mut column = Column::default();
                agg.child.get_column(&chunk, &mut column)?;
                aggrs.add_column(column, pos as i32);
            }
            self.table.add_chunk(&groups, &aggrs)?;
            chunk.reset();
        }
        self.table.open_scan();
        Ok(())
    }

    fn next(&mut self, chunk: &mut Chunk) -> DbResult<bool> {
        chunk.clear();
        for (pos, (attr_type, attr_len)) in self.output_layout.iter().enumerate() {
            let attr_len = if self.need_encode && pos == 0 {
                4
            } else {
                *attr_len
            };
            let attr_type = if self.need_encode && pos == 0 {
                AttrType::Ints
            } else {
                *attr_type
            };
            chunk.add_column(Column::new(attr_type, attr_len), pos as i32);
        }
        let produced = self.table.scan_next(chunk)?;
        if self.need_encode {
            // The keys travelled as ints; the payload bytes are the chars.
            chunk.column_mut(0).set_attr_type(AttrType::Chars);
        }
        Ok(produced && chunk.rows() > 0)
    }

    fn close(&mut self) -> DbResult<()> {
        self.child.close()
    }

    fn schema(&self) -> &[String] {
        &self.schema
    }
}
