//! The fused `GROUP BY ... ORDER BY count(*) DESC LIMIT n` operator. Groups
//! drain into a specialized table, a bounded min-heap keyed by count keeps
//! the heaviest `n` entries, and the output materializes once in descending
//! count order.

use crate::hash_specialized::{build_specialized, SpecializedTable};
use crate::PhysicalOperator;
use columnar::{Chunk, Column};
use common::DbResult;
use expr::{AggregateExpr, AggregateKind, Expression};

pub struct TopCountVec {
    child: Box<dyn PhysicalOperator>,
    group_exprs: Vec<Expression>,
    aggregates: Vec<AggregateExpr>,
    n: usize,
    count_pos: usize,
    table: Box<dyn SpecializedTable>,
    output: Chunk,
    emitted: bool,
    schema: Vec<String>,
}

impl TopCountVec {
    /// Returns `None` when the key shape has no specialized table; the
    /// caller falls back to the unfused pipeline.
    pub fn try_new(
        child: Box<dyn PhysicalOperator>,
        group_exprs: Vec<Expression>,
        aggregates: Vec<AggregateExpr>,
        n: usize,
    ) -> DbResult<Option<Self>> {
        let count_pos = match aggregates
            .iter()
            .position(|agg| agg.kind == AggregateKind::Count)
        {
            Some(pos) => pos,
            None => return Ok(None),
        };
        let group_types: Vec<_> = group_exprs.iter().map(|e| e.value_type()).collect();
        let aggr_shapes: Vec<_> = aggregates
            .iter()
            .map(|a| (a.kind, a.child_type()))
            .collect();
        let table = match build_specialized(&group_types, &aggr_shapes)? {
            Some(table) => table,
            None => return Ok(None),
        };

        let mut schema = Vec::new();
        for expr in &group_exprs {
            schema.push(expr.name());
        }
        for agg in &aggregates {
            schema.push(agg.name.clone());
        }
        Ok(Some(Self {
            child,
            group_exprs,
            aggregates,
            n,
            count_pos,
            table,
            output: Chunk::new(),
            emitted: false,
            schema,
        }))
    }
}

impl PhysicalOperator for TopCountVec {
    fn open(&mut self) -> DbResult<()> {
        let table = &mut self.table;
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
                groups.add_column(column, pos as i32);
            }
            let mut aggrs = Chunk::new();
            for (pos, agg) in self.aggregates.iter().enumerate() {
                let mut column = Column::default();
                agg.child.get_column(&chunk, &mut column)?;
                aggrs.add_column(column, pos as i32);
            }
            if groups.rows() > 0 {
                table.add_chunk(&groups, &aggrs)?;
            }
            chunk.reset();
        }

        self.output.clear();
        let width = self.group_exprs.len();
        for (pos, expr) in self.group_exprs.iter().enumerate() {
            self.output.add_column(
                Column::new(expr.value_type(), expr.value_length()),
                pos as i32,
            );
        }
        for (pos, agg) in self.aggregates.iter().enumerate() {
            self.output.add_column(
                Column::new(agg.value_type(), agg.value_length()),
                (width + pos) as i32,
            );
        }
        table.drain_top_n(&mut self.output, self.count_pos, self.n)?;
        self.emitted = false;
        Ok(())
    }

    fn next(&mut self, chunk: &mut Chunk) -> DbResult<bool> {
        if self.emitted || self.output.rows() == 0 {
            return Ok(false);
        }
        self.emitted = true;
        chunk.reset();
        chunk.reference(&self.output)?;
        Ok(true)
    }

    fn close(&mut self) -> DbResult<()> {
        self.child.close()
    }

    fn schema(&self) -> &[String] {
        &self.schema
    }
}
