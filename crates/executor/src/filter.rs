//! Standalone predicate operator with the same mask-and-compress logic the
//! scan applies; used when a predicate cannot ride on the scan itself.

use crate::PhysicalOperator;
use columnar::{Chunk, ColumnMode};
use common::DbResult;
use expr::Expression;
use types::AttrType;

pub struct FilterVec {
    child: Box<dyn PhysicalOperator>,
    predicates: Vec<Expression>,
    input: Chunk,
    select: Vec<u8>,
}

impl FilterVec {
    pub fn new(child: Box<dyn PhysicalOperator>, predicates: Vec<Expression>) -> Self {
        Self {
            child,
            predicates,
            input: Chunk::new(),
            select: Vec::new(),
        }
    }
}

impl PhysicalOperator for FilterVec {
    fn open(&mut self) -> DbResult<()> {
        self.child.open()
    }

    fn next(&mut self, chunk: &mut Chunk) -> DbResult<bool> {
        self.input.clear();
        if !self.child.next(&mut self.input)? {
            return Ok(false);
        }
        let rows = self.input.rows();
        self.select.clear();
        self.select.resize(rows, 1);
        for predicate in &self.predicates {
            predicate.eval(&self.input, &mut self.select)?;
        }
        let kept = self.select.iter().filter(|&&s| s != 0).count();
        if kept < rows {
            for pos in 0..self.input.column_num() {
                let column = self.input.column_mut(pos);
                if column.attr_type() == AttrType::Undefined
                    || column.mode() == ColumnMode::Constant
                {
                    column.resize(kept)?;
                } else {
                    column.compress(&self.select)?;
                }
            }
        }
        chunk.reset();
        chunk.reference(&self.input)?;
        Ok(true)
    }

    fn close(&mut self) -> DbResult<()> {
        self.child.close()
    }

    fn schema(&self) -> &[String] {
        self.child.schema()
    }
}
