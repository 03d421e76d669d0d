//! Projection: evaluate each output expression over the input chunk.

use crate::PhysicalOperator;
use columnar::{Chunk, Column};
use common::DbResult;
use expr::Expression;

pub struct ProjectVec {
    child: Box<dyn PhysicalOperator>,
    exprs: Vec<Expression>,
    input: Chunk,
    schema: Vec<String>,
}

impl ProjectVec {
    pub fn new(child: Box<dyn PhysicalOperator>, exprs: Vec<Expression>) -> Self {
        let schema = exprs.iter().map(|e| e.name()).collect();
        Self {
            child,
            exprs,
            input: Chunk::new(),
            schema,
        }
    }
}

impl PhysicalOperator for ProjectVec {
    fn open(&mut self) -> DbResult<()> {
        self.child.open()
    }

    fn next(&mut self, chunk: &mut Chunk) -> DbResult<bool> {
        self.input.clear();
        if !self.child.next(&mut self.input)? {
            return Ok(false);
        }
        chunk.clear();
        for (pos, expr) in self.exprs.iter().enumerate() {
            let mut column = Column::default();
            expr.get_column(&self.input, &mut column)?;
            chunk.add_column(column, pos as i32);
        }
        Ok(true)
    }

    fn close(&mut self) -> DbResult<()> {
        self.child.close()
    }

    fn schema(&self) -> &[String] {
        &self.schema
    }
}
