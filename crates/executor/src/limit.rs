//! Limit: forward at most `n` rows, truncating the last chunk in place.

use crate::PhysicalOperator;
use columnar::Chunk;
use common::DbResult;

pub struct LimitVec {
    child: Box<dyn PhysicalOperator>,
    remaining: usize,
}

impl LimitVec {
    pub fn new(child: Box<dyn PhysicalOperator>, n: usize) -> Self {
        Self {
            child,
            remaining: n,
        }
    }
}

impl PhysicalOperator for LimitVec {
    fn open(&mut self) -> DbResult<()> {
        self.child.open()
    }

    fn next(&mut self, chunk: &mut Chunk) -> DbResult<bool> {
        if self.remaining == 0 {
            return Ok(false);
        }
        if !self.child.next(chunk)? {
            return Ok(false);
        }
        let rows = chunk.rows();
        if self.remaining >= rows {
            self.remaining -= rows;
            return Ok(true);
        }
        for pos in 0..chunk.column_num() {
            chunk.column_mut(pos).resize(self.remaining)?;
        }
        self.remaining = 0;
        Ok(true)
    }

    fn close(&mut self) -> DbResult<()> {
        self.child.close()
    }

    fn schema(&self) -> &[String] {
        self.child.schema()
    }
}
