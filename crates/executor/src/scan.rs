//! Vectorized table scan with pushed-down predicates.

use crate::PhysicalOperator;
use columnar::{Chunk, Column, ColumnMode, UNUSED_COLUMN_ID};
use common::DbResult;
use expr::Expression;
use std::sync::Arc;
use storage::{ChunkFileScanner, Table};
use types::AttrType;

pub struct TableScanVec {
    table: Arc<Table>,
    field_ids: Vec<usize>,
    predicates: Vec<Expression>,
    scanner: Option<ChunkFileScanner>,
    all_columns: Chunk,
    select: Vec<u8>,
    schema: Vec<String>,
}

impl TableScanVec {
    /// `field_ids` selects the attributes actually read; the rest stay as
    /// placeholders so positions line up with the table layout.
    pub fn new(table: Arc<Table>, field_ids: Vec<usize>, predicates: Vec<Expression>) -> Self {
        let schema = table.meta().fields.iter().map(|f| f.name.clone()).collect();
        Self {
            table,
            field_ids,
            predicates,
            scanner: None,
            all_columns: Chunk::new(),
            select: Vec::new(),
            schema,
        }
    }
}

impl PhysicalOperator for TableScanVec {
    fn open(&mut self) -> DbResult<()> {
        self.scanner = Some(self.table.chunk_scanner());
        self.all_columns.clear();
        for field in &self.table.meta().fields {
            if self.field_ids.contains(&field.field_id) {
                self.all_columns.add_column(
                    Column::new(field.attr_type, field.len),
                    field.field_id as i32,
                );
            } else {
                self.all_columns
                    .add_column(Column::default(), UNUSED_COLUMN_ID);
            }
        }
        Ok(())
    }

    fn next(&mut self, chunk: &mut Chunk) -> DbResult<bool> {
        let scanner = match self.scanner.as_mut() {
            Some(scanner) => scanner,
            None => return Ok(false),
        };
        self.all_columns.reset_data();
        if !scanner.next_chunk(&mut self.all_columns)? {
            return Ok(false);
        }

        let rows = self.all_columns.rows();
        self.select.clear();
        self.select.resize(rows, 1);
        for predicate in &self.predicates {
            predicate.eval(&self.all_columns, &mut self.select)?;
        }

        let kept = self.select.iter().filter(|&&s| s != 0).count();
        if kept < rows {
            for pos in 0..self.all_columns.column_num() {
                let column = self.all_columns.column_mut(pos);
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
        chunk.reference(&self.all_columns)?;
        Ok(true)
    }

    fn close(&mut self) -> DbResult<()> {
        if let Some(mut scanner) = self.scanner.take() {
            scanner.close_scan();
        }
        Ok(())
    }

    fn schema(&self) -> &[String] {
        &self.schema
    }
}
