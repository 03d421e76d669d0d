//! A batch of aligned columns flowing between operators.

use crate::column::Column;
use common::DbResult;
use types::Value;

/// Logical id marking a column a scan carries only as a placeholder.
pub const UNUSED_COLUMN_ID: i32 = -1;

/// Ordered collection of `(logical_column_id, Column)` pairs with one shared
/// row count. When a chunk is being piped into a materialized view it also
/// carries the target view name and the source table name; both are empty in
/// ordinary query output.
#[derive(Debug, Default)]
pub struct Chunk {
    columns: Vec<Column>,
    column_ids: Vec<i32>,
    view_name: String,
    source_table: String,
}

impl Chunk {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn add_column(&mut self, column: Column, logical_id: i32) {
        self.columns.push(column);
        self.column_ids.push(logical_id);
    }

    pub fn column_num(&self) -> usize {
        self.columns.len()
    }

    pub fn column(&self, pos: usize) -> &Column {
        &self.columns[pos]
    }

    pub fn column_mut(&mut self, pos: usize) -> &mut Column {
        &mut self.columns[pos]
    }

    pub fn column_ids(&self, pos: usize) -> i32 {
        self.column_ids[pos]
    }

    /// Position of the column carrying the given logical id.
    pub fn position_of(&self, logical_id: i32) -> Option<usize> {
        self.column_ids.iter().position(|&id| id == logical_id)
    }

    /// Row count: the count of column 0, or 0 when empty.
    pub fn rows(&self) -> usize {
        self.columns.first().map(|c| c.count()).unwrap_or(0)
    }

    /// Smallest column capacity.
    pub fn capacity(&self) -> usize {
        self.columns
            .iter()
            .map(|c| c.capacity())
            .min()
            .unwrap_or(0)
    }

    pub fn get_value(&self, pos: usize, row: usize) -> Value {
        self.columns[pos].get_value(row)
    }

    pub fn append_value(&mut self, pos: usize, value: &Value) -> DbResult<()> {
        self.columns[pos].append_value(value)
    }

    /// Truncate every column to zero rows, detaching referenced buffers.
    pub fn reset(&mut self) {
        for column in &mut self.columns {
            column.reset();
        }
    }

    /// Like [`Self::reset`]; referenced columns come back as owned-empty and
    /// any arena bytes are dropped.
    pub fn reset_data(&mut self) {
        for column in &mut self.columns {
            column.reset();
        }
    }

    /// Drop all columns and names.
    pub fn clear(&mut self) {
        self.columns.clear();
        self.column_ids.clear();
        self.view_name.clear();
        self.source_table.clear();
    }

    /// Become a zero-copy alias of another chunk.
    pub fn reference(&mut self, other: &Chunk) -> DbResult<()> {
        self.columns.clear();
        self.column_ids.clear();
        for pos in 0..other.column_num() {
            let mut column = Column::default();
            column.reference(other.column(pos));
            self.columns.push(column);
            self.column_ids.push(other.column_ids(pos));
        }
        self.view_name = other.view_name.clone();
        self.source_table = other.source_table.clone();
        Ok(())
    }

    pub fn set_pipe_names(&mut self, view_name: &str, source_table: &str) {
        self.view_name = view_name.to_string();
        self.source_table = source_table.to_string();
    }

    pub fn view_name(&self) -> &str {
        &self.view_name
    }

    pub fn source_table(&self) -> &str {
        &self.source_table
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use types::AttrType;

    fn int_column(values: &[i32]) -> Column {
        let mut col = Column::new(AttrType::Ints, 4);
        for v in values {
            col.append_value(&Value::Int(*v)).unwrap();
        }
        col
    }

    #[test]
    fn rows_follow_first_column() {
        let mut chunk = Chunk::new();
        assert_eq!(chunk.rows(), 0);
        chunk.add_column(int_column(&[1, 2, 3]), 0);
        chunk.add_column(int_column(&[4, 5, 6]), 1);
        assert_eq!(chunk.rows(), 3);
        assert_eq!(chunk.column_num(), 2);
    }

    #[test]
    fn columns_share_one_count() {
        let mut chunk = Chunk::new();
        chunk.add_column(int_column(&[1, 2]), 0);
        chunk.add_column(int_column(&[3, 4]), 5);
        for pos in 0..chunk.column_num() {
            assert_eq!(chunk.column(pos).count(), chunk.rows());
        }
        assert_eq!(chunk.position_of(5), Some(1));
        assert_eq!(chunk.position_of(9), None);
    }

    #[test]
    fn reset_truncates_everything() {
        let mut chunk = Chunk::new();
        chunk.add_column(int_column(&[1, 2, 3]), 0);
        chunk.reset();
        assert_eq!(chunk.rows(), 0);
        assert_eq!(chunk.column_num(), 1);
    }

    #[test]
    fn reference_aliases_without_copying() {
        let mut source = Chunk::new();
        source.add_column(int_column(&[7, 8]), 0);
        let mut alias = Chunk::new();
        alias.reference(&source).unwrap();
        assert_eq!(alias.rows(), 2);
        assert_eq!(alias.get_value(0, 1), Value::Int(8));
        // Detaching the alias leaves the source untouched.
        alias.reset();
        assert_eq!(alias.rows(), 0);
        assert_eq!(source.rows(), 2);
    }

    #[test]
    fn pipe_names_default_empty() {
        let mut chunk = Chunk::new();
        assert!(chunk.view_name().is_empty());
        chunk.set_pipe_names("hot_items", "orders");
        assert_eq!(chunk.view_name(), "hot_items");
        assert_eq!(chunk.source_table(), "orders");
    }
}
