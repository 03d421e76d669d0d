//! Materialized-view creator: pipes a plan's output chunks into a freshly
//! created PAX base table. The operator itself produces no tuples.

use crate::{PhysicalOperator, SchemaOps};
use columnar::{Chunk, Column, ColumnMode};
use common::DbResult;
use std::sync::Arc;
use types::AttrType;

pub struct CreateMaterializedViewVec {
    schema_ops: Arc<dyn SchemaOps>,
    view_name: String,
    source_table: String,
    child: Box<dyn PhysicalOperator>,
    schema: Vec<String>,
}

impl CreateMaterializedViewVec {
    pub fn new(
        schema_ops: Arc<dyn SchemaOps>,
        view_name: String,
        source_table: String,
        child: Box<dyn PhysicalOperator>,
    ) -> Self {
        Self {
            schema_ops,
            view_name,
            source_table,
            child,
            schema: Vec::new(),
        }
    }
}

impl PhysicalOperator for CreateMaterializedViewVec {
    fn open(&mut self) -> DbResult<()> {
        self.child.open()?;
        let names = self.child.schema().to_vec();

        let mut chunk = Chunk::new();
        let has_rows = self.child.next(&mut chunk)?;

        // Attribute shapes come from the first chunk; an empty result
        // defaults every column to a 4-byte int of the same name.
        let attrs: Vec<(String, AttrType, usize)> = if has_rows {
            names
                .iter()
                .enumerate()
                .map(|(pos, name)| {
                    let column = chunk.column(pos);
                    let attr_type = column.attr_type();
                    let len = match column.attr_len() {
                        0 => attr_type.fixed_len().unwrap_or(4),
                        len => len,
                    };
                    (name.clone(), attr_type, len)
                })
                .collect()
        } else {
            names
                .iter()
                .map(|name| (name.clone(), AttrType::Ints, 4usize))
                .collect()
        };

        let table = self
            .schema_ops
            .create_pax_table(&self.view_name, attrs)?;
        if !has_rows {
            return Ok(());
        }

        loop {
            chunk.set_pipe_names(&self.view_name, &self.source_table);
            let materialized = materialize_constants(&chunk)?;
            table.insert_chunk(&materialized)?;
            chunk.reset();
            if !self.child.next(&mut chunk)? {
                break;
            }
        }
        table.flush()?;
        Ok(())
    }

    fn next(&mut self, _chunk: &mut Chunk) -> DbResult<bool> {
        Ok(false)
    }

    fn close(&mut self) -> DbResult<()> {
        self.child.close()
    }

    fn schema(&self) -> &[String] {
        &self.schema
    }
}

/// The bulk insert copies element runs, which constant columns do not have;
/// expand them into owned buffers first.
fn materialize_constants(chunk: &Chunk) -> DbResult<Chunk> {
    let mut out = Chunk::new();
    for pos in 0..chunk.column_num() {
        let column = chunk.column(pos);
        if column.mode() == ColumnMode::Constant {
            let attr_type = column.attr_type();
            let len = attr_type.fixed_len().unwrap_or(4);
            let mut owned = Column::with_capacity(attr_type, len, column.count().max(1));
            for row in 0..column.count() {
                owned.append_value(&column.get_value(row))?;
            }
            out.add_column(owned, chunk.column_ids(pos));
        } else {
            let mut view = Column::default();
            view.reference(column);
            out.add_column(view, chunk.column_ids(pos));
        }
    }
    out.set_pipe_names(chunk.view_name(), chunk.source_table());
    Ok(out)
}
