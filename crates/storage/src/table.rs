//! A table: its schema, its paged heap, and the handles the executor needs.

use crate::{ChunkFileScanner, LobFileHandler, Record, RecordFileHandler};
use buffer::BufferPool;
use catalog::TableMeta;
use columnar::{Chunk, StringT};
use common::{DbError, DbResult, Rid};
use std::path::Path;
use std::sync::Arc;
use types::{AttrType, Value};
use wal::LogHandler;

pub struct Table {
    meta: TableMeta,
    handler: RecordFileHandler,
}

impl Table {
    /// Open (or create) the table's paged file under `data_dir`.
    pub fn open(
        meta: TableMeta,
        data_dir: &Path,
        pool_pages: usize,
        log: Arc<LogHandler>,
        lob: Arc<LobFileHandler>,
    ) -> DbResult<Arc<Self>> {
        let pool = Arc::new(BufferPool::open(
            data_dir.join(format!("{}.data", meta.name)),
            pool_pages,
        )?);
        let handler = RecordFileHandler::open(pool, log, lob, meta.clone())?;
        Ok(Arc::new(Self { meta, handler }))
    }

    pub fn meta(&self) -> &TableMeta {
        &self.meta
    }

    pub fn name(&self) -> &str {
        &self.meta.name
    }

    /// Serialize one row of values into the record byte image, spilling long
    /// text to the lob file.
    pub fn make_record(&self, values: &[Value]) -> DbResult<Vec<u8>> {
        if values.len() < self.meta.field_num() {
            return Err(DbError::FieldMissing(format!(
                "table '{}' expects {} values, got {}",
                self.meta.name,
                self.meta.field_num(),
                values.len()
            )));
        }
        let mut data = vec![0u8; self.meta.record_size()];
        let mut offset = 0usize;
        for (field, value) in self.meta.fields.iter().zip(values) {
            let out = &mut data[offset..offset + field.len];
            encode_field(field.attr_type, field.len, value, out, self.handler.lob())?;
            offset += field.len;
        }
        Ok(data)
    }

    pub fn insert_record(&self, values: &[Value]) -> DbResult<Rid> {
        let record = self.make_record(values)?;
        self.handler.insert_record(&record)
    }

    pub fn insert_chunk(&self, chunk: &Chunk) -> DbResult<()> {
        self.handler.insert_chunk(chunk)
    }

    pub fn delete_record(&self, rid: &Rid) -> DbResult<()> {
        self.handler.delete_record(rid)
    }

    pub fn get_record(&self, rid: &Rid) -> DbResult<Record> {
        self.handler.get_record(rid)
    }

    /// A scanner over this table's pages.
    pub fn chunk_scanner(&self) -> ChunkFileScanner {
        ChunkFileScanner::open(
            self.handler.pool().clone(),
            self.handler.log().clone(),
            self.handler.lob().clone(),
            self.meta.clone(),
        )
    }

    pub fn flush(&self) -> DbResult<()> {
        self.handler.pool().flush_all()
    }
}

fn encode_field(
    attr_type: AttrType,
    len: usize,
    value: &Value,
    out: &mut [u8],
    lob: &Arc<LobFileHandler>,
) -> DbResult<()> {
    match (attr_type, value) {
        (AttrType::Ints, Value::Int(v)) | (AttrType::Dates, Value::Date(v)) => {
            out.copy_from_slice(&v.to_le_bytes());
        }
        (AttrType::Dates, Value::Int(v)) => out.copy_from_slice(&v.to_le_bytes()),
        (AttrType::Bigints, Value::Bigint(v)) => out.copy_from_slice(&v.to_le_bytes()),
        (AttrType::Bigints, Value::Int(v)) => out.copy_from_slice(&(*v as i64).to_le_bytes()),
        (AttrType::Floats, Value::Float(v)) => out.copy_from_slice(&v.to_le_bytes()),
        (AttrType::Booleans, Value::Bool(v)) => out[0] = *v as u8,
        (AttrType::Chars, v) => {
            let s = v.as_str().ok_or_else(|| {
                DbError::FieldTypeMismatch(format!("expected CHARS, got {}", v.attr_type()))
            })?;
            let n = s.len().min(len);
            out[..n].copy_from_slice(&s.as_bytes()[..n]);
        }
        (AttrType::Texts, v) => {
            let s = v.as_str().ok_or_else(|| {
                DbError::FieldTypeMismatch(format!("expected TEXTS, got {}", v.attr_type()))
            })?;
            let bytes = s.as_bytes();
            let desc = if bytes.len() <= columnar::STRING_INLINE_LEN {
                StringT::new_inline(bytes)
            } else {
                let offset = lob.insert_data(bytes)?;
                StringT::new_external(bytes.len(), &bytes[..4], offset)
            };
            out.copy_from_slice(desc.as_bytes());
        }
        (AttrType::Vectors, Value::Vector(vs)) => {
            for (i, v) in vs.iter().enumerate().take(len / 4) {
                out[i * 4..i * 4 + 4].copy_from_slice(&v.to_le_bytes());
            }
        }
        (expected, v) => {
            return Err(DbError::FieldTypeMismatch(format!(
                "expected {}, got {}",
                expected,
                v.attr_type()
            )))
        }
    }
    Ok(())
}
