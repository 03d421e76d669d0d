//! Row-format page handler: records stored whole, one slot each. The
//! minimal contrast to the PAX layout; the loader's row path and row-table
//! scans go through here.

use crate::page_layout::{align8, empty_page_layout, PageHeader, PAGE_HEADER_SIZE};
use crate::{AccessMode, Record};
use buffer::{BufferPool, Frame};
use catalog::TableMeta;
use columnar::Chunk;
use common::{bitmap, DbError, DbResult, PageNum, Rid};
use std::sync::Arc;
use types::AttrType;
use wal::{LogHandler, LogRecord};

pub struct RowPageHandler {
    pool: Arc<BufferPool>,
    log: Arc<LogHandler>,
    attached: Option<(Arc<Frame>, AccessMode)>,
}

impl RowPageHandler {
    pub fn new(pool: Arc<BufferPool>, log: Arc<LogHandler>) -> Self {
        Self {
            pool,
            log,
            attached: None,
        }
    }

    pub fn attach(&mut self, page_num: PageNum, mode: AccessMode) -> DbResult<()> {
        self.detach();
        let frame = self.pool.fetch_page(page_num)?;
        match mode {
            AccessMode::ReadOnly => frame.latch().lock_read(),
            AccessMode::ReadWrite => frame.latch().lock_write(),
        }
        self.attached = Some((frame, mode));
        Ok(())
    }

    pub fn detach(&mut self) {
        if let Some((frame, mode)) = self.attached.take() {
            match mode {
                AccessMode::ReadOnly => frame.latch().unlock_read(),
                AccessMode::ReadWrite => frame.latch().unlock_write(),
            }
            self.pool.unpin_page(&frame);
        }
    }

    fn frame(&self) -> DbResult<&Arc<Frame>> {
        self.attached
            .as_ref()
            .map(|(frame, _)| frame)
            .ok_or_else(|| DbError::Internal("page handler is detached".into()))
    }

    fn writable_frame(&self) -> DbResult<&Arc<Frame>> {
        match &self.attached {
            Some((frame, AccessMode::ReadWrite)) => Ok(frame),
            Some(_) => Err(DbError::Internal(
                "page attached read-only; mutation requires read-write".into(),
            )),
            None => Err(DbError::Internal("page handler is detached".into())),
        }
    }

    pub fn header(&self) -> DbResult<PageHeader> {
        Ok(PageHeader::read(&self.frame()?.data()))
    }

    pub fn is_full(&self) -> DbResult<bool> {
        let header = self.header()?;
        Ok(header.record_num >= header.record_capacity)
    }

    /// Format the attached page empty. Row pages carry no column index.
    pub fn init_empty(&mut self, record_size: usize) -> DbResult<()> {
        let frame = self.writable_frame()?.clone();
        let aligned = align8(record_size);
        let (capacity, col_idx_offset, data_offset) = empty_page_layout(aligned, 0);
        {
            let mut page = frame.data_mut();
            PageHeader {
                record_num: 0,
                column_num: 0,
                record_real_size: record_size as i32,
                record_size: aligned as i32,
                record_capacity: capacity as i32,
                col_idx_offset: col_idx_offset as i32,
                data_offset: data_offset as i32,
            }
            .write(&mut page);
            let bitmap_end = PAGE_HEADER_SIZE + bitmap::bytes_for(capacity);
            page[PAGE_HEADER_SIZE..bitmap_end].fill(0);
        }
        frame.mark_dirty();
        self.log.append(&LogRecord::NewPage {
            page_num: frame.page_num(),
            record_size: record_size as i32,
            column_index: Vec::new(),
        })
    }

    pub fn insert_record(&mut self, data: &[u8]) -> DbResult<Rid> {
        let frame = self.writable_frame()?.clone();
        let rid;
        {
            let mut page = frame.data_mut();
            let mut header = PageHeader::read(&page);
            if header.record_num >= header.record_capacity {
                return Err(DbError::OutOfCapacity);
            }
            let capacity = header.record_capacity as usize;
            let bitmap_end = PAGE_HEADER_SIZE + bitmap::bytes_for(capacity);
            let slot = bitmap::next_clear_bit(&page[PAGE_HEADER_SIZE..bitmap_end], 0, capacity)
                .ok_or(DbError::OutOfCapacity)?;
            bitmap::set_bit(&mut page[PAGE_HEADER_SIZE..bitmap_end], slot);
            header.record_num += 1;
            header.write(&mut page);

            let at = header.data_offset as usize + slot * header.record_size as usize;
            let len = header.record_real_size as usize;
            page[at..at + len].copy_from_slice(&data[..len]);
            rid = Rid::new(frame.page_num(), slot as u32);
        }
        frame.mark_dirty();
        self.log.append(&LogRecord::InsertRecord {
            rid,
            data: data.to_vec(),
        })?;
        Ok(rid)
    }

    pub fn delete_record(&mut self, rid: &Rid) -> DbResult<()> {
        let frame = self.writable_frame()?.clone();
        {
            let mut page = frame.data_mut();
            let mut header = PageHeader::read(&page);
            let capacity = header.record_capacity as usize;
            let slot = rid.slot_num as usize;
            if slot >= capacity {
                return Err(DbError::InvalidRid(*rid));
            }
            let bitmap_end = PAGE_HEADER_SIZE + bitmap::bytes_for(capacity);
            if !bitmap::get_bit(&page[PAGE_HEADER_SIZE..bitmap_end], slot) {
                return Err(DbError::RecordNotExist(*rid));
            }
            bitmap::clear_bit(&mut page[PAGE_HEADER_SIZE..bitmap_end], slot);
            header.record_num -= 1;
            header.write(&mut page);
        }
        frame.mark_dirty();
        self.log.append(&LogRecord::DeleteRecord { rid: *rid })
    }

    pub fn get_record(&self, rid: &Rid) -> DbResult<Record> {
        let frame = self.frame()?;
        let page = frame.data();
        let header = PageHeader::read(&page);
        let capacity = header.record_capacity as usize;
        let slot = rid.slot_num as usize;
        if slot >= capacity {
            return Err(DbError::InvalidRid(*rid));
        }
        let bitmap_end = PAGE_HEADER_SIZE + bitmap::bytes_for(capacity);
        if !bitmap::get_bit(&page[PAGE_HEADER_SIZE..bitmap_end], slot) {
            return Err(DbError::RecordNotExist(*rid));
        }
        let at = header.data_offset as usize + slot * header.record_size as usize;
        let len = header.record_real_size as usize;
        Ok(Record {
            rid: *rid,
            data: page[at..at + len].to_vec(),
        })
    }

    /// Slice occupied records into the chunk's requested columns using the
    /// table's field offsets.
    pub fn get_chunk(&self, chunk: &mut Chunk, meta: &TableMeta) -> DbResult<()> {
        let frame = self.frame()?;
        let page = frame.data();
        let header = PageHeader::read(&page);
        let capacity = header.record_capacity as usize;
        let record_num = header.record_num as usize;
        let bitmap_end = PAGE_HEADER_SIZE + bitmap::bytes_for(capacity);

        for j in 0..chunk.column_num() {
            let col_id = chunk.column_ids(j);
            if col_id < 0 || chunk.column(j).attr_type() == AttrType::Undefined {
                chunk.column_mut(j).resize(record_num)?;
                continue;
            }
            let field = meta.field(col_id as usize);
            let field_at = meta.field_offset(col_id as usize);
            let mut slot = 0usize;
            for _ in 0..record_num {
                slot = match bitmap::next_set_bit(&page[PAGE_HEADER_SIZE..bitmap_end], slot, capacity)
                {
                    Some(s) => s,
                    None => break,
                };
                let at =
                    header.data_offset as usize + slot * header.record_size as usize + field_at;
                chunk
                    .column_mut(j)
                    .append_raw(&page[at..at + field.len])?;
                slot += 1;
            }
        }
        Ok(())
    }
}

impl Drop for RowPageHandler {
    fn drop(&mut self) {
        self.detach();
    }
}
