//! PAX page handler: one page holding records split into per-column runs.
//!
//! A handler instance moves `detached -> attached(ro|rw) -> detached`.
//! Attaching pins the frame and takes the page latch for the whole scope;
//! every mutating operation requires read-write mode.

use crate::page_layout::{align8, empty_page_layout, PageHeader, PAGE_HEADER_SIZE};
use crate::{AccessMode, LobFileHandler, Record};
use buffer::{BufferPool, Frame};
use catalog::TableMeta;
use columnar::{Chunk, StringT, STRING_T_LEN};
use common::{bitmap, DbError, DbResult, PageNum, Rid};
use std::sync::Arc;
use types::AttrType;
use wal::{LogHandler, LogRecord};

pub struct PaxPageHandler {
    pool: Arc<BufferPool>,
    log: Arc<LogHandler>,
    lob: Arc<LobFileHandler>,
    attached: Option<(Arc<Frame>, AccessMode)>,
}

impl PaxPageHandler {
    pub fn new(pool: Arc<BufferPool>, log: Arc<LogHandler>, lob: Arc<LobFileHandler>) -> Self {
        Self {
            pool,
            log,
            lob,
            attached: None,
        }
    }

    /// Pin the page and take its latch. An already-attached handler detaches
    /// first.
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

    /// Release the latch and unpin the frame.
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

    pub fn page_num(&self) -> DbResult<PageNum> {
        Ok(self.frame()?.page_num())
    }

    pub fn header(&self) -> DbResult<PageHeader> {
        Ok(PageHeader::read(&self.frame()?.data()))
    }

    pub fn is_full(&self) -> DbResult<bool> {
        let header = self.header()?;
        Ok(header.record_num >= header.record_capacity)
    }

    pub fn is_empty(&self) -> DbResult<bool> {
        Ok(self.header()?.record_num == 0)
    }

    /// Format the attached page as an empty PAX page for `table_meta`,
    /// computing capacity from the aligned record size and writing the
    /// column-offset index.
    pub fn init_empty(&mut self, record_size: usize, table_meta: &TableMeta) -> DbResult<()> {
        let frame = self.writable_frame()?.clone();
        let column_num = table_meta.field_num();
        let aligned = align8(record_size);
        let (capacity, col_idx_offset, data_offset) = empty_page_layout(aligned, column_num);

        let mut column_index = Vec::with_capacity(column_num);
        let mut running = 0i32;
        for field in &table_meta.fields {
            running += (field.len * capacity) as i32;
            column_index.push(running);
        }

        {
            let mut page = frame.data_mut();
            let header = PageHeader {
                record_num: 0,
                column_num: column_num as i32,
                record_real_size: record_size as i32,
                record_size: aligned as i32,
                record_capacity: capacity as i32,
                col_idx_offset: col_idx_offset as i32,
                data_offset: data_offset as i32,
            };
            header.write(&mut page);
            let bitmap_end = PAGE_HEADER_SIZE + bitmap::bytes_for(capacity);
            page[PAGE_HEADER_SIZE..bitmap_end].fill(0);
            for (i, end) in column_index.iter().enumerate() {
                let at = col_idx_offset + i * 4;
                page[at..at + 4].copy_from_slice(&end.to_le_bytes());
            }
        }
        frame.mark_dirty();

        self.log.append(&LogRecord::NewPage {
            page_num: frame.page_num(),
            record_size: record_size as i32,
            column_index,
        })
    }

    /// Insert one row-major record, splitting it across the column runs.
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

            let mut record_offset = 0usize;
            for col in 0..header.column_num as usize {
                let len = field_len(&page, &header, col);
                let at = field_offset(&page, &header, slot, col);
                page[at..at + len].copy_from_slice(&data[record_offset..record_offset + len]);
                record_offset += len;
            }
            rid = Rid::new(frame.page_num(), slot as u32);
        }
        frame.mark_dirty();
        self.log.append(&LogRecord::InsertRecord {
            rid,
            data: data.to_vec(),
        })?;
        Ok(rid)
    }

    /// Bulk insert of a chunk's rows starting at `start_row`, filling slots
    /// from bit 0. The page must be freshly formatted. Non-inline text
    /// descriptors are flushed to the lob file and rewritten with their
    /// external offset before landing on the page. Returns rows inserted;
    /// the caller continues on a fresh page while rows remain.
    pub fn insert_chunk(&mut self, chunk: &Chunk, start_row: usize) -> DbResult<usize> {
        let frame = self.writable_frame()?.clone();
        let insert_rows;
        {
            let mut page = frame.data_mut();
            let mut header = PageHeader::read(&page);
            let capacity = header.record_capacity as usize;
            let rows_left = capacity - header.record_num as usize;
            insert_rows = (chunk.rows() - start_row).min(rows_left);

            let bitmap_end = PAGE_HEADER_SIZE + bitmap::bytes_for(capacity);
            bitmap::set_first_n(&mut page[PAGE_HEADER_SIZE..bitmap_end], insert_rows);
            header.record_num = insert_rows as i32;
            header.write(&mut page);

            for j in 0..chunk.column_num() {
                let column = chunk.column(j);
                let col = chunk.column_ids(j) as usize;
                let len = field_len(&page, &header, col);
                if column.attr_type() == AttrType::Texts && column.has_arena_data() {
                    for row in start_row..start_row + insert_rows {
                        let mut desc = column.string_t_at(row);
                        if !desc.is_inlined() {
                            let bytes = column.text_payload(&desc).to_vec();
                            let offset = self.lob.insert_data(&bytes)?;
                            desc.set_offset(offset);
                        }
                        let at = field_offset(&page, &header, row - start_row, col);
                        page[at..at + STRING_T_LEN].copy_from_slice(desc.as_bytes());
                    }
                } else {
                    let src = column.element_range(start_row, insert_rows);
                    let at = field_offset(&page, &header, 0, col);
                    page[at..at + insert_rows * len].copy_from_slice(src);
                }
            }
        }
        frame.mark_dirty();
        Ok(insert_rows)
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

    /// Reassemble one record from its column runs.
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
        let mut data = vec![0u8; header.record_real_size as usize];
        let mut record_offset = 0usize;
        for col in 0..header.column_num as usize {
            let len = field_len(&page, &header, col);
            let at = field_offset(&page, &header, slot, col);
            data[record_offset..record_offset + len].copy_from_slice(&page[at..at + len]);
            record_offset += len;
        }
        Ok(Record { rid: *rid, data })
    }

    /// Append this page's rows into the chunk's requested columns. Fully
    /// packed fixed-width columns are copied as one run; otherwise elements
    /// are appended per set bit, materializing spilled text from the lob
    /// file into the chunk's arena.
    pub fn get_chunk(&self, chunk: &mut Chunk) -> DbResult<()> {
        let frame = self.frame()?;
        let page = frame.data();
        let header = PageHeader::read(&page);
        let capacity = header.record_capacity as usize;
        let record_num = header.record_num as usize;
        let bitmap_end = PAGE_HEADER_SIZE + bitmap::bytes_for(capacity);
        let fulfilled = record_num == capacity;

        for j in 0..chunk.column_num() {
            let col_id = chunk.column_ids(j);
            if col_id < 0 || chunk.column(j).attr_type() == AttrType::Undefined {
                chunk.column_mut(j).resize(record_num)?;
                continue;
            }
            let col = col_id as usize;
            let len = field_len(&page, &header, col);
            let is_text = chunk.column(j).attr_type() == AttrType::Texts;
            if fulfilled && !is_text {
                let at = field_offset(&page, &header, 0, col);
                chunk
                    .column_mut(j)
                    .append_slice(&page[at..at + record_num * len], record_num)?;
                continue;
            }
            let mut slot = 0usize;
            for _ in 0..record_num {
                slot = match bitmap::next_set_bit(&page[PAGE_HEADER_SIZE..bitmap_end], slot, capacity)
                {
                    Some(s) => s,
                    None => break,
                };
                let at = field_offset(&page, &header, slot, col);
                if is_text {
                    let desc = StringT::from_bytes(&page[at..at + STRING_T_LEN]);
                    if desc.is_inlined() {
                        chunk.column_mut(j).append_raw(desc.as_bytes())?;
                    } else {
                        let bytes = self.lob.get_data(desc.offset(), desc.size())?;
                        let column = chunk.column_mut(j);
                        let local = column.add_text(&bytes)?;
                        column.append_raw(local.as_bytes())?;
                    }
                } else {
                    chunk.column_mut(j).append_raw(&page[at..at + len])?;
                }
                slot += 1;
            }
        }
        Ok(())
    }
}

impl Drop for PaxPageHandler {
    fn drop(&mut self) {
        self.detach();
    }
}

/// End offset of column `i` relative to the data area.
fn col_index(page: &[u8], header: &PageHeader, i: usize) -> usize {
    let at = header.col_idx_offset as usize + i * 4;
    let b = &page[at..at + 4];
    i32::from_le_bytes([b[0], b[1], b[2], b[3]]) as usize
}

/// Field width of column `i`, recovered from the offset index.
fn field_len(page: &[u8], header: &PageHeader, i: usize) -> usize {
    let capacity = header.record_capacity as usize;
    if i == 0 {
        col_index(page, header, 0) / capacity
    } else {
        (col_index(page, header, i) - col_index(page, header, i - 1)) / capacity
    }
}

/// Absolute byte offset of `(slot, col)` within the page.
fn field_offset(page: &[u8], header: &PageHeader, slot: usize, col: usize) -> usize {
    let run_start = if col == 0 {
        0
    } else {
        col_index(page, header, col - 1)
    };
    header.data_offset as usize + run_start + slot * field_len(page, header, col)
}
