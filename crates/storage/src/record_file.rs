//! Per-table heap of record pages with a free-page set.
//!
//! Lock order: the insert path takes the free-set mutex only to pick or
//! register a candidate page and releases it before touching any page
//! latch; paths already holding a latch detach before re-entering the set.

use crate::pax_page::PaxPageHandler;
use crate::row_page::RowPageHandler;
use crate::{AccessMode, LobFileHandler, Record};
use buffer::BufferPool;
use catalog::{StorageFormat, TableMeta};
use columnar::Chunk;
use common::{DbError, DbResult, PageNum, Rid};
use parking_lot::Mutex;
use std::collections::BTreeSet;
use std::sync::Arc;
use wal::LogHandler;

pub struct RecordFileHandler {
    pool: Arc<BufferPool>,
    log: Arc<LogHandler>,
    lob: Arc<LobFileHandler>,
    meta: TableMeta,
    free_pages: Mutex<BTreeSet<PageNum>>,
}

enum PageHandler {
    Row(RowPageHandler),
    Pax(PaxPageHandler),
}

impl PageHandler {
    fn attach(&mut self, page_num: PageNum, mode: AccessMode) -> DbResult<()> {
        match self {
            PageHandler::Row(h) => h.attach(page_num, mode),
            PageHandler::Pax(h) => h.attach(page_num, mode),
        }
    }

    fn detach(&mut self) {
        match self {
            PageHandler::Row(h) => h.detach(),
            PageHandler::Pax(h) => h.detach(),
        }
    }

    fn is_full(&self) -> DbResult<bool> {
        match self {
            PageHandler::Row(h) => h.is_full(),
            PageHandler::Pax(h) => h.is_full(),
        }
    }

    fn insert_record(&mut self, data: &[u8]) -> DbResult<Rid> {
        match self {
            PageHandler::Row(h) => h.insert_record(data),
            PageHandler::Pax(h) => h.insert_record(data),
        }
    }

    fn delete_record(&mut self, rid: &Rid) -> DbResult<()> {
        match self {
            PageHandler::Row(h) => h.delete_record(rid),
            PageHandler::Pax(h) => h.delete_record(rid),
        }
    }

    fn get_record(&self, rid: &Rid) -> DbResult<Record> {
        match self {
            PageHandler::Row(h) => h.get_record(rid),
            PageHandler::Pax(h) => h.get_record(rid),
        }
    }
}

impl RecordFileHandler {
    /// Open the heap, scanning existing pages for free space.
    pub fn open(
        pool: Arc<BufferPool>,
        log: Arc<LogHandler>,
        lob: Arc<LobFileHandler>,
        meta: TableMeta,
    ) -> DbResult<Self> {
        let handler = Self {
            pool,
            log,
            lob,
            meta,
            free_pages: Mutex::new(BTreeSet::new()),
        };
        handler.init_free_pages()?;
        Ok(handler)
    }

    fn new_page_handler(&self) -> PageHandler {
        match self.meta.storage_format {
            StorageFormat::Row => {
                PageHandler::Row(RowPageHandler::new(self.pool.clone(), self.log.clone()))
            }
            StorageFormat::Pax => PageHandler::Pax(PaxPageHandler::new(
                self.pool.clone(),
                self.log.clone(),
                self.lob.clone(),
            )),
        }
    }

    /// Walk every page once at open and remember the not-full ones.
    fn init_free_pages(&self) -> DbResult<()> {
        let mut handler = self.new_page_handler();
        let mut free = self.free_pages.lock();
        for page_num in 0..self.pool.page_count() {
            handler.attach(page_num, AccessMode::ReadOnly)?;
            if !handler.is_full()? {
                free.insert(page_num);
            }
            handler.detach();
        }
        Ok(())
    }

    /// Insert one record, reusing a not-full page or formatting a new one.
    pub fn insert_record(&self, data: &[u8]) -> DbResult<Rid> {
        let mut handler = self.new_page_handler();
        loop {
            let candidate = self.free_pages.lock().iter().next().copied();
            let page_num = match candidate {
                Some(page_num) => page_num,
                None => break,
            };
            handler.attach(page_num, AccessMode::ReadWrite)?;
            if !handler.is_full()? {
                return handler.insert_record(data);
            }
            handler.detach();
            self.free_pages.lock().remove(&page_num);
        }

        let page_num = self.pool.allocate_page()?;
        handler.attach(page_num, AccessMode::ReadWrite)?;
        match &mut handler {
            PageHandler::Row(h) => h.init_empty(self.meta.record_size())?,
            PageHandler::Pax(h) => h.init_empty(self.meta.record_size(), &self.meta)?,
        }
        self.free_pages.lock().insert(page_num);
        handler.insert_record(data)
    }

    /// Bulk insert a chunk, formatting a fresh PAX page per batch.
    pub fn insert_chunk(&self, chunk: &Chunk) -> DbResult<()> {
        if self.meta.storage_format != StorageFormat::Pax {
            return Err(DbError::Unimplemented(
                "bulk chunk insert targets PAX tables".into(),
            ));
        }
        let mut handler =
            PaxPageHandler::new(self.pool.clone(), self.log.clone(), self.lob.clone());
        let mut start_row = 0usize;
        while start_row < chunk.rows() {
            let page_num = self.pool.allocate_page()?;
            handler.attach(page_num, AccessMode::ReadWrite)?;
            handler.init_empty(self.meta.record_size(), &self.meta)?;
            let inserted = handler.insert_chunk(chunk, start_row)?;
            let full = handler.is_full()?;
            handler.detach();
            if !full {
                self.free_pages.lock().insert(page_num);
            }
            if inserted == 0 {
                return Err(DbError::Internal("chunk insert made no progress".into()));
            }
            start_row += inserted;
        }
        Ok(())
    }

    pub fn delete_record(&self, rid: &Rid) -> DbResult<()> {
        let mut handler = self.new_page_handler();
        handler.attach(rid.page_num, AccessMode::ReadWrite)?;
        let result = handler.delete_record(rid);
        handler.detach();
        if result.is_ok() {
            // The page has space again; the probe above filters stale entries.
            self.free_pages.lock().insert(rid.page_num);
        }
        result
    }

    pub fn get_record(&self, rid: &Rid) -> DbResult<Record> {
        let mut handler = self.new_page_handler();
        handler.attach(rid.page_num, AccessMode::ReadOnly)?;
        let result = handler.get_record(rid);
        handler.detach();
        result
    }

    pub(crate) fn pool(&self) -> &Arc<BufferPool> {
        &self.pool
    }

    pub(crate) fn log(&self) -> &Arc<LogHandler> {
        &self.log
    }

    pub(crate) fn lob(&self) -> &Arc<LobFileHandler> {
        &self.lob
    }
}
