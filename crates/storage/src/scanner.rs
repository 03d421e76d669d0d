//! Chunk scanner: walks a table's pages and yields each one as a chunk.

use crate::pax_page::PaxPageHandler;
use crate::row_page::RowPageHandler;
use crate::{AccessMode, LobFileHandler};
use buffer::BufferPool;
use catalog::{StorageFormat, TableMeta};
use columnar::Chunk;
use common::{DbResult, PageNum};
use std::sync::Arc;
use wal::LogHandler;

pub struct ChunkFileScanner {
    pool: Arc<BufferPool>,
    log: Arc<LogHandler>,
    lob: Arc<LobFileHandler>,
    meta: TableMeta,
    next_page: PageNum,
}

impl ChunkFileScanner {
    pub fn open(
        pool: Arc<BufferPool>,
        log: Arc<LogHandler>,
        lob: Arc<LobFileHandler>,
        meta: TableMeta,
    ) -> Self {
        Self {
            pool,
            log,
            lob,
            meta,
            next_page: 0,
        }
    }

    /// Fill `chunk` from the next non-empty page. Returns `false` at end of
    /// file. The chunk's columns select which attributes are read; columns
    /// with a negative logical id stay as placeholders.
    pub fn next_chunk(&mut self, chunk: &mut Chunk) -> DbResult<bool> {
        while self.next_page < self.pool.page_count() {
            let page_num = self.next_page;
            self.next_page += 1;
            chunk.reset_data();
            match self.meta.storage_format {
                StorageFormat::Pax => {
                    let mut handler = PaxPageHandler::new(
                        self.pool.clone(),
                        self.log.clone(),
                        self.lob.clone(),
                    );
                    handler.attach(page_num, AccessMode::ReadOnly)?;
                    handler.get_chunk(chunk)?;
                    handler.detach();
                }
                StorageFormat::Row => {
                    let mut handler = RowPageHandler::new(self.pool.clone(), self.log.clone());
                    handler.attach(page_num, AccessMode::ReadOnly)?;
                    handler.get_chunk(chunk, &self.meta)?;
                    handler.detach();
                }
            }
            if chunk.rows() > 0 {
                return Ok(true);
            }
        }
        Ok(false)
    }

    pub fn close_scan(&mut self) {
        self.next_page = self.pool.page_count();
    }
}
