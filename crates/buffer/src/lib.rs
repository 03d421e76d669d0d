//! Buffer pool: one paged file per table, a bounded frame cache, and
//! per-frame latches for the page handlers' attach/detach protocol.
//!
//! Page access follows get/unpin pairs: [`BufferPool::fetch_page`] pins a
//! frame, the handler takes the page latch for its attach scope, and
//! [`BufferPool::unpin_page`] releases the frame after the latch is dropped.

mod latch;
#[cfg(test)]
mod tests;

pub use latch::PageLatch;

use common::{DbError, DbResult, PageNum};
use lru::LruCache;
use parking_lot::{Mutex, RwLock, RwLockReadGuard, RwLockWriteGuard};
use std::fs::{File, OpenOptions};
use std::io::{Read, Seek, SeekFrom, Write};
use std::num::NonZeroUsize;
use std::path::{Path, PathBuf};
use std::sync::atomic::{AtomicBool, AtomicI32, AtomicU32, Ordering};
use std::sync::Arc;

/// Size of one disk page.
pub const PAGE_SIZE: usize = 8192;

/// An in-memory page image with its latch, dirty flag, and pin count.
#[derive(Debug)]
pub struct Frame {
    page_num: PageNum,
    latch: PageLatch,
    data: RwLock<Vec<u8>>,
    dirty: AtomicBool,
    pins: AtomicI32,
}

impl Frame {
    fn new(page_num: PageNum, data: Vec<u8>) -> Self {
        Self {
            page_num,
            latch: PageLatch::new(),
            data: RwLock::new(data),
            dirty: AtomicBool::new(false),
            pins: AtomicI32::new(0),
        }
    }

    pub fn page_num(&self) -> PageNum {
        self.page_num
    }

    /// The page latch handlers hold from attach to detach.
    pub fn latch(&self) -> &PageLatch {
        &self.latch
    }

    /// Short-lived read access to the page bytes.
    pub fn data(&self) -> RwLockReadGuard<'_, Vec<u8>> {
        self.data.read()
    }

    /// Short-lived write access to the page bytes. Callers must hold the
    /// page write latch.
    pub fn data_mut(&self) -> RwLockWriteGuard<'_, Vec<u8>> {
        self.data.write()
    }

    pub fn mark_dirty(&self) {
        self.dirty.store(true, Ordering::Release);
    }

    pub fn is_dirty(&self) -> bool {
        self.dirty.load(Ordering::Acquire)
    }

    fn clear_dirty(&self) {
        self.dirty.store(false, Ordering::Release);
    }

    fn pin(&self) {
        self.pins.fetch_add(1, Ordering::AcqRel);
    }

    fn unpin(&self) {
        self.pins.fetch_sub(1, Ordering::AcqRel);
    }

    pub fn pin_count(&self) -> i32 {
        self.pins.load(Ordering::Acquire)
    }
}

/// File-backed pool of page frames with LRU replacement. Pinned frames are
/// never evicted; dirty frames are written back before eviction.
#[derive(Debug)]
pub struct BufferPool {
    path: PathBuf,
    file: Mutex<File>,
    frames: Mutex<LruCache<PageNum, Arc<Frame>>>,
    page_count: AtomicU32,
}

impl BufferPool {
    /// Open or create the paged file at `path`, keeping at most `max_frames`
    /// pages resident.
    pub fn open(path: impl AsRef<Path>, max_frames: usize) -> DbResult<Self> {
        let path = path.as_ref().to_path_buf();
        let file = OpenOptions::new()
            .read(true)
            .write(true)
            .create(true)
            .truncate(false)
            .open(&path)
            .map_err(|e| DbError::ReadFailed(format!("open {}: {e}", path.display())))?;
        let len = file
            .metadata()
            .map_err(|e| DbError::ReadFailed(format!("stat {}: {e}", path.display())))?
            .len();
        let max_frames = NonZeroUsize::new(max_frames.max(1))
            .ok_or_else(|| DbError::Internal("empty buffer pool".into()))?;
        Ok(Self {
            path,
            file: Mutex::new(file),
            frames: Mutex::new(LruCache::new(max_frames)),
            page_count: AtomicU32::new((len / PAGE_SIZE as u64) as u32),
        })
    }

    pub fn page_count(&self) -> u32 {
        self.page_count.load(Ordering::Acquire)
    }

    /// Extend the file by one zeroed page and return its number.
    pub fn allocate_page(&self) -> DbResult<PageNum> {
        let mut file = self.file.lock();
        let page_num = self.page_count.load(Ordering::Acquire);
        let offset = page_num as u64 * PAGE_SIZE as u64;
        file.seek(SeekFrom::Start(offset))
            .map_err(|e| DbError::WriteFailed(format!("seek page {page_num}: {e}")))?;
        file.write_all(&[0u8; PAGE_SIZE])
            .map_err(|e| DbError::WriteFailed(format!("extend page {page_num}: {e}")))?;
        self.page_count.store(page_num + 1, Ordering::Release);
        Ok(page_num)
    }

    /// Fetch a page frame, pinning it. The caller must pair this with
    /// [`Self::unpin_page`].
    pub fn fetch_page(&self, page_num: PageNum) -> DbResult<Arc<Frame>> {
        if page_num >= self.page_count() {
            return Err(DbError::Internal(format!(
                "page {page_num} not allocated in {}",
                self.path.display()
            )));
        }
        let mut frames = self.frames.lock();
        if let Some(frame) = frames.get(&page_num) {
            let frame = frame.clone();
            frame.pin();
            return Ok(frame);
        }
        let data = self.read_page(page_num)?;
        let frame = Arc::new(Frame::new(page_num, data));
        self.evict_if_needed(&mut frames)?;
        frames.push(page_num, frame.clone());
        frame.pin();
        Ok(frame)
    }

    /// Release one pin taken by [`Self::fetch_page`].
    pub fn unpin_page(&self, frame: &Arc<Frame>) {
        frame.unpin();
    }

    /// Write all dirty resident pages back.
    pub fn flush_all(&self) -> DbResult<()> {
        let frames = self.frames.lock();
        for (_, frame) in frames.iter() {
            if frame.is_dirty() {
                self.write_page(frame.page_num(), &frame.data())?;
                frame.clear_dirty();
            }
        }
        Ok(())
    }

    fn read_page(&self, page_num: PageNum) -> DbResult<Vec<u8>> {
        let mut file = self.file.lock();
        let offset = page_num as u64 * PAGE_SIZE as u64;
        file.seek(SeekFrom::Start(offset))
            .map_err(|e| DbError::ReadFailed(format!("seek page {page_num}: {e}")))?;
        let mut data = vec![0u8; PAGE_SIZE];
        file.read_exact(&mut data)
            .map_err(|e| DbError::ReadFailed(format!("read page {page_num}: {e}")))?;
        Ok(data)
    }

    fn write_page(&self, page_num: PageNum, data: &[u8]) -> DbResult<()> {
        let mut file = self.file.lock();
        let offset = page_num as u64 * PAGE_SIZE as u64;
        file.seek(SeekFrom::Start(offset))
            .map_err(|e| DbError::WriteFailed(format!("seek page {page_num}: {e}")))?;
        file.write_all(data)
            .map_err(|e| DbError::WriteFailed(format!("write page {page_num}: {e}")))?;
        Ok(())
    }

    fn evict_if_needed(&self, frames: &mut LruCache<PageNum, Arc<Frame>>) -> DbResult<()> {
        if frames.len() < frames.cap().get() {
            return Ok(());
        }
        // Pinned frames are skipped; give up after one pass rather than spin.
        for _ in 0..frames.len() {
            match frames.pop_lru() {
                Some((page_num, frame)) if frame.pin_count() > 0 => {
                    frames.push(page_num, frame);
                }
                Some((page_num, frame)) => {
                    if frame.is_dirty() {
                        self.write_page(page_num, &frame.data())?;
                        frame.clear_dirty();
                    }
                    return Ok(());
                }
                None => return Ok(()),
            }
        }
        Ok(())
    }
}
