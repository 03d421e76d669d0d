use super::*;

fn pool_in(dir: &tempfile::TempDir) -> BufferPool {
    BufferPool::open(dir.path().join("table.data"), 8).unwrap()
}

#[test]
fn allocate_extends_the_file() {
    let dir = tempfile::tempdir().unwrap();
    let pool = pool_in(&dir);
    assert_eq!(pool.page_count(), 0);
    assert_eq!(pool.allocate_page().unwrap(), 0);
    assert_eq!(pool.allocate_page().unwrap(), 1);
    assert_eq!(pool.page_count(), 2);
}

#[test]
fn fetch_unallocated_page_fails() {
    let dir = tempfile::tempdir().unwrap();
    let pool = pool_in(&dir);
    assert!(pool.fetch_page(0).is_err());
}

#[test]
fn writes_survive_flush_and_reopen() {
    let dir = tempfile::tempdir().unwrap();
    let path = dir.path().join("table.data");
    {
        let pool = BufferPool::open(&path, 8).unwrap();
        let page = pool.allocate_page().unwrap();
        let frame = pool.fetch_page(page).unwrap();
        frame.latch().lock_write();
        frame.data_mut()[0..4].copy_from_slice(&7i32.to_le_bytes());
        frame.mark_dirty();
        frame.latch().unlock_write();
        pool.unpin_page(&frame);
        pool.flush_all().unwrap();
    }
    let pool = BufferPool::open(&path, 8).unwrap();
    assert_eq!(pool.page_count(), 1);
    let frame = pool.fetch_page(0).unwrap();
    frame.latch().lock_read();
    assert_eq!(&frame.data()[0..4], &7i32.to_le_bytes());
    frame.latch().unlock_read();
    pool.unpin_page(&frame);
}

#[test]
fn eviction_writes_back_dirty_pages() {
    let dir = tempfile::tempdir().unwrap();
    let path = dir.path().join("table.data");
    let pool = BufferPool::open(&path, 2).unwrap();
    for _ in 0..4 {
        pool.allocate_page().unwrap();
    }
    // Dirty page 0, then touch enough pages to force it out of the cache.
    let frame = pool.fetch_page(0).unwrap();
    frame.data_mut()[0] = 0xAB;
    frame.mark_dirty();
    pool.unpin_page(&frame);
    for page in 1..4 {
        let frame = pool.fetch_page(page).unwrap();
        pool.unpin_page(&frame);
    }
    // Reading page 0 back goes through disk.
    let frame = pool.fetch_page(0).unwrap();
    assert_eq!(frame.data()[0], 0xAB);
    pool.unpin_page(&frame);
}

#[test]
fn pinned_frames_are_not_evicted() {
    let dir = tempfile::tempdir().unwrap();
    let pool = BufferPool::open(dir.path().join("t.data"), 2).unwrap();
    for _ in 0..3 {
        pool.allocate_page().unwrap();
    }
    let pinned = pool.fetch_page(0).unwrap();
    pinned.data_mut()[0] = 1;
    for page in 1..3 {
        let frame = pool.fetch_page(page).unwrap();
        pool.unpin_page(&frame);
    }
    // Still the same in-memory image.
    assert_eq!(pinned.data()[0], 1);
    assert_eq!(pinned.pin_count(), 1);
    pool.unpin_page(&pinned);
}
