//! A readers-writer page latch with explicit lock/unlock, so a page handler
//! can hold it across its whole attach scope without borrowing the frame.

use parking_lot::{Condvar, Mutex};

#[derive(Debug, Default)]
struct LatchState {
    readers: u32,
    writer: bool,
}

/// Blocking readers-writer latch. Exactly one writer or any number of
/// readers hold it at a time.
#[derive(Debug, Default)]
pub struct PageLatch {
    state: Mutex<LatchState>,
    cond: Condvar,
}

impl PageLatch {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn lock_read(&self) {
        let mut state = self.state.lock();
        while state.writer {
            self.cond.wait(&mut state);
        }
        state.readers += 1;
    }

    pub fn unlock_read(&self) {
        let mut state = self.state.lock();
        debug_assert!(state.readers > 0);
        state.readers -= 1;
        if state.readers == 0 {
            self.cond.notify_all();
        }
    }

    pub fn lock_write(&self) {
        let mut state = self.state.lock();
        while state.writer || state.readers > 0 {
            self.cond.wait(&mut state);
        }
        state.writer = true;
    }

    pub fn unlock_write(&self) {
        let mut state = self.state.lock();
        debug_assert!(state.writer);
        state.writer = false;
        self.cond.notify_all();
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::Arc;
    use std::thread;

    #[test]
    fn readers_share_writers_exclude() {
        let latch = Arc::new(PageLatch::new());
        latch.lock_read();
        latch.lock_read();
        latch.unlock_read();
        latch.unlock_read();
        latch.lock_write();
        latch.unlock_write();
    }

    #[test]
    fn writer_blocks_until_readers_leave() {
        let latch = Arc::new(PageLatch::new());
        latch.lock_read();
        let contender = {
            let latch = latch.clone();
            thread::spawn(move || {
                latch.lock_write();
                latch.unlock_write();
            })
        };
        latch.unlock_read();
        contender.join().unwrap();
    }
}
