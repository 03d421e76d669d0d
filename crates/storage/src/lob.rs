//! Lob file: append-only store for text bytes too long to inline. One
//! handler is shared by every PAX page handler of the database; reads and
//! writes are serialized on the file handle.

use common::{DbError, DbResult};
use parking_lot::Mutex;
use std::fs::{File, OpenOptions};
use std::io::{Read, Seek, SeekFrom, Write};
use std::path::Path;

#[derive(Debug)]
pub struct LobFileHandler {
    file: Mutex<File>,
}

impl LobFileHandler {
    /// Open or create the lob file. Created eagerly on database open.
    pub fn open(path: impl AsRef<Path>) -> DbResult<Self> {
        let file = OpenOptions::new()
            .read(true)
            .write(true)
            .create(true)
            .truncate(false)
            .open(path.as_ref())
            .map_err(|e| {
                DbError::WriteFailed(format!("open lob {}: {e}", path.as_ref().display()))
            })?;
        Ok(Self {
            file: Mutex::new(file),
        })
    }

    /// Append bytes and return the offset a string descriptor should carry.
    pub fn insert_data(&self, data: &[u8]) -> DbResult<u64> {
        let mut file = self.file.lock();
        let offset = file
            .seek(SeekFrom::End(0))
            .map_err(|e| DbError::WriteFailed(format!("seek lob end: {e}")))?;
        file.write_all(data)
            .map_err(|e| DbError::WriteFailed(format!("append lob: {e}")))?;
        Ok(offset)
    }

    /// Read `len` bytes back from `offset`.
    pub fn get_data(&self, offset: u64, len: usize) -> DbResult<Vec<u8>> {
        let mut file = self.file.lock();
        file.seek(SeekFrom::Start(offset))
            .map_err(|e| DbError::ReadFailed(format!("seek lob {offset}: {e}")))?;
        let mut buf = vec![0u8; len];
        file.read_exact(&mut buf)
            .map_err(|e| DbError::ReadFailed(format!("read lob {offset}+{len}: {e}")))?;
        Ok(buf)
    }
}
