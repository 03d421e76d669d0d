//! Page-mutation log. Every record page change is appended here before the
//! page itself is written back, giving single-page redo on reopen.
//!
//! Records are length-prefixed (4-byte LE) bincode frames, so replay can
//! iterate forward safely and stop at a torn tail.


use bincode::config::{self, Config};
use bincode::serde::{decode_from_slice, encode_to_vec};
use common::{DbError, DbResult, PageNum, Rid};
use parking_lot::Mutex;
use serde::{Deserialize, Serialize};
use std::fs::{File, OpenOptions};
use std::io::{Read, Write};
use std::path::{Path, PathBuf};

/// One logged page mutation.
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub enum LogRecord {
    /// A page was formatted empty. Carries the column-offset index verbatim
    /// so redo can rebuild the page layout without the table schema.
    NewPage {
        page_num: PageNum,
        record_size: i32,
        column_index: Vec<i32>,
    },
    /// One record landed at `rid` with this byte image.
    InsertRecord { rid: Rid, data: Vec<u8> },
    /// The slot at `rid` was cleared.
    DeleteRecord { rid: Rid },
}

/// Append-only log over one file. `append` is serialized internally so page
/// handlers can share one handle.
#[derive(Debug)]
pub struct LogHandler {
    path: PathBuf,
    file: Mutex<File>,
}

impl LogHandler {
    /// Open or create the log file, preserving existing records.
    pub fn open(path: impl AsRef<Path>) -> DbResult<Self> {
        let path = path.as_ref().to_path_buf();
        let file = OpenOptions::new()
            .create(true)
            .read(true)
            .append(true)
            .open(&path)
            .map_err(|e| DbError::WriteFailed(format!("open log {}: {e}", path.display())))?;
        Ok(Self {
            path,
            file: Mutex::new(file),
        })
    }

    /// Append one record as a length-prefixed frame.
    pub fn append(&self, record: &LogRecord) -> DbResult<()> {
        let bytes = encode_to_vec(record, bincode_config())
            .map_err(|e| DbError::Internal(format!("serialize log record: {e}")))?;
        let mut file = self.file.lock();
        file.write_all(&(bytes.len() as u32).to_le_bytes())
            .map_err(|e| DbError::WriteFailed(format!("log length prefix: {e}")))?;
        file.write_all(&bytes)
            .map_err(|e| DbError::WriteFailed(format!("log record: {e}")))?;
        file.flush()
            .map_err(|e| DbError::WriteFailed(format!("flush log: {e}")))?;
        Ok(())
    }

    /// Fsync the log.
    pub fn sync(&self) -> DbResult<()> {
        self.file
            .lock()
            .sync_all()
            .map_err(|e| DbError::WriteFailed(format!("sync log: {e}")))
    }

    /// Read back every record, stopping at EOF or a torn tail frame.
    pub fn replay(path: impl AsRef<Path>) -> DbResult<Vec<LogRecord>> {
        let mut file = match OpenOptions::new().read(true).open(path.as_ref()) {
            Ok(file) => file,
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => return Ok(Vec::new()),
            Err(e) => {
                return Err(DbError::ReadFailed(format!(
                    "open log for replay: {e}"
                )))
            }
        };

        let mut records = Vec::new();
        loop {
            let mut len_buf = [0u8; 4];
            match file.read_exact(&mut len_buf) {
                Ok(()) => {}
                Err(e) if e.kind() == std::io::ErrorKind::UnexpectedEof => break,
                Err(e) => {
                    return Err(DbError::ReadFailed(format!("log length prefix: {e}")))
                }
            }
            let len = u32::from_le_bytes(len_buf) as usize;
            let mut buf = vec![0u8; len];
            match file.read_exact(&mut buf) {
                Ok(()) => {}
                // A torn final frame is not an error; redo stops there.
                Err(e) if e.kind() == std::io::ErrorKind::UnexpectedEof => break,
                Err(e) => return Err(DbError::ReadFailed(format!("log record: {e}"))),
            }
            let (record, _) = decode_from_slice(&buf, bincode_config())
                .map_err(|e| DbError::ReadFailed(format!("decode log record: {e}")))?;
            records.push(record);
        }
        Ok(records)
    }

    pub fn path(&self) -> &Path {
        &self.path
    }
}

fn bincode_config() -> impl Config {
    config::legacy()
}
