//! Shared identifiers, the database error type with stable code names, the
//! slot bitmap, and runtime configuration.

pub mod bitmap;
#[cfg(test)]
mod tests;

use serde::{Deserialize, Serialize};
use std::fmt;
use std::path::PathBuf;
use thiserror::Error;
use types::TypeError;

/// Page number within one table's paged file.
pub type PageNum = u32;

/// Slot position within a page; the bitmap tracks occupancy.
pub type SlotNum = u32;

/// Record identifier: where one row lives.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct Rid {
    pub page_num: PageNum,
    pub slot_num: SlotNum,
}

impl Rid {
    pub fn new(page_num: PageNum, slot_num: SlotNum) -> Self {
        Self { page_num, slot_num }
    }
}

impl fmt::Display for Rid {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}:{}", self.page_num, self.slot_num)
    }
}

/// Identifier for a table registered in the catalog.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct TableId(pub u64);

/// Canonical error type. Every variant maps to one stable code name that the
/// wire protocol reports in its trailing status line.
#[derive(Error, Debug)]
pub enum DbError {
    #[error("invalid argument: {0}")]
    InvalidArgument(String),
    #[error("unimplemented: {0}")]
    Unimplemented(String),
    #[error("internal: {0}")]
    Internal(String),
    #[error("field type mismatch: {0}")]
    FieldTypeMismatch(String),
    #[error("field missing: {0}")]
    FieldMissing(String),
    #[error("out of space")]
    OutOfCapacity,
    #[error("record not exist: {0}")]
    RecordNotExist(Rid),
    #[error("invalid rid: {0}")]
    InvalidRid(Rid),
    #[error("read failed: {0}")]
    ReadFailed(String),
    #[error("write failed: {0}")]
    WriteFailed(String),
    #[error("close failed: {0}")]
    CloseFailed(String),
    #[error("message too long: {0}")]
    TooLong(String),
    #[error("file not exist: {0}")]
    FileNotExist(String),
    #[error("materialized view already exists: {0}")]
    ViewNameRepeat(String),
}

impl DbError {
    /// The stable code string for the status line.
    pub fn code_name(&self) -> &'static str {
        match self {
            DbError::InvalidArgument(_) => "INVALID_ARGUMENT",
            DbError::Unimplemented(_) => "UNIMPLEMENTED",
            DbError::Internal(_) => "INTERNAL",
            DbError::FieldTypeMismatch(_) => "SCHEMA_FIELD_TYPE_MISMATCH",
            DbError::FieldMissing(_) => "SCHEMA_FIELD_MISSING",
            DbError::OutOfCapacity => "RECORD_NOMEM",
            DbError::RecordNotExist(_) => "RECORD_NOT_EXIST",
            DbError::InvalidRid(_) => "RECORD_INVALID_RID",
            DbError::ReadFailed(_) => "IOERR_READ",
            DbError::WriteFailed(_) => "IOERR_WRITE",
            DbError::CloseFailed(_) => "IOERR_CLOSE",
            DbError::TooLong(_) => "IOERR_TOO_LONG",
            DbError::FileNotExist(_) => "FILE_NOT_EXIST",
            DbError::ViewNameRepeat(_) => "SCHEMA_MATERIALIZED_VIEW_NAME_REPEAT",
        }
    }
}

impl From<TypeError> for DbError {
    fn from(err: TypeError) -> Self {
        match err {
            TypeError::Invalid(msg) => DbError::InvalidArgument(msg),
            TypeError::Mismatch(msg) => DbError::FieldTypeMismatch(msg),
            TypeError::Unsupported(msg) => DbError::Unimplemented(msg),
        }
    }
}

/// Result alias carrying a `DbError`.
pub type DbResult<T> = Result<T, DbError>;

/// Runtime configuration.
///
/// # Example
/// ```
/// use common::Config;
/// use std::path::PathBuf;
///
/// let config = Config::builder()
///     .data_dir(PathBuf::from("./my_db"))
///     .listen_addr("127.0.0.1:6789".into())
///     .build();
/// ```
#[derive(Clone, Debug, Serialize, Deserialize, bon::Builder)]
pub struct Config {
    /// Directory for table files, the catalog, the log, and spilled text.
    #[builder(default = PathBuf::from("./db_data"))]
    pub data_dir: PathBuf,
    /// Number of pages each table's buffer pool keeps resident.
    #[builder(default = 256)]
    pub buffer_pool_pages: usize,
    /// Target rows per chunk flowing between operators.
    #[builder(default = 1024)]
    pub chunk_rows: usize,
    /// TCP listen address for the frontend.
    #[builder(default = String::from("127.0.0.1:6789"))]
    pub listen_addr: String,
}

impl Default for Config {
    fn default() -> Self {
        Self {
            data_dir: PathBuf::from("./db_data"),
            buffer_pool_pages: 256,
            chunk_rows: 1024,
            listen_addr: String::from("127.0.0.1:6789"),
        }
    }
}
