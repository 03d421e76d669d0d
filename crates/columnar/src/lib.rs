//! Columnar data model: the 16-byte string descriptor with its arena, the
//! typed `Column` buffer, and the `Chunk` batch exchanged between operators.

mod chunk;
mod column;
mod string;

pub use chunk::{Chunk, UNUSED_COLUMN_ID};
pub use column::{Column, ColumnMode};
pub use string::{StringArena, StringT, STRING_INLINE_LEN, STRING_T_LEN};
