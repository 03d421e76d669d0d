//! Shared on-page layout: the fixed header, alignment, and the capacity
//! recurrence.
//!
//! A record page is laid out as
//! `[PageHeader | Bitmap | ColumnOffsetIndex | column runs...]`, with the
//! column-offset index empty for row-format pages.

use buffer::PAGE_SIZE;

/// Seven little-endian `i32` fields.
pub const PAGE_HEADER_SIZE: usize = 28;

/// Decoded page header.
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq)]
pub struct PageHeader {
    pub record_num: i32,
    pub column_num: i32,
    pub record_real_size: i32,
    pub record_size: i32,
    pub record_capacity: i32,
    pub col_idx_offset: i32,
    pub data_offset: i32,
}

impl PageHeader {
    pub fn read(page: &[u8]) -> Self {
        let field = |i: usize| {
            let b = &page[i * 4..i * 4 + 4];
            i32::from_le_bytes([b[0], b[1], b[2], b[3]])
        };
        Self {
            record_num: field(0),
            column_num: field(1),
            record_real_size: field(2),
            record_size: field(3),
            record_capacity: field(4),
            col_idx_offset: field(5),
            data_offset: field(6),
        }
    }

    pub fn write(&self, page: &mut [u8]) {
        let fields = [
            self.record_num,
            self.column_num,
            self.record_real_size,
            self.record_size,
            self.record_capacity,
            self.col_idx_offset,
            self.data_offset,
        ];
        for (i, v) in fields.iter().enumerate() {
            page[i * 4..i * 4 + 4].copy_from_slice(&v.to_le_bytes());
        }
    }
}

/// Round up to an 8-byte boundary.
pub fn align8(size: usize) -> usize {
    (size + 7) & !7
}

/// Records a page can hold: the largest `capacity` with
/// `header + bitmap + fixed + capacity * record_size <= page_size`, via the
/// recurrence `capacity ~= (avail - 1) / (record_size + 1/8)`.
pub fn page_record_capacity(record_size: usize, fixed_size: usize) -> usize {
    let avail = PAGE_SIZE - PAGE_HEADER_SIZE - fixed_size;
    ((avail as f64 - 1.0) / (record_size as f64 + 0.125)) as usize
}

/// Compute the full empty-page layout for `column_num` columns.
/// Returns `(capacity, col_idx_offset, data_offset)`.
pub fn empty_page_layout(record_size: usize, column_num: usize) -> (usize, usize, usize) {
    let mut capacity = page_record_capacity(record_size, column_num * 4);
    let col_idx_offset = align8(PAGE_HEADER_SIZE + common::bitmap::bytes_for(capacity));
    let data_offset = align8(col_idx_offset + column_num * 4);
    while capacity > 0 && data_offset + capacity * record_size > PAGE_SIZE {
        capacity -= 1;
    }
    (capacity, col_idx_offset, data_offset)
}
