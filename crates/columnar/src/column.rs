//! A growable, typed element buffer. Fixed-width kinds store raw
//! little-endian element bytes; text columns store 16-byte descriptors plus
//! a per-column arena for the spilled bytes.

use crate::string::{StringArena, StringT, STRING_INLINE_LEN};
use common::{DbError, DbResult};
use std::sync::Arc;
use types::{AttrType, Value};

/// Default element capacity, sized to roughly one page worth of rows.
pub const DEFAULT_CAPACITY: usize = 1024;

/// Ownership state of a column's backing store.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum ColumnMode {
    /// Mutable buffer owned by this column.
    Owned,
    /// Zero-copy view of another column's buffer; read-only.
    Referenced,
    /// One value standing for every row; no buffer.
    Constant,
}

#[derive(Debug, Default, Clone)]
struct ColumnCore {
    data: Vec<u8>,
    arena: StringArena,
}

/// Owned buffers live behind an `Arc` so views can alias them without a
/// copy; `Arc::get_mut` then enforces "mutable only while unaliased".
#[derive(Debug, Clone)]
enum ColumnBuf {
    Owned(Arc<ColumnCore>),
    Shared(Arc<ColumnCore>),
    Constant(Box<Value>),
}

#[derive(Debug, Clone)]
pub struct Column {
    attr_type: AttrType,
    attr_len: usize,
    count: usize,
    capacity: usize,
    buf: ColumnBuf,
}

impl Default for Column {
    /// Placeholder column for attributes a scan does not need to read.
    fn default() -> Self {
        Self {
            attr_type: AttrType::Undefined,
            attr_len: 0,
            count: 0,
            capacity: 0,
            buf: ColumnBuf::Owned(Arc::new(ColumnCore::default())),
        }
    }
}

impl Column {
    pub fn new(attr_type: AttrType, attr_len: usize) -> Self {
        Self::with_capacity(attr_type, attr_len, DEFAULT_CAPACITY)
    }

    pub fn with_capacity(attr_type: AttrType, attr_len: usize, capacity: usize) -> Self {
        let mut core = ColumnCore::default();
        core.data.reserve(attr_len * capacity);
        Self {
            attr_type,
            attr_len,
            count: 0,
            capacity,
            buf: ColumnBuf::Owned(Arc::new(core)),
        }
    }

    /// A column standing for `rows` repetitions of one value.
    pub fn new_constant(value: Value, rows: usize) -> Self {
        Self {
            attr_type: value.attr_type(),
            attr_len: 0,
            count: rows,
            capacity: rows,
            buf: ColumnBuf::Constant(Box::new(value)),
        }
    }

    pub fn attr_type(&self) -> AttrType {
        self.attr_type
    }

    /// Rewrite the advertised attribute kind without touching element bytes.
    /// Used when 4-byte char keys travel through an integer hash table.
    pub fn set_attr_type(&mut self, attr_type: AttrType) {
        self.attr_type = attr_type;
    }

    pub fn attr_len(&self) -> usize {
        self.attr_len
    }

    pub fn count(&self) -> usize {
        self.count
    }

    pub fn capacity(&self) -> usize {
        self.capacity
    }

    pub fn mode(&self) -> ColumnMode {
        match &self.buf {
            ColumnBuf::Owned(_) => ColumnMode::Owned,
            ColumnBuf::Shared(_) => ColumnMode::Referenced,
            ColumnBuf::Constant(_) => ColumnMode::Constant,
        }
    }

    fn core(&self) -> Option<&ColumnCore> {
        match &self.buf {
            ColumnBuf::Owned(core) => Some(core),
            ColumnBuf::Shared(core) => Some(core),
            ColumnBuf::Constant(_) => None,
        }
    }

    fn owned_core(&mut self) -> DbResult<&mut ColumnCore> {
        match &mut self.buf {
            ColumnBuf::Owned(core) => Arc::get_mut(core).ok_or_else(|| {
                DbError::Internal("column buffer is aliased by a live view".into())
            }),
            _ => Err(DbError::InvalidArgument(
                "cannot mutate a referenced or constant column".into(),
            )),
        }
    }

    /// Element bytes for all live rows.
    pub fn data_bytes(&self) -> &[u8] {
        match self.core() {
            Some(core) => &core.data[..self.count * self.attr_len],
            None => &[],
        }
    }

    /// Bytes of one element.
    pub fn element(&self, row: usize) -> &[u8] {
        let start = row * self.attr_len;
        match self.core() {
            Some(core) => &core.data[start..start + self.attr_len],
            None => &[],
        }
    }

    /// Contiguous bytes of `rows` elements starting at `start_row`.
    pub fn element_range(&self, start_row: usize, rows: usize) -> &[u8] {
        let start = start_row * self.attr_len;
        match self.core() {
            Some(core) => &core.data[start..start + rows * self.attr_len],
            None => &[],
        }
    }

    /// Copy one element in.
    pub fn append_raw(&mut self, bytes: &[u8]) -> DbResult<()> {
        if self.count == self.capacity {
            return Err(DbError::OutOfCapacity);
        }
        let attr_len = self.attr_len;
        let core = self.owned_core()?;
        debug_assert_eq!(bytes.len(), attr_len);
        core.data.extend_from_slice(bytes);
        self.count += 1;
        Ok(())
    }

    /// Bulk append of `n` contiguous elements.
    pub fn append_slice(&mut self, bytes: &[u8], n: usize) -> DbResult<()> {
        if self.count + n > self.capacity {
            return Err(DbError::OutOfCapacity);
        }
        let attr_len = self.attr_len;
        let core = self.owned_core()?;
        debug_assert_eq!(bytes.len(), n * attr_len);
        core.data.extend_from_slice(bytes);
        self.count += n;
        Ok(())
    }

    pub fn append_value(&mut self, value: &Value) -> DbResult<()> {
        match (self.attr_type, value) {
            (AttrType::Ints, Value::Int(v)) | (AttrType::Dates, Value::Date(v)) => {
                self.append_raw(&v.to_le_bytes())
            }
            (AttrType::Dates, Value::Int(v)) => self.append_raw(&v.to_le_bytes()),
            (AttrType::Bigints, Value::Bigint(v)) => self.append_raw(&v.to_le_bytes()),
            (AttrType::Bigints, Value::Int(v)) => self.append_raw(&(*v as i64).to_le_bytes()),
            (AttrType::Floats, Value::Float(v)) => self.append_raw(&v.to_le_bytes()),
            (AttrType::Booleans, Value::Bool(v)) => self.append_raw(&[*v as u8]),
            (AttrType::Chars, v) => {
                let s = v.as_str().ok_or_else(|| {
                    DbError::FieldTypeMismatch(format!(
                        "expected CHARS, got {}",
                        v.attr_type()
                    ))
                })?;
                let mut padded = vec![0u8; self.attr_len];
                let n = s.len().min(self.attr_len);
                padded[..n].copy_from_slice(&s.as_bytes()[..n]);
                self.append_raw(&padded)
            }
            (AttrType::Texts, v) => {
                let s = v
                    .as_str()
                    .ok_or_else(|| {
                        DbError::FieldTypeMismatch(format!(
                            "expected TEXTS, got {}",
                            v.attr_type()
                        ))
                    })?
                    .to_string();
                let desc = self.add_text(s.as_bytes())?;
                self.append_raw(&desc.as_bytes()[..])
            }
            (AttrType::Vectors, Value::Vector(vs)) => {
                let mut bytes = Vec::with_capacity(self.attr_len);
                for v in vs {
                    bytes.extend_from_slice(&v.to_le_bytes());
                }
                bytes.resize(self.attr_len, 0);
                self.append_raw(&bytes)
            }
            (expected, v) => Err(DbError::FieldTypeMismatch(format!(
                "expected {}, got {}",
                expected,
                v.attr_type()
            ))),
        }
    }

    pub fn get_value(&self, row: usize) -> Value {
        if let ColumnBuf::Constant(value) = &self.buf {
            return (**value).clone();
        }
        match self.attr_type {
            AttrType::Ints => Value::Int(self.i32_at(row)),
            AttrType::Dates => Value::Date(self.i32_at(row)),
            AttrType::Bigints => Value::Bigint(self.i64_at(row)),
            AttrType::Floats => Value::Float(self.f32_at(row)),
            AttrType::Booleans => Value::Bool(self.element(row)[0] != 0),
            AttrType::Chars => {
                let raw = self.element(row);
                let end = raw.iter().position(|&b| b == 0).unwrap_or(raw.len());
                Value::Chars(String::from_utf8_lossy(&raw[..end]).into_owned())
            }
            AttrType::Texts => {
                let desc = self.string_t_at(row);
                let bytes = self.text_payload(&desc);
                Value::Texts(String::from_utf8_lossy(bytes).into_owned())
            }
            AttrType::Vectors => {
                let raw = self.element(row);
                let values = raw
                    .chunks_exact(4)
                    .map(|c| f32::from_le_bytes([c[0], c[1], c[2], c[3]]))
                    .collect();
                Value::Vector(values)
            }
            AttrType::Undefined => Value::Undefined,
        }
    }

    pub fn i32_at(&self, row: usize) -> i32 {
        let b = self.element(row);
        i32::from_le_bytes([b[0], b[1], b[2], b[3]])
    }

    pub fn i64_at(&self, row: usize) -> i64 {
        let b = self.element(row);
        i64::from_le_bytes([b[0], b[1], b[2], b[3], b[4], b[5], b[6], b[7]])
    }

    pub fn f32_at(&self, row: usize) -> f32 {
        let b = self.element(row);
        f32::from_le_bytes([b[0], b[1], b[2], b[3]])
    }

    pub fn string_t_at(&self, row: usize) -> StringT {
        StringT::from_bytes(self.element(row))
    }

    /// Decode the full element run as `i32`.
    pub fn collect_i32(&self) -> Vec<i32> {
        self.data_bytes()
            .chunks_exact(4)
            .map(|c| i32::from_le_bytes([c[0], c[1], c[2], c[3]]))
            .collect()
    }

    pub fn collect_i64(&self) -> Vec<i64> {
        self.data_bytes()
            .chunks_exact(8)
            .map(|c| i64::from_le_bytes([c[0], c[1], c[2], c[3], c[4], c[5], c[6], c[7]]))
            .collect()
    }

    pub fn collect_f32(&self) -> Vec<f32> {
        self.data_bytes()
            .chunks_exact(4)
            .map(|c| f32::from_le_bytes([c[0], c[1], c[2], c[3]]))
            .collect()
    }

    /// Place text bytes, producing the descriptor: inline when short, arena
    /// offset otherwise. Does not append an element.
    pub fn add_text(&mut self, bytes: &[u8]) -> DbResult<StringT> {
        if bytes.len() <= STRING_INLINE_LEN {
            return Ok(StringT::new_inline(bytes));
        }
        let core = self.owned_core()?;
        let offset = core.arena.append(bytes);
        Ok(StringT::new_external(bytes.len(), &bytes[..4], offset))
    }

    /// Resolve a descriptor against this column's arena.
    pub fn text_payload<'a>(&'a self, desc: &'a StringT) -> &'a [u8] {
        if desc.is_inlined() {
            desc.inline_bytes()
        } else {
            match self.core() {
                Some(core) => core.arena.get(desc.offset(), desc.size()),
                None => &[],
            }
        }
    }

    /// Whether any string bytes spilled into the arena.
    pub fn has_arena_data(&self) -> bool {
        self.core().map(|c| !c.arena.is_empty()).unwrap_or(false)
    }

    /// Set the logical count to `n`, never past capacity. Owned columns
    /// zero-fill when growing; referenced columns may only shrink.
    pub fn resize(&mut self, n: usize) -> DbResult<()> {
        match self.mode() {
            ColumnMode::Constant => {
                self.count = n;
                self.capacity = self.capacity.max(n);
                Ok(())
            }
            ColumnMode::Referenced => {
                if n > self.count {
                    return Err(DbError::InvalidArgument(
                        "cannot grow a referenced column".into(),
                    ));
                }
                self.count = n;
                Ok(())
            }
            ColumnMode::Owned => {
                if self.attr_type == AttrType::Undefined {
                    self.count = n;
                    self.capacity = self.capacity.max(n);
                    return Ok(());
                }
                let n = n.min(self.capacity);
                let attr_len = self.attr_len;
                let core = self.owned_core()?;
                core.data.resize(n * attr_len, 0);
                self.count = n;
                Ok(())
            }
        }
    }

    /// Retain elements whose mask byte is non-zero, preserving order.
    /// A referenced column detaches into an owned compacted copy first.
    pub fn compress(&mut self, select: &[u8]) -> DbResult<()> {
        debug_assert_eq!(select.len(), self.count);
        let kept = select.iter().filter(|&&s| s != 0).count();
        match self.mode() {
            ColumnMode::Constant => return self.resize(kept),
            ColumnMode::Referenced => return self.compress_detached(select, kept),
            ColumnMode::Owned => {}
        }
        if self.attr_type == AttrType::Undefined {
            return self.resize(kept);
        }
        let attr_len = self.attr_len;
        let count = self.count;
        let core = self.owned_core()?;
        let mut write = 0usize;
        for row in 0..count {
            if select[row] == 0 {
                continue;
            }
            if write != row {
                let (dst, src) = core.data.split_at_mut(row * attr_len);
                dst[write * attr_len..write * attr_len + attr_len]
                    .copy_from_slice(&src[..attr_len]);
            }
            write += 1;
        }
        core.data.truncate(write * attr_len);
        self.count = write;
        Ok(())
    }

    /// Compact a referenced column into a fresh owned buffer, carrying the
    /// arena along so non-inline descriptors stay valid.
    fn compress_detached(&mut self, select: &[u8], kept: usize) -> DbResult<()> {
        if self.attr_type == AttrType::Undefined {
            self.buf = ColumnBuf::Owned(Arc::new(ColumnCore::default()));
            self.count = kept;
            return Ok(());
        }
        let attr_len = self.attr_len;
        let mut core = ColumnCore::default();
        if let Some(old) = self.core() {
            core.data.reserve(kept * attr_len);
            for (row, flag) in select.iter().enumerate() {
                if *flag != 0 {
                    core.data
                        .extend_from_slice(&old.data[row * attr_len..(row + 1) * attr_len]);
                }
            }
            core.arena = old.arena.clone();
        }
        self.buf = ColumnBuf::Owned(Arc::new(core));
        self.count = kept;
        Ok(())
    }

    /// Become a zero-copy view of another column. The view is read-only;
    /// the source stays owned but cannot mutate while views are alive.
    pub fn reference(&mut self, other: &Column) {
        self.attr_type = other.attr_type;
        self.attr_len = other.attr_len;
        self.count = other.count;
        self.capacity = other.capacity;
        self.buf = match &other.buf {
            ColumnBuf::Constant(value) => ColumnBuf::Constant(value.clone()),
            ColumnBuf::Owned(core) | ColumnBuf::Shared(core) => {
                ColumnBuf::Shared(core.clone())
            }
        };
    }

    /// Truncate to zero rows. A referenced column detaches; an owned buffer
    /// still aliased by views is replaced so the views keep their snapshot.
    pub fn reset(&mut self) {
        self.count = 0;
        let detach = match &mut self.buf {
            ColumnBuf::Owned(core) => match Arc::get_mut(core) {
                Some(core) => {
                    core.data.clear();
                    core.arena.clear();
                    false
                }
                None => true,
            },
            ColumnBuf::Shared(_) => true,
            ColumnBuf::Constant(_) => false,
        };
        if detach {
            self.buf = ColumnBuf::Owned(Arc::new(ColumnCore::default()));
        }
    }

    /// Overwrite one element in place. The row must already be live.
    pub fn write_element(&mut self, row: usize, bytes: &[u8]) -> DbResult<()> {
        let attr_len = self.attr_len;
        if row >= self.count {
            return Err(DbError::InvalidArgument(format!(
                "write past live rows: {row}"
            )));
        }
        let core = self.owned_core()?;
        core.data[row * attr_len..row * attr_len + attr_len].copy_from_slice(bytes);
        Ok(())
    }

    /// Reverse the live elements in place; 4- and 8-byte kinds only.
    pub fn reverse_fixed(&mut self) -> DbResult<()> {
        let attr_len = self.attr_len;
        if attr_len != 4 && attr_len != 8 {
            return Err(DbError::Unimplemented(format!(
                "reverse of {attr_len}-byte elements"
            )));
        }
        let count = self.count;
        let core = self.owned_core()?;
        for i in 0..count / 2 {
            let j = count - 1 - i;
            for k in 0..attr_len {
                core.data.swap(i * attr_len + k, j * attr_len + k);
            }
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn append_and_read_ints() {
        let mut col = Column::new(AttrType::Ints, 4);
        for v in [10, 20, 30] {
            col.append_value(&Value::Int(v)).unwrap();
        }
        assert_eq!(col.count(), 3);
        assert_eq!(col.get_value(1), Value::Int(20));
        assert_eq!(col.collect_i32(), vec![10, 20, 30]);
    }

    #[test]
    fn append_past_capacity_fails() {
        let mut col = Column::with_capacity(AttrType::Ints, 4, 2);
        col.append_value(&Value::Int(1)).unwrap();
        col.append_value(&Value::Int(2)).unwrap();
        let err = col.append_value(&Value::Int(3)).unwrap_err();
        assert!(matches!(err, DbError::OutOfCapacity));
    }

    #[test]
    fn compress_keeps_masked_rows_in_order() {
        let mut col = Column::new(AttrType::Ints, 4);
        for v in [10, 20, 30, 40, 50] {
            col.append_value(&Value::Int(v)).unwrap();
        }
        col.compress(&[1, 0, 1, 0, 1]).unwrap();
        assert_eq!(col.count(), 3);
        assert_eq!(col.collect_i32(), vec![10, 30, 50]);
    }

    #[test]
    fn compress_count_equals_popcount() {
        let mut col = Column::new(AttrType::Bigints, 8);
        for v in 0..8i64 {
            col.append_value(&Value::Bigint(v)).unwrap();
        }
        let mask = [0, 1, 1, 0, 0, 1, 0, 0];
        col.compress(&mask).unwrap();
        let expected = mask.iter().filter(|&&m| m != 0).count();
        assert_eq!(col.count(), expected);
        assert_eq!(col.collect_i64(), vec![1, 2, 5]);
    }

    #[test]
    fn chars_pad_to_width() {
        let mut col = Column::new(AttrType::Chars, 4);
        col.append_value(&Value::Chars("ab".into())).unwrap();
        assert_eq!(col.element(0), b"ab\0\0");
        assert_eq!(col.get_value(0), Value::Chars("ab".into()));
    }

    #[test]
    fn texts_spill_into_arena() {
        let mut col = Column::new(AttrType::Texts, 16);
        col.append_value(&Value::Texts("short".into())).unwrap();
        col.append_value(&Value::Texts("a much longer string than twelve".into()))
            .unwrap();
        assert!(col.string_t_at(0).is_inlined());
        assert!(!col.string_t_at(1).is_inlined());
        assert!(col.has_arena_data());
        assert_eq!(
            col.get_value(1),
            Value::Texts("a much longer string than twelve".into())
        );
    }

    #[test]
    fn reference_is_zero_copy_and_blocks_mutation() {
        let mut src = Column::new(AttrType::Ints, 4);
        src.append_value(&Value::Int(7)).unwrap();
        let mut view = Column::default();
        view.reference(&src);
        assert_eq!(view.mode(), ColumnMode::Referenced);
        assert_eq!(src.mode(), ColumnMode::Owned);
        assert_eq!(view.get_value(0), Value::Int(7));
        // The view may never mutate; the source not while the view lives.
        assert!(view.append_value(&Value::Int(8)).is_err());
        assert!(src.append_value(&Value::Int(8)).is_err());
        drop(view);
        src.append_value(&Value::Int(8)).unwrap();
        assert_eq!(src.collect_i32(), vec![7, 8]);
    }

    #[test]
    fn reset_detaches_a_view() {
        let mut src = Column::new(AttrType::Ints, 4);
        src.append_value(&Value::Int(7)).unwrap();
        let mut view = Column::default();
        view.reference(&src);
        view.reset();
        assert_eq!(view.mode(), ColumnMode::Owned);
        assert_eq!(view.count(), 0);
        // The source detached from the alias and mutates again.
        src.append_value(&Value::Int(9)).unwrap();
        assert_eq!(src.collect_i32(), vec![7, 9]);
    }

    #[test]
    fn constant_column_repeats_value() {
        let col = Column::new_constant(Value::Int(1), 5);
        assert_eq!(col.count(), 5);
        assert_eq!(col.get_value(4), Value::Int(1));
        assert_eq!(col.mode(), ColumnMode::Constant);
    }

    #[test]
    fn resize_truncates_and_grows() {
        let mut col = Column::new(AttrType::Ints, 4);
        for v in 0..4 {
            col.append_value(&Value::Int(v)).unwrap();
        }
        col.resize(2).unwrap();
        assert_eq!(col.collect_i32(), vec![0, 1]);
        col.resize(3).unwrap();
        assert_eq!(col.collect_i32(), vec![0, 1, 0]);
    }

    #[test]
    fn write_element_and_reverse() {
        let mut col = Column::new(AttrType::Ints, 4);
        col.resize(3).unwrap();
        for (row, v) in [(0, 1i32), (1, 2), (2, 3)] {
            col.write_element(row, &v.to_le_bytes()).unwrap();
        }
        col.reverse_fixed().unwrap();
        assert_eq!(col.collect_i32(), vec![3, 2, 1]);
    }
}
