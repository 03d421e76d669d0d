//! Text storage: a 16-byte descriptor that inlines short strings and points
//! long ones into an arena (in memory) or the lob file (on disk).

/// Longest string stored inline in the descriptor.
pub const STRING_INLINE_LEN: usize = 12;

/// Width of one descriptor.
pub const STRING_T_LEN: usize = 16;

/// String descriptor.
///
/// Layout: `[size: i32 LE][inline: 12B]` when `size <= 12`, otherwise
/// `[size: i32 LE][prefix: 4B][offset: u64 LE]`. The offset points into the
/// owning column's arena while the value is in memory, and into the lob file
/// once persisted.
#[derive(Clone, Copy, PartialEq, Eq)]
pub struct StringT {
    bytes: [u8; STRING_T_LEN],
}

impl StringT {
    pub fn new_inline(data: &[u8]) -> Self {
        debug_assert!(data.len() <= STRING_INLINE_LEN);
        let mut bytes = [0u8; STRING_T_LEN];
        bytes[0..4].copy_from_slice(&(data.len() as i32).to_le_bytes());
        bytes[4..4 + data.len()].copy_from_slice(data);
        Self { bytes }
    }

    pub fn new_external(size: usize, prefix: &[u8], offset: u64) -> Self {
        debug_assert!(size > STRING_INLINE_LEN);
        let mut bytes = [0u8; STRING_T_LEN];
        bytes[0..4].copy_from_slice(&(size as i32).to_le_bytes());
        let n = prefix.len().min(4);
        bytes[4..4 + n].copy_from_slice(&prefix[..n]);
        bytes[8..16].copy_from_slice(&offset.to_le_bytes());
        Self { bytes }
    }

    pub fn from_bytes(raw: &[u8]) -> Self {
        let mut bytes = [0u8; STRING_T_LEN];
        bytes.copy_from_slice(&raw[..STRING_T_LEN]);
        Self { bytes }
    }

    pub fn as_bytes(&self) -> &[u8; STRING_T_LEN] {
        &self.bytes
    }

    pub fn size(&self) -> usize {
        let mut len = [0u8; 4];
        len.copy_from_slice(&self.bytes[0..4]);
        i32::from_le_bytes(len).max(0) as usize
    }

    pub fn is_inlined(&self) -> bool {
        self.size() <= STRING_INLINE_LEN
    }

    /// Inline payload; valid only when [`Self::is_inlined`].
    pub fn inline_bytes(&self) -> &[u8] {
        &self.bytes[4..4 + self.size()]
    }

    /// External offset; valid only when not inlined.
    pub fn offset(&self) -> u64 {
        let mut off = [0u8; 8];
        off.copy_from_slice(&self.bytes[8..16]);
        u64::from_le_bytes(off)
    }

    pub fn set_offset(&mut self, offset: u64) {
        self.bytes[8..16].copy_from_slice(&offset.to_le_bytes());
    }
}

impl std::fmt::Debug for StringT {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        if self.is_inlined() {
            write!(f, "StringT(inline {:?})", String::from_utf8_lossy(self.inline_bytes()))
        } else {
            write!(f, "StringT(size={} offset={})", self.size(), self.offset())
        }
    }
}

/// Append-only byte arena backing the non-inline strings of one column.
#[derive(Debug, Default, Clone)]
pub struct StringArena {
    buf: Vec<u8>,
}

impl StringArena {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn is_empty(&self) -> bool {
        self.buf.is_empty()
    }

    /// Place bytes and return their offset.
    pub fn append(&mut self, data: &[u8]) -> u64 {
        let offset = self.buf.len() as u64;
        self.buf.extend_from_slice(data);
        offset
    }

    pub fn get(&self, offset: u64, len: usize) -> &[u8] {
        let start = offset as usize;
        &self.buf[start..start + len]
    }

    pub fn clear(&mut self) {
        self.buf.clear();
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn short_strings_inline() {
        let s = StringT::new_inline(b"hello");
        assert!(s.is_inlined());
        assert_eq!(s.size(), 5);
        assert_eq!(s.inline_bytes(), b"hello");
    }

    #[test]
    fn twelve_bytes_still_inline() {
        let s = StringT::new_inline(b"exactly12byt");
        assert!(s.is_inlined());
        assert_eq!(s.inline_bytes(), b"exactly12byt");
    }

    #[test]
    fn long_strings_point_into_arena() {
        let mut arena = StringArena::new();
        let data = b"this string is far too long to inline";
        let offset = arena.append(data);
        let desc = StringT::new_external(data.len(), &data[..4], offset);
        assert!(!desc.is_inlined());
        assert_eq!(desc.size(), data.len());
        assert_eq!(arena.get(desc.offset(), desc.size()), data);
    }

    #[test]
    fn descriptor_round_trips_through_bytes() {
        let desc = StringT::new_external(20, b"abcd", 4096);
        let back = StringT::from_bytes(desc.as_bytes());
        assert_eq!(back, desc);
        assert_eq!(back.offset(), 4096);
    }

    #[test]
    fn offset_rewrite() {
        let mut desc = StringT::new_external(20, b"abcd", 0);
        desc.set_offset(777);
        assert_eq!(desc.offset(), 777);
        assert_eq!(desc.size(), 20);
    }
}
