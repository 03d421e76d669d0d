//! Open-addressed aggregation table for the hot path: a single `int` group
//! key and a single sum aggregate. The batch insert keeps a lane of probe
//! state per element so a collision in one lane never stalls the others,
//! then falls back to scalar probing for stragglers and the tail.

use columnar::{Chunk, Column};
use common::{DbError, DbResult};

/// Sentinel for an unoccupied slot.
pub const EMPTY_KEY: i32 = -1;

const DEFAULT_CAPACITY: usize = 16384;

/// Aggregated value types the table can carry.
pub trait ProbeValue: Copy + Default + PartialEq + std::fmt::Debug + Send {
    /// Lanes processed per batch step: 8 for 4-byte values, 4 for 8-byte.
    const LANES: usize;

    fn add(self, other: Self) -> Self;
    fn collect(column: &Column) -> Vec<Self>;
    fn append_to(self, column: &mut Column) -> DbResult<()>;
}

impl ProbeValue for i32 {
    const LANES: usize = 8;

    fn add(self, other: Self) -> Self {
        self.wrapping_add(other)
    }

    fn collect(column: &Column) -> Vec<Self> {
        column.collect_i32()
    }

    fn append_to(self, column: &mut Column) -> DbResult<()> {
        column.append_raw(&self.to_le_bytes())
    }
}

impl ProbeValue for i64 {
    const LANES: usize = 4;

    fn add(self, other: Self) -> Self {
        self.wrapping_add(other)
    }

    fn collect(column: &Column) -> Vec<Self> {
        column.collect_i64()
    }

    fn append_to(self, column: &mut Column) -> DbResult<()> {
        column.append_raw(&self.to_le_bytes())
    }
}

impl ProbeValue for f32 {
    const LANES: usize = 8;

    fn add(self, other: Self) -> Self {
        self + other
    }

    fn collect(column: &Column) -> Vec<Self> {
        column.collect_f32()
    }

    fn append_to(self, column: &mut Column) -> DbResult<()> {
        column.append_raw(&self.to_le_bytes())
    }
}

pub struct LinearProbingAggTable<V: ProbeValue> {
    keys: Vec<i32>,
    values: Vec<V>,
    size: usize,
    capacity: usize,
    scan_pos: usize,
    scan_count: usize,
}

impl<V: ProbeValue> Default for LinearProbingAggTable<V> {
    fn default() -> Self {
        Self::new()
    }
}

impl<V: ProbeValue> LinearProbingAggTable<V> {
    pub fn new() -> Self {
        Self {
            keys: vec![EMPTY_KEY; DEFAULT_CAPACITY],
            values: vec![V::default(); DEFAULT_CAPACITY],
            size: 0,
            capacity: DEFAULT_CAPACITY,
            scan_pos: 0,
            scan_count: 0,
        }
    }

    pub fn size(&self) -> usize {
        self.size
    }

    pub fn capacity(&self) -> usize {
        self.capacity
    }

    fn home_slot(&self, key: i32) -> usize {
        let cap = self.capacity as i64;
        ((key as i64 % cap + cap) % cap) as usize
    }

    /// Probe for a key's aggregate.
    pub fn get(&self, key: i32) -> Option<V> {
        let mut slot = self.home_slot(key);
        for _ in 0..=self.capacity {
            if self.keys[slot] == EMPTY_KEY {
                return None;
            }
            if self.keys[slot] == key {
                return Some(self.values[slot]);
            }
            slot = (slot + 1) % self.capacity;
        }
        None
    }

    fn add_one(&mut self, key: i32, value: V) {
        let mut slot = self.home_slot(key);
        loop {
            if self.keys[slot] == key {
                self.values[slot] = self.values[slot].add(value);
                return;
            }
            if self.keys[slot] == EMPTY_KEY {
                self.keys[slot] = key;
                self.values[slot] = value;
                self.size += 1;
                return;
            }
            slot = (slot + 1) % self.capacity;
        }
    }

    /// Batch insert. Lane `j` carries `(key, value, probe offset)` across
    /// iterations; a finished lane loads a fresh input element next round
    /// while colliding lanes keep probing from an incremented offset.
    pub fn add_batch(&mut self, keys: &[i32], values: &[V]) {
        let lanes = V::LANES;
        let len = keys.len();
        let mut finished = vec![true; lanes];
        let mut lane_keys = vec![0i32; lanes];
        let mut lane_values = vec![V::default(); lanes];
        let mut offsets = vec![0usize; lanes];

        let mut cursor = 0usize;
        while cursor + lanes <= len {
            let mut loaded = 0usize;
            for lane in 0..lanes {
                if finished[lane] {
                    lane_keys[lane] = keys[cursor + loaded];
                    lane_values[lane] = values[cursor + loaded];
                    offsets[lane] = 0;
                    loaded += 1;
                }
            }
            cursor += loaded;
            for lane in 0..lanes {
                finished[lane] = false;
            }

            for lane in 0..lanes {
                let slot = (self.home_slot(lane_keys[lane]) + offsets[lane]) % self.capacity;
                if self.keys[slot] == lane_keys[lane] {
                    self.values[slot] = self.values[slot].add(lane_values[lane]);
                    offsets[lane] = 0;
                    finished[lane] = true;
                } else if self.keys[slot] == EMPTY_KEY {
                    self.keys[slot] = lane_keys[lane];
                    self.values[slot] = lane_values[lane];
                    self.size += 1;
                    offsets[lane] = 0;
                    finished[lane] = true;
                } else {
                    offsets[lane] += 1;
                }
            }
        }

        for lane in 0..lanes {
            if !finished[lane] {
                self.add_one(lane_keys[lane], lane_values[lane]);
            }
        }
        for i in cursor..len {
            self.add_one(keys[i], values[i]);
        }
        self.resize_if_needed();
    }

    /// One int key column, one sum input column.
    pub fn add_chunk(&mut self, groups: &Chunk, aggrs: &Chunk) -> DbResult<()> {
        if groups.column_num() != 1 || aggrs.column_num() != 1 {
            return Err(DbError::InvalidArgument(
                "the probing table takes exactly one key and one aggregate".into(),
            ));
        }
        if groups.rows() != aggrs.rows() {
            return Err(DbError::InvalidArgument(
                "key and aggregate batches disagree on rows".into(),
            ));
        }
        let keys = groups.column(0).collect_i32();
        let values = V::collect(aggrs.column(0));
        self.add_batch(&keys, &values);
        Ok(())
    }

    fn resize_if_needed(&mut self) {
        if self.size >= self.capacity / 2 {
            self.resize();
        }
    }

    fn resize(&mut self) {
        let new_capacity = self.capacity * 2;
        let mut keys = vec![EMPTY_KEY; new_capacity];
        let mut values = vec![V::default(); new_capacity];
        let cap = new_capacity as i64;
        for (key, value) in self.keys.iter().zip(&self.values) {
            if *key == EMPTY_KEY {
                continue;
            }
            let mut slot = ((*key as i64 % cap + cap) % cap) as usize;
            while keys[slot] != EMPTY_KEY {
                slot = (slot + 1) % new_capacity;
            }
            keys[slot] = *key;
            values[slot] = *value;
        }
        self.keys = keys;
        self.values = values;
        self.capacity = new_capacity;
    }

    pub fn open_scan(&mut self) {
        self.scan_pos = 0;
        self.scan_count = 0;
    }

    /// Emit `(key, sum)` pairs into the output's first two columns.
    pub fn scan_next(&mut self, output: &mut Chunk) -> DbResult<bool> {
        if self.scan_pos >= self.capacity || self.scan_count >= self.size {
            return Ok(false);
        }
        while self.scan_pos < self.capacity
            && self.scan_count < self.size
            && output.rows() < output.capacity()
        {
            let slot = self.scan_pos;
            self.scan_pos += 1;
            if self.keys[slot] == EMPTY_KEY {
                continue;
            }
            output
                .column_mut(0)
                .append_raw(&self.keys[slot].to_le_bytes())?;
            self.values[slot].append_to(output.column_mut(1))?;
            self.scan_count += 1;
        }
        Ok(true)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use proptest::prelude::*;
    use std::collections::HashMap;

    #[test]
    fn batch_insert_sums_by_key() {
        let mut table = LinearProbingAggTable::<i32>::new();
        let keys = [1, 2, 1, 2, 1, 3, 3, 2, 1, 2];
        let values = [10, 20, 30, 40, 50, 60, 70, 80, 90, 100];
        table.add_batch(&keys, &values);
        assert_eq!(table.size(), 3);
        assert_eq!(table.get(1), Some(180));
        assert_eq!(table.get(2), Some(240));
        assert_eq!(table.get(3), Some(130));
        assert_eq!(table.get(4), None);
    }

    #[test]
    fn tail_shorter_than_a_lane_is_handled() {
        let mut table = LinearProbingAggTable::<i32>::new();
        table.add_batch(&[5, 5, 5], &[1, 2, 3]);
        assert_eq!(table.get(5), Some(6));
        assert_eq!(table.size(), 1);
    }

    #[test]
    fn colliding_keys_probe_forward() {
        let mut table = LinearProbingAggTable::<i32>::new();
        // These keys share a home slot modulo the default capacity.
        let cap = table.capacity() as i32;
        let keys = [7, 7 + cap, 7 + 2 * cap, 7];
        table.add_batch(&keys, &[1, 2, 3, 4]);
        assert_eq!(table.size(), 3);
        assert_eq!(table.get(7), Some(5));
        assert_eq!(table.get(7 + cap), Some(2));
        assert_eq!(table.get(7 + 2 * cap), Some(3));
    }

    #[test]
    fn grows_before_reaching_half_full() {
        let mut table = LinearProbingAggTable::<i64>::new();
        let initial_capacity = table.capacity();
        let n = (initial_capacity / 2 + 1000) as i32;
        let keys: Vec<i32> = (0..n).collect();
        let values: Vec<i64> = (0..n as i64).collect();
        table.add_batch(&keys, &values);
        assert!(table.capacity() >= initial_capacity * 2);
        assert!(table.size() < table.capacity() / 2);
        assert_eq!(table.get(n - 1), Some((n - 1) as i64));
    }

    #[test]
    fn scan_emits_every_group_once() {
        use columnar::Column;
        use types::AttrType;

        let mut table = LinearProbingAggTable::<i32>::new();
        table.add_batch(&[4, 9, 4, 2], &[1, 2, 3, 4]);
        table.open_scan();
        let mut out = Chunk::new();
        out.add_column(Column::new(AttrType::Ints, 4), 0);
        out.add_column(Column::new(AttrType::Ints, 4), 1);
        assert!(table.scan_next(&mut out).unwrap());
        let mut rows: Vec<(i32, i32)> = (0..out.rows())
            .map(|r| (out.column(0).i32_at(r), out.column(1).i32_at(r)))
            .collect();
        rows.sort();
        assert_eq!(rows, vec![(2, 4), (4, 4), (9, 2)]);
        assert!(!table.scan_next(&mut out).unwrap());
    }

    proptest! {
        #[test]
        fn matches_a_reference_map(
            pairs in prop::collection::vec((0i32..500, -1000i32..1000), 0..400)
        ) {
            let keys: Vec<i32> = pairs.iter().map(|(k, _)| *k).collect();
            let values: Vec<i32> = pairs.iter().map(|(_, v)| *v).collect();
            let mut table = LinearProbingAggTable::<i32>::new();
            table.add_batch(&keys, &values);

            let mut reference: HashMap<i32, i32> = HashMap::new();
            for (k, v) in &pairs {
                *reference.entry(*k).or_default() += *v;
            }
            prop_assert_eq!(table.size(), reference.len());
            for (k, v) in reference {
                prop_assert_eq!(table.get(k), Some(v));
            }
        }
    }
}
