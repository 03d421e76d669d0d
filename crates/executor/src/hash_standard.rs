//! The general aggregation table: composite value keys mapped to one state
//! per aggregate. Handles any key arity and type; the specialized tables
//! exist because this one pays for `Value` materialization per row.

use ahash::RandomState;
use columnar::Chunk;
use common::{DbError, DbResult};
use expr::{AggState, AggregateKind};
use hashbrown::HashMap;
use std::hash::{Hash, Hasher};
use types::{AttrType, Value};

/// Composite group key. Hashing XORs the per-element string hashes;
/// equality is element-wise value comparison.
#[derive(Clone, Debug)]
pub struct GroupValues(pub Vec<Value>);

impl Hash for GroupValues {
    fn hash<H: Hasher>(&self, state: &mut H) {
        let mut combined = 0u64;
        for value in &self.0 {
            let mut inner = std::collections::hash_map::DefaultHasher::new();
            value.to_string().hash(&mut inner);
            combined ^= inner.finish();
        }
        state.write_u64(combined);
    }
}

impl PartialEq for GroupValues {
    fn eq(&self, other: &Self) -> bool {
        self.0.len() == other.0.len()
            && self
                .0
                .iter()
                .zip(&other.0)
                .all(|(a, b)| a.compare(b) == Some(std::cmp::Ordering::Equal))
    }
}

impl Eq for GroupValues {}

pub struct StandardAggregateHashTable {
    map: HashMap<GroupValues, Vec<AggState>, RandomState>,
    aggr_kinds: Vec<AggregateKind>,
    child_types: Vec<AttrType>,
    drained: Vec<(GroupValues, Vec<AggState>)>,
    scan_pos: usize,
}

impl StandardAggregateHashTable {
    pub fn new(aggr_kinds: Vec<AggregateKind>, child_types: Vec<AttrType>) -> Self {
        Self {
            // Fixed seeds keep iteration deterministic for a given input.
            map: HashMap::with_hasher(RandomState::with_seeds(11, 47, 97, 251)),
            aggr_kinds,
            child_types,
            drained: Vec::new(),
            scan_pos: 0,
        }
    }

    pub fn len(&self) -> usize {
        self.map.len()
    }

    pub fn is_empty(&self) -> bool {
        self.map.is_empty()
    }

    /// Fold one batch of keys and aggregate inputs in.
    pub fn add_chunk(&mut self, groups: &Chunk, aggrs: &Chunk) -> DbResult<()> {
        if groups.rows() != aggrs.rows() && groups.column_num() > 0 {
            return Err(DbError::InvalidArgument(format!(
                "group and aggregate batches disagree: {} vs {} rows",
                groups.rows(),
                aggrs.rows()
            )));
        }
        let rows = aggrs.rows();
        for row in 0..rows {
            let key = GroupValues(
                (0..groups.column_num())
                    .map(|pos| groups.get_value(pos, row))
                    .collect(),
            );
            if !self.map.contains_key(&key) {
                let states = self
                    .aggr_kinds
                    .iter()
                    .zip(&self.child_types)
                    .map(|(kind, child)| AggState::create(*kind, *child))
                    .collect::<DbResult<Vec<_>>>()?;
                self.map.insert(key.clone(), states);
            }
            let states = self
                .map
                .get_mut(&key)
                .ok_or_else(|| DbError::Internal("group entry vanished".into()))?;
            for (pos, state) in states.iter_mut().enumerate() {
                state.update_value(&aggrs.get_value(pos, row))?;
            }
        }
        Ok(())
    }

    /// Freeze the table for scanning.
    pub fn open_scan(&mut self) {
        self.drained = self.map.drain().collect();
        self.scan_pos = 0;
    }

    /// Emit one output row per entry: group columns and finalized aggregate
    /// columns, in the order the output chunk's logical ids request.
    pub fn scan_next(&mut self, output: &mut Chunk) -> DbResult<bool> {
        if self.scan_pos >= self.drained.len() {
            return Ok(false);
        }
        while self.scan_pos < self.drained.len() && output.rows() < output.capacity() {
            let (key, states) = &self.drained[self.scan_pos];
            let group_width = key.0.len() as i32;
            for pos in 0..output.column_num() {
                let col_id = output.column_ids(pos);
                if col_id < group_width {
                    output.append_value(pos, &key.0[col_id as usize])?;
                } else {
                    states[(col_id - group_width) as usize]
                        .finalize_into(output.column_mut(pos))?;
                }
            }
            self.scan_pos += 1;
        }
        Ok(true)
    }
}
