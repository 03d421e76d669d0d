//! Statically-keyed aggregation tables. One generic table covers the hot
//! multi-column key shapes behind a small object-safe trait, instead of a
//! per-shape code explosion; a factory instantiates the supported
//! `(key types, aggregate count)` combinations.

use ahash::RandomState;
use columnar::{Chunk, Column};
use common::{DbError, DbResult};
use expr::{AggState, AggregateKind};
use hashbrown::HashMap;
use std::cmp::Ordering;
use std::collections::BinaryHeap;
use std::hash::Hash;
use types::AttrType;

/// One component of a group key.
pub trait GroupKeyPart: Clone + Eq + Hash + Send {
    fn extract(column: &Column, row: usize) -> DbResult<Self>;

    /// Overwrite the element at `row`; the column is already sized.
    fn write_at(&self, column: &mut Column, row: usize) -> DbResult<()>;

    fn append(&self, column: &mut Column) -> DbResult<()>;
}

impl GroupKeyPart for i32 {
    fn extract(column: &Column, row: usize) -> DbResult<Self> {
        Ok(column.i32_at(row))
    }

    fn write_at(&self, column: &mut Column, row: usize) -> DbResult<()> {
        column.write_element(row, &self.to_le_bytes())
    }

    fn append(&self, column: &mut Column) -> DbResult<()> {
        column.append_raw(&self.to_le_bytes())
    }
}

impl GroupKeyPart for i64 {
    fn extract(column: &Column, row: usize) -> DbResult<Self> {
        Ok(column.i64_at(row))
    }

    fn write_at(&self, column: &mut Column, row: usize) -> DbResult<()> {
        column.write_element(row, &self.to_le_bytes())
    }

    fn append(&self, column: &mut Column) -> DbResult<()> {
        column.append_raw(&self.to_le_bytes())
    }
}

impl GroupKeyPart for String {
    fn extract(column: &Column, row: usize) -> DbResult<Self> {
        match column.get_value(row).as_str() {
            Some(s) => Ok(s.to_string()),
            None => Err(DbError::FieldTypeMismatch(
                "string group key over a non-string column".into(),
            )),
        }
    }

    fn write_at(&self, column: &mut Column, row: usize) -> DbResult<()> {
        match column.attr_type() {
            AttrType::Texts => {
                let desc = column.add_text(self.as_bytes())?;
                column.write_element(row, desc.as_bytes())
            }
            _ => {
                let mut padded = vec![0u8; column.attr_len()];
                let n = self.len().min(padded.len());
                padded[..n].copy_from_slice(&self.as_bytes()[..n]);
                column.write_element(row, &padded)
            }
        }
    }

    fn append(&self, column: &mut Column) -> DbResult<()> {
        match column.attr_type() {
            AttrType::Texts => {
                let desc = column.add_text(self.as_bytes())?;
                column.append_raw(desc.as_bytes())
            }
            _ => {
                let mut padded = vec![0u8; column.attr_len()];
                let n = self.len().min(padded.len());
                padded[..n].copy_from_slice(&self.as_bytes()[..n]);
                column.append_raw(&padded)
            }
        }
    }
}

/// A complete group key: a tuple of parts aligned with the leading output
/// columns.
pub trait GroupKey: Clone + Eq + Hash + Send {
    const WIDTH: usize;

    fn extract(groups: &Chunk, row: usize) -> DbResult<Self>;
    fn write_at(&self, output: &mut Chunk, row: usize) -> DbResult<()>;
    fn append(&self, output: &mut Chunk) -> DbResult<()>;
}

macro_rules! impl_group_key {
    ($width:expr; $($part:ident @ $idx:tt),+) => {
        impl<$($part: GroupKeyPart),+> GroupKey for ($($part,)+) {
            const WIDTH: usize = $width;

            fn extract(groups: &Chunk, row: usize) -> DbResult<Self> {
                Ok(($($part::extract(groups.column($idx), row)?,)+))
            }

            fn write_at(&self, output: &mut Chunk, row: usize) -> DbResult<()> {
                $(self.$idx.write_at(output.column_mut($idx), row)?;)+
                Ok(())
            }

            fn append(&self, output: &mut Chunk) -> DbResult<()> {
                $(self.$idx.append(output.column_mut($idx))?;)+
                Ok(())
            }
        }
    };
}

impl_group_key!(1; A @ 0);
impl_group_key!(2; A @ 0, B @ 1);
impl_group_key!(4; A @ 0, B @ 1, C @ 2, D @ 3);

/// Object-safe face of the specialized tables.
pub trait SpecializedTable: Send {
    fn add_chunk(&mut self, groups: &Chunk, aggrs: &Chunk) -> DbResult<()>;

    /// Stream all entries: key columns then finalized aggregates.
    fn scan_next(&mut self, output: &mut Chunk) -> DbResult<bool>;

    /// Keep only the `n` entries with the highest count and materialize
    /// them into `output` in descending count order.
    fn drain_top_n(&mut self, output: &mut Chunk, count_pos: usize, n: usize) -> DbResult<()>;
}

pub struct SpecializedAggTable<K: GroupKey, const N: usize> {
    map: HashMap<K, [AggState; N], RandomState>,
    kinds: [AggregateKind; N],
    child_types: [AttrType; N],
    drained: Vec<(K, [AggState; N])>,
    scan_pos: usize,
    scanning: bool,
}

impl<K: GroupKey, const N: usize> SpecializedAggTable<K, N> {
    pub fn new(kinds: [AggregateKind; N], child_types: [AttrType; N]) -> DbResult<Self> {
        let table = Self {
            map: HashMap::with_hasher(RandomState::with_seeds(3, 31, 127, 8191)),
            kinds,
            child_types,
            drained: Vec::new(),
            scan_pos: 0,
            scanning: false,
        };
        // Validate the aggregate shapes up front.
        table.make_states()?;
        Ok(table)
    }

    fn make_states(&self) -> DbResult<[AggState; N]> {
        let states = self
            .kinds
            .iter()
            .zip(&self.child_types)
            .map(|(kind, child)| AggState::create(*kind, *child))
            .collect::<DbResult<Vec<_>>>()?;
        states
            .try_into()
            .map_err(|_| DbError::Internal("aggregate arity mismatch".into()))
    }
}

/// Heap row ordered by count alone; ties are arbitrary like any hash drain.
struct CountRow<K, const N: usize> {
    count: i64,
    key: K,
    states: [AggState; N],
}

impl<K, const N: usize> PartialEq for CountRow<K, N> {
    fn eq(&self, other: &Self) -> bool {
        self.count == other.count
    }
}

impl<K, const N: usize> Eq for CountRow<K, N> {}

impl<K, const N: usize> PartialOrd for CountRow<K, N> {
    fn partial_cmp(&self, other: &Self) -> Option<Ordering> {
        Some(self.cmp(other))
    }
}

impl<K, const N: usize> Ord for CountRow<K, N> {
    fn cmp(&self, other: &Self) -> Ordering {
        self.count.cmp(&other.count)
    }
}

impl<K: GroupKey, const N: usize> SpecializedTable for SpecializedAggTable<K, N> {
    fn add_chunk(&mut self, groups: &Chunk, aggrs: &Chunk) -> DbResult<()> {
        if groups.rows() != aggrs.rows() {
            return Err(DbError::InvalidArgument(format!(
                "group and aggregate batches disagree: {} vs {} rows",
                groups.rows(),
                aggrs.rows()
            )));
        }
        for row in 0..groups.rows() {
            let key = K::extract(groups, row)?;
            if !self.map.contains_key(&key) {
                let states = self.make_states()?;
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

    fn scan_next(&mut self, output: &mut Chunk) -> DbResult<bool> {
        if !self.scanning {
            self.drained = self.map.drain().collect();
            self.scan_pos = 0;
            self.scanning = true;
        }
        if self.scan_pos >= self.drained.len() {
            return Ok(false);
        }
        while self.scan_pos < self.drained.len() && output.rows() < output.capacity() {
            let (key, states) = &self.drained[self.scan_pos];
            key.append(output)?;
            for (pos, state) in states.iter().enumerate() {
                state.finalize_into(output.column_mut(K::WIDTH + pos))?;
            }
            self.scan_pos += 1;
        }
        Ok(true)
    }

    fn drain_top_n(&mut self, output: &mut Chunk, count_pos: usize, n: usize) -> DbResult<()> {
        if count_pos >= N {
            return Err(DbError::InvalidArgument(
                "count position outside the aggregate list".into(),
            ));
        }
        // Min-heap of size n keyed by count; entries that fall out are gone.
        let mut heap: BinaryHeap<std::cmp::Reverse<CountRow<K, N>>> =
            BinaryHeap::with_capacity(n + 1);
        for (key, states) in self.map.drain() {
            let count = states[count_pos].count_value();
            if heap.len() < n {
                heap.push(std::cmp::Reverse(CountRow { count, key, states }));
            } else if let Some(top) = heap.peek() {
                if count > top.0.count {
                    heap.pop();
                    heap.push(std::cmp::Reverse(CountRow { count, key, states }));
                }
            }
        }

        let rows = heap.len();
        for pos in 0..K::WIDTH {
            output.column_mut(pos).resize(rows)?;
        }
        // Keys land directly at their final position, descending by count;
        // aggregates are appended ascending and reversed afterwards.
        let mut row = rows;
        while let Some(std::cmp::Reverse(entry)) = heap.pop() {
            row -= 1;
            entry.key.write_at(output, row)?;
            for (pos, state) in entry.states.iter().enumerate() {
                state.finalize_into(output.column_mut(K::WIDTH + pos))?;
            }
        }
        for pos in K::WIDTH..output.column_num() {
            output.column_mut(pos).reverse_fixed()?;
        }
        Ok(())
    }
}

/// Instantiate a specialized table for the supported dispatch shapes, or
/// `None` when the shape has no specialization.
pub fn build_specialized(
    group_types: &[AttrType],
    aggrs: &[(AggregateKind, AttrType)],
) -> DbResult<Option<Box<dyn SpecializedTable>>> {
    use AttrType::*;

    let kinds1 = |a: &[(AggregateKind, AttrType)]| -> ([AggregateKind; 1], [AttrType; 1]) {
        ([a[0].0], [a[0].1])
    };
    let kinds3 = |a: &[(AggregateKind, AttrType)]| -> ([AggregateKind; 3], [AttrType; 3]) {
        ([a[0].0, a[1].0, a[2].0], [a[0].1, a[1].1, a[2].1])
    };

    let table: Box<dyn SpecializedTable> = match (group_types, aggrs.len()) {
        ([Texts], 1) => {
            let (kinds, children) = kinds1(aggrs);
            Box::new(SpecializedAggTable::<(String,), 1>::new(kinds, children)?)
        }
        ([Bigints], 1) => {
            let (kinds, children) = kinds1(aggrs);
            Box::new(SpecializedAggTable::<(i64,), 1>::new(kinds, children)?)
        }
        ([Ints, Texts], 1) => {
            let (kinds, children) = kinds1(aggrs);
            Box::new(SpecializedAggTable::<(i32, String), 1>::new(kinds, children)?)
        }
        ([Bigints, Texts], 1) => {
            let (kinds, children) = kinds1(aggrs);
            Box::new(SpecializedAggTable::<(i64, String), 1>::new(kinds, children)?)
        }
        ([Ints, Bigints], 3) => {
            let (kinds, children) = kinds3(aggrs);
            Box::new(SpecializedAggTable::<(i32, i64), 3>::new(kinds, children)?)
        }
        ([Bigints, Bigints], 3) => {
            let (kinds, children) = kinds3(aggrs);
            Box::new(SpecializedAggTable::<(i64, i64), 3>::new(kinds, children)?)
        }
        ([Bigints, Bigints, Bigints, Bigints], 1) => {
            let (kinds, children) = kinds1(aggrs);
            Box::new(SpecializedAggTable::<(i64, i64, i64, i64), 1>::new(
                kinds, children,
            )?)
        }
        _ => return Ok(None),
    };
    Ok(Some(table))
}

#[cfg(test)]
mod tests {
    use super::*;
    use types::Value;

    fn text_col(values: &[&str]) -> Column {
        let mut col = Column::new(AttrType::Texts, 16);
        for v in values {
            col.append_value(&Value::Texts((*v).into())).unwrap();
        }
        col
    }

    fn int_col(values: &[i32]) -> Column {
        let mut col = Column::new(AttrType::Ints, 4);
        for v in values {
            col.append_value(&Value::Int(*v)).unwrap();
        }
        col
    }

    fn bigint_col(values: &[i64]) -> Column {
        let mut col = Column::new(AttrType::Bigints, 8);
        for v in values {
            col.append_value(&Value::Bigint(*v)).unwrap();
        }
        col
    }

    #[test]
    fn factory_covers_the_dispatch_shapes() {
        let count = [(AggregateKind::Count, AttrType::Ints)];
        let three = [
            (AggregateKind::Count, AttrType::Ints),
            (AggregateKind::Sum, AttrType::Bigints),
            (AggregateKind::Avg, AttrType::Bigints),
        ];
        assert!(build_specialized(&[AttrType::Texts], &count).unwrap().is_some());
        assert!(build_specialized(&[AttrType::Bigints], &count).unwrap().is_some());
        assert!(build_specialized(&[AttrType::Ints, AttrType::Texts], &count)
            .unwrap()
            .is_some());
        assert!(build_specialized(&[AttrType::Bigints, AttrType::Bigints], &three)
            .unwrap()
            .is_some());
        assert!(build_specialized(
            &[AttrType::Bigints; 4],
            &count
        )
        .unwrap()
        .is_some());
        // Unsupported shapes fall back to the standard table.
        assert!(build_specialized(&[AttrType::Floats], &count).unwrap().is_none());
        assert!(build_specialized(&[AttrType::Texts, AttrType::Texts], &count)
            .unwrap()
            .is_none());
    }

    #[test]
    fn top_n_by_count_keeps_the_heaviest_groups() {
        let mut table = SpecializedAggTable::<(String,), 1>::new(
            [AggregateKind::Count],
            [AttrType::Ints],
        )
        .unwrap();

        let mut groups = Chunk::new();
        groups.add_column(text_col(&["a", "b", "a", "c", "a", "b"]), 0);
        let mut aggrs = Chunk::new();
        aggrs.add_column(int_col(&[1; 6]), 0);
        table.add_chunk(&groups, &aggrs).unwrap();

        let mut out = Chunk::new();
        out.add_column(Column::new(AttrType::Texts, 16), 0);
        out.add_column(Column::new(AttrType::Bigints, 8), 1);
        table.drain_top_n(&mut out, 0, 2).unwrap();

        assert_eq!(out.rows(), 2);
        assert_eq!(out.get_value(0, 0), Value::Texts("a".into()));
        assert_eq!(out.get_value(1, 0), Value::Bigint(3));
        assert_eq!(out.get_value(0, 1), Value::Texts("b".into()));
        assert_eq!(out.get_value(1, 1), Value::Bigint(2));
    }

    #[test]
    fn multi_key_multi_aggregate() {
        let mut table = SpecializedAggTable::<(i64, i64), 3>::new(
            [AggregateKind::Count, AggregateKind::Sum, AggregateKind::Avg],
            [AttrType::Ints, AttrType::Bigints, AttrType::Bigints],
        )
        .unwrap();

        let mut groups = Chunk::new();
        groups.add_column(bigint_col(&[1, 1, 2, 1]), 0);
        groups.add_column(bigint_col(&[5, 5, 5, 6]), 1);
        let mut aggrs = Chunk::new();
        aggrs.add_column(int_col(&[1; 4]), 0);
        aggrs.add_column(bigint_col(&[10, 20, 30, 40]), 1);
        aggrs.add_column(bigint_col(&[2, 4, 6, 8]), 2);
        table.add_chunk(&groups, &aggrs).unwrap();

        let mut out = Chunk::new();
        out.add_column(Column::new(AttrType::Bigints, 8), 0);
        out.add_column(Column::new(AttrType::Bigints, 8), 1);
        out.add_column(Column::new(AttrType::Bigints, 8), 2);
        out.add_column(Column::new(AttrType::Bigints, 8), 3);
        out.add_column(Column::new(AttrType::Floats, 4), 4);
        assert!(table.scan_next(&mut out).unwrap());
        assert_eq!(out.rows(), 3);

        let mut rows: Vec<(i64, i64, i64, i64, f32)> = (0..out.rows())
            .map(|r| {
                (
                    out.column(0).i64_at(r),
                    out.column(1).i64_at(r),
                    out.column(2).i64_at(r),
                    out.column(3).i64_at(r),
                    out.column(4).f32_at(r),
                )
            })
            .collect();
        rows.sort_by(|a, b| (a.0, a.1).cmp(&(b.0, b.1)));
        assert_eq!(rows[0], (1, 5, 2, 30, 3.0));
        assert_eq!(rows[1], (1, 6, 1, 40, 8.0));
        assert_eq!(rows[2], (2, 5, 1, 30, 6.0));
    }

    #[test]
    fn top_n_with_fewer_groups_than_n() {
        let mut table = SpecializedAggTable::<(i64,), 1>::new(
            [AggregateKind::Count],
            [AttrType::Ints],
        )
        .unwrap();
        let mut groups = Chunk::new();
        groups.add_column(bigint_col(&[9, 9, 8]), 0);
        let mut aggrs = Chunk::new();
        aggrs.add_column(int_col(&[1; 3]), 0);
        table.add_chunk(&groups, &aggrs).unwrap();

        let mut out = Chunk::new();
        out.add_column(Column::new(AttrType::Bigints, 8), 0);
        out.add_column(Column::new(AttrType::Bigints, 8), 1);
        table.drain_top_n(&mut out, 0, 10).unwrap();
        assert_eq!(out.rows(), 2);
        assert_eq!(out.get_value(0, 0), Value::Bigint(9));
        assert_eq!(out.get_value(1, 0), Value::Bigint(2));
    }
}
