//! Sorting operators. The full sort materializes every row with its key
//! tuple and sorts stably; the top-K variant keeps a bounded heap whose
//! root is the worst row currently kept.

use crate::PhysicalOperator;
use columnar::{Chunk, Column};
use common::DbResult;
use expr::Expression;
use std::cmp::Ordering;
use std::collections::BinaryHeap;
use std::sync::Arc;
use types::{AttrType, Value};

/// One ordering key: the expression and its direction.
pub struct SortKey {
    pub expr: Expression,
    pub asc: bool,
}

/// Lexicographic comparison over key tuples, inverting per-column for
/// descending keys.
pub struct OrderComparator {
    ascending: Vec<bool>,
}

impl OrderComparator {
    pub fn new(ascending: Vec<bool>) -> Self {
        Self { ascending }
    }

    pub fn compare(&self, a: &[Value], b: &[Value]) -> Ordering {
        for (pos, asc) in self.ascending.iter().enumerate() {
            let ord = a[pos].compare(&b[pos]).unwrap_or(Ordering::Equal);
            let ord = if *asc { ord } else { ord.reverse() };
            if ord != Ordering::Equal {
                return ord;
            }
        }
        Ordering::Equal
    }
}

/// Output layout captured from the first child chunk.
#[derive(Clone)]
struct ColumnLayout {
    attr_type: AttrType,
    attr_len: usize,
    id: i32,
}

fn capture_layout(chunk: &Chunk) -> Vec<ColumnLayout> {
    (0..chunk.column_num())
        .map(|pos| ColumnLayout {
            attr_type: chunk.column(pos).attr_type(),
            attr_len: chunk.column(pos).attr_len(),
            id: chunk.column_ids(pos),
        })
        .collect()
}

fn fetch_row(chunk: &Chunk, keys: &[Column], row: usize) -> (Vec<Value>, Vec<Value>) {
    let values = (0..chunk.column_num())
        .map(|pos| chunk.get_value(pos, row))
        .collect();
    let key = keys.iter().map(|col| col.get_value(row)).collect();
    (values, key)
}

fn emit_rows(
    layout: &[ColumnLayout],
    rows: Vec<Vec<Value>>,
    chunk: &mut Chunk,
) -> DbResult<()> {
    chunk.clear();
    let total = rows.len();
    for col in layout {
        let attr_len = if col.attr_type == AttrType::Undefined {
            0
        } else {
            col.attr_len
        };
        chunk.add_column(
            Column::with_capacity(col.attr_type, attr_len, total.max(1)),
            col.id,
        );
    }
    for row in rows {
        for (pos, value) in row.into_iter().enumerate() {
            if layout[pos].attr_type == AttrType::Undefined {
                continue;
            }
            chunk.column_mut(pos).append_value(&value)?;
        }
    }
    // Placeholder columns track the shared row count.
    for (pos, col) in layout.iter().enumerate() {
        if col.attr_type == AttrType::Undefined {
            chunk.column_mut(pos).resize(total)?;
        }
    }
    Ok(())
}

pub struct OrderByVec {
    child: Box<dyn PhysicalOperator>,
    keys: Vec<SortKey>,
    rows: Vec<(Vec<Value>, Vec<Value>)>,
    layout: Vec<ColumnLayout>,
    emitted: bool,
}

impl OrderByVec {
    pub fn new(child: Box<dyn PhysicalOperator>, keys: Vec<SortKey>) -> Self {
        Self {
            child,
            keys,
            rows: Vec::new(),
            layout: Vec::new(),
            emitted: false,
        }
    }
}

impl PhysicalOperator for OrderByVec {
    fn open(&mut self) -> DbResult<()> {
        self.child.open()?;
        self.rows.clear();
        self.layout.clear();
        self.emitted = false;

        let comparator =
            OrderComparator::new(self.keys.iter().map(|k| k.asc).collect());
        let mut chunk = Chunk::new();
        while self.child.next(&mut chunk)? {
            if chunk.rows() == 0 {
                continue;
            }
            if self.layout.is_empty() {
                self.layout = capture_layout(&chunk);
            }
            let mut key_cols = Vec::with_capacity(self.keys.len());
            for key in &self.keys {
                let mut col = Column::default();
                key.expr.get_column(&chunk, &mut col)?;
                key_cols.push(col);
            }
            for row in 0..chunk.rows() {
                self.rows.push(fetch_row(&chunk, &key_cols, row));
            }
            chunk.reset();
        }
        // Stable sort keeps insertion order among equal keys.
        self.rows
            .sort_by(|a, b| comparator.compare(&a.1, &b.1));
        Ok(())
    }

    fn next(&mut self, chunk: &mut Chunk) -> DbResult<bool> {
        if self.emitted || self.rows.is_empty() {
            return Ok(false);
        }
        self.emitted = true;
        let rows = std::mem::take(&mut self.rows)
            .into_iter()
            .map(|(values, _)| values)
            .collect();
        emit_rows(&self.layout, rows, chunk)?;
        Ok(true)
    }

    fn close(&mut self) -> DbResult<()> {
        self.rows.clear();
        self.child.close()
    }

    fn schema(&self) -> &[String] {
        self.child.schema()
    }
}

/// Heap entry carrying its comparator; the heap's maximum is the row that
/// leaves first when a better one arrives. The sequence number breaks ties
/// toward earlier input rows.
struct HeapEntry {
    key: Vec<Value>,
    values: Vec<Value>,
    seq: usize,
    comparator: Arc<OrderComparator>,
}

impl PartialEq for HeapEntry {
    fn eq(&self, other: &Self) -> bool {
        self.cmp(other) == Ordering::Equal
    }
}

impl Eq for HeapEntry {}

impl PartialOrd for HeapEntry {
    fn partial_cmp(&self, other: &Self) -> Option<Ordering> {
        Some(self.cmp(other))
    }
}

impl Ord for HeapEntry {
    fn cmp(&self, other: &Self) -> Ordering {
        self.comparator
            .compare(&self.key, &other.key)
            .then(self.seq.cmp(&other.seq))
    }
}

pub struct OrderByLimitVec {
    child: Box<dyn PhysicalOperator>,
    keys: Vec<SortKey>,
    n: usize,
    heap: BinaryHeap<HeapEntry>,
    layout: Vec<ColumnLayout>,
    emitted: bool,
}

impl OrderByLimitVec {
    pub fn new(child: Box<dyn PhysicalOperator>, keys: Vec<SortKey>, n: usize) -> Self {
        Self {
            child,
            keys,
            n,
            heap: BinaryHeap::new(),
            layout: Vec::new(),
            emitted: false,
        }
    }
}

impl PhysicalOperator for OrderByLimitVec {
    fn open(&mut self) -> DbResult<()> {
        self.child.open()?;
        self.heap.clear();
        self.layout.clear();
        self.emitted = false;
        if self.n == 0 {
            // Still drain the child so close tears down cleanly.
            let mut chunk = Chunk::new();
            while self.child.next(&mut chunk)? {
                chunk.reset();
            }
            return Ok(());
        }

        let comparator = Arc::new(OrderComparator::new(
            self.keys.iter().map(|k| k.asc).collect(),
        ));
        let mut seq = 0usize;
        let mut chunk = Chunk::new();
        while self.child.next(&mut chunk)? {
            if chunk.rows() == 0 {
                continue;
            }
            if self.layout.is_empty() {
                self.layout = capture_layout(&chunk);
            }
            let mut key_cols = Vec::with_capacity(self.keys.len());
            for key in &self.keys {
                let mut col = Column::default();
                key.expr.get_column(&chunk, &mut col)?;
                key_cols.push(col);
            }
            for row in 0..chunk.rows() {
                let (values, key) = fetch_row(&chunk, &key_cols, row);
                self.heap.push(HeapEntry {
                    key,
                    values,
                    seq,
                    comparator: comparator.clone(),
                });
                seq += 1;
                if self.heap.len() > self.n {
                    self.heap.pop();
                }
            }
            chunk.reset();
        }
        Ok(())
    }

    fn next(&mut self, chunk: &mut Chunk) -> DbResult<bool> {
        if self.emitted || self.heap.is_empty() {
            return Ok(false);
        }
        self.emitted = true;
        let mut rows = Vec::with_capacity(self.heap.len());
        while let Some(entry) = self.heap.pop() {
            rows.push(entry.values);
        }
        rows.reverse();
        emit_rows(&self.layout, rows, chunk)?;
        Ok(true)
    }

    fn close(&mut self) -> DbResult<()> {
        self.heap.clear();
        self.child.close()
    }

    fn schema(&self) -> &[String] {
        self.child.schema()
    }
}
