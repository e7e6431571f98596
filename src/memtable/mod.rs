//! MemTable — the in-memory ordered table of in-flight cells.
//!
//! The memtable holds the latest cell per key in a concurrent skip list
//! (`crossbeam_skiplist::SkipMap`), so writers only need the engine's
//! *read* lock: the map provides its own per-key synchronization, and
//! multiple upserts and removes may run concurrently. Cells are immutable
//! values, so cursors never observe a torn cell.
//!
//! A remove does not erase the entry — it stores a tombstone cell, which
//! must survive the flush so older on-disk versions stay shadowed.
//!
//! `size_in_bytes` is a running total of serialized-size estimates, used
//! only to decide when to flush. Replacing a key adds the replacement's
//! size without reclaiming the old one; the estimate only ever errs
//! toward flushing earlier.

#[cfg(test)]
mod tests;

use std::ops::Bound;
use std::sync::{
    atomic::{AtomicUsize, Ordering},
    Arc,
};

use crossbeam_skiplist::SkipMap;

use crate::cell::Cell;

/// In-memory ordered map from key to its latest cell.
#[derive(Debug, Default)]
pub struct Memtable {
    cells: SkipMap<Vec<u8>, Cell>,
    approx_size: AtomicUsize,
}

impl Memtable {
    pub fn new() -> Self {
        Self::default()
    }

    /// Inserts or replaces the cell for `cell.key`.
    ///
    /// A concurrent writer may race on the same key; the cell with the
    /// greater timestamp wins regardless of arrival order.
    pub fn upsert(&self, cell: Cell) {
        self.approx_size
            .fetch_add(cell.encoded_len(), Ordering::Relaxed);
        let key = cell.key.clone();
        let timestamp = cell.timestamp;
        self.cells
            .compare_insert(key, cell, |current| current.timestamp <= timestamp);
    }

    /// The cell stored for `key`, if any (tombstones included).
    pub fn get(&self, key: &[u8]) -> Option<Cell> {
        self.cells.get(key).map(|entry| entry.value().clone())
    }

    /// Serialized-size estimate of the table's contents.
    pub fn size_in_bytes(&self) -> usize {
        self.approx_size.load(Ordering::Relaxed)
    }

    pub fn len(&self) -> usize {
        self.cells.len()
    }

    pub fn is_empty(&self) -> bool {
        self.cells.is_empty()
    }

    /// Ascending cursor over cells with `key >= from`.
    ///
    /// The cursor owns a reference to the table and re-seeks past the
    /// last yielded key on every step, so it stays valid for as long as
    /// the caller keeps it — including across a flush that retires this
    /// memtable from the table set.
    pub fn iter_from(self: &Arc<Self>, from: &[u8]) -> MemtableIter {
        MemtableIter {
            table: Arc::clone(self),
            from: from.to_vec(),
            last: None,
        }
    }
}

/// Owning ascending cursor over a memtable.
///
/// Each step seeks past the last yielded key, so the cursor observes
/// every key present when it reaches it; concurrent inserts behind the
/// cursor are simply not revisited.
pub struct MemtableIter {
    table: Arc<Memtable>,
    from: Vec<u8>,
    last: Option<Vec<u8>>,
}

impl Iterator for MemtableIter {
    type Item = Cell;

    fn next(&mut self) -> Option<Cell> {
        let entry = match &self.last {
            None => self
                .table
                .cells
                .lower_bound(Bound::Included(self.from.as_slice())),
            Some(last) => self
                .table
                .cells
                .lower_bound(Bound::Excluded(last.as_slice())),
        }?;
        let cell = entry.value().clone();
        let key = entry.key().clone();
        drop(entry);
        self.last = Some(key);
        Some(cell)
    }
}
