//! N-way merge over table cursors.
//!
//! [`MergeIterator`] collapses the per-table cursors of a snapshot into a
//! single stream with strictly ascending keys, emitting exactly one cell
//! per key: the one with the greatest timestamp, ties broken by the
//! earlier cursor position (which is the newer table). Cells whose
//! expiration has passed relative to the scan-time `now` are rewritten as
//! tombstones of the same timestamp before emission.
//!
//! [`FreshIterator`] sits on top and drops tombstones — the view used by
//! user-facing reads and by the compaction that produces the sole
//! remaining table. Replica-level point reads use the merge iterator
//! directly, because they must report removals with their timestamps.

use std::cmp::Ordering;
use std::collections::BinaryHeap;

use crate::cell::Cell;

use super::tableset::CellCursor;

/// Heap entry: the head cell of one cursor.
///
/// Ordered so that the heap's maximum is the next cell to emit: smallest
/// key first, then greatest timestamp, then earliest cursor position.
struct HeapEntry {
    cell: Cell,
    source: usize,
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
        match self.cell.key.cmp(&other.cell.key) {
            Ordering::Equal => match self.cell.timestamp.cmp(&other.cell.timestamp) {
                Ordering::Equal => other.source.cmp(&self.source),
                by_timestamp => by_timestamp,
            },
            by_key => by_key.reverse(),
        }
    }
}

/// Merges N ascending cursors into one deduplicated ascending stream.
pub struct MergeIterator {
    sources: Vec<CellCursor>,
    heap: BinaryHeap<HeapEntry>,
    now: i64,
}

impl MergeIterator {
    /// `sources` must each be ascending with unique keys; their order is
    /// the tie-break priority (index 0 wins). `now` is the scan instant
    /// used to resolve expirations for the whole scan.
    pub fn new(sources: Vec<CellCursor>, now: i64) -> Self {
        let mut merge = Self {
            heap: BinaryHeap::with_capacity(sources.len()),
            sources,
            now,
        };
        for source in 0..merge.sources.len() {
            merge.advance(source);
        }
        merge
    }

    /// Pulls the next cell of `source` into the heap.
    fn advance(&mut self, source: usize) {
        if let Some(cell) = self.sources[source].next() {
            self.heap.push(HeapEntry { cell, source });
        }
    }
}

impl Iterator for MergeIterator {
    type Item = Cell;

    fn next(&mut self) -> Option<Cell> {
        let winner = self.heap.pop()?;
        self.advance(winner.source);

        // Emitting a key advances every cursor still positioned on it.
        while let Some(head) = self.heap.peek() {
            if head.cell.key != winner.cell.key {
                break;
            }
            if let Some(shadowed) = self.heap.pop() {
                self.advance(shadowed.source);
            }
        }

        let cell = winner.cell;
        if !cell.is_tombstone() && cell.expired_at(self.now) {
            Some(cell.into_tombstone())
        } else {
            Some(cell)
        }
    }
}

/// The merge stream with tombstones dropped: only live, unexpired cells.
pub struct FreshIterator {
    inner: MergeIterator,
}

impl FreshIterator {
    pub fn new(inner: MergeIterator) -> Self {
        Self { inner }
    }
}

impl Iterator for FreshIterator {
    type Item = Cell;

    fn next(&mut self) -> Option<Cell> {
        for cell in self.inner.by_ref() {
            if !cell.is_tombstone() {
                return Some(cell);
            }
        }
        None
    }
}
