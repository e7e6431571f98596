//! TableSet — the immutable snapshot of engine state.
//!
//! A table set captures (current memtable, flushing memtables, on-disk
//! tables, next generation) at one instant. The engine publishes a new
//! set behind its write lock on every state transition; readers that
//! cloned an earlier set keep reading it safely, because every component
//! is reference-counted and immutable from their point of view.
//!
//! Transitions are pure functions returning a new set. A generation is
//! consumed the moment an operation that will produce a file *starts*
//! (flush start, compaction start), so concurrent flushes and a running
//! compaction can never collide on a path, and generations stay strictly
//! increasing process-wide.

use std::collections::BTreeMap;
use std::sync::Arc;

use crate::cell::Cell;
use crate::memtable::Memtable;
use crate::sstable::SSTable;

/// A cursor over any table, memory or disk.
pub type CellCursor = Box<dyn Iterator<Item = Cell> + Send>;

/// Immutable snapshot of (memtable, flushing set, on-disk generations).
#[derive(Debug, Clone)]
pub struct TableSet {
    /// The current writable memtable.
    pub memtable: Arc<Memtable>,
    /// Memtables being serialized, newest first, tagged with the
    /// generation reserved for each at flush start.
    pub flushing: Vec<(u64, Arc<Memtable>)>,
    /// Live on-disk tables by generation.
    pub sstables: BTreeMap<u64, Arc<SSTable>>,
    /// The generation the next flush or compaction will consume.
    pub generation: u64,
}

impl TableSet {
    /// The initial set discovered at open.
    pub fn from_files(sstables: BTreeMap<u64, Arc<SSTable>>, generation: u64) -> Self {
        Self {
            memtable: Arc::new(Memtable::new()),
            flushing: Vec::new(),
            sstables,
            generation,
        }
    }

    /// Flush start: the memtable moves into the flushing set under the
    /// current generation, a fresh empty memtable takes its place, and
    /// the generation counter advances.
    pub fn mark_as_flushing(&self) -> Self {
        let mut flushing = Vec::with_capacity(self.flushing.len() + 1);
        flushing.push((self.generation, Arc::clone(&self.memtable)));
        flushing.extend(self.flushing.iter().cloned());
        Self {
            memtable: Arc::new(Memtable::new()),
            flushing,
            sstables: self.sstables.clone(),
            generation: self.generation + 1,
        }
    }

    /// Flush commit: the memtable flushed under `generation` leaves the
    /// flushing set and its table becomes visible on disk.
    pub fn move_to_flushed(&self, generation: u64, table: Arc<SSTable>) -> Self {
        let flushing = self
            .flushing
            .iter()
            .filter(|(tagged, _)| *tagged != generation)
            .cloned()
            .collect();
        let mut sstables = self.sstables.clone();
        sstables.insert(generation, table);
        Self {
            memtable: Arc::clone(&self.memtable),
            flushing,
            sstables,
            generation: self.generation,
        }
    }

    /// Compaction start: reserves the current generation for the output
    /// file by advancing the counter.
    pub fn compacting(&self) -> Self {
        Self {
            memtable: Arc::clone(&self.memtable),
            flushing: self.flushing.clone(),
            sstables: self.sstables.clone(),
            generation: self.generation + 1,
        }
    }

    /// Compaction commit: every table whose generation is in `replaced`
    /// is swapped for the single output table at `generation`.
    /// Generations that appeared after the compaction snapshot are left
    /// untouched.
    pub fn replace_compacted(
        &self,
        replaced: &BTreeMap<u64, Arc<SSTable>>,
        generation: u64,
        table: Arc<SSTable>,
    ) -> Self {
        let mut sstables = self.sstables.clone();
        for old in replaced.keys() {
            sstables.remove(old);
        }
        sstables.insert(generation, table);
        Self {
            memtable: Arc::clone(&self.memtable),
            flushing: self.flushing.clone(),
            sstables,
            generation: self.generation,
        }
    }

    /// Cursors over every table, in merge-priority order: memtable first,
    /// then flushing memtables newest to oldest, then on-disk tables by
    /// descending generation. Position in this list breaks timestamp ties
    /// (earlier wins).
    pub fn cursors(&self, from: &[u8]) -> Vec<CellCursor> {
        let mut cursors: Vec<CellCursor> = Vec::with_capacity(2 + self.sstables.len());
        cursors.push(Box::new(self.memtable.iter_from(from)));
        for (_, memtable) in &self.flushing {
            cursors.push(Box::new(memtable.iter_from(from)));
        }
        for table in self.sstables.values().rev() {
            cursors.push(Box::new(table.iter_from(from)));
        }
        cursors
    }

    /// Cursors over the on-disk tables only, for compaction — the
    /// memtable and flushing set are excluded to bound the work.
    pub fn sstable_cursors(&self, from: &[u8]) -> Vec<CellCursor> {
        self.sstables
            .values()
            .rev()
            .map(|table| Box::new(table.iter_from(from)) as CellCursor)
            .collect()
    }
}
