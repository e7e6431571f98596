//! The LSM storage engine.
//!
//! The engine orchestrates the memtable, the flushing set, and the
//! on-disk tables behind a single immutable [`TableSet`] snapshot:
//!
//! ```text
//! ┌───────────────┐   ┌───────────────────┐   ┌─────────────────────┐
//! │   MemTable    │──►│ Flushing set      │──►│ SSTables            │
//! │  (writable)   │   │ (being serialized)│   │ <generation>.dat    │
//! └───────────────┘   └───────────────────┘   └─────────────────────┘
//!         ▲                    background            ▲    merge-read /
//!     upsert/remove            flush workers         └──  compaction
//! ```
//!
//! # Concurrency
//!
//! One reader/writer lock protects the `Arc<TableSet>` reference itself.
//! The read lock is enough to capture a snapshot or to write into the
//! current memtable (the memtable synchronizes per key internally); the
//! write lock is taken only to publish a new set — flush start, flush
//! commit, compaction start, compaction commit. No lock is ever held
//! across file I/O: serialization happens between lock acquisitions, and
//! readers observe a consistent snapshot throughout.
//!
//! # Durability
//!
//! Flush and compaction outputs are written to `<generation>.tmp` and
//! renamed to `<generation>.dat` once fsynced, so a crash leaves at worst
//! a `.tmp` file that open ignores. A non-empty memtable is flushed
//! synchronously on close. There is no write-ahead log: writes that never
//! reached a flush are lost on a crash, by design of the on-disk layout.

pub mod clock;
pub(crate) mod flush;
pub mod merge;
pub mod tableset;

#[cfg(test)]
pub mod tests;

use std::collections::BTreeMap;
use std::fs;
use std::io;
use std::path::{Path, PathBuf};
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::{Arc, RwLock};

use thiserror::Error;
use tracing::{debug, info, warn};

use crate::cell::{Cell, FOREVER};
use crate::sstable::{self, writer, SSTable, SSTableError};

use clock::{wall_nanos, MonotonicClock};
use flush::{FlushJob, FlushPool};
use merge::{FreshIterator, MergeIterator};
use tableset::TableSet;

// ------------------------------------------------------------------------------------------------
// Errors and configuration
// ------------------------------------------------------------------------------------------------

/// Errors returned by engine operations.
#[derive(Debug, Error)]
pub enum EngineError {
    /// The key is absent, removed, or expired.
    #[error("key not found")]
    NotFound,

    /// Underlying filesystem I/O error.
    #[error("I/O error: {0}")]
    Io(#[from] io::Error),

    /// Error from the table layer (corrupt or unsorted data).
    #[error("table error: {0}")]
    Table(#[from] SSTableError),

    /// The engine is shut down.
    #[error("engine is closed")]
    Closed,

    /// Internal invariant violation (poisoned lock, unexpected state).
    #[error("internal error: {0}")]
    Internal(String),
}

impl<T> From<std::sync::PoisonError<T>> for EngineError {
    fn from(err: std::sync::PoisonError<T>) -> Self {
        EngineError::Internal(err.to_string())
    }
}

/// Configuration for an [`Engine`] instance.
#[derive(Debug, Clone)]
pub struct EngineConfig {
    /// Memtable size estimate (bytes) that triggers a background flush.
    pub flush_threshold: usize,

    /// Number of background flush worker threads.
    pub flush_workers: usize,
}

impl Default for EngineConfig {
    fn default() -> Self {
        Self {
            flush_threshold: 4 << 20,
            flush_workers: 2,
        }
    }
}

/// Snapshot of engine statistics.
#[derive(Debug, Clone)]
pub struct EngineStats {
    /// Size estimate of the writable memtable.
    pub memtable_size_bytes: usize,
    /// Memtables currently being serialized.
    pub flushing_tables: usize,
    /// Live on-disk tables.
    pub sstables: usize,
    /// The generation the next flush or compaction will consume.
    pub next_generation: u64,
}

/// The replica-visible state of one key, as resolved across every table.
///
/// This is what the replication layer exchanges between nodes: removals
/// and expirations must be reported with their timestamps so the
/// coordinator can rank them against live versions elsewhere.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum KeyState {
    /// A live value written at `timestamp`.
    Present { timestamp: i64, value: Vec<u8> },
    /// Removed (or expired) at `timestamp`.
    Removed { timestamp: i64 },
    /// No version of the key exists anywhere.
    Absent,
}

// ------------------------------------------------------------------------------------------------
// Shared state
// ------------------------------------------------------------------------------------------------

/// State shared between engine handles and flush workers.
#[derive(Debug)]
pub(crate) struct Shared {
    dir: PathBuf,
    pub(crate) tables: RwLock<Arc<TableSet>>,
    clock: MonotonicClock,
    config: EngineConfig,
    compacting: AtomicBool,
}

impl Shared {
    /// Serializes `cells` to `<generation>.tmp`, publishes it as
    /// `<generation>.dat` with an atomic rename, and opens the result.
    pub(crate) fn serialize<I>(&self, generation: u64, cells: I) -> Result<Arc<SSTable>, EngineError>
    where
        I: Iterator<Item = Cell>,
    {
        let temp = self.table_path(generation, sstable::TEMP_SUFFIX);
        let published = self.table_path(generation, sstable::DATA_SUFFIX);

        writer::write(cells, &temp)?;
        fs::rename(&temp, &published)?;

        Ok(Arc::new(SSTable::open(&published, generation)?))
    }

    fn table_path(&self, generation: u64, suffix: &str) -> PathBuf {
        self.dir.join(format!("{generation}.{suffix}"))
    }

    fn snapshot(&self) -> Result<Arc<TableSet>, EngineError> {
        Ok(Arc::clone(&*self.tables.read()?))
    }
}

// ------------------------------------------------------------------------------------------------
// Engine
// ------------------------------------------------------------------------------------------------

/// The storage engine handle. Clones share one engine.
#[derive(Debug)]
pub struct Engine {
    shared: Arc<Shared>,
    pool: Arc<FlushPool>,
    closed: Arc<AtomicBool>,
}

impl Clone for Engine {
    fn clone(&self) -> Self {
        Self {
            shared: Arc::clone(&self.shared),
            pool: Arc::clone(&self.pool),
            closed: Arc::clone(&self.closed),
        }
    }
}

impl Engine {
    /// Opens (or creates) an engine rooted at `dir`.
    ///
    /// Discovers `<generation>.dat` files, refuses to open if any of them
    /// fails to parse, ignores `.tmp` leftovers from interrupted flushes,
    /// and resumes the generation counter at `max(existing) + 1`.
    pub fn open(dir: impl AsRef<Path>, config: EngineConfig) -> Result<Self, EngineError> {
        let dir = dir.as_ref().to_path_buf();
        fs::create_dir_all(&dir)?;

        let mut sstables = BTreeMap::new();
        let mut max_generation = 0u64;
        for entry in fs::read_dir(&dir)? {
            let path = entry?.path();
            if !path.is_file() {
                continue;
            }
            match parse_generation(&path) {
                Some(generation) => {
                    let table = SSTable::open(&path, generation)?;
                    max_generation = max_generation.max(generation);
                    sstables.insert(generation, Arc::new(table));
                }
                None => {
                    debug!(path = %path.display(), "ignoring non-table file");
                }
            }
        }

        let generation = max_generation + 1;
        info!(
            dir = %dir.display(),
            tables = sstables.len(),
            generation,
            "engine opened"
        );

        let shared = Arc::new(Shared {
            dir,
            tables: RwLock::new(Arc::new(TableSet::from_files(sstables, generation))),
            clock: MonotonicClock::new(),
            config: config.clone(),
            compacting: AtomicBool::new(false),
        });
        let pool = Arc::new(FlushPool::start(config.flush_workers, Arc::clone(&shared)));

        Ok(Self {
            shared,
            pool,
            closed: Arc::new(AtomicBool::new(false)),
        })
    }

    /// Inserts or replaces `key` with a value that never expires.
    pub fn upsert(&self, key: Vec<u8>, value: Vec<u8>) -> Result<(), EngineError> {
        self.upsert_expiring(key, value, FOREVER)
    }

    /// Inserts or replaces `key`; past `expire` the value reads as
    /// removed and is purged by compaction.
    pub fn upsert_expiring(
        &self,
        key: Vec<u8>,
        value: Vec<u8>,
        expire: i64,
    ) -> Result<(), EngineError> {
        let should_flush = {
            let tables = self.shared.tables.read()?;
            let timestamp = self.shared.clock.next();
            tables
                .memtable
                .upsert(Cell::present(key, value, timestamp, expire));
            tables.memtable.size_in_bytes() >= self.shared.config.flush_threshold
        };
        if should_flush {
            self.flush()?;
        }
        Ok(())
    }

    /// Removes `key` by writing a tombstone.
    pub fn remove(&self, key: Vec<u8>) -> Result<(), EngineError> {
        let should_flush = {
            let tables = self.shared.tables.read()?;
            let timestamp = self.shared.clock.next();
            tables.memtable.upsert(Cell::tombstone(key, timestamp));
            tables.memtable.size_in_bytes() >= self.shared.config.flush_threshold
        };
        if should_flush {
            self.flush()?;
        }
        Ok(())
    }

    /// The live value for `key`; fails with [`EngineError::NotFound`] if
    /// the key is absent, removed, or expired.
    pub fn get(&self, key: &[u8]) -> Result<Vec<u8>, EngineError> {
        let mut scan = self.range_scan(key)?;
        match scan.next() {
            Some((found, value)) if found == key => Ok(value),
            _ => Err(EngineError::NotFound),
        }
    }

    /// The replica-visible state of `key`, tombstones included.
    pub fn state(&self, key: &[u8]) -> Result<KeyState, EngineError> {
        let snapshot = self.shared.snapshot()?;
        let mut merge = MergeIterator::new(snapshot.cursors(key), wall_nanos());
        match merge.next() {
            Some(cell) if cell.key == key => Ok(match cell.value {
                Some(value) => KeyState::Present {
                    timestamp: cell.timestamp,
                    value,
                },
                None => KeyState::Removed {
                    timestamp: cell.timestamp,
                },
            }),
            _ => Ok(KeyState::Absent),
        }
    }

    /// Ascending scan of live records with `key >= from`, over a
    /// consistent snapshot taken now. Tables merged or deleted while the
    /// scan runs stay readable until it is dropped.
    pub fn range_scan(&self, from: &[u8]) -> Result<RangeScan, EngineError> {
        let snapshot = self.shared.snapshot()?;
        let now = wall_nanos();
        Ok(RangeScan {
            inner: FreshIterator::new(MergeIterator::new(snapshot.cursors(from), now)),
            _snapshot: snapshot,
        })
    }

    /// Schedules a background flush of the current memtable. A no-op if
    /// the memtable is empty.
    pub fn flush(&self) -> Result<(), EngineError> {
        let job = {
            let mut tables = self.shared.tables.write()?;
            let snapshot = Arc::clone(&tables);
            if snapshot.memtable.size_in_bytes() == 0 {
                return Ok(());
            }
            *tables = Arc::new(snapshot.mark_as_flushing());
            FlushJob {
                generation: snapshot.generation,
                memtable: Arc::clone(&snapshot.memtable),
            }
        };
        self.pool.submit(job)
    }

    /// Merges every live on-disk table into a single one, dropping
    /// tombstones and purging expired cells. The memtable and flushing
    /// set are not touched. Single-writer: a concurrent call returns
    /// immediately.
    pub fn compact(&self) -> Result<(), EngineError> {
        if self.shared.compacting.swap(true, Ordering::SeqCst) {
            debug!("compaction already running");
            return Ok(());
        }
        let result = self.compact_inner();
        self.shared.compacting.store(false, Ordering::SeqCst);
        result
    }

    fn compact_inner(&self) -> Result<(), EngineError> {
        let snapshot = self.shared.snapshot()?;
        if snapshot.sstables.is_empty() {
            return Ok(());
        }

        let now = wall_nanos();
        let mut fresh =
            FreshIterator::new(MergeIterator::new(snapshot.sstable_cursors(&[]), now)).peekable();
        if fresh.peek().is_none() {
            return Ok(());
        }

        // Reserve the output generation; flushes that start after this
        // point land on higher generations and are left untouched.
        let generation = {
            let mut tables = self.shared.tables.write()?;
            let current = Arc::clone(&tables);
            *tables = Arc::new(current.compacting());
            current.generation
        };

        let table = self.shared.serialize(generation, fresh)?;
        let cells = table.cell_count();

        {
            let mut tables = self.shared.tables.write()?;
            let current = Arc::clone(&tables);
            *tables = Arc::new(current.replace_compacted(&snapshot.sstables, generation, table));
        }

        // Readers holding the old snapshot keep their mappings; unlink
        // only removes the names.
        for old in snapshot.sstables.keys() {
            fs::remove_file(self.shared.table_path(*old, sstable::DATA_SUFFIX))?;
        }

        info!(
            merged = snapshot.sstables.len(),
            generation, cells, "compaction complete"
        );
        Ok(())
    }

    /// Engine statistics for monitoring and tests.
    pub fn stats(&self) -> Result<EngineStats, EngineError> {
        let snapshot = self.shared.snapshot()?;
        Ok(EngineStats {
            memtable_size_bytes: snapshot.memtable.size_in_bytes(),
            flushing_tables: snapshot.flushing.len(),
            sstables: snapshot.sstables.len(),
            next_generation: snapshot.generation,
        })
    }

    /// Gracefully shuts the engine down: flushes the memtable, drains
    /// the worker pool, and retries any flush that failed in the
    /// background. Safe to call more than once.
    pub fn close(&self) -> Result<(), EngineError> {
        if self.closed.swap(true, Ordering::SeqCst) {
            return Ok(());
        }

        self.flush()?;
        self.pool.shutdown();

        // Anything still in the flushing set had its background flush
        // fail; retry inline so close is lossless or loud.
        let leftovers = {
            let tables = self.shared.tables.read()?;
            tables.flushing.clone()
        };
        for (generation, memtable) in leftovers {
            warn!(generation, "retrying failed flush during close");
            flush::run(
                &self.shared,
                &FlushJob {
                    generation,
                    memtable,
                },
            )?;
        }

        info!("engine closed");
        Ok(())
    }
}

/// Ascending iterator of live `(key, value)` records over one snapshot.
pub struct RangeScan {
    inner: FreshIterator,
    /// Keeps every table in the snapshot alive for the scan's lifetime.
    _snapshot: Arc<TableSet>,
}

impl Iterator for RangeScan {
    type Item = (Vec<u8>, Vec<u8>);

    fn next(&mut self) -> Option<Self::Item> {
        let cell = self.inner.next()?;
        // Fresh cells always carry a value.
        cell.value.map(|value| (cell.key, value))
    }
}

/// Parses `<generation>.dat` file names; anything else is not a table.
fn parse_generation(path: &Path) -> Option<u64> {
    let name = path.file_name()?.to_str()?;
    let stem = name.strip_suffix(".dat")?;
    if stem.is_empty() || !stem.bytes().all(|b| b.is_ascii_digit()) {
        return None;
    }
    // Generations are strictly positive.
    stem.parse().ok().filter(|generation| *generation > 0)
}
