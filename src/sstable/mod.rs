//! Sorted String Table (SSTable) module.
//!
//! An SSTable is an **immutable**, sorted, on-disk table of [`Cell`]s. It
//! supports binary-searched point probes and forward range cursors, and is
//! the only durable representation of data in the engine.
//!
//! # On-disk layout
//!
//! A table file is three concatenated regions:
//!
//! ```text
//! [CELL]*                  cells, ascending key order
//! [OFFSET_BE_U64]*         starting byte offset of each cell, same order
//! [CELL_COUNT_BE_U32]      trailer
//! ```
//!
//! Each cell is encoded as:
//!
//! ```text
//! key_len (4B, BE) | key | timestamp (8B, BE) | flags (1B)
//!     | expire (8B, BE)            iff flags.HAS_EXPIRE
//!     | value_len (4B, BE) | value iff flags.PRESENT
//! ```
//!
//! The offsets region doubles as the search index, so there is no separate
//! header; the fixed-size trailer makes open cheap. Files are written to
//! `<generation>.tmp` and atomically renamed to `<generation>.dat`, so a
//! crash mid-write leaves only a `.tmp` file that open ignores.
//!
//! # Concurrency
//!
//! Tables are immutable once published. The reader memory-maps the file;
//! any number of threads may probe and scan concurrently. Cursors hold an
//! `Arc` of the table, so a table evicted by compaction stays readable
//! (and its mapping valid, even after unlink) until the last cursor drops.

pub mod writer;

#[cfg(test)]
pub mod tests;

use std::{fs::File, io, io::Read, path::PathBuf, sync::Arc};

use byteorder::{BigEndian, ReadBytesExt};
use memmap2::Mmap;
use thiserror::Error;
use tracing::error;

use crate::cell::{Cell, FOREVER};

// ------------------------------------------------------------------------------------------------
// Format constants
// ------------------------------------------------------------------------------------------------

/// `flags` bit 0 — the cell carries a value.
pub(crate) const FLAG_PRESENT: u8 = 0b0000_0001;

/// `flags` bit 1 — the cell carries an explicit expiration instant.
pub(crate) const FLAG_HAS_EXPIRE: u8 = 0b0000_0010;

/// Trailer size: `cell_count` as a big-endian u32.
const TRAILER_SIZE: usize = 4;

/// Size of one entry in the offsets region.
const OFFSET_SIZE: usize = 8;

/// Published table files: `<generation>.dat`.
pub const DATA_SUFFIX: &str = "dat";

/// In-flight flush/compaction outputs, ignored at open: `<generation>.tmp`.
pub const TEMP_SUFFIX: &str = "tmp";

// ------------------------------------------------------------------------------------------------
// Error types
// ------------------------------------------------------------------------------------------------

/// Errors returned by SSTable operations.
#[derive(Debug, Error)]
pub enum SSTableError {
    /// Underlying I/O error.
    #[error("I/O error: {0}")]
    Io(#[from] io::Error),

    /// The file does not parse as the format above.
    #[error("corrupt table: {0}")]
    Corrupt(String),

    /// The writer was handed a cell stream that is not strictly ascending.
    #[error("cell stream is not strictly ascending at key {0:?}")]
    Unsorted(Vec<u8>),
}

// ------------------------------------------------------------------------------------------------
// Reader
// ------------------------------------------------------------------------------------------------

/// An open, immutable on-disk table.
pub struct SSTable {
    /// Generation the file was published under; also its merge rank.
    pub generation: u64,
    path: PathBuf,
    map: Mmap,
    cell_count: usize,
    /// Byte position where the offsets region starts (== cells region end).
    offsets_at: usize,
}

impl SSTable {
    /// Opens `path` and validates the trailer.
    ///
    /// The required structural check: the trailer's `cell_count * 8` bytes
    /// of offsets must precede it. Anything that fails this is refused as
    /// corrupt rather than silently skipped.
    pub fn open(path: impl Into<PathBuf>, generation: u64) -> Result<Self, SSTableError> {
        let path = path.into();
        let file = File::open(&path)?;
        // Safety: the file is never truncated or rewritten once published;
        // flush and compaction only ever create new generations.
        let map = unsafe { Mmap::map(&file)? };

        if map.len() < TRAILER_SIZE {
            return Err(SSTableError::Corrupt(format!(
                "{} bytes is too short for a trailer",
                map.len()
            )));
        }
        let trailer_at = map.len() - TRAILER_SIZE;
        let cell_count = (&map[trailer_at..]).read_u32::<BigEndian>()? as usize;

        let offsets_len = cell_count
            .checked_mul(OFFSET_SIZE)
            .ok_or_else(|| SSTableError::Corrupt("offsets region overflows".into()))?;
        let offsets_at = trailer_at
            .checked_sub(offsets_len)
            .ok_or_else(|| {
                SSTableError::Corrupt(format!(
                    "trailer claims {cell_count} cells but only {trailer_at} bytes precede it"
                ))
            })?;

        Ok(Self {
            generation,
            path,
            map,
            cell_count,
            offsets_at,
        })
    }

    pub fn cell_count(&self) -> usize {
        self.cell_count
    }

    /// On-disk size of the table file.
    pub fn size_in_bytes(&self) -> u64 {
        self.map.len() as u64
    }

    pub fn path(&self) -> &std::path::Path {
        &self.path
    }

    /// Point lookup: the cell stored for `key`, if any.
    pub fn get(&self, key: &[u8]) -> Result<Option<Cell>, SSTableError> {
        let index = self.seek(key)?;
        if index >= self.cell_count {
            return Ok(None);
        }
        let cell = self.cell_at(index)?;
        Ok(if cell.key == key { Some(cell) } else { None })
    }

    /// Forward cursor over cells with `key >= from`, decoding on demand.
    pub fn iter_from(self: &Arc<Self>, from: &[u8]) -> SSTableIter {
        let index = match self.seek(from) {
            Ok(index) => index,
            Err(err) => {
                error!(path = %self.path.display(), %err, "table seek failed, cursor is empty");
                self.cell_count
            }
        };
        SSTableIter {
            table: Arc::clone(self),
            index,
        }
    }

    /// Binary search for the first cell index whose key is `>= from`.
    ///
    /// Probes decode only the key length and key bytes; the full cell is
    /// decoded by the caller once the position is known.
    fn seek(&self, from: &[u8]) -> Result<usize, SSTableError> {
        let mut lo = 0usize;
        let mut hi = self.cell_count;
        while lo < hi {
            let mid = lo + (hi - lo) / 2;
            if self.key_at(mid)? < from {
                lo = mid + 1;
            } else {
                hi = mid;
            }
        }
        Ok(lo)
    }

    /// Starting byte offset of cell `index` within the cells region.
    fn offset_of(&self, index: usize) -> Result<usize, SSTableError> {
        let at = self.offsets_at + index * OFFSET_SIZE;
        let offset = (&self.map[at..at + OFFSET_SIZE]).read_u64::<BigEndian>()? as usize;
        if offset >= self.offsets_at {
            return Err(SSTableError::Corrupt(format!(
                "cell {index} offset {offset} points past the cells region"
            )));
        }
        Ok(offset)
    }

    /// The key of cell `index`, borrowed straight from the mapping.
    fn key_at(&self, index: usize) -> Result<&[u8], SSTableError> {
        let offset = self.offset_of(index)?;
        let key_len = (&self.map[offset..self.offsets_at]).read_u32::<BigEndian>()? as usize;
        let start = offset + 4;
        let end = start
            .checked_add(key_len)
            .filter(|end| *end <= self.offsets_at)
            .ok_or_else(|| {
                SSTableError::Corrupt(format!("cell {index} key overruns the cells region"))
            })?;
        Ok(&self.map[start..end])
    }

    /// Fully decodes cell `index`.
    fn cell_at(&self, index: usize) -> Result<Cell, SSTableError> {
        let offset = self.offset_of(index)?;
        let mut rdr = &self.map[offset..self.offsets_at];

        let key_len = rdr.read_u32::<BigEndian>()? as usize;
        let mut key = vec![0u8; key_len];
        rdr.read_exact(&mut key)?;

        let timestamp = rdr.read_i64::<BigEndian>()?;
        let flags = rdr.read_u8()?;

        let expire = if flags & FLAG_HAS_EXPIRE != 0 {
            rdr.read_i64::<BigEndian>()?
        } else {
            FOREVER
        };

        let value = if flags & FLAG_PRESENT != 0 {
            let value_len = rdr.read_u32::<BigEndian>()? as usize;
            let mut value = vec![0u8; value_len];
            rdr.read_exact(&mut value)?;
            Some(value)
        } else {
            None
        };

        Ok(Cell {
            key,
            timestamp,
            expire,
            value,
        })
    }
}

impl std::fmt::Debug for SSTable {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("SSTable")
            .field("generation", &self.generation)
            .field("path", &self.path)
            .field("cell_count", &self.cell_count)
            .finish()
    }
}

// ------------------------------------------------------------------------------------------------
// Cursor
// ------------------------------------------------------------------------------------------------

/// Forward cursor over one table. Holds a strong reference to the table,
/// so the mapping outlives compaction for as long as the cursor does.
pub struct SSTableIter {
    table: Arc<SSTable>,
    index: usize,
}

impl Iterator for SSTableIter {
    type Item = Cell;

    fn next(&mut self) -> Option<Cell> {
        if self.index >= self.table.cell_count {
            return None;
        }
        match self.table.cell_at(self.index) {
            Ok(cell) => {
                self.index += 1;
                Some(cell)
            }
            Err(err) => {
                // A decode failure past open means the region is damaged;
                // stop the cursor rather than emit garbage.
                error!(
                    path = %self.table.path.display(),
                    index = self.index,
                    %err,
                    "cell decode failed, ending cursor"
                );
                self.index = self.table.cell_count;
                None
            }
        }
    }
}
