//! SSTable writer — serializes a sorted cell stream to a single file.
//!
//! The writer streams cells in one pass, recording each cell's starting
//! offset, then appends the offsets region and the trailer. It does not
//! rename: callers write to `<generation>.tmp` and publish with an atomic
//! rename so readers never observe a partial file.

use std::{
    fs::File,
    io::{BufWriter, Write},
    path::Path,
};

use byteorder::{BigEndian, WriteBytesExt};

use crate::cell::{Cell, FOREVER};

use super::{SSTableError, FLAG_HAS_EXPIRE, FLAG_PRESENT};

/// Writes `cells` to `path` in the on-disk format, returning the number
/// of cells written.
///
/// The input must be strictly ascending by key; a repeated or descending
/// key fails the write. The file is fsynced before returning so that the
/// caller's rename publishes fully durable bytes.
pub fn write<I>(cells: I, path: &Path) -> Result<usize, SSTableError>
where
    I: Iterator<Item = Cell>,
{
    let file = File::create(path)?;
    let mut out = BufWriter::new(file);

    let mut offsets: Vec<u64> = Vec::new();
    let mut position: u64 = 0;
    let mut last_key: Option<Vec<u8>> = None;

    for cell in cells {
        if let Some(last) = &last_key {
            if cell.key.as_slice() <= last.as_slice() {
                return Err(SSTableError::Unsorted(cell.key));
            }
        }

        offsets.push(position);
        position += encode_cell(&mut out, &cell)? as u64;
        last_key = Some(cell.key);
    }

    for offset in &offsets {
        out.write_u64::<BigEndian>(*offset)?;
    }
    out.write_u32::<BigEndian>(offsets.len() as u32)?;

    out.flush()?;
    out.into_inner().map_err(|e| e.into_error())?.sync_all()?;
    Ok(offsets.len())
}

/// Encodes one cell, returning its encoded length.
fn encode_cell<W: Write>(out: &mut W, cell: &Cell) -> Result<usize, SSTableError> {
    let mut flags = 0u8;
    if cell.value.is_some() {
        flags |= FLAG_PRESENT;
    }
    if cell.expire != FOREVER {
        flags |= FLAG_HAS_EXPIRE;
    }

    out.write_u32::<BigEndian>(cell.key.len() as u32)?;
    out.write_all(&cell.key)?;
    out.write_i64::<BigEndian>(cell.timestamp)?;
    out.write_u8(flags)?;
    if cell.expire != FOREVER {
        out.write_i64::<BigEndian>(cell.expire)?;
    }
    if let Some(value) = &cell.value {
        out.write_u32::<BigEndian>(value.len() as u32)?;
        out.write_all(value)?;
    }

    Ok(cell.encoded_len())
}
