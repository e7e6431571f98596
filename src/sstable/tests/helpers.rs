use std::path::Path;
use std::sync::Arc;

use crate::cell::{Cell, FOREVER};
use crate::sstable::{writer, SSTable};

/// A present cell with no expiry.
pub fn present(key: &[u8], value: &[u8], timestamp: i64) -> Cell {
    Cell::present(key.to_vec(), value.to_vec(), timestamp, FOREVER)
}

/// Writes `cells` to `<dir>/<generation>.dat` and opens the table.
pub fn write_and_open(dir: &Path, generation: u64, cells: Vec<Cell>) -> Arc<SSTable> {
    let path = dir.join(format!("{generation}.dat"));
    writer::write(cells.into_iter(), &path).expect("write");
    Arc::new(SSTable::open(&path, generation).expect("open"))
}
