//! Malformed-file handling: corrupt tables refuse to open.

#[cfg(test)]
mod tests {
    use std::fs;

    use tempfile::TempDir;

    use crate::sstable::tests::helpers::*;
    use crate::sstable::{SSTable, SSTableError};

    #[test]
    fn too_short_for_trailer() {
        let tmp = TempDir::new().unwrap();
        let path = tmp.path().join("1.dat");
        fs::write(&path, [0u8; 2]).unwrap();
        assert!(matches!(
            SSTable::open(&path, 1),
            Err(SSTableError::Corrupt(_))
        ));
    }

    #[test]
    fn trailer_count_exceeds_file() {
        let tmp = TempDir::new().unwrap();
        let path = tmp.path().join("1.dat");
        // Claims 1000 cells in a 4-byte file: offsets cannot precede it.
        fs::write(&path, 1000u32.to_be_bytes()).unwrap();
        assert!(matches!(
            SSTable::open(&path, 1),
            Err(SSTableError::Corrupt(_))
        ));
    }

    #[test]
    fn truncated_table_refuses_open() {
        let tmp = TempDir::new().unwrap();
        let table = write_and_open(tmp.path(), 1, vec![present(b"a", b"value", 1)]);
        let len = table.size_in_bytes();
        drop(table);

        // Chop half the file off; the trailer now claims more offsets
        // than the remaining bytes can hold, or points into garbage.
        let path = tmp.path().join("1.dat");
        let bytes = fs::read(&path).unwrap();
        fs::write(&path, &bytes[..(len / 2) as usize]).unwrap();

        match SSTable::open(&path, 1) {
            Err(SSTableError::Corrupt(_)) => {}
            Ok(table) => {
                // A truncation can leave a parseable trailer; the damage
                // must then surface on access instead of as bad data.
                assert!(table.get(b"a").is_err());
            }
            Err(other) => panic!("unexpected error: {other}"),
        }
    }

    #[test]
    fn offset_pointing_past_cells_region_is_corrupt() {
        let tmp = TempDir::new().unwrap();
        let path = tmp.path().join("1.dat");
        // One offset (8B) pointing at byte 100 of a file whose cells
        // region is empty, then a trailer claiming one cell.
        let mut bytes = Vec::new();
        bytes.extend_from_slice(&100u64.to_be_bytes());
        bytes.extend_from_slice(&1u32.to_be_bytes());
        fs::write(&path, &bytes).unwrap();

        let table = SSTable::open(&path, 1).unwrap();
        assert!(matches!(table.get(b"a"), Err(SSTableError::Corrupt(_))));
    }
}
