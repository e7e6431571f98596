//! Ordered-map semantics: upsert, tombstones, cursors, size accounting.

#[cfg(test)]
mod tests {
    use std::sync::Arc;

    use crate::cell::{Cell, FOREVER};
    use crate::memtable::Memtable;

    fn present(key: &[u8], value: &[u8], timestamp: i64) -> Cell {
        Cell::present(key.to_vec(), value.to_vec(), timestamp, FOREVER)
    }

    #[test]
    fn upsert_then_get() {
        let table = Memtable::new();
        table.upsert(present(b"a", b"1", 1));
        assert_eq!(table.get(b"a").unwrap().value, Some(b"1".to_vec()));
        assert!(table.get(b"b").is_none());
    }

    #[test]
    fn newer_timestamp_replaces_in_place() {
        let table = Memtable::new();
        table.upsert(present(b"a", b"1", 1));
        table.upsert(present(b"a", b"2", 2));
        assert_eq!(table.get(b"a").unwrap().value, Some(b"2".to_vec()));
        assert_eq!(table.len(), 1);
    }

    #[test]
    fn stale_timestamp_does_not_clobber() {
        let table = Memtable::new();
        table.upsert(present(b"a", b"new", 10));
        table.upsert(present(b"a", b"old", 5));
        assert_eq!(table.get(b"a").unwrap().value, Some(b"new".to_vec()));
    }

    #[test]
    fn remove_stores_a_tombstone() {
        let table = Memtable::new();
        table.upsert(present(b"a", b"1", 1));
        table.upsert(Cell::tombstone(b"a".to_vec(), 2));

        let cell = table.get(b"a").unwrap();
        assert!(cell.is_tombstone());
        assert_eq!(cell.timestamp, 2);
        // The entry is still there — tombstones must reach the flush.
        assert_eq!(table.len(), 1);
    }

    #[test]
    fn cursor_is_ascending_and_bounded_below() {
        let table = Arc::new(Memtable::new());
        for key in [b"c", b"a", b"e", b"b", b"d"] {
            table.upsert(present(key, b"v", 1));
        }

        let keys: Vec<Vec<u8>> = table.iter_from(b"b").map(|c| c.key).collect();
        assert_eq!(keys, vec![b"b".to_vec(), b"c".to_vec(), b"d".to_vec(), b"e".to_vec()]);

        assert_eq!(table.iter_from(b"").count(), 5);
        assert_eq!(table.iter_from(b"f").count(), 0);
    }

    #[test]
    fn size_estimate_grows_with_upserts() {
        let table = Memtable::new();
        assert_eq!(table.size_in_bytes(), 0);
        let cell = present(b"key", b"value", 1);
        let unit = cell.encoded_len();
        table.upsert(cell);
        assert_eq!(table.size_in_bytes(), unit);
        table.upsert(present(b"key", b"value", 2));
        // Replacement still counts toward the flush estimate.
        assert_eq!(table.size_in_bytes(), unit * 2);
    }
}
