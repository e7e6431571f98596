//! TableSet transition unit tests.

#[cfg(test)]
mod tests {
    use std::collections::BTreeMap;
    use std::sync::Arc;

    use tempfile::TempDir;

    use crate::engine::tableset::TableSet;
    use crate::sstable::tests::helpers::{present, write_and_open};

    #[test]
    fn mark_as_flushing_swaps_in_a_fresh_memtable() {
        let set = TableSet::from_files(BTreeMap::new(), 1);
        set.memtable
            .upsert(crate::cell::Cell::present(b"a".to_vec(), b"1".to_vec(), 1, i64::MAX));

        let next = set.mark_as_flushing();
        assert!(next.memtable.is_empty());
        assert_eq!(next.flushing.len(), 1);
        assert_eq!(next.flushing[0].0, 1);
        assert!(Arc::ptr_eq(&next.flushing[0].1, &set.memtable));
        assert_eq!(next.generation, 2);
    }

    #[test]
    fn move_to_flushed_publishes_under_reserved_generation() {
        let tmp = TempDir::new().unwrap();
        let table = write_and_open(tmp.path(), 1, vec![present(b"a", b"1", 1)]);

        let set = TableSet::from_files(BTreeMap::new(), 1).mark_as_flushing();
        let next = set.move_to_flushed(1, table);

        assert!(next.flushing.is_empty());
        assert_eq!(next.sstables.len(), 1);
        assert!(next.sstables.contains_key(&1));
        // Commit does not consume another generation.
        assert_eq!(next.generation, 2);
    }

    #[test]
    fn overlapping_flushes_keep_distinct_generations() {
        let set = TableSet::from_files(BTreeMap::new(), 1);
        let first = set.mark_as_flushing();
        let second = first.mark_as_flushing();

        assert_eq!(second.flushing.len(), 2);
        // Newest first, each with its own reserved generation.
        assert_eq!(second.flushing[0].0, 2);
        assert_eq!(second.flushing[1].0, 1);
        assert_eq!(second.generation, 3);
    }

    #[test]
    fn replace_compacted_spares_generations_outside_the_snapshot() {
        let tmp = TempDir::new().unwrap();
        let old1 = write_and_open(tmp.path(), 1, vec![present(b"a", b"1", 1)]);
        let old2 = write_and_open(tmp.path(), 2, vec![present(b"b", b"2", 2)]);
        let parallel = write_and_open(tmp.path(), 4, vec![present(b"c", b"3", 3)]);
        let output = write_and_open(tmp.path(), 3, vec![present(b"a", b"1", 1)]);

        let mut snapshot = BTreeMap::new();
        snapshot.insert(1u64, old1.clone());
        snapshot.insert(2u64, old2.clone());

        // Current state: the snapshot's tables plus one that appeared in
        // parallel with compaction.
        let mut current = TableSet::from_files(snapshot.clone(), 5);
        current.sstables.insert(4, parallel);

        let next = current.replace_compacted(&snapshot, 3, output);
        let generations: Vec<u64> = next.sstables.keys().copied().collect();
        assert_eq!(generations, vec![3, 4]);
    }

    #[test]
    fn compacting_reserves_a_generation() {
        let set = TableSet::from_files(BTreeMap::new(), 7);
        let next = set.compacting();
        assert_eq!(next.generation, 8);
        assert_eq!(set.generation, 7);
    }

    #[test]
    fn cursor_order_is_mem_then_flushing_then_disk_desc() {
        let tmp = TempDir::new().unwrap();
        let disk1 = write_and_open(tmp.path(), 1, vec![present(b"k", b"gen1", 1)]);
        let disk2 = write_and_open(tmp.path(), 2, vec![present(b"k", b"gen2", 1)]);

        let mut sstables = BTreeMap::new();
        sstables.insert(1u64, disk1);
        sstables.insert(2u64, disk2);
        let set = TableSet::from_files(sstables, 3);

        // Same key and timestamp everywhere: position decides, and the
        // first cursor (higher generation) must win the tie.
        let mut cursors = set.cursors(b"");
        assert_eq!(cursors.len(), 3); // memtable + 2 tables
        let first_with_cell = cursors
            .iter_mut()
            .find_map(|cursor| cursor.next())
            .expect("some cursor has the key");
        assert_eq!(first_with_cell.value, Some(b"gen2".to_vec()));
    }
}
