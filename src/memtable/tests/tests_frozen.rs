use crate::memtable::{Memtable, MemtableGetResult};
use tempfile::tempdir;

#[test]
fn freeze_preserves_reads() {
    let dir = tempdir().unwrap();
    let mut mt = Memtable::new(dir.path().join("000000.log"), 1 << 20).unwrap();
    mt.put(b"a".to_vec(), b"1".to_vec(), 1).unwrap();

    let frozen = mt.freeze();
    assert_eq!(frozen.get(b"a", 1), MemtableGetResult::Put(b"1".to_vec()));
    assert_eq!(frozen.max_seq(), 1);
}

#[test]
fn iter_for_flush_emits_full_mvcc_history() {
    let dir = tempdir().unwrap();
    let mut mt = Memtable::new(dir.path().join("000000.log"), 1 << 20).unwrap();
    mt.put(b"a".to_vec(), b"1".to_vec(), 1).unwrap();
    mt.put(b"a".to_vec(), b"2".to_vec(), 2).unwrap();
    mt.delete_range(b"x".to_vec(), b"y".to_vec(), 3).unwrap();

    let frozen = mt.freeze();
    let (entries, tombstones) = frozen.iter_for_flush();

    assert_eq!(entries.len(), 2);
    assert_eq!(tombstones.len(), 1);
    // Newest version of "a" sorts first under InternalKey ordering.
    assert_eq!(entries[0].1, b"2".to_vec());
    assert_eq!(entries[1].1, b"1".to_vec());
}
