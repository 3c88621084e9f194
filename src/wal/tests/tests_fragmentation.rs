use crate::wal::{Wal, WAL_BLOCK_SIZE};
use tempfile::tempdir;

#[test]
fn record_larger_than_one_block_splits_across_fragments() {
    let dir = tempdir().unwrap();
    let path = dir.path().join("000000.log");
    let mut wal = Wal::<Vec<u8>>::open(&path, Some((WAL_BLOCK_SIZE * 4) as u32)).unwrap();

    let big: Vec<u8> = (0..(WAL_BLOCK_SIZE * 3 + 123))
        .map(|i| (i % 251) as u8)
        .collect();
    wal.append(&big).unwrap();
    wal.append(&b"tail record".to_vec()).unwrap();

    let records: Vec<Vec<u8>> = wal.replay_iter().unwrap().map(|r| r.unwrap()).collect();
    assert_eq!(records.len(), 2);
    assert_eq!(records[0], big);
    assert_eq!(records[1], b"tail record".to_vec());
}

#[test]
fn many_small_records_cross_block_boundaries_cleanly() {
    let dir = tempdir().unwrap();
    let path = dir.path().join("000000.log");
    let mut wal = Wal::<Vec<u8>>::open(&path, None).unwrap();

    let expected: Vec<Vec<u8>> = (0..5000u32).map(|i| i.to_le_bytes().to_vec()).collect();
    for rec in &expected {
        wal.append(rec).unwrap();
    }

    let actual: Vec<Vec<u8>> = wal.replay_iter().unwrap().map(|r| r.unwrap()).collect();
    assert_eq!(actual, expected);
}

#[test]
fn record_exceeding_max_size_is_rejected() {
    let dir = tempdir().unwrap();
    let path = dir.path().join("000000.log");
    let mut wal = Wal::<Vec<u8>>::open(&path, Some(16)).unwrap();

    let oversized = vec![0u8; 1024];
    assert!(wal.append(&oversized).is_err());
}
