//! SSTable iterators — block-level and multi-block scan.
//!
//! This module provides two iterator types:
//!
//! - [`BlockIterator`] — decodes a single prefix-compressed data block and
//!   yields [`BlockEntry`] values. It supports `seek_to_first()` and
//!   `seek_to(key)` for positioning.
//! - [`ScanIterator`] — walks multiple data blocks plus range tombstones,
//!   yielding a merged stream of [`Record`] items in `(key ASC, seq DESC)` order.
//!
//! # Block Iterator
//!
//! A data block's content (the bytes returned by [`SSTable::read_block_bytes`])
//! is laid out as:
//!
//! ```text
//! [entry]*  [restart_offset:u32 LE]*num_restarts  [num_restarts:u32 LE]
//! ```
//!
//! Each `entry` prefix-compresses its internal key against the previous
//! entry's internal key, resetting to a full key (`shared_len == 0`) every
//! [`super::BLOCK_RESTART_INTERVAL`] entries:
//!
//! ```text
//! [shared_len: varint64] [non_shared_len: varint64] [value_len: varint64] [timestamp: varint64]
//! [non_shared key bytes] [value bytes]
//! ```
//!
//! Decoding is a linear walk from the start of the block, reconstructing each
//! full internal key from the previous one. Blocks are intentionally small
//! (default 4 KiB), so linear search is efficient and the restart trailer is
//! only consulted to locate where entries end. If corruption or truncation is
//! detected, the iterator treats the block as exhausted.
//!
//! # Scan Iterator
//!
//! [`ScanIterator`] provides a **sorted forward scan** over a single SSTable,
//! yielding all point entries (`Put`, `Delete`) and range tombstones
//! (`RangeDelete`) that overlap a user-specified key range `[start_key, end_key)`.
//!
//! Blocks are decoded lazily and sequentially. When a block is exhausted, the
//! iterator advances to the next one automatically. Range tombstones are
//! interleaved with point entries in key order.
//!
//! The scan iterator does **not** perform visibility resolution — that is the
//! responsibility of upper layers (engine merge iterator, visibility filter).

use std::ops::Deref;

use crate::encoding::get_varint64;
use crate::engine::Record;
use crate::key::InternalKey;

use super::{SSTable, SSTableError};

// ------------------------------------------------------------------------------------------------
// Block Entry
// ------------------------------------------------------------------------------------------------

/// A fully decoded entry from a data block.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct BlockEntry {
    /// The user key bytes.
    pub key: Vec<u8>,

    /// The value bytes. Empty for tombstones.
    pub value: Vec<u8>,

    /// Whether this entry represents a point delete.
    pub is_delete: bool,

    /// Sequence number associated with this version.
    pub seq: u64,

    /// Commit timestamp supplied by the storage engine.
    pub timestamp: u64,
}

// ------------------------------------------------------------------------------------------------
// Block Iterator
// ------------------------------------------------------------------------------------------------

/// Iterator over the entries contained within a single SSTable data block.
///
/// Reconstructs each internal key by prefix-expanding against the previously
/// decoded key, replaying from the start of the entry region on every seek.
///
/// It **does not** handle merging multiple blocks, range tombstones, bloom
/// filter lookups, or other higher-level SSTable mechanics — those live in
/// the outer SSTable layer.
pub struct BlockIterator {
    /// Raw block content: entries followed by the restart trailer.
    data: Vec<u8>,

    /// Offset where the entry region ends (restart trailer begins).
    entries_end: usize,

    /// Cursor into `data`, always pointing at the next entry header to decode.
    cursor: usize,

    /// Full internal key bytes of the last entry decoded, used to expand the
    /// next entry's shared prefix.
    last_key: Vec<u8>,
}

impl BlockIterator {
    /// Create a new iterator over a block's raw content bytes (as returned
    /// by [`SSTable::read_block_bytes`]).
    pub fn new(data: Vec<u8>) -> Self {
        let entries_end = entry_region_end(&data);
        Self {
            data,
            entries_end,
            cursor: 0,
            last_key: Vec::new(),
        }
    }

    /// Reset the iterator to the first entry in the block.
    pub fn seek_to_first(&mut self) {
        self.cursor = 0;
        self.last_key.clear();
    }

    /// Seek to the first entry whose user key is **≥ `search_key`**.
    ///
    /// This performs a **linear scan** from the start of the block, since
    /// reconstructing a prefix-compressed key requires replaying from a
    /// restart point. If corruption or truncation is detected, the iterator
    /// stops at the end of the block.
    pub fn seek_to(&mut self, search_key: &[u8]) {
        self.seek_to_first();
        loop {
            let before = self.cursor;
            match self.peek_internal_key() {
                Some(ik) if ik.user_key() >= search_key => {
                    self.cursor = before;
                    return;
                }
                Some(_) => continue,
                None => return,
            }
        }
    }

    /// Decodes the entry at the cursor (advancing it and `last_key`) and
    /// returns its internal key, without materializing the value.
    fn peek_internal_key(&mut self) -> Option<InternalKey> {
        self.next_entry().map(|entry| {
            InternalKey::new(
                &entry.key,
                entry.seq,
                if entry.is_delete {
                    crate::key::ValueType::Deletion
                } else {
                    crate::key::ValueType::Value
                },
            )
        })
    }

    /// Decode and return the next entry, advancing the cursor.
    ///
    /// Returns `None` if the cursor is at or past the end of the entry
    /// region, decoding fails, or the block appears truncated.
    pub fn next_entry(&mut self) -> Option<BlockEntry> {
        if self.cursor >= self.entries_end {
            return None;
        }

        let region = &self.data[..self.entries_end];
        let mut offset = self.cursor;

        let (shared_len, n) = get_varint64(&region[offset..]).ok()?;
        offset += n;
        let (non_shared_len, n) = get_varint64(&region[offset..]).ok()?;
        offset += n;
        let (value_len, n) = get_varint64(&region[offset..]).ok()?;
        offset += n;
        let (timestamp, n) = get_varint64(&region[offset..]).ok()?;
        offset += n;

        let shared_len = shared_len as usize;
        let non_shared_len = non_shared_len as usize;
        let value_len = value_len as usize;

        if shared_len > self.last_key.len() || offset + non_shared_len + value_len > region.len() {
            self.cursor = self.entries_end;
            return None;
        }

        let mut full_key = Vec::with_capacity(shared_len + non_shared_len);
        full_key.extend_from_slice(&self.last_key[..shared_len]);
        full_key.extend_from_slice(&region[offset..offset + non_shared_len]);
        offset += non_shared_len;

        let value = region[offset..offset + value_len].to_vec();
        offset += value_len;

        self.last_key = full_key.clone();
        self.cursor = offset;

        let internal_key = match InternalKey::from_raw(full_key) {
            Ok(ik) => ik,
            Err(e) => {
                tracing::warn!(?e, "corrupt internal key during block decode");
                self.cursor = self.entries_end;
                return None;
            }
        };

        let is_delete = internal_key.value_type().is_deletion();
        let seq = internal_key.seq();
        let key = internal_key.user_key().to_vec();

        Some(BlockEntry {
            key,
            value,
            is_delete,
            seq,
            timestamp,
        })
    }

    /// Returns `true` if the iterator has reached the end of the block or encountered corruption.
    #[allow(dead_code)]
    pub fn is_end(&self) -> bool {
        self.cursor >= self.entries_end
    }
}

/// Locates the byte offset where the entry region ends (i.e. where the
/// restart-offset trailer begins) by reading the trailing `num_restarts` count.
fn entry_region_end(data: &[u8]) -> usize {
    if data.len() < 4 {
        return 0;
    }
    let count_offset = data.len() - 4;
    let num_restarts = u32::from_le_bytes(data[count_offset..].try_into().unwrap_or([0; 4])) as usize;
    count_offset.saturating_sub(num_restarts * 4)
}

/// Implements idiomatic Rust iteration over block entries.
impl Iterator for BlockIterator {
    type Item = BlockEntry;

    fn next(&mut self) -> Option<Self::Item> {
        self.next_entry()
    }
}

// ------------------------------------------------------------------------------------------------
// Scan Iterator
// ------------------------------------------------------------------------------------------------

/// Iterator over all SSTable entries (point or range tombstones)
/// within the half-open interval:
///
/// ```text
/// [start_key, end_key)
/// ```
///
/// This iterator yields items of type [`Record`].
///
/// Internally, it:
///
/// - Tracks the current data-block index (`current_block_index`)
/// - Holds a block-local iterator (`BlockIterator`)
/// - Iterates through range tombstones stored in a separate structure
///
/// Errors during block loading or decoding are returned via the iterator.
pub struct ScanIterator<S: Deref<Target = SSTable> = &'static SSTable> {
    /// Reference to (or owned handle on) the SSTable being scanned.
    sstable: S,

    /// Current index into the SSTable block index.
    current_block_index: usize,

    /// Iterator over the entries in the current data block.
    current_block_iter: Option<BlockIterator>,

    /// Left bound of the user scan (inclusive).
    start_key: Vec<u8>,

    /// Right bound of the user scan (exclusive).
    end_key: Vec<u8>,

    /// Index into the SSTable range tombstone array.
    pending_range_idx: usize,

    /// Next range tombstone to yield.
    next_range: Option<Record>,

    /// Next point entry (Put/Delete) to yield.
    next_point: Option<Record>,
}

impl<S: Deref<Target = SSTable>> ScanIterator<S> {
    /// Create a new SSTable scan iterator for the half-open range
    /// `start_key <= key < end_key`.
    pub fn new(sstable: S, start_key: Vec<u8>, end_key: Vec<u8>) -> Result<Self, SSTableError> {
        if start_key >= end_key {
            return Err(SSTableError::Internal("scan start >= end".to_string()));
        }

        let current_block_index = sstable.find_block_for_key(start_key.as_slice());

        let block_iter = if current_block_index < sstable.index.len() {
            let entry = &sstable.index[current_block_index];
            let block_bytes = SSTable::read_block_bytes(&sstable.mmap, &entry.handle)?;
            let mut it = BlockIterator::new(block_bytes);
            it.seek_to(start_key.as_slice());
            Some(it)
        } else {
            None
        };

        Ok(Self {
            sstable,
            current_block_index,
            current_block_iter: block_iter,
            start_key,
            end_key,
            pending_range_idx: 0,
            next_range: None,
            next_point: None,
        })
    }

    /// Load the next data block and create a fresh `BlockIterator`.
    fn load_next_block(&mut self) -> Result<bool, SSTableError> {
        self.current_block_index += 1;

        if self.current_block_index >= self.sstable.index.len() {
            self.current_block_iter = None;
            return Ok(false);
        }

        let entry = &self.sstable.index[self.current_block_index];
        let block_bytes = SSTable::read_block_bytes(&self.sstable.mmap, &entry.handle)?;

        let mut it = BlockIterator::new(block_bytes);
        it.seek_to_first();
        self.current_block_iter = Some(it);

        Ok(true)
    }

    /// Return the next *point entry* (Put/Delete) in the scan key range,
    /// automatically advancing to the next block as needed.
    fn next_point_or_delete(&mut self) -> Option<Record> {
        loop {
            let it = self.current_block_iter.as_mut()?;

            if let Some(item) = it.next_entry() {
                // Stop when out of scan range
                if item.key.as_slice() >= self.end_key.as_slice() {
                    return None;
                }

                if item.is_delete {
                    return Some(Record::Delete {
                        key: item.key,
                        seq: item.seq,
                        timestamp: item.timestamp,
                    });
                }

                return Some(Record::Put {
                    key: item.key,
                    value: item.value,
                    seq: item.seq,
                    timestamp: item.timestamp,
                });
            }

            // end of block - load next
            match self.load_next_block() {
                Ok(true) => {}
                Ok(false) => return None,
                Err(e) => {
                    tracing::warn!(?e, "error loading next block during scan");
                    return None;
                }
            }
        }
    }

    /// Return the next range tombstone that overlaps the scan range.
    fn next_range_delete(&mut self) -> Option<Record> {
        while self.pending_range_idx < self.sstable.range_deletes.len() {
            let r = &self.sstable.range_deletes[self.pending_range_idx];

            // Skip ranges completely left of scan window
            if r.end.as_slice() <= self.start_key.as_slice() {
                self.pending_range_idx += 1;
                continue;
            }

            // Stop when range start is beyond end of scan range
            if r.start.as_slice() >= self.end_key.as_slice() {
                return None;
            }

            // Emit range
            self.pending_range_idx += 1;

            return Some(Record::RangeDelete {
                start: r.start.clone(),
                end: r.end.clone(),
                seq: r.seq,
                timestamp: r.timestamp,
            });
        }

        None
    }

    /// Ensure that `next_range` is populated.
    fn fill_range(&mut self) {
        if self.next_range.is_none() {
            self.next_range = self.next_range_delete();
        }
    }

    /// Ensure that `next_point` is populated.
    fn fill_point(&mut self) {
        if self.next_point.is_none() {
            self.next_point = self.next_point_or_delete();
        }
    }
}

impl<S: Deref<Target = SSTable>> Iterator for ScanIterator<S> {
    type Item = Record;

    fn next(&mut self) -> Option<Self::Item> {
        self.fill_range();
        self.fill_point();

        match (&self.next_range, &self.next_point) {
            (None, None) => None, // end of scan

            (Some(_), None) => self.next_range.take(),
            (None, Some(_)) => self.next_point.take(),

            (Some(r), Some(p)) => {
                if r.key().cmp(p.key()).then_with(|| p.seq().cmp(&r.seq())).is_le() {
                    self.next_range.take()
                } else {
                    self.next_point.take()
                }
            }
        }
    }
}
