//! In-memory write buffer.
//!
//! A [`Memtable`] holds every live mutation since it was created (or
//! since the last flush), ordered by [`InternalKey`] so that for any
//! user key, the most recent version at or below a given sequence
//! number is reachable with a single range lookup. Writes are WAL-first:
//! a [`MemtableRecord`] is appended and fsynced before the in-memory
//! tree is updated, so a crash between the two can only lose an
//! unacknowledged write.
//!
//! Range deletions are stored separately from point entries — they are
//! not expanded into per-key tombstones — and are consulted during
//! `get`/`scan` to determine whether a point entry (or its absence) is
//! shadowed by a later range delete.
//!
//! A memtable that has filled past its write-buffer budget is frozen
//! into a [`FrozenMemtable`], a read-only wrapper that the engine keeps
//! around until its contents have been flushed to an SSTable.

#[cfg(test)]
mod tests;

use std::collections::BTreeMap;
use std::path::Path;
use std::sync::atomic::{AtomicU64, Ordering as AtomicOrdering};
use std::sync::{Arc, RwLock};
use std::time::{SystemTime, UNIX_EPOCH};

use thiserror::Error;
use tracing::{debug, trace};

use crate::encoding::{Decode, Encode, EncodingError};
use crate::key::{InternalKey, RangeTombstone, ValueType};
use crate::wal::{Wal, WalError};

// ------------------------------------------------------------------------------------------------
// Errors
// ------------------------------------------------------------------------------------------------

#[derive(Debug, Error)]
pub enum MemtableError {
    #[error("WAL error: {0}")]
    Wal(#[from] WalError),

    #[error("memtable full, flush required before further writes")]
    FlushRequired,

    #[error("internal error: {0}")]
    Internal(String),
}

// ------------------------------------------------------------------------------------------------
// Wire record — what actually lives in the WAL
// ------------------------------------------------------------------------------------------------

/// A single mutation as it is written to the memtable's WAL.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum MemtableRecord {
    Put {
        key: Vec<u8>,
        value: Vec<u8>,
        seq: u64,
        timestamp: u64,
    },
    Delete {
        key: Vec<u8>,
        seq: u64,
        timestamp: u64,
    },
    RangeDelete {
        start: Vec<u8>,
        end: Vec<u8>,
        seq: u64,
        timestamp: u64,
    },
}

const TAG_PUT: u32 = 0;
const TAG_DELETE: u32 = 1;
const TAG_RANGE_DELETE: u32 = 2;

impl Encode for MemtableRecord {
    fn encode_to(&self, buf: &mut Vec<u8>) -> Result<(), EncodingError> {
        match self {
            MemtableRecord::Put {
                key,
                value,
                seq,
                timestamp,
            } => {
                TAG_PUT.encode_to(buf)?;
                key.encode_to(buf)?;
                value.encode_to(buf)?;
                seq.encode_to(buf)?;
                timestamp.encode_to(buf)?;
            }
            MemtableRecord::Delete {
                key,
                seq,
                timestamp,
            } => {
                TAG_DELETE.encode_to(buf)?;
                key.encode_to(buf)?;
                seq.encode_to(buf)?;
                timestamp.encode_to(buf)?;
            }
            MemtableRecord::RangeDelete {
                start,
                end,
                seq,
                timestamp,
            } => {
                TAG_RANGE_DELETE.encode_to(buf)?;
                start.encode_to(buf)?;
                end.encode_to(buf)?;
                seq.encode_to(buf)?;
                timestamp.encode_to(buf)?;
            }
        }
        Ok(())
    }
}

impl Decode for MemtableRecord {
    fn decode_from(buf: &[u8]) -> Result<(Self, usize), EncodingError> {
        let mut offset = 0;
        let (tag, n) = u32::decode_from(&buf[offset..])?;
        offset += n;
        match tag {
            TAG_PUT => {
                let (key, n) = Vec::<u8>::decode_from(&buf[offset..])?;
                offset += n;
                let (value, n) = Vec::<u8>::decode_from(&buf[offset..])?;
                offset += n;
                let (seq, n) = u64::decode_from(&buf[offset..])?;
                offset += n;
                let (timestamp, n) = u64::decode_from(&buf[offset..])?;
                offset += n;
                Ok((
                    MemtableRecord::Put {
                        key,
                        value,
                        seq,
                        timestamp,
                    },
                    offset,
                ))
            }
            TAG_DELETE => {
                let (key, n) = Vec::<u8>::decode_from(&buf[offset..])?;
                offset += n;
                let (seq, n) = u64::decode_from(&buf[offset..])?;
                offset += n;
                let (timestamp, n) = u64::decode_from(&buf[offset..])?;
                offset += n;
                Ok((
                    MemtableRecord::Delete {
                        key,
                        seq,
                        timestamp,
                    },
                    offset,
                ))
            }
            TAG_RANGE_DELETE => {
                let (start, n) = Vec::<u8>::decode_from(&buf[offset..])?;
                offset += n;
                let (end, n) = Vec::<u8>::decode_from(&buf[offset..])?;
                offset += n;
                let (seq, n) = u64::decode_from(&buf[offset..])?;
                offset += n;
                let (timestamp, n) = u64::decode_from(&buf[offset..])?;
                offset += n;
                Ok((
                    MemtableRecord::RangeDelete {
                        start,
                        end,
                        seq,
                        timestamp,
                    },
                    offset,
                ))
            }
            other => Err(EncodingError::InvalidTag {
                tag: other,
                type_name: "MemtableRecord",
            }),
        }
    }
}

/// Outcome of a point lookup against a single memtable.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum MemtableGetResult {
    /// A live value was found.
    Put(Vec<u8>),
    /// The key is shadowed by a point (or single) tombstone in this
    /// memtable — the engine must not consult older layers.
    Delete,
    /// The key is shadowed by a range tombstone in this memtable — same
    /// stop-searching contract as `Delete`.
    RangeDelete,
    /// Nothing in this memtable mentions the key; the engine should
    /// keep searching older layers.
    NotFound,
}

// ------------------------------------------------------------------------------------------------
// Inner state
// ------------------------------------------------------------------------------------------------

#[derive(Debug, Default)]
struct MemtableInner {
    tree: BTreeMap<InternalKey, Vec<u8>>,
    range_tombstones: Vec<RangeTombstone>,
    approximate_size: usize,
}

impl MemtableInner {
    fn apply_put(&mut self, key: &[u8], value: &[u8], seq: u64) {
        let ik = InternalKey::new(key, seq, ValueType::Value);
        self.approximate_size += ik.len() + value.len();
        self.tree.insert(ik, value.to_vec());
    }

    fn apply_delete(&mut self, key: &[u8], seq: u64) {
        let ik = InternalKey::new(key, seq, ValueType::Deletion);
        self.approximate_size += ik.len();
        self.tree.insert(ik, Vec::new());
    }

    fn apply_range_delete(&mut self, start: &[u8], end: &[u8], seq: u64, timestamp: u64) {
        self.approximate_size += start.len() + end.len() + 16;
        self.range_tombstones.push(RangeTombstone {
            start: start.to_vec(),
            end: end.to_vec(),
            seq,
            timestamp,
        });
    }

    /// The highest-sequence point entry for `user_key` with
    /// `seq <= snapshot_seq`, if any: `(seq, is_delete, value)`.
    fn point_lookup(&self, user_key: &[u8], snapshot_seq: u64) -> Option<(u64, bool, &[u8])> {
        let probe = InternalKey::new(user_key, snapshot_seq, ValueType::ValuePreferredSeqno);
        let (ik, value) = self.tree.range(probe..).next()?;
        if ik.user_key() != user_key {
            return None;
        }
        Some((ik.seq(), ik.value_type().is_deletion(), value))
    }

    /// The highest sequence number, at or below `snapshot_seq`, among
    /// range tombstones covering `user_key`.
    fn covering_tombstone_seq(&self, user_key: &[u8], snapshot_seq: u64) -> Option<u64> {
        self.range_tombstones
            .iter()
            .filter(|rt| rt.seq <= snapshot_seq && rt.start.as_slice() <= user_key && user_key < rt.end.as_slice())
            .map(|rt| rt.seq)
            .max()
    }

    fn resolve(&self, user_key: &[u8], snapshot_seq: u64) -> MemtableGetResult {
        let point = self.point_lookup(user_key, snapshot_seq);
        let tomb_seq = self.covering_tombstone_seq(user_key, snapshot_seq);

        let point_seq = point.map(|(seq, _, _)| seq).unwrap_or(0);
        match tomb_seq {
            Some(ts) if ts > point_seq => MemtableGetResult::RangeDelete,
            _ => match point {
                Some((_, true, _)) => MemtableGetResult::Delete,
                Some((_, false, value)) => MemtableGetResult::Put(value.to_vec()),
                None => MemtableGetResult::NotFound,
            },
        }
    }
}

// ------------------------------------------------------------------------------------------------
// Memtable
// ------------------------------------------------------------------------------------------------

/// An active, mutable, write-buffered memtable backed by a WAL.
#[derive(Debug)]
pub struct Memtable {
    inner: Arc<RwLock<MemtableInner>>,
    pub wal: Wal<MemtableRecord>,
    write_buffer_size: usize,
    max_seq_seen: AtomicU64,
}

impl Memtable {
    /// Opens (or creates) a memtable backed by the WAL at `path`,
    /// replaying any existing records to rebuild in-memory state.
    pub fn new<P: AsRef<Path>>(path: P, write_buffer_size: usize) -> Result<Self, MemtableError> {
        let wal = Wal::<MemtableRecord>::open(path, None)?;
        let mut inner = MemtableInner::default();
        let mut max_seq_seen = 0u64;

        for record in wal.replay_iter()? {
            let record = record?;
            match record {
                MemtableRecord::Put { key, value, seq, .. } => {
                    inner.apply_put(&key, &value, seq);
                    max_seq_seen = max_seq_seen.max(seq);
                }
                MemtableRecord::Delete { key, seq, .. } => {
                    inner.apply_delete(&key, seq);
                    max_seq_seen = max_seq_seen.max(seq);
                }
                MemtableRecord::RangeDelete {
                    start,
                    end,
                    seq,
                    timestamp,
                } => {
                    inner.apply_range_delete(&start, &end, seq, timestamp);
                    max_seq_seen = max_seq_seen.max(seq);
                }
            }
        }

        debug!(max_seq_seen, size = inner.approximate_size, "memtable replayed from WAL");

        Ok(Self {
            inner: Arc::new(RwLock::new(inner)),
            wal,
            write_buffer_size,
            max_seq_seen: AtomicU64::new(max_seq_seen),
        })
    }

    fn inner_read(&self) -> std::sync::RwLockReadGuard<'_, MemtableInner> {
        self.inner.read().unwrap_or_else(|e| e.into_inner())
    }

    fn inner_write(&self) -> std::sync::RwLockWriteGuard<'_, MemtableInner> {
        self.inner.write().unwrap_or_else(|e| e.into_inner())
    }

    fn check_capacity(&self) -> Result<(), MemtableError> {
        if self.inner_read().approximate_size >= self.write_buffer_size {
            return Err(MemtableError::FlushRequired);
        }
        Ok(())
    }

    pub fn put(&mut self, key: Vec<u8>, value: Vec<u8>, seq: u64) -> Result<(), MemtableError> {
        self.check_capacity()?;
        let timestamp = current_timestamp();
        self.wal.append(&MemtableRecord::Put {
            key: key.clone(),
            value: value.clone(),
            seq,
            timestamp,
        })?;
        self.inner_write().apply_put(&key, &value, seq);
        self.max_seq_seen.fetch_max(seq, AtomicOrdering::SeqCst);
        trace!(seq, len = value.len(), "memtable put");
        Ok(())
    }

    pub fn delete(&mut self, key: Vec<u8>, seq: u64) -> Result<(), MemtableError> {
        self.check_capacity()?;
        let timestamp = current_timestamp();
        self.wal.append(&MemtableRecord::Delete {
            key: key.clone(),
            seq,
            timestamp,
        })?;
        self.inner_write().apply_delete(&key, seq);
        self.max_seq_seen.fetch_max(seq, AtomicOrdering::SeqCst);
        trace!(seq, "memtable delete");
        Ok(())
    }

    pub fn delete_range(&mut self, start: Vec<u8>, end: Vec<u8>, seq: u64) -> Result<(), MemtableError> {
        self.check_capacity()?;
        let timestamp = current_timestamp();
        self.wal.append(&MemtableRecord::RangeDelete {
            start: start.clone(),
            end: end.clone(),
            seq,
            timestamp,
        })?;
        self.inner_write().apply_range_delete(&start, &end, seq, timestamp);
        self.max_seq_seen.fetch_max(seq, AtomicOrdering::SeqCst);
        trace!(seq, "memtable range delete");
        Ok(())
    }

    pub fn get(&self, key: &[u8], snapshot_seq: u64) -> MemtableGetResult {
        self.inner_read().resolve(key, snapshot_seq)
    }

    /// Returns live `(key, value)` pairs in `[start, end)` visible at
    /// `snapshot_seq`, honoring point and range tombstones.
    pub fn scan(&self, start: &[u8], end: &[u8], snapshot_seq: u64) -> Vec<(Vec<u8>, Vec<u8>)> {
        let inner = self.inner_read();
        let mut out = Vec::new();
        let mut resolved_key: Option<Vec<u8>> = None;

        let lo = InternalKey::max_for_user_key(start);
        let hi = InternalKey::min_for_user_key(end);

        for (ik, _value) in inner.tree.range(lo..hi) {
            let uk = ik.user_key();
            if resolved_key.as_deref() == Some(uk) {
                continue;
            }
            resolved_key = Some(uk.to_vec());

            match inner.resolve(uk, snapshot_seq) {
                MemtableGetResult::Put(value) => out.push((uk.to_vec(), value)),
                MemtableGetResult::Delete | MemtableGetResult::RangeDelete | MemtableGetResult::NotFound => {}
            }
        }

        out
    }

    /// Emits every `(InternalKey, value)` pair in ascending order plus
    /// all range tombstones, for building an SSTable. Does not mutate
    /// memtable state or apply snapshot filtering — the flushed
    /// SSTable preserves full MVCC history.
    pub fn iter_for_flush(&self) -> (Vec<(InternalKey, Vec<u8>)>, Vec<RangeTombstone>) {
        let inner = self.inner_read();
        let entries = inner
            .tree
            .iter()
            .map(|(k, v)| (k.clone(), v.clone()))
            .collect();
        let tombstones = inner.range_tombstones.clone();
        (entries, tombstones)
    }

    pub fn approximate_size(&self) -> usize {
        self.inner_read().approximate_size
    }

    pub fn max_seq(&self) -> u64 {
        self.max_seq_seen.load(AtomicOrdering::SeqCst)
    }

    /// Consumes this memtable into a read-only [`FrozenMemtable`].
    pub fn freeze(self) -> FrozenMemtable {
        FrozenMemtable {
            memtable: self,
            creation_timestamp: current_timestamp(),
        }
    }
}

/// A memtable that has stopped accepting writes and is waiting to be
/// flushed into an SSTable.
#[derive(Debug)]
pub struct FrozenMemtable {
    pub memtable: Memtable,
    pub creation_timestamp: u64,
}

impl FrozenMemtable {
    pub fn get(&self, key: &[u8], snapshot_seq: u64) -> MemtableGetResult {
        self.memtable.get(key, snapshot_seq)
    }

    pub fn scan(&self, start: &[u8], end: &[u8], snapshot_seq: u64) -> Vec<(Vec<u8>, Vec<u8>)> {
        self.memtable.scan(start, end, snapshot_seq)
    }

    pub fn iter_for_flush(&self) -> (Vec<(InternalKey, Vec<u8>)>, Vec<RangeTombstone>) {
        self.memtable.iter_for_flush()
    }

    pub fn max_seq(&self) -> u64 {
        self.memtable.max_seq()
    }
}

fn current_timestamp() -> u64 {
    SystemTime::now()
        .duration_since(UNIX_EPOCH)
        .map(|d| d.as_millis() as u64)
        .unwrap_or(0)
}

/// Truncates a key to a short hex prefix for tracing output.
pub struct HexKey<'a>(pub &'a [u8]);

impl<'a> std::fmt::Display for HexKey<'a> {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        let shown = &self.0[..self.0.len().min(16)];
        for b in shown {
            write!(f, "{b:02x}")?;
        }
        if self.0.len() > 32 {
            write!(f, "...[{} bytes]", self.0.len())?;
        }
        Ok(())
    }
}
