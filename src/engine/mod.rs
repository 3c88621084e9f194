//! # LSM Storage Engine
//!
//! This module implements a **synchronous**, **crash-safe** LSM-tree storage engine
//! with multi-version concurrency, point and range tombstones, and pluggable
//! compaction strategies.
//!
//! ## Design Overview
//!
//! The engine organises data across three layers, queried newest-first:
//!
//! 1. **Active memtable** — an in-memory sorted map backed by a write-ahead log (WAL).
//! 2. **Frozen memtables** — read-only snapshots of previously active memtables,
//!    awaiting flush to persistent SSTables.
//! 3. **SSTables** — immutable, sorted, on-disk files with bloom filters and block
//!    indices for efficient point lookups and range scans, organized into levels
//!    via the [`Manifest`]'s current [`Version`].
//!
//! Writes go through the WAL first, then into the active memtable. When the
//! memtable exceeds [`EngineConfig::write_buffer_size`] it is frozen and a
//! fresh memtable + WAL is created. Frozen memtables are flushed to SSTables
//! via [`Engine::flush_oldest_frozen`] / [`Engine::flush_all_frozen`].
//!
//! ## On-disk layout
//!
//! Every file lives flat under the data directory — no `manifest/`,
//! `memtables/`, or `sstables/` subdirectories:
//!
//! ```text
//! <data_dir>/
//!   CURRENT            — names the active MANIFEST file
//!   MANIFEST-<nnnnnn>   — version-edit log
//!   <nnnnnn>.log        — WAL segment (active or awaiting flush)
//!   <nnnnnn>.sst        — SSTable
//!   LOCK                — advisory lock held for the lifetime of the `Engine`
//! ```
//!
//! File numbers share a single monotonic counter (allocated via
//! [`Manifest::allocate_file_number`]), so a WAL segment and an SSTable
//! never collide.
//!
//! ## Concurrency Model
//!
//! All engine state is protected by a single `Arc<RwLock<EngineInner>>`.
//! Reads acquire a **read lock**; writes and flushes acquire a **write lock**.
//! Compaction acquires a write lock for its entire merge/swap phase — see
//! the module-level note on why this is acceptable for a background task.
//!
//! ## Multi-version concurrency
//!
//! Every mutation is stamped with an engine-assigned, strictly increasing
//! sequence number. [`Engine::snapshot`] captures the highest sequence
//! number durable at that instant; [`Engine::get_at`] / [`Engine::scan_at`]
//! resolve reads against that snapshot instead of "now". The plain
//! [`Engine::get`] / [`Engine::scan`] read at the latest sequence number.
//!
//! ## Compaction
//!
//! Four compaction entry points are exposed:
//!
//! - [`Engine::compact`] — runs whichever [`CompactionStrategy`] is
//!   selected by [`EngineConfig::compaction_strategy`] (Universal, Level,
//!   or Fifo).
//! - [`Engine::minor_compact`] — always runs the Universal strategy's
//!   size-tiered bucket merge, regardless of the configured strategy.
//! - [`Engine::tombstone_compact`] — always runs the Universal strategy's
//!   per-SSTable tombstone GC pass.
//! - [`Engine::major_compact`] — always runs a full merge of every live
//!   SSTable into one.
//!
//! The last three exist as manual, always-available maintenance hooks —
//! useful during tests and operational tooling even when the configured
//! strategy is Level or Fifo.
//!
//! ## Guarantees
//!
//! - **Durability:** Every write is persisted to WAL before acknowledgement.
//! - **Crash recovery:** On [`Engine::open`], the manifest, WALs, and SSTables
//!   are replayed to reconstruct the last durable state.
//! - **Multi-version reads:** Point lookups and scans always see the latest
//!   committed version of each key as of their snapshot, respecting tombstones.
//! - **Atomic flushes:** Each frozen memtable is flushed to a single SSTable
//!   and the manifest is updated atomically.

use std::collections::HashMap;
use std::fs::{self, File};
use std::path::{Path, PathBuf};
use std::sync::{Arc, RwLock, RwLockReadGuard, RwLockWriteGuard};

use fs4::fs_std::FileExt;
use thiserror::Error;
use tracing::{debug, info};

use crate::compaction::{CompactionContext, CompactionError, CompactionResult, CompactionStrategy};
use crate::key::InternalKey;
use crate::manifest::{FileMetadata, Manifest, ManifestError};
use crate::memtable::{FrozenMemtable, Memtable, MemtableError, MemtableGetResult};
use crate::sstable::{self, SSTable, SSTableError};

pub mod utils;
pub use utils::{PointEntry, RangeTombstone, Record};

#[cfg(test)]
mod tests;

const LOCK_FILENAME: &str = "LOCK";

fn wal_filename(number: u64) -> String {
    format!("{number:06}.log")
}

fn sst_filename(number: u64) -> String {
    format!("{number:06}.sst")
}

/// Errors that can occur during engine operations.
#[derive(Debug, Error)]
pub enum EngineError {
    /// Error originating from the manifest subsystem.
    #[error("Manifest error: {0}")]
    Manifest(#[from] ManifestError),

    /// Error originating from the memtable subsystem.
    #[error("Memtable error: {0}")]
    Memtable(#[from] MemtableError),

    /// Error originating from the SSTable subsystem.
    #[error("SSTable error: {0}")]
    SSTable(#[from] SSTableError),

    /// Error originating from a compaction strategy.
    #[error("Compaction error: {0}")]
    Compaction(#[from] CompactionError),

    /// Underlying filesystem I/O error.
    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),

    /// Internal invariant violation (poisoned lock, unexpected state, etc.).
    #[error("Internal error: {0}")]
    Internal(String),
}

/// Configuration for an [`Engine`] instance.
///
/// Controls memtable sizing, compaction strategy selection, and all
/// compaction-related thresholds. Passed to [`Engine::open`].
pub struct EngineConfig {
    /// Max memtable size (bytes) before freeze.
    pub write_buffer_size: usize,

    /// Compaction strategy to use for this engine instance's
    /// [`Engine::compact`]. Does not affect `minor_compact` /
    /// `tombstone_compact` / `major_compact`, which always run the
    /// Universal strategy's corresponding operation.
    pub compaction_strategy: crate::compaction::CompactionStrategyType,

    /// Lower bound multiplier for bucket size range ([avg × bucket_low, avg × bucket_high]).
    pub bucket_low: f64,

    /// Upper bound multiplier for bucket size range.
    pub bucket_high: f64,

    /// Min size (bytes) for regular buckets; smaller SSTables go to the "small" bucket.
    pub min_sstable_size: usize,

    /// Min SSTables in a bucket to trigger minor compaction.
    pub min_threshold: usize,

    /// Max SSTables to compact at once in minor compaction.
    pub max_threshold: usize,

    /// Ratio of tombstones to total records to trigger tombstone compaction.
    pub tombstone_ratio_threshold: f64,

    /// Min SSTable age (seconds) before eligible for tombstone compaction.
    pub tombstone_compaction_interval: usize,

    /// When true, tombstone compaction resolves bloom filter false positives
    /// by doing an actual `get()` on other SSTables for point tombstones.
    pub tombstone_bloom_fallback: bool,

    /// When true, tombstone compaction will scan older SSTables to check
    /// whether a range tombstone still covers any live keys, allowing
    /// aggressive range tombstone removal.
    pub tombstone_range_drop: bool,

    /// Number of L0 files that triggers leveled compaction's L0 → L1 merge.
    pub level0_compaction_trigger: usize,

    /// Per-level size growth factor for leveled compaction (`L`'s budget is
    /// `base_level_max_bytes * level_size_multiplier^(L-1)`).
    pub level_size_multiplier: u64,

    /// Size budget (bytes) for L1 in leveled compaction.
    pub base_level_max_bytes: u64,

    /// Target max size (bytes) for a single leveled-compaction output file.
    /// Not currently enforced — leveled compaction writes one output file
    /// per step; see [`crate::compaction::level`] for the simplification.
    pub max_output_file_size: u64,

    /// Total live-data byte budget for FIFO compaction; oldest files are
    /// dropped once the dataset exceeds this.
    pub fifo_max_total_size_bytes: u64,

    /// Thread pool size for flushing memtables and compactions.
    pub thread_pool_size: usize,
}

/// Snapshot of engine statistics returned by [`Engine::stats`].
pub struct EngineStats {
    /// Number of frozen memtables pending flush.
    pub frozen_count: usize,
    /// Total number of SSTables on disk.
    pub sstables_count: usize,
    /// Sum of all SSTable file sizes in bytes.
    pub total_sst_size_bytes: u64,
    /// Per-SSTable file sizes in bytes.
    pub sst_sizes: Vec<u64>,
}

/// A point-in-time read snapshot, captured via [`Engine::snapshot`].
///
/// Reads through [`Engine::get_at`] / [`Engine::scan_at`] only see
/// mutations whose sequence number is `<= snapshot.seq()` — later writes
/// are invisible, even if they land before the read completes.
#[derive(Debug, Clone, Copy)]
pub struct Snapshot {
    seq: u64,
}

impl Snapshot {
    /// The sequence number this snapshot is pinned to.
    pub fn seq(&self) -> u64 {
        self.seq
    }
}

struct EngineInner {
    /// Persistent manifest for this engine (tracks the current `Version`,
    /// file-number and sequence-number counters).
    manifest: Manifest,

    /// Active memtable that accepts writes.
    active: Memtable,

    /// Frozen memtables waiting to be flushed to SSTable, newest first.
    /// We keep them in memory for reads until flush completes.
    frozen: Vec<FrozenMemtable>,

    /// Loaded SSTables, keyed by file number.
    sstables: HashMap<u64, Arc<SSTable>>,

    /// Root directory this engine is mounted on.
    data_dir: PathBuf,

    /// A short config for thresholds, sizes, etc.
    config: EngineConfig,

    /// Next sequence number to hand out to a mutation.
    next_seq: u64,
}

/// The main LSM storage engine handle.
///
/// Thread-safe — can be cloned and shared across threads via the
/// internal `Arc<RwLock<_>>`. Holds an advisory file lock on the data
/// directory for as long as any clone is alive.
pub struct Engine {
    inner: Arc<RwLock<EngineInner>>,
    _lock_file: Arc<File>,
}

impl Clone for Engine {
    fn clone(&self) -> Self {
        Self {
            inner: Arc::clone(&self.inner),
            _lock_file: Arc::clone(&self._lock_file),
        }
    }
}

impl Engine {
    /// Opens (or creates) an engine rooted at the given directory.
    ///
    /// On a fresh directory, the manifest is bootstrapped and a single
    /// empty WAL segment is created. On an existing directory, the
    /// manifest is replayed, live WAL segments are discovered and loaded
    /// (the newest becomes the active memtable, the rest are frozen), and
    /// SSTables named by the current `Version` are opened. Any `.log` file
    /// older than the manifest's recorded log number, and any `.sst` file
    /// not named by the current `Version`, is swept as an orphan.
    ///
    /// Fails if another `Engine` already holds the directory's `LOCK` file.
    pub fn open(path: impl AsRef<Path>, config: EngineConfig) -> Result<Self, EngineError> {
        let data_dir = path.as_ref().to_path_buf();
        fs::create_dir_all(&data_dir)?;

        let lock_path = data_dir.join(LOCK_FILENAME);
        let lock_file = fs::OpenOptions::new().create(true).read(true).write(true).open(&lock_path)?;
        lock_file.try_lock_exclusive().map_err(|e| {
            EngineError::Internal(format!("failed to lock {}: {e} (already open elsewhere?)", lock_path.display()))
        })?;

        let manifest = Manifest::open(&data_dir)?;

        let wal_numbers = discover_numbered_files(&data_dir, "log")?;
        let log_number = manifest.log_number()?;
        let mut live_wals = Vec::new();
        for n in wal_numbers {
            if log_number > 0 && n < log_number {
                let _ = fs::remove_file(data_dir.join(wal_filename(n)));
            } else {
                live_wals.push(n);
            }
        }

        let (active, mut frozen) = if let Some(&newest) = live_wals.last() {
            let active = Memtable::new(data_dir.join(wal_filename(newest)), config.write_buffer_size)?;
            let mut frozen = Vec::with_capacity(live_wals.len() - 1);
            for &n in live_wals[..live_wals.len() - 1].iter().rev() {
                let mt = Memtable::new(data_dir.join(wal_filename(n)), config.write_buffer_size)?;
                frozen.push(mt.freeze());
            }
            (active, frozen)
        } else {
            let fresh_number = manifest.allocate_file_number()?;
            manifest.set_log_number(fresh_number)?;
            let active = Memtable::new(data_dir.join(wal_filename(fresh_number)), config.write_buffer_size)?;
            (active, Vec::new())
        };
        frozen.sort_by(|a, b| b.memtable.wal.wal_seq().cmp(&a.memtable.wal.wal_seq()));

        let version = manifest.current_version()?;
        let mut sstables: HashMap<u64, Arc<SSTable>> = HashMap::new();
        for meta in version.all_files() {
            let sst_path = data_dir.join(sst_filename(meta.number));
            let mut sst = SSTable::open(&sst_path)?;
            sst.id = meta.number;
            sstables.insert(meta.number, Arc::new(sst));
        }

        for n in discover_numbered_files(&data_dir, "sst")? {
            if !sstables.contains_key(&n) {
                let _ = fs::remove_file(data_dir.join(sst_filename(n)));
            }
        }

        let mut next_seq = manifest.last_sequence()? + 1;
        next_seq = next_seq.max(active.max_seq() + 1);
        for f in &frozen {
            next_seq = next_seq.max(f.max_seq() + 1);
        }
        for sst in sstables.values() {
            next_seq = next_seq.max(sst.properties.max_seq + 1);
        }

        info!(
            dir = %data_dir.display(),
            frozen = frozen.len(),
            sstables = sstables.len(),
            next_seq,
            "engine opened"
        );

        let inner = EngineInner {
            manifest,
            active,
            frozen,
            sstables,
            data_dir,
            config,
            next_seq,
        };

        Ok(Self {
            inner: Arc::new(RwLock::new(inner)),
            _lock_file: Arc::new(lock_file),
        })
    }

    /// Gracefully shuts down the engine.
    ///
    /// Flushes all remaining frozen memtables, records the final durable
    /// sequence number and log number in the manifest, and fsyncs the
    /// data directory.
    pub fn close(&self) -> Result<(), EngineError> {
        let mut inner = self.write()?;

        while !inner.frozen.is_empty() {
            Self::flush_frozen_to_sstable_inner(&mut inner)?;
        }

        let seq = inner.next_seq.saturating_sub(1);
        inner.manifest.record_sequence(seq)?;
        inner.manifest.set_log_number(inner.active.wal.wal_seq())?;

        if let Ok(dir) = fs::File::open(&inner.data_dir) {
            dir.sync_all()?;
        }

        Ok(())
    }

    /// Insert a key-value pair.
    ///
    /// Returns `Ok(true)` if the active memtable was frozen (caller should
    /// arrange a flush), `Ok(false)` otherwise.
    pub fn put(&self, key: Vec<u8>, value: Vec<u8>) -> Result<bool, EngineError> {
        let mut inner = self.write()?;
        let seq = Self::allocate_seq(&mut inner);

        match inner.active.put(key.clone(), value.clone(), seq) {
            Ok(()) => Ok(false),
            Err(MemtableError::FlushRequired) => {
                Self::freeze_active(&mut inner)?;
                let seq = Self::allocate_seq(&mut inner);
                inner.active.put(key, value, seq)?;
                Ok(true)
            }
            Err(e) => Err(e.into()),
        }
    }

    /// Delete a key (insert a point tombstone).
    ///
    /// Returns `Ok(true)` if the active memtable was frozen, `Ok(false)` otherwise.
    pub fn delete(&self, key: Vec<u8>) -> Result<bool, EngineError> {
        let mut inner = self.write()?;
        let seq = Self::allocate_seq(&mut inner);

        match inner.active.delete(key.clone(), seq) {
            Ok(()) => Ok(false),
            Err(MemtableError::FlushRequired) => {
                Self::freeze_active(&mut inner)?;
                let seq = Self::allocate_seq(&mut inner);
                inner.active.delete(key, seq)?;
                Ok(true)
            }
            Err(e) => Err(e.into()),
        }
    }

    /// Delete all keys in `[start_key, end_key)` (insert a range tombstone).
    ///
    /// Returns `Ok(true)` if the active memtable was frozen, `Ok(false)` otherwise.
    pub fn delete_range(&self, start_key: Vec<u8>, end_key: Vec<u8>) -> Result<bool, EngineError> {
        let mut inner = self.write()?;
        let seq = Self::allocate_seq(&mut inner);

        match inner.active.delete_range(start_key.clone(), end_key.clone(), seq) {
            Ok(()) => Ok(false),
            Err(MemtableError::FlushRequired) => {
                Self::freeze_active(&mut inner)?;
                let seq = Self::allocate_seq(&mut inner);
                inner.active.delete_range(start_key, end_key, seq)?;
                Ok(true)
            }
            Err(e) => Err(e.into()),
        }
    }

    /// Captures a read snapshot pinned to the most recently allocated
    /// sequence number. Reads via [`Engine::get_at`] / [`Engine::scan_at`]
    /// using this snapshot are stable even as later writes land.
    pub fn snapshot(&self) -> Result<Snapshot, EngineError> {
        let inner = self.read()?;
        Ok(Snapshot { seq: inner.next_seq.saturating_sub(1) })
    }

    /// Look up a single key at the latest visible sequence number.
    ///
    /// Returns `Ok(Some(value))` if the key exists, `Ok(None)` if it has
    /// been deleted or was never written, or `Err` on I/O failure.
    pub fn get(&self, key: Vec<u8>) -> Result<Option<Vec<u8>>, EngineError> {
        self.get_internal(&key, crate::key::MAX_SEQUENCE)
    }

    /// Look up a single key as of `snapshot`.
    pub fn get_at(&self, snapshot: &Snapshot, key: Vec<u8>) -> Result<Option<Vec<u8>>, EngineError> {
        self.get_internal(&key, snapshot.seq)
    }

    /// The lookup order is: active memtable → frozen memtables (newest →
    /// oldest) → SSTables (L0 newest-file-first, then each higher level,
    /// which is sorted and non-overlapping). The first definitive result
    /// at or below `snapshot_seq` wins.
    fn get_internal(&self, key: &[u8], snapshot_seq: u64) -> Result<Option<Vec<u8>>, EngineError> {
        let inner = self.read()?;

        match inner.active.get(key, snapshot_seq) {
            MemtableGetResult::Put(value) => return Ok(Some(value)),
            MemtableGetResult::Delete | MemtableGetResult::RangeDelete => return Ok(None),
            MemtableGetResult::NotFound => {}
        }

        for frozen in &inner.frozen {
            match frozen.get(key, snapshot_seq) {
                MemtableGetResult::Put(value) => return Ok(Some(value)),
                MemtableGetResult::Delete | MemtableGetResult::RangeDelete => return Ok(None),
                MemtableGetResult::NotFound => {}
            }
        }

        let version = inner.manifest.current_version()?;

        for level in 0..version.num_levels() as u32 {
            let files = version.level(level);

            if level == 0 {
                let mut candidates: Vec<&FileMetadata> =
                    files.iter().filter(|f| crate::compaction::file_might_contain(f, key)).collect();
                candidates.sort_by(|a, b| b.number.cmp(&a.number));

                for f in candidates {
                    if let Some(found) = Self::probe_sstable(&inner, f.number, key, snapshot_seq)? {
                        return Ok(found);
                    }
                }
            } else if let Some(f) = files.iter().find(|f| crate::compaction::file_might_contain(f, key))
                && let Some(found) = Self::probe_sstable(&inner, f.number, key, snapshot_seq)?
            {
                return Ok(found);
            }
        }

        Ok(None)
    }

    /// Probes one SSTable for `key`. Returns `Ok(None)` when the file has
    /// nothing usable for this lookup (not found, or its only version is
    /// newer than `snapshot_seq`) — the caller should keep looking in
    /// older files. Returns `Ok(Some(_))` with the definitive answer
    /// otherwise.
    ///
    /// This is a deliberate simplification: an SSTable result newer than
    /// the snapshot is skipped rather than resolved to an older version
    /// still present in the same file (see `DESIGN.md`).
    fn probe_sstable(
        inner: &EngineInner,
        number: u64,
        key: &[u8],
        snapshot_seq: u64,
    ) -> Result<Option<Option<Vec<u8>>>, EngineError> {
        let Some(sst) = inner.sstables.get(&number) else {
            return Ok(None);
        };

        match sst.get(key)? {
            sstable::GetResult::NotFound => Ok(None),
            result if result.seq() <= snapshot_seq => Ok(Some(match result {
                sstable::GetResult::Put { value, .. } => Some(value),
                sstable::GetResult::Delete { .. } | sstable::GetResult::RangeDelete { .. } => None,
                sstable::GetResult::NotFound => unreachable!(),
            })),
            _ => Ok(None),
        }
    }

    /// Scan all live key-value pairs in `[start_key, end_key)` at the
    /// latest visible sequence number.
    pub fn scan(&self, start_key: &[u8], end_key: &[u8]) -> Result<VisibilityFilter<utils::MergeIterator<'static>>, EngineError> {
        self.scan_internal(start_key, end_key, crate::key::MAX_SEQUENCE)
    }

    /// Scan all live key-value pairs in `[start_key, end_key)` as of `snapshot`.
    pub fn scan_at(
        &self,
        snapshot: &Snapshot,
        start_key: &[u8],
        end_key: &[u8],
    ) -> Result<VisibilityFilter<utils::MergeIterator<'static>>, EngineError> {
        self.scan_internal(start_key, end_key, snapshot.seq)
    }

    fn scan_internal(
        &self,
        start_key: &[u8],
        end_key: &[u8],
        snapshot_seq: u64,
    ) -> Result<VisibilityFilter<utils::MergeIterator<'static>>, EngineError> {
        let merged = self.raw_scan(start_key, end_key, snapshot_seq)?;
        Ok(VisibilityFilter::new(merged))
    }

    fn raw_scan(&self, start_key: &[u8], end_key: &[u8], snapshot_seq: u64) -> Result<utils::MergeIterator<'static>, EngineError> {
        let inner = self.read()?;

        let mut iters: Vec<Box<dyn Iterator<Item = Record>>> = Vec::new();

        let (entries, tombstones) = inner.active.iter_for_flush();
        iters.push(Box::new(
            memtable_records_in_range(entries, tombstones, start_key, end_key, snapshot_seq).into_iter(),
        ));

        for frozen in &inner.frozen {
            let (entries, tombstones) = frozen.iter_for_flush();
            iters.push(Box::new(
                memtable_records_in_range(entries, tombstones, start_key, end_key, snapshot_seq).into_iter(),
            ));
        }

        for sst in inner.sstables.values() {
            let records = SSTable::scan_owned(sst, start_key, end_key)?;
            iters.push(Box::new(records.filter(move |r| r.seq() <= snapshot_seq)));
        }

        Ok(utils::MergeIterator::new(iters))
    }

    /// Returns a snapshot of engine statistics.
    ///
    /// Includes frozen memtable count, SSTable count, per-SSTable file
    /// sizes, and total on-disk SSTable size.
    pub fn stats(&self) -> Result<EngineStats, EngineError> {
        let inner = self.read()?;

        let sst_sizes: Vec<u64> = inner.sstables.values().map(|s| s.file_size()).collect();
        let total_sst_size_bytes: u64 = sst_sizes.iter().sum();

        Ok(EngineStats {
            frozen_count: inner.frozen.len(),
            sstables_count: inner.sstables.len(),
            total_sst_size_bytes,
            sst_sizes,
        })
    }

    /// Freeze the current active memtable and swap in a fresh one backed
    /// by a newly-allocated WAL segment. The old memtable is pushed to
    /// the front of `inner.frozen`.
    ///
    /// Does not touch the manifest's log number: the oldest live WAL
    /// segment is unchanged by a freeze (only a flush advances it).
    fn freeze_active(inner: &mut EngineInner) -> Result<(), EngineError> {
        let new_wal_number = inner.manifest.allocate_file_number()?;
        let new_path = inner.data_dir.join(wal_filename(new_wal_number));
        let new_active = Memtable::new(&new_path, inner.config.write_buffer_size)?;

        let old_active = std::mem::replace(&mut inner.active, new_active);
        let frozen = old_active.freeze();
        inner.frozen.insert(0, frozen);

        Ok(())
    }

    /// Flush the oldest frozen memtable to a new SSTable.
    ///
    /// Returns `Ok(true)` if a frozen memtable was flushed, `Ok(false)` if
    /// there were no frozen memtables to flush.
    pub fn flush_oldest_frozen(&self) -> Result<bool, EngineError> {
        let mut inner = self.write()?;

        if inner.frozen.is_empty() {
            return Ok(false);
        }
        Self::flush_frozen_to_sstable_inner(&mut inner)?;
        Ok(true)
    }

    /// Flush **all** frozen memtables to SSTables.
    ///
    /// Returns the number of frozen memtables that were flushed.
    pub fn flush_all_frozen(&self) -> Result<usize, EngineError> {
        let mut inner = self.write()?;

        let mut count = 0usize;
        while !inner.frozen.is_empty() {
            Self::flush_frozen_to_sstable_inner(&mut inner)?;
            count += 1;
        }
        Ok(count)
    }

    fn flush_frozen_to_sstable_inner(inner: &mut EngineInner) -> Result<(), EngineError> {
        let Some(frozen) = inner.frozen.pop() else {
            return Ok(());
        };
        let flushed_wal_number = frozen.memtable.wal.wal_seq();

        let (entries, tombstones) = frozen.iter_for_flush();
        let mut point_entries = Vec::with_capacity(entries.len());
        for (ik, value) in entries {
            point_entries.push(point_entry_from_internal_key(ik, value));
        }

        let result = crate::compaction::finalize_compaction(
            &inner.manifest,
            &inner.data_dir,
            0,
            Vec::new(),
            point_entries,
            tombstones,
        )?;

        for meta in &result.added {
            Self::load_sstable(inner, meta.number)?;
        }

        let new_log_number = inner
            .frozen
            .last()
            .map(|f| f.memtable.wal.wal_seq())
            .unwrap_or_else(|| inner.active.wal.wal_seq());
        inner.manifest.set_log_number(new_log_number)?;
        inner.manifest.record_sequence(inner.next_seq.saturating_sub(1))?;

        let _ = fs::remove_file(inner.data_dir.join(wal_filename(flushed_wal_number)));

        Ok(())
    }

    fn load_sstable(inner: &mut EngineInner, number: u64) -> Result<(), EngineError> {
        let sst_path = inner.data_dir.join(sst_filename(number));
        let mut sst = SSTable::open(&sst_path)?;
        sst.id = number;
        inner.sstables.insert(number, Arc::new(sst));
        Ok(())
    }

    fn allocate_seq(inner: &mut EngineInner) -> u64 {
        let seq = inner.next_seq;
        inner.next_seq += 1;
        seq
    }

    // --------------------------------------------------------------------------------------------
    // Compaction API
    // --------------------------------------------------------------------------------------------

    /// Runs the compaction strategy selected by [`EngineConfig::compaction_strategy`].
    ///
    /// Returns `Ok(true)` if compaction was performed, `Ok(false)` if
    /// the strategy decided there was nothing to do.
    pub fn compact(&self) -> Result<bool, EngineError> {
        let strategy: Box<dyn CompactionStrategy> = {
            let inner = self.read()?;
            inner.config.compaction_strategy.strategy()
        };
        self.run_compaction(|ctx| strategy.maybe_compact(ctx))
    }

    /// Runs one round of **minor compaction** (size-tiered), regardless of
    /// the configured strategy.
    ///
    /// Selects the best bucket whose size exceeds `min_threshold` and merges
    /// those SSTables into a single new SSTable, deduplicating point entries
    /// and preserving all tombstones.
    pub fn minor_compact(&self) -> Result<bool, EngineError> {
        self.run_compaction(crate::compaction::universal::minor::maybe_compact)
    }

    /// Runs one round of **tombstone compaction** (per-SSTable GC),
    /// regardless of the configured strategy.
    ///
    /// Selects the SSTable with the highest tombstone ratio that exceeds
    /// `tombstone_ratio_threshold` and rewrites it, dropping provably-unnecessary
    /// tombstones.
    pub fn tombstone_compact(&self) -> Result<bool, EngineError> {
        self.run_compaction(crate::compaction::universal::tombstone::maybe_compact)
    }

    /// Runs **major compaction** — merges all SSTables into one — regardless
    /// of the configured strategy.
    ///
    /// Actively applies range tombstones to suppress covered Puts, and
    /// drops all spent tombstones from the output.
    pub fn major_compact(&self) -> Result<bool, EngineError> {
        self.run_compaction(crate::compaction::universal::major::compact)
    }

    fn run_compaction<F>(&self, f: F) -> Result<bool, EngineError>
    where
        F: FnOnce(&CompactionContext) -> Result<Option<CompactionResult>, CompactionError>,
    {
        let mut guard = self.write()?;
        let inner = &mut *guard; // reborrow to split fields

        let version = inner.manifest.current_version()?;
        let sst_count = inner.sstables.len();

        let result = {
            let ctx = CompactionContext {
                version: &version,
                sstables: &inner.sstables,
                manifest: &inner.manifest,
                data_dir: &inner.data_dir,
                config: &inner.config,
            };
            f(&ctx)?
        };

        match result {
            None => {
                debug!(sst_count, "compaction found nothing to do");
                Ok(false)
            }
            Some(cr) => {
                info!(
                    sst_count_before = sst_count,
                    added = cr.added.len(),
                    removed = cr.removed.len(),
                    "compaction applied"
                );
                Self::apply_compaction_result(inner, cr)?;
                Ok(true)
            }
        }
    }

    /// Applies a `CompactionResult` to the in-memory engine state: removes
    /// consumed SSTables (and their files — safe even with readers holding
    /// an `Arc` to the old handle, since the underlying inode stays valid
    /// until the last open reference drops) and loads the newly built one.
    fn apply_compaction_result(inner: &mut EngineInner, cr: CompactionResult) -> Result<(), EngineError> {
        for removed in &cr.removed {
            inner.sstables.remove(&removed.number);
            let _ = fs::remove_file(inner.data_dir.join(sst_filename(removed.number)));
        }
        for meta in &cr.added {
            Self::load_sstable(inner, meta.number)?;
        }
        Ok(())
    }

    fn read(&self) -> Result<RwLockReadGuard<'_, EngineInner>, EngineError> {
        self.inner.read().map_err(|_| EngineError::Internal("RwLock poisoned".into()))
    }

    fn write(&self) -> Result<RwLockWriteGuard<'_, EngineInner>, EngineError> {
        self.inner.write().map_err(|_| EngineError::Internal("RwLock poisoned".into()))
    }
}

/// Scans `dir` for files named `<nnnnnn>.<ext>`, returning their numbers
/// in ascending order. Files that don't parse as a bare number are
/// ignored (`CURRENT`, `MANIFEST-<nnnnnn>`, `LOCK`, etc. never match
/// since they carry a different extension or no numeric stem).
fn discover_numbered_files(dir: &Path, ext: &str) -> Result<Vec<u64>, std::io::Error> {
    let mut numbers = Vec::new();
    for entry in fs::read_dir(dir)? {
        let entry = entry?;
        let path = entry.path();
        if path.extension().and_then(|s| s.to_str()) == Some(ext)
            && let Some(stem) = path.file_stem().and_then(|s| s.to_str())
            && let Ok(n) = stem.parse::<u64>()
        {
            numbers.push(n);
        }
    }
    numbers.sort_unstable();
    Ok(numbers)
}

fn point_entry_from_internal_key(ik: InternalKey, value: Vec<u8>) -> PointEntry {
    let seq = ik.seq();
    let key = ik.user_key().to_vec();
    if ik.value_type().is_deletion() {
        PointEntry { key, value: None, seq, timestamp: 0 }
    } else {
        PointEntry { key, value: Some(value), seq, timestamp: 0 }
    }
}

/// Converts a memtable's raw `iter_for_flush` output into `Record`s
/// restricted to `[start, end)` and visible as of `snapshot_seq`,
/// re-sorted by `(key ASC, seq DESC)` so it can feed a [`utils::MergeIterator`]
/// alongside SSTable scan streams.
///
/// Unlike [`crate::memtable::Memtable::scan`], this preserves tombstones
/// in the output — required so a delete in one layer can suppress a put
/// in another during the cross-layer merge.
fn memtable_records_in_range(
    entries: Vec<(InternalKey, Vec<u8>)>,
    tombstones: Vec<RangeTombstone>,
    start: &[u8],
    end: &[u8],
    snapshot_seq: u64,
) -> Vec<Record> {
    let mut out = Vec::with_capacity(entries.len() + tombstones.len());

    for (ik, value) in entries {
        let seq = ik.seq();
        if seq > snapshot_seq {
            continue;
        }
        let user_key = ik.user_key();
        if user_key < start || user_key >= end {
            continue;
        }
        let key = user_key.to_vec();
        if ik.value_type().is_deletion() {
            out.push(Record::Delete { key, seq, timestamp: 0 });
        } else {
            out.push(Record::Put { key, value, seq, timestamp: 0 });
        }
    }

    for rt in tombstones {
        if rt.seq <= snapshot_seq && rt.start.as_slice() < end && rt.end.as_slice() > start {
            out.push(Record::RangeDelete { start: rt.start, end: rt.end, seq: rt.seq, timestamp: rt.timestamp });
        }
    }

    out.sort();
    out
}

/// Type alias preserving the public scan iterator name.
pub type EngineScanIterator = utils::MergeIterator<'static>;

/// Filters a sorted record stream to yield only **visible** key-value pairs.
///
/// Applies point tombstone and range tombstone semantics:
/// - A `Delete` record suppresses the same key in later (lower-seq) records.
/// - A `RangeDelete` suppresses any `Put` whose key falls within `[start, end)`
///   and whose seq is lower than the tombstone's.
///
/// The input iterator **must** be sorted by `(key ASC, seq DESC)` — the order
/// produced by [`utils::MergeIterator`]. Any snapshot filtering must already
/// have been applied upstream: this filter only resolves visibility among
/// the records it is handed, it does not know about sequence-number bounds.
pub struct VisibilityFilter<I>
where
    I: Iterator<Item = Record>,
{
    /// Underlying merged record stream.
    input: I,
    /// The key most recently emitted or suppressed (used for dedup).
    current_key: Option<Vec<u8>>,
    /// Accumulated range tombstones that may cover upcoming keys.
    active_ranges: Vec<RangeTombstone>,
}

impl<I> VisibilityFilter<I>
where
    I: Iterator<Item = Record>,
{
    pub fn new(input: I) -> Self {
        Self {
            input,
            current_key: None,
            active_ranges: Vec::new(),
        }
    }
}

impl<I> Iterator for VisibilityFilter<I>
where
    I: Iterator<Item = Record>,
{
    type Item = (Vec<u8>, Vec<u8>); // (key, value)

    fn next(&mut self) -> Option<Self::Item> {
        for record in self.input.by_ref() {
            match record {
                Record::RangeDelete { start, end, seq, timestamp } => {
                    self.active_ranges.push(RangeTombstone { start, end, seq, timestamp });
                    // Range tombstone itself is not returned
                }

                Record::Delete { key, .. } => {
                    self.current_key = Some(key.clone());
                }

                Record::Put { key, value, seq, .. } => {
                    // Skip if we've already handled this key
                    if self.current_key.as_deref() == Some(&key) {
                        continue;
                    }

                    let deleted = self
                        .active_ranges
                        .iter()
                        .any(|r| r.start.as_slice() <= key.as_slice() && key.as_slice() < r.end.as_slice() && r.seq > seq);

                    self.current_key = Some(key.clone());

                    if deleted {
                        continue; // This record is shadowed by a range tombstone
                    }

                    return Some((key, value));
                }
            }
        }

        None
    }
}
