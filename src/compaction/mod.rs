//! Pluggable compaction strategies.
//!
//! A [`CompactionStrategy`] decides, given the current [`Version`], which
//! files to merge (or drop) next and commits the result as a single atomic
//! [`VersionEdit`]. Three policies are provided, selected via
//! [`CompactionStrategyType`]:
//!
//! - [`CompactionStrategyType::Universal`] — size-tiered bucketing over a
//!   flat pool of files (bucket → merge → dedup), plus a tombstone-GC pass
//!   and an all-in-one major merge.
//! - [`CompactionStrategyType::Level`] — classic leveled compaction: L0
//!   files overlap and merge down into L1 once a file-count trigger fires;
//!   every level above is a sorted, non-overlapping run merged into the
//!   next once its total size exceeds a per-level budget.
//! - [`CompactionStrategyType::Fifo`] — no merging at all: oldest files are
//!   dropped once the total dataset exceeds a byte budget.
//!
//! All three share the same execution shape: scan the chosen input files
//! with a [`MergeIterator`](crate::engine::utils::MergeIterator), dedup by
//! `(key, seq)`, decide whether tombstones are safe to drop, and commit via
//! [`finalize_compaction`].

use std::collections::HashMap;
use std::path::{Path, PathBuf};
use std::sync::Arc;

use thiserror::Error;

use crate::engine::utils::{PointEntry, Record};
use crate::engine::EngineConfig;
use crate::key::RangeTombstone;
use crate::manifest::{DeletedFile, FileMetadata, Manifest, ManifestError, Version, VersionEdit};
use crate::sstable::{SSTable, SSTableError, SstWriter};

pub mod fifo;
pub mod level;
pub mod universal;

// ------------------------------------------------------------------------------------------------
// Errors
// ------------------------------------------------------------------------------------------------

#[derive(Debug, Error)]
pub enum CompactionError {
    #[error("SSTable error: {0}")]
    SSTable(#[from] SSTableError),

    #[error("Manifest error: {0}")]
    Manifest(#[from] ManifestError),

    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),
}

// ------------------------------------------------------------------------------------------------
// Strategy trait
// ------------------------------------------------------------------------------------------------

/// Everything a strategy needs to decide on and execute one compaction step.
pub struct CompactionContext<'a> {
    pub version: &'a Version,
    pub sstables: &'a HashMap<u64, Arc<SSTable>>,
    pub manifest: &'a Manifest,
    pub data_dir: &'a Path,
    pub config: &'a EngineConfig,
}

/// Result of a single compaction step: files added and removed from the
/// current version. Already committed to the manifest by the time this
/// is returned.
#[derive(Debug, Clone, Default)]
pub struct CompactionResult {
    pub added: Vec<FileMetadata>,
    pub removed: Vec<DeletedFile>,
}

pub trait CompactionStrategy: Send + Sync {
    /// Looks for one unit of compaction work and, if found, executes and
    /// commits it. Returns `Ok(None)` when there's nothing to do.
    fn maybe_compact(
        &self,
        ctx: &CompactionContext,
    ) -> Result<Option<CompactionResult>, CompactionError>;
}

/// Which compaction policy an [`EngineConfig`] selects.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum CompactionStrategyType {
    /// Size-tiered bucketing over a flat pool of files (the teacher's STCS,
    /// generalized to read the current `Version` instead of a flat list).
    #[default]
    Universal,
    /// Classic leveled compaction with per-level size targets.
    Level,
    /// No merging — drop the oldest files once a total byte budget is
    /// exceeded.
    Fifo,
}

impl CompactionStrategyType {
    pub fn strategy(self) -> Box<dyn CompactionStrategy> {
        match self {
            CompactionStrategyType::Universal => Box::new(universal::UniversalCompaction),
            CompactionStrategyType::Level => Box::new(level::LevelCompaction),
            CompactionStrategyType::Fifo => Box::new(fifo::FifoCompaction),
        }
    }
}

// ------------------------------------------------------------------------------------------------
// Shared helpers
// ------------------------------------------------------------------------------------------------

/// Builds one boxed `Record` iterator per input SSTable, each covering its
/// own full key range.
pub fn full_range_scan_iters<'a>(
    sstables: &[&'a SSTable],
) -> Result<Vec<Box<dyn Iterator<Item = Record> + 'a>>, SSTableError> {
    let mut iters: Vec<Box<dyn Iterator<Item = Record> + 'a>> = Vec::with_capacity(sstables.len());
    for sst in sstables {
        let min_key = sst.properties.min_key.clone();
        let mut max_key = sst.properties.max_key.clone();
        max_key.push(0xFF);
        iters.push(Box::new(sst.scan(&min_key, &max_key)?));
    }
    Ok(iters)
}

/// Deduplicates a `(key ASC, seq DESC)`-ordered `Record` stream into the
/// newest version per key, applying range-tombstone suppression to point
/// puts along the way.
///
/// When `drop_tombstones` is set, point and range deletes are omitted from
/// the output entirely (there is nothing below this merge for them to
/// still suppress). Otherwise they are kept so higher levels continue to
/// see them.
pub fn dedup_and_suppress(
    records: impl Iterator<Item = Record>,
    drop_tombstones: bool,
) -> (Vec<PointEntry>, Vec<RangeTombstone>) {
    // Range tombstones gathered from the whole input up front, so point
    // entries can be checked against all of them regardless of stream
    // position.
    let buffered: Vec<Record> = records.collect();
    let mut range_tombstones: Vec<RangeTombstone> = Vec::new();
    for r in &buffered {
        if let Record::RangeDelete { start, end, seq, timestamp } = r {
            range_tombstones.push(RangeTombstone {
                start: start.clone(),
                end: end.clone(),
                seq: *seq,
                timestamp: *timestamp,
            });
        }
    }

    let mut point_entries: Vec<PointEntry> = Vec::new();
    let mut last_key: Option<Vec<u8>> = None;

    for record in buffered {
        match record {
            Record::RangeDelete { .. } => {}
            Record::Delete { key, seq, timestamp } => {
                if last_key.as_ref() == Some(&key) {
                    continue;
                }
                last_key = Some(key.clone());
                if !drop_tombstones {
                    point_entries.push(PointEntry { key, value: None, seq, timestamp });
                }
            }
            Record::Put { key, value, seq, timestamp } => {
                if last_key.as_ref() == Some(&key) {
                    continue;
                }
                last_key = Some(key.clone());

                if suppressed_by_range(&key, seq, &range_tombstones) {
                    continue;
                }

                point_entries.push(PointEntry { key, value: Some(value), seq, timestamp });
            }
        }
    }

    let range_tombstones = if drop_tombstones { Vec::new() } else { range_tombstones };
    (point_entries, range_tombstones)
}

fn suppressed_by_range(key: &[u8], seq: u64, range_tombstones: &[RangeTombstone]) -> bool {
    range_tombstones
        .iter()
        .any(|rt| key >= rt.start.as_slice() && key < rt.end.as_slice() && rt.seq > seq)
}

/// Writes `point_entries`/`range_tombstones` to a new SSTable at `level`
/// (skipped when both are empty — e.g. pure tombstone/FIFO eviction) and
/// commits the file swap to the manifest as one [`VersionEdit`].
pub fn finalize_compaction(
    manifest: &Manifest,
    data_dir: &Path,
    level: u32,
    removed: Vec<DeletedFile>,
    point_entries: Vec<PointEntry>,
    range_tombstones: Vec<RangeTombstone>,
) -> Result<CompactionResult, CompactionError> {
    if point_entries.is_empty() && range_tombstones.is_empty() {
        if removed.is_empty() {
            return Ok(CompactionResult::default());
        }
        manifest.log_and_apply(VersionEdit { deleted_files: removed.clone(), ..Default::default() })?;
        return Ok(CompactionResult { added: Vec::new(), removed });
    }

    let number = manifest.allocate_file_number()?;
    let path: PathBuf = data_dir.join(format!("{number:06}.sst"));

    let min_seq = point_entries
        .iter()
        .map(|e| e.seq)
        .chain(range_tombstones.iter().map(|r| r.seq))
        .min()
        .unwrap_or(0);
    let max_seq = point_entries
        .iter()
        .map(|e| e.seq)
        .chain(range_tombstones.iter().map(|r| r.seq))
        .max()
        .unwrap_or(0);

    let point_count = point_entries.len();
    let range_count = range_tombstones.len();
    SstWriter::new(&path).build(
        point_entries.into_iter(),
        point_count,
        range_tombstones.into_iter(),
        range_count,
        level,
    )?;

    let opened = SSTable::open(&path)?;
    let size = std::fs::metadata(&path)?.len();

    let meta = FileMetadata {
        number,
        size,
        smallest: opened.properties.smallest_internal_key.clone(),
        largest: opened.properties.largest_internal_key.clone(),
        level,
        min_seq,
        max_seq,
    };

    manifest.log_and_apply(VersionEdit {
        added_files: vec![meta.clone()],
        deleted_files: removed.clone(),
        ..Default::default()
    })?;

    Ok(CompactionResult { added: vec![meta], removed })
}

/// Whether `user_key` could fall within a file's key range, ignoring the
/// internal-key trailer.
pub fn file_might_contain(file: &FileMetadata, user_key: &[u8]) -> bool {
    let smallest_uk = &file.smallest[..file.smallest.len().saturating_sub(8)];
    let largest_uk = &file.largest[..file.largest.len().saturating_sub(8)];
    smallest_uk <= user_key && user_key <= largest_uk
}

/// Whether a file's key range overlaps `[start, end)`, ignoring the
/// internal-key trailer.
pub fn file_overlaps_range(file: &FileMetadata, start: &[u8], end: &[u8]) -> bool {
    let smallest_uk = &file.smallest[..file.smallest.len().saturating_sub(8)];
    let largest_uk = &file.largest[..file.largest.len().saturating_sub(8)];
    smallest_uk < end && largest_uk >= start
}
