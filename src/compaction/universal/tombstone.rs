//! Tombstone compaction — per-SSTable garbage collection.
//!
//! Rewrites a single SSTable to remove tombstones that are provably
//! unnecessary:
//!
//! **Point tombstones:** a point delete can be dropped when no other
//! SSTable *could* contain a live version of the key.
//! - Bloom filter check across all *other* SSTables.
//!   - If no bloom says "maybe" → safe to drop.
//!   - If bloom says "maybe" and `tombstone_bloom_fallback` is enabled → do
//!     an actual `get()` to resolve the false positive.
//!
//! **Range tombstones:** a range tombstone `[start, end)` can be dropped
//! when `tombstone_range_drop` is enabled and scanning all older SSTables
//! confirms no live keys exist within the range.

use tracing::{debug, info, trace};

use crate::compaction::universal::sorted_sstables;
use crate::compaction::{CompactionContext, CompactionError, CompactionResult, finalize_compaction};
use crate::engine::utils::{PointEntry, Record};
use crate::engine::EngineConfig;
use crate::key::RangeTombstone;
use crate::sstable::{GetResult, SSTable, SSTableError};

/// Selects an SSTable eligible for tombstone compaction and executes it.
pub fn maybe_compact(ctx: &CompactionContext) -> Result<Option<CompactionResult>, CompactionError> {
    let sstables = sorted_sstables(ctx);
    let target_idx = match select_candidate(&sstables, ctx.config) {
        Some(idx) => idx,
        None => {
            debug!(sstable_count = sstables.len(), "tombstone compaction: no candidate met threshold");
            return Ok(None);
        }
    };

    let target = &sstables[target_idx];
    let tombstone_total = target.properties.tombstone_count + target.properties.range_tombstones_count;
    info!(
        target_id = target.id,
        tombstone_count = tombstone_total,
        record_count = target.properties.record_count,
        "tombstone compaction: starting rewrite"
    );

    let result = execute(&sstables, target_idx, ctx)?;

    if result.removed.is_empty() {
        debug!(target_id = target.id, "tombstone compaction: candidate selected but no tombstones could be dropped");
        return Ok(None);
    }

    info!(added = result.added.len(), removed = result.removed.len(), "tombstone compaction: complete");

    Ok(Some(result))
}

fn select_candidate(sstables: &[std::sync::Arc<SSTable>], config: &EngineConfig) -> Option<usize> {
    let now_secs = std::time::SystemTime::now()
        .duration_since(std::time::UNIX_EPOCH)
        .unwrap_or_default()
        .as_secs();

    let mut best: Option<(usize, f64)> = None;

    for (i, sst) in sstables.iter().enumerate() {
        let props = &sst.properties;

        let creation_secs = props.creation_timestamp / 1000; // millis -> secs
        let age_secs = now_secs.saturating_sub(creation_secs);
        if age_secs < config.tombstone_compaction_interval as u64 {
            continue;
        }

        let tombstone_total = props.tombstone_count + props.range_tombstones_count;
        if tombstone_total == 0 {
            continue;
        }

        let ratio = tombstone_total as f64 / props.record_count.max(1) as f64;
        if ratio < config.tombstone_ratio_threshold {
            continue;
        }

        match &best {
            Some((_, best_ratio)) if ratio <= *best_ratio => {}
            _ => best = Some((i, ratio)),
        }
    }

    best.map(|(idx, _)| idx)
}

fn execute(
    sstables: &[std::sync::Arc<SSTable>],
    target_idx: usize,
    ctx: &CompactionContext,
) -> Result<CompactionResult, CompactionError> {
    let target = &sstables[target_idx];
    // Only consider SSTables older (lower file number) than the target — a
    // tombstone only needs to suppress data in older files; a newer file
    // with the same key already shadows it.
    let older_sstables: Vec<&SSTable> = sstables
        .iter()
        .enumerate()
        .filter(|(i, s)| *i != target_idx && s.id < target.id)
        .map(|(_, s)| s.as_ref())
        .collect();

    let min_key = target.properties.min_key.clone();
    let mut max_key = target.properties.max_key.clone();
    max_key.push(0xFF);

    let scan_iter = target.scan(&min_key, &max_key)?;

    let mut point_entries: Vec<PointEntry> = Vec::new();
    let mut range_tombstones: Vec<RangeTombstone> = Vec::new();
    // Range tombstone candidates are resolved in a second pass, once every
    // point entry has been gathered, so same-file coverage can be checked.
    let mut range_candidates: Vec<RangeTombstone> = Vec::new();
    let mut last_key: Option<Vec<u8>> = None;
    let mut dropped_anything = false;

    for record in scan_iter {
        match record {
            Record::Put { key, value, seq, timestamp } => {
                if last_key.as_ref() == Some(&key) {
                    dropped_anything = true;
                    continue;
                }
                last_key = Some(key.clone());
                point_entries.push(PointEntry { key, value: Some(value), seq, timestamp });
            }
            Record::Delete { key, seq, timestamp } => {
                if last_key.as_ref() == Some(&key) {
                    dropped_anything = true;
                    continue;
                }
                last_key = Some(key.clone());

                if can_drop_point_tombstone(&key, &older_sstables, ctx.config)? {
                    trace!(key = ?key, seq, "dropping point tombstone — no older data found");
                    dropped_anything = true;
                    continue;
                }

                point_entries.push(PointEntry { key, value: None, seq, timestamp });
            }
            Record::RangeDelete { start, end, seq, timestamp } => {
                if ctx.config.tombstone_range_drop {
                    range_candidates.push(RangeTombstone { start, end, seq, timestamp });
                } else {
                    range_tombstones.push(RangeTombstone { start, end, seq, timestamp });
                }
            }
        }
    }

    for rt in range_candidates {
        let safe_in_older = can_drop_range_tombstone(&rt.start, &rt.end, rt.seq, &older_sstables)?;

        let covers_own_puts = safe_in_older
            && point_entries.iter().any(|pe| {
                pe.value.is_some()
                    && pe.key.as_slice() >= rt.start.as_slice()
                    && pe.key.as_slice() < rt.end.as_slice()
                    && pe.seq < rt.seq
            });

        if safe_in_older && !covers_own_puts {
            trace!(start = ?rt.start, end = ?rt.end, seq = rt.seq, "dropping range tombstone");
            dropped_anything = true;
        } else {
            range_tombstones.push(rt);
        }
    }

    if !dropped_anything {
        return Ok(CompactionResult::default());
    }

    let removed = vec![crate::manifest::DeletedFile { level: target.properties.level, number: target.id }];
    finalize_compaction(ctx.manifest, ctx.data_dir, target.properties.level, removed, point_entries, range_tombstones)
}

/// Whether a point tombstone for `key` can be safely dropped: true when no
/// other SSTable could still hold a live version of `key`.
fn can_drop_point_tombstone(
    key: &[u8],
    others: &[&SSTable],
    config: &EngineConfig,
) -> Result<bool, SSTableError> {
    for sst in others {
        if !sst.bloom_may_contain(key) {
            continue;
        }

        if config.tombstone_bloom_fallback {
            match sst.get(key)? {
                GetResult::NotFound => continue,
                _ => return Ok(false),
            }
        } else {
            return Ok(false);
        }
    }

    Ok(true)
}

/// Whether a range tombstone `[start, end)` can be safely dropped: true
/// when no other SSTable holds a live key in the range with a lower seq
/// than the tombstone's.
fn can_drop_range_tombstone(
    start: &[u8],
    end: &[u8],
    tombstone_seq: u64,
    others: &[&SSTable],
) -> Result<bool, SSTableError> {
    for sst in others {
        if sst.properties.max_key.as_slice() < start || sst.properties.min_key.as_slice() >= end {
            continue;
        }

        let scan_iter = sst.scan(start, end)?;
        for record in scan_iter {
            match &record {
                Record::Put { seq, .. } | Record::Delete { seq, .. } => {
                    if *seq < tombstone_seq {
                        return Ok(false);
                    }
                }
                Record::RangeDelete { .. } => {}
            }
        }
    }

    Ok(true)
}
