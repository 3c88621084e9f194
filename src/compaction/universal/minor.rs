//! Minor compaction — size-tiered, bucket-based.
//!
//! Merges a group of similarly-sized SSTables into one, keeping the
//! highest-seq version of each key. All tombstones are preserved.

use std::sync::Arc;

use tracing::{debug, info};

use crate::compaction::universal::{bucket_sstables, select_compaction_bucket, sorted_sstables};
use crate::compaction::{
    CompactionContext, CompactionError, CompactionResult, dedup_and_suppress, finalize_compaction,
    full_range_scan_iters,
};
use crate::engine::utils::MergeIterator;
use crate::sstable::SSTable;

/// Checks whether minor compaction is needed and executes it if so.
pub fn maybe_compact(ctx: &CompactionContext) -> Result<Option<CompactionResult>, CompactionError> {
    let sstables = sorted_sstables(ctx);
    let buckets = bucket_sstables(&sstables, ctx.config);
    let selected = match select_compaction_bucket(&buckets, ctx.config) {
        Some(s) => s,
        None => {
            debug!(sstable_count = sstables.len(), "minor compaction: no bucket met threshold");
            return Ok(None);
        }
    };

    let selected_ids: Vec<u64> = selected.iter().map(|&i| sstables[i].id).collect();
    info!(selected_count = selected.len(), ?selected_ids, "minor compaction: starting merge");

    let result = execute(&sstables, &selected, ctx)?;

    info!(added = result.added.len(), removed = result.removed.len(), "minor compaction: complete");

    Ok(Some(result))
}

fn execute(
    sstables: &[Arc<SSTable>],
    selected_indices: &[usize],
    ctx: &CompactionContext,
) -> Result<CompactionResult, CompactionError> {
    let selected_ssts: Vec<&SSTable> = selected_indices.iter().map(|&i| sstables[i].as_ref()).collect();
    let level = selected_ssts.iter().map(|s| s.properties.level).max().unwrap_or(0);

    let removed = selected_ssts
        .iter()
        .map(|s| crate::manifest::DeletedFile { level: s.properties.level, number: s.id })
        .collect();

    let iters = full_range_scan_iters(&selected_ssts)?;
    let merge_iter = MergeIterator::new(iters);

    let (point_entries, range_tombstones) = dedup_and_suppress(merge_iter, false);

    finalize_compaction(ctx.manifest, ctx.data_dir, level, removed, point_entries, range_tombstones)
}
