//! Major compaction — full merge of all live SSTables.
//!
//! Merges every SSTable into one, applying range tombstones to suppress
//! covered point entries. Since the entire dataset is being merged, all
//! spent tombstones (point and range) are dropped from the output — there
//! is nothing left below for them to suppress.
//!
//! Always user-triggered via `Engine::major_compact()`; refuses to run
//! with fewer than 2 SSTables.

use tracing::{debug, info};

use crate::compaction::universal::sorted_sstables;
use crate::compaction::{
    CompactionContext, CompactionError, CompactionResult, dedup_and_suppress, finalize_compaction,
    full_range_scan_iters,
};
use crate::engine::utils::MergeIterator;

pub fn compact(ctx: &CompactionContext) -> Result<Option<CompactionResult>, CompactionError> {
    let sstables = sorted_sstables(ctx);
    if sstables.len() < 2 {
        debug!(sstable_count = sstables.len(), "major compaction: fewer than 2 SSTables, skipping");
        return Ok(None);
    }

    let ids: Vec<u64> = sstables.iter().map(|s| s.id).collect();
    info!(sstable_count = sstables.len(), ?ids, "major compaction: starting full merge");

    let removed = sstables
        .iter()
        .map(|s| crate::manifest::DeletedFile { level: s.properties.level, number: s.id })
        .collect();

    let sst_refs: Vec<&crate::sstable::SSTable> = sstables.iter().map(|s| s.as_ref()).collect();
    let iters = full_range_scan_iters(&sst_refs)?;
    let merge_iter = MergeIterator::new(iters);

    let (point_entries, _) = dedup_and_suppress(merge_iter, true);

    let result = finalize_compaction(ctx.manifest, ctx.data_dir, 0, removed, point_entries, Vec::new())?;

    info!(added = result.added.len(), removed = result.removed.len(), "major compaction: complete");

    Ok(Some(result))
}
