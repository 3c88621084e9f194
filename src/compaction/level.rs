//! Leveled compaction.
//!
//! L0 holds freshly flushed, possibly-overlapping files. Once it accumulates
//! `config.level0_compaction_trigger` files, they're merged down into L1
//! together with any L1 files they overlap. Every level `L >= 1` is a
//! sorted, non-overlapping run; once its total size exceeds
//! `base_level_max_bytes * level_size_multiplier^(L-1)`, one of its files
//! (plus whatever it overlaps in `L+1`) is merged down a level.
//!
//! Output is written as a single new file per compaction step — splitting
//! by `max_output_file_size` rather than by grandparent-overlap boundaries
//! as a deliberate simplification; see the design notes for why.

use tracing::{debug, info};

use crate::compaction::{
    CompactionContext, CompactionError, CompactionResult, dedup_and_suppress, file_overlaps_range,
    finalize_compaction, full_range_scan_iters,
};
use crate::engine::utils::MergeIterator;
use crate::manifest::{DeletedFile, FileMetadata, Version};
use crate::sstable::SSTable;

pub struct LevelCompaction;

impl crate::compaction::CompactionStrategy for LevelCompaction {
    fn maybe_compact(
        &self,
        ctx: &CompactionContext,
    ) -> Result<Option<CompactionResult>, CompactionError> {
        let l0 = ctx.version.level(0);
        if l0.len() >= ctx.config.level0_compaction_trigger {
            debug!(l0_files = l0.len(), "level compaction: L0 trigger fired");
            return compact_level(ctx, 0);
        }

        for level in 1..ctx.version.num_levels() as u32 {
            let files = ctx.version.level(level);
            if files.is_empty() {
                continue;
            }
            let total: u64 = files.iter().map(|f| f.size).sum();
            let budget = ctx
                .config
                .base_level_max_bytes
                .saturating_mul(ctx.config.level_size_multiplier.saturating_pow(level - 1));
            if total > budget {
                debug!(level, total, budget, "level compaction: size trigger fired");
                return compact_level(ctx, level);
            }
        }

        Ok(None)
    }
}

fn compact_level(
    ctx: &CompactionContext,
    level: u32,
) -> Result<Option<CompactionResult>, CompactionError> {
    let output_level = level + 1;
    let input_files: Vec<&FileMetadata> = if level == 0 {
        ctx.version.level(0).iter().collect()
    } else {
        ctx.version.level(level).iter().take(1).collect()
    };

    if input_files.is_empty() {
        return Ok(None);
    }

    let (range_start, range_end) = input_files.iter().fold(
        (input_files[0].smallest.clone(), input_files[0].largest.clone()),
        |(lo, hi), f| {
            let lo = if f.smallest < lo { f.smallest.clone() } else { lo };
            let hi = if f.largest > hi { f.largest.clone() } else { hi };
            (lo, hi)
        },
    );

    let overlapping: Vec<&FileMetadata> = ctx
        .version
        .level(output_level)
        .iter()
        .filter(|f| file_overlaps_range(f, &strip_trailer(&range_start), &bump(&strip_trailer(&range_end))))
        .collect();

    let mut all_inputs: Vec<&FileMetadata> = input_files;
    all_inputs.extend(overlapping.iter().copied());

    let mut removed: Vec<DeletedFile> = Vec::new();
    let mut sstables: Vec<&SSTable> = Vec::with_capacity(all_inputs.len());
    for f in &all_inputs {
        if let Some(sst) = ctx.sstables.get(&f.number) {
            sstables.push(sst.as_ref());
        }
        removed.push(DeletedFile { level: f.level, number: f.number });
    }

    let ids: Vec<u64> = sstables.iter().map(|s| s.id).collect();
    info!(level, output_level, ?ids, "level compaction: merging");

    let iters = full_range_scan_iters(&sstables)?;
    let merge_iter = MergeIterator::new(iters);

    let bottommost = is_bottommost_output(ctx.version, output_level);
    let (point_entries, range_tombstones) = dedup_and_suppress(merge_iter, bottommost);

    let result = finalize_compaction(
        ctx.manifest,
        ctx.data_dir,
        output_level,
        removed,
        point_entries,
        range_tombstones,
    )?;

    Ok(Some(result))
}

fn is_bottommost_output(version: &Version, output_level: u32) -> bool {
    (output_level as usize + 1) >= version.num_levels()
}

fn strip_trailer(internal_key: &[u8]) -> Vec<u8> {
    internal_key[..internal_key.len().saturating_sub(8)].to_vec()
}

fn bump(user_key: &[u8]) -> Vec<u8> {
    let mut bumped = user_key.to_vec();
    bumped.push(0xFF);
    bumped
}
