//! FIFO compaction.
//!
//! No merging: once the live dataset exceeds
//! `config.fifo_max_total_size_bytes`, the oldest files (lowest file
//! number, which is creation-ordered) are dropped entirely until the
//! engine is back under budget. Cheapest possible policy — useful for
//! pure time-series/cache workloads where old data is simply expired
//! rather than merged forward.

use tracing::info;

use crate::compaction::{CompactionContext, CompactionError, CompactionResult, finalize_compaction};
use crate::manifest::DeletedFile;

pub struct FifoCompaction;

impl crate::compaction::CompactionStrategy for FifoCompaction {
    fn maybe_compact(
        &self,
        ctx: &CompactionContext,
    ) -> Result<Option<CompactionResult>, CompactionError> {
        let mut files: Vec<_> = ctx.version.all_files().collect();
        let total: u64 = files.iter().map(|f| f.size).sum();

        if total <= ctx.config.fifo_max_total_size_bytes {
            return Ok(None);
        }

        files.sort_by_key(|f| f.number);

        let mut removed = Vec::new();
        let mut remaining = total;
        for f in files {
            if remaining <= ctx.config.fifo_max_total_size_bytes {
                break;
            }
            removed.push(DeletedFile { level: f.level, number: f.number });
            remaining = remaining.saturating_sub(f.size);
        }

        if removed.is_empty() {
            return Ok(None);
        }

        info!(evicted = removed.len(), "fifo compaction: evicting oldest files");

        let result = finalize_compaction(
            ctx.manifest,
            ctx.data_dir,
            0,
            removed,
            Vec::new(),
            Vec::new(),
        )?;

        Ok(Some(result))
    }
}
