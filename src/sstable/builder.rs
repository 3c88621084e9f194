//! SSTable writer — builds a complete SSTable file from sorted iterators.
//!
//! The [`SstWriter`] struct accepts two sorted streams:
//!
//! - **Point entries** ([`PointEntry`](crate::engine::PointEntry)): key/value pairs or point tombstones.
//! - **Range tombstones** ([`RangeTombstone`](crate::engine::RangeTombstone)):
//!   delete intervals covering key ranges.
//!
//! and writes a fully-structured SSTable containing header, data blocks, bloom
//! filter, range tombstone block, properties block, metaindex block, index
//! block, and footer.
//!
//! # Input Requirements
//!
//! - `point_entries` **must be sorted in ascending [`crate::key::InternalKey`] order**
//!   (ascending user key, descending sequence number) — the same order the
//!   active memtable and the merge iterator already produce. Duplicate user
//!   keys are allowed — SSTables store multiple versions of the same key.
//! - `range_tombstones` **must be sorted by start key**. Overlapping range
//!   tombstones are allowed; per-key resolution prefers the tombstone with the
//!   highest sequence number (tie-breaker: timestamp).
//!
//! # Output Guarantees
//!
//! - All point entries are grouped into prefix-compressed data blocks with
//!   periodic restart points, each with its own masked CRC32C checksum.
//! - Bloom filter is built from keys (including point tombstones).
//! - Properties capture min/max keys, sequence numbers, timestamps and counts.
//! - The final file is written atomically using a `.tmp` → final rename.
//!
//! # Atomicity
//!
//! 1. Write everything to `path.tmp`.
//! 2. Flush and sync the file.
//! 3. Rename `path.tmp` → `path` atomically.
//!
//! A crash cannot produce a partially-written SSTable.

use std::{
    fs::{File, OpenOptions, rename},
    io::{BufWriter, Seek, Write},
    path::Path,
    time::{SystemTime, UNIX_EPOCH},
};

use bloomfilter::Bloom;

use crate::checksum;
use crate::encoding::{self, put_varint64};
use crate::engine::{PointEntry, RangeTombstone};

use super::{
    BLOCK_RESTART_INTERVAL, BlockHandle, MetaIndexEntry, SST_BLOOM_FILTER_FALSE_POSITIVE_RATE,
    SST_DATA_BLOCK_MAX_SIZE, SST_HDR_MAGIC, SST_HDR_VERSION, SSTableBloomBlock, SSTableError,
    SSTableFooter, SSTableHeader, SSTableIndexEntry, SSTablePropertiesBlock, header_body_bytes,
};

// ------------------------------------------------------------------------------------------------
// BuildStats — accumulates metadata during SSTable construction
// ------------------------------------------------------------------------------------------------

/// Statistics gathered while iterating point entries and range tombstones.
///
/// Fed into [`SSTablePropertiesBlock`] at the end of construction.
struct BuildStats {
    record_count: u64,
    tombstone_count: u64,
    min_seq: u64,
    max_seq: u64,
    min_timestamp: u64,
    max_timestamp: u64,
    min_key: Option<Vec<u8>>,
    max_key: Option<Vec<u8>>,
    smallest_internal_key: Option<Vec<u8>>,
    largest_internal_key: Option<Vec<u8>>,
}

impl BuildStats {
    fn new() -> Self {
        Self {
            record_count: 0,
            tombstone_count: 0,
            min_seq: u64::MAX,
            max_seq: 0,
            min_timestamp: u64::MAX,
            max_timestamp: 0,
            min_key: None,
            max_key: None,
            smallest_internal_key: None,
            largest_internal_key: None,
        }
    }

    /// Update min/max sequence and timestamp bounds.
    fn track(&mut self, seq: u64, timestamp: u64) {
        self.min_seq = self.min_seq.min(seq);
        self.max_seq = self.max_seq.max(seq);
        self.min_timestamp = self.min_timestamp.min(timestamp);
        self.max_timestamp = self.max_timestamp.max(timestamp);
    }

    /// Convert collected statistics into an [`SSTablePropertiesBlock`].
    fn into_properties(self, range_count: usize, level: u32) -> SSTablePropertiesBlock {
        SSTablePropertiesBlock {
            creation_timestamp: SystemTime::now()
                .duration_since(UNIX_EPOCH)
                .expect("system clock before UNIX epoch")
                .as_millis() as u64,
            record_count: self.record_count,
            tombstone_count: self.tombstone_count,
            range_tombstones_count: range_count as u64,
            min_seq: if self.min_seq == u64::MAX { 0 } else { self.min_seq },
            max_seq: self.max_seq,
            min_timestamp: if self.min_timestamp == u64::MAX { 0 } else { self.min_timestamp },
            max_timestamp: self.max_timestamp,
            min_key: self.min_key.unwrap_or_default(),
            max_key: self.max_key.unwrap_or_default(),
            smallest_internal_key: self.smallest_internal_key.unwrap_or_default(),
            largest_internal_key: self.largest_internal_key.unwrap_or_default(),
            level,
        }
    }
}

// ------------------------------------------------------------------------------------------------
// Block I/O helpers
// ------------------------------------------------------------------------------------------------

/// Writes a checksummed block: `[data][compression:u8][masked_crc32c:u32 LE]`.
///
/// Returns `(block_offset, data_byte_len)` — the offset where the block's
/// content starts in the file, and the length of `data` (excluding the
/// trailer), matching [`BlockHandle`]'s convention.
fn write_checksummed_block(writer: &mut (impl Write + Seek), data: &[u8]) -> Result<(u64, usize), SSTableError> {
    let offset = writer.stream_position()?;
    let checksum = checksum::masked_crc32c(&[data, &[0u8]]);

    writer.write_all(data)?;
    writer.write_all(&[0u8])?;
    writer.write_all(&checksum.to_le_bytes())?;

    Ok((offset, data.len()))
}

/// Writes the SSTable header: `[magic][version][masked_crc32c over magic++version]`.
fn write_header(writer: &mut impl Write) -> Result<(), SSTableError> {
    let bare = SSTableHeader {
        magic: SST_HDR_MAGIC,
        version: SST_HDR_VERSION,
        header_crc: 0,
    };
    let body = header_body_bytes(&bare)?;
    let header_crc = checksum::masked_crc32c(&[&body]);

    let header = SSTableHeader { header_crc, ..bare };
    let header_bytes = encoding::encode_to_vec(&header)?;
    writer.write_all(&header_bytes)?;

    Ok(())
}

// ------------------------------------------------------------------------------------------------
// DataBlockBuilder — prefix-compressed entries with periodic restart points
// ------------------------------------------------------------------------------------------------

/// Accumulates prefix-compressed internal-key entries for a single data
/// block, inserting a restart point (full key, no prefix sharing) every
/// [`BLOCK_RESTART_INTERVAL`] entries.
struct DataBlockBuilder {
    buf: Vec<u8>,
    restarts: Vec<u32>,
    entries_since_restart: usize,
    last_key: Vec<u8>,
}

impl DataBlockBuilder {
    fn new() -> Self {
        Self {
            buf: Vec::new(),
            restarts: vec![0],
            entries_since_restart: 0,
            last_key: Vec::new(),
        }
    }

    fn is_empty(&self) -> bool {
        self.entries_since_restart == 0 && self.restarts.len() <= 1 && self.buf.is_empty()
    }

    /// Appends one entry. `internal_key` is the full encoded
    /// `user_key ++ trailer` bytes; `value` is `None` for a deletion.
    fn add(&mut self, internal_key: &[u8], timestamp: u64, value: Option<&[u8]>) {
        if self.entries_since_restart >= BLOCK_RESTART_INTERVAL {
            self.restarts.push(self.buf.len() as u32);
            self.entries_since_restart = 0;
        }

        let shared = if self.entries_since_restart == 0 {
            0
        } else {
            common_prefix_len(&self.last_key, internal_key)
        };
        let non_shared = &internal_key[shared..];

        put_varint64(&mut self.buf, shared as u64);
        put_varint64(&mut self.buf, non_shared.len() as u64);
        put_varint64(&mut self.buf, value.map_or(0, <[u8]>::len) as u64);
        put_varint64(&mut self.buf, timestamp);
        self.buf.extend_from_slice(non_shared);
        if let Some(value) = value {
            self.buf.extend_from_slice(value);
        }

        self.last_key.clear();
        self.last_key.extend_from_slice(internal_key);
        self.entries_since_restart += 1;
    }

    /// Serializes the block: entry bytes followed by the restart trailer
    /// `[restart_offset:u32 LE]*count ++ count:u32 LE`.
    fn finish(mut self) -> Vec<u8> {
        for &restart in &self.restarts {
            self.buf.extend_from_slice(&restart.to_le_bytes());
        }
        self.buf.extend_from_slice(&(self.restarts.len() as u32).to_le_bytes());
        self.buf
    }
}

fn common_prefix_len(a: &[u8], b: &[u8]) -> usize {
    a.iter().zip(b.iter()).take_while(|(x, y)| x == y).count()
}

/// Encodes and flushes the current data-block buffer to disk, pushing a
/// new index entry keyed by the block's first internal key.
fn flush_data_block(
    writer: &mut (impl Write + Seek),
    builder: DataBlockBuilder,
    block_first_key: Vec<u8>,
    index_entries: &mut Vec<SSTableIndexEntry>,
) -> Result<(), SSTableError> {
    let block_bytes = builder.finish();
    let (offset, size) = write_checksummed_block(writer, &block_bytes)?;

    index_entries.push(SSTableIndexEntry {
        separator_key: block_first_key,
        handle: BlockHandle {
            offset,
            size: size as u64,
        },
    });

    Ok(())
}

// ------------------------------------------------------------------------------------------------
// Phase helpers — one per logical section of the SSTable
// ------------------------------------------------------------------------------------------------

/// Iterates point entries, encodes them into prefix-compressed data blocks,
/// populates the bloom filter, and tracks statistics.
///
/// Returns the accumulated stats and the block-index entries.
fn write_data_blocks(
    writer: &mut (impl Write + Seek),
    entries: impl Iterator<Item = PointEntry>,
    bloom: &mut Bloom<Vec<u8>>,
) -> Result<(BuildStats, Vec<SSTableIndexEntry>), SSTableError> {
    let mut stats = BuildStats::new();
    let mut index_entries = Vec::new();
    let mut builder = DataBlockBuilder::new();
    let mut block_first_key: Option<Vec<u8>> = None;

    for entry in entries {
        stats.record_count += 1;
        if entry.value.is_none() {
            stats.tombstone_count += 1;
        }
        stats.track(entry.seq, entry.timestamp);

        if stats.smallest_internal_key.is_none() {
            stats.min_key = Some(entry.key.clone());
        }
        stats.max_key = Some(entry.key.clone());

        let internal_key = entry.internal_key().into_bytes();
        if stats.smallest_internal_key.is_none() {
            stats.smallest_internal_key = Some(internal_key.clone());
        }
        stats.largest_internal_key = Some(internal_key.clone());

        if block_first_key.is_none() {
            block_first_key = Some(internal_key.clone());
        }
        bloom.set(&entry.key);

        builder.add(&internal_key, entry.timestamp, entry.value.as_deref());

        if builder.buf.len() >= SST_DATA_BLOCK_MAX_SIZE {
            let finished = std::mem::replace(&mut builder, DataBlockBuilder::new());
            flush_data_block(writer, finished, block_first_key.take().unwrap_or_default(), &mut index_entries)?;
        }
    }

    if !builder.is_empty() {
        flush_data_block(writer, builder, block_first_key.unwrap_or_default(), &mut index_entries)?;
    }

    Ok((stats, index_entries))
}

/// Iterates range tombstones, updates stats, and writes the range-delete
/// block to disk.
///
/// Returns `(block_offset, data_byte_len)`.
fn write_range_tombstones(
    writer: &mut (impl Write + Seek),
    entries: impl Iterator<Item = RangeTombstone>,
    stats: &mut BuildStats,
) -> Result<(u64, usize), SSTableError> {
    let tombstones: Vec<RangeTombstone> = entries
        .inspect(|rt| stats.track(rt.seq, rt.timestamp))
        .collect();

    let mut bytes = Vec::new();
    encoding::encode_vec(&tombstones, &mut bytes)?;
    write_checksummed_block(writer, &bytes)
}

/// Builds and writes the metaindex block pointing to bloom, properties,
/// and range-delete blocks.
///
/// Returns `(block_offset, data_byte_len)`.
fn write_metaindex(
    writer: &mut (impl Write + Seek),
    bloom: BlockHandle,
    properties: BlockHandle,
    range_deletes: BlockHandle,
) -> Result<(u64, usize), SSTableError> {
    let meta_entries = vec![
        MetaIndexEntry {
            name: "filter.bloom".to_string(),
            handle: bloom,
        },
        MetaIndexEntry {
            name: "meta.properties".to_string(),
            handle: properties,
        },
        MetaIndexEntry {
            name: "meta.range_deletions".to_string(),
            handle: range_deletes,
        },
    ];

    let mut bytes = Vec::new();
    encoding::encode_vec(&meta_entries, &mut bytes)?;
    write_checksummed_block(writer, &bytes)
}

/// Writes the fixed-size SSTable footer and syncs the file.
fn write_footer(file: &mut File, metaindex: BlockHandle, index: BlockHandle) -> Result<(), SSTableError> {
    let footer = SSTableFooter { metaindex, index };
    let footer_bytes = footer.encode_fixed()?;

    let mut writer = BufWriter::new(&mut *file);
    writer.write_all(&footer_bytes)?;
    writer.flush()?;
    drop(writer);
    file.sync_all()?;

    Ok(())
}

// ------------------------------------------------------------------------------------------------
// SstWriter — public entry point
// ------------------------------------------------------------------------------------------------

/// Builds a complete SSTable file on disk.
///
/// # Example
///
/// ```rust,ignore
/// SstWriter::new(&path).build(points, point_count, ranges, range_count, 0)?;
/// ```
pub struct SstWriter<P: AsRef<Path>> {
    path: P,
}

impl<P: AsRef<Path>> SstWriter<P> {
    /// Create a writer targeting the given output path.
    pub fn new(path: P) -> Self {
        Self { path }
    }

    /// Consume sorted iterators and write a complete SSTable.
    ///
    /// # Parameters
    ///
    /// - `point_entries` — ascending-[`crate::key::InternalKey`]-ordered iterator of [`PointEntry`] values.
    /// - `point_count` — expected number of point entries (sizes bloom filter).
    /// - `range_tombstones` — sorted iterator of [`RangeTombstone`] values.
    /// - `range_count` — expected number of range tombstones.
    /// - `level` — the LSM level this table is being written at (0 for flush output).
    ///
    /// # Errors
    ///
    /// - [`SSTableError::Internal`] if both iterators are empty.
    /// - I/O errors from writing or seeking.
    #[allow(clippy::too_many_arguments)]
    pub fn build(
        self,
        point_entries: impl Iterator<Item = PointEntry>,
        point_count: usize,
        range_tombstones: impl Iterator<Item = RangeTombstone>,
        range_count: usize,
        level: u32,
    ) -> Result<(), SSTableError> {
        let mut point_entries = point_entries.peekable();
        let mut range_tombstones = range_tombstones.peekable();

        // Reject when both streams are empty.
        if point_count == 0 && point_entries.peek().is_none() && range_count == 0 && range_tombstones.peek().is_none()
        {
            return Err(SSTableError::Internal("Empty iterators cannot build SSTable".into()));
        }

        // Open temp file for atomic write.
        let final_path = self.path.as_ref();
        let tmp_path = final_path.with_extension("tmp");
        let mut file = OpenOptions::new().create(true).write(true).truncate(true).open(&tmp_path)?;
        let mut writer = BufWriter::new(&mut file);

        // 1. Header
        write_header(&mut writer)?;

        // 2. Data blocks (point entries → blocks + bloom filter + stats)
        let mut bloom = Bloom::new_for_fp_rate(point_count.max(1) + range_count, SST_BLOOM_FILTER_FALSE_POSITIVE_RATE)
            .map_err(|e| SSTableError::Internal(e.to_string()))?;

        let (mut stats, index_entries) = write_data_blocks(&mut writer, &mut point_entries, &mut bloom)?;

        // 3. Bloom filter block
        let bloom_block = SSTableBloomBlock {
            data: bloom.as_slice().to_vec(),
        };
        let bloom_bytes = encoding::encode_to_vec(&bloom_block)?;
        let (bloom_off, bloom_len) = write_checksummed_block(&mut writer, &bloom_bytes)?;

        // 4. Range tombstones block
        let (rt_off, rt_len) = write_range_tombstones(&mut writer, &mut range_tombstones, &mut stats)?;

        // 5. Properties block
        let properties = stats.into_properties(range_count, level);
        let props_bytes = encoding::encode_to_vec(&properties)?;
        let (props_off, props_len) = write_checksummed_block(&mut writer, &props_bytes)?;

        // 6. Metaindex block
        let (meta_off, meta_len) = write_metaindex(
            &mut writer,
            BlockHandle {
                offset: bloom_off,
                size: bloom_len as u64,
            },
            BlockHandle {
                offset: props_off,
                size: props_len as u64,
            },
            BlockHandle {
                offset: rt_off,
                size: rt_len as u64,
            },
        )?;

        // 7. Index block
        let mut index_bytes = Vec::new();
        encoding::encode_vec(&index_entries, &mut index_bytes)?;
        let (idx_off, idx_len) = write_checksummed_block(&mut writer, &index_bytes)?;

        // 8. Flush buffered data before footer (footer appends at current EOF).
        writer.flush()?;
        drop(writer);
        file.sync_all()?;

        // 9. Footer + final sync
        write_footer(
            &mut file,
            BlockHandle {
                offset: meta_off,
                size: meta_len as u64,
            },
            BlockHandle {
                offset: idx_off,
                size: idx_len as u64,
            },
        )?;

        rename(&tmp_path, final_path)?;
        Ok(())
    }
}
