//! Sorted String Table (SSTable) Module
//!
//! This module implements an **immutable**, **disk-backed**, and **versioned** sorted string table
//! suitable for embedded databases and key-value storage engines.
//! It provides **multi-version support**, **range tombstones**, **bloom filter-based point lookups**,
//! and **sequence+timestamp ordering** for crash-safe reads and merges.
//!
//! ## Design Overview
//!
//! SSTables store key-value data in **sorted, prefix-compressed blocks**, allowing efficient point
//! queries and range scans. Each SSTable is immutable once written. Updates (including deletes) are
//! represented as new entries with higher **sequence number**, enabling multiple versions of the
//! same key — exactly the same versioning the active memtable uses via [`crate::key::InternalKey`].
//!
//! **Point deletes** and **range tombstones** are stored as special entries to allow fast pruning
//! during reads and merges. Bloom filters are maintained per SSTable for quick existence checks
//! before scanning blocks.
//!
//! Data is serialized using a custom [`encoding`] module; block integrity uses masked CRC32C
//! checksums, matching the WAL's framing.
//!
//! # On-disk layout
//!
//! ```text
//! [HEADER_BYTES]
//! [DATA_BLOCK_BYTES][compression:u8][masked_crc32c:u32_LE]
//! [DATA_BLOCK_BYTES][compression:u8][masked_crc32c:u32_LE]
//! ...
//! [BLOOM_BLOCK_BYTES][compression:u8][masked_crc32c:u32_LE]
//! [RANGE_DELETES_BLOCK_BYTES][compression:u8][masked_crc32c:u32_LE]
//! [PROPERTIES_BLOCK_BYTES][compression:u8][masked_crc32c:u32_LE]
//! [METAINDEX_BLOCK_BYTES][compression:u8][masked_crc32c:u32_LE]
//! [INDEX_BLOCK_BYTES][compression:u8][masked_crc32c:u32_LE]
//! [FOOTER_BYTES] (48 bytes, fixed)
//! ```
//!
//! - **Header** — magic + version + masked CRC32C over both.
//! - **Data blocks** — prefix-compressed [`crate::key::InternalKey`] entries with periodic
//!   restart points, every block independently checksummed.
//! - **Bloom filter block** — fast existence checks for point keys.
//! - **Range deletes block** — serialized [`crate::key::RangeTombstone`] entries.
//! - **Properties block** — table metadata such as min/max key, sequence numbers, timestamps,
//!   record counts, and the originating level.
//! - **Metaindex block** — directory of blocks (bloom, properties, range deletes) for easy lookup.
//! - **Index block** — directory of data blocks, allowing binary search for keys.
//! - **Footer** — fixed 48-byte trailer with metaindex/index handles and a magic number;
//!   corruption of everything but the footer is caught by the per-block checksums, so the footer
//!   itself carries no checksum of its own.
//!
//! # Sub-modules
//!
//! - [`builder`] — [`SstWriter`] for building SSTables from sorted streams.
//! - [`iterator`] — [`BlockIterator`], [`BlockEntry`], and [`ScanIterator`] for reading.
//!
//! # Concurrency model
//!
//! - SSTables are **immutable**, so reads are lock-free and thread-safe.
//! - Multiple readers can safely access the same SSTable concurrently.
//! - No writes occur in-place; updates are appended via **new SSTables**.
//! - Multi-versioning ensures that readers always see a consistent snapshot.
//!
//! # Guarantees
//!
//! - **Immutability:** Once written, an SSTable is never modified.
//! - **Multi-version support:** Multiple versions of the same key are preserved with seq+timestamp ordering.
//! - **Range deletes:** Efficient representation and merging of point/range deletions.
//! - **Integrity:** Each block contains a masked CRC32C checksum to detect corruption.
//! - **Fast point lookups:** Bloom filter reduces unnecessary block scans.
//! - **Safe merges:** SSTables can be safely merged without affecting existing readers.
//! - **Crash recovery:** Files are written atomically using temporary paths and rename-on-success.

// ------------------------------------------------------------------------------------------------
// Sub-modules
// ------------------------------------------------------------------------------------------------

pub mod builder;
pub mod encoding_impls;
pub mod iterator;

#[cfg(test)]
mod tests;

// ------------------------------------------------------------------------------------------------
// Re-exports — public API surface
// ------------------------------------------------------------------------------------------------

#[allow(unused_imports)] // public API surface for downstream consumers
pub use crate::engine::{PointEntry, RangeTombstone, Record};
pub use builder::SstWriter;
#[allow(unused_imports)] // public API surface for downstream consumers
pub use iterator::{BlockEntry, BlockIterator, ScanIterator};

pub use encoding_impls::{
    BlockHandle, MetaIndexEntry, SSTableBloomBlock, SSTableFooter, SSTableHeader, SSTableIndexEntry,
    SSTablePropertiesBlock,
};

// ------------------------------------------------------------------------------------------------
// Includes
// ------------------------------------------------------------------------------------------------

use std::{fs::File, io, path::Path, sync::Arc};

use crate::checksum;
use crate::encoding::{self, EncodingError};
use crate::key::{InternalKey, InternalKeyComparator};
use bloomfilter::Bloom;
use memmap2::Mmap;
use thiserror::Error;

// ------------------------------------------------------------------------------------------------
// Constants
// ------------------------------------------------------------------------------------------------

pub(crate) const SST_HDR_MAGIC: [u8; 4] = *b"SST1";
pub(crate) const SST_HDR_VERSION: u32 = 1;
pub(crate) const SST_BLOOM_FILTER_FALSE_POSITIVE_RATE: f64 = 0.01;
pub(crate) const SST_DATA_BLOCK_MAX_SIZE: usize = 4096;
/// Number of entries between prefix-compression restart points.
pub(crate) const BLOCK_RESTART_INTERVAL: usize = 16;
/// Fixed footer size: two varint-encoded `BlockHandle`s, zero-padded to
/// 40 bytes, followed by the 8-byte magic number.
pub(crate) const SST_FOOTER_SIZE: usize = 48;
pub(crate) const SST_FOOTER_MAGIC: u64 = 0xdb47_7524_8b80_fb57;
pub(crate) const SST_HDR_SIZE: usize = 12;
/// Trailer appended after every block's raw bytes: `[compression:u8][masked_crc32c:u32 LE]`.
pub(crate) const BLOCK_TRAILER_SIZE: usize = 5;

// ------------------------------------------------------------------------------------------------
// Error Types
// ------------------------------------------------------------------------------------------------

/// Errors returned by SSTable operations (read, write, build).
#[derive(Debug, Error)]
pub enum SSTableError {
    /// Underlying I/O error.
    #[error("I/O error: {0}")]
    Io(#[from] io::Error),

    /// Encoding / decoding error.
    #[error("Encoding error: {0}")]
    Encoding(#[from] EncodingError),

    /// Internal invariant violation or poisoned lock.
    #[error("Internal error: {0}")]
    Internal(String),

    /// Checksum mistmatch.
    #[error("Checksum mismatch")]
    ChecksumMismatch,
}

// ------------------------------------------------------------------------------------------------
// GetResult
// ------------------------------------------------------------------------------------------------

/// Result of a single key lookup in an SSTable.
#[derive(Debug, PartialEq, Clone)]
pub enum GetResult {
    /// A value stored in this SST.
    Put {
        /// Stored value.
        value: Vec<u8>,
        /// Sequence number of this version.
        seq: u64,
        /// Timestamp of this version.
        timestamp: u64,
    },

    /// A point delete for this key.
    Delete {
        /// Sequence number of the delete.
        seq: u64,
        /// Timestamp of the delete.
        timestamp: u64,
    },

    /// The key falls inside a range deletion.
    RangeDelete {
        /// Sequence number of the range tombstone.
        seq: u64,
        /// Timestamp of the range tombstone.
        timestamp: u64,
    },

    /// This SST has no information about the key.
    NotFound,
}

impl GetResult {
    /// Returns the sequence number associated with this get result.
    pub fn seq(&self) -> u64 {
        match self {
            Self::Put { seq, .. } => *seq,
            Self::Delete { seq, .. } => *seq,
            Self::RangeDelete { seq, .. } => *seq,
            Self::NotFound => 0,
        }
    }

    /// Returns the **timestamp** associated with this get result.
    pub fn timestamp(&self) -> u64 {
        match self {
            Self::Put { timestamp, .. } => *timestamp,
            Self::Delete { timestamp, .. } => *timestamp,
            Self::RangeDelete { timestamp, .. } => *timestamp,
            Self::NotFound => 0,
        }
    }
}

// ------------------------------------------------------------------------------------------------
// SSTable — immutable reader
// ------------------------------------------------------------------------------------------------

/// A fully memory-mapped, immutable **Sorted String Table (SSTable)**.
pub struct SSTable {
    /// Unique file number assigned by the manifest (matches the `<nnnnnn>.sst` filename).
    /// Set to 0 by `SSTable::open()` — the engine sets the correct value after loading.
    pub id: u64,

    /// Memory-mapped file containing the full SSTable bytes.
    pub mmap: Mmap,

    /// Parsed header block containing magic/version information.
    pub(crate) header: SSTableHeader,

    /// Bloom filter block for fast membership tests.
    pub(crate) bloom: SSTableBloomBlock,

    /// Properties block with statistics and metadata.
    pub properties: SSTablePropertiesBlock,

    /// Range delete tombstones, decoded directly into [`crate::key::RangeTombstone`].
    pub(crate) range_deletes: Vec<RangeTombstone>,

    /// Index entries mapping key ranges to data blocks.
    pub(crate) index: Vec<SSTableIndexEntry>,

    /// Footer containing block handles.
    pub(crate) footer: SSTableFooter,
}

impl SSTable {
    /// Returns the on-disk file size of this SSTable in bytes.
    pub fn file_size(&self) -> u64 {
        self.mmap.len() as u64
    }

    /// Checks whether `key` *might* exist in this SSTable according to the
    /// bloom filter.
    ///
    /// Returns `true` if the bloom says "maybe present" or no bloom exists.
    /// Returns `false` only when the bloom definitively says "not present".
    pub fn bloom_may_contain(&self, key: &[u8]) -> bool {
        if self.bloom.data.is_empty() {
            return true; // no bloom → cannot exclude
        }
        match Bloom::from_slice(&self.bloom.data) {
            Ok(bloom) => bloom.check(key),
            Err(_) => true, // corrupted bloom → assume present
        }
    }

    /// Returns an iterator over the range tombstones stored in this SSTable.
    pub fn range_tombstone_iter(&self) -> impl Iterator<Item = RangeTombstone> + '_ {
        self.range_deletes.iter().cloned()
    }

    /// Opens an SSTable from disk, verifies its integrity, and loads all top-level
    /// metadata structures.
    ///
    /// # Overview
    ///
    /// This method performs the full SSTable loading pipeline:
    ///
    /// 1. **Open and mmap the file**
    ///    The entire table is memory-mapped for fast zero-copy block access.
    ///
    /// 2. **Decode and verify the header**
    ///    - Deserialized using custom encoding
    ///    - Header checksum is a masked CRC32C over the magic+version bytes
    ///    - Magic string and version must match engine constants
    ///
    /// 3. **Decode the footer**
    ///    - Fixed 48 bytes at the end of the file, ending in the SSTable magic number
    ///    - Contains block handles for `metaindex` and `index`
    ///
    /// 4. **Load the metaindex block**
    ///    This tells us where the bloom filter, properties block,
    ///    and range deletions block are stored.
    ///
    /// 5. **Load individual blocks**
    ///    - Bloom filter (optional; missing filter → empty bloom)
    ///    - Properties block (required)
    ///    - Range tombstones block (optional)
    ///    - Index block (required)
    ///
    /// 6. **Return a fully initialized `SSTable` instance**
    ///
    /// # Errors
    ///
    /// - [`SSTableError::ChecksumMismatch`]
    ///   If the header or any block checksum fails.
    ///
    /// - [`SSTableError::Internal`]
    ///   For malformed blocks, mismatched magic/version, missing properties block,
    ///   out-of-bounds reads, truncated block data, or unrecognized metaindex entries.
    ///
    /// # Safety
    ///
    /// Uses `unsafe { Mmap::map(...) }` but is memory-safe because:
    ///
    /// - The file is never written after creation (immutable)
    /// - The mmap is read-only
    /// - All block boundaries are verified before slicing
    pub fn open(path: impl AsRef<Path>) -> Result<Self, SSTableError> {
        let file = File::open(path)?;

        let mmap = unsafe { Mmap::map(&file)? };

        let file_len = mmap.len();
        if file_len < SST_HDR_SIZE + SST_FOOTER_SIZE {
            return Err(SSTableError::Internal("File too small".into()));
        }

        let (header, _) = encoding::decode_from_slice::<SSTableHeader>(&mmap[..SST_HDR_SIZE])?;

        let body = header_body_bytes(&header)?;
        if !checksum::verify_masked(&[&body], header.header_crc) {
            return Err(SSTableError::ChecksumMismatch);
        }

        if header.magic != SST_HDR_MAGIC {
            return Err(SSTableError::Internal("SSTable header magic mismatch".into()));
        }

        if header.version != SST_HDR_VERSION {
            return Err(SSTableError::Internal("SSTable header version mismatch".into()));
        }

        let footer_start = file_len - SST_FOOTER_SIZE;
        let footer = SSTableFooter::decode_fixed(&mmap[footer_start..])?;

        let metaindex_data = Self::read_block_bytes(&mmap, &footer.metaindex)?;
        let (meta_entries, _) = encoding::decode_vec::<MetaIndexEntry>(&metaindex_data)?;

        let mut bloom_block: Option<BlockHandle> = None;
        let mut properties_block: Option<BlockHandle> = None;
        let mut range_deletes_block: Option<BlockHandle> = None;

        for entry in meta_entries {
            match entry.name.as_str() {
                "filter.bloom" => bloom_block = Some(entry.handle),
                "meta.properties" => properties_block = Some(entry.handle),
                "meta.range_deletions" => range_deletes_block = Some(entry.handle),
                other => {
                    return Err(SSTableError::Internal(format!(
                        "unrecognized metaindex entry '{other}'"
                    )));
                }
            }
        }

        let bloom = if let Some(bh) = bloom_block {
            let bloom_bytes = Self::read_block_bytes(&mmap, &bh)?;
            let (bloom, _) = encoding::decode_from_slice::<SSTableBloomBlock>(&bloom_bytes)?;
            bloom
        } else {
            SSTableBloomBlock { data: Vec::new() }
        };

        let properties = if let Some(pb) = properties_block {
            let pbytes = Self::read_block_bytes(&mmap, &pb)?;
            let (properties, _) = encoding::decode_from_slice::<SSTablePropertiesBlock>(&pbytes)?;
            properties
        } else {
            return Err(SSTableError::Internal("SSTable missing properties".into()));
        };

        let range_deletes = if let Some(rh) = range_deletes_block {
            let rbytes = Self::read_block_bytes(&mmap, &rh)?;
            let (ranges, _) = encoding::decode_vec::<RangeTombstone>(&rbytes)?;
            ranges
        } else {
            Vec::new()
        };

        let index_bytes = Self::read_block_bytes(&mmap, &footer.index)?;
        let (index_entries, _) = encoding::decode_vec::<SSTableIndexEntry>(&index_bytes)?;

        Ok(Self {
            id: 0,
            mmap,
            header,
            bloom,
            properties,
            range_deletes,
            index: index_entries,
            footer,
        })
    }

    /// Performs a **single-SST lookup** of a key.
    ///
    /// Returns the "raw MVCC" result from this SSTable alone. Higher-level LSM
    /// layers apply merging across tables.
    ///
    /// # Lookup pipeline
    ///
    /// 1. **Check range tombstones**
    ///    Determines whether the key is inside a range deletion.
    ///
    /// 2. **Bloom filter check**
    ///    If the bloom filter says the key is impossible, skip data block search.
    ///
    /// 3. **Find data block using the index**
    ///    Binary search on separator keys (first key of each block).
    ///
    /// 4. **Search inside the block**
    ///    Using `BlockIterator`, seek to the key and collect the newest version.
    ///
    /// 5. **Merge point entries with range tombstone**
    ///    Range deletes override older point entries.
    ///
    /// # Returns
    ///
    /// A [`GetResult`] variant:
    /// - `Put` – newest put
    /// - `Delete` – newest point delete
    /// - `RangeDelete` – covered by a tombstone
    /// - `NotFound` – no information in this SSTable
    ///
    /// # MVCC rules
    ///
    /// Version comparison uses:
    /// - Primary: sequence number
    /// - Secondary: timestamp (tie-breaking)
    pub fn get(&self, key: &[u8]) -> Result<GetResult, SSTableError> {
        // 1) Check range tombstones first
        let range_info = self.covering_range_for_key(key);

        // 2) Bloom filter check (only point keys)
        let bloom_maybe_present = self.bloom_may_contain(key);

        if !bloom_maybe_present {
            return Ok(match range_info {
                Some((seq, timestamp)) => GetResult::RangeDelete { seq, timestamp },
                None => GetResult::NotFound,
            });
        }

        // 3) Find the block (if any)
        if self.index.is_empty() {
            return Ok(match range_info {
                Some((seq, timestamp)) => GetResult::RangeDelete { seq, timestamp },
                None => GetResult::NotFound,
            });
        }

        let block_idx = self.find_block_for_key(key);
        let entry = &self.index[block_idx];

        let block_bytes = Self::read_block_bytes(&self.mmap, &entry.handle)?;

        // 4) Scan block using BlockIterator (point keys)
        let mut iter = BlockIterator::new(block_bytes);
        iter.seek_to(key);
        let mut latest: Option<GetResult> = None;

        for item in iter {
            if item.key != key {
                break;
            }

            let candidate = if item.is_delete {
                GetResult::Delete {
                    seq: item.seq,
                    timestamp: item.timestamp,
                }
            } else {
                GetResult::Put {
                    value: item.value.to_vec(),
                    seq: item.seq,
                    timestamp: item.timestamp,
                }
            };

            latest = Some(match &latest {
                Some(existing) => {
                    if candidate.seq() > existing.seq() {
                        candidate
                    } else if candidate.seq() == existing.seq() {
                        // tie-breaker by timestamp
                        if candidate.timestamp() > existing.timestamp() {
                            candidate
                        } else {
                            existing.clone()
                        }
                    } else {
                        existing.clone()
                    }
                }
                None => candidate,
            });
        }

        // 5) Merge point vs range tombstone (seq + timestamp)
        match (latest, range_info) {
            // No point, no range delete → not found
            (None, None) => Ok(GetResult::NotFound),

            // Point exists, no range delete → point result wins
            (Some(r), None) => Ok(r),

            // No point entry, but we have a range delete
            (None, Some((seq, timestamp))) => Ok(GetResult::RangeDelete { seq, timestamp }),

            // Everything else: point_result = Some(_), range = Some(_)
            (Some(point), Some((r_seq, r_ts))) => {
                let result = match point {
                    GetResult::Put {
                        value,
                        seq: p_seq,
                        timestamp: p_ts,
                    } => {
                        if r_seq > p_seq || (r_seq == p_seq && r_ts > p_ts) {
                            GetResult::RangeDelete { seq: r_seq, timestamp: r_ts }
                        } else {
                            GetResult::Put { value, seq: p_seq, timestamp: p_ts }
                        }
                    }
                    GetResult::Delete { seq: d_seq, timestamp: d_ts } => {
                        if r_seq > d_seq || (r_seq == d_seq && r_ts > d_ts) {
                            GetResult::RangeDelete { seq: r_seq, timestamp: r_ts }
                        } else {
                            GetResult::Delete { seq: d_seq, timestamp: d_ts }
                        }
                    }
                    GetResult::RangeDelete { seq: rd_seq, timestamp: rd_ts } => {
                        let (seq, ts) = if r_seq > rd_seq || (r_seq == rd_seq && r_ts > rd_ts) {
                            (r_seq, r_ts)
                        } else {
                            (rd_seq, rd_ts)
                        };
                        GetResult::RangeDelete { seq, timestamp: ts }
                    }
                    GetResult::NotFound => GetResult::RangeDelete { seq: r_seq, timestamp: r_ts },
                };

                Ok(result)
            }
        }
    }

    /// Returns a range-scan iterator over this SSTable.
    ///
    /// The iterator yields **raw MVCC entries** (Put/Delete/RangeDelete) in key order.
    /// Key ordered ascending with sequence number ordered descending within each key.
    /// Higher layers of the LSM tree (merging iterators) are responsible for
    /// de-duplicating versions and reconciling deletes.
    ///
    /// # Parameters
    ///
    /// - `start_key` — inclusive start of scan
    /// - `end_key` — exclusive upper bound of scan
    ///
    /// # Returns
    ///
    /// [`ScanIterator`] which merges:
    ///
    /// - data blocks covering the range
    /// - range tombstone iterator
    ///
    /// to produce sorted MVCC entries.
    pub fn scan(
        &self,
        start_key: &[u8],
        end_key: &[u8],
    ) -> Result<impl Iterator<Item = Record> + use<'_>, SSTableError> {
        ScanIterator::new(self, start_key.to_vec(), end_key.to_vec())
    }

    /// Returns a range-scan iterator that owns an `Arc` clone of this
    /// SSTable, so the iterator's lifetime is `'static` — it can outlive
    /// the lock guard or `Version` snapshot that produced the `Arc`.
    pub fn scan_owned(
        sst: &Arc<SSTable>,
        start_key: &[u8],
        end_key: &[u8],
    ) -> Result<ScanIterator<Arc<SSTable>>, SSTableError> {
        ScanIterator::new(Arc::clone(sst), start_key.to_vec(), end_key.to_vec())
    }

    /// Reads a block referenced by a [`BlockHandle`] from the mmap and verifies
    /// its checksum. Returns the raw (post-decompression) block content —
    /// the block trailer (`compression` byte + checksum) is consumed and
    /// validated, not returned.
    pub(crate) fn read_block_bytes(mmap: &Mmap, handle: &BlockHandle) -> Result<Vec<u8>, SSTableError> {
        let start = usize::try_from(handle.offset)
            .map_err(|_| SSTableError::Internal("block offset exceeds addressable range".into()))?;
        let size = usize::try_from(handle.size)
            .map_err(|_| SSTableError::Internal("block size exceeds addressable range".into()))?;

        let end = start
            .checked_add(size)
            .and_then(|e| e.checked_add(BLOCK_TRAILER_SIZE))
            .ok_or_else(|| SSTableError::Internal("block handle overflow".into()))?;

        if end > mmap.len() {
            return Err(SSTableError::Internal("block out of range".into()));
        }

        let content = &mmap[start..start + size];
        let compression = mmap[start + size];
        let crc_bytes: [u8; 4] = mmap[start + size + 1..end]
            .try_into()
            .map_err(|_| SSTableError::Internal("short block checksum".into()))?;
        let stored_crc = u32::from_le_bytes(crc_bytes);

        if !checksum::verify_masked(&[content, &[compression]], stored_crc) {
            return Err(SSTableError::ChecksumMismatch);
        }

        Ok(content.to_vec())
    }

    /// Locates the index entry whose block may contain the given `key`.
    ///
    /// Uses binary search over `separator_key`, which stores the **first**
    /// internal key of each block: finds the last block whose separator is
    /// `<= key`'s highest-ranked internal key, i.e. a floor search.
    pub(crate) fn find_block_for_key(&self, key: &[u8]) -> usize {
        if self.index.is_empty() {
            return 0;
        }

        let probe = probe_bytes(key);
        match self
            .index
            .binary_search_by(|entry| InternalKeyComparator::compare_bytes(entry.separator_key.as_slice(), &probe))
        {
            Ok(i) => i,
            Err(0) => 0,
            Err(i) => i - 1,
        }
    }

    /// Returns the newest (highest seq, then highest timestamp) range tombstone
    /// that covers the given `key`, if any.
    fn covering_range_for_key(&self, key: &[u8]) -> Option<(u64, u64)> {
        let mut res: Option<(u64, u64)> = None;
        for rd in &self.range_deletes {
            if key >= rd.start.as_slice() && key < rd.end.as_slice() {
                res = Some(match res {
                    Some((prev_seq, prev_ts)) => {
                        if rd.seq > prev_seq || (rd.seq == prev_seq && rd.timestamp > prev_ts) {
                            (rd.seq, rd.timestamp)
                        } else {
                            (prev_seq, prev_ts)
                        }
                    }
                    None => (rd.seq, rd.timestamp),
                });
            }
        }
        res
    }
}

/// Builds a probe [`InternalKey`] for binary search against separator keys:
/// the highest-ranked internal key for `user_key` (sorts before any real
/// entry with that user key, regardless of sequence number), so a floor
/// search over first-key separators lands on the right block.
fn probe_bytes(user_key: &[u8]) -> Vec<u8> {
    InternalKey::max_for_user_key(user_key).into_bytes()
}

/// The header bytes covered by the header's masked CRC32C: `magic ++ version`.
pub(crate) fn header_body_bytes(header: &SSTableHeader) -> Result<Vec<u8>, SSTableError> {
    let mut body = Vec::with_capacity(8);
    encoding::Encode::encode_to(&header.magic, &mut body)?;
    encoding::Encode::encode_to(&header.version, &mut body)?;
    Ok(body)
}
