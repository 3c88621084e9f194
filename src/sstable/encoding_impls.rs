//! On-disk structures for the SSTable format and their [`Encode`]/[`Decode`]
//! implementations.

use crate::encoding::{self, Decode, Encode, EncodingError, Varint64};

use super::{SST_FOOTER_MAGIC, SST_FOOTER_SIZE};

// ------------------------------------------------------------------------------------------------
// BlockHandle — varint64-encoded offset/size pair
// ------------------------------------------------------------------------------------------------

/// Handle to a block in the SSTable file: its offset and the length of
/// its raw (post-decompression) content, **not including** the trailing
/// `[compression:u8][masked_crc32c:u32]` trailer.
#[derive(Debug, Clone, Copy, Default)]
pub struct BlockHandle {
    /// Offset of the block's content in the SSTable file.
    pub offset: u64,

    /// Size of the block's raw content in bytes (excludes the trailer).
    pub size: u64,
}

impl Encode for BlockHandle {
    fn encode_to(&self, buf: &mut Vec<u8>) -> Result<(), EncodingError> {
        Varint64(self.offset).encode_to(buf)?;
        Varint64(self.size).encode_to(buf)?;
        Ok(())
    }
}

impl Decode for BlockHandle {
    fn decode_from(buf: &[u8]) -> Result<(Self, usize), EncodingError> {
        let mut off = 0;
        let (offset, n) = Varint64::decode_from(&buf[off..])?;
        off += n;
        let (size, n) = Varint64::decode_from(&buf[off..])?;
        off += n;
        Ok((
            Self {
                offset: offset.0,
                size: size.0,
            },
            off,
        ))
    }
}

// ------------------------------------------------------------------------------------------------
// SSTableHeader
// ------------------------------------------------------------------------------------------------

/// SSTable file header, written at the beginning of the SSTable.
/// Contains a magic number, version, and a masked CRC32C checksum
/// covering both.
#[derive(Default)]
pub struct SSTableHeader {
    /// Magic bytes to identify SSTable format (`b"SST1"`).
    pub magic: [u8; 4],

    /// SSTable format version.
    pub version: u32,

    /// Masked CRC32C checksum over `magic ++ version`.
    pub header_crc: u32,
}

impl Encode for SSTableHeader {
    fn encode_to(&self, buf: &mut Vec<u8>) -> Result<(), EncodingError> {
        self.magic.encode_to(buf)?;
        self.version.encode_to(buf)?;
        self.header_crc.encode_to(buf)?;
        Ok(())
    }
}

impl Decode for SSTableHeader {
    fn decode_from(buf: &[u8]) -> Result<(Self, usize), EncodingError> {
        let mut off = 0;
        let (magic, n) = <[u8; 4]>::decode_from(&buf[off..])?;
        off += n;
        let (version, n) = u32::decode_from(&buf[off..])?;
        off += n;
        let (header_crc, n) = u32::decode_from(&buf[off..])?;
        off += n;
        Ok((
            Self {
                magic,
                version,
                header_crc,
            },
            off,
        ))
    }
}

// ------------------------------------------------------------------------------------------------
// SSTableBloomBlock
// ------------------------------------------------------------------------------------------------

/// Represents a Bloom filter block used to quickly check the presence of point keys.
pub struct SSTableBloomBlock {
    /// Serialized bloom filter bytes.
    pub data: Vec<u8>,
}

impl Encode for SSTableBloomBlock {
    fn encode_to(&self, buf: &mut Vec<u8>) -> Result<(), EncodingError> {
        self.data.encode_to(buf)
    }
}

impl Decode for SSTableBloomBlock {
    fn decode_from(buf: &[u8]) -> Result<(Self, usize), EncodingError> {
        let (data, n) = <Vec<u8>>::decode_from(buf)?;
        Ok((Self { data }, n))
    }
}

// ------------------------------------------------------------------------------------------------
// SSTablePropertiesBlock
// ------------------------------------------------------------------------------------------------

/// Metadata block containing SSTable-level properties and statistics.
pub struct SSTablePropertiesBlock {
    /// Creation timestamp (UNIX epoch millis).
    pub creation_timestamp: u64,

    /// Total number of point records in the SSTable.
    pub record_count: u64,

    /// Number of point deletions.
    pub tombstone_count: u64,

    /// Number of range tombstones.
    pub range_tombstones_count: u64,

    /// Minimum sequence number present in this SSTable.
    pub min_seq: u64,

    /// Maximum sequence number present in this SSTable.
    pub max_seq: u64,

    /// Minimum timestamp in this SSTable.
    pub min_timestamp: u64,

    /// Maximum timestamp in this SSTable.
    pub max_timestamp: u64,

    /// Smallest user key in the SSTable.
    pub min_key: Vec<u8>,

    /// Largest user key in the SSTable.
    pub max_key: Vec<u8>,

    /// Smallest encoded internal key (user key + trailer) in the SSTable.
    pub smallest_internal_key: Vec<u8>,

    /// Largest encoded internal key (user key + trailer) in the SSTable.
    pub largest_internal_key: Vec<u8>,

    /// LSM level this table was written at; `0` for flush output and
    /// FIFO/Universal outputs, `>=1` for levelled compaction outputs.
    pub level: u32,
}

impl Encode for SSTablePropertiesBlock {
    fn encode_to(&self, buf: &mut Vec<u8>) -> Result<(), EncodingError> {
        self.creation_timestamp.encode_to(buf)?;
        self.record_count.encode_to(buf)?;
        self.tombstone_count.encode_to(buf)?;
        self.range_tombstones_count.encode_to(buf)?;
        self.min_seq.encode_to(buf)?;
        self.max_seq.encode_to(buf)?;
        self.min_timestamp.encode_to(buf)?;
        self.max_timestamp.encode_to(buf)?;
        self.min_key.encode_to(buf)?;
        self.max_key.encode_to(buf)?;
        self.smallest_internal_key.encode_to(buf)?;
        self.largest_internal_key.encode_to(buf)?;
        self.level.encode_to(buf)?;
        Ok(())
    }
}

impl Decode for SSTablePropertiesBlock {
    fn decode_from(buf: &[u8]) -> Result<(Self, usize), EncodingError> {
        let mut off = 0;
        macro_rules! field {
            ($ty:ty) => {{
                let (v, n) = <$ty>::decode_from(&buf[off..])?;
                off += n;
                v
            }};
        }
        let creation_timestamp = field!(u64);
        let record_count = field!(u64);
        let tombstone_count = field!(u64);
        let range_tombstones_count = field!(u64);
        let min_seq = field!(u64);
        let max_seq = field!(u64);
        let min_timestamp = field!(u64);
        let max_timestamp = field!(u64);
        let min_key = field!(Vec<u8>);
        let max_key = field!(Vec<u8>);
        let smallest_internal_key = field!(Vec<u8>);
        let largest_internal_key = field!(Vec<u8>);
        let level = field!(u32);
        Ok((
            Self {
                creation_timestamp,
                record_count,
                tombstone_count,
                range_tombstones_count,
                min_seq,
                max_seq,
                min_timestamp,
                max_timestamp,
                min_key,
                max_key,
                smallest_internal_key,
                largest_internal_key,
                level,
            },
            off,
        ))
    }
}

// ------------------------------------------------------------------------------------------------
// SSTableIndexEntry / MetaIndexEntry
// ------------------------------------------------------------------------------------------------

/// Index entry pointing to a specific data block.
pub struct SSTableIndexEntry {
    /// Encoded internal key of the first entry in this block.
    pub separator_key: Vec<u8>,

    /// Block handle containing offset and size of the data block.
    pub handle: BlockHandle,
}

impl Encode for SSTableIndexEntry {
    fn encode_to(&self, buf: &mut Vec<u8>) -> Result<(), EncodingError> {
        self.separator_key.encode_to(buf)?;
        self.handle.encode_to(buf)?;
        Ok(())
    }
}

impl Decode for SSTableIndexEntry {
    fn decode_from(buf: &[u8]) -> Result<(Self, usize), EncodingError> {
        let mut off = 0;
        let (separator_key, n) = <Vec<u8>>::decode_from(&buf[off..])?;
        off += n;
        let (handle, n) = BlockHandle::decode_from(&buf[off..])?;
        off += n;
        Ok((Self { separator_key, handle }, off))
    }
}

/// Represents a single entry in the metaindex block.
pub struct MetaIndexEntry {
    /// Name of the block (e.g., "filter.bloom", "meta.properties").
    pub name: String,

    /// Handle pointing to the block location.
    pub handle: BlockHandle,
}

impl Encode for MetaIndexEntry {
    fn encode_to(&self, buf: &mut Vec<u8>) -> Result<(), EncodingError> {
        self.name.encode_to(buf)?;
        self.handle.encode_to(buf)?;
        Ok(())
    }
}

impl Decode for MetaIndexEntry {
    fn decode_from(buf: &[u8]) -> Result<(Self, usize), EncodingError> {
        let mut off = 0;
        let (name, n) = String::decode_from(&buf[off..])?;
        off += n;
        let (handle, n) = BlockHandle::decode_from(&buf[off..])?;
        off += n;
        Ok((Self { name, handle }, off))
    }
}

// ------------------------------------------------------------------------------------------------
// SSTableFooter — fixed 48-byte trailer, no stored checksum
// ------------------------------------------------------------------------------------------------

/// SSTable footer, stored at the very end of the file as a fixed
/// [`super::SST_FOOTER_SIZE`]-byte block: the two varint-encoded block
/// handles, zero-padded, followed by the 8-byte magic number. There is
/// no footer checksum — every block it points to is independently
/// checksummed, and the magic number alone is enough to recognize a
/// well-formed file.
pub struct SSTableFooter {
    /// Handle of the metaindex block, containing references to:
    /// - bloom filter block
    /// - properties block
    /// - range tombstone block
    pub metaindex: BlockHandle,

    /// Handle of the main index block, mapping separator keys to data blocks.
    pub index: BlockHandle,
}

impl SSTableFooter {
    /// Encodes this footer into exactly [`super::SST_FOOTER_SIZE`] bytes.
    pub fn encode_fixed(&self) -> Result<Vec<u8>, EncodingError> {
        let mut handles = Vec::new();
        self.metaindex.encode_to(&mut handles)?;
        self.index.encode_to(&mut handles)?;

        if handles.len() > SST_FOOTER_SIZE - 8 {
            return Err(EncodingError::LengthOverflow(format!(
                "footer block handles ({} bytes) exceed the fixed footer budget",
                handles.len()
            )));
        }

        let mut out = Vec::with_capacity(SST_FOOTER_SIZE);
        out.extend_from_slice(&handles);
        out.resize(SST_FOOTER_SIZE - 8, 0);
        out.extend_from_slice(&SST_FOOTER_MAGIC.to_le_bytes());
        Ok(out)
    }

    /// Decodes a fixed [`super::SST_FOOTER_SIZE`]-byte footer, verifying
    /// the trailing magic number.
    pub fn decode_fixed(buf: &[u8]) -> Result<Self, super::SSTableError> {
        if buf.len() != SST_FOOTER_SIZE {
            return Err(super::SSTableError::Internal("footer has the wrong size".into()));
        }
        let magic = u64::from_le_bytes(
            buf[SST_FOOTER_SIZE - 8..]
                .try_into()
                .map_err(|_| super::SSTableError::Internal("short footer magic".into()))?,
        );
        if magic != SST_FOOTER_MAGIC {
            return Err(super::SSTableError::Internal("SSTable footer magic mismatch".into()));
        }

        let mut off = 0;
        let (metaindex, n) = BlockHandle::decode_from(&buf[off..])?;
        off += n;
        let (index, _) = BlockHandle::decode_from(&buf[off..])?;
        Ok(Self { metaindex, index })
    }
}
