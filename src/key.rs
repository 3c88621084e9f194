//! Internal key model.
//!
//! An [`InternalKey`] packs a user key together with a sequence number
//! and a value-type tag into the on-disk trailer format used
//! throughout the engine: memtables, SSTable blocks, and merge
//! iterators all order entries via [`InternalKey`]'s [`Ord`] impl
//! rather than re-deriving the ordering rule in each module.
//!
//! # Wire format
//!
//! `user_key_bytes ++ u64_le(seq << 8 | value_type)`
//!
//! Ordering: ascending by `user_key`, then **descending** by the
//! packed `(seq, value_type)` trailer — so for equal user keys, the
//! newest (highest sequence number) version sorts first.

use crate::encoding::{self, Decode, Encode, EncodingError};
use std::cmp::Ordering;
use std::fmt;

/// Maximum representable sequence number (56 bits).
pub const MAX_SEQUENCE: u64 = (1u64 << 56) - 1;

const TRAILER_LEN: usize = 8;

/// Tag identifying the kind of value an internal key's trailer carries.
///
/// Exact numeric values are part of the on-disk format and must never
/// change.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash)]
#[repr(u8)]
pub enum ValueType {
    Deletion = 0x0,
    Value = 0x1,
    Merge = 0x2,
    SingleDeletion = 0x7,
    RangeDeletion = 0xF,
    BlobIndex = 0x11,
    DeletionWithTimestamp = 0x14,
    WideColumnEntity = 0x16,
    ValuePreferredSeqno = 0x18,
}

impl ValueType {
    /// Decodes a raw tag byte into a [`ValueType`].
    pub fn from_u8(tag: u8) -> Result<Self, EncodingError> {
        match tag {
            0x0 => Ok(ValueType::Deletion),
            0x1 => Ok(ValueType::Value),
            0x2 => Ok(ValueType::Merge),
            0x7 => Ok(ValueType::SingleDeletion),
            0xF => Ok(ValueType::RangeDeletion),
            0x11 => Ok(ValueType::BlobIndex),
            0x14 => Ok(ValueType::DeletionWithTimestamp),
            0x16 => Ok(ValueType::WideColumnEntity),
            0x18 => Ok(ValueType::ValuePreferredSeqno),
            other => Err(EncodingError::InvalidTag {
                tag: other as u32,
                type_name: "ValueType",
            }),
        }
    }

    /// Whether this tag represents a deletion of some form (point,
    /// single, range, or timestamped).
    pub fn is_deletion(self) -> bool {
        matches!(
            self,
            ValueType::Deletion
                | ValueType::SingleDeletion
                | ValueType::RangeDeletion
                | ValueType::DeletionWithTimestamp
        )
    }
}

/// A packed `user_key ++ seq/type trailer`, the unit of ordering
/// throughout the storage engine.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct InternalKey {
    bytes: Vec<u8>,
}

impl InternalKey {
    /// Packs a user key, sequence number and value type into a new
    /// [`InternalKey`].
    ///
    /// `seq` is truncated to 56 bits; callers must ensure it does not
    /// exceed [`MAX_SEQUENCE`] (enforced by the engine's sequence
    /// allocator, not re-checked here to keep this a pure constructor).
    pub fn new(user_key: &[u8], seq: u64, value_type: ValueType) -> Self {
        let mut bytes = Vec::with_capacity(user_key.len() + TRAILER_LEN);
        bytes.extend_from_slice(user_key);
        let trailer = pack_trailer(seq, value_type as u8);
        bytes.extend_from_slice(&trailer.to_le_bytes());
        Self { bytes }
    }

    /// Wraps raw `user_key ++ trailer` bytes without re-validating the
    /// trailer's value-type tag. Used when reading already-encoded
    /// bytes off disk.
    pub fn from_raw(bytes: Vec<u8>) -> Result<Self, EncodingError> {
        if bytes.len() < TRAILER_LEN {
            return Err(EncodingError::UnexpectedEof {
                needed: TRAILER_LEN,
                available: bytes.len(),
            });
        }
        // Validate that the tag is one we recognise.
        let trailer = u64::from_le_bytes(
            bytes[bytes.len() - TRAILER_LEN..]
                .try_into()
                .map_err(|_| EncodingError::Custom("internal key trailer slice".into()))?,
        );
        ValueType::from_u8((trailer & 0xFF) as u8)?;
        Ok(Self { bytes })
    }

    /// The maximum possible internal key for a given user key —
    /// sorts before any real entry with that user key (sequence 0,
    /// lowest-ranked tag), useful as an exclusive scan upper bound.
    pub fn max_for_user_key(user_key: &[u8]) -> Self {
        InternalKey::new(user_key, MAX_SEQUENCE, ValueType::ValuePreferredSeqno)
    }

    /// The minimum possible internal key for a given user key —
    /// sorts after any real entry with that user key.
    pub fn min_for_user_key(user_key: &[u8]) -> Self {
        InternalKey::new(user_key, 0, ValueType::Deletion)
    }

    /// Returns the user-key portion (without the trailer).
    pub fn user_key(&self) -> &[u8] {
        &self.bytes[..self.bytes.len() - TRAILER_LEN]
    }

    /// Returns the packed trailer as a raw `u64`.
    pub fn trailer(&self) -> u64 {
        u64::from_le_bytes(self.bytes[self.bytes.len() - TRAILER_LEN..].try_into().unwrap_or([0; 8]))
    }

    /// Returns the sequence number encoded in the trailer.
    pub fn seq(&self) -> u64 {
        self.trailer() >> 8
    }

    /// Returns the value type encoded in the trailer.
    ///
    /// # Panics
    /// Never — the tag is validated at construction/decode time, so an
    /// invalid tag here indicates memory corruption rather than a
    /// reachable runtime condition; we fall back to `Deletion` rather
    /// than panicking.
    pub fn value_type(&self) -> ValueType {
        ValueType::from_u8((self.trailer() & 0xFF) as u8).unwrap_or(ValueType::Deletion)
    }

    /// Total encoded length in bytes.
    pub fn len(&self) -> usize {
        self.bytes.len()
    }

    pub fn is_empty(&self) -> bool {
        self.bytes.is_empty()
    }

    /// Raw encoded bytes (`user_key ++ trailer`).
    pub fn as_bytes(&self) -> &[u8] {
        &self.bytes
    }

    pub fn into_bytes(self) -> Vec<u8> {
        self.bytes
    }
}

impl fmt::Display for InternalKey {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(
            f,
            "{:02x?}@{}:{:?}",
            self.user_key(),
            self.seq(),
            self.value_type()
        )
    }
}

fn pack_trailer(seq: u64, tag: u8) -> u64 {
    ((seq & MAX_SEQUENCE) << 8) | tag as u64
}

/// The canonical comparator: ascending by user key, then descending by
/// `(seq, value_type)`.
pub struct InternalKeyComparator;

impl InternalKeyComparator {
    pub fn compare(a: &InternalKey, b: &InternalKey) -> Ordering {
        match a.user_key().cmp(b.user_key()) {
            Ordering::Equal => b.trailer().cmp(&a.trailer()),
            other => other,
        }
    }

    /// Compares raw encoded internal-key byte slices directly, without
    /// constructing [`InternalKey`] values. Used by block builders and
    /// binary search over on-disk bytes.
    pub fn compare_bytes(a: &[u8], b: &[u8]) -> Ordering {
        let (a_user, a_trailer) = split_raw(a);
        let (b_user, b_trailer) = split_raw(b);
        match a_user.cmp(b_user) {
            Ordering::Equal => b_trailer.cmp(&a_trailer),
            other => other,
        }
    }
}

fn split_raw(buf: &[u8]) -> (&[u8], u64) {
    if buf.len() < TRAILER_LEN {
        return (buf, 0);
    }
    let (user, trailer_bytes) = buf.split_at(buf.len() - TRAILER_LEN);
    let trailer = u64::from_le_bytes(trailer_bytes.try_into().unwrap_or([0; 8]));
    (user, trailer)
}

impl PartialOrd for InternalKey {
    fn partial_cmp(&self, other: &Self) -> Option<Ordering> {
        Some(self.cmp(other))
    }
}

impl Ord for InternalKey {
    fn cmp(&self, other: &Self) -> Ordering {
        InternalKeyComparator::compare(self, other)
    }
}

impl Encode for InternalKey {
    fn encode_to(&self, buf: &mut Vec<u8>) -> Result<(), EncodingError> {
        self.bytes.encode_to(buf)
    }
}

impl Decode for InternalKey {
    fn decode_from(buf: &[u8]) -> Result<(Self, usize), EncodingError> {
        let (bytes, consumed) = Vec::<u8>::decode_from(buf)?;
        Ok((InternalKey::from_raw(bytes)?, consumed))
    }
}

/// A range tombstone over `[start, end)` user keys at a given sequence
/// number — logically deletes every key in the range with a lower
/// sequence number.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RangeTombstone {
    pub start: Vec<u8>,
    pub end: Vec<u8>,
    pub seq: u64,
    pub timestamp: u64,
}

impl RangeTombstone {
    pub fn covers(&self, user_key: &[u8], seq: u64) -> bool {
        self.start.as_slice() <= user_key && user_key < self.end.as_slice() && seq < self.seq
    }
}

impl Encode for RangeTombstone {
    fn encode_to(&self, buf: &mut Vec<u8>) -> Result<(), EncodingError> {
        self.start.encode_to(buf)?;
        self.end.encode_to(buf)?;
        self.seq.encode_to(buf)?;
        self.timestamp.encode_to(buf)?;
        Ok(())
    }
}

impl Decode for RangeTombstone {
    fn decode_from(buf: &[u8]) -> Result<(Self, usize), EncodingError> {
        let mut offset = 0;
        let (start, n) = Vec::<u8>::decode_from(&buf[offset..])?;
        offset += n;
        let (end, n) = Vec::<u8>::decode_from(&buf[offset..])?;
        offset += n;
        let (seq, n) = u64::decode_from(&buf[offset..])?;
        offset += n;
        let (timestamp, n) = u64::decode_from(&buf[offset..])?;
        offset += n;
        Ok((
            Self {
                start,
                end,
                seq,
                timestamp,
            },
            offset,
        ))
    }
}
