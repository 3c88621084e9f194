//! Write-Ahead Logging (WAL) Module
//!
//! Implements a **durable**, **append-only**, and **generic** Write-Ahead
//! Log suitable for embedded databases and key-value storage engines.
//!
//! ## On-disk layout
//!
//! The log is a header followed by a sequence of fixed-size 32 KiB
//! blocks. Each block holds zero or more **fragments**:
//!
//! ```text
//! [HEADER_BYTES][HEADER_CRC32C_LE]
//! block 0: [frag][frag]...[zero padding if < 7 bytes remain]
//! block 1: [frag][frag]...
//! ...
//! ```
//!
//! Each fragment is `[crc32c:u32 LE][length:u16 LE][type:u8][payload]`.
//! The checksum covers `type || payload`, not the length field. A
//! logical record that fits in the remaining space of the current
//! block is written as one `Full` fragment; a record that doesn't fit
//! is split across block boundaries as `First, Middle*, Last`.
//!
//! ## Concurrency model
//!
//! WAL access is synchronized via `Arc<Mutex<File>>`. [`WalIter`] tracks
//! its own logical offset, seeking before each read so it can be driven
//! independently of concurrent appenders.
//!
//! ## Guarantees
//!
//! - **Durability:** every `append()` is followed by `File::sync_all`.
//! - **Integrity:** fragment, header checksums are verified on replay.
//! - **Corruption detection:** strict replay aborts at the first bad
//!   fragment; tolerant replay (used for crash recovery) stops cleanly
//!   at a torn tail write instead of losing everything before it.

#[cfg(test)]
mod tests;

use std::{
    fs::{File, OpenOptions},
    io::{self, Read, Seek, SeekFrom, Write},
    path::{Path, PathBuf},
    sync::{Arc, Mutex},
};

use crate::checksum;
use crate::encoding::{self, EncodingError};
use std::ffi::OsStr;
use thiserror::Error;
use tracing::{debug, error, info, trace, warn};

const U32_SIZE: usize = std::mem::size_of::<u32>();

/// Size of a physical WAL block. Records are fragmented across block
/// boundaries so that a torn write never corrupts more than one block.
pub const WAL_BLOCK_SIZE: usize = 32 * 1024;

/// On-disk size of a fragment header: `crc32c(4) | length:u16(2) | type:u8(1)`.
pub const FRAGMENT_HEADER_SIZE: usize = 7;

// ------------------------------------------------------------------------------------------------
// Error Types
// ------------------------------------------------------------------------------------------------

/// Errors returned by WAL operations.
#[derive(Debug, Error)]
#[non_exhaustive]
pub enum WalError {
    /// Underlying I/O error.
    #[error("I/O error: {0}")]
    Io(#[from] io::Error),

    /// Encoding / decoding error.
    #[error("Encoding error: {0}")]
    Encoding(#[from] EncodingError),

    /// A fragment, record, or header checksum did not match.
    #[error("checksum mismatch")]
    ChecksumMismatch,

    /// Fragments arrived out of the expected First/Middle/Last sequence.
    #[error("corrupted fragment sequence: {0}")]
    Corruption(String),

    /// Record exceeds the configured maximum size.
    #[error("record size exceeds limit ({0} bytes)")]
    RecordTooLarge(usize),

    /// Unexpected end-of-file during read.
    #[error("unexpected end of file")]
    UnexpectedEof,

    /// WAL header failed integrity validation.
    #[error("invalid header: {0}")]
    InvalidHeader(String),

    /// Internal consistency or locking error.
    #[error("internal error: {0}")]
    Internal(String),
}

// ------------------------------------------------------------------------------------------------
// Header
// ------------------------------------------------------------------------------------------------

/// Metadata written at the start of the WAL file, followed by a
/// CRC32C checksum over the header bytes.
#[derive(Debug)]
pub struct WalHeader {
    magic: [u8; 4],
    version: u32,
    max_record_size: u32,
    wal_seq: u64,
}

impl WalHeader {
    pub const MAGIC: [u8; 4] = *b"LKWL";
    pub const VERSION: u32 = 1;
    pub const DEFAULT_MAX_RECORD_SIZE: u32 = 1024 * 1024;

    pub fn new(max_record_size: u32, wal_seq: u64) -> Self {
        Self {
            magic: Self::MAGIC,
            version: Self::VERSION,
            max_record_size,
            wal_seq,
        }
    }

    /// Encoded size of the header in bytes (without the trailing CRC).
    pub const ENCODED_SIZE: usize = 4 + 4 + 4 + 8;

    /// Total on-disk size of the header including its trailing CRC32C.
    pub const HEADER_DISK_SIZE: usize = Self::ENCODED_SIZE + U32_SIZE;

    pub fn wal_seq(&self) -> u64 {
        self.wal_seq
    }

    pub fn max_record_size(&self) -> u32 {
        self.max_record_size
    }

    pub fn version(&self) -> u32 {
        self.version
    }
}

impl encoding::Encode for WalHeader {
    fn encode_to(&self, buf: &mut Vec<u8>) -> Result<(), EncodingError> {
        encoding::Encode::encode_to(&self.magic, buf)?;
        encoding::Encode::encode_to(&self.version, buf)?;
        encoding::Encode::encode_to(&self.max_record_size, buf)?;
        encoding::Encode::encode_to(&self.wal_seq, buf)?;
        Ok(())
    }
}

impl encoding::Decode for WalHeader {
    fn decode_from(buf: &[u8]) -> Result<(Self, usize), EncodingError> {
        let mut offset = 0;
        let (magic, n) = <[u8; 4]>::decode_from(&buf[offset..])?;
        offset += n;
        let (version, n) = u32::decode_from(&buf[offset..])?;
        offset += n;
        let (max_record_size, n) = u32::decode_from(&buf[offset..])?;
        offset += n;
        let (wal_seq, n) = u64::decode_from(&buf[offset..])?;
        offset += n;
        Ok((
            Self {
                magic,
                version,
                max_record_size,
                wal_seq,
            },
            offset,
        ))
    }
}

// ------------------------------------------------------------------------------------------------
// Fragment framing
// ------------------------------------------------------------------------------------------------

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum FragmentType {
    Full = 1,
    First = 2,
    Middle = 3,
    Last = 4,
}

impl FragmentType {
    fn from_u8(b: u8) -> Option<Self> {
        match b {
            1 => Some(FragmentType::Full),
            2 => Some(FragmentType::First),
            3 => Some(FragmentType::Middle),
            4 => Some(FragmentType::Last),
            _ => None,
        }
    }
}

// ------------------------------------------------------------------------------------------------
// Traits
// ------------------------------------------------------------------------------------------------

/// Trait for data types that can be written to and read from the WAL.
pub trait WalData: encoding::Encode + encoding::Decode + std::fmt::Debug + Send + Sync {}
impl<T> WalData for T where T: encoding::Encode + encoding::Decode + std::fmt::Debug + Send + Sync {}

// ------------------------------------------------------------------------------------------------
// WAL Core
// ------------------------------------------------------------------------------------------------

/// A generic, thread-safe, block/fragment-framed Write-Ahead Log.
#[derive(Debug)]
pub struct Wal<T: WalData> {
    inner_file: Arc<Mutex<File>>,
    path: PathBuf,
    header: WalHeader,
    /// Byte offset within the current 32 KiB block, relative to the
    /// start of the block region (right after the header).
    block_pos: usize,
    _phantom: std::marker::PhantomData<T>,
}

impl<T: WalData> Wal<T> {
    /// Opens or creates a WAL file at `path`.
    ///
    /// The filename must match `<nnnnnn>.log` (six zero-padded digits)
    /// so the segment sequence number can be recovered from the path
    /// alone.
    pub fn open<P: AsRef<Path>>(path: P, max_record_size: Option<u32>) -> Result<Self, WalError> {
        let path_ref = path.as_ref();
        let mut file = OpenOptions::new()
            .create(true)
            .read(true)
            .append(true)
            .open(path_ref)?;

        let wal_seq = Self::parse_seq_from_path(path_ref)
            .ok_or_else(|| WalError::Internal("WAL filename must be <nnnnnn>.log".into()))?;

        let file_len = file.metadata()?.len();
        let header = if file_len == 0 {
            let header = WalHeader::new(
                max_record_size.unwrap_or(WalHeader::DEFAULT_MAX_RECORD_SIZE),
                wal_seq,
            );
            write_header(&mut file, &header)?;
            file.sync_all()?;
            info!(path = %path_ref.display(), seq = wal_seq, "WAL created with new header");
            header
        } else {
            file.seek(SeekFrom::Start(0))?;
            let header = read_and_validate_header(&mut file)?;
            if header.wal_seq != wal_seq {
                return Err(WalError::InvalidHeader("sequence number mismatch".into()));
            }
            debug!(
                path = %path_ref.display(),
                max_record_size = header.max_record_size,
                seq = header.wal_seq,
                "WAL header validated"
            );
            header
        };

        let data_len = file_len.saturating_sub(WalHeader::HEADER_DISK_SIZE as u64);
        let block_pos = (data_len % WAL_BLOCK_SIZE as u64) as usize;

        info!(path = %path_ref.display(), seq = header.wal_seq, "WAL opened");

        Ok(Self {
            inner_file: Arc::new(Mutex::new(file)),
            path: path_ref.to_path_buf(),
            header,
            block_pos,
            _phantom: std::marker::PhantomData,
        })
    }

    /// Parses `wal_seq` from a filename matching `<nnnnnn>.log`.
    fn parse_seq_from_path(path: &Path) -> Option<u64> {
        let name = path.file_name().and_then(OsStr::to_str)?;
        let seq_str = name.strip_suffix(".log")?;
        seq_str.parse::<u64>().ok()
    }

    /// Appends a single logical record to the WAL, fragmenting it
    /// across block boundaries as needed.
    pub fn append(&mut self, record: &T) -> Result<(), WalError> {
        let payload = encoding::encode_to_vec(record)?;
        if payload.len() > self.header.max_record_size as usize {
            return Err(WalError::RecordTooLarge(payload.len()));
        }

        let mut guard = self
            .inner_file
            .lock()
            .map_err(|_| WalError::Internal("mutex poisoned".into()))?;

        let total = payload.len();
        let mut written = 0usize;
        let mut is_first = true;

        loop {
            let mut space_left = WAL_BLOCK_SIZE - self.block_pos;
            if space_left < FRAGMENT_HEADER_SIZE {
                // Not enough room for another fragment header; pad the
                // remainder of the block with zero bytes and advance.
                let pad = vec![0u8; space_left];
                guard.write_all(&pad)?;
                self.block_pos = 0;
                space_left = WAL_BLOCK_SIZE;
            }

            let avail_payload = space_left - FRAGMENT_HEADER_SIZE;
            let remaining = total - written;
            let frag_len = remaining.min(avail_payload);
            let is_last_fragment = written + frag_len == total;

            let frag_type = match (is_first, is_last_fragment) {
                (true, true) => FragmentType::Full,
                (true, false) => FragmentType::First,
                (false, true) => FragmentType::Last,
                (false, false) => FragmentType::Middle,
            };

            let chunk = &payload[written..written + frag_len];
            let crc = checksum::masked_crc32c(&[&[frag_type as u8], chunk]);

            let mut header_bytes = Vec::with_capacity(FRAGMENT_HEADER_SIZE);
            header_bytes.extend_from_slice(&crc.to_le_bytes());
            header_bytes.extend_from_slice(&(frag_len as u16).to_le_bytes());
            header_bytes.push(frag_type as u8);

            guard.write_all(&header_bytes)?;
            guard.write_all(chunk)?;

            self.block_pos += FRAGMENT_HEADER_SIZE + frag_len;
            written += frag_len;
            is_first = false;

            if written >= total {
                break;
            }
        }

        guard.sync_all()?;

        trace!(len = total, "WAL record appended");
        Ok(())
    }

    /// Returns an iterator that replays all records from the WAL in
    /// **tolerant** mode: a checksum failure or truncated tail stops
    /// replay cleanly instead of propagating an error, which is the
    /// correct posture for crash recovery.
    pub fn replay_iter(&self) -> Result<WalIter<T>, WalError> {
        debug!(path = %self.path.display(), "WAL replay started (tolerant)");
        Ok(WalIter::new(
            Arc::clone(&self.inner_file),
            self.header.max_record_size as usize,
            false,
        ))
    }

    /// Returns an iterator that replays the WAL in **strict** mode: any
    /// checksum mismatch or malformed fragment sequence is a hard
    /// error. Used when the caller needs torn-write detection rather
    /// than best-effort recovery.
    pub fn replay_iter_strict(&self) -> Result<WalIter<T>, WalError> {
        debug!(path = %self.path.display(), "WAL replay started (strict)");
        Ok(WalIter::new(
            Arc::clone(&self.inner_file),
            self.header.max_record_size as usize,
            true,
        ))
    }

    /// Truncates the WAL back to header-only and resets block framing.
    pub fn truncate(&mut self) -> Result<(), WalError> {
        let mut guard = self
            .inner_file
            .lock()
            .map_err(|_| WalError::Internal("mutex poisoned".into()))?;

        guard.set_len(0)?;
        guard.seek(SeekFrom::Start(0))?;
        write_header(&mut *guard, &self.header)?;
        guard.sync_all()?;
        drop(guard);

        self.block_pos = 0;

        info!(path = %self.path.display(), "WAL truncated");
        Ok(())
    }

    /// Rotates to a new WAL segment with the given sequence number.
    ///
    /// Syncs the current segment, opens a fresh `<nnnnnn>.log` file in
    /// the same directory, and replaces `self` with it. Returns the
    /// new sequence number.
    pub fn rotate_to(&mut self, next_seq: u64) -> Result<u64, WalError> {
        {
            let guard = self
                .inner_file
                .lock()
                .map_err(|_| WalError::Internal("mutex poisoned".into()))?;
            guard.sync_all()?;
        }

        let dir = self.path.parent().unwrap_or_else(|| Path::new("."));
        let next_path = dir.join(format!("{next_seq:06}.log"));

        let new_wal = Wal::<T>::open(&next_path, Some(self.header.max_record_size))?;
        *self = new_wal;

        Ok(next_seq)
    }

    pub fn path(&self) -> &Path {
        &self.path
    }

    pub fn wal_seq(&self) -> u64 {
        self.header.wal_seq
    }

    pub fn max_record_size(&self) -> u32 {
        self.header.max_record_size
    }

    pub fn file_size(&self) -> Result<u64, WalError> {
        let guard = self
            .inner_file
            .lock()
            .map_err(|_| WalError::Internal("mutex poisoned".into()))?;
        Ok(guard.metadata()?.len())
    }
}

impl<T: WalData> Drop for Wal<T> {
    fn drop(&mut self) {
        match self.inner_file.lock() {
            Ok(guard) => {
                if let Err(e) = guard.sync_all() {
                    error!(path = %self.path.display(), error = %e, "WAL sync failed on drop");
                }
            }
            Err(poisoned) => {
                let file = poisoned.into_inner();
                if let Err(e) = file.sync_all() {
                    error!(path = %self.path.display(), error = %e, "WAL sync failed on drop (poisoned lock)");
                } else {
                    warn!(path = %self.path.display(), "WAL recovered and synced after poisoned lock");
                }
            }
        }
    }
}

// ------------------------------------------------------------------------------------------------
// WalIter
// ------------------------------------------------------------------------------------------------

/// Streaming, fragment-reassembling WAL replay iterator.
pub struct WalIter<T: WalData> {
    file: Arc<Mutex<File>>,
    /// Absolute file offset of the next byte to read.
    pos: u64,
    max_record_size: usize,
    strict: bool,
    /// Bytes accumulated from a First/Middle run, awaiting Last.
    partial: Vec<u8>,
    in_progress: bool,
    finished: bool,
    _phantom: std::marker::PhantomData<T>,
}

impl<T: WalData> WalIter<T> {
    fn new(file: Arc<Mutex<File>>, max_record_size: usize, strict: bool) -> Self {
        Self {
            file,
            pos: WalHeader::HEADER_DISK_SIZE as u64,
            max_record_size,
            strict,
            partial: Vec::new(),
            in_progress: false,
            finished: false,
            _phantom: std::marker::PhantomData,
        }
    }

    /// Bytes remaining in the current 32 KiB block before a fragment
    /// header would cross the boundary.
    fn remaining_in_block(&self) -> usize {
        let data_pos = self.pos - WalHeader::HEADER_DISK_SIZE as u64;
        WAL_BLOCK_SIZE - (data_pos % WAL_BLOCK_SIZE as u64) as usize
    }

    fn skip_to_next_block(&mut self) {
        self.pos += self.remaining_in_block() as u64;
    }

    fn read_fragment(
        &mut self,
        guard: &mut std::sync::MutexGuard<'_, File>,
    ) -> Result<Option<(FragmentType, Vec<u8>)>, WalError> {
        if self.remaining_in_block() < FRAGMENT_HEADER_SIZE {
            self.skip_to_next_block();
        }

        guard.seek(SeekFrom::Start(self.pos))?;

        let mut header_buf = [0u8; FRAGMENT_HEADER_SIZE];
        match read_exact_or_eof(&mut *guard, &mut header_buf)? {
            ReadOutcome::Eof => return Ok(None),
            ReadOutcome::Partial(n) => {
                if self.strict {
                    return Err(WalError::Corruption("truncated fragment header".into()));
                }
                trace!(got = n, "WAL tolerant replay: truncated fragment header, stopping");
                return Ok(None);
            }
            ReadOutcome::Full => {}
        }

        let crc = u32::from_le_bytes(header_buf[0..4].try_into().unwrap_or([0; 4]));
        let len = u16::from_le_bytes(header_buf[4..6].try_into().unwrap_or([0; 2])) as usize;
        let raw_type = header_buf[6];

        let frag_type = match FragmentType::from_u8(raw_type) {
            Some(t) => t,
            None => {
                if self.strict {
                    return Err(WalError::Corruption(format!(
                        "unknown fragment type {raw_type}"
                    )));
                }
                warn!(raw_type, "WAL tolerant replay: unknown fragment type, stopping");
                return Ok(None);
            }
        };

        if len > self.max_record_size {
            return Err(WalError::RecordTooLarge(len));
        }

        let mut payload = vec![0u8; len];
        match read_exact_or_eof(&mut *guard, &mut payload)? {
            ReadOutcome::Eof | ReadOutcome::Partial(_) => {
                if self.strict {
                    return Err(WalError::UnexpectedEof);
                }
                warn!("WAL tolerant replay: truncated fragment payload, stopping");
                return Ok(None);
            }
            ReadOutcome::Full => {}
        }

        if !checksum::verify_masked(&[&[raw_type], &payload], crc) {
            if self.strict {
                return Err(WalError::ChecksumMismatch);
            }
            warn!("WAL tolerant replay: fragment checksum mismatch, stopping");
            return Ok(None);
        }

        self.pos += (FRAGMENT_HEADER_SIZE + len) as u64;

        Ok(Some((frag_type, payload)))
    }
}

#[derive(Debug)]
enum ReadOutcome {
    Full,
    Partial(usize),
    Eof,
}

fn read_exact_or_eof<R: Read>(reader: &mut R, buf: &mut [u8]) -> io::Result<ReadOutcome> {
    let mut total = 0;
    while total < buf.len() {
        match reader.read(&mut buf[total..]) {
            Ok(0) => break,
            Ok(n) => total += n,
            Err(e) if e.kind() == io::ErrorKind::Interrupted => continue,
            Err(e) => return Err(e),
        }
    }
    if total == buf.len() {
        Ok(ReadOutcome::Full)
    } else if total == 0 {
        Ok(ReadOutcome::Eof)
    } else {
        Ok(ReadOutcome::Partial(total))
    }
}

impl<T: WalData> std::fmt::Debug for WalIter<T> {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("WalIter")
            .field("pos", &self.pos)
            .field("strict", &self.strict)
            .finish_non_exhaustive()
    }
}

impl<T: WalData> Iterator for WalIter<T> {
    type Item = Result<T, WalError>;

    fn next(&mut self) -> Option<Self::Item> {
        if self.finished {
            return None;
        }

        loop {
            let mut guard = match self.file.lock() {
                Ok(g) => g,
                Err(_) => {
                    self.finished = true;
                    return Some(Err(WalError::Internal("mutex poisoned".into())));
                }
            };

            let fragment = match self.read_fragment(&mut guard) {
                Ok(Some(f)) => f,
                Ok(None) => {
                    self.finished = true;
                    return None;
                }
                Err(e) => {
                    self.finished = true;
                    return Some(Err(e));
                }
            };
            drop(guard);

            let (frag_type, payload) = fragment;

            match frag_type {
                FragmentType::Full => {
                    if self.in_progress {
                        self.finished = true;
                        return Some(Err(WalError::Corruption(
                            "Full fragment while a record was in progress".into(),
                        )));
                    }
                    return Some(decode_record::<T>(&payload));
                }
                FragmentType::First => {
                    if self.in_progress {
                        self.finished = true;
                        return Some(Err(WalError::Corruption(
                            "First fragment while a record was already in progress".into(),
                        )));
                    }
                    self.partial = payload;
                    self.in_progress = true;
                }
                FragmentType::Middle => {
                    if !self.in_progress {
                        self.finished = true;
                        return Some(Err(WalError::Corruption(
                            "Middle fragment without a preceding First".into(),
                        )));
                    }
                    self.partial.extend_from_slice(&payload);
                }
                FragmentType::Last => {
                    if !self.in_progress {
                        self.finished = true;
                        return Some(Err(WalError::Corruption(
                            "Last fragment without a preceding First".into(),
                        )));
                    }
                    self.partial.extend_from_slice(&payload);
                    self.in_progress = false;
                    let record = std::mem::take(&mut self.partial);
                    return Some(decode_record::<T>(&record));
                }
            }
        }
    }
}

fn decode_record<T: WalData>(bytes: &[u8]) -> Result<T, WalError> {
    let (record, _) = encoding::decode_from_slice::<T>(bytes)?;
    Ok(record)
}

// ------------------------------------------------------------------------------------------------
// Header I/O helpers
// ------------------------------------------------------------------------------------------------

fn write_header<W: Write>(writer: &mut W, header: &WalHeader) -> Result<(), WalError> {
    let header_bytes = encoding::encode_to_vec(header)?;
    let checksum = checksum::masked_crc32c(&[&header_bytes]);

    writer.write_all(&header_bytes)?;
    writer.write_all(&checksum.to_le_bytes())?;

    Ok(())
}

fn read_and_validate_header<R: Read>(reader: &mut R) -> Result<WalHeader, WalError> {
    let mut header_bytes = vec![0u8; WalHeader::ENCODED_SIZE];
    reader.read_exact(&mut header_bytes)?;

    let mut checksum_bytes = [0u8; U32_SIZE];
    reader.read_exact(&mut checksum_bytes)?;
    let stored_checksum = u32::from_le_bytes(checksum_bytes);

    if !checksum::verify_masked(&[&header_bytes], stored_checksum) {
        return Err(WalError::InvalidHeader("header checksum mismatch".into()));
    }

    let (header, _) = encoding::decode_from_slice::<WalHeader>(&header_bytes)?;

    if header.magic != WalHeader::MAGIC {
        return Err(WalError::InvalidHeader("bad magic".into()));
    }
    if header.version != WalHeader::VERSION {
        return Err(WalError::InvalidHeader(format!(
            "unsupported version {}",
            header.version
        )));
    }

    Ok(header)
}
