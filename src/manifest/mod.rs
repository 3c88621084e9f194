//! # Manifest Component
//!
//! The **Manifest** is the central metadata authority for the LSM storage
//! engine. It tracks the engine's durable state: the current [`Version`]
//! (the per-level listing of live SSTable files), the next file number to
//! allocate, the last assigned global sequence number, and the active WAL
//! segment ("log number").
//!
//! ## On-disk layout
//!
//! - `CURRENT` — a text file, ending in `\n`, naming the active
//!   `MANIFEST-<nnnnnn>` file.
//! - `MANIFEST-<nnnnnn>` — an append-only log of encoded [`VersionEdit`]s,
//!   using the crate's own [`Wal`] framing as its durability substrate (the
//!   manifest is, in effect, a miniature WAL-driven metadata database).
//!
//! ## Install protocol
//!
//! Installing a new version from a [`VersionEdit`]:
//!
//! 1. Acquire the manifest mutex.
//! 2. Compute the new [`Version`] by applying the edit to the current
//!    version's per-level file lists.
//! 3. Append the encoded edit to the current `MANIFEST-<nnnnnn>` file and
//!    fsync it.
//! 4. If this is the first edit written after a rollover, atomically swap
//!    `CURRENT` to point at the new manifest file (write-tmp, rename,
//!    fsync the containing directory).
//! 5. Swap the in-memory "current version" pointer.
//! 6. Release the manifest mutex.
//!
//! Manifest rollover (starting a fresh `MANIFEST-<nnnnnn>` file instead of
//! appending forever) happens once the current manifest file exceeds
//! [`MANIFEST_ROLLOVER_SIZE`] bytes. Rollover writes a single "snapshot"
//! edit describing every live file in the current version, so the new
//! manifest file is self-contained and can be replayed without consulting
//! its predecessor.
//!
//! A `Version` is an immutable, reference-counted snapshot: readers clone
//! the `Arc<Version>` they need and release it on drop. The crate relies on
//! `Arc`'s own strong count for this rather than a hand-rolled counter —
//! once no reader and no longer "current" hold a reference, its files
//! become eligible for deletion by the engine's obsolete-file sweep.


use crate::encoding::{self, EncodingError};
use crate::wal::{Wal, WalError};
use std::{
    fs::{self, File, OpenOptions},
    io::{Read, Write, self},
    path::{Path, PathBuf},
    sync::{Arc, Mutex},
};
use thiserror::Error;
use tracing::{info, warn};

/// Manifest file is rolled over once it exceeds this size (bytes).
pub const MANIFEST_ROLLOVER_SIZE: u64 = 4 * 1024 * 1024;

const CURRENT_FILENAME: &str = "CURRENT";
const CURRENT_TMP_SUFFIX: &str = ".tmp";

fn manifest_filename(number: u64) -> String {
    format!("MANIFEST-{number:06}")
}

// ------------------------------------------------------------------------------------------------
// Error Types
// ------------------------------------------------------------------------------------------------

/// Errors returned by manifest operations.
#[derive(Debug, Error)]
pub enum ManifestError {
    /// Underlying WAL I/O failure.
    #[error("WAL error: {0}")]
    Wal(#[from] WalError),

    /// Underlying I/O error.
    #[error("I/O error: {0}")]
    Io(#[from] io::Error),

    /// Encoding / decoding error.
    #[error("Encoding error: {0}")]
    Encoding(#[from] EncodingError),

    /// `CURRENT` file is missing, malformed, or names a nonexistent
    /// manifest file.
    #[error("CURRENT file invalid: {0}")]
    InvalidCurrent(String),

    /// Internal invariant violation or poisoned lock.
    #[error("Internal error: {0}")]
    Internal(String),
}

// ------------------------------------------------------------------------------------------------
// FileMetadata
// ------------------------------------------------------------------------------------------------

/// Metadata describing a single live SSTable file tracked by a [`Version`].
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct FileMetadata {
    /// Globally unique file number (also the on-disk filename stem).
    pub number: u64,

    /// File size in bytes.
    pub size: u64,

    /// Smallest encoded internal key contained in the file.
    pub smallest: Vec<u8>,

    /// Largest encoded internal key contained in the file.
    pub largest: Vec<u8>,

    /// LSM level this file belongs to.
    pub level: u32,

    /// Smallest sequence number among the file's entries.
    pub min_seq: u64,

    /// Largest sequence number among the file's entries.
    pub max_seq: u64,
}

impl encoding::Encode for FileMetadata {
    fn encode_to(&self, buf: &mut Vec<u8>) -> Result<(), EncodingError> {
        encoding::Encode::encode_to(&self.number, buf)?;
        encoding::Encode::encode_to(&self.size, buf)?;
        encoding::Encode::encode_to(&self.smallest, buf)?;
        encoding::Encode::encode_to(&self.largest, buf)?;
        encoding::Encode::encode_to(&self.level, buf)?;
        encoding::Encode::encode_to(&self.min_seq, buf)?;
        encoding::Encode::encode_to(&self.max_seq, buf)?;
        Ok(())
    }
}

impl encoding::Decode for FileMetadata {
    fn decode_from(buf: &[u8]) -> Result<(Self, usize), EncodingError> {
        let mut offset = 0;
        let (number, n) = u64::decode_from(&buf[offset..])?;
        offset += n;
        let (size, n) = u64::decode_from(&buf[offset..])?;
        offset += n;
        let (smallest, n) = Vec::<u8>::decode_from(&buf[offset..])?;
        offset += n;
        let (largest, n) = Vec::<u8>::decode_from(&buf[offset..])?;
        offset += n;
        let (level, n) = u32::decode_from(&buf[offset..])?;
        offset += n;
        let (min_seq, n) = u64::decode_from(&buf[offset..])?;
        offset += n;
        let (max_seq, n) = u64::decode_from(&buf[offset..])?;
        offset += n;
        Ok((
            Self {
                number,
                size,
                smallest,
                largest,
                level,
                min_seq,
                max_seq,
            },
            offset,
        ))
    }
}

/// A `(level, file_number)` pair identifying a file to remove from a
/// [`Version`].
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct DeletedFile {
    pub level: u32,
    pub number: u64,
}

impl encoding::Encode for DeletedFile {
    fn encode_to(&self, buf: &mut Vec<u8>) -> Result<(), EncodingError> {
        encoding::Encode::encode_to(&self.level, buf)?;
        encoding::Encode::encode_to(&self.number, buf)?;
        Ok(())
    }
}

impl encoding::Decode for DeletedFile {
    fn decode_from(buf: &[u8]) -> Result<(Self, usize), EncodingError> {
        let mut offset = 0;
        let (level, n) = u32::decode_from(&buf[offset..])?;
        offset += n;
        let (number, n) = u64::decode_from(&buf[offset..])?;
        offset += n;
        Ok((Self { level, number }, offset))
    }
}

// ------------------------------------------------------------------------------------------------
// VersionEdit
// ------------------------------------------------------------------------------------------------

/// A single delta record appended to the active `MANIFEST-<nnnnnn>` file.
///
/// Accumulates every change that moves a [`Version`] forward: newly
/// flushed or compacted files, files made obsolete by compaction, and
/// (optionally) updated bookkeeping counters.
#[derive(Debug, Clone, Default)]
pub struct VersionEdit {
    pub added_files: Vec<FileMetadata>,
    pub deleted_files: Vec<DeletedFile>,
    pub next_file_number: Option<u64>,
    pub last_sequence: Option<u64>,
    pub log_number: Option<u64>,
    pub comparator_name: Option<String>,
}

impl VersionEdit {
    /// Builds the self-contained "snapshot" edit written as the first
    /// record of a freshly rolled-over manifest file: every currently
    /// live file, plus the current bookkeeping counters.
    fn snapshot(version: &Version, next_file_number: u64, last_sequence: u64, log_number: u64) -> Self {
        Self {
            added_files: version.levels.iter().flatten().cloned().collect(),
            deleted_files: Vec::new(),
            next_file_number: Some(next_file_number),
            last_sequence: Some(last_sequence),
            log_number: Some(log_number),
            comparator_name: Some(COMPARATOR_NAME.to_string()),
        }
    }
}

const COMPARATOR_NAME: &str = "aeternusdb.InternalKeyComparator";

impl encoding::Encode for VersionEdit {
    fn encode_to(&self, buf: &mut Vec<u8>) -> Result<(), EncodingError> {
        encoding::encode_vec(&self.added_files, buf)?;
        encoding::encode_vec(&self.deleted_files, buf)?;
        encoding::Encode::encode_to(&self.next_file_number, buf)?;
        encoding::Encode::encode_to(&self.last_sequence, buf)?;
        encoding::Encode::encode_to(&self.log_number, buf)?;
        encoding::Encode::encode_to(&self.comparator_name, buf)?;
        Ok(())
    }
}

impl encoding::Decode for VersionEdit {
    fn decode_from(buf: &[u8]) -> Result<(Self, usize), EncodingError> {
        let mut offset = 0;
        let (added_files, n) = encoding::decode_vec::<FileMetadata>(&buf[offset..])?;
        offset += n;
        let (deleted_files, n) = encoding::decode_vec::<DeletedFile>(&buf[offset..])?;
        offset += n;
        let (next_file_number, n) = Option::<u64>::decode_from(&buf[offset..])?;
        offset += n;
        let (last_sequence, n) = Option::<u64>::decode_from(&buf[offset..])?;
        offset += n;
        let (log_number, n) = Option::<u64>::decode_from(&buf[offset..])?;
        offset += n;
        let (comparator_name, n) = Option::<String>::decode_from(&buf[offset..])?;
        offset += n;
        Ok((
            Self {
                added_files,
                deleted_files,
                next_file_number,
                last_sequence,
                log_number,
                comparator_name,
            },
            offset,
        ))
    }
}

// ------------------------------------------------------------------------------------------------
// Version
// ------------------------------------------------------------------------------------------------

/// An immutable, refcounted snapshot of the complete per-level file
/// listing. `levels[0]` holds L0 files (ordered by recency, may
/// overlap); `levels[n]` for `n >= 1` holds non-overlapping files sorted
/// by `smallest`.
#[derive(Debug, Clone, Default)]
pub struct Version {
    levels: Vec<Vec<FileMetadata>>,
}

impl Version {
    /// Returns the files at the given level, or an empty slice if the
    /// level has never held any files.
    pub fn level(&self, level: u32) -> &[FileMetadata] {
        self.levels
            .get(level as usize)
            .map(Vec::as_slice)
            .unwrap_or(&[])
    }

    /// Returns the number of levels with at least one file tracked
    /// (levels may be sparse at the tail; this is `highest_nonempty + 1`,
    /// or 0 if the version is empty).
    pub fn num_levels(&self) -> usize {
        self.levels.len()
    }

    /// Iterates over every live file across all levels.
    pub fn all_files(&self) -> impl Iterator<Item = &FileMetadata> {
        self.levels.iter().flatten()
    }

    /// Applies a [`VersionEdit`] and returns the resulting new `Version`.
    /// Does not mutate `self` — versions are immutable once published.
    fn apply(&self, edit: &VersionEdit) -> Self {
        let mut levels = self.levels.clone();

        for del in &edit.deleted_files {
            if let Some(files) = levels.get_mut(del.level as usize) {
                files.retain(|f| f.number != del.number);
            }
        }

        for file in &edit.added_files {
            let level = file.level as usize;
            if levels.len() <= level {
                levels.resize(level + 1, Vec::new());
            }
            if !levels[level].iter().any(|f| f.number == file.number) {
                levels[level].push(file.clone());
            }
        }

        // Level >= 1 files are kept sorted by smallest key; L0 keeps
        // insertion order (newest last) since its files may overlap.
        for (level, files) in levels.iter_mut().enumerate() {
            if level >= 1 {
                files.sort_by(|a, b| a.smallest.cmp(&b.smallest));
            }
        }

        Self { levels }
    }
}

// ------------------------------------------------------------------------------------------------
// Manifest core
// ------------------------------------------------------------------------------------------------

/// Mutable bookkeeping state guarded by the manifest mutex.
struct ManifestState {
    current: Arc<Version>,
    next_file_number: u64,
    last_sequence: u64,
    log_number: u64,
    manifest_file_number: u64,
    wal: Wal<VersionEdit>,
}

/// Persistent metadata manager of the LSM engine: tracks the current
/// [`Version`], allocates file numbers and sequence numbers, and commits
/// [`VersionEdit`]s durably via `MANIFEST-<nnnnnn>` + `CURRENT`.
pub struct Manifest {
    /// Path to the engine root directory.
    dir: PathBuf,

    state: Mutex<ManifestState>,
}

impl std::fmt::Debug for Manifest {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Manifest").field("dir", &self.dir).finish()
    }
}

impl Manifest {
    /// Opens (or bootstraps) the manifest rooted at `dir`.
    ///
    /// If `CURRENT` exists, replays the named `MANIFEST-<nnnnnn>` file to
    /// reconstruct the latest `Version` and counters. Otherwise bootstraps
    /// a fresh `MANIFEST-000001` + `CURRENT` pair describing an empty
    /// version.
    pub fn open(dir: impl AsRef<Path>) -> Result<Self, ManifestError> {
        let dir = dir.as_ref().to_path_buf();
        fs::create_dir_all(&dir)?;

        let current_path = dir.join(CURRENT_FILENAME);

        if !current_path.exists() {
            return Self::bootstrap(dir);
        }

        let manifest_file_number = Self::read_current(&current_path)?;
        let manifest_path = dir.join(manifest_filename(manifest_file_number));
        if !manifest_path.exists() {
            return Err(ManifestError::InvalidCurrent(format!(
                "CURRENT names {:?} which does not exist",
                manifest_path
            )));
        }

        let wal = Wal::<VersionEdit>::open(&manifest_path, None)?;
        let (version, next_file_number, last_sequence, log_number) = Self::replay(&wal)?;

        info!(
            dir = %dir.display(),
            manifest = manifest_file_number,
            files = version.all_files().count(),
            "manifest opened"
        );

        Ok(Self {
            dir,
            state: Mutex::new(ManifestState {
                current: Arc::new(version),
                next_file_number,
                last_sequence,
                log_number,
                manifest_file_number,
                wal,
            }),
        })
    }

    fn bootstrap(dir: PathBuf) -> Result<Self, ManifestError> {
        let manifest_file_number = 1;
        let manifest_path = dir.join(manifest_filename(manifest_file_number));
        let mut wal = Wal::<VersionEdit>::open(&manifest_path, None)?;

        let edit = VersionEdit {
            next_file_number: Some(2),
            last_sequence: Some(0),
            log_number: Some(0),
            comparator_name: Some(COMPARATOR_NAME.to_string()),
            ..Default::default()
        };
        wal.append(&edit)?;

        Self::write_current(&dir, manifest_file_number)?;

        info!(dir = %dir.display(), "manifest bootstrapped");

        Ok(Self {
            dir,
            state: Mutex::new(ManifestState {
                current: Arc::new(Version::default()),
                next_file_number: 2,
                last_sequence: 0,
                log_number: 0,
                manifest_file_number,
                wal,
            }),
        })
    }

    // --------------------------------------------------------------------
    // Read accessors
    // --------------------------------------------------------------------

    /// Returns the current `Version`, bumping its `Arc` refcount.
    pub fn current_version(&self) -> Result<Arc<Version>, ManifestError> {
        Ok(Arc::clone(&self.lock_state()?.current))
    }

    /// Returns the next file number that will be allocated.
    pub fn peek_next_file_number(&self) -> Result<u64, ManifestError> {
        Ok(self.lock_state()?.next_file_number)
    }

    /// Returns the last durably-recorded global sequence number.
    pub fn last_sequence(&self) -> Result<u64, ManifestError> {
        Ok(self.lock_state()?.last_sequence)
    }

    /// Returns the active WAL segment number ("log number").
    pub fn log_number(&self) -> Result<u64, ManifestError> {
        Ok(self.lock_state()?.log_number)
    }

    fn lock_state(&self) -> Result<std::sync::MutexGuard<'_, ManifestState>, ManifestError> {
        self.state
            .lock()
            .map_err(|_| ManifestError::Internal("manifest mutex poisoned".into()))
    }

    // --------------------------------------------------------------------
    // Mutations
    // --------------------------------------------------------------------

    /// Allocates and persists the next file number. Crash-safe: the
    /// allocation itself is not separately logged — callers that crash
    /// after allocating but before committing the file via
    /// [`Manifest::log_and_apply`] simply leak a file number, which is
    /// harmless (numbers are never reused).
    pub fn allocate_file_number(&self) -> Result<u64, ManifestError> {
        let mut state = self.lock_state()?;
        let number = state.next_file_number;
        state.next_file_number += 1;
        Ok(number)
    }

    /// Records a new last-sequence high-water mark in memory. Durable
    /// persistence happens the next time [`Manifest::log_and_apply`] is
    /// called (every edit stamps the current `last_sequence`).
    pub fn record_sequence(&self, seq: u64) -> Result<(), ManifestError> {
        let mut state = self.lock_state()?;
        if seq > state.last_sequence {
            state.last_sequence = seq;
        }
        Ok(())
    }

    /// Records the currently active WAL segment number.
    pub fn set_log_number(&self, log_number: u64) -> Result<(), ManifestError> {
        let mut state = self.lock_state()?;
        state.log_number = log_number;
        Ok(())
    }

    /// Installs a new `Version` by applying `edit`, following the install
    /// protocol described at the module level: compute, append + fsync,
    /// roll over if needed, then swap the in-memory pointer.
    pub fn log_and_apply(&self, mut edit: VersionEdit) -> Result<Arc<Version>, ManifestError> {
        let mut state = self.lock_state()?;

        if edit.last_sequence.is_none() {
            edit.last_sequence = Some(state.last_sequence);
        }
        if edit.log_number.is_none() {
            edit.log_number = Some(state.log_number);
        }
        if edit.next_file_number.is_none() {
            edit.next_file_number = Some(state.next_file_number);
        }

        let new_version = state.current.apply(&edit);

        state.wal.append(&edit)?;

        if let Some(seq) = edit.last_sequence {
            state.last_sequence = state.last_sequence.max(seq);
        }
        if let Some(log_number) = edit.log_number {
            state.log_number = log_number;
        }

        let new_version = Arc::new(new_version);
        state.current = Arc::clone(&new_version);

        if state.wal.file_size()? > MANIFEST_ROLLOVER_SIZE {
            self.rollover(&mut state)?;
        }

        Ok(new_version)
    }

    fn rollover(&self, state: &mut ManifestState) -> Result<(), ManifestError> {
        let new_number = state.manifest_file_number + 1;
        let new_path = self.dir.join(manifest_filename(new_number));
        let mut new_wal = Wal::<VersionEdit>::open(&new_path, None)?;

        let snapshot = VersionEdit::snapshot(
            &state.current,
            state.next_file_number,
            state.last_sequence,
            state.log_number,
        );
        new_wal.append(&snapshot)?;

        Self::write_current(&self.dir, new_number)?;

        let old_path = self.dir.join(manifest_filename(state.manifest_file_number));
        state.wal = new_wal;
        state.manifest_file_number = new_number;

        // Best-effort cleanup: the old manifest file is no longer
        // referenced by CURRENT and can be removed.
        if let Err(e) = fs::remove_file(&old_path) {
            warn!("failed to remove obsolete manifest file {:?}: {}", old_path, e);
        }

        info!(manifest = new_number, "manifest rolled over");

        Ok(())
    }

    // --------------------------------------------------------------------
    // CURRENT file + replay
    // --------------------------------------------------------------------

    fn read_current(path: &Path) -> Result<u64, ManifestError> {
        let mut contents = String::new();
        File::open(path)?.read_to_string(&mut contents)?;
        let name = contents.trim_end_matches('\n');
        let number_str = name.strip_prefix("MANIFEST-").ok_or_else(|| {
            ManifestError::InvalidCurrent(format!("malformed CURRENT contents: {contents:?}"))
        })?;
        number_str
            .parse::<u64>()
            .map_err(|_| ManifestError::InvalidCurrent(format!("non-numeric manifest number: {number_str:?}")))
    }

    fn write_current(dir: &Path, manifest_file_number: u64) -> Result<(), ManifestError> {
        let tmp_path = dir.join(format!("{CURRENT_FILENAME}{CURRENT_TMP_SUFFIX}"));
        {
            let mut f = OpenOptions::new()
                .create(true)
                .write(true)
                .truncate(true)
                .open(&tmp_path)?;
            writeln!(f, "{}", manifest_filename(manifest_file_number))?;
            f.sync_all()?;
        }
        let final_path = dir.join(CURRENT_FILENAME);
        fs::rename(&tmp_path, &final_path)?;
        Self::fsync_dir(dir)?;
        Ok(())
    }

    fn fsync_dir(dir: &Path) -> Result<(), ManifestError> {
        File::open(dir)?.sync_all()?;
        Ok(())
    }

    /// Replays every [`VersionEdit`] in `wal` from the start, folding them
    /// into a single `Version` plus the trailing bookkeeping counters.
    fn replay(wal: &Wal<VersionEdit>) -> Result<(Version, u64, u64, u64), ManifestError> {
        let mut version = Version::default();
        let mut next_file_number = 1;
        let mut last_sequence = 0;
        let mut log_number = 0;
        let mut count = 0u64;

        for item in wal.replay_iter()? {
            match item {
                Ok(edit) => {
                    version = version.apply(&edit);
                    if let Some(n) = edit.next_file_number {
                        next_file_number = next_file_number.max(n);
                    }
                    if let Some(s) = edit.last_sequence {
                        last_sequence = last_sequence.max(s);
                    }
                    if let Some(l) = edit.log_number {
                        log_number = l;
                    }
                    count += 1;
                }
                Err(e) => {
                    warn!("manifest replay stopped due to WAL error: {}", e);
                    break;
                }
            }
        }

        info!(edits = count, "manifest replay complete");

        Ok((version, next_file_number, last_sequence, log_number))
    }
}
