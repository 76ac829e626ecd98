//! # SigIndex - read id to signal location index
//!
//! Locating a trace by scanning the read-metadata table of a signal file is
//! O(total rows). A [`SignalIndex`] is built once from that table and maps
//! every [`ReadId`] to a [`LocationRecord`]: the contiguous range of
//! signal-table rows holding the trace, its sample count and its
//! calibration constants. With it a trace is located in O(1) and fetched
//! without touching the read-metadata table again.
//!
//! The index is a read-only snapshot. It is written once per save and never
//! updated in place.
//!
//! ## File layout (version 1)
//!
//! ```text
//! ┌───────────────────────────────────────────────────────────────┐
//! │ HEADER (16 bytes)                                             │
//! │                                                               │
//! │ magic "SIGIDX" (6) | version (u16) | reserved (u16)           │
//! │ entry_count (u64)                                             │
//! ├───────────────────────────────────────────────────────────────┤
//! │ ENTRIES (entry_count x 40 bytes)                              │
//! │                                                               │
//! │ read_id (16) | row_start (u64) | row_count (u32)              │
//! │ n_samples (u32) | calibration_offset (f32)                    │
//! │ calibration_scale (f32)                                       │
//! └───────────────────────────────────────────────────────────────┘
//! ```
//!
//! Integers and floats are written in the byte order of the machine that
//! saves the index. There is no byte-order tag: an index must be loaded on
//! a machine with the same byte order it was saved on.

mod builder;
mod format;
mod reader;
mod writer;

use std::collections::hash_map;
use std::collections::HashMap;
use std::io;
use std::ops::Range;

use readid::{ArgumentError, FnvBuildHasher, ReadId};
use source::SourceError;
use thiserror::Error;

pub use format::{Header, ENTRY_BYTES, HEADER_BYTES, INDEX_MAGIC, INDEX_VERSION};

/// Errors produced while building, persisting or querying an index.
#[derive(Debug, Error)]
pub enum IndexError {
    /// The read id is not in the index.
    #[error("read id {0} not found in index")]
    NotFound(ReadId),

    /// Magic or version mismatch, truncation, or otherwise malformed file.
    #[error("index format error: {0}")]
    Format(String),

    /// Filesystem failure while saving or loading.
    #[error("io error: {0}")]
    Io(#[from] io::Error),

    /// A call into the signal file reader failed.
    #[error("signal reader error: {0}")]
    Source(#[from] SourceError),

    /// Two read-metadata rows carried the same read id.
    #[error("read id {0} appears more than once in the read table")]
    DuplicateKey(ReadId),

    /// Signal rows did not add up to the sample count recorded in the index.
    #[error("signal at row {row_start}: index records {expected} samples, rows hold {actual}")]
    SampleCountMismatch {
        row_start: u64,
        expected: u64,
        actual: u64,
    },

    /// Malformed read id supplied by a caller.
    #[error(transparent)]
    Argument(#[from] ArgumentError),
}

impl IndexError {
    /// `true` for lookups of unknown read ids, which callers may skip.
    #[must_use]
    pub fn is_not_found(&self) -> bool {
        matches!(self, IndexError::NotFound(_))
    }
}

pub type Result<T> = std::result::Result<T, IndexError>;

/// Where one trace lives in the signal table, and how to calibrate it.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct LocationRecord {
    /// First signal-table row of the trace.
    pub row_start: u64,
    /// Number of contiguous rows spanned.
    pub row_count: u32,
    /// Total samples over all rows; the last row may be partially filled.
    pub n_samples: u32,
    pub calibration_offset: f32,
    pub calibration_scale: f32,
}

impl LocationRecord {
    /// Signal-table rows `[row_start, row_start + row_count)`.
    ///
    /// # Errors
    ///
    /// [`IndexError::Format`] if the range runs past `u64::MAX`.
    pub fn rows(&self) -> Result<Range<u64>> {
        let end = self
            .row_start
            .checked_add(u64::from(self.row_count))
            .ok_or_else(|| {
                IndexError::Format(format!(
                    "row range {} + {} overflows",
                    self.row_start, self.row_count
                ))
            })?;
        Ok(self.row_start..end)
    }

    /// Converts one raw sample to physical units: `(raw + offset) * scale`.
    #[must_use]
    pub fn calibrate(&self, raw: i16) -> f32 {
        (f32::from(raw) + self.calibration_offset) * self.calibration_scale
    }

    /// `(calibration_offset, calibration_scale)`.
    #[must_use]
    pub fn calibration(&self) -> (f32, f32) {
        (self.calibration_offset, self.calibration_scale)
    }
}

/// Read id → [`LocationRecord`] map.
///
/// Immutable once built or loaded; shared readers need no locking.
#[derive(Debug, Clone, Default)]
pub struct SignalIndex {
    entries: HashMap<ReadId, LocationRecord, FnvBuildHasher>,
    /// Header field carried through load/save untouched.
    reserved: u16,
}

impl SignalIndex {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with_capacity(capacity: usize) -> Self {
        Self {
            entries: HashMap::with_capacity_and_hasher(capacity, FnvBuildHasher::default()),
            reserved: 0,
        }
    }

    /// Adds a trace. A read id can only be inserted once.
    pub fn insert(&mut self, read_id: ReadId, location: LocationRecord) -> Result<()> {
        match self.entries.entry(read_id) {
            hash_map::Entry::Occupied(_) => Err(IndexError::DuplicateKey(read_id)),
            hash_map::Entry::Vacant(slot) => {
                slot.insert(location);
                Ok(())
            }
        }
    }

    #[must_use]
    pub fn get(&self, read_id: &ReadId) -> Option<&LocationRecord> {
        self.entries.get(read_id)
    }

    /// Like [`get`](Self::get) but unknown ids are an [`IndexError::NotFound`].
    pub fn locate(&self, read_id: &ReadId) -> Result<&LocationRecord> {
        self.entries
            .get(read_id)
            .ok_or(IndexError::NotFound(*read_id))
    }

    /// Like [`locate`](Self::locate), taking the id in text form.
    ///
    /// Malformed text is an [`IndexError::Argument`], distinct from an
    /// unknown id.
    pub fn locate_str(&self, read_id: &str) -> Result<&LocationRecord> {
        let read_id = ReadId::parse_str(read_id)?;
        self.locate(&read_id)
    }

    #[must_use]
    pub fn contains(&self, read_id: &ReadId) -> bool {
        self.entries.contains_key(read_id)
    }

    #[must_use]
    pub fn len(&self) -> usize {
        self.entries.len()
    }

    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }

    /// Iterates `(read_id, location)` in unspecified order.
    pub fn iter(&self) -> impl Iterator<Item = (&ReadId, &LocationRecord)> {
        self.entries.iter()
    }

    /// Every read id, in unspecified order.
    pub fn read_ids(&self) -> impl Iterator<Item = &ReadId> {
        self.entries.keys()
    }

    /// The header's reserved field as last loaded (0 for built indexes).
    #[must_use]
    pub fn reserved(&self) -> u16 {
        self.reserved
    }
}
