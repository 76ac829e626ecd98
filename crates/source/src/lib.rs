//! # Source - columnar signal file contract
//!
//! The index engine never parses signal files itself. It talks to a reader
//! through the traits in this crate:
//!
//! ```text
//! SignalSource
//!   ├─ read-metadata table   read_batch_count() / read_batch(i) -> ReadBatch
//!   │                          ReadBatch: row_count(), row(r), signal_rows(r)
//!   ├─ signal table          SignalRows: row_info(&rows), read_chunk(info, out)
//!   └─ grouping              group_of(row), open_group(g) -> Group: SignalRows
//! ```
//!
//! A *group* is the coarsest unit the reader can materialise in one call
//! (a record batch, a region of the file). Batch fetches are organised
//! around it.
//!
//! Every handle a reader returns (batches, row infos, groups, the opened
//! source itself) releases its resources on `Drop`, so early returns on the
//! error path never leak.
//!
//! Whether a source tolerates concurrent calls is part of its contract. A
//! reader that does not can be wrapped in [`Serialized`].

mod memory;
mod serialized;

use std::io;
use std::path::Path;

use readid::ReadId;
use thiserror::Error;

pub use memory::{
    Fault, MemoryBatch, MemoryGroup, MemoryOpener, MemorySource, MemorySourceBuilder, SourceStats,
};
pub use serialized::Serialized;

/// Failure reported by a reader call.
#[derive(Debug, Error)]
pub enum SourceError {
    /// A reader call returned a non-success status.
    #[error("{call} failed: {reason}")]
    Call { call: &'static str, reason: String },

    /// The requested signal row does not exist in the table.
    #[error("signal row {0} does not exist")]
    NoSuchRow(u64),

    /// A group handle was asked for a row it does not hold.
    #[error("signal row {row} is outside group {group}")]
    RowOutsideGroup { row: u64, group: u64 },

    /// The caller's output slice does not match the stored chunk length.
    #[error("chunk for signal row {row} holds {stored} samples, buffer has {given}")]
    ChunkLength { row: u64, stored: u32, given: usize },

    /// Opening or reading the underlying file failed.
    #[error("io error: {0}")]
    Io(#[from] io::Error),
}

pub type SourceResult<T> = Result<T, SourceError>;

/// Per-read metadata decoded from one row of the read-metadata table.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct ReadRow {
    pub read_id: ReadId,
    pub calibration_offset: f32,
    pub calibration_scale: f32,
    /// Total samples across every signal row of this read.
    pub num_samples: u64,
}

/// Per-row metadata for one row of the signal table.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct SignalRowInfo {
    pub row: u64,
    /// Samples stored in this row; the last row of a read may be partial.
    pub stored_samples: u32,
}

/// One record batch of the read-metadata table.
pub trait ReadBatch {
    fn row_count(&self) -> SourceResult<usize>;

    fn row(&self, row: usize) -> SourceResult<ReadRow>;

    /// Signal-table rows holding this read's samples, in order.
    ///
    /// The storage layer guarantees these are contiguous.
    fn signal_rows(&self, row: usize) -> SourceResult<Vec<u64>>;
}

/// Row-level access to (a part of) the signal table.
pub trait SignalRows {
    /// Fetches metadata for exactly `rows`, in the given order.
    fn row_info(&self, rows: &[u64]) -> SourceResult<Vec<SignalRowInfo>>;

    /// Decodes the samples of one row into `out`.
    ///
    /// `out.len()` must equal `info.stored_samples`.
    fn read_chunk(&self, info: &SignalRowInfo, out: &mut [i16]) -> SourceResult<()>;
}

/// An opened columnar signal file.
pub trait SignalSource: SignalRows {
    type Batch: ReadBatch;
    type Group: SignalRows + Send + Sync;

    fn read_batch_count(&self) -> SourceResult<usize>;

    fn read_batch(&self, index: usize) -> SourceResult<Self::Batch>;

    /// Identifier of the group holding signal row `row`.
    fn group_of(&self, row: u64) -> SourceResult<u64>;

    /// Materialises a group. Expensive; callers are expected to cache.
    fn open_group(&self, group: u64) -> SourceResult<Self::Group>;
}

/// Opens signal files by path. Closing happens when the source is dropped.
pub trait SourceOpener {
    type Source: SignalSource;

    fn open(&self, path: &Path) -> SourceResult<Self::Source>;
}
