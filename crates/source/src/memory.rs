//! In-memory columnar source.
//!
//! Lays traces out the way a signal file writer does: each trace is split
//! into rows of at most `row_capacity` samples appended to one signal table,
//! read-metadata rows are cut into batches of `read_batch_size`, and signal
//! rows are cut into groups of roughly `group_rows` rows. A group only ever
//! starts on a trace boundary.
//!
//! Call counters and injected faults make it usable as a test double for
//! any [`SignalSource`] consumer.

use std::collections::{HashMap, HashSet};
use std::io;
use std::path::{Path, PathBuf};
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;

use parking_lot::Mutex;
use readid::ReadId;

use crate::{
    ReadBatch, ReadRow, SignalRowInfo, SignalRows, SignalSource, SourceError, SourceOpener,
    SourceResult,
};

/// Default maximum samples per signal row.
pub const DEFAULT_ROW_CAPACITY: usize = 102_400;
/// Default read-metadata rows per batch.
pub const DEFAULT_READ_BATCH_SIZE: usize = 1_000;
/// Default signal rows per group.
pub const DEFAULT_GROUP_ROWS: usize = 1_000;

/// A reader call that should fail.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum Fault {
    ReadBatchCount,
    ReadBatch(usize),
    BatchRowCount(usize),
    /// `(batch, row)` metadata decode.
    ReadRow(usize, usize),
    SignalRows(usize, usize),
    /// Any `row_info` request naming this signal row.
    RowInfo(u64),
    ReadChunk(u64),
    OpenGroup(u64),
}

/// Counters of reader calls, shared by every clone of a source.
#[derive(Debug, Default)]
pub struct SourceStats {
    batches_opened: AtomicU64,
    row_info_calls: AtomicU64,
    chunks_read: AtomicU64,
    groups_opened: AtomicU64,
}

impl SourceStats {
    pub fn batches_opened(&self) -> u64 {
        self.batches_opened.load(Ordering::Relaxed)
    }

    pub fn row_info_calls(&self) -> u64 {
        self.row_info_calls.load(Ordering::Relaxed)
    }

    pub fn chunks_read(&self) -> u64 {
        self.chunks_read.load(Ordering::Relaxed)
    }

    pub fn groups_opened(&self) -> u64 {
        self.groups_opened.load(Ordering::Relaxed)
    }
}

#[derive(Debug)]
struct ReadEntry {
    row: ReadRow,
    signal_rows: Vec<u64>,
}

#[derive(Debug)]
struct Table {
    reads: Vec<ReadEntry>,
    read_batch_size: usize,
    chunks: Vec<Vec<i16>>,
    /// First signal row of each group, ascending, starting at 0.
    group_starts: Vec<u64>,
    faults: HashSet<Fault>,
}

impl Table {
    fn check(&self, fault: Fault, call: &'static str) -> SourceResult<()> {
        if self.faults.contains(&fault) {
            return Err(SourceError::Call {
                call,
                reason: "injected fault".to_string(),
            });
        }
        Ok(())
    }

    fn batch_count(&self) -> usize {
        self.reads.len().div_ceil(self.read_batch_size)
    }

    fn group_range(&self, group: u64) -> Option<(u64, u64)> {
        let idx = usize::try_from(group).ok()?;
        let start = *self.group_starts.get(idx)?;
        let end = self
            .group_starts
            .get(idx + 1)
            .copied()
            .unwrap_or(self.chunks.len() as u64);
        Some((start, end))
    }

    fn chunk(&self, row: u64) -> SourceResult<&[i16]> {
        usize::try_from(row)
            .ok()
            .and_then(|r| self.chunks.get(r))
            .map(Vec::as_slice)
            .ok_or(SourceError::NoSuchRow(row))
    }

    fn row_info(&self, rows: &[u64]) -> SourceResult<Vec<SignalRowInfo>> {
        rows.iter()
            .map(|&row| {
                self.check(Fault::RowInfo(row), "row_info")?;
                let chunk = self.chunk(row)?;
                Ok(SignalRowInfo {
                    row,
                    stored_samples: chunk.len() as u32,
                })
            })
            .collect()
    }

    fn read_chunk(&self, info: &SignalRowInfo, out: &mut [i16]) -> SourceResult<()> {
        self.check(Fault::ReadChunk(info.row), "read_chunk")?;
        let chunk = self.chunk(info.row)?;
        if chunk.len() != out.len() {
            return Err(SourceError::ChunkLength {
                row: info.row,
                stored: chunk.len() as u32,
                given: out.len(),
            });
        }
        out.copy_from_slice(chunk);
        Ok(())
    }
}

/// A signal file held entirely in memory.
///
/// Cheap to clone; clones share the table and the [`SourceStats`].
#[derive(Debug, Clone)]
pub struct MemorySource {
    table: Arc<Table>,
    stats: Arc<SourceStats>,
}

impl MemorySource {
    pub fn builder() -> MemorySourceBuilder {
        MemorySourceBuilder::new()
    }

    pub fn stats(&self) -> &SourceStats {
        &self.stats
    }

    /// Number of rows in the signal table.
    pub fn signal_row_count(&self) -> u64 {
        self.table.chunks.len() as u64
    }

    /// Number of groups the signal table is cut into.
    pub fn group_count(&self) -> u64 {
        self.table.group_starts.len() as u64
    }

    /// Read ids in table order.
    pub fn read_ids(&self) -> Vec<ReadId> {
        self.table.reads.iter().map(|r| r.row.read_id).collect()
    }
}

impl SignalRows for MemorySource {
    fn row_info(&self, rows: &[u64]) -> SourceResult<Vec<SignalRowInfo>> {
        self.stats.row_info_calls.fetch_add(1, Ordering::Relaxed);
        self.table.row_info(rows)
    }

    fn read_chunk(&self, info: &SignalRowInfo, out: &mut [i16]) -> SourceResult<()> {
        self.stats.chunks_read.fetch_add(1, Ordering::Relaxed);
        self.table.read_chunk(info, out)
    }
}

impl SignalSource for MemorySource {
    type Batch = MemoryBatch;
    type Group = MemoryGroup;

    fn read_batch_count(&self) -> SourceResult<usize> {
        self.table.check(Fault::ReadBatchCount, "read_batch_count")?;
        Ok(self.table.batch_count())
    }

    fn read_batch(&self, index: usize) -> SourceResult<MemoryBatch> {
        self.table.check(Fault::ReadBatch(index), "read_batch")?;
        if index >= self.table.batch_count() {
            return Err(SourceError::Call {
                call: "read_batch",
                reason: format!("batch {} out of range", index),
            });
        }
        self.stats.batches_opened.fetch_add(1, Ordering::Relaxed);
        let start = index * self.table.read_batch_size;
        let end = (start + self.table.read_batch_size).min(self.table.reads.len());
        Ok(MemoryBatch {
            table: Arc::clone(&self.table),
            index,
            start,
            end,
        })
    }

    fn group_of(&self, row: u64) -> SourceResult<u64> {
        if row >= self.signal_row_count() {
            return Err(SourceError::NoSuchRow(row));
        }
        let after = self.table.group_starts.partition_point(|&s| s <= row);
        Ok((after - 1) as u64)
    }

    fn open_group(&self, group: u64) -> SourceResult<MemoryGroup> {
        self.table.check(Fault::OpenGroup(group), "open_group")?;
        let (start, end) = self.table.group_range(group).ok_or_else(|| SourceError::Call {
            call: "open_group",
            reason: format!("group {} out of range", group),
        })?;
        self.stats.groups_opened.fetch_add(1, Ordering::Relaxed);
        Ok(MemoryGroup {
            table: Arc::clone(&self.table),
            stats: Arc::clone(&self.stats),
            group,
            start,
            end,
        })
    }
}

/// A slice of the read-metadata table.
#[derive(Debug)]
pub struct MemoryBatch {
    table: Arc<Table>,
    index: usize,
    start: usize,
    end: usize,
}

impl MemoryBatch {
    fn entry(&self, row: usize) -> SourceResult<&ReadEntry> {
        if row >= self.end - self.start {
            return Err(SourceError::Call {
                call: "read_row",
                reason: format!("row {} out of range in batch {}", row, self.index),
            });
        }
        Ok(&self.table.reads[self.start + row])
    }
}

impl ReadBatch for MemoryBatch {
    fn row_count(&self) -> SourceResult<usize> {
        self.table.check(Fault::BatchRowCount(self.index), "batch_row_count")?;
        Ok(self.end - self.start)
    }

    fn row(&self, row: usize) -> SourceResult<ReadRow> {
        self.table.check(Fault::ReadRow(self.index, row), "read_row")?;
        Ok(self.entry(row)?.row)
    }

    fn signal_rows(&self, row: usize) -> SourceResult<Vec<u64>> {
        self.table
            .check(Fault::SignalRows(self.index, row), "signal_rows")?;
        Ok(self.entry(row)?.signal_rows.clone())
    }
}

/// A materialised group of signal rows.
#[derive(Debug)]
pub struct MemoryGroup {
    table: Arc<Table>,
    stats: Arc<SourceStats>,
    group: u64,
    start: u64,
    end: u64,
}

impl MemoryGroup {
    pub fn id(&self) -> u64 {
        self.group
    }

    fn contains(&self, row: u64) -> SourceResult<()> {
        if row < self.start || row >= self.end {
            return Err(SourceError::RowOutsideGroup {
                row,
                group: self.group,
            });
        }
        Ok(())
    }
}

impl SignalRows for MemoryGroup {
    fn row_info(&self, rows: &[u64]) -> SourceResult<Vec<SignalRowInfo>> {
        self.stats.row_info_calls.fetch_add(1, Ordering::Relaxed);
        for &row in rows {
            self.contains(row)?;
        }
        self.table.row_info(rows)
    }

    fn read_chunk(&self, info: &SignalRowInfo, out: &mut [i16]) -> SourceResult<()> {
        self.contains(info.row)?;
        self.stats.chunks_read.fetch_add(1, Ordering::Relaxed);
        self.table.read_chunk(info, out)
    }
}

/// Assembles a [`MemorySource`].
#[derive(Debug)]
pub struct MemorySourceBuilder {
    row_capacity: usize,
    read_batch_size: usize,
    group_rows: usize,
    reads: Vec<ReadEntry>,
    chunks: Vec<Vec<i16>>,
    group_starts: Vec<u64>,
    faults: HashSet<Fault>,
}

impl Default for MemorySourceBuilder {
    fn default() -> Self {
        Self::new()
    }
}

impl MemorySourceBuilder {
    pub fn new() -> Self {
        Self {
            row_capacity: DEFAULT_ROW_CAPACITY,
            read_batch_size: DEFAULT_READ_BATCH_SIZE,
            group_rows: DEFAULT_GROUP_ROWS,
            reads: Vec::new(),
            chunks: Vec::new(),
            group_starts: Vec::new(),
            faults: HashSet::new(),
        }
    }

    /// Maximum samples per signal row. Must be non-zero.
    pub fn row_capacity(mut self, samples: usize) -> Self {
        self.row_capacity = samples.max(1);
        self
    }

    /// Read-metadata rows per batch. Must be non-zero.
    pub fn read_batch_size(mut self, rows: usize) -> Self {
        self.read_batch_size = rows.max(1);
        self
    }

    /// Signal rows after which a new group is started at the next trace.
    pub fn group_rows(mut self, rows: usize) -> Self {
        self.group_rows = rows.max(1);
        self
    }

    /// Makes the given reader call fail.
    pub fn fault(mut self, fault: Fault) -> Self {
        self.faults.insert(fault);
        self
    }

    /// Appends `filler` empty rows to the signal table that belong to no
    /// read, e.g. to leave room for rows of another writer.
    pub fn skip_rows(&mut self, filler: usize) -> &mut Self {
        self.push_rows((0..filler).map(|_| Vec::new()).collect());
        self
    }

    /// Appends a trace, splitting `samples` into rows of `row_capacity`.
    ///
    /// Returns the first signal row of the trace.
    pub fn add_read(
        &mut self,
        read_id: ReadId,
        calibration_offset: f32,
        calibration_scale: f32,
        samples: &[i16],
    ) -> u64 {
        let rows: Vec<Vec<i16>> = if samples.is_empty() {
            vec![Vec::new()]
        } else {
            samples.chunks(self.row_capacity).map(<[i16]>::to_vec).collect()
        };
        self.add_read_rows(read_id, calibration_offset, calibration_scale, rows)
    }

    /// Appends a trace whose rows are given explicitly.
    ///
    /// Returns the first signal row of the trace.
    pub fn add_read_rows(
        &mut self,
        read_id: ReadId,
        calibration_offset: f32,
        calibration_scale: f32,
        rows: Vec<Vec<i16>>,
    ) -> u64 {
        let num_samples = rows.iter().map(|r| r.len() as u64).sum();
        let first = self.push_rows(rows);
        let signal_rows = (first..self.chunks.len() as u64).collect();
        self.reads.push(ReadEntry {
            row: ReadRow {
                read_id,
                calibration_offset,
                calibration_scale,
                num_samples,
            },
            signal_rows,
        });
        first
    }

    fn push_rows(&mut self, rows: Vec<Vec<i16>>) -> u64 {
        let first = self.chunks.len() as u64;
        let group_full = match self.group_starts.last() {
            None => true,
            Some(&start) => first - start >= self.group_rows as u64,
        };
        if group_full && !rows.is_empty() {
            self.group_starts.push(first);
        }
        self.chunks.extend(rows);
        first
    }

    pub fn build(self) -> MemorySource {
        MemorySource {
            table: Arc::new(Table {
                reads: self.reads,
                read_batch_size: self.read_batch_size,
                chunks: self.chunks,
                group_starts: self.group_starts,
                faults: self.faults,
            }),
            stats: Arc::new(SourceStats::default()),
        }
    }
}

/// Hands out registered [`MemorySource`]s by path.
///
/// Paths are canonicalised when they exist so that lookups agree with
/// callers that resolve paths before opening.
#[derive(Debug, Default)]
pub struct MemoryOpener {
    sources: Mutex<HashMap<PathBuf, MemorySource>>,
    opens: AtomicU64,
}

impl MemoryOpener {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn insert<P: AsRef<Path>>(&self, path: P, source: MemorySource) {
        self.sources.lock().insert(normalize(path.as_ref()), source);
    }

    /// Number of successful `open` calls so far.
    pub fn open_count(&self) -> u64 {
        self.opens.load(Ordering::Relaxed)
    }
}

impl SourceOpener for MemoryOpener {
    type Source = MemorySource;

    fn open(&self, path: &Path) -> SourceResult<MemorySource> {
        let source = self
            .sources
            .lock()
            .get(&normalize(path))
            .cloned()
            .ok_or_else(|| {
                io::Error::new(
                    io::ErrorKind::NotFound,
                    format!("no signal file registered at {}", path.display()),
                )
            })?;
        self.opens.fetch_add(1, Ordering::Relaxed);
        Ok(source)
    }
}

fn normalize(path: &Path) -> PathBuf {
    std::fs::canonicalize(path).unwrap_or_else(|_| path.to_path_buf())
}
