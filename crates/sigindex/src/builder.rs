use source::{ReadBatch, ReadRow, SignalSource, SourceError};
use tracing::debug;

use crate::{IndexError, LocationRecord, Result, SignalIndex};

impl SignalIndex {
    /// Builds an index with one forward pass over the read-metadata table.
    ///
    /// Batches are visited in ascending order and dropped as soon as their
    /// rows are consumed, so only the fixed-width [`LocationRecord`]s stay
    /// in memory.
    ///
    /// For each read the first signal row returned by the reader becomes
    /// `row_start` and the number of rows becomes `row_count`; the rows are
    /// contiguous by contract and are not re-checked.
    ///
    /// # Errors
    ///
    /// Any failing reader call aborts the build; no partial index is
    /// returned. A read id seen twice is an [`IndexError::DuplicateKey`].
    pub fn build<S: SignalSource>(source: &S) -> Result<Self> {
        let batch_count = source.read_batch_count()?;
        let mut index = Self::new();

        for b in 0..batch_count {
            let batch = source.read_batch(b)?;
            let rows = batch.row_count()?;
            index.entries.reserve(rows);

            for r in 0..rows {
                let read = batch.row(r)?;
                let signal_rows = batch.signal_rows(r)?;
                let loc = LocationRecord::from_read(&read, &signal_rows)?;
                index.insert(read.read_id, loc)?;
            }
        }

        debug!(batches = batch_count, entries = index.len(), "built signal index");
        Ok(index)
    }
}

impl LocationRecord {
    /// Converts one read-metadata row. Counts that do not fit the record
    /// are a broken reader, not a broken index file.
    fn from_read(read: &ReadRow, signal_rows: &[u64]) -> Result<Self> {
        let bad_read = |reason: String| -> IndexError {
            SourceError::Call {
                call: "signal_rows",
                reason,
            }
            .into()
        };
        let row_count = u32::try_from(signal_rows.len()).map_err(|_| {
            bad_read(format!(
                "read {} spans {} signal rows",
                read.read_id,
                signal_rows.len()
            ))
        })?;
        let n_samples = u32::try_from(read.num_samples).map_err(|_| {
            bad_read(format!(
                "read {} has {} samples",
                read.read_id, read.num_samples
            ))
        })?;
        let loc = Self {
            row_start: signal_rows.first().copied().unwrap_or(0),
            row_count,
            n_samples,
            calibration_offset: read.calibration_offset,
            calibration_scale: read.calibration_scale,
        };
        loc.rows()
            .map_err(|_| bad_read(format!("read {} runs past the last signal row", read.read_id)))?;
        Ok(loc)
    }
}
