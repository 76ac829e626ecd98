//! Serialises calls into a reader that is not safe to call concurrently.
//!
//! Every handle derived from a wrapped source (batches, groups) shares the
//! same gate, so at most one reader call is in flight at a time. Work done
//! by the caller on the returned buffers (copying, calibration) still runs
//! in parallel.

use std::sync::Arc;

use parking_lot::Mutex;

use crate::{ReadBatch, ReadRow, SignalRowInfo, SignalRows, SignalSource, SourceResult};

/// A handle whose reader calls are serialised behind a shared lock.
#[derive(Debug)]
pub struct Serialized<T> {
    inner: Mutex<T>,
    gate: Arc<Mutex<()>>,
}

impl<T> Serialized<T> {
    pub fn new(inner: T) -> Self {
        Self {
            inner: Mutex::new(inner),
            gate: Arc::new(Mutex::new(())),
        }
    }

    fn child<U>(&self, inner: U) -> Serialized<U> {
        Serialized {
            inner: Mutex::new(inner),
            gate: Arc::clone(&self.gate),
        }
    }

    fn with<R>(&self, f: impl FnOnce(&T) -> R) -> R {
        let _gate = self.gate.lock();
        let inner = self.inner.lock();
        f(&inner)
    }

    pub fn into_inner(self) -> T {
        self.inner.into_inner()
    }
}

impl<T: SignalRows> SignalRows for Serialized<T> {
    fn row_info(&self, rows: &[u64]) -> SourceResult<Vec<SignalRowInfo>> {
        self.with(|s| s.row_info(rows))
    }

    fn read_chunk(&self, info: &SignalRowInfo, out: &mut [i16]) -> SourceResult<()> {
        self.with(|s| s.read_chunk(info, out))
    }
}

impl<T: ReadBatch> ReadBatch for Serialized<T> {
    fn row_count(&self) -> SourceResult<usize> {
        self.with(|b| b.row_count())
    }

    fn row(&self, row: usize) -> SourceResult<ReadRow> {
        self.with(|b| b.row(row))
    }

    fn signal_rows(&self, row: usize) -> SourceResult<Vec<u64>> {
        self.with(|b| b.signal_rows(row))
    }
}

impl<S: SignalSource> SignalSource for Serialized<S> {
    type Batch = Serialized<S::Batch>;
    type Group = Serialized<S::Group>;

    fn read_batch_count(&self) -> SourceResult<usize> {
        self.with(|s| s.read_batch_count())
    }

    fn read_batch(&self, index: usize) -> SourceResult<Self::Batch> {
        let batch = self.with(|s| s.read_batch(index))?;
        Ok(self.child(batch))
    }

    fn group_of(&self, row: u64) -> SourceResult<u64> {
        self.with(|s| s.group_of(row))
    }

    fn open_group(&self, group: u64) -> SourceResult<Self::Group> {
        let handle = self.with(|s| s.open_group(group))?;
        Ok(self.child(handle))
    }
}
