use std::path::Path;

use readid::ReadId;
use sigindex::{LocationRecord, Result, SignalIndex};
use source::SignalSource;

use crate::batch::{BatchFetcher, GroupCache};
use crate::{direct, locality};

/// One opened signal file together with its index.
///
/// Owns the source (closed on drop), the current index snapshot and the
/// cache of materialised groups used by [`fetch_many`](Self::fetch_many).
pub struct IndexedFile<S: SignalSource> {
    source: S,
    index: SignalIndex,
    groups: GroupCache<S::Group>,
    fetcher: BatchFetcher,
}

impl<S: SignalSource> std::fmt::Debug for IndexedFile<S> {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("IndexedFile")
            .field("entries", &self.index.len())
            .field("groups", &self.groups)
            .field("fetcher", &self.fetcher)
            .finish()
    }
}

impl<S: SignalSource> IndexedFile<S> {
    /// Wraps `source` with an empty index.
    pub fn new(source: S) -> Self {
        Self::with_index(source, SignalIndex::new())
    }

    pub fn with_index(source: S, index: SignalIndex) -> Self {
        Self {
            source,
            index,
            groups: GroupCache::new(),
            fetcher: BatchFetcher::default(),
        }
    }

    /// Opens `source` and builds its index in one step.
    pub fn open_and_build(source: S) -> Result<Self> {
        let index = SignalIndex::build(&source)?;
        Ok(Self::with_index(source, index))
    }

    pub fn with_fetcher(mut self, fetcher: BatchFetcher) -> Self {
        self.fetcher = fetcher;
        self
    }

    /// Rebuilds the index from the read-metadata table.
    ///
    /// The previous snapshot stays in place if the build fails.
    pub fn build_index(&mut self) -> Result<()> {
        self.index = SignalIndex::build(&self.source)?;
        Ok(())
    }

    pub fn save_index<P: AsRef<Path>>(&self, path: P) -> Result<()> {
        self.index.save(path)
    }

    /// Replaces the index with the one stored at `path`.
    pub fn load_index<P: AsRef<Path>>(&mut self, path: P) -> Result<()> {
        self.index = SignalIndex::load(path)?;
        Ok(())
    }

    pub fn index(&self) -> &SignalIndex {
        &self.index
    }

    pub fn source(&self) -> &S {
        &self.source
    }

    pub fn location(&self, id: &ReadId) -> Result<&LocationRecord> {
        self.index.locate(id)
    }

    /// `(offset, scale)` of a read, answered from the index alone.
    pub fn calibration(&self, id: &ReadId) -> Result<(f32, f32)> {
        Ok(self.index.locate(id)?.calibration())
    }

    /// Sample count of a read, answered from the index alone.
    pub fn signal_length(&self, id: &ReadId) -> Result<u32> {
        Ok(self.index.locate(id)?.n_samples)
    }

    pub fn fetch_signal(&self, id: &ReadId) -> Result<Vec<i16>> {
        let loc = self.index.locate(id)?;
        direct::fetch_signal(&self.source, loc)
    }

    /// Fetches a read in physical units with a single index lookup.
    pub fn fetch_calibrated_signal(&self, id: &ReadId) -> Result<Vec<f32>> {
        let loc = self.index.locate(id)?;
        direct::fetch_calibrated_signal(&self.source, loc)
    }

    /// Every indexed read id, sorted by id.
    pub fn list_read_ids(&self) -> Vec<ReadId> {
        let mut ids: Vec<ReadId> = self.index.read_ids().copied().collect();
        ids.sort_unstable();
        ids
    }

    /// Every indexed read id in signal-table order.
    pub fn list_read_ids_by_location(&self) -> Vec<ReadId> {
        let mut entries: Vec<(u64, ReadId)> = self
            .index
            .iter()
            .map(|(id, loc)| (loc.row_start, *id))
            .collect();
        entries.sort_unstable();
        entries.into_iter().map(|(_, id)| id).collect()
    }

    pub fn signal_row_starts(&self, ids: &[ReadId]) -> Result<Vec<u64>> {
        locality::signal_row_starts(&self.index, ids)
    }

    pub fn sort_by_location(&self, ids: &[ReadId]) -> Result<Vec<usize>> {
        locality::sort_by_location(&self.index, ids)
    }

    /// Number of groups materialised by batch fetches so far.
    pub fn cached_groups(&self) -> usize {
        self.groups.len()
    }
}

impl<S: SignalSource + Sync> IndexedFile<S> {
    /// Fetches many reads concurrently, one task per reader group.
    ///
    /// Groups opened here stay cached for later calls.
    pub fn fetch_many(&self, ids: &[ReadId]) -> Result<Vec<Vec<i16>>> {
        self.fetcher
            .fetch_many(&self.source, &self.index, ids, &self.groups)
    }
}
