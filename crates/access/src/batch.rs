//! Concurrent batch fetching.
//!
//! ```text
//! ids ──resolve──> locations ──group_of──> { group -> [positions] }
//!                                               │
//!                    one rayon task per group ──┤  open group once (cache)
//!                                               │  fetch members in order
//!                                               v
//!                          join all ──> scatter into input order
//! ```

use std::collections::{BTreeMap, HashMap};
use std::sync::Arc;

use parking_lot::Mutex;
use rayon::prelude::*;
use rayon::{ThreadPool, ThreadPoolBuildError, ThreadPoolBuilder};
use readid::ReadId;
use sigindex::{LocationRecord, Result, SignalIndex};
use source::{SignalSource, SourceResult};
use tracing::debug;

use crate::direct;

type Slot<G> = Mutex<Option<Arc<G>>>;

/// Materialised groups keyed by group id, shared by concurrent fetches.
///
/// Each group is opened at most once. The map lock is only held to find
/// or create a group's slot; opening happens under the slot's own lock, so
/// different groups open in parallel while racing first touches of the
/// same group wait for a single open.
pub struct GroupCache<G> {
    slots: Mutex<HashMap<u64, Arc<Slot<G>>>>,
}

impl<G> Default for GroupCache<G> {
    fn default() -> Self {
        Self {
            slots: Mutex::new(HashMap::new()),
        }
    }
}

impl<G> GroupCache<G> {
    pub fn new() -> Self {
        Self::default()
    }

    /// Returns the cached group `id`, opening it with `open` on first use.
    ///
    /// A failed open leaves the slot empty so a later call may retry.
    pub fn get_or_open<F>(&self, id: u64, open: F) -> SourceResult<Arc<G>>
    where
        F: FnOnce(u64) -> SourceResult<G>,
    {
        let slot = {
            let mut slots = self.slots.lock();
            Arc::clone(slots.entry(id).or_default())
        };

        let mut group = slot.lock();
        if let Some(g) = group.as_ref() {
            return Ok(Arc::clone(g));
        }
        let opened = Arc::new(open(id)?);
        *group = Some(Arc::clone(&opened));
        Ok(opened)
    }

    /// Number of groups currently materialised.
    pub fn len(&self) -> usize {
        let slots: Vec<_> = self.slots.lock().values().cloned().collect();
        slots.iter().filter(|s| s.lock().is_some()).count()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    /// Drops every cached group.
    pub fn clear(&self) {
        self.slots.lock().clear();
    }
}

impl<G> std::fmt::Debug for GroupCache<G> {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("GroupCache").field("groups", &self.len()).finish()
    }
}

/// Runs batch fetches on a dedicated thread pool, or on the global rayon
/// pool when built with zero threads.
#[derive(Clone, Default)]
pub struct BatchFetcher {
    pool: Option<Arc<ThreadPool>>,
}

impl std::fmt::Debug for BatchFetcher {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("BatchFetcher")
            .field("threads", &self.pool.as_ref().map(|p| p.current_num_threads()))
            .finish()
    }
}

impl BatchFetcher {
    /// `threads == 0` shares the global rayon pool.
    pub fn new(threads: usize) -> std::result::Result<Self, ThreadPoolBuildError> {
        if threads == 0 {
            return Ok(Self::default());
        }
        let pool = ThreadPoolBuilder::new()
            .num_threads(threads)
            .thread_name(|i| format!("sigidx-fetch-{}", i))
            .build()?;
        Ok(Self {
            pool: Some(Arc::new(pool)),
        })
    }

    /// Fetches the raw samples of every id, returned in input order.
    ///
    /// All ids are resolved before any I/O; an unknown id fails the call
    /// with [`IndexError::NotFound`](sigindex::IndexError::NotFound). Ids
    /// are then grouped by the reader group holding their first row and one
    /// task per group is dispatched. Every task runs to completion before
    /// the first error (in group order) is returned.
    pub fn fetch_many<S>(
        &self,
        source: &S,
        index: &SignalIndex,
        ids: &[ReadId],
        cache: &GroupCache<S::Group>,
    ) -> Result<Vec<Vec<i16>>>
    where
        S: SignalSource + Sync,
    {
        let locs: Vec<&LocationRecord> = ids
            .iter()
            .map(|id| index.locate(id))
            .collect::<Result<_>>()?;

        let mut out: Vec<Vec<i16>> = vec![Vec::new(); ids.len()];
        let mut by_group: BTreeMap<u64, Vec<usize>> = BTreeMap::new();
        for (pos, loc) in locs.iter().enumerate() {
            if loc.row_count == 0 {
                // Nothing to read; still validates n_samples.
                out[pos] = direct::fetch_signal(source, loc)?;
                continue;
            }
            by_group
                .entry(source.group_of(loc.row_start)?)
                .or_default()
                .push(pos);
        }
        let groups: Vec<(u64, Vec<usize>)> = by_group.into_iter().collect();
        debug!(reads = ids.len(), groups = groups.len(), "dispatching batch fetch");

        let run = || -> Vec<Result<Vec<(usize, Vec<i16>)>>> {
            groups
                .into_par_iter()
                .map(|(group_id, positions)| -> Result<Vec<(usize, Vec<i16>)>> {
                    let group = cache.get_or_open(group_id, |g| source.open_group(g))?;
                    positions
                        .into_iter()
                        .map(|pos| -> Result<(usize, Vec<i16>)> {
                            Ok((pos, direct::fetch_signal(&*group, locs[pos])?))
                        })
                        .collect()
                })
                .collect()
        };
        let results = match &self.pool {
            Some(pool) => pool.install(run),
            None => run(),
        };

        for fetched in results {
            for (pos, samples) in fetched? {
                out[pos] = samples;
            }
        }
        Ok(out)
    }
}
