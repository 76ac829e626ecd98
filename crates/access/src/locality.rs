//! Physical-locality ordering of lookups.
//!
//! The signal table is laid out in row order. Visiting traces by ascending
//! `row_start` turns a batch of random lookups into a forward scan, which
//! matters on rotational or high-latency storage.

use readid::ReadId;
use sigindex::{Result, SignalIndex};

/// `row_start` of every id, in input order.
///
/// Fails with [`IndexError::NotFound`](sigindex::IndexError::NotFound) on
/// the first unknown id.
pub fn signal_row_starts(index: &SignalIndex, ids: &[ReadId]) -> Result<Vec<u64>> {
    ids.iter()
        .map(|id| index.locate(id).map(|loc| loc.row_start))
        .collect()
}

/// Returns the permutation of input positions that visits `ids` in
/// non-decreasing `row_start` order.
///
/// `order[k]` is the position in `ids` of the k-th id to fetch. Equal
/// starts keep their input order. Unknown ids abort the whole sort.
pub fn sort_by_location(index: &SignalIndex, ids: &[ReadId]) -> Result<Vec<usize>> {
    let starts = signal_row_starts(index, ids)?;
    Ok(order_by(&starts))
}

/// Returns `ids` reordered by `row_start`.
pub fn sorted_by_location(index: &SignalIndex, ids: &[ReadId]) -> Result<Vec<ReadId>> {
    let order = sort_by_location(index, ids)?;
    Ok(order.into_iter().map(|i| ids[i]).collect())
}

/// Stable argsort.
pub(crate) fn order_by(starts: &[u64]) -> Vec<usize> {
    let mut order: Vec<usize> = (0..starts.len()).collect();
    order.sort_by_key(|&i| starts[i]);
    order
}
