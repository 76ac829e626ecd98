//! # Access - random access to signal traces
//!
//! Turns a [`SignalIndex`](sigindex::SignalIndex) into trace reads against
//! a [`SignalSource`](source::SignalSource), one file or many.
//!
//! ## Architecture
//!
//! ```text
//! RandomAccessReader (registry.rs)      file name -> IndexedFile, lazy index load
//!   │
//!   v
//! IndexedFile (file.rs)                  source + index + group cache
//!   │
//!   ├─ fetch_signal ───────────> direct.rs     row_info + read_chunk, no metadata lookup
//!   ├─ sort_by_location ───────> locality.rs   argsort by row_start
//!   └─ fetch_many ─────────────> batch.rs      one rayon task per reader group
//!
//! bulk.rs                                build missing indexes for a directory
//! ```
//!
//! ## Module Responsibilities
//!
//! | Module       | Purpose                                                  |
//! |--------------|----------------------------------------------------------|
//! | [`direct`]   | single-trace fetch, calibration                          |
//! | [`locality`] | row-order permutations for lookup batches                |
//! | [`batch`]    | `GroupCache`, `BatchFetcher`                             |
//! | [`file`]     | `IndexedFile` per-file handle                            |
//! | [`registry`] | `RandomAccessReader` over many files                     |
//! | [`bulk`]     | ahead-of-time index building                             |
//!
//! Calls on a single [`IndexedFile`] never mutate the index, so it can be
//! shared across threads as long as the source tolerates concurrent calls.
//! Sources that do not are wrapped in [`source::Serialized`].

pub mod batch;
pub mod bulk;
pub mod direct;
pub mod file;
pub mod locality;
pub mod registry;

pub use batch::{BatchFetcher, GroupCache};
pub use bulk::{build_index_file, build_indexes};
pub use direct::{calibrate, fetch_calibrated_signal, fetch_signal, fetch_signal_into};
pub use file::IndexedFile;
pub use locality::{signal_row_starts, sort_by_location, sorted_by_location};
pub use registry::{discover, index_path_for, RandomAccessReader};

#[cfg(test)]
mod tests;
