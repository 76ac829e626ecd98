//! Ahead-of-time index building for whole directories.

use std::path::{Path, PathBuf};

use anyhow::{Context, Result};
use config::Config;
use rayon::prelude::*;
use rayon::ThreadPoolBuilder;
use sigindex::SignalIndex;
use source::SourceOpener;
use tracing::{debug, error, info, warn};

use crate::registry::{discover, index_path_for};

/// Builds and saves the index of one data file.
pub fn build_index_file<O: SourceOpener>(opener: &O, path: &Path, index_path: &Path) -> Result<()> {
    let source = opener
        .open(path)
        .with_context(|| format!("failed to open {}", path.display()))?;
    let index = SignalIndex::build(&source)
        .with_context(|| format!("failed to build index for {}", path.display()))?;
    index
        .save(index_path)
        .with_context(|| format!("failed to save {}", index_path.display()))?;
    info!(index = %index_path.display(), entries = index.len(), "built index");
    Ok(())
}

/// Builds the index of every data file below `dir` that lacks one.
///
/// With `force` existing indexes are rebuilt too. `workers == 1` builds
/// one file at a time, `0` uses the global rayon pool and any other value
/// a dedicated pool of that size. A file that fails is logged and skipped.
///
/// Returns the data files whose index was written, in path order.
pub fn build_indexes<O>(
    opener: &O,
    dir: &Path,
    config: &Config,
    workers: usize,
    force: bool,
) -> Result<Vec<PathBuf>>
where
    O: SourceOpener + Sync,
{
    let found = discover(dir, &config.extension)?;
    if found.is_empty() {
        warn!(dir = %dir.display(), extension = %config.extension, "no data files found");
        return Ok(Vec::new());
    }

    let targets: Vec<(PathBuf, PathBuf)> = found
        .iter()
        .map(|p| (p.clone(), index_path_for(p, &config.index_suffix)))
        .filter(|(_, idx)| force || !idx.exists())
        .collect();
    if targets.is_empty() {
        info!(dir = %dir.display(), "every index already exists");
        return Ok(Vec::new());
    }
    info!(
        targets = targets.len(),
        total = found.len(),
        dir = %dir.display(),
        "building indexes"
    );

    let build_one = |(path, index_path): &(PathBuf, PathBuf)| -> Option<PathBuf> {
        match build_index_file(opener, path, index_path) {
            Ok(()) => Some(path.clone()),
            Err(e) => {
                let reason = format!("{:#}", e);
                error!(file = %path.display(), error = %reason, "index build failed");
                None
            }
        }
    };

    let built: Vec<PathBuf> = if workers == 1 {
        debug!("building sequentially");
        targets.iter().filter_map(build_one).collect()
    } else if workers == 0 {
        targets.par_iter().filter_map(build_one).collect()
    } else {
        let pool = ThreadPoolBuilder::new()
            .num_threads(workers)
            .build()
            .context("failed to build index thread pool")?;
        pool.install(|| targets.par_iter().filter_map(build_one).collect())
    };
    Ok(built)
}
