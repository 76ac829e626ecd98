//! Multi-file reader.
//!
//! Files are registered by path and addressed by file name afterwards.
//! A file whose index already sits next to it is only recorded; its index
//! is loaded on first access. A file without one is indexed on
//! registration and, when configured, the index is saved beside it.

use std::collections::{BTreeMap, HashMap};
use std::ffi::OsString;
use std::fs;
use std::path::{Path, PathBuf};

use anyhow::{anyhow, bail, Context, Result};
use config::Config;
use readid::ReadId;
use sigindex::SignalIndex;
use source::SourceOpener;
use tracing::{debug, info, warn};

use crate::batch::BatchFetcher;
use crate::file::IndexedFile;
use crate::locality::order_by;

/// Index file path for a data file: the suffix is appended to the full
/// file name, so `run.pod5` maps to `run.pod5.idx`.
pub fn index_path_for(path: &Path, suffix: &str) -> PathBuf {
    let mut name = path
        .file_name()
        .map(OsString::from)
        .unwrap_or_default();
    name.push(suffix);
    path.with_file_name(name)
}

/// Every file below `dir` with the given extension, sorted by path.
pub fn discover(dir: &Path, extension: &str) -> Result<Vec<PathBuf>> {
    if !dir.is_dir() {
        bail!("{} is not a directory", dir.display());
    }
    let mut found = Vec::new();
    let mut pending = vec![dir.to_path_buf()];
    while let Some(next) = pending.pop() {
        let entries =
            fs::read_dir(&next).with_context(|| format!("failed to list {}", next.display()))?;
        for entry in entries {
            let path = entry?.path();
            if path.is_dir() {
                pending.push(path);
            } else if path.extension().is_some_and(|e| e == extension) {
                found.push(path);
            }
        }
    }
    found.sort();
    Ok(found)
}

fn file_name(path: &Path) -> Result<String> {
    path.file_name()
        .map(|n| n.to_string_lossy().into_owned())
        .ok_or_else(|| anyhow!("{} has no file name", path.display()))
}

/// Random access to the traces of many signal files.
pub struct RandomAccessReader<O: SourceOpener> {
    opener: O,
    config: Config,
    fetcher: BatchFetcher,
    /// Registered files by name.
    paths: BTreeMap<String, PathBuf>,
    /// Files whose index is in memory.
    files: HashMap<String, IndexedFile<O::Source>>,
}

impl<O: SourceOpener> std::fmt::Debug for RandomAccessReader<O> {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("RandomAccessReader")
            .field("registered", &self.paths.len())
            .field("loaded", &self.files.len())
            .field("config", &self.config)
            .finish()
    }
}

impl<O: SourceOpener> RandomAccessReader<O> {
    /// Creates an empty reader.
    ///
    /// # Errors
    ///
    /// Fails if a dedicated fetch pool was configured and cannot be built.
    pub fn new(opener: O, config: Config) -> Result<Self> {
        let fetcher = BatchFetcher::new(config.fetch_threads)
            .context("failed to build batch fetch thread pool")?;
        Ok(Self {
            opener,
            config,
            fetcher,
            paths: BTreeMap::new(),
            files: HashMap::new(),
        })
    }

    pub fn config(&self) -> &Config {
        &self.config
    }

    pub fn opener(&self) -> &O {
        &self.opener
    }

    /// Index file path used for `path` under the current configuration.
    pub fn index_path(&self, path: &Path) -> PathBuf {
        index_path_for(path, &self.config.index_suffix)
    }

    /// Registers one data file.
    ///
    /// If its index file exists, loading is deferred to first access.
    /// Otherwise the index is built now and saved when `save_index` (or the
    /// configured default when `None`) says so. A failed save is logged and
    /// the in-memory index is kept.
    ///
    /// Registering a name again replaces the earlier file.
    pub fn add_file<P: AsRef<Path>>(&mut self, path: P, save_index: Option<bool>) -> Result<()> {
        let path = path.as_ref();
        let path = fs::canonicalize(path)
            .with_context(|| format!("failed to resolve {}", path.display()))?;
        let name = file_name(&path)?;
        let save_index = save_index.unwrap_or(self.config.save_index);

        self.files.remove(&name);
        let index_path = self.index_path(&path);
        if index_path.exists() {
            debug!(file = %name, "index found, deferring load");
        } else {
            let file = self.build(&path, &index_path, save_index)?;
            self.files.insert(name.clone(), file);
        }
        self.paths.insert(name, path);
        Ok(())
    }

    /// Registers every data file below `dir`, in path order.
    ///
    /// Files are found recursively by the configured extension.
    pub fn add_dir<P: AsRef<Path>>(&mut self, dir: P) -> Result<()> {
        let dir = dir.as_ref();
        let found = discover(dir, &self.config.extension)?;
        if found.is_empty() {
            warn!(dir = %dir.display(), extension = %self.config.extension, "no data files found");
            return Ok(());
        }
        for path in &found {
            self.add_file(path, None)?;
        }
        info!(count = found.len(), dir = %dir.display(), "registered data files");
        Ok(())
    }

    fn build(&self, path: &Path, index_path: &Path, save_index: bool) -> Result<IndexedFile<O::Source>> {
        let source = self
            .opener
            .open(path)
            .with_context(|| format!("failed to open {}", path.display()))?;
        let file = IndexedFile::open_and_build(source)
            .with_context(|| format!("failed to build index for {}", path.display()))?
            .with_fetcher(self.fetcher.clone());

        if save_index {
            match file.save_index(index_path) {
                Ok(()) => debug!(index = %index_path.display(), "built and saved index"),
                Err(e) => {
                    warn!(index = %index_path.display(), error = %e, "could not save index")
                }
            }
        } else {
            debug!(file = %path.display(), "built index in memory");
        }
        Ok(file)
    }

    fn load(&self, path: &Path) -> Result<IndexedFile<O::Source>> {
        let index_path = self.index_path(path);
        if !index_path.exists() {
            bail!("index file not found: {}", index_path.display());
        }
        let index = SignalIndex::load(&index_path)
            .with_context(|| format!("failed to load index {}", index_path.display()))?;
        let source = self
            .opener
            .open(path)
            .with_context(|| format!("failed to open {}", path.display()))?;
        debug!(index = %index_path.display(), entries = index.len(), "loaded index");
        Ok(IndexedFile::with_index(source, index).with_fetcher(self.fetcher.clone()))
    }

    /// The handle for a registered file, loading its index on first use.
    pub fn file(&mut self, name: &str) -> Result<&IndexedFile<O::Source>> {
        if !self.files.contains_key(name) {
            let path = self.paths.get(name).ok_or_else(|| {
                anyhow!("signal file '{}' is not registered; add it with add_file or add_dir first", name)
            })?;
            let loaded = self.load(path)?;
            self.files.insert(name.to_string(), loaded);
        }
        self.files
            .get(name)
            .ok_or_else(|| anyhow!("signal file '{}' is not loaded", name))
    }

    /// Registered file names in name order.
    pub fn filenames(&self) -> Vec<String> {
        self.paths.keys().cloned().collect()
    }

    /// Whether `name`'s index is currently in memory.
    pub fn is_loaded(&self, name: &str) -> bool {
        self.files.contains_key(name)
    }

    /// Read ids of one file.
    ///
    /// With `sorted` they come in signal-table order, otherwise in id order.
    pub fn list_read_ids(&mut self, name: &str, sorted: bool) -> Result<Vec<ReadId>> {
        let file = self.file(name)?;
        Ok(if sorted {
            file.list_read_ids_by_location()
        } else {
            file.list_read_ids()
        })
    }

    /// `(file name, read id)` for every read of every file.
    ///
    /// Files come in name order and each file's reads in signal-table
    /// order, so fetching in this order scans every file forward.
    pub fn iter_read_ids(&mut self) -> Result<Vec<(String, ReadId)>> {
        let mut all = Vec::new();
        for name in self.filenames() {
            let ids = self.list_read_ids(&name, true)?;
            all.extend(ids.into_iter().map(|id| (name.clone(), id)));
        }
        Ok(all)
    }

    pub fn calibration(&mut self, name: &str, id: &ReadId) -> Result<(f32, f32)> {
        Ok(self.file(name)?.calibration(id)?)
    }

    pub fn signal_length(&mut self, name: &str, id: &ReadId) -> Result<u32> {
        Ok(self.file(name)?.signal_length(id)?)
    }

    pub fn fetch_signal(&mut self, name: &str, id: &ReadId) -> Result<Vec<i16>> {
        Ok(self.file(name)?.fetch_signal(id)?)
    }

    pub fn fetch_calibrated_signal(&mut self, name: &str, id: &ReadId) -> Result<Vec<f32>> {
        Ok(self.file(name)?.fetch_calibrated_signal(id)?)
    }

    /// Permutation of `items` that visits them file by file (in name
    /// order) and by ascending `row_start` within each file.
    ///
    /// `key` extracts the file name and read id of an item. `order[k]` is
    /// the position in `items` of the k-th item to fetch.
    pub fn plan_fetch_order<T, F>(&mut self, items: &[T], key: F) -> Result<Vec<usize>>
    where
        F: Fn(&T) -> (&str, ReadId),
    {
        let mut by_file: BTreeMap<&str, Vec<(usize, ReadId)>> = BTreeMap::new();
        for (pos, item) in items.iter().enumerate() {
            let (name, id) = key(item);
            by_file.entry(name).or_default().push((pos, id));
        }

        let mut order = Vec::with_capacity(items.len());
        for (name, members) in by_file {
            if members.len() == 1 {
                order.push(members[0].0);
                continue;
            }
            let ids: Vec<ReadId> = members.iter().map(|&(_, id)| id).collect();
            let starts = self
                .file(name)?
                .signal_row_starts(&ids)
                .with_context(|| format!("failed to locate reads in {}", name))?;
            order.extend(order_by(&starts).into_iter().map(|k| members[k].0));
        }
        Ok(order)
    }
}

impl<O> RandomAccessReader<O>
where
    O: SourceOpener,
    O::Source: Sync,
{
    /// Fetches many reads of one file concurrently, in input order.
    pub fn fetch_many(&mut self, name: &str, ids: &[ReadId]) -> Result<Vec<Vec<i16>>> {
        Ok(self.file(name)?.fetch_many(ids)?)
    }
}
