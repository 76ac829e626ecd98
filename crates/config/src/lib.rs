//! # Config - runtime settings
//!
//! All settings are controlled via environment variables:
//!
//! ```text
//! SIGIDX_INDEX_SUFFIX   suffix appended to a data file name   (default: ".idx")
//! SIGIDX_SAVE_INDEX     persist freshly built indexes          (default: "true")
//! SIGIDX_FETCH_THREADS  batch fetch worker threads             (default: 0 = rayon default)
//! SIGIDX_EXTENSION      data file extension for directory scans (default: "pod5")
//! ```
//!
//! Unparseable values fall back to the default.

pub const ENV_INDEX_SUFFIX: &str = "SIGIDX_INDEX_SUFFIX";
pub const ENV_SAVE_INDEX: &str = "SIGIDX_SAVE_INDEX";
pub const ENV_FETCH_THREADS: &str = "SIGIDX_FETCH_THREADS";
pub const ENV_EXTENSION: &str = "SIGIDX_EXTENSION";

/// Default suffix: `run.pod5` is indexed in `run.pod5.idx`.
pub const DEFAULT_INDEX_SUFFIX: &str = ".idx";
pub const DEFAULT_EXTENSION: &str = "pod5";

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Config {
    /// Appended to a data file's name to get its index file name.
    pub index_suffix: String,
    /// Whether indexes built on registration are written next to the data.
    pub save_index: bool,
    /// Worker threads for batch fetches; `0` uses the global rayon pool.
    pub fetch_threads: usize,
    /// Extension (without dot) of data files picked up by directory scans.
    pub extension: String,
}

impl Default for Config {
    fn default() -> Self {
        Self {
            index_suffix: DEFAULT_INDEX_SUFFIX.to_string(),
            save_index: true,
            fetch_threads: 0,
            extension: DEFAULT_EXTENSION.to_string(),
        }
    }
}

impl Config {
    /// Reads the configuration from the process environment.
    pub fn from_env() -> Self {
        Self::from_lookup(|key| std::env::var(key).ok())
    }

    /// Reads the configuration through `lookup`, falling back to defaults.
    pub fn from_lookup<F>(lookup: F) -> Self
    where
        F: Fn(&str) -> Option<String>,
    {
        let defaults = Self::default();
        let var = |key: &str| lookup(key).map(|v| v.trim().to_string());

        Self {
            index_suffix: var(ENV_INDEX_SUFFIX)
                .filter(|s| !s.is_empty())
                .unwrap_or(defaults.index_suffix),
            save_index: var(ENV_SAVE_INDEX)
                .and_then(|v| v.parse().ok())
                .unwrap_or(defaults.save_index),
            fetch_threads: var(ENV_FETCH_THREADS)
                .and_then(|v| v.parse().ok())
                .unwrap_or(defaults.fetch_threads),
            extension: var(ENV_EXTENSION)
                .map(|v| v.trim_start_matches('.').to_string())
                .filter(|s| !s.is_empty())
                .unwrap_or(defaults.extension),
        }
    }
}
