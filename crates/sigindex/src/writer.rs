use std::ffi::OsString;
use std::fs::{self, OpenOptions};
use std::io::{BufWriter, Write};
use std::path::{Path, PathBuf};

use tracing::debug;

use crate::format::{write_entry, write_header};
use crate::{Result, SignalIndex};

impl SignalIndex {
    /// Writes the whole index to `path`, replacing any existing file.
    ///
    /// Entries are written in ascending `row_start` order so that the same
    /// index always produces the same bytes.
    ///
    /// # Crash Safety
    ///
    /// Writes to `<path>.tmp`, calls `sync_all()`, then atomically renames.
    /// A crash mid-write leaves the previous index (if any) intact.
    ///
    /// # Errors
    ///
    /// Returns [`IndexError::Io`](crate::IndexError::Io) on any filesystem
    /// failure. The temporary file is removed on failure.
    pub fn save<P: AsRef<Path>>(&self, path: P) -> Result<()> {
        let path = path.as_ref();
        let tmp_path = tmp_path_for(path);

        if let Err(e) = self.write_file(&tmp_path) {
            let _ = fs::remove_file(&tmp_path);
            return Err(e);
        }
        if let Err(e) = fs::rename(&tmp_path, path) {
            let _ = fs::remove_file(&tmp_path);
            return Err(e.into());
        }

        // Make the rename durable on filesystems that need a directory fsync.
        if let Some(parent) = path.parent() {
            if let Ok(dir) = fs::File::open(parent) {
                let _ = dir.sync_all();
            }
        }

        debug!(path = %path.display(), entries = self.len(), "saved signal index");
        Ok(())
    }

    fn write_file(&self, tmp_path: &Path) -> Result<()> {
        let raw_file = OpenOptions::new()
            .create(true)
            .write(true)
            .truncate(true)
            .open(tmp_path)?;
        let mut file = BufWriter::new(raw_file);

        let mut entries: Vec<_> = self.iter().collect();
        entries.sort_by_key(|(id, loc)| (loc.row_start, **id));

        write_header(&mut file, self.reserved, entries.len() as u64)?;
        for (read_id, loc) in entries {
            write_entry(&mut file, read_id, loc)?;
        }

        file.flush()?;
        file.into_inner().map_err(|e| e.into_error())?.sync_all()?;
        Ok(())
    }
}

fn tmp_path_for(path: &Path) -> PathBuf {
    let mut name = OsString::from(path.as_os_str());
    name.push(".tmp");
    PathBuf::from(name)
}
