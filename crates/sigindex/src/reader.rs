use std::fs::File;
use std::io::BufReader;
use std::path::Path;

use tracing::debug;

use crate::format::{read_entry, read_header, Header};
use crate::{IndexError, Result, SignalIndex};

impl SignalIndex {
    /// Loads an index written by [`save`](SignalIndex::save).
    ///
    /// # Validation
    ///
    /// - The magic must be `SIGIDX` and the version must equal
    ///   [`INDEX_VERSION`](crate::INDEX_VERSION).
    /// - The file length must be exactly `16 + entry_count * 40` bytes:
    ///   shorter files are truncated, longer ones carry trailing garbage.
    /// - A read id may appear only once.
    ///
    /// The map is pre-sized from `entry_count`, which is safe to trust once
    /// the length check has passed.
    ///
    /// # Errors
    ///
    /// [`IndexError::Format`] for any validation failure (no partial index is
    /// returned), [`IndexError::Io`] if the file cannot be opened or read.
    pub fn load<P: AsRef<Path>>(path: P) -> Result<Self> {
        let path = path.as_ref();
        let file = File::open(path)?;
        let filesize = file.metadata()?.len();
        let mut r = BufReader::new(file);

        let header = read_header(&mut r)?;
        check_length(&header, filesize)?;

        let mut index = Self::with_capacity(header.entry_count as usize);
        index.reserved = header.reserved;
        for _ in 0..header.entry_count {
            let (read_id, loc) = read_entry(&mut r)?;
            index.insert(read_id, loc).map_err(|_| {
                IndexError::Format(format!("read id {} stored twice", read_id))
            })?;
        }

        debug!(path = %path.display(), entries = index.len(), "loaded signal index");
        Ok(index)
    }

    /// Reads only the header of an index file.
    pub fn read_header<P: AsRef<Path>>(path: P) -> Result<Header> {
        let mut r = BufReader::new(File::open(path)?);
        read_header(&mut r)
    }
}

fn check_length(header: &Header, filesize: u64) -> Result<()> {
    let expected = header.file_len().ok_or_else(|| {
        IndexError::Format(format!("entry count {} overflows", header.entry_count))
    })?;
    if filesize < expected {
        return Err(IndexError::Format(format!(
            "truncated index file: {} entries need {} bytes, file has {}",
            header.entry_count, expected, filesize
        )));
    }
    if filesize > expected {
        return Err(IndexError::Format(format!(
            "{} trailing bytes after {} entries",
            filesize - expected,
            header.entry_count
        )));
    }
    Ok(())
}
