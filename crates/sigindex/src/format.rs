//! Index file header and entry encoding.
//!
//! ```text
//! header: [magic: 6 bytes "SIGIDX"][version: u16][reserved: u16][entry_count: u64]
//! entry:  [read_id: 16][row_start: u64][row_count: u32][n_samples: u32]
//!         [calibration_offset: f32][calibration_scale: f32]
//! ```
//!
//! All numbers use native byte order.

use byteorder::{NativeEndian, ReadBytesExt, WriteBytesExt};
use readid::{ReadId, READ_ID_BYTES};
use std::io::{self, Read, Write};

use crate::{IndexError, LocationRecord, Result};

/// Tag at the start of every index file.
pub const INDEX_MAGIC: [u8; 6] = *b"SIGIDX";

/// Current format revision. Loading rejects any other value.
pub const INDEX_VERSION: u16 = 1;

/// Size of the header: 6 (`magic`) + 2 (`version`) + 2 (`reserved`) + 8 (`entry_count`).
pub const HEADER_BYTES: u64 = 6 + 2 + 2 + 8;

/// Size of one entry: 16 (`read_id`) + 8 + 4 + 4 + 4 + 4.
pub const ENTRY_BYTES: u64 = READ_ID_BYTES as u64 + 8 + 4 + 4 + 4 + 4;

/// Parsed index file header.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Header {
    pub version: u16,
    pub reserved: u16,
    pub entry_count: u64,
}

impl Header {
    /// Total file size implied by `entry_count`, or `None` on overflow.
    #[must_use]
    pub fn file_len(&self) -> Option<u64> {
        self.entry_count
            .checked_mul(ENTRY_BYTES)
            .and_then(|body| body.checked_add(HEADER_BYTES))
    }
}

pub(crate) fn write_header<W: Write>(w: &mut W, reserved: u16, entry_count: u64) -> io::Result<()> {
    w.write_all(&INDEX_MAGIC)?;
    w.write_u16::<NativeEndian>(INDEX_VERSION)?;
    w.write_u16::<NativeEndian>(reserved)?;
    w.write_u64::<NativeEndian>(entry_count)?;
    Ok(())
}

/// Reads and validates the header. Magic and version must match exactly.
pub(crate) fn read_header<R: Read>(r: &mut R) -> Result<Header> {
    let mut magic = [0u8; INDEX_MAGIC.len()];
    r.read_exact(&mut magic).map_err(truncated("header"))?;
    if magic != INDEX_MAGIC {
        return Err(IndexError::Format(format!(
            "bad magic {:?}, expected {:?}",
            String::from_utf8_lossy(&magic),
            String::from_utf8_lossy(&INDEX_MAGIC)
        )));
    }

    let version = r.read_u16::<NativeEndian>().map_err(truncated("header"))?;
    if version != INDEX_VERSION {
        return Err(IndexError::Format(format!(
            "unsupported index version {}, expected {}",
            version, INDEX_VERSION
        )));
    }
    let reserved = r.read_u16::<NativeEndian>().map_err(truncated("header"))?;
    let entry_count = r.read_u64::<NativeEndian>().map_err(truncated("header"))?;

    Ok(Header {
        version,
        reserved,
        entry_count,
    })
}

pub(crate) fn write_entry<W: Write>(w: &mut W, read_id: &ReadId, loc: &LocationRecord) -> io::Result<()> {
    w.write_all(read_id.as_bytes())?;
    w.write_u64::<NativeEndian>(loc.row_start)?;
    w.write_u32::<NativeEndian>(loc.row_count)?;
    w.write_u32::<NativeEndian>(loc.n_samples)?;
    w.write_f32::<NativeEndian>(loc.calibration_offset)?;
    w.write_f32::<NativeEndian>(loc.calibration_scale)?;
    Ok(())
}

pub(crate) fn read_entry<R: Read>(r: &mut R) -> Result<(ReadId, LocationRecord)> {
    let mut key = [0u8; READ_ID_BYTES];
    r.read_exact(&mut key).map_err(truncated("entry"))?;
    let loc = LocationRecord {
        row_start: r.read_u64::<NativeEndian>().map_err(truncated("entry"))?,
        row_count: r.read_u32::<NativeEndian>().map_err(truncated("entry"))?,
        n_samples: r.read_u32::<NativeEndian>().map_err(truncated("entry"))?,
        calibration_offset: r.read_f32::<NativeEndian>().map_err(truncated("entry"))?,
        calibration_scale: r.read_f32::<NativeEndian>().map_err(truncated("entry"))?,
    };
    loc.rows()?;
    Ok((ReadId::from_bytes(key), loc))
}

/// Maps an early EOF to a format error; other I/O failures stay I/O errors.
fn truncated(what: &'static str) -> impl Fn(io::Error) -> IndexError {
    move |e| {
        if e.kind() == io::ErrorKind::UnexpectedEof {
            IndexError::Format(format!("truncated index file: incomplete {}", what))
        } else {
            IndexError::Io(e)
        }
    }
}
