//! # ReadId - trace identifiers
//!
//! Every trace stored in a signal file is identified by a 16-byte binary
//! UUID. [`ReadId`] wraps those bytes without ever going through a string
//! form on the hot path, and [`FnvBuildHasher`] hashes them with FNV-1a.
//!
//! Keys are already high-entropy fixed-width binary, so the hasher only has
//! to be fast and uniform. It is not DoS resistant and does not need to be:
//! the key set comes from a file the caller chose to open.
//!
//! ## Example
//!
//! ```rust
//! use readid::{FnvBuildHasher, ReadId};
//! use std::collections::HashMap;
//!
//! let id: ReadId = "0000173c-bf67-44e7-9a9c-1ad0bc728e74".parse().unwrap();
//! let mut map: HashMap<ReadId, u32, FnvBuildHasher> = HashMap::default();
//! map.insert(id, 7);
//! assert_eq!(map[&id], 7);
//! ```

use std::fmt;
use std::hash::{BuildHasherDefault, Hash, Hasher};
use std::str::FromStr;

use thiserror::Error;
use uuid::Uuid;

/// Width of a read identifier in bytes.
pub const READ_ID_BYTES: usize = 16;

/// Number of hex digits in the textual form (hyphens excluded).
const READ_ID_HEX_DIGITS: usize = READ_ID_BYTES * 2;

/// FNV-1a 64-bit offset basis.
const FNV_OFFSET_BASIS: u64 = 0xcbf2_9ce4_8422_2325;

/// FNV-1a 64-bit prime.
const FNV_PRIME: u64 = 0x0000_0100_0000_01b3;

/// Malformed identifier input.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum ArgumentError {
    /// Raw identifier bytes were not exactly 16 long.
    #[error("read id bytes must be length-16, got {0}")]
    ByteLength(usize),

    /// Textual identifier did not contain exactly 32 hex digits.
    #[error("read id string must be 32 hex digits, got {0}")]
    TextLength(usize),

    /// Textual identifier contained a non-hex character.
    #[error("read id string is not valid hex: {0:?}")]
    NotHex(String),
}

/// A 16-byte binary trace identifier.
///
/// Equality is byte-exact. Ordering is lexicographic over the bytes and is
/// only used to make listings deterministic.
#[derive(Clone, Copy, PartialEq, Eq, PartialOrd, Ord)]
pub struct ReadId([u8; READ_ID_BYTES]);

impl ReadId {
    /// Wraps raw identifier bytes.
    #[must_use]
    pub const fn from_bytes(bytes: [u8; READ_ID_BYTES]) -> Self {
        Self(bytes)
    }

    /// Returns the raw identifier bytes.
    #[must_use]
    pub fn as_bytes(&self) -> &[u8; READ_ID_BYTES] {
        &self.0
    }

    /// Parses the textual form: 32 hex digits, hyphens anywhere are ignored.
    ///
    /// Accepts both `0000173cbf6744e79a9c1ad0bc728e74` and the canonical
    /// `0000173c-bf67-44e7-9a9c-1ad0bc728e74`. Hex digits may be upper or
    /// lower case.
    pub fn parse_str(s: &str) -> Result<Self, ArgumentError> {
        let hex: String = s.chars().filter(|c| *c != '-').collect();
        if hex.len() != READ_ID_HEX_DIGITS {
            return Err(ArgumentError::TextLength(hex.len()));
        }
        let uuid = Uuid::try_parse(&hex).map_err(|_| ArgumentError::NotHex(s.to_string()))?;
        Ok(Self(uuid.into_bytes()))
    }
}

impl From<[u8; READ_ID_BYTES]> for ReadId {
    fn from(bytes: [u8; READ_ID_BYTES]) -> Self {
        Self(bytes)
    }
}

impl TryFrom<&[u8]> for ReadId {
    type Error = ArgumentError;

    fn try_from(bytes: &[u8]) -> Result<Self, Self::Error> {
        let arr: [u8; READ_ID_BYTES] = bytes
            .try_into()
            .map_err(|_| ArgumentError::ByteLength(bytes.len()))?;
        Ok(Self(arr))
    }
}

impl FromStr for ReadId {
    type Err = ArgumentError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        Self::parse_str(s)
    }
}

impl Hash for ReadId {
    // Feed the 16 bytes directly; the slice impl would prepend a length.
    fn hash<H: Hasher>(&self, state: &mut H) {
        state.write(&self.0);
    }
}

impl fmt::Display for ReadId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        fmt::Display::fmt(&Uuid::from_bytes(self.0).hyphenated(), f)
    }
}

impl fmt::Debug for ReadId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "ReadId({})", self)
    }
}

/// Streaming FNV-1a 64-bit hasher.
#[derive(Debug, Clone, Copy)]
pub struct FnvHasher(u64);

impl Default for FnvHasher {
    fn default() -> Self {
        Self(FNV_OFFSET_BASIS)
    }
}

impl Hasher for FnvHasher {
    fn finish(&self) -> u64 {
        self.0
    }

    fn write(&mut self, bytes: &[u8]) {
        self.0 = fnv1a_64(bytes, self.0);
    }
}

/// `BuildHasher` for maps keyed by [`ReadId`].
pub type FnvBuildHasher = BuildHasherDefault<FnvHasher>;

/// FNV-1a 64-bit hash continuing from `basis`.
fn fnv1a_64(data: &[u8], basis: u64) -> u64 {
    let mut hash = basis;
    for &byte in data {
        hash ^= byte as u64;
        hash = hash.wrapping_mul(FNV_PRIME);
    }
    hash
}
