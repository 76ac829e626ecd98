use readid::ReadId;
use source::{MemorySource, MemorySourceBuilder};

pub fn id(n: u8) -> ReadId {
    ReadId::from_bytes([n; 16])
}

/// `n` distinct samples derived from `seed`.
pub fn signal(seed: u8, n: usize) -> Vec<i16> {
    (0..n).map(|i| i16::from(seed) * 100 + i as i16).collect()
}

/// `reads` traces of 12 samples each, stored as 3 rows of 4.
///
/// Groups hold 6 rows, so read `k` (1-based) sits in group `(k - 1) / 2`
/// starting at row `3 * (k - 1)`.
pub fn grouped_source(builder: MemorySourceBuilder, reads: u8) -> MemorySource {
    let mut b = builder.row_capacity(4).group_rows(6).read_batch_size(3);
    for k in 1..=reads {
        b.add_read(id(k), f32::from(k), 0.5, &signal(k, 12));
    }
    b.build()
}
